//! The executor: walks a [`RequestStub`] against the live registry, invoking
//! resolvers and assembling the `data`/`errors` response.
//!
//! Queries and subscriptions dispatch their root commands in parallel behind
//! a concurrency gate; mutations dispatch serially with a cancellation check
//! between each, mirroring GraphQL's "mutations execute in order" rule.

pub mod concurrency;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{BoxStream, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::ast::OperationMode;
use crate::error::{ErrorCategory, GraphError, Location, PathSegment};
use crate::executor::concurrency::ConcurrencyGate;
use crate::planner::{PlannedCommand, PlannedField, PlannedSelection, RequestStub};
use crate::registry::function_registry::{FieldOutcome, Invocation, Receiver as ErasedReceiver};
use crate::registry::type_lookup::{FieldKind, TypeKind};
use crate::registry::{coerce, TypeRegistry};
use crate::value::{Object, Value};

/// Per-request execution state: cancellation and an optional deadline.
#[derive(Clone)]
pub struct RequestContext {
    pub cancellation: CancellationToken,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_done(&self) -> bool {
        self.cancellation.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Executor {
    registry: Arc<TypeRegistry>,
    gate: ConcurrencyGate,
    /// Negative means unbuffered.
    subscription_buffer: isize,
}

/// One resolved response: the top-level `data` object plus every error
/// collected along the way, already path-annotated.
pub struct ExecutionOutcome {
    pub data: Object,
    pub errors: Vec<GraphError>,
}

impl Executor {
    pub fn new(registry: Arc<TypeRegistry>, max_concurrency: usize, subscription_buffer: isize) -> Self {
        Self {
            registry,
            gate: ConcurrencyGate::new(max_concurrency),
            subscription_buffer,
        }
    }

    pub async fn execute(
        &self,
        stub: RequestStub,
        ctx: ErasedReceiver,
        variables: Object,
        request_ctx: &RequestContext,
    ) -> ExecutionOutcome {
        let variables = Arc::new(variables);

        match stub.mode {
            OperationMode::Mutation => self.execute_serial(&stub.root_commands, ctx, variables, request_ctx).await,
            OperationMode::Query => self.execute_parallel(&stub.root_commands, ctx, variables, request_ctx).await,
            OperationMode::Subscription => self.execute_parallel(&stub.root_commands, ctx, variables, request_ctx).await,
        }
    }

    /// Opens a single root subscription field's resolver stream and maps
    /// each emitted value through the same field-resolution path as a
    /// query, respecting the configured buffer size and request
    /// cancellation.
    pub async fn subscribe(
        &self,
        stub: RequestStub,
        ctx: ErasedReceiver,
        variables: Object,
        request_ctx: RequestContext,
    ) -> Result<BoxStream<'static, ExecutionOutcome>, GraphError> {
        let Some(command) = stub.root_commands.into_iter().next() else {
            return Err(GraphError::new("subscription request selects no root field", ErrorCategory::Validation));
        };
        let variables = Arc::new(variables);
        let invocation_result = self.invoke_field_outcome(&command.field, ctx, None, &command.raw_params, &variables, command.location).await;

        let outcome = match invocation_result {
            Ok(FieldOutcome::Stream(stream)) => stream,
            Ok(FieldOutcome::Value(_)) => {
                return Err(GraphError::new(
                    format!("{} is not a subscription resolver", command.display_name),
                    ErrorCategory::Internal,
                ))
            }
            Err(e) => return Err(e),
        };

        let registry = Arc::clone(&self.registry);
        let sub_plan = command.sub_plan;
        let display_name = command.display_name;

        let mapped = outcome.filter_map(move |item| {
            let registry = Arc::clone(&registry);
            let sub_plan = sub_plan.clone();
            let display_name = display_name.clone();
            async move {
                let mut errors = Vec::new();
                let mut data = Object::new();
                match item {
                    Ok(value) => {
                        let resolved = match &sub_plan {
                            Some(plan) => project_subscription_payload(&registry, value, plan, &mut errors),
                            None => value_to_json_value(value),
                        };
                        data.insert(display_name.to_string(), coerce::value_to_json(resolved));
                    }
                    Err(e) => errors.push(e.prepend_path(PathSegment::Field(display_name.to_string()))),
                }
                Some(ExecutionOutcome { data, errors })
            }
        });

        // `subscription_buffer` sizes the channel the pump feeds: a
        // negative value means unbuffered, emulated as the smallest
        // capacity `tokio::sync::mpsc` supports (it has no true
        // zero-capacity/rendezvous channel), so delivery still blocks the
        // pump until the consumer catches up.
        let capacity = if self.subscription_buffer < 0 { 1 } else { (self.subscription_buffer as usize).max(1) };
        let (tx, rx) = tokio::sync::mpsc::channel::<ExecutionOutcome>(capacity);
        let pump_cancellation = request_ctx.cancellation.clone();
        tokio::spawn(async move {
            futures::pin_mut!(mapped);
            loop {
                tokio::select! {
                    item = mapped.next() => {
                        match item {
                            Some(outcome) if tx.send(outcome).await.is_ok() => {}
                            _ => break,
                        }
                    }
                    () = pump_cancellation.cancelled() => break,
                }
            }
        });

        let output = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        Ok(output.boxed())
    }

    /// Each sibling root field races its resolver chain against the request
    /// deadline/cancellation rather than only checking before it starts, so a
    /// field that outlives the deadline is dropped from `data` instead of
    /// blocking the whole response on it.
    async fn execute_parallel(
        &self,
        commands: &[PlannedCommand],
        ctx: ErasedReceiver,
        variables: Arc<Object>,
        request_ctx: &RequestContext,
    ) -> ExecutionOutcome {
        let futures = commands.iter().map(|command| {
            let ctx = Arc::clone(&ctx);
            let variables = Arc::clone(&variables);
            async move {
                let admission = self.gate.try_admit();
                let result = self.run_with_deadline(command, ctx, variables, request_ctx).await;
                drop(admission);
                (command.display_name.clone(), result)
            }
        });

        let results = futures::future::join_all(futures).await;
        self.assemble(results)
    }

    async fn run_with_deadline(
        &self,
        command: &PlannedCommand,
        ctx: ErasedReceiver,
        variables: Arc<Object>,
        request_ctx: &RequestContext,
    ) -> Result<Value, GraphError> {
        let resolve = self.run_root_command(command, ctx, variables);
        match request_ctx.deadline {
            Some(deadline) => {
                tokio::select! {
                    result = resolve => result,
                    () = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                        Err(GraphError::new("context timed out: context deadline exceeded", ErrorCategory::Internal)
                            .with_location(command.location))
                    }
                    () = request_ctx.cancellation.cancelled() => {
                        Err(GraphError::new("context timed out: context canceled", ErrorCategory::Internal)
                            .with_location(command.location))
                    }
                }
            }
            None => {
                tokio::select! {
                    result = resolve => result,
                    () = request_ctx.cancellation.cancelled() => {
                        Err(GraphError::new("context timed out: context canceled", ErrorCategory::Internal)
                            .with_location(command.location))
                    }
                }
            }
        }
    }

    async fn execute_serial(
        &self,
        commands: &[PlannedCommand],
        ctx: ErasedReceiver,
        variables: Arc<Object>,
        request_ctx: &RequestContext,
    ) -> ExecutionOutcome {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            if request_ctx.is_done() {
                results.push((
                    command.display_name.clone(),
                    Err(GraphError::new("request cancelled before mutation completed", ErrorCategory::Internal)
                        .with_location(command.location)),
                ));
                continue;
            }
            let result = self.run_with_deadline(command, Arc::clone(&ctx), Arc::clone(&variables), request_ctx).await;
            results.push((command.display_name.clone(), result));
        }
        self.assemble(results)
    }

    fn assemble(&self, results: Vec<(arcstr::ArcStr, Result<Value, GraphError>)>) -> ExecutionOutcome {
        let mut data = Object::new();
        let mut errors = Vec::new();
        for (name, result) in results {
            match result {
                Ok(value) => {
                    data.insert(name.to_string(), coerce::value_to_json(value));
                }
                Err(e) => {
                    data.insert(name.to_string(), serde_json::Value::Null);
                    errors.push(e.prepend_path(PathSegment::Field(name.to_string())));
                }
            }
        }
        ExecutionOutcome { data, errors }
    }

    async fn run_root_command(
        &self,
        command: &PlannedCommand,
        ctx: ErasedReceiver,
        variables: Arc<Object>,
    ) -> Result<Value, GraphError> {
        let outcome = self
            .invoke_field_outcome(&command.field, Arc::clone(&ctx), None, &command.raw_params, &variables, command.location)
            .await?;
        match outcome {
            FieldOutcome::Value(value) => match &command.sub_plan {
                Some(plan) => {
                    let mut errors = Vec::new();
                    let resolved = self.resolve_sub_selection(ctx, value, plan, &variables, &mut errors).await;
                    if let Some(first) = errors.into_iter().next() {
                        return Err(first);
                    }
                    Ok(value_to_json_value(resolved))
                }
                None => Ok(value),
            },
            FieldOutcome::Stream(_) => Err(GraphError::new(
                format!("{} is a subscription resolver invoked outside a subscription", command.display_name),
                ErrorCategory::Internal,
            )),
        }
    }

    /// Walks a resolved resolver value against its planned sub-selection,
    /// resolving nested resolver fields (with the current object as their
    /// receiver) and plain struct fields alike.
    fn resolve_sub_selection<'a>(
        &'a self,
        ctx: ErasedReceiver,
        value: Value,
        plan: &'a PlannedSelection,
        variables: &'a Object,
        errors: &'a mut Vec<GraphError>,
    ) -> futures::future::BoxFuture<'a, Value> {
        Box::pin(async move {
            match value {
                Value::Null => Value::Null,
                Value::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items.into_iter() {
                        let resolved = self.resolve_sub_selection(Arc::clone(&ctx), item, plan, variables, errors).await;
                        out.push(resolved);
                    }
                    Value::List(out)
                }
                Value::Object(obj) => self.resolve_object_selection(ctx, obj, plan, variables, errors).await,
                scalar => scalar,
            }
        })
    }

    async fn resolve_object_selection(
        &self,
        ctx: ErasedReceiver,
        obj: Object,
        plan: &PlannedSelection,
        variables: &Object,
        errors: &mut Vec<GraphError>,
    ) -> Value {
        let type_lookup = self.registry.lookup(&plan.on_type);
        let is_union = type_lookup.is_some_and(|t| t.kind == TypeKind::Union);

        let (resolved_type_name, members) = if is_union {
            match resolve_union_member(type_lookup.unwrap(), &obj) {
                Ok(pair) => pair,
                Err(e) => {
                    errors.push(e);
                    return Value::Null;
                }
            }
        } else {
            (plan.on_type.to_string(), obj)
        };

        let receiver: ErasedReceiver = Arc::new(Value::Object(members.clone()));
        let mut out = Object::new();
        for planned_field in &plan.fields {
            if planned_field.display_name.as_str() == "__typename" {
                out.insert("__typename".to_string(), serde_json::Value::String(resolved_type_name.clone()));
                continue;
            }
            let resolved = self
                .resolve_plain_field(Arc::clone(&ctx), Arc::clone(&receiver), &members, planned_field, variables, errors)
                .await;
            out.insert(planned_field.display_name.to_string(), coerce::value_to_json(resolved));
        }
        Value::Object(out)
    }

    async fn resolve_plain_field(
        &self,
        ctx: ErasedReceiver,
        receiver: ErasedReceiver,
        obj: &Object,
        planned_field: &PlannedField,
        variables: &Object,
        errors: &mut Vec<GraphError>,
    ) -> Value {
        match &planned_field.field.kind {
            FieldKind::Plain { index_path: _ } => {
                let raw = obj.get(planned_field.display_name.as_str()).cloned().unwrap_or(serde_json::Value::Null);
                let value = coerce::json_to_value(raw);
                match &planned_field.sub_plan {
                    Some(sub_plan) => self.resolve_sub_selection(ctx, value, sub_plan, variables, errors).await,
                    None => value,
                }
            }
            FieldKind::Resolver(_) => {
                let outcome = self
                    .invoke_field_outcome(
                        &planned_field.field,
                        Arc::clone(&ctx),
                        Some(receiver),
                        &planned_field.raw_params,
                        variables,
                        planned_field.location,
                    )
                    .await;
                match outcome {
                    Ok(FieldOutcome::Value(value)) => match &planned_field.sub_plan {
                        Some(sub_plan) => {
                            self.resolve_sub_selection(ctx, value, sub_plan, variables, errors).await
                        }
                        None => value,
                    },
                    Ok(FieldOutcome::Stream(_)) => {
                        errors.push(GraphError::new(
                            format!("{} is a subscription resolver used as a nested field", planned_field.display_name),
                            ErrorCategory::Internal,
                        ));
                        Value::Null
                    }
                    Err(e) => {
                        errors.push(e.prepend_path(PathSegment::Field(planned_field.display_name.to_string())));
                        Value::Null
                    }
                }
            }
        }
    }

    async fn invoke_field_outcome(
        &self,
        field: &crate::registry::type_lookup::FieldLookup,
        ctx: ErasedReceiver,
        receiver: Option<ErasedReceiver>,
        raw_params: &[crate::ast::ParamValue],
        variables: &Object,
        location: Location,
    ) -> Result<FieldOutcome, GraphError> {
        let FieldKind::Resolver(function) = &field.kind else {
            return Err(GraphError::new("attempted to invoke a non-resolver field", ErrorCategory::Internal));
        };

        let mut args = Object::new();
        for param in raw_params {
            let meta = function.params.iter().find(|p| p.name.as_str() == param.name);
            let declared = meta
                .map(|m| m.declared_type.clone())
                .unwrap_or_else(|| crate::registry::type_lookup::TypeRefMeta::named("String"));
            let coerced = coerce::coerce_value(&param.value.item, &declared, variables, &self.registry, param.value.location)?;
            args.insert(param.name.clone(), coerce::value_to_json(coerced));
        }
        for param_meta in &function.params {
            if param_meta.is_required_and_missing(&args) {
                return Err(GraphError::new(
                    format!("required argument {} missing for {}", param_meta.name, function.display_name),
                    ErrorCategory::Validation,
                )
                .with_location(location));
            }
        }

        let invocation = Invocation { ctx, receiver, args };

        let call = AssertUnwindSafe(function.invoke.call(invocation));
        match call.catch_unwind().await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(e.with_location_if_absent(location)),
            Err(panic) => Err(GraphError::from_panic(panic, &function.display_name).with_location(location)),
        }
    }
}

/// Converts an already-resolved leaf [`Value`] into the response-shaped
/// [`Value`] (a no-op; kept as a seam for future post-processing hooks).
fn value_to_json_value(value: Value) -> Value {
    value
}

/// Projects a subscription event payload through its planned selection.
/// Event payloads are treated as already-resolved data: nested resolver
/// fields on a payload are not dispatched (there is no per-event
/// method-receiver concept), only plain struct fields and `__typename` are
/// projected.
fn project_subscription_payload(
    registry: &TypeRegistry,
    value: Value,
    plan: &PlannedSelection,
    errors: &mut Vec<GraphError>,
) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::List(items) => Value::List(
            items
                .into_iter()
                .map(|item| project_subscription_payload(registry, item, plan, errors))
                .collect(),
        ),
        Value::Object(obj) => {
            let type_lookup = registry.lookup(&plan.on_type);
            let is_union = type_lookup.is_some_and(|t| t.kind == TypeKind::Union);
            let (resolved_type_name, members) = if is_union {
                match resolve_union_member(type_lookup.unwrap(), &obj) {
                    Ok(pair) => pair,
                    Err(e) => {
                        errors.push(e);
                        return Value::Null;
                    }
                }
            } else {
                (plan.on_type.to_string(), obj)
            };
            let mut out = Object::new();
            for field in &plan.fields {
                if field.display_name.as_str() == "__typename" {
                    out.insert("__typename".to_string(), serde_json::Value::String(resolved_type_name.clone()));
                    continue;
                }
                let raw = members.get(field.display_name.as_str()).cloned().unwrap_or(serde_json::Value::Null);
                let resolved = match &field.sub_plan {
                    Some(sub_plan) => project_subscription_payload(registry, coerce::json_to_value(raw), sub_plan, errors),
                    None => coerce::json_to_value(raw),
                };
                out.insert(field.display_name.to_string(), coerce::value_to_json(resolved));
            }
            Value::Object(out)
        }
        scalar => scalar,
    }
}

/// Disambiguates a resolved union value, expecting exactly one member key
/// (matching the resolver's name) to be non-null.
fn resolve_union_member(
    union_type: &crate::registry::type_lookup::TypeLookup,
    obj: &Object,
) -> Result<(String, Object), GraphError> {
    let mut found: Option<(String, Object)> = None;
    for member_name in union_type.union_members.keys() {
        if let Some(serde_json::Value::Object(inner)) = obj.get(member_name.as_str()) {
            if found.is_some() {
                return Err(GraphError::new(
                    "more than one field in union type is not nil",
                    ErrorCategory::ResolverInvocation,
                ));
            }
            found = Some((member_name.to_string(), inner.clone().into_iter().collect()));
        }
    }
    found.ok_or_else(|| GraphError::new("no fields in union type are not nil", ErrorCategory::ResolverInvocation))
}
