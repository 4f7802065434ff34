//! `Engine`: the registration API plus the built, immutable engine that
//! answers `process_request`.
//!
//! Split into a builder phase (mutable schema construction) and a built
//! phase (immutable, `Send + Sync`, shared across requests): registration is
//! serialized by a single writer, execution only ever takes a reader's
//! view.

use std::marker::PhantomData;
use std::sync::Arc;

use arcstr::ArcStr;

use crate::error::{ErrorCategory, ErrorHandler, GraphError};
use crate::executor::{Executor, RequestContext};
use crate::planner::{InMemoryStubCache, PlannerLimits, RequestPlanner, StubCache};
use crate::registry::describe::Describe;
use crate::registry::function_registry::{
    self, ArgsMeta, BuiltFunction, FunctionRef, ParamBindingMode,
};
use crate::registry::type_lookup::{Deprecation, FieldKind, FieldLookup, TypeRefMeta};
use crate::registry::{ScalarHooks, TypeRegistry};
use crate::value::Object;

/// Ambient configuration for limit checks during planning/execution,
/// threaded through `Engine::new` rather than globals.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub planner_limits: PlannerLimits,
    pub max_concurrent_resolvers: usize,
    /// `None` disables the cap.
    pub max_variable_payload_bytes: Option<usize>,
    /// Negative means unbuffered.
    pub subscription_buffer: isize,
    pub dev_mode: bool,
    /// Applied by `process_request` when the caller doesn't supply its own
    /// `RequestContext` via `process_request_with_context`. `None` means a
    /// request never times out on its own.
    pub default_timeout: Option<std::time::Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            planner_limits: PlannerLimits::default(),
            max_concurrent_resolvers: 32,
            max_variable_payload_bytes: None,
            subscription_buffer: 16,
            dev_mode: true,
            default_timeout: None,
        }
    }
}

/// The mutable registration-phase builder. `Ctx` is the application context
/// type threaded to every resolver as an opaque carrier; it never appears in
/// a GraphQL argument list, since the leading context parameter doesn't
/// count toward user-visible arity.
pub struct Engine<Ctx> {
    registry: TypeRegistry,
    config: EngineConfig,
    error_handler: Option<ErrorHandler>,
    cache: Arc<dyn StubCache>,
    _ctx: PhantomData<fn() -> Ctx>,
}

impl<Ctx: Send + Sync + 'static> Default for Engine<Ctx> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<Ctx: Send + Sync + 'static> Engine<Ctx> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: TypeRegistry::new(),
            config,
            error_handler: None,
            cache: Arc::new(InMemoryStubCache::default()),
            _ctx: PhantomData,
        }
    }

    /// `(category, err, details)`. Receives the unsanitized error plus its
    /// full detail map regardless of `dev_mode`.
    pub fn set_error_handler(&mut self, handler: impl Fn(ErrorCategory, &GraphError, &Object) + Send + Sync + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn set_stub_cache(&mut self, cache: impl StubCache + 'static) {
        self.cache = Arc::new(cache);
    }

    /// Forces `T` into the schema even if no resolver ever returns it.
    pub fn register_type<T: Describe>(&mut self) {
        T::describe(&mut self.registry);
    }

    /// Registers a custom scalar's coercion hooks.
    pub fn register_scalar(&mut self, name: impl Into<ArcStr>, description: Option<ArcStr>, hooks: ScalarHooks) {
        self.registry.register_custom_scalar(name, description, hooks);
    }

    fn insert_root_field(
        &mut self,
        root: &str,
        display_name: &str,
        mode: ParamBindingMode,
        built: BuiltFunction,
        mutation: bool,
        subscription: bool,
        description: Option<ArcStr>,
        deprecation: Deprecation,
    ) {
        let function = FunctionRef {
            display_name: display_name.into(),
            mode,
            params: built.params,
            return_type: built.return_type.clone(),
            is_synthetic_union: built.is_synthetic_union,
            method_receiver: false,
            mutation,
            subscription,
            description,
            deprecation,
            invoke: built.invoke,
        };
        self.registry.root_mut(root).insert_field(
            display_name.into(),
            FieldLookup {
                kind: FieldKind::Resolver(function),
                display_name: display_name.into(),
                declared_type: built.return_type,
                description: None,
                deprecation: Deprecation::Current,
            },
        );
    }

    /// Inserts a method resolver onto an already-registered (or
    /// just-registered-via-`T::describe`) object type.
    fn insert_method_field<T: Describe>(
        &mut self,
        display_name: &str,
        mode: ParamBindingMode,
        built: BuiltFunction,
        description: Option<ArcStr>,
        deprecation: Deprecation,
    ) {
        let owner_ref = T::describe(&mut self.registry);
        let function = FunctionRef {
            display_name: display_name.into(),
            mode,
            params: built.params,
            return_type: built.return_type.clone(),
            is_synthetic_union: built.is_synthetic_union,
            method_receiver: true,
            mutation: false,
            subscription: false,
            description,
            deprecation,
            invoke: built.invoke,
        };
        let owner = self
            .registry
            .lookup_mut(owner_ref.innermost_name())
            .expect("Describe::describe always registers its own type before returning");
        owner.insert_field(
            display_name.into(),
            FieldLookup {
                kind: FieldKind::Resolver(function),
                display_name: display_name.into(),
                declared_type: built.return_type,
                description: None,
                deprecation: Deprecation::Current,
            },
        );
    }

    /// Finalizes registration: the registry becomes immutable and shared.
    /// No further `register_*` calls are possible after this.
    pub fn finish(self) -> GraphEngine<Ctx> {
        let registry = Arc::new(self.registry);
        let executor = Executor::new(Arc::clone(&registry), self.config.max_concurrent_resolvers, self.config.subscription_buffer);
        GraphEngine {
            registry,
            executor,
            config: self.config,
            error_handler: self.error_handler,
            cache: self.cache,
            _ctx: PhantomData,
        }
    }
}

macro_rules! impl_root_registration {
    ($query_struct:ident, $mutation_struct:ident, $method_struct:ident;
     $($query_n:ident, $mutation_n:ident, $method_n:ident, $free_builder:ident, $method_builder:ident; $n:literal; $($arg:ident),*),+ $(,)?) => {
        impl<Ctx: Send + Sync + 'static> Engine<Ctx> {
            /// A query resolver bound by a named `ArgsMeta` struct.
            pub fn $query_struct<Args, Fut, Out>(
                &mut self,
                name: &str,
                f: impl Fn(Arc<Ctx>, Args) -> Fut + Send + Sync + 'static,
            ) where
                Args: ArgsMeta + serde::de::DeserializeOwned + Send + Sync + 'static,
                Fut: std::future::Future<Output = Out> + Send + 'static,
                Out: function_registry::IntoFieldOutcome,
            {
                let built = function_registry::build_named_struct_free(&mut self.registry, name, f);
                self.insert_root_field(crate::registry::QUERY_ROOT, name, ParamBindingMode::NamedStruct, built, false, false, None, Deprecation::Current);
            }

            /// A mutation resolver bound by a named `ArgsMeta` struct.
            pub fn $mutation_struct<Args, Fut, Out>(
                &mut self,
                name: &str,
                f: impl Fn(Arc<Ctx>, Args) -> Fut + Send + Sync + 'static,
            ) where
                Args: ArgsMeta + serde::de::DeserializeOwned + Send + Sync + 'static,
                Fut: std::future::Future<Output = Out> + Send + 'static,
                Out: function_registry::IntoFieldOutcome,
            {
                let built = function_registry::build_named_struct_free(&mut self.registry, name, f);
                self.insert_root_field(crate::registry::MUTATION_ROOT, name, ParamBindingMode::NamedStruct, built, true, false, None, Deprecation::Current);
            }

            /// A method (field) resolver on an already-`Describe`d type, in
            /// `NamedStruct` mode.
            pub fn $method_struct<T, Args, Fut, Out>(
                &mut self,
                field_name: &str,
                f: impl Fn(T, Arc<Ctx>, Args) -> Fut + Send + Sync + 'static,
            ) where
                T: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,
                Args: ArgsMeta + serde::de::DeserializeOwned + Send + Sync + 'static,
                Fut: std::future::Future<Output = Out> + Send + 'static,
                Out: function_registry::IntoFieldOutcome,
            {
                let built = function_registry::build_named_struct_method(&mut self.registry, field_name, f);
                self.insert_method_field::<T>(field_name, ParamBindingMode::NamedStruct, built, None, Deprecation::Current);
            }

            $(
                /// A query resolver with inline (named or anonymous) arguments
                #[doc = concat!("(", stringify!($n), " argument(s)).")]
                pub fn $query_n<$($arg,)* Fut, Out>(
                    &mut self,
                    name: &str,
                    names: Option<[&str; $n]>,
                    f: impl Fn(Arc<Ctx>, $($arg),*) -> Fut + Send + Sync + 'static,
                ) where
                    $($arg: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,)*
                    Fut: std::future::Future<Output = Out> + Send + 'static,
                    Out: function_registry::IntoFieldOutcome,
                {
                    let built = function_registry::$free_builder(&mut self.registry, name, names, f);
                    self.insert_root_field(crate::registry::QUERY_ROOT, name, inline_mode(names.is_some()), built, false, false, None, Deprecation::Current);
                }

                /// A mutation resolver with inline (named or anonymous) arguments
                #[doc = concat!("(", stringify!($n), " argument(s)).")]
                pub fn $mutation_n<$($arg,)* Fut, Out>(
                    &mut self,
                    name: &str,
                    names: Option<[&str; $n]>,
                    f: impl Fn(Arc<Ctx>, $($arg),*) -> Fut + Send + Sync + 'static,
                ) where
                    $($arg: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,)*
                    Fut: std::future::Future<Output = Out> + Send + 'static,
                    Out: function_registry::IntoFieldOutcome,
                {
                    let built = function_registry::$free_builder(&mut self.registry, name, names, f);
                    self.insert_root_field(crate::registry::MUTATION_ROOT, name, inline_mode(names.is_some()), built, true, false, None, Deprecation::Current);
                }

                /// A method (field) resolver in `NamedInline`/`AnonymousInline`
                /// mode
                #[doc = concat!("(", stringify!($n), " argument(s)).")]
                pub fn $method_n<T, $($arg,)* Fut, Out>(
                    &mut self,
                    field_name: &str,
                    names: Option<[&str; $n]>,
                    f: impl Fn(T, Arc<Ctx>, $($arg),*) -> Fut + Send + Sync + 'static,
                ) where
                    T: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,
                    $($arg: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,)*
                    Fut: std::future::Future<Output = Out> + Send + 'static,
                    Out: function_registry::IntoFieldOutcome,
                {
                    let built = function_registry::$method_builder(&mut self.registry, field_name, names, f);
                    self.insert_method_field::<T>(field_name, inline_mode(names.is_some()), built, None, Deprecation::Current);
                }
            )+
        }
    };
}

fn inline_mode(named: bool) -> ParamBindingMode {
    if named {
        ParamBindingMode::NamedInline
    } else {
        ParamBindingMode::AnonymousInline
    }
}

impl_root_registration!(
    register_query_struct, register_mutation_struct, register_method_struct;
    register_query0, register_mutation0, register_method0, build_inline0_free, build_inline0_method; 0;,
    register_query1, register_mutation1, register_method1, build_inline1_free, build_inline1_method; 1; A,
    register_query2, register_mutation2, register_method2, build_inline2_free, build_inline2_method; 2; A, B,
    register_query3, register_mutation3, register_method3, build_inline3_free, build_inline3_method; 3; A, B, C,
    register_query4, register_mutation4, register_method4, build_inline4_free, build_inline4_method; 4; A, B, C, D,
    register_query5, register_mutation5, register_method5, build_inline5_free, build_inline5_method; 5; A, B, C, D, E,
    register_query6, register_mutation6, register_method6, build_inline6_free, build_inline6_method; 6; A, B, C, D, E, F,
    register_query7, register_mutation7, register_method7, build_inline7_free, build_inline7_method; 7; A, B, C, D, E, F, G,
    register_query8, register_mutation8, register_method8, build_inline8_free, build_inline8_method; 8; A, B, C, D, E, F, G, H,
);

impl<Ctx: Send + Sync + 'static> Engine<Ctx> {
    /// A subscription resolver bound by a named `ArgsMeta` struct.
    pub fn register_subscription_struct<Args, Fut, T>(
        &mut self,
        name: &str,
        f: impl Fn(Arc<Ctx>, Args) -> Fut + Send + Sync + 'static,
    ) where
        Args: ArgsMeta + serde::de::DeserializeOwned + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<futures::stream::BoxStream<'static, Result<T, GraphError>>, GraphError>> + Send + 'static,
        T: Describe + serde::Serialize + Send + 'static,
    {
        let built = function_registry::build_subscription_free(&mut self.registry, name, f);
        self.insert_root_field(crate::registry::SUBSCRIPTION_ROOT, name, ParamBindingMode::NamedStruct, built, false, true, None, Deprecation::Current);
    }
}

/// The built, immutable engine: answers `process_request` and `sdl`.
/// `Send + Sync`, safe to share behind an `Arc` across concurrent requests —
/// shared, read-only data, since nothing under it is mutated after
/// `finish`.
pub struct GraphEngine<Ctx> {
    registry: Arc<TypeRegistry>,
    executor: Executor,
    config: EngineConfig,
    error_handler: Option<ErrorHandler>,
    cache: Arc<dyn StubCache>,
    _ctx: PhantomData<fn() -> Ctx>,
}

impl<Ctx: Send + Sync + 'static> GraphEngine<Ctx> {
    /// Runs one request end to end: `(ctx, queryString, variableJsonString)`
    /// to `(responseString, firstError)`.
    pub async fn process_request(&self, ctx: Arc<Ctx>, query: &str, variables_json: &str) -> (String, Option<GraphError>) {
        let request_ctx = match self.config.default_timeout {
            Some(timeout) => RequestContext::new().with_deadline(std::time::Instant::now() + timeout),
            None => RequestContext::new(),
        };
        self.process_request_with_context(ctx, query, variables_json, &request_ctx).await
    }

    /// Like [`Self::process_request`], but with an explicit deadline/
    /// cancellation token instead of the one `EngineConfig::default_timeout`
    /// would build.
    pub async fn process_request_with_context(
        &self,
        ctx: Arc<Ctx>,
        query: &str,
        variables_json: &str,
        request_ctx: &RequestContext,
    ) -> (String, Option<GraphError>) {
        if let Some(cap) = self.config.max_variable_payload_bytes {
            if variables_json.len() > cap {
                let err = GraphError::new(
                    format!("variable payload of {} bytes exceeds the configured cap of {cap} bytes", variables_json.len()),
                    ErrorCategory::Validation,
                );
                self.notify(ErrorCategory::Validation, &err);
                return (render_single_error(&err, self.config.dev_mode), Some(err));
            }
        }

        let variables: Object = if variables_json.trim().is_empty() {
            Object::new()
        } else {
            match serde_json::from_str::<serde_json::Value>(variables_json) {
                Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
                Ok(serde_json::Value::Null) => Object::new(),
                Ok(_) | Err(_) => {
                    let err = GraphError::new("variables payload must be a JSON object", ErrorCategory::Validation);
                    self.notify(ErrorCategory::Validation, &err);
                    return (render_single_error(&err, self.config.dev_mode), Some(err));
                }
            }
        };

        let planner = RequestPlanner::new(&self.registry, self.config.planner_limits, self.cache.as_ref());
        let stub = match planner.plan(query, &variables) {
            Ok(stub) => stub,
            Err(err) => {
                self.notify(err.category, &err);
                return (render_single_error(&err, self.config.dev_mode), Some(err));
            }
        };

        let bound_variables = match self.bind_variables(&stub, &variables) {
            Ok(v) => v,
            Err(err) => {
                self.notify(err.category, &err);
                return (render_single_error(&err, self.config.dev_mode), Some(err));
            }
        };

        let erased_ctx: crate::registry::function_registry::Receiver = ctx;
        let outcome = self.executor.execute(stub, erased_ctx, bound_variables, request_ctx).await;
        for err in &outcome.errors {
            self.notify(err.category, err);
        }
        (render_outcome(&outcome, self.config.dev_mode), outcome.errors.into_iter().next())
    }

    /// Opens a subscription stream; the executor spawns a pump that
    /// multiplexes channel receipt and context cancellation. Delivery to a
    /// transport is the caller's problem.
    pub async fn subscribe(
        &self,
        ctx: Arc<Ctx>,
        query: &str,
        variables_json: &str,
        request_ctx: RequestContext,
    ) -> Result<futures::stream::BoxStream<'static, (String, Option<GraphError>)>, GraphError> {
        use futures::StreamExt;

        let variables: Object = if variables_json.trim().is_empty() {
            Object::new()
        } else {
            serde_json::from_str(variables_json)
                .map_err(|e| GraphError::new(format!("invalid variables JSON: {e}"), ErrorCategory::Validation))?
        };
        let planner = RequestPlanner::new(&self.registry, self.config.planner_limits, self.cache.as_ref());
        let stub = planner.plan(query, &variables)?;
        let bound_variables = self.bind_variables(&stub, &variables)?;
        let erased_ctx: crate::registry::function_registry::Receiver = ctx;
        let dev_mode = self.config.dev_mode;
        let stream = self.executor.subscribe(stub, erased_ctx, bound_variables, request_ctx).await?;
        Ok(stream.map(move |outcome| (render_outcome(&outcome, dev_mode), outcome.errors.into_iter().next())).boxed())
    }

    /// The SDL emitter.
    pub fn sdl(&self) -> String {
        crate::schema::print_schema(&self.registry)
    }

    fn notify(&self, category: ErrorCategory, err: &GraphError) {
        if let Some(handler) = &self.error_handler {
            handler(category, err, &err.details());
        }
    }

    /// Binds the request's variable values: present in JSON wins, else the
    /// captured default AST value is coerced, else missing is an error.
    fn bind_variables(&self, stub: &crate::planner::RequestStub, variables: &Object) -> Result<Object, GraphError> {
        let mut bound = Object::new();
        for def in &stub.variable_defs {
            if let Some(json) = variables.get(&def.name) {
                bound.insert(def.name.clone(), json.clone());
                continue;
            }
            if let Some(default) = &def.default_value {
                let declared = request_typeref_to_meta(&def.declared_type);
                let coerced = crate::registry::coerce::coerce_value(
                    &default.item,
                    &declared,
                    variables,
                    &self.registry,
                    default.location,
                )?;
                bound.insert(def.name.clone(), crate::registry::coerce::value_to_json(coerced));
                continue;
            }
            if def.declared_type.non_null {
                return Err(GraphError::new(format!("variable {} not provided", def.name), ErrorCategory::Validation)
                    .with_location(def.location));
            }
            bound.insert(def.name.clone(), serde_json::Value::Null);
        }
        Ok(bound)
    }
}

/// Converts a request-side `ast::TypeRef` (the literal written in the
/// operation's variable declarations) into the registry's own
/// `TypeRefMeta`, so a variable's default value coerces against the same
/// shape `coerce_value` expects everywhere else.
fn request_typeref_to_meta(type_ref: &crate::ast::TypeRef) -> TypeRefMeta {
    match &type_ref.list_of {
        Some(inner) => {
            let mut meta = TypeRefMeta::list(request_typeref_to_meta(inner));
            if !type_ref.non_null {
                meta = meta.optional();
            }
            meta
        }
        None => {
            let mut meta = TypeRefMeta::named(type_ref.name.as_str());
            if !type_ref.non_null {
                meta = meta.optional();
            }
            meta
        }
    }
}

fn render_outcome(outcome: &crate::executor::ExecutionOutcome, dev_mode: bool) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert("data".to_string(), serde_json::Value::Object(outcome.data.clone().into_iter().collect()));
    if !outcome.errors.is_empty() {
        let errors: Vec<serde_json::Value> = outcome.errors.iter().map(|e| e.to_wire(dev_mode)).collect();
        obj.insert("errors".to_string(), serde_json::Value::Array(errors));
    }
    serde_json::to_string(&serde_json::Value::Object(obj)).expect("response JSON always serializes")
}

fn render_single_error(err: &GraphError, dev_mode: bool) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert("data".to_string(), serde_json::Value::Object(serde_json::Map::new()));
    obj.insert("errors".to_string(), serde_json::Value::Array(vec![err.to_wire(dev_mode)]));
    serde_json::to_string(&serde_json::Value::Object(obj)).expect("response JSON always serializes")
}

/// A context type with nothing in it, for applications with no
/// per-request state to thread through resolvers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoContext;

/// An args type for resolvers that take no arguments at all
/// (`ArgsMeta for ()` covers the zero-argument case).
pub type NoArgs = ();

/// Literal-provenance value a `ScalarHooks::parse_literal` hook receives.
pub use crate::ast::GenericValue as ScalarLiteral;
/// The in-memory value shape a `ScalarHooks` hook must produce.
pub use crate::value::Value as ScalarValue;
