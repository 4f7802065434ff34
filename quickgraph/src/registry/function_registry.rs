//! [`FunctionRef`]: resolver metadata and the normalized call path every
//! parameter-binding mode collapses into.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arcstr::ArcStr;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value as Json;

use crate::error::{ErrorCategory, GraphError};
use crate::registry::describe::Describe;
use crate::registry::type_lookup::{Deprecation, TypeRefMeta};
use crate::registry::TypeRegistry;
use crate::value::{Object, Value};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a resolver's GraphQL arguments map onto its Rust parameter list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamBindingMode {
    /// A single aggregate parameter whose member names become argument
    /// names (`#[derive(GraphQLObject)]`-backed `Args` struct).
    NamedStruct,
    /// Caller supplied explicit parameter names at registration time,
    /// one-for-one with positional parameters.
    NamedInline,
    /// No names were supplied; parameters are exposed as `arg0`, `arg1`, ….
    AnonymousInline,
}

#[derive(Clone, Debug)]
pub struct ParamMeta {
    pub name: ArcStr,
    pub index: usize,
    pub declared_type: TypeRefMeta,
    pub required: bool,
}

impl ParamMeta {
    pub fn is_required_and_missing(&self, args: &Object) -> bool {
        self.required && !args.contains_key(self.name.as_str())
    }
}

/// Resolver metadata.
#[derive(Clone)]
pub struct FunctionRef {
    pub display_name: ArcStr,
    pub mode: ParamBindingMode,
    pub params: Vec<ParamMeta>,
    /// The function's return type graph, possibly a synthesized anonymous
    /// union.
    pub return_type: TypeRefMeta,
    /// `true` when `return_type` names a synthesized `<Fn>ResultUnion`.
    pub is_synthetic_union: bool,
    pub method_receiver: bool,
    pub mutation: bool,
    pub subscription: bool,
    pub description: Option<ArcStr>,
    pub deprecation: Deprecation,
    pub(crate) invoke: Invoke,
}

/// A receiver value passed to a method-resolver field, type-erased so the
/// [`FunctionRef`] call path is homogeneous across every registered
/// function.
pub type Receiver = Arc<dyn std::any::Any + Send + Sync>;

/// One already-resolved call: bound, type-erased arguments plus the
/// optional receiver and context.
pub struct Invocation {
    pub ctx: Receiver,
    pub receiver: Option<Receiver>,
    pub args: Object,
}

type InvokeFn = dyn Fn(Invocation) -> BoxFuture<'static, Result<FieldOutcome, GraphError>> + Send + Sync;

#[derive(Clone)]
pub(crate) struct Invoke(pub(crate) Arc<InvokeFn>);

impl Invoke {
    pub fn call(&self, invocation: Invocation) -> BoxFuture<'static, Result<FieldOutcome, GraphError>> {
        (self.0)(invocation)
    }
}

/// What a resolver produced, before the executor walks its sub-selection:
/// either a concrete value, a finite/infinite stream (subscriptions), or a
/// synthetic-union-tagged value (exactly one variant populated).
pub enum FieldOutcome {
    Value(Value),
    Stream(BoxStream<'static, Result<Value, GraphError>>),
}

/// Resolver return types implement this to plug into the homogeneous call
/// path; `quickgraph_derive` generates it for user result types, and it's
/// implemented here for `Result<T, E>` and small option-tuples (implicit
/// unions with more than one non-error return value).
pub trait IntoFieldOutcome {
    /// `Some(n)` when this is an `n`-ary implicit union (`Result<(Option<A>,
    /// Option<B>), E>`-shaped); `None` for a plain single return type.
    const UNION_ARITY: Option<usize>;

    fn describe_return(registry: &mut TypeRegistry, synthetic_union_name: &str) -> TypeRefMeta;

    fn into_outcome(self, function_name: &str) -> Result<FieldOutcome, GraphError>;
}

fn value_of<T: serde::Serialize>(v: &T) -> Result<Value, GraphError> {
    let json = serde_json::to_value(v).map_err(|e| {
        GraphError::new(
            format!("failed to serialize resolver output: {e}"),
            ErrorCategory::Serialization,
        )
    })?;
    Ok(crate::registry::coerce::json_to_value(json))
}

impl<T, E> IntoFieldOutcome for Result<T, E>
where
    T: Describe + serde::Serialize,
    E: std::fmt::Display,
{
    const UNION_ARITY: Option<usize> = None;

    fn describe_return(registry: &mut TypeRegistry, _synthetic_union_name: &str) -> TypeRefMeta {
        T::describe(registry)
    }

    fn into_outcome(self, _function_name: &str) -> Result<FieldOutcome, GraphError> {
        match self {
            Ok(v) => Ok(FieldOutcome::Value(value_of(&v)?)),
            Err(e) => Err(GraphError::new(e.to_string(), ErrorCategory::ResolverInvocation)),
        }
    }
}

macro_rules! impl_union_outcome {
    ($arity:literal; $($name:ident: $idx:tt),+) => {
        impl<$($name,)+ E> IntoFieldOutcome for Result<($(Option<$name>,)+), E>
        where
            $($name: Describe + serde::Serialize,)+
            E: std::fmt::Display,
        {
            const UNION_ARITY: Option<usize> = Some($arity);

            fn describe_return(registry: &mut TypeRegistry, synthetic_union_name: &str) -> TypeRefMeta {
                let mut members = std::collections::BTreeMap::new();
                $(
                    let member_ty = $name::describe(registry).optional();
                    members.insert(member_ty.name.clone(), member_ty);
                )+
                registry.register_synthetic_union(synthetic_union_name, members)
            }

            fn into_outcome(self, function_name: &str) -> Result<FieldOutcome, GraphError> {
                let tuple = self.map_err(|e| {
                    GraphError::new(e.to_string(), ErrorCategory::ResolverInvocation)
                })?;
                let mut populated: Vec<Value> = Vec::new();
                $(
                    if let Some(v) = &tuple.$idx {
                        populated.push(value_of(v)?);
                    }
                )+
                match populated.len() {
                    0 => Err(GraphError::new(
                        format!("no fields in union type are not nil (function {function_name})"),
                        ErrorCategory::ResolverInvocation,
                    )),
                    1 => Ok(FieldOutcome::Value(populated.into_iter().next().unwrap())),
                    _ => Err(GraphError::new(
                        format!("more than one field in union type is not nil (function {function_name})"),
                        ErrorCategory::ResolverInvocation,
                    )),
                }
            }
        }
    };
}

impl_union_outcome!(2; A: 0, B: 1);
impl_union_outcome!(3; A: 0, B: 1, C: 2);
impl_union_outcome!(4; A: 0, B: 1, C: 2, D: 3);

/// `<FunctionName>ResultUnion`: anonymous return unions still need a name
/// in the schema, synthesized from the resolver's own display name.
pub fn synthetic_union_name(function_display_name: &str) -> String {
    format!("{function_display_name}ResultUnion")
}

// ---------------------------------------------------------------------
// Registration: builds a homogeneous `FunctionRef` + `Invoke` from a
// concretely-typed Rust resolver on the input side the same way
// `IntoFieldOutcome` resolves it on the output side — the same "variadic
// handler" idiom Axum's `Handler` impls use for argument tuples.
// ---------------------------------------------------------------------

/// Implemented by a `#[derive(GraphQLObject)]` type when used as a single
/// aggregate (`NamedStruct`-mode) argument: the struct's own field metadata
/// doubles as the resolver's parameter list, and its member names become
/// the GraphQL argument names.
pub trait ArgsMeta: 'static {
    fn param_metas(registry: &mut TypeRegistry) -> Vec<ParamMeta>;
}

/// Every tuple of zero arguments is a trivially-empty args struct, so
/// resolvers that take no business parameters can register in
/// `NamedStruct` mode too.
impl ArgsMeta for () {
    fn param_metas(_registry: &mut TypeRegistry) -> Vec<ParamMeta> {
        Vec::new()
    }
}

fn downcast_ctx<Ctx: Send + Sync + 'static>(ctx: &Receiver) -> Result<Arc<Ctx>, GraphError> {
    Arc::clone(ctx)
        .downcast::<Ctx>()
        .map_err(|_| GraphError::new("resolver context type mismatch", ErrorCategory::Internal))
}

/// Reconstructs a method resolver's receiver from the already-serialized
/// parent [`Value`] the executor passes down (`executor::resolve_object_selection`
/// always builds the receiver as `Arc::new(Value::Object(..))`) — there is
/// no live handle to the original Rust struct by the time a nested field
/// resolves, so the receiver type must round-trip through `Deserialize`
/// the same way every resolver's return type round-trips through
/// `Serialize`.
fn downcast_receiver<R: serde::de::DeserializeOwned>(receiver: &Receiver) -> Result<R, GraphError> {
    let value = receiver
        .downcast_ref::<Value>()
        .ok_or_else(|| GraphError::new("resolver receiver type mismatch", ErrorCategory::Internal))?;
    serde_json::from_value(value.clone().into_json()).map_err(|e| {
        GraphError::new(format!("failed to reconstruct receiver: {e}"), ErrorCategory::ResolverInvocation)
    })
}

/// Nil input is an error unless the target itself tolerates null
/// (`Option<T>`'s `Deserialize` impl accepts `Null`); `serde_json`'s own
/// type-directed deserialization enforces that distinction for us.
fn extract_named_arg<A: serde::de::DeserializeOwned>(args: &Object, name: &str) -> Result<A, GraphError> {
    let json = args.get(name).cloned().unwrap_or(Json::Null);
    serde_json::from_value(json)
        .map_err(|e| GraphError::new(format!("argument {name} failed to coerce: {e}"), ErrorCategory::InputCoercion))
}

mod resolver_fn_sealed {
    pub trait Sealed {}
}

/// Classifies a resolver's positional argument list by its Rust parameter
/// types, one impl per tuple arity 0 through 8 — the input-side mirror of
/// [`IntoFieldOutcome`] on the return side, and the same "variadic handler"
/// idiom Axum's `Handler` impls use for argument tuples. Sealed: only the
/// tuple impls generated by `impl_resolver_fn!` below exist.
pub trait ResolverFn: resolver_fn_sealed::Sealed + Sized {
    /// Builds the [`ParamMeta`] list from caller-supplied (or
    /// positionally-synthesized `arg0`, `arg1`, …) names plus each element's
    /// own [`Describe`] impl.
    fn describe_params(registry: &mut TypeRegistry, names: Option<&[&str]>) -> Vec<ParamMeta>;

    /// Coerces each bound GraphQL argument into its Rust type, by position.
    fn extract(args: &Object, params: &[ParamMeta]) -> Result<Self, GraphError>;
}

macro_rules! impl_resolver_fn {
    ($n:literal; $($arg:ident: $idx:tt),*) => {
        impl<$($arg: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,)*> resolver_fn_sealed::Sealed for ($($arg,)*) {}

        impl<$($arg: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,)*> ResolverFn for ($($arg,)*) {
            fn describe_params(registry: &mut TypeRegistry, names: Option<&[&str]>) -> Vec<ParamMeta> {
                let describe: [fn(&mut TypeRegistry) -> TypeRefMeta; $n] = [$($arg::describe),*];
                (0..$n)
                    .map(|i| {
                        let declared_type = describe[i](registry);
                        let name = names.map(|n| n[i].to_string()).unwrap_or_else(|| format!("arg{i}"));
                        let required = !declared_type.optional;
                        ParamMeta { name: name.into(), index: i, declared_type, required }
                    })
                    .collect()
            }

            fn extract(args: &Object, params: &[ParamMeta]) -> Result<Self, GraphError> {
                Ok(($(extract_named_arg::<$arg>(args, params[$idx].name.as_str())?,)*))
            }
        }
    };
}

impl_resolver_fn!(0;);
impl_resolver_fn!(1; A: 0);
impl_resolver_fn!(2; A: 0, B: 1);
impl_resolver_fn!(3; A: 0, B: 1, C: 2);
impl_resolver_fn!(4; A: 0, B: 1, C: 2, D: 3);
impl_resolver_fn!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_resolver_fn!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_resolver_fn!(7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_resolver_fn!(8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// One resolver ready for insertion into the registry as a field: its
/// metadata plus the type-erased call path in normalized form.
pub struct BuiltFunction {
    pub params: Vec<ParamMeta>,
    pub return_type: TypeRefMeta,
    pub is_synthetic_union: bool,
    pub invoke: Invoke,
}

/// Registers a resolver whose single non-context argument is an aggregate
/// (`ArgsMeta`-implementing) type — `NamedStruct` mode. No receiver: for
/// root `Query`/`Mutation`/`Subscription` fields.
pub fn build_named_struct_free<Ctx, Args, Fut, Out>(
    registry: &mut TypeRegistry,
    function_display_name: &str,
    f: impl Fn(Arc<Ctx>, Args) -> Fut + Send + Sync + 'static,
) -> BuiltFunction
where
    Ctx: Send + Sync + 'static,
    Args: ArgsMeta + serde::de::DeserializeOwned + Send + Sync + 'static,
    Fut: Future<Output = Out> + Send + 'static,
    Out: IntoFieldOutcome,
{
    let params = Args::param_metas(registry);
    let synthetic_union_name = synthetic_union_name(function_display_name);
    let return_type = Out::describe_return(registry, &synthetic_union_name);
    let is_synthetic_union = Out::UNION_ARITY.is_some();
    let function_name = function_display_name.to_string();
    let f = Arc::new(f);
    let invoke = Invoke(Arc::new(move |invocation: Invocation| {
        let f = Arc::clone(&f);
        let function_name = function_name.clone();
        Box::pin(async move {
            let ctx = downcast_ctx::<Ctx>(&invocation.ctx)?;
            let args: Args = serde_json::from_value(Json::Object(
                invocation.args.into_iter().collect(),
            ))
            .map_err(|e| GraphError::new(format!("failed to coerce arguments: {e}"), ErrorCategory::InputCoercion))?;
            f(ctx, args).await.into_outcome(&function_name)
        })
    }));
    BuiltFunction { params, return_type, is_synthetic_union, invoke }
}

/// As [`build_named_struct_free`], but for a method resolver: `R` is
/// reconstructed from the parent object's serialized [`Value`], the first
/// positional parameter standing in for the receiver.
pub fn build_named_struct_method<R, Ctx, Args, Fut, Out>(
    registry: &mut TypeRegistry,
    function_display_name: &str,
    f: impl Fn(R, Arc<Ctx>, Args) -> Fut + Send + Sync + 'static,
) -> BuiltFunction
where
    R: serde::de::DeserializeOwned + Send + Sync + 'static,
    Ctx: Send + Sync + 'static,
    Args: ArgsMeta + serde::de::DeserializeOwned + Send + Sync + 'static,
    Fut: Future<Output = Out> + Send + 'static,
    Out: IntoFieldOutcome,
{
    let params = Args::param_metas(registry);
    let synthetic_union_name = synthetic_union_name(function_display_name);
    let return_type = Out::describe_return(registry, &synthetic_union_name);
    let is_synthetic_union = Out::UNION_ARITY.is_some();
    let function_name = function_display_name.to_string();
    let f = Arc::new(f);
    let invoke = Invoke(Arc::new(move |invocation: Invocation| {
        let f = Arc::clone(&f);
        let function_name = function_name.clone();
        Box::pin(async move {
            let receiver = invocation
                .receiver
                .as_ref()
                .ok_or_else(|| GraphError::new("method resolver invoked without a receiver", ErrorCategory::Internal))?;
            let receiver: R = downcast_receiver(receiver)?;
            let ctx = downcast_ctx::<Ctx>(&invocation.ctx)?;
            let args: Args = serde_json::from_value(Json::Object(
                invocation.args.into_iter().collect(),
            ))
            .map_err(|e| GraphError::new(format!("failed to coerce arguments: {e}"), ErrorCategory::InputCoercion))?;
            f(receiver, ctx, args).await.into_outcome(&function_name)
        })
    }));
    BuiltFunction { params, return_type, is_synthetic_union, invoke }
}

/// Registers a subscription resolver: a return type that is a
/// receive-only channel of some `T` marks the function as a subscription.
/// The Rust shape is `Result<BoxStream<'static, Result<T, GraphError>>,
/// GraphError>` rather than a bare channel type.
pub fn build_subscription_free<Ctx, Args, Fut, T>(
    registry: &mut TypeRegistry,
    function_display_name: &str,
    f: impl Fn(Arc<Ctx>, Args) -> Fut + Send + Sync + 'static,
) -> BuiltFunction
where
    Ctx: Send + Sync + 'static,
    Args: ArgsMeta + serde::de::DeserializeOwned + Send + Sync + 'static,
    Fut: Future<Output = Result<BoxStream<'static, Result<T, GraphError>>, GraphError>> + Send + 'static,
    T: Describe + serde::Serialize + Send + 'static,
{
    let params = Args::param_metas(registry);
    let return_type = T::describe(registry);
    let f = Arc::new(f);
    let invoke = Invoke(Arc::new(move |invocation: Invocation| {
        let f = Arc::clone(&f);
        Box::pin(async move {
            let ctx = downcast_ctx::<Ctx>(&invocation.ctx)?;
            let args: Args = serde_json::from_value(Json::Object(
                invocation.args.into_iter().collect(),
            ))
            .map_err(|e| GraphError::new(format!("failed to coerce arguments: {e}"), ErrorCategory::InputCoercion))?;
            let stream = f(ctx, args).await?;
            let mapped = stream.map(|item| item.and_then(|v| value_of(&v)));
            Ok(FieldOutcome::Stream(Box::pin(mapped)))
        })
    }));
    BuiltFunction { params, return_type, is_synthetic_union: false, invoke }
}

macro_rules! impl_inline_builders {
    ($builder_free:ident, $builder_method:ident; $n:literal; $($arg:ident: $idx:tt),*) => {
        /// `NamedInline`/`AnonymousInline` registration for a
        #[doc = concat!("`", stringify!($n), "`-ary")]
        /// free (root) resolver.
        #[allow(clippy::too_many_arguments, reason = "mirrors the arity of the resolver being registered")]
        pub fn $builder_free<Ctx, $($arg,)* Fut, Out>(
            registry: &mut TypeRegistry,
            function_display_name: &str,
            names: Option<[&str; $n]>,
            f: impl Fn(Arc<Ctx>, $($arg),*) -> Fut + Send + Sync + 'static,
        ) -> BuiltFunction
        where
            Ctx: Send + Sync + 'static,
            $($arg: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,)*
            Fut: Future<Output = Out> + Send + 'static,
            Out: IntoFieldOutcome,
        {
            let params = <($($arg,)*) as ResolverFn>::describe_params(registry, names.as_ref().map(|n| n.as_slice()));
            let bound_params = params.clone();
            let synthetic_union_name = synthetic_union_name(function_display_name);
            let return_type = Out::describe_return(registry, &synthetic_union_name);
            let is_synthetic_union = Out::UNION_ARITY.is_some();
            let function_name = function_display_name.to_string();
            let f = Arc::new(f);
            let invoke = Invoke(Arc::new(move |invocation: Invocation| {
                let f = Arc::clone(&f);
                let function_name = function_name.clone();
                let bound_params = bound_params.clone();
                Box::pin(async move {
                    let ctx = downcast_ctx::<Ctx>(&invocation.ctx)?;
                    let ($($arg,)*) = <($($arg,)*) as ResolverFn>::extract(&invocation.args, &bound_params)?;
                    f(ctx, $($arg),*).await.into_outcome(&function_name)
                })
            }));
            BuiltFunction { params, return_type, is_synthetic_union, invoke }
        }

        /// As the free variant, but for a method resolver with a
        /// reconstructed receiver `R` as the first positional parameter.
        #[allow(clippy::too_many_arguments, reason = "mirrors the arity of the resolver being registered")]
        pub fn $builder_method<R, Ctx, $($arg,)* Fut, Out>(
            registry: &mut TypeRegistry,
            function_display_name: &str,
            names: Option<[&str; $n]>,
            f: impl Fn(R, Arc<Ctx>, $($arg),*) -> Fut + Send + Sync + 'static,
        ) -> BuiltFunction
        where
            R: serde::de::DeserializeOwned + Send + Sync + 'static,
            Ctx: Send + Sync + 'static,
            $($arg: Describe + serde::de::DeserializeOwned + Send + Sync + 'static,)*
            Fut: Future<Output = Out> + Send + 'static,
            Out: IntoFieldOutcome,
        {
            let params = <($($arg,)*) as ResolverFn>::describe_params(registry, names.as_ref().map(|n| n.as_slice()));
            let bound_params = params.clone();
            let synthetic_union_name = synthetic_union_name(function_display_name);
            let return_type = Out::describe_return(registry, &synthetic_union_name);
            let is_synthetic_union = Out::UNION_ARITY.is_some();
            let function_name = function_display_name.to_string();
            let f = Arc::new(f);
            let invoke = Invoke(Arc::new(move |invocation: Invocation| {
                let f = Arc::clone(&f);
                let function_name = function_name.clone();
                let bound_params = bound_params.clone();
                Box::pin(async move {
                    let receiver = invocation.receiver.as_ref().ok_or_else(|| {
                        GraphError::new("method resolver invoked without a receiver", ErrorCategory::Internal)
                    })?;
                    let receiver: R = downcast_receiver(receiver)?;
                    let ctx = downcast_ctx::<Ctx>(&invocation.ctx)?;
                    let ($($arg,)*) = <($($arg,)*) as ResolverFn>::extract(&invocation.args, &bound_params)?;
                    f(receiver, ctx, $($arg),*).await.into_outcome(&function_name)
                })
            }));
            BuiltFunction { params, return_type, is_synthetic_union, invoke }
        }
    };
}

impl_inline_builders!(build_inline0_free, build_inline0_method; 0;);
impl_inline_builders!(build_inline1_free, build_inline1_method; 1; A: 0);
impl_inline_builders!(build_inline2_free, build_inline2_method; 2; A: 0, B: 1);
impl_inline_builders!(build_inline3_free, build_inline3_method; 3; A: 0, B: 1, C: 2);
impl_inline_builders!(build_inline4_free, build_inline4_method; 4; A: 0, B: 1, C: 2, D: 3);
impl_inline_builders!(build_inline5_free, build_inline5_method; 5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_inline_builders!(build_inline6_free, build_inline6_method; 6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_inline_builders!(build_inline7_free, build_inline7_method; 7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_inline_builders!(build_inline8_free, build_inline8_method; 8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
