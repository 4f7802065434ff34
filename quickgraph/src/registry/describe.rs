//! [`Describe`]: the reflection shim standing in for runtime type
//! introspection. Registered data types implement it — by hand for scalars
//! and the blanket container impls below, or via `#[derive(GraphQLObject)]` /
//! `#[derive(GraphQLEnum)]` from `quickgraph_derive` for application types.

use std::sync::Arc;

use crate::registry::type_lookup::TypeRefMeta;
use crate::registry::TypeRegistry;

/// Lets the engine discover a Rust type's GraphQL shape without runtime
/// reflection: `describe` registers (memoized) the type into the registry
/// and returns how it's referenced at this site (name + nullability/list
/// modifiers) — a `Resolve(T) -> TypeLookup` mapping.
pub trait Describe: 'static {
    fn describe(registry: &mut TypeRegistry) -> TypeRefMeta;
}

macro_rules! impl_scalar {
    ($ty:ty, $name:literal) => {
        impl Describe for $ty {
            fn describe(registry: &mut TypeRegistry) -> TypeRefMeta {
                registry.ensure_scalar($name);
                TypeRefMeta::named($name)
            }
        }
    };
}

impl_scalar!(bool, "Boolean");
impl_scalar!(i8, "Int");
impl_scalar!(i16, "Int");
impl_scalar!(i32, "Int");
impl_scalar!(i64, "Int");
impl_scalar!(isize, "Int");
impl_scalar!(u8, "Int");
impl_scalar!(u16, "Int");
impl_scalar!(u32, "Int");
impl_scalar!(u64, "Int");
impl_scalar!(usize, "Int");
impl_scalar!(f32, "Float");
impl_scalar!(f64, "Float");
impl_scalar!(String, "String");

impl Describe for &'static str {
    fn describe(registry: &mut TypeRegistry) -> TypeRefMeta {
        registry.ensure_scalar("String");
        TypeRefMeta::named("String")
    }
}

/// `Option<T>` marks the site as nullable — the Rust analogue of a
/// pointer-means-optional convention.
impl<T: Describe> Describe for Option<T> {
    fn describe(registry: &mut TypeRegistry) -> TypeRefMeta {
        T::describe(registry).optional()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe(registry: &mut TypeRegistry) -> TypeRefMeta {
        TypeRefMeta::list(T::describe(registry))
    }
}

impl<T: Describe> Describe for Box<T> {
    fn describe(registry: &mut TypeRegistry) -> TypeRefMeta {
        T::describe(registry)
    }
}

impl<T: Describe> Describe for Arc<T> {
    fn describe(registry: &mut TypeRegistry) -> TypeRefMeta {
        T::describe(registry)
    }
}
