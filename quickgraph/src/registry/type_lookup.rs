//! [`TypeLookup`] / [`FieldLookup`]: the language-neutral type graph.
//!
//! The pointer/array modifier chain lives on the *reference site*
//! (`TypeRefMeta`, attached to a [`FieldLookup`]'s declared type or a union
//! member) rather than duplicated per wrapper combination on `TypeLookup`
//! itself, the same line GraphQL implementations draw between a modifier
//! chain (`[T]!`) and the canonical named type underneath it — a canonical
//! `TypeLookup` per Rust *wrapper* type (e.g. a distinct entry for
//! `Option<Course>`, `Vec<Course>`, `Course`) would violate name uniqueness
//! for no benefit.

use std::collections::BTreeMap;

use arcstr::ArcStr;
use fnv::FnvHashMap;

use crate::registry::function_registry::FunctionRef;

/// A reference to a named type, with its pointer/list modifier chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeRefMeta {
    pub name: ArcStr,
    /// `true` when the Rust type at this site was `Option<T>`.
    pub optional: bool,
    /// `Some` when the Rust type at this site was `Vec<T>`; recurses into
    /// the element's own modifiers.
    pub list_of: Option<Box<TypeRefMeta>>,
}

impl TypeRefMeta {
    pub fn named(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            list_of: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn list(inner: TypeRefMeta) -> Self {
        Self {
            name: inner.name.clone(),
            optional: false,
            list_of: Some(Box::new(inner)),
        }
    }

    pub fn is_list(&self) -> bool {
        self.list_of.is_some()
    }

    pub fn innermost_name(&self) -> &str {
        match &self.list_of {
            Some(inner) => inner.innermost_name(),
            None => &self.name,
        }
    }

    /// Union members must be pointer- or interface-typed (or list/map) so
    /// nullability disambiguates the active variant.
    pub fn is_nullable_or_container(&self) -> bool {
        self.optional || self.list_of.is_some()
    }
}

/// The kind of a registered type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
}

/// Either a plain struct field or a resolver-backed field.
#[derive(Clone, Debug)]
pub enum FieldKind {
    Plain {
        /// Sequence of positions used to walk embedded/promoted structures
        /// in a flattened manner.
        index_path: Vec<usize>,
    },
    Resolver(FunctionRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deprecation {
    Current,
    Deprecated(Option<ArcStr>),
}

impl Deprecation {
    pub fn is_deprecated(&self) -> bool {
        matches!(self, Self::Deprecated(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Deprecated(Some(r)) => Some(r),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldLookup {
    pub kind: FieldKind,
    pub display_name: ArcStr,
    pub declared_type: TypeRefMeta,
    pub description: Option<ArcStr>,
    pub deprecation: Deprecation,
}

impl FieldLookup {
    pub fn is_resolver(&self) -> bool {
        matches!(self.kind, FieldKind::Resolver(_))
    }
}

/// A declared enum value, for [`TypeKind::Enum`] types.
#[derive(Clone, Debug)]
pub struct EnumValueMeta {
    pub name: ArcStr,
    pub description: Option<ArcStr>,
    pub deprecation: Deprecation,
}

/// One per distinct registered type name.
pub struct TypeLookup {
    pub name: ArcStr,
    pub kind: TypeKind,
    pub description: Option<ArcStr>,
    pub deprecation: Deprecation,

    /// Exact-case field lookup. Never overwritten by the case-insensitive
    /// lookup path, which only wins when the exact-case map misses.
    pub fields: BTreeMap<ArcStr, FieldLookup>,
    /// Lower-cased field name -> the *exact* case field name it resolves to.
    pub fields_ci: FnvHashMap<String, ArcStr>,

    /// Interfaces this type implements (object/interface -> interface).
    pub implements: BTreeMap<ArcStr, ()>,
    /// Reverse edge: types that implement this one (set when this type is
    /// itself an interface, via embedded-type promotion).
    pub implemented_by: BTreeMap<ArcStr, ()>,

    /// Union member types, keyed by name.
    pub union_members: BTreeMap<ArcStr, TypeRefMeta>,

    /// Enum values, populated only for [`TypeKind::Enum`].
    pub enum_values: Vec<EnumValueMeta>,
}

impl TypeLookup {
    pub fn new(name: impl Into<ArcStr>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            deprecation: Deprecation::Current,
            fields: BTreeMap::new(),
            fields_ci: FnvHashMap::default(),
            implements: BTreeMap::new(),
            implemented_by: BTreeMap::new(),
            union_members: BTreeMap::new(),
            enum_values: Vec::new(),
        }
    }

    /// Inserts a field, registering both the exact-case and case-insensitive
    /// entries. Warns (when the `tracing` feature is enabled) on a
    /// case-insensitive collision between two distinct exact-case names —
    /// the exact-case entry that was already present always wins.
    pub fn insert_field(&mut self, name: ArcStr, field: FieldLookup) {
        let lower = name.to_lowercase();
        if let Some(existing) = self.fields_ci.get(&lower) {
            if existing != &name {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    type_name = %self.name,
                    existing = %existing,
                    new = %name,
                    "case-insensitive field name collision; exact-case lookup keeps both, \
                     case-insensitive lookup keeps the first registered"
                );
            }
        } else {
            self.fields_ci.insert(lower, name.clone());
        }
        // First-seen wins for genuine name collisions (same exact-case name),
        // e.g. two embedded types lifting a field of the same name.
        self.fields.entry(name).or_insert(field);
    }

    /// Looks a field up by exact case first, falling back to
    /// case-insensitive. This intentionally diverges from SDL emission,
    /// which is always case-sensitive.
    pub fn field(&self, name: &str) -> Option<&FieldLookup> {
        if let Some(f) = self.fields.get(name) {
            return Some(f);
        }
        let lower = name.to_lowercase();
        self.fields_ci
            .get(&lower)
            .and_then(|exact| self.fields.get(exact.as_str()))
    }

    pub fn is_union(&self) -> bool {
        self.kind == TypeKind::Union
    }
}
