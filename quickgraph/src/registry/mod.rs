//! The type registry: a memoized map from type name to [`TypeLookup`].
//!
//! Root `Query`/`Mutation`/`Subscription` are themselves ordinary
//! [`TypeLookup`] entries of kind [`TypeKind::Object`] whose fields are
//! resolver-backed — there is no separate function registry distinct from
//! the type graph; root operation types fold into the same structure rather
//! than a parallel one.

pub mod coerce;
pub mod describe;
pub mod function_registry;
pub mod type_lookup;

use std::collections::BTreeMap;

use arcstr::ArcStr;

use crate::ast::GenericValue;
use crate::error::GraphError;
use crate::registry::type_lookup::{TypeKind, TypeLookup, TypeRefMeta};
use crate::value::Value;

/// A registered custom scalar's two coercion hooks: AST literals go
/// through `ParseLiteral`, JSON-sourced variable values go through
/// `ParseValue` — two distinct hooks, selected by provenance.
pub struct ScalarHooks {
    pub parse_literal: Box<dyn Fn(&GenericValue) -> Result<Value, GraphError> + Send + Sync>,
    pub parse_value: Box<dyn Fn(&serde_json::Value) -> Result<Value, GraphError> + Send + Sync>,
}

pub const QUERY_ROOT: &str = "Query";
pub const MUTATION_ROOT: &str = "Mutation";
pub const SUBSCRIPTION_ROOT: &str = "Subscription";

/// The engine's full type graph, built up during registration.
///
/// Builder calls (`Engine::register_*`) run single-threaded ahead of request
/// processing, so this is a plain owned map rather than lock-wrapped; the
/// built registry is handed to the executor behind an `Arc` once
/// registration finishes and becomes immutable for the lifetime of every
/// request executing against it.
pub struct TypeRegistry {
    types: BTreeMap<ArcStr, TypeLookup>,
    scalar_hooks: BTreeMap<ArcStr, ScalarHooks>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: BTreeMap::new(),
            scalar_hooks: BTreeMap::new(),
        };
        for root in [QUERY_ROOT, MUTATION_ROOT, SUBSCRIPTION_ROOT] {
            registry
                .types
                .insert(root.into(), TypeLookup::new(root, TypeKind::Object));
        }
        registry
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeLookup> {
        self.types.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut TypeLookup> {
        self.types.get_mut(name)
    }

    pub fn root(&self, root: &str) -> &TypeLookup {
        self.types
            .get(root)
            .unwrap_or_else(|| panic!("root type {root} must always be present"))
    }

    pub fn root_mut(&mut self, root: &str) -> &mut TypeLookup {
        self.types
            .get_mut(root)
            .unwrap_or_else(|| panic!("root type {root} must always be present"))
    }

    pub fn all_types(&self) -> impl Iterator<Item = &TypeLookup> {
        self.types.values()
    }

    /// Registers a scalar by name if it isn't already present (`Describe`
    /// impls call this unconditionally; registration is idempotent).
    pub fn ensure_scalar(&mut self, name: &str) {
        self.types
            .entry(name.into())
            .or_insert_with(|| TypeLookup::new(name, TypeKind::Scalar));
    }

    /// Registers a custom scalar under the given name, overwriting an
    /// existing entry only if it was a placeholder (no member data yet):
    /// name, serialize (handled by the scalar's own `Serialize` impl at
    /// output time), `parse_value` (the variable path), `parse_literal`
    /// (the AST path).
    pub fn register_custom_scalar(
        &mut self,
        name: impl Into<ArcStr>,
        description: Option<ArcStr>,
        hooks: ScalarHooks,
    ) {
        let name: ArcStr = name.into();
        let entry = self
            .types
            .entry(name.clone())
            .or_insert_with(|| TypeLookup::new(name.clone(), TypeKind::Scalar));
        entry.description = description;
        self.scalar_hooks.insert(name, hooks);
    }

    pub fn scalar_hooks(&self, name: &str) -> Option<&ScalarHooks> {
        self.scalar_hooks.get(name)
    }

    /// The placeholder-insert-then-build pattern that breaks
    /// self-referential/cyclic `Describe` registration: if `name` is
    /// already present this returns immediately without calling `build`, so
    /// a type that refers to itself (directly or through a cycle)
    /// terminates.
    pub fn resolve_object(
        &mut self,
        name: impl Into<ArcStr>,
        kind: TypeKind,
        build: impl FnOnce(&mut Self, ArcStr),
    ) -> TypeRefMeta {
        let name: ArcStr = name.into();
        if !self.types.contains_key(&name) {
            self.types.insert(name.clone(), TypeLookup::new(name.clone(), kind));
            build(self, name.clone());
        }
        TypeRefMeta::named(name)
    }

    /// Registers a synthesized anonymous union for a multi-return resolver.
    pub fn register_synthetic_union(
        &mut self,
        name: &str,
        members: BTreeMap<ArcStr, TypeRefMeta>,
    ) -> TypeRefMeta {
        let name: ArcStr = name.into();
        let mut lookup = TypeLookup::new(name.clone(), TypeKind::Union);
        lookup.union_members = members;
        self.types.insert(name.clone(), lookup);
        TypeRefMeta::named(name)
    }

    /// Records that `implementor` implements `interface`, both directions
    /// (this is how interface implementation via embedding is tracked).
    pub fn record_implements(&mut self, implementor: &str, interface: &str) {
        if let Some(t) = self.types.get_mut(implementor) {
            t.implements.insert(interface.into(), ());
        }
        if let Some(t) = self.types.get_mut(interface) {
            t.implemented_by.insert(implementor.into(), ());
        }
    }
}
