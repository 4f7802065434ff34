//! The request planner: parse → classify mode → resolve root fields →
//! validate → [`RequestStub`].
//!
//! Resolving the static plan and handing it to the executor is kept as a
//! two-phase shape, but validation is folded into the planning pass rather
//! than split into a fully separate visitor, since this engine's schema is
//! runtime-registered rather than SDL-declared.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arcstr::ArcStr;

use crate::ast::{self, Command, Document, FragmentDef, FragmentSpread, GenericValue, OperationMode, ResultField, ResultFilter, Spanning, TypeRef};
use crate::error::{ErrorCategory, GraphError, Location};
use crate::registry::type_lookup::{FieldKind, FieldLookup, TypeLookup, TypeRefMeta};
use crate::registry::{self, TypeRegistry};
use crate::value::Object;

/// Request-shape limits enforced during planning. Values are deliberately
/// generous defaults; applications tune them via `EngineConfig`.
#[derive(Clone, Copy, Debug)]
pub struct PlannerLimits {
    pub max_depth: usize,
    pub max_aliases: usize,
    pub max_root_fields: usize,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_aliases: 256,
            max_root_fields: 64,
        }
    }
}

/// One resolved selection: the field it names, its bound/coerced arguments,
/// and the plan for its own sub-selection (if any).
#[derive(Clone)]
pub struct PlannedField {
    pub display_name: ArcStr,
    pub field: Arc<FieldLookup>,
    pub raw_params: Vec<ast::ParamValue>,
    pub location: Location,
    pub sub_plan: Option<PlannedSelection>,
}

/// A resolved, type-checked selection set: plain fields merged with
/// applicable fragment spreads, plus the concrete type it was validated
/// against.
#[derive(Clone)]
pub struct PlannedSelection {
    pub on_type: ArcStr,
    pub fields: Vec<PlannedField>,
}

/// The fully planned request, ready for the executor.
pub struct RequestStub {
    pub mode: OperationMode,
    pub operation_name: Option<String>,
    pub root_commands: Vec<PlannedCommand>,
    pub variable_defs: Vec<ast::VariableDef>,
}

pub struct PlannedCommand {
    pub display_name: ArcStr,
    pub field: Arc<FieldLookup>,
    pub raw_params: Vec<ast::ParamValue>,
    pub location: Location,
    pub sub_plan: Option<PlannedSelection>,
}

/// Caches parsed+planned requests keyed by the raw query text, so repeated
/// identical requests skip re-parsing/re-validating.
pub trait StubCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<CachedPlan>>;
    fn put(&self, key: String, plan: Arc<CachedPlan>);
}

/// What's cached: everything about a request except its concrete variable
/// values (those are re-bound per invocation).
pub struct CachedPlan {
    pub document: Document,
}

#[derive(Default)]
pub struct InMemoryStubCache {
    entries: Mutex<HashMap<String, Arc<CachedPlan>>>,
}

impl StubCache for InMemoryStubCache {
    fn get(&self, key: &str) -> Option<Arc<CachedPlan>> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: String, plan: Arc<CachedPlan>) {
        self.entries.lock().unwrap().insert(key, plan);
    }
}

pub struct RequestPlanner<'a> {
    registry: &'a TypeRegistry,
    limits: PlannerLimits,
    cache: &'a dyn StubCache,
}

impl<'a> RequestPlanner<'a> {
    pub fn new(registry: &'a TypeRegistry, limits: PlannerLimits, cache: &'a dyn StubCache) -> Self {
        Self { registry, limits, cache }
    }

    pub fn plan(&self, source: &str, variables: &Object) -> Result<RequestStub, GraphError> {
        let document = match self.cache.get(source) {
            Some(cached) => cached.document.clone(),
            None => {
                let doc = crate::parser::parse_document(source).map_err(|(e, loc)| {
                    GraphError::new(e.to_string(), ErrorCategory::Parse).with_location(loc)
                })?;
                self.cache.put(
                    source.to_string(),
                    Arc::new(CachedPlan { document: doc.clone() }),
                );
                doc
            }
        };

        let mode = self.classify_mode(&document)?;
        self.check_variable_defs(&document, variables)?;

        if document.commands.len() > self.limits.max_root_fields {
            return Err(GraphError::new(
                format!(
                    "request selects {} root fields, exceeding the limit of {}",
                    document.commands.len(),
                    self.limits.max_root_fields
                ),
                ErrorCategory::Validation,
            )
            .with_location(document.start_location));
        }

        let root_name = match mode {
            OperationMode::Query => registry::QUERY_ROOT,
            OperationMode::Mutation => registry::MUTATION_ROOT,
            OperationMode::Subscription => registry::SUBSCRIPTION_ROOT,
        };
        let root = self.registry.root(root_name);

        let mut alias_seen = std::collections::HashSet::new();
        let mut root_commands = Vec::with_capacity(document.commands.len());
        for command in &document.commands {
            self.check_alias_budget(&mut alias_seen, command.display_name(), command.location)?;
            let field = self.resolve_field(root, &command.name, command.location)?;
            let sub_plan = match (&command.result_filter, field.is_resolver()) {
                (Some(filter), _) => Some(self.plan_selection(
                    field.declared_type.innermost_name(),
                    filter,
                    &document.fragments,
                    1,
                )?),
                (None, true) => {
                    return Err(GraphError::new(
                        format!("field {} requires a selection set", command.name),
                        ErrorCategory::Validation,
                    )
                    .with_location(command.location))
                }
                (None, false) => None,
            };
            root_commands.push(PlannedCommand {
                display_name: command.display_name().into(),
                field: Arc::new(field.clone()),
                raw_params: command.params.clone(),
                location: command.location,
                sub_plan,
            });
        }

        self.check_variable_usage_consistency(&root_commands)?;

        Ok(RequestStub {
            mode,
            operation_name: document.operation_name.clone(),
            root_commands,
            variable_defs: document.variable_defs.clone(),
        })
    }

    /// Variable gathering: walks every command and its selection set, and
    /// for each argument whose AST value is a variable reference, binds the
    /// variable's name to the target parameter's declared type. A variable
    /// referenced at two sites with structurally different bound parameter
    /// types is rejected.
    fn check_variable_usage_consistency(&self, commands: &[PlannedCommand]) -> Result<(), GraphError> {
        let mut usages: HashMap<String, TypeRefMeta> = HashMap::new();
        for command in commands {
            self.record_variable_usages(&mut usages, &command.field, &command.raw_params)?;
            if let Some(plan) = &command.sub_plan {
                self.walk_selection_variable_usages(&mut usages, plan)?;
            }
        }
        Ok(())
    }

    fn walk_selection_variable_usages(
        &self,
        usages: &mut HashMap<String, TypeRefMeta>,
        plan: &PlannedSelection,
    ) -> Result<(), GraphError> {
        for field in &plan.fields {
            self.record_variable_usages(usages, &field.field, &field.raw_params)?;
            if let Some(sub_plan) = &field.sub_plan {
                self.walk_selection_variable_usages(usages, sub_plan)?;
            }
        }
        Ok(())
    }

    fn record_variable_usages(
        &self,
        usages: &mut HashMap<String, TypeRefMeta>,
        field: &FieldLookup,
        raw_params: &[ast::ParamValue],
    ) -> Result<(), GraphError> {
        let FieldKind::Resolver(function) = &field.kind else {
            return Ok(());
        };
        for param in raw_params {
            let GenericValue::Variable(var_name) = &param.value.item else {
                continue;
            };
            let Some(param_meta) = function.params.iter().find(|p| p.name.as_str() == param.name) else {
                continue;
            };
            match usages.get(var_name) {
                Some(existing) if existing != &param_meta.declared_type => {
                    return Err(GraphError::new(
                        format!("variable ${var_name} is bound to inconsistent parameter types across its usages"),
                        ErrorCategory::Validation,
                    )
                    .with_location(param.value.location));
                }
                Some(_) => {}
                None => {
                    usages.insert(var_name.clone(), param_meta.declared_type.clone());
                }
            }
        }
        Ok(())
    }

    fn classify_mode(&self, document: &Document) -> Result<OperationMode, GraphError> {
        match &document.operation_keyword {
            None => Ok(OperationMode::Query),
            Some(Spanning { item, location }) => match item.as_str() {
                "query" => Ok(OperationMode::Query),
                "mutation" => Ok(OperationMode::Mutation),
                "subscription" => Ok(OperationMode::Subscription),
                other => Err(GraphError::new(
                    format!("unknown/unsupported call mode {other}"),
                    ErrorCategory::Validation,
                )
                .with_location(*location)),
            },
        }
    }

    fn check_alias_budget(
        &self,
        seen: &mut std::collections::HashSet<String>,
        display_name: &str,
        location: Location,
    ) -> Result<(), GraphError> {
        seen.insert(display_name.to_string());
        if seen.len() > self.limits.max_aliases {
            return Err(GraphError::new(
                format!("request declares more than {} distinct aliases", self.limits.max_aliases),
                ErrorCategory::Validation,
            )
            .with_location(location));
        }
        Ok(())
    }

    fn check_variable_defs(&self, document: &Document, variables: &Object) -> Result<(), GraphError> {
        for def in &document.variable_defs {
            let provided = variables.get(&def.name);
            if provided.is_none() && def.default_value.is_none() && def.declared_type.non_null {
                return Err(GraphError::new(
                    format!("required variable ${} was not provided", def.name),
                    ErrorCategory::Validation,
                )
                .with_location(def.location));
            }
            if let Some(json) = provided {
                check_variable_type_consistency(&def.name, &def.declared_type, json, def.location)?;
            }
        }
        Ok(())
    }

    fn resolve_field<'t>(
        &self,
        owner: &'t TypeLookup,
        name: &str,
        location: Location,
    ) -> Result<&'t FieldLookup, GraphError> {
        if name == "__typename" {
            // Synthesized below by the executor; give the planner a
            // lightweight stand-in field so selection validation succeeds.
            return Err(GraphError::new("__typename is resolved by the executor", ErrorCategory::Internal)
                .with_location(location));
        }
        owner.field(name).ok_or_else(|| {
            GraphError::new(
                format!("no field {name} on type {}", owner.name),
                ErrorCategory::Validation,
            )
            .with_location(location)
        })
    }

    fn plan_selection(
        &self,
        type_name: &str,
        filter: &ResultFilter,
        fragments: &[FragmentDef],
        depth: usize,
    ) -> Result<PlannedSelection, GraphError> {
        if depth > self.limits.max_depth {
            return Err(GraphError::new(
                format!("selection set exceeds max depth {}", self.limits.max_depth),
                ErrorCategory::Validation,
            ));
        }

        let Some(owner) = self.registry.lookup(type_name) else {
            return Err(GraphError::new(
                format!("type {type_name} is not registered"),
                ErrorCategory::Internal,
            ));
        };

        let mut fields = Vec::new();
        for result_field in &filter.fields {
            fields.push(self.plan_field(owner, result_field, fragments, depth)?);
        }

        for spread in &filter.fragment_spreads {
            self.merge_fragment_spread(owner, spread, fragments, depth, &mut fields)?;
        }

        Ok(PlannedSelection {
            on_type: owner.name.clone(),
            fields,
        })
    }

    fn plan_field(
        &self,
        owner: &TypeLookup,
        result_field: &ResultField,
        fragments: &[FragmentDef],
        depth: usize,
    ) -> Result<PlannedField, GraphError> {
        if result_field.name == "__typename" {
            return Ok(PlannedField {
                display_name: result_field.display_name().into(),
                field: Arc::new(typename_field()),
                raw_params: Vec::new(),
                location: result_field.location,
                sub_plan: None,
            });
        }

        let field = owner.field(&result_field.name).ok_or_else(|| {
            GraphError::new(
                format!("no field {} on type {}", result_field.name, owner.name),
                ErrorCategory::Validation,
            )
            .with_location(result_field.location)
        })?;

        let sub_plan = match &result_field.sub_filter {
            Some(filter) => Some(self.plan_selection(
                field.declared_type.innermost_name(),
                filter,
                fragments,
                depth + 1,
            )?),
            None if field.is_resolver() || self.registry.lookup(field.declared_type.innermost_name()).is_some_and(|t| {
                matches!(t.kind, crate::registry::type_lookup::TypeKind::Object | crate::registry::type_lookup::TypeKind::Interface | crate::registry::type_lookup::TypeKind::Union)
            }) => {
                return Err(GraphError::new(
                    format!("field {} requires a selection set", result_field.name),
                    ErrorCategory::Validation,
                )
                .with_location(result_field.location))
            }
            None => None,
        };

        Ok(PlannedField {
            display_name: result_field.display_name().into(),
            field: Arc::new(field.clone()),
            raw_params: result_field.params.clone(),
            location: result_field.location,
            sub_plan,
        })
    }

    fn merge_fragment_spread(
        &self,
        owner: &TypeLookup,
        spread: &FragmentSpread,
        fragments: &[FragmentDef],
        depth: usize,
        out: &mut Vec<PlannedField>,
    ) -> Result<(), GraphError> {
        let (on_type, filter) = match spread {
            FragmentSpread::Inline { on_type, filter } => (on_type.as_str(), filter),
            FragmentSpread::Named { name, location } => {
                let def = fragments.iter().find(|f| &f.name == name).ok_or_else(|| {
                    GraphError::new(format!("unknown fragment {name}"), ErrorCategory::Validation)
                        .with_location(*location)
                })?;
                (def.on_type.as_str(), &def.filter)
            }
        };

        // Pivot on `implements`: silently drop the spread if `owner` doesn't
        // implement (or equal) the fragment's target type, rather than
        // erroring.
        let applies = owner.name.as_str() == on_type || owner.implements.contains_key(on_type);
        if !applies {
            return Ok(());
        }

        let planned = self.plan_selection(on_type, filter, fragments, depth)?;
        out.extend(planned.fields);
        Ok(())
    }
}

fn typename_field() -> FieldLookup {
    FieldLookup {
        kind: FieldKind::Plain { index_path: vec![] },
        display_name: "__typename".into(),
        declared_type: crate::registry::type_lookup::TypeRefMeta::named("String"),
        description: None,
        deprecation: crate::registry::type_lookup::Deprecation::Current,
    }
}

fn check_variable_type_consistency(
    name: &str,
    declared: &TypeRef,
    provided: &serde_json::Value,
    location: Location,
) -> Result<(), GraphError> {
    if provided.is_null() {
        if declared.non_null {
            return Err(GraphError::new(
                format!("variable ${name} of type {declared} cannot be null"),
                ErrorCategory::Validation,
            )
            .with_location(location));
        }
        return Ok(());
    }
    if let Some(inner) = &declared.list_of {
        if !provided.is_array() {
            return Err(GraphError::new(
                format!("variable ${name} of type {declared} must be a list"),
                ErrorCategory::Validation,
            )
            .with_location(location));
        }
        for item in provided.as_array().unwrap() {
            check_variable_type_consistency(name, inner, item, location)?;
        }
        return Ok(());
    }
    let matches_scalar = match declared.name.as_str() {
        "String" | "ID" => provided.is_string(),
        "Int" => provided.is_i64() || provided.is_u64(),
        "Float" => provided.is_number(),
        "Boolean" => provided.is_boolean(),
        _ => true, // enums/input objects/custom scalars checked downstream by coercion
    };
    if !matches_scalar {
        return Err(GraphError::new(
            format!("variable ${name} does not match declared type {declared}"),
            ErrorCategory::Validation,
        )
        .with_location(location));
    }
    Ok(())
}
