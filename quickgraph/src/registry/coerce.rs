//! Input coercion: AST literals/variables to in-memory [`Value`]s, against a
//! declared [`TypeRefMeta`].

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::ast::GenericValue;
use crate::error::{ErrorCategory, GraphError, Location};
use crate::registry::type_lookup::{TypeKind, TypeRefMeta};
use crate::registry::TypeRegistry;
use crate::value::{Object, Value};

/// Converts a `serde_json::Value` (as produced by a resolver's
/// `serde::Serialize` impl, or parsed from the request's `variables` object)
/// into the engine's runtime [`Value`] representation.
pub fn json_to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        Json::Object(map) => Value::Object(map.into_iter().collect::<Object>()),
    }
}

pub fn value_to_json(value: Value) -> Json {
    value.into_json()
}

/// Coerces one AST value against a declared type.
///
/// `variables` is the request's already-JSON-decoded `variables` object;
/// `registry` is consulted for enum-member validation and map-field
/// declared types.
pub fn coerce_value(
    ast_value: &GenericValue,
    declared: &TypeRefMeta,
    variables: &Object,
    registry: &TypeRegistry,
    location: Location,
) -> Result<Value, GraphError> {
    if let GenericValue::Variable(name) = ast_value {
        return match variables.get(name) {
            Some(json) => match registry.scalar_hooks(declared.innermost_name()) {
                // Variable-sourced values are already JSON by the time they
                // reach here, so they're routed through `ParseValue`, never
                // `ParseLiteral` — the two hooks are selected by provenance.
                Some(hooks) => (hooks.parse_value)(json).map_err(|e| e.with_location_if_absent(location)),
                None => Ok(json_to_value(json.clone())),
            },
            None => Ok(Value::Null),
        };
    }

    if let Some(hooks) = registry.scalar_hooks(declared.innermost_name()) {
        if !matches!(ast_value, GenericValue::Null) {
            return (hooks.parse_literal)(ast_value).map_err(|e| e.with_location_if_absent(location));
        }
    }

    if let Some(list_inner) = &declared.list_of {
        return match ast_value {
            GenericValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(coerce_value(&item.item, list_inner, variables, registry, location)?);
                }
                Ok(Value::List(out))
            }
            GenericValue::Null => Ok(Value::Null),
            // A single value coerces into a one-element list, matching the
            // usual GraphQL list-coercion convention.
            other => Ok(Value::List(vec![coerce_value(
                other, list_inner, variables, registry, location,
            )?])),
        };
    }

    match ast_value {
        GenericValue::Null => Ok(Value::Null),
        GenericValue::String(s) => Ok(Value::String(s.clone())),
        GenericValue::Identifier(name) => coerce_identifier(name, declared, registry, location),
        GenericValue::Int(i) => coerce_int(*i, declared, location),
        GenericValue::Float(f) => Ok(Value::Float(*f)),
        GenericValue::List(items) => {
            // Declared type isn't a list but the literal is: pass through
            // element-wise so custom scalars backed by a JSON array still work.
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(coerce_value(&item.item, declared, variables, registry, location)?);
            }
            Ok(Value::List(out))
        }
        GenericValue::Map(members) => coerce_map(members, declared, variables, registry, location),
        GenericValue::Variable(_) => unreachable!("handled above"),
    }
}

fn coerce_identifier(
    name: &str,
    declared: &TypeRefMeta,
    registry: &TypeRegistry,
    location: Location,
) -> Result<Value, GraphError> {
    match name {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Some(type_lookup) = registry.lookup(declared.innermost_name()) {
        if type_lookup.kind == TypeKind::Enum {
            let known = type_lookup.enum_values.iter().any(|v| v.name.as_str() == name);
            if !known {
                return Err(GraphError::new(
                    format!("{name} is not a member of enum {}", type_lookup.name),
                    ErrorCategory::InputCoercion,
                )
                .with_location(location));
            }
        }
    }
    Ok(Value::String(name.to_string()))
}

/// Every Rust integer width `Describe`s to the single scalar name `Int`
/// (see `registry::describe`), so the only width worth enforcing here is
/// GraphQL's own 32-bit signed `Int` bound; `ID` stays unclamped since it's
/// conventionally opaque.
fn coerce_int(i: i64, declared: &TypeRefMeta, location: Location) -> Result<Value, GraphError> {
    match declared.innermost_name() {
        "ID" => Ok(Value::Int(i)),
        "Float" => Ok(Value::Float(i as f64)),
        "Int" => {
            if i < i32::MIN as i64 || i > i32::MAX as i64 {
                return Err(GraphError::new(
                    format!("value {i} overflows Int"),
                    ErrorCategory::InputCoercion,
                )
                .with_location(location));
            }
            Ok(Value::Int(i))
        }
        _ => Ok(Value::Int(i)),
    }
}

fn coerce_map(
    members: &BTreeMap<String, crate::ast::Spanning<GenericValue>>,
    declared: &TypeRefMeta,
    variables: &Object,
    registry: &TypeRegistry,
    location: Location,
) -> Result<Value, GraphError> {
    let Some(type_lookup) = registry.lookup(declared.innermost_name()) else {
        // No known input-object shape registered for this name: coerce each
        // member independently with no declared-field cross-check.
        let mut out = Object::new();
        for (k, v) in members {
            out.insert(
                k.clone(),
                value_to_json(coerce_value(&v.item, &TypeRefMeta::named("String"), variables, registry, location)?),
            );
        }
        return Ok(Value::Object(out));
    };

    let mut out = Object::new();
    for (field_name, field) in &type_lookup.fields {
        // Member lookup is tag-based-then-declared-name: an explicit member
        // present under the field's exact name wins; a required field with
        // no member present is an error.
        match members.get(field_name.as_str()) {
            Some(v) => {
                let coerced = coerce_value(&v.item, &field.declared_type, variables, registry, location)?;
                out.insert(field_name.to_string(), value_to_json(coerced));
            }
            None if !field.declared_type.optional => {
                return Err(GraphError::new(
                    format!("required member {field_name} missing on input object {}", type_lookup.name),
                    ErrorCategory::InputCoercion,
                )
                .with_location(location));
            }
            None => {}
        }
    }
    Ok(Value::Object(out))
}
