//! The SDL emitter: a deterministic printer over the live [`TypeRegistry`],
//! building the same query/mutation/subscription root triad a `schema { ... }`
//! block declares.

use itertools::Itertools;

use crate::registry::type_lookup::{FieldKind, FieldLookup, TypeKind, TypeLookup};
use crate::registry::{TypeRegistry, MUTATION_ROOT, QUERY_ROOT, SUBSCRIPTION_ROOT};

/// Prints the full SDL document for a registry: alphabetical within each
/// kind category, fields alphabetical within a type.
pub fn print_schema(registry: &TypeRegistry) -> String {
    let mut out = String::new();

    print_schema_block(&mut out, registry);

    for kind in [TypeKind::Scalar, TypeKind::Enum, TypeKind::Interface, TypeKind::Union, TypeKind::Object] {
        for t in registry.all_types().filter(|t| t.kind == kind).sorted_by_key(|t| t.name.as_str()) {
            print_type(&mut out, t);
        }
    }

    out
}

fn print_schema_block(out: &mut String, registry: &TypeRegistry) {
    let roots: Vec<(&str, &str)> = [("query", QUERY_ROOT), ("mutation", MUTATION_ROOT), ("subscription", SUBSCRIPTION_ROOT)]
        .into_iter()
        .filter(|(_, root)| registry.lookup(root).is_some_and(|t| !t.fields.is_empty()))
        .collect();
    if roots.is_empty() {
        return;
    }
    out.push_str("schema {\n");
    for (keyword, root) in roots {
        out.push_str(&format!("  {keyword}: {root}\n"));
    }
    out.push_str("}\n\n");
}

fn print_description(out: &mut String, description: Option<&str>, indent: &str) {
    if let Some(desc) = description {
        out.push_str(indent);
        out.push_str("\"\"\"\n");
        for line in desc.lines() {
            out.push_str(indent);
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(indent);
        out.push_str("\"\"\"\n");
    }
}

fn print_deprecated(field: &FieldLookup) -> String {
    match field.deprecation.reason() {
        Some(reason) => format!(" @deprecated(reason: \"{reason}\")"),
        None if field.deprecation.is_deprecated() => " @deprecated".to_string(),
        None => String::new(),
    }
}

fn print_type(out: &mut String, t: &TypeLookup) {
    print_description(out, t.description.as_deref(), "");
    match t.kind {
        TypeKind::Scalar => {
            out.push_str(&format!("scalar {}\n\n", t.name));
        }
        TypeKind::Enum => {
            out.push_str(&format!("enum {} {{\n", t.name));
            for value in t.enum_values.iter().sorted_by_key(|v| v.name.as_str()) {
                print_description(out, value.description.as_deref(), "  ");
                let deprecated = match value.deprecation.reason() {
                    Some(reason) => format!(" @deprecated(reason: \"{reason}\")"),
                    None if value.deprecation.is_deprecated() => " @deprecated".to_string(),
                    None => String::new(),
                };
                out.push_str(&format!("  {}{}\n", value.name, deprecated));
            }
            out.push_str("}\n\n");
        }
        TypeKind::Union => {
            let members: Vec<String> = t.union_members.keys().map(|k| k.to_string()).collect();
            out.push_str(&format!("union {} = {}\n\n", t.name, members.join(" | ")));
        }
        TypeKind::Interface => {
            out.push_str(&format!("interface {} {{\n", t.name));
            print_fields(out, t);
            out.push_str("}\n\n");
        }
        TypeKind::Object => {
            if t.implements.is_empty() {
                out.push_str(&format!("type {} {{\n", t.name));
            } else {
                let implements: Vec<String> = t.implements.keys().map(|k| k.to_string()).collect();
                out.push_str(&format!("type {} implements {} {{\n", t.name, implements.join(" & ")));
            }
            print_fields(out, t);
            out.push_str("}\n\n");
        }
    }
}

fn print_fields(out: &mut String, t: &TypeLookup) {
    for field in t.fields.values().sorted_by_key(|f| f.display_name.as_str()) {
        print_description(out, field.description.as_deref(), "  ");
        let args = match &field.kind {
            FieldKind::Resolver(function) if !function.params.is_empty() => {
                let rendered = function
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, render_type_ref(&p.declared_type, p.required)))
                    .join(", ");
                format!("({rendered})")
            }
            _ => String::new(),
        };
        let ty = render_type_ref(&field.declared_type, !field.declared_type.optional);
        out.push_str(&format!("  {}{}: {}{}\n", field.display_name, args, ty, print_deprecated(field)));
    }
}

fn render_type_ref(ty: &crate::registry::type_lookup::TypeRefMeta, non_null: bool) -> String {
    let inner = match &ty.list_of {
        Some(list) => format!("[{}]", render_type_ref(list, !list.optional)),
        None => ty.name.to_string(),
    };
    if non_null {
        format!("{inner}!")
    } else {
        inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::type_lookup::{Deprecation, FieldLookup, TypeRefMeta};

    #[test]
    fn prints_scalar_and_object_blocks_alphabetically() {
        let mut registry = TypeRegistry::new();
        registry.ensure_scalar("Boolean");
        registry.resolve_object("Course", TypeKind::Object, |registry, name| {
            let t = registry.lookup_mut(&name).unwrap();
            t.insert_field(
                "title".into(),
                FieldLookup {
                    kind: FieldKind::Plain { index_path: vec![0] },
                    display_name: "title".into(),
                    declared_type: TypeRefMeta::named("String").optional(),
                    description: None,
                    deprecation: Deprecation::Current,
                },
            );
        });
        let sdl = print_schema(&registry);
        assert!(sdl.contains("scalar Boolean"));
        assert!(sdl.contains("type Course {\n  title: String\n}"));
    }
}
