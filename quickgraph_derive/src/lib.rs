//! Derive macros for `quickgraph`: `#[derive(GraphQLObject)]` and
//! `#[derive(GraphQLEnum)]` generate the `Describe`/`ArgsMeta` impls a
//! hand-written `Describe` implementation would otherwise require, driven by
//! container and per-field `#[graphql(...)]` attributes with doc comments
//! as descriptions.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

#[proc_macro_derive(GraphQLObject, attributes(graphql))]
pub fn derive_graphql_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_object(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

#[proc_macro_derive(GraphQLEnum, attributes(graphql))]
pub fn derive_graphql_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_enum(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// A container's resolved `#[graphql(...)]` + doc-comment metadata.
struct ContainerMeta {
    name: String,
    description: Option<String>,
    /// `#[graphql(interface_only)]`: register this type as a `TypeKind::Interface`
    /// rather than `TypeKind::Object` — no concrete object type is emitted for
    /// it, only the `interface X { ... }` block; implementors still pick it up
    /// via `record_implements` when they flatten-embed it.
    interface_only: bool,
}

fn container_meta(input: &DeriveInput) -> syn::Result<ContainerMeta> {
    let mut name = input.ident.to_string();
    let mut description = doc_comment(&input.attrs);
    let mut interface_only = false;
    for attr in &input.attrs {
        if !attr.path().is_ident("graphql") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = meta.value()?.parse::<LitStr>()?.value();
            } else if meta.path.is_ident("description") {
                description = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("interface_only") {
                interface_only = true;
            }
            Ok(())
        })?;
    }
    Ok(ContainerMeta { name, description, interface_only })
}

/// A field's resolved `#[graphql(...)]` + doc-comment metadata.
struct FieldMeta {
    skip: bool,
    flatten: bool,
    name: String,
    description: Option<String>,
    deprecated: Option<Option<String>>,
}

fn field_meta(field: &syn::Field) -> syn::Result<FieldMeta> {
    let mut name = field
        .ident
        .as_ref()
        .expect("GraphQLObject only supports named-field structs")
        .to_string();
    let mut skip = false;
    let mut flatten = false;
    let mut description = doc_comment(&field.attrs);
    let mut deprecated = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("graphql") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
            } else if meta.path.is_ident("flatten") {
                flatten = true;
            } else if meta.path.is_ident("name") {
                name = meta.value()?.parse::<LitStr>()?.value();
            } else if meta.path.is_ident("description") {
                description = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("deprecated") {
                deprecated = Some(if meta.input.peek(syn::Token![=]) {
                    Some(meta.value()?.parse::<LitStr>()?.value())
                } else {
                    None
                });
            }
            Ok(())
        })?;
    }
    Ok(FieldMeta { skip, flatten, name, description, deprecated })
}

/// The first line of a `#[doc = "..."]` attribute chain, treated as the
/// type's GraphQL description.
fn doc_comment(attrs: &[syn::Attribute]) -> Option<String> {
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        if let syn::Meta::NameValue(nv) = &attr.meta {
            if let syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Str(s), .. }) = &nv.value {
                let line = s.value().trim().to_string();
                if !line.is_empty() {
                    return Some(line);
                }
            }
        }
    }
    None
}

fn deprecation_tokens(deprecated: &Option<Option<String>>) -> TokenStream2 {
    match deprecated {
        None => quote! { ::quickgraph::registry::type_lookup::Deprecation::Current },
        Some(None) => quote! { ::quickgraph::registry::type_lookup::Deprecation::Deprecated(None) },
        Some(Some(reason)) => {
            quote! { ::quickgraph::registry::type_lookup::Deprecation::Deprecated(Some(#reason.into())) }
        }
    }
}

fn description_tokens(description: &Option<String>) -> TokenStream2 {
    match description {
        Some(d) => quote! { Some(#d.into()) },
        None => quote! { None },
    }
}

fn named_fields(data: &Data, span: proc_macro2::Span) -> syn::Result<&syn::FieldsNamed> {
    match data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(fields) => Ok(fields),
            _ => Err(syn::Error::new(span, "GraphQLObject requires a struct with named fields")),
        },
        _ => Err(syn::Error::new(span, "GraphQLObject can only be derived for structs")),
    }
}

fn expand_object(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let container = container_meta(input)?;
    let type_name = container.name;
    let type_description = description_tokens(&container.description);
    let fields = named_fields(&input.data, input.ident.span().into())?;

    // A declared name ending in the literal suffix `Union` registers the
    // type as a union instead of an object, one member per non-skipped
    // field, with the suffix trimmed from the visible schema name.
    let is_union = type_name.ends_with("Union");
    let registered_name = if is_union {
        type_name.strip_suffix("Union").unwrap().to_string()
    } else {
        type_name.clone()
    };
    let type_kind = if is_union {
        quote! { ::quickgraph::registry::type_lookup::TypeKind::Union }
    } else if container.interface_only {
        quote! { ::quickgraph::registry::type_lookup::TypeKind::Interface }
    } else {
        quote! { ::quickgraph::registry::type_lookup::TypeKind::Object }
    };

    let mut describe_prelude = Vec::new();
    let mut describe_inserts = Vec::new();
    let mut describe_implements = Vec::new();
    let mut param_metas = Vec::new();

    for (index, field) in fields.named.iter().enumerate() {
        let meta = field_meta(field)?;
        if meta.skip {
            continue;
        }
        let field_ty = &field.ty;
        let exposed_name = &meta.name;
        let var = format_ident!("__field_ty_{index}");

        if is_union {
            describe_prelude.push(quote! {
                let #var = <#field_ty as ::quickgraph::Describe>::describe(registry);
            });
            describe_inserts.push(quote! {
                assert!(
                    #var.is_nullable_or_container(),
                    concat!(
                        "union member field `", #exposed_name, "` on ", #registered_name,
                        "Union must be nullable (Option<T>, Vec<T>, ...) so nullability disambiguates the active variant"
                    )
                );
                t.union_members.insert(#var.name.clone(), #var.clone());
            });
            continue;
        }

        if meta.flatten {
            let embedded_fields_var = format_ident!("__embedded_fields_{index}");
            describe_prelude.push(quote! {
                let #var = <#field_ty as ::quickgraph::Describe>::describe(registry);
                let #embedded_fields_var = registry
                    .lookup(#var.innermost_name())
                    .map(|owner| owner.fields.iter().map(|(n, f)| (n.clone(), f.clone())).collect())
                    .unwrap_or_default();
            });
            describe_inserts.push(quote! {
                for (field_name, field_lookup) in #embedded_fields_var {
                    t.insert_field(field_name, field_lookup);
                }
            });
            describe_implements.push(quote! {
                registry.record_implements(name.as_str(), #var.innermost_name());
            });
            continue;
        }

        let description = description_tokens(&meta.description);
        let deprecation = deprecation_tokens(&meta.deprecated);
        describe_prelude.push(quote! {
            let #var = <#field_ty as ::quickgraph::Describe>::describe(registry);
        });
        describe_inserts.push(quote! {
            t.insert_field(
                #exposed_name.into(),
                ::quickgraph::registry::type_lookup::FieldLookup {
                    kind: ::quickgraph::registry::type_lookup::FieldKind::Plain { index_path: vec![#index] },
                    display_name: #exposed_name.into(),
                    declared_type: #var,
                    description: #description,
                    deprecation: #deprecation,
                },
            );
        });

        let required = quote! { !#var.optional };
        param_metas.push(quote! {
            {
                let declared_type = #var.clone();
                let required = #required;
                params.push(::quickgraph::registry::function_registry::ParamMeta {
                    name: #exposed_name.into(),
                    index: #index,
                    declared_type,
                    required,
                });
            }
        });
    }

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::quickgraph::Describe for #ident #ty_generics #where_clause {
            fn describe(registry: &mut ::quickgraph::registry::TypeRegistry) -> ::quickgraph::registry::type_lookup::TypeRefMeta {
                registry.resolve_object(#registered_name, #type_kind, |registry, name| {
                    #(#describe_prelude)*
                    let t = registry.lookup_mut(&name).unwrap();
                    t.description = #type_description;
                    #(#describe_inserts)*
                    #(#describe_implements)*
                })
            }
        }

        #[automatically_derived]
        impl #impl_generics ::quickgraph::ArgsMeta for #ident #ty_generics #where_clause {
            fn param_metas(registry: &mut ::quickgraph::registry::TypeRegistry) -> Vec<::quickgraph::registry::function_registry::ParamMeta> {
                #(#describe_prelude)*
                let mut params = Vec::new();
                #(#param_metas)*
                params
            }
        }
    })
}

fn expand_enum(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let container = container_meta(input)?;
    let type_name = container.name;
    let type_description = description_tokens(&container.description);

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new(input.ident.span(), "GraphQLEnum can only be derived for enums"));
    };

    let mut values = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(variant.ident.span(), "GraphQLEnum only supports fieldless (unit) variants"));
        }
        let mut name = variant.ident.to_string();
        let mut description = doc_comment(&variant.attrs);
        let mut deprecated = None;
        for attr in &variant.attrs {
            if !attr.path().is_ident("graphql") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    name = meta.value()?.parse::<LitStr>()?.value();
                } else if meta.path.is_ident("description") {
                    description = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("deprecated") {
                    deprecated = Some(if meta.input.peek(syn::Token![=]) {
                        Some(meta.value()?.parse::<LitStr>()?.value())
                    } else {
                        None
                    });
                }
                Ok(())
            })?;
        }
        let description = description_tokens(&description);
        let deprecation = deprecation_tokens(&deprecated);
        values.push(quote! {
            ::quickgraph::registry::type_lookup::EnumValueMeta {
                name: #name.into(),
                description: #description,
                deprecation: #deprecation,
            }
        });
    }

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::quickgraph::Describe for #ident #ty_generics #where_clause {
            fn describe(registry: &mut ::quickgraph::registry::TypeRegistry) -> ::quickgraph::registry::type_lookup::TypeRefMeta {
                registry.resolve_object(#type_name, ::quickgraph::registry::type_lookup::TypeKind::Enum, |registry, name| {
                    let t = registry.lookup_mut(&name).unwrap();
                    t.description = #type_description;
                    t.enum_values = vec![#(#values),*];
                })
            }
        }
    })
}
