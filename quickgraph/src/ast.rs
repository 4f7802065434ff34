//! Request AST, as produced by `parser`.
//!
//! Every node that can anchor an error carries a [`Location`] via
//! [`Spanning`], mirroring a conventional recursive-descent parser's own
//! span-carrying wrapper type.

use std::collections::BTreeMap;

use crate::error::Location;

/// Wraps a node together with the source position it started at.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanning<T> {
    pub item: T,
    pub location: Location,
}

impl<T> Spanning<T> {
    pub fn new(item: T, location: Location) -> Self {
        Self { item, location }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanning<U> {
        Spanning::new(f(self.item), self.location)
    }
}

/// The three GraphQL operation modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationMode {
    Query,
    Mutation,
    Subscription,
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        };
        f.write_str(s)
    }
}

/// A tagged union over the literal value shapes the parser can produce.
///
/// Named `GenericValue` to distinguish it from the resolved, in-memory
/// [`crate::value::Value`].
#[derive(Clone, Debug, PartialEq)]
pub enum GenericValue {
    Variable(String),
    /// Unquoted symbol: `true`, `false`, or an enum member name.
    Identifier(String),
    String(String),
    Int(i64),
    Float(f64),
    List(Vec<Spanning<GenericValue>>),
    Map(BTreeMap<String, Spanning<GenericValue>>),
    Null,
}

impl GenericValue {
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Self::Identifier(s) => Some(s),
            _ => None,
        }
    }
}

/// A declared type literal in the request, e.g. `[String!]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub name: String,
    pub non_null: bool,
    pub list_of: Option<Box<TypeRef>>,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            non_null: false,
            list_of: None,
        }
    }

    pub fn non_null(mut self) -> Self {
        self.non_null = true;
        self
    }

    pub fn list(inner: TypeRef) -> Self {
        Self {
            name: String::new(),
            non_null: false,
            list_of: Some(Box::new(inner)),
        }
    }

    /// The innermost named type, unwrapping lists and non-null markers.
    pub fn innermost_name(&self) -> &str {
        match &self.list_of {
            Some(inner) => inner.innermost_name(),
            None => &self.name,
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.list_of {
            Some(inner) => write!(f, "[{inner}]")?,
            None => write!(f, "{}", self.name)?,
        }
        if self.non_null {
            write!(f, "!")?;
        }
        Ok(())
    }
}

/// One named, positional-or-not parameter passed to a field/command.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamValue {
    pub name: String,
    pub value: Spanning<GenericValue>,
}

/// A selected field within a [`ResultFilter`].
#[derive(Clone, Debug, PartialEq)]
pub struct ResultField {
    pub alias: Option<String>,
    pub name: String,
    pub params: Vec<ParamValue>,
    pub directives: Vec<Directive>,
    pub sub_filter: Option<ResultFilter>,
    pub location: Location,
}

impl ResultField {
    /// The name results are keyed by in the output object: the alias if
    /// present, else the field name.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    pub name: String,
    pub params: Vec<ParamValue>,
}

/// A fragment spread: `...Name` or inline `... on Type { ... }`.
#[derive(Clone, Debug, PartialEq)]
pub enum FragmentSpread {
    Named { name: String, location: Location },
    Inline { on_type: String, filter: ResultFilter },
}

/// The `{...}` selection set following a field or root command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultFilter {
    pub fields: Vec<ResultField>,
    pub fragment_spreads: Vec<FragmentSpread>,
}

/// A named fragment definition: `fragment Name on Type { ... }`.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentDef {
    pub name: String,
    pub on_type: String,
    pub filter: ResultFilter,
}

/// A root-level field invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub alias: Option<String>,
    pub name: String,
    pub params: Vec<ParamValue>,
    pub result_filter: Option<ResultFilter>,
    pub location: Location,
}

impl Command {
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A declared `$variable: Type = default` from the operation definition.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDef {
    pub name: String,
    pub declared_type: TypeRef,
    pub default_value: Option<Spanning<GenericValue>>,
    pub location: Location,
}

/// The full parsed request.
///
/// The raw operation keyword is carried verbatim (`None` for the shorthand
/// `{ ... }` form); classifying it into an [`OperationMode`] is the
/// planner's job, not the parser's — an unrecognized keyword is a
/// *validation* error, not a syntax error.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub operation_keyword: Option<Spanning<String>>,
    pub operation_name: Option<String>,
    pub variable_defs: Vec<VariableDef>,
    pub commands: Vec<Command>,
    pub fragments: Vec<FragmentDef>,
    pub start_location: Location,
}
