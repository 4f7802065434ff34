//! Runtime GraphQL value representation.
//!
//! Distinct from `ast::GenericValue` (which carries source-position/AST
//! shape): `Value` has already been coerced/resolved and carries no
//! location info.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as Json;

/// An ordered string-keyed map, backed by an insertion-ordered map so field
/// order in `data` is at least deterministic per-execution, even though
/// ordering is not otherwise part of the contract.
pub type Object = IndexMap<String, Json>;

/// A resolved GraphQL value, as produced by a resolver and shaped for
/// serialization into the `data` object.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(Object),
}

impl Value {
    pub fn null() -> Self {
        Self::Null
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Converts into the `serde_json::Value` that becomes the `data` field
    /// (or an element within it) of the wire response.
    pub fn into_json(self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(b),
            Self::Int(i) => Json::Number(i.into()),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::String(s) => Json::String(s),
            Self::List(l) => Json::Array(l.into_iter().map(Value::into_json).collect()),
            Self::Object(o) => Json::Object(o.into_iter().collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Int(v as i64)
            }
        })*
    };
}
impl_from_int!(i8, i16, i32, i64, u8, u16, u32, isize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}
