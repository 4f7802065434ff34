//! The error model: `GraphError`, source locations, graph paths, and the
//! dev/prod sanitizer.

use std::sync::LazyLock;

use derive_more::{Display, Error as DeriveError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::value::Object;

/// Line/column pair pointing into the original request string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// One step into the result shape: a field name or a list index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Category used to tag errors for the error-handler hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Parse,
    Validation,
    InputCoercion,
    ResolverInvocation,
    PanicInResolver,
    Serialization,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::Validation => "validation",
            Self::InputCoercion => "input-coercion",
            Self::ResolverInvocation => "resolver-invocation",
            Self::PanicInResolver => "panic-in-resolver",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Structured, user-visible GraphQL error.
///
/// Carries both the client-safe `extensions` map and a `sensitive_extensions`
/// map that is only ever handed to the error-handler hook, never serialized
/// to the wire.
#[derive(Debug, Display, DeriveError)]
#[display("{message}")]
pub struct GraphError {
    pub message: String,
    pub locations: Vec<Location>,
    pub path: Vec<PathSegment>,
    pub extensions: Object,
    pub sensitive_extensions: Object,
    pub category: ErrorCategory,
    production_message: Option<String>,
    #[error(source)]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GraphError {
    pub fn new(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: Object::new(),
            sensitive_extensions: Object::new(),
            category,
            production_message: None,
            cause: None,
        }
    }

    pub fn with_location(mut self, loc: Location) -> Self {
        // The innermost location is preserved: once a location is recorded
        // at the failure site, callers walking back up the stack must not
        // clobber it.
        if self.locations.is_empty() {
            self.locations.push(loc);
        }
        self
    }

    pub fn with_production_message(mut self, msg: impl Into<String>) -> Self {
        self.production_message = Some(msg.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    pub fn with_sensitive_extension(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.sensitive_extensions.insert(key.into(), value.into());
        self
    }

    /// Prepends a path segment as the error bubbles up through a field,
    /// fragment, or slice element.
    pub fn prepend_path(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }

    /// Supplies a position/location only if none is already recorded.
    pub fn with_location_if_absent(self, loc: Location) -> Self {
        if self.locations.is_empty() {
            self.with_location(loc)
        } else {
            self
        }
    }

    pub fn cause_display(&self) -> Option<String> {
        self.cause.as_ref().map(|c| c.to_string())
    }

    /// Converts a panic payload (as caught by `std::panic::catch_unwind`)
    /// into a `GraphError` with full sensitive extensions.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>, function_name: &str) -> Self {
        let panic_message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        GraphError::new(
            format!("panic in resolver {function_name}: {panic_message}"),
            ErrorCategory::PanicInResolver,
        )
        .with_sensitive_extension("panicValue", panic_message)
        .with_sensitive_extension("functionName", function_name.to_string())
        .with_sensitive_extension("stackTrace", std::backtrace::Backtrace::force_capture().to_string())
    }

    /// Renders the wire-shape JSON object for this error.
    ///
    /// `dev_mode = true` appends the wrapped cause with `: ` and keeps
    /// `sensitiveExtensions`'s *safe* sibling (`extensions`) untouched;
    /// `dev_mode = false` sanitizes instead: dev appends, prod never does.
    pub fn to_wire(&self, dev_mode: bool) -> Json {
        let message = if dev_mode {
            match self.cause_display() {
                Some(cause) => format!("{}: {}", self.message, cause),
                None => self.message.clone(),
            }
        } else {
            self.sanitized_message()
        };

        let mut obj = serde_json::Map::new();
        obj.insert("message".to_string(), Json::String(message));
        if !self.locations.is_empty() {
            let locs: Vec<Json> = self
                .locations
                .iter()
                .map(|l| serde_json::json!({"line": l.line, "column": l.column}))
                .collect();
            obj.insert("locations".to_string(), Json::Array(locs));
        }
        if !self.path.is_empty() {
            let path: Vec<Json> = self
                .path
                .iter()
                .map(|p| match p {
                    PathSegment::Field(name) => Json::String(name.clone()),
                    PathSegment::Index(i) => Json::Number((*i).into()),
                })
                .collect();
            obj.insert("path".to_string(), Json::Array(path));
        }
        if !self.extensions.is_empty() {
            obj.insert(
                "extensions".to_string(),
                Json::Object(self.extensions.clone().into_iter().collect()),
            );
        }
        Json::Object(obj)
    }

    /// Whether `message` trips the sensitive-content regex set.
    pub fn is_sensitive(&self) -> bool {
        SENSITIVE_PATTERNS.iter().any(|re| re.is_match(&self.message))
    }

    fn sanitized_message(&self) -> String {
        if let Some(safe) = &self.production_message {
            return safe.clone();
        }
        if self.is_sensitive() {
            GENERIC_PRODUCTION_MESSAGE.to_string()
        } else {
            self.message.clone()
        }
    }

    /// The full, unsanitized detail map handed to the error-handler hook.
    /// These are only for server-side logging.
    pub fn details(&self) -> Object {
        let mut details = self.sensitive_extensions.clone();
        for (k, v) in self.extensions.clone() {
            details.insert(k, v);
        }
        details.insert("message".to_string(), Json::String(self.message.clone()));
        if let Some(cause) = self.cause_display() {
            details.insert("cause".to_string(), Json::String(cause));
        }
        details
    }
}

pub const GENERIC_PRODUCTION_MESSAGE: &str = "An error occurred while processing the request";

/// Patterns that mark an error message as containing internal detail that
/// must not reach a production client.
static SENSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)panic",
        r"(?i)goroutine",
        r"(?i)runtime error",
        r"(?i)backtrace",
        r"\bsrc[\\/][\w./\\-]+\.rs\b",
        r"(?i)\bdyn\s+any\b",
        r"(?i)std::any",
        r"(?i)reflect",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static sensitive pattern must compile"))
    .collect()
});

/// A function that observes every error before sanitization, receiving its
/// category and unsanitized detail map.
pub type ErrorHandler = Box<dyn Fn(ErrorCategory, &GraphError, &Object) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mode_appends_cause_prod_mode_never_does() {
        let err = GraphError::new("boom", ErrorCategory::Internal)
            .with_cause(std::io::Error::other("disk full"));
        assert_eq!(err.to_wire(true)["message"], "boom: disk full");
        assert_eq!(err.to_wire(false)["message"], "boom");
    }

    #[test]
    fn sensitive_message_is_replaced_in_prod_unless_overridden() {
        let err = GraphError::new("a panic occurred in goroutine 7", ErrorCategory::PanicInResolver);
        assert_eq!(err.to_wire(false)["message"], GENERIC_PRODUCTION_MESSAGE);

        let overridden = err.with_production_message("try again later");
        assert_eq!(overridden.to_wire(false)["message"], "try again later");
    }

    #[test]
    fn sensitive_extensions_are_stripped_from_wire_shape() {
        let err = GraphError::new("oops", ErrorCategory::Internal)
            .with_extension("code", "OOPS")
            .with_sensitive_extension("stackTrace", "...");
        let wire = err.to_wire(false);
        assert_eq!(wire["extensions"]["code"], "OOPS");
        assert!(wire["extensions"].get("stackTrace").is_none());
    }

    #[test]
    fn innermost_location_is_preserved() {
        let err = GraphError::new("x", ErrorCategory::Internal)
            .with_location(Location::new(3, 4))
            .with_location(Location::new(9, 9));
        assert_eq!(err.locations, vec![Location::new(3, 4)]);
    }
}
