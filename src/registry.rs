use std::cmp::Reverse;
use std::fmt;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use crate::value::{BigInt, Value};

pub(crate) const BUILTIN_NAMES: [&str; 7] = [
    "temporal-instant",
    "arbitrary-precision-integer",
    "ordered-pair-collection",
    "unique-element-collection",
    "pattern-match",
    "resource-locator",
    "exception-record",
];

/// Failure inside a transformer's own serialize/deserialize. The codec
/// propagates these to the caller without wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        TransformError { message: message.into() }
    }
}

impl Display for TransformError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TransformError: {}", self.message)
    }
}

impl std::error::Error for TransformError {}

/// A named, prioritized, bidirectional conversion between a non-JSON-native
/// value and a JSON-representable shape.
///
/// `serialize` output may itself contain extended values; the codec recurses
/// into it and annotates them at deeper paths.
pub trait TypeTransformer {
    fn name(&self) -> &str;
    /// Higher priorities are checked first when several transformers could
    /// claim the same value.
    fn priority(&self) -> i32;
    fn is_applicable(&self, value: &Value) -> bool;
    fn serialize(&self, value: &Value) -> Result<Value, TransformError>;
    fn deserialize(&self, value: Value) -> Result<Value, TransformError>;
}

/// A caller-owned, priority-ordered set of transformers.
///
/// `register` replaces any transformer with the same name; the live set is
/// kept sorted descending by priority, so applicability checks do not depend
/// on registration order. Lookups are linear scans over a registry-sized
/// vector.
pub struct TypeRegistry {
    transformers: Vec<Box<dyn TypeTransformer>>,
}

impl TypeRegistry {
    /// An empty registry with no built-ins.
    pub fn new() -> Self {
        TypeRegistry { transformers: Vec::new() }
    }

    pub fn register(&mut self, transformer: Box<dyn TypeTransformer>) {
        self.transformers.retain(|t| t.name() != transformer.name());
        self.transformers.push(transformer);
        self.transformers.sort_by_key(|t| Reverse(t.priority()));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.transformers.len();
        self.transformers.retain(|t| t.name() != name);
        self.transformers.len() != before
    }

    /// First transformer claiming `value`, in priority-descending order.
    pub fn find_applicable(&self, value: &Value) -> Option<&dyn TypeTransformer> {
        self.transformers.iter().find(|t| t.is_applicable(value)).map(|t| t.as_ref())
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn TypeTransformer> {
        self.transformers.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl Default for TypeRegistry {
    /// A registry seeded with the built-in transformers.
    fn default() -> Self {
        let mut registry = TypeRegistry::new();
        registry.register(Box::new(InstantTransformer));
        registry.register(Box::new(BigIntTransformer));
        registry.register(Box::new(MapTransformer));
        registry.register(Box::new(SetTransformer));
        registry.register(Box::new(PatternTransformer));
        registry.register(Box::new(UrlTransformer));
        registry.register(Box::new(ErrorRecordTransformer));
        registry
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.transformers.iter().map(|t| t.name())).finish()
    }
}

struct InstantTransformer;

impl TypeTransformer for InstantTransformer {
    fn name(&self) -> &str { "temporal-instant" }
    fn priority(&self) -> i32 { 100 }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Instant(_))
    }

    fn serialize(&self, value: &Value) -> Result<Value, TransformError> {
        match value {
            Value::Instant(instant) => {
                Ok(Value::String(instant.to_rfc3339_opts(SecondsFormat::Millis, true)))
            }
            other => Err(TransformError::new(format!("temporal-instant: not an instant: {:?}", other))),
        }
    }

    fn deserialize(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::String(text) => {
                DateTime::parse_from_rfc3339(&text)
                    .map(|instant| Value::Instant(instant.with_timezone(&Utc)))
                    .map_err(|e| TransformError::new(format!("temporal-instant: {}: {:?}", e, text)))
            }
            other => Err(TransformError::new(format!("temporal-instant: expected a string, got {:?}", other))),
        }
    }
}

struct BigIntTransformer;

impl TypeTransformer for BigIntTransformer {
    fn name(&self) -> &str { "arbitrary-precision-integer" }
    fn priority(&self) -> i32 { 90 }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::BigInt(_))
    }

    fn serialize(&self, value: &Value) -> Result<Value, TransformError> {
        match value {
            Value::BigInt(big) => Ok(Value::String(big.as_str().to_string())),
            other => Err(TransformError::new(format!("arbitrary-precision-integer: not a big integer: {:?}", other))),
        }
    }

    fn deserialize(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::String(digits) => {
                BigInt::new(&digits)
                    .map(Value::BigInt)
                    .ok_or_else(|| TransformError::new(format!("arbitrary-precision-integer: invalid digits {:?}", digits)))
            }
            other => Err(TransformError::new(format!("arbitrary-precision-integer: expected a string, got {:?}", other))),
        }
    }
}

struct MapTransformer;

impl TypeTransformer for MapTransformer {
    fn name(&self) -> &str { "ordered-pair-collection" }
    fn priority(&self) -> i32 { 80 }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Map(_))
    }

    fn serialize(&self, value: &Value) -> Result<Value, TransformError> {
        match value {
            Value::Map(pairs) => {
                Ok(Value::Array(
                    pairs.iter()
                        .map(|(key, val)| Value::Array(vec![key.clone(), val.clone()]))
                        .collect(),
                ))
            }
            other => Err(TransformError::new(format!("ordered-pair-collection: not a map: {:?}", other))),
        }
    }

    fn deserialize(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Array(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry {
                        Value::Array(pair) if pair.len() == 2 => {
                            let mut pair = pair.into_iter();
                            if let (Some(key), Some(val)) = (pair.next(), pair.next()) {
                                pairs.push((key, val));
                            }
                        }
                        other => {
                            return Err(TransformError::new(format!("ordered-pair-collection: expected [key, value] pair, got {:?}", other)))
                        }
                    }
                }
                Ok(Value::Map(pairs))
            }
            other => Err(TransformError::new(format!("ordered-pair-collection: expected an array, got {:?}", other))),
        }
    }
}

struct SetTransformer;

impl TypeTransformer for SetTransformer {
    fn name(&self) -> &str { "unique-element-collection" }
    fn priority(&self) -> i32 { 70 }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Set(_))
    }

    fn serialize(&self, value: &Value) -> Result<Value, TransformError> {
        match value {
            Value::Set(elements) => Ok(Value::Array(elements.clone())),
            other => Err(TransformError::new(format!("unique-element-collection: not a set: {:?}", other))),
        }
    }

    fn deserialize(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Array(elements) => Ok(Value::Set(elements)),
            other => Err(TransformError::new(format!("unique-element-collection: expected an array, got {:?}", other))),
        }
    }
}

struct PatternTransformer;

impl TypeTransformer for PatternTransformer {
    fn name(&self) -> &str { "pattern-match" }
    fn priority(&self) -> i32 { 60 }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Pattern { .. })
    }

    fn serialize(&self, value: &Value) -> Result<Value, TransformError> {
        match value {
            Value::Pattern { source, flags } => {
                Ok(Value::Object(vec![
                    ("source".to_string(), Value::String(source.clone())),
                    ("flags".to_string(), Value::String(flags.clone())),
                ]))
            }
            other => Err(TransformError::new(format!("pattern-match: not a pattern: {:?}", other))),
        }
    }

    fn deserialize(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Object(pairs) => {
                let mut source = None;
                let mut flags = String::new();
                for (key, val) in pairs {
                    match (key.as_str(), val) {
                        ("source", Value::String(s)) => source = Some(s),
                        ("flags", Value::String(s)) => flags = s,
                        _ => {}
                    }
                }
                match source {
                    Some(source) => Ok(Value::Pattern { source, flags }),
                    None => Err(TransformError::new("pattern-match: missing 'source' field")),
                }
            }
            other => Err(TransformError::new(format!("pattern-match: expected an object, got {:?}", other))),
        }
    }
}

struct UrlTransformer;

impl TypeTransformer for UrlTransformer {
    fn name(&self) -> &str { "resource-locator" }
    fn priority(&self) -> i32 { 50 }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Url(_))
    }

    fn serialize(&self, value: &Value) -> Result<Value, TransformError> {
        match value {
            Value::Url(url) => Ok(Value::String(url.as_str().to_string())),
            other => Err(TransformError::new(format!("resource-locator: not a URL: {:?}", other))),
        }
    }

    fn deserialize(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::String(text) => {
                Url::parse(&text)
                    .map(Value::Url)
                    .map_err(|e| TransformError::new(format!("resource-locator: {}: {:?}", e, text)))
            }
            other => Err(TransformError::new(format!("resource-locator: expected a string, got {:?}", other))),
        }
    }
}

struct ErrorRecordTransformer;

impl TypeTransformer for ErrorRecordTransformer {
    fn name(&self) -> &str { "exception-record" }
    fn priority(&self) -> i32 { 40 }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::ErrorRecord { .. })
    }

    fn serialize(&self, value: &Value) -> Result<Value, TransformError> {
        match value {
            Value::ErrorRecord { name, message, stack } => {
                let mut pairs = vec![
                    ("name".to_string(), Value::String(name.clone())),
                    ("message".to_string(), Value::String(message.clone())),
                ];
                if let Some(stack) = stack {
                    pairs.push(("stack".to_string(), Value::String(stack.clone())));
                }
                Ok(Value::Object(pairs))
            }
            other => Err(TransformError::new(format!("exception-record: not an error record: {:?}", other))),
        }
    }

    fn deserialize(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Object(pairs) => {
                let mut name = None;
                let mut message = None;
                let mut stack = None;
                for (key, val) in pairs {
                    match (key.as_str(), val) {
                        ("name", Value::String(s)) => name = Some(s),
                        ("message", Value::String(s)) => message = Some(s),
                        ("stack", Value::String(s)) => stack = Some(s),
                        _ => {}
                    }
                }
                match (name, message) {
                    (Some(name), Some(message)) => Ok(Value::ErrorRecord { name, message, stack }),
                    _ => Err(TransformError::new("exception-record: missing 'name' or 'message' field")),
                }
            }
            other => Err(TransformError::new(format!("exception-record: expected an object, got {:?}", other))),
        }
    }
}
