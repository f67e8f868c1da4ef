use std::fmt;
use std::fmt::{Display, Formatter};

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::registry::{TransformError, TypeRegistry};
use crate::value::{Annotation, AnnotationMap, Meta, PathSegment, TypedJson, Value};

#[derive(Debug)]
pub enum CodecError {
    /// An annotation named a transformer absent from the registry in use.
    /// Never swallowed: silently returning the untransformed shape would
    /// break the round-trip guarantee.
    UnknownTypeTransformer { name: String, path: String },
    /// A transformer's own failure, propagated without wrapping.
    Transform(TransformError),
    /// Envelope text that is not valid JSON at all.
    Parse(serde_json::Error),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnknownTypeTransformer { name, path } => {
                write!(f, "CodecError: no transformer registered under {:?} (annotation at path {:?})", name, path)
            }
            CodecError::Transform(e) => write!(f, "{}", e),
            CodecError::Parse(e) => write!(f, "CodecError: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Transform(e) => Some(e),
            CodecError::Parse(e) => Some(e),
            CodecError::UnknownTypeTransformer { .. } => None,
        }
    }
}

impl From<TransformError> for CodecError {
    fn from(e: TransformError) -> Self {
        CodecError::Transform(e)
    }
}

/// Serializes a value tree into strict JSON plus path-keyed annotations.
pub fn to_envelope(value: &Value, registry: &TypeRegistry) -> Result<TypedJson, CodecError> {
    let mut annotations = AnnotationMap::new();
    let mut path: Vec<PathSegment> = Vec::new();
    let json = serialize_at(value, registry, &mut path, &mut annotations)?;
    let meta = if annotations.is_empty() { None } else { Some(Meta { values: annotations }) };
    Ok(TypedJson { json, meta })
}

/// Serializes over the built-in registry and renders the wire form.
pub fn to_string(value: &Value) -> Result<String, CodecError> {
    let envelope = to_envelope(value, &TypeRegistry::default())?;
    Ok(envelope.to_value().to_string())
}

fn serialize_at(
    value: &Value,
    registry: &TypeRegistry,
    path: &mut Vec<PathSegment>,
    annotations: &mut AnnotationMap,
) -> Result<JsonValue, CodecError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Undefined => {
            annotations.insert(path.clone(), Annotation::Undefined);
            Ok(JsonValue::Null)
        }
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Int(i) => Ok(JsonValue::Number(JsonNumber::from(*i))),
        Value::Float(f) => {
            if f.is_nan() {
                annotations.insert(path.clone(), Annotation::NaN);
                Ok(JsonValue::Null)
            } else if f.is_infinite() {
                let tag = if *f > 0.0 { Annotation::PosInfinity } else { Annotation::NegInfinity };
                annotations.insert(path.clone(), tag);
                Ok(JsonValue::Null)
            } else {
                match JsonNumber::from_f64(*f) {
                    Some(n) => Ok(JsonValue::Number(n)),
                    // finite floats always convert; kept total anyway
                    None => Ok(JsonValue::Null),
                }
            }
        }
        Value::String(s) => Ok(JsonValue::String(s.clone())),
        other => {
            if let Some(transformer) = registry.find_applicable(other) {
                let shape = transformer.serialize(other)?;
                annotations.insert(path.clone(), Annotation::Transformer(transformer.name().to_string()));
                // the transformed shape may itself hold extended values;
                // they are annotated at deeper paths by this recursion
                return serialize_at(&shape, registry, path, annotations)
            }
            match other {
                Value::Array(values) => {
                    let mut out = Vec::with_capacity(values.len());
                    for (index, item) in values.iter().enumerate() {
                        path.push(PathSegment::Index(index));
                        let item_json = serialize_at(item, registry, path, annotations);
                        path.pop();
                        out.push(item_json?);
                    }
                    Ok(JsonValue::Array(out))
                }
                Value::Object(pairs) => {
                    let mut out = JsonMap::new();
                    for (key, item) in pairs {
                        path.push(PathSegment::Key(key.clone()));
                        let item_json = serialize_at(item, registry, path, annotations);
                        path.pop();
                        out.insert(key.clone(), item_json?);
                    }
                    Ok(JsonValue::Object(out))
                }
                // last resort for a value no transformer claims
                _ => Ok(JsonValue::String(other.fallback_string())),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::{path_from_string, BigInt};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn annotation_at<'a>(envelope: &'a TypedJson, path: &str) -> Option<&'a Annotation> {
        envelope.annotation_at(&path_from_string(path))
    }

    #[test]
    fn test_json_native_values_have_no_meta() {
        let value = Value::Object(vec![
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Array(vec![Value::Bool(true), Value::Null])),
            ("c".to_string(), Value::String("x".to_string())),
            ("d".to_string(), Value::Float(2.5)),
        ]);
        let envelope = to_envelope(&value, &TypeRegistry::default()).unwrap();
        assert!(envelope.meta.is_none());
        assert_eq!(envelope.json, json!({"a": 1, "b": [true, null], "c": "x", "d": 2.5}));
    }

    #[test]
    fn test_undefined_annotated_at_path() {
        let value = Value::Object(vec![("gone".to_string(), Value::Undefined)]);
        let envelope = to_envelope(&value, &TypeRegistry::default()).unwrap();
        assert_eq!(envelope.json, json!({"gone": null}));
        assert_eq!(annotation_at(&envelope, "gone"), Some(&Annotation::Undefined));
    }

    #[test]
    fn test_non_finite_floats() {
        let value = Value::Array(vec![
            Value::Float(f64::NAN),
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(1.0),
        ]);
        let envelope = to_envelope(&value, &TypeRegistry::default()).unwrap();
        assert_eq!(envelope.json, json!([null, null, null, 1.0]));
        assert_eq!(annotation_at(&envelope, "0"), Some(&Annotation::NaN));
        assert_eq!(annotation_at(&envelope, "1"), Some(&Annotation::PosInfinity));
        assert_eq!(annotation_at(&envelope, "2"), Some(&Annotation::NegInfinity));
        assert_eq!(annotation_at(&envelope, "3"), None);
    }

    #[test]
    fn test_instant_at_root() {
        let value = Value::Instant(Utc.with_ymd_and_hms(2020, 5, 4, 3, 2, 1).unwrap());
        let envelope = to_envelope(&value, &TypeRegistry::default()).unwrap();
        assert_eq!(envelope.json, json!("2020-05-04T03:02:01.000Z"));
        assert_eq!(
            annotation_at(&envelope, ""),
            Some(&Annotation::Transformer("temporal-instant".to_string()))
        );
    }

    #[test]
    fn test_nested_extended_value_inside_map() {
        // a timestamp inside a map: the map is annotated at its own path and
        // the timestamp at the deeper path inside the serialized pairs
        let instant = Value::Instant(Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap());
        let value = Value::Object(vec![(
            "m".to_string(),
            Value::Map(vec![(Value::String("when".to_string()), instant)]),
        )]);
        let envelope = to_envelope(&value, &TypeRegistry::default()).unwrap();
        assert_eq!(envelope.json, json!({"m": [["when", "1999-12-31T23:59:59.000Z"]]}));
        assert_eq!(
            annotation_at(&envelope, "m"),
            Some(&Annotation::Transformer("ordered-pair-collection".to_string()))
        );
        assert_eq!(
            annotation_at(&envelope, "m.0.1"),
            Some(&Annotation::Transformer("temporal-instant".to_string()))
        );
    }

    #[test]
    fn test_bigint_and_url_and_pattern() {
        let value = Value::Array(vec![
            Value::BigInt(BigInt::new("9007199254740993").unwrap()),
            Value::Url(url::Url::parse("https://example.com/").unwrap()),
            Value::Pattern { source: "a|b".to_string(), flags: "i".to_string() },
        ]);
        let envelope = to_envelope(&value, &TypeRegistry::default()).unwrap();
        assert_eq!(
            envelope.json,
            json!(["9007199254740993", "https://example.com/", {"source": "a|b", "flags": "i"}])
        );
        assert_eq!(
            annotation_at(&envelope, "1"),
            Some(&Annotation::Transformer("resource-locator".to_string()))
        );
    }

    #[test]
    fn test_unclaimed_value_falls_back_to_string() {
        // no transformers at all: an instant degrades to its text form
        let registry = TypeRegistry::new();
        let value = Value::Instant(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let envelope = to_envelope(&value, &registry).unwrap();
        assert_eq!(envelope.json, json!("2020-01-01T00:00:00.000Z"));
        assert!(envelope.meta.is_none());
    }

    #[test]
    fn test_wire_string_for_plain_value() {
        let text = to_string(&Value::Int(7)).unwrap();
        assert_eq!(text, r#"{"json":7}"#);
    }

    #[test]
    fn test_wire_string_with_meta() {
        let text = to_string(&Value::Undefined).unwrap();
        assert_eq!(text, r#"{"json":null,"meta":{"values":{"":"undefined"}}}"#);
    }
}
