use serde_json::Value as JsonValue;

use crate::registry::TypeRegistry;
use crate::ser::CodecError;
use crate::value::{path_to_string, Annotation, PathSegment, TypedJson, Value};

/// Restores a value tree from an envelope, re-applying transformations at
/// their recorded paths.
///
/// Annotations addressing paths that do not exist in `json` are ignored:
/// the serializer cannot produce them, but hand-authored or truncated
/// envelopes can.
pub fn from_envelope(envelope: &TypedJson, registry: &TypeRegistry) -> Result<Value, CodecError> {
    let mut path: Vec<PathSegment> = Vec::new();
    deserialize_at(&envelope.json, envelope, registry, &mut path)
}

/// Parses wire text and restores it over the built-in registry. Text that is
/// not envelope-shaped is converted structurally.
pub fn from_str(text: &str) -> Result<Value, CodecError> {
    let parsed: JsonValue = serde_json::from_str(text).map_err(CodecError::Parse)?;
    let registry = TypeRegistry::default();
    match TypedJson::from_value(&parsed) {
        Some(envelope) => from_envelope(&envelope, &registry),
        None => Ok(Value::from_json(&parsed)),
    }
}

fn deserialize_at(
    json: &JsonValue,
    envelope: &TypedJson,
    registry: &TypeRegistry,
    path: &mut Vec<PathSegment>,
) -> Result<Value, CodecError> {
    if let Some(annotation) = envelope.annotation_at(path) {
        match annotation {
            // a primitive annotation wins over whatever sits in the tree
            Annotation::Undefined => return Ok(Value::Undefined),
            Annotation::NaN => return Ok(Value::Float(f64::NAN)),
            Annotation::PosInfinity => return Ok(Value::Float(f64::INFINITY)),
            Annotation::NegInfinity => return Ok(Value::Float(f64::NEG_INFINITY)),
            Annotation::Transformer(name) => {
                let transformer = registry.by_name(name).ok_or_else(|| {
                    CodecError::UnknownTypeTransformer { name: name.clone(), path: path_to_string(path) }
                })?;
                // children first: the transformer's input shape may itself
                // contain annotated sub-values
                let shape = deserialize_children(json, envelope, registry, path)?;
                return Ok(transformer.deserialize(shape)?)
            }
        }
    }
    deserialize_children(json, envelope, registry, path)
}

fn deserialize_children(
    json: &JsonValue,
    envelope: &TypedJson,
    registry: &TypeRegistry,
    path: &mut Vec<PathSegment>,
) -> Result<Value, CodecError> {
    match json {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => {
            match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => Ok(Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            }
        }
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Array(values) => {
            let mut out = Vec::with_capacity(values.len());
            for (index, item) in values.iter().enumerate() {
                path.push(PathSegment::Index(index));
                let item_value = deserialize_at(item, envelope, registry, path);
                path.pop();
                out.push(item_value?);
            }
            Ok(Value::Array(out))
        }
        JsonValue::Object(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, item) in map {
                path.push(PathSegment::Key(key.clone()));
                let item_value = deserialize_at(item, envelope, registry, path);
                path.pop();
                out.push((key.clone(), item_value?));
            }
            Ok(Value::Object(out))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ser::to_envelope;
    use crate::value::BigInt;
    use chrono::{TimeZone, Utc};

    fn round_trip(value: &Value) -> Value {
        let registry = TypeRegistry::default();
        let envelope = to_envelope(value, &registry).unwrap();
        from_envelope(&envelope, &registry).unwrap()
    }

    #[test]
    fn test_round_trip_json_native() {
        let value = Value::Object(vec![
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Array(vec![Value::Null, Value::Bool(false), Value::Float(0.5)])),
            ("c".to_string(), Value::String("hi".to_string())),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_round_trip_extended_values() {
        let value = Value::Object(vec![
            ("when".to_string(), Value::Instant(Utc.with_ymd_and_hms(2022, 2, 2, 2, 2, 2).unwrap())),
            ("big".to_string(), Value::BigInt(BigInt::new("340282366920938463463374607431768211456").unwrap())),
            ("set".to_string(), Value::Set(vec![Value::Int(1), Value::Int(2)])),
            ("re".to_string(), Value::Pattern { source: "x+".to_string(), flags: "".to_string() }),
            ("home".to_string(), Value::Url(url::Url::parse("https://example.com/home").unwrap())),
            ("err".to_string(), Value::ErrorRecord {
                name: "RangeError".to_string(),
                message: "out of range".to_string(),
                stack: None,
            }),
            ("missing".to_string(), Value::Undefined),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_round_trip_nested_extended_inside_map() {
        let value = Value::Map(vec![
            (
                Value::String("ts".to_string()),
                Value::Instant(Utc.with_ymd_and_hms(2010, 10, 10, 10, 10, 10).unwrap()),
            ),
            (Value::Int(3), Value::Set(vec![Value::String("a".to_string())])),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_round_trip_infinities() {
        let value = Value::Array(vec![Value::Float(f64::INFINITY), Value::Float(f64::NEG_INFINITY)]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_round_trip_nan() {
        let value = Value::Float(f64::NAN);
        match round_trip(&value) {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("expected NaN, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_transformer_is_fatal() {
        let err = from_str(r#"{"json":null,"meta":{"values":{"":["custom","NotRegistered"]}}}"#).unwrap_err();
        match err {
            CodecError::UnknownTypeTransformer { name, path } => {
                assert_eq!(name, "NotRegistered");
                assert_eq!(path, "");
            }
            other => panic!("expected UnknownTypeTransformer, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_bare_name_is_fatal_too() {
        let err = from_str(r#"{"json":null,"meta":{"values":{"":"NotRegistered"}}}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTypeTransformer { .. }));
    }

    #[test]
    fn test_dangling_annotation_path_ignored() {
        let value = from_str(r#"{"json":{"a":1},"meta":{"values":{"b.c":"undefined"}}}"#).unwrap();
        assert_eq!(value, Value::Object(vec![("a".to_string(), Value::Int(1))]));
    }

    #[test]
    fn test_from_str_plain_json_is_structural() {
        let value = from_str(r#"{"a":[1,true]}"#).unwrap();
        assert_eq!(
            value,
            Value::Object(vec![(
                "a".to_string(),
                Value::Array(vec![Value::Int(1), Value::Bool(true)]),
            )])
        );
    }

    #[test]
    fn test_from_str_round_trip_via_wire() {
        let value = Value::Object(vec![(
            "deadline".to_string(),
            Value::Instant(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
        )]);
        let text = crate::ser::to_string(&value).unwrap();
        assert_eq!(from_str(&text).unwrap(), value);
    }

    #[test]
    fn test_transformer_failure_propagates() {
        // a well-formed annotation over a shape the transformer rejects
        let err = from_str(r#"{"json":42,"meta":{"values":{"":"temporal-instant"}}}"#).unwrap_err();
        assert!(matches!(err, CodecError::Transform(_)));
    }
}
