use std::fmt;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::registry::BUILTIN_NAMES;

/// A JSON tree extended with the value kinds JSON cannot natively represent.
///
/// The JSON-native variants mirror what `serde_json` can hold; the extended
/// variants are the ones the codec turns into annotated JSON shapes. Objects
/// keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    Instant(DateTime<Utc>),
    BigInt(BigInt),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Pattern { source: String, flags: String },
    Url(url::Url),
    ErrorRecord { name: String, message: String, stack: Option<String> },
}

impl Value {
    /// Structural conversion from a parsed JSON tree. Numbers that fit `i64`
    /// become `Int`; everything else numeric becomes `Float`.
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                match n.as_i64() {
                    Some(i) => Value::Int(i),
                    None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(values) => {
                Value::Array(values.iter().map(Value::from_json).collect())
            }
            JsonValue::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            }
        }
    }

    /// Last-resort string form for a value no transformer claims.
    pub(crate) fn fallback_string(&self) -> String {
        match self {
            Value::Instant(instant) => instant.to_rfc3339_opts(SecondsFormat::Millis, true),
            Value::BigInt(big) => big.as_str().to_string(),
            Value::Url(url) => url.as_str().to_string(),
            Value::Pattern { source, flags } => format!("/{}/{}", source, flags),
            Value::ErrorRecord { name, message, .. } => format!("{}: {}", name, message),
            other => format!("{:?}", other),
        }
    }
}

/// An arbitrary-precision integer kept as its decimal-digit string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInt(String);

impl BigInt {
    /// Validates `digits` as an optionally signed run of decimal digits.
    pub fn new(digits: &str) -> Option<BigInt> {
        let unsigned = digits.strip_prefix('-').unwrap_or(digits);
        if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
            return None
        }
        Some(BigInt(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BigInt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for BigInt {
    fn from(value: i64) -> Self {
        BigInt(value.to_string())
    }
}

/// One step into a JSON value tree: an object key or an array index.
///
/// Keys and indexes are distinct in memory; only the dot-joined wire form
/// collapses them (an all-digit wire segment always reads back as an index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

pub(crate) fn path_to_string(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in path.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        match segment {
            PathSegment::Key(key) => out.push_str(key),
            PathSegment::Index(index) => out.push_str(&index.to_string()),
        }
    }
    out
}

pub(crate) fn path_from_string(text: &str) -> Vec<PathSegment> {
    if text.is_empty() {
        return Vec::new()
    }
    text.split('.')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                match segment.parse::<usize>() {
                    Ok(index) => PathSegment::Index(index),
                    Err(_) => PathSegment::Key(segment.to_string()),
                }
            } else {
                PathSegment::Key(segment.to_string())
            }
        })
        .collect()
}

/// How to reverse one transformation at one structural path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// The value itself has no JSON literal, `null` included.
    Undefined,
    NaN,
    PosInfinity,
    NegInfinity,
    /// The registered name of the transformer that produced the shape here.
    Transformer(String),
}

impl Annotation {
    pub(crate) fn to_tag(&self) -> JsonValue {
        match self {
            Annotation::Undefined => JsonValue::String("undefined".to_string()),
            Annotation::NaN => JsonValue::String("NaN".to_string()),
            Annotation::PosInfinity => JsonValue::String("Infinity".to_string()),
            Annotation::NegInfinity => JsonValue::String("-Infinity".to_string()),
            Annotation::Transformer(name) => {
                if BUILTIN_NAMES.contains(&name.as_str()) {
                    JsonValue::String(name.clone())
                } else {
                    JsonValue::Array(vec![
                        JsonValue::String("custom".to_string()),
                        JsonValue::String(name.clone()),
                    ])
                }
            }
        }
    }

    pub(crate) fn from_tag(tag: &JsonValue) -> Option<Annotation> {
        match tag {
            JsonValue::String(s) => {
                Some(match s.as_str() {
                    "undefined" => Annotation::Undefined,
                    "NaN" => Annotation::NaN,
                    "Infinity" => Annotation::PosInfinity,
                    "-Infinity" => Annotation::NegInfinity,
                    name => Annotation::Transformer(name.to_string()),
                })
            }
            JsonValue::Array(items) => {
                match items.as_slice() {
                    [JsonValue::String(kind), JsonValue::String(name)] if kind == "custom" => {
                        Some(Annotation::Transformer(name.clone()))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Path-keyed annotations, ordered by first insertion.
///
/// A plain vector instead of a string-keyed map: lookups are linear, but the
/// maps are registry-sized and the segments stay unambiguous in memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationMap {
    entries: Vec<(Vec<PathSegment>, Annotation)>,
}

impl AnnotationMap {
    pub fn new() -> Self {
        AnnotationMap { entries: Vec::new() }
    }

    /// Inserts, replacing any annotation already present at `path`.
    pub fn insert(&mut self, path: Vec<PathSegment>, annotation: Annotation) {
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = annotation,
            None => self.entries.push((path, annotation)),
        }
    }

    pub fn get(&self, path: &[PathSegment]) -> Option<&Annotation> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, a)| a)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Vec<PathSegment>, Annotation)> {
        self.entries.iter()
    }
}

/// The `{json, meta?}` envelope carrying strict JSON plus its annotations.
///
/// `meta` is `None` exactly when no value required an annotation, which keeps
/// the common case indistinguishable from plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedJson {
    pub json: JsonValue,
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub values: AnnotationMap,
}

impl TypedJson {
    pub fn annotation_at(&self, path: &[PathSegment]) -> Option<&Annotation> {
        self.meta.as_ref().and_then(|meta| meta.values.get(path))
    }

    /// The wire form: `{"json": ..., "meta": {"values": {path: tag}}}`,
    /// `meta` omitted when empty.
    pub fn to_value(&self) -> JsonValue {
        let mut root = JsonMap::new();
        root.insert("json".to_string(), self.json.clone());
        if let Some(meta) = &self.meta {
            if !meta.values.is_empty() {
                let mut values = JsonMap::new();
                for (path, annotation) in meta.values.iter() {
                    values.insert(path_to_string(path), annotation.to_tag());
                }
                let mut meta_map = JsonMap::new();
                meta_map.insert("values".to_string(), JsonValue::Object(values));
                root.insert("meta".to_string(), JsonValue::Object(meta_map));
            }
        }
        JsonValue::Object(root)
    }

    /// Reads an envelope back from a parsed JSON tree.
    ///
    /// Returns `None` when the tree is not envelope-shaped: an object with a
    /// `json` field that is either the only field or accompanied by exactly
    /// one `meta` object holding a `values` object. Unparseable tag shapes
    /// inside `values` are skipped; they are hand-authored input by
    /// definition, since the serializer cannot produce them.
    pub fn from_value(value: &JsonValue) -> Option<TypedJson> {
        let root = value.as_object()?;
        let json = root.get("json")?;
        match root.len() {
            1 => Some(TypedJson { json: json.clone(), meta: None }),
            2 => {
                let values = root.get("meta")?.as_object()?.get("values")?.as_object()?;
                let mut map = AnnotationMap::new();
                for (path_text, tag) in values {
                    if let Some(annotation) = Annotation::from_tag(tag) {
                        map.insert(path_from_string(path_text), annotation);
                    }
                }
                // `meta` is None exactly when empty, whatever the wire said
                let meta = if map.is_empty() { None } else { Some(Meta { values: map }) };
                Some(TypedJson { json: json.clone(), meta })
            }
            _ => None,
        }
    }
}

impl Display for TypedJson {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl Serialize for TypedJson {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TypedJson {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        TypedJson::from_value(&value)
            .ok_or_else(|| D::Error::custom("expected a TypedJSON envelope with a 'json' field"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_round_trip() {
        let path = vec![
            PathSegment::Key("a".to_string()),
            PathSegment::Index(0),
            PathSegment::Key("b".to_string()),
        ];
        assert_eq!(path_to_string(&path), "a.0.b");
        assert_eq!(path_from_string("a.0.b"), path);
        assert_eq!(path_from_string(""), Vec::<PathSegment>::new());
    }

    #[test]
    fn test_all_digit_segment_reads_as_index() {
        // the wire form cannot tell a key named "3" from index 3
        assert_eq!(path_from_string("3"), vec![PathSegment::Index(3)]);
    }

    #[test]
    fn test_annotation_tags() {
        assert_eq!(Annotation::NaN.to_tag(), json!("NaN"));
        assert_eq!(
            Annotation::Transformer("temporal-instant".to_string()).to_tag(),
            json!("temporal-instant")
        );
        assert_eq!(
            Annotation::Transformer("my-type".to_string()).to_tag(),
            json!(["custom", "my-type"])
        );
        assert_eq!(Annotation::from_tag(&json!("undefined")), Some(Annotation::Undefined));
        assert_eq!(Annotation::from_tag(&json!("-Infinity")), Some(Annotation::NegInfinity));
        assert_eq!(
            Annotation::from_tag(&json!(["custom", "my-type"])),
            Some(Annotation::Transformer("my-type".to_string()))
        );
        assert_eq!(Annotation::from_tag(&json!(42)), None);
        assert_eq!(Annotation::from_tag(&json!(["other", "x"])), None);
    }

    #[test]
    fn test_annotation_map_replace() {
        let mut map = AnnotationMap::new();
        map.insert(vec![], Annotation::NaN);
        map.insert(vec![], Annotation::Undefined);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&[]), Some(&Annotation::Undefined));
    }

    #[test]
    fn test_envelope_wire_round_trip() {
        let mut values = AnnotationMap::new();
        values.insert(vec![PathSegment::Key("a".to_string())], Annotation::Undefined);
        let envelope = TypedJson {
            json: json!({"a": null}),
            meta: Some(Meta { values }),
        };
        let wire = envelope.to_value();
        assert_eq!(wire, json!({"json": {"a": null}, "meta": {"values": {"a": "undefined"}}}));
        assert_eq!(TypedJson::from_value(&wire), Some(envelope));
    }

    #[test]
    fn test_envelope_shape_check() {
        assert!(TypedJson::from_value(&json!({"json": 1})).is_some());
        assert!(TypedJson::from_value(&json!({"json": 1, "extra": 2})).is_none());
        assert!(TypedJson::from_value(&json!({"a": 1})).is_none());
        assert!(TypedJson::from_value(&json!(42)).is_none());
        assert!(TypedJson::from_value(&json!({"json": 1, "meta": {"values": {}}})).is_some());
        assert!(TypedJson::from_value(&json!({"json": 1, "meta": 5})).is_none());
    }

    #[test]
    fn test_empty_values_reads_as_no_meta() {
        // hand-authored `"meta":{"values":{}}` means the same as no meta;
        // the two wire spellings must compare equal once read
        let explicit = TypedJson::from_value(&json!({"json": 1, "meta": {"values": {}}})).unwrap();
        let bare = TypedJson::from_value(&json!({"json": 1})).unwrap();
        assert_eq!(explicit.meta, None);
        assert_eq!(explicit, bare);

        // annotations whose tag shape is unreadable are skipped, so a meta
        // holding only those collapses the same way
        let skipped = TypedJson::from_value(&json!({"json": 1, "meta": {"values": {"": 42}}})).unwrap();
        assert_eq!(skipped.meta, None);
    }

    #[test]
    fn test_bigint_validation() {
        assert!(BigInt::new("12345678901234567890123").is_some());
        assert!(BigInt::new("-42").is_some());
        assert!(BigInt::new("").is_none());
        assert!(BigInt::new("-").is_none());
        assert!(BigInt::new("12a").is_none());
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(&json!(1)), Value::Int(1));
        assert_eq!(Value::from_json(&json!(1.5)), Value::Float(1.5));
    }
}
