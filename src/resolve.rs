use std::borrow::Cow;
use std::fmt;
use std::fmt::{Display, Formatter};

use serde_json::Value as JsonValue;

use crate::de::from_envelope;
use crate::reconstruct::{clean_str_with_limit, NormalizeError};
use crate::registry::TypeRegistry;
use crate::ser::CodecError;
use crate::tokenize::DEFAULT_MAX_SIZE_BYTES;
use crate::value::{TypedJson, Value};

/// Whether to normalize permissive syntax before strict parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyMode {
    /// Normalize only when a cheap scan finds dirty-syntax markers.
    #[default]
    Auto,
    Always,
    /// Hand the text straight to the strict parser; malformed input then
    /// fails with the parser's own syntax error.
    Never,
}

/// Whether to restore annotated types after strict parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypedMode {
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone)]
pub struct AccelError {
    pub message: String,
}

impl AccelError {
    pub fn new(message: impl Into<String>) -> Self {
        AccelError { message: message.into() }
    }
}

impl Display for AccelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AccelError: {}", self.message)
    }
}

impl std::error::Error for AccelError {}

/// An optional native-code normalizer.
///
/// For every input it accepts, `clean` must return exactly what the in-core
/// tokenizer + reconstructor would; it may fail on anything, in which case
/// the facade falls back to the in-core pipeline with no observable
/// difference.
pub trait Clean {
    fn clean(&self, text: &str) -> Result<String, AccelError>;
}

pub struct ResolveOptions<'a> {
    pub dirty: DirtyMode,
    pub typed: TypedMode,
    pub max_size_bytes: usize,
    /// Registry to restore with; defaults to the built-ins. Callers with
    /// custom transformers thread their own long-lived registry through.
    pub registry: Option<&'a TypeRegistry>,
    pub accelerator: Option<&'a dyn Clean>,
}

impl Default for ResolveOptions<'_> {
    fn default() -> Self {
        ResolveOptions {
            dirty: DirtyMode::Auto,
            typed: TypedMode::Auto,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            registry: None,
            accelerator: None,
        }
    }
}

#[derive(Debug)]
pub enum ResolveError {
    InputTooLarge { size: usize, max_size_bytes: usize },
    Normalize(NormalizeError),
    Parse(serde_json::Error),
    Codec(CodecError),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::InputTooLarge { size, max_size_bytes } => {
                write!(f, "ResolveError: input of {} bytes exceeds the limit of {} bytes", size, max_size_bytes)
            }
            ResolveError::Normalize(e) => write!(f, "{}", e),
            ResolveError::Parse(e) => write!(f, "ResolveError: {}", e),
            ResolveError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::InputTooLarge { .. } => None,
            ResolveError::Normalize(e) => Some(e),
            ResolveError::Parse(e) => Some(e),
            ResolveError::Codec(e) => Some(e),
        }
    }
}

/// Cheap single-pass scan for dirty-syntax markers: comments, single quotes,
/// an unquoted-key pattern, or a trailing comma, all outside double-quoted
/// strings.
///
/// False negatives surface as strict-parse errors; false positives only cost
/// a normalization pass, which is the identity on strict JSON.
pub fn needs_normalization(text: &str) -> bool {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < len {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue
        }
        match b {
            b'"' => in_string = true,
            b'\'' => return true,
            b'/' if i + 1 < len && (bytes[i + 1] == b'/' || bytes[i + 1] == b'*') => return true,
            b'{' | b',' => {
                let mut j = i + 1;
                while j < len && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j < len {
                    let next = bytes[j];
                    if b == b',' && (next == b'}' || next == b']') {
                        return true
                    }
                    if next.is_ascii_alphabetic() || next == b'_' || next == b'$' {
                        return true
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Turns permissive text into a restored value: normalize if needed, parse
/// strictly, then restore annotated types if the shape calls for it.
///
/// Stateless; every failure is deterministic and surfaced immediately.
pub fn resolve(text: &str, options: &ResolveOptions) -> Result<Value, ResolveError> {
    if text.len() > options.max_size_bytes {
        return Err(ResolveError::InputTooLarge { size: text.len(), max_size_bytes: options.max_size_bytes })
    }
    let normalize = match options.dirty {
        DirtyMode::Always => true,
        DirtyMode::Never => false,
        DirtyMode::Auto => needs_normalization(text),
    };
    let strict: Cow<'_, str> = if normalize {
        Cow::Owned(normalized(text, options)?)
    } else {
        Cow::Borrowed(text)
    };
    let parsed: JsonValue = serde_json::from_str(&strict).map_err(ResolveError::Parse)?;
    match options.typed {
        TypedMode::Never => Ok(Value::from_json(&parsed)),
        TypedMode::Always | TypedMode::Auto => {
            match TypedJson::from_value(&parsed) {
                Some(envelope) => {
                    let default_registry;
                    let registry = match options.registry {
                        Some(registry) => registry,
                        None => {
                            default_registry = TypeRegistry::default();
                            &default_registry
                        }
                    };
                    from_envelope(&envelope, registry).map_err(ResolveError::Codec)
                }
                None => Ok(Value::from_json(&parsed)),
            }
        }
    }
}

fn normalized(text: &str, options: &ResolveOptions) -> Result<String, ResolveError> {
    if let Some(accelerator) = options.accelerator {
        if let Ok(cleaned) = accelerator.clean(text) {
            return Ok(cleaned)
        }
        // accelerator failures fall back to the in-core pipeline
    }
    clean_str_with_limit(text, options.max_size_bytes).map_err(ResolveError::Normalize)
}
