/// The permissive tokenizer
pub mod tokenize;

/// Convenience functions and utilities
mod utils;

/// Rebuilding strict JSON text from permissive tokens
pub mod reconstruct;

/// The value model and the typed-JSON envelope
pub mod value;

/// Type transformers and their registry
pub mod registry;

/// Serializing value trees into envelopes
pub mod ser;

/// Restoring value trees from envelopes
pub mod de;

/// The one-call policy facade
pub mod resolve;

/// turn permissive text into tokens
pub use tokenize::{tokenize_str, tokenize_str_with_limit, TokType, Token, TokenizationError, DEFAULT_MAX_SIZE_BYTES};

/// turn permissive text (or tokens) into strict JSON text
pub use reconstruct::{clean_str, clean_str_with_limit, reconstruct, NormalizeError, ReconstructionError};

pub use value::{Annotation, AnnotationMap, BigInt, Meta, PathSegment, TypedJson, Value};

pub use registry::{TransformError, TypeRegistry, TypeTransformer};

/// serialize a value tree into an envelope (or its wire string)
pub use ser::{to_envelope, to_string, CodecError};

/// restore a value tree from an envelope (or its wire string)
pub use de::{from_envelope, from_str};

/// parse-anything entry point
pub use resolve::{needs_normalization, resolve, AccelError, Clean, DirtyMode, ResolveError, ResolveOptions, TypedMode};

#[doc = include_str!("../README.md")]
#[cfg(doctest)]
pub struct ReadmeDoctests;
