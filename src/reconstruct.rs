use std::fmt::{Display, Formatter};

use crate::tokenize::{tokenize_str_with_limit, Token, TokType, TokenizationError, DEFAULT_MAX_SIZE_BYTES};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReconstructionErrorKind {
    UnexpectedToken,
    ExpectedStringKey,
    UnterminatedStructure,
}

#[derive(Debug)]
pub struct ReconstructionError {
    pub kind: ReconstructionErrorKind,
    pub message: String,
    pub index: usize, // byte offset of the offending token
}

impl Display for ReconstructionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconstructionError: {} (byte {})", self.message, self.index)
    }
}

impl std::error::Error for ReconstructionError {}

/// Errors from the combined tokenize-then-reconstruct pipeline.
#[derive(Debug)]
pub enum NormalizeError {
    Tokenize(TokenizationError),
    Reconstruct(ReconstructionError),
}

impl Display for NormalizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::Tokenize(e) => write!(f, "{}", e),
            NormalizeError::Reconstruct(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for NormalizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NormalizeError::Tokenize(e) => Some(e),
            NormalizeError::Reconstruct(e) => Some(e),
        }
    }
}

impl From<TokenizationError> for NormalizeError {
    fn from(e: TokenizationError) -> Self {
        NormalizeError::Tokenize(e)
    }
}

impl From<ReconstructionError> for NormalizeError {
    fn from(e: ReconstructionError) -> Self {
        NormalizeError::Reconstruct(e)
    }
}

struct Reconstructor<'toks> {
    tokens: &'toks [Token],
    pos: usize,
    out: String,
}

impl<'toks> Reconstructor<'toks> {
    fn new(tokens: &'toks [Token]) -> Self {
        // quotes and delimiters roughly double short lexemes
        let capacity = tokens.iter().map(|t| t.text.len() + 2).sum();
        Reconstructor { tokens, pos: 0, out: String::with_capacity(capacity) }
    }

    fn end_offset(&self) -> usize {
        self.tokens.last().map(|t| t.offset).unwrap_or(0)
    }

    fn peek(&self) -> (TokType, usize) {
        match self.tokens.get(self.pos) {
            Some(tok) => (tok.kind, tok.offset),
            None => (TokType::EOF, self.end_offset()),
        }
    }

    fn advance(&mut self) -> Option<&'toks Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn make_error(&self, kind: ReconstructionErrorKind, message: String, index: usize) -> ReconstructionError {
        ReconstructionError { kind, message, index }
    }

    fn unterminated(&self, what: &str, index: usize) -> ReconstructionError {
        self.make_error(ReconstructionErrorKind::UnterminatedStructure, format!("Unexpected end of input before {} was closed", what), index)
    }

    fn parse_value(&mut self) -> Result<(), ReconstructionError> {
        let (kind, offset) = self.peek();
        match kind {
            TokType::String => {
                let tok = self.advance().expect("peeked token");
                self.out.push('"');
                self.out.push_str(&tok.text);
                self.out.push('"');
                Ok(())
            }
            TokType::Number => {
                let tok = self.advance().expect("peeked token");
                self.out.push_str(&tok.text);
                Ok(())
            }
            TokType::True => { self.advance(); self.out.push_str("true"); Ok(()) }
            TokType::False => { self.advance(); self.out.push_str("false"); Ok(()) }
            TokType::Null => { self.advance(); self.out.push_str("null"); Ok(()) }
            TokType::LeftBrace => { self.advance(); self.parse_object(offset) }
            TokType::LeftBracket => { self.advance(); self.parse_array(offset) }
            TokType::EOF => {
                Err(self.make_error(ReconstructionErrorKind::UnexpectedToken, "Unexpected end of input, expecting a value".to_string(), offset))
            }
            other => {
                Err(self.make_error(ReconstructionErrorKind::UnexpectedToken, format!("Unexpected {:?} token, expecting a value", other), offset))
            }
        }
    }

    fn parse_object(&mut self, open_offset: usize) -> Result<(), ReconstructionError> {
        self.out.push('{');
        let mut first = true;
        loop {
            match self.peek() {
                (TokType::RightBrace, _) => {
                    self.advance();
                    self.out.push('}');
                    return Ok(())
                }
                (TokType::EOF, _) => return Err(self.unterminated("object", open_offset)),
                (TokType::Comma, _) => {
                    // one leading comma per entry is absorbed; a second in a
                    // row falls through to the key check and fails there
                    self.advance();
                    match self.peek() {
                        (TokType::RightBrace, _) => {
                            self.advance();
                            self.out.push('}');
                            return Ok(())
                        }
                        (TokType::EOF, _) => return Err(self.unterminated("object", open_offset)),
                        _ => {}
                    }
                }
                _ => {}
            }
            if !first {
                self.out.push(',');
            }
            let (kind, key_offset) = self.peek();
            match kind {
                TokType::String => {
                    let tok = self.advance().expect("peeked token");
                    self.out.push('"');
                    self.out.push_str(&tok.text);
                    self.out.push('"');
                }
                TokType::Number | TokType::True | TokType::False | TokType::Null
                | TokType::LeftBrace | TokType::LeftBracket => {
                    return Err(self.make_error(ReconstructionErrorKind::ExpectedStringKey, format!("Expecting string key in object, got {:?}", kind), key_offset))
                }
                other => {
                    return Err(self.make_error(ReconstructionErrorKind::UnexpectedToken, format!("Unexpected {:?} token, expecting object key", other), key_offset))
                }
            }
            match self.peek() {
                (TokType::Colon, _) => {
                    self.advance();
                    self.out.push(':');
                }
                (TokType::EOF, _) => return Err(self.unterminated("object", open_offset)),
                (other, offset) => {
                    return Err(self.make_error(ReconstructionErrorKind::UnexpectedToken, format!("Expecting ':' delimiter, got {:?}", other), offset))
                }
            }
            if self.peek().0 == TokType::EOF {
                return Err(self.unterminated("object", open_offset))
            }
            self.parse_value()?;
            first = false;
        }
    }

    fn parse_array(&mut self, open_offset: usize) -> Result<(), ReconstructionError> {
        self.out.push('[');
        let mut first = true;
        loop {
            match self.peek() {
                (TokType::RightBracket, _) => {
                    self.advance();
                    self.out.push(']');
                    return Ok(())
                }
                (TokType::EOF, _) => return Err(self.unterminated("array", open_offset)),
                (TokType::Comma, _) => {
                    self.advance();
                    match self.peek() {
                        (TokType::RightBracket, _) => {
                            self.advance();
                            self.out.push(']');
                            return Ok(())
                        }
                        (TokType::EOF, _) => return Err(self.unterminated("array", open_offset)),
                        _ => {}
                    }
                }
                _ => {}
            }
            if !first {
                self.out.push(',');
            }
            if self.peek().0 == TokType::EOF {
                return Err(self.unterminated("array", open_offset))
            }
            self.parse_value()?;
            first = false;
        }
    }
}

/// Emits compact strict JSON for a token stream, or fails on the first
/// structurally invalid token.
pub fn reconstruct(tokens: &[Token]) -> Result<String, ReconstructionError> {
    let mut reconstructor = Reconstructor::new(tokens);
    reconstructor.parse_value()?;
    match reconstructor.peek() {
        (TokType::EOF, _) => Ok(reconstructor.out),
        (other, offset) => {
            Err(reconstructor.make_error(ReconstructionErrorKind::UnexpectedToken, format!("Unexpected {:?} token after end of document", other), offset))
        }
    }
}

/// Normalizes permissive JSON-like text into strict JSON, with the default
/// size cap.
pub fn clean_str(text: &str) -> Result<String, NormalizeError> {
    clean_str_with_limit(text, DEFAULT_MAX_SIZE_BYTES)
}

pub fn clean_str_with_limit(text: &str, max_size_bytes: usize) -> Result<String, NormalizeError> {
    let tokens = tokenize_str_with_limit(text, max_size_bytes)?;
    Ok(reconstruct(&tokens)?)
}
