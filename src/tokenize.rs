use std::fmt::{Display, Formatter};
use std::iter::Peekable;
use std::str::CharIndices;

use crate::utils::{get_line_col_char, reescape_single_quoted};

/// Documented default cap on input size: 100 MiB.
pub const DEFAULT_MAX_SIZE_BYTES: usize = 100 * 1024 * 1024;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TokType {
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    String,
    Number,
    True,
    False,
    Null,
    EOF,
}

/// A single normalized lexeme.
///
/// Tokens own their text: string interiors are already escaped for
/// double-quoted output and numeric shorthand is already rewritten, so the
/// lexeme is not in general a slice of the source. Structural and keyword
/// tokens carry empty text; the reconstructor emits their canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokType,
    pub text: String,
    pub offset: usize,
}

impl Token {
    pub(crate) fn new(kind: TokType, text: impl Into<String>, offset: usize) -> Self {
        Token { kind, text: text.into(), offset }
    }

    fn structural(kind: TokType, offset: usize) -> Self {
        Token { kind, text: String::new(), offset }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenizationErrorKind {
    InputTooLarge,
    UnexpectedCharacter,
}

#[derive(Debug)]
pub struct TokenizationError {
    pub kind: TokenizationErrorKind,
    pub message: String,
    pub index: usize, // byte offset
    pub lineno: usize,
    pub colno: usize,
    pub char_index: usize, // char offset
}

impl Display for TokenizationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenizationError: {}: line {} column {} (char {})", self.message, self.lineno, self.colno, self.char_index)
    }
}

impl std::error::Error for TokenizationError {}

const IDENTIFIER_START_SYMBOLS: &str = "$_";
const IDENTIFIER_PARTS: &str = "$_\u{200C}\u{200D}\u{005F}\u{203F}\u{2040}\u{2054}\u{FE33}\u{FE34}\u{FE4D}\u{FE4E}\u{FE4F}\u{FF3F}";

#[derive(Debug)]
pub struct Tokenizer<'input> {
    text: &'input str,
    chars: Peekable<CharIndices<'input>>,
    lookahead: Option<(usize, char)>,
}

impl<'input> Tokenizer<'input> {
    pub fn new(text: &'input str) -> Self {
        Tokenizer { text, chars: text.char_indices().peekable(), lookahead: None }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        self.lookahead = self.chars.next();
        self.lookahead
    }

    fn make_error(&self, kind: TokenizationErrorKind, message: String, start_index: usize) -> TokenizationError {
        let (lineno, colno, char_index) = get_line_col_char(self.text, start_index);
        TokenizationError { kind, message, index: start_index, lineno, colno, char_index }
    }

    fn process_string(&mut self) -> Result<Token, TokenizationError> {
        let (start_idx, quote_char) = self.lookahead.expect("Expected quote character");
        let mut escaped = false;
        let interior_start = start_idx + 1; // both quote characters are one byte
        let interior_end;
        loop {
            match self.advance() {
                None => {
                    // unterminated string: tolerated, the rest of the input is
                    // taken as the interior
                    interior_end = self.text.len();
                    break
                }
                Some((idx, char)) => {
                    if escaped {
                        escaped = false;
                        continue
                    }
                    match char {
                        '\\' => escaped = true,
                        c if c == quote_char => {
                            interior_end = idx;
                            break
                        }
                        _ => {}
                    }
                }
            }
        }
        let interior = &self.text[interior_start..interior_end];
        let text = match quote_char {
            // double-quoted interiors pass through unchanged; the
            // reconstructor re-wraps them
            '"' => interior.to_string(),
            _ => reescape_single_quoted(interior),
        };
        Ok(Token::new(TokType::String, text, start_idx))
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, peeked_char)) = self.chars.peek() {
            if peeked_char.is_whitespace() {
                self.advance();
            } else {
                break
            }
        }
    }

    fn process_hexadecimal(&mut self, start_idx: usize, negative: bool) -> Result<Token, TokenizationError> {
        let mut digits = String::new();
        while let Some((_, peeked_char)) = self.chars.peek() {
            if peeked_char.is_ascii_hexdigit() {
                digits.push(*peeked_char);
                self.advance();
            } else {
                break
            }
        }
        if digits.is_empty() {
            return Err(self.make_error(TokenizationErrorKind::UnexpectedCharacter, "Expected at least one digit in hexadecimal literal".to_string(), start_idx))
        }
        // JSON has no hex literal, so this is the one place the tokenizer
        // evaluates a number
        match u128::from_str_radix(&digits, 16) {
            Ok(value) => {
                let text = if negative { format!("-{}", value) } else { value.to_string() };
                Ok(Token::new(TokType::Number, text, start_idx))
            }
            Err(_) => {
                Err(self.make_error(TokenizationErrorKind::UnexpectedCharacter, format!("Hexadecimal literal 0x{} out of range", digits), start_idx))
            }
        }
    }

    fn process_number(&mut self) -> Result<Token, TokenizationError> {
        let (start_idx, start_char) = self.lookahead.expect("Unexpected end of input, was expecting numeric char");
        let mut text = String::new();
        let mut first = start_char;
        if first == '+' || first == '-' {
            if first == '-' {
                text.push('-');
            }
            // the leading '+' is dropped entirely
            match self.advance() {
                None => {
                    return Err(self.make_error(TokenizationErrorKind::UnexpectedCharacter, format!("Expected digit after {:?}", first), start_idx))
                }
                Some((_, next_char)) => {
                    if !next_char.is_ascii_digit() && next_char != '.' {
                        return Err(self.make_error(TokenizationErrorKind::UnexpectedCharacter, format!("Expected digit after {:?}", first), start_idx))
                    }
                    first = next_char;
                }
            }
        }
        if first == '.' {
            // ".5" and "-.5" gain the zero JSON requires
            text.push_str("0.");
            match self.chars.peek() {
                Some((_, peeked_char)) if peeked_char.is_ascii_digit() => {}
                _ => {
                    return Err(self.make_error(TokenizationErrorKind::UnexpectedCharacter, "Lone decimal is an invalid number literal".to_string(), start_idx))
                }
            }
        } else {
            text.push(first);
        }
        if first == '0' {
            if let Some((_, 'x' | 'X')) = self.chars.peek() {
                self.advance();
                let negative = text.starts_with('-');
                return self.process_hexadecimal(start_idx, negative)
            }
        }
        while let Some((_, peeked_char)) = self.chars.peek() {
            if peeked_char.is_ascii_digit() || matches!(peeked_char, '.' | 'e' | 'E' | '+' | '-') {
                text.push(*peeked_char);
                self.advance();
            } else {
                break
            }
        }
        Ok(Token::new(TokType::Number, text, start_idx))
    }

    fn tok_from_lexeme(&self, start: usize, end: usize) -> Token {
        let lexeme = &self.text[start..end];
        match lexeme {
            "true" => Token::structural(TokType::True, start),
            "false" => Token::structural(TokType::False, start),
            "null" => Token::structural(TokType::Null, start),
            // dirty input has no way to say "undefined" distinctly from
            // "null"; the collapse is one-way
            "undefined" => Token::structural(TokType::Null, start),
            // any other bare identifier is an unquoted key
            _ => Token::new(TokType::String, lexeme, start),
        }
    }

    fn process_identifier_or_const(&mut self) -> Result<Token, TokenizationError> {
        use unicode_general_category::{get_general_category, GeneralCategory};
        let (start_idx, start_char) = self.lookahead.expect("Unexpected end of input, was expecting identifier char");
        let mut end = start_idx + start_char.len_utf8();
        loop {
            match self.chars.peek() {
                None => break,
                Some((next_idx, next_char)) => {
                    if next_char.is_alphanumeric() || IDENTIFIER_PARTS.contains(*next_char) {
                        end = *next_idx + next_char.len_utf8();
                        self.advance();
                    } else {
                        match get_general_category(*next_char) {
                            GeneralCategory::NonspacingMark | GeneralCategory::SpacingMark => {
                                end = *next_idx + next_char.len_utf8();
                                self.advance();
                            }
                            _ => break,
                        }
                    }
                }
            }
        }
        Ok(self.tok_from_lexeme(start_idx, end))
    }

    fn process_comment(&mut self) -> Result<(), TokenizationError> {
        let (_start_idx, _slash) = self.lookahead.expect("Expected comment start");
        let (_, star_or_slash) = self.advance().expect("Expected second comment char");
        match star_or_slash {
            '/' => {
                loop {
                    match self.chars.peek() {
                        None => return Ok(()),
                        Some((_, '\n' | '\r' | '\u{2028}' | '\u{2029}')) => return Ok(()),
                        Some(_) => {
                            self.advance();
                        }
                    }
                }
            }
            '*' => {
                loop {
                    match self.advance() {
                        // unterminated block comments are tolerated: the rest
                        // of the input is comment
                        None => return Ok(()),
                        Some((_, '*')) => {
                            if let Some((_, '/')) = self.chars.peek() {
                                self.advance();
                                return Ok(())
                            }
                        }
                        Some(_) => {}
                    }
                }
            }
            _ => panic!("Invalid second comment char"),
        }
    }

    fn next_token(&mut self) -> Result<Token, TokenizationError> {
        // whitespace and comments are skipped iteratively; recursing here
        // would make stack depth proportional to the number of skipped runs
        loop {
            return match self.advance() {
                None => Ok(Token::structural(TokType::EOF, self.text.len())),
                Some((next_idx, next)) => {
                    match next {
                        '{' => Ok(Token::structural(TokType::LeftBrace, next_idx)),
                        '}' => Ok(Token::structural(TokType::RightBrace, next_idx)),
                        '[' => Ok(Token::structural(TokType::LeftBracket, next_idx)),
                        ']' => Ok(Token::structural(TokType::RightBracket, next_idx)),
                        ',' => Ok(Token::structural(TokType::Comma, next_idx)),
                        ':' => Ok(Token::structural(TokType::Colon, next_idx)),
                        '\'' | '"' => self.process_string(),
                        '.' | '+' | '-' => self.process_number(),
                        c if c.is_ascii_digit() => self.process_number(),
                        c if c.is_whitespace() => {
                            self.skip_whitespace();
                            continue
                        }
                        '/' => {
                            match self.chars.peek() {
                                Some((_, '/' | '*')) => {
                                    self.process_comment()?;
                                    continue
                                }
                                _ => {
                                    Err(self.make_error(TokenizationErrorKind::UnexpectedCharacter, "Unexpected character '/'".to_string(), next_idx))
                                }
                            }
                        }
                        c if c.is_alphabetic() || IDENTIFIER_START_SYMBOLS.contains(c) => {
                            self.process_identifier_or_const()
                        }
                        c => {
                            Err(self.make_error(TokenizationErrorKind::UnexpectedCharacter, format!("Unexpected character {:?}", c), next_idx))
                        }
                    }
                }
            }
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, TokenizationError> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokType::EOF;
            tokens.push(tok);
            if done {
                break Ok(tokens)
            }
        }
    }
}

/// Tokenizes with the default 100 MiB size cap.
pub fn tokenize_str(text: &'_ str) -> Result<Vec<Token>, TokenizationError> {
    tokenize_str_with_limit(text, DEFAULT_MAX_SIZE_BYTES)
}

/// Tokenizes after a length check; inputs over `max_size_bytes` fail with
/// `InputTooLarge` before any scanning happens.
pub fn tokenize_str_with_limit(text: &'_ str, max_size_bytes: usize) -> Result<Vec<Token>, TokenizationError> {
    if text.len() > max_size_bytes {
        return Err(TokenizationError {
            kind: TokenizationErrorKind::InputTooLarge,
            message: format!("Input of {} bytes exceeds the limit of {} bytes", text.len(), max_size_bytes),
            index: 0,
            lineno: 1,
            colno: 1,
            char_index: 0,
        })
    }
    Tokenizer::new(text).tokenize()
}

#[cfg(test)]
mod test {
    use super::TokType::*;
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokType> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty() {
        let toks = tokenize_str("").unwrap();
        assert_eq!(toks, vec![Token::structural(EOF, 0)]);
    }

    #[test]
    fn test_object_tokens() {
        let toks = tokenize_str("{}").unwrap();
        assert_eq!(toks, vec![Token::structural(LeftBrace, 0), Token::structural(RightBrace, 1), Token::structural(EOF, 2)]);
    }

    #[test]
    fn test_double_quoted_string() {
        let toks = tokenize_str("\"foo\"").unwrap();
        assert_eq!(toks[0], Token::new(String, "foo", 0));
    }

    #[test]
    fn test_double_quoted_escapes_pass_through() {
        let toks = tokenize_str(r#""a\"b\nA""#).unwrap();
        assert_eq!(toks[0], Token::new(String, r#"a\"b\nA"#, 0));
    }

    #[test]
    fn test_single_quoted_string_reescaped() {
        let toks = tokenize_str(r#"'it\'s "big"'"#).unwrap();
        assert_eq!(toks[0], Token::new(String, r#"it's \"big\""#, 0));
    }

    #[test]
    fn test_unquoted_key_is_string() {
        let toks = tokenize_str("{user: 1}").unwrap();
        assert_eq!(toks[1], Token::new(String, "user", 1));
    }

    #[test]
    fn test_keywords() {
        let toks = tokenize_str("[true,false,null]").unwrap();
        assert_eq!(kinds(&toks), vec![LeftBracket, True, Comma, False, Comma, Null, RightBracket, EOF]);
    }

    #[test]
    fn test_undefined_collapses_to_null() {
        let toks = tokenize_str("undefined").unwrap();
        assert_eq!(toks[0], Token::structural(Null, 0));
    }

    #[test]
    fn test_number_leading_dot() {
        let toks = tokenize_str(".5").unwrap();
        assert_eq!(toks[0], Token::new(Number, "0.5", 0));
    }

    #[test]
    fn test_number_negative_leading_dot() {
        let toks = tokenize_str("-.5").unwrap();
        assert_eq!(toks[0], Token::new(Number, "-0.5", 0));
    }

    #[test]
    fn test_number_leading_plus_dropped() {
        let toks = tokenize_str("+42").unwrap();
        assert_eq!(toks[0], Token::new(Number, "42", 0));
    }

    #[test]
    fn test_hexadecimal_to_decimal() {
        let toks = tokenize_str("0xFF").unwrap();
        assert_eq!(toks[0], Token::new(Number, "255", 0));
        let toks = tokenize_str("-0x10").unwrap();
        assert_eq!(toks[0], Token::new(Number, "-16", 0));
    }

    #[test]
    fn test_hexadecimal_missing_digits() {
        let err = tokenize_str("0x").unwrap_err();
        assert_eq!(err.kind, TokenizationErrorKind::UnexpectedCharacter);
    }

    #[test]
    fn test_exponent_kept_verbatim() {
        let toks = tokenize_str("1e-5").unwrap();
        assert_eq!(toks[0], Token::new(Number, "1e-5", 0));
    }

    #[test]
    fn test_comments_skipped() {
        let toks = tokenize_str("// hi\n[1] /* bye */").unwrap();
        assert_eq!(kinds(&toks), vec![LeftBracket, Number, RightBracket, EOF]);
    }

    #[test]
    fn test_many_comment_runs_use_constant_stack() {
        let text = "//x\n".repeat(500_000) + "1";
        let toks = tokenize_str(&text).unwrap();
        assert_eq!(kinds(&toks), vec![Number, EOF]);

        let spaced = " 1 ".repeat(300_000);
        let toks = tokenize_str(&spaced).unwrap();
        assert_eq!(toks.len(), 300_001);
    }

    #[test]
    fn test_unterminated_block_comment_tolerated() {
        let toks = tokenize_str("[1] /* no end").unwrap();
        assert_eq!(kinds(&toks), vec![LeftBracket, Number, RightBracket, EOF]);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize_str("{#}").unwrap_err();
        assert_eq!(err.kind, TokenizationErrorKind::UnexpectedCharacter);
        assert_eq!(err.index, 1);
    }

    #[test]
    fn test_size_guard_before_scanning() {
        // 11 bytes of garbage: the length check fires before the scan would
        let err = tokenize_str_with_limit("###########", 10).unwrap_err();
        assert_eq!(err.kind, TokenizationErrorKind::InputTooLarge);
        assert!(tokenize_str_with_limit("[1,2,3,4,]", 10).is_ok());
    }

    #[test]
    fn test_offsets() {
        let toks = tokenize_str("{ \"a\": 1 }").unwrap();
        assert_eq!(toks[1].offset, 2);
        assert_eq!(toks[3].offset, 7);
    }
}
