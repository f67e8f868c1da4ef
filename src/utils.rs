pub(crate) fn get_line_col_char(doc: &str, byte_offset: usize) -> (usize, usize, usize) {
    if byte_offset == 0 {
        return (1, 1, 0)
    }
    let mut lineno: usize = 1;
    let mut colno: usize = 0;
    let mut codepoint_off: usize = 0;
    for (cp_off, (byte_off, char)) in doc.char_indices().enumerate() {
        codepoint_off = cp_off;
        colno += 1;
        if byte_off == byte_offset {
            return (lineno, colno, cp_off)
        }
        if char == '\n' {
            lineno += 1;
            colno = 0;
        }
    }
    // Offsets at the end of the document point one past the last character
    (lineno, colno + 1, codepoint_off + 1)
}


/// Rewrite the interior of a single-quoted string for double-quoted output.
///
/// An escaped single quote becomes a literal quote, bare double quotes and
/// control characters gain escapes, and every other escape sequence is passed
/// through untouched.
pub(crate) fn reescape_single_quoted(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                match chars.next() {
                    Some('\'') => escaped.push('\''),
                    Some(next) => { escaped.push('\\'); escaped.push(next); }
                    // a trailing backslash can only come from an unterminated
                    // string; emit it escaped so the output stays parseable
                    None => escaped.push_str("\\\\"),
                }
            }
            '"'  => { escaped.push('\\'); escaped.push('"');  }
            '\n' => { escaped.push('\\'); escaped.push('n');  }
            '\r' => { escaped.push('\\'); escaped.push('r');  }
            '\t' => { escaped.push('\\'); escaped.push('t');  }
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_line_col_at_end_of_doc() {
        assert_eq!(get_line_col_char("ab", 2), (1, 3, 2));
        assert_eq!(get_line_col_char("", 0), (1, 1, 0));
    }

    #[test]
    fn test_reescape_plain() {
        assert_eq!(reescape_single_quoted("alice"), "alice");
    }

    #[test]
    fn test_reescape_escaped_single_quote() {
        assert_eq!(reescape_single_quoted(r"it\'s"), "it's");
    }

    #[test]
    fn test_reescape_bare_double_quote_and_controls() {
        assert_eq!(reescape_single_quoted("say \"hi\"\n"), r#"say \"hi\"\n"#);
        assert_eq!(reescape_single_quoted("a\tb\r"), r"a\tb\r");
    }

    #[test]
    fn test_reescape_passthrough_escapes() {
        assert_eq!(reescape_single_quoted(r"a\nbA"), r"a\nbA");
        assert_eq!(reescape_single_quoted(r#"a\"b"#), r#"a\"b"#);
    }
}
