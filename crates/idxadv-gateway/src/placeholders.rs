//! Typed-null substitution for positional placeholders
//!
//! Statements harvested from a statement history arrive with `$N`
//! placeholders and no bound values. The planner still needs type
//! information to cost them, so each placeholder is replaced with a typed
//! null inferred from its syntactic neighbourhood:
//!
//! - ordering / arithmetic operators nearby -> `NULL::integer`
//! - pattern-matching operators nearby      -> `NULL::text`
//! - boolean connectives nearby             -> `NULL::boolean`
//! - anything else (plain equality included) -> `NULL::text`
//!
//! Placeholders inside string literals, quoted identifiers, comments and
//! dollar-quoted bodies are left untouched.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaceholderKind {
    Integer,
    Text,
    Boolean,
}

impl PlaceholderKind {
    fn null_literal(self) -> &'static str {
        match self {
            Self::Integer => "NULL::integer",
            Self::Text => "NULL::text",
            Self::Boolean => "NULL::boolean",
        }
    }
}

/// Replace every `$N` placeholder in `sql` with a typed null.
pub fn substitute_placeholders(sql: &str) -> String {
    let spans = placeholder_spans(sql);
    if spans.is_empty() {
        return sql.to_string();
    }
    let mut out = sql.to_string();
    // Right-to-left so earlier byte offsets stay valid.
    for &(start, end) in spans.iter().rev() {
        let kind = classify(sql, start, end);
        tracing::trace!(placeholder = &sql[start..end], ?kind, "substituting placeholder");
        out.replace_range(start..end, kind.null_literal());
    }
    out
}

/// Byte spans of `$N` tokens outside strings, comments and dollar quotes.
fn placeholder_spans(sql: &str) -> Vec<(usize, usize)> {
    let bytes = sql.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        // doubled quote is an escaped quote
                        if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            b'$' if bytes.get(i + 1) == Some(&b'$') => {
                // dollar-quoted body: skip to the closing $$
                let body_start = i + 2;
                match sql[body_start..].find("$$") {
                    Some(idx) => i = body_start + idx + 2,
                    None => i = bytes.len(),
                }
            }
            b'$' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                spans.push((start, i));
            }
            _ => i += 1,
        }
    }
    spans
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Sym(String),
    Word(String),
    None,
}

const SYMBOL_CHARS: &[char] = &['=', '<', '>', '!', '+', '-', '*', '/', '%', '~'];

fn is_ordering_or_arithmetic(sym: &str) -> bool {
    matches!(
        sym,
        "<" | ">" | "<=" | ">=" | "+" | "-" | "*" | "/" | "%"
    )
}

fn is_equality_like(sym: &str) -> bool {
    matches!(sym, "=" | "<>" | "!=")
}

fn is_pattern_op(sym: &str) -> bool {
    matches!(sym, "~~" | "!~~" | "~~*" | "!~~*")
}

/// Token immediately before byte offset `at`, and the offset where it starts.
fn prev_token(sql: &str, at: usize) -> (Tok, usize) {
    let head = sql[..at].trim_end();
    if head.is_empty() {
        return (Tok::None, 0);
    }
    let chars: Vec<char> = head.chars().collect();
    let last = *chars.last().expect("non-empty");
    if SYMBOL_CHARS.contains(&last) {
        let mut start = chars.len();
        while start > 0 && SYMBOL_CHARS.contains(&chars[start - 1]) {
            start -= 1;
        }
        let sym: String = chars[start..].iter().collect();
        let byte_start = head.len() - sym.len();
        return (Tok::Sym(sym), byte_start);
    }
    if last == '(' || last == ',' {
        return (Tok::Sym(last.to_string()), head.len() - 1);
    }
    if last.is_ascii_alphanumeric() || last == '_' || last == '$' {
        let mut start = chars.len();
        while start > 0
            && (chars[start - 1].is_ascii_alphanumeric()
                || chars[start - 1] == '_'
                || chars[start - 1] == '$')
        {
            start -= 1;
        }
        let word: String = chars[start..].iter().collect();
        let byte_start = head.len() - word.len();
        return (Tok::Word(word.to_uppercase()), byte_start);
    }
    (Tok::None, 0)
}

/// Token immediately after byte offset `at`.
fn next_token(sql: &str, at: usize) -> Tok {
    let tail = sql[at..].trim_start();
    let mut chars = tail.chars().peekable();
    match chars.peek() {
        Some(c) if SYMBOL_CHARS.contains(c) => {
            let sym: String = tail.chars().take_while(|c| SYMBOL_CHARS.contains(c)).collect();
            Tok::Sym(sym)
        }
        Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
            let word: String = tail
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            Tok::Word(word.to_uppercase())
        }
        _ => Tok::None,
    }
}

/// True when the `AND` directly before a placeholder closes a `BETWEEN`.
///
/// `x BETWEEN $1 AND $2` would otherwise read the second placeholder as a
/// boolean operand.
fn between_precedes(sql: &str, and_start: usize) -> bool {
    let mut at = and_start;
    for _ in 0..6 {
        let (tok, start) = prev_token(sql, at);
        match tok {
            Tok::Word(w) if w == "BETWEEN" => return true,
            Tok::Word(w) if w == "AND" || w == "OR" => return false,
            Tok::None => return false,
            _ => at = start,
        }
    }
    false
}

fn classify(sql: &str, start: usize, end: usize) -> PlaceholderKind {
    let (prev, prev_start) = prev_token(sql, start);
    match &prev {
        Tok::Sym(s) if is_equality_like(s) => return PlaceholderKind::Text,
        Tok::Sym(s) if is_ordering_or_arithmetic(s) => return PlaceholderKind::Integer,
        Tok::Sym(s) if is_pattern_op(s) => return PlaceholderKind::Text,
        Tok::Word(w) if w == "BETWEEN" || w == "LIMIT" || w == "OFFSET" => {
            return PlaceholderKind::Integer;
        }
        Tok::Word(w) if w == "LIKE" || w == "ILIKE" => return PlaceholderKind::Text,
        Tok::Word(w) if w == "AND" => {
            return if between_precedes(sql, prev_start) {
                PlaceholderKind::Integer
            } else {
                PlaceholderKind::Boolean
            };
        }
        Tok::Word(w) if w == "OR" || w == "NOT" => return PlaceholderKind::Boolean,
        _ => {}
    }
    match next_token(sql, end) {
        Tok::Sym(s) if is_ordering_or_arithmetic(&s) => PlaceholderKind::Integer,
        Tok::Sym(s) if is_pattern_op(&s) => PlaceholderKind::Text,
        Tok::Word(w) if w == "LIKE" || w == "ILIKE" => PlaceholderKind::Text,
        Tok::Word(w) if w == "AND" || w == "OR" => PlaceholderKind::Boolean,
        _ => PlaceholderKind::Text,
    }
}
