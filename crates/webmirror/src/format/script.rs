//! JavaScript canonicalization.
//!
//! The source is split into tokens (strings, template literals, regular
//! expressions, comments, numbers, words, punctuators) and printed back in
//! one fixed layout. The token sequence never changes, so the output means
//! what the input meant. Source line breaks survive only where automatic
//! semicolon insertion may depend on them.

use super::{ContentKind, INDENT};
use crate::error::FormatError;

/// Longest first, so that matching picks `>>>=` over `>>`.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@",
];

/// Binary operators printed with one space on each side.
const SPACED_OPERATORS: &[&str] = &[
    "=", "==", "===", "!=", "!==", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", ">>=", ">>>=",
    "&=", "|=", "^=", "&&=", "||=", "??=", "=>", "&&", "||", "??", "<", ">", "<=", ">=", "*",
    "/", "%", "**", "<<", ">>", ">>>", "&", "|", "^", "?",
];

/// Words after which a `/` starts a regular expression.
const REGEX_PRECEDERS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Words whose parenthesized header is followed by a statement, not an operand.
const HEADER_WORDS: &[&str] = &["if", "while", "for", "with"];

/// Words that end a statement when followed by a line break.
const RESTRICTED_WORDS: &[&str] = &["return", "throw", "break", "continue", "yield"];

/// Words separated from a following punctuator by a space.
const SPACE_AFTER_WORDS: &[&str] = &[
    "return", "typeof", "void", "delete", "throw", "case", "new", "in", "of", "instanceof",
    "yield", "await", "else", "do", "extends", "if", "for", "while", "switch", "catch", "with",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    Number,
    Str,
    Template,
    Regex,
    Punct,
    LineComment,
    BlockComment,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: Kind,
    text: &'a str,
    newline_before: bool,
}

impl Token<'_> {
    fn is(&self, punct: &str) -> bool {
        self.kind == Kind::Punct && self.text == punct
    }

    fn is_word_like(&self) -> bool {
        matches!(
            self.kind,
            Kind::Word | Kind::Number | Kind::Str | Kind::Template | Kind::Regex
        )
    }

    fn is_word_in(&self, words: &[&str]) -> bool {
        self.kind == Kind::Word && words.contains(&self.text)
    }

    fn is_comment(&self) -> bool {
        matches!(self.kind, Kind::LineComment | Kind::BlockComment)
    }
}

fn error(cause: impl Into<String>) -> FormatError {
    FormatError::new(ContentKind::Script, cause)
}

/// Tokenize and re-print JavaScript source in canonical layout.
pub fn format_script(raw: &str) -> Result<String, FormatError> {
    let tokens = tokenize(raw)?;
    let spaced = classify_spaced(&tokens);

    let mut printer = Printer::default();
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i];
        let next = tokens.get(i + 1).copied();

        if i > 0 {
            let prev = tokens[i - 1];
            if tok.newline_before && needs_source_break(&prev, &tok) {
                printer.newline();
            } else if needs_space(&prev, &tok, spaced[i - 1], spaced[i]) {
                printer.space();
            }
        }

        match tok.kind {
            Kind::LineComment => {
                printer.write(tok.text);
                printer.newline();
            }
            Kind::Punct => match tok.text {
                "{" => {
                    printer.write("{");
                    if next.is_some_and(|n| n.is("}")) {
                        printer.write("}");
                        i += 1;
                        printer.after_close_brace(tokens.get(i + 1));
                    } else {
                        printer.stack.push(b'{');
                        printer.depth += 1;
                        printer.newline();
                    }
                }
                "}" => {
                    printer.close(b'{')?;
                    printer.depth = printer.depth.saturating_sub(1);
                    printer.newline();
                    printer.write("}");
                    printer.after_close_brace(next.as_ref());
                }
                "(" => {
                    printer.stack.push(b'(');
                    printer.write("(");
                }
                "[" => {
                    printer.stack.push(b'[');
                    printer.write("[");
                }
                ")" => {
                    printer.close(b'(')?;
                    printer.write(")");
                }
                "]" => {
                    printer.close(b'[')?;
                    printer.write("]");
                }
                ";" => {
                    printer.write(";");
                    if printer.stack.last() != Some(&b'(') {
                        printer.newline();
                    }
                }
                other => printer.write(other),
            },
            _ => printer.write(tok.text),
        }
        i += 1;
    }

    if let Some(open) = printer.stack.last() {
        return Err(error(format!(
            "unbalanced brackets: `{}` is never closed",
            *open as char
        )));
    }

    let mut out = printer.out;
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

// ── Printing ──

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
    line_start: bool,
    stack: Vec<u8>,
}

impl Printer {
    fn newline(&mut self) {
        if !self.line_start && !self.out.is_empty() {
            self.out.push('\n');
            self.line_start = true;
        }
    }

    fn write(&mut self, text: &str) {
        if self.line_start {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.line_start = false;
        }
        self.out.push_str(text);
    }

    fn space(&mut self) {
        if !self.line_start && !self.out.is_empty() && !self.out.ends_with(' ') {
            self.out.push(' ');
        }
    }

    fn close(&mut self, expected: u8) -> Result<(), FormatError> {
        match self.stack.pop() {
            Some(open) if open == expected => Ok(()),
            Some(open) => Err(error(format!(
                "unbalanced brackets: `{}` closed by the wrong bracket",
                open as char
            ))),
            None => Err(error("unbalanced brackets: closing bracket without opener")),
        }
    }

    /// Continuations (`else`, `)`, `.`, operators) stay on the brace's line.
    fn after_close_brace(&mut self, next: Option<&Token<'_>>) {
        let Some(next) = next else {
            return;
        };
        let stays = match next.kind {
            Kind::Punct => !matches!(next.text, "{" | "!" | "~" | "++" | "--" | "@"),
            Kind::Template => true,
            Kind::Word => matches!(next.text, "else" | "catch" | "finally" | "while"),
            _ => false,
        };
        if !stays {
            self.newline();
        }
    }
}

/// Mark tokens printed as spaced binary operators.
fn classify_spaced(tokens: &[Token<'_>]) -> Vec<bool> {
    tokens
        .iter()
        .enumerate()
        .map(|(i, tok)| {
            if tok.kind != Kind::Punct {
                return false;
            }
            if SPACED_OPERATORS.contains(&tok.text) {
                return true;
            }
            if tok.text == "+" || tok.text == "-" {
                let prev = tokens[..i].iter().rev().find(|t| !t.is_comment());
                return match prev {
                    Some(p) if p.is_word_like() => !p.is_word_in(REGEX_PRECEDERS),
                    Some(p) => matches!(p.text, ")" | "]" | "++" | "--") && p.kind == Kind::Punct,
                    None => false,
                };
            }
            false
        })
        .collect()
}

/// A source line break between `prev` and `tok` that automatic semicolon
/// insertion may depend on.
fn needs_source_break(prev: &Token<'_>, tok: &Token<'_>) -> bool {
    if prev.is_word_in(RESTRICTED_WORDS) || tok.is("++") || tok.is("--") {
        return true;
    }
    if prev.is("}") && tok.is_word_in(&["else", "catch", "finally", "while"]) {
        return false;
    }
    let ends_expression = prev.is_word_like()
        || (prev.kind == Kind::Punct && matches!(prev.text, ")" | "]" | "}" | "++" | "--"));
    let starts_statement =
        tok.is_word_like() || (tok.kind == Kind::Punct && matches!(tok.text, "!" | "~"));
    ends_expression && starts_statement
}

fn needs_space(prev: &Token<'_>, tok: &Token<'_>, prev_spaced: bool, tok_spaced: bool) -> bool {
    if tok.is_comment() || prev.kind == Kind::BlockComment {
        return true;
    }
    if prev.is_word_like() && tok.is_word_like() {
        return true;
    }
    if prev_spaced || tok_spaced {
        return true;
    }
    if prev.kind == Kind::Number && (tok.is(".") || tok.is("?.")) {
        return true;
    }
    if prev.kind == Kind::Punct && tok.kind == Kind::Punct {
        // `+ +a` and `- -a` must not fuse into increment/decrement.
        let last = prev.text.chars().last();
        let first = tok.text.chars().next();
        if last == first && matches!(last, Some('+') | Some('-')) {
            return true;
        }
    }
    if tok.is("{") {
        return !(prev.kind == Kind::Punct && matches!(prev.text, "(" | "[" | "..." | "!" | "~" | "@"));
    }
    if prev.is(",") {
        return !(tok.kind == Kind::Punct && matches!(tok.text, ")" | "]" | "}"));
    }
    if prev.is(";") {
        return !(tok.is(")") || tok.is(";"));
    }
    if prev.is(":") {
        return true;
    }
    if (prev.is(")") || prev.is("}")) && tok.is_word_like() {
        return true;
    }
    if prev.is_word_in(SPACE_AFTER_WORDS) && tok.kind == Kind::Punct {
        return !matches!(tok.text, ";" | ")" | "]" | "," | "." | "?." | ":");
    }
    false
}

// ── Tokenizing ──

fn tokenize(src: &str) -> Result<Vec<Token<'_>>, FormatError> {
    let bytes = src.as_bytes();
    let mut tokens: Vec<Token<'_>> = Vec::new();
    let mut pos = 0;
    let mut newline = false;
    // One entry per open `(`: whether it opened an `if`/`for`/`while`/`with` header.
    let mut parens: Vec<bool> = Vec::new();
    let mut after_header = false;

    if src.starts_with("#!") {
        pos = line_end(bytes, 0);
        tokens.push(Token {
            kind: Kind::LineComment,
            text: &src[..pos],
            newline_before: false,
        });
    }

    while pos < bytes.len() {
        let b = bytes[pos];
        let start = pos;
        let kind = match b {
            b'\n' => {
                newline = true;
                pos += 1;
                continue;
            }
            b' ' | b'\t' | b'\r' | 0x0b | 0x0c => {
                pos += 1;
                continue;
            }
            b'/' if bytes.get(pos + 1) == Some(&b'/') => {
                pos = line_end(bytes, pos);
                Kind::LineComment
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos = block_comment_end(src, pos)?;
                Kind::BlockComment
            }
            b'/' if after_header || regex_allowed(tokens.iter().rev().find(|t| !t.is_comment())) => {
                pos = scan_regex(bytes, pos)?;
                Kind::Regex
            }
            b'\'' | b'"' => {
                pos = scan_string(bytes, pos)?;
                Kind::Str
            }
            b'`' => {
                pos = scan_template(bytes, pos)?;
                Kind::Template
            }
            b'0'..=b'9' => {
                pos = scan_number(bytes, pos);
                Kind::Number
            }
            b'.' if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                pos = scan_number(bytes, pos);
                Kind::Number
            }
            _ if is_word_byte(b) || b == b'#' => {
                pos = scan_word(bytes, pos + 1);
                Kind::Word
            }
            _ => {
                let punct = PUNCTUATORS
                    .iter()
                    .find(|p| src[pos..].starts_with(**p))
                    .ok_or_else(|| {
                        let ch = src[pos..].chars().next().unwrap_or('?');
                        error(format!("unexpected character {ch:?} at byte {pos}"))
                    })?;
                // `a?.5:1` is a conditional, not optional chaining.
                let len = if *punct == "?." && bytes.get(pos + 2).is_some_and(u8::is_ascii_digit)
                {
                    1
                } else {
                    punct.len()
                };
                pos += len;
                Kind::Punct
            }
        };
        let token = Token {
            kind,
            text: &src[start..pos],
            newline_before: newline,
        };
        if !token.is_comment() {
            after_header = false;
            if token.is("(") {
                let opens_header = tokens
                    .iter()
                    .rev()
                    .find(|t| !t.is_comment())
                    .is_some_and(|t| t.is_word_in(HEADER_WORDS));
                parens.push(opens_header);
            } else if token.is(")") {
                after_header = parens.pop().unwrap_or(false);
            }
        }
        tokens.push(token);
        newline = false;
    }

    Ok(tokens)
}

fn regex_allowed(prev: Option<&Token<'_>>) -> bool {
    match prev {
        None => true,
        Some(tok) => match tok.kind {
            Kind::Punct => !matches!(tok.text, ")" | "]" | "}" | "++" | "--"),
            Kind::Word => REGEX_PRECEDERS.contains(&tok.text),
            _ => false,
        },
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'\\' || b >= 0x80
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| from + offset)
}

fn block_comment_end(src: &str, start: usize) -> Result<usize, FormatError> {
    src[start + 2..]
        .find("*/")
        .map(|offset| start + 2 + offset + 2)
        .ok_or_else(|| error("unterminated block comment"))
}

fn scan_word(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(|&b| is_word_byte(b)) {
        i += 1;
    }
    i
}

fn scan_number(bytes: &[u8], start: usize) -> usize {
    let hex = bytes[start] == b'0' && matches!(bytes.get(start + 1), Some(b'x') | Some(b'X'));
    let mut i = start;
    loop {
        match bytes.get(i) {
            Some(&c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' => i += 1,
            Some(b'+') | Some(b'-') if !hex && matches!(bytes[i - 1], b'e' | b'E') => i += 1,
            _ => return i,
        }
    }
}

fn scan_string(bytes: &[u8], start: usize) -> Result<usize, FormatError> {
    let quote = bytes[start];
    let mut i = start + 1;
    loop {
        match bytes.get(i) {
            None | Some(b'\n') => return Err(error("unterminated string literal")),
            Some(b'\\') => {
                i += if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
                    3
                } else {
                    2
                };
            }
            Some(&c) if c == quote => return Ok(i + 1),
            Some(_) => i += 1,
        }
    }
}

fn scan_template(bytes: &[u8], start: usize) -> Result<usize, FormatError> {
    let mut i = start + 1;
    loop {
        match bytes.get(i) {
            None => return Err(error("unterminated template literal")),
            Some(b'\\') => i += 2,
            Some(b'`') => return Ok(i + 1),
            Some(b'$') if bytes.get(i + 1) == Some(&b'{') => {
                i = scan_substitution(bytes, i + 2)?;
            }
            Some(_) => i += 1,
        }
    }
}

/// Skip a `${ ... }` body; returns the index after its closing brace.
fn scan_substitution(bytes: &[u8], mut i: usize) -> Result<usize, FormatError> {
    let mut depth = 1usize;
    loop {
        match bytes.get(i) {
            None => return Err(error("unterminated template substitution")),
            Some(b'{') => depth += 1,
            Some(b'}') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            Some(b'\'') | Some(b'"') => {
                i = scan_string(bytes, i)?;
                continue;
            }
            Some(b'`') => {
                i = scan_template(bytes, i)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
}

fn scan_regex(bytes: &[u8], start: usize) -> Result<usize, FormatError> {
    let mut i = start + 1;
    let mut in_class = false;
    loop {
        match bytes.get(i) {
            None | Some(b'\n') => return Err(error("unterminated regular expression")),
            Some(b'\\') => {
                i += 2;
                continue;
            }
            Some(b'[') => in_class = true,
            Some(b']') => in_class = false,
            Some(b'/') if !in_class => {
                i += 1;
                while bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
                    i += 1;
                }
                return Ok(i);
            }
            Some(_) => {}
        }
        i += 1;
    }
}
