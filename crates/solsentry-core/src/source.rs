//! Solidity source preprocessing shared by the scanner and gas estimator.
//!
//! Nothing here parses Solidity properly. Comments are blanked, functions are
//! located by keyword and brace matching, and state variables are picked out
//! of contract-level statements. Good enough for heuristics, nothing more.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::ScanError;

/// Compile a static pattern.
#[allow(clippy::expect_used)]
pub(crate) fn re(pattern: &str) -> Regex {
    // Patterns are compile-time constants covered by tests.
    Regex::new(pattern).expect("static regex pattern is valid")
}

static PRAGMA: LazyLock<Regex> = LazyLock::new(|| re(r"pragma\s+solidity\s+([^;]+);"));
static FUNCTION_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    re(r"\b(?:function\s+([A-Za-z_]\w*)|(constructor|receive|fallback))\s*\(")
});
/// `.call(`, `.delegatecall(`, `.staticcall(`, `.send(`, `.transfer(`, with optional `{value: ..}`.
pub(crate) static EXTERNAL_CALL: LazyLock<Regex> = LazyLock::new(|| {
    re(r"\.(?:call|delegatecall|staticcall|send|transfer)\s*(?:\{[^}]*\})?\s*\(")
});
static STATE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?s)^(?P<ty>mapping\s*\(.+\)|[A-Za-z_][\w.]*(?:\s*\[\s*\w*\s*\])*)\s+(?P<mods>(?:(?:public|private|internal|constant|immutable|override|transient)\s+)*)(?P<name>[A-Za-z_]\w*)\s*(?:=.*)?$")
});

/// Reject empty or oversized input before any analysis runs.
///
/// # Errors
///
/// Returns [`ScanError::EmptySource`] or [`ScanError::TooLarge`].
pub fn validate_source(source: &str, max_bytes: usize) -> Result<(), ScanError> {
    if source.trim().is_empty() {
        return Err(ScanError::EmptySource);
    }
    if source.len() > max_bytes {
        return Err(ScanError::TooLarge {
            actual: source.len(),
            limit: max_bytes,
        });
    }
    Ok(())
}

/// Hex-encoded SHA-256 of the raw source.
#[must_use]
pub fn source_hash(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// The version constraint of the first `pragma solidity` directive.
#[must_use]
pub fn parse_pragma(source: &str) -> Option<String> {
    let code = strip_comments(source);
    PRAGMA
        .captures(&code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_owned())
}

/// Blank out `//` and `/* */` comments, keeping newlines and byte offsets.
///
/// String literals are skipped so `"http://..."` survives intact.
#[must_use]
pub fn strip_comments(source: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        Line,
        Block,
        Str(char),
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::Line;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::Block;
                }
                '"' | '\'' => {
                    out.push(c);
                    state = State::Str(c);
                }
                _ => out.push(c),
            },
            State::Line => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Code;
                } else {
                    push_blank(&mut out, c);
                }
            }
            State::Block => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    push_blank(&mut out, c);
                }
            }
            State::Str(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else if c == quote || c == '\n' {
                    state = State::Code;
                }
            }
        }
    }

    out
}

/// Replace a character with spaces of the same UTF-8 width.
fn push_blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

/// 1-based line number of a byte offset.
#[must_use]
pub fn line_at(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

/// Non-blank lines once comments are removed.
#[must_use]
pub fn lines_of_code(code: &str) -> usize {
    code.lines().filter(|l| !l.trim().is_empty()).count()
}

/// A function-like block found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBlock {
    /// Function name, or `constructor` / `receive` / `fallback`.
    pub name: String,
    /// `public`, `external`, `internal`, or `private`.
    pub visibility: String,
    /// `pure`, `view`, `payable`, or `nonpayable`.
    pub mutability: String,
    /// 1-based line of the declaration.
    pub line: usize,
    /// Byte range of the body (between the braces), or `None` for declarations.
    pub body: Option<(usize, usize)>,
}

impl FunctionBlock {
    /// The body text within `code`, or `""` for bodiless declarations.
    #[must_use]
    pub fn body_text<'a>(&self, code: &'a str) -> &'a str {
        self.body.map_or("", |(s, e)| &code[s..e])
    }
}

/// Locate every function, constructor, `receive`, and `fallback` in
/// comment-stripped code.
#[must_use]
pub fn functions(code: &str) -> Vec<FunctionBlock> {
    let mut out = Vec::new();

    for caps in FUNCTION_HEAD.captures_iter(code) {
        let Some(whole) = caps.get(0) else { continue };
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or_else(String::new, |m| m.as_str().to_owned());

        // Header runs from the keyword to the first `{` or `;`.
        let rest = &code[whole.end()..];
        let Some(stop) = rest.find(['{', ';']) else { continue };
        let header = &rest[..stop];
        let body = if rest.as_bytes()[stop] == b'{' {
            let open = whole.end() + stop;
            matching_brace(code, open).map(|close| (open + 1, close))
        } else {
            None
        };

        out.push(FunctionBlock {
            visibility: visibility_of(&name, header).to_owned(),
            mutability: mutability_of(header).to_owned(),
            name,
            line: line_at(code, whole.start()),
            body,
        });
    }

    out
}

fn visibility_of(name: &str, header: &str) -> &'static str {
    let words: Vec<&str> = header
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .collect();
    for v in ["external", "public", "internal", "private"] {
        if words.contains(&v) {
            return v;
        }
    }
    match name {
        "receive" | "fallback" => "external",
        _ => "public",
    }
}

fn mutability_of(header: &str) -> &'static str {
    let words: Vec<&str> = header
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .collect();
    for m in ["pure", "view", "payable"] {
        if words.contains(&m) {
            return m;
        }
    }
    "nonpayable"
}

/// Byte offset of the `}` matching the `{` at `open`.
#[must_use]
pub fn matching_brace(code: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in code.as_bytes().iter().enumerate().skip(open) {
        match b {
            b'{' => depth = depth.saturating_add(1),
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// A contract-level state variable declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVar {
    pub name: String,
    pub type_name: String,
    pub constant: bool,
    pub line: usize,
}

const NON_VARIABLE_KEYWORDS: [&str; 12] = [
    "function", "event", "modifier", "struct", "enum", "using", "error", "constructor",
    "fallback", "receive", "pragma", "import",
];

/// Collect state variables declared directly inside contract bodies.
#[must_use]
pub fn state_variables(code: &str) -> Vec<StateVar> {
    let mut vars = Vec::new();
    let mut depth = 0usize;
    let mut stmt_start: Option<usize> = None;

    for (i, b) in code.bytes().enumerate() {
        match b {
            b'{' | b'}' => {
                depth = if b == b'{' {
                    depth.saturating_add(1)
                } else {
                    depth.saturating_sub(1)
                };
                stmt_start = None;
            }
            b';' if depth == 1 => {
                if let Some(start) = stmt_start.take() {
                    if let Some(var) = parse_state_var(code, start, i) {
                        vars.push(var);
                    }
                }
            }
            _ if depth == 1 && stmt_start.is_none() && !b.is_ascii_whitespace() => {
                stmt_start = Some(i);
            }
            _ => {}
        }
    }

    vars
}

fn parse_state_var(code: &str, start: usize, end: usize) -> Option<StateVar> {
    let stmt = code[start..end].trim();
    let first = stmt.split_whitespace().next()?;
    if NON_VARIABLE_KEYWORDS.contains(&first) {
        return None;
    }
    let caps = STATE_VAR.captures(stmt)?;
    let mods = caps.name("mods").map_or("", |m| m.as_str());
    Some(StateVar {
        name: caps.name("name")?.as_str().to_owned(),
        type_name: caps.name("ty")?.as_str().split_whitespace().collect::<Vec<_>>().join(" "),
        constant: mods.contains("constant") || mods.contains("immutable"),
        line: line_at(code, start),
    })
}

/// Number of writes to state variable `name` in `text`: assignments,
/// compound assignments, `delete`, and increments.
#[must_use]
pub fn count_state_writes(text: &str, name: &str) -> usize {
    let name = regex::escape(name);
    let pattern = format!(
        r"(?:\b{name}\s*(?:\[(?:[^\[\]]|\[[^\]]*\])*\]\s*|\.\w+\s*)*(?:[-+*/%|&^]?=[^=]|\+\+|--))|(?:\bdelete\s+{name}\b)|(?:(?:\+\+|--)\s*{name}\b)"
    );
    Regex::new(&pattern).map_or(0, |r| r.find_iter(text).count())
}
