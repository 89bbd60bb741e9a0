//! Line tokenizer.
//!
//! [`parse_line`] turns one line of script into a [`TokenKind`].  Resolution
//! order, first match wins:
//!
//! 1. blank line or `REM` comment
//! 2. a command keyword (case-sensitive, followed by one space and the
//!    argument text where the command takes one)
//! 3. a key combo: the first word names a modifier
//! 4. a single key name, or a single printable character
//!
//! Anything else is `Unknown command: <line>`.

use crate::keys::{self, KeyCode};

use super::error::ParseError;
use super::token::{truncate, KeyCombo, TokenKind};
use super::MAX_COMBO_KEYS;

/// Tokenize one line of script.
///
/// Surrounding whitespace (including a trailing `\r`) is ignored.  Argument
/// text is kept verbatim after the single separating space.
pub fn parse_line(raw: &str) -> Result<TokenKind, ParseError> {
    let line = raw.trim();

    if line.is_empty() || bare_or_arg(line, "REM").is_some() {
        return Ok(TokenKind::Comment);
    }

    // ── Text ──────────────────────────────────────────────────────────────
    // STRINGLN first: "STRING" is a prefix of it.
    if let Some(text) = bare_or_arg(line, "STRINGLN") {
        return Ok(TokenKind::StringLn(text.to_string()));
    }
    if let Some(text) = bare_or_arg(line, "STRING") {
        return Ok(TokenKind::String(text.to_string()));
    }

    // ── Timing ────────────────────────────────────────────────────────────
    if let Some(arg) = arg(line, "DELAY") {
        return Ok(TokenKind::Delay(millis(arg)));
    }
    if let Some(arg) = arg(line, "DEFAULT_DELAY").or_else(|| arg(line, "DEFAULTDELAY")) {
        return Ok(TokenKind::DefaultDelay(millis(arg)));
    }
    if let Some(arg) = arg(line, "DEFAULT_STRING_DELAY") {
        return Ok(TokenKind::DefaultStringDelay(millis(arg)));
    }
    if let Some(arg) = arg(line, "REPEAT") {
        let n = atoi(arg);
        let n = if n <= 0 { 1 } else { n.min(u32::MAX as i64) as u32 };
        return Ok(TokenKind::Repeat(n));
    }
    if line == "STOP" {
        return Ok(TokenKind::Stop);
    }

    // ── Control flow ──────────────────────────────────────────────────────
    if let Some(cond) = arg(line, "IF") {
        return Ok(TokenKind::If(cond.to_string()));
    }
    if line == "ELSE" {
        return Ok(TokenKind::Else);
    }
    if line == "END_IF" {
        return Ok(TokenKind::EndIf);
    }
    if let Some(cond) = arg(line, "WHILE") {
        return Ok(TokenKind::While(cond.to_string()));
    }
    if line == "END_WHILE" {
        return Ok(TokenKind::EndWhile);
    }
    if let Some(expr) = arg(line, "VAR") {
        return Ok(TokenKind::Var(expr.to_string()));
    }
    if let Some(name) = arg(line, "FUNCTION") {
        return Ok(TokenKind::Function(name.to_string()));
    }
    if line == "END_FUNCTION" {
        return Ok(TokenKind::EndFunction);
    }
    if let Some(name) = arg(line, "CALL") {
        return Ok(TokenKind::Call(name.to_string()));
    }

    // ── LEDs ──────────────────────────────────────────────────────────────
    if let Some(which) = arg(line, "LED_CHECK") {
        return Ok(TokenKind::LedCheck(which.to_string()));
    }
    if let Some(args) = arg(line, "LED_WAIT") {
        return Ok(TokenKind::LedWait(args.to_string()));
    }
    if line == "OS_DETECT" {
        return Ok(TokenKind::OsDetect);
    }

    // ── Mouse / consumer ──────────────────────────────────────────────────
    if let Some(args) = arg(line, "MOUSE_MOVE") {
        let (x, rest) = parse_int(args);
        let y = if rest.is_empty() { 0 } else { parse_int(rest.trim_start()).0 };
        return Ok(TokenKind::MouseMove { x: clamp_i8(x), y: clamp_i8(y) });
    }
    if let Some(button) = arg(line, "MOUSE_CLICK") {
        return Ok(TokenKind::MouseClick(button.to_string()));
    }
    if let Some(amount) = arg(line, "MOUSE_SCROLL") {
        return Ok(TokenKind::MouseScroll(clamp_i8(atoi(amount))));
    }
    if let Some(name) = arg(line, "CONSUMER_KEY") {
        return Ok(TokenKind::ConsumerKey(name.to_string()));
    }

    // ── Keys ──────────────────────────────────────────────────────────────
    if let Some(kind) = parse_combo(line)? {
        return Ok(kind);
    }
    if let Some(code) = keys::key_from_name(line) {
        return Ok(TokenKind::Key { name: line.to_string(), code: Some(code) });
    }

    Err(ParseError::new(format!("Unknown command: {}", truncate(line, 60))))
}

// ── Keyword helpers ───────────────────────────────────────────────────────────

/// `KEYWORD rest` → `Some(rest)`.
fn arg<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    line.strip_prefix(keyword)?.strip_prefix(' ')
}

/// Like [`arg`], but the bare keyword on its own yields `Some("")`.
fn bare_or_arg<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    if line == keyword {
        Some("")
    } else {
        arg(line, keyword)
    }
}

// ── Key combos ────────────────────────────────────────────────────────────────

/// Parse `MOD [MOD …] KEY`.
///
/// Returns `Ok(None)` when the line is not a combo (first word is not a
/// modifier) or names a key that does not resolve, so the caller can fall
/// back to single-key lookup.  Words before the last may be modifiers or any
/// other key name.
fn parse_combo(line: &str) -> Result<Option<TokenKind>, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&first, _)) = words.split_first() else {
        return Ok(None);
    };
    let Some(first_code) = keys::modifier(first) else {
        return Ok(None);
    };

    if words.len() == 1 {
        return Ok(Some(TokenKind::Key {
            name: first.to_string(),
            code: Some(first_code),
        }));
    }
    if words.len() > MAX_COMBO_KEYS {
        return Err(ParseError::new(format!(
            "Too many keys in combo (max {MAX_COMBO_KEYS})"
        )));
    }

    let mut combo = KeyCombo::new();
    let last = words.len() - 1;
    for (i, word) in words.iter().enumerate() {
        let code = if i < last {
            keys::modifier(word).or_else(|| keys::key_from_name(word))
        } else {
            keys::key_from_name(word)
        };
        match code {
            Some(code) => {
                combo.push(code);
            }
            None => return Ok(None),
        }
    }
    Ok(Some(TokenKind::Combo(combo)))
}

/// Resolve a key name at execution time (for tokens built without a code).
pub fn resolve_key(name: &str) -> Option<KeyCode> {
    keys::modifier(name).or_else(|| keys::key_from_name(name))
}

// ── Numbers ───────────────────────────────────────────────────────────────────

/// Permissive integer parse: leading whitespace, optional sign, then as many
/// digits as are present.  Returns the value (saturating) and the unparsed
/// remainder.  No digits at all parses as 0.
pub(crate) fn parse_int(s: &str) -> (i64, &str) {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return (0, s);
    }
    let value = digits[..end].bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add((b - b'0') as i64)
    });
    (if negative { -value } else { value }, &digits[end..])
}

/// [`parse_int`] without the remainder.
pub(crate) fn atoi(s: &str) -> i64 {
    parse_int(s).0
}

/// Milliseconds argument; negative values clamp to 0.
fn millis(s: &str) -> u32 {
    atoi(s).clamp(0, u32::MAX as i64) as u32
}

fn clamp_i8(v: i64) -> i8 {
    v.clamp(i8::MIN as i64, i8::MAX as i64) as i8
}

// ── Tests ─────────────────────────────────────────────────────────────────────
