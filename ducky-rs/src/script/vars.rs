//! Script variables, `$name` substitution and `IF`/`WHILE` conditions.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use super::error::VarError;
use super::lexer::atoi;
use super::{MAX_VARS, VAR_NAME_LEN, VAR_VALUE_LEN};

/// Bounded name → value table.  Update-or-insert only; nothing is removed
/// except by [`clear`](Self::clear) on reload.
#[derive(Debug, Default, Clone)]
pub struct VarTable {
    vars: HashMap<String, String>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Set (or overwrite) a variable.
    ///
    /// Fails without touching the table when the name is empty or too long,
    /// the value is too long, or the table is full and `name` is new.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), VarError> {
        if name.is_empty() {
            return Err(VarError::EmptyName);
        }
        if name.chars().count() > VAR_NAME_LEN {
            return Err(VarError::NameTooLong { max: VAR_NAME_LEN });
        }
        if value.chars().count() > VAR_VALUE_LEN {
            return Err(VarError::ValueTooLong { max: VAR_VALUE_LEN });
        }
        if let Some(slot) = self.vars.get_mut(name) {
            value.clone_into(slot);
            return Ok(());
        }
        if self.vars.len() >= MAX_VARS {
            return Err(VarError::TooMany { max: MAX_VARS });
        }
        self.vars.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Iterate over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Expand `$name` and `${name}` references in `input`.
    ///
    /// A bare name is the longest run of ASCII alphanumerics and `_`; a
    /// braced name runs to the closing `}` (or the end of the string).
    /// Unknown names expand to nothing.
    pub fn substitute(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
                match braced.find('}') {
                    Some(end) => (&braced[..end], &braced[end + 1..]),
                    None => (braced, ""),
                }
            } else {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                after.split_at(end)
            };
            if let Some(value) = self.get(name) {
                out.push_str(value);
            }
            rest = tail;
        }
        out.push_str(rest);
        out
    }
}

// ── Conditions ────────────────────────────────────────────────────────────────

/// Evaluate an already-substituted `IF`/`WHILE` condition.
///
/// * `TRUE` / `FALSE` (any case) are literal.
/// * If `==` occurs anywhere, the text splits at its first occurrence and
///   the trimmed sides are compared as exact strings.  Otherwise `!=` is
///   tried the same way.
/// * Anything else is read as an integer: true iff nonzero.
pub fn evaluate_condition(cond: &str) -> bool {
    let cond = cond.trim();
    if cond.eq_ignore_ascii_case("TRUE") {
        return true;
    }
    if cond.eq_ignore_ascii_case("FALSE") {
        return false;
    }
    if let Some((lhs, rhs)) = cond.split_once("==") {
        return lhs.trim() == rhs.trim();
    }
    if let Some((lhs, rhs)) = cond.split_once("!=") {
        return lhs.trim() != rhs.trim();
    }
    atoi(cond) != 0
}

// ── Assignment ────────────────────────────────────────────────────────────────

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\$([^\s=]+)\s*=\s*(.*)$").expect("assignment pattern is valid")
    })
}

/// Split `$name = value` into its name (without `$`) and raw value text.
/// Returns `None` for malformed input.
pub fn parse_assignment(expr: &str) -> Option<(&str, &str)> {
    let caps = assignment_re().captures(expr)?;
    let name = caps.get(1)?.as_str();
    let value = caps.get(2).map_or("", |m| m.as_str());
    Some((name, value))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
