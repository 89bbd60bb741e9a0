//! Parsed script commands.

use std::fmt;

use crate::keys::KeyCode;

use super::MAX_COMBO_KEYS;

/// Up to [`MAX_COMBO_KEYS`] keycodes pressed together, modifiers first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyCombo {
    keys: [KeyCode; MAX_COMBO_KEYS],
    len: u8,
}

impl KeyCombo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key.  Returns `false` (and leaves the combo unchanged) when
    /// the combo is already full.
    pub fn push(&mut self, code: KeyCode) -> bool {
        let i = self.len as usize;
        if i >= MAX_COMBO_KEYS {
            return false;
        }
        self.keys[i] = code;
        self.len += 1;
        true
    }

    pub fn keys(&self) -> &[KeyCode] {
        &self.keys[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl FromIterator<KeyCode> for KeyCombo {
    /// Keys past [`MAX_COMBO_KEYS`] are dropped.
    fn from_iter<I: IntoIterator<Item = KeyCode>>(iter: I) -> Self {
        let mut combo = Self::new();
        for code in iter {
            if !combo.push(code) {
                break;
            }
        }
        combo
    }
}

/// What a line of script asks the engine to do.
///
/// Free-form arguments (conditions, `VAR` assignments, LED and button names)
/// are kept as the raw remainder of the line; they are interpreted when the
/// command executes, after variable substitution where that applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `REM …` or a blank line.  Never stored in a [`Program`](super::Program).
    Comment,
    /// `STRING text`
    String(String),
    /// `STRINGLN text` (text followed by Enter)
    StringLn(String),
    /// `DELAY ms`
    Delay(u32),
    /// `DEFAULT_DELAY ms` / `DEFAULTDELAY ms`
    DefaultDelay(u32),
    /// `DEFAULT_STRING_DELAY ms`
    DefaultStringDelay(u32),
    /// A single named key.  `code` is `None` only for hand-built tokens; the
    /// engine then resolves `name` when the token runs.
    Key { name: String, code: Option<KeyCode> },
    /// Modifier(s) plus a key, e.g. `CTRL ALT DELETE`.
    Combo(KeyCombo),
    /// `REPEAT n`; always at least 1.
    Repeat(u32),
    Stop,
    If(String),
    Else,
    EndIf,
    While(String),
    EndWhile,
    /// `VAR $name = value`; the text after `VAR `.
    Var(String),
    Function(String),
    EndFunction,
    Call(String),
    LedCheck(String),
    LedWait(String),
    OsDetect,
    MouseMove { x: i8, y: i8 },
    MouseClick(String),
    MouseScroll(i8),
    ConsumerKey(String),
}

impl TokenKind {
    /// The script keyword for this kind, or `None` for keys and combos.
    pub fn keyword(&self) -> Option<&'static str> {
        let kw = match self {
            TokenKind::Comment => "REM",
            TokenKind::String(_) => "STRING",
            TokenKind::StringLn(_) => "STRINGLN",
            TokenKind::Delay(_) => "DELAY",
            TokenKind::DefaultDelay(_) => "DEFAULT_DELAY",
            TokenKind::DefaultStringDelay(_) => "DEFAULT_STRING_DELAY",
            TokenKind::Key { .. } | TokenKind::Combo(_) => return None,
            TokenKind::Repeat(_) => "REPEAT",
            TokenKind::Stop => "STOP",
            TokenKind::If(_) => "IF",
            TokenKind::Else => "ELSE",
            TokenKind::EndIf => "END_IF",
            TokenKind::While(_) => "WHILE",
            TokenKind::EndWhile => "END_WHILE",
            TokenKind::Var(_) => "VAR",
            TokenKind::Function(_) => "FUNCTION",
            TokenKind::EndFunction => "END_FUNCTION",
            TokenKind::Call(_) => "CALL",
            TokenKind::LedCheck(_) => "LED_CHECK",
            TokenKind::LedWait(_) => "LED_WAIT",
            TokenKind::OsDetect => "OS_DETECT",
            TokenKind::MouseMove { .. } => "MOUSE_MOVE",
            TokenKind::MouseClick(_) => "MOUSE_CLICK",
            TokenKind::MouseScroll(_) => "MOUSE_SCROLL",
            TokenKind::ConsumerKey(_) => "CONSUMER_KEY",
        };
        Some(kw)
    }

    /// The free-form text argument, if this kind carries one.
    pub fn text(&self) -> Option<&str> {
        match self {
            TokenKind::String(s)
            | TokenKind::StringLn(s)
            | TokenKind::If(s)
            | TokenKind::While(s)
            | TokenKind::Var(s)
            | TokenKind::Function(s)
            | TokenKind::Call(s)
            | TokenKind::LedCheck(s)
            | TokenKind::LedWait(s)
            | TokenKind::MouseClick(s)
            | TokenKind::ConsumerKey(s) => Some(s),
            TokenKind::Key { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether `REPEAT` can replay this command.
    pub fn is_repeatable(&self) -> bool {
        matches!(
            self,
            TokenKind::String(_)
                | TokenKind::StringLn(_)
                | TokenKind::Delay(_)
                | TokenKind::Combo(_)
                | TokenKind::Key { .. }
        )
    }
}

/// One parsed command and the 1-based source line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Self { kind, line }
    }

    /// Short human-readable summary for progress displays.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::String(s) | TokenKind::StringLn(s) => {
                format!("STRING {}", truncate(s, 40))
            }
            TokenKind::Delay(ms) => format!("DELAY {ms}"),
            TokenKind::Combo(c) => format!("COMBO ({} keys)", c.len()),
            TokenKind::MouseMove { x, y } => format!("MOUSE {x},{y}"),
            TokenKind::LedWait(args) => format!("LED_WAIT {}", truncate(args, 50)),
            TokenKind::OsDetect => "OS_DETECT".to_string(),
            other => other.text().map(|t| truncate(t, 60).to_string()).unwrap_or_default(),
        }
    }
}

impl fmt::Display for Token {
    /// Renders the token back as a script line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Key { name, .. } => f.write_str(name),
            TokenKind::Combo(c) => write!(f, "<combo of {} keys>", c.len()),
            TokenKind::Delay(n)
            | TokenKind::DefaultDelay(n)
            | TokenKind::DefaultStringDelay(n)
            | TokenKind::Repeat(n) => write!(f, "{} {n}", self.kind.keyword().unwrap_or_default()),
            TokenKind::MouseMove { x, y } => write!(f, "MOUSE_MOVE {x} {y}"),
            TokenKind::MouseScroll(n) => write!(f, "MOUSE_SCROLL {n}"),
            kind => {
                let kw = kind.keyword().unwrap_or_default();
                match kind.text() {
                    Some(t) => write!(f, "{kw} {t}"),
                    None => f.write_str(kw),
                }
            }
        }
    }
}

/// The first `max` characters of `s`.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
