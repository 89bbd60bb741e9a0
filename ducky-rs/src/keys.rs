//! Key-name and keycode tables.
//!
//! Every key, modifier, printable character, consumer-control usage and
//! mouse button a script can name resolves to a numeric code through the
//! tables in this module.  The tables are pure data.
//!
//! ## Keycode format
//!
//! A [`KeyCode`] is a USB HID keyboard usage ID in the low bits.  Bit 15
//! ([`KeyCode::SHIFT_FLAG`]) marks a printable character that has to be typed
//! with Left Shift held (`A`, `!`, `{`, …).  The flag is only ever set by
//! [`char_key`]; named keys and modifiers never carry it.

// ── KeyCode ───────────────────────────────────────────────────────────────────

/// A HID keyboard usage, optionally tagged as "requires Shift".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyCode(u16);

impl KeyCode {
    /// Bit marking a character that is typed with Shift held.
    pub const SHIFT_FLAG: u16 = 0x8000;

    pub const NONE: Self = Self(0);

    // ── Editing / navigation ──────────────────────────────────────────────
    pub const RETURN: Self         = Self(0x28);
    pub const ESCAPE: Self         = Self(0x29);
    pub const BACKSPACE: Self      = Self(0x2A);
    pub const TAB: Self            = Self(0x2B);
    pub const SPACE: Self          = Self(0x2C);
    pub const CAPS_LOCK: Self      = Self(0x39);
    pub const PRINT_SCREEN: Self   = Self(0x46);
    pub const SCROLL_LOCK: Self    = Self(0x47);
    pub const PAUSE: Self          = Self(0x48);
    pub const INSERT: Self         = Self(0x49);
    pub const HOME: Self           = Self(0x4A);
    pub const PAGE_UP: Self        = Self(0x4B);
    pub const DELETE_FORWARD: Self = Self(0x4C);
    pub const END: Self            = Self(0x4D);
    pub const PAGE_DOWN: Self      = Self(0x4E);
    pub const RIGHT_ARROW: Self    = Self(0x4F);
    pub const LEFT_ARROW: Self     = Self(0x50);
    pub const DOWN_ARROW: Self     = Self(0x51);
    pub const UP_ARROW: Self       = Self(0x52);
    pub const NUM_LOCK: Self       = Self(0x53);
    pub const APPLICATION: Self    = Self(0x65);

    // ── Function keys ─────────────────────────────────────────────────────
    pub const F1: Self  = Self(0x3A);
    pub const F2: Self  = Self(0x3B);
    pub const F3: Self  = Self(0x3C);
    pub const F4: Self  = Self(0x3D);
    pub const F5: Self  = Self(0x3E);
    pub const F6: Self  = Self(0x3F);
    pub const F7: Self  = Self(0x40);
    pub const F8: Self  = Self(0x41);
    pub const F9: Self  = Self(0x42);
    pub const F10: Self = Self(0x43);
    pub const F11: Self = Self(0x44);
    pub const F12: Self = Self(0x45);

    // ── Modifiers ─────────────────────────────────────────────────────────
    pub const LEFT_CTRL: Self  = Self(0xE0);
    pub const LEFT_SHIFT: Self = Self(0xE1);
    pub const LEFT_ALT: Self   = Self(0xE2);
    pub const LEFT_GUI: Self   = Self(0xE3);

    // Usages used only to build the ASCII table.
    const A: u16 = 0x04;
    const DIGIT_1: u16 = 0x1E;
    const DIGIT_0: u16 = 0x27;
    const MINUS: u16 = 0x2D;
    const EQUAL: u16 = 0x2E;
    const OPEN_BRACKET: u16 = 0x2F;
    const CLOSE_BRACKET: u16 = 0x30;
    const BACKSLASH: u16 = 0x31;
    const SEMICOLON: u16 = 0x33;
    const APOSTROPHE: u16 = 0x34;
    const GRAVE: u16 = 0x35;
    const COMMA: u16 = 0x36;
    const DOT: u16 = 0x37;
    const SLASH: u16 = 0x38;

    /// Wrap a raw value (usage ID plus optional [`SHIFT_FLAG`](Self::SHIFT_FLAG)).
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// The raw value, including the shift flag.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// The HID usage ID with the shift flag stripped.
    pub const fn usage(self) -> u16 {
        self.0 & !Self::SHIFT_FLAG
    }

    /// Returns `true` if this key must be typed with Shift held.
    pub const fn needs_shift(self) -> bool {
        self.0 & Self::SHIFT_FLAG != 0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    const fn shifted(usage: u16) -> Self {
        Self(usage | Self::SHIFT_FLAG)
    }

    const fn plain(usage: u16) -> Self {
        Self(usage)
    }
}

// ── Named keys ────────────────────────────────────────────────────────────────

/// Human-readable key names accepted on a line of their own or as the last
/// word of a combo.  Matched case-insensitively.
pub const NAMED_KEYS: &[(&str, KeyCode)] = &[
    // Navigation / editing
    ("ENTER",       KeyCode::RETURN),
    ("RETURN",      KeyCode::RETURN),
    ("TAB",         KeyCode::TAB),
    ("ESCAPE",      KeyCode::ESCAPE),
    ("ESC",         KeyCode::ESCAPE),
    ("SPACE",       KeyCode::SPACE),
    ("BACKSPACE",   KeyCode::BACKSPACE),
    ("DELETE",      KeyCode::DELETE_FORWARD),
    ("DEL",         KeyCode::DELETE_FORWARD),
    ("HOME",        KeyCode::HOME),
    ("END",         KeyCode::END),
    ("INSERT",      KeyCode::INSERT),
    ("PAGEUP",      KeyCode::PAGE_UP),
    ("PAGE_UP",     KeyCode::PAGE_UP),
    ("PAGEDOWN",    KeyCode::PAGE_DOWN),
    ("PAGE_DOWN",   KeyCode::PAGE_DOWN),
    ("UPARROW",     KeyCode::UP_ARROW),
    ("UP",          KeyCode::UP_ARROW),
    ("DOWNARROW",   KeyCode::DOWN_ARROW),
    ("DOWN",        KeyCode::DOWN_ARROW),
    ("LEFTARROW",   KeyCode::LEFT_ARROW),
    ("LEFT",        KeyCode::LEFT_ARROW),
    ("RIGHTARROW",  KeyCode::RIGHT_ARROW),
    ("RIGHT",       KeyCode::RIGHT_ARROW),
    ("PRINTSCREEN", KeyCode::PRINT_SCREEN),
    ("PAUSE",       KeyCode::PAUSE),
    ("BREAK",       KeyCode::PAUSE),
    ("CAPSLOCK",    KeyCode::CAPS_LOCK),
    ("CAPS_LOCK",   KeyCode::CAPS_LOCK),
    ("NUMLOCK",     KeyCode::NUM_LOCK),
    ("NUM_LOCK",    KeyCode::NUM_LOCK),
    ("SCROLLLOCK",  KeyCode::SCROLL_LOCK),
    ("SCROLL_LOCK", KeyCode::SCROLL_LOCK),
    ("MENU",        KeyCode::APPLICATION),
    ("APP",         KeyCode::APPLICATION),
    // Function keys
    ("F1",  KeyCode::F1),
    ("F2",  KeyCode::F2),
    ("F3",  KeyCode::F3),
    ("F4",  KeyCode::F4),
    ("F5",  KeyCode::F5),
    ("F6",  KeyCode::F6),
    ("F7",  KeyCode::F7),
    ("F8",  KeyCode::F8),
    ("F9",  KeyCode::F9),
    ("F10", KeyCode::F10),
    ("F11", KeyCode::F11),
    ("F12", KeyCode::F12),
    // Modifiers pressed on their own
    ("GUI",     KeyCode::LEFT_GUI),
    ("WINDOWS", KeyCode::LEFT_GUI),
    ("COMMAND", KeyCode::LEFT_GUI),
    ("ALT",     KeyCode::LEFT_ALT),
    ("CTRL",    KeyCode::LEFT_CTRL),
    ("CONTROL", KeyCode::LEFT_CTRL),
    ("SHIFT",   KeyCode::LEFT_SHIFT),
];

/// Modifier names.  A line whose first word is one of these is a key combo.
pub const MODIFIERS: &[(&str, KeyCode)] = &[
    ("CTRL",    KeyCode::LEFT_CTRL),
    ("CONTROL", KeyCode::LEFT_CTRL),
    ("ALT",     KeyCode::LEFT_ALT),
    ("SHIFT",   KeyCode::LEFT_SHIFT),
    ("GUI",     KeyCode::LEFT_GUI),
    ("WINDOWS", KeyCode::LEFT_GUI),
    ("COMMAND", KeyCode::LEFT_GUI),
];

fn lookup<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, v)| v)
}

/// Resolve a modifier name (case-insensitive).
pub fn modifier(name: &str) -> Option<KeyCode> {
    lookup(MODIFIERS, name)
}

/// Returns `true` if `word` names a modifier.
pub fn is_modifier(word: &str) -> bool {
    modifier(word).is_some()
}

/// Resolve a key name to its keycode.
///
/// Named keys are matched case-insensitively first; failing that, a name that
/// is exactly one printable ASCII character maps through [`char_key`] (so
/// `"a"` and `"A"` differ: the latter carries the shift flag).
pub fn key_from_name(name: &str) -> Option<KeyCode> {
    if let Some(code) = lookup(NAMED_KEYS, name) {
        return Some(code);
    }
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => char_key(ch),
        _ => None,
    }
}

// ── ASCII → keycode ───────────────────────────────────────────────────────────

/// Map a printable ASCII character (`' '..='~'`) to the key that types it on a
/// US layout.  Returns `None` for anything else (control characters, non-ASCII).
pub fn char_key(ch: char) -> Option<KeyCode> {
    if !(' '..='~').contains(&ch) {
        return None;
    }
    let b = ch as u8;
    let key = match b {
        b'a'..=b'z' => KeyCode::plain(KeyCode::A + (b - b'a') as u16),
        b'A'..=b'Z' => KeyCode::shifted(KeyCode::A + (b - b'A') as u16),
        b'0' => KeyCode::plain(KeyCode::DIGIT_0),
        b'1'..=b'9' => KeyCode::plain(KeyCode::DIGIT_1 + (b - b'1') as u16),
        b' ' => KeyCode::SPACE,
        b'!' => KeyCode::shifted(KeyCode::DIGIT_1),
        b'@' => KeyCode::shifted(KeyCode::DIGIT_1 + 1),
        b'#' => KeyCode::shifted(KeyCode::DIGIT_1 + 2),
        b'$' => KeyCode::shifted(KeyCode::DIGIT_1 + 3),
        b'%' => KeyCode::shifted(KeyCode::DIGIT_1 + 4),
        b'^' => KeyCode::shifted(KeyCode::DIGIT_1 + 5),
        b'&' => KeyCode::shifted(KeyCode::DIGIT_1 + 6),
        b'*' => KeyCode::shifted(KeyCode::DIGIT_1 + 7),
        b'(' => KeyCode::shifted(KeyCode::DIGIT_1 + 8),
        b')' => KeyCode::shifted(KeyCode::DIGIT_0),
        b'\'' => KeyCode::plain(KeyCode::APOSTROPHE),
        b'"' => KeyCode::shifted(KeyCode::APOSTROPHE),
        b',' => KeyCode::plain(KeyCode::COMMA),
        b'<' => KeyCode::shifted(KeyCode::COMMA),
        b'-' => KeyCode::plain(KeyCode::MINUS),
        b'_' => KeyCode::shifted(KeyCode::MINUS),
        b'.' => KeyCode::plain(KeyCode::DOT),
        b'>' => KeyCode::shifted(KeyCode::DOT),
        b'/' => KeyCode::plain(KeyCode::SLASH),
        b'?' => KeyCode::shifted(KeyCode::SLASH),
        b';' => KeyCode::plain(KeyCode::SEMICOLON),
        b':' => KeyCode::shifted(KeyCode::SEMICOLON),
        b'=' => KeyCode::plain(KeyCode::EQUAL),
        b'+' => KeyCode::shifted(KeyCode::EQUAL),
        b'[' => KeyCode::plain(KeyCode::OPEN_BRACKET),
        b'{' => KeyCode::shifted(KeyCode::OPEN_BRACKET),
        b']' => KeyCode::plain(KeyCode::CLOSE_BRACKET),
        b'}' => KeyCode::shifted(KeyCode::CLOSE_BRACKET),
        b'\\' => KeyCode::plain(KeyCode::BACKSLASH),
        b'|' => KeyCode::shifted(KeyCode::BACKSLASH),
        b'`' => KeyCode::plain(KeyCode::GRAVE),
        b'~' => KeyCode::shifted(KeyCode::GRAVE),
        _ => return None,
    };
    Some(key)
}

// ── Consumer control ──────────────────────────────────────────────────────────

/// Consumer-page usage names for `CONSUMER_KEY`.
pub const CONSUMER_KEYS: &[(&str, u16)] = &[
    // Media transport
    ("PLAY",           0xB0),
    ("PAUSE",          0xB1),
    ("PLAY_PAUSE",     0xCD),
    ("STOP",           0xB7),
    ("RECORD",         0xB2),
    ("NEXT_TRACK",     0xB5),
    ("PREV_TRACK",     0xB6),
    ("PREVIOUS_TRACK", 0xB6),
    ("FAST_FORWARD",   0xB3),
    ("FF",             0xB3),
    ("REWIND",         0xB4),
    ("RW",             0xB4),
    ("EJECT",          0xB8),
    ("RANDOM_PLAY",    0xB9),
    ("REPEAT",         0xBC),
    // Volume
    ("VOLUME_UP",   0xE9),
    ("VOL_UP",      0xE9),
    ("VOLUME_DOWN", 0xEA),
    ("VOL_DOWN",    0xEA),
    ("MUTE",        0xE2),
    ("BASS_BOOST",  0xE5),
    // Power
    ("POWER", 0x30),
    ("SLEEP", 0x32),
    // Menu navigation
    ("MENU",        0x40),
    ("MENU_PICK",   0x41),
    ("MENU_UP",     0x42),
    ("MENU_DOWN",   0x43),
    ("MENU_LEFT",   0x44),
    ("MENU_RIGHT",  0x45),
    ("MENU_ESCAPE", 0x46),
    // Application launchers
    ("EMAIL",       0x18A),
    ("CALCULATOR",  0x192),
    ("MY_COMPUTER", 0x194),
    ("EXPLORER",    0x194),
    ("BROWSER",     0x196),
    ("INTERNET",    0x196),
    // Application controls
    ("AC_SEARCH",    0x221),
    ("AC_HOME",      0x223),
    ("AC_BACK",      0x224),
    ("AC_FORWARD",   0x225),
    ("AC_STOP",      0x226),
    ("AC_REFRESH",   0x227),
    ("AC_BOOKMARKS", 0x22A),
    ("AC_ZOOM_IN",   0x22D),
    ("AC_ZOOM_OUT",  0x22E),
    ("BROWSER_HOME",      0x223),
    ("BROWSER_BACK",      0x224),
    ("BROWSER_FORWARD",   0x225),
    ("BROWSER_STOP",      0x226),
    ("BROWSER_REFRESH",   0x227),
    ("BROWSER_SEARCH",    0x221),
    ("BROWSER_BOOKMARKS", 0x22A),
    ("BROWSER_FAVORITES", 0x22A),
    ("SNAPSHOT", 0x65),
];

/// Resolve a consumer-control name, or a raw `0x`-prefixed hex usage.
///
/// Leading whitespace is ignored.  Returns `None` for unknown names and for
/// a zero usage.
pub fn consumer_usage(name: &str) -> Option<u16> {
    let name = name.trim();
    if let Some(usage) = lookup(CONSUMER_KEYS, name) {
        return Some(usage);
    }
    let hex = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X"))?;
    let digits: String = hex.chars().take_while(char::is_ascii_hexdigit).collect();
    match u16::from_str_radix(&digits, 16) {
        Ok(0) | Err(_) => None,
        Ok(usage) => Some(usage),
    }
}

// ── Mouse buttons ─────────────────────────────────────────────────────────────

/// Mouse button bits as sent in a HID mouse report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left = 0x01,
    Right = 0x02,
    Middle = 0x04,
}

impl MouseButton {
    /// Parse a button name (case-insensitive, surrounding whitespace
    /// ignored).  Anything unrecognised is the left button.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("RIGHT") {
            MouseButton::Right
        } else if name.eq_ignore_ascii_case("MIDDLE") {
            MouseButton::Middle
        } else {
            MouseButton::Left
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
