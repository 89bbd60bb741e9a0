//! DuckyScript front end and interpreter.
//!
//! - [`lexer`]: one line of text → one [`TokenKind`]
//! - [`loader`]: a whole script → a [`Program`] (tokens + function table)
//! - [`vars`]: the variable table, `$name` substitution, conditions
//! - [`engine`]: the [`Engine`] that runs a program against a HID backend
//!
//! # Quick start
//!
//! ```rust
//! use ducky::hid::Recorder;
//! use ducky::script::{Engine, Program, State};
//!
//! let rec = Recorder::new();
//! let mut engine = Engine::new(rec.clone());
//! engine.load(Program::parse_str("VAR $who = world\nSTRING hello $who\n").unwrap()).unwrap();
//! assert_eq!(engine.run(), State::Done);
//! assert_eq!(rec.typed(), "hello world");
//! ```

pub mod engine;
pub mod error;
pub mod lexer;
pub mod loader;
pub mod token;
pub mod vars;

pub use engine::{Engine, EngineHandle, SharedState, State, Status, StatusSink};
pub use error::{Error, LoadError, ParseError, RuntimeError, VarError};
pub use lexer::parse_line;
pub use loader::{count_lines, Function, Program};
pub use token::{KeyCombo, Token, TokenKind};
pub use vars::VarTable;

// ── Limits ────────────────────────────────────────────────────────────────────

/// Commands per program (blank and `REM` lines excluded).
pub const MAX_TOKENS: usize = 1024;
/// Characters per source line.
pub const MAX_LINE_LEN: usize = 512;
pub const MAX_VARS: usize = 16;
pub const MAX_FUNCS: usize = 16;
/// Nested `CALL`s.
pub const MAX_CALL_DEPTH: usize = 32;
pub const VAR_NAME_LEN: usize = 32;
pub const VAR_VALUE_LEN: usize = 128;
pub const FUNC_NAME_LEN: usize = 32;
/// Keys in one combo line, modifiers included.
pub const MAX_COMBO_KEYS: usize = 8;
