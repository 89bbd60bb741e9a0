//! Settings file parser.
//!
//! One setting per line, `name = value` or `name value`:
//!
//! | Setting         | Values                         | Default |
//! |-----------------|--------------------------------|---------|
//! | `speed`         | `0.5`, `1`, `2`, `4` (`x` optional) | `1` |
//! | `default_delay` | milliseconds                   | `0`     |
//! | `scripts_dir`   | directory of `.ds` scripts     | data dir `scripts/` |
//!
//! Lines starting with `#` or `;` are comments.  Unknown names are skipped so
//! a newer settings file still loads.

use std::fmt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::script::Engine;

// ── Speed ─────────────────────────────────────────────────────────────────────

/// Selectable playback speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    Half,
    #[default]
    Normal,
    Double,
    Quad,
}

impl Speed {
    pub const ALL: &'static [Speed] = &[Speed::Half, Speed::Normal, Speed::Double, Speed::Quad];

    /// Multiplier handed to [`Engine::set_speed`].
    pub fn multiplier(self) -> f32 {
        match self {
            Speed::Half => 0.5,
            Speed::Normal => 1.0,
            Speed::Double => 2.0,
            Speed::Quad => 4.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Speed::Half => "0.5x",
            Speed::Normal => "1x",
            Speed::Double => "2x",
            Speed::Quad => "4x",
        }
    }

    /// Parse `0.5`, `1`, `2`, `4`, with or without a trailing `x`.
    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_suffix(|c| c == 'x' || c == 'X').unwrap_or(s);
        match s {
            "0.5" | ".5" => Some(Speed::Half),
            "1" | "1.0" => Some(Speed::Normal),
            "2" | "2.0" => Some(Speed::Double),
            "4" | "4.0" => Some(Speed::Quad),
            _ => None,
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a settings file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Playback settings applied to every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub speed: Speed,
    /// Inter-command delay in milliseconds.
    pub default_delay: u32,
    /// Overrides [`Settings::default_scripts_dir`].
    pub scripts_dir: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a settings string.  Returns the settings and any per-line
    /// errors; a bad line leaves that setting at its previous value.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut settings = Settings::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let (name, value) = match line.split_once('=') {
                Some((n, v)) => (n.trim(), v.trim()),
                None => line
                    .split_once(|c: char| c.is_ascii_whitespace())
                    .map(|(n, v)| (n, v.trim()))
                    .unwrap_or((line, "")),
            };

            if let Err(message) = settings.set(name, value) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (settings, errors)
    }

    /// Read and parse a settings file.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply one `name = value` pair.  Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name.to_ascii_lowercase().as_str() {
            "speed" => {
                self.speed = Speed::from_name(value)
                    .ok_or_else(|| format!("invalid speed: {value:?} (expected 0.5, 1, 2 or 4)"))?;
            }
            "default_delay" => {
                self.default_delay = value
                    .parse()
                    .map_err(|_| format!("invalid default_delay: {value:?}"))?;
            }
            "scripts_dir" => {
                if value.is_empty() {
                    return Err("scripts_dir needs a directory".to_owned());
                }
                self.scripts_dir = Some(PathBuf::from(value));
            }
            _ => {}
        }
        Ok(())
    }

    /// Render in the format [`load_str`](Self::load_str) reads.
    pub fn to_config_string(&self) -> String {
        let mut out = format!(
            "speed = {}\ndefault_delay = {}\n",
            self.speed.label(),
            self.default_delay
        );
        if let Some(dir) = &self.scripts_dir {
            out.push_str(&format!("scripts_dir = {}\n", dir.display()));
        }
        out
    }

    /// Push speed and default delay into `engine`.  Call after
    /// [`Engine::load`].
    pub fn apply(&self, engine: &mut Engine) {
        engine.set_speed(self.speed.multiplier());
        engine.set_default_delay(self.default_delay);
    }

    /// The directory scripts are listed from.
    pub fn scripts_dir(&self) -> Option<PathBuf> {
        self.scripts_dir.clone().or_else(Self::default_scripts_dir)
    }

    // ── Locations ─────────────────────────────────────────────────────────

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "ducky")
    }

    /// `<config dir>/ducky/settings`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|d| d.config_dir().join("settings"))
    }

    /// `<data dir>/ducky/scripts`, if a home directory is known.
    pub fn default_scripts_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|d| d.data_dir().join("scripts"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
