//! Command-line argument parsing.
//!
//! Usage:
//!   ducky [-d] [-f<settings>] [-s<speed>] [-D<ms>] [-l] [<script>]

use std::path::PathBuf;

use crate::config::Speed;

pub const USAGE: &str = "Usage: ducky [-d] [-f<settings>] [-s<speed>] [-D<ms>] [-l] [<script>]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Log verbosity: each `-d` raises it one level.
    pub debug: u8,
    /// Settings file override (`-f<file>`).
    pub settings: Option<PathBuf>,
    /// Speed override (`-s<speed>`).
    pub speed: Option<Speed>,
    /// Default inter-command delay override (`-D<ms>`).
    pub default_delay: Option<u32>,
    /// List scripts instead of running one (`-l`).
    pub list: bool,
    /// Show usage (`-h`).
    pub help: bool,
    /// Script to run.
    pub script: Option<PathBuf>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            positional.extend(argv[i + 1..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = args.debug.saturating_add(1),
                'l' => args.list = true,
                'h' => args.help = true,

                // Options taking a value: attached (-s2) or separate (-s 2).
                c @ ('f' | 's' | 'D') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{c} requires an argument"));
                    };
                    match c {
                        'f' => args.settings = Some(PathBuf::from(value)),
                        's' => {
                            args.speed = Some(
                                Speed::from_name(&value)
                                    .ok_or_else(|| format!("invalid speed: {value}"))?,
                            );
                        }
                        _ => {
                            args.default_delay = Some(
                                value
                                    .parse()
                                    .map_err(|_| format!("invalid delay: {value}"))?,
                            );
                        }
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => args.script = positional.pop().map(PathBuf::from),
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
