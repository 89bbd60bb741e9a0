//! Terminal front end for the CLI: a one-line progress display and the
//! pause/resume/stop key map.

use std::io::{self, Write};

use crossterm::{
    cursor, queue,
    style::{Print, Stylize},
    terminal::{self, ClearType},
};

use crate::hid::LedState;
use crate::script::{State, Status};

// ── Key map ───────────────────────────────────────────────────────────────────

/// What a keypress asks the running script to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
    /// Pause if running, resume if paused.
    Toggle,
    Stop,
}

/// Map one byte of raw-mode input to a [`Control`].
pub fn decode_key(b: u8) -> Option<Control> {
    match b {
        b'p' | b'P' => Some(Control::Pause),
        b'r' | b'R' => Some(Control::Resume),
        b' ' => Some(Control::Toggle),
        b'q' | b'Q' | 0x1b | 0x03 => Some(Control::Stop),
        _ => None,
    }
}

// ── Status line ───────────────────────────────────────────────────────────────

/// Renders [`Status`] snapshots as a single, continuously rewritten line.
pub struct Console<W: Write> {
    out: W,
    total_lines: usize,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, total_lines: usize) -> Self {
        Self { out, total_lines }
    }

    /// Redraw the status line.
    pub fn render(&mut self, status: &Status) -> io::Result<()> {
        let state = match status.state {
            State::Running => status.state.name().green(),
            State::Paused => status.state.name().yellow(),
            State::Error => status.state.name().red(),
            _ => status.state.name().bold(),
        };
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            Print(format!("[{state}] ")),
            Print(format_status(status, self.total_lines)),
        )?;
        self.out.flush()
    }

    /// Leave the status line in place and move to a fresh line, then print
    /// the fault, if any.
    pub fn finish(&mut self, status: &Status) -> io::Result<()> {
        self.render(status)?;
        queue!(self.out, Print("\r\n"))?;
        if let Some(err) = &status.error {
            queue!(self.out, Print(format!("{}\r\n", err.as_str().red())))?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Uncolored body of the status line: progress, current command, LEDs.
pub fn format_status(status: &Status, total_lines: usize) -> String {
    let leds = status.leds;
    let lit = |on: bool| if on { '*' } else { '-' };
    let mut s = format!(
        "Line {} / {}  [N:{} C:{} S:{}]",
        status.line,
        total_lines,
        lit(leds.contains(LedState::NUM)),
        lit(leds.contains(LedState::CAPS)),
        lit(leds.contains(LedState::SCROLL)),
    );
    if !status.command.is_empty() {
        s.push_str("  ");
        s.push_str(&status.command);
    }
    match status.state {
        State::Running => s.push_str("  (p:pause q:stop)"),
        State::Paused => s.push_str("  (r:resume q:stop)"),
        _ => {}
    }
    s
}

// ── Raw mode ──────────────────────────────────────────────────────────────────

/// Enable raw mode.  Returns a guard that disables it on drop.
pub fn enter_raw_mode() -> io::Result<RawModeGuard> {
    terminal::enable_raw_mode()?;
    Ok(RawModeGuard(()))
}

/// RAII guard: disables raw mode when dropped.
pub struct RawModeGuard(());

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
