//! Interpreter core.
//!
//! [`Engine::run`] executes a loaded [`Program`] one token at a time against
//! a [`Hid`] backend.  It blocks, so callers normally move the engine onto a
//! worker thread (see [`crate::worker`]) and drive it through an
//! [`EngineHandle`].
//!
//! ## Cross-thread control
//!
//! The execution state lives in a [`SharedState`] (an `AtomicU8`) shared by
//! the engine and every handle.  It is both the authoritative state and the
//! signal: `pause`/`resume`/`stop` are compare-and-swap transitions, and the
//! run loop re-reads it before every token.  Worst-case latencies:
//!
//! | where              | how the change is noticed        |
//! |--------------------|----------------------------------|
//! | between tokens     | next loop iteration              |
//! | while paused       | 100 ms poll                      |
//! | inside `LED_WAIT`  | 50 ms poll                       |
//! | `DELAY` / defaults | after the sleep returns          |

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::hid::{Hid, Led, LedState};
use crate::keys::{self, KeyCode, MouseButton};

use super::error::{Error, LoadError, RuntimeError, VarError};
use super::lexer::resolve_key;
use super::loader::Program;
use super::token::{KeyCombo, Token, TokenKind};
use super::vars::{evaluate_condition, parse_assignment, VarTable};
use super::MAX_CALL_DEPTH;

const PAUSE_POLL: Duration = Duration::from_millis(100);
const LED_POLL: Duration = Duration::from_millis(50);
const KEY_HOLD: Duration = Duration::from_millis(10);
const OS_DETECT_TIMEOUT: Duration = Duration::from_millis(500);
const OS_DETECT_SETTLE: Duration = Duration::from_millis(100);
const OS_MAC_MAX: Duration = Duration::from_millis(25);
const OS_WIN_MAX: Duration = Duration::from_millis(70);

// ── State ─────────────────────────────────────────────────────────────────────

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    Idle = 0,
    Loaded = 1,
    Running = 2,
    Paused = 3,
    Done = 4,
    Error = 5,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => State::Loaded,
            2 => State::Running,
            3 => State::Paused,
            4 => State::Done,
            5 => State::Error,
            _ => State::Idle,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            State::Idle => "IDLE",
            State::Loaded => "READY",
            State::Running => "RUNNING",
            State::Paused => "PAUSED",
            State::Done => "DONE",
            State::Error => "ERROR",
        }
    }

    /// `Running` or `Paused`.
    pub fn is_active(self) -> bool {
        matches!(self, State::Running | State::Paused)
    }

    /// `Done` or `Error`.
    pub fn is_finished(self) -> bool {
        matches!(self, State::Done | State::Error)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Atomic cell holding a [`State`].
#[derive(Debug)]
pub struct SharedState(AtomicU8);

impl SharedState {
    pub fn new(state: State) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> State {
        State::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from → to` atomically.  Returns `false` if the state was not
    /// `from`.
    pub fn transition(&self, from: State, to: State) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(State::Idle)
    }
}

/// Cloneable, thread-safe control surface for a running [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    state: Arc<SharedState>,
}

impl EngineHandle {
    pub fn state(&self) -> State {
        self.state.load()
    }

    /// `Running → Paused`.  No-op (returns `false`) from any other state.
    pub fn pause(&self) -> bool {
        self.state.transition(State::Running, State::Paused)
    }

    /// `Paused → Running`.  No-op (returns `false`) from any other state.
    pub fn resume(&self) -> bool {
        self.state.transition(State::Paused, State::Running)
    }

    /// `Running | Paused → Done`.  The worker notices at its next check,
    /// releases held keys and returns.  Idempotent.
    pub fn stop(&self) -> bool {
        self.state.transition(State::Running, State::Done)
            || self.state.transition(State::Paused, State::Done)
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Plain-data snapshot handed to a [`StatusSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: State,
    /// Source line of the current command (last one run, once finished).
    pub line: usize,
    /// Short description of the current command.
    pub command: String,
    pub leds: LedState,
    pub error: Option<String>,
    pub error_line: Option<usize>,
}

/// Receives [`Status`] snapshots from the engine's thread.
pub trait StatusSink {
    fn status(&mut self, status: &Status);
}

impl<F> StatusSink for F
where
    F: FnMut(&Status),
{
    fn status(&mut self, status: &Status) {
        self(status)
    }
}

impl StatusSink for UnboundedSender<Status> {
    fn status(&mut self, status: &Status) {
        // A closed receiver just means nobody is watching any more.
        let _ = self.send(status.clone());
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// How the program counter moves after a command.
enum Flow {
    /// Advance to the next token.
    Next,
    /// Resume just after the given index.
    After(usize),
    /// Resume at the given index, without the inter-command delay.
    Jump(usize),
    /// `STOP`.
    Halt,
}

/// The script interpreter.
pub struct Engine {
    hid: Box<dyn Hid + Send>,
    program: Program,
    pc: usize,
    vars: VarTable,
    call_stack: Vec<usize>,
    state: Arc<SharedState>,
    speed: f32,
    default_delay: u32,
    default_string_delay: u32,
    leds: LedState,
    skipping_definition: bool,
    last_line: usize,
    fault: Option<Error>,
    sink: Option<Box<dyn StatusSink + Send>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("pc", &self.pc)
            .field("tokens", &self.program.len())
            .field("speed", &self.speed)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(hid: impl Hid + Send + 'static) -> Self {
        Self {
            hid: Box::new(hid),
            program: Program::default(),
            pc: 0,
            vars: VarTable::new(),
            call_stack: Vec::with_capacity(MAX_CALL_DEPTH),
            state: Arc::new(SharedState::default()),
            speed: 1.0,
            default_delay: 0,
            default_string_delay: 0,
            leds: LedState::EMPTY,
            skipping_definition: false,
            last_line: 0,
            fault: None,
            sink: None,
        }
    }

    /// Reset to `Idle`, discarding any loaded program, variables, fault,
    /// speed and delay settings.  The HID backend and status sink are kept.
    pub fn init(&mut self) {
        self.program = Program::default();
        self.reset_run_state();
        self.speed = 1.0;
        self.default_delay = 0;
        self.default_string_delay = 0;
        self.leds = LedState::EMPTY;
        self.state.store(State::Idle);
    }

    fn reset_run_state(&mut self) {
        self.pc = 0;
        self.vars.clear();
        self.call_stack.clear();
        self.skipping_definition = false;
        self.last_line = 0;
        self.fault = None;
    }

    /// Take ownership of `program` and move to `Loaded`.
    ///
    /// The function table is rebuilt; if that fails the engine goes straight
    /// to `Error`, holds no program, and the fault is returned.  The same
    /// fault stays readable through [`fault`](Self::fault).
    pub fn load(&mut self, mut program: Program) -> Result<(), LoadError> {
        self.reset_run_state();
        match program.discover() {
            Ok(()) => {
                debug!("engine loaded {} commands", program.len());
                self.program = program;
                self.state.store(State::Loaded);
                Ok(())
            }
            Err(e) => {
                warn!("load failed: {e}");
                self.program = Program::default();
                self.fault = Some(Error::Load(e.clone()));
                self.state.store(State::Error);
                Err(e)
            }
        }
    }

    // ── Accessors / settings ──────────────────────────────────────────────

    pub fn handle(&self) -> EngineHandle {
        EngineHandle { state: Arc::clone(&self.state) }
    }

    pub fn state(&self) -> State {
        self.state.load()
    }

    pub fn pause(&self) -> bool {
        self.handle().pause()
    }

    pub fn resume(&self) -> bool {
        self.handle().resume()
    }

    pub fn stop(&self) -> bool {
        self.handle().stop()
    }

    /// Scale all delays by `1 / multiplier`.  `multiplier <= 0` disables
    /// scaling.
    pub fn set_speed(&mut self, multiplier: f32) {
        self.speed = multiplier;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_default_delay(&mut self, ms: u32) {
        self.default_delay = ms;
    }

    pub fn default_delay(&self) -> u32 {
        self.default_delay
    }

    pub fn set_default_string_delay(&mut self, ms: u32) {
        self.default_string_delay = ms;
    }

    pub fn default_string_delay(&self) -> u32 {
        self.default_string_delay
    }

    pub fn set_status_callback(&mut self, sink: impl StatusSink + Send + 'static) {
        self.sink = Some(Box::new(sink));
    }

    pub fn clear_status_callback(&mut self) {
        self.sink = None;
    }

    pub fn get_variable(&self, name: &str) -> Option<&str> {
        self.vars.get(name)
    }

    pub fn set_variable(&mut self, name: &str, value: &str) -> Result<(), VarError> {
        self.vars.set(name, value)
    }

    pub fn variables(&self) -> &VarTable {
        &self.vars
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Lock-indicator state as of the last poll.
    pub fn leds(&self) -> LedState {
        self.leds
    }

    /// The fault that put the engine in `Error`, if any.
    pub fn fault(&self) -> Option<&Error> {
        self.fault.as_ref()
    }

    /// Snapshot of the engine as a status sink would see it.
    pub fn status(&self) -> Status {
        self.status_of(&self.program)
    }

    /// `ms` scaled by the speed multiplier, floored at 1 ms.
    pub fn adjusted_delay(&self, ms: u32) -> Duration {
        Duration::from_millis(scale_delay(ms, self.speed) as u64)
    }

    // ── Execution ─────────────────────────────────────────────────────────

    /// Run the loaded program to completion, `STOP`, a stop request or a
    /// fault.  Blocks the calling thread.
    ///
    /// Only starts from `Loaded` or `Paused`; from any other state it
    /// returns immediately with that state.  Held keys are released and a
    /// final status is delivered before returning.
    pub fn run(&mut self) -> State {
        let start = self.state();
        if !matches!(start, State::Loaded | State::Paused)
            || !self.state.transition(start, State::Running)
        {
            return self.state();
        }
        info!("run started ({} commands)", self.program.len());

        let program = std::mem::take(&mut self.program);
        self.notify(&program);
        let result = self.execute(&program);
        self.program = program;

        if let Err(e) = result {
            warn!("{e}");
            self.fault = Some(e.into());
            self.state.store(State::Error);
        } else if !self.state.transition(State::Running, State::Done) {
            self.state.transition(State::Paused, State::Done);
        }

        self.hid.release_all();
        self.hid.consumer_release_all();
        let program = std::mem::take(&mut self.program);
        self.notify(&program);
        self.program = program;

        let end = self.state();
        info!("run finished: {end}");
        end
    }

    fn execute(&mut self, program: &Program) -> Result<(), RuntimeError> {
        let tokens = program.tokens();
        while self.checkpoint(program) {
            let Some(tok) = tokens.get(self.pc) else {
                break;
            };

            // FUNCTION bodies only run through CALL.
            if self.skipping_definition {
                if tok.kind == TokenKind::EndFunction {
                    self.skipping_definition = false;
                }
                self.pc += 1;
                continue;
            }
            if let TokenKind::Function(_) = tok.kind {
                self.skipping_definition = true;
                self.pc += 1;
                continue;
            }

            self.last_line = tok.line;
            self.leds = self.hid.led_state();
            self.notify(program);
            debug!("line {}: {tok}", tok.line);

            match self.step(program, tok)? {
                Flow::Next => self.pc += 1,
                Flow::After(idx) => self.pc = idx + 1,
                Flow::Jump(idx) => {
                    self.pc = idx;
                    continue;
                }
                Flow::Halt => {
                    self.state.store(State::Done);
                    return Ok(());
                }
            }

            if self.default_delay > 0 && self.state() == State::Running {
                thread::sleep(self.adjusted_delay(self.default_delay));
            }
        }
        Ok(())
    }

    /// Wait out a pause.  Returns `true` if execution should continue.
    ///
    /// A status goes to the sink when a pause is first seen and again when
    /// the run resumes.
    fn checkpoint(&mut self, program: &Program) -> bool {
        let mut paused = false;
        loop {
            match self.state() {
                State::Running => {
                    if paused {
                        debug!("resumed");
                        self.notify(program);
                    }
                    return true;
                }
                State::Paused => {
                    if !paused {
                        paused = true;
                        debug!("paused at line {}", self.last_line);
                        self.notify(program);
                    }
                    thread::sleep(PAUSE_POLL);
                }
                _ => return false,
            }
        }
    }

    fn step(&mut self, program: &Program, tok: &Token) -> Result<Flow, RuntimeError> {
        let tokens = program.tokens();
        let line = tok.line;
        match &tok.kind {
            TokenKind::Comment | TokenKind::EndIf => {}

            TokenKind::String(_)
            | TokenKind::StringLn(_)
            | TokenKind::Delay(_)
            | TokenKind::Key { .. }
            | TokenKind::Combo(_) => self.perform(&tok.kind),

            TokenKind::DefaultDelay(ms) => self.default_delay = *ms,
            TokenKind::DefaultStringDelay(ms) => self.default_string_delay = *ms,

            TokenKind::Repeat(n) => {
                if let Some(prev) = self.pc.checked_sub(1).and_then(|i| tokens.get(i)) {
                    for _ in 0..*n {
                        if !self.checkpoint(program) {
                            break;
                        }
                        self.perform(&prev.kind);
                        if self.default_delay > 0 {
                            thread::sleep(self.adjusted_delay(self.default_delay));
                        }
                    }
                }
            }

            TokenKind::Stop => return Ok(Flow::Halt),

            TokenKind::If(cond) => {
                if !evaluate_condition(&self.vars.substitute(cond)) {
                    let target = find_else_or_end_if(tokens, self.pc + 1)
                        .ok_or(RuntimeError::UnmatchedIf { line })?;
                    return Ok(Flow::After(target));
                }
            }
            TokenKind::Else => {
                // Reached only after a true IF branch ran.
                let target = find_end_if(tokens, self.pc + 1)
                    .ok_or(RuntimeError::UnmatchedElse { line })?;
                return Ok(Flow::After(target));
            }

            TokenKind::While(cond) => {
                if !evaluate_condition(&self.vars.substitute(cond)) {
                    let target = find_end_while(tokens, self.pc + 1)
                        .ok_or(RuntimeError::UnmatchedWhile { line })?;
                    return Ok(Flow::After(target));
                }
            }
            TokenKind::EndWhile => {
                let target = find_matching_while(tokens, self.pc)
                    .ok_or(RuntimeError::UnmatchedEndWhile { line })?;
                return Ok(Flow::Jump(target));
            }

            TokenKind::Var(expr) => {
                let (name, raw) = parse_assignment(expr).ok_or(RuntimeError::VarSyntax { line })?;
                let value = self.vars.substitute(raw);
                self.vars
                    .set(name, &value)
                    .map_err(|source| RuntimeError::Variable { source, line })?;
            }

            TokenKind::Function(_) => self.skipping_definition = true,
            TokenKind::EndFunction => {
                if let Some(ret) = self.call_stack.pop() {
                    return Ok(Flow::After(ret));
                }
            }
            TokenKind::Call(name) => {
                let name = name.trim();
                let func = program.function(name).ok_or_else(|| RuntimeError::UnknownFunction {
                    name: name.to_string(),
                    line,
                })?;
                if self.call_stack.len() >= MAX_CALL_DEPTH {
                    return Err(RuntimeError::StackOverflow { line });
                }
                self.call_stack.push(self.pc);
                return Ok(Flow::Jump(func.body_start));
            }

            TokenKind::LedCheck(which) => self.led_check(which, line)?,
            TokenKind::LedWait(args) => self.led_wait(program, args),
            TokenKind::OsDetect => self.os_detect(line)?,

            TokenKind::MouseMove { x, y } => self.hid.mouse_move(*x, *y),
            TokenKind::MouseClick(name) => {
                let bits = MouseButton::from_name(name).bits();
                self.hid.mouse_press(bits);
                thread::sleep(KEY_HOLD);
                self.hid.mouse_release(bits);
            }
            TokenKind::MouseScroll(delta) => self.hid.mouse_scroll(*delta),
            TokenKind::ConsumerKey(name) => match keys::consumer_usage(name) {
                Some(usage) => {
                    self.hid.consumer_press(usage);
                    thread::sleep(KEY_HOLD);
                    self.hid.consumer_release(usage);
                }
                None => warn!("line {line}: unknown consumer key {:?}", name.trim()),
            },
        }
        Ok(Flow::Next)
    }

    /// The side effect of a repeatable command.  Other kinds do nothing.
    fn perform(&mut self, kind: &TokenKind) {
        match kind {
            TokenKind::String(text) => {
                let text = self.vars.substitute(text);
                self.type_text(&text);
            }
            TokenKind::StringLn(text) => {
                let text = self.vars.substitute(text);
                self.type_text(&text);
                self.tap(KeyCode::RETURN);
            }
            TokenKind::Delay(ms) => thread::sleep(self.adjusted_delay(*ms)),
            TokenKind::Key { name, code } => {
                if let Some(code) = code.or_else(|| resolve_key(name)) {
                    self.tap(code);
                }
            }
            TokenKind::Combo(combo) => self.press_combo(combo),
            _ => {}
        }
    }

    // ── Keyboard helpers ──────────────────────────────────────────────────

    fn press(&mut self, code: KeyCode) {
        if code.needs_shift() {
            self.hid.key_press(KeyCode::LEFT_SHIFT);
        }
        self.hid.key_press(KeyCode::from_raw(code.usage()));
    }

    fn release(&mut self, code: KeyCode) {
        self.hid.key_release(KeyCode::from_raw(code.usage()));
        if code.needs_shift() {
            self.hid.key_release(KeyCode::LEFT_SHIFT);
        }
    }

    /// Press, hold briefly, release.
    fn tap(&mut self, code: KeyCode) {
        self.press(code);
        thread::sleep(KEY_HOLD);
        self.release(code);
    }

    fn press_combo(&mut self, combo: &KeyCombo) {
        for &code in combo.keys() {
            self.press(code);
        }
        thread::sleep(KEY_HOLD);
        for &code in combo.keys().iter().rev() {
            self.release(code);
        }
    }

    fn type_text(&mut self, text: &str) {
        for ch in text.chars() {
            if let Some(code) = keys::char_key(ch) {
                self.press(code);
                self.release(code);
            }
            if self.default_string_delay > 0 {
                thread::sleep(self.adjusted_delay(self.default_string_delay));
            }
        }
    }

    // ── LEDs ──────────────────────────────────────────────────────────────

    fn led_check(&mut self, which: &str, line: usize) -> Result<(), RuntimeError> {
        self.leds = self.hid.led_state();
        let Some(led) = Led::from_name(which) else {
            warn!("line {line}: unknown LED {:?}", which.trim());
            return Ok(());
        };
        let value = if self.leds.contains(led.bit()) { "1" } else { "0" };
        self.vars
            .set(led.var_name(), value)
            .map_err(|source| RuntimeError::Variable { source, line })
    }

    /// Block until an LED reaches the wanted state or the run is stopped.
    fn led_wait(&mut self, program: &Program, args: &str) {
        let mut words = args.split_whitespace();
        let (Some(name), Some(want)) = (words.next(), words.next()) else {
            warn!("LED_WAIT needs an LED and a state: {args:?}");
            return;
        };
        let Some(led) = Led::from_name(name) else {
            warn!("LED_WAIT: unknown LED {name:?}");
            return;
        };
        let want_on = want.eq_ignore_ascii_case("ON") || want == "1";

        while self.checkpoint(program) {
            self.leds = self.hid.led_state();
            if self.leds.contains(led.bit()) == want_on {
                break;
            }
            thread::sleep(LED_POLL);
            self.notify(program);
        }
    }

    /// Fingerprint the host by how quickly it echoes a Caps Lock toggle.
    fn os_detect(&mut self, line: usize) -> Result<(), RuntimeError> {
        let before = self.hid.led_state();
        self.hid.key_press(KeyCode::CAPS_LOCK);
        self.hid.key_release(KeyCode::CAPS_LOCK);

        let start = Instant::now();
        let mut echoed = None;
        while start.elapsed() < OS_DETECT_TIMEOUT {
            if self.hid.led_state() != before {
                echoed = Some(start.elapsed());
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        self.hid.key_press(KeyCode::CAPS_LOCK);
        self.hid.key_release(KeyCode::CAPS_LOCK);
        thread::sleep(OS_DETECT_SETTLE);

        let os = classify_os(echoed);
        debug!("OS_DETECT: {os} ({echoed:?})");
        self.vars
            .set("OS", os)
            .map_err(|source| RuntimeError::Variable { source, line })
    }

    // ── Status ────────────────────────────────────────────────────────────

    fn status_of(&self, program: &Program) -> Status {
        let (line, command) = match program.tokens().get(self.pc) {
            Some(tok) => (tok.line, tok.describe()),
            None => (self.last_line, String::new()),
        };
        Status {
            state: self.state(),
            line,
            command,
            leds: self.leds,
            error: self.fault.as_ref().map(ToString::to_string),
            error_line: self.fault.as_ref().and_then(Error::line),
        }
    }

    fn notify(&mut self, program: &Program) {
        if self.sink.is_none() {
            return;
        }
        let status = self.status_of(program);
        if let Some(sink) = self.sink.as_mut() {
            sink.status(&status);
        }
    }
}

// ── Delay scaling ─────────────────────────────────────────────────────────────

/// Scale `ms` by `1 / speed`, flooring the result at 1 ms.  A non-positive
/// (or NaN) speed leaves `ms` unchanged.
pub fn scale_delay(ms: u32, speed: f32) -> u32 {
    if speed.is_nan() || speed <= 0.0 {
        return ms;
    }
    let scaled = ms as f32 / speed;
    if scaled < 1.0 {
        1
    } else {
        scaled as u32
    }
}

/// Map a Caps Lock echo time to an OS guess.
pub fn classify_os(echo: Option<Duration>) -> &'static str {
    match echo {
        None => "UNKNOWN",
        Some(t) if t <= OS_MAC_MAX => "MAC",
        Some(t) if t <= OS_WIN_MAX => "WIN",
        Some(_) => "LINUX",
    }
}

// ── Block matching ────────────────────────────────────────────────────────────
//
// Linear scans over the token array, tracking nesting depth.  `None` means no
// match before the end of the program.

/// The `ELSE` at this `IF`'s depth, or its `END_IF`, scanning from `from`.
fn find_else_or_end_if(tokens: &[Token], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (i, tok) in tokens.iter().enumerate().skip(from) {
        match tok.kind {
            TokenKind::If(_) => depth += 1,
            TokenKind::Else if depth == 1 => return Some(i),
            TokenKind::EndIf => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// The `END_IF` closing the current block, scanning from `from`.
fn find_end_if(tokens: &[Token], from: usize) -> Option<usize> {
    find_forward(tokens, from, |k| matches!(k, TokenKind::If(_)), |k| *k == TokenKind::EndIf)
}

fn find_end_while(tokens: &[Token], from: usize) -> Option<usize> {
    find_forward(tokens, from, |k| matches!(k, TokenKind::While(_)), |k| *k == TokenKind::EndWhile)
}

fn find_forward(
    tokens: &[Token],
    from: usize,
    opens: impl Fn(&TokenKind) -> bool,
    closes: impl Fn(&TokenKind) -> bool,
) -> Option<usize> {
    let mut depth = 1usize;
    for (i, tok) in tokens.iter().enumerate().skip(from) {
        if opens(&tok.kind) {
            depth += 1;
        } else if closes(&tok.kind) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// The `WHILE` opened by the `END_WHILE` at `end`, scanning backwards.
fn find_matching_while(tokens: &[Token], end: usize) -> Option<usize> {
    let mut depth = 1usize;
    for i in (0..end.min(tokens.len())).rev() {
        match tokens[i].kind {
            TokenKind::EndWhile => depth += 1,
            TokenKind::While(_) => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::{HidEvent, Recorder};

    fn tokens(src: &str) -> Vec<Token> {
        Program::parse_str(src).unwrap().tokens().to_vec()
    }

    fn run(src: &str) -> (Engine, Recorder) {
        let rec = Recorder::new();
        let mut engine = Engine::new(rec.clone());
        engine.load(Program::parse_str(src).unwrap()).unwrap();
        engine.run();
        (engine, rec)
    }

    #[test]
    fn delay_scaling() {
        assert_eq!(scale_delay(100, 2.0), 50);
        assert_eq!(scale_delay(100, 0.5), 200);
        assert_eq!(scale_delay(100, 0.0), 100);
        assert_eq!(scale_delay(100, -3.0), 100);
        assert_eq!(scale_delay(100, f32::NAN), 100);
        assert_eq!(scale_delay(1, 4.0), 1);
        assert_eq!(scale_delay(0, 1.0), 1);
    }

    #[test]
    fn os_classification() {
        assert_eq!(classify_os(None), "UNKNOWN");
        assert_eq!(classify_os(Some(Duration::from_millis(10))), "MAC");
        assert_eq!(classify_os(Some(Duration::from_millis(25))), "MAC");
        assert_eq!(classify_os(Some(Duration::from_millis(50))), "WIN");
        assert_eq!(classify_os(Some(Duration::from_millis(70))), "WIN");
        assert_eq!(classify_os(Some(Duration::from_millis(71))), "LINUX");
    }

    #[test]
    fn shared_state_transitions() {
        let s = SharedState::new(State::Running);
        assert!(!s.transition(State::Paused, State::Running));
        assert!(s.transition(State::Running, State::Paused));
        assert_eq!(s.load(), State::Paused);
    }

    #[test]
    fn handle_ops_only_from_valid_states() {
        let engine = Engine::new(Recorder::new());
        let h = engine.handle();
        assert!(!h.pause());
        assert!(!h.resume());
        assert!(!h.stop());
        assert_eq!(h.state(), State::Idle);

        engine.state.store(State::Running);
        assert!(h.pause());
        assert!(!h.pause());
        assert!(h.resume());
        assert!(h.stop());
        assert!(!h.stop());
        assert_eq!(engine.state(), State::Done);
    }

    #[test]
    fn nested_if_matching() {
        let t = tokens("IF 1\nIF 0\nENTER\nEND_IF\nELSE\nTAB\nEND_IF\n");
        assert_eq!(find_else_or_end_if(&t, 1), Some(4));
        assert_eq!(find_end_if(&t, 5), Some(6));
        assert_eq!(find_else_or_end_if(&t, 2), Some(3));
    }

    #[test]
    fn while_matching_both_directions() {
        let t = tokens("WHILE 1\nWHILE 0\nEND_WHILE\nEND_WHILE\n");
        assert_eq!(find_end_while(&t, 1), Some(3));
        assert_eq!(find_matching_while(&t, 3), Some(0));
        assert_eq!(find_matching_while(&t, 2), Some(1));
        assert_eq!(find_matching_while(&t, 0), None);
    }

    #[test]
    fn run_requires_loaded() {
        let mut engine = Engine::new(Recorder::new());
        assert_eq!(engine.run(), State::Idle);
    }

    #[test]
    fn string_is_typed() {
        let (engine, rec) = run("STRING Hi!\n");
        assert_eq!(engine.state(), State::Done);
        assert_eq!(rec.typed(), "Hi!");
    }

    #[test]
    fn shift_wraps_shifted_keys() {
        let (_, rec) = run("STRING A\n");
        let ev = rec.events();
        let a = KeyCode::from_raw(0x04);
        assert_eq!(
            &ev[..4],
            &[
                HidEvent::KeyPress(KeyCode::LEFT_SHIFT),
                HidEvent::KeyPress(a),
                HidEvent::KeyRelease(a),
                HidEvent::KeyRelease(KeyCode::LEFT_SHIFT),
            ]
        );
    }

    #[test]
    fn combo_releases_in_reverse() {
        let (_, rec) = run("CTRL ALT DELETE\n");
        let ev = rec.events();
        assert_eq!(
            &ev[..6],
            &[
                HidEvent::KeyPress(KeyCode::LEFT_CTRL),
                HidEvent::KeyPress(KeyCode::LEFT_ALT),
                HidEvent::KeyPress(KeyCode::DELETE_FORWARD),
                HidEvent::KeyRelease(KeyCode::DELETE_FORWARD),
                HidEvent::KeyRelease(KeyCode::LEFT_ALT),
                HidEvent::KeyRelease(KeyCode::LEFT_CTRL),
            ]
        );
    }

    #[test]
    fn run_end_releases_everything() {
        let (_, rec) = run("ENTER\n");
        let ev = rec.events();
        assert_eq!(&ev[ev.len() - 2..], &[HidEvent::ReleaseAll, HidEvent::ConsumerReleaseAll]);
    }

    #[test]
    fn hand_built_key_resolves_by_name() {
        let rec = Recorder::new();
        let mut engine = Engine::new(rec.clone());
        let prog = Program::new(vec![Token::new(
            TokenKind::Key { name: "TAB".into(), code: None },
            1,
        )]);
        engine.load(prog).unwrap();
        engine.run();
        assert_eq!(rec.events()[0], HidEvent::KeyPress(KeyCode::TAB));
    }

    #[test]
    fn load_failure_goes_to_error() {
        let mut engine = Engine::new(Recorder::new());
        let prog = Program::new(vec![Token::new(TokenKind::Function("f".into()), 7)]);
        let err = engine.load(prog).unwrap_err();
        assert_eq!(engine.state(), State::Error);
        assert_eq!(err.to_string(), "Unmatched FUNCTION 'f' at line 7");
        assert_eq!(err.line(), Some(7));
        assert_eq!(engine.fault().map(|f| f.to_string()), Some(err.to_string()));
        assert!(engine.program().is_empty());
        assert_eq!(engine.run(), State::Error);
    }

    #[test]
    fn init_resets() {
        let (mut engine, _) = run("VAR $a = 1\n");
        assert_eq!(engine.get_variable("a"), Some("1"));
        engine.set_speed(4.0);
        engine.init();
        assert_eq!(engine.state(), State::Idle);
        assert_eq!(engine.get_variable("a"), None);
        assert!(engine.program().is_empty());
        assert_eq!(engine.speed(), 1.0);
    }

    #[test]
    fn status_reports_fault() {
        let (engine, _) = run("CALL nowhere\n");
        let status = engine.status();
        assert_eq!(status.state, State::Error);
        assert_eq!(status.error.as_deref(), Some("Unknown function: nowhere"));
        assert_eq!(status.error_line, Some(1));
    }
}
