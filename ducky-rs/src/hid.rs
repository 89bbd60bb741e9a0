//! HID capabilities consumed by the interpreter, plus in-process backends.
//!
//! The engine never talks to a transport directly; it drives a [`Hid`]
//! implementation.  Two backends ship with the crate:
//!
//! * [`Recorder`] keeps an event log and simulates the host's lock LEDs.
//!   Tests use it to assert on what a script typed; the CLI uses it for a
//!   dry run.
//! * [`Logger`] wraps any other backend and traces every event.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::trace;

use crate::keys::{char_key, KeyCode};

// ── LED state ─────────────────────────────────────────────────────────────────

/// Bitmask of the host's keyboard lock indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedState(u8);

impl LedState {
    pub const NUM: Self    = Self(0x01);
    pub const CAPS: Self   = Self(0x02);
    pub const SCROLL: Self = Self(0x04);

    pub const EMPTY: Self = Self(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x07)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit in `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flip the bits in `other`.
    pub fn toggle(&mut self, other: Self) {
        self.0 ^= other.0;
    }
}

impl BitOr for LedState {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl BitOrAssign for LedState {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

impl BitAnd for LedState {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self { Self(self.0 & rhs.0) }
}

impl fmt::Display for LedState {
    /// Renders as `NCS` with `-` for unlit indicators, e.g. `-C-`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |led: Self, ch: char| if self.contains(led) { ch } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(Self::NUM, 'N'),
            flag(Self::CAPS, 'C'),
            flag(Self::SCROLL, 'S')
        )
    }
}

/// One of the three lock indicators, as named in scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Num,
    Caps,
    Scroll,
}

impl Led {
    pub const ALL: &'static [Led] = &[Led::Num, Led::Caps, Led::Scroll];

    /// Script name of the LED (`NUM`, `CAPS`, `SCROLL`).
    pub fn name(self) -> &'static str {
        match self {
            Led::Num => "NUM",
            Led::Caps => "CAPS",
            Led::Scroll => "SCROLL",
        }
    }

    /// Case-insensitive lookup; surrounding whitespace is ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.iter().copied().find(|l| l.name().eq_ignore_ascii_case(name))
    }

    pub fn bit(self) -> LedState {
        match self {
            Led::Num => LedState::NUM,
            Led::Caps => LedState::CAPS,
            Led::Scroll => LedState::SCROLL,
        }
    }

    /// Variable that `LED_CHECK` writes for this LED.
    pub fn var_name(self) -> &'static str {
        match self {
            Led::Num => "LED_NUM",
            Led::Caps => "LED_CAPS",
            Led::Scroll => "LED_SCROLL",
        }
    }

    /// The key whose press toggles this LED on the host.
    pub fn lock_key(self) -> KeyCode {
        match self {
            Led::Num => KeyCode::NUM_LOCK,
            Led::Caps => KeyCode::CAPS_LOCK,
            Led::Scroll => KeyCode::SCROLL_LOCK,
        }
    }

    fn for_key(code: KeyCode) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.lock_key() == code)
    }
}

// ── Hid trait ─────────────────────────────────────────────────────────────────

/// Keyboard, consumer-control, mouse and LED capabilities of a HID transport.
///
/// Keycodes handed to `key_press`/`key_release` never carry
/// [`KeyCode::SHIFT_FLAG`]; the engine presses Left Shift itself.
pub trait Hid {
    fn key_press(&mut self, code: KeyCode);
    fn key_release(&mut self, code: KeyCode);
    /// Release every held key and modifier.
    fn release_all(&mut self);

    fn consumer_press(&mut self, usage: u16);
    fn consumer_release(&mut self, usage: u16);
    fn consumer_release_all(&mut self);

    fn mouse_move(&mut self, dx: i8, dy: i8);
    fn mouse_press(&mut self, buttons: u8);
    fn mouse_release(&mut self, buttons: u8);
    fn mouse_scroll(&mut self, delta: i8);

    /// Current lock-indicator state reported by the host.
    fn led_state(&mut self) -> LedState;
}

/// A single event as seen by a [`Recorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidEvent {
    KeyPress(KeyCode),
    KeyRelease(KeyCode),
    ReleaseAll,
    ConsumerPress(u16),
    ConsumerRelease(u16),
    ConsumerReleaseAll,
    MouseMove { dx: i8, dy: i8 },
    MousePress(u8),
    MouseRelease(u8),
    MouseScroll(i8),
}

// ── Recorder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RecorderInner {
    events: Vec<HidEvent>,
    leds: LedState,
    /// LED toggles that the simulated host has not reported yet.
    pending: Vec<(Instant, LedState)>,
    latency: Duration,
}

impl RecorderInner {
    fn settle(&mut self, now: Instant) {
        let leds = &mut self.leds;
        self.pending.retain(|&(due, bit)| {
            if due <= now {
                leds.toggle(bit);
                false
            } else {
                true
            }
        });
    }
}

/// In-memory backend that records events and simulates lock LEDs.
///
/// Clones share the same log, so a test can hand one clone to the engine and
/// inspect another afterwards.  Pressing Caps/Num/Scroll Lock toggles the
/// matching LED once the configured latency has elapsed.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<RecorderInner>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose simulated host reports LED changes after `latency`.
    pub fn with_led_latency(latency: Duration) -> Self {
        let rec = Self::default();
        rec.lock().latency = latency;
        rec
    }

    fn lock(&self) -> MutexGuard<'_, RecorderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, ev: HidEvent) {
        self.lock().events.push(ev);
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<HidEvent> {
        self.lock().events.clone()
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    /// Set the host-side LED state directly, as if the user had pressed a
    /// lock key on another keyboard.
    pub fn set_leds(&self, leds: LedState) {
        let mut inner = self.lock();
        inner.pending.clear();
        inner.leds = leds;
    }

    /// Reconstruct the text typed so far from key presses.
    ///
    /// Shift state is tracked from Left Shift press/release events; Enter
    /// becomes `'\n'`.  Presses that do not correspond to a printable
    /// character are skipped.
    pub fn typed(&self) -> String {
        let mut out = String::new();
        let mut shift = false;
        for ev in self.lock().events.iter() {
            match *ev {
                HidEvent::KeyPress(KeyCode::LEFT_SHIFT) => shift = true,
                HidEvent::KeyRelease(KeyCode::LEFT_SHIFT) => shift = false,
                HidEvent::ReleaseAll => shift = false,
                HidEvent::KeyPress(KeyCode::RETURN) => out.push('\n'),
                HidEvent::KeyPress(code) => {
                    let want = if shift {
                        code.raw() | KeyCode::SHIFT_FLAG
                    } else {
                        code.raw()
                    };
                    if let Some(ch) = (' '..='~').find(|&c| char_key(c).map(KeyCode::raw) == Some(want)) {
                        out.push(ch);
                    }
                }
                _ => {}
            }
        }
        out
    }
}

impl Hid for Recorder {
    fn key_press(&mut self, code: KeyCode) {
        let mut inner = self.lock();
        inner.events.push(HidEvent::KeyPress(code));
        if let Some(led) = Led::for_key(code) {
            let due = Instant::now() + inner.latency;
            inner.pending.push((due, led.bit()));
        }
    }

    fn key_release(&mut self, code: KeyCode) {
        self.push(HidEvent::KeyRelease(code));
    }

    fn release_all(&mut self) {
        self.push(HidEvent::ReleaseAll);
    }

    fn consumer_press(&mut self, usage: u16) {
        self.push(HidEvent::ConsumerPress(usage));
    }

    fn consumer_release(&mut self, usage: u16) {
        self.push(HidEvent::ConsumerRelease(usage));
    }

    fn consumer_release_all(&mut self) {
        self.push(HidEvent::ConsumerReleaseAll);
    }

    fn mouse_move(&mut self, dx: i8, dy: i8) {
        self.push(HidEvent::MouseMove { dx, dy });
    }

    fn mouse_press(&mut self, buttons: u8) {
        self.push(HidEvent::MousePress(buttons));
    }

    fn mouse_release(&mut self, buttons: u8) {
        self.push(HidEvent::MouseRelease(buttons));
    }

    fn mouse_scroll(&mut self, delta: i8) {
        self.push(HidEvent::MouseScroll(delta));
    }

    fn led_state(&mut self) -> LedState {
        let mut inner = self.lock();
        inner.settle(Instant::now());
        inner.leds
    }
}

// ── Logger ────────────────────────────────────────────────────────────────────

/// Wraps a backend and traces every event through the `log` facade.
#[derive(Debug, Clone)]
pub struct Logger<H> {
    inner: H,
}

impl<H: Hid> Logger<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: Hid> Hid for Logger<H> {
    fn key_press(&mut self, code: KeyCode) {
        trace!("key press 0x{:02X}", code.usage());
        self.inner.key_press(code);
    }

    fn key_release(&mut self, code: KeyCode) {
        trace!("key release 0x{:02X}", code.usage());
        self.inner.key_release(code);
    }

    fn release_all(&mut self) {
        trace!("key release all");
        self.inner.release_all();
    }

    fn consumer_press(&mut self, usage: u16) {
        trace!("consumer press 0x{usage:03X}");
        self.inner.consumer_press(usage);
    }

    fn consumer_release(&mut self, usage: u16) {
        trace!("consumer release 0x{usage:03X}");
        self.inner.consumer_release(usage);
    }

    fn consumer_release_all(&mut self) {
        trace!("consumer release all");
        self.inner.consumer_release_all();
    }

    fn mouse_move(&mut self, dx: i8, dy: i8) {
        trace!("mouse move {dx},{dy}");
        self.inner.mouse_move(dx, dy);
    }

    fn mouse_press(&mut self, buttons: u8) {
        trace!("mouse press {buttons:#04x}");
        self.inner.mouse_press(buttons);
    }

    fn mouse_release(&mut self, buttons: u8) {
        trace!("mouse release {buttons:#04x}");
        self.inner.mouse_release(buttons);
    }

    fn mouse_scroll(&mut self, delta: i8) {
        trace!("mouse scroll {delta}");
        self.inner.mouse_scroll(delta);
    }

    fn led_state(&mut self) -> LedState {
        let leds = self.inner.led_state();
        trace!("led state {leds}");
        leds
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
