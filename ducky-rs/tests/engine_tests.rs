//! End-to-end script runs against the recording HID backend.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ducky::hid::{HidEvent, LedState, Recorder};
use ducky::keys::KeyCode;
use ducky::script::{Engine, LoadError, Program, State, Status, TokenKind};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load(rec: &Recorder, src: &str) -> Engine {
    let mut engine = Engine::new(rec.clone());
    let program = Program::parse_str(src).unwrap_or_else(|e| panic!("load failed: {e}"));
    engine.load(program).unwrap();
    engine
}

fn run(src: &str) -> (Engine, Recorder) {
    let rec = Recorder::new();
    let mut engine = load(&rec, src);
    engine.run();
    (engine, rec)
}

fn fault(engine: &Engine) -> String {
    engine.fault().map(ToString::to_string).unwrap_or_default()
}

// ── Worked scenarios ──────────────────────────────────────────────────────────

#[test]
fn string_then_delay() {
    let src = "STRING Hello\nDELAY 100\n";
    let program = Program::parse_str(src).unwrap();
    let kinds: Vec<&TokenKind> = program.tokens().iter().map(|t| &t.kind).collect();
    assert_eq!(kinds, vec![&TokenKind::String("Hello".into()), &TokenKind::Delay(100)]);

    let start = Instant::now();
    let (engine, rec) = run(src);
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "Hello");
}

#[test]
fn if_after_substitution() {
    let (engine, rec) = run("VAR $x = 1\nIF $x == 1\nSTRING yes\nEND_IF\n");
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "yes");
}

#[test]
fn function_call_and_return() {
    let src = "FUNCTION f\nSTRING hi\nEND_FUNCTION\nCALL f\n";
    let program = Program::parse_str(src).unwrap();
    let f = program.function("f").unwrap();
    assert_eq!((f.body_start, f.body_end), (1, 2));

    let (engine, rec) = run(src);
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "hi");
    assert_eq!(engine.call_depth(), 0);
}

#[test]
fn unknown_command_never_loads() {
    let err = Program::parse_str("FOO\n").unwrap_err();
    assert_eq!(err.to_string(), "Unknown command: FOO");
    assert_eq!(err.line(), Some(1));
    assert!(matches!(err, LoadError::Syntax { line: 1, .. }));
}

#[test]
fn unmatched_if_is_fatal() {
    let (engine, rec) = run("IF $x == 1\nSTRING a\n");
    assert_eq!(engine.state(), State::Error);
    assert_eq!(fault(&engine), "Unmatched IF at line 1");
    assert_eq!(rec.typed(), "");
}

// ── Blocks ────────────────────────────────────────────────────────────────────

#[test]
fn three_levels_of_if() {
    let src = "\
VAR $a = 1
VAR $b = 2
IF $a == 1
  IF $b == 2
    IF $a != 1
      STRING no
    ELSE
      STRING deep
    END_IF
  ELSE
    STRING wrong
  END_IF
  STRING after
END_IF
STRING end
";
    let (engine, rec) = run(src);
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "deepafterend");
}

#[test]
fn false_if_skips_nested_blocks() {
    let (_, rec) = run("IF FALSE\nIF TRUE\nSTRING x\nEND_IF\nSTRING y\nEND_IF\nSTRING z\n");
    assert_eq!(rec.typed(), "z");
}

#[test]
fn nested_unmatched_if_cites_outer_line() {
    let (engine, _) = run("REM lead\nIF 0\nIF 1\nEND_IF\n");
    assert_eq!(engine.state(), State::Error);
    assert_eq!(fault(&engine), "Unmatched IF at line 2");
    assert_eq!(engine.status().error_line, Some(2));
}

#[test]
fn else_without_end_if() {
    let (engine, _) = run("IF 1\nSTRING a\nELSE\n");
    assert_eq!(fault(&engine), "Unmatched ELSE at line 3");
}

#[test]
fn while_runs_until_assignment_clears_condition() {
    let (engine, rec) = run("VAR $go = 1\nWHILE $go == 1\nSTRING x\nVAR $go = 0\nEND_WHILE\nSTRING done\n");
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "xdone");
}

#[test]
fn while_counts_three_passes() {
    let src = "\
VAR $i = a
WHILE $i != done
  STRING x
  IF $i == c
    VAR $i = done
  END_IF
  IF $i == b
    VAR $i = c
  END_IF
  IF $i == a
    VAR $i = b
  END_IF
END_WHILE
";
    let (engine, rec) = run(src);
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "xxx");
    assert_eq!(engine.get_variable("i"), Some("done"));
}

#[test]
fn false_while_never_enters() {
    let (_, rec) = run("WHILE 0\nSTRING x\nEND_WHILE\nSTRING y\n");
    assert_eq!(rec.typed(), "y");
}

#[test]
fn unmatched_while_forms() {
    let (engine, _) = run("WHILE 0\nSTRING x\n");
    assert_eq!(fault(&engine), "Unmatched WHILE at line 1");
    let (engine, _) = run("STRING x\nEND_WHILE\n");
    assert_eq!(fault(&engine), "Unmatched END_WHILE at line 2");
}

// ── Functions ─────────────────────────────────────────────────────────────────

#[test]
fn call_returns_to_next_command() {
    let (_, rec) = run("FUNCTION f\nSTRING a\nEND_FUNCTION\nSTRING b\nCALL f\nSTRING c\n");
    assert_eq!(rec.typed(), "bac");
}

#[test]
fn nested_calls_unwind_in_order() {
    let src = "\
FUNCTION inner
STRING i
END_FUNCTION
FUNCTION outer
STRING (
CALL inner
STRING )
END_FUNCTION
CALL outer
CALL inner
";
    let (engine, rec) = run(src);
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "(i)i");
}

#[test]
fn recursion_overflows_the_call_stack() {
    let (engine, _) = run("FUNCTION r\nCALL r\nEND_FUNCTION\nCALL r\n");
    assert_eq!(engine.state(), State::Error);
    assert_eq!(fault(&engine), "Call stack overflow at line 2");
    assert_eq!(engine.call_depth(), ducky::script::MAX_CALL_DEPTH);
}

#[test]
fn call_to_unknown_function() {
    let (engine, _) = run("CALL nope\n");
    assert_eq!(fault(&engine), "Unknown function: nope");
}

#[test]
fn definition_is_skipped_on_fall_through() {
    let (_, rec) = run("STRING a\nFUNCTION f\nSTRING hidden\nEND_FUNCTION\nSTRING b\n");
    assert_eq!(rec.typed(), "ab");
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[test]
fn repeat_replays_previous_command() {
    let (_, rec) = run("STRING ab\nREPEAT 2\n");
    assert_eq!(rec.typed(), "ababab");

    let (_, rec) = run("ENTER\nREPEAT 3\n");
    let enters = rec
        .events()
        .iter()
        .filter(|e| **e == HidEvent::KeyPress(KeyCode::RETURN))
        .count();
    assert_eq!(enters, 4);
}

#[test]
fn repeat_of_unsupported_kind_does_nothing() {
    let (engine, rec) = run("VAR $a = 1\nREPEAT 5\nSTRING $a\n");
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "1");
}

#[test]
fn stringln_presses_enter() {
    let (_, rec) = run("STRINGLN one\nSTRING two\n");
    assert_eq!(rec.typed(), "one\ntwo");
}

#[test]
fn braced_and_bare_substitution() {
    let (_, rec) = run("VAR $X = ok\nVAR $y = [$X]\nSTRING $X ${X}s $y $missing.\n");
    assert_eq!(rec.typed(), "ok oks [ok] .");
}

#[test]
fn stop_ends_run_and_releases() {
    let (engine, rec) = run("STRING a\nSTOP\nSTRING b\n");
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "a");
    let ev = rec.events();
    assert_eq!(&ev[ev.len() - 2..], &[HidEvent::ReleaseAll, HidEvent::ConsumerReleaseAll]);
}

#[test]
fn var_errors() {
    let (engine, _) = run("VAR x = 1\n");
    assert_eq!(fault(&engine), "VAR syntax error at line 1");

    let mut src: String = (0..16).map(|i| format!("VAR $v{i} = {i}\n")).collect();
    src.push_str("VAR $one_too_many = 1\n");
    let (engine, _) = run(&src);
    assert_eq!(fault(&engine), "Too many variables (max 16) at line 17");
}

#[test]
fn mouse_commands() {
    let (_, rec) = run("MOUSE_MOVE 10 -5\nMOUSE_MOVE 300\nMOUSE_CLICK RIGHT\nMOUSE_SCROLL -3\n");
    let ev = rec.events();
    assert_eq!(
        &ev[..5],
        &[
            HidEvent::MouseMove { dx: 10, dy: -5 },
            HidEvent::MouseMove { dx: 127, dy: 0 },
            HidEvent::MousePress(2),
            HidEvent::MouseRelease(2),
            HidEvent::MouseScroll(-3),
        ]
    );
}

#[test]
fn consumer_keys_named_and_raw() {
    let (engine, rec) = run("CONSUMER_KEY VOLUME_UP\nCONSUMER_KEY 0x00CD\nCONSUMER_KEY NOPE\n");
    assert_eq!(engine.state(), State::Done);
    assert_eq!(
        rec.events(),
        vec![
            HidEvent::ConsumerPress(0xE9),
            HidEvent::ConsumerRelease(0xE9),
            HidEvent::ConsumerPress(0xCD),
            HidEvent::ConsumerRelease(0xCD),
            HidEvent::ReleaseAll,
            HidEvent::ConsumerReleaseAll,
        ]
    );
}

// ── LEDs ──────────────────────────────────────────────────────────────────────

#[test]
fn led_check_sets_variables() {
    let rec = Recorder::new();
    rec.set_leds(LedState::CAPS);
    let mut engine = load(&rec, "LED_CHECK CAPS\nLED_CHECK num\nIF $LED_CAPS == 1\nSTRING on\nEND_IF\n");
    engine.run();
    assert_eq!(engine.get_variable("LED_CAPS"), Some("1"));
    assert_eq!(engine.get_variable("LED_NUM"), Some("0"));
    assert_eq!(rec.typed(), "on");
}

#[test]
fn led_check_unknown_led_is_ignored() {
    let (engine, _) = run("LED_CHECK KANA\n");
    assert_eq!(engine.state(), State::Done);
    assert!(engine.variables().is_empty());
}

#[test]
fn led_wait_blocks_until_host_changes() {
    let rec = Recorder::new();
    let mut engine = load(&rec, "LED_WAIT CAPS ON\nSTRING go\n");
    let host = rec.clone();
    let flipper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        host.set_leds(LedState::CAPS);
    });

    let start = Instant::now();
    assert_eq!(engine.run(), State::Done);
    assert!(start.elapsed() >= Duration::from_millis(150));
    flipper.join().unwrap();
    assert_eq!(rec.typed(), "go");
}

#[test]
fn led_wait_already_satisfied() {
    let (engine, rec) = run("LED_WAIT SCROLL OFF\nSTRING go\n");
    assert_eq!(engine.state(), State::Done);
    assert_eq!(rec.typed(), "go");
}

#[test]
fn toggling_caps_lock_lights_the_led() {
    let (engine, _) = run("CAPSLOCK\nLED_CHECK CAPS\n");
    assert_eq!(engine.get_variable("LED_CAPS"), Some("1"));
    assert!(engine.leds().contains(LedState::CAPS));
}

// ── OS detection ──────────────────────────────────────────────────────────────

fn detect(latency: Duration) -> (Engine, Recorder) {
    let rec = Recorder::with_led_latency(latency);
    let mut engine = load(&rec, "OS_DETECT\n");
    engine.run();
    (engine, rec)
}

#[test]
fn os_detect_by_echo_latency() {
    let (engine, rec) = detect(Duration::ZERO);
    assert_eq!(engine.get_variable("OS"), Some("MAC"));
    let caps = rec
        .events()
        .iter()
        .filter(|e| **e == HidEvent::KeyPress(KeyCode::CAPS_LOCK))
        .count();
    assert_eq!(caps, 2);

    let (engine, _) = detect(Duration::from_millis(45));
    assert_eq!(engine.get_variable("OS"), Some("WIN"));

    let (engine, _) = detect(Duration::from_millis(150));
    assert_eq!(engine.get_variable("OS"), Some("LINUX"));
}

#[test]
fn os_detect_without_echo() {
    let start = Instant::now();
    let (engine, _) = detect(Duration::from_secs(2));
    assert_eq!(engine.get_variable("OS"), Some("UNKNOWN"));
    assert!(start.elapsed() >= Duration::from_millis(500));
}

// ── Timing ────────────────────────────────────────────────────────────────────

#[test]
fn speed_scales_delays() {
    let rec = Recorder::new();
    let mut engine = load(&rec, "DELAY 400\n");
    engine.set_speed(4.0);
    assert_eq!(engine.adjusted_delay(100), Duration::from_millis(25));
    let start = Instant::now();
    engine.run();
    let took = start.elapsed();
    assert!(took >= Duration::from_millis(100), "{took:?}");
    assert!(took < Duration::from_millis(350), "{took:?}");
}

#[test]
fn default_delay_between_commands() {
    let start = Instant::now();
    let (engine, _) = run("DEFAULT_DELAY 60\nENTER\nENTER\n");
    assert_eq!(engine.default_delay(), 60);
    assert!(start.elapsed() >= Duration::from_millis(120));
}

#[test]
fn string_delay_between_characters() {
    let start = Instant::now();
    let (engine, rec) = run("DEFAULT_STRING_DELAY 30\nSTRING abcd\n");
    assert_eq!(engine.default_string_delay(), 30);
    assert_eq!(rec.typed(), "abcd");
    assert!(start.elapsed() >= Duration::from_millis(120));
}

// ── Status and lifecycle ──────────────────────────────────────────────────────

#[test]
fn status_callback_sees_each_command() {
    let seen: Arc<Mutex<Vec<Status>>> = Arc::default();
    let rec = Recorder::new();
    let mut engine = load(&rec, "REM header\nSTRING hi\n\nDELAY 5\n");
    let sink = Arc::clone(&seen);
    engine.set_status_callback(move |s: &Status| sink.lock().unwrap().push(s.clone()));
    engine.run();

    let seen = seen.lock().unwrap();
    let lines: Vec<usize> = seen.iter().map(|s| s.line).collect();
    // Start, one per command, final.
    assert_eq!(lines, vec![2, 2, 4, 4]);
    assert_eq!(seen[1].command, "STRING hi");
    assert_eq!(seen[2].command, "DELAY 5");
    assert!(seen[..3].iter().all(|s| s.state == State::Running));
    assert_eq!(seen[3].state, State::Done);
    assert_eq!(seen[3].command, "");
}

#[test]
fn final_status_carries_fault() {
    let seen: Arc<Mutex<Vec<Status>>> = Arc::default();
    let rec = Recorder::new();
    let mut engine = load(&rec, "STRING a\nCALL missing\n");
    let sink = Arc::clone(&seen);
    engine.set_status_callback(move |s: &Status| sink.lock().unwrap().push(s.clone()));
    engine.run();

    let last = seen.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.state, State::Error);
    assert_eq!(last.error.as_deref(), Some("Unknown function: missing"));
    assert_eq!(last.error_line, Some(2));
}

#[test]
fn finished_engine_needs_a_fresh_load() {
    let rec = Recorder::new();
    let mut engine = load(&rec, "STRING a\n");
    assert_eq!(engine.run(), State::Done);
    assert_eq!(engine.run(), State::Done);
    assert_eq!(rec.typed(), "a");

    engine.load(Program::parse_str("STRING b\n").unwrap()).unwrap();
    assert_eq!(engine.state(), State::Loaded);
    assert_eq!(engine.run(), State::Done);
    assert_eq!(rec.typed(), "ab");
}

#[test]
fn load_resets_variables() {
    let rec = Recorder::new();
    let mut engine = load(&rec, "VAR $a = 1\n");
    engine.run();
    assert_eq!(engine.get_variable("a"), Some("1"));
    engine.load(Program::parse_str("ENTER\n").unwrap()).unwrap();
    assert_eq!(engine.get_variable("a"), None);
    assert_eq!(engine.pc(), 0);
}

#[test]
fn preset_variables_are_visible_to_script() {
    let rec = Recorder::new();
    let mut engine = load(&rec, "STRING $user\n");
    engine.set_variable("user", "root").unwrap();
    engine.run();
    assert_eq!(rec.typed(), "root");
}
