use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::process;
use std::time::Duration;

use log::LevelFilter;
use simple_logger::SimpleLogger;
use tokio::sync::mpsc;

use ducky::cli::{self, CliArgs, USAGE};
use ducky::config::Settings;
use ducky::console::{self, Console, Control};
use ducky::hid::{Logger, Recorder};
use ducky::library::{self, ScriptInfo};
use ducky::script::{Engine, Program, State, Status};
use ducky::worker::Worker;

const FINISH_POLL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("ducky: {e}");
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };
    if args.help {
        println!("{USAGE}");
        return;
    }

    let level = match args.debug {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).env().init() {
        eprintln!("ducky: cannot start logging: {e}");
    }

    let settings = load_settings(&args);

    if args.list {
        list_scripts(&settings);
        return;
    }

    let Some(script) = args.script else {
        eprintln!("ducky: no script given");
        eprintln!("{USAGE}");
        process::exit(1);
    };

    let state = run_script(&script, &settings).await;
    process::exit(if state == State::Done { 0 } else { 1 });
}

// ── Settings ──────────────────────────────────────────────────────────────────

fn load_settings(args: &CliArgs) -> Settings {
    let mut settings = match &args.settings {
        Some(path) => match Settings::load_file(path) {
            Ok(loaded) => report_config_errors(path, loaded),
            Err(e) => {
                eprintln!("ducky: {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => Settings::default_path()
            .filter(|p| p.is_file())
            .and_then(|p| match Settings::load_file(&p) {
                Ok(loaded) => Some(report_config_errors(&p, loaded)),
                Err(e) => {
                    eprintln!("ducky: warning: {}: {e}", p.display());
                    None
                }
            })
            .unwrap_or_default(),
    };

    if let Some(speed) = args.speed {
        settings.speed = speed;
    }
    if let Some(ms) = args.default_delay {
        settings.default_delay = ms;
    }
    settings
}

fn report_config_errors(
    path: &Path,
    (settings, errors): (Settings, Vec<ducky::config::ConfigError>),
) -> Settings {
    for e in errors {
        eprintln!("ducky: warning: {}: {e}", path.display());
    }
    settings
}

// ── Listing ───────────────────────────────────────────────────────────────────

fn list_scripts(settings: &Settings) {
    let Some(dir) = settings.scripts_dir() else {
        eprintln!("ducky: no scripts directory (set scripts_dir)");
        process::exit(1);
    };
    match library::scan(&dir) {
        Ok(scripts) if scripts.is_empty() => println!("No scripts in {}", dir.display()),
        Ok(scripts) => {
            for s in scripts {
                println!("{:<32} {:>8} bytes {:>6} lines", s.name, s.size, s.lines);
            }
        }
        Err(e) => {
            eprintln!("ducky: {}: {e}", dir.display());
            process::exit(1);
        }
    }
}

// ── Running ───────────────────────────────────────────────────────────────────

async fn run_script(path: &Path, settings: &Settings) -> State {
    let program = match Program::parse_file(path) {
        Ok(p) => p,
        Err(e) => {
            match e.line() {
                Some(line) => eprintln!("ducky: line {line}: {e}"),
                None => eprintln!("ducky: {e}"),
            }
            process::exit(1);
        }
    };
    let total_lines = ScriptInfo::from_path(path).map_or(0, |i| i.lines);

    let recorder = Recorder::new();
    let mut engine = Engine::new(Logger::new(recorder.clone()));
    if let Err(e) = engine.load(program) {
        eprintln!("ducky: {e}");
        return State::Error;
    }
    settings.apply(&mut engine);

    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<Status>();
    engine.set_status_callback(status_tx);

    let worker = match Worker::spawn(engine) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("ducky: cannot start worker: {e}");
            process::exit(1);
        }
    };

    let interactive = io::stdin().is_terminal();
    let raw = if interactive {
        console::enter_raw_mode().ok()
    } else {
        None
    };

    // Raw keystrokes come from a dedicated thread; an empty vec marks EOF.
    let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(16);
    if raw.is_some() {
        std::thread::spawn(move || {
            let stdin = io::stdin();
            let mut guard = stdin.lock();
            let mut buf = [0u8; 64];
            loop {
                match guard.read(&mut buf) {
                    Ok(0) | Err(_) => {
                        let _ = stdin_tx.blocking_send(vec![]);
                        break;
                    }
                    Ok(n) => {
                        if stdin_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    } else {
        drop(stdin_tx);
    }

    let mut console = Console::new(io::stdout(), total_lines);
    let mut tick = tokio::time::interval(FINISH_POLL);

    loop {
        tokio::select! {
            Some(status) = status_rx.recv() => {
                if raw.is_some() {
                    let _ = console.render(&status);
                }
            }
            Some(bytes) = stdin_rx.recv() => {
                for b in bytes {
                    match console::decode_key(b) {
                        Some(Control::Pause) => { worker.pause(); }
                        Some(Control::Resume) => { worker.resume(); }
                        Some(Control::Toggle) => {
                            if !worker.pause() {
                                worker.resume();
                            }
                        }
                        Some(Control::Stop) => { worker.stop(); }
                        None => {}
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                worker.stop();
            }
            _ = tick.tick() => {
                if worker.is_finished() {
                    break;
                }
            }
        }
    }

    let engine = match worker.join() {
        Ok(engine) => engine,
        Err(_) => {
            drop(raw);
            eprintln!("ducky: worker thread panicked");
            process::exit(1);
        }
    };

    let status = engine.status();
    let _ = console.finish(&status);
    drop(raw);

    let typed = recorder.typed();
    if !typed.is_empty() {
        println!("Typed: {typed:?}");
    }
    println!("{} HID events", recorder.events().len());
    status.state
}
