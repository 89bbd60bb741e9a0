//! Runs an [`Engine`] on its own thread.
//!
//! The owning thread keeps an [`EngineHandle`] for pause/resume/stop and
//! receives progress through whatever [`StatusSink`](crate::script::StatusSink)
//! was installed on the engine before spawning.  When the run ends the
//! engine is handed back by [`Worker::join`].

use std::io;
use std::thread::{self, JoinHandle};

use log::debug;

use crate::script::{Engine, EngineHandle, State};

/// A running script.
#[derive(Debug)]
pub struct Worker {
    handle: EngineHandle,
    thread: JoinHandle<Engine>,
}

impl Worker {
    /// Move `engine` onto a new `ducky-worker` thread and start
    /// [`Engine::run`].
    pub fn spawn(mut engine: Engine) -> io::Result<Self> {
        let handle = engine.handle();
        let thread = thread::Builder::new()
            .name("ducky-worker".to_owned())
            .spawn(move || {
                let end = engine.run();
                debug!("worker exiting: {end}");
                engine
            })?;
        Ok(Self { handle, thread })
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    pub fn state(&self) -> State {
        self.handle.state()
    }

    pub fn pause(&self) -> bool {
        self.handle.pause()
    }

    pub fn resume(&self) -> bool {
        self.handle.resume()
    }

    pub fn stop(&self) -> bool {
        self.handle.stop()
    }

    /// Returns `true` once the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end and take the engine back.
    pub fn join(self) -> thread::Result<Engine> {
        self.thread.join()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
