//! DuckyScript tokenizer, loader and interpreter.
//!
//! Scripts are parsed into a [`script::Program`] and executed by a
//! [`script::Engine`] against any [`hid::Hid`] backend.  The binary runs
//! scripts as a dry run against [`hid::Recorder`].

pub mod cli;
pub mod config;
pub mod console;
pub mod hid;
pub mod keys;
pub mod library;
pub mod script;
pub mod worker;
