//! Core types and configuration for murmur.
//!
//! This crate provides platform-agnostic types that can be used across
//! all murmur sub-crates: the configuration surface, the session state
//! machine, lifecycle events, and the voice-command interpreter.

mod command;
mod config;
mod event;
mod state;

pub use command::{Action, CommandResult, interpret};
pub use config::{BackendChoice, Config, ConfigManager};
pub use event::{SessionEvent, TranscriptUpdate};
pub use state::SessionState;

/// Application name
pub const APP_NAME: &str = "murmur";

/// Pretty application name for display
pub const APP_NAME_PRETTY: &str = "Murmur";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";
