// Re-export from sub-crates
pub use murmur_core::{
    APP_NAME, APP_NAME_PRETTY, Action, BackendChoice, Config, ConfigManager, DEFAULT_LOG_LEVEL,
    SessionEvent, SessionState,
};
pub use murmur_audio::{AudioSource, CpalAudioSource};
pub use murmur_session::{
    DictationSession, RecognizerFactory, RecognizerRequest, SessionError, TextActuator,
};

// App-specific modules
mod color;
pub mod actuate;
pub mod event;
pub mod icon;
pub mod notify;

// Version from this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
