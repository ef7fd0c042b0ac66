//! Application events for the tao event loop.

use murmur_core::SessionEvent;

/// User events delivered to the tao event loop.
#[derive(Debug, Clone)]
pub enum MurmurEvent {
    /// The dictation session reported a lifecycle event
    Session(SessionEvent),
}
