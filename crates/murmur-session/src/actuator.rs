//! Actuation surface: applying transcripts to the focused UI target.

use murmur_core::Action;

/// Applies literal text or a discrete action to whatever currently has
/// keyboard focus.
///
/// Implementations must fail gracefully (log and no-op) when no focused
/// target exists or the platform call fails; the session never retries an
/// actuation.
pub trait TextActuator: Send + Sync {
    /// Insert literal text at the current focus.
    fn insert(&self, text: &str);

    /// Simulate the key combination for `action`.
    fn perform(&self, action: Action);
}
