//! System notifications for session failures.
//!
//! A menu-bar app has no window to surface errors in, so failures the user
//! has to act on (missing credential, busy device, failed remote
//! submission) are raised as system notifications from the event loop.

use murmur_core::{APP_NAME, APP_NAME_PRETTY};
use notify_rust::Notification;
use tracing::error;

use crate::icon::ICON_PATH;

/// A session that was running failed and has been reset to idle.
pub fn session_failed(reason: &str) {
    show("Dictation failed", reason);
}

/// A session could not be started.
pub fn start_failed(reason: &str) {
    show("Could not start dictation", reason);
}

fn summary(kind: &str) -> String {
    format!("{} - {}", APP_NAME_PRETTY, kind)
}

fn show(kind: &str, body: &str) {
    Notification::new()
        .icon(ICON_PATH)
        .appname(APP_NAME)
        .summary(&summary(kind))
        .body(body)
        .show()
        .map_err(|e| error!("Failed to send notification: {}", e))
        .ok();
}
