//! Tray icon variants, one per session state.

use std::path::Path;
use std::sync::LazyLock;

use murmur_core::SessionState;

use crate::color;

pub const ICON_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/icon.png");

static ICON_IDLE: LazyLock<tray_icon::Icon> = LazyLock::new(|| load_icon(ICON_PATH, None));
static ICON_STARTING: LazyLock<tray_icon::Icon> =
    LazyLock::new(|| load_icon(ICON_PATH, Some(color::YELLOW.default_dark)));
static ICON_LISTENING: LazyLock<tray_icon::Icon> =
    LazyLock::new(|| load_icon(ICON_PATH, Some(color::GREEN.default_dark)));
static ICON_STOPPING: LazyLock<tray_icon::Icon> =
    LazyLock::new(|| load_icon(ICON_PATH, Some(color::GRAY.default_dark)));
static ICON_FAILED: LazyLock<tray_icon::Icon> =
    LazyLock::new(|| load_icon(ICON_PATH, Some(color::RED.default_dark)));

/// The tray icon to display for a session state.
pub fn icon_for(state: SessionState) -> tray_icon::Icon {
    match state {
        SessionState::Idle => ICON_IDLE.clone(),
        SessionState::Starting => ICON_STARTING.clone(),
        SessionState::Listening => ICON_LISTENING.clone(),
        SessionState::Stopping => ICON_STOPPING.clone(),
        SessionState::Failed => ICON_FAILED.clone(),
    }
}

fn load_icon(path: impl AsRef<Path>, recolor: Option<(u8, u8, u8)>) -> tray_icon::Icon {
    let (icon_rgba, icon_width, icon_height) = {
        let mut image = image::open(path)
            .expect("Failed to open icon path")
            .into_rgba8();

        if let Some((r, g, b)) = recolor {
            for pixel in image.pixels_mut() {
                pixel[0] = r;
                pixel[1] = g;
                pixel[2] = b;
            }
        }

        let (width, height) = image.dimensions();
        let rgba = image.into_raw();
        (rgba, width, height)
    };
    tray_icon::Icon::from_rgba(icon_rgba, icon_width, icon_height).expect("Failed to open icon")
}
