//! Keyboard actuation for the focused application.
//!
//! Enigo is not Send, so it stays parked in its own thread and we talk to
//! it over a channel. Actuation failures are logged and dropped; the
//! session never retries.

use std::sync::mpsc;
use std::thread;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use enigo::Direction::{Click, Press, Release};
use enigo::{Enigo, Key, Keyboard};
use murmur_core::Action;
use murmur_session::TextActuator;
use tracing::warn;

const KEY_DELAY: Duration = Duration::from_millis(10);

enum Op {
    Insert(String),
    Perform(Action),
}

/// Applies transcripts to whatever has keyboard focus by synthesizing
/// keystrokes.
pub struct EnigoActuator {
    ops: mpsc::Sender<Op>,
}

impl EnigoActuator {
    pub fn new() -> Result<Self> {
        let (ops, receiver) = mpsc::channel::<Op>();
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::Builder::new()
            .name("actuator".to_string())
            .spawn(move || {
                let mut enigo = match Enigo::new(&enigo::Settings::default()) {
                    Ok(enigo) => {
                        ready_tx.send(Ok(())).ok();
                        enigo
                    }
                    Err(e) => {
                        ready_tx
                            .send(Err(anyhow!("failed to initialize keyboard synthesis: {e}")))
                            .ok();
                        return;
                    }
                };

                while let Ok(op) = receiver.recv() {
                    let result = match op {
                        Op::Insert(text) => enigo.text(&text),
                        Op::Perform(action) => press_combo(&mut enigo, action),
                    };
                    if let Err(e) = result {
                        warn!("Keyboard actuation failed: {}", e);
                    }
                }
            })
            .context("failed to spawn actuator thread")?;

        ready_rx
            .recv()
            .context("actuator thread exited during startup")??;
        Ok(Self { ops })
    }
}

impl TextActuator for EnigoActuator {
    fn insert(&self, text: &str) {
        self.ops.send(Op::Insert(text.to_string())).ok();
    }

    fn perform(&self, action: Action) {
        self.ops.send(Op::Perform(action)).ok();
    }
}

fn press_combo(enigo: &mut Enigo, action: Action) -> enigo::InputResult<()> {
    #[cfg(target_os = "macos")]
    let command = Key::Meta;
    #[cfg(not(target_os = "macos"))]
    let command = Key::Control;

    // Delete-last-word is option+delete on macOS, ctrl+backspace elsewhere
    #[cfg(target_os = "macos")]
    let word_modifier = Key::Alt;
    #[cfg(not(target_os = "macos"))]
    let word_modifier = Key::Control;

    let (modifier, key) = match action {
        Action::DeleteLastWord => (word_modifier, Key::Backspace),
        Action::SelectAll => (command, Key::Unicode('a')),
        Action::Copy => (command, Key::Unicode('c')),
        Action::Paste => (command, Key::Unicode('v')),
        Action::Undo => (command, Key::Unicode('z')),
    };

    enigo.key(modifier, Press)?;
    sleep(KEY_DELAY);
    enigo.key(key, Click)?;
    sleep(KEY_DELAY);
    enigo.key(modifier, Release)?;

    Ok(())
}
