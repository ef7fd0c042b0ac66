//! Voice-command interpretation.
//!
//! Classifies one decoded transcript fragment as literal dictation text or a
//! known spoken command. Matching is case-insensitive and trims surrounding
//! whitespace; exact phrase matches always win over the lower-priority
//! substring case-transform checks.

/// A discrete system action triggered by a spoken command, executed by the
/// text actuator instead of being inserted as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Delete the word before the cursor
    DeleteLastWord,
    /// Select all text in the focused target
    SelectAll,
    /// Copy the current selection
    Copy,
    /// Paste the clipboard
    Paste,
    /// Undo the last edit
    Undo,
}

/// The outcome of interpreting one transcript fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Insert this text at the current focus
    Text(String),
    /// Perform a simulated system action
    Action(Action),
    /// Nothing to do (empty or whitespace-only transcript)
    Ignore,
}

/// Exact phrases that insert punctuation instead of their literal words.
const PUNCTUATION: &[(&str, &str)] = &[
    ("period", "."),
    ("comma", ","),
    ("question mark", "?"),
    ("exclamation mark", "!"),
    ("new line", "\n"),
];

/// Exact phrases that trigger a system action.
const ACTIONS: &[(&str, Action)] = &[
    ("delete last word", Action::DeleteLastWord),
    ("select all", Action::SelectAll),
    ("copy", Action::Copy),
    ("paste", Action::Paste),
    ("undo", Action::Undo),
];

/// Interpret one transcript fragment.
///
/// Deterministic, and command matching is case-insensitive: a phrase
/// matches in any casing. Unmatched text falls through as literal
/// dictation in its original casing.
pub fn interpret(transcript: &str) -> CommandResult {
    let trimmed = transcript.trim();
    if trimmed.is_empty() {
        return CommandResult::Ignore;
    }

    let lowered = trimmed.to_lowercase();

    for (phrase, insertion) in PUNCTUATION {
        if lowered == *phrase {
            return CommandResult::Text((*insertion).to_string());
        }
    }

    for (phrase, action) in ACTIONS {
        if lowered == *phrase {
            return CommandResult::Action(*action);
        }
    }

    // Substring case-transform directives, checked only after every exact
    // phrase missed. The transform applies to the whole utterance, trigger
    // word included: "please capitalize this" becomes "Please Capitalize
    // This".
    if lowered.contains("capitalize") {
        return CommandResult::Text(title_case(trimmed));
    }
    if lowered.contains("uppercase") {
        return CommandResult::Text(trimmed.to_uppercase());
    }
    if lowered.contains("lowercase") {
        return CommandResult::Text(trimmed.to_lowercase());
    }

    CommandResult::Text(trimmed.to_string())
}

/// Title-case each whitespace-separated word: first letter uppercased, the
/// rest lowercased.
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
