//! Status classifier — maps a chat status to a working verdict.
//!
//! DESIGN
//! ======
//! A fixed keyword/emoji heuristic, matched case-insensitively by substring.
//! Explicit "not working" signals beat "working" ones, and a status that
//! matches neither set is `Neutral`: the person changed their status but we
//! learned nothing about whether they are working.
//!
//! Presence always wins over self-reported status. An offline person is
//! `NotWorking` and their status is rewritten to the offline marker before
//! anything is persisted.

use serde::Serialize;

/// Text recorded for people whose presence is offline.
pub const OFFLINE_TEXT: &str = "offline";

const WORKING_KEYWORDS: &[&str] = &[
    "working",
    "coding",
    "developing",
    "programming",
    "building",
    "debugging",
    "testing",
    "reviewing",
    "meeting",
    "call",
    "designing",
    "planning",
    "writing",
    "documenting",
];

const WORKING_EMOJIS: &[&str] = &[
    ":computer:",
    ":laptop:",
    ":desktop_computer:",
    ":keyboard:",
    ":coffee:",
    ":construction:",
    ":wrench:",
    ":hammer:",
    ":gear:",
    ":bulb:",
    ":pencil:",
    ":memo:",
    ":working:",
];

const NOT_WORKING_KEYWORDS: &[&str] = &[
    "lunch",
    "break",
    "away",
    "out",
    "offline",
    "vacation",
    "sick",
    "commuting",
    "traveling",
    "afk",
    "be right back",
    "brb",
];

const NOT_WORKING_EMOJIS: &[&str] = &[
    ":lunch:",
    ":hamburger:",
    ":sandwich:",
    ":pizza:",
    ":away:",
    ":zzz:",
    ":sleeping:",
    ":bed:",
    ":car:",
    ":bus:",
    ":train:",
    ":airplane:",
    ":face_with_thermometer:",
    ":sick:",
    ":sneezing_face:",
    ":no_entry:",
    ":palm_tree:",
    ":spiral_calendar:",
];

/// Ternary outcome of classifying one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Working,
    NotWorking,
    /// Status changed, working state did not.
    Neutral,
}

impl Verdict {
    #[must_use]
    pub fn is_working(self) -> bool {
        self == Self::Working
    }
}

/// The status that will actually be recorded, after presence is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStatus {
    pub emoji: String,
    pub text: String,
    pub verdict: Verdict,
}

/// Classify a status. Pure and deterministic.
#[must_use]
pub fn classify(emoji: &str, text: &str, is_online: bool) -> Verdict {
    if !is_online {
        return Verdict::NotWorking;
    }

    let emoji = emoji.to_lowercase();
    let text = text.to_lowercase();

    if matches_any(&emoji, &text, NOT_WORKING_KEYWORDS, NOT_WORKING_EMOJIS) {
        Verdict::NotWorking
    } else if matches_any(&emoji, &text, WORKING_KEYWORDS, WORKING_EMOJIS) {
        Verdict::Working
    } else {
        Verdict::Neutral
    }
}

/// Apply offline forcing, then classify.
#[must_use]
pub fn resolve(emoji: &str, text: &str, is_online: bool) -> ResolvedStatus {
    if !is_online {
        return ResolvedStatus { emoji: String::new(), text: OFFLINE_TEXT.to_string(), verdict: Verdict::NotWorking };
    }
    ResolvedStatus { emoji: emoji.to_string(), text: text.to_string(), verdict: classify(emoji, text, true) }
}

fn matches_any(emoji: &str, text: &str, keywords: &[&str], emojis: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k)) || emojis.iter().any(|e| emoji.contains(e))
}

#[cfg(test)]
#[path = "classifier_test.rs"]
mod tests;
