//! The challenge model as delivered by the tutor.

use serde::{Deserialize, Serialize};

use crate::pinyin::align_to_text;

/// What kind of challenge is presented to the learner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Reproduce a known sentence; carries `zh` / `py` / `en`.
    ExactZh,
    /// Rewrite a seed sentence following instructions; no fixed target.
    #[default]
    FreeformZh,
}

/// Where the service got the challenge from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeSource {
    LocalBank,
    Generated,
    #[default]
    Seed,
}

/// Optional grading hints for free-form challenges.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    #[serde(default)]
    pub min_chars: Option<usize>,
    #[serde(default)]
    pub must_include: Option<Vec<String>>,
    #[serde(default)]
    pub avoid: Option<Vec<String>>,
    #[serde(default)]
    pub target_level: Option<String>,
}

/// The currently active learning prompt.
///
/// The client never interprets most of these fields; it stores the challenge
/// as received and replaces it wholesale when a new one arrives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub kind: ChallengeKind,
    #[serde(default)]
    pub source: ChallengeSource,

    #[serde(default)]
    pub seed_zh: String,
    #[serde(default)]
    pub seed_en: String,
    #[serde(default)]
    pub challenge_zh: String,
    #[serde(default)]
    pub challenge_en: String,
    #[serde(default)]
    pub summary_en: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zh: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub py: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub en: String,

    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<Rubric>,
}

impl Challenge {
    /// True when the challenge has a fixed target sentence with a pinyin
    /// transcription, so next-character suggestions make sense.
    pub fn is_alignment_seeded(&self) -> bool {
        self.kind == ChallengeKind::ExactZh && !self.zh.is_empty()
    }

    /// The sentence the learner works from.
    pub fn prompt_zh(&self) -> &str {
        if self.is_alignment_seeded() {
            &self.zh
        } else {
            &self.seed_zh
        }
    }

    /// Per-character syllables of the target sentence (empty when free-form).
    pub fn alignment(&self) -> Vec<String> {
        if self.is_alignment_seeded() {
            align_to_text(&self.zh, &self.py)
        } else {
            Vec::new()
        }
    }
}
