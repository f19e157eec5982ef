//! Local stand-in for the tutor service.
//!
//! While the transport is down every outbound message is answered here,
//! after a short randomized delay, with replies shaped exactly like the live
//! service's. Nothing produced here is a genuine translation or grading; it
//! only keeps the surfaces responsive.

use std::collections::HashMap;
use std::time::Duration;

use caatuu_core::challenge::{Challenge, ChallengeKind, ChallengeSource, Rubric};
use caatuu_core::pinyin::is_han;
use caatuu_core::protocol::{ClientMessage, ServerMessage};
use pinyin::ToPinyin;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::config::Config;

pub const OFFLINE_TRANSLATION: &str = "[offline] translation unavailable";
const SUCCESS_SCORE: f32 = 95.0;
const DEFAULT_MIN_IDEOGRAPHS: usize = 6;
const TERMINAL_PUNCTUATION: [char; 6] = ['。', '！', '？', '.', '!', '?'];

const HINTS: [&str; 4] = [
    "Start with the subject, then the time, then the verb.",
    "Time words like 今天 or 下午三点 usually come before the verb.",
    "了 after a verb marks a completed action.",
    "Read the sentence aloud once before you type it.",
];

const SPEECH_SAMPLES: [&str; 3] = ["我想喝咖啡。", "今天天气很好。", "我们一起学习吧！"];

fn exact(id: &str, zh: &str, py: &str, en: &str) -> Challenge {
    Challenge {
        id: id.to_string(),
        difficulty: "hsk1".to_string(),
        kind: ChallengeKind::ExactZh,
        source: ChallengeSource::LocalBank,
        zh: zh.to_string(),
        py: py.to_string(),
        en: en.to_string(),
        instructions: "Type the sentence in Chinese.".to_string(),
        ..Default::default()
    }
}

fn freeform(
    id: &str,
    difficulty: &str,
    seed: (&str, &str),
    task: (&str, &str),
    min_chars: usize,
    must_include: &[&str],
) -> Challenge {
    Challenge {
        id: id.to_string(),
        difficulty: difficulty.to_string(),
        kind: ChallengeKind::FreeformZh,
        source: ChallengeSource::Seed,
        seed_zh: seed.0.to_string(),
        seed_en: seed.1.to_string(),
        challenge_zh: task.0.to_string(),
        challenge_en: task.1.to_string(),
        rubric: Some(Rubric {
            min_chars: Some(min_chars),
            must_include: Some(must_include.iter().map(|w| w.to_string()).collect()),
            avoid: None,
            target_level: Some(difficulty.to_string()),
        }),
        ..Default::default()
    }
}

/// The fixed challenge bank served while offline.
pub fn sample_bank() -> Vec<Challenge> {
    vec![
        exact("local-1", "我想喝咖啡。", "wǒ xiǎng hē kā fēi.", "I want to drink coffee."),
        exact(
            "local-2",
            "今天天气很好。",
            "jīn tiān tiān qì hěn hǎo.",
            "The weather is great today.",
        ),
        exact(
            "local-3",
            "他昨天去了北京。",
            "tā zuó tiān qù le běi jīng.",
            "He went to Beijing yesterday.",
        ),
        freeform(
            "c3001",
            "hsk3",
            ("周末我在家休息。", "On weekends I rest at home."),
            (
                "把主语改成“她”，去一个具体的地方，加上下午三点。",
                "Switch the subject to 'she', go somewhere specific, add 3 p.m.",
            ),
            10,
            &["她"],
        ),
        freeform(
            "c3002",
            "hsk2",
            ("我们晚上在家做饭。", "We cook dinner at home in the evening."),
            (
                "把主语改成“他们”，在公园做别的活动。",
                "Switch the subject to 'they' and do something else in the park.",
            ),
            8,
            &["他们", "公园"],
        ),
    ]
}

/// Answers outbound messages locally while the live service is unreachable.
pub struct OfflineSimulator {
    rng: StdRng,
    bank: Vec<Challenge>,
    lexicon: HashMap<char, String>,
    challenge_cursor: usize,
    hint_cursor: usize,
    latency_min: Duration,
    latency_max: Duration,
}

impl OfflineSimulator {
    pub fn new(config: &Config) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Builds a simulator with a caller-provided RNG, for reproducible runs.
    pub fn with_rng(config: &Config, mut rng: StdRng) -> Self {
        let bank = sample_bank();
        let lexicon = build_lexicon(&bank);
        let challenge_cursor = rng.random_range(0..bank.len());
        Self {
            rng,
            bank,
            lexicon,
            challenge_cursor,
            hint_cursor: 0,
            latency_min: config.sim_latency_min,
            latency_max: config.sim_latency_max.max(config.sim_latency_min),
        }
    }

    /// Called every time the client falls back to offline mode.
    pub fn activate(&mut self) {
        self.challenge_cursor = self.rng.random_range(0..self.bank.len());
        self.hint_cursor = 0;
        info!(cursor = self.challenge_cursor, "Offline simulator activated");
    }

    /// A delay drawn uniformly from the configured latency window.
    pub fn latency(&mut self) -> Duration {
        let min = self.latency_min.as_millis() as u64;
        let max = self.latency_max.as_millis() as u64;
        Duration::from_millis(self.rng.random_range(min..=max))
    }

    /// Answers `message` after a simulated delay by posting into `inbound`.
    pub fn dispatch(&mut self, message: &ClientMessage, inbound: &UnboundedSender<ServerMessage>) {
        let Some(reply) = self.respond(message) else {
            debug!(kind = message.kind(), "Simulator ignores message");
            return;
        };
        let delay = self.latency();
        let inbound = inbound.clone();
        debug!(
            kind = message.kind(),
            delay_ms = delay.as_millis() as u64,
            "Simulated reply scheduled"
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The session may already be gone at shutdown.
            let _ = inbound.send(reply);
        });
    }

    /// Computes the reply for `message`, or `None` for messages the service
    /// never answers.
    pub fn respond(&mut self, message: &ClientMessage) -> Option<ServerMessage> {
        let reply = match message {
            ClientMessage::NewChallenge { difficulty } => {
                let mut challenge = self.bank[self.challenge_cursor % self.bank.len()].clone();
                self.challenge_cursor = (self.challenge_cursor + 1) % self.bank.len();
                self.hint_cursor = 0;
                if let Some(difficulty) = difficulty {
                    challenge.difficulty = difficulty.clone();
                }
                ServerMessage::Challenge { challenge }
            }
            ClientMessage::SubmitAnswer {
                challenge_id,
                answer,
            } => self.judge(challenge_id, answer),
            ClientMessage::Hint { .. } => {
                let text = HINTS[self.hint_cursor % HINTS.len()].to_string();
                self.hint_cursor = (self.hint_cursor + 1) % HINTS.len();
                ServerMessage::Hint { text }
            }
            ClientMessage::TranslateInput { text } => ServerMessage::Translate {
                text: text.clone(),
                translation: OFFLINE_TRANSLATION.to_string(),
            },
            ClientMessage::PinyinInput { text } => ServerMessage::Pinyin {
                text: text.clone(),
                pinyin: self.annotate(text),
            },
            ClientMessage::GrammarInput { text } => ServerMessage::Grammar {
                text: text.clone(),
                corrected: correct_grammar(text),
            },
            ClientMessage::NextChar {
                current,
                challenge_id,
            } => self.next_char(challenge_id, current),
            ClientMessage::SpeechToTextInput { .. } => {
                let pick = self.rng.random_range(0..SPEECH_SAMPLES.len());
                ServerMessage::SpeechToText {
                    text: SPEECH_SAMPLES[pick].to_string(),
                }
            }
            ClientMessage::AgentMessage { text, .. } => ServerMessage::AgentReply {
                text: agent_reply(text),
            },
            ClientMessage::AgentReset | ClientMessage::Ping => return None,
        };
        Some(reply)
    }

    fn find(&self, challenge_id: &str) -> Option<&Challenge> {
        self.bank.iter().find(|c| c.id == challenge_id)
    }

    fn judge(&mut self, challenge_id: &str, answer: &str) -> ServerMessage {
        let (correct, expected, explanation) = match self.find(challenge_id) {
            Some(challenge) if challenge.is_alignment_seeded() => {
                let correct = normalize(answer) == normalize(&challenge.zh);
                let explanation = if correct {
                    "Correct! Exact match (ignoring spacing).".to_string()
                } else {
                    "Not quite. Check characters and order.".to_string()
                };
                (correct, challenge.zh.clone(), explanation)
            }
            Some(challenge) => {
                let (correct, explanation) = judge_freeform(challenge.rubric.as_ref(), answer);
                (correct, String::new(), explanation)
            }
            None => (
                false,
                String::new(),
                format!("Unknown challengeId: {challenge_id}"),
            ),
        };
        let score = if correct {
            SUCCESS_SCORE
        } else {
            self.rng.random_range(35..=65) as f32
        };
        ServerMessage::AnswerResult {
            correct,
            score,
            expected,
            explanation,
        }
    }

    fn next_char(&self, challenge_id: &str, current: &str) -> ServerMessage {
        let empty = |reason: &str| ServerMessage::NextChar {
            ch: String::new(),
            pinyin: String::new(),
            reason: reason.to_string(),
        };
        let Some(challenge) = self.find(challenge_id) else {
            return empty("Unknown challenge; cannot continue.");
        };
        if !challenge.is_alignment_seeded() {
            return empty("Not applicable to freeform tasks.");
        }
        match next_position(&challenge.zh, current) {
            Some(index) => {
                let alignment = challenge.alignment();
                let ch = challenge.zh.chars().nth(index).unwrap_or_default();
                ServerMessage::NextChar {
                    ch: ch.to_string(),
                    pinyin: alignment.get(index).cloned().unwrap_or_default(),
                    reason: "Continuation of the target sentence.".to_string(),
                }
            }
            None => empty("Already complete or no valid continuation."),
        }
    }

    fn annotate(&self, text: &str) -> String {
        annotate_with(text, |ch| self.reading(ch))
    }

    /// Bank alignments win over the dictionary so served sentences read the
    /// way their transcriptions say.
    fn reading(&self, ch: char) -> Option<String> {
        self.lexicon
            .get(&ch)
            .cloned()
            .or_else(|| ch.to_pinyin().map(|py| py.with_tone().to_string()))
    }
}

/// One space-separated token per ideograph, everything else copied through.
///
/// An ideograph without a reading is emitted as itself, so the output still
/// has exactly one letter token per ideograph of `text`.
fn annotate_with(text: &str, reading: impl Fn(char) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    let mut last_was_token = false;
    for ch in text.chars() {
        if is_han(ch) {
            if last_was_token {
                out.push(' ');
            }
            match reading(ch) {
                Some(syllable) => out.push_str(&syllable),
                None => out.push(ch),
            }
            last_was_token = true;
        } else {
            out.push(ch);
            last_was_token = false;
        }
    }
    out
}

/// Per-character readings taken from the bank's own transcriptions.
fn build_lexicon(bank: &[Challenge]) -> HashMap<char, String> {
    let mut lexicon = HashMap::new();
    for challenge in bank.iter().filter(|c| c.is_alignment_seeded()) {
        for (ch, syllable) in challenge.zh.chars().zip(challenge.alignment()) {
            if !syllable.is_empty() {
                lexicon.entry(ch).or_insert(syllable);
            }
        }
    }
    lexicon
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect()
}

/// Length counts ideographs only, so punctuation and Latin text never pad an
/// answer past `min_chars`.
fn judge_freeform(rubric: Option<&Rubric>, answer: &str) -> (bool, String) {
    let min_chars = rubric
        .and_then(|r| r.min_chars)
        .unwrap_or(DEFAULT_MIN_IDEOGRAPHS);
    let ideographs = answer.chars().filter(|c| is_han(*c)).count();

    let mut notes = Vec::new();
    if ideographs < min_chars {
        notes.push(format!("Too short (< {min_chars})"));
    }
    for word in rubric.and_then(|r| r.must_include.as_deref()).unwrap_or_default() {
        if !answer.contains(word.as_str()) {
            notes.push(format!("Missing '{word}'"));
        }
    }
    for word in rubric.and_then(|r| r.avoid.as_deref()).unwrap_or_default() {
        if answer.contains(word.as_str()) {
            notes.push(format!("Avoid '{word}' present"));
        }
    }

    if notes.is_empty() {
        (true, "Looks okay.".to_string())
    } else {
        (false, notes.join("; "))
    }
}

fn correct_grammar(text: &str) -> String {
    let mut corrected = text.replace("了了", "了");
    if !corrected.is_empty() && !corrected.ends_with(TERMINAL_PUNCTUATION) {
        corrected.push('。');
    }
    corrected
}

/// Index of the character that follows `current` within `full`.
///
/// A prefix continues where it stops; a fragment found elsewhere continues
/// after its first occurrence; anything unrelated restarts at the beginning.
fn next_position(full: &str, current: &str) -> Option<usize> {
    let total = full.chars().count();
    let index = if full.starts_with(current) {
        current.chars().count()
    } else if let Some(byte_pos) = full.find(current) {
        full[..byte_pos].chars().count() + current.chars().count()
    } else {
        0
    };
    (index < total).then_some(index)
}

fn agent_reply(text: &str) -> String {
    let lower = text.to_lowercase();
    if text.contains('了') || lower.contains("le ") || lower == "le" {
        "了 marks a completed action here.".to_string()
    } else if lower.contains("why") {
        "Short answer: the particle shows aspect or mood depending on where it sits.".to_string()
    } else {
        "I'm offline right now. Try the core pattern subject + verb + object.".to_string()
    }
}
