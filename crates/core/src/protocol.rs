//! Defines the WebSocket message protocol between the tutor client and the service.
//!
//! Every frame is a single JSON object tagged by `type`. Replies carry no
//! request id; the echoing replies (`translate`, `pinyin`, `grammar`) repeat
//! the `text` of the request instead, see [`ServerMessage::correlation_key`].

use serde::{Deserialize, Serialize};

use crate::challenge::Challenge;

/// Messages sent from the client to the service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Asks for a fresh challenge, optionally at a given difficulty.
    NewChallenge {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<String>,
    },
    /// Submits an answer for grading.
    SubmitAnswer {
        #[serde(rename = "challengeId")]
        challenge_id: String,
        answer: String,
    },
    /// Requests a hint for the active challenge.
    Hint {
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    TranslateInput {
        text: String,
    },
    PinyinInput {
        text: String,
    },
    GrammarInput {
        text: String,
    },
    /// Asks which character comes after `current`.
    NextChar {
        current: String,
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    /// A free-text question for the tutor agent.
    AgentMessage {
        text: String,
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    AgentReset,
    /// Recorded speech to transcribe.
    SpeechToTextInput {
        #[serde(rename = "audioBase64")]
        audio_base64: String,
        mime: String,
    },
    /// Heartbeat.
    Ping,
}

impl ClientMessage {
    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::NewChallenge { .. } => "new_challenge",
            ClientMessage::SubmitAnswer { .. } => "submit_answer",
            ClientMessage::Hint { .. } => "hint",
            ClientMessage::TranslateInput { .. } => "translate_input",
            ClientMessage::PinyinInput { .. } => "pinyin_input",
            ClientMessage::GrammarInput { .. } => "grammar_input",
            ClientMessage::NextChar { .. } => "next_char",
            ClientMessage::AgentMessage { .. } => "agent_message",
            ClientMessage::AgentReset => "agent_reset",
            ClientMessage::SpeechToTextInput { .. } => "speech_to_text_input",
            ClientMessage::Ping => "ping",
        }
    }
}

/// Messages sent from the service to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A new challenge; replaces the active one.
    Challenge { challenge: Challenge },
    /// Grading result for a submitted answer.
    AnswerResult {
        correct: bool,
        #[serde(default)]
        score: f32,
        #[serde(default)]
        expected: String,
        #[serde(default)]
        explanation: String,
    },
    Hint { text: String },
    Translate { text: String, translation: String },
    Pinyin { text: String, pinyin: String },
    Grammar { text: String, corrected: String },
    /// Suggested next character and its syllable.
    NextChar {
        #[serde(rename = "char")]
        ch: String,
        #[serde(default)]
        pinyin: String,
        #[serde(default)]
        reason: String,
    },
    AgentReply { text: String },
    SpeechToText { text: String },
    SpeechToTextError { message: String },
    /// An application-level error reported by the service.
    Error { message: String },
    Pong,
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// The echoed request content for replies that are routed by content.
    pub fn correlation_key(&self) -> Option<&str> {
        match self {
            ServerMessage::Translate { text, .. }
            | ServerMessage::Pinyin { text, .. }
            | ServerMessage::Grammar { text, .. } => Some(text),
            _ => None,
        }
    }
}
