//! The single event loop that owns all client state.
//!
//! User commands, transport/timer events and replies (live or simulated) are
//! all funnelled into [`Session::run`], which is the only place any of the
//! state is mutated.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use caatuu_core::challenge::Challenge;
use caatuu_core::correlator::RequestCorrelator;
use caatuu_core::diff::{Segment, diff_chars};
use caatuu_core::pinyin::{align_to_text, is_han};
use caatuu_core::protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument};

use super::connection::{ConnectionManager, ManagerChannels};
use super::machine::ConnectionState;

/// Who asked for a content-keyed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// The answer-assist panel.
    Assist,
    /// The tutor agent panel.
    Agent,
    /// A panel of an embedding host UI, told apart by `token`. The terminal
    /// front end never builds one; hosts with several panels of the same
    /// kind tag each request with their own token.
    Surface { kind: String, token: u64 },
}

/// Requests coming from the user interface.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NewChallenge { difficulty: Option<String> },
    SubmitAnswer { answer: String },
    Hint,
    Translate { text: String, caller: Caller },
    Pinyin { text: String, caller: Caller },
    Grammar { text: String, caller: Caller },
    NextChar { current: String },
    AgentMessage { text: String },
    AgentReset,
    SpeechToText { audio_base64: String, mime: String },
    Connect,
    Network { online: bool },
    Status,
    Shutdown,
}

/// Request families shown as "loading" until their reply arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestKind {
    Challenge,
    Answer,
    Hint,
    Translate,
    Pinyin,
    Grammar,
    NextChar,
    Agent,
    Speech,
}

/// Everything the user interface needs to render.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Challenge(Challenge),
    AnswerResult {
        correct: bool,
        score: f32,
        expected: String,
        explanation: String,
    },
    Hint(String),
    Translation {
        caller: Caller,
        text: String,
        translation: String,
    },
    /// `syllables` has one entry per character of `text`.
    Pinyin {
        caller: Caller,
        text: String,
        syllables: Vec<String>,
    },
    Grammar {
        caller: Caller,
        text: String,
        corrected: String,
        script: Vec<Segment>,
    },
    NextChar {
        ch: String,
        pinyin: String,
        reason: String,
    },
    AgentReply(String),
    SpeechText(String),
    Warning(String),
    Error(String),
    Status {
        state: ConnectionState,
        attempt: u32,
        challenge_id: Option<String>,
        loading: Vec<RequestKind>,
    },
}

pub struct Session {
    manager: ConnectionManager,
    translations: RequestCorrelator<Caller>,
    pinyin: RequestCorrelator<Caller>,
    grammar: RequestCorrelator<Caller>,
    challenge: Option<Challenge>,
    loading: BTreeSet<RequestKind>,
    default_difficulty: String,
    ui_tx: UnboundedSender<UiEvent>,
}

impl Session {
    pub fn new(
        manager: ConnectionManager,
        default_difficulty: impl Into<String>,
        ui_tx: UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            manager,
            translations: RequestCorrelator::new(),
            pinyin: RequestCorrelator::new(),
            grammar: RequestCorrelator::new(),
            challenge: None,
            loading: BTreeSet::new(),
            default_difficulty: default_difficulty.into(),
            ui_tx,
        }
    }

    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    pub fn is_loading(&self, kind: RequestKind) -> bool {
        self.loading.contains(&kind)
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Runs until a [`Command::Shutdown`] arrives or the command channel or
    /// the UI goes away.
    #[instrument(name = "session", skip_all)]
    pub async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        mut channels: ManagerChannels,
    ) -> Result<()> {
        info!("Session started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command)? {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = channels.link_rx.recv() => self.manager.handle_link_event(event),
                Some(message) = channels.inbound_rx.recv() => self.handle_inbound(message)?,
            }
        }
        self.manager.shutdown();
        info!("Session finished");
        Ok(())
    }

    /// Applies one user command. Returns `false` once the session should stop.
    pub fn handle_command(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::NewChallenge { difficulty } => {
                let difficulty = difficulty.unwrap_or_else(|| self.default_difficulty.clone());
                self.request(
                    RequestKind::Challenge,
                    ClientMessage::NewChallenge {
                        difficulty: Some(difficulty),
                    },
                );
            }
            Command::SubmitAnswer { answer } => {
                let Some(challenge_id) = self.active_challenge_id()? else {
                    return Ok(true);
                };
                self.request(
                    RequestKind::Answer,
                    ClientMessage::SubmitAnswer {
                        challenge_id,
                        answer,
                    },
                );
            }
            Command::Hint => {
                let Some(challenge_id) = self.active_challenge_id()? else {
                    return Ok(true);
                };
                self.request(RequestKind::Hint, ClientMessage::Hint { challenge_id });
            }
            Command::Translate { text, caller } => {
                self.translations.enqueue(text.clone(), caller);
                self.request(RequestKind::Translate, ClientMessage::TranslateInput { text });
            }
            Command::Pinyin { text, caller } => {
                self.pinyin.enqueue(text.clone(), caller);
                self.request(RequestKind::Pinyin, ClientMessage::PinyinInput { text });
            }
            Command::Grammar { text, caller } => {
                self.grammar.enqueue(text.clone(), caller);
                self.request(RequestKind::Grammar, ClientMessage::GrammarInput { text });
            }
            Command::NextChar { current } => {
                let Some(challenge_id) = self.active_challenge_id()? else {
                    return Ok(true);
                };
                self.request(
                    RequestKind::NextChar,
                    ClientMessage::NextChar {
                        current,
                        challenge_id,
                    },
                );
            }
            Command::AgentMessage { text } => {
                let Some(challenge_id) = self.active_challenge_id()? else {
                    return Ok(true);
                };
                self.request(
                    RequestKind::Agent,
                    ClientMessage::AgentMessage { text, challenge_id },
                );
            }
            Command::AgentReset => self.manager.send(ClientMessage::AgentReset),
            Command::SpeechToText { audio_base64, mime } => {
                self.request(
                    RequestKind::Speech,
                    ClientMessage::SpeechToTextInput { audio_base64, mime },
                );
            }
            Command::Connect => self.manager.connect(),
            Command::Network { online } => self.manager.network(online),
            Command::Status => {
                let status = UiEvent::Status {
                    state: self.manager.state(),
                    attempt: self.manager.attempt(),
                    challenge_id: self.challenge.as_ref().map(|c| c.id.clone()),
                    loading: self.loading.iter().copied().collect(),
                };
                self.emit(status)?;
            }
            Command::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    /// Routes one reply from the service (or the simulator).
    pub fn handle_inbound(&mut self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::Challenge { challenge } => {
                self.loading.remove(&RequestKind::Challenge);
                info!(id = %challenge.id, kind = ?challenge.kind, "New challenge");
                self.challenge = Some(challenge.clone());
                self.emit(UiEvent::Challenge(challenge))?;
            }
            ServerMessage::AnswerResult {
                correct,
                score,
                expected,
                explanation,
            } => {
                self.loading.remove(&RequestKind::Answer);
                self.emit(UiEvent::AnswerResult {
                    correct,
                    score,
                    expected,
                    explanation,
                })?;
            }
            ServerMessage::Hint { text } => {
                self.loading.remove(&RequestKind::Hint);
                self.emit(UiEvent::Hint(text))?;
            }
            ServerMessage::Translate { text, translation } => {
                let Some(caller) = self.translations.dequeue(&text) else {
                    debug!(%text, "No caller waiting for translation");
                    return Ok(());
                };
                if self.translations.is_empty() {
                    self.loading.remove(&RequestKind::Translate);
                }
                self.emit(UiEvent::Translation {
                    caller,
                    text,
                    translation,
                })?;
            }
            ServerMessage::Pinyin { text, pinyin } => {
                let Some(caller) = self.pinyin.dequeue(&text) else {
                    debug!(%text, "No caller waiting for pinyin");
                    return Ok(());
                };
                if self.pinyin.is_empty() {
                    self.loading.remove(&RequestKind::Pinyin);
                }
                let syllables = align_to_text(&text, &pinyin);
                self.emit(UiEvent::Pinyin {
                    caller,
                    text,
                    syllables,
                })?;
            }
            ServerMessage::Grammar { text, corrected } => {
                let Some(caller) = self.grammar.dequeue(&text) else {
                    debug!(%text, "No caller waiting for grammar");
                    return Ok(());
                };
                if self.grammar.is_empty() {
                    self.loading.remove(&RequestKind::Grammar);
                }
                let script = diff_chars(&text, &corrected);
                self.emit(UiEvent::Grammar {
                    caller,
                    text,
                    corrected,
                    script,
                })?;
            }
            ServerMessage::NextChar { ch, pinyin, reason } => {
                self.loading.remove(&RequestKind::NextChar);
                self.emit(UiEvent::NextChar { ch, pinyin, reason })?;
            }
            ServerMessage::AgentReply { text } => {
                self.loading.remove(&RequestKind::Agent);
                if text.chars().any(is_han) {
                    self.translations.enqueue(text.clone(), Caller::Agent);
                    self.request(
                        RequestKind::Translate,
                        ClientMessage::TranslateInput { text: text.clone() },
                    );
                }
                self.emit(UiEvent::AgentReply(text))?;
            }
            ServerMessage::SpeechToText { text } => {
                self.loading.remove(&RequestKind::Speech);
                self.emit(UiEvent::SpeechText(text))?;
            }
            ServerMessage::SpeechToTextError { message } => {
                self.loading.remove(&RequestKind::Speech);
                self.emit(UiEvent::Warning(format!("Speech recognition failed: {message}")))?;
            }
            ServerMessage::Error { message } => {
                self.loading.clear();
                self.emit(UiEvent::Error(message))?;
            }
            ServerMessage::Pong => {}
            ServerMessage::Unknown => debug!("Ignoring unknown message type"),
        }
        Ok(())
    }

    fn request(&mut self, kind: RequestKind, message: ClientMessage) {
        self.loading.insert(kind);
        self.manager.send(message);
    }

    /// Id of the active challenge, or `None` after telling the user there is
    /// none.
    fn active_challenge_id(&self) -> Result<Option<String>> {
        match &self.challenge {
            Some(challenge) => Ok(Some(challenge.id.clone())),
            None => {
                self.emit(UiEvent::Warning(
                    "No active challenge yet. Type `new` to get one.".to_string(),
                ))?;
                Ok(None)
            }
        }
    }

    fn emit(&self, event: UiEvent) -> Result<()> {
        self.ui_tx.send(event).context("UI event channel closed")
    }
}
