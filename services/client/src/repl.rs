//! Line-oriented terminal front end.
//!
//! Parses typed commands into session [`Command`]s and renders [`UiEvent`]s
//! back as text.

use std::path::PathBuf;

use caatuu_core::diff::{DiffOp, Segment};
use caatuu_core::pinyin::tone_of;

use crate::ws::session::{Caller, Command, UiEvent};

pub const HELP: &str = "\
Commands:
  new [difficulty]     get a new challenge
  answer <text>        submit an answer
  hint                 ask for a hint
  next <current>       suggest the next character after what you typed
  translate <text>     translate text
  pinyin <text>        annotate text with pinyin
  grammar <text>       correct grammar
  ask <text>           ask the tutor agent
  reset                reset the tutor agent
  speak <audio-file>   transcribe a recording
  status               show connection status
  online | offline     simulate network changes
  connect              connect now
  help                 show this help
  quit                 exit";

/// What a typed line asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplAction {
    Send(Command),
    /// Load and transcribe an audio file before sending.
    Speak(PathBuf),
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`, type `help` for a list")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ReplAction>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = |name: &'static str| {
        if rest.is_empty() {
            Err(ParseError::MissingArgument(name))
        } else {
            Ok(rest.to_string())
        }
    };

    let action = match word.to_ascii_lowercase().as_str() {
        "new" => ReplAction::Send(Command::NewChallenge {
            difficulty: (!rest.is_empty()).then(|| rest.to_string()),
        }),
        "answer" => ReplAction::Send(Command::SubmitAnswer {
            answer: arg("answer")?,
        }),
        "hint" => ReplAction::Send(Command::Hint),
        "next" => ReplAction::Send(Command::NextChar {
            current: rest.to_string(),
        }),
        "translate" => ReplAction::Send(Command::Translate {
            text: arg("translate")?,
            caller: Caller::Assist,
        }),
        "pinyin" => ReplAction::Send(Command::Pinyin {
            text: arg("pinyin")?,
            caller: Caller::Assist,
        }),
        "grammar" => ReplAction::Send(Command::Grammar {
            text: arg("grammar")?,
            caller: Caller::Assist,
        }),
        "ask" => ReplAction::Send(Command::AgentMessage { text: arg("ask")? }),
        "reset" => ReplAction::Send(Command::AgentReset),
        "speak" => ReplAction::Speak(PathBuf::from(arg("speak")?)),
        "status" => ReplAction::Send(Command::Status),
        "online" => ReplAction::Send(Command::Network { online: true }),
        "offline" => ReplAction::Send(Command::Network { online: false }),
        "connect" => ReplAction::Send(Command::Connect),
        "help" | "?" => ReplAction::Help,
        "quit" | "exit" => ReplAction::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(action))
}

/// Characters annotated with their syllable and tone, e.g. `你(nǐ 3)`.
pub fn render_pinyin(text: &str, syllables: &[String]) -> String {
    text.chars()
        .zip(syllables.iter().map(String::as_str).chain(std::iter::repeat("")))
        .map(|(ch, syllable)| {
            if syllable.is_empty() {
                ch.to_string()
            } else {
                format!("{ch}({syllable} {})", tone_of(syllable))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The original text with removed runs marked `[-…-]`.
pub fn render_before(script: &[Segment]) -> String {
    render_side(script, DiffOp::Delete, "[-", "-]")
}

/// The corrected text with added runs marked `{+…+}`.
pub fn render_after(script: &[Segment]) -> String {
    render_side(script, DiffOp::Insert, "{+", "+}")
}

fn render_side(script: &[Segment], side: DiffOp, open: &str, close: &str) -> String {
    let mut out = String::new();
    for segment in script {
        match segment.op {
            DiffOp::Equal => out.push_str(&segment.text),
            op if op == side => {
                out.push_str(open);
                out.push_str(&segment.text);
                out.push_str(close);
            }
            _ => {}
        }
    }
    out
}

fn caller_label(caller: &Caller) -> String {
    match caller {
        Caller::Assist => "assist".to_string(),
        Caller::Agent => "agent".to_string(),
        Caller::Surface { kind, token } => format!("{kind}#{token}"),
    }
}

/// Renders one event for the terminal.
pub fn render(event: &UiEvent) -> String {
    match event {
        UiEvent::Challenge(challenge) => {
            let mut lines = vec![format!(
                "Challenge {} ({}, {:?})",
                challenge.id, challenge.difficulty, challenge.kind
            )];
            if challenge.is_alignment_seeded() {
                lines.push(format!("  {}", challenge.en));
                lines.push(format!("  {}", challenge.py));
            } else {
                lines.push(format!("  Seed: {}  ({})", challenge.seed_zh, challenge.seed_en));
                lines.push(format!("  Task: {}", challenge.challenge_zh));
                lines.push(format!("        {}", challenge.challenge_en));
            }
            if !challenge.instructions.is_empty() {
                lines.push(format!("  {}", challenge.instructions));
            }
            lines.join("\n")
        }
        UiEvent::AnswerResult {
            correct,
            score,
            expected,
            explanation,
        } => {
            let verdict = if *correct { "Correct" } else { "Not yet" };
            let mut out = format!("{verdict} (score {score:.0}). {explanation}");
            if !*correct && !expected.is_empty() {
                out.push_str(&format!("\n  Expected: {expected}"));
            }
            out
        }
        UiEvent::Hint(text) => format!("Hint: {text}"),
        UiEvent::Translation {
            caller,
            text,
            translation,
        } => format!("[{}] {text} → {translation}", caller_label(caller)),
        UiEvent::Pinyin {
            caller,
            text,
            syllables,
        } => format!("[{}] {}", caller_label(caller), render_pinyin(text, syllables)),
        UiEvent::Grammar {
            caller,
            corrected,
            script,
            text,
        } => {
            if text == corrected {
                format!("[{}] No corrections: {text}", caller_label(caller))
            } else {
                format!(
                    "[{}] before: {}\n{}  after: {}",
                    caller_label(caller),
                    render_before(script),
                    " ".repeat(caller_label(caller).chars().count() + 2),
                    render_after(script)
                )
            }
        }
        UiEvent::NextChar { ch, pinyin, reason } => {
            if ch.is_empty() {
                format!("No next character. {reason}")
            } else {
                format!("Next: {ch} ({pinyin}). {reason}")
            }
        }
        UiEvent::AgentReply(text) => format!("Tutor: {text}"),
        UiEvent::SpeechText(text) => format!("Heard: {text}"),
        UiEvent::Warning(text) => format!("Warning: {text}"),
        UiEvent::Error(text) => format!("Error: {text}"),
        UiEvent::Status {
            state,
            attempt,
            challenge_id,
            loading,
        } => {
            let mut out = format!("Connection: {state}");
            if *attempt > 0 {
                out.push_str(&format!(" (attempt {attempt})"));
            }
            out.push_str(&format!(
                "\nChallenge: {}",
                challenge_id.as_deref().unwrap_or("none")
            ));
            if !loading.is_empty() {
                out.push_str(&format!("\nWaiting for: {loading:?}"));
            }
            out
        }
    }
}
