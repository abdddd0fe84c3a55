//! Terminal rendering of the conversation.
//!
//! Conversation text goes to stdout; diagnostics stay in the tracing log on
//! stderr.

use crate::intent::classifier::CAPABILITIES;
use crate::intent::router::HelpKind;
use crate::intent::types::IntentResult;
use crate::turn::metrics::TurnMetricsState;
use crate::turn::observer::TurnObserver;
use crate::turn::state::TurnState;
use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::sync::Mutex;

const RULE_WIDTH: usize = 60;
const LEVEL_BAR_WIDTH: usize = 30;

/// Render an RMS level (0.0 to 1.0) as a fixed-width bar.
pub fn format_level_bar(level: f32) -> String {
    let filled = ((level.clamp(0.0, 1.0) * LEVEL_BAR_WIDTH as f32).round() as usize)
        .min(LEVEL_BAR_WIDTH);
    format!(
        "[{}{}] {:.3}",
        "#".repeat(filled),
        " ".repeat(LEVEL_BAR_WIDTH - filled),
        level
    )
}

/// One-line hint shown when the engine enters `state`, if any.
pub fn state_hint(state: TurnState, trigger: &str, quit: &str) -> Option<String> {
    match state {
        TurnState::Recording => Some(format!(
            "Hold {} to talk, release to send. {} cancels.",
            trigger, quit
        )),
        TurnState::Processing => Some("Transcribing...".to_string()),
        TurnState::Thinking => Some("Thinking...".to_string()),
        TurnState::Speaking => Some("Speaking...".to_string()),
        TurnState::Idle | TurnState::Error | TurnState::Exit => None,
    }
}

fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

/// [`TurnObserver`] that draws the conversation with colors.
pub struct TerminalView<W = io::Stdout> {
    out: Mutex<W>,
    color: bool,
    trigger: String,
    quit: String,
}

impl TerminalView {
    pub fn stdout(color: bool, trigger: &str, quit: &str) -> Self {
        Self::new(io::stdout(), color, trigger, quit)
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W, color: bool, trigger: &str, quit: &str) -> Self {
        Self {
            out: Mutex::new(out),
            color,
            trigger: trigger.to_string(),
            quit: quit.to_string(),
        }
    }

    fn write(&self, text: &str) {
        let Ok(mut out) = self.out.lock() else { return };
        if writeln!(out, "{}", text).and_then(|()| out.flush()).is_err() {
            tracing::debug!("terminal output closed");
        }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if !self.color {
            return text.to_string();
        }
        match style {
            Style::Title => text.bold().cyan().to_string(),
            Style::Dim => text.dimmed().to_string(),
            Style::Good => text.green().to_string(),
            Style::Warn => text.yellow().to_string(),
            Style::Bad => text.red().bold().to_string(),
        }
    }

    pub fn banner(&self, version: &str) {
        self.write(&self.paint(&rule(), Style::Dim));
        self.write(&self.paint(
            &format!("Course Assistant {}", version),
            Style::Title,
        ));
        self.write("Ask about your classes, research topics, weekly plans and assignments.");
        self.write(&self.paint(
            &format!("Voice: hold {} while speaking. Text: type your question.", self.trigger),
            Style::Dim,
        ));
        self.write(&self.paint(&rule(), Style::Dim));
    }

    pub fn capabilities(&self, kind: HelpKind) {
        self.write("");
        self.write(&self.paint(kind.message(), Style::Warn));
        for line in CAPABILITIES.lines() {
            self.write(&format!("  {}", line));
        }
    }

    pub fn metrics(&self, metrics: &TurnMetricsState) {
        self.write("");
        self.write(&self.paint("Session stats", Style::Title));
        self.write(&format!("  Turns:        {}", metrics.total_turns));
        self.write(&format!("  Errors:       {}", metrics.errors));
        if metrics.total_turns > 0 {
            self.write(&format!("  Avg STT:      {:.2}s", metrics.avg_stt_time));
            self.write(&format!("  Avg agent:    {:.2}s", metrics.avg_agent_time));
            self.write(&format!("  Avg TTS:      {:.2}s", metrics.avg_tts_time));
            self.write(&format!("  Avg total:    {:.2}s", metrics.avg_total_time));
        }
    }

    pub fn goodbye(&self) {
        self.write("");
        self.write(&self.paint("Goodbye!", Style::Good));
    }

    #[cfg(test)]
    fn into_inner(self) -> Option<W> {
        self.out.into_inner().ok()
    }
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Title,
    Dim,
    Good,
    Warn,
    Bad,
}

impl<W: Write + Send> TurnObserver for TerminalView<W> {
    fn on_state_change(&self, state: TurnState) {
        tracing::debug!("state -> {}", state);
        if let Some(hint) = state_hint(state, &self.trigger, &self.quit) {
            self.write(&self.paint(&hint, Style::Dim));
        }
    }

    fn on_transcription(&self, text: &str) {
        self.write(&format!("{} {}", self.paint("You said:", Style::Dim), text));
    }

    fn on_intent(&self, classification: &IntentResult) {
        let detail = match classification.key_param() {
            Some(value) => format!(
                "Intent: {} ({}) {:.0}%",
                classification.intent,
                value,
                classification.confidence * 100.0
            ),
            None => format!(
                "Intent: {} {:.0}%",
                classification.intent,
                classification.confidence * 100.0
            ),
        };
        self.write(&self.paint(&detail, Style::Dim));
    }

    fn on_response(&self, text: &str) {
        self.write("");
        self.write(&self.paint("Assistant", Style::Title));
        self.write(&self.paint(&rule(), Style::Dim));
        self.write(text.trim());
        self.write(&self.paint(&rule(), Style::Dim));
    }

    fn on_clarification(&self, question: &str) {
        self.write(&self.paint(question, Style::Warn));
    }

    fn on_capabilities(&self, kind: HelpKind) {
        self.capabilities(kind);
    }

    fn on_error(&self, message: &str) {
        self.write(&self.paint(&format!("Error: {}", message), Style::Bad));
    }

    fn on_metrics_snapshot(&self, metrics: &TurnMetricsState) {
        self.metrics(metrics);
        self.goodbye();
    }
}
