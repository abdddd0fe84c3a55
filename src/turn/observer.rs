//! Notifications from the engine to whatever renders the conversation.

use crate::intent::router::HelpKind;
use crate::intent::types::IntentResult;
use crate::turn::metrics::TurnMetricsState;
use crate::turn::state::TurnState;
use std::sync::{Arc, Mutex};

/// Receives engine events. Every method defaults to doing nothing.
pub trait TurnObserver: Send + Sync {
    fn on_state_change(&self, _state: TurnState) {}

    fn on_transcription(&self, _text: &str) {}

    fn on_intent(&self, _classification: &IntentResult) {}

    fn on_response(&self, _text: &str) {}

    fn on_clarification(&self, _question: &str) {}

    fn on_capabilities(&self, _kind: HelpKind) {}

    fn on_error(&self, _message: &str) {}

    fn on_metrics_snapshot(&self, _metrics: &TurnMetricsState) {}
}

/// Observer that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl TurnObserver for LogObserver {
    fn on_state_change(&self, state: TurnState) {
        tracing::debug!("state -> {}", state);
    }

    fn on_error(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// One recorded engine event.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    State(TurnState),
    Transcription(String),
    Intent(IntentResult),
    Response(String),
    Clarification(String),
    Capabilities(HelpKind),
    Error(String),
    Metrics(TurnMetricsState),
}

/// Observer that records every event, for tests.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<TurnEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: TurnEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<TurnEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// State changes in order.
    pub fn states(&self) -> Vec<TurnState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn responses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::Response(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

impl TurnObserver for EventLog {
    fn on_state_change(&self, state: TurnState) {
        self.push(TurnEvent::State(state));
    }

    fn on_transcription(&self, text: &str) {
        self.push(TurnEvent::Transcription(text.to_string()));
    }

    fn on_intent(&self, classification: &IntentResult) {
        self.push(TurnEvent::Intent(classification.clone()));
    }

    fn on_response(&self, text: &str) {
        self.push(TurnEvent::Response(text.to_string()));
    }

    fn on_clarification(&self, question: &str) {
        self.push(TurnEvent::Clarification(question.to_string()));
    }

    fn on_capabilities(&self, kind: HelpKind) {
        self.push(TurnEvent::Capabilities(kind));
    }

    fn on_error(&self, message: &str) {
        self.push(TurnEvent::Error(message.to_string()));
    }

    fn on_metrics_snapshot(&self, metrics: &TurnMetricsState) {
        self.push(TurnEvent::Metrics(*metrics));
    }
}
