use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::fmt;

/// Engine state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnState {
    Idle,
    Recording,
    Processing,
    Thinking,
    Speaking,
    Error,
    Exit,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Recording => "recording",
            TurnState::Processing => "processing",
            TurnState::Thinking => "thinking",
            TurnState::Speaking => "speaking",
            TurnState::Error => "error",
            TurnState::Exit => "exit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputMode {
    Voice,
    Text,
}

/// What the user picked at the mode prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSelection {
    Voice,
    Text,
    Exit,
}

/// Date format handed to the agent tasks.
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Per-turn facts shared by routing and task execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnContext {
    /// Text exactly as typed or transcribed.
    pub raw_input: String,
    pub mode: InputMode,
    pub current_date: NaiveDate,
    /// The question passed to the agent.
    pub user_question: String,
}

impl TurnContext {
    pub fn new(raw_input: &str, mode: InputMode) -> Self {
        Self::on_date(raw_input, mode, Local::now().date_naive())
    }

    pub fn on_date(raw_input: &str, mode: InputMode, current_date: NaiveDate) -> Self {
        Self {
            raw_input: raw_input.to_string(),
            mode,
            current_date,
            user_question: raw_input.trim().to_string(),
        }
    }

    pub fn formatted_date(&self) -> String {
        self.current_date.format(DATE_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_trims_question_but_keeps_raw_input() {
        let context = TurnContext::new("  what's next?\n", InputMode::Voice);
        assert_eq!(context.raw_input, "  what's next?\n");
        assert_eq!(context.user_question, "what's next?");
    }

    #[test]
    fn date_uses_month_day_year() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let context = TurnContext::on_date("q", InputMode::Text, date);
        assert_eq!(context.formatted_date(), "03/07/2026");
    }

    #[test]
    fn state_names() {
        assert_eq!(TurnState::Thinking.to_string(), "thinking");
        assert_eq!(TurnState::Exit.to_string(), "exit");
    }
}
