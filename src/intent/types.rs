//! Classified intents and their parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter name carrying the research topic.
pub const TOPIC_PARAM: &str = "topic";
/// Parameter name carrying the cohort track.
pub const TRACK_PARAM: &str = "track";

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    NextClass,
    TopicResearch,
    WeeklyPlan,
    Assignments,
    Help,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::NextClass,
        Intent::TopicResearch,
        Intent::WeeklyPlan,
        Intent::Assignments,
        Intent::Help,
    ];

    /// Wire label used by the classifier.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::NextClass => "next_class",
            Intent::TopicResearch => "topic_research",
            Intent::WeeklyPlan => "weekly_plan",
            Intent::Assignments => "assignments",
            Intent::Help => "help",
        }
    }

    pub fn from_label(label: &str) -> Option<Intent> {
        let label = label.trim();
        Intent::ALL
            .into_iter()
            .find(|intent| intent.label().eq_ignore_ascii_case(label))
    }

    /// One-line description given to the classifier.
    pub fn description(&self) -> &'static str {
        match self {
            Intent::NextClass => "User wants info about next upcoming class",
            Intent::TopicResearch => "User wants to research a topic (requires: topic name)",
            Intent::WeeklyPlan => "User wants a weekly preparation plan",
            Intent::Assignments => {
                "User wants to track assignments (optional: Tech/Analyst track)"
            }
            Intent::Help => "User wants to see what the assistant can do",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::NextClass => "Next Class",
            Intent::TopicResearch => "Topic Research",
            Intent::WeeklyPlan => "Weekly Plan",
            Intent::Assignments => "Assignments",
            Intent::Help => "Help",
        };
        f.write_str(name)
    }
}

/// Cohort track for the assignments task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Track {
    #[default]
    Tech,
    Analyst,
}

impl Track {
    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Tech => "Tech",
            Track::Analyst => "Analyst",
        }
    }

    /// Case-insensitive match on a known track name.
    pub fn from_name(name: &str) -> Option<Track> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tech" => Some(Track::Tech),
            "analyst" => Some(Track::Analyst),
            _ => None,
        }
    }

    /// Known track names map to themselves; anything else becomes `Tech`.
    pub fn coerce(name: &str) -> Track {
        Track::from_name(name).unwrap_or(Track::Tech)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub confidence: f32,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarification_question: String,
}

impl IntentResult {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self {
            intent,
            params: BTreeMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
            needs_clarification: false,
            clarification_question: String::new(),
        }
    }

    /// Result used whenever classification itself fails.
    pub fn fallback() -> Self {
        Self::new(Intent::Help, 0.0)
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_clarification(mut self, question: &str) -> Self {
        self.needs_clarification = true;
        self.clarification_question = question.to_string();
        self
    }

    /// Parameter value, ignoring blank values.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// The parameter worth showing next to the detected intent.
    pub fn key_param(&self) -> Option<&str> {
        match self.intent {
            Intent::TopicResearch => self.param(TOPIC_PARAM),
            Intent::Assignments => self.param(TRACK_PARAM),
            _ => None,
        }
    }
}
