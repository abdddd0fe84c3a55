//! Turns a classification into something the engine can act on.
//!
//! Routing does no I/O: it only decides. The engine executes the decision.

use crate::defaults;
use crate::intent::types::{Intent, IntentResult, TOPIC_PARAM, TRACK_PARAM, Track};
use crate::turn::state::TurnContext;
use std::collections::BTreeMap;

/// Question asked when a research request names no topic.
pub const TOPIC_QUESTION: &str = "What topic would you like to research?";

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Run the task for `intent` with these parameters.
    Dispatch {
        intent: Intent,
        params: BTreeMap<String, String>,
    },
    /// Ask the user something before anything can run.
    ///
    /// `missing_param` is set when the router generated the question for a
    /// required parameter; the caller may collect it and resolve again.
    NeedsClarification {
        question: String,
        missing_param: Option<String>,
    },
    /// Nothing to run; the caller shows the capabilities menu.
    NoAction,
}

/// Which capabilities message accompanies a [`RoutingDecision::NoAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpKind {
    /// The user literally asked for help.
    Explicit,
    /// The request was not something the assistant can do.
    Unsupported,
}

impl HelpKind {
    pub fn for_input(raw_input: &str) -> HelpKind {
        let normalized = raw_input.trim().to_lowercase();
        if defaults::HELP_WORDS.contains(&normalized.as_str()) {
            HelpKind::Explicit
        } else {
            HelpKind::Unsupported
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            HelpKind::Explicit => "Here's what I can help you with:",
            HelpKind::Unsupported => {
                "I can't help you with that currently. See below for what I can help you with:"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    pub default_track: Track,
    /// Non-help classifications below this go to the next-class task.
    pub min_confidence: f32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_track: Track::coerce(defaults::DEFAULT_TRACK),
            min_confidence: defaults::MIN_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntentRouter {
    config: RouterConfig,
}

impl IntentRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn default_track(&self) -> Track {
        self.config.default_track
    }

    /// Decide what to do with a classification.
    ///
    /// Checked in order: help, classifier clarification, missing topic,
    /// low confidence, then parameter resolution for the chosen task.
    pub fn resolve(&self, classification: &IntentResult, context: &TurnContext) -> RoutingDecision {
        if classification.intent == Intent::Help {
            return RoutingDecision::NoAction;
        }

        if classification.needs_clarification
            && !classification.clarification_question.trim().is_empty()
        {
            return RoutingDecision::NeedsClarification {
                question: classification.clarification_question.clone(),
                missing_param: None,
            };
        }

        if classification.intent == Intent::TopicResearch
            && classification.param(TOPIC_PARAM).is_none()
        {
            return RoutingDecision::NeedsClarification {
                question: TOPIC_QUESTION.to_string(),
                missing_param: Some(TOPIC_PARAM.to_string()),
            };
        }

        let intent = if classification.confidence < self.config.min_confidence {
            tracing::debug!(
                "low confidence {:.2} for {} ({:?} input), using next_class",
                classification.confidence,
                classification.intent.label(),
                context.mode
            );
            Intent::NextClass
        } else {
            classification.intent
        };

        RoutingDecision::Dispatch {
            intent,
            params: self.resolve_params(intent, classification),
        }
    }

    fn resolve_params(
        &self,
        intent: Intent,
        classification: &IntentResult,
    ) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        match intent {
            Intent::TopicResearch => {
                if let Some(topic) = classification.param(TOPIC_PARAM) {
                    params.insert(TOPIC_PARAM.to_string(), topic.to_string());
                }
            }
            Intent::Assignments => {
                let track = classification
                    .param(TRACK_PARAM)
                    .map(Track::coerce)
                    .unwrap_or(self.config.default_track);
                params.insert(TRACK_PARAM.to_string(), track.to_string());
            }
            Intent::NextClass | Intent::WeeklyPlan | Intent::Help => {}
        }
        params
    }
}
