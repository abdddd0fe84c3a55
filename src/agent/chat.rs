//! Course tasks answered by a chat model grounded on local files.

use crate::agent::client::{ChatClient, ChatMessage, CompletionOptions};
use crate::agent::executor::TaskExecutor;
use crate::error::{AssistantError, Result};
use crate::intent::types::{Intent, TOPIC_PARAM, TRACK_PARAM, Track};
use crate::turn::state::TurnContext;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SYSTEM_PROMPT: &str = "You are a course assistant. Answer in a few short, \
spoken-style sentences with no markdown, since the answer may be read aloud. \
Only use facts from the schedule and preferences provided; say so when \
something is not in them.";

/// Topic used if a research task somehow arrives without one.
const FALLBACK_TOPIC: &str = "AI Agents";

#[derive(Debug, Clone)]
pub struct ChatTaskConfig {
    pub schedule_path: PathBuf,
    pub preferences_path: PathBuf,
}

/// Executes every intent through one chat client, one prompt per intent.
pub struct ChatTaskExecutor {
    client: ChatClient,
    config: ChatTaskConfig,
}

impl ChatTaskExecutor {
    pub fn new(client: ChatClient, config: ChatTaskConfig) -> Self {
        Self { client, config }
    }

    async fn grounding(&self) -> String {
        let schedule = read_or_note(&self.config.schedule_path).await;
        let preferences = read_or_note(&self.config.preferences_path).await;
        format!(
            "Course schedule (CSV):\n{}\n\nUser preferences:\n{}",
            schedule, preferences
        )
    }
}

async fn read_or_note(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("cannot read {}: {}", path.display(), e);
            "(not available)".to_string()
        }
    }
}

/// Task instructions for one intent.
pub fn task_instructions(
    intent: Intent,
    params: &BTreeMap<String, String>,
    context: &TurnContext,
) -> String {
    let date = context.formatted_date();
    match intent {
        Intent::NextClass | Intent::Help => format!(
            "Today is {date}. Find the next class on or after today in the schedule. \
             Give its date, time, topic and anything to prepare."
        ),
        Intent::TopicResearch => {
            let topic = params
                .get(TOPIC_PARAM)
                .map(String::as_str)
                .unwrap_or(FALLBACK_TOPIC);
            format!(
                "Today is {date}. Research the topic \"{topic}\". Explain it briefly, \
                 relate it to upcoming classes in the schedule, and suggest one or two \
                 things to read."
            )
        }
        Intent::WeeklyPlan => format!(
            "Today is {date}. Build a preparation plan for the next seven days from the \
             schedule, fitted to the user's preferences."
        ),
        Intent::Assignments => {
            let track = params
                .get(TRACK_PARAM)
                .map(|t| Track::coerce(t))
                .unwrap_or_default();
            format!(
                "Today is {date}. List the upcoming assignments for the {track} track with \
                 their due dates, soonest first."
            )
        }
    }
}

#[async_trait]
impl TaskExecutor for ChatTaskExecutor {
    async fn execute(
        &self,
        intent: Intent,
        params: &BTreeMap<String, String>,
        context: &TurnContext,
    ) -> Result<String> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "{}\n\n{}\n\nUser question: \"{}\"",
                self.grounding().await,
                task_instructions(intent, params, context),
                context.user_question
            )),
        ];

        tracing::debug!("running {} task", intent.label());
        let answer = self
            .client
            .complete(&messages, &CompletionOptions::default())
            .await
            .map_err(|e| AssistantError::TaskExecution {
                message: e.to_string(),
            })?;

        if answer.is_empty() {
            return Err(AssistantError::TaskExecution {
                message: "the agent returned an empty answer".to_string(),
            });
        }
        Ok(answer)
    }
}
