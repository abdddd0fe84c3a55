//! Intent classification.

use crate::agent::client::{ChatClient, ChatMessage, CompletionOptions};
use crate::error::{AssistantError, Result};
use crate::intent::types::{Intent, IntentResult, Track};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Capabilities menu shown for help requests and unsupported questions.
pub const CAPABILITIES: &str = "\
Next Class Information - \"When is my next class?\" or \"What's coming up?\"
Topic Research - \"Research multimodal AI\" or \"Tell me about AI agents\"
Weekly Preparation Plan - \"Create my weekly plan\" or \"What should I prepare?\"
Assignment Tracking - \"Show my assignments\" or \"Track Tech track homework\"

Just ask naturally, by voice or text.";

/// Confidence assumed when the model omits one.
const DEFAULT_CONFIDENCE: f32 = 0.8;
/// Confidence given to an unknown intent label mapped to help.
const UNKNOWN_INTENT_CONFIDENCE: f32 = 0.5;

/// Maps free text to an intent.
///
/// Implementations never fail: any internal error yields
/// [`IntentResult::fallback`].
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str, default_track: Track) -> IntentResult;
}

/// Chat-completion classifier using JSON mode.
pub struct OpenAiClassifier {
    client: ChatClient,
    model: String,
}

impl OpenAiClassifier {
    pub fn new(client: ChatClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    async fn try_classify(&self, text: &str, default_track: Track) -> Result<IntentResult> {
        let messages = [
            ChatMessage::system(system_prompt(default_track)),
            ChatMessage::user(format!("User query: \"{}\"", text)),
        ];
        let options = CompletionOptions {
            model: Some(self.model.clone()),
            temperature: Some(0.1),
            max_tokens: Some(200),
            json: true,
        };
        let raw = self.client.complete(&messages, &options).await?;
        parse_classification(&raw)
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, text: &str, default_track: Track) -> IntentResult {
        match self.try_classify(text, default_track).await {
            Ok(result) => {
                tracing::debug!(
                    "classified as {} ({:.2})",
                    result.intent.label(),
                    result.confidence
                );
                result
            }
            Err(e) => {
                tracing::warn!("intent classification failed, falling back to help: {}", e);
                IntentResult::fallback()
            }
        }
    }
}

fn system_prompt(default_track: Track) -> String {
    let intents: String = Intent::ALL
        .iter()
        .map(|i| format!("- {}: {}\n", i.label(), i.description()))
        .collect();
    format!(
        "You are an intent classifier for a course assistant.

Available intents:
{intents}
Analyze the user query and return JSON:
{{
    \"intent\": \"intent_name\",
    \"params\": {{\"topic\": \"...\", \"track\": \"Tech|Analyst\"}},
    \"confidence\": 0.95,
    \"needs_clarification\": false,
    \"clarification_question\": \"\"
}}

Rules:
1. If topic_research but no topic mentioned: needs_clarification=true, ask for topic
2. For assignments: default to \"{default_track}\" track if not specified
3. Confidence should reflect how certain you are about the intent
4. Be liberal with help intent - if user asks \"what can you do\", it's help
"
    )
}

/// Parse the model's JSON reply.
///
/// An unknown intent label becomes help at 0.5 confidence; missing fields
/// take defaults. Only non-blank string params are kept.
pub fn parse_classification(raw: &str) -> Result<IntentResult> {
    let value: Value = serde_json::from_str(raw).map_err(|e| AssistantError::Classification {
        message: format!("invalid JSON from classifier: {}", e),
    })?;
    let object = value
        .as_object()
        .ok_or_else(|| AssistantError::Classification {
            message: "classifier reply is not a JSON object".to_string(),
        })?;

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c as f32)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let mut result = match object
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::from_label)
    {
        Some(intent) => IntentResult::new(intent, confidence),
        None => IntentResult::new(Intent::Help, UNKNOWN_INTENT_CONFIDENCE),
    };

    if let Some(params) = object.get("params").and_then(Value::as_object) {
        result.params = params
            .iter()
            .filter_map(|(k, v)| {
                let v = v.as_str()?.trim();
                (!v.is_empty()).then(|| (k.clone(), v.to_string()))
            })
            .collect::<BTreeMap<_, _>>();
    }

    result.needs_clarification = object
        .get("needs_clarification")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    result.clarification_question = object
        .get("clarification_question")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    Ok(result)
}

/// Mock classifier for testing.
///
/// Returns the result registered for the exact input text, or the default.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    default: IntentResult,
    by_text: HashMap<String, IntentResult>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl MockClassifier {
    pub fn new(default: IntentResult) -> Self {
        Self {
            default,
            by_text: HashMap::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, text: &str, result: IntentResult) -> Self {
        self.by_text.insert(text.to_string(), result);
        self
    }

    /// Inputs classified so far, shared between clones.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new(IntentResult::fallback())
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, text: &str, _default_track: Track) -> IntentResult {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(text.to_string());
        }
        self.by_text
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::client::ChatClientConfig;
    use std::time::Duration;

    #[test]
    fn parses_full_reply() {
        let raw = r#"{
            "intent": "topic_research",
            "params": {"topic": "multimodal AI"},
            "confidence": 0.92,
            "needs_clarification": false,
            "clarification_question": ""
        }"#;
        let result = parse_classification(raw).unwrap();
        assert_eq!(result.intent, Intent::TopicResearch);
        assert_eq!(result.param("topic"), Some("multimodal AI"));
        assert!((result.confidence - 0.92).abs() < 1e-6);
    }

    #[test]
    fn unknown_intent_becomes_help_at_half_confidence() {
        let result = parse_classification(r#"{"intent": "weather", "confidence": 0.99}"#).unwrap();
        assert_eq!(result.intent, Intent::Help);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let result = parse_classification(r#"{"intent": "weekly_plan"}"#).unwrap();
        assert_eq!(result.intent, Intent::WeeklyPlan);
        assert_eq!(result.confidence, 0.8);
        assert!(result.params.is_empty());
        assert!(!result.needs_clarification);
    }

    #[test]
    fn non_string_and_blank_params_are_dropped() {
        let result = parse_classification(
            r#"{"intent": "assignments", "params": {"track": null, "topic": " ", "n": 3}}"#,
        )
        .unwrap();
        assert!(result.params.is_empty());
    }

    #[test]
    fn clarification_is_carried() {
        let result = parse_classification(
            r#"{"intent": "topic_research", "needs_clarification": true,
                "clarification_question": "Which topic?"}"#,
        )
        .unwrap();
        assert!(result.needs_clarification);
        assert_eq!(result.clarification_question, "Which topic?");
    }

    #[test]
    fn invalid_json_is_classification_error() {
        assert!(matches!(
            parse_classification("not json"),
            Err(AssistantError::Classification { .. })
        ));
        assert!(matches!(
            parse_classification("[1, 2]"),
            Err(AssistantError::Classification { .. })
        ));
    }

    #[test]
    fn system_prompt_lists_every_intent_and_track() {
        let prompt = system_prompt(Track::Analyst);
        for intent in Intent::ALL {
            assert!(prompt.contains(intent.label()));
        }
        assert!(prompt.contains("default to \"Analyst\""));
    }

    #[tokio::test]
    async fn network_failure_falls_back_to_help() {
        let client = ChatClient::new(ChatClientConfig {
            api_base: "http://127.0.0.1:9/v1".to_string(),
            api_key: "k".to_string(),
            timeout: Duration::from_secs(2),
            ..ChatClientConfig::default()
        })
        .unwrap();
        let classifier = OpenAiClassifier::new(client, "gpt-4o-mini");

        let result = classifier.classify("what's next", Track::Tech).await;

        assert_eq!(result, IntentResult::fallback());
    }

    #[tokio::test]
    async fn mock_returns_registered_result() {
        let classifier = MockClassifier::default().with_response(
            "what's my next class",
            IntentResult::new(Intent::NextClass, 0.9),
        );

        let hit = classifier
            .classify("what's my next class", Track::Tech)
            .await;
        let miss = classifier.classify("hmm", Track::Tech).await;

        assert_eq!(hit.intent, Intent::NextClass);
        assert_eq!(miss, IntentResult::fallback());
        assert_eq!(classifier.seen(), vec!["what's my next class", "hmm"]);
    }
}
