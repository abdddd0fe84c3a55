//! The conversation loop.
//!
//! One turn at a time: choose a mode, capture or read the question,
//! transcribe, classify, route, execute, speak. Every stage failure ends the
//! turn in `Error` and the loop goes back to `Idle`; only exit, quit during
//! capture, an interrupt or a fatal device error leave the loop.

use crate::agent::executor::TaskExecutor;
use crate::audio::buffer::AudioBuffer;
use crate::audio::push_to_talk::{CaptureOutcome, PushToTalk};
use crate::defaults;
use crate::error::{AssistantError, Result};
use crate::intent::classifier::Classifier;
use crate::intent::router::{HelpKind, IntentRouter, RoutingDecision};
use crate::stt::transcriber::Transcriber;
use crate::tts::speaker::Speaker;
use crate::turn::input::InputPrompt;
use crate::turn::metrics::{StageTimes, TurnMetrics, TurnMetricsState};
use crate::turn::observer::TurnObserver;
use crate::turn::state::{InputMode, ModeSelection, TurnContext, TurnState};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub const EMPTY_TEXT_MESSAGE: &str = "Empty input. Please try again.";
pub const EMPTY_AUDIO_MESSAGE: &str = "No audio recorded. Please try again.";
pub const EMPTY_TRANSCRIPT_MESSAGE: &str = "Could not understand speech. Please try again.";

/// Already-constructed stage implementations.
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub classifier: Arc<dyn Classifier>,
    pub executor: Arc<dyn TaskExecutor>,
    pub speaker: Arc<dyn Speaker>,
}

/// How a turn ended when no stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnEnd {
    /// All stages that apply ran; counts toward metrics.
    Completed,
    /// Nothing usable to work on; not counted.
    Aborted,
    /// The user asked to leave.
    Exit,
}

pub struct TurnEngine {
    capture: Arc<Mutex<PushToTalk>>,
    collaborators: Collaborators,
    router: IntentRouter,
    prompt: Arc<dyn InputPrompt>,
    observer: Arc<dyn TurnObserver>,
    cancel: CancellationToken,
    metrics: TurnMetrics,
    state: TurnState,
}

impl TurnEngine {
    pub fn new(
        capture: PushToTalk,
        collaborators: Collaborators,
        router: IntentRouter,
        prompt: Arc<dyn InputPrompt>,
        observer: Arc<dyn TurnObserver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            capture: Arc::new(Mutex::new(capture)),
            collaborators,
            router,
            prompt,
            observer,
            cancel,
            metrics: TurnMetrics::new(),
            state: TurnState::Idle,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn metrics(&self) -> TurnMetricsState {
        self.metrics.snapshot()
    }

    /// Run turns until the user exits.
    ///
    /// Returns the final metrics. A cancelled token ends the loop cleanly;
    /// a fatal error is reported, then returned.
    pub async fn run(&mut self) -> Result<TurnMetricsState> {
        self.observer.on_state_change(TurnState::Idle);
        let outcome = self.run_turns().await;

        self.set_state(TurnState::Exit);
        let snapshot = self.metrics.snapshot();
        self.observer.on_metrics_snapshot(&snapshot);
        outcome.map(|()| snapshot)
    }

    async fn run_turns(&mut self) -> Result<()> {
        loop {
            let prompt = Arc::clone(&self.prompt);
            let selection = match self
                .interruptible(blocking(move || prompt.choose_mode()))
                .await
            {
                Ok(selection) => selection,
                Err(AssistantError::Interrupted) => return Ok(()),
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            };

            let started = Instant::now();
            let mut times = StageTimes::default();
            let result = match selection {
                ModeSelection::Exit => return Ok(()),
                ModeSelection::Voice => self.voice_turn(&mut times).await,
                ModeSelection::Text => self.text_turn(&mut times).await,
            };
            times.total = started.elapsed();

            match result {
                Ok(TurnEnd::Completed) => {
                    self.metrics.record(&times);
                    tracing::debug!("turn completed: {:?}", times);
                    self.set_state(TurnState::Idle);
                }
                Ok(TurnEnd::Aborted) => self.set_state(TurnState::Idle),
                Ok(TurnEnd::Exit) => return Ok(()),
                Err(AssistantError::Interrupted) => return Ok(()),
                Err(e) => {
                    self.metrics.record(&times);
                    self.metrics.record_error();
                    self.fail(&e);
                    if e.is_fatal() {
                        tracing::error!("ending conversation: {}", e);
                        return Err(e);
                    }
                    self.set_state(TurnState::Idle);
                }
            }
        }
    }

    async fn voice_turn(&mut self, times: &mut StageTimes) -> Result<TurnEnd> {
        self.set_state(TurnState::Recording);
        let audio = match self.capture().await? {
            CaptureOutcome::Cancelled => return Ok(TurnEnd::Exit),
            CaptureOutcome::Audio(audio) => audio,
        };
        if audio.is_empty() {
            self.observer.on_error(EMPTY_AUDIO_MESSAGE);
            return Ok(TurnEnd::Aborted);
        }
        tracing::debug!(
            "captured {:.2}s, rms {:.3}",
            audio.duration().as_secs_f32(),
            audio.rms()
        );

        self.set_state(TurnState::Processing);
        let stt_started = Instant::now();
        let text = self.transcribe(audio).await;
        times.stt = stt_started.elapsed();
        let text = text?;
        if text.trim().is_empty() {
            self.observer.on_error(EMPTY_TRANSCRIPT_MESSAGE);
            return Ok(TurnEnd::Aborted);
        }
        self.observer.on_transcription(&text);

        let Some(response) = self.think(&text, InputMode::Voice, times).await? else {
            return Ok(TurnEnd::Completed);
        };
        if !response.trim().is_empty() {
            self.set_state(TurnState::Speaking);
            let speaker = Arc::clone(&self.collaborators.speaker);
            let tts_started = Instant::now();
            let spoken = self.interruptible(speaker.speak(&response)).await;
            times.tts = tts_started.elapsed();
            spoken?;
        }
        Ok(TurnEnd::Completed)
    }

    async fn text_turn(&mut self, times: &mut StageTimes) -> Result<TurnEnd> {
        let prompt = Arc::clone(&self.prompt);
        let Some(text) = self
            .interruptible(blocking(move || prompt.read_text()))
            .await?
        else {
            return Ok(TurnEnd::Exit);
        };
        if text.trim() == defaults::EXIT_COMMAND {
            return Ok(TurnEnd::Exit);
        }
        if text.trim().is_empty() {
            self.observer.on_error(EMPTY_TEXT_MESSAGE);
            return Ok(TurnEnd::Aborted);
        }

        self.think(&text, InputMode::Text, times).await?;
        Ok(TurnEnd::Completed)
    }

    /// Classify, route and execute. Returns the answer when a task ran.
    async fn think(
        &mut self,
        text: &str,
        mode: InputMode,
        times: &mut StageTimes,
    ) -> Result<Option<String>> {
        self.set_state(TurnState::Thinking);
        let context = TurnContext::new(text, mode);

        let classifier = Arc::clone(&self.collaborators.classifier);
        let default_track = self.router.default_track();
        let classification = self
            .interruptible(async {
                Ok(classifier
                    .classify(&context.user_question, default_track)
                    .await)
            })
            .await?;
        self.observer.on_intent(&classification);

        let mut decision = self.router.resolve(&classification, &context);
        let missing = match &decision {
            RoutingDecision::NeedsClarification {
                question,
                missing_param: Some(name),
            } => Some((name.clone(), question.clone())),
            _ => None,
        };
        if let Some((name, question)) = missing {
            let prompt = Arc::clone(&self.prompt);
            let asked = name.clone();
            let answer = self
                .interruptible(blocking(move || prompt.ask_for_parameter(&asked, &question)))
                .await?;
            let Some(value) = answer else {
                tracing::debug!("no value given for {}", name);
                return Ok(None);
            };
            let augmented = classification.clone().with_param(&name, &value);
            decision = self.router.resolve(&augmented, &context);
        }

        match decision {
            RoutingDecision::NoAction => {
                self.observer
                    .on_capabilities(HelpKind::for_input(&context.raw_input));
                Ok(None)
            }
            RoutingDecision::NeedsClarification { question, .. } => {
                self.observer.on_clarification(&question);
                Ok(None)
            }
            RoutingDecision::Dispatch { intent, params } => {
                let executor = Arc::clone(&self.collaborators.executor);
                let agent_started = Instant::now();
                let result = self
                    .interruptible(executor.execute(intent, &params, &context))
                    .await;
                times.agent = agent_started.elapsed();
                let response = result?;
                self.observer.on_response(&response);
                Ok(Some(response))
            }
        }
    }

    /// Runs the capture on a blocking thread. Not raced against the token:
    /// the capture watches it and releases the device before returning.
    async fn capture(&self) -> Result<CaptureOutcome> {
        let capture = Arc::clone(&self.capture);
        let cancel = self.cancel.clone();
        blocking(move || {
            let mut capture = capture.lock().map_err(|e| AssistantError::AudioCapture {
                message: format!("capture lock poisoned: {}", e),
            })?;
            capture.capture(&cancel)
        })
        .await
    }

    async fn transcribe(&self, audio: AudioBuffer) -> Result<String> {
        let transcriber = Arc::clone(&self.collaborators.transcriber);
        self.interruptible(blocking(move || transcriber.transcribe(&audio)))
            .await
    }

    async fn interruptible<T>(&self, stage: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AssistantError::Interrupted),
            result = stage => result,
        }
    }

    fn set_state(&mut self, state: TurnState) {
        if self.state != state {
            self.state = state;
            self.observer.on_state_change(state);
        }
    }

    fn fail(&mut self, error: &AssistantError) {
        self.set_state(TurnState::Error);
        self.observer.on_error(&error.to_string());
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AssistantError::Other(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::executor::MockTaskExecutor;
    use crate::audio::keys::{Key, ScriptedKeySource};
    use crate::audio::push_to_talk::CaptureSettings;
    use crate::audio::recorder::MockAudioSource;
    use crate::intent::classifier::MockClassifier;
    use crate::intent::types::{Intent, IntentResult};
    use crate::stt::transcriber::MockTranscriber;
    use crate::tts::speaker::MockSpeaker;
    use crate::turn::input::ScriptedPrompt;
    use crate::turn::observer::{EventLog, TurnEvent};
    use std::time::Duration;

    struct Harness {
        transcriber: MockTranscriber,
        classifier: MockClassifier,
        executor: MockTaskExecutor,
        speaker: MockSpeaker,
        keys: ScriptedKeySource,
        log: EventLog,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                transcriber: MockTranscriber::new("mock").with_response("what's my next class"),
                classifier: MockClassifier::new(IntentResult::new(Intent::NextClass, 0.9)),
                executor: MockTaskExecutor::new().with_response("Monday at 10."),
                speaker: MockSpeaker::new(),
                keys: ScriptedKeySource::new()
                    .press(Duration::from_millis(5), Key::ControlRight)
                    .release(Duration::from_millis(60), Key::ControlRight),
                log: EventLog::new(),
            }
        }

        fn engine(&self, prompt: ScriptedPrompt) -> TurnEngine {
            self.engine_with(prompt, CancellationToken::new())
        }

        fn engine_with(&self, prompt: ScriptedPrompt, cancel: CancellationToken) -> TurnEngine {
            let capture = PushToTalk::new(
                Box::new(MockAudioSource::new()),
                Arc::new(self.keys.clone()),
                CaptureSettings::default(),
            );
            TurnEngine::new(
                capture,
                Collaborators {
                    transcriber: Arc::new(self.transcriber.clone()),
                    classifier: Arc::new(self.classifier.clone()),
                    executor: Arc::new(self.executor.clone()),
                    speaker: Arc::new(self.speaker.clone()),
                },
                IntentRouter::default(),
                Arc::new(prompt),
                Arc::new(self.log.clone()),
                cancel,
            )
        }
    }

    #[tokio::test]
    async fn exit_selection_ends_immediately() {
        let harness = Harness::new();
        let mut engine = harness.engine(ScriptedPrompt::new().with_mode(ModeSelection::Exit));

        let metrics = engine.run().await.unwrap();

        assert_eq!(metrics.total_turns, 0);
        assert_eq!(harness.log.states(), vec![TurnState::Idle, TurnState::Exit]);
        assert_eq!(engine.state(), TurnState::Exit);
    }

    #[tokio::test]
    async fn text_turn_speaks_nothing() {
        let harness = Harness::new();
        let mut engine = harness.engine(ScriptedPrompt::new().with_text_turn("next class?"));

        let metrics = engine.run().await.unwrap();

        assert_eq!(metrics.total_turns, 1);
        assert_eq!(metrics.avg_stt_time, 0.0);
        assert_eq!(metrics.avg_tts_time, 0.0);
        assert_eq!(harness.log.responses(), vec!["Monday at 10."]);
        assert!(harness.speaker.spoken().is_empty());
        assert_eq!(harness.transcriber.calls(), 0);
    }

    #[tokio::test]
    async fn voice_turn_runs_every_stage() {
        let harness = Harness::new();
        let mut engine = harness.engine(ScriptedPrompt::new().with_voice_turn());

        let metrics = engine.run().await.unwrap();

        assert_eq!(
            harness.log.states(),
            vec![
                TurnState::Idle,
                TurnState::Recording,
                TurnState::Processing,
                TurnState::Thinking,
                TurnState::Speaking,
                TurnState::Idle,
                TurnState::Exit,
            ]
        );
        assert_eq!(harness.transcriber.calls(), 1);
        assert_eq!(harness.speaker.spoken(), vec!["Monday at 10."]);
        assert_eq!(metrics.total_turns, 1);
        assert!(
            harness
                .log
                .events()
                .contains(&TurnEvent::Transcription("what's my next class".to_string()))
        );
    }

    #[tokio::test]
    async fn empty_text_is_reported_but_not_counted() {
        let harness = Harness::new();
        let mut engine = harness.engine(ScriptedPrompt::new().with_text_turn("   "));

        let metrics = engine.run().await.unwrap();

        assert_eq!(harness.log.errors(), vec![EMPTY_TEXT_MESSAGE]);
        assert_eq!(metrics.total_turns, 0);
        assert_eq!(metrics.errors, 0);
        assert!(harness.classifier.seen().is_empty());
    }

    #[tokio::test]
    async fn exit_command_in_text_leaves() {
        let harness = Harness::new();
        let mut engine = harness.engine(
            ScriptedPrompt::new()
                .with_text_turn("/exit")
                .with_text_turn("never read"),
        );

        let metrics = engine.run().await.unwrap();

        assert_eq!(metrics.total_turns, 0);
        assert!(harness.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_transcript_aborts_the_turn() {
        let mut harness = Harness::new();
        harness.transcriber = MockTranscriber::new("mock").with_response("  ");
        let mut engine = harness.engine(ScriptedPrompt::new().with_voice_turn());

        let metrics = engine.run().await.unwrap();

        assert_eq!(harness.log.errors(), vec![EMPTY_TRANSCRIPT_MESSAGE]);
        assert_eq!(metrics.total_turns, 0);
        assert!(harness.classifier.seen().is_empty());
    }

    #[tokio::test]
    async fn executor_failure_is_counted_and_loop_continues() {
        let mut harness = Harness::new();
        harness.executor = MockTaskExecutor::new().with_failure();
        let mut engine = harness.engine(
            ScriptedPrompt::new()
                .with_text_turn("first")
                .with_text_turn("second"),
        );

        let metrics = engine.run().await.unwrap();

        assert_eq!(metrics.total_turns, 2);
        assert_eq!(metrics.errors, 2);
        let states = harness.log.states();
        assert_eq!(
            states
                .iter()
                .filter(|s| **s == TurnState::Error)
                .count(),
            2
        );
        assert_eq!(states.last(), Some(&TurnState::Exit));
    }

    #[tokio::test]
    async fn speech_failure_does_not_end_the_loop() {
        let mut harness = Harness::new();
        harness.speaker = MockSpeaker::new().with_failure();
        let mut engine = harness.engine(
            ScriptedPrompt::new()
                .with_voice_turn()
                .with_text_turn("again"),
        );

        let metrics = engine.run().await.unwrap();

        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.total_turns, 2);
        assert_eq!(harness.executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn help_shows_capabilities_by_request_kind() {
        let mut harness = Harness::new();
        harness.classifier = MockClassifier::new(IntentResult::new(Intent::Help, 0.9));
        let mut engine = harness.engine(
            ScriptedPrompt::new()
                .with_text_turn("help")
                .with_text_turn("order me a pizza"),
        );

        let metrics = engine.run().await.unwrap();

        let kinds: Vec<HelpKind> = harness
            .log
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::Capabilities(kind) => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![HelpKind::Explicit, HelpKind::Unsupported]);
        assert!(harness.executor.calls().is_empty());
        assert_eq!(metrics.total_turns, 2);
    }

    #[tokio::test]
    async fn missing_topic_is_asked_then_dispatched() {
        let mut harness = Harness::new();
        harness.classifier = MockClassifier::new(IntentResult::new(Intent::TopicResearch, 0.9));
        let prompt = ScriptedPrompt::new()
            .with_text_turn("research something")
            .with_answer("AI agents");
        let mut engine = harness.engine(prompt);

        engine.run().await.unwrap();

        let calls = harness.executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].intent, Intent::TopicResearch);
        assert_eq!(
            calls[0].params.get("topic").map(String::as_str),
            Some("AI agents")
        );
    }

    #[tokio::test]
    async fn unanswered_topic_ends_turn_without_dispatch() {
        let mut harness = Harness::new();
        harness.classifier = MockClassifier::new(IntentResult::new(Intent::TopicResearch, 0.9));
        let mut engine = harness.engine(ScriptedPrompt::new().with_text_turn("research"));

        let metrics = engine.run().await.unwrap();

        assert!(harness.executor.calls().is_empty());
        assert_eq!(metrics.total_turns, 1);
        assert_eq!(metrics.errors, 0);
    }

    #[tokio::test]
    async fn classifier_clarification_is_shown() {
        let mut harness = Harness::new();
        harness.classifier = MockClassifier::new(
            IntentResult::new(Intent::Assignments, 0.9).with_clarification("Which course?"),
        );
        let mut engine = harness.engine(ScriptedPrompt::new().with_text_turn("assignments"));

        engine.run().await.unwrap();

        assert!(
            harness
                .log
                .events()
                .contains(&TurnEvent::Clarification("Which course?".to_string()))
        );
        assert!(harness.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn quit_during_capture_exits() {
        let mut harness = Harness::new();
        harness.keys = ScriptedKeySource::new().press(Duration::from_millis(5), Key::Escape);
        let mut engine = harness.engine(
            ScriptedPrompt::new()
                .with_voice_turn()
                .with_text_turn("never read"),
        );

        let metrics = engine.run().await.unwrap();

        assert_eq!(
            harness.log.states(),
            vec![TurnState::Idle, TurnState::Recording, TurnState::Exit]
        );
        assert_eq!(metrics.total_turns, 0);
    }

    #[tokio::test]
    async fn fatal_capture_error_ends_the_loop() {
        let mut harness = Harness::new();
        harness.keys = ScriptedKeySource::new()
            .press(Duration::from_millis(5), Key::ControlRight)
            .disconnect_after_script();
        let mut engine = harness.engine(
            ScriptedPrompt::new()
                .with_voice_turn()
                .with_text_turn("never read"),
        );

        let result = engine.run().await;

        assert!(matches!(result, Err(AssistantError::KeyListener { .. })));
        let states = harness.log.states();
        assert!(states.contains(&TurnState::Error));
        assert_eq!(states.last(), Some(&TurnState::Exit));
        assert!(harness.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn interrupt_during_task_exits_cleanly() {
        let mut harness = Harness::new();
        harness.executor = MockTaskExecutor::new().with_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let mut engine = harness.engine_with(
            ScriptedPrompt::new().with_text_turn("slow question"),
            cancel.clone(),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let metrics = tokio::time::timeout(Duration::from_secs(5), engine.run())
            .await
            .expect("engine should stop promptly")
            .unwrap();

        assert_eq!(metrics.total_turns, 0);
        assert_eq!(harness.log.states().last(), Some(&TurnState::Exit));
        assert!(harness.log.errors().is_empty());
    }
}
