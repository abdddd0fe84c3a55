use crate::audio::buffer::AudioBuffer;
use crate::error::{AssistantError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (local Whisper, remote API, mock).
/// Calls block; the engine runs them off the async runtime.
pub trait Transcriber: Send + Sync {
    /// Transcribe a mono buffer to text.
    ///
    /// An empty string means nothing was understood and is not an error.
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the transcriber is ready
    fn is_ready(&self) -> bool;
}

/// Implement Transcriber for Arc<T> to allow sharing across turns.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of `transcribe` calls so far, shared between clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &AudioBuffer) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            Err(AssistantError::Transcription {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_second() -> AudioBuffer {
        AudioBuffer::new(vec![0.0; 16000], 16000)
    }

    #[test]
    fn test_mock_transcriber_returns_response() {
        let transcriber = MockTranscriber::new("test-model").with_response("what's my next class");

        let result = transcriber.transcribe(&one_second());

        assert_eq!(result.unwrap(), "what's my next class");
    }

    #[test]
    fn test_mock_transcriber_returns_error_when_configured() {
        let transcriber = MockTranscriber::new("test-model").with_failure();

        match transcriber.transcribe(&one_second()) {
            Err(AssistantError::Transcription { message }) => {
                assert_eq!(message, "mock transcription failure");
            }
            other => panic!("Expected Transcription error, got {:?}", other),
        }
    }

    #[test]
    fn test_mock_transcriber_counts_calls_across_clones() {
        let transcriber = MockTranscriber::new("test-model");
        let shared = transcriber.clone();

        transcriber.transcribe(&one_second()).unwrap();
        shared.transcribe(&AudioBuffer::default()).unwrap();

        assert_eq!(transcriber.calls(), 2);
    }

    #[test]
    fn test_mock_transcriber_is_ready() {
        assert!(MockTranscriber::new("test-model").is_ready());
        assert!(!MockTranscriber::new("test-model").with_failure().is_ready());
    }

    #[test]
    fn test_transcriber_trait_is_object_safe() {
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(MockTranscriber::new("test-model").with_response("boxed test"));

        assert_eq!(transcriber.model_name(), "test-model");
        assert_eq!(transcriber.transcribe(&one_second()).unwrap(), "boxed test");
    }
}
