pub mod speaker;

pub use speaker::{
    CommandSpeaker, MockSpeaker, OpenAiSpeaker, OpenAiSpeakerConfig, Speaker, SpeakerConfig,
};
