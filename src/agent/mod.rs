//! Task execution against an OpenAI-compatible chat API.

pub mod chat;
pub mod client;
pub mod executor;

pub use chat::{ChatTaskConfig, ChatTaskExecutor};
pub use client::{ChatClient, ChatClientConfig, ChatMessage, CompletionOptions};
pub use executor::{ExecutedTask, MockTaskExecutor, TaskExecutor};
