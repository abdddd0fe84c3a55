//! Turn lifecycle: state, metrics, user input and the conversation loop.

pub mod engine;
pub mod input;
pub mod metrics;
pub mod observer;
pub mod state;

pub use engine::{Collaborators, TurnEngine};
pub use input::{InputPrompt, ScriptedPrompt, TerminalPrompt};
pub use metrics::{StageTimes, TurnMetrics, TurnMetricsState};
pub use observer::{EventLog, LogObserver, TurnEvent, TurnObserver};
pub use state::{InputMode, ModeSelection, TurnContext, TurnState};
