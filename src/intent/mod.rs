//! Intent classification and routing.

pub mod classifier;
pub mod router;
pub mod types;

pub use classifier::{CAPABILITIES, Classifier, MockClassifier, OpenAiClassifier};
pub use router::{HelpKind, IntentRouter, RouterConfig, RoutingDecision};
pub use types::{Intent, IntentResult, Track};
