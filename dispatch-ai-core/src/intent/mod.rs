pub mod classifier;

pub use classifier::{ClassificationMethod, Intent, IntentClassifier, IntentKind};
