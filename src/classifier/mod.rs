//! External LLM classifier adapter (C4).

pub mod client;
pub mod normalize;
pub mod types;

pub use client::{FixedClassifier, HttpClassifier, LlmClassifier};
pub use normalize::normalize_label;
pub use types::{limits, ClassifierLabel, ClassifierOutcome, ClassifierRequest};
