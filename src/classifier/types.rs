use serde::{Deserialize, Serialize};

use crate::models::Bucket;

/// Field-length limits enforced before a classifier call (spec §4.4).
pub mod limits {
    pub const SUBJECT: usize = 500;
    pub const SENDER: usize = 200;
    pub const SNIPPET: usize = 700;
    pub const BODY: usize = 3500;
    pub const HEADER_VALUE: usize = 300;
    pub const MAX_HEADERS: usize = 20;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierRequest {
    pub subject: String,
    pub snippet: String,
    pub body: String,
    pub sender: Option<String>,
    pub label_ids: Vec<String>,
    pub headers: Vec<(String, String)>,
}

impl ClassifierRequest {
    /// Truncate every field to its limit and cap header count (spec §4.4).
    pub fn new(
        subject: &str,
        snippet: &str,
        body: &str,
        sender: Option<&str>,
        label_ids: Vec<String>,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            subject: truncate(subject, limits::SUBJECT),
            snippet: truncate(snippet, limits::SNIPPET),
            body: truncate(body, limits::BODY),
            sender: sender.map(|s| truncate(s, limits::SENDER)),
            label_ids,
            headers: headers
                .into_iter()
                .take(limits::MAX_HEADERS)
                .map(|(k, v)| (k, truncate(&v, limits::HEADER_VALUE)))
                .collect(),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

/// The classifier's successful response (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierLabel {
    pub label: Bucket,
    pub confidence: f64,
    pub reason: Option<String>,
    pub project_id: Option<String>,
}

/// Classification is a tagged union, never a neutral default on error
/// (spec §9 "Tagged union of classifier results").
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ClassifierOutcome {
    Label(ClassifierLabel),
    Error { message: String, project_id: Option<String> },
}

impl ClassifierOutcome {
    pub fn label(&self) -> Option<&ClassifierLabel> {
        match self {
            ClassifierOutcome::Label(l) => Some(l),
            ClassifierOutcome::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ClassifierOutcome::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_oversized_fields() {
        let long_body = "x".repeat(limits::BODY + 50);
        let req = ClassifierRequest::new("s", "sn", &long_body, None, vec![], vec![]);
        assert_eq!(req.body.chars().count(), limits::BODY);
    }

    #[test]
    fn caps_header_count() {
        let headers: Vec<(String, String)> =
            (0..30).map(|i| (format!("h{i}"), "v".to_string())).collect();
        let req = ClassifierRequest::new("s", "sn", "b", None, vec![], headers);
        assert_eq!(req.headers.len(), limits::MAX_HEADERS);
    }

    #[test]
    fn outcome_error_has_no_label() {
        let outcome = ClassifierOutcome::Error {
            message: "timeout".into(),
            project_id: None,
        };
        assert!(outcome.is_error());
        assert!(outcome.label().is_none());
    }
}
