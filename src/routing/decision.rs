use serde::{Deserialize, Serialize};

use crate::heuristics::{has_evidence_for_type, looks_marketing, ParsedRecord};
use crate::models::{Bucket, ReviewState, TaskType};

/// Inputs to the routing decision (spec §4.5).
#[derive(Debug, Clone)]
pub struct RoutingInput<'a> {
    pub bucket: Option<Bucket>,
    pub classification_failed: bool,
    pub model_confidence: Option<f64>,
    pub parsed: &'a ParsedRecord,
    pub subject: &'a str,
    pub snippet: &'a str,
    pub bulk_signals: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub task_type: TaskType,
    pub review_state: ReviewState,
    pub confidence: f64,
    pub has_evidence: bool,
    pub should_drop: bool,
}

fn is_actionable(bucket: Option<Bucket>) -> bool {
    matches!(bucket, Some(Bucket::Appointments) | Some(Bucket::Bills) | Some(Bucket::Medications))
}

/// Combine heuristic and model output into a routing decision (C5, spec
/// §4.5). A pure function of its inputs — no I/O, no hidden state — so it
/// is exhaustively property-testable (spec §8 invariant 9).
pub fn route(input: &RoutingInput) -> RoutingDecision {
    // Rule 1
    let mut confidence = input.model_confidence.unwrap_or(input.parsed.confidence);

    // Rule 2
    if !input.classification_failed
        && input.bulk_signals
        && !matches!(input.bucket, Some(Bucket::Ignore) | Some(Bucket::NeedsReview))
    {
        confidence = (confidence - 0.25).max(0.0);
    }

    // Rule 3
    let mut review_state = if matches!(input.bucket, Some(Bucket::Ignore)) {
        ReviewState::Ignored
    } else if matches!(input.bucket, Some(Bucket::NeedsReview))
        || input.classification_failed
        || confidence < 0.8
    {
        ReviewState::Pending
    } else {
        ReviewState::Approved
    };

    // Rule 4
    let task_type = match input.bucket {
        Some(Bucket::Appointments) => TaskType::Appointment,
        Some(Bucket::Bills) => TaskType::Bill,
        Some(Bucket::Medications) => TaskType::Medication,
        _ => input.parsed.r#type,
    };

    // Rule 5
    if looks_marketing(input.subject, input.snippet) && !matches!(input.bucket, Some(Bucket::Ignore)) {
        review_state = ReviewState::Pending;
    }

    // Rule 6
    let has_evidence = if !input.classification_failed && is_actionable(input.bucket) {
        has_evidence_for_type(task_type, input.parsed, input.snippet)
    } else {
        true
    };

    // Rule 7
    if !input.classification_failed && is_actionable(input.bucket) {
        if !has_evidence {
            confidence = (confidence - 0.2).max(0.0);
            review_state = ReviewState::Pending;
        } else if confidence < 0.85 {
            review_state = ReviewState::Pending;
        }
    }

    // Rule 8
    if !input.classification_failed && input.bulk_signals && !matches!(input.bucket, Some(Bucket::Ignore)) {
        review_state = ReviewState::Pending;
    }

    // Rule 9
    let should_drop = !input.classification_failed
        && confidence < 0.6
        && is_actionable(input.bucket)
        && !has_evidence
        && !input.bulk_signals
        && !looks_marketing(input.subject, input.snippet);

    RoutingDecision {
        task_type,
        review_state,
        confidence,
        has_evidence,
        should_drop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_parsed() -> ParsedRecord {
        ParsedRecord::default()
    }

    #[test]
    fn confidence_exactly_point_eight_is_approved() {
        // Non-actionable bucket (general type, no bucket) so rule 7's 0.85
        // evidence threshold never engages — isolates rule 3's 0.8 cutoff.
        let parsed = base_parsed();
        let input = RoutingInput {
            bucket: None,
            classification_failed: false,
            model_confidence: Some(0.8),
            parsed: &parsed,
            subject: "",
            snippet: "",
            bulk_signals: false,
        };
        let decision = route(&input);
        assert_eq!(decision.review_state, ReviewState::Approved);
    }

    #[test]
    fn confidence_point_seven_nine_is_pending() {
        let parsed = base_parsed();
        let input = RoutingInput {
            bucket: None,
            classification_failed: false,
            model_confidence: Some(0.79),
            parsed: &parsed,
            subject: "",
            snippet: "",
            bulk_signals: false,
        };
        assert_eq!(route(&input).review_state, ReviewState::Pending);
    }

    #[test]
    fn confidence_exactly_point_six_is_kept_not_dropped() {
        let parsed = base_parsed();
        let input = RoutingInput {
            bucket: None,
            classification_failed: false,
            model_confidence: Some(0.6),
            parsed: &parsed,
            subject: "",
            snippet: "",
            bulk_signals: false,
        };
        assert!(!route(&input).should_drop);
    }

    #[test]
    fn classifier_failure_routes_pending() {
        let mut parsed = base_parsed();
        parsed.r#type = TaskType::Medication;
        parsed.confidence = 0.58;
        let input = RoutingInput {
            bucket: None,
            classification_failed: true,
            model_confidence: None,
            parsed: &parsed,
            subject: "",
            snippet: "",
            bulk_signals: false,
        };
        let decision = route(&input);
        assert_eq!(decision.review_state, ReviewState::Pending);
        assert_eq!(decision.task_type, TaskType::Medication);
        assert!(!decision.should_drop);
    }

    #[test]
    fn ignore_bucket_sets_ignored_review_state() {
        let parsed = base_parsed();
        let input = RoutingInput {
            bucket: Some(Bucket::Ignore),
            classification_failed: false,
            model_confidence: Some(0.95),
            parsed: &parsed,
            subject: "25% off everything",
            snippet: "",
            bulk_signals: false,
        };
        assert_eq!(route(&input).review_state, ReviewState::Ignored);
    }

    #[test]
    fn marketing_language_forces_pending_even_at_high_confidence() {
        let mut parsed = base_parsed();
        parsed.amount = Some(10.0);
        let input = RoutingInput {
            bucket: Some(Bucket::Bills),
            classification_failed: false,
            model_confidence: Some(0.95),
            parsed: &parsed,
            subject: "50% off your next bill",
            snippet: "",
            bulk_signals: false,
        };
        assert_eq!(route(&input).review_state, ReviewState::Pending);
    }

    #[test]
    fn no_evidence_for_actionable_bucket_lowers_confidence_and_pends() {
        let parsed = base_parsed();
        let input = RoutingInput {
            bucket: Some(Bucket::Bills),
            classification_failed: false,
            model_confidence: Some(0.9),
            parsed: &parsed,
            subject: "",
            snippet: "",
            bulk_signals: false,
        };
        let decision = route(&input);
        assert!(!decision.has_evidence);
        assert_eq!(decision.review_state, ReviewState::Pending);
        assert!((decision.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn bulk_signals_on_actionable_bucket_pends_and_penalizes() {
        let mut parsed = base_parsed();
        parsed.amount = Some(10.0);
        let input = RoutingInput {
            bucket: Some(Bucket::Bills),
            classification_failed: false,
            model_confidence: Some(0.95),
            parsed: &parsed,
            subject: "",
            snippet: "",
            bulk_signals: true,
        };
        let decision = route(&input);
        assert_eq!(decision.review_state, ReviewState::Pending);
        assert!((decision.confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn should_drop_only_when_noise_looking_and_actionable() {
        let parsed = base_parsed();
        let input = RoutingInput {
            bucket: Some(Bucket::Bills),
            classification_failed: false,
            model_confidence: Some(0.5),
            parsed: &parsed,
            subject: "hello",
            snippet: "world",
            bulk_signals: false,
        };
        let decision = route(&input);
        assert!(decision.should_drop);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn bucket_strategy() -> impl Strategy<Value = Option<Bucket>> {
        prop_oneof![
            Just(None),
            Just(Some(Bucket::Appointments)),
            Just(Some(Bucket::Bills)),
            Just(Some(Bucket::Medications)),
            Just(Some(Bucket::NeedsReview)),
            Just(Some(Bucket::Ignore)),
        ]
    }

    proptest! {
        /// Routing decision is a pure function of its inputs: calling it
        /// twice with identical inputs always yields identical output
        /// (spec §8 invariant 9).
        #[test]
        fn route_is_pure(
            bucket in bucket_strategy(),
            classification_failed in any::<bool>(),
            model_confidence in proptest::option::of(0.0f64..=1.0),
            confidence in 0.0f64..=1.0,
            bulk_signals in any::<bool>(),
            amount_present in any::<bool>(),
        ) {
            let mut parsed = ParsedRecord::default();
            parsed.confidence = confidence;
            if amount_present {
                parsed.amount = Some(42.0);
            }

            let input = RoutingInput {
                bucket,
                classification_failed,
                model_confidence,
                parsed: &parsed,
                subject: "subject text",
                snippet: "snippet text",
                bulk_signals,
            };

            let first = route(&input);
            let second = route(&input);
            prop_assert_eq!(first, second);
        }

        /// Confidence always stays within [0, 1] regardless of inputs.
        #[test]
        fn confidence_stays_bounded(
            bucket in bucket_strategy(),
            classification_failed in any::<bool>(),
            model_confidence in proptest::option::of(0.0f64..=1.0),
            bulk_signals in any::<bool>(),
        ) {
            let parsed = ParsedRecord::default();
            let input = RoutingInput {
                bucket,
                classification_failed,
                model_confidence,
                parsed: &parsed,
                subject: "",
                snippet: "",
                bulk_signals,
            };
            let decision = route(&input);
            prop_assert!(decision.confidence >= 0.0 && decision.confidence <= 1.0);
        }
    }
}
