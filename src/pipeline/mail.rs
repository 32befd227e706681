//! Mail pipeline (C6, spec §4.6): fetch-and-parse a batch of message ids
//! into upsert payloads, applying C1's decoding, C3's pre-classify gates,
//! C2's field extraction, C4's classifier call, and C5's routing decision.
//!
//! Follows an injected-collaborator orchestration shape: a `MailPipeline`
//! struct wraps a `MailProvider` and an
//! `LlmClassifier`, and a single `process_message` method strings C1–C5
//! together. The outer per-message result mapping (steps 4-10) is a pure
//! function of already-fetched state, so it is split out as `decide_message`
//! for direct unit testing against spec §8's six concrete scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::classifier::{ClassifierOutcome, ClassifierRequest, LlmClassifier};
use crate::error::IngestError;
use crate::heuristics::{
    has_bulk_header_signals, parser::parse_fields, should_tombstone_message,
    should_tombstone_non_actionable_message, ParsedRecord,
};
use crate::mime::{decode_rfc2047, extract_ics, flatten, pick_text, strip_html, truncate_footer_noise};
use crate::models::{enums::IngestOutcome, AppointmentFields, BillFields, MedicationFields, ReviewState, TaskStatus, TaskType, TaskUpsertPayload};
use crate::routing::{route, RoutingDecision, RoutingInput};

use super::providers::{MailMessage, MailProvider};

const MAX_MESSAGE_SIZE_BYTES: u64 = 200_000;

/// Everything steps 4-10 need that isn't derivable from the message itself:
/// suppression/ignore state the caller looked up before invoking the
/// pipeline (spec §4.6 steps 4-5). `ignored_external_ids` is the caregiver's
/// whole ignored-task set, shared across every message in a batch, hence the
/// `Arc` rather than a per-message clone.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub ignored_external_ids: Arc<std::collections::HashSet<String>>,
    pub sender_domain_suppressed: bool,
}

/// Per-message outcome handed to C11 (spec §4.6 "Emitted results are handed
/// to C11").
#[derive(Debug, Clone)]
pub enum MessageResult {
    Upsert(Box<TaskUpsertPayload>),
    Skipped,
    SkippedLowConfidence,
    SkippedIgnored,
    Tombstoned { reason: &'static str, payload: Box<TaskUpsertPayload> },
}

impl MessageResult {
    pub fn outcome_kind(&self) -> IngestOutcome {
        match self {
            MessageResult::Upsert(_) => IngestOutcome::Created, // refined by the upsert layer
            MessageResult::Skipped => IngestOutcome::Skipped,
            MessageResult::SkippedLowConfidence => IngestOutcome::SkippedLowConfidence,
            MessageResult::SkippedIgnored => IngestOutcome::SkippedIgnored,
            MessageResult::Tombstoned { .. } => IngestOutcome::Tombstoned,
        }
    }
}

fn lowercase_headers(headers: &[(String, String)]) -> HashMap<String, String> {
    headers.iter().map(|(k, v)| (k.to_lowercase(), v.clone())).collect()
}

fn header_value<'a>(headers: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    headers.get(key).map(|s| s.as_str())
}

/// `Message-ID`, stripping a single surrounding `<…>` (spec §4.6 step 3).
fn strip_angle_brackets(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('<').and_then(|s| s.strip_suffix('>')).unwrap_or(s).to_string()
}

/// The `From` header's domain, same extraction `process_message` uses
/// internally for step 5's suppression check. Exposed so a caller can look
/// up suppression state before building this message's `MessageContext`.
pub fn sender_domain(message: &MailMessage) -> Option<String> {
    let headers = lowercase_headers(&message.headers);
    let from = header_value(&headers, "from").map(decode_rfc2047).unwrap_or_default();
    from.split('@').nth(1).map(|d| d.trim_end_matches('>').trim().to_string())
}

/// Extracted-signals block prepended to the classifier body (spec §4.6
/// step 8: "listing any non-null parsed fields").
fn extracted_signals_block(parsed: &ParsedRecord) -> String {
    let mut lines = vec!["Extracted signals:".to_string()];
    macro_rules! line {
        ($label:literal, $field:expr) => {
            if let Some(v) = &$field {
                lines.push(format!("{}: {}", $label, v));
            }
        };
    }
    line!("amount", parsed.amount);
    line!("currency", parsed.currency);
    line!("dueAt", parsed.due_at.map(|d| d.to_rfc3339()));
    line!("statementPeriod", parsed.statement_period);
    line!("referenceNumber", parsed.reference_number);
    line!("vendor", parsed.vendor);
    line!("dosage", parsed.dosage);
    line!("frequency", parsed.frequency);
    line!("route", parsed.route);
    line!("prescriber", parsed.prescriber);
    line!("startAt", parsed.start_at.map(|d| d.to_rfc3339()));
    line!("endAt", parsed.end_at.map(|d| d.to_rfc3339()));
    line!("location", parsed.location);
    line!("organizer", parsed.organizer);
    lines.join("\n")
}

fn tombstone_payload(
    caregiver_id: uuid::Uuid,
    care_recipient_id: uuid::Uuid,
    source_id: uuid::Uuid,
    external_id: Option<String>,
    title: String,
    sender_domain: Option<String>,
) -> TaskUpsertPayload {
    TaskUpsertPayload {
        caregiver_id,
        care_recipient_id,
        source_id,
        r#type: TaskType::General,
        status: TaskStatus::Done,
        review_state: ReviewState::Ignored,
        confidence: 0.0,
        external_id,
        source_link: None,
        title,
        raw_snippet: None,
        description: None,
        sender_domain,
        appointment: AppointmentFields::default(),
        bill: BillFields::default(),
        medication: MedicationFields::default(),
        ingestion_debug: None,
    }
}

/// `MailPipeline` wraps the injected provider and classifier collaborators
/// (spec §4.6 "I/O is injected so the core is testable deterministically").
pub struct MailPipeline<P: MailProvider, C: LlmClassifier> {
    provider: P,
    classifier: C,
}

impl<P: MailProvider, C: LlmClassifier> MailPipeline<P, C> {
    pub fn new(provider: P, classifier: C) -> Self {
        Self { provider, classifier }
    }

    /// Process one already-fetched message through steps 2-10, calling the
    /// classifier collaborator at step 8.
    pub async fn process_message(
        &self,
        message: &MailMessage,
        caregiver_id: uuid::Uuid,
        care_recipient_id: uuid::Uuid,
        source_id: uuid::Uuid,
        context: &MessageContext,
        now: DateTime<Utc>,
    ) -> MessageResult {
        // Step 1: size gate (performed by the caller before fetch in the
        // common case, re-checked here since `size_estimate` is on the
        // fetched message).
        if message.size_estimate > MAX_MESSAGE_SIZE_BYTES {
            return MessageResult::Skipped;
        }

        // Step 2: label gate.
        if !message.labels.iter().any(|l| l == "INBOX") || message.labels.iter().any(|l| l == "DRAFT") {
            return MessageResult::Skipped;
        }

        let headers = lowercase_headers(&message.headers);
        let subject = header_value(&headers, "subject").map(decode_rfc2047).unwrap_or_default();
        let from = header_value(&headers, "from").map(decode_rfc2047).unwrap_or_default();
        let message_id_header = header_value(&headers, "message-id").map(strip_angle_brackets);
        let external_id = message_id_header.unwrap_or_else(|| message.id.clone());

        // Step 4: caregiver-ignored set.
        if context.ignored_external_ids.contains(&external_id) {
            return MessageResult::SkippedIgnored;
        }

        let sender_domain = from.split('@').nth(1).map(|d| d.trim_end_matches('>').trim().to_string());

        // Step 5: sender-domain suppression.
        if context.sender_domain_suppressed {
            let payload = tombstone_payload(
                caregiver_id,
                care_recipient_id,
                source_id,
                Some(external_id),
                subject.clone(),
                sender_domain.clone(),
            );
            return MessageResult::Tombstoned {
                reason: "sender_suppressed",
                payload: Box::new(payload),
            };
        }

        // Step 6: category tombstone.
        if should_tombstone_message(&message.labels) {
            let payload = tombstone_payload(
                caregiver_id,
                care_recipient_id,
                source_id,
                Some(external_id),
                subject.clone(),
                sender_domain.clone(),
            );
            return MessageResult::Tombstoned {
                reason: "category_tombstone",
                payload: Box::new(payload),
            };
        }

        // Step 7: run C2, then the non-actionable bulk tombstone gate.
        let leaves = flatten(&message.payload);
        let (text, html) = pick_text(&leaves);
        let body_raw = text.or_else(|| html.map(|h| strip_html(&h))).unwrap_or_default();
        let body = truncate_footer_noise(&body_raw);
        let ics = extract_ics(&leaves);

        let parsed = parse_fields(&subject, &from, &message.snippet, &body, ics.as_ref());

        if let Some(reason) = should_tombstone_non_actionable_message(&headers, &parsed) {
            let payload = tombstone_payload(
                caregiver_id,
                care_recipient_id,
                source_id,
                Some(external_id),
                subject.clone(),
                sender_domain.clone(),
            );
            return MessageResult::Tombstoned {
                reason,
                payload: Box::new(payload),
            };
        }

        // Step 8: build classifier body and call C4.
        let classifier_body = format!("{}\n\n{}", extracted_signals_block(&parsed), body);
        let request = ClassifierRequest::new(
            &subject,
            &message.snippet,
            &classifier_body,
            Some(&from),
            message.labels.clone(),
            message.headers.clone(),
        );
        let outcome = self.classifier.classify(&request).await;

        let bulk_signals = has_bulk_header_signals(&headers);
        let (bucket, classification_failed, model_confidence) = match &outcome {
            ClassifierOutcome::Label(label) => (Some(label.label), false, Some(label.confidence)),
            ClassifierOutcome::Error { .. } => (None, true, None),
        };

        // Step 9: C5.
        let decision = route(&RoutingInput {
            bucket,
            classification_failed,
            model_confidence,
            parsed: &parsed,
            subject: &subject,
            snippet: &message.snippet,
            bulk_signals,
        });

        if decision.should_drop {
            return MessageResult::SkippedLowConfidence;
        }

        // Step 10: assemble the upsert payload.
        let payload = build_upsert_payload(
            caregiver_id,
            care_recipient_id,
            source_id,
            &external_id,
            &subject,
            &message.snippet,
            &body,
            sender_domain,
            &parsed,
            &decision,
            &outcome,
            now,
        );

        MessageResult::Upsert(Box::new(payload))
    }
}

#[allow(clippy::too_many_arguments)]
fn build_upsert_payload(
    caregiver_id: uuid::Uuid,
    care_recipient_id: uuid::Uuid,
    source_id: uuid::Uuid,
    external_id: &str,
    subject: &str,
    snippet: &str,
    body: &str,
    sender_domain: Option<String>,
    parsed: &ParsedRecord,
    decision: &RoutingDecision,
    outcome: &ClassifierOutcome,
    now: DateTime<Utc>,
) -> TaskUpsertPayload {
    let status = if decision.task_type == TaskType::Appointment {
        TaskStatus::Scheduled
    } else {
        TaskStatus::Todo
    };

    let description = match outcome {
        ClassifierOutcome::Error { .. } if !body.is_empty() || !snippet.is_empty() => {
            Some(format!("[model failed] {}", if body.is_empty() { snippet } else { body }))
        }
        ClassifierOutcome::Error { .. } => Some("[model failed]".to_string()),
        ClassifierOutcome::Label(_) => None,
    };

    let confidence = (decision.confidence * 100.0).round() / 100.0;

    let appointment = AppointmentFields {
        start_at: parsed.start_at,
        end_at: parsed.end_at,
        location: parsed.location.clone(),
        organizer: parsed.organizer.clone(),
    };
    let bill = BillFields {
        amount: parsed.amount,
        currency: parsed.currency.clone(),
        due_at: parsed.due_at,
        vendor: parsed.vendor.clone(),
        reference_number: parsed.reference_number.clone(),
        statement_period: parsed.statement_period.clone(),
    };
    let medication = MedicationFields {
        medication_name: None,
        dosage: parsed.dosage.clone(),
        frequency: parsed.frequency.clone(),
        route: parsed.route.clone(),
        prescribing_provider: parsed.prescriber.clone(),
        next_dose_at: None,
    };

    let ingestion_debug = Some(json!({
        "classifierOutcome": match outcome {
            ClassifierOutcome::Label(l) => json!({"label": l.label.as_str(), "confidence": l.confidence, "reason": l.reason}),
            ClassifierOutcome::Error { message, .. } => json!({"error": message}),
        },
        "routing": {
            "hasEvidence": decision.has_evidence,
            "shouldDrop": decision.should_drop,
        },
        "processedAt": now.to_rfc3339(),
    }));

    TaskUpsertPayload {
        caregiver_id,
        care_recipient_id,
        source_id,
        r#type: decision.task_type,
        status,
        review_state: decision.review_state,
        confidence,
        external_id: Some(external_id.to_string()),
        source_link: None,
        title: subject.to_string(),
        raw_snippet: Some(snippet.to_string()),
        description,
        sender_domain,
        appointment,
        bill,
        medication,
        ingestion_debug,
    }
}
