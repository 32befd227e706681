use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::TaskType;

use super::parser::ParsedRecord;

static MARKETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)%\s*off|discount|sale|bogo|coupon|deal|promo|offer|flash sale|limited[- ]time").unwrap()
});

const PROMOTIONS_LABELS: &[&str] = &["CATEGORY_PROMOTIONS", "CATEGORY_SOCIAL", "CATEGORY_FORUMS"];

/// True iff any bulk-mail signal header is present (spec §4.3). Header
/// keys are expected lowercased, as built by the mail pipeline (spec §4.6
/// step 3).
pub fn has_bulk_header_signals(headers: &HashMap<String, String>) -> bool {
    if headers.contains_key("list-unsubscribe")
        || headers.contains_key("list-id")
        || headers.contains_key("x-auto-response-suppress")
    {
        return true;
    }
    if let Some(precedence) = headers.get("precedence") {
        let lower = precedence.to_lowercase();
        if lower.contains("bulk") || lower.contains("list") {
            return true;
        }
    }
    if let Some(auto_submitted) = headers.get("auto-submitted") {
        if auto_submitted.to_lowercase().starts_with("auto-") {
            return true;
        }
    }
    false
}

pub fn is_promotions_category(labels: &[String]) -> bool {
    labels.iter().any(|l| PROMOTIONS_LABELS.contains(&l.as_str()))
}

pub fn looks_marketing(subject: &str, snippet: &str) -> bool {
    MARKETING.is_match(subject) || MARKETING.is_match(snippet)
}

/// Evidence test per actionable type (spec §4.3). `general` is always true.
pub fn has_evidence_for_type(r#type: TaskType, parsed: &ParsedRecord, snippet: &str) -> bool {
    match r#type {
        TaskType::Appointment => {
            let keyword = crate::heuristics::parser::select_type(snippet) == TaskType::Appointment;
            let has_metadata = parsed.location.is_some() || parsed.organizer.is_some();
            // date-only is insufficient: startAt needs accompanying metadata or a keyword
            keyword || (parsed.start_at.is_some() && has_metadata)
        }
        TaskType::Bill => {
            parsed.amount.is_some()
                || parsed.due_at.is_some()
                || parsed.reference_number.is_some()
                || parsed.statement_period.is_some()
                || parsed.vendor.is_some()
                || crate::heuristics::parser::select_type(snippet) == TaskType::Bill
        }
        TaskType::Medication => {
            parsed.dosage.is_some()
                || parsed.frequency.is_some()
                || parsed.prescriber.is_some()
                || crate::heuristics::parser::select_type(snippet) == TaskType::Medication
        }
        TaskType::General => true,
    }
}

/// Promotions-category messages are tombstoned outright (spec §4.3, §4.6
/// step 6).
pub fn should_tombstone_message(labels: &[String]) -> bool {
    is_promotions_category(labels)
}

/// Bulk-signaled messages with no hard evidence of an actionable type are
/// tombstoned before the classifier is ever invoked (spec §4.3, §4.6 step 7).
pub fn should_tombstone_non_actionable_message(
    headers: &HashMap<String, String>,
    parsed: &ParsedRecord,
) -> Option<&'static str> {
    if !has_bulk_header_signals(headers) {
        return None;
    }
    let has_hard_evidence = parsed.amount.is_some()
        || parsed.due_at.is_some()
        || parsed.start_at.is_some()
        || parsed.dosage.is_some()
        || parsed.frequency.is_some()
        || parsed.prescriber.is_some();
    if has_hard_evidence {
        None
    } else {
        Some("bulk_no_evidence")
    }
}
