use crate::models::TaskType;

use super::parser::ParsedRecord;

/// Per-type base heuristic confidence (spec §4.2).
pub mod base {
    pub const APPOINTMENT: f64 = 0.72;
    pub const BILL: f64 = 0.62;
    pub const MEDICATION: f64 = 0.58;
    pub const GENERAL: f64 = 0.35;
}

/// Bounds the final heuristic confidence is clamped to (spec §4.2).
pub mod bounds {
    pub const MIN: f64 = 0.05;
    pub const MAX: f64 = 0.95;
}

const EVIDENCE_BONUS: f64 = 0.08;
const MAX_BONUS_FIELDS: u32 = 3;

/// Base-plus-evidence-bonus heuristic confidence, clamped to
/// `[bounds::MIN, bounds::MAX]`. The exact deltas are an implementation
/// choice (spec §4.2 leaves the scheme open); this one is monotone in
/// evidence-field count, which is all §8's testable properties require.
pub fn compute_confidence(parsed: &ParsedRecord) -> f64 {
    let base = match parsed.r#type {
        TaskType::Appointment => base::APPOINTMENT,
        TaskType::Bill => base::BILL,
        TaskType::Medication => base::MEDICATION,
        TaskType::General => base::GENERAL,
    };

    let evidence_fields = count_evidence_fields(parsed);
    let bonus = EVIDENCE_BONUS * evidence_fields.min(MAX_BONUS_FIELDS) as f64;

    (base + bonus).clamp(bounds::MIN, bounds::MAX)
}

fn count_evidence_fields(parsed: &ParsedRecord) -> u32 {
    match parsed.r#type {
        TaskType::Appointment => {
            [parsed.start_at.is_some(), parsed.location.is_some(), parsed.organizer.is_some()]
                .iter()
                .filter(|v| **v)
                .count() as u32
        }
        TaskType::Bill => [
            parsed.amount.is_some(),
            parsed.due_at.is_some(),
            parsed.reference_number.is_some(),
            parsed.statement_period.is_some(),
            parsed.vendor.is_some(),
        ]
        .iter()
        .filter(|v| **v)
        .count() as u32,
        TaskType::Medication => [
            parsed.dosage.is_some(),
            parsed.frequency.is_some(),
            parsed.route.is_some(),
            parsed.prescriber.is_some(),
        ]
        .iter()
        .filter(|v| **v)
        .count() as u32,
        TaskType::General => 0,
    }
}
