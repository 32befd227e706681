//! Suppression learner (C10, spec §4.10): thin orchestration over
//! `db::repository::suppression`, the crate's public entry points for
//! recording an ignore and checking/overriding a sender domain's suppressed
//! state. The repository layer already implements the atomic
//! increment-and-promote semantics; this module names the C10 operations and
//! wires the mail pipeline's ingestion-time tombstones into the same
//! learning path a caregiver's manual "ignore" action would use.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::suppression::{is_suppressed, record_ignore, set_suppressed};
use crate::db::DatabaseError;
use crate::models::{SenderSuppression, SourceProvider};
use crate::pipeline::mail::MessageResult;

/// Record a `reviewState=ignored` transition for `sender_domain`, whether it
/// came from ingestion-time tombstoning or a caregiver's manual review
/// action (spec §4.10: "either user-initiated or ignored-at-ingestion").
pub fn learn_from_ignore(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    sender_domain: &str,
    threshold: u32,
    now: DateTime<Utc>,
) -> Result<SenderSuppression, DatabaseError> {
    record_ignore(conn, caregiver_id, provider, sender_domain, threshold, now)
}

/// Whether mail pipeline step 5 should tombstone this sender domain (spec
/// §4.6 step 5).
pub fn is_sender_suppressed(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    sender_domain: &str,
) -> Result<bool, DatabaseError> {
    is_suppressed(conn, caregiver_id, provider, sender_domain)
}

/// Explicit caregiver suppress/unsuppress action (spec §4.10: "overwrite
/// suppressed without resetting the count unless the caller requests a
/// reset").
pub fn set_sender_suppressed(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    sender_domain: &str,
    suppressed: bool,
    reset_count: bool,
) -> Result<(), DatabaseError> {
    set_suppressed(conn, caregiver_id, provider, sender_domain, suppressed, reset_count)
}

/// Feed a batch of mail-pipeline results into the learner: every tombstone
/// with a known sender domain counts as an ignore (spec §4.10
/// "ignored-at-ingestion"). Malformed/missing sender domains are skipped,
/// not errors.
pub fn learn_from_batch(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    results: &[MessageResult],
    threshold: u32,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    for result in results {
        if let MessageResult::Tombstoned { payload, .. } = result {
            if let Some(sender_domain) = &payload.sender_domain {
                record_ignore(conn, caregiver_id, provider, sender_domain, threshold, now)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{AppointmentFields, BillFields, MedicationFields, ReviewState, TaskStatus, TaskType, TaskUpsertPayload};

    fn tombstoned(sender_domain: Option<&str>) -> MessageResult {
        MessageResult::Tombstoned {
            reason: "category_tombstone",
            payload: Box::new(TaskUpsertPayload {
                caregiver_id: Uuid::new_v4(),
                care_recipient_id: Uuid::new_v4(),
                source_id: Uuid::new_v4(),
                r#type: TaskType::General,
                status: TaskStatus::Done,
                review_state: ReviewState::Ignored,
                confidence: 0.0,
                external_id: Some("msg-1".into()),
                source_link: None,
                title: "t".into(),
                raw_snippet: None,
                description: None,
                sender_domain: sender_domain.map(|s| s.to_string()),
                appointment: AppointmentFields::default(),
                bill: BillFields::default(),
                medication: MedicationFields::default(),
                ingestion_debug: None,
            }),
        }
    }

    #[test]
    fn batch_with_three_tombstones_from_same_domain_suppresses() {
        let conn = open_memory_database().unwrap();
        let caregiver_id = Uuid::new_v4();
        let now = Utc::now();
        for _ in 0..3 {
            learn_from_batch(
                &conn,
                &caregiver_id,
                SourceProvider::Google,
                &[tombstoned(Some("spam.example.com"))],
                3,
                now,
            )
            .unwrap();
        }
        assert!(is_sender_suppressed(&conn, &caregiver_id, SourceProvider::Google, "spam.example.com").unwrap());
    }

    #[test]
    fn missing_sender_domain_is_skipped_without_error() {
        let conn = open_memory_database().unwrap();
        let caregiver_id = Uuid::new_v4();
        let result = learn_from_batch(&conn, &caregiver_id, SourceProvider::Google, &[tombstoned(None)], 3, Utc::now());
        assert!(result.is_ok());
    }

    #[test]
    fn manual_unsuppress_keeps_count_without_reset() {
        let conn = open_memory_database().unwrap();
        let caregiver_id = Uuid::new_v4();
        learn_from_ignore(&conn, &caregiver_id, SourceProvider::Google, "x.com", 3, Utc::now()).unwrap();
        set_sender_suppressed(&conn, &caregiver_id, SourceProvider::Google, "x.com", false, false).unwrap();
        assert!(!is_sender_suppressed(&conn, &caregiver_id, SourceProvider::Google, "x.com").unwrap());
    }
}
