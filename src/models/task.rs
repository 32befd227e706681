use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::enums::{ReviewState, TaskStatus, TaskType};

/// Fields specific to `TaskType::Appointment`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentFields {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub organizer: Option<String>,
}

/// Fields specific to `TaskType::Bill`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BillFields {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub vendor: Option<String>,
    pub reference_number: Option<String>,
    pub statement_period: Option<String>,
}

/// Fields specific to `TaskType::Medication`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicationFields {
    pub medication_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub route: Option<String>,
    pub prescribing_provider: Option<String>,
    pub next_dose_at: Option<DateTime<Utc>>,
}

/// A care item surfaced to the client application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub caregiver_id: Uuid,
    pub care_recipient_id: Uuid,
    pub source_id: Uuid,
    pub r#type: TaskType,
    pub status: TaskStatus,
    pub review_state: ReviewState,
    pub confidence: f64,
    pub external_id: Option<String>,
    pub source_link: Option<String>,
    pub title: String,
    pub raw_snippet: Option<String>,
    pub description: Option<String>,
    pub sender_domain: Option<String>,
    pub appointment: AppointmentFields,
    pub bill: BillFields,
    pub medication: MedicationFields,
    pub synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ingestion_debug: Option<Value>,
}

/// The identity a caller supplies to `upsertTask` (C11); `Task` itself is
/// storage's return shape, this is the pipeline's input shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpsertPayload {
    pub caregiver_id: Uuid,
    pub care_recipient_id: Uuid,
    pub source_id: Uuid,
    pub r#type: TaskType,
    pub status: TaskStatus,
    pub review_state: ReviewState,
    pub confidence: f64,
    pub external_id: Option<String>,
    pub source_link: Option<String>,
    pub title: String,
    pub raw_snippet: Option<String>,
    pub description: Option<String>,
    pub sender_domain: Option<String>,
    pub appointment: AppointmentFields,
    pub bill: BillFields,
    pub medication: MedicationFields,
    pub ingestion_debug: Option<Value>,
}

impl TaskUpsertPayload {
    /// The idempotency key for C11: `externalId` when present, else the
    /// weaker `sourceId` proxy (spec §4.11).
    pub fn upsert_key(&self) -> Result<String, Uuid> {
        match &self.external_id {
            Some(ext) => Ok(ext.clone()),
            None => Err(self.source_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(external_id: Option<&str>) -> TaskUpsertPayload {
        TaskUpsertPayload {
            caregiver_id: Uuid::new_v4(),
            care_recipient_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            r#type: TaskType::General,
            status: TaskStatus::Todo,
            review_state: ReviewState::Pending,
            confidence: 0.5,
            external_id: external_id.map(|s| s.to_string()),
            source_link: None,
            title: "t".into(),
            raw_snippet: None,
            description: None,
            sender_domain: None,
            appointment: AppointmentFields::default(),
            bill: BillFields::default(),
            medication: MedicationFields::default(),
            ingestion_debug: None,
        }
    }

    #[test]
    fn upsert_key_prefers_external_id() {
        let p = payload(Some("msg-1"));
        assert_eq!(p.upsert_key(), Ok("msg-1".to_string()));
    }

    #[test]
    fn upsert_key_falls_back_to_source_id() {
        let p = payload(None);
        assert_eq!(p.upsert_key(), Err(p.source_id));
    }
}
