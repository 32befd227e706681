use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::IngestOutcome;
use crate::models::{AppointmentFields, BillFields, MedicationFields, ReviewState, Task, TaskStatus, TaskType, TaskUpsertPayload};

const COLUMNS: &str = "id, caregiver_id, care_recipient_id, source_id, type, status, \
    review_state, confidence, external_id, source_link, title, raw_snippet, description, \
    sender_domain, appointment_start_at, appointment_end_at, appointment_location, \
    appointment_organizer, bill_amount, bill_currency, bill_due_at, bill_vendor, \
    bill_reference_number, bill_statement_period, medication_name, medication_dosage, \
    medication_frequency, medication_route, medication_prescribing_provider, \
    medication_next_dose_at, synced_at, created_at, updated_at, ingestion_debug";

struct TaskRow {
    id: String,
    caregiver_id: String,
    care_recipient_id: String,
    source_id: String,
    r#type: String,
    status: String,
    review_state: String,
    confidence: f64,
    external_id: Option<String>,
    source_link: Option<String>,
    title: String,
    raw_snippet: Option<String>,
    description: Option<String>,
    sender_domain: Option<String>,
    appointment_start_at: Option<String>,
    appointment_end_at: Option<String>,
    appointment_location: Option<String>,
    appointment_organizer: Option<String>,
    bill_amount: Option<f64>,
    bill_currency: Option<String>,
    bill_due_at: Option<String>,
    bill_vendor: Option<String>,
    bill_reference_number: Option<String>,
    bill_statement_period: Option<String>,
    medication_name: Option<String>,
    medication_dosage: Option<String>,
    medication_frequency: Option<String>,
    medication_route: Option<String>,
    medication_prescribing_provider: Option<String>,
    medication_next_dose_at: Option<String>,
    synced_at: String,
    created_at: String,
    updated_at: String,
    ingestion_debug: Option<String>,
}

fn row_to_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        caregiver_id: row.get(1)?,
        care_recipient_id: row.get(2)?,
        source_id: row.get(3)?,
        r#type: row.get(4)?,
        status: row.get(5)?,
        review_state: row.get(6)?,
        confidence: row.get(7)?,
        external_id: row.get(8)?,
        source_link: row.get(9)?,
        title: row.get(10)?,
        raw_snippet: row.get(11)?,
        description: row.get(12)?,
        sender_domain: row.get(13)?,
        appointment_start_at: row.get(14)?,
        appointment_end_at: row.get(15)?,
        appointment_location: row.get(16)?,
        appointment_organizer: row.get(17)?,
        bill_amount: row.get(18)?,
        bill_currency: row.get(19)?,
        bill_due_at: row.get(20)?,
        bill_vendor: row.get(21)?,
        bill_reference_number: row.get(22)?,
        bill_statement_period: row.get(23)?,
        medication_name: row.get(24)?,
        medication_dosage: row.get(25)?,
        medication_frequency: row.get(26)?,
        medication_route: row.get(27)?,
        medication_prescribing_provider: row.get(28)?,
        medication_next_dose_at: row.get(29)?,
        synced_at: row.get(30)?,
        created_at: row.get(31)?,
        updated_at: row.get(32)?,
        ingestion_debug: row.get(33)?,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn task_from_row(row: TaskRow) -> Result<Task, DatabaseError> {
    let uuid = |s: &str| Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()));
    Ok(Task {
        id: uuid(&row.id)?,
        caregiver_id: uuid(&row.caregiver_id)?,
        care_recipient_id: uuid(&row.care_recipient_id)?,
        source_id: uuid(&row.source_id)?,
        r#type: TaskType::from_str(&row.r#type)?,
        status: TaskStatus::from_str(&row.status)?,
        review_state: ReviewState::from_str(&row.review_state)?,
        confidence: row.confidence,
        external_id: row.external_id,
        source_link: row.source_link,
        title: row.title,
        raw_snippet: row.raw_snippet,
        description: row.description,
        sender_domain: row.sender_domain,
        appointment: AppointmentFields {
            start_at: row.appointment_start_at.map(|s| parse_ts(&s)).transpose()?,
            end_at: row.appointment_end_at.map(|s| parse_ts(&s)).transpose()?,
            location: row.appointment_location,
            organizer: row.appointment_organizer,
        },
        bill: BillFields {
            amount: row.bill_amount,
            currency: row.bill_currency,
            due_at: row.bill_due_at.map(|s| parse_ts(&s)).transpose()?,
            vendor: row.bill_vendor,
            reference_number: row.bill_reference_number,
            statement_period: row.bill_statement_period,
        },
        medication: MedicationFields {
            medication_name: row.medication_name,
            dosage: row.medication_dosage,
            frequency: row.medication_frequency,
            route: row.medication_route,
            prescribing_provider: row.medication_prescribing_provider,
            next_dose_at: row.medication_next_dose_at.map(|s| parse_ts(&s)).transpose()?,
        },
        synced_at: parse_ts(&row.synced_at)?,
        created_at: parse_ts(&row.created_at)?,
        updated_at: parse_ts(&row.updated_at)?,
        ingestion_debug: row
            .ingestion_debug
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
    })
}

pub fn get_task(conn: &Connection, id: &Uuid) -> Result<Option<Task>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"))?;
    let row = stmt.query_row(params![id.to_string()], row_to_task_row).optional()?;
    row.map(task_from_row).transpose()
}

pub fn get_task_by_external_id(
    conn: &Connection,
    caregiver_id: &Uuid,
    external_id: &str,
) -> Result<Option<Task>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM tasks WHERE caregiver_id = ?1 AND external_id = ?2"
    ))?;
    let row = stmt
        .query_row(params![caregiver_id.to_string(), external_id], row_to_task_row)
        .optional()?;
    row.map(task_from_row).transpose()
}

/// The caregiver's `ignoredExternalIds` set (spec §4.6 step 4): external ids
/// of tasks already marked `reviewState=ignored`, so a replayed message for
/// the same external id is skipped rather than re-upserted.
pub fn list_ignored_external_ids(conn: &Connection, caregiver_id: &Uuid) -> Result<std::collections::HashSet<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT external_id FROM tasks WHERE caregiver_id = ?1 AND review_state = ?2 AND external_id IS NOT NULL",
    )?;
    let rows = stmt.query_map(params![caregiver_id.to_string(), ReviewState::Ignored.as_str()], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<_, _>>().map_err(DatabaseError::from)
}

fn find_existing_id(
    conn: &Connection,
    caregiver_id: &Uuid,
    external_id: Option<&str>,
    source_id: &Uuid,
) -> Result<Option<String>, DatabaseError> {
    match external_id {
        Some(ext) => conn
            .query_row(
                "SELECT id FROM tasks WHERE caregiver_id = ?1 AND external_id = ?2",
                params![caregiver_id.to_string(), ext],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(DatabaseError::from),
        None => conn
            .query_row(
                "SELECT id FROM tasks WHERE caregiver_id = ?1 AND source_id = ?2 AND external_id IS NULL",
                params![caregiver_id.to_string(), source_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(DatabaseError::from),
    }
}

/// Idempotent write keyed by `(caregiverId, externalId)`, falling back to
/// `(caregiverId, sourceId)` when `externalId` is absent (C11, spec §4.11).
/// Implemented as read-then-update under the caller's connection — the
/// caller is expected to hold the per-source lock (spec §5), so no
/// additional row lock is taken here.
pub fn upsert_task(
    conn: &Connection,
    payload: &TaskUpsertPayload,
    now: DateTime<Utc>,
) -> Result<(Uuid, IngestOutcome), DatabaseError> {
    let debug = payload
        .ingestion_debug
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    let existing = find_existing_id(
        conn,
        &payload.caregiver_id,
        payload.external_id.as_deref(),
        &payload.source_id,
    )?;

    match existing {
        Some(id) => {
            update_task_row(conn, &id, payload, &debug, now)?;
            let uuid = Uuid::parse_str(&id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
            Ok((uuid, IngestOutcome::Updated))
        }
        None => {
            let id = Uuid::new_v4();
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO tasks ({COLUMNS}) VALUES \
                     (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,\
                     ?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33,?34)"
                ),
                params![
                    id.to_string(),
                    payload.caregiver_id.to_string(),
                    payload.care_recipient_id.to_string(),
                    payload.source_id.to_string(),
                    payload.r#type.as_str(),
                    payload.status.as_str(),
                    payload.review_state.as_str(),
                    payload.confidence,
                    payload.external_id,
                    payload.source_link,
                    payload.title,
                    payload.raw_snippet,
                    payload.description,
                    payload.sender_domain,
                    payload.appointment.start_at.map(|d| d.to_rfc3339()),
                    payload.appointment.end_at.map(|d| d.to_rfc3339()),
                    payload.appointment.location,
                    payload.appointment.organizer,
                    payload.bill.amount,
                    payload.bill.currency,
                    payload.bill.due_at.map(|d| d.to_rfc3339()),
                    payload.bill.vendor,
                    payload.bill.reference_number,
                    payload.bill.statement_period,
                    payload.medication.medication_name,
                    payload.medication.dosage,
                    payload.medication.frequency,
                    payload.medication.route,
                    payload.medication.prescribing_provider,
                    payload.medication.next_dose_at.map(|d| d.to_rfc3339()),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                    debug,
                ],
            );

            match inserted {
                Ok(_) => Ok((id, IngestOutcome::Created)),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                    // Another writer inserted the same (caregiverId, externalId) key
                    // between our lookup and our insert. Spec §7: "StorageConflict on
                    // idempotent upsert -> treat as update-succeeded".
                    let winner = find_existing_id(conn, &payload.caregiver_id, payload.external_id.as_deref(), &payload.source_id)?
                        .ok_or(DatabaseError::ConstraintViolation("upsert race without a winning row".into()))?;
                    update_task_row(conn, &winner, payload, &debug, now)?;
                    let uuid = Uuid::parse_str(&winner).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
                    Ok((uuid, IngestOutcome::Updated))
                }
                Err(other) => Err(other.into()),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn update_task_row(
    conn: &Connection,
    id: &str,
    payload: &TaskUpsertPayload,
    debug: &Option<String>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE tasks SET type=?1, status=?2, review_state=?3, confidence=?4, \
         source_link=?5, title=?6, raw_snippet=?7, description=?8, sender_domain=?9, \
         appointment_start_at=?10, appointment_end_at=?11, appointment_location=?12, \
         appointment_organizer=?13, bill_amount=?14, bill_currency=?15, bill_due_at=?16, \
         bill_vendor=?17, bill_reference_number=?18, bill_statement_period=?19, \
         medication_name=?20, medication_dosage=?21, medication_frequency=?22, \
         medication_route=?23, medication_prescribing_provider=?24, \
         medication_next_dose_at=?25, synced_at=?26, updated_at=?27, ingestion_debug=?28 \
         WHERE id = ?29",
        params![
            payload.r#type.as_str(),
            payload.status.as_str(),
            payload.review_state.as_str(),
            payload.confidence,
            payload.source_link,
            payload.title,
            payload.raw_snippet,
            payload.description,
            payload.sender_domain,
            payload.appointment.start_at.map(|d| d.to_rfc3339()),
            payload.appointment.end_at.map(|d| d.to_rfc3339()),
            payload.appointment.location,
            payload.appointment.organizer,
            payload.bill.amount,
            payload.bill.currency,
            payload.bill.due_at.map(|d| d.to_rfc3339()),
            payload.bill.vendor,
            payload.bill.reference_number,
            payload.bill.statement_period,
            payload.medication.medication_name,
            payload.medication.dosage,
            payload.medication.frequency,
            payload.medication.route,
            payload.medication.prescribing_provider,
            payload.medication.next_dose_at.map(|d| d.to_rfc3339()),
            now.to_rfc3339(),
            now.to_rfc3339(),
            debug,
            id,
        ],
    )?;
    Ok(())
}

/// Mark a task done-ignored (tombstone), e.g. a cancelled calendar event or
/// a category/bulk tombstone (spec §4.6, §4.7, GLOSSARY "Tombstone").
pub fn tombstone_task_by_external_id(
    conn: &Connection,
    caregiver_id: &Uuid,
    external_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE tasks SET review_state = 'ignored', status = 'done', updated_at = ?1 \
         WHERE caregiver_id = ?2 AND external_id = ?3",
        params![now.to_rfc3339(), caregiver_id.to_string(), external_id],
    )?;
    Ok(updated > 0)
}
