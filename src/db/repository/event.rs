use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{IngestionEvent, SyncReason};

fn parse_ts(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

/// Record an `IngestionEvent`. Callers should only call this when
/// `event.is_observable()` (spec §3: "emitted only when a sync caused
/// observable change").
pub fn insert_ingestion_event(conn: &Connection, event: &IngestionEvent) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO ingestion_events (id, source_id, started_at, finished_at, created, updated, \
         skipped, errors, history_id, reason, duration_ms) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            event.id.to_string(),
            event.source_id.to_string(),
            event.started_at.to_rfc3339(),
            event.finished_at.to_rfc3339(),
            event.created,
            event.updated,
            event.skipped,
            event.errors,
            event.history_id,
            event.reason.as_str(),
            event.duration_ms,
        ],
    )?;
    Ok(())
}

pub fn list_recent_events(
    conn: &Connection,
    source_id: &Uuid,
    limit: u32,
) -> Result<Vec<IngestionEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, started_at, finished_at, created, updated, skipped, errors, \
         history_id, reason, duration_ms FROM ingestion_events WHERE source_id = ?1 \
         ORDER BY started_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![source_id.to_string(), limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, i64>(7)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, String>(9)?,
            row.get::<_, i64>(10)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (id, source_id, started_at, finished_at, created, updated, skipped, errors, history_id, reason, duration_ms) = row?;
        events.push(IngestionEvent {
            id: Uuid::parse_str(&id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            source_id: Uuid::parse_str(&source_id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            started_at: parse_ts(&started_at)?,
            finished_at: parse_ts(&finished_at)?,
            created: created as u32,
            updated: updated as u32,
            skipped: skipped as u32,
            errors: errors as u32,
            history_id,
            reason: SyncReason::from_str(&reason)?,
            duration_ms,
        });
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_list_round_trips() {
        let conn = open_memory_database().unwrap();
        let source_id = Uuid::new_v4();
        let now = Utc::now();
        let event = IngestionEvent {
            id: Uuid::new_v4(),
            source_id,
            started_at: now,
            finished_at: now,
            created: 2,
            updated: 1,
            skipped: 0,
            errors: 0,
            history_id: Some("h-1".into()),
            reason: SyncReason::Push,
            duration_ms: 120,
        };
        insert_ingestion_event(&conn, &event).unwrap();
        let events = list_recent_events(&conn, &source_id, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].created, 2);
        assert_eq!(events[0].reason, SyncReason::Push);
    }
}
