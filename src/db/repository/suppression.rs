use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{SenderSuppression, SourceProvider};

fn row_to_suppression(row: &rusqlite::Row<'_>) -> Result<SenderSuppression, DatabaseError> {
    let caregiver_id: String = row.get(0)?;
    let provider: String = row.get(1)?;
    Ok(SenderSuppression {
        caregiver_id: Uuid::parse_str(&caregiver_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        provider: SourceProvider::from_str(&provider)?,
        sender_domain: row.get(2)?,
        ignore_count: row.get::<_, i64>(3)? as u32,
        suppressed: row.get::<_, i32>(4)? != 0,
        last_ignored_at: row
            .get::<_, Option<String>>(5)?
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
    })
}

pub fn get_suppression(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    sender_domain: &str,
) -> Result<Option<SenderSuppression>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT caregiver_id, provider, sender_domain, ignore_count, suppressed, last_ignored_at \
         FROM sender_suppressions WHERE caregiver_id = ?1 AND provider = ?2 AND sender_domain = ?3",
    )?;
    stmt.query_row(
        params![caregiver_id.to_string(), provider.as_str(), sender_domain],
        |row| Ok(row_to_suppression(row)),
    )
    .optional()?
    .transpose()
}

pub fn is_suppressed(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    sender_domain: &str,
) -> Result<bool, DatabaseError> {
    Ok(get_suppression(conn, caregiver_id, provider, sender_domain)?
        .map(|s| s.suppressed)
        .unwrap_or(false))
}

/// Increment the ignore counter and promote to `suppressed` at `threshold`
/// (C10, spec §4.10). Atomic under the caller's connection.
pub fn record_ignore(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    sender_domain: &str,
    threshold: u32,
    now: DateTime<Utc>,
) -> Result<SenderSuppression, DatabaseError> {
    let mut suppression = get_suppression(conn, caregiver_id, provider, sender_domain)?
        .unwrap_or_else(|| SenderSuppression::new(*caregiver_id, provider, sender_domain.to_string()));
    suppression.record_ignore(threshold, now);

    conn.execute(
        "INSERT INTO sender_suppressions (caregiver_id, provider, sender_domain, ignore_count, suppressed, last_ignored_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT (caregiver_id, provider, sender_domain) DO UPDATE SET \
         ignore_count = excluded.ignore_count, suppressed = excluded.suppressed, last_ignored_at = excluded.last_ignored_at",
        params![
            caregiver_id.to_string(),
            provider.as_str(),
            sender_domain,
            suppression.ignore_count,
            suppression.suppressed as i32,
            suppression.last_ignored_at.map(|d| d.to_rfc3339()),
        ],
    )?;
    Ok(suppression)
}

/// Explicit user action: set `suppressed` without touching `ignoreCount`,
/// unless `reset_count` is requested (spec §4.10).
pub fn set_suppressed(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    sender_domain: &str,
    suppressed: bool,
    reset_count: bool,
) -> Result<(), DatabaseError> {
    let existing = get_suppression(conn, caregiver_id, provider, sender_domain)?;
    let ignore_count = if reset_count {
        0
    } else {
        existing.map(|s| s.ignore_count).unwrap_or(0)
    };
    conn.execute(
        "INSERT INTO sender_suppressions (caregiver_id, provider, sender_domain, ignore_count, suppressed, last_ignored_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, NULL) \
         ON CONFLICT (caregiver_id, provider, sender_domain) DO UPDATE SET \
         ignore_count = excluded.ignore_count, suppressed = excluded.suppressed",
        params![
            caregiver_id.to_string(),
            provider.as_str(),
            sender_domain,
            ignore_count,
            suppressed as i32,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn record_ignore_promotes_at_threshold() {
        let conn = open_memory_database().unwrap();
        let caregiver_id = Uuid::new_v4();
        let now = Utc::now();
        for _ in 0..2 {
            let s = record_ignore(&conn, &caregiver_id, SourceProvider::Google, "spam.example.com", 3, now)
                .unwrap();
            assert!(!s.suppressed);
        }
        let s = record_ignore(&conn, &caregiver_id, SourceProvider::Google, "spam.example.com", 3, now).unwrap();
        assert!(s.suppressed);
        assert!(is_suppressed(&conn, &caregiver_id, SourceProvider::Google, "spam.example.com").unwrap());
    }

    #[test]
    fn manual_suppress_does_not_reset_count_by_default() {
        let conn = open_memory_database().unwrap();
        let caregiver_id = Uuid::new_v4();
        record_ignore(&conn, &caregiver_id, SourceProvider::Google, "x.com", 3, Utc::now()).unwrap();
        set_suppressed(&conn, &caregiver_id, SourceProvider::Google, "x.com", true, false).unwrap();
        let s = get_suppression(&conn, &caregiver_id, SourceProvider::Google, "x.com").unwrap().unwrap();
        assert!(s.suppressed);
        assert_eq!(s.ignore_count, 1);
    }
}
