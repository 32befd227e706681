use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{Source, SourceProvider, SourceStatus};

const COLUMNS: &str = "id, caregiver_id, care_recipient_id, provider, account_email, \
    refresh_credential, status, is_primary, history_id, calendar_sync_token, watch_id, \
    watch_expiration, calendar_channel_id, calendar_resource_id, last_sync_at, last_push_at, \
    error_message";

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRow> {
    Ok(SourceRow {
        id: row.get(0)?,
        caregiver_id: row.get(1)?,
        care_recipient_id: row.get(2)?,
        provider: row.get(3)?,
        account_email: row.get(4)?,
        refresh_credential: row.get(5)?,
        status: row.get(6)?,
        is_primary: row.get::<_, i32>(7)? != 0,
        history_id: row.get(8)?,
        calendar_sync_token: row.get(9)?,
        watch_id: row.get(10)?,
        watch_expiration: row.get(11)?,
        calendar_channel_id: row.get(12)?,
        calendar_resource_id: row.get(13)?,
        last_sync_at: row.get(14)?,
        last_push_at: row.get(15)?,
        error_message: row.get(16)?,
    })
}

struct SourceRow {
    id: String,
    caregiver_id: String,
    care_recipient_id: String,
    provider: String,
    account_email: String,
    refresh_credential: String,
    status: String,
    is_primary: bool,
    history_id: Option<String>,
    calendar_sync_token: Option<String>,
    watch_id: Option<String>,
    watch_expiration: Option<String>,
    calendar_channel_id: Option<String>,
    calendar_resource_id: Option<String>,
    last_sync_at: Option<String>,
    last_push_at: Option<String>,
    error_message: Option<String>,
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn source_from_row(row: SourceRow) -> Result<Source, DatabaseError> {
    Ok(Source {
        id: Uuid::parse_str(&row.id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        caregiver_id: Uuid::parse_str(&row.caregiver_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        care_recipient_id: Uuid::parse_str(&row.care_recipient_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        provider: SourceProvider::from_str(&row.provider)?,
        account_email: row.account_email,
        refresh_credential: row.refresh_credential,
        status: SourceStatus::from_str(&row.status)?,
        is_primary: row.is_primary,
        history_id: row.history_id,
        calendar_sync_token: row.calendar_sync_token,
        watch_id: row.watch_id,
        watch_expiration: row.watch_expiration.map(|s| parse_ts(&s)).transpose()?,
        calendar_channel_id: row.calendar_channel_id,
        calendar_resource_id: row.calendar_resource_id,
        last_sync_at: row.last_sync_at.map(|s| parse_ts(&s)).transpose()?,
        last_push_at: row.last_push_at.map(|s| parse_ts(&s)).transpose()?,
        error_message: row.error_message,
    })
}

pub fn insert_source(conn: &Connection, source: &Source) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO sources ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)"),
        params![
            source.id.to_string(),
            source.caregiver_id.to_string(),
            source.care_recipient_id.to_string(),
            source.provider.as_str(),
            source.account_email,
            source.refresh_credential,
            source.status.as_str(),
            source.is_primary as i32,
            source.history_id,
            source.calendar_sync_token,
            source.watch_id,
            source.watch_expiration.map(|d| d.to_rfc3339()),
            source.calendar_channel_id,
            source.calendar_resource_id,
            source.last_sync_at.map(|d| d.to_rfc3339()),
            source.last_push_at.map(|d| d.to_rfc3339()),
            source.error_message,
        ],
    )?;
    Ok(())
}

pub fn get_source(conn: &Connection, id: &Uuid) -> Result<Option<Source>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM sources WHERE id = ?1"))?;
    let row = stmt.query_row(params![id.to_string()], row_to_source).optional()?;
    row.map(source_from_row).transpose()
}

pub fn get_source_by_account_email(
    conn: &Connection,
    caregiver_id: &Uuid,
    provider: SourceProvider,
    account_email: &str,
) -> Result<Option<Source>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sources WHERE caregiver_id = ?1 AND provider = ?2 AND account_email = ?3"
    ))?;
    let row = stmt
        .query_row(
            params![caregiver_id.to_string(), provider.as_str(), account_email],
            row_to_source,
        )
        .optional()?;
    row.map(source_from_row).transpose()
}

/// Look up a source by provider account email alone, for the push-webhook
/// path where the pub/sub payload carries only the Gmail address (spec §6,
/// §4.9 "identifies the source by account-email"). Ambiguous matches (two
/// caregivers sharing the same account) resolve to the first row; such
/// sharing is not expected to occur in practice.
pub fn get_source_by_account_email_any(
    conn: &Connection,
    provider: SourceProvider,
    account_email: &str,
) -> Result<Option<Source>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sources WHERE provider = ?1 AND account_email = ?2 LIMIT 1"
    ))?;
    let row = stmt
        .query_row(params![provider.as_str(), account_email], row_to_source)
        .optional()?;
    row.map(source_from_row).transpose()
}

pub fn get_source_by_watch_id(conn: &Connection, watch_id: &str) -> Result<Option<Source>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM sources WHERE watch_id = ?1"))?;
    let row = stmt.query_row(params![watch_id], row_to_source).optional()?;
    row.map(source_from_row).transpose()
}

pub fn get_source_by_calendar_channel_id(
    conn: &Connection,
    channel_id: &str,
) -> Result<Option<Source>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM sources WHERE calendar_channel_id = ?1"))?;
    let row = stmt.query_row(params![channel_id], row_to_source).optional()?;
    row.map(source_from_row).transpose()
}

/// Sources whose `watchExpiration` falls within `lookahead` of `now`, or is
/// unset (never registered).
pub fn list_sources_needing_renewal(
    conn: &Connection,
    lookahead: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<Vec<Source>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sources WHERE status != 'disconnected' \
         AND (watch_expiration IS NULL OR watch_expiration <= ?1)"
    ))?;
    let threshold = (now + lookahead).to_rfc3339();
    let rows = stmt.query_map(params![threshold], row_to_source)?;
    let mut sources = Vec::new();
    for row in rows {
        sources.push(source_from_row(row?)?);
    }
    Ok(sources)
}

/// Sources stale enough for the poll ticker (spec §4.8).
pub fn list_stale_sources(
    conn: &Connection,
    stale_after: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<Vec<Source>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sources WHERE status != 'disconnected' \
         AND (last_sync_at IS NULL OR last_sync_at <= ?1 \
         OR (watch_expiration IS NOT NULL AND watch_expiration <= ?2))"
    ))?;
    let sync_threshold = (now - stale_after).to_rfc3339();
    let now_str = now.to_rfc3339();
    let rows = stmt.query_map(params![sync_threshold, now_str], row_to_source)?;
    let mut sources = Vec::new();
    for row in rows {
        sources.push(source_from_row(row?)?);
    }
    Ok(sources)
}

/// Update the fields only the per-source lock holder may mutate (spec §5).
pub fn update_sync_state(conn: &Connection, source: &Source) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE sources SET history_id = ?1, calendar_sync_token = ?2, watch_id = ?3, \
         watch_expiration = ?4, calendar_channel_id = ?5, calendar_resource_id = ?6, \
         last_sync_at = ?7, status = ?8, error_message = ?9 WHERE id = ?10",
        params![
            source.history_id,
            source.calendar_sync_token,
            source.watch_id,
            source.watch_expiration.map(|d| d.to_rfc3339()),
            source.calendar_channel_id,
            source.calendar_resource_id,
            source.last_sync_at.map(|d| d.to_rfc3339()),
            source.status.as_str(),
            source.error_message,
            source.id.to_string(),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Source".into(),
            id: source.id.to_string(),
        });
    }
    Ok(())
}

/// Update `lastPushAt`; ticker-owned, safe outside the source lock (spec §5).
pub fn touch_last_push(conn: &Connection, id: &Uuid, now: DateTime<Utc>) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE sources SET last_push_at = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), id.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn sample(caregiver_id: Uuid, care_recipient_id: Uuid) -> Source {
        Source {
            id: Uuid::new_v4(),
            caregiver_id,
            care_recipient_id,
            provider: SourceProvider::Google,
            account_email: "caregiver@example.com".into(),
            refresh_credential: "opaque".into(),
            status: SourceStatus::Active,
            is_primary: true,
            history_id: None,
            calendar_sync_token: None,
            watch_id: Some("watch-1".into()),
            watch_expiration: Some(Utc::now() + chrono::Duration::hours(2)),
            calendar_channel_id: Some("chan-1".into()),
            calendar_resource_id: None,
            last_sync_at: None,
            last_push_at: None,
            error_message: None,
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let conn = open_memory_database().unwrap();
        let s = sample(Uuid::new_v4(), Uuid::new_v4());
        insert_source(&conn, &s).unwrap();
        let fetched = get_source(&conn, &s.id).unwrap().unwrap();
        assert_eq!(fetched.account_email, s.account_email);
        assert_eq!(fetched.watch_id, s.watch_id);
    }

    #[test]
    fn lookup_by_account_email_any_ignores_caregiver() {
        let conn = open_memory_database().unwrap();
        let s = sample(Uuid::new_v4(), Uuid::new_v4());
        insert_source(&conn, &s).unwrap();
        let found = get_source_by_account_email_any(&conn, SourceProvider::Google, &s.account_email)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, s.id);
        assert!(get_source_by_account_email_any(&conn, SourceProvider::Google, "nobody@example.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn lookup_by_watch_id_and_channel_id() {
        let conn = open_memory_database().unwrap();
        let s = sample(Uuid::new_v4(), Uuid::new_v4());
        insert_source(&conn, &s).unwrap();
        assert!(get_source_by_watch_id(&conn, "watch-1").unwrap().is_some());
        assert!(get_source_by_calendar_channel_id(&conn, "chan-1").unwrap().is_some());
        assert!(get_source_by_watch_id(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn unique_primary_per_care_recipient_provider_enforced() {
        let conn = open_memory_database().unwrap();
        let caregiver_id = Uuid::new_v4();
        let care_recipient_id = Uuid::new_v4();
        let a = sample(caregiver_id, care_recipient_id);
        insert_source(&conn, &a).unwrap();
        let mut b = sample(caregiver_id, care_recipient_id);
        b.account_email = "other@example.com".into();
        let err = insert_source(&conn, &b).unwrap_err();
        assert!(matches!(err, DatabaseError::Sqlite(_)));
    }

    #[test]
    fn stale_sources_found_when_never_synced() {
        let conn = open_memory_database().unwrap();
        let s = sample(Uuid::new_v4(), Uuid::new_v4());
        insert_source(&conn, &s).unwrap();
        let stale = list_stale_sources(&conn, chrono::Duration::minutes(6), Utc::now()).unwrap();
        assert_eq!(stale.len(), 1);
    }
}
