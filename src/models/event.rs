use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SyncReason;

/// Append-only audit row; emitted only when a run caused observable change
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub id: Uuid,
    pub source_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
    pub history_id: Option<String>,
    pub reason: SyncReason,
    pub duration_ms: i64,
}

impl IngestionEvent {
    pub fn is_observable(&self) -> bool {
        self.created > 0 || self.updated > 0 || self.skipped > 0 || self.errors > 0
    }
}
