use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{SourceProvider, SourceStatus};

/// One connection per (caregiver, provider, account).
///
/// Owns its watch/channel resources and cursor state exclusively; only the
/// holder of the per-source lock (`scheduler::lock::SourceLock`) may mutate
/// `history_id`, `calendar_sync_token`, `last_sync_at`, `watch_expiration`,
/// or `status`. `last_push_at` is ticker-owned and may be written outside
/// the lock since it is monotonic and last-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub caregiver_id: Uuid,
    pub care_recipient_id: Uuid,
    pub provider: SourceProvider,
    pub account_email: String,
    pub refresh_credential: String,
    pub status: SourceStatus,
    pub is_primary: bool,
    pub history_id: Option<String>,
    pub calendar_sync_token: Option<String>,
    pub watch_id: Option<String>,
    pub watch_expiration: Option<DateTime<Utc>>,
    pub calendar_channel_id: Option<String>,
    pub calendar_resource_id: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_push_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Source {
    /// Whether this source is eligible to write tasks: only primary,
    /// non-disconnected sources sync.
    pub fn may_write_tasks(&self) -> bool {
        self.is_primary && self.status != SourceStatus::Disconnected
    }

    /// Whether this source's watch needs renewal within the given lookahead.
    pub fn watch_expiring_within(&self, lookahead: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.watch_expiration {
            Some(exp) => exp - now <= lookahead,
            None => true,
        }
    }

    /// Whether this source is stale enough for the poll ticker to pick up:
    /// `lastSyncAt` older than `stale_after`, or watch expired.
    pub fn is_stale(&self, stale_after: chrono::Duration, now: DateTime<Utc>) -> bool {
        let sync_stale = match self.last_sync_at {
            Some(t) => now - t > stale_after,
            None => true,
        };
        let watch_expired = matches!(self.watch_expiration, Some(exp) if exp <= now);
        sync_stale || watch_expired
    }
}
