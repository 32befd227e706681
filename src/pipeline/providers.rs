//! Provider abstraction (spec §6): the mail and calendar RPC surfaces the
//! core consumes, expressed as injectable `async_trait`s so C6/C7 are
//! testable against hand-written fakes (SPEC_FULL.md §6, "I/O is injected
//! so the core is testable deterministically").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::mime::MimePart;

/// One message id surfaced by a history delta or a query-fallback listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

/// Result of a mail history fetch (spec §6 "mail history API").
#[derive(Debug, Clone)]
pub struct HistoryDelta {
    pub messages_added: Vec<MessageId>,
    /// The history id to resume from on the next call. Absent when the
    /// provider returned nothing new and the caller should keep its own.
    pub next_history_id: Option<String>,
}

/// A fully fetched mail message (spec §4.6 step 1).
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub size_estimate: u64,
    pub labels: Vec<String>,
    pub snippet: String,
    /// Header list as returned by the provider, original casing.
    pub headers: Vec<(String, String)>,
    pub payload: MimePart,
}

/// Response to `watch` registration (spec §6 "Mail watch").
#[derive(Debug, Clone)]
pub struct WatchRegistration {
    pub watch_id: String,
    pub expiration: DateTime<Utc>,
}

/// Response to calendar channel registration (spec §6 "Calendar watch").
#[derive(Debug, Clone)]
pub struct ChannelRegistration {
    pub channel_id: String,
    pub resource_id: String,
    pub expiration: DateTime<Utc>,
}

/// Injectable mail provider collaborator abstracting a caregiver's
/// authenticated mail client handle (spec §1 "an authenticated mail/calendar
/// client handle").
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Given a stored `historyId`, returns added messages plus the next
    /// cursor. A `ProviderInvalidCursor` error signals a 410/404 the caller
    /// must recover from by falling back to `list_recent`.
    async fn history(&self, start_history_id: &str) -> Result<HistoryDelta, IngestError>;

    /// Query-based fallback listing (spec §6: `maxResults=20`, OR-query over
    /// `appointment|medication|bill`) used when `history` is empty/absent or
    /// its cursor is invalid.
    async fn list_recent(&self, max_results: u32) -> Result<Vec<MessageId>, IngestError>;

    async fn fetch_message(&self, id: &MessageId) -> Result<MailMessage, IngestError>;

    async fn register_watch(&self) -> Result<WatchRegistration, IngestError>;
}

/// One calendar event as returned by `events.list` (spec §4.7).
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub id: String,
    pub ical_uid: Option<String>,
    pub status: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    pub description: Option<String>,
}

impl CalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.status.as_str(), "cancelled" | "canceled")
    }

    /// The idempotency key C7 tombstones/upserts by (spec §4.7: `iCalUID ??
    /// id`).
    pub fn external_id(&self) -> &str {
        self.ical_uid.as_deref().unwrap_or(&self.id)
    }
}

/// One page of `events.list`, including the next sync token (spec §4.7).
#[derive(Debug, Clone)]
pub struct CalendarEventsPage {
    pub events: Vec<CalendarEvent>,
    pub next_sync_token: String,
}

/// Injectable calendar provider collaborator.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// `events.list(syncToken, showDeleted=true, singleEvents=true,
    /// orderBy=updated, maxResults=20)`. A `ProviderInvalidCursor` error
    /// signals 410/404; the caller re-issues with `sync_token = None`.
    async fn list_events(&self, sync_token: Option<&str>) -> Result<CalendarEventsPage, IngestError>;

    async fn register_channel(&self) -> Result<ChannelRegistration, IngestError>;
}

#[async_trait]
impl MailProvider for std::sync::Arc<dyn MailProvider> {
    async fn history(&self, start_history_id: &str) -> Result<HistoryDelta, IngestError> {
        (**self).history(start_history_id).await
    }

    async fn list_recent(&self, max_results: u32) -> Result<Vec<MessageId>, IngestError> {
        (**self).list_recent(max_results).await
    }

    async fn fetch_message(&self, id: &MessageId) -> Result<MailMessage, IngestError> {
        (**self).fetch_message(id).await
    }

    async fn register_watch(&self) -> Result<WatchRegistration, IngestError> {
        (**self).register_watch().await
    }
}

#[async_trait]
impl CalendarProvider for std::sync::Arc<dyn CalendarProvider> {
    async fn list_events(&self, sync_token: Option<&str>) -> Result<CalendarEventsPage, IngestError> {
        (**self).list_events(sync_token).await
    }

    async fn register_channel(&self) -> Result<ChannelRegistration, IngestError> {
        (**self).register_channel().await
    }
}

/// Pub/Sub push payload shape (spec §6 "body may contain a base64-encoded
/// `{emailAddress}` payload").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushMessagePayload {
    pub email_address: Option<String>,
    pub history_id: Option<String>,
}
