//! Calendar pipeline (C7, spec §4.7): sync-token-driven event fetch with
//! 410/404 cursor-invalidation recovery.
//!
//! Grounded on the same injected-collaborator shape as `pipeline::mail`.

use uuid::Uuid;

use crate::error::IngestError;
use crate::models::{AppointmentFields, BillFields, MedicationFields, ReviewState, TaskStatus, TaskType, TaskUpsertPayload};

use super::providers::{CalendarEvent, CalendarProvider};

/// One calendar event's outcome, mirroring the mail pipeline's
/// `MessageResult` shape but with C7's narrower action set (spec §4.7: every
/// event is either a tombstone-by-external-id or an upsert, never skipped).
#[derive(Debug, Clone)]
pub enum CalendarEventResult {
    Tombstone { external_id: String },
    Upsert(Box<TaskUpsertPayload>),
}

/// Result of one calendar sync run (spec §8 boundary: "run reports
/// `resetSyncToken=true`"). `next_sync_token` is `None` only when the cursor
/// was still invalid after the single retry (spec §7: "persist `null` and
/// let the next run do a full seed").
#[derive(Debug, Clone)]
pub struct CalendarSyncRun {
    pub results: Vec<CalendarEventResult>,
    pub next_sync_token: Option<String>,
    pub reset_sync_token: bool,
}

fn event_to_payload(
    event: &CalendarEvent,
    caregiver_id: Uuid,
    care_recipient_id: Uuid,
    source_id: Uuid,
) -> TaskUpsertPayload {
    TaskUpsertPayload {
        caregiver_id,
        care_recipient_id,
        source_id,
        r#type: TaskType::Appointment,
        status: TaskStatus::Scheduled,
        review_state: ReviewState::Approved,
        confidence: 0.9,
        external_id: Some(event.external_id().to_string()),
        source_link: None,
        title: event.description.clone().unwrap_or_default(),
        raw_snippet: None,
        description: event.description.clone(),
        sender_domain: None,
        appointment: AppointmentFields {
            start_at: event.start_at,
            end_at: event.end_at,
            location: event.location.clone(),
            organizer: event.organizer.clone(),
        },
        bill: BillFields::default(),
        medication: MedicationFields::default(),
        ingestion_debug: None,
    }
}

pub struct CalendarPipeline<P: CalendarProvider> {
    provider: P,
}

impl<P: CalendarProvider> CalendarPipeline<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Run one sync cycle against `stored_sync_token` (spec §4.7). On
    /// `ProviderInvalidCursor`, re-issues without a token and reports
    /// `resetSyncToken=true`. If the cursor is still invalid on that retry,
    /// the run still succeeds empty-handed, with `next_sync_token=None` so
    /// the caller persists `null` and the next run does a full seed (spec
    /// §7).
    pub async fn run(
        &self,
        stored_sync_token: Option<&str>,
        caregiver_id: Uuid,
        care_recipient_id: Uuid,
        source_id: Uuid,
    ) -> Result<CalendarSyncRun, IngestError> {
        match self.provider.list_events(stored_sync_token).await {
            Ok(page) => Ok(self.to_run(page, caregiver_id, care_recipient_id, source_id, false)),
            Err(IngestError::ProviderInvalidCursor(_)) => match self.provider.list_events(None).await {
                Ok(page) => Ok(self.to_run(page, caregiver_id, care_recipient_id, source_id, true)),
                Err(IngestError::ProviderInvalidCursor(_)) => Ok(CalendarSyncRun {
                    results: Vec::new(),
                    next_sync_token: None,
                    reset_sync_token: true,
                }),
                Err(other) => Err(other),
            },
            Err(other) => Err(other),
        }
    }

    fn to_run(
        &self,
        page: super::providers::CalendarEventsPage,
        caregiver_id: Uuid,
        care_recipient_id: Uuid,
        source_id: Uuid,
        reset_sync_token: bool,
    ) -> CalendarSyncRun {
        let results = page
            .events
            .iter()
            .map(|event| {
                if event.is_cancelled() {
                    CalendarEventResult::Tombstone {
                        external_id: event.external_id().to_string(),
                    }
                } else {
                    CalendarEventResult::Upsert(Box::new(event_to_payload(
                        event,
                        caregiver_id,
                        care_recipient_id,
                        source_id,
                    )))
                }
            })
            .collect();

        CalendarSyncRun {
            results,
            next_sync_token: Some(page.next_sync_token),
            reset_sync_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::providers::fakes::FakeCalendarProvider;
    use crate::pipeline::providers::CalendarEventsPage;
    use chrono::Utc;

    fn event(id: &str, status: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            ical_uid: Some(format!("ical-{id}")),
            status: status.to_string(),
            start_at: Some(Utc::now()),
            end_at: None,
            location: Some("123 Main St".into()),
            organizer: None,
            description: Some("Checkup".into()),
        }
    }

    #[tokio::test]
    async fn cancelled_event_is_tombstoned() {
        let provider = FakeCalendarProvider::default();
        provider.pages.lock().unwrap().push(Ok(CalendarEventsPage {
            events: vec![event("1", "cancelled")],
            next_sync_token: "tok-2".into(),
        }));
        let pipeline = CalendarPipeline::new(provider);
        let run = pipeline
            .run(Some("tok-1"), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(run.results.len(), 1);
        assert!(matches!(run.results[0], CalendarEventResult::Tombstone { .. }));
        assert!(!run.reset_sync_token);
    }

    #[tokio::test]
    async fn confirmed_event_upserts_as_scheduled_appointment() {
        let provider = FakeCalendarProvider::default();
        provider.pages.lock().unwrap().push(Ok(CalendarEventsPage {
            events: vec![event("1", "confirmed")],
            next_sync_token: "tok-2".into(),
        }));
        let pipeline = CalendarPipeline::new(provider);
        let run = pipeline
            .run(Some("tok-1"), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        match &run.results[0] {
            CalendarEventResult::Upsert(p) => {
                assert_eq!(p.r#type, TaskType::Appointment);
                assert_eq!(p.status, TaskStatus::Scheduled);
                assert_eq!(p.review_state, ReviewState::Approved);
                assert!((p.confidence - 0.9).abs() < 1e-9);
            }
            other => panic!("expected Upsert, got {other:?}"),
        }
    }

    /// Scenario 6 (spec §8): stale token -> 410 -> retry without token ->
    /// one event + fresh token -> `resetSyncToken=true`.
    #[tokio::test]
    async fn scenario_6_cursor_reset_on_410() {
        let provider = FakeCalendarProvider::default();
        {
            let mut pages = provider.pages.lock().unwrap();
            pages.push(Err("410 Gone".into()));
            pages.push(Ok(CalendarEventsPage {
                events: vec![event("1", "confirmed")],
                next_sync_token: "fresh".into(),
            }));
        }
        let pipeline = CalendarPipeline::new(provider);
        let run = pipeline
            .run(Some("stale"), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(run.reset_sync_token);
        assert_eq!(run.next_sync_token.as_deref(), Some("fresh"));
        assert_eq!(run.results.len(), 1);
    }

    /// Spec §7: cursor still invalid after the retry -> empty, successful
    /// run with `next_sync_token=None` so the caller persists `null` and the
    /// next run does a full seed.
    #[tokio::test]
    async fn second_failure_after_reset_resets_token_instead_of_erroring() {
        let provider = FakeCalendarProvider::default();
        {
            let mut pages = provider.pages.lock().unwrap();
            pages.push(Err("410 Gone".into()));
            pages.push(Err("404 not found".into()));
        }
        let pipeline = CalendarPipeline::new(provider);
        let run = pipeline
            .run(Some("stale"), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(run.reset_sync_token);
        assert_eq!(run.next_sync_token, None);
        assert!(run.results.is_empty());
    }
}
