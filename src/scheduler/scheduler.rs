//! Sync scheduler (C9, spec §4.9): wires the per-source lock and debouncer
//! around C6/C7, dispatching push, ticker, and manual sync triggers.
//!
//! Follows the same injected-collaborator shape as `pipeline::mail` and
//! `pipeline::calendar`, generalized with a `ProviderFactory` so the scheduler can build a
//! fresh `MailProvider`/`CalendarProvider` per source without being generic
//! over a single provider type (a caregiver's sources may each hold distinct
//! credentials).

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::classifier::LlmClassifier;
use crate::config::Config;
use crate::db::repository::source::{
    get_source, get_source_by_account_email_any, get_source_by_calendar_channel_id, get_source_by_watch_id,
    list_sources_needing_renewal, list_stale_sources, touch_last_push, update_sync_state,
};
use crate::db::repository::task::list_ignored_external_ids;
use crate::error::IngestError;
use crate::models::{Source, SourceProvider, SourceStatus, SyncReason};
use crate::pipeline::calendar::CalendarPipeline;
use crate::pipeline::mail::{MailPipeline, MessageContext};
use crate::pipeline::providers::{CalendarProvider, MailProvider, MessageId};
use crate::pipeline::upsert::{finish_calendar_batch, finish_mail_batch, BatchCounts};
use crate::suppression::{is_sender_suppressed, learn_from_batch};

use super::debounce::Debouncer;
use super::lock::SourceLock;

/// Builds provider handles for a given source's stored credentials. One
/// implementation per real provider surface (Google today); tests supply a
/// fake.
pub trait ProviderFactory: Send + Sync {
    fn mail_provider(&self, source: &Source) -> Arc<dyn MailProvider>;
    fn calendar_provider(&self, source: &Source) -> Arc<dyn CalendarProvider>;
}

/// Owns the shared connection, collaborators, and the per-source
/// lock/debouncer (spec §5 "the source row is the only shared mutable
/// state").
pub struct Scheduler<F: ProviderFactory> {
    db: Arc<StdMutex<Connection>>,
    providers: F,
    classifier: Arc<dyn LlmClassifier>,
    config: Config,
    lock: SourceLock,
    debouncer: Debouncer,
    cancel_tx: tokio::sync::watch::Sender<bool>,
    cancel_rx: tokio::sync::watch::Receiver<bool>,
}

impl<F: ProviderFactory + Clone + 'static> Scheduler<F> {
    pub fn new(db: Arc<StdMutex<Connection>>, providers: F, classifier: Arc<dyn LlmClassifier>, config: Config) -> Self {
        let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
        Self {
            db,
            providers,
            classifier,
            config,
            lock: SourceLock::new(),
            debouncer: Debouncer::new(),
            cancel_tx,
            cancel_rx,
        }
    }

    /// Trip the cancellation signal observed by every in-flight and future
    /// sync run (spec §5: "every sync run accepts a cancellation signal
    /// propagated to all I/O"). A run already past its last check finishes
    /// and persists normally; one still in its per-message/per-event loop
    /// aborts at the next check without writing partial results.
    pub fn shutdown(&self) {
        let _ = self.cancel_tx.send(true);
    }

    fn check_cancelled(&self) -> Result<(), IngestError> {
        if *self.cancel_rx.borrow() {
            return Err(IngestError::Cancelled);
        }
        Ok(())
    }

    fn load_source(&self, source_id: Uuid) -> Result<Source, IngestError> {
        let conn = self.db.lock().unwrap();
        get_source(&conn, &source_id)?.ok_or_else(|| IngestError::FailedPrecondition(format!("unknown source {source_id}")))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identify a source by its Google account email (spec §6, §4.9:
    /// "identifies the source by account-email").
    pub fn find_source_by_account_email(&self, account_email: &str) -> Result<Option<Source>, IngestError> {
        let conn = self.db.lock().unwrap();
        Ok(get_source_by_account_email_any(&conn, SourceProvider::Google, account_email)?)
    }

    /// Identify a source by its mail watch id or calendar channel id (spec
    /// §6, §4.9: "by watch/channel id (push-subscription header)").
    pub fn find_source_by_channel_id(&self, channel_id: &str) -> Result<Option<Source>, IngestError> {
        let conn = self.db.lock().unwrap();
        if let Some(source) = get_source_by_watch_id(&conn, channel_id)? {
            return Ok(Some(source));
        }
        Ok(get_source_by_calendar_channel_id(&conn, channel_id)?)
    }

    /// Checks common to every trigger path (spec §4.9): only `isPrimary`
    /// sources write tasks; `disconnected` sources fail fast.
    fn check_eligible(source: &Source) -> Result<(), IngestError> {
        if source.status == SourceStatus::Disconnected {
            return Err(IngestError::FailedPrecondition(format!("source {} is disconnected", source.id)));
        }
        Ok(())
    }

    fn mark_errored_if_auth_revoked(&self, source: &mut Source, message: &str) -> Result<(), IngestError> {
        if IngestError::looks_like_auth_revoked(message) {
            source.status = SourceStatus::Errored;
            source.error_message = Some(message.to_string());
            let conn = self.db.lock().unwrap();
            update_sync_state(&conn, source)?;
        }
        Ok(())
    }

    /// Run one mail sync for `source_id` under the source lock (C6 + C11).
    /// Per spec §7, the stored `historyId` only advances when the batch had
    /// zero per-message errors.
    pub async fn sync_mail(&self, source_id: Uuid, reason: SyncReason) -> Result<BatchCounts, IngestError> {
        self.check_cancelled()?;
        let started_at = Utc::now();
        let mut source = self.load_source(source_id)?;
        Self::check_eligible(&source)?;
        if !source.may_write_tasks() {
            return Ok(BatchCounts::default());
        }

        let provider = self.providers.mail_provider(&source);
        let classifier = self.classifier.clone();
        let pipeline = MailPipeline::new(provider.clone(), classifier);

        // History absent or empty falls back to the query-based listing
        // (spec §6); a 410/404 cursor discards the stored historyId and does
        // the same. `next_history_id` stays at the old value unless the
        // provider actually advanced it, so a temporarily-empty delta
        // doesn't lose the cursor.
        let (ids, next_history_id) = match &source.history_id {
            Some(history_id) => match provider.history(history_id).await {
                Ok(delta) if !delta.messages_added.is_empty() => {
                    (delta.messages_added, delta.next_history_id.or_else(|| source.history_id.clone()))
                }
                Ok(delta) => {
                    let ids = provider.list_recent(self.config.max_messages_per_batch).await?;
                    (ids, delta.next_history_id.or_else(|| source.history_id.clone()))
                }
                Err(IngestError::ProviderInvalidCursor(_)) => {
                    let ids = provider.list_recent(self.config.max_messages_per_batch).await?;
                    (ids, None)
                }
                Err(IngestError::ProviderAuthRevoked(msg)) => {
                    self.mark_errored_if_auth_revoked(&mut source, &msg)?;
                    return Err(IngestError::ProviderAuthRevoked(msg));
                }
                Err(other) => return Err(other),
            },
            None => {
                let ids = provider.list_recent(self.config.max_messages_per_batch).await?;
                (ids, None)
            }
        };

        let ignored_external_ids = {
            let conn = self.db.lock().unwrap();
            Arc::new(list_ignored_external_ids(&conn, &source.caregiver_id)?)
        };

        let mut results = Vec::with_capacity(ids.len());
        let mut any_error = false;
        let now = Utc::now();
        for id in &ids {
            // Leave persisted state fully unchanged on cancellation (spec §5):
            // bail before this message's results join the batch, rather than
            // persist a partially-processed one.
            self.check_cancelled()?;
            match self
                .process_one_message(&pipeline, provider.as_ref(), id, &source, &ignored_external_ids, now)
                .await
            {
                Ok(result) => results.push(result),
                Err(err) => {
                    any_error = true;
                    tracing::warn!(source_id = %source_id, message_id = %id.0, error = %err, "message fetch/process failed");
                }
            }
        }
        self.check_cancelled()?;

        let history_id_to_persist = if any_error { source.history_id.clone() } else { next_history_id };

        let counts = {
            let conn = self.db.lock().unwrap();
            let counts = finish_mail_batch(&conn, source_id, &results, history_id_to_persist.clone(), reason, started_at, now)?;
            learn_from_batch(&conn, &source.caregiver_id, source.provider, &results, self.config.suppress_threshold, now)?;
            counts
        };

        source.history_id = history_id_to_persist;
        source.last_sync_at = Some(now);
        let conn = self.db.lock().unwrap();
        update_sync_state(&conn, &source)?;

        Ok(counts)
    }

    /// Builds the real per-message context (spec §4.6 steps 4-5) before
    /// handing the message to C6: the caregiver's ignored-external-id set
    /// (looked up once per batch by the caller) and whether this message's
    /// sender domain is currently suppressed (looked up per message, since
    /// it depends on the message's own `From` header).
    async fn process_one_message(
        &self,
        pipeline: &MailPipeline<Arc<dyn MailProvider>, Arc<dyn LlmClassifier>>,
        provider: &(dyn MailProvider),
        id: &MessageId,
        source: &Source,
        ignored_external_ids: &Arc<std::collections::HashSet<String>>,
        now: chrono::DateTime<Utc>,
    ) -> Result<crate::pipeline::mail::MessageResult, IngestError> {
        let message = provider.fetch_message(id).await?;
        let sender_domain_suppressed = match crate::pipeline::mail::sender_domain(&message) {
            Some(domain) => {
                let conn = self.db.lock().unwrap();
                is_sender_suppressed(&conn, &source.caregiver_id, source.provider, &domain)?
            }
            None => false,
        };
        let context = MessageContext {
            ignored_external_ids: ignored_external_ids.clone(),
            sender_domain_suppressed,
        };
        Ok(pipeline
            .process_message(&message, source.caregiver_id, source.care_recipient_id, source.id, &context, now)
            .await)
    }

    /// Run one calendar sync for `source_id` under the source lock (C7 +
    /// C11).
    pub async fn sync_calendar(&self, source_id: Uuid, reason: SyncReason) -> Result<BatchCounts, IngestError> {
        self.check_cancelled()?;
        let started_at = Utc::now();
        let mut source = self.load_source(source_id)?;
        Self::check_eligible(&source)?;
        if !source.may_write_tasks() {
            return Ok(BatchCounts::default());
        }

        let provider = self.providers.calendar_provider(&source);
        let pipeline = CalendarPipeline::new(provider);
        let run = pipeline
            .run(source.calendar_sync_token.as_deref(), source.caregiver_id, source.care_recipient_id, source_id)
            .await?;
        self.check_cancelled()?;

        let now = Utc::now();
        let counts = {
            let conn = self.db.lock().unwrap();
            finish_calendar_batch(&conn, source.caregiver_id, source_id, &run.results, run.next_sync_token.as_deref(), reason, started_at, now)?
        };

        source.calendar_sync_token = run.next_sync_token;
        source.last_sync_at = Some(now);
        let conn = self.db.lock().unwrap();
        update_sync_state(&conn, &source)?;

        Ok(counts)
    }

    /// Entry point for §4.9's push/ticker triggers: serialize on the source
    /// lock, then dispatch to C6 or C7.
    pub async fn run_locked(&self, source_id: Uuid, to_calendar: bool, reason: SyncReason) -> Result<BatchCounts, IngestError> {
        if to_calendar {
            self.lock.with_source_lock(source_id, || self.sync_calendar(source_id, reason)).await
        } else {
            self.lock.with_source_lock(source_id, || self.sync_mail(source_id, reason)).await
        }
    }

    /// Manual sync request from an authenticated caregiver (spec §4.9:
    /// "identical path to push triggers but reason=manual").
    pub async fn manual_sync(&self, caller_caregiver_id: Uuid, source_id: Uuid, to_calendar: bool) -> Result<BatchCounts, IngestError> {
        let source = self.load_source(source_id)?;
        if source.caregiver_id != caller_caregiver_id {
            return Err(IngestError::FailedPrecondition("caller does not own this source".into()));
        }
        Self::check_eligible(&source)?;
        self.run_locked(source_id, to_calendar, SyncReason::Manual).await
    }

    /// Webhook-triggered sync: debounced per source id by `config.webhook_debounce`
    /// (spec §4.9, §5: "webhook-triggered syncs are debounced with a 100 ms
    /// delay").
    pub fn trigger_push(self: &Arc<Self>, source_id: Uuid, to_calendar: bool) {
        let scheduler = self.clone();
        self.debouncer.debounce_run(source_id.to_string(), self.config.webhook_debounce, move || async move {
            scheduler.run_locked(source_id, to_calendar, SyncReason::Push).await.map(|_| ())
        });
    }

    /// One tick of the ≈1 hour renewal ticker (spec §4.8): re-register watch
    /// + calendar channel for sources whose `watchExpiration` is within the
    /// configured lookahead. Failures are logged, never propagated — a
    /// single source's failure must not block the rest of the tick.
    pub async fn renewal_tick(&self) {
        let due = {
            let conn = self.db.lock().unwrap();
            list_sources_needing_renewal(&conn, self.config.renewal_lookahead, Utc::now())
        };
        let due = match due {
            Ok(sources) => sources,
            Err(err) => {
                tracing::error!(error = %err, "failed to list sources needing renewal");
                return;
            }
        };
        for source in due {
            if let Err(err) = self.renew_one(&source).await {
                tracing::warn!(source_id = %source.id, error = %err, "watch renewal failed");
            }
        }
    }

    async fn renew_one(&self, source: &Source) -> Result<(), IngestError> {
        let mail_provider = self.providers.mail_provider(source);
        let calendar_provider = self.providers.calendar_provider(source);
        let watch = mail_provider.register_watch().await?;
        let channel = calendar_provider.register_channel().await?;

        let mut updated = source.clone();
        updated.watch_id = Some(watch.watch_id);
        updated.watch_expiration = Some(watch.expiration);
        updated.calendar_channel_id = Some(channel.channel_id);
        updated.calendar_resource_id = Some(channel.resource_id);

        let conn = self.db.lock().unwrap();
        update_sync_state(&conn, &updated)?;
        Ok(())
    }

    /// One tick of the ≈5 minute poll ticker (spec §4.8): sync any source
    /// whose `lastSyncAt` is stale or whose watch has expired.
    pub async fn poll_tick(self: &Arc<Self>) {
        let stale = {
            let conn = self.db.lock().unwrap();
            list_stale_sources(&conn, self.config.stale_after, Utc::now())
        };
        let stale = match stale {
            Ok(sources) => sources,
            Err(err) => {
                tracing::error!(error = %err, "failed to list stale sources");
                return;
            }
        };
        for source in stale {
            if let Err(err) = self.run_locked(source.id, false, SyncReason::Poll).await {
                tracing::warn!(source_id = %source.id, error = %err, "poll mail sync failed");
            }
            if let Err(err) = self.run_locked(source.id, true, SyncReason::Poll).await {
                tracing::warn!(source_id = %source.id, error = %err, "poll calendar sync failed");
            }
        }
    }

    /// Spawn the renewal and poll tickers as background tasks (spec §4.8:
    /// "neither may block subsequent ticks"). Each ticker runs on its own
    /// interval so a slow tick never delays the other.
    pub fn spawn_tickers(self: &Arc<Self>) {
        let renewal = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(renewal.config.renewal_ticker_period);
            loop {
                interval.tick().await;
                renewal.renewal_tick().await;
            }
        });

        let poll = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll.config.poll_ticker_period);
            loop {
                interval.tick().await;
                poll.poll_tick().await;
            }
        });
    }

    /// Record that a push notification arrived for this source, independent
    /// of whether it results in a sync (spec §5: "ticker-owned... may
    /// proceed outside the lock").
    pub fn touch_push(&self, source_id: Uuid) {
        let conn = self.db.lock().unwrap();
        if let Err(err) = touch_last_push(&conn, &source_id, Utc::now()) {
            tracing::warn!(source_id = %source_id, error = %err, "failed to record push timestamp");
        }
    }
}
