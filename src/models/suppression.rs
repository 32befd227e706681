use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SourceProvider;

/// Per-domain ignore learning, keyed `(caregiverId, provider, senderDomain)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderSuppression {
    pub caregiver_id: Uuid,
    pub provider: SourceProvider,
    pub sender_domain: String,
    pub ignore_count: u32,
    pub suppressed: bool,
    pub last_ignored_at: Option<DateTime<Utc>>,
}

impl SenderSuppression {
    pub fn new(caregiver_id: Uuid, provider: SourceProvider, sender_domain: String) -> Self {
        Self {
            caregiver_id,
            provider,
            sender_domain,
            ignore_count: 0,
            suppressed: false,
            last_ignored_at: None,
        }
    }

    /// Increment the ignore counter and promote to `suppressed` at threshold
    /// (C10). Returns whether this call caused the promotion.
    pub fn record_ignore(&mut self, threshold: u32, now: DateTime<Utc>) -> bool {
        self.ignore_count += 1;
        self.last_ignored_at = Some(now);
        let promoted = !self.suppressed && self.ignore_count >= threshold;
        if promoted {
            self.suppressed = true;
        }
        promoted
    }
}
