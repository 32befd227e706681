use std::env;
use std::time::Duration;

/// Tunables spec.md leaves as named constants or "recommended" values
/// (SPEC_FULL.md §9 "Configuration"). Same constant-plus-override shape as
/// the teacher's `config.rs`, adapted for a service component: values load
/// from environment variables instead of a fixed on-disk profile directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ignore-count threshold at which a sender domain is auto-suppressed
    /// (spec §3, §4.10). Default 3.
    pub suppress_threshold: u32,
    /// Per-provider-RPC timeout (spec §5 "recommended per-RPC timeout ≤30s").
    pub provider_rpc_timeout: Duration,
    /// Per-classifier-call timeout (spec §5 "per-classifier-call ≤15s").
    pub classifier_timeout: Duration,
    /// Webhook-triggered sync debounce delay (spec §5, §9: 100ms).
    pub webhook_debounce: Duration,
    /// Watch/channel renewal ticker period (spec §4.8: ≈1 hour).
    pub renewal_ticker_period: Duration,
    /// Stale-source poll ticker period (spec §4.8: ≈5 minutes).
    pub poll_ticker_period: Duration,
    /// A source is "stale" once `lastSyncAt` is older than this (spec §4.8: 6 minutes).
    pub stale_after: chrono::Duration,
    /// Watches due for renewal once `watchExpiration` falls within this
    /// lookahead of now (spec §4.8: 24 hours).
    pub renewal_lookahead: chrono::Duration,
    /// Base URL of the LLM classifier endpoint (spec §4.4).
    pub classifier_base_url: String,
    /// Model name passed to the classifier request.
    pub classifier_model: String,
    /// Shared secret used to verify a push channel's HMAC token (spec §6).
    pub webhook_hmac_secret: String,
    /// Expected `aud` claim on a Google-issued pub/sub JWT (spec §6).
    pub webhook_jwt_audience: String,
    /// Maximum message size the mail pipeline will fetch+process (spec §4.6: 200,000 bytes).
    pub max_message_size_bytes: u64,
    /// Maximum messages fetched per history window / query fallback (spec §6: 20).
    pub max_messages_per_batch: u32,
}

impl Config {
    /// Load from environment variables, falling back to spec-recommended
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            suppress_threshold: env_u32("CARESYNC_SUPPRESS_THRESHOLD", 3),
            provider_rpc_timeout: Duration::from_secs(env_u64("CARESYNC_PROVIDER_RPC_TIMEOUT_SECS", 30)),
            classifier_timeout: Duration::from_secs(env_u64("CARESYNC_CLASSIFIER_TIMEOUT_SECS", 15)),
            webhook_debounce: Duration::from_millis(env_u64("CARESYNC_WEBHOOK_DEBOUNCE_MS", 100)),
            renewal_ticker_period: Duration::from_secs(env_u64("CARESYNC_RENEWAL_TICKER_SECS", 3600)),
            poll_ticker_period: Duration::from_secs(env_u64("CARESYNC_POLL_TICKER_SECS", 300)),
            stale_after: chrono::Duration::minutes(env_i64("CARESYNC_STALE_AFTER_MINUTES", 6)),
            renewal_lookahead: chrono::Duration::hours(env_i64("CARESYNC_RENEWAL_LOOKAHEAD_HOURS", 24)),
            classifier_base_url: env::var("CARESYNC_CLASSIFIER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            classifier_model: env::var("CARESYNC_CLASSIFIER_MODEL").unwrap_or_else(|_| "care-classifier".to_string()),
            webhook_hmac_secret: env::var("CARESYNC_WEBHOOK_HMAC_SECRET").unwrap_or_default(),
            webhook_jwt_audience: env::var("CARESYNC_WEBHOOK_JWT_AUDIENCE").unwrap_or_default(),
            max_message_size_bytes: env_u64("CARESYNC_MAX_MESSAGE_SIZE_BYTES", 200_000),
            max_messages_per_batch: env_u32("CARESYNC_MAX_MESSAGES_PER_BATCH", 20),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Default `tracing_subscriber` filter, following the teacher's
/// `default_log_filter` shape.
pub fn default_log_filter() -> &'static str {
    "caresync_core=info,warn"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recommendations() {
        let config = Config::from_env();
        assert_eq!(config.suppress_threshold, 3);
        assert_eq!(config.provider_rpc_timeout, Duration::from_secs(30));
        assert_eq!(config.classifier_timeout, Duration::from_secs(15));
        assert_eq!(config.webhook_debounce, Duration::from_millis(100));
        assert_eq!(config.max_message_size_bytes, 200_000);
        assert_eq!(config.max_messages_per_batch, 20);
    }

    #[test]
    fn env_override_parses() {
        env::set_var("CARESYNC_SUPPRESS_THRESHOLD", "5");
        let config = Config::from_env();
        assert_eq!(config.suppress_threshold, 5);
        env::remove_var("CARESYNC_SUPPRESS_THRESHOLD");
    }
}
