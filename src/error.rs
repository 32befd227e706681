//! Crate-wide error enum (spec §7): one `thiserror` enum covering the error
//! kinds C6/C7/C9 propagate, mirroring the teacher's one-enum-per-subsystem
//! idiom (`StructuringError`, `db::DatabaseError`) collapsed into a single
//! enum since every pipeline call chain here shares the same error surface.

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Unrecoverable auth failure (`invalid_grant` or similar). Caller must
    /// set `Source.status = errored` and stop processing this source until
    /// re-authentication (spec §7).
    #[error("provider auth revoked: {0}")]
    ProviderAuthRevoked(String),

    /// 5xx/network failure on a provider call. Other messages in the batch
    /// continue; the batch's cursor is not advanced (spec §7).
    #[error("transient provider error: {0}")]
    ProviderTransient(String),

    /// 410/404 on a history or calendar list call (spec §7).
    #[error("invalid sync cursor: {0}")]
    ProviderInvalidCursor(String),

    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("classifier returned a malformed response: {0}")]
    ClassifierMalformedResponse(String),

    #[error("message too large ({size_bytes} bytes)")]
    MessageTooLarge { size_bytes: u64 },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("storage conflict: {0}")]
    StorageConflict(String),

    #[error("sync run cancelled")]
    Cancelled,

    /// Caller-facing precondition failure: disconnected source, auth-revoked
    /// source, or a manual sync requested by a non-owner caregiver (spec
    /// §4.9, §7 "manual sync requests return a precondition error").
    #[error("precondition failed: {0}")]
    FailedPrecondition(String),

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// True for `ProviderAuthRevoked` detected from a message substring
    /// rather than a typed provider error (spec §7, §4.9).
    pub fn looks_like_auth_revoked(message: &str) -> bool {
        message.contains("invalid_grant")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_invalid_grant_substring() {
        assert!(IngestError::looks_like_auth_revoked("Error: invalid_grant: token expired"));
        assert!(!IngestError::looks_like_auth_revoked("timeout"));
    }
}
