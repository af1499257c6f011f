use worker_common::ReportableError;

/// Why a request's auth envelope was rejected.
///
/// Every variant is surfaced to the HTTP caller identically (a bare `401`, per
/// the engine's error-handling policy) -- the distinction exists for logging
/// and for tests asserting *why* a request was rejected, not for response
/// shape.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no public key available, worker is running fail-closed")]
    PublicKeyUnavailable,
    #[error("reqnum {reqnum} is older than the replay window floor {floor}")]
    StaleRequest { reqnum: i64, floor: i64 },
    #[error("reqnum {0} resubmitted an already-accepted message")]
    Replay(i64),
    #[error("signature did not verify")]
    BadSignature,
}

impl ReportableError for AuthError {
    fn error_backtrace(&self) -> String {
        String::new()
    }

    // Auth rejections are routine (replay probes, stale clients) and not worth
    // paging on; they're logged at debug level by the caller instead.
    fn is_reportable(&self) -> bool {
        false
    }

    fn metric_label(&self) -> Option<String> {
        Some(
            match self {
                AuthError::PublicKeyUnavailable => "auth.error.no_public_key",
                AuthError::StaleRequest { .. } => "auth.error.stale_reqnum",
                AuthError::Replay(_) => "auth.error.replay",
                AuthError::BadSignature => "auth.error.bad_signature",
            }
            .to_owned(),
        )
    }
}
