/// Shared error type used across all Fathom crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("SQL: {0}")]
    Sql(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short, non-leaking message suitable for the client-facing error frame.
    ///
    /// Internal detail (connection strings, SQL text, upstream bodies) stays
    /// in the logs; the client sees a one-line actionable summary.
    pub fn client_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::RateLimited(_) => "request rate limit exceeded, please retry".into(),
            Error::Unavailable(_) => "the model service is currently unavailable".into(),
            Error::Timeout(_) => "the request timed out, please retry".into(),
            Error::Cancelled => "the request was cancelled".into(),
            _ => "an internal error occurred".into(),
        }
    }

    /// Whether the turn should persist an assistant message of role `error`.
    ///
    /// Validation failures and upstream outages leave no assistant record;
    /// everything else is a turn the user saw fail and belongs in history.
    pub fn persists_error_message(&self) -> bool {
        !matches!(
            self,
            Error::Validation(_) | Error::RateLimited(_) | Error::Unavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_hides_internal_detail() {
        let err = Error::Sql("connection refused: host=warehouse.internal".into());
        assert_eq!(err.client_message(), "an internal error occurred");
    }

    #[test]
    fn rate_limit_message_is_actionable() {
        let err = Error::RateLimited("429 from upstream".into());
        assert_eq!(
            err.client_message(),
            "request rate limit exceeded, please retry"
        );
    }

    #[test]
    fn validation_message_passes_through() {
        let err = Error::Validation("query must not be empty".into());
        assert_eq!(err.client_message(), "query must not be empty");
    }

    #[test]
    fn upstream_errors_do_not_persist() {
        assert!(!Error::Unavailable("x".into()).persists_error_message());
        assert!(!Error::RateLimited("x".into()).persists_error_message());
        assert!(!Error::Validation("x".into()).persists_error_message());
        assert!(Error::Internal("x".into()).persists_error_message());
    }
}
