use fm_domain::error::Error;

/// Map a reqwest error onto the shared error taxonomy.
///
/// Connect failures and timeouts are upstream availability problems; the
/// turn terminates without retrying (the caller decides what the client
/// sees).
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_connect() {
        Error::Unavailable(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Map an unsuccessful HTTP status + body onto the shared error taxonomy.
pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Error {
    if status.as_u16() == 429 {
        Error::RateLimited(format!("upstream returned 429: {body}"))
    } else if status.is_server_error() {
        Error::Unavailable(format!("upstream returned {status}: {body}"))
    } else {
        Error::Http(format!("upstream returned {status}: {body}"))
    }
}
