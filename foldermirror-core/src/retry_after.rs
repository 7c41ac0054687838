use std::time::{Duration, SystemTime};

/// Parses a `retry-after` header value.
///
/// Accepts both RFC 7231 forms: delay seconds (`120`) and an HTTP-date
/// (`Wed, 21 Oct 2025 07:28:00 GMT`). A date in the past yields zero. Negative
/// or unparseable values yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    let when = httpdate::parse_http_date(value).ok()?;
    Some(
        when.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}
