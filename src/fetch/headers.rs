//! HTTP date handling, conditional request headers and validator extraction.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use reqwest::header::{
    AsHeaderName, HeaderMap, HeaderValue, CACHE_CONTROL, ETAG, EXPIRES, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, LAST_MODIFIED,
};

use crate::cache::Validators;

const RFC1123: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC850: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Non-standard relative expiry header, in seconds.
const MAX_AGE: &str = "max-age";

/// Format a timestamp as an RFC 1123 HTTP date.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(RFC1123).to_string()
}

/// Parse any of the three HTTP date formats.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    [RFC1123, RFC850, ASCTIME]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Validator headers for a conditional request. The entity tag wins over
/// the last-modified date; at most one header is produced.
pub fn conditional_headers(validators: &Validators) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(etag) = &validators.etag {
        if let Ok(value) = HeaderValue::from_str(etag) {
            headers.insert(IF_NONE_MATCH, value);
            return headers;
        }
    }
    if let Some(modified) = validators.last_modified {
        if let Ok(value) = HeaderValue::from_str(&format_http_date(modified)) {
            headers.insert(IF_MODIFIED_SINCE, value);
        }
    }
    headers
}

/// Extract validators from response headers, relative to `now`.
///
/// Expiry precedence: the `max-age` header, then `Cache-Control: max-age`,
/// then `Expires`.
pub fn validators_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Validators {
    let etag = header_str(headers, ETAG).map(str::to_string);
    let last_modified = header_str(headers, LAST_MODIFIED).and_then(parse_http_date);

    let expires_at = header_str(headers, MAX_AGE)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| expiry_after(now, secs))
        .or_else(|| {
            header_str(headers, CACHE_CONTROL)
                .and_then(cache_control_max_age)
                .and_then(|secs| expiry_after(now, secs))
        })
        .or_else(|| header_str(headers, EXPIRES).and_then(parse_http_date));

    Validators {
        etag,
        last_modified,
        expires_at,
    }
}

/// `now + secs`, or `None` for negative or unrepresentable ages.
fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    if secs < 0 {
        return None;
    }
    Duration::try_seconds(secs).and_then(|age| now.checked_add_signed(age))
}

fn header_str(headers: &HeaderMap, name: impl AsHeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn cache_control_max_age(value: &str) -> Option<i64> {
    value.split(',').find_map(|directive| {
        let (key, secs) = directive.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("max-age")
            .then(|| secs.trim().trim_matches('"').parse().ok())
            .flatten()
    })
}
