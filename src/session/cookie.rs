//! Session ID cookie.
//!
//! The cookie is the only bearer of session identity, so `Secure`,
//! `HttpOnly` and `SameSite=Strict` are always set. Path and domain come
//! from `SessionOptions`.

use axum::http::HeaderMap;
use axum::http::header;
use chrono::{DateTime, Utc};

use super::COOKIE_NAME;

/// IMF-fixdate, the `Expires` format from RFC 6265.
const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub expires: DateTime<Utc>,
}

impl SessionCookie {
    pub fn new(value: &str, path: &str, domain: Option<&str>, expires: DateTime<Utc>) -> Self {
        Self {
            name: COOKIE_NAME.to_string(),
            value: value.to_string(),
            path: path.to_string(),
            domain: domain.filter(|d| !d.is_empty()).map(String::from),
            expires,
        }
    }

    /// Whether the client is being told to drop the cookie.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![
            format!("{}={}", self.name, self.value),
            format!("Path={}", self.path),
        ];
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={domain}"));
        }
        parts.push(format!("Expires={}", self.expires.format(EXPIRES_FORMAT)));
        parts.push("HttpOnly".into());
        parts.push("Secure".into());
        parts.push("SameSite=Strict".into());
        parts.join("; ")
    }
}

/// Find a cookie value across every `Cookie` header of a request.
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| parse_cookie(h, name))
        .map(String::from)
}

/// Parse a specific cookie from a Cookie header value.
fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let trimmed = part.trim();
        if let Some(value) = trimmed.strip_prefix(name)
            && let Some(value) = value.strip_prefix('=')
        {
            return Some(value.trim_matches('"'));
        }
    }
    None
}
