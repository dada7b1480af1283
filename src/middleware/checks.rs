//! Preliminary request checks, run before routing.
//!
//! In order:
//! 1. `OPTIONS` answers `204` with the `Allow` list.
//! 2. Methods outside the allow-list answer `501`.
//! 3. Hosts listed in `REDIRECT_HOSTS` are sent to `REDIRECT_TO`
//!    (`301`, or `308` for POST so the body is replayed).
//! 4. Requests addressed to the raw CloudFront distribution domain are
//!    rejected with `401`.
//! 5. When `AUTHORIZATION` is set, the request must carry exactly that
//!    `Authorization` header value.

use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;

/// Host as seen by the viewer; set by the CloudFront function in front of
/// the Lambda, since `Host` there is the function URL.
const HEADER_VIEWER_HOST: &str = "viewer-host";
const HEADER_DISTRIBUTION_DOMAIN: &str = "distribution-domain";

#[derive(Debug, Clone)]
pub struct Checks {
    allowed_methods: Vec<String>,
    allow_header: String,
    redirect_to: Option<String>,
    redirect_hosts: Vec<String>,
    authorization: Option<String>,
}

impl Checks {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_methods: config.allowed_methods.clone(),
            allow_header: config.allow_header(),
            redirect_to: config
                .redirect_to
                .as_deref()
                .map(|to| to.trim_start_matches("https://").trim_end_matches('/').to_string()),
            redirect_hosts: config.redirect_hosts.clone(),
            authorization: config.authorization.clone(),
        }
    }

    /// A response that short-circuits the request, or `None` to proceed.
    pub fn evaluate(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Option<Response> {
        if method == Method::OPTIONS {
            return Some(
                (
                    StatusCode::NO_CONTENT,
                    [(header::ALLOW, self.allow_header.clone())],
                )
                    .into_response(),
            );
        }

        if !self
            .allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
        {
            tracing::warn!("method {} is not implemented", method);
            return Some(AppError::NotImplemented(method.to_string()).into_response());
        }

        let host = request_host(headers);

        if let Some(location) = self.redirect_location(host, uri) {
            let status = if method == Method::POST {
                StatusCode::PERMANENT_REDIRECT
            } else {
                StatusCode::MOVED_PERMANENTLY
            };
            tracing::info!("redirecting {} to {}", host, location);
            return Some((status, [(header::LOCATION, location)]).into_response());
        }

        let distribution = header_str(headers, HEADER_DISTRIBUTION_DOMAIN);
        if !distribution.is_empty() && host.eq_ignore_ascii_case(distribution) {
            tracing::error!("request made directly to distribution domain {}", distribution);
            return Some(AppError::Unauthorized.into_response());
        }

        if let Some(expected) = &self.authorization
            && header_str(headers, header::AUTHORIZATION.as_str()) != expected.as_str()
        {
            return Some(AppError::Unauthorized.into_response());
        }

        tracing::debug!("preliminary checks passed");
        None
    }

    fn redirect_location(&self, host: &str, uri: &Uri) -> Option<String> {
        let to = self.redirect_to.as_deref()?;
        if host.is_empty() || host.eq_ignore_ascii_case(to) {
            return None;
        }
        if !self.redirect_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            return None;
        }

        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        Some(format!("https://{to}{path}"))
    }
}

/// Request host: `viewer-host`, falling back to `Host`.
pub fn request_host(headers: &HeaderMap) -> &str {
    match header_str(headers, HEADER_VIEWER_HOST) {
        "" => header_str(headers, header::HOST.as_str()),
        host => host,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

/// Axum middleware function for the preliminary checks.
pub async fn preliminary_checks(checks: Arc<Checks>, req: Request, next: Next) -> Response {
    if let Some(response) = checks.evaluate(req.method(), req.uri(), req.headers()) {
        return response;
    }
    next.run(req).await
}
