//! Structured session audit events.
//!
//! Events are emitted via `tracing::info!` on the `audit` target as one
//! JSON object per line, so they survive the JSON formatter used in Lambda
//! and can be filtered with `RUST_LOG=audit=info`. Never panics.

use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

// Activity IDs
pub const ACTIVITY_ISSUED: u32 = 1;
pub const ACTIVITY_RESTORED: u32 = 2;
pub const ACTIVITY_EXTENDED: u32 = 3;
pub const ACTIVITY_REJECTED: u32 = 4; // cookie presented but not restorable
pub const ACTIVITY_INVALIDATED: u32 = 5; // tamper detected

// Status IDs
pub const STATUS_SUCCESS: u32 = 1;
pub const STATUS_FAILURE: u32 = 2;

// Severity IDs
pub const SEVERITY_INFORMATIONAL: u32 = 1;
pub const SEVERITY_LOW: u32 = 2;
pub const SEVERITY_MEDIUM: u32 = 3;
pub const SEVERITY_HIGH: u32 = 4;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn activity_name(id: u32) -> &'static str {
    match id {
        ACTIVITY_ISSUED => "Issued",
        ACTIVITY_RESTORED => "Restored",
        ACTIVITY_EXTENDED => "Extended",
        ACTIVITY_REJECTED => "Rejected",
        ACTIVITY_INVALIDATED => "Invalidated",
        _ => "Other",
    }
}

fn severity_name(id: u32) -> &'static str {
    match id {
        SEVERITY_INFORMATIONAL => "Informational",
        SEVERITY_LOW => "Low",
        SEVERITY_MEDIUM => "Medium",
        SEVERITY_HIGH => "High",
        _ => "Unknown",
    }
}

fn status_name(id: u32) -> &'static str {
    match id {
        STATUS_SUCCESS => "Success",
        _ => "Failure",
    }
}

/// Build the event body. Split out so tests can inspect it.
fn session_event_body(
    activity_id: u32,
    status_id: u32,
    severity_id: u32,
    session_id: Option<&str>,
    message: &str,
) -> serde_json::Value {
    let mut event = json!({
        "class_name": "Session",
        "activity_id": activity_id,
        "activity_name": activity_name(activity_id),
        "severity_id": severity_id,
        "severity": severity_name(severity_id),
        "status_id": status_id,
        "status": status_name(status_id),
        "time": now_millis(),
        "metadata": {
            "product": {
                "name": "sitekit",
                "version": env!("CARGO_PKG_VERSION"),
            }
        },
        "message": message,
    });

    if let Some(id) = session_id {
        event["session"] = json!({ "uid": id });
    }

    event
}

/// Emit a session lifecycle event.
pub fn session_event(
    activity_id: u32,
    status_id: u32,
    severity_id: u32,
    session_id: Option<&str>,
    message: &str,
) {
    let event = session_event_body(activity_id, status_id, severity_id, session_id, message);
    if let Ok(json) = serde_json::to_string(&event) {
        tracing::info!(target: "audit", "{}", json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_body_with_session() {
        let event = session_event_body(
            ACTIVITY_INVALIDATED,
            STATUS_FAILURE,
            SEVERITY_HIGH,
            Some("abc"),
            "cookie does not match stored session",
        );
        assert_eq!(event["activity_name"], "Invalidated");
        assert_eq!(event["status"], "Failure");
        assert_eq!(event["severity"], "High");
        assert_eq!(event["session"]["uid"], "abc");
        assert_eq!(event["metadata"]["product"]["name"], "sitekit");
    }

    #[test]
    fn test_event_body_without_session() {
        let event = session_event_body(
            ACTIVITY_ISSUED,
            STATUS_SUCCESS,
            SEVERITY_INFORMATIONAL,
            None,
            "issued",
        );
        assert_eq!(event["activity_id"], ACTIVITY_ISSUED);
        assert!(event.get("session").is_none());
    }

    #[test]
    fn test_corrupt_record_rejection_is_medium() {
        let event = session_event_body(
            ACTIVITY_REJECTED,
            STATUS_FAILURE,
            SEVERITY_MEDIUM,
            None,
            "session record is corrupt",
        );
        assert_eq!(event["activity_name"], "Rejected");
        assert_eq!(event["severity"], "Medium");
        assert_eq!(event["severity_id"], SEVERITY_MEDIUM);
    }

    #[test]
    fn test_emit_never_panics() {
        session_event(99, 7, 42, Some(""), "");
    }
}
