use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;

pub type HandlerFn = fn(&mut AppState, &Request) -> Result<serde_json::Value, HandlerErr>;

/// Runs a fallible handler and wraps its outcome in the response envelope.
pub fn respond(state: &mut AppState, req: &Request, f: HandlerFn) -> serde_json::Value {
    match f(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Required, non-blank string parameter (trimmed).
pub fn req_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must not be empty"))),
        None => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}

pub fn opt_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) => Ok(Some(s.to_string())),
            None => Err(HandlerErr::bad_params(format!("{key} must be a string"))),
        },
    }
}

pub fn req_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    opt_f64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn opt_f64(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(HandlerErr::bad_params(format!("{key} must be a number"))
                .with_details(json!({ "param": key, "value": v }))),
        },
    }
}

pub fn opt_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be an integer"))),
    }
}

pub fn opt_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be a boolean"))),
    }
}

/// Three-state timestamp parameter: absent (`None`), explicitly cleared
/// (`Some(None)`) or set.
pub fn opt_datetime(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<Option<DateTime<Utc>>>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(Some(None)),
        Some(v) => {
            let parsed = v.as_str().and_then(store::parse_ts);
            match parsed {
                Some(ts) => Ok(Some(Some(ts))),
                None => Err(HandlerErr::bad_params(format!(
                    "{key} must be an RFC 3339 timestamp or null"
                ))
                .with_details(json!({ "param": key, "value": v }))),
            }
        }
    }
}

/// Caller-side optimistic concurrency check against the version just read.
/// A missing record counts as version 0.
pub fn check_expected_version(
    entity: &'static str,
    current: Option<i64>,
    expected: Option<i64>,
) -> Result<(), HandlerErr> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if current.unwrap_or(0) == expected {
        return Ok(());
    }
    Err(store::StoreError::Conflict {
        entity,
        expected: Some(expected),
        found: current,
    }
    .into())
}

pub fn require_enrolled(
    conn: &Connection,
    course_id: &str,
    student_id: &str,
) -> Result<(), HandlerErr> {
    if store::is_enrolled(conn, course_id, student_id)? {
        Ok(())
    } else {
        Err(HandlerErr::new("not_found", "student is not enrolled in course")
            .with_details(json!({ "courseId": course_id, "studentId": student_id })))
    }
}
