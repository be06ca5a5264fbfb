use crate::calc::CalcError;
use crate::store::StoreError;
use crate::submission::SubmissionRejection;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure of a single handler, rendered into the error envelope by
/// [`HandlerErr::response`].
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let details = match &e {
            StoreError::Conflict {
                entity,
                expected,
                found,
            } => Some(json!({
                "entity": entity,
                "expectedVersion": expected,
                "currentVersion": found,
            })),
            StoreError::Sqlite(_) | StoreError::Corrupt { .. } => {
                tracing::warn!(error = %e, "store failure");
                None
            }
            StoreError::NotFound(_) => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::from(e).into()
    }
}

impl From<SubmissionRejection> for HandlerErr {
    fn from(e: SubmissionRejection) -> Self {
        tracing::info!(reason = e.code(), "submission request rejected");
        let details = match &e {
            SubmissionRejection::NotStarted(at) => Some(json!({ "startDate": at })),
            SubmissionRejection::DeadlinePassed(at) => Some(json!({ "dueDate": at })),
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        let code = match e.code.as_str() {
            "not_found" => "not_found",
            "conflict" => "conflict",
            "db_corrupt" => "db_corrupt",
            _ => "db_query_failed",
        };
        HandlerErr::new(code, e.message)
    }
}
