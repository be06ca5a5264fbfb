use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    check_expected_version, opt_i64, opt_str, req_f64, req_str, require_db, require_enrolled,
    respond,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Grade, Submission};
use crate::store;
use crate::submission;
use chrono::Utc;
use serde_json::json;

const SUBMISSION_MAX_CHARS: usize = 100_000;

fn content_param(req: &Request) -> Result<String, HandlerErr> {
    let Some(content) = req.params.get("content").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing content"));
    };
    let chars = content.chars().count();
    if chars > SUBMISSION_MAX_CHARS {
        return Err(HandlerErr::bad_params("content is too long").with_details(json!({
            "characterCount": chars,
            "max": SUBMISSION_MAX_CHARS
        })));
    }
    Ok(content.to_string())
}

fn get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = req_str(&req.params, "assessmentId")?;
    let student_id = req_str(&req.params, "studentId")?;

    let assessment = store::get_assessment(conn, &assessment_id)?;
    require_enrolled(conn, &assessment.course_id, &student_id)?;
    let existing = store::get_submission(conn, &student_id, &assessment_id)?;
    let view = submission::status_view(&assessment, existing.as_ref(), Utc::now());
    Ok(json!({ "submission": existing, "state": view }))
}

fn list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = req_str(&req.params, "assessmentId")?;
    let assessment = store::get_assessment(conn, &assessment_id)?;
    let submissions = store::list_submissions(conn, &assessment.id)?;
    Ok(json!({ "submissions": submissions }))
}

#[derive(Clone, Copy)]
enum WriteKind {
    Draft,
    Submit,
}

fn write(
    state: &mut AppState,
    req: &Request,
    kind: WriteKind,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = req_str(&req.params, "assessmentId")?;
    let student_id = req_str(&req.params, "studentId")?;
    let content = content_param(req)?;
    let expected_version = opt_i64(&req.params, "expectedVersion")?;

    let assessment = store::get_assessment(conn, &assessment_id)?;
    require_enrolled(conn, &assessment.course_id, &student_id)?;

    // Read, decide and write inside one transaction; the write is still a
    // version-checked update so a concurrent grader loses nothing silently.
    let tx = conn.unchecked_transaction()?;
    let existing = store::get_submission(&tx, &student_id, &assessment_id)?;
    check_expected_version(
        "submission",
        existing.as_ref().map(|s| s.version),
        expected_version,
    )?;

    let now = Utc::now();
    let next = match kind {
        WriteKind::Draft => {
            submission::save_draft(&assessment, &student_id, existing.as_ref(), &content, now)?
        }
        WriteKind::Submit => {
            submission::submit(&assessment, &student_id, existing.as_ref(), &content, now)?
        }
    };
    let saved: Submission = if existing.is_some() {
        store::update_submission(&tx, &next)?
    } else {
        store::insert_submission(&tx, &next)?
    };
    tx.commit()?;

    tracing::info!(
        submission = %saved.id,
        student = %saved.student_id,
        status = saved.status.as_str(),
        version = saved.version,
        "submission saved"
    );
    let view = submission::status_view(&assessment, Some(&saved), now);
    Ok(json!({ "submission": saved, "state": view }))
}

fn save_draft(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    write(state, req, WriteKind::Draft)
}

fn submit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    write(state, req, WriteKind::Submit)
}

fn delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = req_str(&req.params, "assessmentId")?;
    let student_id = req_str(&req.params, "studentId")?;
    let expected_version = opt_i64(&req.params, "expectedVersion")?;

    let assessment = store::get_assessment(conn, &assessment_id)?;

    let tx = conn.unchecked_transaction()?;
    let existing = store::get_submission(&tx, &student_id, &assessment_id)?;
    check_expected_version(
        "submission",
        existing.as_ref().map(|s| s.version),
        expected_version,
    )?;
    let now = Utc::now();
    submission::can_delete(&assessment, existing.as_ref(), now)?;
    let Some(existing) = existing else {
        return Err(HandlerErr::new("not_found", "submission not found"));
    };
    store::delete_submission(&tx, &existing.id, existing.version)?;
    tx.commit()?;

    tracing::info!(submission = %existing.id, student = %student_id, "draft deleted");
    let view = submission::status_view(&assessment, None, now);
    Ok(json!({ "deleted": true, "submissionId": existing.id, "state": view }))
}

/// Instructor grading of a handed-in submission. Also writes the matching
/// discrete grade so course standing picks it up.
fn grade(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let submission_id = req_str(&req.params, "submissionId")?;
    let graded_by = req_str(&req.params, "gradedBy")?;
    let value = req_f64(&req.params, "value")?;
    let feedback = opt_str(&req.params, "feedback")?;
    let expected_version = opt_i64(&req.params, "expectedVersion")?;

    let tx = conn.unchecked_transaction()?;
    let current = store::get_submission_by_id(&tx, &submission_id)?;
    check_expected_version("submission", Some(current.version), expected_version)?;

    let now = Utc::now();
    let graded = submission::grade(&current, value, feedback.clone(), now)?;
    let saved = store::update_submission(&tx, &graded)?;
    let grade = store::upsert_grade(
        &tx,
        &Grade {
            id: String::new(),
            assessment_id: saved.assessment_id.clone(),
            student_id: saved.student_id.clone(),
            course_id: saved.course_id.clone(),
            value,
            graded_at: now,
            graded_by,
            feedback,
            version: 0,
        },
        None,
    )?;
    tx.commit()?;

    tracing::info!(
        submission = %saved.id,
        student = %saved.student_id,
        value,
        "submission graded"
    );
    Ok(json!({ "submission": saved, "grade": grade }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.get" => Some(respond(state, req, get)),
        "submissions.list" => Some(respond(state, req, list)),
        "submissions.saveDraft" => Some(respond(state, req, save_draft)),
        "submissions.submit" => Some(respond(state, req, submit)),
        "submissions.delete" => Some(respond(state, req, delete)),
        "submissions.grade" => Some(respond(state, req, grade)),
        _ => None,
    }
}
