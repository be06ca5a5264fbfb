use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    opt_bool, opt_i64, opt_str, req_f64, req_str, require_db, require_enrolled, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Grade, GradeSheet, GradeSheetEntry, SubmissionStatus, GRADE_MAX, GRADE_MIN};
use crate::store;
use crate::submission;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;

const GRADE_SHEET_MAX_STUDENTS: usize = 5000;

fn validate_grade_value(value: f64) -> Result<f64, HandlerErr> {
    if !(GRADE_MIN..=GRADE_MAX).contains(&value) {
        return Err(HandlerErr::new(
            "invalid_grade",
            format!("grade must be between {GRADE_MIN} and {GRADE_MAX}"),
        )
        .with_details(json!({ "value": value })));
    }
    Ok(value)
}

/// Instructor write of a discrete grade. Replaces the previous grade for the same
/// assessment and student, and keeps a graded submission for that pair in step.
fn record(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = req_str(&req.params, "assessmentId")?;
    let student_id = req_str(&req.params, "studentId")?;
    let graded_by = req_str(&req.params, "gradedBy")?;
    let value = validate_grade_value(req_f64(&req.params, "value")?)?;
    let feedback = opt_str(&req.params, "feedback")?;
    let expected_version = opt_i64(&req.params, "expectedVersion")?;

    let assessment = store::get_assessment(conn, &assessment_id)?;
    require_enrolled(conn, &assessment.course_id, &student_id)?;

    let now = Utc::now();
    let tx = conn.unchecked_transaction()?;
    let saved = store::upsert_grade(
        &tx,
        &Grade {
            id: String::new(),
            assessment_id: assessment.id.clone(),
            student_id: student_id.clone(),
            course_id: assessment.course_id.clone(),
            value,
            graded_at: now,
            graded_by,
            feedback: feedback.clone(),
            version: 0,
        },
        expected_version,
    )?;
    let synced = match store::get_submission(&tx, &student_id, &assessment.id)? {
        Some(s) if s.status == SubmissionStatus::Graded => {
            let regraded = submission::grade(&s, value, feedback, now)?;
            Some(store::update_submission(&tx, &regraded)?)
        }
        _ => None,
    };
    tx.commit()?;

    tracing::info!(
        assessment = %saved.assessment_id,
        student = %saved.student_id,
        version = saved.version,
        "grade recorded"
    );
    Ok(json!({ "grade": saved, "submission": synced }))
}

fn list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    let student_id = opt_str(&req.params, "studentId")?;
    let grades = store::list_grades(conn, &course_id, student_id.as_deref())?;
    Ok(json!({ "grades": grades }))
}

fn parse_sheet_entries(
    raw: Option<&serde_json::Value>,
) -> Result<Vec<GradeSheetEntry>, HandlerErr> {
    let Some(arr) = raw.and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("students must be an array"));
    };
    if arr.len() > GRADE_SHEET_MAX_STUDENTS {
        return Err(HandlerErr::bad_params("too many grade sheet rows").with_details(json!({
            "count": arr.len(),
            "max": GRADE_SHEET_MAX_STUDENTS
        })));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut entries = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        let entry: GradeSheetEntry = serde_json::from_value(item.clone()).map_err(|e| {
            HandlerErr::bad_params(format!("students[{i}]: {e}"))
        })?;
        if entry.student_id.trim().is_empty() {
            return Err(HandlerErr::bad_params(format!(
                "students[{i}].studentId must not be empty"
            )));
        }
        if !entry.total.is_finite() {
            return Err(HandlerErr::bad_params(format!(
                "students[{i}].total must be a number"
            )));
        }
        if !seen.insert(entry.student_id.clone()) {
            return Err(HandlerErr::bad_params("duplicate studentId in students")
                .with_details(json!({ "studentId": entry.student_id })));
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn sheets_upsert(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    let period = req_str(&req.params, "period")?;
    let is_published = opt_bool(&req.params, "isPublished")?.unwrap_or(false);
    let students = parse_sheet_entries(req.params.get("students"))?;

    if !store::course_exists(conn, &course_id)? {
        return Err(HandlerErr::new("not_found", "course not found"));
    }

    let sheet = GradeSheet {
        id: String::new(),
        course_id,
        period,
        is_published,
        students,
    };
    let sheet_id = store::upsert_grade_sheet(conn, &sheet)?;
    Ok(json!({
        "gradeSheetId": sheet_id,
        "rowCount": sheet.students.len(),
        "isPublished": sheet.is_published,
    }))
}

fn sheets_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    let published_only = opt_bool(&req.params, "publishedOnly")?.unwrap_or(false);
    let sheets = store::list_grade_sheets(conn, &course_id, published_only)?;
    Ok(json!({ "gradeSheets": sheets }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.record" => Some(respond(state, req, record)),
        "grades.list" => Some(respond(state, req, list)),
        "gradeSheets.upsert" => Some(respond(state, req, sheets_upsert)),
        "gradeSheets.list" => Some(respond(state, req, sheets_list)),
        _ => None,
    }
}
