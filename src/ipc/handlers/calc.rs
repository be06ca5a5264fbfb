use crate::calc::{self, CalcContext};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{req_str, require_db, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn student_progress(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    let student_id = req_str(&req.params, "studentId")?;
    let ctx = CalcContext {
        conn,
        course_id: &course_id,
    };
    let progress = calc::compute_student_progress(&ctx, &student_id)?;
    Ok(json!({ "progress": progress }))
}

fn course_stats(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    let ctx = CalcContext {
        conn,
        course_id: &course_id,
    };
    let stats = calc::compute_course_stats(&ctx)?;
    Ok(json!({ "stats": stats }))
}

fn course_real_stats(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    let ctx = CalcContext {
        conn,
        course_id: &course_id,
    };
    let stats = calc::compute_course_real_stats(&ctx)?;
    Ok(json!({ "stats": stats }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.studentProgress" => Some(respond(state, req, student_progress)),
        "calc.courseStats" => Some(respond(state, req, course_stats)),
        "calc.courseRealStats" => Some(respond(state, req, course_real_stats)),
        _ => None,
    }
}
