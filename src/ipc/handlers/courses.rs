use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{opt_str, req_str, require_db, respond};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

/// Courses with roster and assessment counts. Empty until a workspace is open.
fn list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "courses": [] }));
    };

    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id),
           (SELECT COUNT(*) FROM assessments a WHERE a.course_id = c.id)
         FROM courses c
         ORDER BY c.name, c.id",
    )?;
    let courses = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "studentCount": r.get::<_, i64>(2)?,
                "assessmentCount": r.get::<_, i64>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "courses": courses }))
}

fn create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = req_str(&req.params, "name")?;
    let course_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO courses(id, name) VALUES(?, ?)",
        (&course_id, &name),
    )?;
    tracing::debug!(course = %course_id, "course created");
    Ok(json!({ "courseId": course_id, "name": name }))
}

fn enroll(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    let display_name = req_str(&req.params, "displayName")?;
    let student_id = opt_str(&req.params, "studentId")?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if !store::course_exists(conn, &course_id)? {
        return Err(HandlerErr::new("not_found", "course not found"));
    }

    let next_sort: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM enrollments WHERE course_id = ?",
        [&course_id],
        |r| r.get(0),
    )?;

    // Re-enrolling only refreshes the display name and keeps the roster order.
    conn.execute(
        "INSERT INTO enrollments(course_id, student_id, display_name, sort_order)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(course_id, student_id) DO UPDATE SET
           display_name = excluded.display_name",
        (&course_id, &student_id, &display_name, next_sort),
    )?;

    let sort_order: Option<i64> = conn
        .query_row(
            "SELECT sort_order FROM enrollments WHERE course_id = ? AND student_id = ?",
            (&course_id, &student_id),
            |r| r.get(0),
        )
        .optional()?;

    Ok(json!({
        "courseId": course_id,
        "studentId": student_id,
        "displayName": display_name,
        "sortOrder": sort_order,
    }))
}

fn roster(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    if !store::course_exists(conn, &course_id)? {
        return Err(HandlerErr::new("not_found", "course not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT student_id, display_name, sort_order
         FROM enrollments
         WHERE course_id = ?
         ORDER BY sort_order",
    )?;
    let students = stmt
        .query_map([&course_id], |r| {
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "displayName": r.get::<_, String>(1)?,
                "sortOrder": r.get::<_, i64>(2)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "courseId": course_id, "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(respond(state, req, list)),
        "courses.create" => Some(respond(state, req, create)),
        "students.enroll" => Some(respond(state, req, enroll)),
        "students.list" => Some(respond(state, req, roster)),
        _ => None,
    }
}
