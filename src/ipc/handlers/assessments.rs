use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    opt_datetime, opt_f64, opt_str, req_f64, req_str, require_db, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    Assessment, AssessmentStatus, AssessmentType, DeliveryType, DEFAULT_MAX_POINTS, PASSING_GRADE,
};
use crate::store;
use serde_json::json;
use uuid::Uuid;

fn validate_percentage(p: f64) -> Result<f64, HandlerErr> {
    if !(0.0..=100.0).contains(&p) {
        return Err(HandlerErr::bad_params("percentage must be between 0 and 100")
            .with_details(json!({ "percentage": p })));
    }
    Ok(p)
}

fn parse_assessment_type(raw: Option<String>) -> Result<Option<AssessmentType>, HandlerErr> {
    match raw {
        None => Ok(None),
        Some(s) => AssessmentType::parse(&s).map(Some).ok_or_else(|| {
            HandlerErr::bad_params(
                "assessmentType must be one of: assessment, delivery, announcement",
            )
            .with_details(json!({ "assessmentType": s }))
        }),
    }
}

fn parse_status(raw: Option<String>) -> Result<Option<AssessmentStatus>, HandlerErr> {
    match raw {
        None => Ok(None),
        Some(s) => AssessmentStatus::parse(&s).map(Some).ok_or_else(|| {
            HandlerErr::bad_params("status must be one of: active, archived")
                .with_details(json!({ "status": s }))
        }),
    }
}

fn validate_window(a: &Assessment) -> Result<(), HandlerErr> {
    if let (Some(start), Some(due)) = (a.start_date, a.due_date) {
        if start > due {
            return Err(HandlerErr::bad_params("startDate must not be after dueDate")
                .with_details(json!({ "startDate": start, "dueDate": due })));
        }
    }
    if a.max_points <= 0.0 {
        return Err(HandlerErr::bad_params("maxPoints must be > 0"));
    }
    Ok(())
}

/// Applies the recognised keys of `fields` on top of `a`.
fn apply_fields(a: &mut Assessment, fields: &serde_json::Value) -> Result<(), HandlerErr> {
    if let Some(name) = opt_str(fields, "name")? {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(HandlerErr::bad_params("name must not be empty"));
        }
        a.name = name;
    }
    if let Some(p) = opt_f64(fields, "percentage")? {
        a.percentage = validate_percentage(p)?;
    }
    if let Some(v) = opt_f64(fields, "maxPoints")? {
        a.max_points = v;
    }
    if let Some(v) = opt_f64(fields, "passingScore")? {
        a.passing_score = v;
    }
    if let Some(v) = opt_datetime(fields, "dueDate")? {
        a.due_date = v;
    }
    if let Some(v) = opt_datetime(fields, "startDate")? {
        a.start_date = v;
    }
    if let Some(t) = parse_assessment_type(opt_str(fields, "assessmentType")?)? {
        a.assessment_type = t;
    }
    if let Some(d) = opt_str(fields, "deliveryType")? {
        a.delivery_type = DeliveryType::parse(&d);
    }
    if let Some(s) = parse_status(opt_str(fields, "status")?)? {
        a.status = s;
    }
    validate_window(a)
}

fn create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    if !store::course_exists(conn, &course_id)? {
        return Err(HandlerErr::new("not_found", "course not found"));
    }

    let mut a = Assessment {
        id: Uuid::new_v4().to_string(),
        course_id,
        name: req_str(&req.params, "name")?,
        percentage: validate_percentage(req_f64(&req.params, "percentage")?)?,
        max_points: DEFAULT_MAX_POINTS,
        passing_score: PASSING_GRADE,
        due_date: None,
        start_date: None,
        assessment_type: AssessmentType::Assessment,
        delivery_type: DeliveryType::Text,
        status: AssessmentStatus::Active,
    };
    apply_fields(&mut a, &req.params)?;

    store::insert_assessment(conn, &a)?;
    tracing::debug!(assessment = %a.id, course = %a.course_id, "assessment created");
    Ok(json!({ "assessmentId": a.id, "assessment": a }))
}

fn list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(&req.params, "courseId")?;
    let assessments = store::list_assessments(conn, &course_id)?;
    let total_percentage: f64 = assessments.iter().map(|a| a.percentage).sum();
    Ok(json!({
        "assessments": assessments,
        "totalPercentage": total_percentage,
    }))
}

fn update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = req_str(&req.params, "assessmentId")?;
    let Some(patch) = req.params.get("patch").filter(|p| p.is_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut a = store::get_assessment(conn, &assessment_id)?;
    apply_fields(&mut a, patch)?;
    store::update_assessment(conn, &a)?;
    Ok(json!({ "assessment": a }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessments.create" => Some(respond(state, req, create)),
        "assessments.list" => Some(respond(state, req, list)),
        "assessments.update" => Some(respond(state, req, update)),
        _ => None,
    }
}
