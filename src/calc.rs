use crate::model::{Assessment, Grade, GradeSheet, GRADE_MAX, PASSING_GRADE};
use crate::store::{self, StoreError};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Shown instead of an infinite minimum grade: "beyond the best grade you can
/// get". Only ever produced for output.
pub const MIN_GRADE_UNREACHABLE_SENTINEL: f64 = 5.1;

const REAL_STATS_PASSING: f64 = 3.5;
const REAL_STATS_AT_RISK: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcademicStatus {
    Passing,
    AtRisk,
    Failing,
}

/// Half-away-from-zero rounding to 2 decimals, used for every displayed grade.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn assessment_index(assessments: &[Assessment]) -> HashMap<&str, &Assessment> {
    assessments.iter().map(|a| (a.id.as_str(), a)).collect()
}

/// Sum of `value * percentage / 100` over all grades. Grades whose assessment
/// is unknown are skipped.
pub fn weighted_grade(grades: &[Grade], assessments: &[Assessment]) -> f64 {
    let by_id = assessment_index(assessments);
    grades
        .iter()
        .filter_map(|g| {
            by_id
                .get(g.assessment_id.as_str())
                .map(|a| g.value * a.percentage / 100.0)
        })
        .sum()
}

/// Total weight of the distinct assessments the grades refer to.
pub fn evaluated_percentage(grades: &[Grade], assessments: &[Assessment]) -> f64 {
    let by_id = assessment_index(assessments);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut total = 0.0_f64;
    for g in grades {
        let Some(a) = by_id.get(g.assessment_id.as_str()) else {
            continue;
        };
        if seen.insert(a.id.as_str()) {
            total += a.percentage;
        }
    }
    total.clamp(0.0, 100.0)
}

/// Average needed on the remaining weight to finish at the passing grade.
/// Returns `f64::INFINITY` once passing can no longer be reached.
pub fn min_grade_to_pass(current_grade: f64, evaluated_percentage: f64) -> f64 {
    let remaining = 100.0 - evaluated_percentage;
    if remaining <= 0.0 {
        return if current_grade >= PASSING_GRADE {
            0.0
        } else {
            f64::INFINITY
        };
    }

    let need = (PASSING_GRADE - current_grade) / (remaining / 100.0);
    if need > GRADE_MAX {
        f64::INFINITY
    } else {
        need.max(0.0)
    }
}

/// Classification of a student's standing. The rules overlap and are applied
/// as a priority list; reordering them changes results.
pub fn academic_status(
    current_grade: f64,
    evaluated_percentage: f64,
    min_grade_to_pass: f64,
) -> AcademicStatus {
    if evaluated_percentage == 0.0 {
        return AcademicStatus::Passing;
    }
    if min_grade_to_pass.is_infinite() || min_grade_to_pass > GRADE_MAX {
        return AcademicStatus::Failing;
    }

    let projected = (current_grade / evaluated_percentage) * 100.0;
    if projected >= PASSING_GRADE && min_grade_to_pass <= 3.5 {
        return AcademicStatus::Passing;
    }
    if min_grade_to_pass > 4.0 {
        return AcademicStatus::AtRisk;
    }
    if projected < PASSING_GRADE {
        return AcademicStatus::AtRisk;
    }
    AcademicStatus::Passing
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub student_id: String,
    pub course_id: String,
    pub current_grade: f64,
    pub evaluated_percentage: f64,
    pub remaining_percentage: f64,
    pub min_grade_to_pass: f64,
    pub status: AcademicStatus,
    pub grades: Vec<Grade>,
}

pub fn student_progress(
    student_id: &str,
    course_id: &str,
    grades: &[Grade],
    assessments: &[Assessment],
) -> StudentProgress {
    let own: Vec<Grade> = grades
        .iter()
        .filter(|g| g.student_id == student_id && g.course_id == course_id)
        .cloned()
        .collect();

    let current = weighted_grade(&own, assessments);
    let evaluated = evaluated_percentage(&own, assessments);
    let min_grade = min_grade_to_pass(current, evaluated);
    let status = academic_status(current, evaluated, min_grade);

    StudentProgress {
        student_id: student_id.to_string(),
        course_id: course_id.to_string(),
        current_grade: round_2_decimals(current),
        evaluated_percentage: evaluated,
        remaining_percentage: 100.0 - evaluated,
        min_grade_to_pass: if min_grade.is_finite() {
            min_grade
        } else {
            MIN_GRADE_UNREACHABLE_SENTINEL
        },
        status,
        grades: own,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStats {
    pub average_grade: f64,
    pub passing_count: usize,
    pub at_risk_count: usize,
    pub failing_count: usize,
    pub total_students: usize,
}

pub fn course_stats(
    course_id: &str,
    student_ids: &[String],
    grades: &[Grade],
    assessments: &[Assessment],
) -> CourseStats {
    let mut sum = 0.0_f64;
    let mut passing_count = 0;
    let mut at_risk_count = 0;
    let mut failing_count = 0;

    for sid in student_ids {
        let p = student_progress(sid, course_id, grades, assessments);
        sum += p.current_grade;
        match p.status {
            AcademicStatus::Passing => passing_count += 1,
            AcademicStatus::AtRisk => at_risk_count += 1,
            AcademicStatus::Failing => failing_count += 1,
        }
    }

    let total_students = student_ids.len();
    let average_grade = if total_students > 0 {
        round_2_decimals(sum / (total_students as f64))
    } else {
        0.0
    };

    CourseStats {
        average_grade,
        passing_count,
        at_risk_count,
        failing_count,
        total_students,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRealStats {
    pub average_grade: f64,
    pub passing_count: usize,
    pub at_risk_count: usize,
    pub failing_count: usize,
    pub total_students: usize,
    pub students_with_grades: usize,
}

fn real_stats_status(mean: f64) -> AcademicStatus {
    if mean >= REAL_STATS_PASSING {
        AcademicStatus::Passing
    } else if mean >= REAL_STATS_AT_RISK {
        AcademicStatus::AtRisk
    } else {
        AcademicStatus::Failing
    }
}

/// Course summary pooling discrete grades with published grade-sheet totals.
///
/// Each value counts once in a plain mean, regardless of assessment weight.
/// An activity recorded both as a `Grade` and inside a sheet total is counted
/// twice; callers that need exact figures should use [`course_stats`].
pub fn course_real_stats(
    course_id: &str,
    enrolled_students: &[String],
    grades: &[Grade],
    grade_sheets: &[GradeSheet],
) -> CourseRealStats {
    let published: Vec<&GradeSheet> = grade_sheets
        .iter()
        .filter(|s| s.is_published && s.course_id == course_id)
        .collect();

    let mut sum_of_means = 0.0_f64;
    let mut students_with_grades = 0;
    let mut passing_count = 0;
    let mut at_risk_count = 0;
    let mut failing_count = 0;

    for sid in enrolled_students {
        let mut values: Vec<f64> = grades
            .iter()
            .filter(|g| &g.student_id == sid && g.course_id == course_id)
            .map(|g| g.value)
            .collect();
        for sheet in &published {
            values.extend(
                sheet
                    .students
                    .iter()
                    .filter(|e| &e.student_id == sid)
                    .map(|e| e.total)
                    .filter(|v| v.is_finite()),
            );
        }

        if values.is_empty() {
            continue;
        }
        let mean = values.iter().sum::<f64>() / (values.len() as f64);
        sum_of_means += mean;
        students_with_grades += 1;
        match real_stats_status(mean) {
            AcademicStatus::Passing => passing_count += 1,
            AcademicStatus::AtRisk => at_risk_count += 1,
            AcademicStatus::Failing => failing_count += 1,
        }
    }

    let average_grade = if students_with_grades > 0 {
        round_2_decimals(sum_of_means / (students_with_grades as f64))
    } else {
        0.0
    };

    CourseRealStats {
        average_grade,
        passing_count,
        at_risk_count,
        failing_count,
        total_students: enrolled_students.len(),
        students_with_grades,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<StoreError> for CalcError {
    fn from(e: StoreError) -> Self {
        CalcError::new(e.code(), e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CalcContext<'a> {
    pub conn: &'a Connection,
    pub course_id: &'a str,
}

fn require_course(ctx: &CalcContext<'_>) -> Result<(), CalcError> {
    if store::course_exists(ctx.conn, ctx.course_id)? {
        Ok(())
    } else {
        Err(CalcError::new("not_found", "course not found"))
    }
}

pub fn compute_student_progress(
    ctx: &CalcContext<'_>,
    student_id: &str,
) -> Result<StudentProgress, CalcError> {
    require_course(ctx)?;
    let assessments = store::list_assessments(ctx.conn, ctx.course_id)?;
    let grades = store::list_grades(ctx.conn, ctx.course_id, Some(student_id))?;
    Ok(student_progress(
        student_id,
        ctx.course_id,
        &grades,
        &assessments,
    ))
}

pub fn compute_course_stats(ctx: &CalcContext<'_>) -> Result<CourseStats, CalcError> {
    require_course(ctx)?;
    let roster = store::list_enrolled_student_ids(ctx.conn, ctx.course_id)?;
    let assessments = store::list_assessments(ctx.conn, ctx.course_id)?;
    let grades = store::list_grades(ctx.conn, ctx.course_id, None)?;
    Ok(course_stats(ctx.course_id, &roster, &grades, &assessments))
}

pub fn compute_course_real_stats(ctx: &CalcContext<'_>) -> Result<CourseRealStats, CalcError> {
    require_course(ctx)?;
    let roster = store::list_enrolled_student_ids(ctx.conn, ctx.course_id)?;
    let grades = store::list_grades(ctx.conn, ctx.course_id, None)?;
    let sheets = store::list_grade_sheets(ctx.conn, ctx.course_id, true)?;
    Ok(course_real_stats(ctx.course_id, &roster, &grades, &sheets))
}
