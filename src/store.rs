use crate::model::{
    Assessment, AssessmentStatus, AssessmentType, DeliveryType, Grade, GradeSheet,
    GradeSheetEntry, Submission, SubmissionStatus, DEFAULT_MAX_POINTS, PASSING_GRADE,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{entity} was modified concurrently (expected version {expected:?}, found {found:?})")]
    Conflict {
        entity: &'static str,
        expected: Option<i64>,
        found: Option<i64>,
    },
    #[error("corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict { .. } => "conflict",
            StoreError::Corrupt { .. } => "db_corrupt",
            StoreError::Sqlite(_) => "db_query_failed",
        }
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
    )
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_ts_field(
    entity: &'static str,
    id: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_ts(&s).map(Some).ok_or_else(|| StoreError::Corrupt {
            entity,
            id: id.to_string(),
            reason: format!("bad timestamp {s:?}"),
        }),
    }
}

fn require_ts(
    entity: &'static str,
    id: &str,
    raw: String,
) -> Result<DateTime<Utc>, StoreError> {
    parse_ts_field(entity, id, Some(raw))?.ok_or_else(|| StoreError::Corrupt {
        entity,
        id: id.to_string(),
        reason: "missing timestamp".to_string(),
    })
}

pub fn course_exists(conn: &Connection, course_id: &str) -> Result<bool, StoreError> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(hit.is_some())
}

pub fn list_enrolled_student_ids(
    conn: &Connection,
    course_id: &str,
) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM enrollments WHERE course_id = ? ORDER BY sort_order",
    )?;
    let ids = stmt
        .query_map([course_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn is_enrolled(
    conn: &Connection,
    course_id: &str,
    student_id: &str,
) -> Result<bool, StoreError> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE course_id = ? AND student_id = ?",
            (course_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

// ---------------------------------------------------------------------------
// Assessments
// ---------------------------------------------------------------------------

const ASSESSMENT_COLUMNS: &str = "id, course_id, name, percentage, max_points, passing_score,
     due_date, start_date, assessment_type, delivery_type, status";

struct AssessmentRow {
    id: String,
    course_id: String,
    name: String,
    percentage: f64,
    max_points: Option<f64>,
    passing_score: Option<f64>,
    due_date: Option<String>,
    start_date: Option<String>,
    assessment_type: String,
    delivery_type: Option<String>,
    status: Option<String>,
}

fn read_assessment_row(r: &Row<'_>) -> rusqlite::Result<AssessmentRow> {
    Ok(AssessmentRow {
        id: r.get(0)?,
        course_id: r.get(1)?,
        name: r.get(2)?,
        percentage: r.get(3)?,
        max_points: r.get(4)?,
        passing_score: r.get(5)?,
        due_date: r.get(6)?,
        start_date: r.get(7)?,
        assessment_type: r.get(8)?,
        delivery_type: r.get(9)?,
        status: r.get(10)?,
    })
}

// Defaults for loosely filled rows are applied here and nowhere else.
fn assessment_from_row(row: AssessmentRow) -> Result<Assessment, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        entity: "assessment",
        id: row.id.clone(),
        reason,
    };
    let assessment_type = AssessmentType::parse(&row.assessment_type)
        .ok_or_else(|| corrupt(format!("unknown type {:?}", row.assessment_type)))?;
    let status = AssessmentStatus::parse(row.status.as_deref().unwrap_or(""))
        .ok_or_else(|| corrupt(format!("unknown status {:?}", row.status)))?;
    let due_date = parse_ts_field("assessment", &row.id, row.due_date.clone())?;
    let start_date = parse_ts_field("assessment", &row.id, row.start_date.clone())?;

    Ok(Assessment {
        percentage: row.percentage.clamp(0.0, 100.0),
        max_points: row.max_points.unwrap_or(DEFAULT_MAX_POINTS),
        passing_score: row.passing_score.unwrap_or(PASSING_GRADE),
        delivery_type: DeliveryType::parse(row.delivery_type.as_deref().unwrap_or("")),
        due_date,
        start_date,
        assessment_type,
        status,
        id: row.id,
        course_id: row.course_id,
        name: row.name,
    })
}

pub fn list_assessments(conn: &Connection, course_id: &str) -> Result<Vec<Assessment>, StoreError> {
    let sql = format!(
        "SELECT {} FROM assessments WHERE course_id = ? ORDER BY rowid",
        ASSESSMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([course_id], read_assessment_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(assessment_from_row).collect()
}

pub fn get_assessment(conn: &Connection, assessment_id: &str) -> Result<Assessment, StoreError> {
    let sql = format!("SELECT {} FROM assessments WHERE id = ?", ASSESSMENT_COLUMNS);
    let row = conn
        .query_row(&sql, [assessment_id], read_assessment_row)
        .optional()?;
    match row {
        Some(row) => assessment_from_row(row),
        None => Err(StoreError::NotFound("assessment")),
    }
}

pub fn insert_assessment(conn: &Connection, a: &Assessment) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO assessments(id, course_id, name, percentage, max_points, passing_score,
           due_date, start_date, assessment_type, delivery_type, status)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &a.id,
            &a.course_id,
            &a.name,
            a.percentage,
            a.max_points,
            a.passing_score,
            a.due_date.map(format_ts),
            a.start_date.map(format_ts),
            a.assessment_type.as_str(),
            a.delivery_type.as_str(),
            a.status.as_str(),
        ),
    )?;
    Ok(())
}

pub fn update_assessment(conn: &Connection, a: &Assessment) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE assessments SET
           name = ?, percentage = ?, max_points = ?, passing_score = ?,
           due_date = ?, start_date = ?, assessment_type = ?, delivery_type = ?, status = ?
         WHERE id = ?",
        (
            &a.name,
            a.percentage,
            a.max_points,
            a.passing_score,
            a.due_date.map(format_ts),
            a.start_date.map(format_ts),
            a.assessment_type.as_str(),
            a.delivery_type.as_str(),
            a.status.as_str(),
            &a.id,
        ),
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("assessment"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Grades
// ---------------------------------------------------------------------------

const GRADE_COLUMNS: &str =
    "id, assessment_id, student_id, course_id, value, graded_at, graded_by, feedback, version";

#[allow(clippy::type_complexity)]
fn read_grade_row(
    r: &Row<'_>,
) -> rusqlite::Result<(String, String, String, String, f64, String, String, Option<String>, i64)>
{
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
        r.get(8)?,
    ))
}

#[allow(clippy::type_complexity)]
fn grade_from_row(
    row: (String, String, String, String, f64, String, String, Option<String>, i64),
) -> Result<Grade, StoreError> {
    let (id, assessment_id, student_id, course_id, value, graded_at, graded_by, feedback, version) =
        row;
    let graded_at = require_ts("grade", &id, graded_at)?;
    Ok(Grade {
        id,
        assessment_id,
        student_id,
        course_id,
        value,
        graded_at,
        graded_by,
        feedback,
        version,
    })
}

pub fn list_grades(
    conn: &Connection,
    course_id: &str,
    student_id: Option<&str>,
) -> Result<Vec<Grade>, StoreError> {
    let rows = match student_id {
        Some(sid) => {
            let sql = format!(
                "SELECT {} FROM grades WHERE course_id = ? AND student_id = ? ORDER BY graded_at",
                GRADE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((course_id, sid), read_grade_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!(
                "SELECT {} FROM grades WHERE course_id = ? ORDER BY student_id, graded_at",
                GRADE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([course_id], read_grade_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    rows.into_iter().map(grade_from_row).collect()
}

pub fn get_grade(
    conn: &Connection,
    assessment_id: &str,
    student_id: &str,
) -> Result<Option<Grade>, StoreError> {
    let sql = format!(
        "SELECT {} FROM grades WHERE assessment_id = ? AND student_id = ?",
        GRADE_COLUMNS
    );
    let row = conn
        .query_row(&sql, (assessment_id, student_id), read_grade_row)
        .optional()?;
    row.map(grade_from_row).transpose()
}

/// Writes the grade for `(assessment, student)`, replacing an existing one.
///
/// `expected_version` is the version the caller last saw; `Some(0)` means "no
/// grade yet". `None` skips the caller check but the write itself is still
/// conditional on the version read here.
pub fn upsert_grade(
    conn: &Connection,
    grade: &Grade,
    expected_version: Option<i64>,
) -> Result<Grade, StoreError> {
    let existing = get_grade(conn, &grade.assessment_id, &grade.student_id)?;
    let found = existing.as_ref().map(|g| g.version);
    if let Some(expected) = expected_version {
        if found.unwrap_or(0) != expected {
            return Err(StoreError::Conflict {
                entity: "grade",
                expected: Some(expected),
                found,
            });
        }
    }

    match existing {
        Some(prev) => {
            let changed = conn.execute(
                "UPDATE grades SET value = ?, graded_at = ?, graded_by = ?, feedback = ?,
                   version = version + 1
                 WHERE id = ? AND version = ?",
                (
                    grade.value,
                    format_ts(grade.graded_at),
                    &grade.graded_by,
                    &grade.feedback,
                    &prev.id,
                    prev.version,
                ),
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict {
                    entity: "grade",
                    expected: Some(prev.version),
                    found: None,
                });
            }
            Ok(Grade {
                id: prev.id,
                version: prev.version + 1,
                ..grade.clone()
            })
        }
        None => {
            let id = if grade.id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                grade.id.clone()
            };
            let inserted = conn.execute(
                "INSERT INTO grades(id, assessment_id, student_id, course_id, value,
                   graded_at, graded_by, feedback, version)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1)",
                (
                    &id,
                    &grade.assessment_id,
                    &grade.student_id,
                    &grade.course_id,
                    grade.value,
                    format_ts(grade.graded_at),
                    &grade.graded_by,
                    &grade.feedback,
                ),
            );
            match inserted {
                Ok(_) => Ok(Grade {
                    id,
                    version: 1,
                    ..grade.clone()
                }),
                Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
                    entity: "grade",
                    expected: Some(0),
                    found: None,
                }),
                Err(e) => Err(e.into()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Grade sheets
// ---------------------------------------------------------------------------

pub fn list_grade_sheets(
    conn: &Connection,
    course_id: &str,
    published_only: bool,
) -> Result<Vec<GradeSheet>, StoreError> {
    let mut sheet_stmt = conn.prepare(
        "SELECT id, period, is_published
         FROM grade_sheets
         WHERE course_id = ? AND (? = 0 OR is_published <> 0)
         ORDER BY period",
    )?;
    let heads = sheet_stmt
        .query_map((course_id, published_only as i64), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)? != 0,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut entry_stmt = conn.prepare(
        "SELECT student_id, total, status
         FROM grade_sheet_entries
         WHERE grade_sheet_id = ?
         ORDER BY sort_order",
    )?;
    let mut out = Vec::with_capacity(heads.len());
    for (id, period, is_published) in heads {
        let students = entry_stmt
            .query_map([&id], |r| {
                Ok(GradeSheetEntry {
                    student_id: r.get(0)?,
                    total: r.get(1)?,
                    status: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        out.push(GradeSheet {
            id,
            course_id: course_id.to_string(),
            period,
            is_published,
            students,
        });
    }
    Ok(out)
}

/// Replaces the sheet for `(course, period)` wholesale. Returns the sheet id.
pub fn upsert_grade_sheet(conn: &Connection, sheet: &GradeSheet) -> Result<String, StoreError> {
    let tx = conn.unchecked_transaction()?;

    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM grade_sheets WHERE course_id = ? AND period = ?",
            (&sheet.course_id, &sheet.period),
            |r| r.get(0),
        )
        .optional()?;
    let sheet_id = match existing {
        Some(id) => {
            tx.execute(
                "UPDATE grade_sheets SET is_published = ? WHERE id = ?",
                (sheet.is_published as i64, &id),
            )?;
            tx.execute(
                "DELETE FROM grade_sheet_entries WHERE grade_sheet_id = ?",
                [&id],
            )?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO grade_sheets(id, course_id, period, is_published) VALUES(?, ?, ?, ?)",
                (&id, &sheet.course_id, &sheet.period, sheet.is_published as i64),
            )?;
            id
        }
    };

    for (i, e) in sheet.students.iter().enumerate() {
        tx.execute(
            "INSERT INTO grade_sheet_entries(grade_sheet_id, student_id, total, status, sort_order)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(grade_sheet_id, student_id) DO UPDATE SET
               total = excluded.total,
               status = excluded.status",
            (&sheet_id, &e.student_id, e.total, &e.status, i as i64),
        )?;
    }

    tx.commit()?;
    Ok(sheet_id)
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

const SUBMISSION_COLUMNS: &str = "id, student_id, assessment_id, course_id, content, status,
     word_count, character_count, submitted_at, updated_at, graded_at, grade, feedback, version";

struct SubmissionRow {
    id: String,
    student_id: String,
    assessment_id: String,
    course_id: String,
    content: String,
    status: String,
    word_count: i64,
    character_count: i64,
    submitted_at: Option<String>,
    updated_at: String,
    graded_at: Option<String>,
    grade: Option<f64>,
    feedback: Option<String>,
    version: i64,
}

fn read_submission_row(r: &Row<'_>) -> rusqlite::Result<SubmissionRow> {
    Ok(SubmissionRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        assessment_id: r.get(2)?,
        course_id: r.get(3)?,
        content: r.get(4)?,
        status: r.get(5)?,
        word_count: r.get(6)?,
        character_count: r.get(7)?,
        submitted_at: r.get(8)?,
        updated_at: r.get(9)?,
        graded_at: r.get(10)?,
        grade: r.get(11)?,
        feedback: r.get(12)?,
        version: r.get(13)?,
    })
}

fn submission_from_row(row: SubmissionRow) -> Result<Submission, StoreError> {
    let status = SubmissionStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
        entity: "submission",
        id: row.id.clone(),
        reason: format!("unknown status {:?}", row.status),
    })?;
    let submitted_at = parse_ts_field("submission", &row.id, row.submitted_at)?;
    let graded_at = parse_ts_field("submission", &row.id, row.graded_at)?;
    let updated_at = require_ts("submission", &row.id, row.updated_at)?;
    Ok(Submission {
        id: row.id,
        student_id: row.student_id,
        assessment_id: row.assessment_id,
        course_id: row.course_id,
        content: row.content,
        status,
        word_count: row.word_count,
        character_count: row.character_count,
        submitted_at,
        updated_at,
        graded_at,
        grade: row.grade,
        feedback: row.feedback,
        version: row.version,
    })
}

pub fn get_submission(
    conn: &Connection,
    student_id: &str,
    assessment_id: &str,
) -> Result<Option<Submission>, StoreError> {
    let sql = format!(
        "SELECT {} FROM submissions WHERE student_id = ? AND assessment_id = ?",
        SUBMISSION_COLUMNS
    );
    let row = conn
        .query_row(&sql, (student_id, assessment_id), read_submission_row)
        .optional()?;
    row.map(submission_from_row).transpose()
}

pub fn get_submission_by_id(
    conn: &Connection,
    submission_id: &str,
) -> Result<Submission, StoreError> {
    let sql = format!("SELECT {} FROM submissions WHERE id = ?", SUBMISSION_COLUMNS);
    let row = conn
        .query_row(&sql, [submission_id], read_submission_row)
        .optional()?;
    match row {
        Some(row) => submission_from_row(row),
        None => Err(StoreError::NotFound("submission")),
    }
}

pub fn list_submissions(
    conn: &Connection,
    assessment_id: &str,
) -> Result<Vec<Submission>, StoreError> {
    let sql = format!(
        "SELECT {} FROM submissions WHERE assessment_id = ? ORDER BY updated_at",
        SUBMISSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([assessment_id], read_submission_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(submission_from_row).collect()
}

/// Inserts a brand-new submission at version 1. A second submission for the
/// same student and assessment is a conflict.
pub fn insert_submission(conn: &Connection, s: &Submission) -> Result<Submission, StoreError> {
    let inserted = conn.execute(
        "INSERT INTO submissions(id, student_id, assessment_id, course_id, content, status,
           word_count, character_count, submitted_at, updated_at, graded_at, grade, feedback,
           version)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        rusqlite::params![
            &s.id,
            &s.student_id,
            &s.assessment_id,
            &s.course_id,
            &s.content,
            s.status.as_str(),
            s.word_count,
            s.character_count,
            s.submitted_at.map(format_ts),
            format_ts(s.updated_at),
            s.graded_at.map(format_ts),
            s.grade,
            &s.feedback,
        ],
    );
    match inserted {
        Ok(_) => Ok(Submission {
            version: 1,
            ..s.clone()
        }),
        Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
            entity: "submission",
            expected: Some(0),
            found: None,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Compare-and-swap write: succeeds only if the stored version still equals
/// `s.version`. Returns the record at its new version.
pub fn update_submission(conn: &Connection, s: &Submission) -> Result<Submission, StoreError> {
    let changed = conn.execute(
        "UPDATE submissions SET
           content = ?, status = ?, word_count = ?, character_count = ?,
           submitted_at = ?, updated_at = ?, graded_at = ?, grade = ?, feedback = ?,
           version = version + 1
         WHERE id = ? AND version = ?",
        rusqlite::params![
            &s.content,
            s.status.as_str(),
            s.word_count,
            s.character_count,
            s.submitted_at.map(format_ts),
            format_ts(s.updated_at),
            s.graded_at.map(format_ts),
            s.grade,
            &s.feedback,
            &s.id,
            s.version,
        ],
    )?;
    if changed == 0 {
        return Err(version_mismatch(conn, &s.id, s.version)?);
    }
    Ok(Submission {
        version: s.version + 1,
        ..s.clone()
    })
}

pub fn delete_submission(
    conn: &Connection,
    submission_id: &str,
    version: i64,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "DELETE FROM submissions WHERE id = ? AND version = ?",
        (submission_id, version),
    )?;
    if changed == 0 {
        return Err(version_mismatch(conn, submission_id, version)?);
    }
    Ok(())
}

fn version_mismatch(
    conn: &Connection,
    submission_id: &str,
    expected: i64,
) -> Result<StoreError, StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT version FROM submissions WHERE id = ?",
            [submission_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match found {
        None => StoreError::NotFound("submission"),
        Some(v) => StoreError::Conflict {
            entity: "submission",
            expected: Some(expected),
            found: Some(v),
        },
    })
}
