//! Time-gated lifecycle of a student's text delivery.
//!
//! Everything here is a pure function of an assessment, the student's current
//! submission (if any) and `now`. Persistence happens in the IPC handlers,
//! which re-read the record and write it back with a version check.

use crate::model::{
    Assessment, AssessmentStatus, AssessmentType, DeliveryType, Submission, SubmissionStatus,
    GRADE_MAX, GRADE_MIN,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionPhase {
    NotStarted,
    Open,
    Closed,
    Draft,
    Submitted,
    Graded,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmissionRejection {
    #[error("assessment is of type {0}, only deliveries accept submissions")]
    WrongKind(&'static str),
    #[error("delivery type {0:?} is not supported")]
    UnsupportedDeliveryType(String),
    #[error("assessment is archived")]
    Archived,
    #[error("delivery opens at {0}")]
    NotStarted(DateTime<Utc>),
    #[error("deadline passed at {0}")]
    DeadlinePassed(DateTime<Utc>),
    #[error("no submission exists yet")]
    NoSubmission,
    #[error("submission was already submitted")]
    AlreadySubmitted,
    #[error("submission has been graded")]
    Graded,
    #[error("submission has not been submitted")]
    NotSubmitted,
    #[error("grade must be between 0 and 5, got {0}")]
    InvalidGrade(f64),
}

impl SubmissionRejection {
    pub fn code(&self) -> &'static str {
        match self {
            SubmissionRejection::WrongKind(_) => "wrong_kind",
            SubmissionRejection::UnsupportedDeliveryType(_) => "unsupported_delivery_type",
            SubmissionRejection::Archived => "archived",
            SubmissionRejection::NotStarted(_) => "not_started",
            SubmissionRejection::DeadlinePassed(_) => "deadline_passed",
            SubmissionRejection::NoSubmission => "no_submission",
            SubmissionRejection::AlreadySubmitted => "already_submitted",
            SubmissionRejection::Graded => "graded",
            SubmissionRejection::NotSubmitted => "not_submitted",
            SubmissionRejection::InvalidGrade(_) => "invalid_grade",
        }
    }
}

fn past_due(assessment: &Assessment, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    assessment.due_date.filter(|due| now > *due)
}

fn not_yet_open(assessment: &Assessment, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    assessment.start_date.filter(|start| now < *start)
}

/// Whether the assessment takes text hand-ins at all, independent of dates.
fn accepts_text(assessment: &Assessment) -> Result<(), SubmissionRejection> {
    if assessment.assessment_type != AssessmentType::Delivery {
        return Err(SubmissionRejection::WrongKind(
            assessment.assessment_type.as_str(),
        ));
    }
    if assessment.delivery_type != DeliveryType::Text {
        return Err(SubmissionRejection::UnsupportedDeliveryType(
            assessment.delivery_type.as_str().to_string(),
        ));
    }
    if assessment.status == AssessmentStatus::Archived {
        return Err(SubmissionRejection::Archived);
    }
    Ok(())
}

/// An assessment that does not take text hand-ins is `Closed` unless a
/// submission already moved past draft.
pub fn phase(
    assessment: &Assessment,
    submission: Option<&Submission>,
    now: DateTime<Utc>,
) -> SubmissionPhase {
    let accepting = accepts_text(assessment).is_ok();
    match submission.map(|s| s.status) {
        Some(SubmissionStatus::Graded) => SubmissionPhase::Graded,
        Some(SubmissionStatus::Submitted) => SubmissionPhase::Submitted,
        Some(SubmissionStatus::Draft) => {
            if !accepting || past_due(assessment, now).is_some() {
                SubmissionPhase::Closed
            } else {
                SubmissionPhase::Draft
            }
        }
        None => {
            if !accepting {
                SubmissionPhase::Closed
            } else if not_yet_open(assessment, now).is_some() {
                SubmissionPhase::NotStarted
            } else if past_due(assessment, now).is_some() {
                SubmissionPhase::Closed
            } else {
                SubmissionPhase::Open
            }
        }
    }
}

/// The assessment accepts text submissions right now.
pub fn can_submit(assessment: &Assessment, now: DateTime<Utc>) -> Result<(), SubmissionRejection> {
    accepts_text(assessment)?;
    if let Some(start) = not_yet_open(assessment, now) {
        return Err(SubmissionRejection::NotStarted(start));
    }
    if let Some(due) = past_due(assessment, now) {
        return Err(SubmissionRejection::DeadlinePassed(due));
    }
    Ok(())
}

pub fn can_edit(
    assessment: &Assessment,
    submission: Option<&Submission>,
    now: DateTime<Utc>,
) -> Result<(), SubmissionRejection> {
    let Some(s) = submission else {
        return Err(SubmissionRejection::NoSubmission);
    };
    match s.status {
        SubmissionStatus::Graded => return Err(SubmissionRejection::Graded),
        SubmissionStatus::Submitted => return Err(SubmissionRejection::AlreadySubmitted),
        SubmissionStatus::Draft => {}
    }
    if assessment.status == AssessmentStatus::Archived {
        return Err(SubmissionRejection::Archived);
    }
    if let Some(due) = past_due(assessment, now) {
        return Err(SubmissionRejection::DeadlinePassed(due));
    }
    Ok(())
}

pub fn can_delete(
    assessment: &Assessment,
    submission: Option<&Submission>,
    now: DateTime<Utc>,
) -> Result<(), SubmissionRejection> {
    let Some(s) = submission else {
        return Err(SubmissionRejection::NoSubmission);
    };
    match s.status {
        SubmissionStatus::Draft => {}
        SubmissionStatus::Submitted => return Err(SubmissionRejection::AlreadySubmitted),
        SubmissionStatus::Graded => return Err(SubmissionRejection::Graded),
    }
    if assessment.status == AssessmentStatus::Archived {
        return Err(SubmissionRejection::Archived);
    }
    if let Some(due) = past_due(assessment, now) {
        return Err(SubmissionRejection::DeadlinePassed(due));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardOutcome {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Result<(), SubmissionRejection>> for GuardOutcome {
    fn from(r: Result<(), SubmissionRejection>) -> Self {
        match r {
            Ok(()) => GuardOutcome {
                allowed: true,
                reason: None,
                message: None,
            },
            Err(e) => GuardOutcome {
                allowed: false,
                reason: Some(e.code().to_string()),
                message: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub phase: SubmissionPhase,
    pub can_submit: GuardOutcome,
    pub can_edit: GuardOutcome,
    pub can_delete: GuardOutcome,
}

pub fn status_view(
    assessment: &Assessment,
    submission: Option<&Submission>,
    now: DateTime<Utc>,
) -> StatusView {
    // Once something was handed in the student cannot submit again, whatever
    // the dates say.
    let submit = match submission.map(|s| s.status) {
        Some(SubmissionStatus::Submitted) => Err(SubmissionRejection::AlreadySubmitted),
        Some(SubmissionStatus::Graded) => Err(SubmissionRejection::Graded),
        _ => can_submit(assessment, now),
    };
    StatusView {
        phase: phase(assessment, submission, now),
        can_submit: submit.into(),
        can_edit: can_edit(assessment, submission, now).into(),
        can_delete: can_delete(assessment, submission, now).into(),
    }
}

pub fn word_count(content: &str) -> i64 {
    content.split_whitespace().count() as i64
}

/// Length in Unicode scalar values, not bytes: `"café"` counts 4.
pub fn character_count(content: &str) -> i64 {
    content.chars().count() as i64
}

fn write_content(
    assessment: &Assessment,
    student_id: &str,
    existing: Option<&Submission>,
    content: &str,
    status: SubmissionStatus,
    now: DateTime<Utc>,
) -> Result<Submission, SubmissionRejection> {
    can_submit(assessment, now)?;
    if existing.is_some() {
        can_edit(assessment, existing, now)?;
    }

    let mut next = match existing {
        Some(s) => s.clone(),
        None => Submission {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            assessment_id: assessment.id.clone(),
            course_id: assessment.course_id.clone(),
            content: String::new(),
            status: SubmissionStatus::Draft,
            word_count: 0,
            character_count: 0,
            submitted_at: None,
            updated_at: now,
            graded_at: None,
            grade: None,
            feedback: None,
            version: 0,
        },
    };
    next.content = content.to_string();
    next.word_count = word_count(content);
    next.character_count = character_count(content);
    next.updated_at = now;
    next.status = status;
    if status == SubmissionStatus::Submitted {
        next.submitted_at = Some(now);
    }
    Ok(next)
}

/// Draft to be persisted. A record with `version == 0` is new and must be
/// inserted; otherwise it is a conditional update at that version.
pub fn save_draft(
    assessment: &Assessment,
    student_id: &str,
    existing: Option<&Submission>,
    content: &str,
    now: DateTime<Utc>,
) -> Result<Submission, SubmissionRejection> {
    write_content(
        assessment,
        student_id,
        existing,
        content,
        SubmissionStatus::Draft,
        now,
    )
}

/// Final hand-in. After this the student can neither edit nor delete.
pub fn submit(
    assessment: &Assessment,
    student_id: &str,
    existing: Option<&Submission>,
    content: &str,
    now: DateTime<Utc>,
) -> Result<Submission, SubmissionRejection> {
    write_content(
        assessment,
        student_id,
        existing,
        content,
        SubmissionStatus::Submitted,
        now,
    )
}

/// Instructor grading. Allowed on submitted work and as a re-grade of graded
/// work; drafts cannot be graded.
pub fn grade(
    submission: &Submission,
    value: f64,
    feedback: Option<String>,
    now: DateTime<Utc>,
) -> Result<Submission, SubmissionRejection> {
    if !value.is_finite() || !(GRADE_MIN..=GRADE_MAX).contains(&value) {
        return Err(SubmissionRejection::InvalidGrade(value));
    }
    if submission.status == SubmissionStatus::Draft {
        return Err(SubmissionRejection::NotSubmitted);
    }
    let mut next = submission.clone();
    next.status = SubmissionStatus::Graded;
    next.grade = Some(value);
    next.feedback = feedback;
    next.graded_at = Some(now);
    next.updated_at = now;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_MAX_POINTS, PASSING_GRADE};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn delivery(start: Option<i64>, due: Option<i64>) -> Assessment {
        Assessment {
            id: "a1".to_string(),
            course_id: "c1".to_string(),
            name: "Essay".to_string(),
            percentage: 20.0,
            max_points: DEFAULT_MAX_POINTS,
            passing_score: PASSING_GRADE,
            start_date: start.map(|h| now() + Duration::hours(h)),
            due_date: due.map(|h| now() + Duration::hours(h)),
            assessment_type: AssessmentType::Delivery,
            delivery_type: DeliveryType::Text,
            status: AssessmentStatus::Active,
        }
    }

    fn with_status(status: SubmissionStatus) -> Submission {
        let a = delivery(None, None);
        let mut s = save_draft(&a, "s1", None, "hello world", now()).expect("draft");
        s.status = status;
        s.version = 3;
        s
    }

    #[test]
    fn only_text_deliveries_accept_submissions() {
        for kind in [AssessmentType::Assessment, AssessmentType::Announcement] {
            for (start, due) in [(None, None), (Some(-1), Some(1)), (Some(1), None)] {
                let mut a = delivery(start, due);
                a.assessment_type = kind;
                assert_eq!(
                    can_submit(&a, now()),
                    Err(SubmissionRejection::WrongKind(kind.as_str()))
                );
            }
        }

        let mut a = delivery(None, None);
        a.delivery_type = DeliveryType::Other("file".to_string());
        assert_eq!(
            can_submit(&a, now()).map_err(|e| e.code()),
            Err("unsupported_delivery_type")
        );
    }

    #[test]
    fn submit_window_is_inclusive() {
        let a = delivery(Some(0), Some(0));
        assert_eq!(can_submit(&a, now()), Ok(()));

        let early = delivery(Some(2), Some(5));
        assert_eq!(
            can_submit(&early, now()),
            Err(SubmissionRejection::NotStarted(now() + Duration::hours(2)))
        );

        let late = delivery(Some(-5), Some(-1));
        assert_eq!(
            can_submit(&late, now()),
            Err(SubmissionRejection::DeadlinePassed(now() - Duration::hours(1)))
        );
    }

    #[test]
    fn open_draft_allows_everything() {
        let a = delivery(Some(-24), Some(24));
        let draft = with_status(SubmissionStatus::Draft);
        let view = status_view(&a, Some(&draft), now());
        assert_eq!(view.phase, SubmissionPhase::Draft);
        assert!(view.can_submit.allowed);
        assert!(view.can_edit.allowed);
        assert!(view.can_delete.allowed);
    }

    #[test]
    fn submitted_work_is_locked_before_deadline() {
        let a = delivery(Some(-24), Some(24));
        let s = with_status(SubmissionStatus::Submitted);
        assert_eq!(
            can_edit(&a, Some(&s), now()),
            Err(SubmissionRejection::AlreadySubmitted)
        );
        assert_eq!(
            can_delete(&a, Some(&s), now()),
            Err(SubmissionRejection::AlreadySubmitted)
        );
        let view = status_view(&a, Some(&s), now());
        assert_eq!(view.phase, SubmissionPhase::Submitted);
        assert!(!view.can_submit.allowed);
        assert_eq!(
            save_draft(&a, "s1", Some(&s), "changed", now()),
            Err(SubmissionRejection::AlreadySubmitted)
        );
    }

    #[test]
    fn graded_work_stays_locked_for_any_dates() {
        let s = with_status(SubmissionStatus::Graded);
        for (start, due) in [
            (None, None),
            (Some(-1), Some(1)),
            (Some(1), Some(2)),
            (None, Some(-3)),
        ] {
            let a = delivery(start, due);
            for at in [now() - Duration::days(30), now(), now() + Duration::days(30)] {
                assert!(can_edit(&a, Some(&s), at).is_err());
                assert!(can_delete(&a, Some(&s), at).is_err());
                assert_eq!(phase(&a, Some(&s), at), SubmissionPhase::Graded);
            }
        }
    }

    #[test]
    fn phases_without_submission() {
        assert_eq!(
            phase(&delivery(Some(1), Some(2)), None, now()),
            SubmissionPhase::NotStarted
        );
        assert_eq!(
            phase(&delivery(Some(-1), Some(2)), None, now()),
            SubmissionPhase::Open
        );
        assert_eq!(
            phase(&delivery(None, Some(-2)), None, now()),
            SubmissionPhase::Closed
        );
        let draft = with_status(SubmissionStatus::Draft);
        assert_eq!(
            phase(&delivery(None, Some(-2)), Some(&draft), now()),
            SubmissionPhase::Closed
        );
    }

    #[test]
    fn edit_and_delete_need_a_submission() {
        let a = delivery(None, None);
        assert_eq!(can_edit(&a, None, now()), Err(SubmissionRejection::NoSubmission));
        assert_eq!(can_delete(&a, None, now()), Err(SubmissionRejection::NoSubmission));
    }

    #[test]
    fn drafts_close_at_the_deadline() {
        let a = delivery(None, Some(-1));
        let draft = with_status(SubmissionStatus::Draft);
        assert_eq!(
            can_edit(&a, Some(&draft), now()).map_err(|e| e.code()),
            Err("deadline_passed")
        );
        assert_eq!(
            can_delete(&a, Some(&draft), now()).map_err(|e| e.code()),
            Err("deadline_passed")
        );
    }

    #[test]
    fn saving_recounts_words_and_characters() {
        let a = delivery(None, None);
        let first = save_draft(&a, "s1", None, "  one two\tthree\n", now()).expect("draft");
        assert_eq!(first.version, 0);
        assert_eq!(first.word_count, 3);
        assert_eq!(first.character_count, 16);
        assert_eq!(first.status, SubmissionStatus::Draft);
        assert_eq!(first.submitted_at, None);

        let mut stored = first.clone();
        stored.version = 1;
        let later = now() + Duration::minutes(5);
        let second = save_draft(&a, "s1", Some(&stored), "café", later).expect("resave");
        assert_eq!(second.id, first.id);
        assert_eq!(second.version, 1);
        assert_eq!(second.word_count, 1);
        assert_eq!(second.character_count, 4);
        assert_eq!(second.updated_at, later);
    }

    #[test]
    fn empty_content_has_no_words() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   \n\t"), 0);
        assert_eq!(character_count(""), 0);
    }

    #[test]
    fn submit_stamps_submission_time() {
        let a = delivery(Some(-1), Some(1));
        let s = submit(&a, "s1", None, "final answer", now()).expect("submit");
        assert_eq!(s.status, SubmissionStatus::Submitted);
        assert_eq!(s.submitted_at, Some(now()));
        assert_eq!(s.word_count, 2);
    }

    #[test]
    fn grading_requires_handed_in_work() {
        let draft = with_status(SubmissionStatus::Draft);
        assert_eq!(
            grade(&draft, 4.0, None, now()),
            Err(SubmissionRejection::NotSubmitted)
        );

        let submitted = with_status(SubmissionStatus::Submitted);
        let graded = grade(&submitted, 4.5, Some("good".to_string()), now()).expect("grade");
        assert_eq!(graded.status, SubmissionStatus::Graded);
        assert_eq!(graded.grade, Some(4.5));
        assert_eq!(graded.graded_at, Some(now()));
        assert_eq!(graded.version, submitted.version);

        let regraded = grade(&graded, 3.0, None, now()).expect("regrade");
        assert_eq!(regraded.grade, Some(3.0));

        assert_eq!(
            grade(&submitted, 5.5, None, now()).map_err(|e| e.code()),
            Err("invalid_grade")
        );
        assert!(grade(&submitted, f64::NAN, None, now()).is_err());
    }

    #[test]
    fn items_that_take_no_text_read_as_closed() {
        let open = delivery(Some(-1), Some(1));
        let mut exam = open.clone();
        exam.assessment_type = AssessmentType::Assessment;
        let mut notice = open.clone();
        notice.assessment_type = AssessmentType::Announcement;
        let mut upload = open.clone();
        upload.delivery_type = DeliveryType::Other("file".to_string());

        for a in [&exam, &notice, &upload] {
            let view = status_view(a, None, now());
            assert_eq!(view.phase, SubmissionPhase::Closed);
            assert!(!view.can_submit.allowed);
        }
        assert_eq!(
            status_view(&exam, None, now()).can_submit.reason.as_deref(),
            Some("wrong_kind")
        );
        assert_eq!(
            status_view(&upload, None, now()).can_submit.reason.as_deref(),
            Some("unsupported_delivery_type")
        );
        assert_eq!(phase(&open, None, now()), SubmissionPhase::Open);
    }

    #[test]
    fn archived_deliveries_are_frozen() {
        let mut a = delivery(Some(-1), Some(1));
        a.status = AssessmentStatus::Archived;

        assert_eq!(can_submit(&a, now()), Err(SubmissionRejection::Archived));
        assert_eq!(phase(&a, None, now()), SubmissionPhase::Closed);
        assert_eq!(
            save_draft(&a, "s1", None, "late idea", now()).map_err(|e| e.code()),
            Err("archived")
        );

        let draft = with_status(SubmissionStatus::Draft);
        assert_eq!(phase(&a, Some(&draft), now()), SubmissionPhase::Closed);
        assert_eq!(can_edit(&a, Some(&draft), now()), Err(SubmissionRejection::Archived));
        assert_eq!(can_delete(&a, Some(&draft), now()), Err(SubmissionRejection::Archived));

        // Handed-in work keeps its phase and can still be graded.
        let submitted = with_status(SubmissionStatus::Submitted);
        assert_eq!(phase(&a, Some(&submitted), now()), SubmissionPhase::Submitted);
        assert!(grade(&submitted, 4.0, None, now()).is_ok());
    }
}
