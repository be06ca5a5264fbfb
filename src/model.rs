use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grades live on a 0..=5 scale; 3.0 is the passing line.
pub const GRADE_MIN: f64 = 0.0;
pub const GRADE_MAX: f64 = 5.0;
pub const PASSING_GRADE: f64 = 3.0;

pub const DEFAULT_MAX_POINTS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentType {
    Assessment,
    Delivery,
    Announcement,
}

impl AssessmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentType::Assessment => "assessment",
            AssessmentType::Delivery => "delivery",
            AssessmentType::Announcement => "announcement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assessment" => Some(AssessmentType::Assessment),
            "delivery" => Some(AssessmentType::Delivery),
            "announcement" => Some(AssessmentType::Announcement),
            _ => None,
        }
    }
}

/// Kind of content a delivery accepts. Only `text` is supported today; anything
/// else read from storage is kept verbatim so the guard can reject it by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    Text,
    #[serde(untagged)]
    Other(String),
}

impl DeliveryType {
    pub fn as_str(&self) -> &str {
        match self {
            DeliveryType::Text => "text",
            DeliveryType::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        let t = s.trim().to_ascii_lowercase();
        if t.is_empty() || t == "text" {
            DeliveryType::Text
        } else {
            DeliveryType::Other(t)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentStatus {
    Active,
    Archived,
}

impl AssessmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentStatus::Active => "active",
            AssessmentStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "active" => Some(AssessmentStatus::Active),
            "archived" => Some(AssessmentStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub course_id: String,
    pub name: String,
    /// Weight of this assessment in the final grade, 0..=100.
    pub percentage: f64,
    pub max_points: f64,
    pub passing_score: f64,
    pub due_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub assessment_type: AssessmentType,
    pub delivery_type: DeliveryType,
    pub status: AssessmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub course_id: String,
    pub value: f64,
    pub graded_at: DateTime<Utc>,
    pub graded_by: String,
    pub feedback: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Draft,
    Submitted,
    Graded,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Graded => "graded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(SubmissionStatus::Draft),
            "submitted" => Some(SubmissionStatus::Submitted),
            "graded" => Some(SubmissionStatus::Graded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub student_id: String,
    pub assessment_id: String,
    pub course_id: String,
    pub content: String,
    pub status: SubmissionStatus,
    pub word_count: i64,
    pub character_count: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheetEntry {
    pub student_id: String,
    pub total: f64,
    #[serde(default)]
    pub status: Option<String>,
}

/// Instructor-authored per-period snapshot of student totals. Independent of the
/// discrete `Grade` records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheet {
    pub id: String,
    pub course_id: String,
    pub period: String,
    pub is_published: bool,
    pub students: Vec<GradeSheetEntry>,
}
