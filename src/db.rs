use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("gradebook.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(course_id, student_id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            name TEXT NOT NULL,
            percentage REAL NOT NULL,
            max_points REAL,
            passing_score REAL,
            due_date TEXT,
            start_date TEXT,
            assessment_type TEXT NOT NULL,
            delivery_type TEXT,
            status TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_course ON assessments(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            value REAL NOT NULL,
            graded_at TEXT NOT NULL,
            graded_by TEXT NOT NULL,
            feedback TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(assessment_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_course_student ON grades(course_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_sheets(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            period TEXT NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(course_id, period)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_sheet_entries(
            grade_sheet_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            total REAL NOT NULL,
            status TEXT,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(grade_sheet_id, student_id),
            FOREIGN KEY(grade_sheet_id) REFERENCES grade_sheets(id)
        )",
        [],
    )?;

    // One submission per student and assessment; concurrent first saves
    // collide here instead of producing two drafts.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL,
            word_count INTEGER NOT NULL,
            character_count INTEGER NOT NULL,
            submitted_at TEXT,
            updated_at TEXT NOT NULL,
            graded_at TEXT,
            grade REAL,
            feedback TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(student_id, assessment_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_assessment ON submissions(assessment_id)",
        [],
    )?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn open_db_is_idempotent() {
        let dir = std::env::temp_dir().join(format!(
            "gradebookd-db-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let first = open_db(&dir).expect("first open");
        drop(first);
        let conn = open_db(&dir).expect("second open");
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |r| r.get(0),
            )
            .expect("count tables");
        assert_eq!(tables, 7);
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }
}
