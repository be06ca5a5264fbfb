use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn requests_before_workspace_report_no_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert!(health["result"]["workspacePath"].is_null());

    let listed = request(&mut stdin, &mut reader, "2", "courses.list", json!({}));
    assert_eq!(listed["result"]["courses"], json!([]));

    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "name": "Too Early" }),
    );
    assert_eq!(error_code(&created), Some("no_workspace"));

    let progress = request(
        &mut stdin,
        &mut reader,
        "4",
        "calc.studentProgress",
        json!({ "courseId": "c", "studentId": "s" }),
    );
    assert_eq!(error_code(&progress), Some("no_workspace"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_method_and_bad_json_are_reported() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(error_code(&value), Some("bad_json"));

    let payload = json!({ "id": "9", "method": "nope.nothing", "params": {} });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["id"], json!("9"));
    assert_eq!(error_code(&value), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "name": "Smoke Course" }),
    );
    let course_id = created
        .get("result")
        .and_then(|v| v.get("courseId"))
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let _ = request(&mut stdin, &mut reader, "3", "courses.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.enroll",
        json!({ "courseId": course_id, "studentId": "s1", "displayName": "Smoke, Student" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "courseId": course_id }),
    );
    let assessment = request(
        &mut stdin,
        &mut reader,
        "6",
        "assessments.create",
        json!({ "courseId": course_id, "name": "Quiz", "percentage": 20 }),
    );
    let assessment_id = assessment["result"]["assessmentId"]
        .as_str()
        .unwrap_or("missing")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "assessments.list",
        json!({ "courseId": course_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "assessments.update",
        json!({ "assessmentId": assessment_id, "patch": { "name": "Quiz 1" } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "grades.record",
        json!({
            "assessmentId": assessment_id,
            "studentId": "s1",
            "value": 4.0,
            "gradedBy": "teacher-1"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "grades.list",
        json!({ "courseId": course_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "gradeSheets.upsert",
        json!({ "courseId": course_id, "period": "P1", "students": [] }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "gradeSheets.list",
        json!({ "courseId": course_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "calc.studentProgress",
        json!({ "courseId": course_id, "studentId": "s1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "calc.courseStats",
        json!({ "courseId": course_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "calc.courseRealStats",
        json!({ "courseId": course_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "submissions.get",
        json!({ "assessmentId": assessment_id, "studentId": "s1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "submissions.list",
        json!({ "assessmentId": assessment_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "submissions.saveDraft",
        json!({ "assessmentId": assessment_id, "studentId": "s1", "content": "x" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "submissions.submit",
        json!({ "assessmentId": assessment_id, "studentId": "s1", "content": "x" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "submissions.delete",
        json!({ "assessmentId": assessment_id, "studentId": "s1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "submissions.grade",
        json!({ "submissionId": "missing", "value": 3.0, "gradedBy": "teacher-1" }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
