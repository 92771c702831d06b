use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Fixture {
    department_id: i64,
    faculty_id: i64,
    meeting_id: i64,
    student_ids: Vec<i64>,
    outsider_id: i64,
}

fn roll(i: usize) -> String {
    format!("2021CS{:03}", i)
}

fn seed_meeting_class(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) -> Fixture {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let department_id = request_ok(
        stdin,
        reader,
        "dept",
        "directory.addDepartment",
        json!({ "name": "CSE" }),
    )["departmentId"]
        .as_i64()
        .expect("departmentId");
    let other_department_id = request_ok(
        stdin,
        reader,
        "dept2",
        "directory.addDepartment",
        json!({ "name": "ECE" }),
    )["departmentId"]
        .as_i64()
        .expect("departmentId");
    let faculty_id = request_ok(
        stdin,
        reader,
        "fac",
        "directory.addFaculty",
        json!({ "name": "Prof. Rao", "departmentId": department_id }),
    )["facultyId"]
        .as_i64()
        .expect("facultyId");

    let mut student_ids = Vec::new();
    for i in 1..=25 {
        let created = request_ok(
            stdin,
            reader,
            &format!("stu{i}"),
            "directory.addStudent",
            json!({
                "rollNumber": roll(i),
                "registerNumber": format!("REG{:05}", i),
                "name": format!("Student {:02}", i),
                "departmentId": department_id,
                "section": "A",
                "yearOfStudy": 2
            }),
        );
        student_ids.push(created["studentId"].as_i64().expect("studentId"));
    }
    let outsider_id = request_ok(
        stdin,
        reader,
        "outsider",
        "directory.addStudent",
        json!({
            "rollNumber": "2021EC007",
            "registerNumber": "REG90007",
            "name": "Outsider",
            "departmentId": other_department_id,
            "section": "A",
            "yearOfStudy": 2
        }),
    )["studentId"]
        .as_i64()
        .expect("studentId");

    let meeting_id = request_ok(
        stdin,
        reader,
        "meeting",
        "schedule.addMeeting",
        json!({
            "date": "2026-08-06",
            "startTime": "09:00",
            "endTime": "10:00",
            "subject": "Data Structures",
            "year": 2,
            "semester": 3,
            "section": "A",
            "departmentId": department_id,
            "facultyId": faculty_id
        }),
    )["eventId"]
        .as_i64()
        .expect("eventId");

    Fixture {
        department_id,
        faculty_id,
        meeting_id,
        student_ids,
        outsider_id,
    }
}

fn actor(fx: &Fixture) -> serde_json::Value {
    json!({
        "actorId": fx.faculty_id,
        "role": "faculty",
        "departmentId": fx.department_id
    })
}

#[test]
fn only_the_listed_students_change() {
    let workspace = temp_dir("campus-update-many");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_meeting_class(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "fill",
        "attendance.fillMissing",
        json!({
            "actor": actor(&fx),
            "eventKind": "meeting",
            "eventId": fx.meeting_id
        }),
    );

    let s2 = fx.student_ids[1];
    let s3 = fx.student_ids[2];
    let mut marks = serde_json::Map::new();
    marks.insert(s2.to_string(), json!("late"));
    marks.insert(s3.to_string(), json!("excused"));
    let outcome = request_ok(
        &mut stdin,
        &mut reader,
        "update",
        "attendance.updateMany",
        json!({
            "actor": actor(&fx),
            "eventKind": "meeting",
            "eventId": fx.meeting_id,
            "scope": "page",
            "marks": marks
        }),
    );
    assert_eq!(outcome["affectedCount"].as_i64(), Some(2));
    assert_eq!(outcome["errors"].as_array().map(|a| a.len()), Some(0));

    let page = request_ok(
        &mut stdin,
        &mut reader,
        "page",
        "attendance.rosterPage",
        json!({
            "eventKind": "meeting",
            "eventId": fx.meeting_id,
            "pageSize": 200
        }),
    );
    for row in page["rows"].as_array().expect("rows") {
        let student_id = row["studentId"].as_i64().expect("studentId");
        let expected = if student_id == s2 {
            "late"
        } else if student_id == s3 {
            "excused"
        } else {
            "absent"
        };
        assert_eq!(
            row["status"].as_str(),
            Some(expected),
            "student {} has the wrong status",
            student_id
        );
    }
}

#[test]
fn failing_rows_are_tallied_without_aborting_the_rest() {
    let workspace = temp_dir("campus-update-many-partial");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_meeting_class(&mut stdin, &mut reader, &workspace);

    let s2 = fx.student_ids[1];
    let s4 = fx.student_ids[3];
    let mut marks = serde_json::Map::new();
    marks.insert(s2.to_string(), json!("present"));
    marks.insert(fx.outsider_id.to_string(), json!("present"));
    marks.insert("999999".to_string(), json!("late"));
    marks.insert(s4.to_string(), json!("bogus"));
    let outcome = request_ok(
        &mut stdin,
        &mut reader,
        "update",
        "attendance.updateMany",
        json!({
            "actor": actor(&fx),
            "eventKind": "meeting",
            "eventId": fx.meeting_id,
            "scope": "all",
            "marks": marks
        }),
    );
    assert_eq!(outcome["affectedCount"].as_i64(), Some(1));
    let errors = outcome["errors"].as_array().expect("errors");
    assert_eq!(errors.len(), 3);
    let failed_ids: Vec<i64> = errors
        .iter()
        .map(|e| e["studentId"].as_i64().expect("studentId"))
        .collect();
    assert!(failed_ids.contains(&fx.outsider_id));
    assert!(failed_ids.contains(&999999));
    assert!(failed_ids.contains(&s4));

    // The one good row landed despite its neighbors.
    let page = request_ok(
        &mut stdin,
        &mut reader,
        "page",
        "attendance.rosterPage",
        json!({
            "eventKind": "meeting",
            "eventId": fx.meeting_id,
            "pageSize": 200
        }),
    );
    for row in page["rows"].as_array().expect("rows") {
        let student_id = row["studentId"].as_i64().expect("studentId");
        let expected = if student_id == s2 { "present" } else { "absent" };
        assert_eq!(row["status"].as_str(), Some(expected));
    }
}

#[test]
fn scope_outside_the_enum_is_rejected() {
    let workspace = temp_dir("campus-update-many-scope");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_meeting_class(&mut stdin, &mut reader, &workspace);

    let mut marks = serde_json::Map::new();
    marks.insert(fx.student_ids[0].to_string(), json!("present"));
    let resp = request(
        &mut stdin,
        &mut reader,
        "badscope",
        "attendance.updateMany",
        json!({
            "actor": actor(&fx),
            "eventKind": "meeting",
            "eventId": fx.meeting_id,
            "scope": "some",
            "marks": marks
        }),
    );
    assert_eq!(resp["ok"].as_bool(), Some(false));
    assert_eq!(resp["error"]["code"].as_str(), Some("bad_params"));
}
