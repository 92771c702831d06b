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

// The single-entry validator and the roster resolver must agree on every
// (student, event) pair: a scan succeeds exactly when the projection lists
// the student.
#[test]
fn scan_acceptance_matches_roster_membership() {
    let workspace = temp_dir("campus-membership-consistency");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let cse = request_ok(
        &mut stdin,
        &mut reader,
        "dept",
        "directory.addDepartment",
        json!({ "name": "CSE" }),
    )["departmentId"]
        .as_i64()
        .unwrap();
    let ece = request_ok(
        &mut stdin,
        &mut reader,
        "dept2",
        "directory.addDepartment",
        json!({ "name": "ECE" }),
    )["departmentId"]
        .as_i64()
        .unwrap();
    let faculty_id = request_ok(
        &mut stdin,
        &mut reader,
        "fac",
        "directory.addFaculty",
        json!({ "name": "Prof. Rao", "departmentId": cse }),
    )["facultyId"]
        .as_i64()
        .unwrap();
    let batch_id = request_ok(
        &mut stdin,
        &mut reader,
        "batch",
        "directory.addBatch",
        json!({ "name": "Placement A", "departmentId": cse }),
    )["batchId"]
        .as_i64()
        .unwrap();

    // A deliberately mixed population: wrong section, wrong year, wrong
    // department, inactive batch member, and proper members of each roster.
    let population = [
        ("2021CS001", cse, "A", 2, Some(true)),
        ("2021CS002", cse, "A", 2, None),
        ("2021CS003", cse, "B", 2, Some(true)),
        ("2021CS004", cse, "A", 3, Some(false)),
        ("2021EC001", ece, "A", 2, None),
    ];
    let mut rolls: Vec<String> = Vec::new();
    for (i, (roll, dept, section, year, membership)) in population.iter().enumerate() {
        let student_id = request_ok(
            &mut stdin,
            &mut reader,
            &format!("stu{i}"),
            "directory.addStudent",
            json!({
                "rollNumber": roll,
                "registerNumber": format!("REG{:05}", i),
                "name": format!("Student {:02}", i),
                "departmentId": dept,
                "section": section,
                "yearOfStudy": year
            }),
        )["studentId"]
            .as_i64()
            .unwrap();
        if let Some(active) = membership {
            let _ = request_ok(
                &mut stdin,
                &mut reader,
                &format!("bm{i}"),
                "directory.setBatchMembership",
                json!({ "batchId": batch_id, "studentId": student_id, "active": active }),
            );
        }
        rolls.push(roll.to_string());
    }

    let meeting_id = request_ok(
        &mut stdin,
        &mut reader,
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
            "departmentId": cse,
            "facultyId": faculty_id
        }),
    )["eventId"]
        .as_i64()
        .unwrap();
    let training_id = request_ok(
        &mut stdin,
        &mut reader,
        "training",
        "schedule.addTraining",
        json!({
            "date": "2026-08-06",
            "startTime": "14:00",
            "endTime": "16:00",
            "topic": "Aptitude",
            "batchId": batch_id,
            "departmentId": cse,
            "trainerName": "Meera Iyer"
        }),
    )["eventId"]
        .as_i64()
        .unwrap();

    let actor = json!({ "actorId": faculty_id, "role": "faculty", "departmentId": cse });
    for (kind, event_id) in [("meeting", meeting_id), ("training", training_id)] {
        let page = request_ok(
            &mut stdin,
            &mut reader,
            &format!("page-{kind}"),
            "attendance.rosterPage",
            json!({ "eventKind": kind, "eventId": event_id, "pageSize": 200 }),
        );
        let member_rolls: Vec<String> = page["rows"]
            .as_array()
            .expect("rows")
            .iter()
            .map(|r| r["rollNumber"].as_str().expect("roll").to_string())
            .collect();

        for (i, roll) in rolls.iter().enumerate() {
            let resp = request(
                &mut stdin,
                &mut reader,
                &format!("mark-{kind}-{i}"),
                "attendance.markOne",
                json!({
                    "actor": actor.clone(),
                    "eventKind": kind,
                    "eventId": event_id,
                    "rollNumber": roll,
                    "status": "present"
                }),
            );
            let accepted = resp["ok"].as_bool() == Some(true);
            assert_eq!(
                accepted,
                member_rolls.contains(roll),
                "validator and resolver disagree for {} on {} {}",
                roll,
                kind,
                event_id
            );
            if !accepted {
                assert_eq!(resp["error"]["code"].as_str(), Some("not_a_member"));
            }
        }
    }
}
