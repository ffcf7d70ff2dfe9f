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
    let exe = env!("CARGO_BIN_EXE_classbookd");
    let mut child = Command::new(exe)
        .env("CLASSBOOK_AI_ENABLED", "false")
        .env_remove("CLASSBOOK_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classbookd");
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
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "expected error: {}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}


fn open_workspace(prefix: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (child, stdin, reader)
}

fn student_count(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> usize {
    request_ok(stdin, reader, "count", "students.list", json!({ "classSection": "All" }))
        .get("students")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0)
}

#[test]
fn create_requires_name_roll_and_class() {
    let (_child, mut stdin, mut reader) = open_workspace("classbook-students-create");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({
            "name": "Asha Rao",
            "rollNo": "12",
            "classSection": "5-A",
            "fatherName": "Vikram Rao",
            "contact": "555-0101"
        }),
    );
    let student_id = created["studentId"].as_i64().expect("studentId");

    let listed = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    let students = listed["students"].as_array().cloned().unwrap_or_default();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["id"], json!(student_id));
    assert_eq!(students[0]["name"], json!("Asha Rao"));
    assert_eq!(students[0]["rollNo"], json!("12"));
    assert_eq!(students[0]["classSection"], json!("5-A"));
    assert_eq!(students[0]["fatherName"], json!("Vikram Rao"));
    assert_eq!(students[0]["contact"], json!("555-0101"));
    assert_eq!(students[0]["photo"], json!(""));

    for (i, params) in [
        json!({ "name": "", "rollNo": "13", "classSection": "5-A" }),
        json!({ "name": "Bilal", "rollNo": "  ", "classSection": "5-A" }),
        json!({ "name": "Bilal", "rollNo": "13" }),
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request(&mut stdin, &mut reader, &format!("bad{i}"), "students.create", params);
        assert_eq!(error_code(&resp), "bad_params");
    }
    assert_eq!(student_count(&mut stdin, &mut reader), 1);
}

#[test]
fn list_filters_by_trimmed_class_and_classes_are_distinct() {
    let (_child, mut stdin, mut reader) = open_workspace("classbook-students-filter");
    for (i, (name, class)) in [("Asha", "5-A"), ("Bilal", "6-B"), ("Chen", "5-A"), ("Dev", "4-C")]
        .iter()
        .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{i}"),
            "students.create",
            json!({ "name": name, "rollNo": format!("{i}"), "classSection": class }),
        );
    }

    let five_a = request_ok(
        &mut stdin,
        &mut reader,
        "f",
        "students.list",
        json!({ "classSection": " 5-A " }),
    );
    let names: Vec<&str> = five_a["students"]
        .as_array()
        .map(|a| a.iter().filter_map(|s| s["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["Asha", "Chen"]);
    assert_eq!(five_a["classSection"], json!("5-A"));

    let classes = request_ok(&mut stdin, &mut reader, "cl", "classes.list", json!({}));
    assert_eq!(classes["classes"], json!(["4-C", "5-A", "6-B"]));
}

#[test]
fn update_overwrites_every_field_trimmed() {
    let (_child, mut stdin, mut reader) = open_workspace("classbook-students-update");
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "name": "Asha", "rollNo": "1", "classSection": "5-A", "contact": "555" }),
    );
    let student_id = created["studentId"].as_i64().expect("studentId");

    let partial = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.update",
        json!({ "studentId": student_id, "name": "Asha R" }),
    );
    assert_eq!(error_code(&partial), "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.update",
        json!({
            "studentId": student_id,
            "name": "  Asha R ",
            "rollNo": "01",
            "classSection": " 6-A",
            "fatherName": "",
            "contact": "",
            "photo": " photos/asha.png "
        }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(got["student"]["name"], json!("Asha R"));
    assert_eq!(got["student"]["rollNo"], json!("01"));
    assert_eq!(got["student"]["classSection"], json!("6-A"));
    assert_eq!(got["student"]["contact"], json!(""));
    assert_eq!(got["student"]["photo"], json!("photos/asha.png"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.update",
        json!({
            "studentId": 999,
            "name": "x", "rollNo": "x", "classSection": "x",
            "fatherName": "", "contact": "", "photo": ""
        }),
    );
    assert_eq!(error_code(&missing), "not_found");
}

#[test]
fn delete_removes_attendance_notes_and_remarks() {
    let (_child, mut stdin, mut reader) = open_workspace("classbook-students-delete");
    let ids: Vec<i64> = ["Asha", "Bilal"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            request_ok(
                &mut stdin,
                &mut reader,
                &format!("c{i}"),
                "students.create",
                json!({ "name": name, "rollNo": format!("{i}"), "classSection": "5-A" }),
            )["studentId"]
                .as_i64()
                .expect("studentId")
        })
        .collect();
    let (victim, keeper) = (ids[0], ids[1]);

    for (i, sid) in ids.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a{i}"),
            "attendance.setStudentDay",
            json!({ "studentId": sid, "date": "2024-06-03", "status": "Present" }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("n{i}"),
            "notes.add",
            json!({ "studentId": sid, "note": "Helped set up the lab" }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{i}"),
            "remarks.set",
            json!({ "studentId": sid, "date": "2024-06-03", "remark": "Attentive" }),
        );
    }

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "del",
        "students.delete",
        json!({ "studentId": victim }),
    );
    assert_eq!(deleted["deleted"]["attendance"], json!(1));
    assert_eq!(deleted["deleted"]["activities"], json!(1));
    assert_eq!(deleted["deleted"]["remarks"], json!(1));

    let gone = request(
        &mut stdin,
        &mut reader,
        "hist",
        "reports.studentHistory",
        json!({ "studentId": victim }),
    );
    assert_eq!(error_code(&gone), "not_found");
    let remark = request_ok(
        &mut stdin,
        &mut reader,
        "rg",
        "remarks.get",
        json!({ "studentId": victim, "date": "2024-06-03" }),
    );
    assert!(remark["remark"].is_null());

    let kept = request_ok(
        &mut stdin,
        &mut reader,
        "kept",
        "reports.studentHistory",
        json!({ "studentId": keeper }),
    );
    assert_eq!(kept["attendance"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(kept["notes"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(kept["remarks"].as_array().map(|a| a.len()), Some(1));

    let again = request(
        &mut stdin,
        &mut reader,
        "del2",
        "students.delete",
        json!({ "studentId": victim }),
    );
    assert_eq!(error_code(&again), "not_found");
}
