use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    ensure_student, iso, required_date, required_i64, required_str, required_text, today,
    with_conn, Handler,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{HashMap, HashSet};

const UPSERT_ATTENDANCE: &str = "INSERT INTO attendance(student_id, date, status)
     VALUES(?, ?, ?)
     ON CONFLICT(student_id, date) DO UPDATE SET
       status = excluded.status";

fn parse_status(raw: &str) -> Result<&'static str, HandlerErr> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "present" => Ok("Present"),
        "absent" => Ok("Absent"),
        _ => Err(HandlerErr::bad_params("status must be Present or Absent")
            .with_details(json!({ "status": raw }))),
    }
}

fn status_on(
    conn: &Connection,
    student_id: i64,
    date: &str,
) -> Result<Option<String>, HandlerErr> {
    conn.query_row(
        "SELECT status FROM attendance WHERE student_id = ? AND date = ?",
        (student_id, date),
        |r| r.get(0),
    )
    .optional()
    .map_err(HandlerErr::db("db_query_failed"))
}

fn class_students(conn: &Connection, class_section: &str) -> Result<Vec<db::Student>, HandlerErr> {
    db::students_in_class(conn, Some(class_section)).map_err(HandlerErr::db("db_query_failed"))
}

fn attendance_sheet_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_section = required_text(params, "classSection")?;
    let date = today();
    let students = class_students(conn, &class_section)?;

    let mut rows = Vec::with_capacity(students.len());
    for s in students {
        let status = status_on(conn, s.id, &date)?;
        rows.push(json!({
            "studentId": s.id,
            "name": s.name,
            "rollNo": s.roll_no,
            "status": status
        }));
    }
    Ok(json!({
        "date": date,
        "classSection": class_section,
        "students": rows
    }))
}

/// Parses `statuses` and checks it covers every student of the class exactly once.
fn collect_statuses(
    params: &serde_json::Value,
    class_ids: &[i64],
) -> Result<Vec<(i64, &'static str)>, HandlerErr> {
    let Some(entries) = params.get("statuses").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing statuses"));
    };
    let expected: HashSet<i64> = class_ids.iter().copied().collect();
    let mut chosen: HashMap<i64, &'static str> = HashMap::new();
    for entry in entries {
        let student_id = required_i64(entry, "studentId")?;
        let status = parse_status(&required_str(entry, "status")?)?;
        if !expected.contains(&student_id) {
            return Err(HandlerErr::bad_params("student is not in this class")
                .with_details(json!({ "studentId": student_id })));
        }
        if chosen.insert(student_id, status).is_some() {
            return Err(HandlerErr::bad_params("duplicate status for student")
                .with_details(json!({ "studentId": student_id })));
        }
    }
    let missing: Vec<i64> = class_ids
        .iter()
        .copied()
        .filter(|id| !chosen.contains_key(id))
        .collect();
    if !missing.is_empty() {
        return Err(HandlerErr::bad_params("every student needs a status")
            .with_details(json!({ "missingStudentIds": missing })));
    }
    Ok(class_ids.iter().map(|id| (*id, chosen[id])).collect())
}

fn attendance_save_today(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_section = required_text(params, "classSection")?;
    let students = class_students(conn, &class_section)?;
    if students.is_empty() {
        return Err(HandlerErr::not_found(format!(
            "No students in Class/Section: {}",
            class_section
        )));
    }
    let ids: Vec<i64> = students.iter().map(|s| s.id).collect();
    let statuses = collect_statuses(params, &ids)?;
    let date = today();

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db("db_tx_failed"))?;
    for (student_id, status) in &statuses {
        tx.execute(UPSERT_ATTENDANCE, (student_id, &date, status))
            .map_err(|e| {
                HandlerErr::new("db_update_failed", e.to_string())
                    .with_details(json!({ "table": "attendance" }))
            })?;
    }
    tx.commit().map_err(HandlerErr::db("db_commit_failed"))?;

    tracing::info!(%class_section, %date, saved = statuses.len(), "attendance saved");
    Ok(json!({ "date": date, "saved": statuses.len() }))
}

fn attendance_set_student_day(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let date = iso(required_date(params, "date")?);
    let status = parse_status(&required_str(params, "status")?)?;
    ensure_student(conn, student_id)?;

    conn.execute(UPSERT_ATTENDANCE, (student_id, &date, status))
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "attendance" }))
        })?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "attendance.sheetOpen" => attendance_sheet_open,
        "attendance.saveToday" => attendance_save_today,
        "attendance.setStudentDay" => attendance_set_student_day,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_test_student, test_conn};

    #[test]
    fn status_names_are_canonicalized() {
        assert_eq!(parse_status(" present ").expect("present"), "Present");
        assert_eq!(parse_status("ABSENT").expect("absent"), "Absent");
        assert!(parse_status("Late").is_err());
    }

    #[test]
    fn statuses_must_cover_the_class_exactly_once() {
        let ids = [1, 2];
        let ok = collect_statuses(
            &json!({ "statuses": [
                { "studentId": 2, "status": "Absent" },
                { "studentId": 1, "status": "Present" }
            ]}),
            &ids,
        )
        .expect("complete");
        assert_eq!(ok, vec![(1, "Present"), (2, "Absent")]);

        let missing = collect_statuses(
            &json!({ "statuses": [{ "studentId": 1, "status": "Present" }] }),
            &ids,
        );
        assert!(missing.is_err());

        let foreign = collect_statuses(
            &json!({ "statuses": [
                { "studentId": 1, "status": "Present" },
                { "studentId": 2, "status": "Present" },
                { "studentId": 9, "status": "Present" }
            ]}),
            &ids,
        );
        assert!(foreign.is_err());

        let dup = collect_statuses(
            &json!({ "statuses": [
                { "studentId": 1, "status": "Present" },
                { "studentId": 1, "status": "Absent" },
                { "studentId": 2, "status": "Present" }
            ]}),
            &ids,
        );
        assert!(dup.is_err());
    }

    #[test]
    fn second_save_for_a_day_replaces_the_first() {
        let conn = test_conn();
        let sid = insert_test_student(&conn, "Asha", "5-A");
        for status in ["Present", "Absent"] {
            attendance_set_student_day(
                &conn,
                &json!({ "studentId": sid, "date": "2024-06-03", "status": status }),
            )
            .expect("set day");
        }
        let rows: Vec<String> = conn
            .prepare("SELECT status FROM attendance WHERE student_id = ? AND date = '2024-06-03'")
            .expect("prepare")
            .query_map([sid], |r| r.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("collect");
        assert_eq!(rows, vec!["Absent".to_string()]);
    }
}
