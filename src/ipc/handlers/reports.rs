use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{ensure_student, required_i64, required_text, with_conn, Handler};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn attendance_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_section = required_text(params, "classSection")?;
    let summary = calc::class_attendance_summary(conn, &class_section)
        .map_err(HandlerErr::db("db_query_failed"))?;
    Ok(json!(summary))
}

fn dated_rows(
    conn: &Connection,
    sql: &str,
    student_id: i64,
    text_key: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::db("db_query_failed"))?;
    let rows = stmt
        .query_map([student_id], |r| {
            let date: String = r.get(0)?;
            let text: String = r.get(1)?;
            let mut row = serde_json::Map::new();
            row.insert("date".to_string(), json!(date));
            row.insert(text_key.to_string(), json!(text));
            Ok(serde_json::Value::Object(row))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db("db_query_failed"))?;
    Ok(rows)
}

fn student_history(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student = ensure_student(conn, required_i64(params, "studentId")?)?;
    let attendance = dated_rows(
        conn,
        "SELECT date, status FROM attendance WHERE student_id = ? ORDER BY date, id",
        student.id,
        "status",
    )?;
    let notes = dated_rows(
        conn,
        "SELECT date, note FROM activities WHERE student_id = ? ORDER BY date, id",
        student.id,
        "note",
    )?;
    let remarks = dated_rows(
        conn,
        "SELECT date, remark FROM student_remarks WHERE student_id = ? ORDER BY date, id",
        student.id,
        "remark",
    )?;
    Ok(json!({
        "student": student,
        "attendance": attendance,
        "notes": notes,
        "remarks": remarks
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "reports.attendanceSummary" => attendance_summary,
        "reports.studentHistory" => student_history,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
