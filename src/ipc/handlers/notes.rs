use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{ensure_student, required_i64, required_text, today, with_conn, Handler};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn notes_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let note = required_text(params, "note")?;
    ensure_student(conn, student_id)?;
    let date = today();

    conn.execute(
        "INSERT INTO activities(student_id, date, note) VALUES(?, ?, ?)",
        (student_id, &date, &note),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "activities" }))
    })?;
    Ok(json!({ "noteId": conn.last_insert_rowid(), "date": date }))
}

fn notes_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    ensure_student(conn, student_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, date, note FROM activities
             WHERE student_id = ?
             ORDER BY date, id",
        )
        .map_err(HandlerErr::db("db_query_failed"))?;
    let notes = stmt
        .query_map([student_id], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "date": r.get::<_, String>(1)?,
                "note": r.get::<_, String>(2)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db("db_query_failed"))?;
    Ok(json!({ "notes": notes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "notes.add" => notes_add,
        "notes.list" => notes_list,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
