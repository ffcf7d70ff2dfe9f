use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    class_filter, ensure_student, optional_str, required_i64, required_str, required_text,
    with_conn, Handler,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn optional_trimmed(params: &serde_json::Value, key: &str) -> String {
    optional_str(params, key)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_text(params, "name")?;
    let roll_no = required_text(params, "rollNo")?;
    let class_section = required_text(params, "classSection")?;
    let father_name = optional_trimmed(params, "fatherName");
    let contact = optional_trimmed(params, "contact");
    let photo = optional_trimmed(params, "photo");

    conn.execute(
        "INSERT INTO students(name, roll_no, class_section, father_name, contact, photo)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&name, &roll_no, &class_section, &father_name, &contact, &photo),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "students" }))
    })?;
    let student_id = conn.last_insert_rowid();
    tracing::info!(student_id, %class_section, "student added");
    Ok(json!({ "studentId": student_id }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    // Full overwrite: every editable field must be resupplied.
    let mut values = Vec::with_capacity(6);
    for key in ["name", "rollNo", "classSection", "fatherName", "contact", "photo"] {
        values.push(required_str(params, key)?.trim().to_string());
    }

    let changed = conn
        .execute(
            "UPDATE students
             SET name = ?, roll_no = ?, class_section = ?, father_name = ?, contact = ?, photo = ?
             WHERE id = ?",
            (
                &values[0], &values[1], &values[2], &values[3], &values[4], &values[5], student_id,
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "students" }))
        })?;
    if changed == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "ok": true }))
}

fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    ensure_student(conn, student_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db("db_tx_failed"))?;
    let mut deleted = serde_json::Map::new();
    for (table, key) in [
        ("attendance", "attendance"),
        ("activities", "activities"),
        ("student_remarks", "remarks"),
    ] {
        let n = tx
            .execute(
                &format!("DELETE FROM {table} WHERE student_id = ?"),
                [student_id],
            )
            .map_err(|e| {
                HandlerErr::new("db_delete_failed", e.to_string())
                    .with_details(json!({ "table": table }))
            })?;
        deleted.insert(key.to_string(), json!(n));
    }
    tx.execute("DELETE FROM students WHERE id = ?", [student_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "students" }))
        })?;
    tx.commit().map_err(HandlerErr::db("db_commit_failed"))?;

    tracing::info!(student_id, "student deleted");
    Ok(json!({ "deleted": deleted }))
}

fn students_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student = ensure_student(conn, required_i64(params, "studentId")?)?;
    Ok(json!({ "student": student }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let filter = class_filter(params);
    let students = db::students_in_class(conn, filter.as_deref())
        .map_err(HandlerErr::db("db_query_failed"))?;
    Ok(json!({
        "classSection": filter.unwrap_or_else(|| "All".to_string()),
        "students": students
    }))
}

fn classes_list(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT DISTINCT {trimmed}
             FROM students
             WHERE {trimmed} <> ''
             ORDER BY 1",
            trimmed = db::TRIMMED_CLASS_SQL
        ))
        .map_err(HandlerErr::db("db_query_failed"))?;
    let classes = stmt
        .query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db("db_query_failed"))?;
    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "students.create" => students_create,
        "students.update" => students_update,
        "students.delete" => students_delete,
        "students.get" => students_get,
        "students.list" => students_list,
        "classes.list" => classes_list,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
