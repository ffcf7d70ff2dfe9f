use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    class_filter, ensure_student, iso, parse_date, required_date, required_i64, required_str,
    with_conn, Handler,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

const MAX_GRID_DAYS: i64 = 31;
const MAX_RANGE_DAYS: i64 = 366;

/// Column dates for a grid: either `[start, end]` inclusive or `days`
/// consecutive dates from `start`.
fn grid_dates(params: &serde_json::Value) -> Result<Vec<NaiveDate>, HandlerErr> {
    let start = required_date(params, "start")?;
    let has_end = params.get("end").map(|v| !v.is_null()).unwrap_or(false);
    let has_days = params.get("days").map(|v| !v.is_null()).unwrap_or(false);

    let count = match (has_end, has_days) {
        (true, false) => {
            let end = required_date(params, "end")?;
            if end < start {
                return Err(HandlerErr::bad_params("end must not be before start"));
            }
            let span = (end - start).num_days() + 1;
            if span > MAX_RANGE_DAYS {
                return Err(HandlerErr::bad_params(format!(
                    "date range must not exceed {} days",
                    MAX_RANGE_DAYS
                )));
            }
            span
        }
        (false, true) => {
            let days = required_i64(params, "days")?;
            if !(1..=MAX_GRID_DAYS).contains(&days) {
                return Err(HandlerErr::bad_params(format!(
                    "days must be between 1 and {}",
                    MAX_GRID_DAYS
                )));
            }
            days
        }
        _ => return Err(HandlerErr::bad_params("provide exactly one of end or days")),
    };
    Ok(start.iter_days().take(count as usize).collect())
}

fn remarks_grid_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let dates = grid_dates(params)?;
    let filter = class_filter(params);
    let students = db::students_in_class(conn, filter.as_deref())
        .map_err(HandlerErr::db("db_query_failed"))?;

    let first = dates.first().map(|d| iso(*d)).unwrap_or_default();
    let last = dates.last().map(|d| iso(*d)).unwrap_or_default();
    let mut stmt = conn
        .prepare(
            "SELECT student_id, date, remark FROM student_remarks
             WHERE date BETWEEN ? AND ?",
        )
        .map_err(HandlerErr::db("db_query_failed"))?;
    let existing = stmt
        .query_map((&first, &last), |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db("db_query_failed"))?;
    let mut by_student: HashMap<i64, serde_json::Map<String, serde_json::Value>> = HashMap::new();
    for (student_id, date, remark) in existing {
        by_student
            .entry(student_id)
            .or_default()
            .insert(date, json!(remark));
    }

    let rows: Vec<serde_json::Value> = students
        .into_iter()
        .map(|s| {
            json!({
                "studentId": s.id,
                "name": s.name,
                "rollNo": s.roll_no,
                "remarks": by_student.remove(&s.id).unwrap_or_default()
            })
        })
        .collect();
    Ok(json!({
        "classSection": filter.unwrap_or_else(|| "All".to_string()),
        "dates": dates.into_iter().map(iso).collect::<Vec<_>>(),
        "students": rows
    }))
}

/// Stores `remark` as written for (student, date); blank text clears it.
/// Returns whether a remark is stored afterwards.
fn apply_remark(
    conn: &Connection,
    student_id: i64,
    date: &str,
    remark: &str,
) -> Result<bool, HandlerErr> {
    if remark.trim().is_empty() {
        conn.execute(
            "DELETE FROM student_remarks WHERE student_id = ? AND date = ?",
            (student_id, date),
        )
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "student_remarks" }))
        })?;
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO student_remarks(student_id, date, remark)
         VALUES(?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET
           remark = excluded.remark",
        (student_id, date, remark),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "student_remarks" }))
    })?;
    Ok(true)
}

struct RemarkCell {
    student_id: i64,
    date: String,
    remark: String,
}

fn parse_cell(conn: &Connection, v: &serde_json::Value) -> Result<RemarkCell, HandlerErr> {
    let student_id = required_i64(v, "studentId")?;
    let date = iso(parse_date(&required_str(v, "date")?, "date")?);
    let remark = required_str(v, "remark")?;
    ensure_student(conn, student_id)?;
    Ok(RemarkCell {
        student_id,
        date,
        remark,
    })
}

fn remarks_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let cell = parse_cell(conn, params)?;
    let stored = apply_remark(conn, cell.student_id, &cell.date, &cell.remark)?;
    Ok(json!({ "stored": stored }))
}

fn remarks_save_grid(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw_cells) = params.get("cells").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing cells"));
    };
    let cells = raw_cells
        .iter()
        .map(|c| parse_cell(conn, c))
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db("db_tx_failed"))?;
    let mut stored = 0usize;
    let mut cleared = 0usize;
    for cell in &cells {
        if apply_remark(&tx, cell.student_id, &cell.date, &cell.remark)? {
            stored += 1;
        } else {
            cleared += 1;
        }
    }
    tx.commit().map_err(HandlerErr::db("db_commit_failed"))?;
    tracing::debug!(stored, cleared, "remarks grid saved");
    Ok(json!({ "stored": stored, "cleared": cleared }))
}

fn remarks_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let date = iso(required_date(params, "date")?);
    let remark: Option<String> = conn
        .query_row(
            "SELECT remark FROM student_remarks WHERE student_id = ? AND date = ?",
            (student_id, &date),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db("db_query_failed"))?;
    Ok(json!({ "remark": remark }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "remarks.gridOpen" => remarks_grid_open,
        "remarks.set" => remarks_set,
        "remarks.saveGrid" => remarks_save_grid,
        "remarks.get" => remarks_get,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
