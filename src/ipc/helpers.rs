use chrono::NaiveDate;
use rusqlite::Connection;

use super::error::{err, ok, HandlerErr};
use super::types::{AppState, Request};

pub const ISO_DATE: &str = "%Y-%m-%d";

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Required and non-empty after trimming; returns the trimmed value.
pub fn required_text(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let v = required_str(params, key)?;
    let t = v.trim();
    if t.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(t.to_string())
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key)))
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), ISO_DATE).map_err(|_| {
        HandlerErr::bad_params(format!("{} must be a YYYY-MM-DD date", key))
    })
}

pub fn required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(&required_str(params, key)?, key)
}

pub fn iso(d: NaiveDate) -> String {
    d.format(ISO_DATE).to_string()
}

/// Calendar date at the moment of the call, local time.
pub fn today() -> String {
    iso(chrono::Local::now().date_naive())
}

/// `None` for an absent filter or "All", otherwise the trimmed label.
pub fn class_filter(params: &serde_json::Value) -> Option<String> {
    optional_str(params, "classSection")
        .map(|c| crate::db::trim_class_label(&c).to_string())
        .filter(|c| !c.is_empty() && c != "All")
}

pub fn with_conn<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            tracing::warn!(method = %req.method, code = error.code, message = %error.message, "request failed");
            error.response(&req.id)
        }
    }
}

pub fn ensure_student(conn: &Connection, student_id: i64) -> Result<crate::db::Student, HandlerErr> {
    crate::db::find_student(conn, student_id)
        .map_err(HandlerErr::db("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))
}

pub type Handler =
    fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;
