use crate::insights::{self, ChatClient};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{iso, required_date, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

struct RangeParams {
    class_section: String,
    start: String,
    end: String,
}

/// Class label is used as given (no trimming) to match stored labels exactly.
fn parse_range(params: &serde_json::Value) -> Result<RangeParams, HandlerErr> {
    let class_section = required_str(params, "classSection")?;
    if class_section.trim().is_empty() {
        return Err(HandlerErr::bad_params("classSection must not be empty"));
    }
    let start = required_date(params, "start")?;
    let end = required_date(params, "end")?;
    if end < start {
        return Err(HandlerErr::bad_params("end must not be before start"));
    }
    Ok(RangeParams {
        class_section,
        start: iso(start),
        end: iso(end),
    })
}

fn transcript_for(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(String, insights::ClassRecords), HandlerErr> {
    let r = parse_range(params)?;
    let records = insights::fetch_class_records(conn, &r.class_section, &r.start, &r.end)
        .map_err(HandlerErr::db("db_query_failed"))?;
    let transcript = insights::build_transcript(&r.class_section, &r.start, &r.end, &records);
    Ok((transcript, records))
}

fn insights_preview(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (transcript, records) = transcript_for(conn, params)?;
    Ok(json!({
        "transcript": transcript,
        "counts": {
            "attendance": records.attendance.len(),
            "remarks": records.remarks.len(),
            "notes": records.notes.len()
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "insights.preview" => Some(with_conn(state, req, insights_preview)),
        "insights.generate" => {
            let client = ChatClient::new(state.config.ai.clone());
            Some(with_conn(state, req, |conn, params| {
                let (transcript, _) = transcript_for(conn, params)?;
                Ok(json!(insights::summarize_or_fallback(&client, transcript)))
            }))
        }
        _ => None,
    }
}
