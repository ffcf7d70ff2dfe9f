use crate::import::{self, ImportError};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{required_text, with_conn, Handler};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

impl From<ImportError> for HandlerErr {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::MissingColumns(missing) => HandlerErr::new(
                "missing_columns",
                format!(
                    "Missing required columns! Required: {}",
                    import::REQUIRED_COLUMNS.join(", ")
                ),
            )
            .with_details(json!({ "missing": missing })),
            ImportError::Db(e) => HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "students" })),
            other => HandlerErr::new("import_read_failed", other.to_string()),
        }
    }
}

fn import_preview(
    _conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_text(params, "path")?);
    let preview = import::preview(&path)?;
    Ok(json!(preview))
}

fn import_students(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_text(params, "path")?);
    let inserted = import::import_students(conn, &path)?;
    Ok(json!({ "inserted": inserted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "students.importPreview" => import_preview,
        "students.import" => import_students,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
