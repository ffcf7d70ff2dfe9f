use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[TryHandle] = &[
    handlers::core::try_handle,
    handlers::students::try_handle,
    handlers::import::try_handle,
    handlers::attendance::try_handle,
    handlers::notes::try_handle,
    handlers::remarks::try_handle,
    handlers::reports::try_handle,
    handlers::insights::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for try_handle in HANDLERS {
        if let Some(resp) = try_handle(state, &req) {
            tracing::debug!(
                method = %req.method,
                ok = resp.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
                "handled request"
            );
            return resp;
        }
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
