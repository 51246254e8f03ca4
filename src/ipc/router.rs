use crate::ipc::error::err;
use crate::ipc::handlers;
use crate::ipc::types::{AppState, Request};

/// Dispatch one request to the first handler area that claims its method.
pub fn handle_request(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::catalog::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::mastery::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::workplan::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::forum::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::dashboard::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::digest::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::backup_exchange::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
