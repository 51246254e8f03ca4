use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_ping(req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "pong": true, "version": env!("CARGO_PKG_VERSION") }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = PathBuf::from(&path);
    match db::open_db(&workspace) {
        Ok(conn) => {
            state.workspace = Some(workspace);
            state.db = Some(conn);
            ok(&req.id, json!({ "workspace": path }))
        }
        Err(e) => err(&req.id, "db_open_failed", e.to_string(), None),
    }
}

fn handle_workspace_info(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let count = |table: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
    };
    let counts = (|| -> Result<serde_json::Value, rusqlite::Error> {
        Ok(json!({
            "guardians": count("guardians")?,
            "students": count("students")?,
            "materials": count("materials_inventory")?,
            "scopeItems": count("scope_sequence_items")?,
            "greatLessons": count("great_lessons")?,
            "forumThreads": count("forum_threads")?,
        }))
    })();
    match counts {
        Ok(counts) => ok(
            &req.id,
            json!({
                "workspace": state
                    .workspace
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                "counts": counts,
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ping" => Some(handle_ping(req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.info" => Some(handle_workspace_info(state, req)),
        _ => None,
    }
}
