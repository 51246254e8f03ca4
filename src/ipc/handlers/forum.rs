use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_iso, optional_i64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_threads_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let limit = match optional_i64(req, "limit") {
        Ok(v) => v.unwrap_or(50).clamp(1, 200),
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT t.id, t.title, t.created_at, t.updated_at, g.display_name,
                (SELECT COUNT(*) FROM forum_replies r WHERE r.thread_id = t.id)
         FROM forum_threads t
         JOIN guardians g ON g.id = t.guardian_id
         ORDER BY t.updated_at DESC
         LIMIT ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([limit], |r| {
            Ok(json!({
                "threadId": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "createdAt": r.get::<_, Option<String>>(2)?,
                "updatedAt": r.get::<_, Option<String>>(3)?,
                "authorName": r.get::<_, String>(4)?,
                "replyCount": r.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(threads) => ok(&req.id, json!({ "threads": threads })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_threads_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let guardian_id = match required_str(req, "guardianId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let body = match required_str(req, "body") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM guardians WHERE id = ?", [&guardian_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "guardian not found", None);
    }

    let thread_id = Uuid::new_v4().to_string();
    let now = now_iso();
    if let Err(e) = conn.execute(
        "INSERT INTO forum_threads(id, guardian_id, title, body, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&thread_id, &guardian_id, &title, &body, &now, &now),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "forum_threads" })),
        );
    }
    ok(&req.id, json!({ "threadId": thread_id }))
}

fn handle_threads_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let thread_id = match required_str(req, "threadId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let thread = match conn
        .query_row(
            "SELECT t.title, t.body, t.created_at, t.updated_at, g.id, g.display_name
             FROM forum_threads t
             JOIN guardians g ON g.id = t.guardian_id
             WHERE t.id = ?",
            [&thread_id],
            |r| {
                Ok(json!({
                    "threadId": thread_id,
                    "title": r.get::<_, String>(0)?,
                    "body": r.get::<_, String>(1)?,
                    "createdAt": r.get::<_, Option<String>>(2)?,
                    "updatedAt": r.get::<_, Option<String>>(3)?,
                    "authorId": r.get::<_, String>(4)?,
                    "authorName": r.get::<_, String>(5)?,
                }))
            },
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "thread not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT r.id, r.body, r.created_at, g.id, g.display_name
         FROM forum_replies r
         JOIN guardians g ON g.id = r.guardian_id
         WHERE r.thread_id = ?
         ORDER BY r.created_at, r.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let replies = stmt
        .query_map([&thread_id], |r| {
            Ok(json!({
                "replyId": r.get::<_, String>(0)?,
                "body": r.get::<_, String>(1)?,
                "createdAt": r.get::<_, Option<String>>(2)?,
                "authorId": r.get::<_, String>(3)?,
                "authorName": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match replies {
        Ok(replies) => ok(&req.id, json!({ "thread": thread, "replies": replies })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_replies_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let thread_id = match required_str(req, "threadId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let guardian_id = match required_str(req, "guardianId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let body = match required_str(req, "body") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let thread_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM forum_threads WHERE id = ?", [&thread_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if thread_exists.is_none() {
        return err(&req.id, "not_found", "thread not found", None);
    }
    let guardian_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM guardians WHERE id = ?", [&guardian_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if guardian_exists.is_none() {
        return err(&req.id, "not_found", "guardian not found", None);
    }

    let reply_id = Uuid::new_v4().to_string();
    let now = now_iso();
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let inserted = tx
        .execute(
            "INSERT INTO forum_replies(id, thread_id, guardian_id, body, created_at)
             VALUES(?, ?, ?, ?, ?)",
            (&reply_id, &thread_id, &guardian_id, &body, &now),
        )
        .and_then(|_| {
            // Bump the thread so the list surfaces fresh activity first.
            tx.execute(
                "UPDATE forum_threads SET updated_at = ? WHERE id = ?",
                (&now, &thread_id),
            )
        });
    if let Err(e) = inserted {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "forum_replies" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "replyId": reply_id }))
}

fn handle_replies_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let reply_id = match required_str(req, "replyId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let guardian_id = match required_str(req, "guardianId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let author: Option<String> = match conn
        .query_row(
            "SELECT guardian_id FROM forum_replies WHERE id = ?",
            [&reply_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(author) = author else {
        return err(&req.id, "not_found", "reply not found", None);
    };
    if author != guardian_id {
        return err(&req.id, "forbidden", "only the author may delete a reply", None);
    }

    match conn.execute("DELETE FROM forum_replies WHERE id = ?", [&reply_id]) {
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "forum.threads.list" => Some(handle_threads_list(state, req)),
        "forum.threads.create" => Some(handle_threads_create(state, req)),
        "forum.threads.open" => Some(handle_threads_open(state, req)),
        "forum.replies.create" => Some(handle_replies_create(state, req)),
        "forum.replies.delete" => Some(handle_replies_delete(state, req)),
        _ => None,
    }
}
