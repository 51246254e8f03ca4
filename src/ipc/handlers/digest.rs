use crate::digest;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_iso, optional_bool, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

use super::workplan::resolve_year_week;

fn digest_json(d: &digest::GuardianDigest) -> serde_json::Value {
    json!({
        "guardianId": d.guardian_id,
        "email": d.email,
        "displayName": d.display_name,
        "schoolYear": d.school_year,
        "week": d.week,
        "repliesInWeek": d.replies_in_week,
        "subject": digest::render_subject(d),
        "body": digest::render_body(d),
        "students": d.students.iter().map(|s| json!({
            "studentId": s.student_id,
            "displayName": s.display_name,
            "planItemsTotal": s.plan_items_total,
            "planItemsCompleted": s.plan_items_completed,
            "masteredInWeek": s.mastered_in_week,
        })).collect::<Vec<_>>(),
    })
}

fn handle_week_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let guardian_id = match required_str(req, "guardianId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (school_year, week) = match resolve_year_week(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match digest::build_guardian_digest(conn, &guardian_id, school_year, week) {
        Ok(Some(d)) => ok(&req.id, digest_json(&d)),
        Ok(None) => err(&req.id, "not_found", format!("no guardian {}", guardian_id), None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_week_queue(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (school_year, week) = match resolve_year_week(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match digest::queue_digests(conn, school_year, week) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "schoolYear": summary.school_year,
                "week": summary.week,
                "queued": summary.queued,
                "alreadyQueued": summary.already_queued,
            }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_outbox_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pending_only = match optional_bool(req, "pendingOnly", false) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = match conn
        .prepare(
            "SELECT o.id, o.guardian_id, g.email, o.school_year, o.week, o.subject,
                    o.queued_at, o.sent_at
             FROM email_outbox o
             JOIN guardians g ON g.id = o.guardian_id
             WHERE ?1 = 0 OR o.sent_at IS NULL
             ORDER BY o.queued_at DESC",
        )
        .and_then(|mut stmt| {
            stmt.query_map([pending_only as i64], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "guardianId": r.get::<_, String>(1)?,
                    "email": r.get::<_, String>(2)?,
                    "schoolYear": r.get::<_, i64>(3)?,
                    "week": r.get::<_, i64>(4)?,
                    "subject": r.get::<_, String>(5)?,
                    "queuedAt": r.get::<_, String>(6)?,
                    "sentAt": r.get::<_, Option<String>>(7)?,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()
        }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "messages": rows }))
}

fn handle_outbox_mark_sent(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let message_id = match required_str(req, "messageId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute(
        "UPDATE email_outbox SET sent_at = ? WHERE id = ? AND sent_at IS NULL",
        (now_iso(), &message_id),
    ) {
        Ok(0) => err(
            &req.id,
            "not_found",
            format!("no unsent outbox message {}", message_id),
            None,
        ),
        Ok(_) => ok(&req.id, json!({ "id": message_id, "sent": true })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "digest.week.preview" => Some(handle_week_preview(state, req)),
        "digest.week.queue" => Some(handle_week_queue(state, req)),
        "digest.outbox.list" => Some(handle_outbox_list(state, req)),
        "digest.outbox.markSent" => Some(handle_outbox_mark_sent(state, req)),
        _ => None,
    }
}
