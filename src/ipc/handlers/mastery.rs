use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_iso, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const STATUS_PRESENTED: &str = "presented";
const STATUS_PRACTICING: &str = "practicing";
const STATUS_MASTERED: &str = "mastered";

fn valid_status(status: &str) -> bool {
    matches!(status, STATUS_PRESENTED | STATUS_PRACTICING | STATUS_MASTERED)
}

fn student_level(conn: &Connection, student_id: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT level_id FROM students WHERE id = ?",
        [student_id],
        |r| r.get(0),
    )
    .optional()
}

fn handle_mastery_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match required_str(req, "status") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    if !valid_status(&status) {
        return err(
            &req.id,
            "bad_params",
            "status must be one of: presented, practicing, mastered",
            None,
        );
    }

    match student_level(conn, &student_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let item_exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM scope_sequence_items WHERE id = ?",
            [&item_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if item_exists.is_none() {
        return err(&req.id, "not_found", "scope-sequence item not found", None);
    }

    let now = now_iso();
    let mastered_at = if status == STATUS_MASTERED {
        Some(now.clone())
    } else {
        None
    };
    // first_presented_at survives status changes; mastered_at is cleared on
    // a downgrade so the digest never counts stale masteries.
    let result = conn.execute(
        "INSERT INTO mastery_records(
            student_id, item_id, status, first_presented_at, mastered_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, item_id) DO UPDATE SET
            status = excluded.status,
            mastered_at = excluded.mastered_at,
            updated_at = excluded.updated_at",
        (&student_id, &item_id, &status, &now, &mastered_at, &now),
    );
    match result {
        Ok(_) => ok(&req.id, json!({ "studentId": student_id, "itemId": item_id, "status": status })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_mastery_grid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level_id = match student_level(conn, &student_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT si.id, si.title, s.name, si.sequence_order,
                mr.status, mr.first_presented_at, mr.mastered_at
         FROM scope_sequence_items si
         JOIN subjects s ON s.id = si.subject_id
         LEFT JOIN mastery_records mr
           ON mr.item_id = si.id AND mr.student_id = ?1
         WHERE si.level_id = ?2
         ORDER BY si.sequence_order, si.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&student_id, &level_id), |r| {
            Ok(json!({
                "itemId": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "subjectName": r.get::<_, String>(2)?,
                "sequenceOrder": r.get::<_, i64>(3)?,
                "status": r.get::<_, Option<String>>(4)?,
                "firstPresentedAt": r.get::<_, Option<String>>(5)?,
                "masteredAt": r.get::<_, Option<String>>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(items) => ok(&req.id, json!({ "studentId": student_id, "items": items })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_mastery_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level_id = match student_level(conn, &student_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT s.name,
                COUNT(*) AS total,
                SUM(CASE WHEN mr.status = 'presented' THEN 1 ELSE 0 END),
                SUM(CASE WHEN mr.status = 'practicing' THEN 1 ELSE 0 END),
                SUM(CASE WHEN mr.status = 'mastered' THEN 1 ELSE 0 END)
         FROM scope_sequence_items si
         JOIN subjects s ON s.id = si.subject_id
         LEFT JOIN mastery_records mr
           ON mr.item_id = si.id AND mr.student_id = ?1
         WHERE si.level_id = ?2
         GROUP BY s.name
         ORDER BY s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&student_id, &level_id), |r| {
            let total: i64 = r.get(1)?;
            let mastered: i64 = r.get::<_, Option<i64>>(4)?.unwrap_or(0);
            let percent = if total > 0 {
                (100.0 * mastered as f64 / total as f64 * 10.0).round() / 10.0
            } else {
                0.0
            };
            Ok(json!({
                "subjectName": r.get::<_, String>(0)?,
                "total": total,
                "presented": r.get::<_, Option<i64>>(2)?.unwrap_or(0),
                "practicing": r.get::<_, Option<i64>>(3)?.unwrap_or(0),
                "mastered": mastered,
                "percentMastered": percent,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(subjects) => ok(&req.id, json!({ "studentId": student_id, "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "mastery.set" => Some(handle_mastery_set(state, req)),
        "mastery.grid" => Some(handle_mastery_grid(state, req)),
        "mastery.summary" => Some(handle_mastery_summary(state, req)),
        _ => None,
    }
}
