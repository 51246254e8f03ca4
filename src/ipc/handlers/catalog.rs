use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_i64, optional_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_levels_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, name, min_grade, max_grade FROM levels ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "minGrade": r.get::<_, i64>(2)?,
                "maxGrade": r.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(levels) => ok(&req.id, json!({ "levels": levels })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare("SELECT id, name FROM subjects ORDER BY sort_order") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_materials_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let query = optional_str(req, "query");
    let sql = "SELECT code, name, subject_name, level_name, location, quantity, notes
               FROM materials_inventory
               WHERE (?1 IS NULL OR code LIKE ?2 OR name LIKE ?2)
               ORDER BY code";
    let pattern = query.as_ref().map(|q| format!("%{}%", q));
    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&query, &pattern), |r| {
            Ok(json!({
                "code": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "subjectName": r.get::<_, Option<String>>(2)?,
                "levelName": r.get::<_, Option<String>>(3)?,
                "location": r.get::<_, Option<String>>(4)?,
                "quantity": r.get::<_, Option<i64>>(5)?,
                "notes": r.get::<_, Option<String>>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(materials) => ok(&req.id, json!({ "materials": materials })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_great_lessons_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT gl.lesson_number, gl.title, gl.subtitle, gl.season,
                (SELECT COUNT(*) FROM great_lesson_followups f
                 WHERE f.lesson_number = gl.lesson_number) AS followup_count
         FROM great_lessons gl
         ORDER BY gl.lesson_number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "lessonNumber": r.get::<_, i64>(0)?,
                "title": r.get::<_, String>(1)?,
                "subtitle": r.get::<_, Option<String>>(2)?,
                "season": r.get::<_, Option<String>>(3)?,
                "followupCount": r.get::<_, i64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(lessons) => ok(&req.id, json!({ "lessons": lessons })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_great_lessons_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let lesson_number = match optional_i64(req, "lessonNumber") {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "bad_params", "missing lessonNumber", None),
        Err(e) => return e,
    };

    let lesson = match conn
        .query_row(
            "SELECT title, subtitle, narrative, season FROM great_lessons WHERE lesson_number = ?",
            [lesson_number],
            |r| {
                Ok(json!({
                    "lessonNumber": lesson_number,
                    "title": r.get::<_, String>(0)?,
                    "subtitle": r.get::<_, Option<String>>(1)?,
                    "narrative": r.get::<_, Option<String>>(2)?,
                    "season": r.get::<_, Option<String>>(3)?,
                }))
            },
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "great lesson not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT followup_number, title, description, subject_name
         FROM great_lesson_followups
         WHERE lesson_number = ?
         ORDER BY followup_number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let followups = stmt
        .query_map([lesson_number], |r| {
            Ok(json!({
                "followupNumber": r.get::<_, i64>(0)?,
                "title": r.get::<_, String>(1)?,
                "description": r.get::<_, Option<String>>(2)?,
                "subjectName": r.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match followups {
        Ok(followups) => ok(&req.id, json!({ "lesson": lesson, "followups": followups })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_scope_sequence_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let level_id = optional_str(req, "levelId");
    let subject_id = optional_str(req, "subjectId");
    let mut stmt = match conn.prepare(
        "SELECT si.id, l.name, s.name, si.title, si.description, si.sequence_order, si.typical_week
         FROM scope_sequence_items si
         JOIN levels l ON l.id = si.level_id
         JOIN subjects s ON s.id = si.subject_id
         WHERE (?1 IS NULL OR si.level_id = ?1)
           AND (?2 IS NULL OR si.subject_id = ?2)
         ORDER BY si.sequence_order, si.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&level_id, &subject_id), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "levelName": r.get::<_, String>(1)?,
                "subjectName": r.get::<_, String>(2)?,
                "title": r.get::<_, String>(3)?,
                "description": r.get::<_, Option<String>>(4)?,
                "sequenceOrder": r.get::<_, i64>(5)?,
                "typicalWeek": r.get::<_, Option<i64>>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(items) => ok(&req.id, json!({ "items": items })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "levels.list" => Some(handle_levels_list(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "materials.list" => Some(handle_materials_list(state, req)),
        "greatLessons.list" => Some(handle_great_lessons_list(state, req)),
        "greatLessons.open" => Some(handle_great_lessons_open(state, req)),
        "scopeSequence.list" => Some(handle_scope_sequence_list(state, req)),
        _ => None,
    }
}
