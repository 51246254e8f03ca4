use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

use super::workplan::resolve_year_week;

fn handle_dashboard_parent(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let guardian: Option<(String, String)> = match conn
        .query_row(
            "SELECT display_name, email FROM guardians WHERE id = ?",
            [&guardian_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((display_name, email)) = guardian else {
        return err(&req.id, "not_found", format!("no guardian {}", guardian_id), None);
    };

    let students = match parent_student_cards(conn, &guardian_id, school_year, week) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let recent_threads = match conn
        .prepare(
            "SELECT t.id, t.title, t.updated_at,
                    (SELECT COUNT(*) FROM forum_replies r WHERE r.thread_id = t.id)
             FROM forum_threads t
             ORDER BY t.updated_at DESC
             LIMIT 5",
        )
        .and_then(|mut stmt| {
            stmt.query_map([], |r| {
                Ok(json!({
                    "threadId": r.get::<_, String>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "updatedAt": r.get::<_, String>(2)?,
                    "replyCount": r.get::<_, i64>(3)?,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()
        }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "guardian": {
                "id": guardian_id,
                "displayName": display_name,
                "email": email,
            },
            "schoolYear": school_year,
            "week": week,
            "students": students,
            "recentThreads": recent_threads,
        }),
    )
}

fn parent_student_cards(
    conn: &rusqlite::Connection,
    guardian_id: &str,
    school_year: i64,
    week: i64,
) -> Result<Vec<serde_json::Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.first_name, s.last_name, l.name
         FROM students s
         JOIN levels l ON l.id = s.level_id
         WHERE s.guardian_id = ? AND s.active = 1
         ORDER BY s.sort_order",
    )?;
    let rows: Vec<(String, String, String, String)> = stmt
        .query_map([guardian_id], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut cards = Vec::with_capacity(rows.len());
    for (student_id, first, last, level_name) in rows {
        let plan: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT wp.id,
                        (SELECT COUNT(*) FROM work_plan_items i WHERE i.plan_id = wp.id),
                        (SELECT COUNT(*) FROM work_plan_items i
                         WHERE i.plan_id = wp.id AND i.completed = 1)
                 FROM work_plans wp
                 WHERE wp.student_id = ? AND wp.school_year = ? AND wp.week = ?",
                (&student_id, school_year, week),
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

        let mastered_total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mastery_records
             WHERE student_id = ? AND status = 'mastered'",
            [&student_id],
            |r| r.get(0),
        )?;

        let plan_json = plan.map(|(plan_id, total, completed)| {
            json!({
                "planId": plan_id,
                "itemsTotal": total,
                "itemsCompleted": completed,
            })
        });
        cards.push(json!({
            "studentId": student_id,
            "displayName": format!("{} {}", first, last),
            "levelName": level_name,
            "masteredTotal": mastered_total,
            "weekPlan": plan_json,
        }));
    }
    Ok(cards)
}

fn handle_dashboard_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (school_year, week) = match resolve_year_week(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student: Option<(String, String, String)> = match conn
        .query_row(
            "SELECT s.first_name, s.last_name, l.name
             FROM students s JOIN levels l ON l.id = s.level_id
             WHERE s.id = ?",
            [&student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((first, last, level_name)) = student else {
        return err(&req.id, "not_found", format!("no student {}", student_id), None);
    };

    let plan: Option<String> = match conn
        .query_row(
            "SELECT id FROM work_plans
             WHERE student_id = ? AND school_year = ? AND week = ?",
            (&student_id, school_year, week),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let plan_json = match plan {
        Some(plan_id) => {
            let items = match super::workplan::plan_items_json(conn, &plan_id) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            let total = items.len();
            let completed = items
                .iter()
                .filter(|i| i["completed"].as_bool().unwrap_or(false))
                .count();
            let percent = if total == 0 {
                0.0
            } else {
                (completed as f64 * 1000.0 / total as f64).round() / 10.0
            };
            Some(json!({
                "planId": plan_id,
                "items": items,
                "itemsTotal": total,
                "itemsCompleted": completed,
                "percentComplete": percent,
            }))
        }
        None => None,
    };

    ok(
        &req.id,
        json!({
            "student": {
                "id": student_id,
                "displayName": format!("{} {}", first, last),
                "levelName": level_name,
            },
            "schoolYear": school_year,
            "week": week,
            "plan": plan_json,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.parent" => Some(handle_dashboard_parent(state, req)),
        "dashboard.student" => Some(handle_dashboard_student(state, req)),
        _ => None,
    }
}
