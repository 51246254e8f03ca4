use crate::calendar;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{date_or_today, db_conn, now_iso, optional_bool, optional_i64, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_ITEM_BUDGET: i64 = 8;

/// Resolve the (school_year, week) key from explicit params or the calendar.
/// Shared with the dashboard and digest handlers so every surface agrees on
/// the active week.
pub(super) fn resolve_year_week(req: &Request) -> Result<(i64, i64), serde_json::Value> {
    let year = optional_i64(req, "schoolYear")?;
    let week = optional_i64(req, "week")?;
    match (year, week) {
        (Some(year), Some(week)) => {
            if !(1..=i64::from(calendar::WEEKS_PER_YEAR)).contains(&week) {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("week must be in 1..={}", calendar::WEEKS_PER_YEAR),
                    None,
                ));
            }
            Ok((year, week))
        }
        (None, None) => {
            let today = date_or_today(req, "today")?;
            Ok((
                i64::from(calendar::school_year(today)),
                i64::from(calendar::academic_week(today)),
            ))
        }
        _ => Err(err(
            &req.id,
            "bad_params",
            "schoolYear and week must be given together",
            None,
        )),
    }
}

pub(super) fn plan_items_json(
    conn: &Connection,
    plan_id: &str,
) -> Result<Vec<serde_json::Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT wpi.item_id, si.title, s.name, wpi.sort_order, wpi.completed, wpi.completed_at
         FROM work_plan_items wpi
         JOIN scope_sequence_items si ON si.id = wpi.item_id
         JOIN subjects s ON s.id = si.subject_id
         WHERE wpi.plan_id = ?
         ORDER BY wpi.sort_order",
    )?;
    let rows = stmt.query_map([plan_id], |r| {
        Ok(json!({
            "itemId": r.get::<_, String>(0)?,
            "title": r.get::<_, String>(1)?,
            "subjectName": r.get::<_, String>(2)?,
            "sortOrder": r.get::<_, i64>(3)?,
            "completed": r.get::<_, i64>(4)? != 0,
            "completedAt": r.get::<_, Option<String>>(5)?,
        }))
    })?;
    rows.collect()
}

fn handle_workplans_build(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let budget = match optional_i64(req, "itemBudget") {
        Ok(v) => v.unwrap_or(DEFAULT_ITEM_BUDGET),
        Err(e) => return e,
    };
    if budget < 1 {
        return err(&req.id, "bad_params", "itemBudget must be positive", None);
    }
    let replace = match optional_bool(req, "replace", false) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let level_id: Option<String> = match conn
        .query_row(
            "SELECT level_id FROM students WHERE id = ? AND active = 1",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(level_id) = level_id else {
        return err(&req.id, "not_found", "active student not found", None);
    };

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM work_plans WHERE student_id = ? AND school_year = ? AND week = ?",
            (&student_id, school_year, week),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(existing_id) = existing {
        if !replace {
            return err(
                &req.id,
                "conflict",
                "a plan already exists for this student and week",
                Some(json!({ "planId": existing_id })),
            );
        }
        let tx = match conn.unchecked_transaction() {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
        };
        let cleared = tx
            .execute("DELETE FROM work_plan_items WHERE plan_id = ?", [&existing_id])
            .and_then(|_| tx.execute("DELETE FROM work_plans WHERE id = ?", [&existing_id]));
        if let Err(e) = cleared {
            let _ = tx.rollback();
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
        if let Err(e) = tx.commit() {
            return err(&req.id, "db_commit_failed", e.to_string(), None);
        }
    }

    // Next unmastered items for the student's level, in curriculum order.
    let mut stmt = match conn.prepare(
        "SELECT si.id
         FROM scope_sequence_items si
         WHERE si.level_id = ?1
           AND si.id NOT IN (
               SELECT item_id FROM mastery_records
               WHERE student_id = ?2 AND status = 'mastered'
           )
         ORDER BY si.sequence_order, si.id
         LIMIT ?3",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let item_ids: Result<Vec<String>, _> = stmt
        .query_map((&level_id, &student_id, budget), |r| r.get::<_, String>(0))
        .and_then(|it| it.collect());
    let item_ids = match item_ids {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if item_ids.is_empty() {
        return err(
            &req.id,
            "not_found",
            "no unmastered scope-sequence items for this student's level",
            None,
        );
    }

    let plan_id = Uuid::new_v4().to_string();
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO work_plans(id, student_id, school_year, week, status, created_at)
         VALUES(?, ?, ?, ?, 'active', ?)",
        (&plan_id, &student_id, school_year, week, now_iso()),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "work_plans" })),
        );
    }
    for (i, item_id) in item_ids.iter().enumerate() {
        if let Err(e) = tx.execute(
            "INSERT INTO work_plan_items(id, plan_id, item_id, sort_order, completed)
             VALUES(?, ?, ?, ?, 0)",
            (Uuid::new_v4().to_string(), &plan_id, item_id, i as i64),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "work_plan_items" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let items = match plan_items_json(conn, &plan_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "planId": plan_id,
            "studentId": student_id,
            "schoolYear": school_year,
            "week": week,
            "items": items,
        }),
    )
}

fn handle_workplans_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_row = if let Some(plan_id) = optional_str(req, "planId") {
        conn.query_row(
            "SELECT id, student_id, school_year, week, status, created_at
             FROM work_plans WHERE id = ?",
            [&plan_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()
    } else {
        let student_id = match required_str(req, "studentId") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let (school_year, week) = match resolve_year_week(req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        conn.query_row(
            "SELECT id, student_id, school_year, week, status, created_at
             FROM work_plans WHERE student_id = ? AND school_year = ? AND week = ?",
            (&student_id, school_year, week),
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()
    };

    let plan = match plan_row {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "work plan not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let (plan_id, student_id, school_year, week, status, created_at) = plan;
    let items = match plan_items_json(conn, &plan_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "planId": plan_id,
            "studentId": student_id,
            "schoolYear": school_year,
            "week": week,
            "status": status,
            "createdAt": created_at,
            "items": items,
        }),
    )
}

fn handle_workplans_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT wp.id, wp.school_year, wp.week, wp.status,
                (SELECT COUNT(*) FROM work_plan_items i WHERE i.plan_id = wp.id),
                (SELECT COUNT(*) FROM work_plan_items i WHERE i.plan_id = wp.id AND i.completed = 1)
         FROM work_plans wp
         WHERE wp.student_id = ?
         ORDER BY wp.school_year DESC, wp.week DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "planId": r.get::<_, String>(0)?,
                "schoolYear": r.get::<_, i64>(1)?,
                "week": r.get::<_, i64>(2)?,
                "status": r.get::<_, String>(3)?,
                "itemCount": r.get::<_, i64>(4)?,
                "completedCount": r.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(plans) => ok(&req.id, json!({ "studentId": student_id, "plans": plans })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_workplan_item_set_done(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let done = match optional_bool(req, "done", true) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let completed_at = if done { Some(now_iso()) } else { None };
    let updated = conn.execute(
        "UPDATE work_plan_items SET completed = ?, completed_at = ?
         WHERE plan_id = ? AND item_id = ?",
        (done as i64, &completed_at, &plan_id, &item_id),
    );
    match updated {
        Ok(0) => err(&req.id, "not_found", "work plan item not found", None),
        Ok(_) => ok(&req.id, json!({ "planId": plan_id, "itemId": item_id, "completed": done })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "workplans.build" => Some(handle_workplans_build(state, req)),
        "workplans.open" => Some(handle_workplans_open(state, req)),
        "workplans.list" => Some(handle_workplans_list(state, req)),
        "workplans.items.setDone" => Some(handle_workplan_item_set_done(state, req)),
        _ => None,
    }
}
