use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_iso, optional_bool, optional_i64, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_guardians_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT g.id, g.display_name, g.email, g.digest_opt_in,
                (SELECT COUNT(*) FROM students s WHERE s.guardian_id = g.id) AS student_count
         FROM guardians g
         ORDER BY g.display_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "displayName": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "digestOptIn": r.get::<_, i64>(3)? != 0,
                "studentCount": r.get::<_, i64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(guardians) => ok(&req.id, json!({ "guardians": guardians })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_guardians_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let display_name = match required_str(req, "displayName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    if !email.contains('@') {
        return err(&req.id, "bad_params", "email must contain @", None);
    }
    let digest_opt_in = match optional_bool(req, "digestOptIn", true) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let guardian_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO guardians(id, display_name, email, digest_opt_in, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &guardian_id,
            &display_name,
            &email,
            digest_opt_in as i64,
            now_iso(),
        ),
    ) {
        // UNIQUE(email) is the common failure here.
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "guardians" })),
        );
    }
    ok(&req.id, json!({ "guardianId": guardian_id }))
}

fn handle_guardians_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let guardian_id = match required_str(req, "guardianId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let display_name = optional_str(req, "displayName");
    let digest_opt_in = match req.params.get("digestOptIn") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_bool() {
            Some(b) => Some(b as i64),
            None => return err(&req.id, "bad_params", "digestOptIn must be boolean", None),
        },
    };

    let updated = conn.execute(
        "UPDATE guardians SET
            display_name = COALESCE(?, display_name),
            digest_opt_in = COALESCE(?, digest_opt_in)
         WHERE id = ?",
        (&display_name, &digest_opt_in, &guardian_id),
    );
    match updated {
        Ok(0) => err(&req.id, "not_found", "guardian not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let guardian_id = optional_str(req, "guardianId");
    let include_inactive = match optional_bool(req, "includeInactive", false) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT s.id, s.guardian_id, s.first_name, s.last_name, s.birth_date,
                s.active, s.sort_order, l.name
         FROM students s
         JOIN levels l ON l.id = s.level_id
         WHERE (?1 IS NULL OR s.guardian_id = ?1)
           AND (?2 OR s.active = 1)
         ORDER BY s.sort_order, s.last_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&guardian_id, include_inactive), |r| {
            let last: String = r.get(3)?;
            let first: String = r.get(2)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "guardianId": r.get::<_, String>(1)?,
                "displayName": format!("{}, {}", last, first),
                "firstName": first,
                "lastName": last,
                "birthDate": r.get::<_, Option<String>>(4)?,
                "active": r.get::<_, i64>(5)? != 0,
                "sortOrder": r.get::<_, i64>(6)?,
                "levelName": r.get::<_, String>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let guardian_id = match required_str(req, "guardianId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level_id = match required_str(req, "levelId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let birth_date = optional_str(req, "birthDate");

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
    let level_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM levels WHERE id = ?", [&level_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if level_exists.is_none() {
        return err(&req.id, "not_found", "level not found", None);
    }

    let next_sort: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE guardian_id = ?",
        [&guardian_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(
            id, guardian_id, level_id, first_name, last_name, birth_date,
            active, sort_order, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, 1, ?, ?)",
        (
            &student_id,
            &guardian_id,
            &level_id,
            &first_name,
            &last_name,
            &birth_date,
            next_sort,
            now_iso(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    ok(&req.id, json!({ "studentId": student_id, "sortOrder": next_sort }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = optional_str(req, "firstName");
    let last_name = optional_str(req, "lastName");
    let level_id = optional_str(req, "levelId");
    let birth_date = optional_str(req, "birthDate");
    let sort_order = match optional_i64(req, "sortOrder") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let active = match req.params.get("active") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_bool() {
            Some(b) => Some(b as i64),
            None => return err(&req.id, "bad_params", "active must be boolean", None),
        },
    };

    if let Some(level_id) = level_id.as_ref() {
        let exists: Option<i64> = match conn
            .query_row("SELECT 1 FROM levels WHERE id = ?", [level_id], |r| r.get(0))
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if exists.is_none() {
            return err(&req.id, "not_found", "level not found", None);
        }
    }

    let updated = conn.execute(
        "UPDATE students SET
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            level_id = COALESCE(?, level_id),
            birth_date = COALESCE(?, birth_date),
            sort_order = COALESCE(?, sort_order),
            active = COALESCE(?, active),
            updated_at = ?
         WHERE id = ?",
        (
            &first_name,
            &last_name,
            &level_id,
            &birth_date,
            &sort_order,
            &active,
            now_iso(),
            &student_id,
        ),
    );
    match updated {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Delete in dependency order (no ON DELETE CASCADE).
    let steps: &[(&str, &str)] = &[
        (
            "work_plan_items",
            "DELETE FROM work_plan_items
             WHERE plan_id IN (SELECT id FROM work_plans WHERE student_id = ?)",
        ),
        ("work_plans", "DELETE FROM work_plans WHERE student_id = ?"),
        ("mastery_records", "DELETE FROM mastery_records WHERE student_id = ?"),
        ("students", "DELETE FROM students WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&student_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "guardians.list" => Some(handle_guardians_list(state, req)),
        "guardians.create" => Some(handle_guardians_create(state, req)),
        "guardians.update" => Some(handle_guardians_update(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
