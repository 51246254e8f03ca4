
use serde_json::json;
use test_support::{
    error_code, insert_scope_item, level_id, open_workspace_db, request, request_ok,
    spawn_sidecar, subject_id, temp_dir,
};

#[test]
fn mastery_set_grid_and_summary() {
    let workspace = temp_dir("hearth-mastery");

    // Curriculum rows are normally planted by the seeding binaries; write
    // them directly so the daemon has something to track.
    let items = {
        let conn = open_workspace_db(&workspace);
        let level = level_id(&conn, "Lower Elementary");
        let math = subject_id(&conn, "Mathematics");
        let lang = subject_id(&conn, "Language");
        vec![
            insert_scope_item(&conn, &level, &math, "Golden Beads", 1),
            insert_scope_item(&conn, &level, &math, "Stamp Game", 2),
            insert_scope_item(&conn, &level, &lang, "Moveable Alphabet", 3),
        ]
    };

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let guardian = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "guardians.create",
        json!({ "displayName": "Ines Okafor", "email": "ines@example.org" }),
    );
    let guardian_id = guardian.get("guardianId").and_then(|v| v.as_str()).expect("guardianId");

    let levels = request_ok(&mut stdin, &mut reader, "3", "levels.list", json!({}));
    let level = levels
        .get("levels")
        .and_then(|v| v.as_array())
        .and_then(|ls| {
            ls.iter()
                .find(|l| l.get("name").and_then(|v| v.as_str()) == Some("Lower Elementary"))
        })
        .and_then(|l| l.get("id"))
        .and_then(|v| v.as_str())
        .expect("level id");

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "guardianId": guardian_id,
            "levelId": level,
            "firstName": "Zola",
            "lastName": "Okafor"
        }),
    );
    let student_id = student.get("studentId").and_then(|v| v.as_str()).expect("studentId");

    let bad = request(
        &mut stdin,
        &mut reader,
        "5",
        "mastery.set",
        json!({ "studentId": student_id, "itemId": items[0], "status": "finished" }),
    );
    assert_eq!(error_code(&bad), "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "mastery.set",
        json!({ "studentId": student_id, "itemId": items[0], "status": "mastered" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "mastery.set",
        json!({ "studentId": student_id, "itemId": items[1], "status": "practicing" }),
    );

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "mastery.grid",
        json!({ "studentId": student_id }),
    );
    let rows = grid.get("items").and_then(|v| v.as_array()).expect("grid items");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("status").and_then(|v| v.as_str()), Some("mastered"));
    assert!(rows[0].get("masteredAt").and_then(|v| v.as_str()).is_some());
    assert_eq!(rows[1].get("status").and_then(|v| v.as_str()), Some("practicing"));
    assert!(rows[2].get("status").map(|v| v.is_null()).unwrap_or(false));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "mastery.summary",
        json!({ "studentId": student_id }),
    );
    let subjects = summary.get("subjects").and_then(|v| v.as_array()).expect("subjects");
    let math_row = subjects
        .iter()
        .find(|s| s.get("subjectName").and_then(|v| v.as_str()) == Some("Mathematics"))
        .expect("math summary row");
    assert_eq!(math_row.get("total").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(math_row.get("mastered").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        math_row.get("percentMastered").and_then(|v| v.as_f64()),
        Some(50.0)
    );

    // Downgrading from mastered clears the mastered timestamp.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "mastery.set",
        json!({ "studentId": student_id, "itemId": items[0], "status": "practicing" }),
    );
    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "mastery.grid",
        json!({ "studentId": student_id }),
    );
    let rows = grid.get("items").and_then(|v| v.as_array()).expect("grid items");
    assert_eq!(rows[0].get("status").and_then(|v| v.as_str()), Some("practicing"));
    assert!(rows[0].get("masteredAt").map(|v| v.is_null()).unwrap_or(false));
    assert!(rows[0].get("firstPresentedAt").and_then(|v| v.as_str()).is_some());

    drop(stdin);
    let _ = child.wait();
}
