
use serde_json::json;
use test_support::{
    error_code, insert_scope_item, level_id, open_workspace_db, request, request_ok,
    spawn_sidecar, subject_id, temp_dir,
};

#[test]
fn digest_preview_queue_idempotence_and_outbox() {
    let workspace = temp_dir("hearth-digest");

    {
        let conn = open_workspace_db(&workspace);
        let level = level_id(&conn, "Primary");
        let pl = subject_id(&conn, "Practical Life");
        for n in 1..=3 {
            insert_scope_item(&conn, &level, &pl, &format!("Pouring {}", n), n);
        }
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let opted_in = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "guardians.create",
        json!({ "displayName": "Mae Tran", "email": "mae@example.org" }),
    );
    let mae = opted_in.get("guardianId").and_then(|v| v.as_str()).expect("guardianId").to_string();
    let opted_out = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "guardians.create",
        json!({ "displayName": "Quiet Person", "email": "quiet@example.org", "digestOptIn": false }),
    );
    let quiet = opted_out.get("guardianId").and_then(|v| v.as_str()).expect("guardianId").to_string();

    let levels = request_ok(&mut stdin, &mut reader, "4", "levels.list", json!({}));
    let level = levels
        .get("levels")
        .and_then(|v| v.as_array())
        .and_then(|ls| {
            ls.iter()
                .find(|l| l.get("name").and_then(|v| v.as_str()) == Some("Primary"))
        })
        .and_then(|l| l.get("id"))
        .and_then(|v| v.as_str())
        .expect("level id");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "guardianId": mae,
            "levelId": level,
            "firstName": "Bao",
            "lastName": "Tran"
        }),
    );
    let student_id = student.get("studentId").and_then(|v| v.as_str()).expect("studentId");

    let built = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "workplans.build",
        json!({ "studentId": student_id, "schoolYear": 2020, "week": 5, "itemBudget": 3 }),
    );
    let plan_id = built.get("planId").and_then(|v| v.as_str()).expect("planId").to_string();
    let first_item = built
        .pointer("/items/0/itemId")
        .and_then(|v| v.as_str())
        .expect("first item")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "workplans.items.setDone",
        json!({ "planId": plan_id, "itemId": first_item }),
    );

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "digest.week.preview",
        json!({ "guardianId": mae, "schoolYear": 2020, "week": 5 }),
    );
    assert_eq!(
        preview.get("subject").and_then(|v| v.as_str()),
        Some("Hearth weekly summary: week 5 of 2020")
    );
    let students = preview.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(
        students[0].get("planItemsCompleted").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        students[0].get("planItemsTotal").and_then(|v| v.as_i64()),
        Some(3)
    );
    // Week 5 of 2020 is long past, so no mastery falls inside its window.
    assert_eq!(
        students[0].get("masteredInWeek").and_then(|v| v.as_i64()),
        Some(0)
    );
    assert!(preview
        .get("body")
        .and_then(|v| v.as_str())
        .expect("body")
        .contains("Bao Tran: 1/3 work-plan items complete"));

    // Queueing twice for the same week only writes once per guardian.
    let queued = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "digest.week.queue",
        json!({ "schoolYear": 2020, "week": 5 }),
    );
    assert_eq!(queued.get("queued").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(queued.get("alreadyQueued").and_then(|v| v.as_i64()), Some(0));
    let requeued = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "digest.week.queue",
        json!({ "schoolYear": 2020, "week": 5 }),
    );
    assert_eq!(requeued.get("queued").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(requeued.get("alreadyQueued").and_then(|v| v.as_i64()), Some(1));

    let outbox = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "digest.outbox.list",
        json!({ "pendingOnly": true }),
    );
    let messages = outbox.get("messages").and_then(|v| v.as_array()).expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].get("guardianId").and_then(|v| v.as_str()),
        Some(mae.as_str())
    );
    assert_ne!(
        messages[0].get("guardianId").and_then(|v| v.as_str()),
        Some(quiet.as_str())
    );
    let message_id = messages[0].get("id").and_then(|v| v.as_str()).expect("id").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "digest.outbox.markSent",
        json!({ "messageId": message_id }),
    );
    let again = request(
        &mut stdin,
        &mut reader,
        "13",
        "digest.outbox.markSent",
        json!({ "messageId": message_id }),
    );
    assert_eq!(error_code(&again), "not_found");

    let outbox = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "digest.outbox.list",
        json!({ "pendingOnly": true }),
    );
    assert_eq!(
        outbox.get("messages").and_then(|v| v.as_array()).map(|m| m.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
}
