
use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn guardian_and_student_lifecycle() {
    let workspace = temp_dir("hearth-guardians-students");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "guardians.create",
        json!({ "displayName": "Dana Whitfield", "email": "Dana@Example.org" }),
    );
    let guardian_id = created
        .get("guardianId")
        .and_then(|v| v.as_str())
        .expect("guardianId")
        .to_string();

    // Email is stored lowercased and must stay unique.
    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "guardians.create",
        json!({ "displayName": "Other Person", "email": "dana@example.org" }),
    );
    assert_eq!(error_code(&dup), "db_insert_failed");

    let bad_email = request(
        &mut stdin,
        &mut reader,
        "4",
        "guardians.create",
        json!({ "displayName": "No Email", "email": "not-an-address" }),
    );
    assert_eq!(error_code(&bad_email), "bad_params");

    let guardians = request_ok(&mut stdin, &mut reader, "5", "guardians.list", json!({}));
    let guardians = guardians
        .get("guardians")
        .and_then(|v| v.as_array())
        .expect("guardians");
    assert_eq!(guardians.len(), 1);
    assert_eq!(
        guardians[0].get("email").and_then(|v| v.as_str()),
        Some("dana@example.org")
    );
    assert_eq!(
        guardians[0].get("digestOptIn").and_then(|v| v.as_bool()),
        Some(true)
    );

    let levels = request_ok(&mut stdin, &mut reader, "6", "levels.list", json!({}));
    let level_id = levels
        .get("levels")
        .and_then(|v| v.as_array())
        .and_then(|ls| {
            ls.iter()
                .find(|l| l.get("name").and_then(|v| v.as_str()) == Some("Lower Elementary"))
        })
        .and_then(|l| l.get("id"))
        .and_then(|v| v.as_str())
        .expect("level id")
        .to_string();

    let s1 = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({
            "guardianId": guardian_id,
            "levelId": level_id,
            "firstName": "Miri",
            "lastName": "Whitfield",
            "birthDate": "2018-04-02"
        }),
    );
    let student_id = s1
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    assert_eq!(s1.get("sortOrder").and_then(|v| v.as_i64()), Some(0));

    let s2 = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.create",
        json!({
            "guardianId": guardian_id,
            "levelId": level_id,
            "firstName": "Theo",
            "lastName": "Whitfield"
        }),
    );
    assert_eq!(s2.get("sortOrder").and_then(|v| v.as_i64()), Some(1));

    let missing_level = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.create",
        json!({
            "guardianId": guardian_id,
            "levelId": "nope",
            "firstName": "X",
            "lastName": "Y"
        }),
    );
    assert_eq!(error_code(&missing_level), "not_found");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.list",
        json!({ "guardianId": guardian_id }),
    );
    let students = listed.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 2);
    assert_eq!(
        students[0].get("displayName").and_then(|v| v.as_str()),
        Some("Whitfield, Miri")
    );

    // Deactivated students drop out of the default listing.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.update",
        json!({ "studentId": student_id, "active": false }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "students.list",
        json!({ "guardianId": guardian_id }),
    );
    assert_eq!(
        listed.get("students").and_then(|v| v.as_array()).map(|s| s.len()),
        Some(1)
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "students.list",
        json!({ "guardianId": guardian_id, "includeInactive": true }),
    );
    assert_eq!(
        listed.get("students").and_then(|v| v.as_array()).map(|s| s.len()),
        Some(2)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "15",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    let info = request_ok(&mut stdin, &mut reader, "16", "workspace.info", json!({}));
    assert_eq!(
        info.pointer("/counts/students").and_then(|v| v.as_i64()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
}
