
use serde_json::json;
use test_support::{error_code, request, request_ok, request_raw, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("hearth-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let pong = request_ok(&mut stdin, &mut reader, "1", "ping", json!({}));
    assert_eq!(pong.get("pong").and_then(|v| v.as_bool()), Some(true));

    // Database-backed methods refuse to run before a workspace is selected.
    let early = request(&mut stdin, &mut reader, "2", "levels.list", json!({}));
    assert_eq!(error_code(&early), "no_workspace");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let levels = request_ok(&mut stdin, &mut reader, "4", "levels.list", json!({}));
    let levels = levels.get("levels").and_then(|v| v.as_array()).expect("levels");
    assert_eq!(levels.len(), 3);
    assert_eq!(
        levels[0].get("name").and_then(|v| v.as_str()),
        Some("Primary")
    );

    let subjects = request_ok(&mut stdin, &mut reader, "5", "subjects.list", json!({}));
    let subjects = subjects.get("subjects").and_then(|v| v.as_array()).expect("subjects");
    assert_eq!(subjects.len(), 9);

    let info = request_ok(&mut stdin, &mut reader, "6", "workspace.info", json!({}));
    assert_eq!(
        info.pointer("/counts/guardians").and_then(|v| v.as_i64()),
        Some(0)
    );

    // Unknown methods fall through every handler family.
    let unknown = request_raw(&mut stdin, &mut reader, "7", "planner.noSuchThing", json!({}));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
}
