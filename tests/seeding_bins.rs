
use serde_json::json;
use std::path::Path;
use std::process::Command;
use test_support::{open_workspace_db, temp_dir, write_json};

fn run_seeder(exe: &str, workspace: &Path, seed_dir: &Path) -> std::process::ExitStatus {
    Command::new(exe)
        .env("HEARTH_WORKSPACE", workspace)
        .env("HEARTH_SEED_DIR", seed_dir)
        .status()
        .expect("run seeding binary")
}

#[test]
fn seeding_binaries_populate_and_rerun() {
    let workspace = temp_dir("hearth-seed-ws");
    let seed_dir = temp_dir("hearth-seed-data");

    write_json(
        &seed_dir.join("materials.json"),
        &json!([
            {
                "code": "MAT-001",
                "name": "Pink Tower",
                "subject_name": "Sensorial",
                "level_name": "Primary",
                "location": "Shelf A1",
                "quantity": 1
            },
            {
                "code": "MAT-002",
                "name": "Golden Bead Material",
                "subject_name": "Mathematics",
                "quantity": 1
            },
            { "code": "MAT-003", "name": "Sandpaper Letters" }
        ]),
    );
    write_json(
        &seed_dir.join("scope_sequence.json"),
        &json!([
            {
                "level_name": "Lower Elementary",
                "subject_name": "Mathematics",
                "title": "Multiplication with the checkerboard",
                "sequence_order": 1,
                "typical_week": 4
            },
            {
                "level_name": "Lower Elementary",
                "subject_name": "Language",
                "title": "Grammar symbols: noun",
                "sequence_order": 2
            },
            {
                "level_name": "Middle School",
                "subject_name": "Mathematics",
                "title": "Should be skipped",
                "sequence_order": 3
            }
        ]),
    );
    write_json(
        &seed_dir.join("great_lessons.json"),
        &json!([
            {
                "lesson_number": 1,
                "title": "The Coming of the Universe",
                "season": "autumn",
                "followups": [
                    { "followup_number": 1, "title": "States of matter", "subject_name": "Biology" },
                    { "followup_number": 2, "title": "Volcano experiment" }
                ]
            }
        ]),
    );

    // Missing workspace configuration fails before any work happens.
    let status = Command::new(env!("CARGO_BIN_EXE_seed_materials"))
        .env_remove("HEARTH_WORKSPACE")
        .env("HEARTH_SEED_DIR", &seed_dir)
        .status()
        .expect("run seed_materials");
    assert_eq!(status.code(), Some(1));

    let status = run_seeder(env!("CARGO_BIN_EXE_seed_materials"), &workspace, &seed_dir);
    assert!(status.success());
    let status = run_seeder(env!("CARGO_BIN_EXE_seed_scope_sequence"), &workspace, &seed_dir);
    assert!(status.success());
    let status = run_seeder(env!("CARGO_BIN_EXE_seed_great_lessons"), &workspace, &seed_dir);
    assert!(status.success());

    {
        let conn = open_workspace_db(&workspace);
        let materials: i64 = conn
            .query_row("SELECT COUNT(*) FROM materials_inventory", [], |r| r.get(0))
            .expect("count materials");
        assert_eq!(materials, 3);
        let scope: i64 = conn
            .query_row("SELECT COUNT(*) FROM scope_sequence_items", [], |r| r.get(0))
            .expect("count scope items");
        // The unmapped "Middle School" record is skipped with a warning.
        assert_eq!(scope, 2);
        let lessons: i64 = conn
            .query_row("SELECT COUNT(*) FROM great_lessons", [], |r| r.get(0))
            .expect("count great lessons");
        assert_eq!(lessons, 1);
        let followups: i64 = conn
            .query_row("SELECT COUNT(*) FROM great_lesson_followups", [], |r| r.get(0))
            .expect("count followups");
        assert_eq!(followups, 2);
    }

    // Change one material and rerun everything.
    write_json(
        &seed_dir.join("materials.json"),
        &json!([
            {
                "code": "MAT-001",
                "name": "Pink Tower",
                "subject_name": "Sensorial",
                "level_name": "Primary",
                "location": "Shelf B2",
                "quantity": 1
            },
            {
                "code": "MAT-002",
                "name": "Golden Bead Material",
                "subject_name": "Mathematics",
                "quantity": 1
            },
            { "code": "MAT-003", "name": "Sandpaper Letters" }
        ]),
    );
    let status = run_seeder(env!("CARGO_BIN_EXE_seed_materials"), &workspace, &seed_dir);
    assert!(status.success());
    let status = run_seeder(env!("CARGO_BIN_EXE_seed_scope_sequence"), &workspace, &seed_dir);
    assert!(status.success());
    let status = run_seeder(env!("CARGO_BIN_EXE_seed_great_lessons"), &workspace, &seed_dir);
    assert!(status.success());

    let conn = open_workspace_db(&workspace);
    // Materials and great lessons converge on their natural keys.
    let materials: i64 = conn
        .query_row("SELECT COUNT(*) FROM materials_inventory", [], |r| r.get(0))
        .expect("count materials");
    assert_eq!(materials, 3);
    let location: String = conn
        .query_row(
            "SELECT location FROM materials_inventory WHERE code = 'MAT-001'",
            [],
            |r| r.get(0),
        )
        .expect("updated location");
    assert_eq!(location, "Shelf B2");
    let lessons: i64 = conn
        .query_row("SELECT COUNT(*) FROM great_lessons", [], |r| r.get(0))
        .expect("count great lessons");
    assert_eq!(lessons, 1);
    let followups: i64 = conn
        .query_row("SELECT COUNT(*) FROM great_lesson_followups", [], |r| r.get(0))
        .expect("count followups");
    assert_eq!(followups, 2);

    // Scope sequence uses plain inserts, so a rerun duplicates its rows.
    let scope: i64 = conn
        .query_row("SELECT COUNT(*) FROM scope_sequence_items", [], |r| r.get(0))
        .expect("count scope items");
    assert_eq!(scope, 4);
}

#[test]
fn weekly_digest_binary_queues_idempotently() {
    let workspace = temp_dir("hearth-digest-bin");

    {
        let conn = open_workspace_db(&workspace);
        conn.execute(
            "INSERT INTO guardians(id, display_name, email, digest_opt_in)
             VALUES('g1', 'Cron Guardian', 'cron@example.org', 1)",
            [],
        )
        .expect("insert guardian");
    }

    let status = Command::new(env!("CARGO_BIN_EXE_weekly_digest"))
        .env("HEARTH_WORKSPACE", &workspace)
        .status()
        .expect("run weekly_digest");
    assert!(status.success());
    let status = Command::new(env!("CARGO_BIN_EXE_weekly_digest"))
        .env("HEARTH_WORKSPACE", &workspace)
        .status()
        .expect("run weekly_digest again");
    assert!(status.success());

    let conn = open_workspace_db(&workspace);
    let queued: i64 = conn
        .query_row("SELECT COUNT(*) FROM email_outbox", [], |r| r.get(0))
        .expect("count outbox");
    assert_eq!(queued, 1);
}
