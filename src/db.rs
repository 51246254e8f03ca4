use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "hearth.sqlite3";

/// Grade levels present in every workspace. Scope-sequence seed records
/// reference these by name, so they must exist before any seeding runs.
const DEFAULT_LEVELS: &[(&str, i64, i64)] = &[
    ("Primary", 0, 0),
    ("Lower Elementary", 1, 3),
    ("Upper Elementary", 4, 6),
];

const DEFAULT_SUBJECTS: &[&str] = &[
    "Practical Life",
    "Sensorial",
    "Language",
    "Mathematics",
    "Geography",
    "History",
    "Biology",
    "Art",
    "Music",
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS guardians(
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            digest_opt_in INTEGER NOT NULL DEFAULT 1,
            created_at TEXT
        )",
        [],
    )?;
    ensure_guardians_digest_opt_in(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS levels(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            min_grade INTEGER NOT NULL,
            max_grade INTEGER NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            guardian_id TEXT NOT NULL,
            level_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(guardian_id) REFERENCES guardians(id),
            FOREIGN KEY(level_id) REFERENCES levels(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_guardian ON students(guardian_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_guardian_sort ON students(guardian_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS materials_inventory(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            subject_name TEXT,
            level_name TEXT,
            location TEXT,
            quantity INTEGER,
            notes TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    ensure_materials_location(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_materials_subject ON materials_inventory(subject_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scope_sequence_items(
            id TEXT PRIMARY KEY,
            level_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            sequence_order INTEGER NOT NULL,
            typical_week INTEGER,
            FOREIGN KEY(level_id) REFERENCES levels(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scope_items_level ON scope_sequence_items(level_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scope_items_level_order
         ON scope_sequence_items(level_id, sequence_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS great_lessons(
            id TEXT PRIMARY KEY,
            lesson_number INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            subtitle TEXT,
            narrative TEXT,
            season TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS great_lesson_followups(
            id TEXT PRIMARY KEY,
            lesson_number INTEGER NOT NULL,
            followup_number INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            subject_name TEXT,
            UNIQUE(lesson_number, followup_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_followups_lesson ON great_lesson_followups(lesson_number)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mastery_records(
            student_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            status TEXT NOT NULL,
            first_presented_at TEXT,
            mastered_at TEXT,
            updated_at TEXT,
            PRIMARY KEY(student_id, item_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(item_id) REFERENCES scope_sequence_items(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mastery_student ON mastery_records(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS work_plans(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            school_year INTEGER NOT NULL,
            week INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT,
            UNIQUE(student_id, school_year, week),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS work_plan_items(
            id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            UNIQUE(plan_id, item_id),
            FOREIGN KEY(plan_id) REFERENCES work_plans(id),
            FOREIGN KEY(item_id) REFERENCES scope_sequence_items(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_plan_items_plan ON work_plan_items(plan_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS forum_threads(
            id TEXT PRIMARY KEY,
            guardian_id TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(guardian_id) REFERENCES guardians(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS forum_replies(
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL,
            guardian_id TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(thread_id) REFERENCES forum_threads(id),
            FOREIGN KEY(guardian_id) REFERENCES guardians(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_forum_replies_thread ON forum_replies(thread_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS email_outbox(
            id TEXT PRIMARY KEY,
            guardian_id TEXT NOT NULL,
            school_year INTEGER NOT NULL,
            week INTEGER NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            queued_at TEXT,
            sent_at TEXT,
            UNIQUE(guardian_id, school_year, week),
            FOREIGN KEY(guardian_id) REFERENCES guardians(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_outbox_unsent ON email_outbox(sent_at)",
        [],
    )?;

    seed_default_levels_and_subjects(&conn)?;

    Ok(conn)
}

fn seed_default_levels_and_subjects(conn: &Connection) -> anyhow::Result<()> {
    for (i, (name, min_grade, max_grade)) in DEFAULT_LEVELS.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO levels(id, name, min_grade, max_grade, sort_order)
             VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                name,
                min_grade,
                max_grade,
                i as i64,
            ),
        )?;
    }
    for (i, name) in DEFAULT_SUBJECTS.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO subjects(id, name, sort_order) VALUES(?, ?, ?)",
            (Uuid::new_v4().to_string(), name, i as i64),
        )?;
    }
    Ok(())
}

fn ensure_guardians_digest_opt_in(conn: &Connection) -> anyhow::Result<()> {
    // Early workspaces predate the digest feature.
    if table_has_column(conn, "guardians", "digest_opt_in")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE guardians ADD COLUMN digest_opt_in INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn ensure_materials_location(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "materials_inventory", "location")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE materials_inventory ADD COLUMN location TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
