use anyhow::{anyhow, Context};
use chrono::Utc;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Batch size used by every shipped seeding job.
pub const SEED_BATCH_SIZE: usize = 50;

pub const MATERIALS_FILE: &str = "materials.json";
pub const SCOPE_SEQUENCE_FILE: &str = "scope_sequence.json";
pub const GREAT_LESSONS_FILE: &str = "great_lessons.json";

/// Lifecycle of one batch inside a run. A run walks batches strictly in
/// input order; the first `Failed` batch ends the run and everything after
/// it stays `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    InFlight,
    Committed,
    Failed,
}

#[derive(Debug)]
pub struct BatchReport {
    pub states: Vec<BatchState>,
    pub records_written: usize,
}

#[derive(Debug)]
pub struct BatchError {
    pub batch_index: usize,
    pub batch_len: usize,
    pub states: Vec<BatchState>,
    pub source: anyhow::Error,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} ({} records) failed: {}",
            self.batch_index, self.batch_len, self.source
        )
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Persists one batch durably before returning. Implementations wrap each
/// call in its own transaction so a later failure never rolls back earlier
/// batches.
pub trait BatchWriter<T> {
    fn write_batch(&mut self, batch: &[T]) -> anyhow::Result<()>;
}

/// Split `records` into ceil(N/size) contiguous chunks, preserving order.
/// Each chunk holds at most `size` records and their concatenation equals
/// the input.
pub fn chunk_batches<T>(records: Vec<T>, size: usize) -> Vec<Vec<T>> {
    assert!(size > 0, "batch size must be non-zero");
    let mut batches: Vec<Vec<T>> = Vec::with_capacity(records.len().div_ceil(size));
    let mut current: Vec<T> = Vec::with_capacity(size.min(records.len()));
    for rec in records {
        current.push(rec);
        if current.len() == size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Write `records` through `writer` in fixed-size batches.
///
/// Batches commit strictly in input order and the run stops at the first
/// failing batch; committed batches stay committed. Safe to rerun when the
/// writer upserts on a natural key.
pub fn run_batches<T, W: BatchWriter<T>>(
    records: Vec<T>,
    size: usize,
    writer: &mut W,
) -> Result<BatchReport, BatchError> {
    if size == 0 {
        return Err(BatchError {
            batch_index: 0,
            batch_len: 0,
            states: Vec::new(),
            source: anyhow!("batch size must be non-zero"),
        });
    }

    let batches = chunk_batches(records, size);
    let total = batches.len();
    let mut states = vec![BatchState::Pending; total];
    let mut records_written = 0usize;

    for (i, batch) in batches.iter().enumerate() {
        states[i] = BatchState::InFlight;
        match writer.write_batch(batch) {
            Ok(()) => {
                states[i] = BatchState::Committed;
                records_written += batch.len();
                log::info!(
                    "batch {}/{} committed ({} records)",
                    i + 1,
                    total,
                    batch.len()
                );
            }
            Err(e) => {
                states[i] = BatchState::Failed;
                return Err(BatchError {
                    batch_index: i,
                    batch_len: batch.len(),
                    states,
                    source: e,
                });
            }
        }
    }

    Ok(BatchReport {
        states,
        records_written,
    })
}

#[derive(Debug, Clone)]
pub struct JobSummary {
    pub collection: &'static str,
    pub records: usize,
    pub batches: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaterialRecord {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub level_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeSequenceRecord {
    pub level_name: String,
    pub subject_name: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub sequence_order: i64,
    #[serde(default)]
    pub typical_week: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GreatLessonRecord {
    pub lesson_number: i64,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub followups: Vec<FollowupRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowupRecord {
    pub followup_number: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subject_name: Option<String>,
}

/// Followup flattened out of its lesson, keyed by the composite natural key.
#[derive(Debug, Clone)]
pub struct FollowupRow {
    pub lesson_number: i64,
    pub followup_number: i64,
    pub title: String,
    pub description: Option<String>,
    pub subject_name: Option<String>,
}

/// Scope-sequence record with level/subject names resolved to row ids.
#[derive(Debug, Clone)]
pub struct ResolvedScopeItem {
    pub level_id: String,
    pub subject_id: String,
    pub title: String,
    pub description: Option<String>,
    pub sequence_order: i64,
    pub typical_week: Option<i64>,
}

pub fn load_records<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.to_string_lossy()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("seed file {} is not a valid record array", path.to_string_lossy()))
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub struct MaterialsWriter<'a> {
    conn: &'a Connection,
}

impl<'a> MaterialsWriter<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl BatchWriter<MaterialRecord> for MaterialsWriter<'_> {
    fn write_batch(&mut self, batch: &[MaterialRecord]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = now_iso();
        for rec in batch {
            tx.execute(
                "INSERT INTO materials_inventory(
                    id, code, name, subject_name, level_name, location, quantity, notes, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(code) DO UPDATE SET
                    name = excluded.name,
                    subject_name = excluded.subject_name,
                    level_name = excluded.level_name,
                    location = excluded.location,
                    quantity = excluded.quantity,
                    notes = excluded.notes,
                    updated_at = excluded.updated_at",
                (
                    Uuid::new_v4().to_string(),
                    &rec.code,
                    &rec.name,
                    &rec.subject_name,
                    &rec.level_name,
                    &rec.location,
                    &rec.quantity,
                    &rec.notes,
                    &now,
                ),
            )
            .with_context(|| format!("upsert of material {} failed", rec.code))?;
        }
        tx.commit().context("commit of materials batch failed")?;
        Ok(())
    }
}

pub struct ScopeSequenceWriter<'a> {
    conn: &'a Connection,
}

impl<'a> ScopeSequenceWriter<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl BatchWriter<ResolvedScopeItem> for ScopeSequenceWriter<'_> {
    // Plain insert, no conflict key: rerunning this job duplicates rows.
    // Surfaced to the operator by the before/after counts in the job log.
    fn write_batch(&mut self, batch: &[ResolvedScopeItem]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for rec in batch {
            tx.execute(
                "INSERT INTO scope_sequence_items(
                    id, level_id, subject_id, title, description, sequence_order, typical_week
                 ) VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &rec.level_id,
                    &rec.subject_id,
                    &rec.title,
                    &rec.description,
                    rec.sequence_order,
                    &rec.typical_week,
                ),
            )
            .with_context(|| format!("insert of scope item '{}' failed", rec.title))?;
        }
        tx.commit().context("commit of scope-sequence batch failed")?;
        Ok(())
    }
}

pub struct GreatLessonsWriter<'a> {
    conn: &'a Connection,
}

impl<'a> GreatLessonsWriter<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl BatchWriter<GreatLessonRecord> for GreatLessonsWriter<'_> {
    fn write_batch(&mut self, batch: &[GreatLessonRecord]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = now_iso();
        for rec in batch {
            tx.execute(
                "INSERT INTO great_lessons(
                    id, lesson_number, title, subtitle, narrative, season, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(lesson_number) DO UPDATE SET
                    title = excluded.title,
                    subtitle = excluded.subtitle,
                    narrative = excluded.narrative,
                    season = excluded.season,
                    updated_at = excluded.updated_at",
                (
                    Uuid::new_v4().to_string(),
                    rec.lesson_number,
                    &rec.title,
                    &rec.subtitle,
                    &rec.narrative,
                    &rec.season,
                    &now,
                ),
            )
            .with_context(|| format!("upsert of great lesson {} failed", rec.lesson_number))?;
        }
        tx.commit().context("commit of great-lessons batch failed")?;
        Ok(())
    }
}

pub struct FollowupsWriter<'a> {
    conn: &'a Connection,
}

impl<'a> FollowupsWriter<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl BatchWriter<FollowupRow> for FollowupsWriter<'_> {
    fn write_batch(&mut self, batch: &[FollowupRow]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for rec in batch {
            tx.execute(
                "INSERT INTO great_lesson_followups(
                    id, lesson_number, followup_number, title, description, subject_name
                 ) VALUES(?, ?, ?, ?, ?, ?)
                 ON CONFLICT(lesson_number, followup_number) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    subject_name = excluded.subject_name",
                (
                    Uuid::new_v4().to_string(),
                    rec.lesson_number,
                    rec.followup_number,
                    &rec.title,
                    &rec.description,
                    &rec.subject_name,
                ),
            )
            .with_context(|| {
                format!(
                    "upsert of followup {}.{} failed",
                    rec.lesson_number, rec.followup_number
                )
            })?;
        }
        tx.commit().context("commit of followups batch failed")?;
        Ok(())
    }
}

/// Resolve level/subject names against the workspace tables. An unmapped
/// name skips the record with a warning; partial seed data is acceptable.
pub fn resolve_scope_records(
    conn: &Connection,
    records: Vec<ScopeSequenceRecord>,
) -> anyhow::Result<(Vec<ResolvedScopeItem>, usize)> {
    let levels = name_id_map(conn, "SELECT name, id FROM levels")?;
    let subjects = name_id_map(conn, "SELECT name, id FROM subjects")?;

    let mut resolved = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for rec in records {
        let level_id = levels.get(&rec.level_name.trim().to_ascii_lowercase());
        let subject_id = subjects.get(&rec.subject_name.trim().to_ascii_lowercase());
        match (level_id, subject_id) {
            (Some(level_id), Some(subject_id)) => resolved.push(ResolvedScopeItem {
                level_id: level_id.clone(),
                subject_id: subject_id.clone(),
                title: rec.title,
                description: rec.description,
                sequence_order: rec.sequence_order,
                typical_week: rec.typical_week,
            }),
            _ => {
                skipped += 1;
                log::warn!(
                    "skipping scope item '{}': unmapped level '{}' or subject '{}'",
                    rec.title,
                    rec.level_name,
                    rec.subject_name
                );
            }
        }
    }
    Ok((resolved, skipped))
}

fn name_id_map(conn: &Connection, sql: &str) -> anyhow::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |r| {
        let name: String = r.get(0)?;
        let id: String = r.get(1)?;
        Ok((name.trim().to_ascii_lowercase(), id))
    })?;
    let mut map = HashMap::new();
    for row in rows {
        let (name, id) = row?;
        map.insert(name, id);
    }
    Ok(map)
}

pub fn seed_materials(conn: &Connection, path: &Path) -> anyhow::Result<JobSummary> {
    let records: Vec<MaterialRecord> = load_records(path)?;
    let count = records.len();
    let report = run_batches(records, SEED_BATCH_SIZE, &mut MaterialsWriter::new(conn))?;
    Ok(JobSummary {
        collection: "materials_inventory",
        records: report.records_written,
        batches: report.states.len(),
        skipped: count - report.records_written,
    })
}

pub fn seed_scope_sequence(conn: &Connection, path: &Path) -> anyhow::Result<JobSummary> {
    let records: Vec<ScopeSequenceRecord> = load_records(path)?;
    let before: i64 = conn.query_row("SELECT COUNT(*) FROM scope_sequence_items", [], |r| r.get(0))?;
    let (resolved, skipped) = resolve_scope_records(conn, records)?;
    let report = run_batches(resolved, SEED_BATCH_SIZE, &mut ScopeSequenceWriter::new(conn))?;
    let after: i64 = conn.query_row("SELECT COUNT(*) FROM scope_sequence_items", [], |r| r.get(0))?;
    log::info!(
        "scope_sequence_items rows {} -> {} (plain insert; reruns add rows)",
        before,
        after
    );
    Ok(JobSummary {
        collection: "scope_sequence_items",
        records: report.records_written,
        batches: report.states.len(),
        skipped,
    })
}

/// Seeds `great_lessons`, then the flattened `great_lesson_followups`.
/// Followups always run after their lessons so an abort between the two jobs
/// leaves lessons intact and a rerun converges.
pub fn seed_great_lessons(
    conn: &Connection,
    path: &Path,
) -> anyhow::Result<(JobSummary, JobSummary)> {
    let records: Vec<GreatLessonRecord> = load_records(path)?;

    let followups: Vec<FollowupRow> = records
        .iter()
        .flat_map(|lesson| {
            lesson.followups.iter().map(|f| FollowupRow {
                lesson_number: lesson.lesson_number,
                followup_number: f.followup_number,
                title: f.title.clone(),
                description: f.description.clone(),
                subject_name: f.subject_name.clone(),
            })
        })
        .collect();

    let lesson_report = run_batches(records, SEED_BATCH_SIZE, &mut GreatLessonsWriter::new(conn))?;
    let lessons = JobSummary {
        collection: "great_lessons",
        records: lesson_report.records_written,
        batches: lesson_report.states.len(),
        skipped: 0,
    };

    let followup_report = run_batches(followups, SEED_BATCH_SIZE, &mut FollowupsWriter::new(conn))?;
    let followups = JobSummary {
        collection: "great_lesson_followups",
        records: followup_report.records_written,
        batches: followup_report.states.len(),
        skipped: 0,
    };

    Ok((lessons, followups))
}
