use anyhow::Context;
use chrono::{Duration, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::calendar;

/// Weekly summary for one student, computed against the `(year, week)` work
/// plan plus timestamp windows for mastery and forum activity.
#[derive(Debug, Clone)]
pub struct StudentDigest {
    pub student_id: String,
    pub display_name: String,
    pub plan_items_total: i64,
    pub plan_items_completed: i64,
    pub mastered_in_week: i64,
}

#[derive(Debug, Clone)]
pub struct GuardianDigest {
    pub guardian_id: String,
    pub email: String,
    pub display_name: String,
    pub school_year: i64,
    pub week: i64,
    pub replies_in_week: i64,
    pub students: Vec<StudentDigest>,
}

#[derive(Debug, Clone)]
pub struct QueueSummary {
    pub school_year: i64,
    pub week: i64,
    pub queued: usize,
    pub already_queued: usize,
}

/// Half-open ISO date window `[monday, monday+7)` for timestamp comparisons.
/// Stored timestamps are `YYYY-MM-DDTHH:MM:SSZ`, so plain string comparison
/// against date prefixes is ordering-correct.
fn week_window(school_year: i64, week: i64) -> (String, String) {
    let anchor = NaiveDate::from_ymd_opt(school_year as i32, 10, 1)
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    let start = calendar::academic_year_start(anchor);
    let (monday, _sunday) = calendar::week_bounds(start, week.clamp(1, 36) as u32);
    let end_exclusive = monday + Duration::days(7);
    (
        monday.format("%Y-%m-%d").to_string(),
        end_exclusive.format("%Y-%m-%d").to_string(),
    )
}

pub fn build_guardian_digest(
    conn: &Connection,
    guardian_id: &str,
    school_year: i64,
    week: i64,
) -> anyhow::Result<Option<GuardianDigest>> {
    let guardian: Option<(String, String)> = conn
        .query_row(
            "SELECT display_name, email FROM guardians WHERE id = ?",
            [guardian_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .context("failed to read guardian")?;
    let Some((display_name, email)) = guardian else {
        return Ok(None);
    };

    let (window_start, window_end) = week_window(school_year, week);

    let mut stmt = conn.prepare(
        "SELECT s.id, s.first_name, s.last_name
         FROM students s
         WHERE s.guardian_id = ? AND s.active = 1
         ORDER BY s.sort_order",
    )?;
    let student_rows: Vec<(String, String, String)> = stmt
        .query_map([guardian_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut students = Vec::with_capacity(student_rows.len());
    for (student_id, first, last) in student_rows {
        let plan: Option<(i64, i64)> = conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM work_plan_items i WHERE i.plan_id = wp.id),
                    (SELECT COUNT(*) FROM work_plan_items i
                     WHERE i.plan_id = wp.id AND i.completed = 1)
                 FROM work_plans wp
                 WHERE wp.student_id = ? AND wp.school_year = ? AND wp.week = ?",
                (&student_id, school_year, week),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .context("failed to read work plan counts")?;
        let (total, completed) = plan.unwrap_or((0, 0));

        let mastered_in_week: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mastery_records
             WHERE student_id = ? AND status = 'mastered'
               AND mastered_at >= ? AND mastered_at < ?",
            (&student_id, &window_start, &window_end),
            |r| r.get(0),
        )?;

        students.push(StudentDigest {
            student_id,
            display_name: format!("{} {}", first, last),
            plan_items_total: total,
            plan_items_completed: completed,
            mastered_in_week,
        });
    }

    let replies_in_week: i64 = conn.query_row(
        "SELECT COUNT(*) FROM forum_replies
         WHERE guardian_id = ? AND created_at >= ? AND created_at < ?",
        (guardian_id, &window_start, &window_end),
        |r| r.get(0),
    )?;

    Ok(Some(GuardianDigest {
        guardian_id: guardian_id.to_string(),
        email,
        display_name,
        school_year,
        week,
        replies_in_week,
        students,
    }))
}

pub fn render_subject(digest: &GuardianDigest) -> String {
    format!(
        "Hearth weekly summary: week {} of {}",
        digest.week, digest.school_year
    )
}

pub fn render_body(digest: &GuardianDigest) -> String {
    let mut out = format!(
        "Hello {},\n\nHere is your week {} summary.\n\n",
        digest.display_name, digest.week
    );
    if digest.students.is_empty() {
        out.push_str("No active students on this account.\n");
    }
    for s in &digest.students {
        out.push_str(&format!(
            "- {}: {}/{} work-plan items complete, {} newly mastered\n",
            s.display_name, s.plan_items_completed, s.plan_items_total, s.mastered_in_week
        ));
    }
    out.push_str(&format!(
        "\nForum replies you posted this week: {}\n",
        digest.replies_in_week
    ));
    out
}

/// Queue outbox rows for every opted-in guardian. Rerunning for the same
/// `(year, week)` is a no-op for already-queued guardians.
pub fn queue_digests(
    conn: &Connection,
    school_year: i64,
    week: i64,
) -> anyhow::Result<QueueSummary> {
    let mut stmt = conn.prepare("SELECT id FROM guardians WHERE digest_opt_in = 1 ORDER BY email")?;
    let guardian_ids: Vec<String> = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let mut queued = 0usize;
    let mut already_queued = 0usize;
    for guardian_id in guardian_ids {
        let Some(digest) = build_guardian_digest(conn, &guardian_id, school_year, week)? else {
            continue;
        };
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO email_outbox(
                id, guardian_id, school_year, week, subject, body, queued_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &guardian_id,
                school_year,
                week,
                render_subject(&digest),
                render_body(&digest),
                &now,
            ),
        )?;
        if inserted > 0 {
            queued += 1;
        } else {
            already_queued += 1;
        }
    }

    Ok(QueueSummary {
        school_year,
        week,
        queued,
        already_queued,
    })
}
