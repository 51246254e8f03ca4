use hearthd::config::workspace_from_env;
use hearthd::{calendar, db, digest};

fn run() -> anyhow::Result<()> {
    let workspace = workspace_from_env()?;
    let conn = db::open_db(&workspace)?;

    let today = chrono::Utc::now().date_naive();
    let school_year = i64::from(calendar::school_year(today));
    let week = i64::from(calendar::academic_week(today));

    let summary = digest::queue_digests(&conn, school_year, week)?;
    log::info!(
        "week {} of {}: queued {} digests, {} already queued",
        summary.week,
        summary.school_year,
        summary.queued,
        summary.already_queued
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        log::error!("weekly_digest failed: {:#}", e);
        std::process::exit(1);
    }
}
