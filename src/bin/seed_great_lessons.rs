use hearthd::config::SeedConfig;
use hearthd::{db, seed};

fn run() -> anyhow::Result<()> {
    let config = SeedConfig::from_env()?;
    let conn = db::open_db(&config.workspace)?;
    let path = config.ensure_seed_file(seed::GREAT_LESSONS_FILE)?;

    let (lessons, followups) = seed::seed_great_lessons(&conn, &path)?;
    log::info!(
        "{}: {} records upserted in {} batches",
        lessons.collection,
        lessons.records,
        lessons.batches
    );
    log::info!(
        "{}: {} records upserted in {} batches",
        followups.collection,
        followups.records,
        followups.batches
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        log::error!("seed_great_lessons failed: {:#}", e);
        std::process::exit(1);
    }
}
