use hearthd::config::SeedConfig;
use hearthd::{db, seed};

fn run() -> anyhow::Result<()> {
    let config = SeedConfig::from_env()?;
    let conn = db::open_db(&config.workspace)?;
    let path = config.ensure_seed_file(seed::SCOPE_SEQUENCE_FILE)?;

    let summary = seed::seed_scope_sequence(&conn, &path)?;
    log::info!(
        "{}: {} records inserted in {} batches ({} skipped for unmapped names)",
        summary.collection,
        summary.records,
        summary.batches,
        summary.skipped
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        log::error!("seed_scope_sequence failed: {:#}", e);
        std::process::exit(1);
    }
}
