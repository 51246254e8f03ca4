use hearthd::config::SeedConfig;
use hearthd::{db, seed};

fn run() -> anyhow::Result<()> {
    let config = SeedConfig::from_env()?;
    let conn = db::open_db(&config.workspace)?;
    let path = config.ensure_seed_file(seed::MATERIALS_FILE)?;

    let summary = seed::seed_materials(&conn, &path)?;
    log::info!(
        "{}: {} records upserted in {} batches ({} skipped)",
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
        log::error!("seed_materials failed: {:#}", e);
        std::process::exit(1);
    }
}
