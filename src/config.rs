use anyhow::{anyhow, Context};
use std::path::PathBuf;

const WORKSPACE_VAR: &str = "HEARTH_WORKSPACE";
const SEED_DIR_VAR: &str = "HEARTH_SEED_DIR";

/// Explicit configuration for the one-shot binaries.
///
/// Built once at startup and passed to each job; missing required fields fail
/// before any work begins.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub workspace: PathBuf,
    pub seed_dir: PathBuf,
}

impl SeedConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let workspace = std::env::var(WORKSPACE_VAR)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "{} is not set; point it at the workspace directory before seeding",
                    WORKSPACE_VAR
                )
            })?;

        let seed_dir = std::env::var(SEED_DIR_VAR)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("seed"));

        Ok(Self {
            workspace: PathBuf::from(workspace),
            seed_dir,
        })
    }

    /// Fixed input path for a seed data file.
    pub fn seed_file(&self, name: &str) -> PathBuf {
        self.seed_dir.join(name)
    }

    pub fn ensure_seed_file(&self, name: &str) -> anyhow::Result<PathBuf> {
        let path = self.seed_file(name);
        if !path.is_file() {
            return Err(anyhow!("seed file not found: {}", path.to_string_lossy()));
        }
        Ok(path)
    }
}

/// Workspace-only variant for binaries that read no seed files.
pub fn workspace_from_env() -> anyhow::Result<PathBuf> {
    SeedConfig::from_env()
        .map(|c| c.workspace)
        .context("failed to load configuration from environment")
}
