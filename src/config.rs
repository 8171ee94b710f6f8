//! Engine configuration.
//!
//! Layers, later wins: built-in defaults, an optional config file, then
//! `STOCKFLOW__*` environment variables.
use super::error::WorkflowError;
use super::store::SledStore;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_DATABASE_PATH: &str = "stock-workflow.db";
const DEFAULT_LOG_LEVEL: &str = "info";
const ENV_PREFIX: &str = "STOCKFLOW";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory of the sled database
    pub database_path: PathBuf,

    /// Flush sled after every committed unit of work
    pub flush_on_commit: bool,

    pub log_level: String,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, reading `file` when given and present.
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("database_path", DEFAULT_DATABASE_PATH)?
            .set_default("flush_on_commit", true)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?
            .set_default("log_json", false)?;

        if let Some(path) = file {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn open_store(&self) -> Result<SledStore, WorkflowError> {
        Ok(SledStore::open(&self.database_path)?.with_flush_on_commit(self.flush_on_commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn defaults_without_a_file() {
        let config = EngineConfig::load_from(None).unwrap();
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert!(config.flush_on_commit);
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
    }

    #[test]
    fn file_overrides_defaults() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("engine.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "database_path = \"/var/lib/stock\"")?;
        writeln!(file, "log_level = \"debug\"")?;
        writeln!(file, "flush_on_commit = false")?;

        let config = EngineConfig::load_from(Some(&path))?;
        assert_eq!(config.database_path, PathBuf::from("/var/lib/stock"));
        assert_eq!(config.log_level, "debug");
        assert!(!config.flush_on_commit);
        Ok(())
    }

    #[test]
    fn opens_a_store_at_the_configured_path() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let config = EngineConfig {
            database_path: temp_dir.path().join("store.db"),
            flush_on_commit: true,
            log_level: "info".into(),
            log_json: false,
        };
        let store = config.open_store()?;
        drop(store);
        assert!(config.database_path.exists());
        Ok(())
    }
}
