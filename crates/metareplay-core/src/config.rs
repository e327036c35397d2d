use crate::applier::DiffDelivery;
use crate::storage::models::BackupMapping;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_DB_PATH: &str = "metareplay.db";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Local directory that stands in for the source filesystem root.
    #[serde(default = "default_source_root")]
    pub source_root: String,
    #[serde(default)]
    pub diff_delivery: DiffDelivery,
    #[serde(default)]
    pub backups: Vec<BackupMapping>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            source_root: default_source_root(),
            diff_delivery: DiffDelivery::default(),
            backups: Vec::new(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_source_root() -> String {
    ".".to_string()
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("METAREPLAY"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Load from an explicit file; environment overrides still apply.
pub fn load_configuration_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::from(path))
        .add_source(Environment::with_prefix("METAREPLAY"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_configuration_from_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metareplay.toml");
        fs::write(
            &path,
            r#"
db_path = "replica.db"
source_root = "/mnt/source"
diff_delivery = "eager"

[[backups]]
src = "/backup"
dest = "hdfs://backup-nn:9000/mirror"
"#,
        )
        .unwrap();

        let config = load_configuration_from(&path).unwrap();
        assert_eq!(config.db_path, "replica.db");
        assert_eq!(config.source_root, "/mnt/source");
        assert_eq!(config.diff_delivery, DiffDelivery::Eager);
        assert_eq!(config.backups.len(), 1);
        assert_eq!(config.backups[0].src, "/backup");
        assert_eq!(config.backups[0].dest, "hdfs://backup-nn:9000/mirror");
    }

    #[test]
    fn test_defaults_apply_to_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "").unwrap();

        let config = load_configuration_from(&path).unwrap();
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.source_root, ".");
        assert_eq!(config.diff_delivery, DiffDelivery::Batched);
        assert!(config.backups.is_empty());
    }
}
