//! Storage configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-process maps. State is lost on restart.
    Memory,
    #[default]
    Sqlite,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// Consume quota and create the token in one transaction.
    /// When false, issuance falls back to consume-then-create with a
    /// reconciliation log for charges that produced no token.
    /// Default: true
    pub multi_record_transactions: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::default(),
            sqlite: SqliteConfig::default(),
            multi_record_transactions: true,
        }
    }
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the database file. Created if missing.
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "./data/photolink.db".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let storage = StorageConfig::default();
        assert_eq!(storage.storage_type, StorageType::Sqlite);
        assert_eq!(storage.sqlite.path, "./data/photolink.db");
        assert!(storage.multi_record_transactions);
    }

    #[test]
    fn test_storage_config_deserialize_memory() {
        let yaml = r#"
            type: memory
            multi_record_transactions: false
        "#;
        let storage: StorageConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(storage.storage_type, StorageType::Memory);
        assert!(!storage.multi_record_transactions);
        assert_eq!(storage.sqlite.path, "./data/photolink.db");
    }
}
