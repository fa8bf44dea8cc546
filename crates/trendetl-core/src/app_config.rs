use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Transaction boundary used when replacing a window in the destination tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadAtomicity {
    /// Delete and append run as two independent statements per table.
    Statement,
    /// Delete and append of one table share a transaction.
    #[default]
    Table,
    /// One transaction spans every destination table.
    Run,
}

impl std::fmt::Display for LoadAtomicity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadAtomicity::Statement => write!(f, "statement"),
            LoadAtomicity::Table => write!(f, "table"),
            LoadAtomicity::Run => write!(f, "run"),
        }
    }
}

impl FromStr for LoadAtomicity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "statement" => Ok(LoadAtomicity::Statement),
            "table" => Ok(LoadAtomicity::Table),
            "run" => Ok(LoadAtomicity::Run),
            other => Err(format!(
                "unknown load atomicity '{other}' (expected statement, table, or run)"
            )),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub source_table: String,
    pub insert_batch_size: usize,
    pub load_atomicity: LoadAtomicity,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("source_table", &self.source_table)
            .field("insert_batch_size", &self.insert_batch_size)
            .field("load_atomicity", &self.load_atomicity)
            .finish()
    }
}
