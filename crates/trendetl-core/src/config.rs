use crate::app_config::{AppConfig, Environment, LoadAtomicity};
use crate::table::is_valid_identifier;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("TRENDETL_ENV", "development"))?;
    let log_level = or_default("TRENDETL_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("TRENDETL_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("TRENDETL_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("TRENDETL_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let source_table = or_default("TRENDETL_SOURCE_TABLE", "trending_vids");
    if !is_valid_identifier(&source_table) {
        return Err(invalid(
            "TRENDETL_SOURCE_TABLE",
            format!("'{source_table}' is not a plain SQL identifier"),
        ));
    }

    let insert_batch_size = or_default("TRENDETL_INSERT_BATCH_SIZE", "1000")
        .parse::<usize>()
        .map_err(|e| invalid("TRENDETL_INSERT_BATCH_SIZE", e.to_string()))?;
    if insert_batch_size == 0 {
        return Err(invalid(
            "TRENDETL_INSERT_BATCH_SIZE",
            "must be greater than zero".to_string(),
        ));
    }

    let load_atomicity = or_default("TRENDETL_LOAD_ATOMICITY", "table")
        .parse::<LoadAtomicity>()
        .map_err(|reason| invalid("TRENDETL_LOAD_ATOMICITY", reason))?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        source_table,
        insert_batch_size,
        load_atomicity,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "production" => Ok(Environment::Production),
        "test" => Ok(Environment::Test),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TRENDETL_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
