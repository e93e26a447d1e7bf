use std::path::PathBuf;

use crate::app_config::{AppConfig, Environment, RedditCredentials};
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
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
#[allow(clippy::too_many_lines)]
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

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = parse_usize(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("PICOPITCH_ENV", "development"))?;
    let log_level = or_default("PICOPITCH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("PICOPITCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PICOPITCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("PICOPITCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let gemini_api_key = lookup("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty());
    let gemini_base_url = or_default(
        "PICOPITCH_GEMINI_BASE_URL",
        "https://generativelanguage.googleapis.com",
    );
    let fast_model = or_default("PICOPITCH_FAST_MODEL", "gemini-2.5-flash-preview-05-20");
    let deep_model = or_default("PICOPITCH_DEEP_MODEL", "gemini-2.5-pro-preview-06-05");
    let llm_timeout_secs = parse_u64("PICOPITCH_LLM_TIMEOUT_SECS", "120")?;
    let llm_max_attempts = parse_u32("PICOPITCH_LLM_MAX_ATTEMPTS", "3")?;
    if llm_max_attempts == 0 {
        return Err(invalid(
            "PICOPITCH_LLM_MAX_ATTEMPTS",
            "must be greater than zero".to_string(),
        ));
    }
    let llm_backoff_base_secs = parse_u64("PICOPITCH_LLM_BACKOFF_BASE_SECS", "5")?;

    let max_concurrent_tasks = parse_positive("PICOPITCH_MAX_CONCURRENT_TASKS", "8")?;
    let min_leads_for_theme = parse_positive("PICOPITCH_MIN_LEADS_FOR_THEME", "3")?;
    let theme_batch_size = parse_positive("PICOPITCH_THEME_BATCH_SIZE", "50")?;
    let max_domains = parse_positive("PICOPITCH_MAX_DOMAINS", "2000")?;
    let use_evidence = parse_bool("PICOPITCH_USE_EVIDENCE", &or_default("PICOPITCH_USE_EVIDENCE", "true"))?;
    let output_dir = PathBuf::from(or_default("PICOPITCH_OUTPUT_DIR", "./picopitch_outputs"));

    let reddit = match (
        lookup("REDDIT_CLIENT_ID").ok(),
        lookup("REDDIT_CLIENT_SECRET").ok(),
        lookup("REDDIT_USER_AGENT").ok(),
    ) {
        (Some(client_id), Some(client_secret), Some(user_agent)) => Some(RedditCredentials {
            client_id,
            client_secret,
            user_agent,
        }),
        _ => None,
    };

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        gemini_api_key,
        gemini_base_url,
        fast_model,
        deep_model,
        llm_timeout_secs,
        llm_max_attempts,
        llm_backoff_base_secs,
        max_concurrent_tasks,
        min_leads_for_theme,
        theme_batch_size,
        max_domains,
        use_evidence,
        output_dir,
        reddit,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PICOPITCH_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
