//! Configuration loader: merges env vars, .env file, and config.toml.

use common::config::ServiceConfig;
use common::Error;
use std::collections::HashSet;
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn validate_config(config: &ServiceConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.cities.is_empty() {
        issues.push("cities must contain at least one city".into());
    }
    let mut seen = HashSet::new();
    for city in &config.cities {
        if city.name.trim().is_empty() || city.station.trim().is_empty() {
            issues.push("every city needs a non-empty name and station".into());
        } else if !seen.insert(city.name.trim().to_lowercase()) {
            issues.push(format!("city '{}' is configured more than once", city.name));
        }
    }
    if config.warm_cities.iter().any(|c| c.trim().is_empty()) {
        issues.push("warm_cities must not contain empty names".into());
    }

    if !config.waqi_base_url.starts_with("http://") && !config.waqi_base_url.starts_with("https://")
    {
        issues.push("waqi_base_url must be an http(s) URL".into());
    }
    if let Err(e) = config.local_offset() {
        issues.push(e.to_string());
    }

    if config.timing.refresh_interval_secs == 0 {
        issues.push("timing.refresh_interval_secs must be > 0".into());
    }
    if config.timing.request_timeout_secs == 0 {
        issues.push("timing.request_timeout_secs must be > 0".into());
    }
    if config.timing.heartbeat_interval_secs == 0 {
        issues.push("timing.heartbeat_interval_secs must be > 0".into());
    }

    if config.storage.enabled && config.storage.sqlite_path.trim().is_empty() {
        issues.push("storage.sqlite_path is required when storage is enabled".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides using `lookup` for each variable.
fn apply_env_overrides(
    config: &mut ServiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(token) = lookup("WAQI_TOKEN") {
        config.waqi_token = token.trim().to_string();
    }
    if let Some(url) = lookup("WAQI_BASE_URL") {
        config.waqi_base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(offset) = lookup("AIRWATCH_UTC_OFFSET") {
        config.utc_offset = offset.trim().to_string();
    }
    if let Some(raw) = lookup("AIRWATCH_REFRESH_INTERVAL_SECS") {
        config.timing.refresh_interval_secs =
            parse_positive_u64(&raw, "AIRWATCH_REFRESH_INTERVAL_SECS")?;
    }
    if let Some(path) = lookup("AIRWATCH_DB_PATH") {
        config.storage.sqlite_path = path.trim().to_string();
    }
    if let Some(raw) = lookup("AIRWATCH_STORAGE_ENABLED") {
        config.storage.enabled = parse_bool(&raw);
    }
    Ok(())
}

/// Load service configuration from environment and optional config file.
pub fn load_config() -> Result<ServiceConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = ServiceConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}

/// The provider token is only needed by commands that go upstream.
pub fn require_token(config: &ServiceConfig) -> Result<(), Error> {
    if config.waqi_token.is_empty() {
        return Err(Error::Config(
            "WAQI_TOKEN is required (set in .env or environment)".into(),
        ));
    }
    Ok(())
}
