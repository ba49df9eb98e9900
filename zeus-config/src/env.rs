// Environment variable overrides

use crate::schema::{ConfigError, ZeusConfig};

/// Apply `ZEUS_*` environment overrides to a loaded configuration
pub fn apply_env_overrides(config: &mut ZeusConfig) -> Result<(), ConfigError> {
    if let Ok(base_dir) = std::env::var("ZEUS_BASE_DIR") {
        config.store.base_dir = base_dir;
    }

    if let Ok(raw) = std::env::var("ZEUS_LOCK_TIMEOUT_MS") {
        config.store.lock_timeout_ms = parse_var("ZEUS_LOCK_TIMEOUT_MS", &raw)?;
    }

    if let Ok(raw) = std::env::var("ZEUS_STAGNATION_DAYS") {
        config.analysis.stagnation_days = parse_var("ZEUS_STAGNATION_DAYS", &raw)?;
    }

    if let Ok(raw) = std::env::var("ZEUS_OVERDUE_DAYS") {
        config.analysis.overdue_days = parse_var("ZEUS_OVERDUE_DAYS", &raw)?;
    }

    if let Ok(raw) = std::env::var("ZEUS_STALE_COMPLETED_DAYS") {
        config.stale.completed_days = parse_var("ZEUS_STALE_COMPLETED_DAYS", &raw)?;
    }

    if let Ok(raw) = std::env::var("ZEUS_STALE_BLOCKED_DAYS") {
        config.stale.blocked_days = parse_var("ZEUS_STALE_BLOCKED_DAYS", &raw)?;
    }

    if let Ok(raw) = std::env::var("ZEUS_STALE_NO_PROGRESS_DAYS") {
        config.stale.no_progress_days = parse_var("ZEUS_STALE_NO_PROGRESS_DAYS", &raw)?;
    }

    if let Ok(raw) = std::env::var("ZEUS_AFFINITY_MAX_SIBLINGS") {
        config.affinity.max_siblings = parse_var("ZEUS_AFFINITY_MAX_SIBLINGS", &raw)?;
    }

    if let Ok(raw) = std::env::var("ZEUS_AFFINITY_MIN_SCORE") {
        config.affinity.min_score = parse_var("ZEUS_AFFINITY_MIN_SCORE", &raw)?;
    }

    if let Ok(raw) = std::env::var("ZEUS_AFFINITY_MAX_EDGES") {
        config.affinity.max_edges = parse_var("ZEUS_AFFINITY_MAX_EDGES", &raw)?;
    }

    Ok(())
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::Validation(format!("invalid {}: {}", name, raw)))
}
