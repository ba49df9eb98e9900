// Configuration loading and management

use crate::env::apply_env_overrides;
use crate::schema::{validate_config, ConfigError, ZeusConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load configuration from file and environment variables
///
/// Loading hierarchy: env > file > defaults
pub fn load_config() -> Result<ZeusConfig, ConfigError> {
    let config_file = get_config_file_path()?;

    let mut config = if config_file.exists() {
        debug!(path = %config_file.display(), "loading config file");
        load_from_file(&config_file)?
    } else {
        ZeusConfig::default()
    };

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

/// Load configuration from a specific file path
pub fn load_from_file(path: &Path) -> Result<ZeusConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Default configuration file path
///
/// `ZEUS_CONFIG` overrides the location; otherwise `$HOME/.zeus/config.toml`.
pub fn get_config_file_path() -> Result<PathBuf, ConfigError> {
    if let Ok(explicit) = std::env::var("ZEUS_CONFIG") {
        return Ok(PathBuf::from(explicit));
    }

    let home =
        std::env::var("HOME").map_err(|_| ConfigError::Io("HOME not set".to_string()))?;
    let mut path = PathBuf::from(home);
    path.push(".zeus");
    path.push("config.toml");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[store]\nbase_dir = \"/tmp/zeus-project\"\n\n[analysis]\nstagnation_days = 21\n"
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.store.base_dir, "/tmp/zeus-project");
        assert_eq!(config.analysis.stagnation_days, 21);
        // Untouched sections keep their defaults.
        assert_eq!(config.stale.blocked_days, 14);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "store = [broken").unwrap();

        let err = load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
