//! # Zeus Configuration
//!
//! TOML-based configuration with environment variable overrides.
//! Loading hierarchy: env > file > defaults.

pub mod config;
pub mod env;
pub mod schema;

pub use config::{load_config, load_from_file};
pub use env::apply_env_overrides;
pub use schema::{
    validate_config, AffinitySection, AnalysisSection, ConfigError, StaleSection, StoreSection,
    ZeusConfig,
};
