use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::services::{BurstDetector, ConvergenceFusion, PhaseModel};

/// Default project config file
pub const CONFIG_FILE: &str = "convergence.yaml";

/// Optional local overrides, merged over [`CONFIG_FILE`]
pub const LOCAL_CONFIG_FILE: &str = "convergence.local.yaml";

/// Prefix for environment overrides; `__` separates nested keys
pub const ENV_PREFIX: &str = "CONVERGENCE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid tick interval: {0}ms. Must be at least 1")]
    InvalidTickInterval(u64),

    #[error(
        "Invalid refresh timing: refresh_timeout_ms ({0}) must be positive and less than refresh_interval_ms ({1})"
    )]
    InvalidRefreshTiming(u64, u64),

    #[error("Invalid rank tolerance: {0}. Must be finite and non-negative")]
    InvalidRankTolerance(f64),

    #[error("At least one scoring session must be configured")]
    NoSessions,

    #[error("Invalid session key: {0:?}")]
    InvalidSessionKey(String),

    #[error("Invalid server bind address: {0}")]
    InvalidBind(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. convergence.yaml
    /// 3. convergence.local.yaml (optional)
    /// 4. Environment variables (CONVERGENCE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(CONFIG_FILE)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise from the default locations
    pub fn load_optional(path: Option<&std::path::Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    fn figment(base: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base))
            .merge(Yaml::file(LOCAL_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Also builds the phase model, burst detector and fusion policy so that
    /// malformed matrices or parameters are rejected before anything runs.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let tolerance = config.independence.rank_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::InvalidRankTolerance(tolerance));
        }

        let cadence = &config.scoring_loop;
        if cadence.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval(cadence.tick_interval_ms));
        }
        let interval = cadence.refresh_interval_ms;
        if cadence.refresh_timeout_ms == 0 || cadence.refresh_timeout_ms >= interval {
            return Err(ConfigError::InvalidRefreshTiming(
                cadence.refresh_timeout_ms,
                cadence.refresh_interval_ms,
            ));
        }
        if cadence.event_buffer == 0 {
            return Err(ConfigError::ValidationFailed(
                "scoring_loop.event_buffer must be at least 1".to_string(),
            ));
        }

        if config.sessions.is_empty() {
            return Err(ConfigError::NoSessions);
        }
        for key in &config.sessions {
            if key.is_empty() || key.contains('/') || key.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidSessionKey(key.clone()));
            }
        }

        if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBind(config.server.bind.clone()));
        }

        if config.collaborators.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "collaborators.request_timeout_ms must be at least 1".to_string(),
            ));
        }

        PhaseModel::from_config(&config.phase_model)
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        BurstDetector::from_config(&config.hawkes)
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        ConvergenceFusion::new(config.fusion.clone())
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{LikelihoodMode, SmoothingPolicy};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sessions, vec!["default".to_string()]);
        assert!((config.fusion.threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.scoring_loop.tick_interval_ms, 1);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
sessions: [alpha, beta]
hawkes:
  mu: 0.2
  alpha: 1.5
  beta: 2.0
fusion:
  threshold: 0.8
  bands: [0.8, 0.85, 0.9, 0.95]
phase_model:
  states: [reconnaissance, execution]
  initial: [0.5, 0.5]
  transition: [[0.9, 0.1], [0.2, 0.8]]
  emission: [[0.8, 0.2], [0.3, 0.7]]
  smoothing:
    kind: floor
    epsilon: 0.001
logging:
  level: debug
  format: pretty
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.sessions, vec!["alpha", "beta"]);
        assert!((config.hawkes.alpha - 1.5).abs() < f64::EPSILON);
        assert!((config.hawkes.h1_divisor - 5.0).abs() < f64::EPSILON);
        assert!((config.fusion.threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.phase_model.states.len(), 2);
        assert!(matches!(
            config.phase_model.smoothing,
            SmoothingPolicy::Floor { .. }
        ));
        assert_eq!(config.logging.format, "pretty");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_refresh_timeout_must_be_below_interval() {
        let mut config = Config::default();
        config.scoring_loop.refresh_timeout_ms = 5_000;
        config.scoring_loop.refresh_interval_ms = 5_000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRefreshTiming(5_000, 5_000)
        ));
    }

    #[test]
    fn test_validate_zero_tick_interval() {
        let mut config = Config::default();
        config.scoring_loop.tick_interval_ms = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidTickInterval(0)
        ));
    }

    #[test]
    fn test_validate_sessions() {
        let mut config = Config::default();
        config.sessions.clear();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::NoSessions
        ));

        config.sessions = vec!["a/b".to_string()];
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidSessionKey(_)
        ));
    }

    #[test]
    fn test_validate_rejects_non_stochastic_transition() {
        let mut config = Config::default();
        config.phase_model.transition[0] = vec![0.5, 0.2, 0.1];

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ValidationFailed(_)
        ));
    }

    #[test]
    fn test_validate_rejects_negative_hawkes() {
        let mut config = Config::default();
        config.hawkes.beta = -1.0;

        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_descending_bands() {
        let mut config = Config::default();
        config.fusion.bands = [0.9, 0.85, 0.8, 0.75];

        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_bad_bind() {
        let mut config = Config::default();
        config.server.bind = "not an address".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBind(_)
        ));
    }

    #[test]
    fn test_env_override() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "hawkes:\n  mu: 0.3\nlogging:\n  level: warn").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("CONVERGENCE_HAWKES__MU", Some("0.9")),
                ("CONVERGENCE_SCORING_LOOP__REFRESH_TIMEOUT_MS", Some("100")),
                ("CONVERGENCE_FUSION__LIKELIHOOD_MODE", Some("per_symbol")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert!((config.hawkes.mu - 0.9).abs() < f64::EPSILON, "env should win");
                assert_eq!(config.scoring_loop.refresh_timeout_ms, 100);
                assert_eq!(config.fusion.likelihood_mode, LikelihoodMode::PerSymbol);
                assert_eq!(config.logging.level, "warn", "file value should persist");
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "fusion:\n  threshold: 0.7\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "fusion:\n  threshold: 0.72\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert!((config.fusion.threshold - 0.72).abs() < f64::EPSILON, "Override should win");
        assert_eq!(config.logging.level, "debug", "Override should win for nested fields");
        assert_eq!(config.logging.format, "json", "Base value should persist");
        assert!((config.fusion.half_life_secs - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(ConfigLoader::load_from_file("/nonexistent/convergence.yaml").is_err());
    }
}
