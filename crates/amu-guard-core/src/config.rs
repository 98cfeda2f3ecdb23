//! Configuration file support.
//!
//! Every section is optional; a missing file or section falls back to defaults.
//!
//! ```toml
//! [database]
//! path = "amu_guard.db"
//!
//! [assignment]
//! max_distance_km = 200.0
//!
//! [feed.sensitivity]
//! cattle = 0.45
//! poultry = 0.65
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub assignment: AssignmentConfig,

    #[serde(default)]
    pub compliance: ComplianceConfig,

    #[serde(default)]
    pub biomass: BiomassConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// External reference catalog replacing the built-in one.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct CatalogConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssignmentConfig {
    /// Radius for the nearest-laboratory strategy
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_distance_km: default_max_distance_km(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComplianceConfig {
    /// Days after the safe date before an uncollected request is overdue
    #[serde(default = "default_overdue_grace_days")]
    pub overdue_grace_days: u32,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            overdue_grace_days: default_overdue_grace_days(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BiomassConfig {
    /// Average body weight per species, used when no measured weight exists
    #[serde(default = "default_weights_kg")]
    pub default_weights_kg: BTreeMap<String, f64>,
}

impl Default for BiomassConfig {
    fn default() -> Self {
        Self {
            default_weights_kg: default_weights_kg(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_sensitivity")]
    pub default_sensitivity: f64,

    /// Per-species AMU sensitivity multipliers
    #[serde(default = "default_species_sensitivity")]
    pub sensitivity: BTreeMap<String, f64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_sensitivity: default_sensitivity(),
            sensitivity: default_species_sensitivity(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("amu_guard.db")
}

fn default_max_distance_km() -> f64 {
    200.0
}

fn default_overdue_grace_days() -> u32 {
    2
}

fn default_weights_kg() -> BTreeMap<String, f64> {
    [
        ("cattle", 350.0),
        ("goat", 40.0),
        ("sheep", 55.0),
        ("pig", 120.0),
        ("poultry", 2.0),
    ]
    .into_iter()
    .map(|(species, kg)| (species.to_string(), kg))
    .collect()
}

fn default_sensitivity() -> f64 {
    0.5
}

fn default_species_sensitivity() -> BTreeMap<String, f64> {
    [("cattle", 0.45), ("poultry", 0.65)]
        .into_iter()
        .map(|(species, s)| (species.to_string(), s))
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from a specific path
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut problems = Vec::new();

        let distance = self.assignment.max_distance_km;
        if !distance.is_finite() || distance <= 0.0 {
            problems.push(format!("assignment.max_distance_km must be positive, got {}", distance));
        }
        for (species, kg) in &self.biomass.default_weights_kg {
            if !kg.is_finite() || *kg <= 0.0 {
                problems.push(format!("biomass weight for {} must be positive, got {}", species, kg));
            }
        }
        if !valid_sensitivity(self.feed.default_sensitivity) {
            problems.push(format!(
                "feed.default_sensitivity must be in (0, 1], got {}",
                self.feed.default_sensitivity
            ));
        }
        for (species, s) in &self.feed.sensitivity {
            if !valid_sensitivity(*s) {
                problems.push(format!("feed sensitivity for {} must be in (0, 1], got {}", species, s));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

fn valid_sensitivity(value: f64) -> bool {
    value.is_finite() && value > 0.0 && value <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.assignment.max_distance_km, 200.0);
        assert_eq!(config.compliance.overdue_grace_days, 2);
        assert_eq!(config.biomass.default_weights_kg.get("cattle"), Some(&350.0));
        assert_eq!(config.biomass.default_weights_kg.get("poultry"), Some(&2.0));
        assert_eq!(config.feed.sensitivity.get("poultry"), Some(&0.65));
        assert_eq!(config.feed.default_sensitivity, 0.5);
        assert!(config.catalog.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[assignment]
max_distance_km = 150.0

[feed.sensitivity]
goat = 0.55
"#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.assignment.max_distance_km, 150.0);
        assert_eq!(config.feed.sensitivity.get("goat"), Some(&0.55));
        // A provided table replaces the default one
        assert!(config.feed.sensitivity.get("cattle").is_none());
        assert_eq!(config.compliance.overdue_grace_days, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let toml_str = r#"
[assignment]
max_distance_km = 0.0

[feed]
default_sensitivity = 1.5
"#;
        let err = AppConfig::from_toml(toml_str).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("max_distance_km"));
        assert!(message.contains("default_sensitivity"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.compliance.overdue_grace_days = 5;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
