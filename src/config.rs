//! Configuration management for Symphony
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.symphony/config.toml

use crate::errors::{Result, SymphonyError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for Symphony
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub learning: LearningConfig,
    pub memory: MemoryConfig,
    pub catalogue: CatalogueConfig,
    pub llm: LlmConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

/// Orchestration engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Size of the executor worker pool
    pub max_concurrent_executors: usize,
    /// Timeout applied to every external call
    pub task_timeout_secs: u64,
    pub enable_learning: bool,
    pub enable_transparency: bool,
}

/// Learning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Moving-average smoothing factor
    pub ema_alpha: f64,
    pub learning_rate: f64,
    pub discount_factor: f64,
    /// ε for ε-greedy action selection
    pub epsilon: f64,
    /// Reward applied to non-successful outcomes in value learning
    pub failure_penalty: f64,
    /// Completed top-level tasks between evolutionary cycles
    pub evolution_interval: usize,
    pub population_cap: usize,
    pub max_strategy_size: usize,
    pub mutation_rate: f64,
    pub ab_min_control_samples: usize,
    pub ab_min_variant_samples: usize,
    /// Relative improvement a variant must exceed over the control mean
    pub ab_improvement: f64,
    pub enable_ab_testing: bool,
    pub enable_value_learning: bool,
}

/// Memory store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub retention_days: i64,
}

/// Capability catalogue, declared at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogueConfig {
    pub version: u32,
    pub capabilities: Vec<String>,
    /// Fixed action space for value learning
    pub actions: Vec<Vec<String>>,
    /// Used when no history exists for any candidate
    pub default_capability: String,
}

/// Text-generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub log_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executors: 10,
            task_timeout_secs: 300,
            enable_learning: true,
            enable_transparency: true,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.3,
            learning_rate: 0.1,
            discount_factor: 0.9,
            epsilon: 0.2,
            failure_penalty: -0.5,
            evolution_interval: 10,
            population_cap: 20,
            max_strategy_size: 3,
            mutation_rate: 0.2,
            ab_min_control_samples: 5,
            ab_min_variant_samples: 3,
            ab_improvement: 0.10,
            enable_ab_testing: true,
            enable_value_learning: true,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { retention_days: 90 }
    }
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        let caps = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        Self {
            version: 1,
            capabilities: caps(&[
                "research",
                "code",
                "analysis",
                "creative",
                "security",
                "optimization",
                "human_interface",
            ]),
            actions: vec![
                caps(&["research"]),
                caps(&["code"]),
                caps(&["analysis"]),
                caps(&["research", "analysis"]),
                caps(&["code", "security"]),
            ],
            default_capability: "research".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: "qwen2.5:7b-instruct".to_string(),
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_dir: "~/.symphony/transparency".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SymphonyError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| SymphonyError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Config::default())
    }

    /// Standard config location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".symphony").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrent_executors == 0 {
            return Err(SymphonyError::ConfigError(
                "max_concurrent_executors must be greater than 0".to_string(),
            ));
        }

        if self.orchestrator.task_timeout_secs == 0 {
            return Err(SymphonyError::ConfigError(
                "task_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let unit_params = [
            ("ema_alpha", self.learning.ema_alpha),
            ("learning_rate", self.learning.learning_rate),
            ("discount_factor", self.learning.discount_factor),
            ("epsilon", self.learning.epsilon),
            ("mutation_rate", self.learning.mutation_rate),
        ];
        for (name, value) in unit_params {
            if !(0.0..=1.0).contains(&value) {
                return Err(SymphonyError::ConfigError(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if self.learning.ab_improvement < 0.0 {
            return Err(SymphonyError::ConfigError(
                "ab_improvement must not be negative".to_string(),
            ));
        }

        if self.learning.evolution_interval == 0 {
            return Err(SymphonyError::ConfigError(
                "evolution_interval must be greater than 0".to_string(),
            ));
        }

        if self.learning.max_strategy_size == 0 || self.learning.population_cap < 2 {
            return Err(SymphonyError::ConfigError(
                "max_strategy_size must be positive and population_cap at least 2".to_string(),
            ));
        }

        if self.memory.retention_days < 0 {
            return Err(SymphonyError::ConfigError(
                "retention_days must not be negative".to_string(),
            ));
        }

        self.validate_catalogue()
    }

    fn validate_catalogue(&self) -> Result<()> {
        let catalogue = &self.catalogue;
        if catalogue.capabilities.is_empty() {
            return Err(SymphonyError::ConfigError(
                "catalogue must declare at least one capability".to_string(),
            ));
        }

        let known = |name: &str| catalogue.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name));

        if !known(&catalogue.default_capability) {
            return Err(SymphonyError::ConfigError(format!(
                "default_capability '{}' is not in the catalogue",
                catalogue.default_capability
            )));
        }

        if catalogue.actions.is_empty() {
            return Err(SymphonyError::ConfigError(
                "catalogue must declare at least one action".to_string(),
            ));
        }

        for action in &catalogue.actions {
            if action.is_empty() {
                return Err(SymphonyError::ConfigError(
                    "catalogue actions must not be empty".to_string(),
                ));
            }
            if let Some(unknown) = action.iter().find(|name| !known(name)) {
                return Err(SymphonyError::ConfigError(format!(
                    "action references unknown capability '{}'",
                    unknown
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| SymphonyError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SymphonyError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SymphonyError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Text-generation backend base URL
    pub fn llm_url(&self) -> String {
        format!("http://{}:{}", self.llm.host, self.llm.port)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.task_timeout_secs)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Audit log directory path
    pub fn audit_dir(&self) -> PathBuf {
        Self::expand_path(&self.audit.log_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.orchestrator.max_concurrent_executors, 10);
        assert_eq!(config.orchestrator.task_timeout_secs, 300);
        assert_eq!(config.memory.retention_days, 90);
        assert!((config.learning.ema_alpha - 0.3).abs() < 1e-9);
        assert_eq!(config.catalogue.actions.len(), 5);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_pool() {
        let mut config = Config::default();
        config.orchestrator.max_concurrent_executors = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_evolution_interval() {
        let mut config = Config::default();
        config.learning.evolution_interval = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("evolution_interval"));
    }

    #[test]
    fn test_config_validation_epsilon_range() {
        let mut config = Config::default();
        config.learning.epsilon = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_unknown_action_capability() {
        let mut config = Config::default();
        config.catalogue.actions.push(vec!["telepathy".to_string()]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("telepathy"));
    }

    #[test]
    fn test_config_validation_default_capability() {
        let mut config = Config::default();
        config.catalogue.default_capability = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[orchestrator]
max_concurrent_executors = 2

[learning]
epsilon = 0.0
"#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.max_concurrent_executors, 2);
        assert_eq!(config.orchestrator.task_timeout_secs, 300);
        assert_eq!(config.learning.epsilon, 0.0);
        assert!((config.learning.learning_rate - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.llm.model = "llama3.1:8b".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded.llm.model, "llama3.1:8b");
    }

    #[test]
    fn test_llm_url() {
        assert_eq!(Config::default().llm_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let expanded = Config::expand_path("/absolute/path");
        assert_eq!(expanded.to_string_lossy(), "/absolute/path");
    }
}
