//! Configuration for discovery, classification, and task generation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Complete test plan configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Runner identifier stamped on every task
    pub runner_id: String,
    /// Attribute names used to classify tests
    pub classifier: ClassifierConfig,
    /// Discovery behaviour
    pub discovery: DiscoveryConfig,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            runner_id: "xunit".to_owned(),
            classifier: ClassifierConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// Attribute names recognized by the attribute classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Attributes marking a method as a test
    pub test_attributes: Vec<String>,
    /// Attribute naming a property that feeds a parameterized test
    pub data_source_attribute: String,
    /// Named attribute argument carrying a skip reason
    pub skip_argument: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            test_attributes: vec![
                "Xunit.FactAttribute".to_owned(),
                "Xunit.Extensions.TheoryAttribute".to_owned(),
            ],
            data_source_attribute: "Xunit.Extensions.PropertyDataAttribute".to_owned(),
            skip_argument: "Skip".to_owned(),
        }
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Remove elements a discovery pass no longer reports
    pub prune_unreported: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prune_unreported: true,
        }
    }
}

impl PlanConfig {
    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be read, and [`Error::Config`]
    /// if it cannot be parsed or names an empty runner id.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|error| Error::Config(format!("Failed to parse config: {error}")))?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {:?}: runner_id={}, test_attributes={}",
            path,
            config.runner_id,
            config.classifier.test_attributes.len()
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file or its directory cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        fs::write(path, format!("# Test plan configuration\n\n{contents}"))?;

        Ok(())
    }

    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the runner id is empty.
    pub fn validate(&self) -> Result<()> {
        if self.runner_id.trim().is_empty() {
            return Err(Error::Config("runner_id must not be empty".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "Test code is allowed to use expect")]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = PlanConfig::default();
        assert_eq!(config.runner_id, "xunit");
        assert!(config.discovery.prune_unreported);
        assert_eq!(config.classifier.skip_argument, "Skip");
        assert_eq!(config.classifier.test_attributes.len(), 2);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
runner_id = "nunit"

[discovery]
prune_unreported = false
"#;
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(toml_content.as_bytes())
            .expect("Failed to write to temp file");

        let config = PlanConfig::load_from_file(temp_file.path()).expect("Failed to load config");
        assert_eq!(config.runner_id, "nunit");
        assert!(!config.discovery.prune_unreported);
        assert_eq!(config.classifier, ClassifierConfig::default());
    }

    #[test]
    fn test_empty_runner_rejected() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"runner_id = \"  \"\n")
            .expect("Failed to write to temp file");

        let result = PlanConfig::load_from_file(temp_file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("testplan.toml");
        let mut config = PlanConfig::default();
        config.classifier.test_attributes.push("Custom.TestAttribute".to_owned());

        config.save_to_file(&path).expect("Failed to save config");
        let reloaded = PlanConfig::load_from_file(&path).expect("Failed to reload config");
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = PlanConfig::load_from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
