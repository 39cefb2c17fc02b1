//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::collections::BTreeSet;
use std::path::Path;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a `kiln.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::IoError {
            path: config_path.clone(),
            source,
        })?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks required fields and that rules are consistent.
pub fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.package.name.is_empty() {
        return Err(ConfigError::MissingField("package.name".to_string()));
    }
    if config.package.version.is_empty() {
        return Err(ConfigError::MissingField("package.version".to_string()));
    }
    if config.build.jobs == 0 {
        return Err(ConfigError::ValidationError(
            "build.jobs must be at least 1".to_string(),
        ));
    }

    let mut names = BTreeSet::new();
    for (i, rule) in config.rules.iter().enumerate() {
        if rule.name.is_empty() {
            return Err(ConfigError::MissingField(format!("rule[{i}].name")));
        }
        if !names.insert(rule.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate rule '{}'",
                rule.name
            )));
        }
        for (field, value) in [("source", &rule.source), ("target-dir", &rule.target_dir)] {
            if value.split(['/', '\\']).any(|segment| segment == "..") {
                return Err(ConfigError::ValidationError(format!(
                    "rule '{}'.{field} must stay inside the project: {value}",
                    rule.name
                )));
            }
        }
        for (field, value) in [
            ("source-type", &rule.source_type),
            ("target-type", &rule.target_type),
        ] {
            if value.is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "rule '{}'.{field}",
                    rule.name
                )));
            }
        }
    }

    for (name, dep) in &config.dependencies {
        if dep.version().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "dependencies.{name}.version"
            )));
        }
    }
    Ok(())
}
