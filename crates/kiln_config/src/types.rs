//! Configuration types deserialized from `kiln.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The top-level project configuration parsed from `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Package metadata.
    pub package: PackageMeta,
    /// Dependencies by name.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Build rules, applied in the order they appear.
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

/// Package metadata required in every `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct PackageMeta {
    /// The package name.
    pub name: String,
    /// The package version string.
    pub version: String,
    /// A brief description of the package.
    #[serde(default)]
    pub description: String,
}

/// A dependency, either a bare version or a table.
///
/// ```toml
/// [dependencies]
/// stdlib = "1.2.0"
/// util = { version = "0.3.1", path = "../util" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// A version string.
    Version(String),
    /// A version with an optional local path.
    Detailed {
        /// The required version.
        version: String,
        /// A local directory holding the dependency.
        #[serde(default)]
        path: Option<String>,
    },
}

impl DependencySpec {
    /// Returns the version string.
    pub fn version(&self) -> &str {
        match self {
            DependencySpec::Version(v) => v,
            DependencySpec::Detailed { version, .. } => version,
        }
    }
}

/// Build settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildConfig {
    /// Worker threads for the execution service.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Skip sources whose target is already up to date.
    #[serde(default = "default_incremental")]
    pub incremental: bool,
}

fn default_jobs() -> usize {
    2
}

fn default_incremental() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            incremental: default_incremental(),
        }
    }
}

/// A rule mapping sources under one prefix to targets under another.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleConfig {
    /// Unique rule name.
    pub name: String,
    /// Pattern over artifact ids, e.g. `src/**`.
    pub source: String,
    /// Suffix of the source content type.
    pub source_type: String,
    /// Id prefix the targets are placed under.
    pub target_dir: String,
    /// Suffix of the target content type.
    pub target_type: String,
    /// What the rule does with each source.
    #[serde(default)]
    pub action: Action,
}

/// Built-in transforms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Copy contents unchanged.
    #[default]
    Copy,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Copy => write!(f, "copy"),
        }
    }
}
