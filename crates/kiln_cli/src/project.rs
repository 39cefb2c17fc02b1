//! Shared helpers for CLI commands: locating the project and assembling a
//! [`BuildProject`] from its configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_build::{
    ArtifactId, BuildProject, ContentRegistry, ContentType, CopyTransform, DirectoryRoot, Filter,
    Package, Transform, TransformRule,
};
use kiln_config::{Action, ProjectConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing `kiln.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `kiln.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}

fn content_type(suffix: &str) -> ContentType {
    ContentType::new(suffix.to_ascii_uppercase(), suffix)
}

fn transform(action: Action) -> Arc<dyn Transform> {
    match action {
        Action::Copy => Arc::new(CopyTransform),
    }
}

/// Registers every content type named by a rule.
pub fn content_registry(config: &ProjectConfig) -> ContentRegistry {
    let mut registry = ContentRegistry::new();
    for rule in &config.rules {
        registry.register(content_type(&rule.source_type));
        registry.register(content_type(&rule.target_type));
    }
    registry
}

/// Builds the project for `config` over the directory `project_dir`.
///
/// `incremental` is combined with `build.incremental`: both must be set for
/// up-to-date targets to be skipped.
pub fn open_project(
    config: &ProjectConfig,
    project_dir: &Path,
    incremental: bool,
) -> Result<BuildProject, Box<dyn std::error::Error>> {
    let root = DirectoryRoot::open(project_dir, content_registry(config))?;
    let mut project = BuildProject::new(Arc::new(root));
    for rule in &config.rules {
        project.add_rule(
            TransformRule::new(
                rule.name.clone(),
                Filter::new(&rule.source).with_type(content_type(&rule.source_type)),
                ArtifactId::new(&rule.target_dir),
                content_type(&rule.target_type),
                transform(rule.action),
            )
            .incremental(incremental && config.build.incremental),
        );
    }
    for (name, dep) in &config.dependencies {
        project.add_package(Package::new(name.clone(), dep.version()));
    }
    Ok(project)
}
