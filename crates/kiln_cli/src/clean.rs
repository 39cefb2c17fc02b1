//! `kiln clean`: remove every target the rules produce.

use crate::project::{open_project, resolve_project_root};
use crate::GlobalArgs;

/// Runs the `kiln clean` command.
///
/// Returns exit code 1 if any target was already missing.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = kiln_config::load_config(&project_dir)?;

    // Every target, not just the out-of-date ones.
    let mut project = open_project(&config, &project_dir, false)?;
    project.refresh()?;
    let report = project.clean()?;
    project.flush()?;

    for artifact in &report.missing {
        eprintln!("warning: {artifact} does not exist");
    }
    if !global.quiet {
        eprintln!("   Cleaned {} file(s)", report.removed.len());
    }
    Ok(if report.is_complete() { 0 } else { 1 })
}
