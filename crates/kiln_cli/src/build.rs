//! `kiln build`: refresh, run every task in order, flush.

use std::sync::Arc;
use std::time::Duration;

use kiln_build::{JobError, ThreadPoolService, TracingMeter};
use tracing::debug;

use crate::project::{open_project, resolve_project_root};
use crate::{BuildArgs, GlobalArgs};

/// Runs the `kiln build` command.
///
/// Returns exit code 0 when every task succeeded and 1 when a task failed or
/// the build timed out.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = kiln_config::load_config(&project_dir)?;

    if !global.quiet {
        eprintln!(
            "   Building {} v{}",
            config.package.name, config.package.version
        );
    }

    let mut project = open_project(&config, &project_dir, !args.full)?;
    project.refresh()?;
    if project.tasks().is_empty() {
        if !global.quiet {
            eprintln!("   Up to date");
        }
        return Ok(0);
    }

    let jobs = args.jobs.unwrap_or(config.build.jobs);
    let service = Arc::new(ThreadPoolService::new(jobs)?);
    debug!(jobs = service.threads(), tasks = project.tasks().len(), "starting build");

    let handle = project.build(service, Arc::new(TracingMeter::new()))?;
    let outcome = match args.timeout {
        Some(secs) => match handle.wait_timeout(Duration::from_secs(secs)) {
            Err(JobError::Timeout) => {
                handle.cancel();
                eprintln!("error: build timed out after {secs}s");
                return Ok(1);
            }
            other => other,
        },
        None => handle.wait(),
    };

    if !outcome? {
        // Keep whatever the successful tasks produced.
        project.flush()?;
        eprintln!("error: build failed");
        return Ok(1);
    }
    project.flush()?;

    if !global.quiet {
        eprintln!("   Finished {} task(s)", project.tasks().len());
    }
    Ok(0)
}
