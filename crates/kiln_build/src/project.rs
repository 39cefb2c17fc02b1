//! Build projects: rules applied to a root, ordered into tasks and run one at
//! a time.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::error::BuildError;
use crate::executor::{submit, ExecutionService};
use crate::graph::DependencyGraph;
use crate::handle::BuildHandle;
use crate::meter::Meter;
use crate::root::Root;
use crate::rule::Rule;
use crate::task::{Task, TaskInstance};

/// A resolved dependency of the project.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Package {
    /// Package name.
    pub name: String,
    /// Resolved version.
    pub version: String,
}

impl Package {
    /// Creates a package.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Outcome of [`BuildProject::clean`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Targets that were removed.
    pub removed: Vec<Artifact>,
    /// Targets that did not exist.
    pub missing: Vec<Artifact>,
}

impl CleanReport {
    /// Returns `true` if every target was removed.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A set of rules over a root, with the tasks they produced at the last
/// [`BuildProject::refresh`].
///
/// Tasks are held in dependency order alongside their initialised
/// instances. Building requires a fresh refresh; [`BuildProject::clean`]
/// leaves the project stale.
pub struct BuildProject {
    root: Arc<dyn Root>,
    rules: Vec<Box<dyn Rule>>,
    packages: Vec<Package>,
    tasks: Vec<Box<dyn Task>>,
    instances: Vec<TaskInstance>,
    fresh: bool,
}

impl BuildProject {
    /// Creates a project with no rules over `root`.
    pub fn new(root: Arc<dyn Root>) -> Self {
        Self {
            root,
            rules: Vec::new(),
            packages: Vec::new(),
            tasks: Vec::new(),
            instances: Vec::new(),
            fresh: false,
        }
    }

    /// Adds a rule. Rules are applied in the order they were added.
    pub fn add_rule(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Box::new(rule));
        self.fresh = false;
    }

    /// Adds a resolved package.
    pub fn add_package(&mut self, package: Package) {
        self.packages.push(package);
    }

    /// Returns the root.
    pub fn root(&self) -> &Arc<dyn Root> {
        &self.root
    }

    /// Returns the resolved packages.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Returns the tasks of the last refresh in execution order.
    pub fn tasks(&self) -> &[Box<dyn Task>] {
        &self.tasks
    }

    /// Returns `true` if the tasks reflect the current root.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Re-reads the root, re-applies every rule, orders the resulting tasks
    /// and initialises them.
    ///
    /// On error the project is left empty and stale.
    pub fn refresh(&mut self) -> Result<(), BuildError> {
        self.tasks.clear();
        self.instances.clear();
        self.fresh = false;

        self.root.refresh()?;
        let mut tasks: Vec<Box<dyn Task>> = Vec::new();
        for rule in &self.rules {
            rule.apply(&self.root, &mut tasks)?;
        }

        let order = DependencyGraph::new(&tasks).order()?;
        let mut slots: Vec<Option<Box<dyn Task>>> = tasks.into_iter().map(Some).collect();
        let ordered: Vec<Box<dyn Task>> = order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect();

        let instances = ordered
            .iter()
            .map(|task| task.initialise())
            .collect::<Result<Vec<_>, _>>()?;

        info!(tasks = ordered.len(), rules = self.rules.len(), "refreshed project");
        self.tasks = ordered;
        self.instances = instances;
        self.fresh = true;
        Ok(())
    }

    /// Persists buffered writes in the root.
    pub fn flush(&self) -> Result<(), BuildError> {
        self.root.flush()
    }

    /// Removes the target of every task from the last refresh.
    ///
    /// The project must be refreshed again before it is built.
    pub fn clean(&mut self) -> Result<CleanReport, BuildError> {
        let mut report = CleanReport::default();
        for task in &self.tasks {
            let target = task.target();
            if self.root.remove(target)? {
                report.removed.push(target.clone());
            } else {
                debug!(target = %target, "nothing to clean");
                report.missing.push(target.clone());
            }
        }
        self.fresh = false;
        info!(removed = report.removed.len(), missing = report.missing.len(), "cleaned targets");
        Ok(report)
    }

    /// Starts running every task in order on `service`.
    ///
    /// The whole run is one job on the service; each task is a further job
    /// that the run waits on before starting the next, so the service needs
    /// at least two workers. The run stops at the first task that returns
    /// `false` or faults, or once the returned handle is cancelled.
    pub fn build(
        &self,
        service: Arc<dyn ExecutionService>,
        meter: Arc<dyn Meter>,
    ) -> Result<BuildHandle, BuildError> {
        if !self.fresh {
            return Err(BuildError::NotRefreshed);
        }

        let instances = self.instances.clone();
        let targets: Vec<String> = self.tasks.iter().map(|t| t.target().to_string()).collect();
        let started = Arc::new(AtomicBool::new(false));

        let run_started = started.clone();
        let run_meter = meter.clone();
        let run_service = service.clone();
        let job = submit(service.as_ref(), move |token| {
            run_started.store(true, Ordering::Release);
            for (instance, target) in instances.into_iter().zip(&targets) {
                if token.is_cancelled() {
                    debug!(next = %target, "build cancelled");
                    return false;
                }
                let meter = run_meter.clone();
                let task = submit(run_service.as_ref(), move |_| instance(meter.as_ref()));
                match task.wait() {
                    Ok(true) => debug!(target = %target, "task succeeded"),
                    Ok(false) => {
                        warn!(target = %target, "task failed");
                        return false;
                    }
                    Err(e) => {
                        warn!(target = %target, error = %e, "task faulted");
                        return false;
                    }
                }
            }
            true
        });

        Ok(BuildHandle::new(job, meter, started))
    }
}

impl fmt::Debug for BuildProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildProject")
            .field("rules", &self.rules.len())
            .field("packages", &self.packages)
            .field("tasks", &self.tasks.len())
            .field("fresh", &self.fresh)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactId, ContentType};
    use crate::executor::ThreadPoolService;
    use crate::handle::BuildState;
    use crate::meter::NullMeter;
    use crate::root::MemoryRoot;
    use crate::task::FnTask;
    use std::sync::Mutex;

    fn art(id: &str) -> Artifact {
        Artifact::new(ArtifactId::new(id), ContentType::new("Text", "txt"))
    }

    /// Emits a fixed set of tasks that record their target into a log.
    struct Fixed {
        specs: Vec<(Vec<&'static str>, &'static str, bool)>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Rule for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn apply(&self, _root: &Arc<dyn Root>, tasks: &mut Vec<Box<dyn Task>>) -> Result<(), BuildError> {
            for (sources, target, ok) in &self.specs {
                let log = self.log.clone();
                let name = target.to_string();
                let ok = *ok;
                tasks.push(Box::new(FnTask::new(
                    sources.iter().map(|s| art(s)).collect(),
                    art(target),
                    move |_| {
                        log.lock().unwrap().push(name.clone());
                        ok
                    },
                )));
            }
            Ok(())
        }
    }

    fn project(specs: Vec<(Vec<&'static str>, &'static str, bool)>) -> (BuildProject, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut project = BuildProject::new(Arc::new(MemoryRoot::new()));
        project.add_rule(Fixed {
            specs,
            log: log.clone(),
        });
        (project, log)
    }

    fn service() -> Arc<dyn ExecutionService> {
        Arc::new(ThreadPoolService::new(2).unwrap())
    }

    #[test]
    fn build_requires_refresh() {
        let (project, _) = project(vec![]);
        let err = project.build(service(), Arc::new(NullMeter)).unwrap_err();
        assert!(matches!(err, BuildError::NotRefreshed));
    }

    #[test]
    fn runs_tasks_in_dependency_order() {
        let (mut project, log) = project(vec![
            (vec!["b"], "c", true),
            (vec!["a"], "b", true),
            (vec![], "a", true),
        ]);
        project.refresh().unwrap();
        let handle = project.build(service(), Arc::new(NullMeter)).unwrap();
        assert_eq!(handle.wait(), Ok(true));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(handle.state(), BuildState::Completed);
    }

    #[test]
    fn first_failure_stops_the_run() {
        let (mut project, log) = project(vec![
            (vec![], "a", true),
            (vec!["a"], "b", false),
            (vec!["b"], "c", true),
        ]);
        project.refresh().unwrap();
        let handle = project.build(service(), Arc::new(NullMeter)).unwrap();
        assert_eq!(handle.wait(), Ok(false));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(handle.state(), BuildState::Failed);
    }

    #[test]
    fn clean_marks_project_stale() {
        let (mut project, _) = project(vec![(vec![], "a", true)]);
        project.refresh().unwrap();
        assert!(project.is_fresh());
        let report = project.clean().unwrap();
        assert_eq!(report.missing, vec![art("a")]);
        assert!(!report.is_complete());
        assert!(!project.is_fresh());
    }

    #[test]
    fn cycle_leaves_project_stale() {
        let (mut project, _) = project(vec![(vec!["b"], "a", true), (vec!["a"], "b", true)]);
        let err = project.refresh().unwrap_err();
        assert!(matches!(err, BuildError::DependencyCycle { .. }));
        assert!(project.tasks().is_empty());
        assert!(!project.is_fresh());
    }

    #[test]
    fn package_display() {
        assert_eq!(Package::new("stdlib", "1.2.0").to_string(), "stdlib@1.2.0");
    }
}
