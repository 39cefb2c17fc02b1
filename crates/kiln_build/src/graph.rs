//! Task dependency graph and execution ordering.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::artifact::Artifact;
use crate::error::BuildError;
use crate::task::Task;

/// Dependencies between tasks, keyed by their position in the task list.
///
/// There is an edge from `j` to `i` when one of task `i`'s sources is task
/// `j`'s target.
pub struct DependencyGraph {
    graph: DiGraph<usize, ()>,
    targets: Vec<Artifact>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Placed,
}

impl DependencyGraph {
    /// Builds the graph for `tasks`.
    pub fn new(tasks: &[Box<dyn Task>]) -> Self {
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        for i in 0..tasks.len() {
            graph.add_node(i);
        }

        let mut producers: HashMap<&Artifact, Vec<usize>> = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            producers.entry(task.target()).or_default().push(i);
        }
        for (i, task) in tasks.iter().enumerate() {
            for source in task.sources() {
                for &j in producers.get(source).into_iter().flatten() {
                    graph.update_edge(NodeIndex::new(j), NodeIndex::new(i), ());
                }
            }
        }

        Self {
            graph,
            targets: tasks.iter().map(|t| t.target().clone()).collect(),
        }
    }

    /// Returns the number of tasks.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if there are no tasks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the indices of the tasks `index` depends on, ascending.
    pub fn dependencies(&self, index: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), Direction::Incoming)
            .map(|n| n.index())
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Orders the tasks so every task follows all of its dependencies.
    ///
    /// Tasks are visited in list order and each one's unplaced dependencies
    /// are placed first, so independent tasks keep their relative order.
    pub fn order(&self) -> Result<Vec<usize>, BuildError> {
        let n = self.len();
        let deps: Vec<Vec<usize>> = (0..n).map(|i| self.dependencies(i)).collect();
        let mut marks = vec![Mark::Unvisited; n];
        let mut order = Vec::with_capacity(n);

        for start in 0..n {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            // (task, next dependency to look at)
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::Visiting;
            while let Some(top) = stack.last_mut() {
                let (node, next) = *top;
                if let Some(&dep) = deps[node].get(next) {
                    top.1 += 1;
                    match marks[dep] {
                        Mark::Placed => {}
                        Mark::Visiting => {
                            return Err(BuildError::DependencyCycle {
                                target: self.targets[dep].to_string(),
                            })
                        }
                        Mark::Unvisited => {
                            marks[dep] = Mark::Visiting;
                            stack.push((dep, 0));
                        }
                    }
                } else {
                    marks[node] = Mark::Placed;
                    order.push(node);
                    stack.pop();
                }
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactId, ContentType};
    use crate::task::FnTask;

    fn art(id: &str) -> Artifact {
        Artifact::new(ArtifactId::new(id), ContentType::new("Text", "txt"))
    }

    fn task(sources: &[&str], target: &str) -> Box<dyn Task> {
        Box::new(FnTask::new(
            sources.iter().map(|s| art(s)).collect(),
            art(target),
            |_| true,
        ))
    }

    #[test]
    fn chain_is_ordered_regardless_of_registration() {
        // c <- b <- a, registered backwards
        let tasks = vec![task(&["b"], "c"), task(&["a"], "b"), task(&[], "a")];
        let graph = DependencyGraph::new(&tasks);
        assert_eq!(graph.dependencies(0), vec![1]);
        assert_eq!(graph.order().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn independent_tasks_keep_list_order() {
        let tasks = vec![task(&[], "x"), task(&[], "y"), task(&["x"], "z")];
        assert_eq!(DependencyGraph::new(&tasks).order().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn diamond_places_shared_dependency_once() {
        let tasks = vec![
            task(&["l", "r"], "top"),
            task(&["base"], "l"),
            task(&["base"], "r"),
            task(&[], "base"),
        ];
        let order = DependencyGraph::new(&tasks).order().unwrap();
        assert_eq!(order, vec![3, 1, 2, 0]);
    }

    #[test]
    fn cycle_is_reported() {
        let tasks = vec![task(&["b"], "a"), task(&["a"], "b")];
        let err = DependencyGraph::new(&tasks).order().unwrap_err();
        assert!(matches!(err, BuildError::DependencyCycle { .. }));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let tasks = vec![task(&["a"], "a")];
        let err = DependencyGraph::new(&tasks).order().unwrap_err();
        assert!(matches!(err, BuildError::DependencyCycle { .. }));
    }

    #[test]
    fn external_sources_add_no_edges() {
        let tasks = vec![task(&["src/main"], "bin/main")];
        let graph = DependencyGraph::new(&tasks);
        assert!(graph.dependencies(0).is_empty());
        assert_eq!(graph.order().unwrap(), vec![0]);
    }
}
