//! Stage dependency graph
//!
//! Consumer stages form a directed acyclic graph: a stage may only see an
//! event after every stage it depends on has finished with it. The graph is
//! validated once, at build time, and yields the order in which barriers must
//! be created plus the terminal stages whose sequences gate the producers.

use crate::disruptor::{DisruptorError, Result};
use std::collections::{HashMap, VecDeque};

/// Declaration of one consumer stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub name: String,
    /// Names of upstream stages; empty for a stage fed directly by producers
    pub dependencies: Vec<String>,
}

impl StageSpec {
    /// A stage that consumes straight from the producers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// A stage that runs after the named stages
    pub fn after<S: AsRef<str>>(name: impl Into<String>, dependencies: &[S]) -> Self {
        Self {
            name: name.into(),
            dependencies: dependencies.iter().map(|d| d.as_ref().to_string()).collect(),
        }
    }
}

/// A validated stage graph, with stages referred to by registration index
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    upstream: Vec<Vec<usize>>,
    order: Vec<usize>,
    terminal: Vec<bool>,
}

impl DependencyGraph {
    /// Validate stage declarations
    ///
    /// # Errors
    /// * `DisruptorError::DuplicateStage` if two stages share a name
    /// * `DisruptorError::UnknownDependency` if a stage names an undeclared stage
    /// * `DisruptorError::CyclicDependency` if the stages do not form a DAG;
    ///   a stage depending on itself is a cycle
    pub fn new(stages: &[StageSpec]) -> Result<Self> {
        let mut index_of = HashMap::with_capacity(stages.len());
        for (index, stage) in stages.iter().enumerate() {
            if index_of.insert(stage.name.as_str(), index).is_some() {
                return Err(DisruptorError::DuplicateStage(stage.name.clone()));
            }
        }

        let mut upstream = Vec::with_capacity(stages.len());
        for stage in stages {
            let mut deps = Vec::with_capacity(stage.dependencies.len());
            for dependency in &stage.dependencies {
                let index = *index_of.get(dependency.as_str()).ok_or_else(|| {
                    DisruptorError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                if !deps.contains(&index) {
                    deps.push(index);
                }
            }
            upstream.push(deps);
        }

        let order = topological_order(&upstream).map_err(|remaining| {
            let names: Vec<&str> = remaining.iter().map(|&i| stages[i].name.as_str()).collect();
            DisruptorError::CyclicDependency(names.join(", "))
        })?;

        let mut terminal = vec![true; stages.len()];
        for deps in &upstream {
            for &dep in deps {
                terminal[dep] = false;
            }
        }

        Ok(Self {
            names: stages.iter().map(|s| s.name.clone()).collect(),
            upstream,
            order,
            terminal,
        })
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if no stage was declared
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of a stage
    pub fn name(&self, stage: usize) -> &str {
        &self.names[stage]
    }

    /// Registration index of a named stage
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Upstream stages of a stage
    pub fn dependencies(&self, stage: usize) -> &[usize] {
        &self.upstream[stage]
    }

    /// Stages ordered so that every stage follows all of its dependencies
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    /// True if no other stage depends on `stage`
    pub fn is_terminal(&self, stage: usize) -> bool {
        self.terminal[stage]
    }

    /// Stages nothing depends on, in registration order
    pub fn terminal_stages(&self) -> Vec<usize> {
        (0..self.len()).filter(|&s| self.terminal[s]).collect()
    }
}

/// Kahn's algorithm, taking ready stages in registration order
///
/// On a cycle, returns the stages that could not be ordered.
fn topological_order(upstream: &[Vec<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let mut pending: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let mut downstream = vec![Vec::new(); upstream.len()];
    for (stage, deps) in upstream.iter().enumerate() {
        for &dep in deps {
            downstream[dep].push(stage);
        }
    }

    let mut ready: VecDeque<usize> = (0..upstream.len()).filter(|&s| pending[s] == 0).collect();
    let mut order = Vec::with_capacity(upstream.len());

    while let Some(stage) = ready.pop_front() {
        order.push(stage);
        for &next in &downstream[stage] {
            pending[next] -= 1;
            if pending[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() == upstream.len() {
        Ok(order)
    } else {
        Err((0..upstream.len()).filter(|&s| pending[s] > 0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_stages_are_all_terminal() {
        let graph = DependencyGraph::new(&[StageSpec::new("a"), StageSpec::new("b")]).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.topological_order(), &[0, 1]);
        assert_eq!(graph.terminal_stages(), vec![0, 1]);
    }

    #[test]
    fn test_diamond() {
        let graph = DependencyGraph::new(&[
            StageSpec::after("join", &["left", "right"]),
            StageSpec::new("source"),
            StageSpec::after("left", &["source"]),
            StageSpec::after("right", &["source"]),
        ])
        .unwrap();

        let position = |name: &str| {
            let index = graph.index_of(name).unwrap();
            graph
                .topological_order()
                .iter()
                .position(|&s| s == index)
                .unwrap()
        };
        assert!(position("source") < position("left"));
        assert!(position("source") < position("right"));
        assert!(position("left") < position("join"));
        assert!(position("right") < position("join"));

        assert_eq!(graph.terminal_stages(), vec![0]);
        assert!(!graph.is_terminal(graph.index_of("source").unwrap()));
        assert_eq!(graph.dependencies(0), &[2, 3]);
    }

    #[test]
    fn test_duplicate_dependencies_are_collapsed() {
        let graph =
            DependencyGraph::new(&[StageSpec::new("a"), StageSpec::after("b", &["a", "a"])]).unwrap();
        assert_eq!(graph.dependencies(1), &[0]);
    }

    #[test]
    fn test_unknown_dependency() {
        let err = DependencyGraph::new(&[StageSpec::after("b", &["missing"])]).unwrap_err();
        match err {
            DisruptorError::UnknownDependency { stage, dependency } => {
                assert_eq!(stage, "b");
                assert_eq!(dependency, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_stage() {
        let err = DependencyGraph::new(&[StageSpec::new("a"), StageSpec::new("a")]).unwrap_err();
        assert!(matches!(err, DisruptorError::DuplicateStage(name) if name == "a"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = DependencyGraph::new(&[
            StageSpec::new("root"),
            StageSpec::after("a", &["root", "c"]),
            StageSpec::after("b", &["a"]),
            StageSpec::after("c", &["b"]),
        ])
        .unwrap_err();
        assert!(matches!(err, DisruptorError::CyclicDependency(names) if names == "a, b, c"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = DependencyGraph::new(&[StageSpec::after("loop", &["loop"])]).unwrap_err();
        assert!(matches!(err, DisruptorError::CyclicDependency(names) if names == "loop"));
    }
}
