//! Target graph and execution planning
//!
//! Targets form a directed graph where an edge `A -> B` means "A must
//! complete before B". Edges come from two places:
//! - `B.depends_on` contains `A` (A is a prerequisite of B)
//! - `A.runs_before` contains `B` (ordering only, does not pull B in)
//!
//! Planning a target takes the target plus its transitive prerequisites and
//! sorts them with Kahn's algorithm. When several targets are ready at once the
//! one registered first wins, so a given graph always yields the same plan.

use crate::domain::target::TargetDefinition;
use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Ordered list of targets to execute for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    requested: String,
    targets: Vec<String>,
}

impl ExecutionPlan {
    /// The target the plan was computed for
    pub fn requested(&self) -> &str {
        &self.requested
    }

    /// Targets in execution order; the requested target is last
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.iter().any(|t| t == name)
    }

    /// Position of a target in the plan
    pub fn position(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t == name)
    }
}

/// Registry of target definitions
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    /// Definitions in registration order
    targets: Vec<TargetDefinition>,
    /// Name -> registration index
    index: HashMap<String, usize>,
}

impl TargetGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target
    ///
    /// Names are unique; registering a name twice is a configuration error.
    pub fn register(&mut self, target: TargetDefinition) -> Result<(), PlanError> {
        if self.index.contains_key(&target.name) {
            return Err(PlanError::DuplicateTarget(target.name));
        }
        self.index.insert(target.name.clone(), self.targets.len());
        self.targets.push(target);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TargetDefinition> {
        self.index.get(name).map(|&i| &self.targets[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Definitions in registration order
    pub fn targets(&self) -> &[TargetDefinition] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Validate the whole graph
    ///
    /// Every edge must point at a registered target and the union of
    /// dependency and ordering edges must be acyclic.
    pub fn validate(&self) -> Result<(), PlanError> {
        for target in &self.targets {
            for name in target.depends_on.iter().chain(&target.runs_before) {
                if !self.index.contains_key(name) {
                    return Err(PlanError::UnknownTarget {
                        name: name.clone(),
                        referenced_by: Some(target.name.clone()),
                    });
                }
            }
        }

        let all: BTreeSet<usize> = (0..self.targets.len()).collect();
        self.sort(&all).map(|_| ())
    }

    /// Compute the execution plan for a target
    pub fn plan(&self, requested: &str) -> Result<ExecutionPlan, PlanError> {
        let root = *self
            .index
            .get(requested)
            .ok_or_else(|| PlanError::unknown(requested))?;

        self.validate()?;

        let closure = self.closure(root);
        let order = self.sort(&closure)?;

        Ok(ExecutionPlan {
            requested: requested.to_string(),
            targets: order
                .into_iter()
                .map(|i| self.targets[i].name.clone())
                .collect(),
        })
    }

    /// The target plus all transitive `depends_on` prerequisites
    fn closure(&self, root: usize) -> BTreeSet<usize> {
        let mut closure = BTreeSet::new();
        let mut stack = vec![root];

        while let Some(idx) = stack.pop() {
            if !closure.insert(idx) {
                continue;
            }
            for dep in &self.targets[idx].depends_on {
                if let Some(&dep_idx) = self.index.get(dep) {
                    stack.push(dep_idx);
                }
            }
        }

        closure
    }

    /// Successor lists: `successors()[a]` holds every `b` with an edge `a -> b`
    fn successors(&self) -> Vec<BTreeSet<usize>> {
        let mut successors = vec![BTreeSet::new(); self.targets.len()];

        for (idx, target) in self.targets.iter().enumerate() {
            for dep in &target.depends_on {
                if let Some(&dep_idx) = self.index.get(dep) {
                    successors[dep_idx].insert(idx);
                }
            }
            for next in &target.runs_before {
                if let Some(&next_idx) = self.index.get(next) {
                    successors[idx].insert(next_idx);
                }
            }
        }

        successors
    }

    /// Stable topological sort of `nodes`, ignoring edges that leave the set
    fn sort(&self, nodes: &BTreeSet<usize>) -> Result<Vec<usize>, PlanError> {
        let successors = self.successors();

        let mut in_degree: HashMap<usize, usize> = nodes.iter().map(|&n| (n, 0)).collect();
        for &node in nodes {
            for next in successors[node].iter().filter(|n| nodes.contains(n)) {
                *in_degree.entry(*next).or_default() += 1;
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&node, _)| node)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for next in successors[node].iter().filter(|n| nodes.contains(n)) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }

        if order.len() != nodes.len() {
            let sorted: BTreeSet<usize> = order.into_iter().collect();
            let remaining: BTreeSet<usize> = nodes.difference(&sorted).copied().collect();
            return Err(PlanError::Cycle {
                members: self.find_cycle(&remaining, &successors),
            });
        }

        Ok(order)
    }

    /// Find one cycle among `nodes` for error reporting
    fn find_cycle(&self, nodes: &BTreeSet<usize>, successors: &[BTreeSet<usize>]) -> Vec<String> {
        let mut visited = BTreeSet::new();

        for &start in nodes {
            let mut path = Vec::new();
            if let Some(cycle) = self.dfs_find_cycle(start, nodes, successors, &mut visited, &mut path)
            {
                return cycle
                    .into_iter()
                    .map(|i| self.targets[i].name.clone())
                    .collect();
            }
        }

        // Kahn left these unsorted, so some cycle passes through them
        nodes.iter().map(|&i| self.targets[i].name.clone()).collect()
    }

    fn dfs_find_cycle(
        &self,
        node: usize,
        nodes: &BTreeSet<usize>,
        successors: &[BTreeSet<usize>],
        visited: &mut BTreeSet<usize>,
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        if let Some(start) = path.iter().position(|&n| n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }

        if !visited.insert(node) {
            return None;
        }

        path.push(node);
        for &next in successors[node].iter().filter(|n| nodes.contains(n)) {
            if let Some(cycle) = self.dfs_find_cycle(next, nodes, successors, visited, path) {
                return Some(cycle);
            }
        }
        path.pop();

        None
    }
}
