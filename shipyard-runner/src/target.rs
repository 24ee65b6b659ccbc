//! Runnable targets and the registry holding them
//!
//! A [`Target`] is a plain record: a [`TargetDefinition`] (name, edges,
//! requirements) plus a body. Targets are registered once at start-up and
//! never change afterwards.

use async_trait::async_trait;
use shipyard_core::domain::target::TargetDefinition;
use shipyard_core::{ExecutionPlan, PlanError, TargetGraph};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::context::TargetContext;

/// Values a target publishes for later targets, e.g. `dockerTag`
pub type TargetOutputs = BTreeMap<String, String>;

/// The unit of work behind a target
///
/// Bodies are not assumed idempotent; a body that needs cleanup on failure
/// does it itself.
#[async_trait]
pub trait TargetBody: Send + Sync {
    /// Executes the target
    ///
    /// # Arguments
    /// * `ctx` - Parameters, command runner and outputs of earlier targets
    ///
    /// # Returns
    /// Outputs readable by targets planned after this one
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs>;
}

/// Body backed by a synchronous closure
struct FnBody<F>(F);

#[async_trait]
impl<F> TargetBody for FnBody<F>
where
    F: Fn(&TargetContext<'_>) -> anyhow::Result<TargetOutputs> + Send + Sync,
{
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        (self.0)(ctx)
    }
}

/// Body of targets that only group their dependencies
struct AggregateBody;

#[async_trait]
impl TargetBody for AggregateBody {
    async fn execute(&self, _ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        Ok(TargetOutputs::new())
    }
}

/// A target definition together with its body
#[derive(Clone)]
pub struct Target {
    definition: TargetDefinition,
    body: Arc<dyn TargetBody>,
}

impl Target {
    pub fn new(definition: TargetDefinition, body: impl TargetBody + 'static) -> Self {
        Self {
            definition,
            body: Arc::new(body),
        }
    }

    /// Target whose body is a closure
    pub fn from_fn<F>(definition: TargetDefinition, body: F) -> Self
    where
        F: Fn(&TargetContext<'_>) -> anyhow::Result<TargetOutputs> + Send + Sync + 'static,
    {
        Self::new(definition, FnBody(body))
    }

    /// Target with an empty body, useful to run a set of dependencies
    pub fn aggregate(definition: TargetDefinition) -> Self {
        Self::new(definition, AggregateBody)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &TargetDefinition {
        &self.definition
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// All targets known to one invocation
#[derive(Default)]
pub struct TargetRegistry {
    graph: TargetGraph,
    bodies: HashMap<String, Arc<dyn TargetBody>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target; duplicate names are rejected
    pub fn register(&mut self, target: Target) -> Result<(), PlanError> {
        self.graph.register(target.definition.clone())?;
        self.bodies.insert(target.definition.name, target.body);
        Ok(())
    }

    /// Register several targets, stopping at the first error
    pub fn register_all<I>(&mut self, targets: I) -> Result<(), PlanError>
    where
        I: IntoIterator<Item = Target>,
    {
        targets.into_iter().try_for_each(|t| self.register(t))
    }

    pub fn graph(&self) -> &TargetGraph {
        &self.graph
    }

    pub fn definition(&self, name: &str) -> Option<&TargetDefinition> {
        self.graph.get(name)
    }

    pub fn body(&self, name: &str) -> Option<Arc<dyn TargetBody>> {
        self.bodies.get(name).cloned()
    }

    /// Compute the execution plan for a target
    pub fn plan(&self, name: &str) -> Result<ExecutionPlan, PlanError> {
        self.graph.plan(name)
    }
}
