//! Execution context for target bodies
//!
//! [`BuildContext`] is assembled once per invocation, after parameters are
//! resolved, and is never mutated. Each body receives a [`TargetContext`]:
//! the build context plus read-only access to what earlier targets produced.

use anyhow::Context as _;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::redact::Redactor;
use crate::resolver::Parameters;
use crate::target::TargetOutputs;

/// Immutable state shared by every target of one run
#[derive(Clone)]
pub struct BuildContext {
    /// Repository root; relative paths resolve against it
    root: PathBuf,
    parameters: Parameters,
    runner: Arc<dyn CommandRunner>,
    redactor: Redactor,
}

impl BuildContext {
    /// Creates a new build context
    ///
    /// # Arguments
    /// * `root` - Repository root directory
    /// * `parameters` - Values resolved for the plan
    /// * `runner` - Launches external commands
    pub fn new(root: impl Into<PathBuf>, parameters: Parameters, runner: Arc<dyn CommandRunner>) -> Self {
        let redactor = parameters.redactor();
        Self {
            root: root.into(),
            parameters,
            runner,
            redactor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Optional parameter value
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name)
    }

    /// Parameter value the current target declared as required
    pub fn require(&self, name: &str) -> anyhow::Result<&str> {
        self.parameters.require(name)
    }

    /// Runs a command and fails on a non-zero exit
    ///
    /// The error carries a [`crate::CommandFailure`] (or
    /// [`crate::LaunchError`]) that callers can downcast to.
    pub async fn run(&self, spec: CommandSpec) -> anyhow::Result<CommandOutput> {
        let output = self.runner.run(&spec, &self.redactor).await?;
        Ok(output.check(&spec, &self.redactor)?)
    }

    /// Runs a command and returns its output whatever the exit code
    pub async fn run_unchecked(&self, spec: CommandSpec) -> anyhow::Result<CommandOutput> {
        Ok(self.runner.run(&spec, &self.redactor).await?)
    }
}

/// What a single target body sees
pub struct TargetContext<'a> {
    build: &'a BuildContext,
    target: &'a str,
    outputs: &'a BTreeMap<String, TargetOutputs>,
}

impl<'a> TargetContext<'a> {
    pub fn new(
        build: &'a BuildContext,
        target: &'a str,
        outputs: &'a BTreeMap<String, TargetOutputs>,
    ) -> Self {
        Self {
            build,
            target,
            outputs,
        }
    }

    /// Name of the target being executed
    pub fn target(&self) -> &str {
        self.target
    }

    /// Output published earlier in this run by `target`
    pub fn output(&self, target: &str, key: &str) -> Option<&str> {
        self.outputs
            .get(target)
            .and_then(|o| o.get(key))
            .map(String::as_str)
    }

    /// Output that must have been published by an earlier target
    pub fn require_output(&self, target: &str, key: &str) -> anyhow::Result<&str> {
        self.output(target, key)
            .with_context(|| format!("Target '{}' did not publish '{}' in this run", target, key))
    }
}

impl Deref for TargetContext<'_> {
    type Target = BuildContext;

    fn deref(&self) -> &BuildContext {
        self.build
    }
}
