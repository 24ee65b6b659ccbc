//! Graph executor
//!
//! Runs one requested target:
//! - Computing the plan (requested target plus transitive dependencies)
//! - Resolving every parameter the plan needs before any body runs
//! - Executing bodies one at a time in plan order, stopping at the first failure
//! - Recording the outcome of each target in a [`RunReport`]
//!
//! An interrupt (Ctrl+C) cancels the body in flight and skips the rest.

use shipyard_core::domain::run::{RunReport, RunStatus, TargetStatus};
use shipyard_core::{ExecutionPlan, PlanError};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::context::{BuildContext, TargetContext};
use crate::process::{CommandFailure, LaunchError};
use crate::resolver::{ParameterResolver, Parameters, ResolveError};
use crate::target::{TargetOutputs, TargetRegistry};

/// What kind of failure stopped a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// An external command exited non-zero or could not be launched
    Command,
    /// The body itself returned an error
    Body,
}

impl FailureKind {
    fn of(error: &anyhow::Error) -> Self {
        if error.downcast_ref::<CommandFailure>().is_some()
            || error.downcast_ref::<LaunchError>().is_some()
        {
            Self::Command
        } else {
            Self::Body
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Parameters(#[from] ResolveError),

    /// `message` is already redacted; `error` keeps the typed cause
    #[error("Target '{target}' failed: {message}")]
    TargetFailed {
        target: String,
        kind: FailureKind,
        message: String,
        error: anyhow::Error,
        report: Box<RunReport>,
    },

    #[error("Interrupted while running target '{target}'")]
    Interrupted {
        target: String,
        report: Box<RunReport>,
    },
}

impl ExecutionError {
    /// Report of the partial run, when bodies had started
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::TargetFailed { report, .. } | Self::Interrupted { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// A validated plan with every required parameter resolved
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub plan: ExecutionPlan,
    pub parameters: Parameters,
}

/// Executes plans over a fixed set of targets
pub struct Executor {
    registry: TargetRegistry,
}

impl Executor {
    pub fn new(registry: TargetRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Compute the plan for a target without resolving anything
    pub fn plan(&self, target: &str) -> Result<ExecutionPlan, ExecutionError> {
        Ok(self.registry.plan(target)?)
    }

    /// Plan a target and resolve the parameters of the whole plan
    ///
    /// Fails with every missing parameter at once; no body runs before this
    /// succeeds.
    pub fn prepare(
        &self,
        target: &str,
        resolver: &ParameterResolver,
    ) -> Result<PreparedRun, ExecutionError> {
        let plan = self.plan(target)?;
        debug!("Plan for '{}': {}", target, plan.targets().join(" -> "));

        let mut required = Vec::new();
        let mut used = Vec::new();
        for name in plan.targets() {
            let definition = self
                .registry
                .definition(name)
                .ok_or_else(|| PlanError::unknown(name.as_str()))?;
            required.extend(definition.requires.iter().map(|r| (r.as_str(), name.as_str())));
            used.extend(definition.uses.iter().map(|u| (u.as_str(), name.as_str())));
        }

        let parameters = resolver.resolve_plan(required, used)?;
        Ok(PreparedRun { plan, parameters })
    }

    /// Execute a prepared plan, stopping on Ctrl+C
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        ctx: &BuildContext,
    ) -> Result<RunReport, ExecutionError> {
        self.execute_until(plan, ctx, ctrl_c()).await
    }

    /// Execute a prepared plan, stopping when `interrupt` completes
    ///
    /// # Arguments
    /// * `plan` - Targets in execution order
    /// * `ctx` - Build context built from the prepared parameters
    /// * `interrupt` - Future that completes when the run must stop
    ///
    /// # Returns
    /// The report of a fully successful run
    pub async fn execute_until<F>(
        &self,
        plan: &ExecutionPlan,
        ctx: &BuildContext,
        interrupt: F,
    ) -> Result<RunReport, ExecutionError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let mut report = RunReport::new(plan.requested(), plan.targets());
        let mut outputs: BTreeMap<String, TargetOutputs> = BTreeMap::new();
        let total = plan.len();

        info!("Running '{}' ({} targets)", plan.requested(), total);

        for (idx, name) in plan.targets().iter().enumerate() {
            let body = self
                .registry
                .body(name)
                .ok_or_else(|| PlanError::unknown(name.as_str()))?;

            info!("[{}/{}] {}", idx + 1, total, name);
            if let Some(record) = report.target_mut(name) {
                record.status = TargetStatus::Running;
                record.started_at = Some(chrono::Utc::now());
            }

            let started = Instant::now();
            let result = {
                let target_ctx = TargetContext::new(ctx, name, &outputs);
                tokio::select! {
                    result = body.execute(&target_ctx) => Some(result),
                    _ = &mut interrupt => None,
                }
            };
            let elapsed = started.elapsed();

            let record = report.target_mut(name);
            match result {
                Some(Ok(produced)) => {
                    info!("Target '{}' completed in {:.1}s", name, elapsed.as_secs_f64());
                    if let Some(record) = record {
                        record.status = TargetStatus::Succeeded;
                        record.completed_at = Some(chrono::Utc::now());
                        record.outputs = produced
                            .iter()
                            .map(|(k, v)| (k.clone(), ctx.redactor().redact(v)))
                            .collect();
                    }
                    outputs.insert(name.clone(), produced);
                }
                Some(Err(err)) => {
                    let kind = FailureKind::of(&err);
                    let message = ctx.redactor().redact(&format!("{:#}", err));
                    error!("Target '{}' failed: {}", name, message);
                    if let Some(record) = record {
                        record.status = TargetStatus::Failed;
                        record.completed_at = Some(chrono::Utc::now());
                        record.error = Some(message.clone());
                    }
                    report.finish(RunStatus::Failed);
                    return Err(ExecutionError::TargetFailed {
                        target: name.clone(),
                        kind,
                        message,
                        error: err,
                        report: Box::new(report),
                    });
                }
                None => {
                    warn!("Interrupted during target '{}'", name);
                    if let Some(record) = record {
                        record.status = TargetStatus::Interrupted;
                        record.completed_at = Some(chrono::Utc::now());
                    }
                    report.finish(RunStatus::Interrupted);
                    return Err(ExecutionError::Interrupted {
                        target: name.clone(),
                        report: Box::new(report),
                    });
                }
            }
        }

        report.finish(RunStatus::Succeeded);
        info!("'{}' succeeded", plan.requested());
        Ok(report)
    }
}

/// Completes on Ctrl+C; never completes if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, CommandRunner, CommandSpec};
    use crate::redact::Redactor;
    use crate::target::{Target, TargetBody};
    use async_trait::async_trait;
    use shipyard_core::domain::parameter::{ParameterCatalog, ParameterDefinition};
    use shipyard_core::domain::target::TargetDefinition;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records commands; programs listed in `failing` exit with 1
    #[derive(Default)]
    struct FakeRunner {
        failing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            spec: &CommandSpec,
            redactor: &Redactor,
        ) -> Result<CommandOutput, LaunchError> {
            let line = spec.display(redactor);
            self.calls.lock().unwrap().push(line.clone());
            let exit_code = if self.failing.contains(&line) { 1 } else { 0 };
            Ok(CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: "tests failed".to_string(),
            })
        }
    }

    /// Body that runs one command
    struct RunBody(&'static str);

    #[async_trait]
    impl TargetBody for RunBody {
        async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
            let mut parts = self.0.split(' ');
            let program = parts.next().unwrap_or_default();
            ctx.run(CommandSpec::new(program).args(parts)).await?;
            Ok(TargetOutputs::new())
        }
    }

    struct HangingBody;

    #[async_trait]
    impl TargetBody for HangingBody {
        async fn execute(&self, _ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
            std::future::pending::<anyhow::Result<TargetOutputs>>().await
        }
    }

    fn never() -> impl Future<Output = ()> {
        std::future::pending()
    }

    fn context(runner: Arc<FakeRunner>) -> BuildContext {
        BuildContext::new(".", Parameters::default(), runner)
    }

    fn dotnet_registry() -> TargetRegistry {
        let mut registry = TargetRegistry::new();
        registry
            .register_all([
                Target::new(TargetDefinition::new("restore"), RunBody("dotnet restore")),
                Target::new(
                    TargetDefinition::new("compile").depends_on(["restore"]),
                    RunBody("dotnet build"),
                ),
                Target::new(
                    TargetDefinition::new("test").depends_on(["compile"]),
                    RunBody("dotnet test"),
                ),
                Target::new(
                    TargetDefinition::new("publish").depends_on(["test"]),
                    RunBody("dotnet publish"),
                ),
            ])
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_runs_plan_in_order() {
        let executor = Executor::new(dotnet_registry());
        let runner = Arc::new(FakeRunner::default());
        let prepared = executor
            .prepare("publish", &ParameterResolver::new(ParameterCatalog::new()))
            .unwrap();

        let report = executor
            .execute_until(&prepared.plan, &context(runner.clone()), never())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(
            report.succeeded(),
            vec!["restore", "compile", "test", "publish"]
        );
        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec!["dotnet restore", "dotnet build", "dotnet test", "dotnet publish"]
        );
    }

    #[tokio::test]
    async fn test_command_failure_halts_run() {
        let executor = Executor::new(dotnet_registry());
        let runner = Arc::new(FakeRunner {
            failing: vec!["dotnet test".to_string()],
            ..Default::default()
        });
        let plan = executor.plan("publish").unwrap();

        let err = executor
            .execute_until(&plan, &context(runner.clone()), never())
            .await
            .unwrap_err();

        let ExecutionError::TargetFailed {
            target,
            kind,
            error,
            report,
            ..
        } = err
        else {
            panic!("expected target failure");
        };
        assert_eq!(target, "test");
        assert_eq!(kind, FailureKind::Command);
        assert_eq!(error.downcast_ref::<CommandFailure>().unwrap().exit_code, 1);
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.target("test").unwrap().status, TargetStatus::Failed);
        assert_eq!(report.target("publish").unwrap().status, TargetStatus::Skipped);
        assert!(!runner.calls.lock().unwrap().contains(&"dotnet publish".to_string()));
    }

    #[tokio::test]
    async fn test_missing_parameter_fails_before_any_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let mut registry = TargetRegistry::new();
        registry
            .register_all([
                Target::from_fn(TargetDefinition::new("a"), move |_| {
                    flag.store(true, Ordering::SeqCst);
                    Ok(TargetOutputs::new())
                }),
                Target::aggregate(
                    TargetDefinition::new("b")
                        .depends_on(["a"])
                        .requires(["p"]),
                ),
            ])
            .unwrap();
        let executor = Executor::new(registry);

        let mut catalog = ParameterCatalog::new();
        catalog.add(ParameterDefinition::new("p"));
        let resolver = ParameterResolver::new(catalog).with_env(HashMap::new());

        let err = executor.prepare("b", &resolver).unwrap_err();
        match err {
            ExecutionError::Parameters(ResolveError::Missing(missing)) => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].name, "p");
                assert_eq!(missing[0].required_by, vec!["b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_prepare_collects_requirements_of_whole_plan() {
        let mut registry = TargetRegistry::new();
        registry
            .register_all([
                Target::aggregate(TargetDefinition::new("a").requires(["p"])),
                Target::aggregate(TargetDefinition::new("b").depends_on(["a"]).requires(["q"])),
            ])
            .unwrap();
        let executor = Executor::new(registry);

        let mut catalog = ParameterCatalog::new();
        catalog.add(ParameterDefinition::new("p"));
        catalog.add(ParameterDefinition::new("q"));
        let env = HashMap::from([("P".to_string(), "1".to_string())]);
        let resolver = ParameterResolver::new(catalog).with_env(env);

        let Err(ExecutionError::Parameters(ResolveError::Missing(missing))) =
            executor.prepare("b", &resolver)
        else {
            panic!("expected missing parameters");
        };
        assert_eq!(missing.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), ["q"]);
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_execution() {
        let mut registry = TargetRegistry::new();
        registry
            .register_all([
                Target::aggregate(TargetDefinition::new("a").depends_on(["b"])),
                Target::aggregate(TargetDefinition::new("b").depends_on(["a"])),
            ])
            .unwrap();
        let executor = Executor::new(registry);

        let err = executor
            .prepare("a", &ParameterResolver::new(ParameterCatalog::new()))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Plan(ref e) if e.is_cycle_through("a")));
        assert!(err.report().is_none());
    }

    #[tokio::test]
    async fn test_outputs_flow_to_later_targets() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        let mut registry = TargetRegistry::new();
        registry
            .register_all([
                Target::from_fn(TargetDefinition::new("containerize"), |_| {
                    Ok(TargetOutputs::from([(
                        "dockerTag".to_string(),
                        "24.01.02.abcdef1-421".to_string(),
                    )]))
                }),
                Target::from_fn(
                    TargetDefinition::new("deploy").depends_on(["containerize"]),
                    move |ctx| {
                        let tag = ctx.require_output("containerize", "dockerTag")?;
                        *sink.lock().unwrap() = Some(tag.to_string());
                        Ok(TargetOutputs::new())
                    },
                ),
            ])
            .unwrap();
        let executor = Executor::new(registry);
        let plan = executor.plan("deploy").unwrap();

        let report = executor
            .execute_until(&plan, &context(Arc::new(FakeRunner::default())), never())
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("24.01.02.abcdef1-421"));
        assert_eq!(
            report.target("containerize").unwrap().outputs["dockerTag"],
            "24.01.02.abcdef1-421"
        );
    }

    #[tokio::test]
    async fn test_body_error_is_redacted() {
        let mut catalog = ParameterCatalog::new();
        catalog.add(ParameterDefinition::new("token").secret());
        let resolver = ParameterResolver::new(catalog)
            .with_env(HashMap::from([("TOKEN".to_string(), "hunter2".to_string())]));

        let mut registry = TargetRegistry::new();
        registry
            .register(Target::from_fn(
                TargetDefinition::new("login").requires(["token"]),
                |ctx| anyhow::bail!("rejected {}", ctx.require("token")?),
            ))
            .unwrap();
        let executor = Executor::new(registry);
        let prepared = executor.prepare("login", &resolver).unwrap();
        let ctx = BuildContext::new(".", prepared.parameters, Arc::new(FakeRunner::default()));

        let err = executor
            .execute_until(&prepared.plan, &ctx, never())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Target 'login' failed: rejected ****");
        let report = err.report().unwrap();
        assert_eq!(
            report.target("login").unwrap().error.as_deref(),
            Some("rejected ****")
        );
        assert!(matches!(
            err,
            ExecutionError::TargetFailed { kind: FailureKind::Body, .. }
        ));
    }

    #[tokio::test]
    async fn test_interrupt_stops_current_target() {
        let mut registry = TargetRegistry::new();
        registry
            .register_all([
                Target::aggregate(TargetDefinition::new("first")),
                Target::new(
                    TargetDefinition::new("second").depends_on(["first"]),
                    HangingBody,
                ),
                Target::aggregate(TargetDefinition::new("third").depends_on(["second"])),
            ])
            .unwrap();
        let executor = Executor::new(registry);
        let plan = executor.plan("third").unwrap();

        let err = executor
            .execute_until(
                &plan,
                &context(Arc::new(FakeRunner::default())),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        let ExecutionError::Interrupted { target, report } = err else {
            panic!("expected interrupt");
        };
        assert_eq!(target, "second");
        assert_eq!(report.status, RunStatus::Interrupted);
        assert_eq!(report.target("first").unwrap().status, TargetStatus::Succeeded);
        assert_eq!(report.target("second").unwrap().status, TargetStatus::Interrupted);
        assert_eq!(report.target("third").unwrap().status, TargetStatus::Skipped);
    }
}
