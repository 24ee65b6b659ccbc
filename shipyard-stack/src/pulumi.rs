//! Pulumi-backed stack store
//!
//! Every operation is one `pulumi` CLI invocation run in the infrastructure
//! directory. Provider credentials are passed through the environment of the
//! child process, never on the command line.

use async_trait::async_trait;
use shipyard_core::domain::environment::{ConfigOverrides, Environment, StackOutputs};
use shipyard_runner::{BuildContext, CommandOutput, CommandRunner, CommandSpec, Redactor};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::{Result, StackError, StackOperation};
use crate::{StackProvider, StackStore};

/// Environment variable the DigitalOcean provider reads its token from
const DIGITALOCEAN_TOKEN_VAR: &str = "DIGITALOCEAN_TOKEN";

/// Stack store driving the `pulumi` CLI
pub struct PulumiStack {
    runner: Arc<dyn CommandRunner>,
    /// Directory holding the infrastructure program
    workdir: PathBuf,
    env: Vec<(String, String)>,
    redactor: Redactor,
    selected: Mutex<Option<Environment>>,
}

impl PulumiStack {
    /// Creates a new Pulumi stack store
    ///
    /// # Arguments
    /// * `runner` - Runs the `pulumi` binary
    /// * `workdir` - Infrastructure program directory
    pub fn new(runner: Arc<dyn CommandRunner>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
            env: Vec::new(),
            redactor: Redactor::none(),
            selected: Mutex::new(None),
        }
    }

    /// Add an environment variable for every pulumi invocation
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Currently selected stack
    pub fn selected(&self) -> Option<Environment> {
        self.selected.lock().ok().and_then(|s| s.clone())
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new("pulumi")
            .args(args)
            .arg("--non-interactive")
            .cwd(&self.workdir);
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        spec
    }

    async fn exec(
        &self,
        bucket: &Environment,
        operation: StackOperation,
        spec: CommandSpec,
    ) -> Result<CommandOutput> {
        let output = self
            .runner
            .run(&spec, &self.redactor)
            .await
            .map_err(|e| StackError::operation(bucket.as_str(), operation, e.to_string()))?;

        if !output.success() {
            let message = self.redactor.redact(output.stderr.trim());
            return Err(StackError::operation(bucket.as_str(), operation, message));
        }
        Ok(output)
    }
}

#[async_trait]
impl StackStore for PulumiStack {
    async fn select_or_create(&self, env: &Environment) -> Result<()> {
        debug!("Selecting stack '{}'", env);
        let spec = self.command(["stack", "select", env.as_str(), "--create"]);
        self.exec(env, StackOperation::Select, spec).await?;

        if let Ok(mut selected) = self.selected.lock() {
            *selected = Some(env.clone());
        }
        Ok(())
    }

    async fn apply(&self, overrides: &ConfigOverrides) -> Result<()> {
        let env = self.selected().ok_or(StackError::NoStackSelected)?;
        info!("Applying stack '{}'", env);

        let mut args = vec![
            "up".to_string(),
            "--yes".to_string(),
            "--skip-preview".to_string(),
            "--stack".to_string(),
            env.to_string(),
        ];
        for (key, value) in overrides.iter() {
            args.push("--config".to_string());
            args.push(format!("{}={}", key, value));
        }

        self.exec(&env, StackOperation::Apply, self.command(args))
            .await?;
        Ok(())
    }

    async fn get_output(&self, env: &Environment, key: &str) -> Result<String> {
        let spec = self.command(["stack", "output", "--json", "--stack", env.as_str()]);
        let output = self.exec(env, StackOperation::Output, spec).await?;

        let outputs: StackOutputs =
            serde_json::from_str(&output.stdout).map_err(|e| StackError::Parse {
                bucket: env.to_string(),
                message: e.to_string(),
            })?;

        match outputs.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
                Err(StackError::not_found(env.as_str(), key))
            }
            Some(other) => Ok(other.to_string()),
        }
    }

    async fn destroy(&self, env: &Environment) -> Result<()> {
        info!("Destroying stack '{}'", env);
        let spec = self.command(["destroy", "--yes", "--skip-preview", "--stack", env.as_str()]);
        self.exec(env, StackOperation::Destroy, spec).await?;
        Ok(())
    }
}

/// Builds a [`PulumiStack`] per target from the build context
#[derive(Debug, Clone)]
pub struct PulumiProvider {
    /// Infrastructure directory, relative to the repository root
    infrastructure_dir: PathBuf,
}

impl PulumiProvider {
    pub fn new(infrastructure_dir: impl Into<PathBuf>) -> Self {
        Self {
            infrastructure_dir: infrastructure_dir.into(),
        }
    }
}

impl StackProvider for PulumiProvider {
    fn connect(&self, ctx: &BuildContext) -> anyhow::Result<Arc<dyn StackStore>> {
        let mut stack = PulumiStack::new(
            ctx.runner().clone(),
            ctx.root().join(&self.infrastructure_dir),
        )
        .with_redactor(ctx.redactor().clone());

        if let Some(token) = ctx.param("digitalocean-token") {
            stack = stack.with_env(DIGITALOCEAN_TOKEN_VAR, token);
        }
        Ok(Arc::new(stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_runner::LaunchError;

    /// Records command lines and answers from a script of outputs
    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<CommandSpec>>,
        responses: Mutex<Vec<CommandOutput>>,
    }

    impl ScriptedRunner {
        fn respond(self, exit_code: i32, stdout: &str, stderr: &str) -> Self {
            self.responses.lock().unwrap().push(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            });
            self
        }

        fn lines(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.display(&Redactor::none()))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            spec: &CommandSpec,
            _redactor: &Redactor,
        ) -> std::result::Result<CommandOutput, LaunchError> {
            self.calls.lock().unwrap().push(spec.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(CommandOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn stack(runner: Arc<ScriptedRunner>) -> PulumiStack {
        PulumiStack::new(runner, "/repo/infrastructure").with_env(DIGITALOCEAN_TOKEN_VAR, "do-token")
    }

    #[tokio::test]
    async fn test_select_then_apply() {
        let runner = Arc::new(ScriptedRunner::default());
        let stack = stack(runner.clone());

        stack.select_or_create(&Environment::latest()).await.unwrap();
        stack
            .apply(&ConfigOverrides::new().with("dockerTag", "24.01.02.abcdef1-421"))
            .await
            .unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "pulumi stack select latest --create --non-interactive",
                "pulumi up --yes --skip-preview --stack latest --config dockerTag=24.01.02.abcdef1-421 --non-interactive",
            ]
        );
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].cwd, Some(PathBuf::from("/repo/infrastructure")));
        assert_eq!(
            calls[1].env,
            vec![(DIGITALOCEAN_TOKEN_VAR.to_string(), "do-token".to_string())]
        );
    }

    #[tokio::test]
    async fn test_apply_without_selection() {
        let stack = stack(Arc::new(ScriptedRunner::default()));
        let err = stack.apply(&ConfigOverrides::new()).await.unwrap_err();
        assert!(matches!(err, StackError::NoStackSelected));
    }

    #[tokio::test]
    async fn test_get_output() {
        let runner = Arc::new(ScriptedRunner::default().respond(
            0,
            r#"{"dockerTag": "24.01.02.abcdef1-421", "LiveUrl": "https://latest.example.com", "replicas": 2}"#,
            "",
        ));
        let stack = stack(runner.clone());

        let tag = stack
            .get_output(&Environment::latest(), "dockerTag")
            .await
            .unwrap();
        assert_eq!(tag, "24.01.02.abcdef1-421");
        assert_eq!(
            runner.lines(),
            vec!["pulumi stack output --json --stack latest --non-interactive"]
        );
    }

    #[tokio::test]
    async fn test_get_output_missing_or_empty_is_not_found() {
        for body in [r#"{}"#, r#"{"dockerTag": ""}"#, r#"{"dockerTag": null}"#] {
            let runner = Arc::new(ScriptedRunner::default().respond(0, body, ""));
            let err = stack(runner)
                .get_output(&Environment::latest(), "dockerTag")
                .await
                .unwrap_err();
            assert!(err.is_not_found(), "{body}: {err}");
        }
    }

    #[tokio::test]
    async fn test_get_output_non_string_value() {
        let runner = Arc::new(ScriptedRunner::default().respond(0, r#"{"replicas": 2}"#, ""));
        let value = stack(runner)
            .get_output(&Environment::stage(), "replicas")
            .await
            .unwrap();
        assert_eq!(value, "2");
    }

    #[tokio::test]
    async fn test_get_output_parse_error() {
        let runner = Arc::new(ScriptedRunner::default().respond(0, "not json", ""));
        let err = stack(runner)
            .get_output(&Environment::latest(), "dockerTag")
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::Parse { ref bucket, .. } if bucket == "latest"));
    }

    #[tokio::test]
    async fn test_failure_names_bucket_and_operation() {
        let runner = Arc::new(ScriptedRunner::default().respond(
            255,
            "",
            "error: 401 Unauthorized token do-token\n",
        ));
        let stack = stack(runner).with_redactor(Redactor::new(["do-token"]));

        let err = stack.destroy(&Environment::stage()).await.unwrap_err();
        match err {
            StackError::Operation {
                bucket,
                operation,
                message,
            } => {
                assert_eq!(bucket, "stage");
                assert_eq!(operation, StackOperation::Destroy);
                assert_eq!(message, "error: 401 Unauthorized token ****");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_select_keeps_previous_selection() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .respond(0, "", "")
                .respond(1, "", "no such stack"),
        );
        let stack = stack(runner);

        stack.select_or_create(&Environment::latest()).await.unwrap();
        assert!(stack.select_or_create(&Environment::stage()).await.is_err());
        assert_eq!(stack.selected(), Some(Environment::latest()));
    }
}
