//! Command runner that records instead of executing
//!
//! Used by `run --dry-run` and by the workflow tests. Every command is
//! logged and recorded; it succeeds with empty output unless a rule matches
//! its command line.

use async_trait::async_trait;
use shipyard_runner::{CommandOutput, CommandRunner, CommandSpec, LaunchError, Redactor};
use std::sync::Mutex;
use tracing::info;

/// Canned result for command lines starting with `prefix`
#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    exit_code: i32,
    stdout: String,
}

#[derive(Debug, Default)]
pub struct RecordingRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner for `--dry-run`: nothing is ever found in the registry
    pub fn dry_run() -> Self {
        Self::new().exit_with("docker manifest inspect", 1)
    }

    /// Commands starting with `prefix` exit with `exit_code`
    pub fn exit_with(self, prefix: &str, exit_code: i32) -> Self {
        self.respond(prefix, exit_code, "")
    }

    /// Commands starting with `prefix` print `stdout` and exit with `exit_code`
    pub fn respond(mut self, prefix: &str, exit_code: i32, stdout: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            exit_code,
            stdout: stdout.to_string(),
        });
        self
    }

    /// Recorded command lines, unredacted
    pub fn lines(&self) -> Vec<String> {
        self.specs()
            .iter()
            .map(|s| s.display(&Redactor::none()))
            .collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        redactor: &Redactor,
    ) -> Result<CommandOutput, LaunchError> {
        info!("[dry-run] {}", spec.display(redactor));
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }

        let line = spec.display(&Redactor::none());
        let rule = self.rules.iter().find(|r| line.starts_with(&r.prefix));
        Ok(CommandOutput {
            exit_code: rule.map_or(0, |r| r.exit_code),
            stdout: rule.map(|r| r.stdout.clone()).unwrap_or_default(),
            stderr: if rule.is_some_and(|r| r.exit_code != 0) {
                format!("{} exited with {}", spec.program, rule.map_or(0, |r| r.exit_code))
            } else {
                String::new()
            },
        })
    }
}
