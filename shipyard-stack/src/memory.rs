//! In-process stack store
//!
//! Keeps every stack in memory and records each call made against it, so a
//! run can be replayed without touching real infrastructure (`--dry-run`) and
//! tests can assert which buckets were applied or destroyed, and in what order.

use async_trait::async_trait;
use serde::Serialize;
use shipyard_core::domain::environment::{ConfigOverrides, Environment, StackOutputs};
use shipyard_runner::BuildContext;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use crate::error::{Result, StackError, StackOperation};
use crate::{StackProvider, StackStore};

/// One call made against the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum StackCall {
    Select { bucket: Environment },
    Apply { bucket: Environment, config: ConfigOverrides },
    GetOutput { bucket: Environment, key: String },
    Destroy { bucket: Environment },
}

/// Config and outputs of one stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bucket {
    pub config: ConfigOverrides,
    pub outputs: StackOutputs,
}

#[derive(Default)]
struct State {
    selected: Option<Environment>,
    buckets: BTreeMap<Environment, Bucket>,
    calls: Vec<StackCall>,
    failures: HashSet<(Environment, StackOperation)>,
}

/// Stack store that lives in memory
///
/// Clones share the same stacks. Applying a stack publishes its config
/// values as outputs, the way the infrastructure program echoes `dockerTag`.
#[derive(Clone, Default)]
pub struct MemoryStackStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an output, as if an earlier run had published it
    pub fn with_output(self, env: &Environment, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.lock()
            .buckets
            .entry(env.clone())
            .or_default()
            .outputs
            .insert(key.to_string(), value.into());
        self
    }

    /// Make an operation on a stack fail
    pub fn fail_on(self, env: &Environment, operation: StackOperation) -> Self {
        self.lock().failures.insert((env.clone(), operation));
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<StackCall> {
        self.lock().calls.clone()
    }

    /// Config of every apply made to a stack, in order
    pub fn applies_to(&self, env: &Environment) -> Vec<ConfigOverrides> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                StackCall::Apply { bucket, config } if bucket == env => Some(config.clone()),
                _ => None,
            })
            .collect()
    }

    /// Destroyed stacks, in call order
    pub fn destroyed(&self) -> Vec<Environment> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                StackCall::Destroy { bucket } => Some(bucket.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn bucket(&self, env: &Environment) -> Option<Bucket> {
        self.lock().buckets.get(env).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the data usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(state: &State, env: &Environment, operation: StackOperation) -> Result<()> {
        if state.failures.contains(&(env.clone(), operation)) {
            return Err(StackError::operation(
                env.as_str(),
                operation,
                "injected failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StackStore for MemoryStackStore {
    async fn select_or_create(&self, env: &Environment) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StackCall::Select {
            bucket: env.clone(),
        });
        Self::check(&state, env, StackOperation::Select)?;

        state.buckets.entry(env.clone()).or_default();
        state.selected = Some(env.clone());
        Ok(())
    }

    async fn apply(&self, overrides: &ConfigOverrides) -> Result<()> {
        let mut state = self.lock();
        let env = state.selected.clone().ok_or(StackError::NoStackSelected)?;
        state.calls.push(StackCall::Apply {
            bucket: env.clone(),
            config: overrides.clone(),
        });
        Self::check(&state, &env, StackOperation::Apply)?;

        info!("[dry-run] Applied stack '{}'", env);
        let bucket = state.buckets.entry(env).or_default();
        for (key, value) in overrides.iter() {
            bucket.config.insert(key.clone(), value.clone());
            bucket
                .outputs
                .insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        Ok(())
    }

    async fn get_output(&self, env: &Environment, key: &str) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(StackCall::GetOutput {
            bucket: env.clone(),
            key: key.to_string(),
        });
        Self::check(&state, env, StackOperation::Output)?;

        let value = state.buckets.get(env).and_then(|b| b.outputs.get(key));
        match value {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
                Err(StackError::not_found(env.as_str(), key))
            }
            Some(other) => Ok(other.to_string()),
        }
    }

    async fn destroy(&self, env: &Environment) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StackCall::Destroy {
            bucket: env.clone(),
        });
        Self::check(&state, env, StackOperation::Destroy)?;

        info!("[dry-run] Destroyed stack '{}'", env);
        state.buckets.remove(env);
        if state.selected.as_ref() == Some(env) {
            state.selected = None;
        }
        Ok(())
    }
}

impl StackProvider for MemoryStackStore {
    fn connect(&self, _ctx: &BuildContext) -> anyhow::Result<Arc<dyn StackStore>> {
        Ok(Arc::new(self.clone()))
    }
}
