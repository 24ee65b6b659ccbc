//! Shipyard Stack
//!
//! Client for the provisioning system that owns the deployment environments.
//! Each environment (`common`, `latest`, `stage`) is one stack with its own
//! config and outputs.
//!
//! Two implementations share the [`StackStore`] contract:
//! - [`PulumiStack`] drives the `pulumi` CLI through the command runner
//! - [`MemoryStackStore`] keeps stacks in process and records every call
//!
//! Operations are never retried here; the caller decides what a failure means
//! for the rest of the run.

pub mod error;
mod memory;
mod pulumi;

pub use error::{Result, StackError, StackOperation};
pub use memory::{Bucket, MemoryStackStore, StackCall};
pub use pulumi::{PulumiProvider, PulumiStack};

use async_trait::async_trait;
use shipyard_core::domain::environment::{ConfigOverrides, Environment};
use shipyard_runner::BuildContext;
use std::sync::Arc;

/// Contract of an environment stack store
///
/// `select_or_create` picks the stack that `apply` mutates; the read and
/// destroy operations name their stack explicitly. The store does not
/// enforce any destroy order.
#[async_trait]
pub trait StackStore: Send + Sync {
    /// Select a stack, creating it when absent
    async fn select_or_create(&self, env: &Environment) -> Result<()>;

    /// Provision the selected stack with the given config, auto-approved
    async fn apply(&self, overrides: &ConfigOverrides) -> Result<()>;

    /// Read a published output of a stack
    ///
    /// # Returns
    /// The output as a string, or [`StackError::NotFound`] when it is absent
    /// or empty
    async fn get_output(&self, env: &Environment, key: &str) -> Result<String>;

    /// Tear down every resource of a stack, auto-approved
    async fn destroy(&self, env: &Environment) -> Result<()>;
}

/// Opens a stack store for one target execution
///
/// Credentials are resolved parameters, so the store is built from the
/// build context rather than at start-up.
pub trait StackProvider: Send + Sync {
    fn connect(&self, ctx: &BuildContext) -> anyhow::Result<Arc<dyn StackStore>>;
}
