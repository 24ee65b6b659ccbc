//! Shipyard Runner
//!
//! Executes build plans. The pieces, leaf first:
//! - Process: launching external tools and capturing their output
//! - Redaction: keeping secret values out of logs and errors
//! - Resolver: turning declared parameters into concrete values
//! - Targets: runnable target definitions and the registry holding them
//! - Context: the immutable view every target body receives
//! - Executor: planning, batch validation and sequential execution
//!
//! Target bodies never share mutable state. Values produced by one target
//! (an image tag, for instance) are returned as outputs and read back by
//! later targets through the context.

pub mod context;
pub mod executor;
pub mod process;
pub mod redact;
pub mod resolver;
pub mod target;

pub use context::{BuildContext, TargetContext};
pub use executor::{ExecutionError, Executor, FailureKind, PreparedRun};
pub use process::{
    CommandFailure, CommandOutput, CommandRunner, CommandSpec, LaunchError, SystemCommandRunner,
};
pub use redact::Redactor;
pub use resolver::{
    MissingParameter, ParameterResolver, Parameters, Prompter, ResolveError, VarProvider,
};
pub use target::{Target, TargetBody, TargetOutputs, TargetRegistry};
