//! Shipyard Core
//!
//! Core types and abstractions for the Shipyard build/deploy orchestrator.
//!
//! This crate contains:
//! - Domain types: targets, parameters, environments and run reports
//! - Artifact tags: the identifier given to every built container image
//! - Target graph: registration, validation and execution planning
//!
//! Nothing in here performs I/O. Execution lives in `shipyard-runner`,
//! provisioning in `shipyard-stack`.

pub mod domain;
pub mod error;
pub mod graph;
pub mod tag;

pub use error::{PlanError, TagError};
pub use graph::{ExecutionPlan, TargetGraph};
pub use tag::ArtifactTag;
