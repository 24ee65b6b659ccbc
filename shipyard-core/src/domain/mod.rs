//! Core domain types
//!
//! This module contains the core domain structures used across Shipyard crates.
//! They describe what a build is made of (targets, parameters, environments)
//! and what happened during a run (reports). Behaviour lives elsewhere.

pub mod environment;
pub mod parameter;
pub mod run;
pub mod target;
