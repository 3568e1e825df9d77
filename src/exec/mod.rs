// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] runs a single external tool with `tokio::process::Command`
//!   and turns its exit status into a [`ToolResult`].
//! - [`tools`] provides the [`AlignmentToolkit`] trait and the concrete
//!   [`ExternalToolkit`] that the engine uses in production, and which tests
//!   can replace with a fake implementation.

pub mod command;
pub mod tools;

pub use command::{ToolCommand, ToolFailure, ToolResult, run_tool, stream_tool};
pub use tools::{AlignmentToolkit, ExternalToolkit};
