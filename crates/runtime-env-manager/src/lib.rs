//! Runtime-Env-Manager: Python discovery and detached server launch for ocrsup
//!
//! This crate owns the two host-facing steps of bringing the OCR companion
//! server up:
//!
//! - [`RuntimeLocator`] walks an ordered, tiered candidate plan and returns the
//!   first Python executable that exists on this machine.
//! - [`DetachedLauncher`] renders a bootstrap script, redirects output to a
//!   diagnostics log and spawns the interpreter without keeping a handle.
//!
//! ## Layer 1 - Host Environment
//!
//! Focus: finding the right interpreter and starting it without blocking.

pub mod bootstrap;
pub mod candidates;
pub mod error;
pub mod launcher;
pub mod locator;

pub use bootstrap::{escape_script_literal, render_bootstrap_script, DEFAULT_ENTRY_MODULE};
pub use candidates::{
    candidate_plan, path_commands, CandidateTarget, CandidateTier, HostLayout, Platform,
    RuntimeCandidate,
};
pub use error::{LaunchError, LocateError};
pub use launcher::{
    DetachedLauncher, LaunchOutcome, LaunchRequest, LaunchSettings, LaunchSpec, Launcher,
};
pub use locator::{is_store_stub, LocatedRuntime, PathResolver, RuntimeLocator, SystemPathResolver};

/// Result type for launch operations
pub type Result<T> = std::result::Result<T, LaunchError>;
