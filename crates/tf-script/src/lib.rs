//! # tf-script
//!
//! The script execution engine.
//!
//! This crate provides:
//!
//! - **[`Action`]** trait -- a single unit of work run against the shared
//!   [`State`] and the enclosing [`Script`].
//! - **[`State`]** -- per-run environment, working directory, output streams,
//!   branch tag, error policy, loggers and the dynamically typed bucket of
//!   [`Value`]s actions use to talk to each other.
//! - **[`Script`]** -- a growable list of actions with a cursor, a rollback
//!   sequence, and the policy-driven failure handling in
//!   [`Script::run_action`].
//! - **Combinators** ([`control`]) -- switch on a branch tag, scoped policy,
//!   redirected output, nested sequences, rollback/defer registration.

pub mod action;
pub mod control;
pub mod policy;
pub mod script;
pub mod state;
pub mod value;

// Re-export key types at the crate root.
pub use action::{from_fn, from_sync_fn, noop, Action, ActionRef};
pub use control::{add_rollback, defer, sequence, set_branch, switch, with_output, with_policy};
pub use policy::{Branch, Policy};
pub use script::{run, Script};
pub use state::{environ, State};
pub use value::{Capture, SharedWriter, Value};

pub use futures::future::BoxFuture;
pub use tf_core::{Error, Result};
pub use tokio_util::sync::CancellationToken;
