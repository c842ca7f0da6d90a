//! Taskforge - composable action scripts with rollback and typed flags.
//!
//! This crate ties the workspace together: it re-exports the engine
//! ([`tf_script`]), the command binder ([`tf_command`]) and the leaf
//! operations ([`tf_ops`]), and adds the process-level pieces a binary needs:
//! signal-driven startup/shutdown ([`start()`]) and logging setup
//! ([`logging::init`]).

pub mod logging;
pub mod start;

pub use start::{shutdown_signal, start, start_with};

pub use tf_command::{Binding, Command, Flag, FlagKind, ARGS_KEY};
pub use tf_core::{EngineConfig, Error, Result};
pub use tf_script::{
    add_rollback, defer, environ, from_fn, from_sync_fn, noop, run, sequence, set_branch,
    switch, with_output, with_policy, Action, ActionRef, BoxFuture, Branch, CancellationToken,
    Capture, Policy, Script, SharedWriter, State, Value,
};

/// Process and filesystem actions.
pub mod ops {
    pub use tf_ops::*;
}
