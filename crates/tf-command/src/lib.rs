//! # tf-command
//!
//! Binds command-line tokens to typed values consumed by script actions.
//!
//! A [`Command`] tree is declarative: names, usage text, [`Flag`]
//! declarations, child commands and a bound leaf action. [`Command::exec`]
//! turns an argument vector into an action that, when run inside a live
//! [`Script`](tf_script::Script), resolves flags (explicit arguments,
//! environment fallbacks, declared defaults) into the state bucket and appends
//! either the leaf action or the selected child's own resolver to the script.
//!
//! Flags use a single leading dash, `=` separates an inline value, and a bare
//! `--` passes the remaining tokens through as positional arguments (stored
//! under [`ARGS_KEY`]).

pub mod command;
pub mod flag;
pub mod parse;

pub use command::{Command, ARGS_KEY};
pub use flag::{Binding, Flag, FlagKind};
