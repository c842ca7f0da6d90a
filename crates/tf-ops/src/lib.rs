//! # tf-ops
//!
//! Leaf actions doing process and filesystem work for taskforge scripts.
//!
//! Every path argument is resolved through
//! [`State::filepath`](tf_script::State::filepath), and spawned processes
//! inherit the state's environment and working directory rather than the
//! host process's.
//!
//! Bucket conventions shared by the process actions:
//!
//! - `"stdin"` ([`Value::Bytes`](tf_script::Value::Bytes)): fed to the child when non-empty.
//! - `"stdout"` (`Value::Bytes`): captured output of [`exec`].
//! - `"success"` ([`Value::Bool`](tf_script::Value::Bool)): whether the child exited successfully.

pub mod fs;
pub mod process;

pub use fs::{copy, delete, move_path, write_file_stdout, PathFilter};
pub use process::{exec, exec_stream_out, pipe, set_env, Exec};
