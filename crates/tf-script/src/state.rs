//! Per-run mutable state shared by every action of a script.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tf_core::Error;

use crate::policy::{Branch, Policy};
use crate::value::Value;

/// Output stream handle held by the state.
pub type Output = Box<dyn Write + Send>;

/// Callback receiving errors reported through [`State::error`].
pub type ErrorLogger = Box<dyn Fn(&Error) + Send + Sync>;

/// Callback receiving messages reported through [`State::log`].
pub type MsgLogger = Box<dyn Fn(&str) + Send + Sync>;

/// Snapshot the process environment as a map.
///
/// Entries whose key or value is not valid unicode are skipped.
pub fn environ() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Mutable context of one run.
///
/// `stdout`, `stderr` and `policy` are swappable by nested scopes; whoever
/// swaps one must restore it on every exit path.
pub struct State {
    /// Environment handed to spawned processes and flag fallbacks.
    pub env: HashMap<String, String>,
    /// Directory relative paths are resolved against.
    pub dir: PathBuf,
    pub stdout: Output,
    pub stderr: Output,
    /// One-shot tag consumed by [`switch`](crate::switch).
    pub branch: Branch,
    pub policy: Policy,
    pub error_logger: Option<ErrorLogger>,
    pub msg_logger: Option<MsgLogger>,

    bucket: HashMap<String, Value>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// An isolated state: empty environment, `.` as working directory,
    /// discarding output streams and no loggers.
    pub fn new() -> Self {
        Self {
            env: HashMap::new(),
            dir: PathBuf::from("."),
            stdout: Box::new(io::sink()),
            stderr: Box::new(io::sink()),
            branch: Branch::UNSET,
            policy: Policy::FAIL,
            error_logger: None,
            msg_logger: None,
            bucket: HashMap::new(),
        }
    }

    /// A state wired to the current process: environment snapshot, working
    /// directory, standard streams, and loggers printing errors to stderr and
    /// messages to stdout.
    pub fn from_env() -> Self {
        let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            env: environ(),
            dir,
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
            error_logger: Some(Box::new(|err: &Error| eprintln!("{err}"))),
            msg_logger: Some(Box::new(|msg: &str| println!("{msg}"))),
            ..Self::new()
        }
    }

    /// Builder: replace the environment.
    pub fn with_env<K, V>(mut self, env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Builder: set the working directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Builder: set the standard output stream.
    pub fn with_stdout(mut self, out: impl Write + Send + 'static) -> Self {
        self.stdout = Box::new(out);
        self
    }

    /// Builder: set the standard error stream.
    pub fn with_stderr(mut self, out: impl Write + Send + 'static) -> Self {
        self.stderr = Box::new(out);
        self
    }

    /// Builder: set the error logger.
    pub fn with_error_logger(mut self, logger: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.error_logger = Some(Box::new(logger));
        self
    }

    /// Builder: set the message logger.
    pub fn with_msg_logger(mut self, logger: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.msg_logger = Some(Box::new(logger));
        self
    }

    /// Report an error to the error logger, if any.
    pub fn error(&self, err: &Error) {
        if let Some(logger) = &self.error_logger {
            logger(err);
        }
    }

    /// Report a message to the message logger, if any.
    pub fn log(&self, msg: impl AsRef<str>) {
        if let Some(logger) = &self.msg_logger {
            logger(msg.as_ref());
        }
    }

    /// `name` if absolute, otherwise `name` joined onto [`State::dir`].
    pub fn filepath(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.dir.join(name)
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bucket.get(name)
    }

    /// The bucket value called `name`, or `fallback` when absent.
    pub fn get_or(&self, name: &str, fallback: impl Into<Value>) -> Value {
        match self.bucket.get(name) {
            Some(v) => v.clone(),
            None => fallback.into(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bucket.insert(name.into(), value.into());
    }

    pub fn delete(&mut self, name: &str) -> Option<Value> {
        self.bucket.remove(name)
    }

    /// All bucket entries, in no particular order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bucket.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Substitute `${name}` and `$name` placeholders.
    ///
    /// A bucket value wins over an environment value, which wins over the
    /// empty string.
    pub fn expand_env(&self, text: &str) -> String {
        shellexpand::env_with_context_no_errors(text, |name: &str| Some(self.lookup(name)))
            .into_owned()
    }

    fn lookup(&self, name: &str) -> String {
        if let Some(v) = self.bucket.get(name) {
            return v.to_string();
        }
        self.env.get(name).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("dir", &self.dir)
            .field("branch", &self.branch)
            .field("policy", &self.policy)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}
