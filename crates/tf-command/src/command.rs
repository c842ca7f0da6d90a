//! Command trees and the resolver action produced by [`Command::exec`].

use std::fmt::{self, Write as _};
use std::sync::Arc;

use async_trait::async_trait;

use tf_core::{Error, Result};
use tf_script::{Action, ActionRef, CancellationToken, Script, State};

use crate::flag::{Flag, FlagStatus};

/// Bucket key holding positional arguments as a [`Value::List`](tf_script::Value::List).
pub const ARGS_KEY: &str = "args";

/// A named node of a command tree.
///
/// Trailing tokens after the last flag are passed to the state as
/// [`ARGS_KEY`] when the node has no children. A node with children reads
/// its first bare token as a child name; pass `--` first to hand it
/// positional arguments instead.
///
/// ```text
/// prog cmd arg1 arg2       # cmd has no children
/// prog cmd -- arg1 arg2    # cmd has one or more children
/// ```
#[derive(Clone, Default)]
pub struct Command {
    pub name: String,
    pub usage: String,
    pub flags: Vec<Flag>,
    pub commands: Vec<Arc<Command>>,
    pub action: Option<ActionRef>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn command(mut self, child: Command) -> Self {
        self.commands.push(Arc::new(child));
        self
    }

    pub fn action(mut self, action: ActionRef) -> Self {
        self.action = Some(action);
        self
    }

    /// An action resolving `args` against this node when run.
    ///
    /// Resolution writes flag values into the state bucket and then appends
    /// either this node's action or the selected child's resolver to the
    /// running script, so a child's flags are only resolved once reached.
    pub fn exec<I, S>(&self, args: I) -> ActionRef
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(self.clone()).resolver(args.into_iter().map(Into::into).collect())
    }

    fn resolver(self: &Arc<Self>, args: Vec<String>) -> ActionRef {
        Arc::new(Resolve {
            command: self.clone(),
            args,
        })
    }

    /// Render the help text for this node, led by `msg` when non-empty.
    pub fn help(&self, msg: &str) -> String {
        let mut out = String::new();
        if !msg.is_empty() {
            out.push_str(msg);
            out.push('\n');
        }
        out.push_str(&self.name);
        if !self.usage.is_empty() {
            let _ = write!(out, " - {}", self.usage);
        }
        out.push('\n');
        for fl in &self.flags {
            out.push_str("\t-");
            if fl.required {
                out.push('*');
            }
            out.push_str(&fl.name);
            if let Some(env) = &fl.env {
                let _ = write!(out, " [{env}]");
            }
            if !fl.usage.is_empty() {
                let _ = write!(out, " - {}", fl.usage);
            }
            if let Some(default) = &fl.default {
                let _ = write!(out, " ({default})");
            }
            out.push('\n');
        }
        out.push('\n');
        for cmd in &self.commands {
            let _ = write!(out, "\t{}", cmd.name);
            if !cmd.usage.is_empty() {
                let _ = write!(out, " - {}", cmd.usage);
            }
            out.push('\n');
        }
        out
    }

    fn usage_error(&self, msg: &str) -> Error {
        Error::usage(self.help(msg))
    }

    fn child(&self, name: &str) -> Option<&Arc<Command>> {
        self.commands.iter().find(|c| c.name == name)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("commands", &self.commands)
            .field("action", &self.action.as_ref().map(|a| a.name()))
            .finish()
    }
}

/// The action returned by [`Command::exec`].
struct Resolve {
    command: Arc<Command>,
    args: Vec<String>,
}

#[async_trait]
impl Action for Resolve {
    fn name(&self) -> &str {
        &self.command.name
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        st: &mut State,
        sc: &mut Script,
    ) -> Result<()> {
        let cmd = &*self.command;
        let mut flags = cmd
            .flags
            .iter()
            .map(FlagStatus::new)
            .collect::<Result<Vec<_>>>()?;

        for fs in flags.iter_mut() {
            let Some(var) = &fs.flag.env else {
                continue;
            };
            let Some(raw) = st.env.get(var).filter(|v| !v.is_empty()).cloned() else {
                continue;
            };
            fs.set(st, &raw, true).map_err(|e| cmd.usage_error(&e))?;
        }

        let args = &self.args;
        let mut pending: Option<usize> = None;
        let mut i = 0;
        while i < args.len() {
            let token = args[i].as_str();
            i += 1;

            if let Some(idx) = pending.take() {
                flags[idx]
                    .set(st, token, false)
                    .map_err(|e| cmd.usage_error(&e))?;
                continue;
            }
            if token.is_empty() {
                continue;
            }

            let Some(body) = token.strip_prefix('-') else {
                if cmd.commands.is_empty() {
                    st.set(ARGS_KEY, args[i - 1..].to_vec());
                    break;
                }
                apply_defaults(st, &flags)?;
                let child = cmd
                    .child(token)
                    .ok_or_else(|| cmd.usage_error(&format!("invalid command {token:?}")))?;
                check_required(cmd, &flags)?;
                tracing::debug!(command = %cmd.name, child = %child.name, "dispatching subcommand");
                sc.add([child.resolver(args[i..].to_vec())]);
                return Ok(());
            };

            if body == "-" {
                st.set(ARGS_KEY, args[i..].to_vec());
                break;
            }

            let (name, value) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (body, None),
            };
            let idx = flags
                .iter()
                .position(|fs| fs.flag.name == name)
                .ok_or_else(|| cmd.usage_error(&format!("invalid flag -{name}")))?;
            let res = match value {
                Some(value) => flags[idx].set(st, value, false),
                None if flags[idx].kind.takes_value() => {
                    pending = Some(idx);
                    Ok(())
                }
                None => flags[idx].set(st, "", false),
            };
            res.map_err(|e| cmd.usage_error(&e))?;
        }

        apply_defaults(st, &flags)?;
        if let Some(idx) = pending {
            let name = &flags[idx].flag.name;
            return Err(cmd.usage_error(&format!("expected value after flag {name:?}")));
        }
        check_required(cmd, &flags)?;
        let Some(action) = &cmd.action else {
            return Err(cmd.usage_error("incorrect command"));
        };
        sc.add([action.clone()]);
        Ok(())
    }
}

fn apply_defaults(st: &mut State, flags: &[FlagStatus<'_>]) -> Result<()> {
    for fs in flags.iter().filter(|fs| !fs.used) {
        fs.set_default(st)?;
    }
    Ok(())
}

fn check_required(cmd: &Command, flags: &[FlagStatus<'_>]) -> Result<()> {
    match flags.iter().find(|fs| fs.flag.required && !fs.used) {
        Some(fs) => Err(cmd.usage_error(&format!("flag {:?} required", fs.flag.name))),
        None => Ok(()),
    }
}
