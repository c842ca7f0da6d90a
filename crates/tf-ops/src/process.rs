//! Process execution actions.

use std::io::Write;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use tf_core::{Error, Result};
use tf_script::{from_sync_fn, Action, ActionRef, CancellationToken, Script, State, Value};

const READ_CHUNK: usize = 8 * 1024;

/// Runs an external program. See [`exec`] and [`exec_stream_out`].
#[derive(Debug, Clone)]
pub struct Exec {
    program: String,
    args: Vec<String>,
    stream: bool,
}

impl Exec {
    fn tool_error(&self, message: impl Into<String>) -> Error {
        Error::tool(self.program.clone(), message)
    }

    fn command(&self, st: &State, stdin: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(&st.env)
            .current_dir(&st.dir)
            .stdin(if stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Action for Exec {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        st: &mut State,
        _sc: &mut Script,
    ) -> Result<()> {
        let stdin = st
            .get("stdin")
            .and_then(Value::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        tracing::debug!(program = %self.program, args = ?self.args, "spawning process");
        let mut child = self
            .command(st, !stdin.is_empty())
            .spawn()
            .map_err(|e| self.tool_error(format!("failed to spawn: {e}")))?;

        if let Some(mut pipe) = child.stdin.take() {
            let program = self.program.clone();
            tokio::spawn(async move {
                // Dropping the pipe afterwards closes the child's stdin.
                if let Err(e) = pipe.write_all(&stdin).await {
                    tracing::debug!(%program, "stdin not fully written: {e}");
                }
            });
        }

        if self.stream {
            let State { stdout, stderr, .. } = &mut *st;
            let status = drive(&mut child, cancel, &mut **stdout, &mut **stderr).await?;
            st.set("success", status.success());
            if !status.success() {
                return Err(self.tool_error(format!("exited with status {status}")));
            }
            return Ok(());
        }

        let mut out = Vec::new();
        let mut err = Vec::new();
        let status = drive(&mut child, cancel, &mut out, &mut err).await?;
        st.set("success", status.success());
        st.set("stdout", out);
        if !status.success() {
            return Err(self.tool_error(format!(
                "exited with status {status}: {}",
                String::from_utf8_lossy(&err).trim()
            )));
        }
        Ok(())
    }
}

/// Pump the child's output into `out` and `err` until both close, then reap
/// it. Cancellation kills the child.
async fn drive(
    child: &mut Child,
    cancel: &CancellationToken,
    out: &mut (dyn Write + Send),
    err: &mut (dyn Write + Send),
) -> Result<ExitStatus> {
    let mut child_out = child.stdout.take();
    let mut child_err = child.stderr.take();
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];

    while child_out.is_some() || child_err.is_some() {
        tokio::select! {
            n = read_some(&mut child_out, &mut out_buf) => match n? {
                0 => child_out = None,
                n => out.write_all(&out_buf[..n])?,
            },
            n = read_some(&mut child_err, &mut err_buf) => match n? {
                0 => child_err = None,
                n => err.write_all(&err_buf[..n])?,
            },
            _ = cancel.cancelled() => return kill(child).await,
        }
    }
    out.flush()?;
    err.flush()?;

    tokio::select! {
        status = child.wait() => Ok(status?),
        _ = cancel.cancelled() => kill(child).await,
    }
}

async fn read_some<R>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn kill(child: &mut Child) -> Result<ExitStatus> {
    tracing::warn!(pid = ?child.id(), "cancelled, killing process");
    if let Err(e) = child.kill().await {
        tracing::warn!("failed to kill process: {e}");
    }
    Err(Error::Cancelled)
}

fn exec_action<I, S>(program: impl Into<String>, args: I, stream: bool) -> ActionRef
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Arc::new(Exec {
        program: program.into(),
        args: args.into_iter().map(Into::into).collect(),
        stream,
    })
}

/// Run `program` and capture its output into the `"stdout"` bucket value.
///
/// A non-empty `"stdin"` bucket value is written to the child. A non-zero
/// exit is an [`Error::Tool`] carrying the child's stderr.
pub fn exec<I, S>(program: impl Into<String>, args: I) -> ActionRef
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    exec_action(program, args, false)
}

/// Like [`exec`], but the child's output streams to the state's stdout and
/// stderr as it is produced.
pub fn exec_stream_out<I, S>(program: impl Into<String>, args: I) -> ActionRef
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    exec_action(program, args, true)
}

/// Move the `"stdout"` bucket value to `"stdin"`, so the next [`exec`] reads
/// what the previous one wrote.
pub fn pipe() -> ActionRef {
    from_sync_fn(|st, _sc| {
        let stdin = match st.delete("stdout") {
            Some(Value::Bytes(b)) => b,
            _ => Vec::new(),
        };
        st.set("stdin", stdin);
        Ok(())
    })
}

/// Overwrite entries of the state's environment.
pub fn set_env<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> ActionRef
where
    K: Into<String>,
    V: Into<String>,
{
    let vars: Vec<(String, String)> = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    from_sync_fn(move |st, _sc| {
        st.env.extend(vars.iter().cloned());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tf_script::{run, Capture};

    fn shell_state() -> State {
        State::new().with_env([("PATH", std::env::var("PATH").unwrap_or_default())])
    }

    #[tokio::test]
    async fn exec_captures_stdout() {
        let mut st = shell_state();
        run(&CancellationToken::new(), &mut st, exec("echo", ["hello"]))
            .await
            .unwrap();
        assert_eq!(st.get("stdout"), Some(&Value::Bytes(b"hello\n".to_vec())));
        assert_eq!(st.get("success"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn exec_uses_state_env() {
        let mut st = shell_state();
        st.env.insert("GREETING".into(), "hi there".into());
        run(
            &CancellationToken::new(),
            &mut st,
            exec("sh", ["-c", "printf %s \"$GREETING\""]),
        )
        .await
        .unwrap();
        assert_eq!(st.get("stdout"), Some(&Value::Bytes(b"hi there".to_vec())));
    }

    #[tokio::test]
    async fn failure_is_tool_error_with_stderr() {
        let mut st = shell_state();
        let err = run(
            &CancellationToken::new(),
            &mut st,
            exec("sh", ["-c", "echo broken >&2; exit 3"]),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Tool { tool, message } if tool == "sh" && message.contains("broken"));
        assert_eq!(st.get("success"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn missing_program_is_tool_error() {
        let mut st = shell_state();
        let err = run(
            &CancellationToken::new(),
            &mut st,
            exec("nonexistent_tool_xyz_12345", Vec::<String>::new()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Tool { message, .. } if message.starts_with("failed to spawn"));
    }

    #[tokio::test]
    async fn pipe_feeds_next_exec() {
        let mut st = shell_state();
        let sc = tf_script::sequence([exec("echo", ["piped"]), pipe(), exec("cat", Vec::<String>::new())]);
        run(&CancellationToken::new(), &mut st, sc).await.unwrap();
        assert_eq!(st.get("stdout"), Some(&Value::Bytes(b"piped\n".to_vec())));
        assert_eq!(st.get("stdin"), Some(&Value::Bytes(b"piped\n".to_vec())));
    }

    #[tokio::test]
    async fn stream_out_writes_to_state_streams() {
        let out = Capture::new();
        let err = Capture::new();
        let mut st = shell_state().with_stdout(out.clone()).with_stderr(err.clone());
        run(
            &CancellationToken::new(),
            &mut st,
            exec_stream_out("sh", ["-c", "echo out; echo err >&2"]),
        )
        .await
        .unwrap();
        assert_eq!(out.contents(), "out\n");
        assert_eq!(err.contents(), "err\n");
        assert_eq!(st.get("stdout"), None);
    }

    #[tokio::test]
    async fn cancellation_kills_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let mut st = shell_state();
        let started = std::time::Instant::now();
        let err = run(&cancel, &mut st, exec("sleep", ["10"])).await.unwrap_err();
        assert_matches!(err, Error::Cancelled);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn set_env_overwrites() {
        let mut st = State::new().with_env([("A", "1"), ("B", "2")]);
        run(&CancellationToken::new(), &mut st, set_env([("B", "3"), ("C", "4")]))
            .await
            .unwrap();
        assert_eq!(st.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(st.env.get("B").map(String::as_str), Some("3"));
        assert_eq!(st.env.get("C").map(String::as_str), Some("4"));
    }
}
