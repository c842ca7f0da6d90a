use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};

use taskforge::ops::{self, PathFilter};
use taskforge::{
    from_fn, from_sync_fn, sequence, ActionRef, Command, EngineConfig, Error, Flag, FlagKind,
    Policy, State, Value, ARGS_KEY,
};

const CONFIG_ENV: &str = "TASKFORGE_CONFIG";

fn main() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Flags are only resolved once the script runs, so the grace period comes
    // from the config named in the environment.
    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let grace = EngineConfig::load_or_default(config_path.as_deref()).shutdown_grace();

    let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    let res = rt.block_on(taskforge::start(grace, move |cancel| async move {
        let mut st = State::from_env();
        taskforge::run(&cancel, &mut st, app().exec(args)).await
    }));

    Ok(match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_usage() => {
            eprint!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    })
}

fn app() -> Command {
    Command::new("taskforge")
        .usage("run small task scripts")
        .flag(
            Flag::new("config")
                .env(CONFIG_ENV)
                .kind(FlagKind::Str)
                .usage("engine config file (JSON)"),
        )
        .flag(Flag::new("v").default(false).usage("verbose logging"))
        .command(
            Command::new("env")
                .usage("print environment variables, all or the named ones")
                .action(configured(print_env())),
        )
        .command(
            Command::new("exec")
                .usage("run a program, streaming its output")
                .flag(Flag::new("dir").kind(FlagKind::Str).usage("working directory"))
                .flag(
                    Flag::new("timeout")
                        .default(std::time::Duration::ZERO)
                        .usage("kill the program after this long, 0 for never"),
                )
                .action(configured(exec_program())),
        )
        .command(
            Command::new("copy")
                .usage("copy a file or directory tree: copy <from> <to>")
                .flag(Flag::new("ext").kind(FlagKind::Str).usage("only copy files with this extension"))
                .action(configured(copy_tree())),
        )
        .command(
            Command::new("expand")
                .usage("expand $VARS in the arguments and print them")
                .action(configured(expand())),
        )
}

/// Prefix `action` with engine setup driven by the global flags.
fn configured(action: ActionRef) -> ActionRef {
    sequence([setup(), action])
}

fn setup() -> ActionRef {
    from_sync_fn(|st, _sc| {
        let verbose = st.get("v").and_then(Value::as_bool).unwrap_or(false);
        let path = st
            .get("config")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let config = EngineConfig::load_or_default(path.as_deref());
        taskforge::logging::init(&config.log_filter, verbose);
        st.policy = Policy::from_names(&config.policy)?;
        tracing::debug!(policy = %st.policy, "engine configured");
        Ok(())
    })
}

fn positional(st: &State) -> Vec<String> {
    st.get(ARGS_KEY)
        .and_then(Value::as_list)
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}

fn print_env() -> ActionRef {
    from_sync_fn(|st, _sc| {
        let names = positional(st);
        let mut lines: Vec<String> = st
            .env
            .iter()
            .filter(|(k, _)| names.is_empty() || names.contains(*k))
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        lines.sort();
        for line in lines {
            writeln!(st.stdout, "{line}")?;
        }
        Ok(())
    })
}

fn exec_program() -> ActionRef {
    from_fn(|cancel, st, sc| {
        Box::pin(async move {
            let args = positional(st);
            let Some((program, rest)) = args.split_first() else {
                return Err(Error::usage("exec: missing program\n"));
            };
            if let Some(dir) = st.get("dir").and_then(Value::as_str) {
                st.dir = st.filepath(dir);
            }
            let action = ops::exec_stream_out(program.clone(), rest.to_vec());

            let timeout = st
                .get("timeout")
                .and_then(Value::as_duration)
                .unwrap_or_default();
            if timeout.is_zero() {
                return sc.run_action(cancel, st, action.as_ref()).await;
            }

            let limited = cancel.child_token();
            let expire = limited.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                expire.cancel();
            });
            let res = sc.run_action(&limited, st, action.as_ref()).await;
            timer.abort();
            res
        })
    })
}

fn copy_tree() -> ActionRef {
    from_sync_fn(|st, sc| {
        let args = positional(st);
        let [from, to] = args.as_slice() else {
            return Err(Error::usage("copy: expected <from> <to>\n"));
        };
        let only = st
            .get("ext")
            .and_then(Value::as_str)
            .map(|ext| extension_filter(ext.trim_start_matches('.')));
        sc.add([ops::copy(from, to, only)]);
        Ok(())
    })
}

fn extension_filter(ext: &str) -> PathFilter {
    let ext = ext.to_string();
    Arc::new(move |p: &Path| p.is_dir() || p.extension().is_some_and(|e| e == ext.as_str()))
}

fn expand() -> ActionRef {
    from_sync_fn(|st, _sc| {
        let words: Vec<String> = positional(st).iter().map(|w| st.expand_env(w)).collect();
        writeln!(st.stdout, "{}", words.join(" "))?;
        Ok(())
    })
}
