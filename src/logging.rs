//! `tracing` subscriber setup for binaries embedding the engine.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies, raised to
/// `debug` for the taskforge crates when `verbose` is set. Installing twice is
/// a no-op.
pub fn init(default_filter: &str, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(format!(
                "{default_filter},taskforge=debug,tf_script=debug,tf_command=debug,tf_ops=debug"
            ))
        } else {
            EnvFilter::new(default_filter)
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
