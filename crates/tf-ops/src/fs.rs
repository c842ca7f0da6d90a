//! Filesystem actions.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use tf_core::{Error, Result};
use tf_script::{from_fn, ActionRef, Value};

/// Predicate deciding whether [`copy`] visits a path. Rejecting a directory
/// skips everything below it.
pub type PathFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Write the `"stdout"` bucket value to `path`, replacing the file.
///
/// A missing value writes an empty file. With `mode` set, the file's unix
/// permission bits are set after writing; elsewhere it is ignored.
pub fn write_file_stdout(path: impl Into<PathBuf>, mode: Option<u32>) -> ActionRef {
    let path = path.into();
    from_fn(move |_cancel, st, _sc| {
        let data = match st.get("stdout") {
            Some(Value::Bytes(b)) => b.clone(),
            Some(Value::Str(s)) => s.clone().into_bytes(),
            _ => Vec::new(),
        };
        Box::pin(write_file(st.filepath(&path), data, mode))
    })
}

async fn write_file(target: PathBuf, data: Vec<u8>, mode: Option<u32>) -> Result<()> {
    tokio::fs::write(&target, data).await?;
    if let Some(mode) = mode {
        set_mode(&target, mode).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn set_mode(target: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_target: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Remove a file or a directory tree. A missing path is not an error.
pub fn delete(path: impl Into<PathBuf>) -> ActionRef {
    let path = path.into();
    from_fn(move |_cancel, st, _sc| Box::pin(remove(st.filepath(&path))))
}

async fn remove(target: PathBuf) -> Result<()> {
    let meta = match tokio::fs::symlink_metadata(&target).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        tokio::fs::remove_dir_all(&target).await?;
    } else {
        tokio::fs::remove_file(&target).await?;
    }
    tracing::debug!(path = %target.display(), "deleted");
    Ok(())
}

/// Rename `from` to `to`, creating the destination's parent directories.
pub fn move_path(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> ActionRef {
    let (from, to) = (from.into(), to.into());
    from_fn(move |_cancel, st, _sc| Box::pin(rename(st.filepath(&from), st.filepath(&to))))
}

async fn rename(src: PathBuf, dst: PathBuf) -> Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&src, &dst).await?;
    Ok(())
}

/// Copy a file or directory tree from `from` to `to`.
///
/// With `only`, paths (under the source, source included) for which it
/// returns false are skipped.
pub fn copy(
    from: impl Into<PathBuf>,
    to: impl Into<PathBuf>,
    only: Option<PathFilter>,
) -> ActionRef {
    let (from, to) = (from.into(), to.into());
    from_fn(move |_cancel, st, _sc| {
        Box::pin(copy_blocking(
            st.filepath(&from),
            st.filepath(&to),
            only.clone(),
        ))
    })
}

async fn copy_blocking(src: PathBuf, dst: PathBuf, only: Option<PathFilter>) -> Result<()> {
    tokio::task::spawn_blocking(move || copy_tree(&src, &dst, only.as_deref()))
        .await
        .map_err(|e| Error::action(format!("copy task failed: {e}")))?
}

fn copy_tree(
    src: &Path,
    dst: &Path,
    only: Option<&(dyn Fn(&Path) -> bool + Send + Sync)>,
) -> Result<()> {
    let walk = WalkDir::new(src)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| only.map_or(true, |keep| keep(entry.path())));

    let mut copied = 0usize;
    for entry in walk {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::action(format!("walk left {}: {e}", src.display())))?;
        let target = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &target)?;
        copied += 1;
    }
    tracing::debug!(from = %src.display(), to = %dst.display(), files = copied, "copied");
    Ok(())
}
