//! # File hooks around a session.
//!
//! Lets other processes sequence work with the supervised command through
//! marker files:
//! - [`wait_for`] blocks the launch until every given path exists;
//! - [`on_exit`] leaves a marker once the session is over.
//!
//! ## Markers
//! Each path `P` has an error marker: `P` with its extension replaced by
//! `err` (see [`err_marker`]). While waiting, an error marker that shows up
//! aborts the launch; on exit, the error marker is written instead of `P`
//! when the session failed.
//!
//! Waiting is not bounded by the session timeout, which only starts once the
//! command runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future;
use tokio::fs;
use tracing::trace;

use crate::error::HookError;
use crate::logging::RUN;

/// Delay between two existence checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Error marker for `path`.
///
/// # Example
/// ```
/// use std::path::Path;
/// use procvisor::hooks::err_marker;
///
/// assert_eq!(err_marker(Path::new("/tmp/ready.ok")), Path::new("/tmp/ready.err"));
/// assert_eq!(err_marker(Path::new("/tmp/ready")), Path::new("/tmp/ready.err"));
/// ```
pub fn err_marker(path: &Path) -> PathBuf {
    path.with_extension("err")
}

/// Waits until every path in `paths` exists, checking every [`POLL_INTERVAL`].
///
/// Fails with [`HookError::FoundErrFile`] as soon as one of the error markers
/// exists.
pub async fn wait_for(paths: &[PathBuf]) -> Result<(), HookError> {
    wait_for_every(paths, POLL_INTERVAL).await
}

pub(crate) async fn wait_for_every(paths: &[PathBuf], poll: Duration) -> Result<(), HookError> {
    let waits = paths.iter().map(|path| wait_one(path, poll));
    future::try_join_all(waits).await.map(|_| ())
}

async fn wait_one(path: &Path, poll: Duration) -> Result<(), HookError> {
    let err = err_marker(path);
    loop {
        trace!(target: RUN, wait_for = %path.display(), "waiting");

        if fs::try_exists(&err).await? {
            return Err(HookError::FoundErrFile(err));
        }
        if fs::try_exists(path).await? {
            return Ok(());
        }
        tokio::time::sleep(poll).await;
    }
}

/// Writes the exit marker for a finished session: `path` on success, its
/// error marker otherwise. Parent directories are created as needed.
pub async fn on_exit(path: &Path, success: bool) -> Result<PathBuf, HookError> {
    let target = if success {
        path.to_path_buf()
    } else {
        err_marker(path)
    };

    if let Some(dir) = target.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).await?;
        }
    }
    fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&target)
        .await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_wait_for_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ok");
        let b = dir.path().join("b");
        std::fs::write(&a, b"").unwrap();
        std::fs::write(&b, b"").unwrap();

        wait_for_every(&[a, b], FAST).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_file_created_later() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");

        let writer = {
            let ready = ready.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                std::fs::write(ready, b"").unwrap();
            })
        };

        tokio::time::timeout(Duration::from_secs(5), wait_for_every(&[ready], FAST))
            .await
            .unwrap()
            .unwrap();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_err_marker_aborts_wait() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready.ok");
        std::fs::write(dir.path().join("ready.err"), b"").unwrap();

        let err = wait_for_every(&[ready], FAST).await.unwrap_err();
        assert!(matches!(err, HookError::FoundErrFile(p) if p.ends_with("ready.err")));
    }

    #[tokio::test]
    async fn test_on_exit_writes_marker_for_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let done = dir.path().join("nested/done.ok");

        let written = on_exit(&done, true).await.unwrap();
        assert_eq!(written, done);
        assert!(done.exists());

        let written = on_exit(&done, false).await.unwrap();
        assert_eq!(written, dir.path().join("nested/done.err"));
        assert!(written.exists());
    }
}
