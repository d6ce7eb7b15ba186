//! Run-owned scratch storage.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

/// A uniquely named scratch directory owned by exactly one run.
///
/// The snapshot and build output live inside it. It is removed when the
/// workspace is closed or dropped, whichever comes first.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    /// Create `<root>/sitesync-<run_id>-XXXXXX`, creating `root` if needed.
    pub fn create(root: &Path, run_id: Uuid) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("sitesync-{run_id}-"))
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory now, reporting failures instead of swallowing them.
    pub fn close(self) -> std::io::Result<PathBuf> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        Ok(path)
    }

    /// [`create`](Self::create) on the blocking pool.
    pub async fn create_off_runtime(root: PathBuf, run_id: Uuid) -> std::io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::create(&root, run_id))
            .await
            .map_err(std::io::Error::other)?
    }

    /// [`close`](Self::close) on the blocking pool. A snapshot with vendored
    /// dependencies can hold tens of thousands of files.
    pub async fn close_off_runtime(self) -> std::io::Result<PathBuf> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(std::io::Error::other)?
    }
}
