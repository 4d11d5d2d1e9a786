use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};

use crate::task::TaskId;

/// Private working directory for one task.
///
/// The directory and everything in it is deleted when the value is dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Workspace {
    /// Create `task-<id>-XXXXXX` under `root` on the blocking pool
    pub async fn create(root: &Path, id: &TaskId) -> io::Result<Self> {
        let root = root.to_path_buf();
        let prefix = format!("task-{id}-");
        tokio::task::spawn_blocking(move || Self::create_blocking(&root, &prefix))
            .await
            .map_err(io::Error::other)?
    }

    fn create_blocking(root: &Path, prefix: &str) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = Builder::new().prefix(prefix).tempdir_in(root)?;
        let input = dir.path().join("input.mp4");
        let output = dir.path().join("output.mp4");
        Ok(Self { dir, input, output })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the downloaded source lands
    pub fn input_path(&self) -> &Path {
        &self.input
    }

    /// Where the encoder writes its result
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Delete the directory on the blocking pool, reporting any error
    pub async fn close(self) -> io::Result<()> {
        tokio::task::spawn_blocking(move || self.dir.close())
            .await
            .map_err(io::Error::other)?
    }
}
