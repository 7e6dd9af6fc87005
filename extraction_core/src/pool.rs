//! Content-addressed file pool.
//!
//! Identical output bytes are stored once under `pool_root/<sha256-hex>` and
//! linked into the extraction directories many times. Entries are never
//! overwritten and never garbage-collected.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::filesystem::{self, Filesystem};
use crate::hashing;

/// Hidden directory inside the pool root used to stage files before their
/// atomic rename into place. Kept on the pool filesystem so the rename never
/// crosses a mount boundary.
const STAGING_DIR: &str = ".staging";

pub struct PoolManager {
    root: PathBuf,
    fs: Arc<dyn Filesystem>,
}

impl PoolManager {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a scratch file for a backend to materialise output into.
    ///
    /// The worker owns the scratch file from creation until `link_into`
    /// consumes it; the guard deletes it on drop unless released.
    pub async fn scratch_file(&self) -> io::Result<ScratchFile> {
        let staging_dir = self.root.join(STAGING_DIR);
        self.fs.create_dir_all(&staging_dir).await?;

        Ok(ScratchFile::new(
            staging_dir.join(Uuid::new_v4().to_string()),
        ))
    }

    /// Ensures a pool entry with the candidate's content exists and replaces
    /// `dst` with a symbolic link to it.
    ///
    /// With `preserve_candidate` the candidate is left untouched (the copier
    /// links straight from the source file); otherwise the candidate is moved
    /// into the pool, or deleted when another worker already published the
    /// same digest.
    #[tracing::instrument(name = "Linking file into pool", skip(self))]
    pub async fn link_into(
        &self,
        candidate: &Path,
        dst: &Path,
        preserve_candidate: bool,
    ) -> io::Result<PathBuf> {
        let digest = hashing::sha256_hex(self.fs.as_ref(), candidate).await?;
        let pool_path = self.root.join(&digest);

        if !self.fs.file_exists(&pool_path).await? {
            if preserve_candidate {
                let staging_dir = self.root.join(STAGING_DIR);
                self.fs.create_dir_all(&staging_dir).await?;
                let staged = staging_dir.join(Uuid::new_v4().to_string());
                self.fs.copy(candidate, &staged).await?;
                self.fs.rename(&staged, &pool_path).await?;
            } else {
                self.fs.rename(candidate, &pool_path).await?;
            }
            debug!(%digest, "Created pool entry");
        } else if !preserve_candidate {
            // Another worker published the same content first
            self.fs.remove_file(candidate).await?;
            debug!(%digest, "Pool entry already present, discarded candidate");
        }

        // A symbolic link cannot be created over an existing path
        filesystem::remove_if_exists(self.fs.as_ref(), dst).await?;
        self.fs.symlink(&pool_path, dst).await?;

        Ok(pool_path)
    }
}

/// Scratch file handed to an anonymiser backend during pooled extraction.
///
/// Deleted on drop unless `release` is called once the pool has taken
/// ownership of the bytes.
pub struct ScratchFile {
    path: PathBuf,
    released: bool,
}

impl ScratchFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> PathBuf {
        self.released = true;
        self.path.clone()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.released {
            // Best-effort cleanup, Drop cannot be async
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
