use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Filesystem seam the workers and the pool manager go through
///
/// Every path operation of the core is behind this trait so that tests can
/// inject failures without touching the host filesystem.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Whether `path` resolves to a regular file (following symlinks)
    async fn file_exists(&self, path: &Path) -> io::Result<bool>;

    /// Whether `path` resolves to a directory
    async fn dir_exists(&self, path: &Path) -> io::Result<bool>;

    /// Whether the file at `path` carries the read-only permission bit
    async fn is_readonly(&self, path: &Path) -> io::Result<bool>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copies `src` over `dst`, overwriting any existing file
    async fn copy(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Renames `from` to `to`; atomic when both live on the same filesystem
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Creates a symbolic link at `link` pointing to `target`
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Opens `path` for streamed reading
    async fn open_read(&self, path: &Path) -> io::Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// Removes `path` (regular file or symlink), treating a missing path as done
pub async fn remove_if_exists(fs: &dyn Filesystem, path: &Path) -> io::Result<()> {
    match fs.remove_file(path).await {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Production implementation on top of tokio's filesystem bindings
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilesystem;

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn file_exists(&self, path: &Path) -> io::Result<bool> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn dir_exists(&self, path: &Path) -> io::Result<bool> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn is_readonly(&self, path: &Path) -> io::Result<bool> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(metadata.permissions().readonly())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        tokio::fs::copy(src, dst).await?;
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    #[cfg(unix)]
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        tokio::fs::symlink(target, link).await
    }

    #[cfg(windows)]
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        tokio::fs::symlink_file(target, link).await
    }

    async fn open_read(&self, path: &Path) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }
}
