//! Commits finished downloads to disk.

use crate::error::DownloadError;
use reqwest::Client;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};

/// File-download collaborator: stores archive blobs and single images
pub trait DownloadSink: Send + Sync {
    /// Store `bytes` as `filename`, replacing any previous file of that name
    fn save_bytes(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> impl Future<Output = Result<PathBuf, DownloadError>> + Send;

    /// Download `url` to `filename`; an existing file is never overwritten
    fn save_url(
        &self,
        url: &str,
        filename: &str,
    ) -> impl Future<Output = Result<PathBuf, DownloadError>> + Send;
}

/// Writes under a root download directory
#[derive(Clone)]
pub struct DirectorySink {
    root: PathBuf,
    client: Client,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>, client: Client) -> Self {
        Self {
            root: root.into(),
            client,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative filename under the root, refusing escapes
    fn target(&self, filename: &str) -> Result<PathBuf, DownloadError> {
        let relative = Path::new(filename);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if filename.trim().is_empty() || escapes {
            return Err(DownloadError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Refusing to write outside download directory: {}", filename),
            )));
        }

        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

/// `name.jpg`, `name (1).jpg`, `name (2).jpg`, ... the first that is free
pub fn uniquify(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());
    (1..)
        .map(|n| {
            let name = match &ext {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            path.with_file_name(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

impl DownloadSink for DirectorySink {
    async fn save_bytes(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        let path = self.target(filename)?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        log::info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    async fn save_url(&self, url: &str, filename: &str) -> Result<PathBuf, DownloadError> {
        let path = uniquify(&self.target(filename)?);
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        std::fs::write(&path, &bytes)?;
        log::info!("Downloaded {} to {}", url, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_bytes_creates_folders_and_overwrites() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path(), Client::new());

        let path = sink.save_bytes("Series/X.zip", &[1, 2, 3]).await.unwrap();
        assert_eq!(path, dir.path().join("Series/X.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);

        sink.save_bytes("Series/X.zip", &[9]).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![9]);
        assert!(!dir.path().join("Series/X.zip.tmp").exists());
    }

    #[tokio::test]
    async fn test_refuses_escaping_paths() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path(), Client::new());
        assert!(sink.save_bytes("../evil.zip", &[1]).await.is_err());
        assert!(sink.save_bytes("/etc/evil.zip", &[1]).await.is_err());
    }

    #[test]
    fn test_uniquify() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("001.jpg");
        assert_eq!(uniquify(&first), first);
        std::fs::write(&first, b"x").unwrap();
        assert_eq!(uniquify(&first), dir.path().join("001 (1).jpg"));
        std::fs::write(dir.path().join("001 (1).jpg"), b"x").unwrap();
        assert_eq!(uniquify(&first), dir.path().join("001 (2).jpg"));
    }
}
