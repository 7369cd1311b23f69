//! File-system capabilities held by the privileged side. The untrusted
//! mirror never sees these; it only ever sees tokens.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::info;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::SessionError;

fn map_io(name: &str, err: std::io::Error) -> SessionError {
    match err.kind() {
        ErrorKind::NotFound => SessionError::NotFound(name.to_string()),
        _ => SessionError::Io(err),
    }
}

/// Capability to one file on disk. Cheap to clone; the path is the
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    path: PathBuf,
}

impl FileHandle {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub async fn read(&self) -> Result<Vec<u8>, SessionError> {
        fs::read(&self.path)
            .await
            .map_err(|e| map_io(&self.name(), e))
    }

    /// Write the full contents, truncate to the written size, flush.
    pub async fn write_contents(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&self.path)
            .await
            .map_err(|e| map_io(&self.name(), e))?;
        file.write_all(bytes).await?;
        file.set_len(bytes.len() as u64).await?;
        file.flush().await?;
        info!("wrote {} bytes to {:?}", bytes.len(), self.path);
        Ok(())
    }

    pub async fn last_modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
    }

    pub async fn is_file(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    pub async fn is_writable(&self) -> Result<bool, SessionError> {
        let metadata = fs::metadata(&self.path)
            .await
            .map_err(|e| map_io(&self.name(), e))?;
        Ok(!metadata.permissions().readonly())
    }
}

/// Capability to enumerate and mutate the entries of one directory. The
/// session holds at most one of these at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHandle {
    path: PathBuf,
}

impl DirectoryHandle {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_dir(&self) -> Result<fs::ReadDir, SessionError> {
        fs::read_dir(&self.path)
            .await
            .map_err(|e| map_io(&self.path.to_string_lossy(), e))
    }

    /// Handle for a named entry without touching the disk.
    pub fn file_handle(&self, name: &str) -> FileHandle {
        FileHandle::new(self.path.join(name))
    }

    /// Handle for an existing regular file, `NotFound`/`NotAFile`
    /// otherwise.
    pub async fn lookup(&self, name: &str) -> Result<FileHandle, SessionError> {
        let path = self.path.join(name);
        let metadata = fs::metadata(&path).await.map_err(|e| map_io(name, e))?;
        if !metadata.is_file() {
            return Err(SessionError::NotAFile(name.to_string()));
        }
        Ok(FileHandle::new(path))
    }

    pub async fn contains(&self, name: &str) -> bool {
        fs::try_exists(self.path.join(name)).await.unwrap_or(false)
    }

    /// Whether `handle` points at a direct child of this directory.
    pub fn owns(&self, handle: &FileHandle) -> bool {
        handle.path().parent() == Some(self.path.as_path())
    }

    pub async fn create_file(&self, name: &str) -> Result<FileHandle, SessionError> {
        let path = self.path.join(name);
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| map_io(name, e))?;
        drop(file);
        Ok(FileHandle::new(path))
    }

    pub async fn remove_entry(&self, name: &str) -> Result<(), SessionError> {
        fs::remove_file(self.path.join(name))
            .await
            .map_err(|e| map_io(name, e))?;
        info!("removed {:?} from {:?}", name, self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_rejects_directories_and_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirectoryHandle::new(tmp.path().to_path_buf());
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("a.jpg"), b"x").unwrap();

        assert!(dir.lookup("a.jpg").await.is_ok());
        assert!(matches!(
            dir.lookup("sub").await,
            Err(SessionError::NotAFile(_))
        ));
        assert!(matches!(
            dir.lookup("missing.jpg").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn write_contents_truncates_to_written_size() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.bin");
        std::fs::write(&path, b"a longer original payload").unwrap();

        let handle = FileHandle::new(path.clone());
        handle.write_contents(b"short").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"short");
    }
}
