use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to create scratch directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write scratch file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Refusing to write an empty scratch file")]
    EmptyWrite,
}

/// A decoded image persisted for the classifier. The file is removed when
/// the handle is released, or on drop if the owner never got that far.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    released: bool,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::info!("Cleaned up scratch file on drop: {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::error!(
                "Failed to remove scratch file {} on drop: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScratchService {
    root: PathBuf,
}

impl ScratchService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generate_file_name() -> String {
        format!(
            "temp_image_{}_{}.jpg",
            Uuid::new_v4().simple(),
            Utc::now().timestamp()
        )
    }

    pub async fn store(&self, image_data: &[u8]) -> Result<ScratchFile, StorageError> {
        if image_data.is_empty() {
            return Err(StorageError::EmptyWrite);
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.clone(),
                source,
            })?;

        let path = self.root.join(Self::generate_file_name());
        if let Err(source) = tokio::fs::write(&path, image_data).await {
            // a partial write may have left the file behind
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StorageError::Write { path, source });
        }

        log::info!(
            "💾 Image saved to {} ({} bytes)",
            path.display(),
            image_data.len()
        );

        Ok(ScratchFile {
            path,
            released: false,
        })
    }

    /// Deletes the scratch file. Releasing a file that is already gone is a
    /// no-op.
    pub async fn release(&self, mut file: ScratchFile) {
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => {
                file.released = true;
                log::info!("🗑️ Cleaned up scratch file {}", file.path.display());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                file.released = true;
            }
            Err(e) => {
                // left unreleased so Drop retries synchronously
                log::error!(
                    "Failed to remove scratch file {}: {}",
                    file.path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn store_creates_missing_directory_and_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("scratch");
        let service = ScratchService::new(&root);

        let file = service.store(b"jpeg bytes").await.unwrap();
        assert!(file.path().starts_with(&root));
        assert_eq!(std::fs::read(file.path()).unwrap(), b"jpeg bytes");

        let name = file.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("temp_image_"));
        assert!(name.ends_with(".jpg"));

        service.release(file).await;
    }

    #[tokio::test]
    async fn release_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScratchService::new(dir.path());

        let file = service.store(b"data").await.unwrap();
        let path = file.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        service.release(file).await;
        assert!(!path.exists());

        let file = service.store(b"data").await.unwrap();
        let path = file.path().to_path_buf();
        service.release(file).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dropping_an_unreleased_file_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScratchService::new(dir.path());

        let file = service.store(b"data").await.unwrap();
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn empty_payload_is_rejected_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("never-created");
        let service = ScratchService::new(&root);

        assert!(matches!(
            service.store(&[]).await,
            Err(StorageError::EmptyWrite)
        ));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn unwritable_root_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("plain-file");
        std::fs::write(&blocker, b"x").unwrap();
        let service = ScratchService::new(blocker.join("scratch"));

        assert!(matches!(
            service.store(b"data").await,
            Err(StorageError::CreateDir { .. })
        ));
    }

    #[test]
    fn generated_names_do_not_collide() {
        let names: HashSet<String> = (0..1000)
            .map(|_| ScratchService::generate_file_name())
            .collect();
        assert_eq!(names.len(), 1000);
    }
}
