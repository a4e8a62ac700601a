use crate::core::interfaces::FileSystemService;
use crate::utils::{BuildError, Logger, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(BuildError::Io)
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            self.create_directory(parent).await?;
        }

        fs::write(path, content).await.map_err(BuildError::Io)
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(BuildError::Io)
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BuildError::Io(e)),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(BuildError::Io)
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(BuildError::Io)
    }

    async fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(path).await.map_err(BuildError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(BuildError::Io)? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// One async mutex per output directory, shared by all targets of a run
#[derive(Default)]
pub struct OutputLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

/// Held for the duration of a target's emission; released on drop
pub struct OutputGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl OutputLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every directory in `dirs`, in sorted order so that two targets
    /// sharing directories cannot deadlock
    pub async fn acquire(&self, dirs: &[PathBuf]) -> OutputGuard {
        let mut sorted: Vec<PathBuf> = dirs.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for dir in sorted {
            let lock = self
                .locks
                .entry(dir)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }
        OutputGuard { _guards: guards }
    }
}

/// A file fully rendered in memory, waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Writes a batch of files all-or-nothing: everything goes to temporary
/// siblings first and is renamed into place once every write succeeded
pub struct StagedWriter<'a> {
    fs: &'a dyn FileSystemService,
    suffix: String,
}

impl<'a> StagedWriter<'a> {
    pub fn new(fs: &'a dyn FileSystemService, target: &str) -> Self {
        Self {
            fs,
            suffix: format!(".{}.tmp", target),
        }
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(&self.suffix);
        path.with_file_name(name)
    }

    pub async fn commit(&self, files: &[PendingFile], clean_dir: Option<&Path>) -> Result<()> {
        if let Some(dir) = clean_dir {
            Logger::debug(&format!("cleaning {}", dir.display()));
            self.fs.remove_dir_all(dir).await?;
        }

        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let temp = self.temp_path(&file.path);
            if let Err(e) = self.fs.write_file(&temp, &file.contents).await {
                self.discard(&written).await;
                return Err(e);
            }
            written.push(temp);
        }

        for (index, (file, temp)) in files.iter().zip(&written).enumerate() {
            if let Err(e) = self.fs.rename(temp, &file.path).await {
                Logger::warn(&format!("rename to {} failed, rolling back", file.path.display()));
                let placed: Vec<PathBuf> = files[..index].iter().map(|f| f.path.clone()).collect();
                self.discard(&placed).await;
                self.discard(&written[index..]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn discard(&self, temps: &[PathBuf]) {
        for temp in temps {
            if let Err(e) = self.fs.remove_file(temp).await {
                Logger::warn(&format!("could not remove {}: {}", temp.display(), e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_operations() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let test_file = temp_dir.path().join("nested/test.txt");

        fs_service.write_file(&test_file, "hello").await.unwrap();

        assert_eq!(fs_service.read_file(&test_file).await.unwrap(), "hello");
        assert!(fs_service.is_file(&test_file).await);
        assert!(fs_service.is_dir(&temp_dir.path().join("nested")).await);
        assert_eq!(
            fs_service.list_dir(&temp_dir.path().join("nested")).await.unwrap(),
            vec!["test.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn test_staged_commit_leaves_no_temporaries() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let out = temp_dir.path().join("dist");
        fs_service.write_file(&out.join("stale.js"), "old").await.unwrap();

        let files = vec![
            PendingFile {
                path: out.join("main.js"),
                contents: "export {};".to_string(),
            },
            PendingFile {
                path: out.join("es/package.json"),
                contents: "{}".to_string(),
            },
        ];
        StagedWriter::new(&fs_service, "node")
            .commit(&files, Some(&out))
            .await
            .unwrap();

        let names = fs_service.list_dir(&out).await.unwrap();
        assert_eq!(names, vec!["es".to_string(), "main.js".to_string()]);
    }

    /// Delegates to the real file system but refuses to rename onto one path
    struct FailingRename {
        inner: TokioFileSystemService,
        refuse: PathBuf,
    }

    #[async_trait::async_trait]
    impl FileSystemService for FailingRename {
        async fn read_file(&self, path: &Path) -> Result<String> {
            self.inner.read_file(path).await
        }
        async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
            self.inner.write_file(path, content).await
        }
        async fn create_directory(&self, path: &Path) -> Result<()> {
            self.inner.create_directory(path).await
        }
        async fn remove_dir_all(&self, path: &Path) -> Result<()> {
            self.inner.remove_dir_all(path).await
        }
        async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
            if to == self.refuse {
                return Err(BuildError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "rename refused",
                )));
            }
            self.inner.rename(from, to).await
        }
        async fn remove_file(&self, path: &Path) -> Result<()> {
            self.inner.remove_file(path).await
        }
        async fn is_file(&self, path: &Path) -> bool {
            self.inner.is_file(path).await
        }
        async fn is_dir(&self, path: &Path) -> bool {
            self.inner.is_dir(path).await
        }
        async fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
            self.inner.list_dir(path).await
        }
    }

    #[tokio::test]
    async fn test_failed_rename_rolls_back_the_batch() {
        let temp_dir = tempdir().unwrap();
        let out = temp_dir.path().join("dist");
        let fs_service = FailingRename {
            inner: TokioFileSystemService,
            refuse: out.join("b.js"),
        };

        let files: Vec<PendingFile> = ["a.js", "b.js", "c.js"]
            .iter()
            .map(|name| PendingFile {
                path: out.join(name),
                contents: format!("// {}", name),
            })
            .collect();
        let err = StagedWriter::new(&fs_service, "node")
            .commit(&files, None)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Io(_)));
        assert!(fs_service.list_dir(&out).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_output_locks_serialize_holders() {
        let locks = Arc::new(OutputLocks::new());
        let dir = PathBuf::from("/virtual/dist");

        let guard = locks.acquire(&[dir.clone()]).await;
        let contender = {
            let locks = locks.clone();
            let dir = dir.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&[dir]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }
}
