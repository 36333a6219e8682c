// 📄 Flat file backend - one encoded entry per line, UTF-8, newline-terminated

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Backend, StoreError};

#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileBackend {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn describe(&self) -> String {
        format!("list file {}", self.path.display())
    }

    async fn read(&self) -> Result<Option<Vec<String>>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content.lines().map(str::to_string).collect())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Unavailable {
                backend: self.describe(),
                reason: e.to_string(),
            }),
        }
    }

    async fn write(&self, lines: &[String]) -> Result<(), StoreError> {
        let mut content = String::new();
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| StoreError::WriteRejected {
                backend: self.describe(),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================
