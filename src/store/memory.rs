// In-process backend. Contents are lost when the process exits.
// Reads and writes can be made to fail, to exercise the error paths of callers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{Backend, StoreError};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    lines: Mutex<Option<Vec<String>>>,
    fail_reads: AtomicBool,
    reject_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(lines: Vec<String>) -> Self {
        MemoryBackend {
            lines: Mutex::new(Some(lines)),
            ..Self::default()
        }
    }

    /// Current raw contents (`None` if never written)
    pub fn lines(&self) -> Option<Vec<String>> {
        self.lines.lock().map(|guard| guard.clone()).unwrap_or(None)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn describe(&self) -> String {
        "in-memory list".to_string()
    }

    async fn read(&self) -> Result<Option<Vec<String>>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                backend: self.describe(),
                reason: "simulated read failure".to_string(),
            });
        }

        let guard = self.lines.lock().map_err(|_| StoreError::Unavailable {
            backend: self.describe(),
            reason: "lock poisoned".to_string(),
        })?;
        Ok(guard.clone())
    }

    async fn write(&self, lines: &[String]) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected {
                backend: self.describe(),
                reason: "permission denied (simulated)".to_string(),
            });
        }

        let mut guard = self.lines.lock().map_err(|_| StoreError::WriteRejected {
            backend: self.describe(),
            reason: "lock poisoned".to_string(),
        })?;
        *guard = Some(lines.to_vec());
        Ok(())
    }
}
