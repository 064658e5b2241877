//! Pause flag persistence
//!
//! The engine seeds its pause state from a [`PauseFlagStore`] and writes
//! through it on pause/resume. The file-backed store treats the mere existence
//! of a marker file as "paused".

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use waveorch_core::Result;

/// Where the pause flag lives
pub trait PauseFlagStore: Send + Sync {
    fn is_paused(&self) -> bool;

    fn set_paused(&self, paused: bool) -> Result<()>;
}

/// Marker-file pause flag (normally `<base>/state/paused`)
#[derive(Debug, Clone)]
pub struct FilePauseFlag {
    path: PathBuf,
}

impl FilePauseFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PauseFlagStore for FilePauseFlag {
    fn is_paused(&self) -> bool {
        self.path.exists()
    }

    fn set_paused(&self, paused: bool) -> Result<()> {
        if paused {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, b"")?;
        } else {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// In-process pause flag
#[derive(Debug, Default)]
pub struct MemoryPauseFlag {
    paused: AtomicBool,
}

impl MemoryPauseFlag {
    pub fn new(paused: bool) -> Self {
        Self {
            paused: AtomicBool::new(paused),
        }
    }
}

impl PauseFlagStore for MemoryPauseFlag {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn set_paused(&self, paused: bool) -> Result<()> {
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_flag_roundtrip() {
        let temp = TempDir::new().unwrap();
        let flag = FilePauseFlag::new(temp.path().join("state").join("paused"));

        assert!(!flag.is_paused());
        flag.set_paused(true).unwrap();
        assert!(flag.is_paused());
        assert_eq!(std::fs::read(flag.path()).unwrap().len(), 0);

        flag.set_paused(false).unwrap();
        assert!(!flag.is_paused());
    }

    #[test]
    fn test_file_flag_resume_when_not_paused() {
        let temp = TempDir::new().unwrap();
        let flag = FilePauseFlag::new(temp.path().join("paused"));
        flag.set_paused(false).unwrap();
        assert!(!flag.is_paused());
    }

    #[test]
    fn test_memory_flag() {
        let flag = MemoryPauseFlag::new(true);
        assert!(flag.is_paused());
        flag.set_paused(false).unwrap();
        assert!(!flag.is_paused());
    }
}
