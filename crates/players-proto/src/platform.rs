use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "players-bar";

/// Well-known files shared by every instance of one user session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Rendezvous socket owned by the primary.
    pub socket: PathBuf,
    /// Rendered-output share file.
    pub output: PathBuf,
    /// Structured-data share file.
    pub data: PathBuf,
    pub log: PathBuf,
}

impl RuntimePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            socket: dir.join(format!("{}.sock", APP_NAME)),
            output: dir.join(format!("{}.out", APP_NAME)),
            data: dir.join(format!("{}.data", APP_NAME)),
            log: dir.join(format!("{}.log", APP_NAME)),
        }
    }

    /// Remove the rendezvous socket and both share files, ignoring files
    /// that are already gone.
    pub fn remove_coordination_files(&self) {
        for path in [self.socket.as_path(), self.output.as_path(), self.data.as_path()] {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

/// Device and inode of a file, to tell our own file from one another
/// instance created at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_metadata(&std::fs::metadata(path)?))
    }

    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

/// Remove `path` only if it is still the file identified by `id`.  Returns
/// whether anything was removed; a missing file is not an error.
pub fn remove_if_owned(path: &Path, id: FileId) -> std::io::Result<bool> {
    match FileId::of(path) {
        Ok(current) if current == id => {
            std::fs::remove_file(path)?;
            Ok(true)
        }
        Ok(_) => {
            tracing::info!("{} now belongs to another instance, leaving it", path.display());
            Ok(false)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl Default for RuntimePaths {
    fn default() -> Self {
        Self::in_dir(&temp_dir())
    }
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

pub fn config_dir() -> PathBuf {
    // Always ~/.config/players-bar, including on macOS
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(APP_NAME)
}
