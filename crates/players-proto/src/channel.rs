//! Single-writer, multi-reader broadcast over a plain file.
//!
//! Every frame replaces the whole file: the writer truncates to the new
//! length and writes at offset 0, so a reader that re-reads the file after a
//! change always gets the latest frame and never needs offsets.  Readers poll
//! the file and reject any read that raced a write.
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::platform::{remove_if_owned, FileId};

/// Writer half.  Only the primary ever holds one per path.
#[derive(Debug)]
pub struct FramedFileChannel {
    path: PathBuf,
    file: File,
    /// Identity of the file this channel created.
    id: FileId,
}

impl FramedFileChannel {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let id = FileId::from_metadata(&file.metadata()?);
        debug!("channel: opened {}", path.display());
        Ok(Self { path, file, id })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the path still names the file this channel writes to.  False
    /// once another instance has removed or recreated it.
    pub fn is_current(&self) -> bool {
        FileId::of(&self.path).map_or(false, |id| id == self.id)
    }

    /// Delete the file, unless the path now belongs to someone else.
    pub fn remove(self) -> io::Result<bool> {
        remove_if_owned(&self.path, self.id)
    }

    /// Replace the file contents with `payload`.
    pub fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        // Drop any residue of a longer previous frame.
        self.file.set_len(payload.len() as u64)?;
        self.file.write_all_at(payload, 0)?;
        Ok(())
    }
}

// ── reader ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: SystemTime,
}

async fn stamp(path: &Path) -> io::Result<Stamp> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(Stamp {
        len: meta.len(),
        modified: meta.modified()?,
    })
}

/// Reader half: yields each new frame as it appears.
#[derive(Debug)]
pub struct FrameTail {
    path: PathBuf,
    interval: Duration,
    last: Option<String>,
}

impl FrameTail {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last: None,
        }
    }

    /// Wait for the next frame that differs from the previous one and return
    /// the raw file contents.  The first call returns the current frame
    /// straight away if one is present.  Fails when the file disappears or
    /// cannot be read.
    pub async fn next_frame(&mut self) -> io::Result<String> {
        loop {
            let seen = stamp(&self.path).await?;
            // Empty file: created but nothing written yet.
            if seen.len > 0 {
                match self.read_stable(seen).await? {
                    Some(frame) if self.last.as_deref() != Some(frame.as_str()) => {
                        self.last = Some(frame.clone());
                        return Ok(frame);
                    }
                    // Unchanged, or caught mid-write.
                    _ => {}
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Read the file and confirm the result is one whole frame: terminated,
    /// free of the zero padding a growing write exposes, and returned again
    /// by a second read with the stamp unchanged.
    async fn read_stable(&self, seen: Stamp) -> io::Result<Option<String>> {
        let first = tokio::fs::read(&self.path).await?;
        if !is_whole_frame(&first) {
            return Ok(None);
        }
        let second = tokio::fs::read(&self.path).await?;
        let after = stamp(&self.path).await?;
        if first != second || after != seen || second.len() as u64 != after.len {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&second).into_owned()))
    }
}

/// Every frame ends in exactly one `\n` and never contains NUL.  A read that
/// lands between the writer's truncate and write sees either a prefix of the
/// old frame (unterminated) or the old frame padded with zeroes.
fn is_whole_frame(bytes: &[u8]) -> bool {
    bytes.last() == Some(&b'\n') && !bytes.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_whole_frame() {
        assert!(is_whole_frame(b"{}\n"));
        assert!(is_whole_frame(b"\n"));
        assert!(!is_whole_frame(b""));
        assert!(!is_whole_frame(b"{\"text\":\"Art"));
        assert!(!is_whole_frame(b"{}\n\0\0\0"));
        assert!(!is_whole_frame(b"{}\n\0\0\n"));
    }

    #[test]
    fn test_channel_tracks_its_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("players-bar.out");
        let ours = FramedFileChannel::create(&path).unwrap();
        assert!(ours.is_current());

        // Another instance recreates the path.
        std::fs::remove_file(&path).unwrap();
        let theirs = FramedFileChannel::create(&path).unwrap();
        assert!(!ours.is_current());
        assert!(theirs.is_current());

        assert!(!ours.remove().unwrap());
        assert!(path.exists());
        assert!(theirs.remove().unwrap());
        assert!(!path.exists());
    }
}
