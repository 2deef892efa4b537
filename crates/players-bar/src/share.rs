use std::io::{self, Write};
use std::path::{Path, PathBuf};

use players_proto::channel::FramedFileChannel;
use players_proto::platform::RuntimePaths;
use tracing::{info, warn};

/// Where the primary's output goes: always its own stdout, plus the share
/// files once a secondary has asked for them.  Owned by the core loop, which
/// is the only writer.  Sharing is never switched off again for the life of
/// the process.
pub struct ShareSession<W: Write> {
    stdout: W,
    output_path: PathBuf,
    data_path: PathBuf,
    output: Option<FramedFileChannel>,
    data: Option<FramedFileChannel>,
}

impl<W: Write> ShareSession<W> {
    pub fn new(stdout: W, paths: &RuntimePaths) -> Self {
        Self {
            stdout,
            output_path: paths.output.clone(),
            data_path: paths.data.clone(),
            output: None,
            data: None,
        }
    }

    /// Start mirroring rendered lines into the output file.  Returns true
    /// only on the call that actually opened it.  A channel whose path was
    /// removed or taken over by another instance is opened again.
    pub fn enable_output_sharing(&mut self) -> io::Result<bool> {
        open_channel(&mut self.output, &self.output_path)
    }

    pub fn enable_data_sharing(&mut self) -> io::Result<bool> {
        open_channel(&mut self.data, &self.data_path)
    }

    #[cfg(test)]
    pub fn is_output_sharing(&self) -> bool {
        self.output.is_some()
    }

    pub fn is_data_sharing(&self) -> bool {
        self.data.is_some()
    }

    /// Number of share files currently registered as sinks.
    pub fn sink_count(&self) -> usize {
        usize::from(self.output.is_some()) + usize::from(self.data.is_some())
    }

    /// Write a rendered line to stdout and, when sharing, the output file.
    /// Only a stdout failure is returned; a share file failure is logged.
    pub fn emit_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.stdout, "{}", line)?;
        self.stdout.flush()?;
        self.share_line(line);
        Ok(())
    }

    /// Write a rendered line to the output file only.
    pub fn share_line(&mut self, line: &str) {
        if let Some(channel) = self.output.as_mut() {
            write_frame(channel, line);
        }
    }

    /// Write a structured-data frame to the data file.
    pub fn share_frame(&mut self, frame: &str) {
        if let Some(channel) = self.data.as_mut() {
            write_frame(channel, frame);
        }
    }

    /// Close both share files and delete those this process still owns.
    pub fn remove_files(&mut self) {
        for channel in [self.output.take(), self.data.take()].into_iter().flatten() {
            let path = channel.path().to_path_buf();
            if let Err(e) = channel.remove() {
                warn!("share: failed to remove {}: {}", path.display(), e);
            }
        }
    }

    #[cfg(test)]
    pub fn stdout(&self) -> &W {
        &self.stdout
    }
}

fn open_channel(slot: &mut Option<FramedFileChannel>, path: &Path) -> io::Result<bool> {
    match slot {
        Some(channel) if channel.is_current() => return Ok(false),
        Some(_) => warn!("share: {} was replaced, reopening", path.display()),
        None => {}
    }
    // A failed reopen leaves sharing off.
    *slot = None;
    *slot = Some(FramedFileChannel::create(path)?);
    info!("share: sharing enabled at {}", path.display());
    Ok(true)
}

fn write_frame(channel: &mut FramedFileChannel, payload: &str) {
    let mut framed = String::with_capacity(payload.len() + 1);
    framed.push_str(payload);
    framed.push('\n');
    if let Err(e) = channel.write_frame(framed.as_bytes()) {
        warn!("share: write to {} failed: {}", channel.path().display(), e);
    }
}
