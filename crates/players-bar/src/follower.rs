/// Secondary-instance side of the rendezvous.
///
/// A secondary asks the primary for its argument fingerprint.  Equal
/// fingerprints mean both would render the same line, so the secondary just
/// copies the primary's rendered output.  Otherwise it asks for structured
/// data and renders it with its own options.  Either way it only ever reads
/// the share files.
use std::io::{self, Write};
use std::path::PathBuf;

use players_proto::channel::FrameTail;
use players_proto::protocol::{
    decode_frame, frame_body, is_complete_frame, Command, REPLY_SUCCESS,
};
use tracing::{debug, info};

use crate::render::Renderer;
use crate::socket::request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    /// Copy the primary's rendered lines verbatim.
    Output,
    /// Decode the primary's data frames and render locally.
    Data,
}

impl MirrorMode {
    fn share_command(self) -> Command {
        match self {
            MirrorMode::Output => Command::Share,
            MirrorMode::Data => Command::DataShare,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("rendezvous i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("primary refused to share: {0}")]
    Refused(String),
    /// The primary closed the connection without answering.
    #[error("primary sent no reply to the share request")]
    EmptyReply,
}

/// Output mirroring only when the two configurations are byte-identical.
pub fn select_mode(local: &str, remote: &str) -> MirrorMode {
    if local == remote {
        MirrorMode::Output
    } else {
        MirrorMode::Data
    }
}

pub struct NegotiationClient {
    socket: PathBuf,
    fingerprint: String,
}

impl NegotiationClient {
    pub fn new(socket: impl Into<PathBuf>, fingerprint: String) -> Self {
        Self {
            socket: socket.into(),
            fingerprint,
        }
    }

    /// Pre-share exchange followed by the matching share request, each on
    /// its own connection.
    pub async fn negotiate(&self) -> Result<MirrorMode, NegotiationError> {
        let remote = request(&self.socket, Command::PreShare).await?;
        let mode = select_mode(&self.fingerprint, &remote);
        debug!(
            "negotiation: local {:?} remote {:?} -> {:?}",
            self.fingerprint, remote, mode
        );

        let reply = request(&self.socket, mode.share_command()).await?;
        if reply.is_empty() {
            return Err(NegotiationError::EmptyReply);
        }
        if reply != REPLY_SUCCESS {
            return Err(NegotiationError::Refused(reply));
        }
        info!("negotiation: mirroring primary in {:?} mode", mode);
        Ok(mode)
    }
}

/// Print each rendered frame as it appears.  Only returns on a read or
/// write failure, typically because the primary went away.
pub async fn mirror_output<W: Write>(tail: &mut FrameTail, out: &mut W) -> io::Error {
    loop {
        let raw = match tail.next_frame().await {
            Ok(raw) => raw,
            Err(e) => return e,
        };
        if let Err(e) = writeln!(out, "{}", frame_body(&raw)).and_then(|_| out.flush()) {
            return e;
        }
    }
}

/// Render each data frame locally.  Lines identical to the previous one are
/// not repeated, and frames missing fields are skipped.
pub async fn mirror_data<W: Write>(
    tail: &mut FrameTail,
    renderer: &Renderer,
    out: &mut W,
) -> io::Error {
    let mut last_line: Option<String> = None;
    loop {
        let raw = match tail.next_frame().await {
            Ok(raw) => raw,
            Err(e) => return e,
        };
        let body = frame_body(&raw);
        if !is_complete_frame(body) {
            debug!("mirror: skipping partial data frame");
            continue;
        }
        let source = decode_frame(body);
        let line = renderer.render(source.as_ref(), None);
        if last_line.as_deref() == Some(line.as_str()) {
            continue;
        }
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            return e;
        }
        last_line = Some(line);
    }
}
