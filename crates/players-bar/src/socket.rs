use std::path::{Path, PathBuf};
use std::time::Duration;

use players_proto::protocol::{Command, MAX_REQUEST_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::core::CoreEvent;

/// How long a client gets to send its code, and a secondary to read a reply.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts one command per connection on the rendezvous socket and hands it
/// to the core loop.  Replies are computed by the core and written back by
/// the connection's own task, so a slow client never holds up dispatch.
pub struct CommandServer {
    listener: UnixListener,
    path: PathBuf,
}

impl CommandServer {
    pub fn new(listener: UnixListener, path: impl Into<PathBuf>) -> Self {
        Self {
            listener,
            path: path.into(),
        }
    }

    pub fn spawn(self, event_tx: mpsc::Sender<CoreEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("CommandServer listening at {}", self.path.display());
            let mut conn_id = 0usize;
            loop {
                match self.listener.accept().await {
                    Ok((stream, _addr)) => {
                        conn_id += 1;
                        let id = conn_id;
                        let tx = event_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, id, tx).await {
                                warn!("Connection {}: {}", id, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        })
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    id: usize,
    event_tx: mpsc::Sender<CoreEvent>,
) -> anyhow::Result<()> {
    // One read: the code is the whole request, and clients may keep their
    // write side open while they wait for the reply.
    let mut buf = [0u8; MAX_REQUEST_LEN];
    let n = tokio::time::timeout(IO_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for a command"))??;

    let code = String::from_utf8_lossy(&buf[..n]);
    let code = code.trim();
    if code.is_empty() {
        // Liveness probe from a starting instance.
        debug!("Connection {}: probe", id);
        return Ok(());
    }
    let Some(command) = Command::from_code(code) else {
        warn!("Connection {}: unrecognized command {:?}", id, code);
        return Ok(());
    };
    debug!("Connection {}: {:?}", id, command);

    let (reply_tx, reply_rx) = oneshot::channel();
    event_tx
        .send(CoreEvent::Command {
            command,
            reply: reply_tx,
        })
        .await
        .map_err(|_| anyhow::anyhow!("core loop gone"))?;

    if let Ok(Some(reply)) = reply_rx.await {
        stream.write_all(reply.as_bytes()).await?;
    }
    stream.shutdown().await?;
    Ok(())
}

/// Send one command to the primary and return whatever it replied (empty
/// for commands without a reply).
pub async fn request(socket: &Path, command: Command) -> std::io::Result<String> {
    let mut stream = UnixStream::connect(socket).await?;
    stream.write_all(command.code().as_bytes()).await?;
    stream.shutdown().await?;

    let mut reply = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut reply))
        .await
        .map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, "no reply from primary")
        })??;
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use players_proto::protocol::REPLY_SUCCESS;

    /// Stand-in for the core loop: answers list and share, ignores the rest.
    fn fake_core(mut rx: mpsc::Receiver<CoreEvent>, seen: mpsc::UnboundedSender<Command>) {
        tokio::spawn(async move {
            while let Some(evt) = rx.recv().await {
                if let CoreEvent::Command { command, reply } = evt {
                    let answer = match command {
                        Command::List => Some("* 0: mpv (Playing)\n".to_string()),
                        Command::Share => Some(REPLY_SUCCESS.to_string()),
                        _ => None,
                    };
                    let _ = seen.send(command);
                    let _ = reply.send(answer);
                }
            }
        });
    }

    fn start(dir: &Path) -> (PathBuf, mpsc::UnboundedReceiver<Command>) {
        let path = dir.join("players-bar.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let (tx, rx) = mpsc::channel(16);
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        fake_core(rx, seen_tx);
        CommandServer::new(listener, &path).spawn(tx);
        (path, seen_rx)
    }

    #[tokio::test]
    async fn test_commands_are_dispatched_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut seen) = start(dir.path());

        for cmd in [Command::FocusNext, Command::ControlToggle, Command::FocusPrevious] {
            assert_eq!(request(&path, cmd).await.unwrap(), "");
            assert_eq!(seen.recv().await, Some(cmd));
        }
    }

    #[tokio::test]
    async fn test_replies_come_back() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _seen) = start(dir.path());

        assert_eq!(
            request(&path, Command::List).await.unwrap(),
            "* 0: mpv (Playing)\n"
        );
        assert_eq!(request(&path, Command::Share).await.unwrap(), REPLY_SUCCESS);
    }

    #[tokio::test]
    async fn test_unknown_code_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut seen) = start(dir.path());

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"zz").await.unwrap();
        stream.shutdown().await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());

        // The server keeps serving after a bad request.
        assert_eq!(request(&path, Command::FocusNext).await.unwrap(), "");
        assert_eq!(seen.recv().await, Some(Command::FocusNext));
    }

    #[tokio::test]
    async fn test_client_without_half_close_gets_reply() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut seen) = start(dir.path());

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"ls").await.unwrap();
        let mut reply = Vec::new();
        tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut reply))
            .await
            .expect("reply must not wait for the client to close")
            .unwrap();
        assert_eq!(reply, b"* 0: mpv (Playing)\n");
        assert_eq!(seen.recv().await, Some(Command::List));
    }

    #[tokio::test]
    async fn test_trailing_newline_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut seen) = start(dir.path());

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"ct\n").await.unwrap();
        stream.shutdown().await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert_eq!(seen.recv().await, Some(Command::ControlToggle));
    }
}
