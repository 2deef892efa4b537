use std::io;
use std::path::Path;

use players_proto::platform::{FileId, RuntimePaths};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

/// What the rendezvous path says about an existing primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Nothing at the path.
    Absent,
    /// The path exists but nobody answers: a primary died without cleaning up.
    Stale,
    /// A primary accepted the connection.
    Live,
}

pub enum Role {
    /// This process owns the endpoint; the listener is already bound.
    Primary(Endpoint),
    Secondary,
}

/// The bound rendezvous socket and the identity of the file it created.
pub struct Endpoint {
    pub listener: UnixListener,
    pub id: FileId,
}

pub async fn probe(socket: &Path) -> Probe {
    if !socket.exists() {
        return Probe::Absent;
    }
    match UnixStream::connect(socket).await {
        Ok(_) => Probe::Live,
        Err(_) => Probe::Stale,
    }
}

/// Decide whether this process becomes the primary or defers to a running
/// one.  With `replace`, a live primary is displaced: its endpoint is
/// removed and rebound here.
pub async fn elect(paths: &RuntimePaths, replace: bool) -> io::Result<Role> {
    match probe(&paths.socket).await {
        Probe::Live if !replace => {
            info!("primary already running at {}", paths.socket.display());
            return Ok(Role::Secondary);
        }
        Probe::Live => {
            warn!(
                "replacing running primary at {}; it will stop receiving commands",
                paths.socket.display()
            );
            paths.remove_coordination_files();
        }
        Probe::Stale => {
            warn!("removing stale endpoint {}", paths.socket.display());
            paths.remove_coordination_files();
        }
        Probe::Absent => {}
    }

    match UnixListener::bind(&paths.socket) {
        Ok(listener) => {
            let id = FileId::of(&paths.socket)?;
            info!("became primary at {}", paths.socket.display());
            Ok(Role::Primary(Endpoint { listener, id }))
        }
        // Another instance won the race between our probe and bind.
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            if probe(&paths.socket).await == Probe::Live {
                info!("lost the race for {}, deferring", paths.socket.display());
                Ok(Role::Secondary)
            } else {
                Err(e)
            }
        }
        Err(e) => Err(e),
    }
}
