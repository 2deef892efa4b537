/// playerctl-driven playback backend.
///
/// Enumeration and control shell out to `playerctl`; change notifications
/// come from a long-lived `playerctl --follow` child whose every output line
/// triggers a fresh enumeration.  A periodic rescan runs alongside it so
/// players that appear or vanish are picked up even if the follower misses
/// them.
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use players_proto::state::{Control, PlaybackSource, PlayerControl};
use players_proto::protocol::INVALID_MICROS;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::CoreEvent;

const PLAYERCTL: &str = "playerctl";

/// Tab-separated: status, artist, album, title, position (µs), length (µs).
const METADATA_FORMAT: &str =
    "{{status}}\t{{xesam:artist}}\t{{xesam:album}}\t{{xesam:title}}\t{{position}}\t{{mpris:length}}";

/// Printed by the follower on every metadata or status change.
const FOLLOW_FORMAT: &str = "{{playerName}}\t{{status}}";

#[derive(Debug, Clone)]
pub struct PlayerctlBackend {
    binary: PathBuf,
}

impl PlayerctlBackend {
    /// Check that playerctl is installed and answering.
    pub async fn connect() -> anyhow::Result<Self> {
        let binary = PathBuf::from(PLAYERCTL);
        let output = Command::new(&binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("failed to run {}", PLAYERCTL))?;
        if !output.status.success() {
            anyhow::bail!("{} --version exited with {:?}", PLAYERCTL, output.status.code());
        }
        info!(
            "backend: {} {}",
            PLAYERCTL,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(Self { binary })
    }

    /// Current players in playerctl's enumeration order.
    pub async fn enumerate(&self) -> anyhow::Result<Vec<PlaybackSource>> {
        let output = Command::new(&self.binary)
            .arg("--list-all")
            .output()
            .await
            .context("failed to list players")?;
        // playerctl exits non-zero with "No players found" when idle
        if !output.status.success() {
            return Ok(Vec::new());
        }

        let mut players = Vec::new();
        for name in String::from_utf8_lossy(&output.stdout).lines() {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match self.query(name).await {
                Ok(Some(player)) => players.push(player),
                Ok(None) => debug!("backend: {} vanished during enumeration", name),
                Err(e) => warn!("backend: failed to query {}: {}", name, e),
            }
        }
        Ok(players)
    }

    async fn query(&self, name: &str) -> anyhow::Result<Option<PlaybackSource>> {
        let output = Command::new(&self.binary)
            .arg(format!("--player={}", name))
            .arg("metadata")
            .arg("--format")
            .arg(METADATA_FORMAT)
            .output()
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().map(|line| parse_metadata_line(name, line)))
    }

    /// Send a `Refresh` on every change event and every `rescan` interval.
    pub fn spawn_watcher(
        &self,
        event_tx: mpsc::Sender<CoreEvent>,
        rescan: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let backend = self.clone();
        tokio::spawn(async move {
            let mut follower = match backend.spawn_follower() {
                Ok(child) => Some(child),
                Err(e) => {
                    warn!("backend: change follower unavailable, rescanning only: {}", e);
                    None
                }
            };
            let mut lines = follower
                .as_mut()
                .and_then(|child| child.stdout.take())
                .map(|out| BufReader::new(out).lines());

            let mut ticker = tokio::time::interval(rescan);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    line = next_line(&mut lines) => {
                        match line {
                            Some(line) => debug!("backend: change {:?}", line),
                            None => {
                                warn!("backend: change follower exited, rescanning only");
                                lines = None;
                                continue;
                            }
                        }
                    }
                    _ = ticker.tick() => {}
                }

                let players = match backend.enumerate().await {
                    Ok(players) => players,
                    Err(e) => {
                        warn!("backend: enumeration failed: {}", e);
                        continue;
                    }
                };
                if event_tx.send(CoreEvent::Refresh(players)).await.is_err() {
                    debug!("backend: core gone, stopping watcher");
                    break;
                }
            }
        })
    }

    fn spawn_follower(&self) -> std::io::Result<tokio::process::Child> {
        Command::new(&self.binary)
            .arg("--all-players")
            .arg("--follow")
            .arg("metadata")
            .arg("--format")
            .arg(FOLLOW_FORMAT)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Next follower line, or pending forever once the follower is gone so the
/// rescan ticker keeps driving the loop.
async fn next_line(
    lines: &mut Option<tokio::io::Lines<BufReader<tokio::process::ChildStdout>>>,
) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

fn verb(action: Control) -> &'static str {
    match action {
        Control::Next => "next",
        Control::Previous => "previous",
        Control::Toggle => "play-pause",
    }
}

impl PlayerControl for PlayerctlBackend {
    fn send(&self, player: &str, action: Control) -> anyhow::Result<()> {
        let mut child = Command::new(&self.binary)
            .arg(format!("--player={}", player))
            .arg(verb(action))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {} {}", PLAYERCTL, verb(action)))?;

        let player = player.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!("backend: {} {:?} ok", player, action)
                }
                Ok(status) => warn!(
                    "backend: {} {:?} exited with {:?}",
                    player,
                    action,
                    status.code()
                ),
                Err(e) => warn!("backend: {} {:?} failed: {}", player, action, e),
            }
        });
        Ok(())
    }
}

fn parse_micros(field: Option<&str>) -> i64 {
    field
        .map(str::trim)
        .and_then(|f| f.parse().ok())
        .unwrap_or(INVALID_MICROS)
}

/// Parse one line of [`METADATA_FORMAT`] output.
pub fn parse_metadata_line(name: &str, line: &str) -> PlaybackSource {
    let mut fields = line.split('\t');
    let status = fields.next().unwrap_or("");
    let artist = fields.next().unwrap_or("").to_string();
    let album = fields.next().unwrap_or("").to_string();
    let title = fields.next().unwrap_or("").to_string();
    let position = parse_micros(fields.next());
    let length = parse_micros(fields.next());

    PlaybackSource {
        name: name.to_string(),
        artist,
        album,
        title,
        playing: status == "Playing",
        position,
        length,
        duplicate: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let p = parse_metadata_line(
            "spotify",
            "Playing\tRadiohead\tIn Rainbows\tReckoner\t12345678\t290000000",
        );
        assert_eq!(p.name, "spotify");
        assert!(p.playing);
        assert_eq!(p.artist, "Radiohead");
        assert_eq!(p.album, "In Rainbows");
        assert_eq!(p.title, "Reckoner");
        assert_eq!(p.position, 12_345_678);
        assert_eq!(p.length, 290_000_000);
        assert!(!p.duplicate);
    }

    #[test]
    fn test_parse_sparse_line() {
        let p = parse_metadata_line("firefox", "Paused\t\t\tSome video\t\t");
        assert!(!p.playing);
        assert_eq!(p.artist, "");
        assert_eq!(p.title, "Some video");
        assert_eq!(p.position, INVALID_MICROS);
        assert_eq!(p.length, INVALID_MICROS);
    }

    #[test]
    fn test_parse_truncated_line() {
        let p = parse_metadata_line("mpv", "Stopped");
        assert!(!p.playing);
        assert_eq!(p.title, "");
        assert_eq!(p.position, INVALID_MICROS);
    }

    #[test]
    fn test_verbs() {
        assert_eq!(verb(Control::Toggle), "play-pause");
        assert_eq!(verb(Control::Previous), "previous");
    }
}
