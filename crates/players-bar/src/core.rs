/// BarCore: single-owner event loop of the primary instance.
///
/// Owns the `PlayerRegistry` and the `ShareSession` exclusively.  Three
/// producers feed it through one `mpsc` channel: the command server (one
/// event per accepted connection), the backend watcher (fresh player lists)
/// and a position ticker.  Events are applied in
/// arrival order; the ticker only ever reads the registry and re-emits.
use std::io::Write;

use players_proto::protocol::{encode_frame, Command, REPLY_FAILED_PREFIX, REPLY_SUCCESS};
use players_proto::state::{PlaybackSource, PlayerControl, PlayerRegistry};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::render::Renderer;
use crate::share::ShareSession;

// ── CoreEvent ─────────────────────────────────────────────────────────────────

/// All inputs into the BarCore loop.
#[derive(Debug)]
pub enum CoreEvent {
    /// A decoded command from the rendezvous socket.  The reply, if the
    /// command has one, goes back through `reply`.
    Command {
        command: Command,
        reply: oneshot::Sender<Option<String>>,
    },
    /// Fresh enumeration from the backend.
    Refresh(Vec<PlaybackSource>),
    /// Interpolation tick.
    Tick,
    /// Shutdown requested.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct CoreOptions {
    pub autofocus: bool,
    /// Advance the position on the local line between backend updates.
    pub interpolate: bool,
    /// Reply to pre-share requests.
    pub fingerprint: String,
}

// ── BarCore ───────────────────────────────────────────────────────────────────

pub struct BarCore<C: PlayerControl, W: Write> {
    registry: PlayerRegistry,
    control: C,
    renderer: Renderer,
    session: ShareSession<W>,
    options: CoreOptions,
    /// Last line written to stdout, to skip redundant writes.
    last_line: Option<String>,
    last_frame: Option<String>,
    /// When the registry was last reloaded from the backend.
    refreshed_at: Instant,
}

impl<C: PlayerControl, W: Write> BarCore<C, W> {
    pub fn new(
        players: Vec<PlaybackSource>,
        control: C,
        renderer: Renderer,
        session: ShareSession<W>,
        options: CoreOptions,
    ) -> Self {
        let mut registry = PlayerRegistry::with_players(players);
        if options.autofocus {
            registry.sort_by_priority();
        }
        Self {
            registry,
            control,
            renderer,
            session,
            options,
            last_line: None,
            last_frame: None,
            refreshed_at: Instant::now(),
        }
    }

    /// Run until `Shutdown`, the channel closing, or stdout failing.  Share
    /// files are removed on the way out in every case.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<CoreEvent>) -> anyhow::Result<()> {
        info!("BarCore: starting event loop with {} players", self.registry.len());

        let mut result = self.emit(true).map_err(anyhow::Error::from);
        while result.is_ok() {
            let Some(evt) = event_rx.recv().await else {
                info!("BarCore: event channel closed, shutting down");
                break;
            };
            match self.handle_event(evt) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!("BarCore: stdout write failed: {}", e);
                    result = Err(e.into());
                }
            }
        }

        self.session.remove_files();
        result
    }

    /// Apply one event.  Returns false when the loop should stop.
    fn handle_event(&mut self, evt: CoreEvent) -> std::io::Result<bool> {
        match evt {
            CoreEvent::Shutdown => {
                info!("BarCore: shutdown requested");
                return Ok(false);
            }
            CoreEvent::Command { command, reply } => {
                debug!("BarCore: command {:?}", command);
                let answer = self.handle_command(command)?;
                // The connection may have given up waiting.
                let _ = reply.send(answer);
            }
            CoreEvent::Refresh(players) => {
                self.registry.reload(players);
                if self.registry.is_empty() {
                    debug!("BarCore: no players");
                }
                if self.options.autofocus {
                    self.registry.sort_by_priority();
                }
                self.refreshed_at = Instant::now();
                self.emit(false)?;
            }
            CoreEvent::Tick => self.tick()?,
        }
        Ok(true)
    }

    fn handle_command(&mut self, command: Command) -> std::io::Result<Option<String>> {
        let reply = match command {
            Command::FocusNext => {
                if self.registry.focus_next() {
                    debug!("BarCore: focus -> {}", self.registry.focus());
                    self.emit(false)?;
                }
                None
            }
            Command::FocusPrevious => {
                if self.registry.focus_previous() {
                    debug!("BarCore: focus -> {}", self.registry.focus());
                    self.emit(false)?;
                }
                None
            }
            Command::ControlNext => {
                self.log_control(self.registry.control_next(&self.control));
                None
            }
            Command::ControlPrevious => {
                self.log_control(self.registry.control_previous(&self.control));
                None
            }
            Command::ControlToggle => {
                self.log_control(self.registry.control_toggle(&self.control));
                None
            }
            Command::List => Some(self.registry.describe()),
            Command::PreShare => Some(self.options.fingerprint.clone()),
            Command::Share => Some(match self.session.enable_output_sharing() {
                Ok(_) => {
                    // Seed the file so the follower has a frame to read.
                    let line = self.current_line();
                    self.session.share_line(&line);
                    info!("BarCore: output shared ({} share sinks)", self.session.sink_count());
                    REPLY_SUCCESS.to_string()
                }
                Err(e) => {
                    warn!("BarCore: cannot share output: {}", e);
                    format!("{}{}", REPLY_FAILED_PREFIX, e)
                }
            }),
            Command::DataShare => Some(match self.session.enable_data_sharing() {
                Ok(_) => {
                    let frame = self.current_frame();
                    self.session.share_frame(&frame);
                    self.last_frame = Some(frame);
                    info!("BarCore: data shared ({} share sinks)", self.session.sink_count());
                    REPLY_SUCCESS.to_string()
                }
                Err(e) => {
                    warn!("BarCore: cannot share data: {}", e);
                    format!("{}{}", REPLY_FAILED_PREFIX, e)
                }
            }),
        };
        Ok(reply)
    }

    fn log_control(&self, outcome: anyhow::Result<bool>) {
        match outcome {
            Ok(true) => {}
            Ok(false) => debug!("BarCore: no controllable player focused"),
            Err(e) => warn!("BarCore: control failed: {}", e),
        }
    }

    fn current_line(&self) -> String {
        self.last_line
            .clone()
            .unwrap_or_else(|| self.renderer.render(self.registry.current(), None))
    }

    fn current_frame(&self) -> String {
        self.last_frame
            .clone()
            .unwrap_or_else(|| encode_frame(self.registry.current()))
    }

    /// Render the focused player and write it to every sink, skipping
    /// writes that would repeat the previous line unless `force`.
    fn emit(&mut self, force: bool) -> std::io::Result<()> {
        let line = self.renderer.render(self.registry.current(), None);
        let frame = encode_frame(self.registry.current());
        self.write_out(line, frame, force)
    }

    fn write_out(&mut self, line: String, frame: String, force: bool) -> std::io::Result<()> {
        if force || self.last_line.as_deref() != Some(line.as_str()) {
            self.session.emit_line(&line)?;
            self.last_line = Some(line);
        }
        if self.session.is_data_sharing()
            && (force || self.last_frame.as_deref() != Some(frame.as_str()))
        {
            self.session.share_frame(&frame);
            self.last_frame = Some(frame);
        }
        Ok(())
    }

    /// Re-render the focused player with its position advanced by the time
    /// since the last refresh.  Shared data frames always carry the advanced
    /// position; the local line only moves when interpolating.  Reads the
    /// registry, never writes it.
    fn tick(&mut self) -> std::io::Result<()> {
        let Some(current) = self.registry.current() else {
            return Ok(());
        };
        if !current.playing {
            return Ok(());
        }
        let advanced = self.advanced_position(current);
        let shown = if self.options.interpolate {
            advanced
        } else {
            current.position
        };
        let line = self.renderer.render(Some(current), Some(shown));
        let moved = PlaybackSource {
            position: advanced,
            ..current.clone()
        };
        let frame = encode_frame(Some(&moved));
        self.write_out(line, frame, false)
    }

    fn advanced_position(&self, player: &PlaybackSource) -> i64 {
        if player.position < 0 {
            return player.position;
        }
        let elapsed = self.refreshed_at.elapsed().as_micros() as i64;
        let position = player.position + elapsed;
        if player.length > 0 {
            position.min(player.length)
        } else {
            position
        }
    }
}
