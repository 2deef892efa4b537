use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use players_proto::config::Config;
use players_proto::platform::RuntimePaths;

use crate::render::RenderOptions;

#[derive(Parser, Debug)]
#[command(
    name = "players-bar",
    about = "MPRIS status line for waybar; extra instances mirror the first one",
    long_about = None,
    version,
)]
pub struct Args {
    /// Symbol shown while playing
    #[arg(long, value_name = "SYMBOL")]
    pub play: Option<String>,

    /// Symbol shown while paused
    #[arg(long, value_name = "SYMBOL")]
    pub pause: Option<String>,

    /// Separator between artist, album and title
    #[arg(long)]
    pub separator: Option<String>,

    /// Element order, colon separated (SYMBOL:ARTIST:ALBUM:TITLE:POSITION)
    #[arg(long)]
    pub order: Option<String>,

    /// Show the playback position
    #[arg(long)]
    pub position: bool,

    /// Advance the position between player updates
    #[arg(long)]
    pub interpolate: bool,

    /// Focus whichever player starts playing
    #[arg(long)]
    pub autofocus: bool,

    /// Take over from a running primary instead of mirroring it
    #[arg(long)]
    pub replace: bool,

    /// Send a command to the running instance and exit
    /// (player-next, player-prev, next, prev, toggle, list)
    #[arg(long, value_name = "CMD")]
    pub send: Option<String>,

    /// Path to TOML config file [default: ~/.config/players-bar/config.toml]
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the socket, share files and log [default: system temp dir]
    #[arg(long, value_name = "DIR")]
    pub runtime_dir: Option<PathBuf>,
}

/// Effective settings after merging flags over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub render: RenderOptions,
    pub interpolate: bool,
    pub autofocus: bool,
    pub poll: Duration,
    pub rescan: Duration,
    pub paths: RuntimePaths,
}

impl Settings {
    pub fn resolve(file: Config, args: &Args) -> Self {
        let paths = match &args.runtime_dir {
            Some(dir) => RuntimePaths::in_dir(dir),
            None => file.runtime_paths(),
        };

        let mut render = file.render;
        if let Some(play) = &args.play {
            render.play = play.clone();
        }
        if let Some(pause) = &args.pause {
            render.pause = pause.clone();
        }
        if let Some(separator) = &args.separator {
            render.separator = separator.clone();
        }
        if let Some(order) = &args.order {
            render.order = order.clone();
        }
        render.position |= args.position;
        render.interpolate |= args.interpolate;

        Settings {
            render: RenderOptions::from(&render),
            interpolate: render.position && render.interpolate,
            autofocus: args.autofocus || file.players.autofocus,
            poll: Duration::from_secs(file.players.poll_secs.max(1)),
            rescan: Duration::from_secs(file.players.rescan_secs.max(1)),
            paths,
        }
    }

    /// How often the backend is re-enumerated.  Without interpolation the
    /// position only moves on re-enumeration, so it runs at the poll rate.
    pub fn rescan_interval(&self) -> Duration {
        if self.render.show_position && !self.interpolate {
            self.poll
        } else {
            self.rescan
        }
    }
}
