mod backend;
mod cli;
mod core;
mod election;
mod follower;
mod render;
mod share;
mod socket;

use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use players_proto::channel::FrameTail;
use players_proto::config::Config;
use players_proto::platform::remove_if_owned;
use players_proto::protocol::{own_fingerprint, Command};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::backend::PlayerctlBackend;
use crate::cli::{Args, Settings};
use crate::core::{BarCore, CoreEvent, CoreOptions};
use crate::election::{Endpoint, Role};
use crate::follower::{MirrorMode, NegotiationClient};
use crate::render::Renderer;
use crate::share::ShareSession;
use crate::socket::CommandServer;

/// How often a secondary checks the share file for a new frame.
const TAIL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load()?,
    };
    let settings = Settings::resolve(config, &args);

    // Stdout belongs to the status bar: log to a file only.
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.paths.log)
        .with_context(|| format!("failed to open log {}", settings.paths.log.display()))?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,players_bar=debug,players_proto=debug")
            }),
        )
        .init();

    if let Some(name) = &args.send {
        return send(&settings, name).await;
    }

    match election::elect(&settings.paths, args.replace).await? {
        Role::Primary(endpoint) => run_primary(settings, endpoint).await,
        Role::Secondary => run_secondary(settings).await,
    }
}

// ── --send ────────────────────────────────────────────────────────────────────

async fn send(settings: &Settings, name: &str) -> anyhow::Result<()> {
    let Some(command) = Command::from_name(name) else {
        anyhow::bail!(
            "unknown command {:?}, expected one of: {}",
            name,
            Command::user_names().join(", ")
        );
    };
    info!("send: {} ({})", name, command);
    let reply = socket::request(&settings.paths.socket, command)
        .await
        .with_context(|| {
            format!("no running instance at {}", settings.paths.socket.display())
        })?;

    println!("Sent.");
    if command.expects_reply() {
        println!("Response:\n{}", reply);
    }
    Ok(())
}

// ── Primary ───────────────────────────────────────────────────────────────────

async fn run_primary(settings: Settings, endpoint: Endpoint) -> anyhow::Result<()> {
    let Endpoint { listener, id } = endpoint;
    let backend = match PlayerctlBackend::connect().await {
        Ok(backend) => backend,
        Err(e) => {
            error!("backend unavailable: {:#}", e);
            let _ = remove_if_owned(&settings.paths.socket, id);
            return Err(e);
        }
    };
    let players = backend.enumerate().await.unwrap_or_else(|e| {
        warn!("initial enumeration failed: {:#}", e);
        Vec::new()
    });

    // Event channel: every input funnels into BarCore
    let (event_tx, event_rx) = mpsc::channel::<CoreEvent>(256);

    let _server = CommandServer::new(listener, &settings.paths.socket).spawn(event_tx.clone());
    let _watcher = backend.spawn_watcher(event_tx.clone(), settings.rescan_interval());
    // Ticks also keep the position in shared data frames moving.
    spawn_ticker(event_tx.clone(), settings.poll);
    spawn_shutdown_listener(event_tx);

    let core = BarCore::new(
        players,
        backend,
        Renderer::new(settings.render.clone()),
        ShareSession::new(std::io::stdout(), &settings.paths),
        CoreOptions {
            autofocus: settings.autofocus,
            interpolate: settings.interpolate,
            fingerprint: own_fingerprint(),
        },
    );
    let result = core.run(event_rx).await;

    if let Err(e) = remove_if_owned(&settings.paths.socket, id) {
        warn!("failed to remove {}: {}", settings.paths.socket.display(), e);
    }
    info!("primary exiting");
    result
}

fn spawn_ticker(event_tx: mpsc::Sender<CoreEvent>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if event_tx.send(CoreEvent::Tick).await.is_err() {
                break;
            }
        }
    });
}

fn spawn_shutdown_listener(event_tx: mpsc::Sender<CoreEvent>) {
    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                let _ = event_tx.send(CoreEvent::Shutdown).await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
            _ = term.recv() => info!("SIGTERM received"),
        }
        let _ = event_tx.send(CoreEvent::Shutdown).await;
    });
}

// ── Secondary ─────────────────────────────────────────────────────────────────

async fn run_secondary(settings: Settings) -> anyhow::Result<()> {
    let client = NegotiationClient::new(&settings.paths.socket, own_fingerprint());
    let mode = client.negotiate().await?;

    let mut stdout = std::io::stdout();
    let err = match mode {
        MirrorMode::Output => {
            let mut tail = FrameTail::new(&settings.paths.output, TAIL_INTERVAL);
            follower::mirror_output(&mut tail, &mut stdout).await
        }
        MirrorMode::Data => {
            let mut tail = FrameTail::new(&settings.paths.data, TAIL_INTERVAL);
            let renderer = Renderer::new(settings.render.clone());
            follower::mirror_data(&mut tail, &renderer, &mut stdout).await
        }
    };
    let _ = stdout.flush();

    error!("mirror loop ended: {}", err);
    Err(anyhow::Error::new(err).context("lost the primary instance"))
}
