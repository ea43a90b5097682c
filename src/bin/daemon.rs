// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! fangov-daemon: takes manual control of the chassis fans, runs the
//! control loop every tick, and serves status to TUI clients over a
//! Unix domain socket.

use anyhow::Context;
use clap::Parser;
use fan_governor::config::{self, Config};
use fan_governor::controller::ControlLoop;
use fan_governor::metrics::TickSnapshot;
use fan_governor::protocol::{self, Request, Response};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "fangov-daemon", about = "Temperature-driven server fan governor")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the socket path.
    #[arg(short, long)]
    socket: Option<String>,

    /// Log duty cycles instead of writing them to hardware.
    #[arg(long)]
    dry_run: bool,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    print_default_config: bool,
}

type StatusRx = watch::Receiver<Option<TickSnapshot>>;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.print_default_config {
        print!("{}", config::to_toml(&Config::default())?);
        return Ok(());
    }

    let config_path = config::resolve_config_path(Some(&cli.config));
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let mut ctl = ControlLoop::from_config(&cfg, cli.dry_run).context("Invalid configuration")?;

    let socket_path = cli
        .socket
        .clone()
        .unwrap_or_else(|| cfg.daemon.socket_path.clone());
    let tick_interval = cfg.daemon.tick_interval();
    let restore_on_exit = cfg.daemon.restore_on_exit;
    let cfg = Arc::new(cfg);

    log::info!(
        "Governing {} bank(s) every {}ms, critical sensor '{}'{}",
        cfg.banks.len(),
        cfg.daemon.tick_interval_ms,
        cfg.control.critical_sensor,
        if cli.dry_run { " (dry run)" } else { "" }
    );

    // Clean up old socket file
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind {socket_path}"))?;

    // Make socket accessible to non-root users
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o666);
        std::fs::set_permissions(&socket_path, perms)?;
    }

    log::info!("Listening on {socket_path}");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (status_tx, status_rx) = watch::channel(None::<TickSnapshot>);

    // Signal handler
    tokio::spawn(async move {
        wait_for_signal().await;
        log::info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    // Accept client connections
    let mut shutdown_for_accept = shutdown_rx.clone();
    let cfg_for_clients = cfg.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            tokio::spawn(handle_client(
                                stream,
                                cfg_for_clients.clone(),
                                status_rx.clone(),
                            ));
                        }
                        Err(e) => {
                            log::error!("Failed to accept connection: {e}");
                        }
                    }
                }
                _ = shutdown_for_accept.wait_for(|&stop| stop) => break,
            }
        }
    });

    // Control loop. Ticks shell out to ipmitool, so they run on a
    // blocking-capable worker.
    let mut shutdown = shutdown_rx;
    let mut ticker = time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    tokio::task::block_in_place(|| ctl.startup());
    log::info!("Settling for {}ms before the first tick", cfg.daemon.tick_interval_ms);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.wait_for(|&stop| stop) => break,
        }
        let snapshot = tokio::task::block_in_place(|| ctl.tick());
        status_tx.send_replace(Some(snapshot));
    }

    log::info!("Daemon shutting down");
    if restore_on_exit {
        tokio::task::block_in_place(|| ctl.restore());
    }

    // Cleanup socket
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

async fn wait_for_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {e}");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

// ---------------------------------------------------------------------------
// Client connection handler
// ---------------------------------------------------------------------------

async fn handle_client(stream: UnixStream, cfg: Arc<Config>, mut status: StatusRx) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let (response, subscribe) = match protocol::decode::<Request>(&line) {
            Ok(Request::GetStatus) => (current_status(&status), false),
            Ok(Request::GetConfig) => (
                Response::Config {
                    config: Box::new((*cfg).clone()),
                },
                false,
            ),
            Ok(Request::Subscribe) => {
                let snapshot = status.borrow_and_update().clone();
                (Response::Status { snapshot }, true)
            }
            Err(e) => (
                Response::Error {
                    message: format!("Invalid request: {e}"),
                },
                false,
            ),
        };

        if send(&mut writer, &response).await.is_err() {
            return; // Client disconnected
        }

        if subscribe {
            while status.changed().await.is_ok() {
                if send(&mut writer, &current_status(&status)).await.is_err() {
                    return;
                }
            }
            return;
        }
    }
}

fn current_status(status: &StatusRx) -> Response {
    Response::Status {
        snapshot: status.borrow().clone(),
    }
}

async fn send(writer: &mut OwnedWriteHalf, response: &Response) -> std::io::Result<()> {
    let encoded = match protocol::encode(response) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to encode response: {e}");
            return Ok(());
        }
    };
    writer.write_all(encoded.as_bytes()).await
}
