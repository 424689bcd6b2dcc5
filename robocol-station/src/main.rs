// Robocol driver station: UDP discovery, command ack echo, telemetry daemon.

mod config;
mod transport;

use std::sync::Arc;

use robocol_core::{RobocolCore, RobotEvent};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("robocol-station {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cfg = config::load();
    let candidates = cfg.candidate_addrs();
    if candidates.is_empty() {
        return Err("no usable peer addresses configured".into());
    }
    info!("robocol-station {} probing {:?}", VERSION, candidates);

    let core = Arc::new(Mutex::new(RobocolCore::new(candidates)));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let station_core = core.clone();
        let port = cfg.port;
        tokio::spawn(async move {
            if let Err(e) = transport::run_station(station_core, port, event_tx).await {
                warn!("transport stopped: {e}");
            }
        });
        tokio::spawn(log_events(event_rx));

        shutdown_signal().await?;
        let _ = core.lock().await.close();
        info!("session closed");
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

/// Drain domain events into the log.
async fn log_events(mut rx: mpsc::UnboundedReceiver<RobotEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            RobotEvent::ConnectionChange(up) => {
                if up {
                    info!("robot controller connected");
                } else {
                    info!("robot controller disconnected");
                }
            }
            RobotEvent::OpmodesList(list) => {
                info!("op modes available: {}", list.len());
                for op in &list {
                    debug!("  [{}] {} ({})", op.flavor, op.name, op.group);
                }
            }
            RobotEvent::ActiveOpmode(name) => info!("active op mode: {name}"),
            RobotEvent::RunOpmode(name) => info!("running op mode: {name}"),
            RobotEvent::Toast(toast) => info!("toast: {}", toast.message),
            RobotEvent::Telemetry(t) => {
                debug!(
                    "telemetry seq={} state={:?} strings={} nums={}",
                    t.seq_num,
                    t.robot_state,
                    t.data_strings.len(),
                    t.data_nums.len()
                );
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
