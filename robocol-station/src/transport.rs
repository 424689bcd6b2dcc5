//! UDP transport: datagram receive loop plus the two recurring protocol
//! timers, all driving the shared [`RobocolCore`].

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use robocol_core::{
    Action, RobocolCore, RobotEvent, DISCOVERY_INTERVAL_MS, LIVENESS_CHECK_INTERVAL_MS,
};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// Current wall clock as epoch millis, the time base of the protocol.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Bind the socket, start the session, and run the receive loop alongside
/// the discovery and liveness timers. Returns only on a socket error.
pub async fn run_station(
    core: Arc<Mutex<RobocolCore>>,
    port: u16,
    events: mpsc::UnboundedSender<RobotEvent>,
) -> std::io::Result<()> {
    let socket = Arc::new(UdpSocket::bind(("0.0.0.0", port)).await?);

    let actions = core.lock().await.connect();
    perform(&socket, &events, actions).await;

    let disc_socket = socket.clone();
    let disc_core = core.clone();
    let disc_events = events.clone();
    tokio::spawn(async move {
        discovery_loop(disc_socket, disc_core, disc_events).await;
    });

    let live_socket = socket.clone();
    let live_core = core.clone();
    let live_events = events.clone();
    tokio::spawn(async move {
        liveness_loop(live_socket, live_core, live_events).await;
    });

    recv_loop(socket, core, events).await
}

/// Carry out the actions a core transition produced: sends go out on the
/// socket (failures are logged, never fatal), events go to the application
/// channel.
async fn perform(
    socket: &UdpSocket,
    events: &mpsc::UnboundedSender<RobotEvent>,
    actions: Vec<Action>,
) {
    for action in actions {
        match action {
            Action::Send(addr, bytes) => {
                if let Err(e) = socket.send_to(&bytes, addr).await {
                    warn!("send to {addr} failed: {e}");
                }
            }
            Action::Emit(event) => {
                let _ = events.send(event);
            }
        }
    }
}

async fn discovery_loop(
    socket: Arc<UdpSocket>,
    core: Arc<Mutex<RobocolCore>>,
    events: mpsc::UnboundedSender<RobotEvent>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(DISCOVERY_INTERVAL_MS));
    interval.tick().await; // first tick fires immediately; connect() already broadcast
    loop {
        interval.tick().await;
        let actions = core.lock().await.discovery_tick();
        perform(&socket, &events, actions).await;
    }
}

async fn liveness_loop(
    socket: Arc<UdpSocket>,
    core: Arc<Mutex<RobocolCore>>,
    events: mpsc::UnboundedSender<RobotEvent>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(LIVENESS_CHECK_INTERVAL_MS));
    loop {
        interval.tick().await;
        let actions = core.lock().await.liveness_tick(now_ms());
        perform(&socket, &events, actions).await;
    }
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    core: Arc<Mutex<RobocolCore>>,
    events: mpsc::UnboundedSender<RobotEvent>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 65536];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, from)) => {
                let result = {
                    let mut c = core.lock().await;
                    c.on_datagram(&buf[..n], from, now_ms())
                };
                match result {
                    Ok(actions) => perform(&socket, &events, actions).await,
                    Err(e) => warn!("dropping datagram from {from}: {e}"),
                }
            }
            Err(e) => return Err(e),
        }
    }
}
