//! Host-driven connection core: the host passes datagrams, timer ticks and
//! the current time; the core returns actions (bytes to send, events to
//! emit). No I/O, no clocks.

use std::net::SocketAddr;

use crate::protocol::{
    commands, CommandMessage, GamepadMessage, Message, OpmodeInfo, PeerDiscoveryMessage, PeerType,
    TelemetryMessage, Toast,
};
use crate::wire;

/// Discovery broadcast period while no peer has responded.
pub const DISCOVERY_INTERVAL_MS: u64 = 5_000;
/// Period of the inbound-silence check.
pub const LIVENESS_CHECK_INTERVAL_MS: u64 = 5_000;
/// Inbound silence after which the peer is considered gone.
pub const LIVENESS_TIMEOUT_MS: u64 = 10_000;

/// Something the host must do on the core's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a datagram to the given address.
    Send(SocketAddr, Vec<u8>),
    /// Deliver an event to the application.
    Emit(RobotEvent),
}

/// Domain events surfaced to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotEvent {
    Telemetry(TelemetryMessage),
    OpmodesList(Vec<OpmodeInfo>),
    ActiveOpmode(String),
    RunOpmode(String),
    Toast(Toast),
    ConnectionChange(bool),
}

/// Connection state machine for one driver-station session.
///
/// Lifecycle: idle until [`connect`], then discovering (periodic discovery
/// broadcast to every candidate address) until the first peer discovery
/// response arrives, then connected to the responding address. Loss of
/// inbound traffic for [`LIVENESS_TIMEOUT_MS`] drops back to discovering.
/// [`close`] is terminal and idempotent.
///
/// [`connect`]: RobocolCore::connect
/// [`close`]: RobocolCore::close
pub struct RobocolCore {
    candidates: Vec<SocketAddr>,
    peer: Option<SocketAddr>,
    connected: bool,
    discovering: bool,
    /// Epoch millis of the last inbound datagram; zero while nothing has
    /// been received since (re)start.
    last_received_ms: u64,
    closed: bool,
}

impl RobocolCore {
    /// New idle session that will probe the given candidate addresses.
    pub fn new(candidates: Vec<SocketAddr>) -> Self {
        Self {
            candidates,
            peer: None,
            connected: false,
            discovering: false,
            last_received_ms: 0,
            closed: false,
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    /// The address of the responding peer, once one has been heard.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Start the session: begin discovering and broadcast immediately.
    pub fn connect(&mut self) -> Vec<Action> {
        if self.closed {
            return Vec::new();
        }
        self.discovering = true;
        self.broadcast_discovery()
    }

    /// Body of the recurring discovery timer. Re-broadcasts while no peer
    /// has responded; a no-op once connected or closed.
    pub fn discovery_tick(&mut self) -> Vec<Action> {
        if self.closed || !self.discovering {
            return Vec::new();
        }
        self.broadcast_discovery()
    }

    /// Body of the recurring liveness timer. A session that has heard
    /// nothing for more than [`LIVENESS_TIMEOUT_MS`] is torn down and
    /// discovery resumes; a session that never heard anything is left alone.
    pub fn liveness_tick(&mut self, now_ms: u64) -> Vec<Action> {
        if self.closed || self.last_received_ms == 0 {
            return Vec::new();
        }
        if now_ms.saturating_sub(self.last_received_ms) <= LIVENESS_TIMEOUT_MS {
            return Vec::new();
        }
        self.last_received_ms = 0;
        self.connected = false;
        self.peer = None;
        self.discovering = true;
        vec![Action::Emit(RobotEvent::ConnectionChange(false))]
    }

    /// Process one inbound datagram.
    ///
    /// The liveness stamp is updated before decoding, so a datagram that
    /// fails to decode still counts as proof the peer is alive. Decode
    /// errors are returned for the host's diagnostic sink and leave the
    /// session state untouched.
    pub fn on_datagram(
        &mut self,
        bytes: &[u8],
        from: SocketAddr,
        now_ms: u64,
    ) -> Result<Vec<Action>, wire::DecodeError> {
        if self.closed {
            return Ok(Vec::new());
        }
        self.last_received_ms = now_ms;
        let msg = wire::decode_any(bytes)?;
        Ok(match msg {
            Message::PeerDiscovery(_) => self.on_peer_discovery(from, now_ms),
            Message::Command(cmd) => self.on_command(cmd, from),
            Message::Telemetry(t) => vec![Action::Emit(RobotEvent::Telemetry(t))],
            // No inbound decoder exists for gamepad frames.
            Message::Gamepad(_) => Vec::new(),
        })
    }

    /// Encode and send controller state to the connected peer. A no-op
    /// while no peer is connected.
    pub fn send_gamepad(&self, msg: &GamepadMessage) -> Vec<Action> {
        if self.closed || !self.connected {
            return Vec::new();
        }
        match self.peer {
            Some(peer) => vec![Action::Send(peer, wire::encode_gamepad(msg))],
            None => Vec::new(),
        }
    }

    /// Shut the session down. The first call emits the final connectivity
    /// event and disarms both timer bodies; repeated calls do nothing.
    pub fn close(&mut self) -> Vec<Action> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.discovering = false;
        self.connected = false;
        self.peer = None;
        vec![Action::Emit(RobotEvent::ConnectionChange(false))]
    }

    fn broadcast_discovery(&self) -> Vec<Action> {
        let frame = wire::encode_peer_discovery(&PeerDiscoveryMessage {
            peer_type: PeerType::Peer,
            seq_num: 0,
        });
        self.candidates
            .iter()
            .map(|&addr| Action::Send(addr, frame.clone()))
            .collect()
    }

    /// A peer discovery datagram doubles as the handshake response: the
    /// first one promotes the session to connected, records the sender as
    /// the peer, and triggers the post-handshake robot restart. Later ones
    /// only refresh the peer address.
    fn on_peer_discovery(&mut self, from: SocketAddr, now_ms: u64) -> Vec<Action> {
        self.peer = Some(from);
        if self.connected {
            return Vec::new();
        }
        self.connected = true;
        self.discovering = false;
        let mut actions = vec![Action::Emit(RobotEvent::ConnectionChange(true))];
        let restart = CommandMessage::new(commands::RESTART_ROBOT, now_ms, "");
        if let Ok(frame) = wire::encode_command(&restart) {
            actions.push(Action::Send(from, frame));
        }
        actions
    }

    /// An unacknowledged inbound command is echoed back acknowledged, then
    /// dispatched by name. Unrecognized names are accepted silently, as are
    /// notification payloads that fail to parse.
    fn on_command(&mut self, cmd: CommandMessage, from: SocketAddr) -> Vec<Action> {
        let mut actions = Vec::new();
        if !cmd.acknowledged {
            let echo = cmd.clone().into_acknowledged();
            if let Ok(frame) = wire::encode_command(&echo) {
                actions.push(Action::Send(self.peer.unwrap_or(from), frame));
            }
        }
        match cmd.name.as_str() {
            commands::NOTIFY_RUN_OP_MODE => {
                actions.push(Action::Emit(RobotEvent::RunOpmode(cmd.extra)));
            }
            commands::NOTIFY_INIT_OP_MODE => {
                actions.push(Action::Emit(RobotEvent::ActiveOpmode(cmd.extra)));
            }
            commands::NOTIFY_OP_MODE_LIST => {
                if let Ok(list) = serde_json::from_str::<Vec<OpmodeInfo>>(&cmd.extra) {
                    actions.push(Action::Emit(RobotEvent::OpmodesList(list)));
                }
            }
            commands::SHOW_TOAST => {
                if let Ok(toast) = serde_json::from_str::<Toast>(&cmd.extra) {
                    actions.push(Action::Emit(RobotEvent::Toast(toast)));
                }
            }
            _ => {}
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::GamepadState;

    fn addr(last: u8) -> SocketAddr {
        format!("192.168.49.{last}:20884").parse().unwrap()
    }

    fn core_with_candidates() -> RobocolCore {
        RobocolCore::new(vec![addr(1), addr(2)])
    }

    fn discovery_frame() -> Vec<u8> {
        wire::encode_peer_discovery(&PeerDiscoveryMessage {
            peer_type: PeerType::GroupOwner,
            seq_num: 0,
        })
    }

    fn sends(actions: &[Action]) -> Vec<(SocketAddr, Vec<u8>)> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(to, bytes) => Some((*to, bytes.clone())),
                Action::Emit(_) => None,
            })
            .collect()
    }

    fn events(actions: &[Action]) -> Vec<RobotEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(e) => Some(e.clone()),
                Action::Send(..) => None,
            })
            .collect()
    }

    /// Drive a fresh core through the discovery handshake.
    fn connected_core(peer: SocketAddr) -> RobocolCore {
        let mut core = core_with_candidates();
        core.connect();
        core.on_datagram(&discovery_frame(), peer, 1_000).unwrap();
        assert!(core.connected());
        core
    }

    #[test]
    fn connect_broadcasts_to_every_candidate() {
        let mut core = core_with_candidates();
        let actions = core.connect();
        let sends = sends(&actions);
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].0, addr(1));
        assert_eq!(sends[1].0, addr(2));
        assert_eq!(sends[0].1[0], 3); // peer discovery tag
    }

    #[test]
    fn discovery_tick_rebroadcasts_until_connected() {
        let mut core = core_with_candidates();
        core.connect();
        assert_eq!(sends(&core.discovery_tick()).len(), 2);

        core.on_datagram(&discovery_frame(), addr(1), 1_000).unwrap();
        assert!(core.discovery_tick().is_empty());
    }

    #[test]
    fn handshake_connects_and_restarts_robot() {
        let mut core = core_with_candidates();
        core.connect();
        let actions = core
            .on_datagram(&discovery_frame(), addr(1), 5_000)
            .unwrap();

        assert_eq!(events(&actions), vec![RobotEvent::ConnectionChange(true)]);
        assert!(core.connected());
        assert_eq!(core.peer(), Some(addr(1)));

        let sends = sends(&actions);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, addr(1));
        let cmd = wire::decode_command(&sends[0].1).unwrap();
        assert_eq!(cmd.name, commands::RESTART_ROBOT);
        assert_eq!(cmd.timestamp, 5_000);
        assert!(!cmd.acknowledged);
    }

    #[test]
    fn repeat_discovery_while_connected_is_quiet() {
        let mut core = connected_core(addr(1));
        let actions = core
            .on_datagram(&discovery_frame(), addr(2), 2_000)
            .unwrap();
        assert!(actions.is_empty());
        // The peer address still follows the most recent responder.
        assert_eq!(core.peer(), Some(addr(2)));
    }

    #[test]
    fn liveness_timeout_disconnects_once_and_resumes_discovery() {
        let mut core = connected_core(addr(1));

        let actions = core.liveness_tick(1_000 + LIVENESS_TIMEOUT_MS + 1);
        assert_eq!(events(&actions), vec![RobotEvent::ConnectionChange(false)]);
        assert!(!core.connected());
        assert_eq!(core.peer(), None);

        // Stamp is zeroed, so the next check is a no-op rather than a
        // second disconnect event.
        assert!(core.liveness_tick(1_000_000).is_empty());
        // Discovery has been re-armed.
        assert_eq!(sends(&core.discovery_tick()).len(), 2);
    }

    #[test]
    fn liveness_within_window_is_noop() {
        let mut core = connected_core(addr(1));
        assert!(core.liveness_tick(1_000 + LIVENESS_TIMEOUT_MS).is_empty());
        assert!(core.connected());
    }

    #[test]
    fn liveness_never_connected_is_noop() {
        let mut core = core_with_candidates();
        core.connect();
        assert!(core.liveness_tick(1_000_000).is_empty());
    }

    #[test]
    fn inbound_traffic_refreshes_liveness() {
        let mut core = connected_core(addr(1));
        let frame = wire::encode_command(&CommandMessage {
            name: "CMD_UNINTERESTING".to_string(),
            seq_num: 0,
            timestamp: 0,
            acknowledged: true,
            extra: String::new(),
        })
        .unwrap();
        core.on_datagram(&frame, addr(1), 14_000).unwrap();
        assert!(core.liveness_tick(20_000).is_empty());
        assert!(core.connected());
    }

    #[test]
    fn unacknowledged_command_is_echoed_acknowledged() {
        let mut core = connected_core(addr(1));
        let inbound = CommandMessage::new("CMD_SOMETHING", 9_000, "payload");
        let frame = wire::encode_command(&inbound).unwrap();
        let actions = core.on_datagram(&frame, addr(1), 9_001).unwrap();

        let sends = sends(&actions);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, addr(1));
        let echo = wire::decode_command(&sends[0].1).unwrap();
        assert!(echo.acknowledged);
        assert_eq!(echo.name, "CMD_SOMETHING");
        // Unrecognized command names produce no event.
        assert!(events(&actions).is_empty());
    }

    #[test]
    fn acknowledged_command_is_not_echoed() {
        let mut core = connected_core(addr(1));
        let inbound = CommandMessage::new(commands::NOTIFY_RUN_OP_MODE, 9_000, "TeleOp")
            .into_acknowledged();
        let frame = wire::encode_command(&inbound).unwrap();
        let actions = core.on_datagram(&frame, addr(1), 9_001).unwrap();
        assert!(sends(&actions).is_empty());
        // Dispatch still happens; an acknowledged frame dropped its extra.
        assert_eq!(
            events(&actions),
            vec![RobotEvent::RunOpmode(String::new())]
        );
    }

    #[test]
    fn run_and_init_opmode_notifications() {
        let mut core = connected_core(addr(1));

        let run = wire::encode_command(&CommandMessage::new(
            commands::NOTIFY_RUN_OP_MODE,
            0,
            "TeleOp",
        ))
        .unwrap();
        let actions = core.on_datagram(&run, addr(1), 1).unwrap();
        assert!(events(&actions).contains(&RobotEvent::RunOpmode("TeleOp".to_string())));

        let init = wire::encode_command(&CommandMessage::new(
            commands::NOTIFY_INIT_OP_MODE,
            0,
            "Auton",
        ))
        .unwrap();
        let actions = core.on_datagram(&init, addr(1), 2).unwrap();
        assert!(events(&actions).contains(&RobotEvent::ActiveOpmode("Auton".to_string())));
    }

    #[test]
    fn opmode_list_notification_parses_payload() {
        let mut core = connected_core(addr(1));
        let extra = r#"[{"flavor":"TELEOP","name":"Drive","group":"default"}]"#;
        let frame = wire::encode_command(&CommandMessage::new(
            commands::NOTIFY_OP_MODE_LIST,
            0,
            extra,
        ))
        .unwrap();
        let actions = core.on_datagram(&frame, addr(1), 1).unwrap();
        let listed = events(&actions).into_iter().find_map(|e| match e {
            RobotEvent::OpmodesList(list) => Some(list),
            _ => None,
        });
        let listed = listed.expect("op mode list event");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Drive");
        assert_eq!(listed[0].flavor, "TELEOP");
    }

    #[test]
    fn toast_notification_parses_payload() {
        let mut core = connected_core(addr(1));
        let frame = wire::encode_command(&CommandMessage::new(
            commands::SHOW_TOAST,
            0,
            r#"{"duration":1,"message":"Robot is restarting"}"#,
        ))
        .unwrap();
        let actions = core.on_datagram(&frame, addr(1), 1).unwrap();
        let toast = events(&actions).into_iter().find_map(|e| match e {
            RobotEvent::Toast(t) => Some(t),
            _ => None,
        });
        let toast = toast.expect("toast event");
        assert_eq!(toast.duration, 1);
        assert_eq!(toast.message, "Robot is restarting");
    }

    #[test]
    fn bad_notification_payload_produces_no_event() {
        let mut core = connected_core(addr(1));
        let frame = wire::encode_command(&CommandMessage::new(
            commands::NOTIFY_OP_MODE_LIST,
            0,
            "not json",
        ))
        .unwrap();
        let actions = core.on_datagram(&frame, addr(1), 1).unwrap();
        assert!(events(&actions).is_empty());
        // The echo still goes out.
        assert_eq!(sends(&actions).len(), 1);
    }

    #[test]
    fn telemetry_is_forwarded() {
        let mut core = connected_core(addr(1));
        // Minimal telemetry frame: header, seq, timestamp, flags, no entries.
        let mut frame = vec![5u8, 0, 0];
        frame.extend_from_slice(&3u16.to_be_bytes());
        frame.extend_from_slice(&42u64.to_be_bytes());
        frame.extend_from_slice(&[0, 2, 0, 0, 0]);
        let actions = core.on_datagram(&frame, addr(1), 1).unwrap();
        match &events(&actions)[..] {
            [RobotEvent::Telemetry(t)] => {
                assert_eq!(t.seq_num, 3);
                assert_eq!(t.timestamp, 42);
            }
            other => panic!("expected telemetry event, got {other:?}"),
        }
    }

    #[test]
    fn decode_failure_keeps_state_but_counts_as_liveness() {
        let mut core = connected_core(addr(1));
        let err = core.on_datagram(&[9, 9, 9], addr(1), 50_000);
        assert!(err.is_err());
        assert!(core.connected());
        // The bad datagram still refreshed the stamp.
        assert!(core.liveness_tick(55_000).is_empty());
        assert!(core.connected());
    }

    #[test]
    fn send_gamepad_targets_connected_peer() {
        let core = connected_core(addr(1));
        let msg = GamepadMessage {
            seq_num: 1,
            user: 1,
            gamepad: GamepadState::default(),
        };
        let actions = core.send_gamepad(&msg);
        let sends = sends(&actions);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, addr(1));
        assert_eq!(sends[0].1[0], 2); // gamepad tag
    }

    #[test]
    fn send_gamepad_while_disconnected_is_noop() {
        let mut core = core_with_candidates();
        core.connect();
        let msg = GamepadMessage {
            seq_num: 1,
            user: 1,
            gamepad: GamepadState::default(),
        };
        assert!(core.send_gamepad(&msg).is_empty());
    }

    #[test]
    fn close_is_terminal_and_idempotent() {
        let mut core = connected_core(addr(1));
        let actions = core.close();
        assert_eq!(events(&actions), vec![RobotEvent::ConnectionChange(false)]);
        assert!(!core.connected());

        assert!(core.close().is_empty());
        assert!(core.discovery_tick().is_empty());
        assert!(core.liveness_tick(1_000_000).is_empty());
        assert!(core
            .on_datagram(&discovery_frame(), addr(1), 1_000_000)
            .unwrap()
            .is_empty());
    }
}
