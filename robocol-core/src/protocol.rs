//! Robocol message types and protocol constants.

use serde::Deserialize;

/// Current Robocol protocol version. Compared exactly on peer discovery decode.
pub const ROBOCOL_VERSION: u8 = 123;

/// Default UDP port for driver station <-> robot controller traffic.
pub const ROBOCOL_PORT: u16 = 20884;

/// SDK build month advertised in outbound peer discovery frames.
pub const SDK_BUILD_MONTH: u8 = 3;
/// SDK build year advertised in outbound peer discovery frames.
pub const SDK_BUILD_YEAR: u16 = 3;
/// SDK major version advertised in outbound peer discovery frames.
pub const SDK_VERSION_MAJOR: u8 = 3;
/// SDK minor version advertised in outbound peer discovery frames.
pub const SDK_VERSION_MINOR: u8 = 3;

/// Format version byte of an outbound gamepad frame.
pub const GAMEPAD_VERSION: u8 = 4;

/// Message type tag: the first byte of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Empty = 0,
    Heartbeat = 1,
    Gamepad = 2,
    PeerDiscovery = 3,
    Command = 4,
    Telemetry = 5,
    Keepalive = 6,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MsgType::Empty),
            1 => Some(MsgType::Heartbeat),
            2 => Some(MsgType::Gamepad),
            3 => Some(MsgType::PeerDiscovery),
            4 => Some(MsgType::Command),
            5 => Some(MsgType::Telemetry),
            6 => Some(MsgType::Keepalive),
            _ => None,
        }
    }
}

/// Peer role advertised in a discovery frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PeerType {
    NotSet = 0,
    Peer = 1,
    GroupOwner = 2,
}

impl PeerType {
    /// Map a wire byte to a peer type. Unknown values fall back to `NotSet`.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => PeerType::Peer,
            2 => PeerType::GroupOwner,
            _ => PeerType::NotSet,
        }
    }
}

/// Robot run state reported in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotState {
    Unknown,
    NotStarted,
    Init,
    Running,
    Stopped,
    EmergencyStop,
}

impl RobotState {
    /// Map a wire byte to a run state. Out-of-range values fall back to `Unknown`.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => RobotState::NotStarted,
            1 => RobotState::Init,
            2 => RobotState::Running,
            3 => RobotState::Stopped,
            4 => RobotState::EmergencyStop,
            _ => RobotState::Unknown,
        }
    }
}

/// Command identifiers understood by this endpoint. `CommandMessage.name`
/// stays a free-form string so unrecognized commands survive decode.
pub mod commands {
    /// Sent once after the discovery handshake completes.
    pub const RESTART_ROBOT: &str = "CMD_RESTART_ROBOT";
    /// Controller notification: an op mode started running. Extra is the op mode name.
    pub const NOTIFY_RUN_OP_MODE: &str = "CMD_NOTIFY_RUN_OP_MODE";
    /// Controller notification: an op mode was initialized. Extra is the op mode name.
    pub const NOTIFY_INIT_OP_MODE: &str = "CMD_NOTIFY_INIT_OP_MODE";
    /// Controller notification: the available op mode list. Extra is a JSON array.
    pub const NOTIFY_OP_MODE_LIST: &str = "CMD_NOTIFY_OP_MODE_LIST";
    /// Controller request to show a toast. Extra is a JSON object.
    pub const SHOW_TOAST: &str = "CMD_SHOW_TOAST";
}

/// Presence announcement exchanged during the discovery handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDiscoveryMessage {
    pub peer_type: PeerType,
    pub seq_num: u16,
}

/// A command sent to or received from the robot controller.
///
/// The same frame carries outbound commands and the acknowledgment echo: an
/// inbound unacknowledged command is re-sent with the acknowledged flag set,
/// which is the only delivery guarantee layered over UDP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub name: String,
    pub seq_num: u16,
    /// Epoch millis at which the command was produced.
    pub timestamp: u64,
    pub acknowledged: bool,
    /// Command payload. Carried on the wire only while unacknowledged.
    pub extra: String,
}

impl CommandMessage {
    /// New unacknowledged command stamped with the given time.
    pub fn new(name: &str, timestamp: u64, extra: &str) -> Self {
        Self {
            name: name.to_string(),
            seq_num: 0,
            timestamp,
            acknowledged: false,
            extra: extra.to_string(),
        }
    }

    /// The acknowledged form of this command, used for the echo back to the
    /// sender. The acknowledged flag is the one transition a command makes.
    pub fn into_acknowledged(mut self) -> Self {
        self.acknowledged = true;
        self
    }
}

/// Full state of one physical controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GamepadState {
    pub left_stick_x: f32,
    pub left_stick_y: f32,
    pub right_stick_x: f32,
    pub right_stick_y: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub guide: bool,
    pub start: bool,
    pub back: bool,
    pub left_bumper: bool,
    pub right_bumper: bool,
    pub left_stick_button: bool,
    pub right_stick_button: bool,
    /// Epoch millis of the last state change.
    pub updated_at: u64,
}

/// Controller state bound for the robot. Outbound only.
#[derive(Debug, Clone, PartialEq)]
pub struct GamepadMessage {
    pub seq_num: u16,
    /// Driver slot, 1 or 2.
    pub user: u8,
    pub gamepad: GamepadState,
}

/// Telemetry snapshot received from the robot. Inbound only.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryMessage {
    /// Epoch millis on the robot controller.
    pub timestamp: u64,
    pub is_sorted: bool,
    pub robot_state: RobotState,
    pub tag: String,
    pub seq_num: u16,
    /// Ordered key/value string entries.
    pub data_strings: Vec<(String, String)>,
    /// Ordered key/value numeric entries.
    pub data_nums: Vec<(String, f32)>,
}

/// All wire message variants, discriminated by the leading type tag.
/// `Empty`, `Heartbeat` and `Keepalive` are reserved tags with no payload
/// codec on this endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Gamepad(GamepadMessage),
    PeerDiscovery(PeerDiscoveryMessage),
    Command(CommandMessage),
    Telemetry(TelemetryMessage),
}

/// One entry of the op mode list notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpmodeInfo {
    pub flavor: String,
    pub name: String,
    pub group: String,
}

/// Payload of a toast notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Toast {
    pub duration: i64,
    pub message: String,
}
