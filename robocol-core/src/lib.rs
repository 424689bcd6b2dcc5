//! Robocol driver-station protocol core.
//! Host-driven: no I/O; the host passes datagrams and timer ticks and
//! receives actions.

pub mod core;
pub mod protocol;
pub mod wire;

pub use crate::core::{
    Action, RobocolCore, RobotEvent, DISCOVERY_INTERVAL_MS, LIVENESS_CHECK_INTERVAL_MS,
    LIVENESS_TIMEOUT_MS,
};
pub use protocol::{
    commands, CommandMessage, GamepadMessage, GamepadState, Message, MsgType, OpmodeInfo,
    PeerDiscoveryMessage, PeerType, RobotState, TelemetryMessage, Toast, ROBOCOL_PORT,
    ROBOCOL_VERSION,
};
pub use wire::{decode_any, DecodeError, EncodeError};
