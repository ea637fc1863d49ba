pub mod doctor;
pub mod link;
pub mod state;
pub mod telemetry;

use serde::Deserialize;
use std::time::Duration;

use fpvzoom_proto::frame::MAX_PAYLOAD_LEN;
use fpvzoom_proto::WireVersion;

pub use link::{SerialTransport, Transport};
pub use state::LinkStats;
pub use telemetry::{CommandSink, HeartbeatTimer, Peer, TelemetryLoop};

/// Which framing we emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolPreference {
    /// Start with v1, move to v2 for good once the FC speaks v2.
    #[default]
    Auto,
    V1,
    V2,
}

impl ProtocolPreference {
    pub fn initial_version(self) -> WireVersion {
        match self {
            ProtocolPreference::Auto | ProtocolPreference::V1 => WireVersion::V1,
            ProtocolPreference::V2 => WireVersion::V2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcConfig {
    pub serial_dev: String,
    pub baud: u32,

    /// MAVLink ids we use (companion side)
    pub sys_id: u8,
    pub comp_id: u8,

    pub protocol: ProtocolPreference,

    /// Companion heartbeat cadence. The FC drops the link without it.
    pub heartbeat_interval_ms: u64,

    /// Read timeout while waiting for the first FC heartbeat
    pub handshake_poll_ms: u64,
    /// Read timeout once the link is up
    pub poll_ms: u64,

    /// Frames declaring a longer payload are rejected unread.
    pub max_payload: usize,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            serial_dev: "/dev/ttyS2".into(),
            baud: 57600,
            sys_id: 2,
            comp_id: 191,
            protocol: ProtocolPreference::Auto,
            heartbeat_interval_ms: 1000,
            handshake_poll_ms: 200,
            poll_ms: 100,
            max_payload: MAX_PAYLOAD_LEN,
        }
    }
}

impl FcConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn handshake_poll(&self) -> Duration {
        Duration::from_millis(self.handshake_poll_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}
