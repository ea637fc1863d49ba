use bytes::{Bytes, BytesMut};

use crate::frame::{self, FrameHeader, WireVersion};
use crate::MSG_ID_HEARTBEAT;

pub const HEARTBEAT_CRC_EXTRA: u8 = 50;
pub const HEARTBEAT_PAYLOAD_LEN: usize = 9;

const MAV_TYPE_ONBOARD_CONTROLLER: u8 = 18;
const MAV_AUTOPILOT_INVALID: u8 = 8;
const MAVLINK_VERSION: u8 = 3;

/// HEARTBEAT payload announcing a non-autopilot onboard controller.
pub fn heartbeat_payload() -> [u8; HEARTBEAT_PAYLOAD_LEN] {
    let mut payload = [0u8; HEARTBEAT_PAYLOAD_LEN];
    // custom_mode (u32 LE) stays zero
    payload[4] = MAV_TYPE_ONBOARD_CONTROLLER;
    payload[5] = MAV_AUTOPILOT_INVALID;
    payload[6] = 0; // base_mode
    payload[7] = 0; // system_status
    payload[8] = MAVLINK_VERSION;
    payload
}

/// Encode one HEARTBEAT frame.
pub fn encode_heartbeat(sequence: u8, system_id: u8, component_id: u8, version: WireVersion) -> Bytes {
    let hdr = FrameHeader { sequence, system_id, component_id };
    let mut dst = BytesMut::with_capacity(1 + version.header_len() + HEARTBEAT_PAYLOAD_LEN + 2);
    frame::write_frame(
        &mut dst,
        version,
        hdr,
        MSG_ID_HEARTBEAT,
        &heartbeat_payload(),
        HEARTBEAT_CRC_EXTRA,
    );
    dst.freeze()
}

/// Stateful heartbeat source: owns our identity and the outgoing sequence.
#[derive(Debug, Clone)]
pub struct HeartbeatEncoder {
    system_id: u8,
    component_id: u8,
    sequence: u8,
}

impl HeartbeatEncoder {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self { system_id, component_id, sequence: 0 }
    }

    /// Sequence number the next frame will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn next_frame(&mut self, version: WireVersion) -> Bytes {
        let frame = encode_heartbeat(self.sequence, self.system_id, self.component_id, version);
        self.sequence = self.sequence.wrapping_add(1);
        frame
    }
}
