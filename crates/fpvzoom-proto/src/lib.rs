//! Minimal MAVLink framing for the camera companion: X.25 checksum, a
//! byte-at-a-time v1/v2 frame parser, HEARTBEAT encoding and STATUSTEXT
//! extraction. Only HEARTBEAT and STATUSTEXT carry meaning here.

pub mod crc;
pub mod frame;
pub mod heartbeat;
pub mod statustext;

pub use frame::{Feed, FrameParser, Message, RejectReason, WireVersion};
pub use heartbeat::HeartbeatEncoder;
pub use statustext::StatusText;

pub const MSG_ID_HEARTBEAT: u32 = 0;
pub const MSG_ID_STATUSTEXT: u32 = 253;

/// Per-message CRC seed byte, folded in after the payload.
/// Messages without an entry cannot be validated and are dropped.
pub fn crc_extra(msgid: u32) -> Option<u8> {
    match msgid {
        MSG_ID_HEARTBEAT => Some(50),
        MSG_ID_STATUSTEXT => Some(83),
        _ => None,
    }
}
