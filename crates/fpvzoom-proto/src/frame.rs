//! MAVLink v1/v2 framing.
//!
//! ```text
//! v1: STX(0xFE) LEN SEQ SYS COMP MSGID                    PAYLOAD CRC_LO CRC_HI
//! v2: STX(0xFD) LEN INCOMPAT COMPAT SEQ SYS COMP MSGID[3] PAYLOAD CRC_LO CRC_HI [SIGNATURE(13)]
//! ```
//!
//! The checksum covers everything after STX up to the end of the payload,
//! followed by the per-message extra byte (see [`crate::crc_extra`]).

use bytes::{BufMut, Bytes, BytesMut};

use crate::crc;

pub const STX_V1: u8 = 0xFE;
pub const STX_V2: u8 = 0xFD;
pub const HEADER_LEN_V1: usize = 5;
pub const HEADER_LEN_V2: usize = 9;
pub const SIGNATURE_LEN: usize = 13;
pub const MAX_PAYLOAD_LEN: usize = 255;

const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireVersion {
    V1,
    V2,
}

impl WireVersion {
    pub fn stx(self) -> u8 {
        match self {
            WireVersion::V1 => STX_V1,
            WireVersion::V2 => STX_V2,
        }
    }

    /// Header length excluding the sync byte.
    pub fn header_len(self) -> usize {
        match self {
            WireVersion::V1 => HEADER_LEN_V1,
            WireVersion::V2 => HEADER_LEN_V2,
        }
    }

    fn from_stx(byte: u8) -> Option<Self> {
        match byte {
            STX_V2 => Some(WireVersion::V2),
            STX_V1 => Some(WireVersion::V1),
            _ => None,
        }
    }
}

/// A checksum-verified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msgid: u32,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub payload: Bytes,
    pub version: WireVersion,
    pub signed: bool,
}

/// Why a complete (or partially read) frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("declared payload length {len} exceeds {max}")]
    Oversized { len: usize, max: usize },

    #[error("no crc extra known for msgid {0}")]
    UnknownMessage(u32),

    #[error("checksum mismatch (computed {computed:#06x}, received {received:#06x})")]
    BadChecksum { computed: u16, received: u16 },
}

/// Result of feeding one byte to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    NeedMore,
    Rejected(RejectReason),
    Ready(Message),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitSync,
    Header,
    Payload,
    ChecksumLow,
    ChecksumHigh,
    Signature,
}

/// Byte-at-a-time frame decoder.
///
/// Any completed or rejected frame returns the parser to
/// [`ParserState::AwaitSync`] with no partial state carried over.
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    version: WireVersion,
    header: [u8; HEADER_LEN_V2],
    header_pos: usize,
    payload: BytesMut,
    payload_len: usize,
    crc_received: u16,
    signed: bool,
    signature_pos: usize,
    max_payload: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_LEN)
    }

    /// Parser that rejects frames declaring more than `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        let max_payload = max_payload.min(MAX_PAYLOAD_LEN);
        Self {
            state: ParserState::AwaitSync,
            version: WireVersion::V2,
            header: [0; HEADER_LEN_V2],
            header_pos: 0,
            payload: BytesMut::with_capacity(max_payload),
            payload_len: 0,
            crc_received: 0,
            signed: false,
            signature_pos: 0,
            max_payload,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ParserState::AwaitSync;
        self.header_pos = 0;
        self.payload.clear();
        self.payload_len = 0;
        self.crc_received = 0;
        self.signed = false;
        self.signature_pos = 0;
    }

    pub fn feed(&mut self, byte: u8) -> Feed {
        match self.state {
            ParserState::AwaitSync => {
                if let Some(version) = WireVersion::from_stx(byte) {
                    self.reset();
                    self.version = version;
                    self.state = ParserState::Header;
                }
                Feed::NeedMore
            }
            ParserState::Header => {
                self.header[self.header_pos] = byte;
                self.header_pos += 1;
                if self.header_pos < self.version.header_len() {
                    return Feed::NeedMore;
                }

                let len = self.header[0] as usize;
                if len > self.max_payload {
                    self.reset();
                    return Feed::Rejected(RejectReason::Oversized { len, max: self.max_payload });
                }
                self.payload_len = len;
                self.signed = self.version == WireVersion::V2
                    && self.header[1] & INCOMPAT_FLAG_SIGNED != 0;
                self.state = if len > 0 { ParserState::Payload } else { ParserState::ChecksumLow };
                Feed::NeedMore
            }
            ParserState::Payload => {
                self.payload.put_u8(byte);
                if self.payload.len() == self.payload_len {
                    self.state = ParserState::ChecksumLow;
                }
                Feed::NeedMore
            }
            ParserState::ChecksumLow => {
                self.crc_received = byte as u16;
                self.state = ParserState::ChecksumHigh;
                Feed::NeedMore
            }
            ParserState::ChecksumHigh => {
                self.crc_received |= (byte as u16) << 8;
                if self.signed {
                    self.signature_pos = 0;
                    self.state = ParserState::Signature;
                    Feed::NeedMore
                } else {
                    self.finish()
                }
            }
            ParserState::Signature => {
                // signature contents are not verified
                self.signature_pos += 1;
                if self.signature_pos == SIGNATURE_LEN {
                    self.finish()
                } else {
                    Feed::NeedMore
                }
            }
        }
    }

    /// Feed a chunk, yielding only completed or rejected frames.
    pub fn frames<'a>(
        &'a mut self,
        bytes: &'a [u8],
    ) -> impl Iterator<Item = Result<Message, RejectReason>> + 'a {
        bytes.iter().filter_map(move |&b| match self.feed(b) {
            Feed::NeedMore => None,
            Feed::Rejected(reason) => Some(Err(reason)),
            Feed::Ready(msg) => Some(Ok(msg)),
        })
    }

    fn finish(&mut self) -> Feed {
        let header = &self.header[..self.version.header_len()];
        let (sequence, system_id, component_id, msgid) = match self.version {
            WireVersion::V2 => (
                header[3],
                header[4],
                header[5],
                u32::from_le_bytes([header[6], header[7], header[8], 0]),
            ),
            WireVersion::V1 => (header[1], header[2], header[3], header[4] as u32),
        };

        let outcome = match crate::crc_extra(msgid) {
            None => Feed::Rejected(RejectReason::UnknownMessage(msgid)),
            Some(extra) => {
                let computed = crc::frame_checksum(header, &self.payload, extra);
                if computed == self.crc_received {
                    Feed::Ready(Message {
                        msgid,
                        sequence,
                        system_id,
                        component_id,
                        payload: self.payload.split().freeze(),
                        version: self.version,
                        signed: self.signed,
                    })
                } else {
                    Feed::Rejected(RejectReason::BadChecksum {
                        computed,
                        received: self.crc_received,
                    })
                }
            }
        };
        self.reset();
        outcome
    }
}

/// Addressing fields shared by both wire versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),

    #[error("msgid {0} cannot be expressed in v1 framing")]
    MsgIdOutOfRange(u32),

    #[error("no crc extra known for msgid {0}")]
    UnknownMessage(u32),
}

/// Encode an unsigned frame for a message with a known crc extra.
pub fn encode_frame(
    version: WireVersion,
    hdr: FrameHeader,
    msgid: u32,
    payload: &[u8],
) -> Result<Bytes, EncodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadTooLarge(payload.len()));
    }
    let limit = match version {
        WireVersion::V1 => u8::MAX as u32,
        WireVersion::V2 => 0x00FF_FFFF,
    };
    if msgid > limit {
        return Err(EncodeError::MsgIdOutOfRange(msgid));
    }
    let extra = crate::crc_extra(msgid).ok_or(EncodeError::UnknownMessage(msgid))?;

    let mut dst = BytesMut::with_capacity(1 + HEADER_LEN_V2 + payload.len() + 2);
    write_frame(&mut dst, version, hdr, msgid, payload, extra);
    Ok(dst.freeze())
}

/// Caller guarantees `payload.len() <= MAX_PAYLOAD_LEN` and a msgid that fits `version`.
pub(crate) fn write_frame(
    dst: &mut BytesMut,
    version: WireVersion,
    hdr: FrameHeader,
    msgid: u32,
    payload: &[u8],
    extra: u8,
) {
    let start = dst.len();
    dst.put_u8(version.stx());
    dst.put_u8(payload.len() as u8);
    match version {
        WireVersion::V2 => {
            dst.put_u8(0); // incompat
            dst.put_u8(0); // compat
            dst.put_u8(hdr.sequence);
            dst.put_u8(hdr.system_id);
            dst.put_u8(hdr.component_id);
            dst.put_slice(&msgid.to_le_bytes()[..3]);
        }
        WireVersion::V1 => {
            dst.put_u8(hdr.sequence);
            dst.put_u8(hdr.system_id);
            dst.put_u8(hdr.component_id);
            dst.put_u8(msgid as u8);
        }
    }
    let header_end = dst.len();
    dst.put_slice(payload);

    let crc = crc::frame_checksum(&dst[start + 1..header_end], payload, extra);
    dst.put_u16_le(crc);
}
