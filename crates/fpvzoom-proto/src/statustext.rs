use crate::frame::Message;
use crate::MSG_ID_STATUSTEXT;

pub const TEXT_LEN: usize = 50;
/// severity + text + id (u16) + chunk_seq
pub const FULL_PAYLOAD_LEN: usize = 1 + TEXT_LEN + 2 + 1;

/// Decoded STATUSTEXT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    pub severity: u8,
    pub text: String,
    /// Non-zero when the text is part of a multi-chunk sequence.
    pub id: u16,
    pub chunk_seq: u8,
}

impl StatusText {
    /// Extract the text from a STATUSTEXT message. Other msgids and empty
    /// payloads yield `None`.
    ///
    /// Short payloads (v2 zero-truncation, or v1 without extension fields)
    /// carry no id/chunk and are treated as chunk 0. The text ends at the
    /// first NUL or newline.
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.msgid != MSG_ID_STATUSTEXT {
            return None;
        }
        let payload = msg.payload.as_ref();
        let (&severity, rest) = payload.split_first()?;

        let (raw, id, chunk_seq) = if payload.len() >= FULL_PAYLOAD_LEN {
            let id = u16::from_le_bytes([payload[51], payload[52]]);
            (&rest[..TEXT_LEN], id, payload[53])
        } else {
            (&rest[..rest.len().min(TEXT_LEN)], 0, 0)
        };

        let end = raw
            .iter()
            .position(|&b| b == b'\n' || b == 0)
            .unwrap_or(raw.len());
        let text = String::from_utf8_lossy(&raw[..end]).into_owned();

        Some(Self { severity, text, id, chunk_seq })
    }

    /// Only the first chunk is treated as a complete command.
    pub fn is_single_chunk(&self) -> bool {
        self.chunk_seq == 0
    }
}
