use std::collections::HashMap;
use std::time::{Duration, Instant};

use fpvzoom_proto::{Message, RejectReason, MSG_ID_HEARTBEAT};

/// Running counters for the FC link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub accepted: u64,
    pub rejected_oversized: u64,
    pub rejected_unknown: u64,
    pub rejected_checksum: u64,
    pub heartbeats_sent: u64,
    /// Frames whose sequence did not follow the previous one from the same
    /// source. Informational only.
    pub sequence_gaps: u64,
    pub last_heartbeat: Option<Instant>,
    /// Last sequence per (system, component).
    last_seq: HashMap<(u8, u8), u8>,
}

impl LinkStats {
    pub fn record_accept(&mut self, msg: &Message) {
        self.accepted += 1;
        let source = (msg.system_id, msg.component_id);
        if let Some(prev) = self.last_seq.insert(source, msg.sequence) {
            if msg.sequence != prev.wrapping_add(1) {
                self.sequence_gaps += 1;
            }
        }
        if msg.msgid == MSG_ID_HEARTBEAT {
            self.last_heartbeat = Some(Instant::now());
        }
    }

    pub fn record_reject(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::Oversized { .. } => self.rejected_oversized += 1,
            RejectReason::UnknownMessage(_) => self.rejected_unknown += 1,
            RejectReason::BadChecksum { .. } => self.rejected_checksum += 1,
        }
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_oversized + self.rejected_unknown + self.rejected_checksum
    }

    /// Time since the FC's last heartbeat.
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }
}
