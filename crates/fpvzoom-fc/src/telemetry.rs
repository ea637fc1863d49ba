//! Heartbeat cadence, handshake and STATUSTEXT dispatch over one blocking
//! read call.
//!
//! Both phases share a single tick: send a heartbeat if one is due, then
//! block on the transport for no longer than the phase's poll interval or
//! the time left until the next heartbeat, whichever is shorter.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use fpvzoom_cam::{CropController, ProcessRunner};
use fpvzoom_proto::{
    Feed, FrameParser, HeartbeatEncoder, Message, StatusText, WireVersion, MSG_ID_HEARTBEAT,
};

use crate::link::Transport;
use crate::state::LinkStats;
use crate::{FcConfig, ProtocolPreference};

const READ_BUF_LEN: usize = 512;
const STATS_EVERY_HEARTBEATS: u64 = 30;

#[derive(Debug, Clone)]
pub struct HeartbeatTimer {
    interval: Duration,
    last: Option<Instant>,
}

impl HeartbeatTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn due(&self, now: Instant) -> bool {
        self.last.map_or(true, |t| now.duration_since(t) >= self.interval)
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Make the next check due immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            None => Duration::ZERO,
            Some(t) => self.interval.saturating_sub(now.duration_since(t)),
        }
    }
}

/// Receiver of link events once the FC has been seen.
pub trait CommandSink {
    /// Called once when the handshake completes.
    fn link_established(&mut self);

    /// Called for every single-chunk STATUSTEXT.
    fn dispatch(&mut self, text: &StatusText);
}

impl<R: ProcessRunner> CommandSink for CropController<R> {
    fn link_established(&mut self) {
        match self.reset_to_default() {
            Ok(edit) => info!(crop = %self.crop(), ?edit, "default crop applied"),
            Err(e) => warn!("default crop not applied: {:#}", e),
        }
    }

    fn dispatch(&mut self, text: &StatusText) {
        match self.handle_text(&text.text) {
            None => debug!("not a command: {:?}", text.text),
            Some(Ok(outcome)) => info!(?outcome, "command {} done", text.text),
            Some(Err(e)) => warn!("command {} failed: {:#}", text.text, e),
        }
    }
}

/// Who answered the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub system_id: u8,
    pub component_id: u8,
    pub version: WireVersion,
}

pub struct TelemetryLoop<T: Transport> {
    transport: T,
    parser: FrameParser,
    heartbeat: HeartbeatEncoder,
    timer: HeartbeatTimer,
    preference: ProtocolPreference,
    version: WireVersion,
    handshake_poll: Duration,
    poll: Duration,
    stats: LinkStats,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport> TelemetryLoop<T> {
    pub fn new(transport: T, cfg: &FcConfig) -> Self {
        Self {
            transport,
            parser: FrameParser::with_max_payload(cfg.max_payload),
            heartbeat: HeartbeatEncoder::new(cfg.sys_id, cfg.comp_id),
            timer: HeartbeatTimer::new(cfg.heartbeat_interval()),
            preference: cfg.protocol,
            version: cfg.protocol.initial_version(),
            handshake_poll: cfg.handshake_poll(),
            poll: cfg.poll(),
            stats: LinkStats::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned stop flag.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Setting the flag makes the loop return `Ok` at the next tick.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Framing used for outgoing heartbeats.
    pub fn version(&self) -> WireVersion {
        self.version
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Handshake, then steady state until the transport fails or shutdown
    /// is requested.
    pub fn run<S: CommandSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        anyhow::ensure!(
            !self.timer.interval.is_zero(),
            "heartbeat interval must be non-zero"
        );
        let Some(peer) = self.handshake()? else {
            return Ok(());
        };
        info!(
            sys = peer.system_id,
            comp = peer.component_id,
            version = ?peer.version,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected(),
            "FC heartbeat seen, link up"
        );
        sink.link_established();
        self.run_steady(sink)
    }

    /// Wait for the first HEARTBEAT. `None` if shut down first.
    pub fn handshake(&mut self) -> Result<Option<Peer>> {
        info!("waiting for heartbeat");
        let mut buf = [0u8; READ_BUF_LEN];
        while !self.stopping() {
            let n = self.tick(self.handshake_poll, &mut buf)?;
            for &byte in &buf[..n] {
                let Some(msg) = self.decode(byte) else { continue };
                if msg.msgid == MSG_ID_HEARTBEAT {
                    // bytes after the heartbeat in this read are dropped with the parser state
                    self.parser.reset();
                    self.timer.reset();
                    return Ok(Some(Peer {
                        system_id: msg.system_id,
                        component_id: msg.component_id,
                        version: msg.version,
                    }));
                }
            }
        }
        Ok(None)
    }

    pub fn run_steady<S: CommandSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        let mut buf = [0u8; READ_BUF_LEN];
        while !self.stopping() {
            let n = self.tick(self.poll, &mut buf)?;
            for &byte in &buf[..n] {
                let Some(msg) = self.decode(byte) else { continue };
                let Some(st) = StatusText::from_message(&msg) else { continue };
                if !st.is_single_chunk() {
                    debug!(id = st.id, chunk = st.chunk_seq, "dropping STATUSTEXT continuation");
                    continue;
                }
                info!(
                    severity = st.severity,
                    id = st.id,
                    chunk = st.chunk_seq,
                    text = %st.text,
                    "STATUSTEXT"
                );
                sink.dispatch(&st);
            }
        }
        info!("telemetry loop stopped");
        Ok(())
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn tick(&mut self, poll: Duration, buf: &mut [u8]) -> Result<usize> {
        let now = Instant::now();
        if self.timer.due(now) {
            self.send_heartbeat(now)?;
        }
        let timeout = poll.min(self.timer.remaining(Instant::now()));
        let n = self.transport.poll_read(buf, timeout).context("fc serial read")?;
        if n > 0 {
            trace!("rx {}", hex::encode(&buf[..n]));
        }
        Ok(n)
    }

    fn send_heartbeat(&mut self, now: Instant) -> Result<()> {
        let frame = self.heartbeat.next_frame(self.version);
        self.transport.write_all(&frame).context("fc serial write")?;
        self.timer.mark(now);
        self.stats.heartbeats_sent += 1;
        trace!("tx {}", hex::encode(&frame));

        if self.stats.heartbeats_sent % STATS_EVERY_HEARTBEATS == 0 {
            debug!(
                accepted = self.stats.accepted,
                oversized = self.stats.rejected_oversized,
                unknown = self.stats.rejected_unknown,
                checksum = self.stats.rejected_checksum,
                gaps = self.stats.sequence_gaps,
                heartbeats = self.stats.heartbeats_sent,
                fc_hb_age = ?self.stats.hb_age(),
                "link stats"
            );
        }
        Ok(())
    }

    fn decode(&mut self, byte: u8) -> Option<Message> {
        match self.parser.feed(byte) {
            Feed::NeedMore => None,
            Feed::Rejected(reason) => {
                debug!("frame rejected: {}", reason);
                self.stats.record_reject(&reason);
                None
            }
            Feed::Ready(msg) => {
                self.stats.record_accept(&msg);
                if self.preference == ProtocolPreference::Auto
                    && msg.version == WireVersion::V2
                    && self.version == WireVersion::V1
                {
                    info!("FC speaks MAVLink v2, switching heartbeats to v2");
                    self.version = WireVersion::V2;
                }
                Some(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_is_due_before_first_mark() {
        let t = HeartbeatTimer::new(Duration::from_secs(1));
        let now = Instant::now();
        assert!(t.due(now));
        assert_eq!(t.remaining(now), Duration::ZERO);
    }

    #[test]
    fn timer_waits_full_interval() {
        let mut t = HeartbeatTimer::new(Duration::from_secs(1));
        let start = Instant::now();
        t.mark(start);
        assert!(!t.due(start + Duration::from_millis(999)));
        assert_eq!(t.remaining(start + Duration::from_millis(400)), Duration::from_millis(600));
        assert!(t.due(start + Duration::from_secs(1)));
        assert_eq!(t.remaining(start + Duration::from_secs(3)), Duration::ZERO);
        t.reset();
        assert!(t.due(start));
    }
}
