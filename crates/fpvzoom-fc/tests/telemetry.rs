use std::collections::VecDeque;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fpvzoom_cam::{CamConfig, ConfigDocument, CropController, FieldKey, ProcessRunner};
use fpvzoom_fc::{FcConfig, ProtocolPreference, TelemetryLoop, Transport};
use fpvzoom_proto::frame::{encode_frame, FrameHeader};
use fpvzoom_proto::heartbeat::encode_heartbeat;
use fpvzoom_proto::{FrameParser, WireVersion, MSG_ID_HEARTBEAT, MSG_ID_STATUSTEXT};

enum Step {
    Rx(Vec<u8>),
    Idle,
}

/// Plays back reads in order. When the script runs out it either fails the
/// read or raises the shutdown flag.
struct ScriptedLink {
    steps: VecDeque<Step>,
    written: Vec<u8>,
    /// Timeout passed to every read, in call order.
    timeouts: Vec<Duration>,
    stop_on_drain: Option<Arc<AtomicBool>>,
}

impl ScriptedLink {
    fn new(steps: Vec<Step>) -> Self {
        Self { steps: steps.into(), written: Vec::new(), timeouts: Vec::new(), stop_on_drain: None }
    }
}

impl Transport for ScriptedLink {
    fn poll_read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.timeouts.push(timeout);
        match self.steps.pop_front() {
            Some(Step::Rx(bytes)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(Step::Idle) => Ok(0),
            None => match &self.stop_on_drain {
                Some(flag) => {
                    flag.store(true, Ordering::Relaxed);
                    Ok(0)
                }
                None => Err(io::Error::new(ErrorKind::BrokenPipe, "link gone")),
            },
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }
}

#[derive(Default)]
struct Calls(Vec<Vec<String>>);

impl ProcessRunner for Calls {
    fn run(&mut self, argv: &[String]) -> anyhow::Result<()> {
        self.0.push(argv.to_vec());
        Ok(())
    }
}

const FC: FrameHeader = FrameHeader { sequence: 0, system_id: 1, component_id: 1 };

fn fc_heartbeat(version: WireVersion) -> Vec<u8> {
    encode_heartbeat(0, 1, 1, version).to_vec()
}

fn statustext(seq: u8, text: &str, id: u16, chunk: u8) -> Vec<u8> {
    let mut payload = vec![6u8];
    let mut raw = text.as_bytes().to_vec();
    raw.resize(50, 0);
    payload.extend_from_slice(&raw);
    payload.extend_from_slice(&id.to_le_bytes());
    payload.push(chunk);
    let hdr = FrameHeader { sequence: seq, ..FC };
    encode_frame(WireVersion::V2, hdr, MSG_ID_STATUSTEXT, &payload).unwrap().to_vec()
}

fn majestic(dir: &Path, yaml: &str) -> CropController<Calls> {
    let path = dir.join("majestic.yaml");
    fs::write(&path, yaml).unwrap();
    CropController::new(&CamConfig::default(), path, Calls::default()).unwrap()
}

fn crop_on_disk(ctl: &CropController<Calls>) -> Option<String> {
    ConfigDocument::load(ctl.path()).unwrap().field_value(&FieldKey::new("video1", "crop"))
}

/// Heartbeats we wrote, as (sequence, version).
fn sent_heartbeats(bytes: &[u8]) -> Vec<(u8, WireVersion)> {
    let mut parser = FrameParser::new();
    parser
        .frames(bytes)
        .map(|r| {
            let msg = r.unwrap();
            assert_eq!(msg.msgid, MSG_ID_HEARTBEAT);
            assert_eq!((msg.system_id, msg.component_id), (2, 191));
            (msg.sequence, msg.version)
        })
        .collect()
}

const YAML: &str = "system:\n  logLevel: info\nvideo1:\n  enabled: true\n  crop: 840x472x240x135\n  fps: 60\n";

#[test]
fn handshake_resets_crop_then_zoom_in_applies() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);

    let mut first = vec![0x00, 0x55, 0x13];
    first.extend(fc_heartbeat(WireVersion::V2));
    let link = ScriptedLink::new(vec![
        Step::Idle,
        Step::Rx(first),
        Step::Rx(statustext(1, "zoom_in", 0, 0)),
    ]);

    let mut lp = TelemetryLoop::new(link, &FcConfig::default());
    let err = lp.run(&mut ctl).unwrap_err();
    assert!(format!("{:#}", err).contains("fc serial read"));

    assert_eq!(ctl.level(), 1);
    assert_eq!(crop_on_disk(&ctl).as_deref(), Some("480x270x960x540"));
    assert_eq!(
        fs::read_to_string(ctl.path()).unwrap(),
        YAML.replace("840x472x240x135", "480x270x960x540")
    );
    // one reload per write: handshake default, then zoom_in
    assert_eq!(ctl.runner().0.len(), 2);

    let sent = sent_heartbeats(&lp.transport().written);
    assert!(sent.len() >= 2);
    assert_eq!(sent[0], (0, WireVersion::V1));
    assert_eq!(sent[1], (1, WireVersion::V2));
    assert_eq!(lp.version(), WireVersion::V2);
    assert_eq!(lp.stats().accepted, 2);
}

#[test]
fn handshake_inserts_missing_crop() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), "video1:\n  enabled: true\n");
    let link = ScriptedLink::new(vec![Step::Rx(fc_heartbeat(WireVersion::V1))]);

    let mut lp = TelemetryLoop::new(link, &FcConfig::default());
    assert!(lp.run(&mut ctl).is_err());
    assert_eq!(
        fs::read_to_string(ctl.path()).unwrap(),
        "video1:\n  crop: 0x0x1920x1080\n  enabled: true\n"
    );
    assert_eq!(lp.version(), WireVersion::V1);
}

#[test]
fn continuation_chunks_are_not_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let link = ScriptedLink::new(vec![
        Step::Rx(fc_heartbeat(WireVersion::V2)),
        Step::Rx(statustext(1, "zoom_in", 7, 1)),
        Step::Idle,
    ]);

    let mut lp = TelemetryLoop::new(link, &FcConfig::default());
    assert!(lp.run(&mut ctl).is_err());
    assert_eq!(ctl.level(), 0);
    assert_eq!(crop_on_disk(&ctl).as_deref(), Some("0x0x1920x1080"));
    assert_eq!(lp.stats().accepted, 2);
}

#[test]
fn corrupted_frame_does_not_block_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);

    let mut bad = statustext(1, "zoom_in", 0, 0);
    bad[12] ^= 0x20;
    let mut burst = bad;
    burst.extend(statustext(2, "zoom_in", 0, 0));
    burst.extend(statustext(3, "not_a_command", 0, 0));

    let link = ScriptedLink::new(vec![Step::Rx(fc_heartbeat(WireVersion::V2)), Step::Rx(burst)]);
    let mut lp = TelemetryLoop::new(link, &FcConfig::default());
    assert!(lp.run(&mut ctl).is_err());

    assert_eq!(ctl.level(), 1);
    assert_eq!(lp.stats().rejected_checksum, 1);
    assert_eq!(lp.stats().accepted, 3);
}

#[test]
fn zoom_out_at_default_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let link = ScriptedLink::new(vec![
        Step::Rx(fc_heartbeat(WireVersion::V2)),
        Step::Rx(statustext(1, "zoom_out", 0, 0)),
    ]);

    let mut lp = TelemetryLoop::new(link, &FcConfig::default());
    assert!(lp.run(&mut ctl).is_err());
    assert_eq!(ctl.level(), 0);
    // only the handshake write reloaded the service
    assert_eq!(ctl.runner().0.len(), 1);
}

#[test]
fn pinned_v1_ignores_peer_version() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let link = ScriptedLink::new(vec![Step::Rx(fc_heartbeat(WireVersion::V2)), Step::Idle]);

    let cfg = FcConfig { protocol: ProtocolPreference::V1, ..Default::default() };
    let mut lp = TelemetryLoop::new(link, &cfg);
    assert!(lp.run(&mut ctl).is_err());

    let sent = sent_heartbeats(&lp.transport().written);
    assert!(sent.len() >= 2);
    assert!(sent.iter().all(|&(_, v)| v == WireVersion::V1));
}

#[test]
fn shutdown_flag_ends_loop_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let flag = Arc::new(AtomicBool::new(false));
    let mut link = ScriptedLink::new(vec![
        Step::Rx(fc_heartbeat(WireVersion::V2)),
        Step::Rx(statustext(1, "zoom_in", 0, 0)),
    ]);
    link.stop_on_drain = Some(flag.clone());

    let mut lp = TelemetryLoop::new(link, &FcConfig::default()).with_shutdown(flag);
    lp.run(&mut ctl).unwrap();
    assert_eq!(ctl.level(), 1);
}

#[test]
fn shutdown_before_handshake_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let mut lp = TelemetryLoop::new(ScriptedLink::new(Vec::new()), &FcConfig::default());
    lp.shutdown_handle().store(true, Ordering::Relaxed);

    lp.run(&mut ctl).unwrap();
    assert!(lp.transport().written.is_empty());
    assert_eq!(fs::read_to_string(ctl.path()).unwrap(), YAML);
}

#[test]
fn statustext_before_heartbeat_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let link = ScriptedLink::new(vec![
        Step::Rx(statustext(0, "zoom_in", 0, 0)),
        Step::Idle,
        Step::Rx(fc_heartbeat(WireVersion::V2)),
        Step::Idle,
        Step::Idle,
    ]);

    let mut lp = TelemetryLoop::new(link, &FcConfig::default());
    assert!(lp.run(&mut ctl).is_err());

    assert_eq!(ctl.level(), 0);
    assert_eq!(crop_on_disk(&ctl).as_deref(), Some("0x0x1920x1080"));
    assert_eq!(ctl.runner().0.len(), 1);
    assert_eq!(lp.stats().accepted, 2);
}

#[test]
fn read_timeouts_follow_the_phase_poll() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let link = ScriptedLink::new(vec![
        Step::Idle,
        Step::Idle,
        Step::Rx(fc_heartbeat(WireVersion::V2)),
        Step::Idle,
        Step::Idle,
    ]);

    let mut lp = TelemetryLoop::new(link, &FcConfig::default());
    assert!(lp.run(&mut ctl).is_err());

    // three handshake reads, then steady reads until the script fails
    let timeouts = &lp.transport().timeouts;
    assert_eq!(timeouts.len(), 6);
    let (handshake, steady) = timeouts.split_at(3);
    assert!(handshake.iter().all(|&t| t == Duration::from_millis(200)), "{:?}", handshake);
    assert!(steady.iter().all(|&t| t == Duration::from_millis(100)), "{:?}", steady);
}

#[test]
fn read_timeout_never_outlasts_next_heartbeat() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let link = ScriptedLink::new(vec![
        Step::Idle,
        Step::Rx(fc_heartbeat(WireVersion::V2)),
        Step::Idle,
    ]);

    let cfg = FcConfig { heartbeat_interval_ms: 150, poll_ms: 400, ..Default::default() };
    let mut lp = TelemetryLoop::new(link, &cfg);
    assert!(lp.run(&mut ctl).is_err());

    let timeouts = &lp.transport().timeouts;
    assert_eq!(timeouts.len(), 4);
    assert!(timeouts.iter().all(|&t| t <= Duration::from_millis(150)), "{:?}", timeouts);
    assert!(timeouts.iter().all(|&t| t > Duration::ZERO), "{:?}", timeouts);
}

#[test]
fn zero_heartbeat_interval_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = majestic(dir.path(), YAML);
    let link = ScriptedLink::new(vec![Step::Rx(fc_heartbeat(WireVersion::V2))]);

    let cfg = FcConfig { heartbeat_interval_ms: 0, ..Default::default() };
    let mut lp = TelemetryLoop::new(link, &cfg);
    let err = lp.run(&mut ctl).unwrap_err();
    assert!(err.to_string().contains("heartbeat interval"));

    assert!(lp.transport().written.is_empty());
    assert!(lp.transport().timeouts.is_empty());
    assert_eq!(fs::read_to_string(ctl.path()).unwrap(), YAML);
}
