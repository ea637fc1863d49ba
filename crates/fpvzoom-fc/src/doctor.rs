use anyhow::Result;

use crate::FcConfig;

pub fn check_fc(cfg: &FcConfig) -> Result<()> {
    anyhow::ensure!(!cfg.serial_dev.is_empty(), "fc.serial_dev is empty");
    anyhow::ensure!(cfg.baud > 0, "fc.baud must be non-zero");
    anyhow::ensure!(cfg.heartbeat_interval_ms > 0, "fc.heartbeat_interval_ms must be non-zero");
    anyhow::ensure!(
        cfg.handshake_poll_ms < cfg.heartbeat_interval_ms,
        "fc.handshake_poll_ms must be below fc.heartbeat_interval_ms"
    );
    anyhow::ensure!(
        cfg.poll_ms < cfg.heartbeat_interval_ms,
        "fc.poll_ms must be below fc.heartbeat_interval_ms"
    );
    anyhow::ensure!(cfg.max_payload >= 9, "fc.max_payload too small for HEARTBEAT");
    Ok(())
}
