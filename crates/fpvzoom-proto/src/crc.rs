/// Seed for a fresh frame.
pub const CRC_INIT: u16 = 0xFFFF;

/// Accumulate the MAVLink X.25 checksum (CRC-16/MCRF4XX) over `buf`.
pub fn accumulate(buf: &[u8], mut crc: u16) -> u16 {
    for &byte in buf {
        let mut tmp = byte ^ (crc & 0xFF) as u8;
        tmp ^= tmp << 4;
        let tmp = tmp as u16;
        crc = (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4);
    }
    crc
}

/// Checksum of a complete frame: header without the sync byte, payload,
/// then the message's extra byte.
pub fn frame_checksum(header: &[u8], payload: &[u8], extra: u8) -> u16 {
    let crc = accumulate(header, CRC_INIT);
    let crc = accumulate(payload, crc);
    accumulate(&[extra], crc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_mcrf4xx_check_value() {
        assert_eq!(accumulate(b"123456789", CRC_INIT), 0x6F91);
    }

    #[test]
    fn empty_input_returns_seed() {
        assert_eq!(accumulate(&[], CRC_INIT), CRC_INIT);
        assert_eq!(accumulate(&[], 0x1234), 0x1234);
    }

    #[test]
    fn accumulation_is_incremental() {
        let whole = accumulate(b"zoom_in\n", CRC_INIT);
        let split = accumulate(b"\n", accumulate(b"zoom_in", CRC_INIT));
        assert_eq!(whole, split);
    }

    #[test]
    fn heartbeat_v2_reference_checksum() {
        let header = [9, 0, 0, 0, 2, 191, 0, 0, 0];
        let payload = [0, 0, 0, 0, 18, 8, 0, 0, 3];
        assert_eq!(frame_checksum(&header, &payload, 50), 0x7DB1);
    }
}
