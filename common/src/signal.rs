pub const RSSI_FLOOR_DBM: i32 = -100;
pub const RSSI_CEILING_DBM: i32 = -55;
pub const MAX_SIGNAL_LEVEL: u8 = 4;

/// Maps a raw RSSI reading in dBm onto the portal's 0..=4 signal bars.
///
/// Anything strictly above the floor shows at least one bar.
pub fn quantize_rssi(rssi_dbm: i32) -> u8 {
    if rssi_dbm <= RSSI_FLOOR_DBM {
        return 0;
    }
    if rssi_dbm >= RSSI_CEILING_DBM {
        return MAX_SIGNAL_LEVEL;
    }

    let input_range = (RSSI_CEILING_DBM - RSSI_FLOOR_DBM) as f32;
    let offset = (rssi_dbm - RSSI_FLOOR_DBM) as f32;
    let level = (offset * f32::from(MAX_SIGNAL_LEVEL) / input_range).round() as u8;
    level.clamp(1, MAX_SIGNAL_LEVEL)
}
