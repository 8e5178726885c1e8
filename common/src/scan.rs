use log::{debug, info, warn};

use crate::{
    config::ProvisionerConfig,
    radio::Radio,
    signal::quantize_rssi,
    types::{NetworkEntry, NetworkListing},
};

/// Runs a blocking scan and converts every access point seen into a portal
/// entry. Scan failures surface as an empty list.
pub fn scan_networks<R: Radio + ?Sized>(radio: &mut R) -> Vec<NetworkEntry> {
    info!("starting network scan");

    let records = match radio.scan() {
        Ok(records) => records,
        Err(err) => {
            warn!("network scan failed: {err}");
            return Vec::new();
        }
    };

    if records.is_empty() {
        warn!("no networks found during scan");
        return Vec::new();
    }

    info!("found {} networks", records.len());

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let entry = NetworkEntry {
                level: quantize_rssi(record.rssi_dbm),
                secured: !record.security.is_open(),
                ssid: record.ssid,
            };
            debug!(
                "  [{index}] ssid `{}` rssi {} dBm (level {}) authmode {}",
                entry.ssid,
                record.rssi_dbm,
                entry.level,
                entry.authmode()
            );
            entry
        })
        .collect()
}

pub fn build_listing(config: &ProvisionerConfig, network: Vec<NetworkEntry>) -> NetworkListing {
    NetworkListing {
        show_code: config.show_input_field,
        show_login: config.show_login_fields,
        network,
    }
}
