//! Narrow capability interface over the device's Wi-Fi radio.

use std::net::Ipv4Addr;

use crate::error::RadioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Off,
    Station,
    AccessPoint,
    AccessPointStation,
}

impl RadioMode {
    pub fn supports_station(self) -> bool {
        matches!(self, Self::Station | Self::AccessPointStation)
    }

    /// The closest mode that can associate with a network without dropping
    /// an access point that is already up.
    pub fn with_station(self) -> Self {
        match self {
            Self::Off | Self::Station => Self::Station,
            Self::AccessPoint | Self::AccessPointStation => Self::AccessPointStation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Scanning,
    NoSsidAvailable,
    Connected,
    ConnectFailed,
    ConnectionLost,
    Disconnected,
}

impl LinkStatus {
    /// Statuses after which waiting longer will not produce an association.
    pub fn is_permanent_failure(self) -> bool {
        matches!(self, Self::NoSsidAvailable | Self::ConnectFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Scanning => "SCANNING",
            Self::NoSsidAvailable => "NO_SSID_AVAILABLE",
            Self::Connected => "CONNECTED",
            Self::ConnectFailed => "CONNECT_FAILED",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Open,
    Wep,
    Wpa,
    Wpa2,
    WpaWpa2,
    Wpa2Enterprise,
    Wpa3,
    Wpa2Wpa3,
    Other,
}

impl Security {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub ssid: String,
    pub rssi_dbm: i32,
    pub security: Security,
}

pub trait Radio {
    fn mode(&self) -> RadioMode;

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError>;

    /// Assigns the static address the access point interface serves from.
    fn configure_access_point(
        &mut self,
        ip: Ipv4Addr,
        gateway: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), RadioError>;

    /// Starts broadcasting an open access point and returns the address it
    /// actually came up on.
    fn start_access_point(&mut self, ssid: &str) -> Result<Ipv4Addr, RadioError>;

    /// Drops any station association while keeping the driver's stored
    /// credentials.
    fn disconnect(&mut self) -> Result<(), RadioError>;

    /// Issues a non-blocking join request. An empty password joins an open
    /// network.
    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    fn status(&mut self) -> LinkStatus;

    /// Blocking scan, results in driver order.
    fn scan(&mut self) -> Result<Vec<ScanRecord>, RadioError>;

    fn station_ip(&self) -> Option<Ipv4Addr>;
}
