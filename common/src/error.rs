use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("radio driver error: {0}")]
    Driver(String),
    #[error("ssid `{0}` is not valid for this radio")]
    InvalidSsid(String),
    #[error("password is not valid for this radio")]
    InvalidPassword,
    #[error("radio scan failed: {0}")]
    Scan(String),
}

/// Setup failures that abort `ProvisioningSession::start`.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("session already started")]
    AlreadyStarted,
    #[error("failed to switch radio into AP+STA mode")]
    ModeSwitch(#[source] RadioError),
    #[error("failed to configure access point address")]
    ApConfig(#[source] RadioError),
    #[error("failed to start access point `{ssid}`")]
    ApStart {
        ssid: String,
        #[source]
        source: RadioError,
    },
    #[error("failed to start dns responder on port {port}")]
    DnsStart {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("failed to start http listener on port {port}")]
    HttpStart {
        port: u16,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("connection closed before a full request was received")]
    Incomplete,
    #[error("malformed request: {0}")]
    Malformed(&'static str),
    #[error("request headers exceed {0} bytes")]
    HeadersTooLarge(usize),
    #[error("request body of {0} bytes is too large")]
    BodyTooLarge(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("request has no body")]
    MissingBody,
    #[error("invalid configure payload")]
    Malformed(#[from] serde_json::Error),
    #[error("ssid is missing or empty")]
    MissingSsid,
}
