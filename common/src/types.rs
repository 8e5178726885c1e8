use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Configuring,
    Connecting,
    Succeeded,
    Failed,
    Stopped,
}

/// Failure reason reported to the portal UI in `{success: false, reason}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    Ssid,
    Code,
    Login,
    Unknown,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ssid => "ssid",
            Self::Code => "code",
            Self::Login => "login",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Connected,
    Failed(FailureReason),
    TimedOut,
}

impl ConnectionOutcome {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEntry {
    pub ssid: String,
    #[serde(rename = "rssi")]
    pub level: u8,
    #[serde(rename = "authmode", serialize_with = "serialize_authmode")]
    pub secured: bool,
}

impl NetworkEntry {
    pub fn authmode(&self) -> u8 {
        u8::from(self.secured)
    }
}

fn serialize_authmode<S: serde::Serializer>(secured: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*secured))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProvisioningSubmission {
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub service_password: Option<String>,
}

impl ProvisioningSubmission {
    /// Returns the SSID when it is present and non-empty.
    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref().filter(|ssid| !ssid.is_empty())
    }

    pub fn into_credentials(self) -> Credentials {
        Credentials {
            ssid: self.ssid.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            code: self.code.unwrap_or_default(),
            username: self.username.unwrap_or_default(),
            service_password: self.service_password.unwrap_or_default(),
        }
    }
}

/// Accepted configuration handed to the success hook. Fields that were not
/// submitted are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
    pub code: String,
    pub username: String,
    pub service_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkListing {
    pub show_code: bool,
    pub show_login: bool,
    pub network: Vec<NetworkEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfigureReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl ConfigureReply {
    pub fn success() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn failure(reason: FailureReason) -> Self {
        Self {
            success: false,
            reason: Some(reason),
        }
    }
}
