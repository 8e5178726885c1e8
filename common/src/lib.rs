pub mod access_point;
pub mod board;
pub mod config;
pub mod configure;
pub mod connect;
pub mod dns;
pub mod error;
pub mod http;
pub mod portal;
pub mod radio;
pub mod router;
pub mod scan;
pub mod session;
pub mod signal;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use board::{Board, StdBoard};
pub use config::{PortalNetworkConfig, ProvisionerConfig};
pub use error::{ProvisionError, RadioError, RequestError, SubmissionError};
pub use radio::{LinkStatus, Radio, RadioMode, ScanRecord, Security};
pub use session::{Hooks, ProvisioningSession, StopHandle};
pub use transport::{StdTransports, Transports};
pub use types::{
    ConnectionOutcome, Credentials, FailureReason, NetworkEntry, ProvisioningSubmission,
    SessionState,
};
