use log::{debug, info, warn};

use crate::{
    board::Board,
    config::PortalNetworkConfig,
    radio::{LinkStatus, Radio},
    types::{ConnectionOutcome, FailureReason},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTiming {
    pub timeout_ms: u64,
    pub poll_ms: u64,
    /// Pause after a radio mode change.
    pub settle_ms: u64,
}

impl From<&PortalNetworkConfig> for AttemptTiming {
    fn from(network: &PortalNetworkConfig) -> Self {
        Self {
            timeout_ms: network.connect_timeout_ms,
            poll_ms: network.poll_interval_ms,
            settle_ms: network.wifi_delay_ms,
        }
    }
}

/// Tries to associate with `ssid` and blocks until the join resolves or
/// `timing.timeout_ms` elapses. A failed attempt leaves the radio as it is.
pub fn attempt<R, B>(
    radio: &mut R,
    board: &B,
    ssid: &str,
    password: &str,
    timing: AttemptTiming,
) -> ConnectionOutcome
where
    R: Radio + ?Sized,
    B: Board + ?Sized,
{
    let mode = radio.mode();
    if !mode.supports_station() {
        let target = mode.with_station();
        debug!("switching radio from {mode:?} to {target:?} to join `{ssid}`");
        if let Err(err) = radio.set_mode(target) {
            warn!("failed to enable station mode: {err}");
            return ConnectionOutcome::Failed(FailureReason::Unknown);
        }
        board.delay_ms(timing.settle_ms);
    }

    info!(
        "joining `{ssid}` (password {})",
        if password.is_empty() { "none" } else { "***" }
    );
    if let Err(err) = radio.begin(ssid, password) {
        warn!("radio rejected join request for `{ssid}`: {err}");
        return ConnectionOutcome::Failed(FailureReason::Unknown);
    }

    let started = board.now_ms();
    loop {
        let status = radio.status();
        if status == LinkStatus::Connected {
            info!("connected to `{ssid}`");
            return ConnectionOutcome::Connected;
        }
        if status.is_permanent_failure() {
            warn!("join `{ssid}` failed: {}", status.as_str());
            return ConnectionOutcome::Failed(FailureReason::Ssid);
        }

        let elapsed = board.now_ms().saturating_sub(started);
        if elapsed >= timing.timeout_ms {
            warn!(
                "join `{ssid}` timed out after {elapsed} ms (last status {})",
                status.as_str()
            );
            return ConnectionOutcome::TimedOut;
        }

        debug!("waiting for `{ssid}`: {} after {elapsed} ms", status.as_str());
        board.delay_ms(timing.poll_ms);
    }
}
