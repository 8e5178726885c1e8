use std::net::Ipv4Addr;

use log::{debug, info, warn};

use crate::{
    board::Board,
    config::ProvisionerConfig,
    error::ProvisionError,
    radio::{Radio, RadioMode},
    transport::Transports,
};

/// Owns the soft-AP side of a session: the DNS responder and HTTP listener
/// bound to the access point address.
pub struct AccessPointManager<T: Transports> {
    dns: Option<T::Dns>,
    http: Option<T::Http>,
    ap_ip: Option<Ipv4Addr>,
}

impl<T: Transports> Default for AccessPointManager<T> {
    fn default() -> Self {
        Self {
            dns: None,
            http: None,
            ap_ip: None,
        }
    }
}

impl<T: Transports> AccessPointManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings up the access point and the wildcard DNS responder. Returns the
    /// address the access point actually serves from. On failure everything
    /// acquired so far is released.
    pub fn start<R, B>(
        &mut self,
        radio: &mut R,
        board: &B,
        transports: &mut T,
        config: &ProvisionerConfig,
    ) -> Result<Ipv4Addr, ProvisionError>
    where
        R: Radio + ?Sized,
        B: Board + ?Sized,
    {
        let result = self.try_start(radio, board, transports, config);
        if result.is_err() {
            self.release();
        }
        result
    }

    fn try_start<R, B>(
        &mut self,
        radio: &mut R,
        board: &B,
        transports: &mut T,
        config: &ProvisionerConfig,
    ) -> Result<Ipv4Addr, ProvisionError>
    where
        R: Radio + ?Sized,
        B: Board + ?Sized,
    {
        let network = &config.network;

        // stored driver credentials survive, only the association drops
        if let Err(err) = radio.disconnect() {
            debug!("disconnect before access point start failed: {err}");
        }
        board.delay_ms(network.wifi_delay_ms);

        self.release();

        radio
            .set_mode(RadioMode::AccessPointStation)
            .map_err(ProvisionError::ModeSwitch)?;

        let ip = network.ap_ip();
        radio
            .configure_access_point(ip, ip, network.netmask())
            .map_err(ProvisionError::ApConfig)?;

        let ap_ip = radio
            .start_access_point(&config.ap_name)
            .map_err(|source| ProvisionError::ApStart {
                ssid: config.ap_name.clone(),
                source,
            })?;
        info!("access point `{}` up at {ap_ip}", config.ap_name);

        let dns = transports
            .start_dns(network.dns_port, ap_ip)
            .map_err(|source| ProvisionError::DnsStart {
                port: network.dns_port,
                source,
            })?;
        info!("wildcard dns listening on port {}", network.dns_port);

        self.dns = Some(dns);
        self.ap_ip = Some(ap_ip);
        Ok(ap_ip)
    }

    pub fn start_http(&mut self, transports: &mut T, port: u16) -> Result<(), ProvisionError> {
        match transports.start_http(port) {
            Ok(http) => {
                info!("http server listening on port {port}");
                self.http = Some(http);
                Ok(())
            }
            Err(source) => {
                self.release();
                Err(ProvisionError::HttpStart { port, source })
            }
        }
    }

    pub fn ap_ip(&self) -> Option<Ipv4Addr> {
        self.ap_ip
    }

    pub fn is_active(&self) -> bool {
        self.dns.is_some() || self.http.is_some()
    }

    pub fn dns_mut(&mut self) -> Option<&mut T::Dns> {
        self.dns.as_mut()
    }

    pub fn http_mut(&mut self) -> Option<&mut T::Http> {
        self.http.as_mut()
    }

    /// Stops the DNS responder and HTTP listener. Safe to call repeatedly;
    /// the radio mode is left alone.
    pub fn release(&mut self) {
        if self.dns.take().is_some() {
            debug!("dns responder stopped");
        }
        if self.http.take().is_some() {
            debug!("http listener stopped");
        }
        if let Some(ip) = self.ap_ip.take() {
            info!("released portal listeners for {ip}");
        }
    }
}

impl<T: Transports> Drop for AccessPointManager<T> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!("access point manager dropped while listening, releasing");
            self.release();
        }
    }
}
