use std::{
    io::ErrorKind,
    net::Ipv4Addr,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use provisioner_common::{
    Credentials, LinkStatus, ProvisionerConfig, ProvisioningSession, Radio, RadioError, RadioMode,
    ScanRecord, Security, StdBoard, StdTransports, StopHandle,
};

const HOST_HTTP_PORT: u16 = 8080;
const HOST_DNS_PORT: u16 = 5353;
const SIMULATED_JOIN_MS: u64 = 1_500;

enum PortalEvent {
    Provisioned(Credentials),
    FactoryReset,
}

#[derive(Clone)]
struct AppStore {
    credentials_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    match store.load_credentials().await {
        Ok(Some(stored)) => info!("stored credentials found for `{}`, provisioning again", stored.ssid),
        Ok(None) => {}
        Err(err) => warn!("failed to read stored credentials: {err:#}"),
    }

    let mut config = load_config().await.unwrap_or_else(|err| {
        warn!("failed to load portal config: {err:#}");
        ProvisionerConfig::default()
    });
    config.network.http_port = env_port("PROVISIONER_HTTP_PORT").unwrap_or(HOST_HTTP_PORT);
    config.network.dns_port = env_port("PROVISIONER_DNS_PORT").unwrap_or(HOST_DNS_PORT);

    let device_key = std::env::var("PROVISIONER_DEVICE_KEY")
        .ok()
        .filter(|key| !key.is_empty());
    if device_key.is_some() {
        config.show_input_field = true;
    }

    let bind_ip = std::env::var("PROVISIONER_BIND")
        .ok()
        .and_then(|value| value.parse::<Ipv4Addr>().ok())
        .unwrap_or(Ipv4Addr::LOCALHOST);

    let networks = load_simulated_networks().unwrap_or_else(|err| {
        warn!("failed to parse PROVISIONER_SIM_NETWORKS: {err:#}");
        sample_networks()
    });
    info!("simulating {} nearby networks", networks.len());

    let stop = StopHandle::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping portal");
            ctrl_c_stop.request_stop();
        }
    });

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let http_port = config.network.http_port;
    info!("portal will be served at http://{bind_ip}:{http_port}/");

    let connected = tokio::task::spawn_blocking(move || {
        let radio = SimulatedRadio::new(networks);
        let success_tx = events_tx.clone();
        let mut session = ProvisioningSession::new(
            radio,
            StdBoard::new(),
            StdTransports::new(bind_ip),
            config,
        )
        .with_stop_handle(stop)
        .on_provision(|| debug!("portal page served"))
        .on_success(move |credentials: &Credentials| {
            let _ = success_tx.send(PortalEvent::Provisioned(credentials.clone()));
        })
        .on_factory_reset(move || {
            let _ = events_tx.send(PortalEvent::FactoryReset);
        });

        if let Some(key) = device_key {
            session = session.on_input_check(move |code: &str| code == key);
        }

        session.start()
    })
    .await
    .context("provisioning worker panicked")?
    .context("provisioning session failed")?;

    while let Ok(event) = events_rx.try_recv() {
        match event {
            PortalEvent::Provisioned(credentials) => {
                store
                    .save_credentials(&credentials)
                    .await
                    .context("failed to persist credentials")?;
                info!(
                    "saved credentials for `{}` to {}",
                    credentials.ssid,
                    store.credentials_path.display()
                );
            }
            PortalEvent::FactoryReset => {
                store
                    .clear_credentials()
                    .await
                    .context("failed to clear credentials")?;
                info!("factory reset: stored credentials removed");
            }
        }
    }

    info!("portal finished (connected: {connected})");
    Ok(())
}

fn env_port(name: &str) -> Option<u16> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|port| *port != 0)
}

async fn load_config() -> anyhow::Result<ProvisionerConfig> {
    let Ok(path) = std::env::var("PROVISIONER_CONFIG") else {
        return Ok(ProvisionerConfig::default());
    };
    match tokio::fs::read(&path).await {
        Ok(raw) => serde_json::from_slice(&raw).with_context(|| format!("invalid config in {path}")),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("config file {path} not found, using defaults");
            Ok(ProvisionerConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {path}")),
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("PROVISIONER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.provisioner"));

        Self {
            credentials_path: Arc::new(data_dir.join("credentials.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_credentials(&self) -> anyhow::Result<Option<Credentials>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.credentials_path.as_ref()).await {
            Ok(raw) => Ok(Some(serde_json::from_slice::<Credentials>(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_credentials(&self, credentials: &Credentials) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.credentials_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(credentials)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }

    async fn clear_credentials(&self) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(self.credentials_path.as_ref()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SimulatedNetwork {
    ssid: String,
    #[serde(default)]
    password: String,
    #[serde(default = "default_rssi")]
    rssi: i32,
}

fn default_rssi() -> i32 {
    -65
}

fn load_simulated_networks() -> anyhow::Result<Vec<SimulatedNetwork>> {
    match std::env::var("PROVISIONER_SIM_NETWORKS") {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(_) => Ok(sample_networks()),
    }
}

fn sample_networks() -> Vec<SimulatedNetwork> {
    vec![
        SimulatedNetwork {
            ssid: "HomeNetwork".to_string(),
            password: "correcthorse".to_string(),
            rssi: -48,
        },
        SimulatedNetwork {
            ssid: "CoffeeShop".to_string(),
            password: String::new(),
            rssi: -71,
        },
        SimulatedNetwork {
            ssid: "Neighbor-5G".to_string(),
            password: "unknown".to_string(),
            rssi: -90,
        },
    ]
}

struct PendingJoin {
    ssid: String,
    password: String,
    since: Instant,
}

/// Stand-in radio for running the portal on a workstation. Joins resolve
/// after a short delay against the simulated network list.
struct SimulatedRadio {
    networks: Vec<SimulatedNetwork>,
    mode: RadioMode,
    link: LinkStatus,
    pending: Option<PendingJoin>,
    ap_ip: Ipv4Addr,
}

impl SimulatedRadio {
    fn new(networks: Vec<SimulatedNetwork>) -> Self {
        Self {
            networks,
            mode: RadioMode::Off,
            link: LinkStatus::Idle,
            pending: None,
            ap_ip: Ipv4Addr::new(192, 168, 4, 1),
        }
    }

    fn resolve(&self, join: &PendingJoin) -> LinkStatus {
        match self.networks.iter().find(|network| network.ssid == join.ssid) {
            Some(network) if network.password == join.password => LinkStatus::Connected,
            Some(_) => LinkStatus::ConnectFailed,
            None => LinkStatus::NoSsidAvailable,
        }
    }
}

impl Radio for SimulatedRadio {
    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        debug!("radio mode {:?} -> {mode:?}", self.mode);
        self.mode = mode;
        Ok(())
    }

    fn configure_access_point(
        &mut self,
        ip: Ipv4Addr,
        _gateway: Ipv4Addr,
        _netmask: Ipv4Addr,
    ) -> Result<(), RadioError> {
        self.ap_ip = ip;
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<Ipv4Addr, RadioError> {
        if ssid.is_empty() || ssid.len() > 32 {
            return Err(RadioError::InvalidSsid(ssid.to_string()));
        }
        info!("simulated access point `{ssid}` at {}", self.ap_ip);
        Ok(self.ap_ip)
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.pending = None;
        self.link = LinkStatus::Disconnected;
        Ok(())
    }

    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        if ssid.len() > 32 {
            return Err(RadioError::InvalidSsid(ssid.to_string()));
        }
        if password.len() > 64 {
            return Err(RadioError::InvalidPassword);
        }
        self.link = LinkStatus::Idle;
        self.pending = Some(PendingJoin {
            ssid: ssid.to_string(),
            password: password.to_string(),
            since: Instant::now(),
        });
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        let resolved = self
            .pending
            .as_ref()
            .filter(|join| join.since.elapsed() >= Duration::from_millis(SIMULATED_JOIN_MS))
            .map(|join| self.resolve(join));
        if let Some(status) = resolved {
            self.pending = None;
            self.link = status;
        }
        self.link
    }

    fn scan(&mut self) -> Result<Vec<ScanRecord>, RadioError> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(self
            .networks
            .iter()
            .map(|network| ScanRecord {
                ssid: network.ssid.clone(),
                rssi_dbm: network.rssi,
                security: if network.password.is_empty() {
                    Security::Open
                } else {
                    Security::Wpa2
                },
            })
            .collect())
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        (self.link == LinkStatus::Connected).then_some(Ipv4Addr::new(192, 168, 1, 100))
    }
}
