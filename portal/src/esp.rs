use core::{convert::TryInto, ffi::c_void};
use std::{
    net::Ipv4Addr,
    ptr,
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::wifi::{
    AccessPointConfiguration, AccessPointInfo, AuthMethod, ClientConfiguration, Configuration,
};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    ipv4::{Configuration as IpConfiguration, Mask, RouterConfiguration, Subnet},
    log::EspLogger,
    netif::{EspNetif, NetifConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    sys::EspError,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use provisioner_common::{
    connect::{self, AttemptTiming},
    Board, Credentials, LinkStatus, PortalNetworkConfig, ProvisionerConfig, ProvisioningSession,
    Radio, RadioError, RadioMode, ScanRecord, Security, StdTransports,
};

const NVS_NAMESPACE: &str = "provisioner";
const AP_UP_TIMEOUT: Duration = Duration::from_secs(5);
const AP_UP_POLL_MS: u32 = 50;
const NVS_CREDENTIALS_KEY: &str = "credentials";

const AP_NAME: &str = match option_env!("PROVISION_AP_NAME") {
    Some(name) => name,
    None => "ESP32-Setup",
};
const DEVICE_KEY: Option<&str> = option_env!("PROVISION_DEVICE_KEY");

// wifi_err_reason_t values reported with WIFI_EVENT_STA_DISCONNECTED
const REASON_NONE: u16 = 0;
const REASON_4WAY_HANDSHAKE_TIMEOUT: u16 = 15;
const REASON_NO_AP_FOUND: u16 = 201;
const REASON_AUTH_FAIL: u16 = 202;
const REASON_ASSOC_FAIL: u16 = 203;
const REASON_HANDSHAKE_TIMEOUT: u16 = 204;

static LAST_DISCONNECT_REASON: AtomicU16 = AtomicU16::new(REASON_NONE);

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
    lock: Arc<Mutex<()>>,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
        lock: Arc::new(Mutex::new(())),
    };

    let Peripherals { modem, .. } = Peripherals::take()?;
    register_disconnect_listener().context("failed to register wifi event handler")?;

    let mut radio = EspRadio::new(modem, sys_loop, nvs_partition).context("wifi init failed")?;
    let board = EspBoard::new();

    match nvs_store.load_credentials() {
        Ok(Some(stored)) => {
            info!("trying stored credentials for `{}`", stored.ssid);
            let timing = AttemptTiming::from(&PortalNetworkConfig::default());
            let outcome = connect::attempt(&mut radio, &board, &stored.ssid, &stored.password, timing);
            if outcome.is_connected() {
                info!("connected with stored credentials, ip {:?}", radio.station_ip());
                return park(radio);
            }
            warn!("stored credentials did not connect ({outcome:?}); starting portal");
        }
        Ok(None) => info!("no stored credentials; starting portal"),
        Err(err) => warn!("failed to load credentials from NVS: {err:#}"),
    }

    let mut config = ProvisionerConfig {
        ap_name: AP_NAME.to_string(),
        ..ProvisionerConfig::default()
    };
    config.show_input_field = DEVICE_KEY.is_some();

    let success_store = nvs_store.clone();
    let reset_store = nvs_store;
    let mut session = ProvisioningSession::new(radio, board, StdTransports::default(), config)
        .on_success(move |credentials: &Credentials| {
            if let Err(err) = success_store.save_credentials(credentials) {
                warn!("failed to persist credentials: {err:#}");
            }
        })
        .on_factory_reset(move || {
            if let Err(err) = reset_store.clear_credentials() {
                warn!("failed to clear credentials: {err:#}");
            }
        });
    if let Some(key) = DEVICE_KEY {
        session = session.on_input_check(move |code: &str| code == key);
    }

    let connected = session.start().context("provisioning portal failed")?;
    if connected {
        info!("provisioned, station ip {:?}", session.radio().station_ip());
    } else {
        warn!("portal stopped without a connection");
    }

    park(session)
}

/// Keeps the driver objects alive for the program lifetime.
fn park<T>(keep_alive: T) -> anyhow::Result<()> {
    let _keep_alive = keep_alive;
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

struct EspBoard {
    origin: Instant,
}

impl EspBoard {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Board for EspBoard {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
    }

    fn delay_ms(&self, ms: u64) {
        FreeRtos::delay_ms(ms.try_into().unwrap_or(u32::MAX));
    }

    fn restart(&self) {
        info!("restarting");
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}

struct EspRadio {
    wifi: BlockingWifi<EspWifi<'static>>,
    mode: RadioMode,
    client: ClientConfiguration,
    access_point: AccessPointConfiguration,
    joining: bool,
}

impl EspRadio {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;
        Ok(Self {
            wifi,
            mode: RadioMode::Off,
            client: ClientConfiguration::default(),
            access_point: AccessPointConfiguration::default(),
            joining: false,
        })
    }

    fn apply(&mut self, mode: RadioMode) -> Result<(), EspError> {
        let configuration = match mode {
            RadioMode::Off => {
                if self.wifi.is_started()? {
                    self.wifi.stop()?;
                }
                return Ok(());
            }
            RadioMode::Station => Configuration::Client(self.client.clone()),
            RadioMode::AccessPoint => Configuration::AccessPoint(self.access_point.clone()),
            RadioMode::AccessPointStation => {
                Configuration::Mixed(self.client.clone(), self.access_point.clone())
            }
        };
        self.wifi.set_configuration(&configuration)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }

    // the station half of a mixed config stays down until a join, so only
    // the soft-AP netif is awaited
    fn wait_access_point_up(&self) -> Result<(), RadioError> {
        let started = Instant::now();
        while !self.wifi.wifi().ap_netif().is_up().map_err(driver)? {
            if started.elapsed() >= AP_UP_TIMEOUT {
                return Err(RadioError::Driver(format!(
                    "access point netif not up after {} ms",
                    AP_UP_TIMEOUT.as_millis()
                )));
            }
            FreeRtos::delay_ms(AP_UP_POLL_MS);
        }
        Ok(())
    }
}

fn driver(err: EspError) -> RadioError {
    RadioError::Driver(err.to_string())
}

impl Radio for EspRadio {
    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        self.apply(mode).map_err(driver)?;
        self.mode = mode;
        Ok(())
    }

    fn configure_access_point(
        &mut self,
        ip: Ipv4Addr,
        gateway: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), RadioError> {
        let mask = Mask::try_from(netmask)
            .map_err(|_| RadioError::Driver(format!("invalid netmask {netmask}")))?;
        let mut conf = NetifConfiguration::wifi_default_router();
        conf.key = "WIFI_AP_PORTAL"
            .try_into()
            .map_err(|_| RadioError::Driver("netif key too long".to_string()))?;
        conf.ip_configuration = Some(IpConfiguration::Router(RouterConfiguration {
            subnet: Subnet { gateway, mask },
            dhcp_enabled: true,
            dns: Some(ip),
            secondary_dns: None,
        }));

        let netif = EspNetif::new_with_conf(&conf).map_err(driver)?;
        self.wifi.wifi_mut().swap_netif_ap(netif).map_err(driver)?;
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<Ipv4Addr, RadioError> {
        self.access_point = AccessPointConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::InvalidSsid(ssid.to_string()))?,
            auth_method: AuthMethod::None,
            channel: 1,
            max_connections: 4,
            ..Default::default()
        };
        self.apply(self.mode).map_err(driver)?;
        self.wait_access_point_up()?;

        let ip_info = self.wifi.wifi().ap_netif().get_ip_info().map_err(driver)?;
        Ok(ip_info.ip)
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.joining = false;
        self.wifi.wifi_mut().disconnect().map_err(driver)
    }

    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::InvalidSsid(ssid.to_string()))?,
            password: password
                .try_into()
                .map_err(|_| RadioError::InvalidPassword)?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };
        self.apply(self.mode).map_err(driver)?;

        LAST_DISCONNECT_REASON.store(REASON_NONE, Ordering::SeqCst);
        self.joining = true;
        self.wifi.wifi_mut().connect().map_err(driver)
    }

    fn status(&mut self) -> LinkStatus {
        if self.wifi.is_up().unwrap_or(false) {
            self.joining = false;
            return LinkStatus::Connected;
        }
        if !self.joining {
            return LinkStatus::Disconnected;
        }
        match LAST_DISCONNECT_REASON.load(Ordering::SeqCst) {
            REASON_NONE => LinkStatus::Idle,
            REASON_NO_AP_FOUND => LinkStatus::NoSsidAvailable,
            REASON_AUTH_FAIL
            | REASON_ASSOC_FAIL
            | REASON_HANDSHAKE_TIMEOUT
            | REASON_4WAY_HANDSHAKE_TIMEOUT => LinkStatus::ConnectFailed,
            _ => LinkStatus::Disconnected,
        }
    }

    fn scan(&mut self) -> Result<Vec<ScanRecord>, RadioError> {
        let found = self
            .wifi
            .scan()
            .map_err(|err| RadioError::Scan(err.to_string()))?;
        Ok(found.iter().map(scan_record).collect())
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified())
    }
}

fn scan_record(info: &AccessPointInfo) -> ScanRecord {
    let security = match info.auth_method {
        None | Some(AuthMethod::None) => Security::Open,
        Some(AuthMethod::WEP) => Security::Wep,
        Some(AuthMethod::WPA) => Security::Wpa,
        Some(AuthMethod::WPA2Personal) => Security::Wpa2,
        Some(AuthMethod::WPAWPA2Personal) => Security::WpaWpa2,
        Some(AuthMethod::WPA2Enterprise) => Security::Wpa2Enterprise,
        Some(AuthMethod::WPA3Personal) => Security::Wpa3,
        Some(AuthMethod::WPA2WPA3Personal) => Security::Wpa2Wpa3,
        Some(_) => Security::Other,
    };
    ScanRecord {
        ssid: info.ssid.to_string(),
        rssi_dbm: i32::from(info.signal_strength),
        security,
    }
}

unsafe extern "C" fn on_sta_disconnected(
    _arg: *mut c_void,
    _base: esp_idf_svc::sys::esp_event_base_t,
    _id: i32,
    data: *mut c_void,
) {
    if data.is_null() {
        return;
    }
    let event = &*(data as *const esp_idf_svc::sys::wifi_event_sta_disconnected_t);
    LAST_DISCONNECT_REASON.store(u16::from(event.reason), Ordering::SeqCst);
}

fn register_disconnect_listener() -> anyhow::Result<()> {
    let rc = unsafe {
        esp_idf_svc::sys::esp_event_handler_register(
            esp_idf_svc::sys::WIFI_EVENT,
            esp_idf_svc::sys::wifi_event_t_WIFI_EVENT_STA_DISCONNECTED as i32,
            Some(on_sta_disconnected),
            ptr::null_mut(),
        )
    };
    if rc == esp_idf_svc::sys::ESP_OK {
        return Ok(());
    }
    Err(anyhow!("esp_event_handler_register failed with code {}", rc))
}

impl NvsStore {
    fn load_credentials(&self) -> anyhow::Result<Option<Credentials>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("nvs lock poisoned"))?;
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 1024];

        match nvs.get_str(NVS_CREDENTIALS_KEY, &mut buffer)? {
            Some(value) => Ok(Some(serde_json::from_str::<Credentials>(value)?)),
            None => Ok(None),
        }
    }

    fn save_credentials(&self, credentials: &Credentials) -> anyhow::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("nvs lock poisoned"))?;
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let payload = serde_json::to_string(credentials)?;
        nvs.set_str(NVS_CREDENTIALS_KEY, &payload)?;
        info!("credentials for `{}` saved to nvs", credentials.ssid);
        Ok(())
    }

    fn clear_credentials(&self) -> anyhow::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("nvs lock poisoned"))?;
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        nvs.remove(NVS_CREDENTIALS_KEY)?;
        Ok(())
    }
}
