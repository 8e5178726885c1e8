//! In-memory stand-ins for the radio, board and sockets.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    io,
    net::Ipv4Addr,
    rc::Rc,
};

use crate::{
    board::Board,
    error::RadioError,
    http::{Method, Request, Responder, Response},
    radio::{LinkStatus, Radio, RadioMode, ScanRecord},
    session::StopHandle,
    transport::{DnsTransport, HttpTransport, Transports},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    SetMode(RadioMode),
    ConfigureAp {
        ip: Ipv4Addr,
        gateway: Ipv4Addr,
        netmask: Ipv4Addr,
    },
    StartAp(String),
    Disconnect,
    Begin {
        ssid: String,
        password: String,
    },
    Scan,
}

/// Scripted radio. Joins resolve against the registered networks unless a
/// status script is queued, in which case each `status()` call pops the next
/// entry and the last one sticks.
#[derive(Debug)]
pub struct FakeRadio {
    mode: RadioMode,
    link: LinkStatus,
    statuses: VecDeque<LinkStatus>,
    networks: Vec<(String, String)>,
    scan: Result<Vec<ScanRecord>, String>,
    ap_ip: Option<Ipv4Addr>,
    configured_ip: Option<Ipv4Addr>,
    fail_mode_switch: bool,
    fail_begin: bool,
    fail_ap_start: bool,
    calls: Vec<RadioCall>,
    joins: usize,
}

impl Default for FakeRadio {
    fn default() -> Self {
        Self {
            mode: RadioMode::Off,
            link: LinkStatus::Idle,
            statuses: VecDeque::new(),
            networks: Vec::new(),
            scan: Ok(Vec::new()),
            ap_ip: None,
            configured_ip: None,
            fail_mode_switch: false,
            fail_begin: false,
            fail_ap_start: false,
            calls: Vec::new(),
            joins: 0,
        }
    }
}

impl FakeRadio {
    pub fn with_mode(mut self, mode: RadioMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = LinkStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn with_network(mut self, ssid: &str, password: &str) -> Self {
        self.networks.push((ssid.to_string(), password.to_string()));
        self
    }

    pub fn with_scan(mut self, records: Vec<ScanRecord>) -> Self {
        self.scan = Ok(records);
        self
    }

    pub fn with_failing_scan(mut self) -> Self {
        self.scan = Err("scan aborted".to_string());
        self
    }

    pub fn with_ap_ip(mut self, ip: Ipv4Addr) -> Self {
        self.ap_ip = Some(ip);
        self
    }

    pub fn with_failing_mode_switch(mut self) -> Self {
        self.fail_mode_switch = true;
        self
    }

    pub fn with_failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    pub fn with_failing_ap_start(mut self) -> Self {
        self.fail_ap_start = true;
        self
    }

    pub fn calls(&self) -> &[RadioCall] {
        &self.calls
    }

    pub fn join_count(&self) -> usize {
        self.joins
    }
}

impl Radio for FakeRadio {
    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        self.calls.push(RadioCall::SetMode(mode));
        if self.fail_mode_switch {
            return Err(RadioError::Driver("mode switch refused".to_string()));
        }
        self.mode = mode;
        Ok(())
    }

    fn configure_access_point(
        &mut self,
        ip: Ipv4Addr,
        gateway: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), RadioError> {
        self.calls.push(RadioCall::ConfigureAp { ip, gateway, netmask });
        self.configured_ip = Some(ip);
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<Ipv4Addr, RadioError> {
        self.calls.push(RadioCall::StartAp(ssid.to_string()));
        if self.fail_ap_start {
            return Err(RadioError::Driver("softap refused to start".to_string()));
        }
        Ok(self
            .ap_ip
            .or(self.configured_ip)
            .unwrap_or(Ipv4Addr::new(192, 168, 4, 1)))
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Disconnect);
        self.link = LinkStatus::Disconnected;
        Ok(())
    }

    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Begin {
            ssid: ssid.to_string(),
            password: password.to_string(),
        });
        self.joins += 1;
        if self.fail_begin {
            return Err(RadioError::InvalidSsid(ssid.to_string()));
        }

        if self.networks.is_empty() {
            return Ok(());
        }
        self.link = match self.networks.iter().find(|(known, _)| known == ssid) {
            Some((_, expected)) if expected == password => LinkStatus::Connected,
            Some(_) => LinkStatus::ConnectFailed,
            None => LinkStatus::NoSsidAvailable,
        };
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        if let Some(next) = self.statuses.pop_front() {
            self.link = next;
        }
        self.link
    }

    fn scan(&mut self) -> Result<Vec<ScanRecord>, RadioError> {
        self.calls.push(RadioCall::Scan);
        self.scan.clone().map_err(RadioError::Scan)
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        (self.link == LinkStatus::Connected).then_some(Ipv4Addr::new(192, 168, 1, 50))
    }
}

#[derive(Debug, Default)]
struct BoardState {
    now: Cell<u64>,
    delays: RefCell<Vec<u64>>,
    restarts: Cell<u32>,
}

/// Manual clock: time only moves when the code under test sleeps.
#[derive(Debug, Clone, Default)]
pub struct FakeBoard {
    state: Rc<BoardState>,
}

impl FakeBoard {
    pub fn delays(&self) -> Vec<u64> {
        self.state.delays.borrow().clone()
    }

    pub fn restarts(&self) -> u32 {
        self.state.restarts.get()
    }
}

impl Board for FakeBoard {
    fn now_ms(&self) -> u64 {
        self.state.now.get()
    }

    fn delay_ms(&self, ms: u64) {
        self.state.now.set(self.state.now.get() + ms);
        self.state.delays.borrow_mut().push(ms);
    }

    fn restart(&self) {
        self.state.restarts.set(self.state.restarts.get() + 1);
    }
}

/// A response as a client would see it on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl EncodedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|value| value.parse().ok())
            .unwrap_or(usize::MAX)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub fn parse_encoded(raw: &[u8]) -> EncodedResponse {
    let split = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = std::str::from_utf8(&raw[..split]).unwrap();
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap();
    let status = status_line.split(' ').nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    EncodedResponse {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}

pub fn get(path: &str) -> Request {
    Request::new(Method::Get, path)
}

pub fn post(path: &str, body: &str) -> Request {
    Request::new(Method::Post, path).with_body(body.as_bytes())
}

pub type EventLog = Rc<RefCell<Vec<String>>>;

/// Records every response sent through it and appends `send:<status>` to a
/// shared event log.
pub struct RecordingClient {
    log: EventLog,
    responses: Rc<RefCell<Vec<EncodedResponse>>>,
    connected: bool,
}

impl RecordingClient {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            responses: Rc::default(),
            connected: true,
        }
    }

    /// A client whose connection is already gone.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::with_log(EventLog::default())
        }
    }

    pub fn last(&self) -> EncodedResponse {
        self.responses.borrow().last().cloned().expect("no response sent")
    }
}

impl Responder for RecordingClient {
    fn send(&mut self, response: &Response) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone"));
        }
        self.log.borrow_mut().push(format!("send:{}", response.status));
        self.responses.borrow_mut().push(parse_encoded(&response.encode()));
        Ok(())
    }
}

#[derive(Default)]
struct TransportState {
    requests: RefCell<VecDeque<Request>>,
    dns_queries: Cell<usize>,
    dns_started: RefCell<Vec<(u16, Ipv4Addr)>>,
    active: Cell<usize>,
    fail_dns: Cell<bool>,
    fail_http: Cell<bool>,
    log: EventLog,
    responses: Rc<RefCell<Vec<EncodedResponse>>>,
    stop_when_idle: RefCell<Option<StopHandle>>,
}

/// Queue-backed transports. Clones share state so a test can keep a handle
/// after moving one into a session.
#[derive(Clone, Default)]
pub struct FakeTransports {
    state: Rc<TransportState>,
}

impl FakeTransports {
    pub fn with_request(self, request: Request) -> Self {
        self.state.requests.borrow_mut().push_back(request);
        self
    }

    pub fn with_dns_queries(self, count: usize) -> Self {
        self.state.dns_queries.set(count);
        self
    }

    pub fn with_failing_dns(self) -> Self {
        self.state.fail_dns.set(true);
        self
    }

    pub fn with_failing_http(self) -> Self {
        self.state.fail_http.set(true);
        self
    }

    /// Requests a stop once the request queue has drained.
    pub fn stop_when_idle(&self, stop: StopHandle) {
        *self.state.stop_when_idle.borrow_mut() = Some(stop);
    }

    pub fn dns_started(&self) -> Vec<(u16, Ipv4Addr)> {
        self.state.dns_started.borrow().clone()
    }

    pub fn active_listeners(&self) -> usize {
        self.state.active.get()
    }

    pub fn pending_requests(&self) -> usize {
        self.state.requests.borrow().len()
    }

    pub fn responses(&self) -> Vec<EncodedResponse> {
        self.state.responses.borrow().clone()
    }

    pub fn log(&self) -> EventLog {
        self.state.log.clone()
    }
}

impl Transports for FakeTransports {
    type Dns = FakeDns;
    type Http = FakeHttp;

    fn start_dns(&mut self, port: u16, answer_ip: Ipv4Addr) -> io::Result<FakeDns> {
        if self.state.fail_dns.get() {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "dns port taken"));
        }
        self.state.dns_started.borrow_mut().push((port, answer_ip));
        self.state.active.set(self.state.active.get() + 1);
        Ok(FakeDns {
            state: self.state.clone(),
        })
    }

    fn start_http(&mut self, _port: u16) -> io::Result<FakeHttp> {
        if self.state.fail_http.get() {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "http port taken"));
        }
        self.state.active.set(self.state.active.get() + 1);
        Ok(FakeHttp {
            state: self.state.clone(),
        })
    }
}

pub struct FakeDns {
    state: Rc<TransportState>,
}

impl DnsTransport for FakeDns {
    fn process_next_request(&mut self) -> io::Result<bool> {
        let pending = self.state.dns_queries.get();
        if pending == 0 {
            return Ok(false);
        }
        self.state.dns_queries.set(pending - 1);
        self.state.log.borrow_mut().push("dns".to_string());
        Ok(true)
    }
}

impl Drop for FakeDns {
    fn drop(&mut self) {
        self.state.active.set(self.state.active.get() - 1);
    }
}

pub struct FakeHttp {
    state: Rc<TransportState>,
}

impl HttpTransport for FakeHttp {
    type Client = RecordingClient;

    fn next_request(&mut self) -> io::Result<Option<(Request, RecordingClient)>> {
        let next = self.state.requests.borrow_mut().pop_front();
        match next {
            Some(request) => {
                let client = RecordingClient {
                    log: self.state.log.clone(),
                    responses: self.state.responses.clone(),
                    connected: true,
                };
                Ok(Some((request, client)))
            }
            None => {
                if let Some(stop) = self.state.stop_when_idle.borrow().as_ref() {
                    stop.request_stop();
                }
                Ok(None)
            }
        }
    }
}

impl Drop for FakeHttp {
    fn drop(&mut self) {
        self.state.active.set(self.state.active.get() - 1);
    }
}
