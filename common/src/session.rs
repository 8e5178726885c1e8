//! The provisioning session: access point up, serve the portal until a
//! network is accepted or a stop is requested, then tear everything down.

use std::{
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, error, info, warn};

use crate::{
    access_point::AccessPointManager,
    board::Board,
    config::ProvisionerConfig,
    configure::{ConfigurationHandler, ConfigureOutcome},
    error::ProvisionError,
    http::{respond, Request, Responder, Response},
    portal::render_page,
    radio::{LinkStatus, Radio},
    router::{route, Route},
    scan::{build_listing, scan_networks},
    transport::{DnsTransport, HttpTransport, Transports},
    types::{Credentials, SessionState},
};

const LOOP_YIELD_MS: u64 = 1;

/// Requests termination of a running session from another thread. The flag
/// is checked once per service loop iteration.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Application callbacks. All are optional.
#[derive(Default)]
pub struct Hooks {
    pub(crate) on_provision: Option<Box<dyn FnMut()>>,
    pub(crate) on_input_check: Option<Box<dyn FnMut(&str) -> bool>>,
    pub(crate) on_factory_reset: Option<Box<dyn FnMut()>>,
    pub(crate) on_success: Option<Box<dyn FnMut(&Credentials)>>,
}

impl Hooks {
    pub(crate) fn provision(&mut self) {
        if let Some(hook) = self.on_provision.as_mut() {
            hook();
        }
    }

    /// `None` when no input check is registered.
    pub(crate) fn check_input(&mut self, code: &str) -> Option<bool> {
        self.on_input_check.as_mut().map(|hook| hook(code))
    }

    pub(crate) fn factory_reset(&mut self) {
        if let Some(hook) = self.on_factory_reset.as_mut() {
            hook();
        }
    }

    pub(crate) fn success(&mut self, credentials: &Credentials) {
        if let Some(hook) = self.on_success.as_mut() {
            hook(credentials);
        }
    }
}

pub struct ProvisioningSession<R, B, T>
where
    R: Radio,
    B: Board,
    T: Transports,
{
    radio: R,
    board: B,
    transports: T,
    config: ProvisionerConfig,
    hooks: Hooks,
    access_point: AccessPointManager<T>,
    state: SessionState,
    stop: StopHandle,
}

impl<R, B, T> ProvisioningSession<R, B, T>
where
    R: Radio,
    B: Board,
    T: Transports,
{
    pub fn new(radio: R, board: B, transports: T, mut config: ProvisionerConfig) -> Self {
        config.sanitize();
        Self {
            radio,
            board,
            transports,
            config,
            hooks: Hooks::default(),
            access_point: AccessPointManager::new(),
            state: SessionState::Idle,
            stop: StopHandle::new(),
        }
    }

    /// Called every time the portal page is served.
    pub fn on_provision(mut self, hook: impl FnMut() + 'static) -> Self {
        self.hooks.on_provision = Some(Box::new(hook));
        self
    }

    /// Validates the device key after a successful join. Only consulted when
    /// the input field is enabled.
    pub fn on_input_check(mut self, hook: impl FnMut(&str) -> bool + 'static) -> Self {
        self.hooks.on_input_check = Some(Box::new(hook));
        self
    }

    pub fn on_factory_reset(mut self, hook: impl FnMut() + 'static) -> Self {
        self.hooks.on_factory_reset = Some(Box::new(hook));
        self
    }

    /// Runs once, after the success response has been sent.
    pub fn on_success(mut self, hook: impl FnMut(&Credentials) + 'static) -> Self {
        self.hooks.on_success = Some(Box::new(hook));
        self
    }

    /// Shares an externally created stop flag, e.g. one wired to Ctrl-C.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    /// Runs the whole session on the calling thread. Returns whether the
    /// radio ended up associated with a network.
    pub fn start(&mut self) -> Result<bool, ProvisionError> {
        self.listen()?;

        loop {
            self.poll_once();
            self.board.delay_ms(LOOP_YIELD_MS);
            if self.stop.is_stop_requested() {
                break;
            }
        }

        self.release();
        let status = self.radio.status();
        info!("provisioning finished, station status {}", status.as_str());
        Ok(status == LinkStatus::Connected)
    }

    /// Brings up the access point, DNS and HTTP without entering the loop.
    pub fn listen(&mut self) -> Result<Ipv4Addr, ProvisionError> {
        if self.state != SessionState::Idle {
            return Err(ProvisionError::AlreadyStarted);
        }

        info!("starting provisioning portal `{}`", self.config.ap_name);
        match self.open_listeners() {
            Ok(ip) => {
                self.state = SessionState::Listening;
                info!("portal ready at http://{ip}:{}/", self.config.network.http_port);
                Ok(ip)
            }
            Err(err) => {
                error!("provisioning setup failed: {err}");
                self.state = SessionState::Failed;
                self.release();
                Err(err)
            }
        }
    }

    fn open_listeners(&mut self) -> Result<Ipv4Addr, ProvisionError> {
        let ip = self.access_point.start(
            &mut self.radio,
            &self.board,
            &mut self.transports,
            &self.config,
        )?;
        self.access_point
            .start_http(&mut self.transports, self.config.network.http_port)?;
        Ok(ip)
    }

    /// One service loop iteration: at most one DNS query, then at most one
    /// HTTP request.
    pub fn poll_once(&mut self) {
        if let Some(dns) = self.access_point.dns_mut() {
            if let Err(err) = dns.process_next_request() {
                warn!("dns responder error: {err}");
            }
        }

        let incoming = match self.access_point.http_mut() {
            Some(http) => http.next_request(),
            None => return,
        };

        match incoming {
            Ok(Some((request, mut client))) => self.dispatch(request, &mut client),
            Ok(None) => {}
            Err(err) => warn!("http accept error: {err}"),
        }
    }

    fn dispatch<C: Responder + ?Sized>(&mut self, request: Request, client: &mut C) {
        match route(&request.method, &request.path) {
            Route::Portal => self.serve_portal(client),
            Route::Update => self.serve_update(client),
            Route::Configure => self.serve_configure(&request, client),
            Route::FactoryReset => self.serve_factory_reset(client),
        }
    }

    fn serve_portal<C: Responder + ?Sized>(&mut self, client: &mut C) {
        self.hooks.provision();
        respond(client, &Response::html(render_page(&self.config)));
    }

    fn serve_update<C: Responder + ?Sized>(&mut self, client: &mut C) {
        let networks = scan_networks(&mut self.radio);
        respond(client, &Response::json(&build_listing(&self.config, networks)));
    }

    fn serve_configure<C: Responder + ?Sized>(&mut self, request: &Request, client: &mut C) {
        let outcome = ConfigurationHandler {
            radio: &mut self.radio,
            board: &self.board,
            config: &self.config,
            hooks: &mut self.hooks,
            state: &mut self.state,
        }
        .handle(request.body.as_deref(), client);

        match outcome {
            ConfigureOutcome::Accepted(credentials) => {
                info!("provisioned `{}`, stopping portal", credentials.ssid);
                self.state = SessionState::Succeeded;
                self.stop.request_stop();
            }
            ConfigureOutcome::Failed(reason) => {
                debug!("configure failed ({}), still listening", reason.as_str());
                self.state = SessionState::Listening;
            }
            ConfigureOutcome::Rejected(_) => self.state = SessionState::Listening,
        }
    }

    fn serve_factory_reset<C: Responder + ?Sized>(&mut self, client: &mut C) {
        warn!("factory reset requested");
        self.hooks.factory_reset();
        respond(client, &Response::text(200, "Reset Success"));

        self.board.delay_ms(self.config.network.restart_delay_ms);
        self.board.restart();
        self.stop.request_stop();
    }

    /// Stops DNS and HTTP. Idempotent; also runs on drop.
    pub fn release(&mut self) {
        self.access_point.release();
        if self.state != SessionState::Idle {
            self.state = SessionState::Stopped;
        }
    }
}

impl<R, B, T> Drop for ProvisioningSession<R, B, T>
where
    R: Radio,
    B: Board,
    T: Transports,
{
    fn drop(&mut self) {
        self.release();
    }
}
