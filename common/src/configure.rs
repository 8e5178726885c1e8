use log::{debug, info, warn};

use crate::{
    board::Board,
    config::ProvisionerConfig,
    connect::{self, AttemptTiming},
    error::SubmissionError,
    http::{respond, Responder, Response},
    radio::Radio,
    session::Hooks,
    types::{ConfigureReply, Credentials, FailureReason, ProvisioningSubmission, SessionState},
};

/// What a `/configure` submission resolved to. The response has already been
/// sent in every case.
#[derive(Debug)]
pub enum ConfigureOutcome {
    /// 400; nothing was attempted on the radio.
    Rejected(SubmissionError),
    /// 200 with `{success: false, reason}`.
    Failed(FailureReason),
    /// 200 with `{success: true}`; the success hook ran and the linger
    /// elapsed.
    Accepted(Credentials),
}

pub fn parse_submission(body: Option<&[u8]>) -> Result<ProvisioningSubmission, SubmissionError> {
    let body = body
        .filter(|body| !body.is_empty())
        .ok_or(SubmissionError::MissingBody)?;
    let submission: ProvisioningSubmission = serde_json::from_slice(body)?;
    if submission.ssid().is_none() {
        return Err(SubmissionError::MissingSsid);
    }
    Ok(submission)
}

pub struct ConfigurationHandler<'a, R: ?Sized, B: ?Sized> {
    pub radio: &'a mut R,
    pub board: &'a B,
    pub config: &'a ProvisionerConfig,
    pub hooks: &'a mut Hooks,
    pub state: &'a mut SessionState,
}

impl<R, B> ConfigurationHandler<'_, R, B>
where
    R: Radio + ?Sized,
    B: Board + ?Sized,
{
    pub fn handle<C: Responder + ?Sized>(self, body: Option<&[u8]>, client: &mut C) -> ConfigureOutcome {
        *self.state = SessionState::Configuring;

        let submission = match parse_submission(body) {
            Ok(submission) => submission,
            Err(err) => {
                warn!("rejecting configure request: {err}");
                respond(client, &Response::bad_request());
                return ConfigureOutcome::Rejected(err);
            }
        };

        let ssid = submission.ssid.clone().unwrap_or_default();
        let password = submission.password.clone().unwrap_or_default();
        info!(
            "configure request: ssid `{ssid}`, password {}, code {}, login {}",
            mask(&password),
            if submission.code.is_some() { "present" } else { "absent" },
            if submission.username.is_some() { "present" } else { "absent" },
        );

        *self.state = SessionState::Connecting;
        if let Err(err) = self.radio.disconnect() {
            debug!("disconnect before join failed: {err}");
        }
        self.board.delay_ms(self.config.network.wifi_delay_ms);

        let outcome = connect::attempt(
            self.radio,
            self.board,
            &ssid,
            &password,
            AttemptTiming::from(&self.config.network),
        );
        if !outcome.is_connected() {
            info!("join `{ssid}` did not succeed: {outcome:?}");
            return fail(client, FailureReason::Ssid);
        }

        if self.config.show_input_field {
            let code = submission.code.as_deref().unwrap_or("");
            if let Some(false) = self.hooks.check_input(code) {
                warn!("device key rejected, dropping connection to `{ssid}`");
                if let Err(err) = self.radio.disconnect() {
                    warn!("failed to disconnect after rejected device key: {err}");
                }
                return fail(client, FailureReason::Code);
            }
        }

        respond(client, &Response::json(&ConfigureReply::success()));

        let credentials = submission.into_credentials();
        self.hooks.success(&credentials);
        self.board.delay_ms(self.config.network.success_linger_ms);

        ConfigureOutcome::Accepted(credentials)
    }
}

fn fail<C: Responder + ?Sized>(client: &mut C, reason: FailureReason) -> ConfigureOutcome {
    respond(client, &Response::json(&ConfigureReply::failure(reason)));
    ConfigureOutcome::Failed(reason)
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(none)"
    } else {
        "***"
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        radio::RadioMode,
        testing::{FakeBoard, FakeRadio, RecordingClient},
    };

    struct Fixture {
        radio: FakeRadio,
        board: FakeBoard,
        config: ProvisionerConfig,
        hooks: Hooks,
        state: SessionState,
        events: Rc<RefCell<Vec<String>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let events = Rc::new(RefCell::new(Vec::new()));
            Self {
                radio: FakeRadio::default()
                    .with_mode(RadioMode::AccessPointStation)
                    .with_network("home", "hunter22")
                    .with_network("cafe", ""),
                board: FakeBoard::default(),
                config: ProvisionerConfig::default(),
                hooks: Hooks::default(),
                state: SessionState::Listening,
                events,
            }
        }

        fn run(&mut self, body: &str) -> (ConfigureOutcome, RecordingClient) {
            let mut client = RecordingClient::with_log(self.events.clone());
            let body = (!body.is_empty()).then_some(body.as_bytes());
            let outcome = ConfigurationHandler {
                radio: &mut self.radio,
                board: &self.board,
                config: &self.config,
                hooks: &mut self.hooks,
                state: &mut self.state,
            }
            .handle(body, &mut client);
            (outcome, client)
        }
    }

    #[test]
    fn missing_or_empty_ssid_is_rejected_without_radio_work() {
        for body in ["", "{}", r#"{"ssid":""}"#, r#"{"ssid":null}"#, "not json"] {
            let mut fixture = Fixture::new();

            let (outcome, client) = fixture.run(body);

            assert!(matches!(outcome, ConfigureOutcome::Rejected(_)), "{body:?}");
            assert_eq!(client.last().status, 400);
            assert_eq!(client.last().body, b"Bad Request".to_vec());
            assert!(fixture.radio.calls().is_empty(), "{body:?}");
        }
    }

    #[test]
    fn unknown_network_reports_ssid() {
        let mut fixture = Fixture::new();

        let (outcome, client) = fixture.run(r#"{"ssid":"nowhere","password":"x"}"#);

        assert!(matches!(outcome, ConfigureOutcome::Failed(FailureReason::Ssid)));
        assert_eq!(client.last().json(), serde_json::json!({"success": false, "reason": "ssid"}));
        assert_eq!(fixture.state, SessionState::Connecting);
    }

    #[test]
    fn wrong_device_key_disconnects_and_reports_code() {
        let mut fixture = Fixture::new();
        fixture.config.show_input_field = true;
        let mut hooks = Hooks::default();
        hooks.on_input_check = Some(Box::new(|code: &str| code == "1234"));
        fixture.hooks = hooks;

        let (outcome, client) = fixture.run(r#"{"ssid":"cafe","code":"9999"}"#);

        assert!(matches!(outcome, ConfigureOutcome::Failed(FailureReason::Code)));
        assert_eq!(client.last().json(), serde_json::json!({"success": false, "reason": "code"}));
        assert_eq!(fixture.radio.status(), crate::radio::LinkStatus::Disconnected);
    }

    #[test]
    fn missing_code_is_checked_as_empty() {
        let mut fixture = Fixture::new();
        fixture.config.show_input_field = true;
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        fixture.hooks.on_input_check = Some(Box::new(move |code: &str| {
            *sink.borrow_mut() = Some(code.to_string());
            true
        }));

        let (outcome, _) = fixture.run(r#"{"ssid":"cafe"}"#);

        assert!(matches!(outcome, ConfigureOutcome::Accepted(_)));
        assert_eq!(seen.borrow().as_deref(), Some(""));
    }

    #[test]
    fn success_replies_before_callback_and_lingers() {
        let mut fixture = Fixture::new();
        let events = fixture.events.clone();
        fixture.hooks.on_success = Some(Box::new(move |credentials: &Credentials| {
            events.borrow_mut().push(format!("success:{}", credentials.ssid));
        }));

        let (outcome, client) = fixture.run(
            r#"{"ssid":"home","password":"hunter22","username":"u","service_password":"p"}"#,
        );

        let ConfigureOutcome::Accepted(credentials) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(
            credentials,
            Credentials {
                ssid: "home".into(),
                password: "hunter22".into(),
                code: String::new(),
                username: "u".into(),
                service_password: "p".into(),
            }
        );
        assert_eq!(client.last().json(), serde_json::json!({"success": true}));
        assert_eq!(*fixture.events.borrow(), vec!["send:200".to_string(), "success:home".to_string()]);
        assert_eq!(
            fixture.board.delays().last().copied(),
            Some(fixture.config.network.success_linger_ms)
        );
    }

    #[test]
    fn success_hook_runs_even_if_client_vanished() {
        let mut fixture = Fixture::new();
        let called = Rc::new(RefCell::new(0));
        let counter = called.clone();
        fixture.hooks.on_success = Some(Box::new(move |_: &Credentials| *counter.borrow_mut() += 1));

        let mut client = RecordingClient::disconnected();
        let outcome = ConfigurationHandler {
            radio: &mut fixture.radio,
            board: &fixture.board,
            config: &fixture.config,
            hooks: &mut fixture.hooks,
            state: &mut fixture.state,
        }
        .handle(Some(br#"{"ssid":"cafe"}"#), &mut client);

        assert!(matches!(outcome, ConfigureOutcome::Accepted(_)));
        assert_eq!(*called.borrow(), 1);
    }
}
