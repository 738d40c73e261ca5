//! Session controller
//!
//! Owns one protocol-engine session and drives it from pushed bytes. The
//! host feeds inbound data with [`SessionController::push`]; the engine's
//! outbound traffic leaves through the delivery callback registered on the
//! transport. Nothing in here blocks — a handshake that needs more bytes
//! simply stays in `Handshaking` until the next push.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::channel::{ChannelHandle, ForwardedEndpoint};
use crate::config::{ConnectConfig, Credential};
use crate::engine::{AuthOutcome, Engine, SharedTransport};
use crate::error::{Error, Result};
use crate::sftp::SftpHandle;
use crate::transport::{DeliveryFn, TransportBridge};

/// Session lifecycle states.
///
/// `Failed` is terminal and reachable from any non-terminal state;
/// `Closed` is reachable from anywhere via [`SessionController::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connecting,
    Handshaking,
    Ready,
    Authenticated,
    Failed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::Ready => "ready",
            SessionState::Authenticated => "authenticated",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One SSH session driven by pushed bytes.
pub struct SessionController {
    id: String,
    config: ConnectConfig,
    engine: Box<dyn Engine>,
    bridge: SharedTransport,
    state: SessionState,
    fingerprint: Option<String>,
    auth_methods: Vec<String>,
    last_error: Option<Error>,
    /// Most recent inbound forwarded connection, session-scoped. Written by
    /// the closure registered through [`ChannelHandle::request_x11`],
    /// consumed by [`SessionController::take_forwarded_endpoint`].
    forwarded: Rc<RefCell<Option<ForwardedEndpoint>>>,
}

impl SessionController {
    /// Build a session around `engine` for the endpoint in `config`.
    ///
    /// Construction never returns an error: a session that cannot prepare
    /// its transport or initialize its engine comes back permanently
    /// `Failed`, with the distinguishing error readable via
    /// [`last_error`](Self::last_error).
    pub fn new(config: ConnectConfig, engine: Box<dyn Engine>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let bridge: SharedTransport = Rc::new(RefCell::new(TransportBridge::new()));

        let mut session = Self {
            id,
            config,
            engine,
            bridge,
            state: SessionState::Created,
            fingerprint: None,
            auth_methods: Vec::new(),
            last_error: None,
            forwarded: Rc::new(RefCell::new(None)),
        };

        if !session.config.is_valid() {
            warn!(
                session = %session.id,
                host = %session.config.host,
                port = session.config.port,
                "invalid endpoint, session failed"
            );
            session.fail(Error::TransportFailed(format!(
                "invalid endpoint {}:{}",
                session.config.host, session.config.port
            )));
            return session;
        }

        if let Err(e) = session.engine.attach(session.bridge.clone()) {
            warn!(session = %session.id, "engine refused to initialize: {:?}", e);
            session.fail(Error::EngineInit(format!("{e:?}")));
            return session;
        }

        info!(
            session = %session.id,
            host = %session.config.host,
            port = session.config.port,
            "session created"
        );
        session.state = SessionState::Connecting;
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Host-key fingerprint; `None` until the handshake completes, then
    /// fixed for the life of the session.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Register the callback that receives every outbound transmission.
    pub fn register_delivery(&mut self, callback: DeliveryFn) {
        self.bridge.borrow_mut().register_delivery(callback);
    }

    /// Feed inbound bytes and advance the handshake if it is still running.
    ///
    /// Each call advances the handshake by at most one step; partial
    /// key-exchange data leaves the session in `Handshaking` until enough
    /// has arrived.
    pub fn push(&mut self, data: &[u8]) {
        match self.state {
            SessionState::Failed | SessionState::Closed => {
                debug!(session = %self.id, state = %self.state, "push ignored");
                return;
            }
            _ => {}
        }

        self.bridge.borrow_mut().push(data);

        if matches!(
            self.state,
            SessionState::Connecting | SessionState::Handshaking
        ) {
            self.state = SessionState::Handshaking;
            self.handshake_step();
        }
    }

    fn handshake_step(&mut self) {
        match self.engine.handshake_step() {
            Ok(Some(summary)) => {
                // Populated exactly once; never touched again.
                self.fingerprint = Some(summary.fingerprint);
                self.auth_methods = summary.auth_methods;
                self.state = SessionState::Ready;
                info!(
                    session = %self.id,
                    fingerprint = self.fingerprint.as_deref().unwrap_or(""),
                    "handshake complete"
                );
            }
            Ok(None) | Err(crate::engine::EngineError::WouldBlock) => {
                debug!(session = %self.id, "handshake needs more bytes");
            }
            Err(e) => {
                warn!(session = %self.id, "handshake failed: {:?}", e);
                self.fail(Error::HandshakeFailed(format!("{e:?}")));
            }
        }
    }

    /// Authentication method names the server permits for `user`.
    pub fn userauth(&self, _user: &str) -> Result<Vec<String>> {
        match self.state {
            SessionState::Ready | SessionState::Authenticated => Ok(self.auth_methods.clone()),
            _ => Err(Error::InvalidState {
                op: "userauth",
                state: self.state.to_string(),
            }),
        }
    }

    /// Attempt credential authentication. Valid only in `Ready`.
    ///
    /// `Partial` keeps the session in `Ready` so the host can present the
    /// next step of a multi-step exchange; a rejection freezes the session
    /// in `Failed`.
    pub fn login(&mut self, user: &str, credential: &Credential) -> Result<AuthOutcome> {
        if self.state != SessionState::Ready {
            return Err(Error::InvalidState {
                op: "login",
                state: self.state.to_string(),
            });
        }

        match self.engine.authenticate(user, credential) {
            Ok(AuthOutcome::Success) => {
                info!(session = %self.id, user, "authenticated");
                self.state = SessionState::Authenticated;
                Ok(AuthOutcome::Success)
            }
            Ok(AuthOutcome::Partial) => {
                debug!(session = %self.id, user, "authentication continues");
                Ok(AuthOutcome::Partial)
            }
            Ok(AuthOutcome::Rejected) => {
                warn!(session = %self.id, user, "authentication rejected");
                let err = Error::AuthFailed(format!("credentials rejected for {user}"));
                self.fail(err.clone());
                Err(err)
            }
            Err(crate::engine::EngineError::WouldBlock) => Err(Error::WouldBlock),
            Err(e) => {
                let err = Error::AuthFailed(format!("{e:?}"));
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Open a new channel.
    ///
    /// Outside `Authenticated` this hands back a permanently inactive
    /// handle rather than failing; every operation on it reports
    /// [`Error::NotActive`].
    pub fn channel(&mut self) -> ChannelHandle {
        if self.state != SessionState::Authenticated {
            debug!(session = %self.id, state = %self.state, "channel requested before auth");
            return ChannelHandle::inactive(self.forwarded.clone());
        }
        match self.engine.open_channel() {
            Ok(channel) => {
                debug!(session = %self.id, "channel opened");
                ChannelHandle::new(channel, self.forwarded.clone())
            }
            Err(e) => {
                warn!(session = %self.id, "channel open failed: {:?}", e);
                self.last_error = Some(e.into());
                ChannelHandle::inactive(self.forwarded.clone())
            }
        }
    }

    /// Open `path` as a remote file. Same inactive-handle ergonomics as
    /// [`channel`](Self::channel).
    pub fn sftp(&mut self, path: &str) -> SftpHandle {
        if self.state != SessionState::Authenticated {
            debug!(session = %self.id, state = %self.state, "sftp requested before auth");
            return SftpHandle::inactive();
        }
        match self.engine.open_sftp_file(path) {
            Ok(file) => SftpHandle::new(file),
            Err(e) => {
                warn!(session = %self.id, path, "sftp open failed: {:?}", e);
                self.last_error = Some(e.into());
                SftpHandle::inactive()
            }
        }
    }

    /// Open `path` as a remote directory for [`SftpHandle::readdir`].
    pub fn sftp_dir(&mut self, path: &str) -> SftpHandle {
        if self.state != SessionState::Authenticated {
            debug!(session = %self.id, state = %self.state, "sftp_dir requested before auth");
            return SftpHandle::inactive();
        }
        match self.engine.open_sftp_dir(path) {
            Ok(dir) => SftpHandle::new(dir),
            Err(e) => {
                warn!(session = %self.id, path, "sftp opendir failed: {:?}", e);
                self.last_error = Some(e.into());
                SftpHandle::inactive()
            }
        }
    }

    /// One-shot consumption of the most recent forwarded endpoint.
    pub fn take_forwarded_endpoint(&mut self) -> Option<ForwardedEndpoint> {
        self.forwarded.borrow_mut().take()
    }

    /// Drop all queued inbound bytes. Used by the host on reset.
    pub fn clear(&mut self) {
        self.bridge.borrow_mut().clear();
    }

    /// Tear the session down. Idempotent; the engine session is released
    /// exactly once.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        info!(session = %self.id, "closing session");
        self.engine.disconnect();
        self.bridge.borrow_mut().clear();
        self.state = SessionState::Closed;
    }

    fn fail(&mut self, err: Error) {
        self.last_error = Some(err);
        self.state = SessionState::Failed;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        debug!(session = %self.id, "dropping session");
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::engine::testing::{MockEngine, MockState, SharedMock};

    fn session_with(state: &SharedMock) -> SessionController {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        SessionController::new(
            ConnectConfig::new("example.com", 22).with_username("alice"),
            MockEngine::boxed(state.clone()),
        )
    }

    fn ready_session(state: &SharedMock) -> SessionController {
        let mut session = session_with(state);
        let threshold = state.borrow().handshake_threshold;
        session.push(&vec![0u8; threshold]);
        assert_eq!(session.state(), SessionState::Ready);
        session
    }

    fn authenticated_session(state: &SharedMock) -> SessionController {
        let mut session = ready_session(state);
        session
            .login("alice", &Credential::password("secret"))
            .unwrap();
        session
    }

    #[test]
    fn invalid_endpoint_fails_with_transport_error() {
        let state = MockState::new();
        let session = SessionController::new(
            ConnectConfig::new("", 22),
            MockEngine::boxed(state.clone()),
        );
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(
            session.last_error(),
            Some(Error::TransportFailed(_))
        ));
    }

    #[test]
    fn byte_at_a_time_handshake_reaches_ready_exactly_once() {
        let state = MockState::new();
        state.borrow_mut().handshake_threshold = 10;
        let mut session = session_with(&state);

        for i in 0..9 {
            session.push(&[0x55]);
            assert_eq!(session.state(), SessionState::Handshaking, "after byte {i}");
            assert!(session.fingerprint().is_none());
        }
        session.push(&[0x55]);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.fingerprint(), Some("SHA256:mockmockmock"));

        // Later pushes must not disturb what the handshake recorded.
        session.push(b"channel traffic");
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.fingerprint(), Some("SHA256:mockmockmock"));
        assert_eq!(session.userauth("alice").unwrap().len(), 2);
    }

    #[test]
    fn handshake_completion_transmits_through_delivery_callback() {
        let state = MockState::new();
        let sent: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = sent.clone();

        let mut session = session_with(&state);
        session.register_delivery(Box::new(move |data| {
            sink.borrow_mut().extend_from_slice(data);
        }));
        session.push(&vec![0u8; 8]);

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(sent.borrow().as_slice(), b"SSH-2.0-mock kex reply");
    }

    #[test]
    fn userauth_before_ready_is_invalid_state() {
        let state = MockState::new();
        let session = session_with(&state);
        assert!(matches!(
            session.userauth("alice"),
            Err(Error::InvalidState { op: "userauth", .. })
        ));
    }

    #[test]
    fn failed_login_freezes_session_and_poisons_factories() {
        let state = MockState::new();
        let mut session = ready_session(&state);

        let err = session
            .login("alice", &Credential::password("wrong-credential"))
            .unwrap_err();
        assert!(matches!(err, Error::AuthFailed(_)));
        assert_eq!(session.state(), SessionState::Failed);

        let channel = session.channel();
        assert!(!channel.is_active());
        let file = session.sftp("/etc/hosts");
        assert!(!file.is_active());
    }

    #[test]
    fn partial_auth_keeps_session_ready_for_another_attempt() {
        let state = MockState::new();
        state.borrow_mut().partial_password = Some("totp-first".into());
        let mut session = ready_session(&state);

        let outcome = session
            .login("alice", &Credential::password("totp-first"))
            .unwrap();
        assert_eq!(outcome, AuthOutcome::Partial);
        assert_eq!(session.state(), SessionState::Ready);

        let outcome = session
            .login(
                "alice",
                &Credential::InteractiveResponse {
                    responses: vec!["123456".into()],
                },
            )
            .unwrap();
        assert_eq!(outcome, AuthOutcome::Success);
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[test]
    fn login_outside_ready_is_invalid_state() {
        let state = MockState::new();
        let mut session = authenticated_session(&state);
        assert!(matches!(
            session.login("alice", &Credential::password("secret")),
            Err(Error::InvalidState { op: "login", .. })
        ));
    }

    #[test]
    fn factories_before_auth_hand_out_inactive_handles() {
        let state = MockState::new();
        let mut session = ready_session(&state);
        assert!(!session.channel().is_active());
        assert!(!session.sftp("/tmp/f").is_active());
        assert!(!session.sftp_dir("/tmp").is_active());
        // The session itself is untouched by the inactive handles.
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn close_is_idempotent_and_releases_engine_once() {
        let state = MockState::new();
        let mut session = authenticated_session(&state);
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        let disconnects = state
            .borrow()
            .ops
            .iter()
            .filter(|op| op.as_str() == "disconnect")
            .count();
        assert_eq!(disconnects, 1);
    }

    #[test]
    fn push_after_close_is_ignored() {
        let state = MockState::new();
        let mut session = authenticated_session(&state);
        session.close();
        session.push(b"late bytes");
        assert_eq!(session.state(), SessionState::Closed);
    }
}
