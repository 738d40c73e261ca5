//! Connection configuration

use serde::{Deserialize, Serialize};

/// Connection descriptor for a session.
///
/// The host opens (and owns) the real transport; this struct only names the
/// endpoint so the session can validate it and tag its logs. Nothing here
/// is ever reinterpreted as a socket address structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    #[serde(default)]
    pub username: String,
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Endpoint validity check used during transport preparation.
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && self.port != 0
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
        }
    }
}

/// Credential presented to [`SessionController::login`].
///
/// [`SessionController::login`]: crate::SessionController::login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Password authentication
    Password { password: String },

    /// One response step of a keyboard-interactive exchange
    InteractiveResponse { responses: Vec<String> },
}

impl Credential {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }
}

fn default_port() -> u16 {
    22
}
