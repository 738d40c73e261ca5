//! sshbridge - socketless SSH session core
//!
//! Drives a full SSH session — handshake, authentication, exec/shell
//! channels, display forwarding, SFTP — without owning a network socket.
//! The host pushes inbound bytes into the session and registers a delivery
//! callback for outbound bytes; the SSH wire protocol itself lives in an
//! external engine behind the [`engine`] traits.
//!
//! # Features
//! - Push/deliver transport bridge with non-blocking socket semantics
//! - Push-driven handshake and authentication state machine
//! - Channel handles: exec, shell, PTY, env, stdio, display forwarding
//! - SFTP file/dir handles: read, write, readdir, seek/tell, stat family
//! - Single-threaded, call-driven; `WouldBlock` is a value, never a wait
//!
//! # Usage
//!
//! ```ignore
//! let mut session = SessionController::new(config, engine);
//! session.register_delivery(Box::new(|bytes| ws.send(bytes)));
//! session.push(&inbound); // repeat until session.state() == Ready
//! session.login("alice", &Credential::password("..."))?;
//! let mut channel = session.channel();
//! channel.exec("uname -a")?;
//! ```

mod channel;
mod config;
pub mod engine;
mod error;
mod session;
mod sftp;
mod transport;

pub use channel::{ChannelHandle, ForwardedEndpoint, READ_BUF_LEN};
pub use config::{ConnectConfig, Credential};
pub use engine::{AuthOutcome, Engine, EngineError, HandshakeSummary, SharedTransport};
pub use error::{Error, Result};
pub use session::{SessionController, SessionState};
pub use sftp::{DirEntry, FileAttributes, FsStats, SftpHandle};
pub use transport::{DeliveryFn, TransportBridge};
