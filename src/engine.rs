//! Protocol engine boundary
//!
//! The SSH wire protocol — key exchange, ciphers, channel multiplexing,
//! SFTP encoding — lives in an external engine behind the traits in this
//! module. The engine is handed a [`SharedTransport`] at attach time and
//! does all of its I/O through it; it must treat `WouldBlock` from the
//! transport as "come back when more bytes have been pushed", never as a
//! failure.
//!
//! Only one component owns each engine object. The session owns the
//! [`Engine`]; each [`ChannelHandle`]/[`SftpHandle`] exclusively owns the
//! channel/file object the engine handed out for it.
//!
//! [`ChannelHandle`]: crate::ChannelHandle
//! [`SftpHandle`]: crate::SftpHandle

use std::cell::RefCell;
use std::rc::Rc;

use crate::channel::ForwardedEndpoint;
use crate::config::Credential;
use crate::sftp::{FileAttributes, FsStats};
use crate::transport::TransportBridge;

/// Transport shared between the session and the engine. Single-threaded by
/// design; there is no lock because there is no second thread.
pub type SharedTransport = Rc<RefCell<TransportBridge>>;

/// Error surface of the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// The engine needs more inbound bytes before it can make progress.
    WouldBlock,
    /// Engine-specific failure code, passed through verbatim.
    Code(i32),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Produced exactly once, at the moment the handshake completes.
#[derive(Debug, Clone)]
pub struct HandshakeSummary {
    /// Digest identifying the remote host's public key.
    pub fingerprint: String,
    /// Authentication method names the server permits.
    pub auth_methods: Vec<String>,
}

/// Result of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    /// Accepted so far, but another step is required (keyboard-interactive).
    Partial,
    Rejected,
}

/// Callback invoked when the server opens an inbound forwarded connection.
pub type ForwardCallback = Box<dyn FnMut(ForwardedEndpoint)>;

/// One SSH session inside the protocol engine.
pub trait Engine {
    /// Hand the engine its transport and put it in non-blocking mode.
    fn attach(&mut self, transport: SharedTransport) -> EngineResult<()>;

    /// Advance the handshake by at most one step.
    ///
    /// `Ok(None)` means more inbound bytes are needed; `Ok(Some(_))` means
    /// the handshake just completed.
    fn handshake_step(&mut self) -> EngineResult<Option<HandshakeSummary>>;

    /// Attempt one credential authentication step.
    fn authenticate(&mut self, user: &str, credential: &Credential) -> EngineResult<AuthOutcome>;

    /// Open a new multiplexed session channel.
    fn open_channel(&mut self) -> EngineResult<Box<dyn EngineChannel>>;

    /// Open `path` as a file through the SFTP subsystem.
    fn open_sftp_file(&mut self, path: &str) -> EngineResult<Box<dyn EngineFile>>;

    /// Open `path` as a directory through the SFTP subsystem.
    fn open_sftp_dir(&mut self, path: &str) -> EngineResult<Box<dyn EngineFile>>;

    /// Tear the session down. Called exactly once.
    fn disconnect(&mut self);
}

/// One multiplexed channel inside an engine session.
pub trait EngineChannel {
    fn exec(&mut self, command: &str) -> EngineResult<()>;
    fn shell(&mut self) -> EngineResult<()>;
    fn request_pty(&mut self, term: &str) -> EngineResult<()>;
    fn pty_size(&mut self, width: u32, height: u32) -> EngineResult<()>;
    fn setenv(&mut self, name: &str, value: &str) -> EngineResult<()>;

    /// Read remote stdout bytes into `buf`; `WouldBlock` when none queued.
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> EngineResult<usize>;
    fn write(&mut self, data: &[u8]) -> EngineResult<usize>;
    fn write_stderr(&mut self, data: &[u8]) -> EngineResult<usize>;
    fn flush(&mut self) -> EngineResult<()>;

    /// True once the remote side has sent EOF.
    fn eof(&mut self) -> EngineResult<bool>;

    /// Request display forwarding; `on_connect` fires for each inbound
    /// forwarded connection the server opens.
    fn request_x11(&mut self, screen: u32, on_connect: ForwardCallback) -> EngineResult<()>;

    /// Close and release the channel. May fail transiently; retryable.
    fn close(&mut self) -> EngineResult<()>;
}

/// One open file or directory handle inside the SFTP subsystem.
pub trait EngineFile {
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize>;
    fn write(&mut self, data: &[u8]) -> EngineResult<usize>;

    /// Next directory entry, or `Ok(None)` once the listing is exhausted.
    fn readdir(&mut self) -> EngineResult<Option<(String, FileAttributes)>>;

    fn seek(&mut self, offset: u64);
    fn tell(&self) -> u64;

    fn fstat(&mut self) -> EngineResult<FileAttributes>;
    fn fsetstat(&mut self, attrs: &FileAttributes) -> EngineResult<()>;
    fn fstatvfs(&mut self) -> EngineResult<FsStats>;
    fn fsync(&mut self) -> EngineResult<()>;

    fn close(&mut self) -> EngineResult<()>;
}
