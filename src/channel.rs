//! Channel handle
//!
//! Per-channel wrapper over the engine's channel object. The engine handle
//! is held as `Option<Box<dyn EngineChannel>>`: present exactly while the
//! channel is active, taken exactly once on successful close. A handle
//! that was never activated (factory called before authentication) or has
//! been closed answers every operation with [`Error::NotActive`] and does
//! nothing else.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{EngineChannel, EngineError};
use crate::error::{Error, Result};

/// Fixed per-handle read buffer size; one engine read per call at most.
pub const READ_BUF_LEN: usize = 4096;

/// Origin of an inbound display-forwarding connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedEndpoint {
    pub host: String,
    pub port: u32,
}

/// Session-scoped slot holding the most recent unconsumed forwarded
/// endpoint. Shared between the owning session and its channels.
pub(crate) type ForwardSlot = Rc<RefCell<Option<ForwardedEndpoint>>>;

/// Handle to one multiplexed SSH channel.
pub struct ChannelHandle {
    channel: Option<Box<dyn EngineChannel>>,
    /// Reused across reads; contents are overwritten every call.
    buffer: Box<[u8; READ_BUF_LEN]>,
    last_error: Option<Error>,
    forwarded: ForwardSlot,
}

impl ChannelHandle {
    pub(crate) fn new(channel: Box<dyn EngineChannel>, forwarded: ForwardSlot) -> Self {
        Self {
            channel: Some(channel),
            buffer: Box::new([0u8; READ_BUF_LEN]),
            last_error: None,
            forwarded,
        }
    }

    /// A handle that never activates. Handed out by the session factories
    /// when the session is not authenticated.
    pub(crate) fn inactive(forwarded: ForwardSlot) -> Self {
        Self {
            channel: None,
            buffer: Box::new([0u8; READ_BUF_LEN]),
            last_error: None,
            forwarded,
        }
    }

    /// True while the underlying engine channel is held. Transitions to
    /// false exactly once, on successful [`close`](Self::close).
    pub fn is_active(&self) -> bool {
        self.channel.is_some()
    }

    /// Error recorded by the most recent engine-touching operation.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    fn engine(&mut self) -> Result<&mut Box<dyn EngineChannel>> {
        self.channel.as_mut().ok_or(Error::NotActive)
    }

    fn record<T>(&mut self, result: std::result::Result<T, EngineError>) -> Result<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(e) => {
                let err = Error::from(e);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Run `command` on the remote side.
    pub fn exec(&mut self, command: &str) -> Result<()> {
        let result = self.engine()?.exec(command);
        self.record(result)
    }

    /// Start an interactive shell.
    pub fn shell(&mut self) -> Result<()> {
        let result = self.engine()?.shell();
        self.record(result)
    }

    /// Request a PTY of the given terminal type.
    pub fn pty(&mut self, term: &str) -> Result<()> {
        let result = self.engine()?.request_pty(term);
        self.record(result)
    }

    pub fn pty_size(&mut self, width: u32, height: u32) -> Result<()> {
        let result = self.engine()?.pty_size(width, height);
        self.record(result)
    }

    pub fn setenv(&mut self, name: &str, value: &str) -> Result<()> {
        let result = self.engine()?.setenv(name, value);
        self.record(result)
    }

    /// Read up to one buffer of remote stdout.
    ///
    /// No data yet is [`Error::WouldBlock`] — retryable, not a failure.
    /// Only remote-originated bytes ever appear here; locally written data
    /// is never echoed back.
    pub fn read(&mut self) -> Result<Bytes> {
        let channel = self.channel.as_mut().ok_or(Error::NotActive)?;
        let result = channel.read(&mut self.buffer[..]);
        self.finish_read(result)
    }

    /// Read up to one buffer of remote stderr.
    pub fn read_err(&mut self) -> Result<Bytes> {
        let channel = self.channel.as_mut().ok_or(Error::NotActive)?;
        let result = channel.read_stderr(&mut self.buffer[..]);
        self.finish_read(result)
    }

    fn finish_read(&mut self, result: std::result::Result<usize, EngineError>) -> Result<Bytes> {
        match result {
            // A zero-length engine read carries no data either way.
            Ok(0) | Err(EngineError::WouldBlock) => {
                self.last_error = Some(Error::WouldBlock);
                Err(Error::WouldBlock)
            }
            Ok(n) => {
                self.last_error = None;
                Ok(Bytes::copy_from_slice(&self.buffer[..n]))
            }
            Err(e) => {
                let err = Error::from(e);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Write to remote stdin. Returns the number of bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let result = self.engine()?.write(data);
        self.record(result)
    }

    pub fn write_err(&mut self, data: &[u8]) -> Result<usize> {
        let result = self.engine()?.write_stderr(data);
        self.record(result)
    }

    pub fn flush(&mut self) -> Result<()> {
        let result = self.engine()?.flush();
        self.record(result)
    }

    /// True once the remote side has sent EOF.
    pub fn eof(&mut self) -> Result<bool> {
        let result = self.engine()?.eof();
        self.record(result)
    }

    /// Request display forwarding on this channel.
    ///
    /// Inbound forwarded connections land in the owning session's slot and
    /// are consumed via `SessionController::take_forwarded_endpoint`;
    /// [`read`](Self::read) is never repurposed to report them.
    pub fn request_x11(&mut self, screen: u32) -> Result<()> {
        let slot = self.forwarded.clone();
        let result = self.engine()?.request_x11(
            screen,
            Box::new(move |endpoint| {
                debug!(host = %endpoint.host, port = endpoint.port, "forwarded connection");
                *slot.borrow_mut() = Some(endpoint);
            }),
        );
        self.record(result)
    }

    /// Close the channel and release the engine object.
    ///
    /// On engine failure the handle stays active so the host can retry;
    /// once closed, a second call reports [`Error::NotActive`].
    pub fn close(&mut self) -> Result<()> {
        let channel = self.channel.as_mut().ok_or(Error::NotActive)?;
        match channel.close() {
            Ok(()) => {
                self.channel = None;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                let err = Error::from(e);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}
