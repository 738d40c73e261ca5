//! Transport bridge
//!
//! The protocol engine expects something shaped like a non-blocking socket:
//! reads either return data or `WouldBlock`, writes go out immediately.
//! There is no socket here — inbound bytes are pushed in by the host at
//! arbitrary times and outbound bytes leave through a delivery callback —
//! so this module fakes the socket contract on top of a FIFO queue.

use std::collections::VecDeque;
use std::io;

use tracing::trace;

/// Callback invoked once per engine transmission attempt, synchronously,
/// with the exact bytes the engine wants on the wire.
pub type DeliveryFn = Box<dyn FnMut(&[u8])>;

/// FIFO byte queue standing in for a socket.
///
/// Implements [`io::Read`] (head of the queue, `WouldBlock` when empty) and
/// [`io::Write`] (forwarded to the delivery callback, unbuffered) so the
/// engine can be handed a "socket" it never knows is fake.
#[derive(Default)]
pub struct TransportBridge {
    incoming: VecDeque<u8>,
    delivery: Option<DeliveryFn>,
}

impl TransportBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append inbound bytes to the tail of the queue, in call order.
    ///
    /// The bridge itself enforces no size limit; the host bounds it.
    pub fn push(&mut self, data: &[u8]) {
        trace!(len = data.len(), queued = self.incoming.len(), "push");
        self.incoming.extend(data.iter().copied());
    }

    /// Register the single outbound delivery callback. Replaces any
    /// previously registered callback.
    pub fn register_delivery(&mut self, callback: DeliveryFn) {
        self.delivery = Some(callback);
    }

    /// Drop all queued inbound bytes. Used on fatal error or reset.
    pub fn clear(&mut self) {
        self.incoming.clear();
    }

    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }
}

impl io::Read for TransportBridge {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.incoming.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.incoming.len());
        for slot in buf.iter_mut().take(n) {
            // n <= queue length, checked above
            *slot = self.incoming.pop_front().unwrap();
        }
        trace!(n, remaining = self.incoming.len(), "read");
        Ok(n)
    }
}

impl io::Write for TransportBridge {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.delivery.as_mut() {
            Some(deliver) => {
                trace!(len = buf.len(), "deliver");
                deliver(buf);
                Ok(buf.len())
            }
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "no delivery callback registered",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        // Nothing buffered outbound; every write already left.
        Ok(())
    }
}
