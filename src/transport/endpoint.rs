//! MI endpoint session
//!
//! One session per managed drive, opened at drive construction and closed by
//! dropping the session when the drive is retired. The transport mutex makes
//! concurrent submissions against the same endpoint mutually exclusive even
//! though they share one worker thread.

use super::MiTransport;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct MiEndpoint {
    transport: Mutex<Box<dyn MiTransport>>,
    address: Vec<u8>,
    eid: u8,
}

impl MiEndpoint {
    pub(super) fn new(transport: Box<dyn MiTransport>, address: Vec<u8>, eid: u8) -> Arc<Self> {
        Arc::new(Self {
            transport: Mutex::new(transport),
            address,
            eid,
        })
    }

    pub fn eid(&self) -> u8 {
        self.eid
    }

    /// Transport address without the leading family-prefix byte, for logs.
    pub fn display_address(&self) -> String {
        let bare = self.address.get(1..).unwrap_or(&self.address);
        bare.iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }

    /// Run `f` against the transport with the endpoint mutex held.
    ///
    /// Must only be called from the worker thread; the lock is held for the
    /// whole task body so a slow call blocks later submissions against this
    /// endpoint, never the reactor.
    pub fn with_transport<T>(&self, f: impl FnOnce(&mut dyn MiTransport) -> T) -> T {
        let mut guard = self.transport.lock();
        f(guard.as_mut())
    }
}
