//! Listener port storage (spec §4.4 port storage convention, §3 invariants).
//!
//! "Listener ports are stored in network byte order in the comparison hot path to avoid
//! per-packet byte swaps; the public getters/setters convert at the boundary." `NetworkPort`
//! is that internal representation; `ListenerPorts` holds the two atomically so the classifier
//! can read them without locking while `EngineController` enforces the "immutable while
//! running" invariant at the setter boundary.

use std::sync::atomic::{AtomicU32, Ordering};

/// A 16-bit port stored in its wire (big-endian) byte pattern, reinterpreted as a native u16 —
/// directly comparable against `TcpView::src_port_raw`/`dst_port_raw` with no swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPort(u16);

impl NetworkPort {
    pub fn from_host(port: u16) -> Self {
        Self(port.to_be())
    }

    pub fn to_host(self) -> u16 {
        u16::from_be(self.0)
    }

    pub fn raw(self) -> u16 {
        self.0
    }
}

/// The two diverted listener ports, set once before `start()` and read on every packet
/// thereafter (spec §3: "immutable while the engine is running"). `AtomicU32` stands in for a
/// missing `AtomicU16` in std; only the low 16 bits are ever meaningful.
pub struct ListenerPorts {
    http: AtomicU32,
    https: AtomicU32,
}

impl ListenerPorts {
    pub fn new(http_port: u16, https_port: u16) -> Self {
        Self {
            http: AtomicU32::new(NetworkPort::from_host(http_port).raw() as u32),
            https: AtomicU32::new(NetworkPort::from_host(https_port).raw() as u32),
        }
    }

    pub fn http(&self) -> NetworkPort {
        NetworkPort(self.http.load(Ordering::Relaxed) as u16)
    }

    pub fn https(&self) -> NetworkPort {
        NetworkPort(self.https.load(Ordering::Relaxed) as u16)
    }

    /// Only valid to call while the engine is stopped (enforced by `EngineController`, not
    /// here — this type has no notion of engine state).
    pub fn set_http(&self, port: u16) {
        self.http.store(NetworkPort::from_host(port).raw() as u32, Ordering::Relaxed);
    }

    pub fn set_https(&self, port: u16) {
        self.https.store(NetworkPort::from_host(port).raw() as u32, Ordering::Relaxed);
    }
}

impl Default for ListenerPorts {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
