//! UDP QUIC blocker (spec §4.1 drop-only mode, §6 UDP filter expression).
//!
//! A second capture handle configured kernel-side as a pure drop filter: outbound UDP to ports
//! 80 and 443 never reaches userspace, forcing QUIC-capable clients to fall back to TCP where
//! the main diversion path can intercept them. No `recv` loop runs against this handle.

use crate::capture::{CaptureDriver, Layer, OpenFlags};
use crate::error::DivertError;

/// The filter string from spec §6, built once and shared by every backend.
pub const UDP_DROP_FILTER: &str = "udp and (udp.DstPort == 80 || udp.DstPort == 443)";

/// Owns the drop-only capture handle. Opening it is the only operation performed against it;
/// the kernel does the dropping, so there is no worker loop to spawn.
pub struct UdpBlocker<D: CaptureDriver> {
    handle: Option<D::Handle>,
}

impl<D: CaptureDriver> UdpBlocker<D> {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Opens the drop handle. Priority is irrelevant to a drop-only filter since it never
    /// competes with the TCP rewrite handle over packet ownership — both can independently claim
    /// their respective protocols.
    pub fn open(&mut self, driver: &D) -> Result<(), DivertError> {
        let handle = driver
            .open(UDP_DROP_FILTER, Layer::Network, 0, OpenFlags::drop_only())
            .map_err(DivertError::from)?;
        self.handle = Some(handle);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn close(&mut self, driver: &D) {
        if let Some(handle) = self.handle.take() {
            driver.close(handle);
        }
    }
}

impl<D: CaptureDriver> Default for UdpBlocker<D> {
    fn default() -> Self {
        Self::new()
    }
}
