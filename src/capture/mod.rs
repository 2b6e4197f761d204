//! Platform packet-capture shim (spec §4.1).
//!
//! Design note 1: "a polymorphic per-platform diverter becomes a trait/interface with one
//! operation set; platform selection is compile-time." `CaptureDriver` is that interface —
//! open/recv/send/close/set_param/check_filter, generic over an opaque per-backend `Handle`.

#[cfg(target_os = "windows")]
pub mod windivert_backend;

#[cfg(not(target_os = "windows"))]
pub mod stub_backend;

#[cfg(test)]
pub mod test_support;

use crate::config::MAX_PACKET_LEN;
use crate::error::DivertError;

/// The layer a capture handle operates at. The engine only ever needs `Network` (L3), but the
/// type exists so a future link-layer backend has somewhere to plug in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Network,
}

/// Packet direction as reported by (or requested of) the capture facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Flags accepted by `CaptureDriver::open` (spec §4.1: "a drop-only mode is exposed via a
/// flag; in that mode `recv` is never called").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub drop_only: bool,
}

impl OpenFlags {
    pub fn normal() -> Self {
        Self { drop_only: false }
    }

    pub fn drop_only() -> Self {
        Self { drop_only: true }
    }
}

/// Per-packet metadata accompanying a `recv`/`send` (spec §3 Packet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMeta {
    pub direction: Direction,
    pub interface_index: u32,
    pub loopback: bool,
}

/// Tunable queue parameters (spec §4.1: "sets kernel queue length to 8192 packets and queue
/// time to 2048 ms").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueParam {
    Length,
    Time,
}

/// The capture driver contract. One implementation per platform; `windivert_backend` on
/// Windows, `stub_backend` everywhere else (design note 1: compile-time selection).
pub trait CaptureDriver: Send + Sync {
    type Handle: Send + Sync;

    /// Opens a capture handle bound to `filter`. Fatal on failure (spec §4.1).
    fn open(&self, filter: &str, layer: Layer, priority: i16, flags: OpenFlags) -> anyhow::Result<Self::Handle>;

    /// Blocking receive of one packet into `buf`. Never called against a drop-only handle.
    fn recv(&self, handle: &Self::Handle, buf: &mut [u8]) -> anyhow::Result<(usize, PacketMeta)>;

    /// Reinjects `buf` (possibly rewritten) with `meta` describing its (possibly flipped)
    /// direction. Checksums are recomputed by the driver helper (spec §4.4 step 6), not here.
    fn send(&self, handle: &Self::Handle, buf: &[u8], meta: &PacketMeta) -> anyhow::Result<()>;

    fn close(&self, handle: Self::Handle);

    fn set_param(&self, handle: &Self::Handle, param: QueueParam, value: u64) -> anyhow::Result<()>;

    /// Validates an expression before any handle is opened (spec §4.1).
    fn check_filter(&self, filter: &str) -> Result<(), DivertError>;
}

/// Filter expressions used by the two capture handles (spec §6). Kept as a dedicated module —
/// not ad hoc string literals at call sites — so both the TCP and UDP handles go through one
/// reviewed, unit-tested source of truth.
pub mod filter {
    /// TCP rewrite handle: outbound TCP, excluding loopback in both families.
    pub const TCP_REWRITE: &str =
        "outbound and tcp and ((ip and ip.SrcAddr != 127.0.0.1) or (ipv6 and ipv6.SrcAddr != ::1))";

    /// UDP drop handle: unconditionally drops outbound UDP to the two diverted ports.
    pub const UDP_DROP: &str = "udp and (udp.DstPort == 80 || udp.DstPort == 443)";
}

/// A receive buffer sized to the contract maximum (spec §3: "bounded capacity (65535)").
pub fn new_packet_buffer() -> Vec<u8> {
    vec![0u8; MAX_PACKET_LEN]
}
