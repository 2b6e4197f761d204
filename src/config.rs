//! Centralized runtime constants for the diversion engine.
//!
//! All tunable queue parameters, sentinel PIDs, and port defaults are collected here so
//! an implementer cannot accidentally drift from the documented contract values.

/// Kernel queue length for the TCP rewrite capture handle, in packets. Spec §4.1: too-small
/// values drop legitimate traffic under burst — this is part of the contract, not a tuning knob.
pub const CAPTURE_QUEUE_LEN: u64 = 8192;

/// Kernel queue time for the TCP rewrite capture handle, in milliseconds.
pub const CAPTURE_QUEUE_TIME_MS: u64 = 2048;

/// Bounded packet buffer capacity (spec §3: "opaque byte buffer of bounded capacity 65535").
pub const MAX_PACKET_LEN: usize = 65535;

/// Sentinel PID meaning "owned by the OS kernel/SYSTEM", mapped to the literal string "SYSTEM"
/// without a syscall (spec §4.2). Windows' `GetExtendedTcpTable` reports this PID for
/// kernel-owned sockets.
pub const SYSTEM_PID: u32 = 4;

/// Returned by the resolver when the kernel table fetch itself failed (spec §4.2: "If the fetch
/// failed, return 0 and log").
pub const RESOLVE_FAILED_PID: u32 = 0;

/// How long an overlapped/event-waited `recv` blocks before re-checking the `running` flag
/// (spec §4.6 / §5: "a 1-second wait bound ensures responsiveness to shutdown").
pub const SHUTDOWN_POLL_INTERVAL_MS: u64 = 1000;

/// Maximum number of TCP option bytes a header view or SOCKS guard ever inspects past the
/// fixed header; mirrors the 40-byte maximum TCP options region.
pub const MAX_TCP_OPTIONS_LEN: usize = 40;

/// Returns the engine's own PID — never filtered (spec §4.4 step 2: "`pid == self_pid`").
pub fn self_pid() -> u32 {
    std::process::id()
}

/// Embedder-supplied engine configuration. Constructed in-process (spec §1: "It does not
/// persist any state across restarts") — there is no config file to load; the engine is
/// linked into a host process through the out-of-core binding shim, which owns the only
/// copy of these values.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Local HTTP acceptor port. 0 means "let the OS pick an ephemeral port" (spec §6).
    pub http_listener_port: u16,
    /// Local HTTPS acceptor port. 0 means "let the OS pick an ephemeral port" (spec §6).
    pub https_listener_port: u16,
    /// Override for `CAPTURE_QUEUE_LEN`; `None` uses the contract default.
    pub queue_len: Option<u64>,
    /// Override for `CAPTURE_QUEUE_TIME_MS`; `None` uses the contract default.
    pub queue_time_ms: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            http_listener_port: 0,
            https_listener_port: 0,
            queue_len: None,
            queue_time_ms: None,
        }
    }
}

impl EngineOptions {
    pub fn effective_queue_len(&self) -> u64 {
        self.queue_len.unwrap_or(CAPTURE_QUEUE_LEN)
    }

    pub fn effective_queue_time_ms(&self) -> u64 {
        self.queue_time_ms.unwrap_or(CAPTURE_QUEUE_TIME_MS)
    }
}
