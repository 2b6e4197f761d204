//! Process-to-socket resolver (spec §4.2).
//!
//! Platform-independent scanning logic lives here so it can be unit-tested against synthetic
//! rows without any FFI; `win_net_table` supplies the real Windows `GetExtendedTcpTable` rows.

#[cfg(target_os = "windows")]
pub mod win_net_table;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::config::{RESOLVE_FAILED_PID, SYSTEM_PID};
use crate::sinks::MessageSinks;

/// One row of the kernel's TCP endpoint table, already decoded from whatever wire format the
/// platform API used. `local_addr` may be the wildcard (all-zeros) address, matching any query
/// address within the same family (spec §4.2: "whose local address matches either the query
/// address or the wildcard address").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpRow {
    pub local_port: u16,
    pub local_addr: IpAddr,
    pub owning_pid: u32,
}

fn is_wildcard(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(a) => a == Ipv4Addr::UNSPECIFIED,
        IpAddr::V6(a) => a == Ipv6Addr::UNSPECIFIED,
    }
}

/// Linear scan for the first row whose local port matches and whose local address matches
/// either the query address or the wildcard address (spec §4.2 algorithm). First match wins;
/// iteration order follows the kernel's table order, which the caller's iterator preserves.
pub fn scan_rows(rows: impl Iterator<Item = TcpRow>, local_port: u16, local_addr: IpAddr) -> Option<u32> {
    for row in rows {
        if row.local_port != local_port {
            continue;
        }
        if row.local_addr == local_addr || is_wildcard(row.local_addr) {
            return Some(row.owning_pid);
        }
    }
    None
}

/// Growable buffer for the kernel's TCP endpoint table (spec §3 "TCP state table cache").
/// Starts small, doubles (or follows a kernel-reported size hint) on insufficient-buffer
/// responses, and is never shrunk. Each worker owns its own instance to avoid contention
/// (spec §3: "each worker may keep its own instance to avoid contention").
pub struct TcpTableCache {
    pub(crate) buf: Vec<u8>,
}

impl TcpTableCache {
    /// `initial_row_size` approximates "the size of one entry" from spec §3; callers on a
    /// real platform pass `size_of::<PlatformRow>() + size_of::<u32>()` (a one-row table plus
    /// its length prefix).
    pub fn new(initial_row_size: usize) -> Self {
        Self { buf: vec![0u8; initial_row_size.max(1)] }
    }

    /// Grows the buffer to `at_least` bytes if it isn't already that large; never shrinks.
    pub fn grow_to_at_least(&mut self, at_least: usize) {
        if self.buf.len() < at_least {
            self.buf.resize(at_least, 0);
        }
    }

    /// Doubles the buffer — the fallback growth strategy when the platform gives no size hint.
    pub fn double(&mut self) {
        let new_len = (self.buf.len() * 2).max(1);
        self.buf.resize(new_len, 0);
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// The public resolver surface (spec §4.2 operations), generic over address family via
/// `IpAddr` so the same trait serves both `resolve_v4` and `resolve_v6`.
pub trait ProcessResolver: Send + Sync {
    /// Resolves the PID owning `local_port`/`local_addr`, growing `table` as needed.
    ///
    /// Returns `SYSTEM_PID` if the fetch succeeded but no row matched (spec §4.2: "If no row
    /// matches but the fetch succeeded, return the sentinel SYSTEM PID"), or
    /// `RESOLVE_FAILED_PID` if the fetch itself failed (logged to `sinks`).
    fn resolve(
        &self,
        local_port: u16,
        local_addr: IpAddr,
        table: &mut TcpTableCache,
        sinks: &MessageSinks,
    ) -> u32;

    /// Returns the full image path for `pid`, or an empty string on any failure — the empty
    /// string is itself meaningful to the classifier ("do not filter", spec §4.2).
    fn binary_path(&self, pid: u32) -> String;
}

/// A resolver backed by a fixed, in-memory table — used in tests and on platforms with no
/// real backend. `resolve` never fails (no FFI to fail), so it only ever returns a looked-up
/// PID or `SYSTEM_PID`.
pub struct StaticResolver {
    rows: Vec<TcpRow>,
    paths: std::collections::HashMap<u32, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self { rows: Vec::new(), paths: std::collections::HashMap::new() }
    }

    pub fn with_row(mut self, local_port: u16, local_addr: IpAddr, pid: u32) -> Self {
        self.rows.push(TcpRow { local_port, local_addr, owning_pid: pid });
        self
    }

    pub fn with_binary_path(mut self, pid: u32, path: impl Into<String>) -> Self {
        self.paths.insert(pid, path.into());
        self
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessResolver for StaticResolver {
    fn resolve(
        &self,
        local_port: u16,
        local_addr: IpAddr,
        _table: &mut TcpTableCache,
        _sinks: &MessageSinks,
    ) -> u32 {
        scan_rows(self.rows.iter().copied(), local_port, local_addr).unwrap_or(SYSTEM_PID)
    }

    fn binary_path(&self, pid: u32) -> String {
        if pid == SYSTEM_PID {
            return "SYSTEM".to_string();
        }
        self.paths.get(&pid).cloned().unwrap_or_default()
    }
}

/// Resolver used when the fetch mechanism itself is unavailable (spec §4.2: "If the fetch
/// failed, return 0 and log").
pub struct FailingResolver;

impl ProcessResolver for FailingResolver {
    fn resolve(
        &self,
        _local_port: u16,
        _local_addr: IpAddr,
        _table: &mut TcpTableCache,
        sinks: &MessageSinks,
    ) -> u32 {
        sinks.warn("TCP table fetch failed; resolver returning 0");
        RESOLVE_FAILED_PID
    }

    fn binary_path(&self, _pid: u32) -> String {
        String::new()
    }
}
