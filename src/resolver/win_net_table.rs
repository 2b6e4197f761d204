//! Windows IP Helper FFI backend for `ProcessResolver` (spec §4.2).
//!
//! Wraps `GetExtendedTcpTable` from `iphlpapi.dll` for both address families, plus
//! `QueryFullProcessImageNameW` from `kernel32.dll` for `binary_path`. Only the TCP table is
//! queried — UDP traffic on ports 80/443 is dropped unconditionally (spec §4.1) and never
//! needs a PID.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::config::SYSTEM_PID;
use crate::resolver::{ProcessResolver, TcpRow, TcpTableCache};
use crate::sinks::MessageSinks;

const AF_INET: u32 = 2;
const AF_INET6: u32 = 23;
const TCP_TABLE_OWNER_PID_ALL: u32 = 5;
const NO_ERROR: u32 = 0;
const ERROR_INSUFFICIENT_BUFFER: u32 = 122;

#[repr(C)]
struct MibTcpRowOwnerPid {
    state: u32,
    local_addr: u32,
    local_port: u32,
    remote_addr: u32,
    remote_port: u32,
    owning_pid: u32,
}

#[repr(C)]
struct MibTcp6RowOwnerPid {
    local_addr: [u8; 16],
    local_scope_id: u32,
    local_port: u32,
    remote_addr: [u8; 16],
    remote_scope_id: u32,
    remote_port: u32,
    state: u32,
    owning_pid: u32,
}

#[link(name = "iphlpapi")]
extern "system" {
    fn GetExtendedTcpTable(
        pTcpTable: *mut u8,
        pdwSize: *mut u32,
        bOrder: i32,
        ulAf: u32,
        TableClass: u32,
        Reserved: u32,
    ) -> u32;
}

const PROCESS_QUERY_LIMITED_INFORMATION: u32 = 0x1000;

#[link(name = "kernel32")]
extern "system" {
    fn OpenProcess(dwDesiredAccess: u32, bInheritHandle: i32, dwProcessId: u32) -> *mut core::ffi::c_void;
    fn CloseHandle(hObject: *mut core::ffi::c_void) -> i32;
    fn QueryFullProcessImageNameW(
        hProcess: *mut core::ffi::c_void,
        dwFlags: u32,
        lpExeName: *mut u16,
        lpdwSize: *mut u32,
    ) -> i32;
}

/// Runs one `GetExtendedTcpTable` call against `table`'s buffer, growing it (following the
/// kernel's size hint, or doubling if the hint isn't larger) until the call succeeds.
fn fetch_tcp_table(table: &mut TcpTableCache, af: u32) -> Result<u32, u32> {
    loop {
        let mut size = table.buf.len() as u32;
        let ret = unsafe {
            GetExtendedTcpTable(table.buf.as_mut_ptr(), &mut size, 0, af, TCP_TABLE_OWNER_PID_ALL, 0)
        };
        match ret {
            NO_ERROR => return Ok(size),
            ERROR_INSUFFICIENT_BUFFER => {
                table.grow_to_at_least(size as usize);
                if table.buf.len() < size as usize {
                    table.double();
                }
            }
            other => return Err(other),
        }
    }
}

fn parse_v4_rows(buf: &[u8], len: u32) -> Vec<TcpRow> {
    if (len as usize) < 4 {
        return Vec::new();
    }
    let num_entries = u32::from_ne_bytes(buf[0..4].try_into().unwrap()) as usize;
    let row_size = std::mem::size_of::<MibTcpRowOwnerPid>();
    let mut rows = Vec::with_capacity(num_entries);
    for i in 0..num_entries {
        let offset = 4 + i * row_size;
        if offset + row_size > buf.len() {
            break;
        }
        let row = unsafe { &*(buf.as_ptr().add(offset) as *const MibTcpRowOwnerPid) };
        rows.push(TcpRow {
            local_port: u16::from_be(row.local_port as u16),
            local_addr: IpAddr::V4(Ipv4Addr::from(row.local_addr.to_ne_bytes())),
            owning_pid: row.owning_pid,
        });
    }
    rows
}

fn parse_v6_rows(buf: &[u8], len: u32) -> Vec<TcpRow> {
    if (len as usize) < 4 {
        return Vec::new();
    }
    let num_entries = u32::from_ne_bytes(buf[0..4].try_into().unwrap()) as usize;
    let row_size = std::mem::size_of::<MibTcp6RowOwnerPid>();
    let mut rows = Vec::with_capacity(num_entries);
    for i in 0..num_entries {
        let offset = 4 + i * row_size;
        if offset + row_size > buf.len() {
            break;
        }
        let row = unsafe { &*(buf.as_ptr().add(offset) as *const MibTcp6RowOwnerPid) };
        rows.push(TcpRow {
            local_port: u16::from_be(row.local_port as u16),
            local_addr: IpAddr::V6(Ipv6Addr::from(row.local_addr)),
            owning_pid: row.owning_pid,
        });
    }
    rows
}

/// `ProcessResolver` backed by the real Windows IP Helper API.
pub struct WinNetTableResolver;

impl WinNetTableResolver {
    pub fn new() -> Self {
        Self
    }

    /// Buffer size holding exactly one `MibTcpRowOwnerPid` plus the 4-byte entry count —
    /// "the size of one entry" from spec §3.
    pub fn initial_v4_buffer_size() -> usize {
        4 + std::mem::size_of::<MibTcpRowOwnerPid>()
    }

    pub fn initial_v6_buffer_size() -> usize {
        4 + std::mem::size_of::<MibTcp6RowOwnerPid>()
    }
}

impl Default for WinNetTableResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessResolver for WinNetTableResolver {
    fn resolve(
        &self,
        local_port: u16,
        local_addr: IpAddr,
        table: &mut TcpTableCache,
        sinks: &MessageSinks,
    ) -> u32 {
        let af = match local_addr {
            IpAddr::V4(_) => AF_INET,
            IpAddr::V6(_) => AF_INET6,
        };
        let fetched = fetch_tcp_table(table, af);
        match fetched {
            Ok(len) => {
                let rows = match local_addr {
                    IpAddr::V4(_) => parse_v4_rows(&table.buf, len),
                    IpAddr::V6(_) => parse_v6_rows(&table.buf, len),
                };
                crate::resolver::scan_rows(rows.into_iter(), local_port, local_addr).unwrap_or(SYSTEM_PID)
            }
            Err(code) => {
                sinks.warn(&format!("GetExtendedTcpTable failed with code {code}"));
                crate::config::RESOLVE_FAILED_PID
            }
        }
    }

    fn binary_path(&self, pid: u32) -> String {
        if pid == SYSTEM_PID {
            return "SYSTEM".to_string();
        }
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return String::new();
            }
            let mut buf = vec![0u16; 1024];
            let mut size = buf.len() as u32;
            let ok = QueryFullProcessImageNameW(handle, 0, buf.as_mut_ptr(), &mut size);
            CloseHandle(handle);
            if ok == 0 {
                return String::new();
            }
            String::from_utf16_lossy(&buf[..size as usize])
        }
    }
}
