//! Flow classifier (spec §4.4 steps 1-4) — the per-packet decision function. Pure aside from
//! the SYN-time table write and the resolver's table-cache growth; everything else is read-only
//! inspection of the packet and the shared tables.

use std::net::IpAddr;

use crate::config::{self_pid, SYSTEM_PID};
use crate::firewall::FirewallAuthority;
use crate::flowkey::{AddressFamily, FlowKey, FlowTables};
use crate::headers::{parse_l3, IPPROTO_TCP, L3Header, TcpView};
use crate::ports::ListenerPorts;
use crate::resolver::{ProcessResolver, TcpTableCache};
use crate::sinks::MessageSinks;
use crate::socks_guard::{is_private_v4, is_socks_connect_to_filtered_port};

const HTTP_PORT_RAW: u16 = 80u16.to_be();
const HTTPS_PORT_RAW: u16 = 443u16.to_be();

/// Which side of the diversion a rewrite applies to (spec §4.4 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// Our own proxy's reply, bounced back toward the original client.
    Return,
    /// A fresh client request, bounced toward our local acceptor.
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyDecision {
    PassThrough,
    Drop,
    Rewrite(Leg),
}

/// Runs the full per-packet decision (spec §4.4 steps 1-4) against one outbound packet.
/// `buf` is assumed already passed the kernel filter (no loopback, direction already outbound).
pub fn classify<R: ProcessResolver>(
    buf: &[u8],
    tables: &FlowTables,
    listener_ports: &ListenerPorts,
    resolver: &R,
    firewall: &FirewallAuthority,
    table_cache: &mut TcpTableCache,
    sinks: &MessageSinks,
) -> ClassifyDecision {
    let Some(l3) = parse_l3(buf) else {
        return ClassifyDecision::PassThrough;
    };
    if l3.protocol(buf) != IPPROTO_TCP {
        return ClassifyDecision::PassThrough;
    }
    let Some(tcp) = TcpView::parse(buf, l3.payload_offset()) else {
        return ClassifyDecision::PassThrough;
    };

    let src_port = tcp.src_port(buf);
    let family = match l3 {
        L3Header::V4(_) => AddressFamily::V4,
        L3Header::V6(_) => AddressFamily::V6,
    };
    let table = tables.table(family);
    let key = FlowKey(src_port);

    if tcp.syn(buf) && !tcp.ack(buf) {
        let local_addr: IpAddr = match &l3 {
            L3Header::V4(v) => IpAddr::V4(v.src(buf)),
            L3Header::V6(v) => IpAddr::V6(v.src(buf)),
        };
        let pid = resolver.resolve(src_port, local_addr, table_cache, sinks);
        let binary_path = resolver.binary_path(pid);
        let should_filter = if pid == self_pid() || pid == SYSTEM_PID || binary_path.is_empty() {
            false
        } else {
            firewall.permits(&binary_path)
        };
        table.set(key, should_filter, pid);
    }

    // Private-destination carve-out (IPv4 only, spec §4.4 step 4).
    if let L3Header::V4(v4) = &l3 {
        if is_private_v4(v4.dst(buf)) {
            if table.should_filter(key) {
                let payload = &buf[tcp.payload_offset()..];
                if is_socks_connect_to_filtered_port(payload) {
                    return ClassifyDecision::Drop;
                }
            }
            return ClassifyDecision::PassThrough;
        }
    }

    let src_port_raw = tcp.src_port_raw(buf);
    let dst_port_raw = tcp.dst_port_raw(buf);

    if src_port_raw == listener_ports.http().raw() || src_port_raw == listener_ports.https().raw() {
        return ClassifyDecision::Rewrite(Leg::Return);
    }

    if (dst_port_raw == HTTP_PORT_RAW || dst_port_raw == HTTPS_PORT_RAW) && table.should_filter(key) {
        return ClassifyDecision::Rewrite(Leg::Forward);
    }

    ClassifyDecision::PassThrough
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticResolver;
    use std::net::Ipv4Addr;

    fn tcp_packet(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        syn: bool,
        ack: bool,
        payload: &[u8],
    ) -> Vec<u8> {
        let total_len = 40 + payload.len();
        let mut pkt = vec![0u8; total_len];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        pkt[9] = IPPROTO_TCP;
        pkt[12..16].copy_from_slice(&src.octets());
        pkt[16..20].copy_from_slice(&dst.octets());
        pkt[20..22].copy_from_slice(&src_port.to_be_bytes());
        pkt[22..24].copy_from_slice(&dst_port.to_be_bytes());
        pkt[32] = 5 << 4;
        let mut flags = 0u8;
        if syn {
            flags |= 0x02;
        }
        if ack {
            flags |= 0x10;
        }
        pkt[33] = flags;
        pkt[40..].copy_from_slice(payload);
        pkt
    }

    fn setup() -> (FlowTables, ListenerPorts, MessageSinks) {
        (FlowTables::new(), ListenerPorts::new(34000, 34001), MessageSinks::new())
    }

    #[test]
    fn test_scenario_1_fresh_flow_allowed_binary_is_rewritten_forward() {
        let (tables, ports, sinks) = setup();
        let local = Ipv4Addr::new(10, 0, 0, 5);
        let remote = Ipv4Addr::new(93, 184, 216, 34);
        let resolver = StaticResolver::new()
            .with_row(51000, IpAddr::V4(local), 1234)
            .with_binary_path(1234, "/usr/bin/curl");
        let firewall = FirewallAuthority::new(|p| p == "/usr/bin/curl");
        let mut cache = TcpTableCache::new(16);

        let syn = tcp_packet(local, remote, 51000, 80, true, false, &[]);
        let decision = classify(&syn, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        // The SYN write to should_filter has no early return, so leg determination falls through
        // and rewrites the SYN itself too, not just the data packet that follows it.
        assert_eq!(decision, ClassifyDecision::Rewrite(Leg::Forward));

        assert!(tables.v4.should_filter(FlowKey(51000)));
        assert_eq!(tables.v4.owning_pid(FlowKey(51000)), 1234);

        let data = tcp_packet(local, remote, 51000, 80, false, true, b"GET / HTTP/1.1\r\n");
        let decision = classify(&data, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        assert_eq!(decision, ClassifyDecision::Rewrite(Leg::Forward));
    }

    #[test]
    fn test_scenario_2_fresh_flow_denied_binary_passes_through_forever() {
        let (tables, ports, sinks) = setup();
        let local = Ipv4Addr::new(10, 0, 0, 6);
        let remote = Ipv4Addr::new(8, 8, 8, 8);
        let resolver = StaticResolver::new()
            .with_row(52000, IpAddr::V4(local), 5555)
            .with_binary_path(5555, "/opt/evil");
        let firewall = FirewallAuthority::deny_all();
        let mut cache = TcpTableCache::new(16);

        let syn = tcp_packet(local, remote, 52000, 443, true, false, &[]);
        classify(&syn, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        assert!(!tables.v4.should_filter(FlowKey(52000)));

        let data = tcp_packet(local, remote, 52000, 443, false, true, b"\x16\x03\x01");
        let decision = classify(&data, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        assert_eq!(decision, ClassifyDecision::PassThrough);
    }

    #[test]
    fn test_scenario_3_system_owned_port_never_filters() {
        let (tables, ports, sinks) = setup();
        let local = Ipv4Addr::new(10, 0, 0, 7);
        let remote = Ipv4Addr::new(93, 184, 216, 34);
        let resolver = StaticResolver::new().with_row(53000, IpAddr::V4(local), 4);
        let firewall = FirewallAuthority::allow_all();
        let mut cache = TcpTableCache::new(16);

        let syn = tcp_packet(local, remote, 53000, 80, true, false, &[]);
        classify(&syn, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        assert!(!tables.v4.should_filter(FlowKey(53000)));
        assert_eq!(tables.v4.owning_pid(FlowKey(53000)), 4);
    }

    #[test]
    fn test_scenario_4_private_destination_is_not_rewritten() {
        let (tables, ports, sinks) = setup();
        let local = Ipv4Addr::new(10, 0, 0, 8);
        let remote = Ipv4Addr::new(192, 168, 1, 1);
        let resolver = StaticResolver::new()
            .with_row(54000, IpAddr::V4(local), 1111)
            .with_binary_path(1111, "/usr/bin/curl");
        let firewall = FirewallAuthority::allow_all();
        let mut cache = TcpTableCache::new(16);

        let syn = tcp_packet(local, remote, 54000, 443, true, false, &[]);
        let decision = classify(&syn, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        assert_eq!(decision, ClassifyDecision::PassThrough);
        assert!(tables.v4.should_filter(FlowKey(54000)));
    }

    #[test]
    fn test_scenario_5_socks_evasion_to_private_proxy_is_dropped() {
        let (tables, ports, sinks) = setup();
        let local = Ipv4Addr::new(10, 0, 0, 9);
        let socks_proxy = Ipv4Addr::new(192, 168, 1, 5);
        let resolver = StaticResolver::new()
            .with_row(55000, IpAddr::V4(local), 2222)
            .with_binary_path(2222, "/usr/bin/curl");
        let firewall = FirewallAuthority::allow_all();
        let mut cache = TcpTableCache::new(16);

        let syn = tcp_packet(local, socks_proxy, 55000, 1080, true, false, &[]);
        classify(&syn, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);

        let payload = [0x05, 0x01, 0x00, 0x01, 8, 8, 8, 8, 0x01, 0xBB];
        let data = tcp_packet(local, socks_proxy, 55000, 1080, false, true, &payload);
        let decision = classify(&data, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        assert_eq!(decision, ClassifyDecision::Drop);
    }

    #[test]
    fn test_scenario_6_return_leg_is_rewritten() {
        let (tables, ports, sinks) = setup();
        let resolver = StaticResolver::new();
        let firewall = FirewallAuthority::allow_all();
        let mut cache = TcpTableCache::new(16);

        let local_listener = Ipv4Addr::new(0, 0, 0, 0);
        let client = Ipv4Addr::new(10, 0, 0, 2);
        let reply = tcp_packet(local_listener, client, 34000, 51000, false, true, b"HTTP/1.1 200 OK\r\n");
        let decision = classify(&reply, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        assert_eq!(decision, ClassifyDecision::Rewrite(Leg::Return));
    }

    #[test]
    fn test_non_tcp_protocol_passes_through() {
        let (tables, ports, sinks) = setup();
        let resolver = StaticResolver::new();
        let firewall = FirewallAuthority::allow_all();
        let mut cache = TcpTableCache::new(16);

        let mut pkt = vec![0u8; 28];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&28u16.to_be_bytes());
        pkt[9] = 17; // UDP, not TCP
        let decision = classify(&pkt, &tables, &ports, &resolver, &firewall, &mut cache, &sinks);
        assert_eq!(decision, ClassifyDecision::PassThrough);
    }
}
