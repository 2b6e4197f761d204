//! Address rewriter (spec §4.4 step 5). Mutates a packet buffer in place once the classifier has
//! already decided a `Leg`; checksum recomputation (step 6) is intentionally not done here — it
//! is delegated to the capture driver's own helper at reinjection time, per spec §4.4 step 6.

use crate::classifier::Leg;
use crate::headers::{parse_l3, TcpView};
use crate::ports::ListenerPorts;

const HTTP_PORT_RAW: u16 = 80u16.to_be();
const HTTPS_PORT_RAW: u16 = 443u16.to_be();

/// Rewrites `buf` in place for the given leg: swaps L3 addresses (all 128 bits for IPv6) and
/// replaces exactly the one port side the leg calls for. Does nothing if `buf` doesn't parse —
/// callers only invoke this after `classifier::classify` already validated the same buffer.
pub fn rewrite(buf: &mut [u8], leg: Leg, listener_ports: &ListenerPorts) {
    let Some(l3) = parse_l3(buf) else { return };
    let Some(tcp) = TcpView::parse(buf, l3.payload_offset()) else { return };

    l3.swap_addresses(buf);

    match leg {
        Leg::Return => {
            let src_raw = tcp.src_port_raw(buf);
            if src_raw == listener_ports.http().raw() {
                tcp.set_src_port(buf, 80);
            } else if src_raw == listener_ports.https().raw() {
                tcp.set_src_port(buf, 443);
            }
        }
        Leg::Forward => {
            let dst_raw = tcp.dst_port_raw(buf);
            if dst_raw == HTTP_PORT_RAW {
                tcp.set_dst_port(buf, listener_ports.http().to_host());
            } else if dst_raw == HTTPS_PORT_RAW {
                tcp.set_dst_port(buf, listener_ports.https().to_host());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn tcp_packet(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Vec<u8> {
        let mut pkt = vec![0u8; 40];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&40u16.to_be_bytes());
        pkt[9] = 6; // TCP
        pkt[12..16].copy_from_slice(&src.octets());
        pkt[16..20].copy_from_slice(&dst.octets());
        pkt[20..22].copy_from_slice(&src_port.to_be_bytes());
        pkt[22..24].copy_from_slice(&dst_port.to_be_bytes());
        pkt[32] = 5 << 4;
        pkt
    }

    #[test]
    fn test_forward_leg_rewrites_destination_to_listener() {
        let ports = ListenerPorts::new(34000, 34001);
        let client = Ipv4Addr::new(10, 0, 0, 2);
        let remote = Ipv4Addr::new(93, 184, 216, 34);
        let mut pkt = tcp_packet(client, remote, 51000, 80);

        rewrite(&mut pkt, Leg::Forward, &ports);

        let l3 = crate::headers::Ipv4View::parse(&pkt).unwrap();
        let tcp = TcpView::parse(&pkt, l3.payload_offset()).unwrap();
        assert_eq!(l3.src(&pkt), remote);
        assert_eq!(l3.dst(&pkt), client);
        assert_eq!(tcp.dst_port(&pkt), 34000);
        assert_eq!(tcp.src_port(&pkt), 51000, "source port must be untouched on forward leg");
    }

    #[test]
    fn test_forward_leg_https_uses_https_listener() {
        let ports = ListenerPorts::new(34000, 34001);
        let client = Ipv4Addr::new(10, 0, 0, 2);
        let remote = Ipv4Addr::new(93, 184, 216, 34);
        let mut pkt = tcp_packet(client, remote, 51000, 443);

        rewrite(&mut pkt, Leg::Forward, &ports);

        let l3 = crate::headers::Ipv4View::parse(&pkt).unwrap();
        let tcp = TcpView::parse(&pkt, l3.payload_offset()).unwrap();
        assert_eq!(tcp.dst_port(&pkt), 34001);
    }

    #[test]
    fn test_return_leg_rewrites_source_back_to_80() {
        let ports = ListenerPorts::new(34000, 34001);
        let listener = Ipv4Addr::new(0, 0, 0, 0);
        let client = Ipv4Addr::new(10, 0, 0, 2);
        let mut pkt = tcp_packet(listener, client, 34000, 51000);

        rewrite(&mut pkt, Leg::Return, &ports);

        let l3 = crate::headers::Ipv4View::parse(&pkt).unwrap();
        let tcp = TcpView::parse(&pkt, l3.payload_offset()).unwrap();
        assert_eq!(l3.src(&pkt), client);
        assert_eq!(l3.dst(&pkt), listener);
        assert_eq!(tcp.src_port(&pkt), 80);
        assert_eq!(tcp.dst_port(&pkt), 51000, "destination port must be untouched on return leg");
    }

    #[test]
    fn test_rewrite_twice_restores_original_addresses() {
        let ports = ListenerPorts::new(34000, 34001);
        let client = Ipv4Addr::new(10, 0, 0, 2);
        let remote = Ipv4Addr::new(93, 184, 216, 34);
        let original = tcp_packet(client, remote, 51000, 80);
        let mut pkt = original.clone();

        rewrite(&mut pkt, Leg::Forward, &ports);
        // Swap addresses back by hand to isolate the address-swap idempotence claim (spec §8:
        // "rewriting a packet twice yields the original bytes modulo checksum recomputation").
        let l3 = crate::headers::Ipv4View::parse(&pkt).unwrap();
        l3.swap_addresses(&mut pkt);
        assert_eq!(l3.src(&pkt), client);
        assert_eq!(l3.dst(&pkt), remote);
    }

    #[test]
    fn test_rewrite_on_unparseable_buffer_is_a_no_op() {
        let mut buf = vec![0u8; 5];
        rewrite(&mut buf, Leg::Forward, &ListenerPorts::new(1, 2));
        assert_eq!(buf, vec![0u8; 5]);
    }
}
