//! HC1 / HC_UDP: stateless header compression for link-local traffic
//!
//! HC1 only covers the best case: traffic class and flow label zero, both addresses link-local
//! with interface identifiers recoverable from the frame, and ICMPv6, UDP or TCP on top. A UDP
//! header additionally collapses into the HC_UDP form when both ports sit in the 16-port
//! compressible range. Anything else falls back to the plain IPv6 dispatch.
//!
//! # References
//!
//! - [RFC 4944: Transmission of IPv6 Packets over IEEE 802.15.4 Networks][0], Section 10
//!
//! [0]: https://tools.ietf.org/html/rfc4944

use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::usize;

use crate::{
    ipv6,
    sixlowpan::{
        Compressed, ContextTable, Decompressed, HeaderCodec, Ipv6Codec, LinkAddrs, DISPATCH_HC1,
        DISPATCH_IPV6, UDP_PORT_MAX, UDP_PORT_MIN,
    },
    udp, Error, Result,
};

// encoding byte: both prefixes and IIDs compressed (top 5 bits all ones), the protocol in bits
// 2-1 and the HC2 flag in bit 0
const ENC_ICMPV6: u8 = 0xfc;
const ENC_TCP: u8 = 0xfe;
const ENC_UDP: u8 = 0xfa;
const ENC_UDP_C: u8 = 0xfb;

const NH_MASK: u8 = 0x06;
const NH_UDP: u8 = 0x02;
const NH_ICMPV6: u8 = 0x04;
const NH_TCP: u8 = 0x06;
const HC2_FLAG: u8 = 0x01;

// HC_UDP encoding: source port, destination port and length all compressed
const HC_UDP_ALL_C: u8 = 0xe0;

// dispatch, HC1 encoding, hop limit
const HDR_LEN: usize = 3;
// dispatch, HC1 encoding, HC_UDP encoding, hop limit, ports, checksum
const UDP_HDR_LEN: usize = 7;

/// The HC1 header compression scheme
pub struct Hc1Codec;

impl HeaderCodec for Hc1Codec {
    fn recognizes(dispatch: u8) -> bool {
        dispatch == DISPATCH_HC1 || dispatch == DISPATCH_IPV6
    }

    fn compress(
        ip: &[u8],
        link: &LinkAddrs,
        contexts: &ContextTable,
        out: &mut [u8],
    ) -> Result<Compressed> {
        let packet = ipv6::Packet::parse(ip)?;

        let nh = packet.get_next_header();
        let src = packet.get_source();
        let dest = packet.get_destination();
        let compressible = packet.get_traffic_class() == 0
            && packet.get_flow_label() == 0
            && src.is_link_local()
            && src.iid_matches(link.source)
            && dest.is_link_local()
            && link.destination.map_or(false, |ll| dest.iid_matches(ll))
            && match nh {
                ipv6::NextHeader::Icmpv6 | ipv6::NextHeader::Udp | ipv6::NextHeader::Tcp => true,
                _ => false,
            };

        if !compressible {
            return Ipv6Codec::compress(ip, link, contexts, out);
        }

        if out.len() < UDP_HDR_LEN {
            return Err(Error::Exhausted);
        }

        out[0] = DISPATCH_HC1;
        let ttl = packet.get_hop_limit();

        if nh == ipv6::NextHeader::Udp {
            let udp = udp::Packet::parse(packet.payload())?;
            let sp = udp.get_source();
            let dp = udp.get_destination();

            let in_range = |port| port >= UDP_PORT_MIN && port <= UDP_PORT_MAX;
            if in_range(sp) && in_range(dp) {
                out[1] = ENC_UDP_C;
                out[2] = HC_UDP_ALL_C;
                out[3] = ttl;
                out[4] = ((sp - UDP_PORT_MIN) as u8) << 4 | (dp - UDP_PORT_MIN) as u8;
                NE::write_u16(&mut out[5..7], udp.get_checksum());

                return Ok(Compressed {
                    produced: UDP_HDR_LEN,
                    consumed: usize(ipv6::HEADER_SIZE) + usize(udp::HEADER_SIZE),
                });
            }

            // ports outside the compressible range; the UDP header travels in the payload
            out[1] = ENC_UDP;
        } else if nh == ipv6::NextHeader::Tcp {
            out[1] = ENC_TCP;
        } else {
            out[1] = ENC_ICMPV6;
        }

        out[2] = ttl;

        Ok(Compressed {
            produced: HDR_LEN,
            consumed: usize(ipv6::HEADER_SIZE),
        })
    }

    fn decompress(
        input: &[u8],
        link: &LinkAddrs,
        contexts: &ContextTable,
        dgram_size: Option<u16>,
        out: &mut [u8],
    ) -> Result<Decompressed> {
        if input.is_empty() {
            return Err(Error::Truncated);
        }

        if input[0] == DISPATCH_IPV6 {
            // a packet that defeated compression on the sender side
            return Ipv6Codec::decompress(input, link, contexts, dgram_size, out);
        }

        if input[0] != DISPATCH_HC1 {
            return Err(Error::UnknownDispatch(input[0]));
        }

        if input.len() < HDR_LEN {
            return Err(Error::Truncated);
        }

        let ip_header = usize(ipv6::HEADER_SIZE);
        let udp_header = usize(udp::HEADER_SIZE);

        if out.len() < ip_header + udp_header {
            return Err(Error::Exhausted);
        }

        // both addresses were elided; they only exist at the link layer
        let dest_ll = link.destination.ok_or(Error::Unaddressable)?;

        let enc = input[1];
        let (next_header, consumed, udp_fields) = match enc & NH_MASK {
            NH_ICMPV6 => (ipv6::NextHeader::Icmpv6, HDR_LEN, None),
            NH_TCP => (ipv6::NextHeader::Tcp, HDR_LEN, None),
            NH_UDP => {
                if enc & HC2_FLAG == 0 {
                    (ipv6::NextHeader::Udp, HDR_LEN, None)
                } else {
                    if input.len() < UDP_HDR_LEN {
                        return Err(Error::Truncated);
                    }

                    if input[2] != HC_UDP_ALL_C {
                        return Err(Error::Malformed);
                    }

                    let ports = input[4];
                    (
                        ipv6::NextHeader::Udp,
                        UDP_HDR_LEN,
                        Some((
                            UDP_PORT_MIN + u16::from(ports >> 4),
                            UDP_PORT_MIN + u16::from(ports & 0x0f),
                            NE::read_u16(&input[5..7]),
                        )),
                    )
                }
            }
            _ => return Err(Error::Malformed),
        };

        let hop_limit = if udp_fields.is_some() {
            input[3]
        } else {
            input[2]
        };

        let produced = if udp_fields.is_some() {
            ip_header + udp_header
        } else {
            ip_header
        };

        let ip_len = match dgram_size {
            Some(size) => size
                .checked_sub(ipv6::HEADER_SIZE.into())
                .ok_or(Error::Malformed)?,
            None => (input.len() - consumed + produced - ip_header) as u16,
        };

        {
            // `new` already zeroes the traffic class and flow label
            let mut ip = ipv6::Packet::new(&mut out[..ip_header]);
            unsafe { ip.set_length(ip_len) }
            ip.set_next_header(next_header);
            ip.set_hop_limit(hop_limit);
            ip.set_source(ipv6::Addr::from_link_local(link.source));
            ip.set_destination(ipv6::Addr::from_link_local(dest_ll));
        }

        if let Some((sp, dp, cksum)) = udp_fields {
            let udp = &mut out[ip_header..produced];
            NE::write_u16(&mut udp[..2], sp);
            NE::write_u16(&mut udp[2..4], dp);
            // the UDP length spans the rest of the IP payload
            NE::write_u16(&mut udp[4..6], ip_len);
            NE::write_u16(&mut udp[6..], cksum);
        }

        Ok(Decompressed { consumed, produced })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ieee802154::{Addr, ExtendedAddr},
        ipv6,
        sixlowpan::{ContextTable, Hc1Codec, HeaderCodec, Ipv6Codec, LinkAddrs, UDP_PORT_MIN},
        udp,
    };

    const SRC_LL: Addr = Addr::Extended(ExtendedAddr(0x0102_0304_0506_0708));
    const DEST_LL: Addr = Addr::Extended(ExtendedAddr(0x090a_0b0c_0d0e_0f10));

    fn link() -> LinkAddrs {
        LinkAddrs {
            source: SRC_LL,
            destination: Some(DEST_LL),
        }
    }

    fn icmpv6_datagram() -> [u8; 44] {
        let mut bytes = [0; 44];
        let mut ip = ipv6::Packet::new(&mut bytes[..]);
        ip.set_next_header(ipv6::NextHeader::Icmpv6);
        ip.set_hop_limit(64);
        ip.set_source(ipv6::Addr::from_link_local(SRC_LL));
        ip.set_destination(ipv6::Addr::from_link_local(DEST_LL));
        drop(ip);
        bytes
    }

    fn udp_datagram(sport: u16, dport: u16) -> [u8; 52] {
        let mut bytes = [0; 52];
        {
            let mut ip = ipv6::Packet::new(&mut bytes[..]);
            ip.set_next_header(ipv6::NextHeader::Udp);
            ip.set_hop_limit(64);
            ip.set_source(ipv6::Addr::from_link_local(SRC_LL));
            ip.set_destination(ipv6::Addr::from_link_local(DEST_LL));

            let mut udp = udp::Packet::new(ip.payload_mut());
            udp.set_source(sport);
            udp.set_destination(dport);
            udp.set_payload(b"ping");
            udp.update_ipv6_checksum(
                ipv6::Addr::from_link_local(SRC_LL),
                ipv6::Addr::from_link_local(DEST_LL),
            );
        }
        bytes
    }

    fn roundtrip(ip: &[u8]) {
        let contexts = ContextTable::new();
        let mut frame = [0; 128];
        let c = Hc1Codec::compress(ip, &link(), &contexts, &mut frame).unwrap();

        let rest = ip.len() - c.consumed;
        frame[c.produced..c.produced + rest].copy_from_slice(&ip[c.consumed..]);

        let mut out = [0; 128];
        let d = Hc1Codec::decompress(
            &frame[..c.produced + rest],
            &link(),
            &contexts,
            None,
            &mut out,
        )
        .unwrap();
        assert_eq!(d.consumed, c.produced);
        assert_eq!(d.produced, c.consumed);

        out[d.produced..d.produced + rest].copy_from_slice(&frame[d.consumed..c.produced + rest]);
        assert_eq!(&out[..d.produced + rest], &ip[..]);
    }

    #[test]
    fn icmpv6() {
        let bytes = icmpv6_datagram();

        let contexts = ContextTable::new();
        let mut frame = [0; 128];
        let c = Hc1Codec::compress(&bytes, &link(), &contexts, &mut frame).unwrap();

        // dispatch, encoding, hop limit
        assert_eq!(c.produced, 3);
        assert_eq!(c.consumed, 40);
        assert_eq!(&frame[..3], &[0x42, 0xfc, 64]);

        roundtrip(&bytes);
    }

    #[test]
    fn tcp() {
        let mut bytes = icmpv6_datagram();
        ipv6::Packet::parse(&mut bytes[..])
            .unwrap()
            .set_next_header(ipv6::NextHeader::Tcp);

        let contexts = ContextTable::new();
        let mut frame = [0; 128];
        let c = Hc1Codec::compress(&bytes, &link(), &contexts, &mut frame).unwrap();

        assert_eq!(c.produced, 3);
        assert_eq!(c.consumed, 40);
        assert_eq!(&frame[..3], &[0x42, 0xfe, 64]);

        roundtrip(&bytes);
    }

    #[test]
    fn udp_compressed() {
        let bytes = udp_datagram(UDP_PORT_MIN, UDP_PORT_MIN + 1);

        let contexts = ContextTable::new();
        let mut frame = [0; 128];
        let c = Hc1Codec::compress(&bytes, &link(), &contexts, &mut frame).unwrap();

        assert_eq!(c.produced, 7);
        assert_eq!(c.consumed, 48);
        assert_eq!(&frame[..5], &[0x42, 0xfb, 0xe0, 64, 0x01]);

        roundtrip(&bytes);
    }

    #[test]
    fn udp_port_window() {
        // in range, inclusive upper bound
        for &(sp, dp) in &[
            (UDP_PORT_MIN, UDP_PORT_MIN),
            (UDP_PORT_MIN + 15, UDP_PORT_MIN + 15),
        ] {
            let bytes = udp_datagram(sp, dp);
            let mut frame = [0; 128];
            let c = Hc1Codec::compress(&bytes, &link(), &ContextTable::new(), &mut frame).unwrap();
            assert_eq!(c.produced, 7);
        }

        // out of range on either side: the UDP header travels raw behind a 3 byte HC1 header
        for &(sp, dp) in &[
            (UDP_PORT_MIN - 1, UDP_PORT_MIN),
            (UDP_PORT_MIN, UDP_PORT_MIN + 16),
            (5683, 5683),
        ] {
            let bytes = udp_datagram(sp, dp);
            let mut frame = [0; 128];
            let c = Hc1Codec::compress(&bytes, &link(), &ContextTable::new(), &mut frame).unwrap();
            assert_eq!(c.produced, 3);
            assert_eq!(c.consumed, 40);
            assert_eq!(frame[1], 0xfa);

            roundtrip(&bytes);
        }
    }

    #[test]
    fn fallback() {
        let contexts = ContextTable::new();

        // every broken precondition falls back to a frame byte-identical to the uncompressed
        // scheme's
        let mut variants = std::vec::Vec::new();

        let mut bytes = icmpv6_datagram();
        ipv6::Packet::parse(&mut bytes[..])
            .unwrap()
            .set_traffic_class(4);
        variants.push(bytes);

        let mut bytes = icmpv6_datagram();
        ipv6::Packet::parse(&mut bytes[..])
            .unwrap()
            .set_flow_label(99);
        variants.push(bytes);

        let mut bytes = icmpv6_datagram();
        // global unicast source
        bytes[8] = 0x20;
        variants.push(bytes);

        let mut bytes = icmpv6_datagram();
        // source IID not derived from the sender's link layer address
        bytes[15] ^= 1;
        variants.push(bytes);

        let mut bytes = icmpv6_datagram();
        ipv6::Packet::parse(&mut bytes[..])
            .unwrap()
            .set_next_header(ipv6::NextHeader::Unknown(99));
        variants.push(bytes);

        for bytes in &variants {
            let mut frame = [0; 128];
            let c = Hc1Codec::compress(bytes, &link(), &contexts, &mut frame).unwrap();

            let mut expected = [0; 128];
            let e = Ipv6Codec::compress(bytes, &link(), &contexts, &mut expected).unwrap();

            assert_eq!(c, e);
            assert_eq!(&frame[..c.produced], &expected[..e.produced]);
            assert_eq!(frame[0], 0x41);
        }

        // a broadcast frame can't elide the destination either
        let bytes = icmpv6_datagram();
        let broadcast = LinkAddrs {
            source: SRC_LL,
            destination: None,
        };
        let mut frame = [0; 128];
        let c = Hc1Codec::compress(&bytes, &broadcast, &contexts, &mut frame).unwrap();
        assert_eq!(frame[0], 0x41);
        assert_eq!(c.produced, 41);
    }

    #[test]
    fn expands_ipv6_dispatch() {
        // receivers running HC1 still take plain IPv6 frames
        let bytes = icmpv6_datagram();
        let contexts = ContextTable::new();

        let mut frame = [0; 128];
        let c = Ipv6Codec::compress(&bytes, &link(), &contexts, &mut frame).unwrap();
        let rest = bytes.len() - c.consumed;
        frame[c.produced..c.produced + rest].copy_from_slice(&bytes[c.consumed..]);

        let mut out = [0; 128];
        let d = Hc1Codec::decompress(
            &frame[..c.produced + rest],
            &link(),
            &contexts,
            None,
            &mut out,
        )
        .unwrap();
        out[d.produced..d.produced + rest].copy_from_slice(&frame[d.consumed..c.produced + rest]);
        assert_eq!(&out[..d.produced + rest], &bytes[..]);
    }
}
