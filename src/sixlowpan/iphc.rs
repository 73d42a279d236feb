//! HC01: context based IPv6 header compression
//!
//! A compressed header starts with the dispatch byte, followed by two encoding bytes and then the
//! inline fields, in this order: traffic class / flow label, next header, hop limit, source
//! address, destination address and finally the UDP header when it was folded in.
//!
//! # References
//!
//! - [draft-hui-6lowpan-hc-01][0]
//!
//! [0]: https://tools.ietf.org/html/draft-hui-6lowpan-hc-01

use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::usize;

use crate::{
    ieee802154, ipv6,
    sixlowpan::{
        Compressed, ContextTable, Decompressed, HeaderCodec, Ipv6Codec, LinkAddrs, DISPATCH_IPHC,
        DISPATCH_IPV6, UDP_PORT_MAX, UDP_PORT_MIN,
    },
    udp, Error, Result,
};

// dispatch + encoding bytes + 4 bytes of traffic class / flow label + next header + hop limit +
// two full addresses + an uncompressed UDP NHC header
pub(crate) const MAX_HDR_LEN: usize = 48;

/* encoding[0] */
const TC_C: u8 = 0x80;
const VF_C: u8 = 0x40;
const NH_C: u8 = 0x20;

const TTL_MASK: u8 = 0x18;
const TTL_INLINE: u8 = 0x00;
const TTL_1: u8 = 0x08;
const TTL_64: u8 = 0x10;
const TTL_255: u8 = 0x18;

/* encoding[1] */
const SAM_MASK: u8 = 0xc0;
const SAM_SHIFT: usize = 6;
const SAM_0: u8 = 0xc0;
const SAM_16: u8 = 0x80;
const SAM_64: u8 = 0x40;
const SRC_CTX_SHIFT: usize = 4;
const SRC_CTX_MASK: u8 = 0x30;

const DAM_MASK: u8 = 0x0c;
const DAM_SHIFT: usize = 2;
const DAM_0: u8 = 0x0c;
const DAM_16: u8 = 0x08;
const DAM_64: u8 = 0x04;
const DEST_CTX_MASK: u8 = 0x03;

// address modes after shifting SAM / DAM down; 0b11 is the fully elided form
const ADDR_INLINE: u8 = 0b00;
const ADDR_64: u8 = 0b01;
const ADDR_16: u8 = 0b10;

/* LOWPAN_UDP */
const NHC_UDP_ID: u8 = 0xf8;
const NHC_UDP_ID_MASK: u8 = 0xfc;
const NHC_UDP_I: u8 = 0xf8;
const NHC_UDP_C: u8 = 0xfb;

// compressed multicast address: 101 in the top 3 bits, then the 4-bit scope and the 9-bit group
const MCAST_RANGE: u8 = 0xa0;

/// The HC01 header compression scheme
pub struct IphcCodec;

impl HeaderCodec for IphcCodec {
    fn recognizes(dispatch: u8) -> bool {
        dispatch == DISPATCH_IPHC || dispatch == DISPATCH_IPV6
    }

    fn compress(
        ip: &[u8],
        link: &LinkAddrs,
        contexts: &ContextTable,
        out: &mut [u8],
    ) -> Result<Compressed> {
        let packet = ipv6::Packet::parse(ip)?;

        if out.len() < MAX_HDR_LEN {
            return Err(Error::Exhausted);
        }

        out[0] = DISPATCH_IPHC;
        let mut enc0 = 0;
        let mut enc1 = 0;
        let mut pos = 3;

        // the 'Payload length' field is always elided; the receiver infers it

        // traffic class and flow label
        let tc = packet.get_traffic_class();
        let fl = packet.get_flow_label();
        if fl == 0 {
            enc0 |= VF_C;
            if tc == 0 {
                enc0 |= TC_C;
            } else {
                out[pos] = tc;
                pos += 1;
            }
        } else if tc == 0 {
            enc0 |= TC_C;
            out[pos] = 0x60 | (fl >> 16) as u8;
            NE::write_u16(&mut out[pos + 1..pos + 3], fl as u16);
            pos += 3;
        } else {
            out[pos] = 0x60 | tc >> 4;
            out[pos + 1] = tc << 4 | (fl >> 16) as u8;
            NE::write_u16(&mut out[pos + 2..pos + 4], fl as u16);
            pos += 4;
        }

        // next header, elided for UDP and recovered from the trailing LOWPAN_UDP header
        let is_udp = packet.get_next_header() == ipv6::NextHeader::Udp;
        if is_udp {
            enc0 |= NH_C;
        } else {
            out[pos] = packet.get_next_header().into();
            pos += 1;
        }

        // hop limit
        enc0 |= match packet.get_hop_limit() {
            1 => TTL_1,
            64 => TTL_64,
            255 => TTL_255,
            ttl => {
                out[pos] = ttl;
                pos += 1;
                TTL_INLINE
            }
        };

        // source address; never multicast
        let src = packet.get_source();
        if let Some(context) = contexts.lookup_by_prefix(&src) {
            enc1 |= context.number << SRC_CTX_SHIFT;
            if src.iid_matches(link.source) {
                enc1 |= SAM_0;
            } else if src.is_iid_16_bit_compressible() {
                enc1 |= SAM_16;
                out[pos..pos + 2].copy_from_slice(&src.0[14..]);
                pos += 2;
            } else {
                enc1 |= SAM_64;
                out[pos..pos + 8].copy_from_slice(&src.0[8..]);
                pos += 8;
            }
        } else {
            out[pos..pos + 16].copy_from_slice(&src.0);
            pos += 16;
        }

        // destination address
        let dest = packet.get_destination();
        if dest.is_multicast() {
            if dest.is_mcast_compressible() {
                enc1 |= DAM_16;
                out[pos] = MCAST_RANGE | (dest.0[1] & 0x0f) << 1;
                out[pos + 1] = dest.0[15];
                pos += 2;
            } else {
                out[pos..pos + 16].copy_from_slice(&dest.0);
                pos += 16;
            }
        } else if let Some(context) = contexts.lookup_by_prefix(&dest) {
            enc1 |= context.number;

            let elide = match link.destination {
                Some(ll) => dest.iid_matches(ll),
                None => false,
            };
            if elide {
                enc1 |= DAM_0;
            } else if dest.is_iid_16_bit_compressible() {
                enc1 |= DAM_16;
                out[pos..pos + 2].copy_from_slice(&dest.0[14..]);
                pos += 2;
            } else {
                enc1 |= DAM_64;
                out[pos..pos + 8].copy_from_slice(&dest.0[8..]);
                pos += 8;
            }
        } else {
            out[pos..pos + 16].copy_from_slice(&dest.0);
            pos += 16;
        }

        let mut consumed = usize(ipv6::HEADER_SIZE);

        // UDP header
        if is_udp {
            let udp = udp::Packet::parse(packet.payload())?;
            let sp = udp.get_source();
            let dp = udp.get_destination();

            let in_range = |port| port >= UDP_PORT_MIN && port <= UDP_PORT_MAX;
            if in_range(sp) && in_range(dp) {
                out[pos] = NHC_UDP_C;
                out[pos + 1] = ((sp - UDP_PORT_MIN) as u8) << 4 | (dp - UDP_PORT_MIN) as u8;
                NE::write_u16(&mut out[pos + 2..pos + 4], udp.get_checksum());
                pos += 4;
            } else {
                out[pos] = NHC_UDP_I;
                NE::write_u16(&mut out[pos + 1..pos + 3], sp);
                NE::write_u16(&mut out[pos + 3..pos + 5], dp);
                NE::write_u16(&mut out[pos + 5..pos + 7], udp.get_checksum());
                pos += 7;
            }

            consumed += usize(udp::HEADER_SIZE);
        }

        out[1] = enc0;
        out[2] = enc1;

        Ok(Compressed {
            produced: pos,
            consumed,
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

        if input[0] != DISPATCH_IPHC {
            return Err(Error::UnknownDispatch(input[0]));
        }

        if input.len() < 3 {
            return Err(Error::Truncated);
        }

        if out.len() < MAX_HDR_LEN {
            return Err(Error::Exhausted);
        }

        let enc0 = input[1];
        let enc1 = input[2];
        let mut pos = 3;

        // decode everything before touching `out`, so a bad frame leaves no partial header behind

        // traffic class and flow label
        let (tc, fl) = if enc0 & VF_C == 0 {
            if enc0 & TC_C == 0 {
                let b = take(input, &mut pos, 4)?;
                (
                    b[0] << 4 | b[1] >> 4,
                    u32::from(b[1] & 0x0f) << 16 | u32::from(NE::read_u16(&b[2..])),
                )
            } else {
                let b = take(input, &mut pos, 3)?;
                (0, u32::from(b[0] & 0x0f) << 16 | u32::from(NE::read_u16(&b[1..])))
            }
        } else if enc0 & TC_C == 0 {
            (take(input, &mut pos, 1)?[0], 0)
        } else {
            (0, 0)
        };

        let inline_nh = if enc0 & NH_C == 0 {
            Some(take(input, &mut pos, 1)?[0])
        } else {
            None
        };

        let hop_limit = match enc0 & TTL_MASK {
            TTL_1 => 1,
            TTL_64 => 64,
            TTL_255 => 255,
            _ => take(input, &mut pos, 1)?[0],
        };

        let src = decompress_addr(
            input,
            &mut pos,
            (enc1 & SAM_MASK) >> SAM_SHIFT,
            (enc1 & SRC_CTX_MASK) >> SRC_CTX_SHIFT,
            Some(link.source),
            contexts,
        )?;
        let dest = decompress_addr(
            input,
            &mut pos,
            (enc1 & DAM_MASK) >> DAM_SHIFT,
            enc1 & DEST_CTX_MASK,
            link.destination,
            contexts,
        )?;

        // next header, continued: a LOWPAN_UDP header follows when the field was elided
        let (next_header, udp_fields) = match inline_nh {
            Some(nh) => (nh.into(), None),
            None => {
                let nhc = take(input, &mut pos, 1)?[0];
                if nhc & NHC_UDP_ID_MASK != NHC_UDP_ID {
                    return Err(Error::Malformed);
                }

                let fields = match nhc {
                    NHC_UDP_C => {
                        let b = take(input, &mut pos, 3)?;
                        (
                            UDP_PORT_MIN + u16::from(b[0] >> 4),
                            UDP_PORT_MIN + u16::from(b[0] & 0x0f),
                            NE::read_u16(&b[1..]),
                        )
                    }
                    NHC_UDP_I => {
                        let b = take(input, &mut pos, 6)?;
                        (
                            NE::read_u16(&b[..2]),
                            NE::read_u16(&b[2..4]),
                            NE::read_u16(&b[4..]),
                        )
                    }
                    _ => return Err(Error::Malformed),
                };

                (ipv6::NextHeader::Udp, Some(fields))
            }
        };

        let ip_header = usize(ipv6::HEADER_SIZE);
        let udp_header = usize(udp::HEADER_SIZE);
        let produced = if udp_fields.is_some() {
            ip_header + udp_header
        } else {
            ip_header
        };

        // the 'Payload length' field: announced by the FRAG1 header, or inferred from the frame
        let ip_len = match dgram_size {
            Some(size) => size
                .checked_sub(ipv6::HEADER_SIZE.into())
                .ok_or(Error::Malformed)?,
            None => (input.len() - pos + produced - ip_header) as u16,
        };

        {
            let mut ip = ipv6::Packet::new(&mut out[..ip_header]);
            ip.set_traffic_class(tc);
            ip.set_flow_label(fl);
            unsafe { ip.set_length(ip_len) }
            ip.set_next_header(next_header);
            ip.set_hop_limit(hop_limit);
            ip.set_source(src);
            ip.set_destination(dest);
        }

        if let Some((sp, dp, cksum)) = udp_fields {
            let udp = &mut out[ip_header..produced];
            NE::write_u16(&mut udp[..2], sp);
            NE::write_u16(&mut udp[2..4], dp);
            // the UDP length spans the rest of the IP payload
            NE::write_u16(&mut udp[4..6], ip_len);
            NE::write_u16(&mut udp[6..], cksum);
        }

        Ok(Decompressed {
            consumed: pos,
            produced,
        })
    }
}

fn take<'a>(input: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let bytes = input.get(*pos..*pos + n).ok_or(Error::Truncated)?;
    *pos += n;
    Ok(bytes)
}

fn decompress_addr(
    input: &[u8],
    pos: &mut usize,
    mode: u8,
    ctx: u8,
    ll: Option<ieee802154::Addr>,
    contexts: &ContextTable,
) -> Result<ipv6::Addr> {
    let prefix = |contexts: &ContextTable| {
        contexts
            .lookup_by_number(ctx)
            .map(|c| c.prefix)
            .ok_or(Error::NoContext(ctx))
    };

    let mut addr = ipv6::Addr([0; 16]);
    match mode {
        ADDR_INLINE => {
            addr.0.copy_from_slice(take(input, pos, 16)?);
        }

        ADDR_64 => {
            addr.0[..8].copy_from_slice(&prefix(contexts)?);
            addr.0[8..].copy_from_slice(take(input, pos, 8)?);
        }

        ADDR_16 => {
            let b = take(input, pos, 2)?;
            if b[0] & 0x80 == 0 {
                // unicast: context prefix, 48 zero bits, then the 16 inline IID bits
                addr.0[..8].copy_from_slice(&prefix(contexts)?);
                addr.0[14..].copy_from_slice(b);
            } else {
                // multicast: only the all-nodes and all-routers groups are expressible
                if b[0] & 0xe1 != MCAST_RANGE || (b[1] != 1 && b[1] != 2) {
                    return Err(Error::Malformed);
                }

                addr.0[0] = 0xff;
                addr.0[1] = b[0] >> 1 & 0x0f;
                addr.0[15] = b[1];
            }
        }

        _ => {
            // fully elided: context prefix plus the IID of the link layer address
            addr.0[..8].copy_from_slice(&prefix(contexts)?);
            addr.0[8..].copy_from_slice(&ipv6::iid(ll.ok_or(Error::Unaddressable)?));
        }
    }

    Ok(addr)
}
