//! 6LoWPAN: IPv6 over Low-Power Wireless Personal Area Networks
//!
//! The adaptation layer between IPv6 and 802.15.4 frames: header compression, fragmentation and
//! reassembly.
//!
//! Three header compression schemes are provided, selected at compile time through the
//! [`HeaderCodec`] type parameter of [`Stack`]:
//!
//! - [`Ipv6Codec`]: no compression, just the IPv6 dispatch byte (RFC 4944, Section 5.1)
//! - [`Hc1Codec`]: HC1 / HC_UDP (RFC 4944, Section 10), stateless, link-local only
//! - [`IphcCodec`]: HC01 (draft-hui-6lowpan-hc-01), context based
//!
//! HC1 and HC01 fall back to the plain IPv6 dispatch when a packet defeats compression, and both
//! expand such frames on input as well, so a receiver configured for either scheme can expand
//! every frame a matching sender produces.
//!
//! [`HeaderCodec`]: trait.HeaderCodec.html
//! [`Stack`]: struct.Stack.html
//! [`Ipv6Codec`]: struct.Ipv6Codec.html
//! [`Hc1Codec`]: hc1/struct.Hc1Codec.html
//! [`IphcCodec`]: iphc/struct.IphcCodec.html
//!
//! # References
//!
//! - [RFC 4944: Transmission of IPv6 Packets over IEEE 802.15.4 Networks][0]
//! - [draft-hui-6lowpan-hc-01][1]
//!
//! [0]: https://tools.ietf.org/html/rfc4944
//! [1]: https://tools.ietf.org/html/draft-hui-6lowpan-hc-01

use core::marker::PhantomData;

use cast::usize;

use crate::{
    ieee802154, ipv6,
    mac::Mac,
    time::{Duration, Instant},
    Error, Result,
};

pub mod frag;
pub mod hc1;
pub mod iphc;

pub use self::hc1::Hc1Codec;
pub use self::iphc::IphcCodec;

/// Uncompressed IPv6 dispatch
pub const DISPATCH_IPV6: u8 = 0x41;

/// HC1 dispatch
pub const DISPATCH_HC1: u8 = 0x42;

/// HC01 dispatch
pub const DISPATCH_IPHC: u8 = 0x03;

/// Size of the 802.15.4 payload available to this layer (127 bytes minus the worst case MAC
/// overhead)
pub const MAC_MAX_PAYLOAD: usize = 102;

/// First UDP port of the compressible range
pub const UDP_PORT_MIN: u16 = 0xf0b0;

/// Last UDP port of the compressible range, inclusive
pub const UDP_PORT_MAX: u16 = 0xf0bf;

/// How long a partly reassembled datagram is kept around
pub const REASS_MAXAGE: Duration = Duration::from_secs(20);

/// Number of slots in the address context table
pub const MAX_ADDR_CONTEXTS: usize = 4;

// IPv6 requires every link to carry 1280 byte datagrams; that's exactly what we buffer
const BUFFER_SIZE: usize = 1280;

/// A 64-bit prefix shared by the nodes of a network, referenced on the wire by its number
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddrContext {
    /// Context number (`0..4`); 0 is reserved for the link-local prefix
    pub number: u8,
    /// The address prefix
    pub prefix: [u8; 8],
}

/// The address contexts shared with the rest of the network
///
/// Context 0 always holds the link-local prefix (`fe80::/64`).
#[derive(Clone, Debug)]
pub struct ContextTable {
    contexts: [Option<AddrContext>; MAX_ADDR_CONTEXTS],
}

impl ContextTable {
    /// Creates a context table that only knows the link-local prefix
    pub fn new() -> Self {
        let mut contexts = [None; MAX_ADDR_CONTEXTS];
        contexts[0] = Some(AddrContext {
            number: 0,
            prefix: [0xfe, 0x80, 0, 0, 0, 0, 0, 0],
        });
        ContextTable { contexts }
    }

    /// Installs a context, replacing any existing context with the same number
    ///
    /// Fails with `Error::Malformed` when the context number doesn't fit in the two bits the
    /// encoding reserves for it, and with `Error::Exhausted` when all the slots are taken by
    /// other numbers.
    pub fn install(&mut self, context: AddrContext) -> Result<()> {
        // a wider number would bleed into the adjacent address mode bits on the wire
        if usize::from(context.number) >= MAX_ADDR_CONTEXTS {
            return Err(Error::Malformed);
        }

        for slot in self.contexts.iter_mut() {
            if slot.map_or(true, |c| c.number == context.number) {
                *slot = Some(context);
                return Ok(());
            }
        }

        Err(Error::Exhausted)
    }

    pub(crate) fn lookup_by_prefix(&self, addr: &ipv6::Addr) -> Option<&AddrContext> {
        self.contexts
            .iter()
            .filter_map(|c| c.as_ref())
            .find(|c| c.prefix == addr.0[..8])
    }

    pub(crate) fn lookup_by_number(&self, number: u8) -> Option<&AddrContext> {
        self.contexts
            .iter()
            .filter_map(|c| c.as_ref())
            .find(|c| c.number == number)
    }
}

impl Default for ContextTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The link layer addresses a frame travels between
///
/// On output `source` is our own address; on input it's the sender's. Compression uses these to
/// elide interface identifiers that the other end can recover from the frame itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkAddrs {
    /// The transmitting side
    pub source: ieee802154::Addr,
    /// The receiving side; `None` means link broadcast
    pub destination: Option<ieee802154::Addr>,
}

/// Outcome of a header compression
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Compressed {
    /// Bytes written into the output buffer
    pub produced: usize,
    /// Bytes of the uncompressed packet the compressed header stands for (40, or 48 when the UDP
    /// header was folded in)
    pub consumed: usize,
}

/// Outcome of a header expansion
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Decompressed {
    /// Bytes of input the compressed header occupied
    pub consumed: usize,
    /// Bytes of uncompressed header written into the output buffer
    pub produced: usize,
}

/// A header compression scheme
///
/// The scheme is picked once, at compile time, by instantiating [`Stack`] with an implementer;
/// there's no per-packet scheme negotiation on a 6LoWPAN link.
///
/// [`Stack`]: struct.Stack.html
pub trait HeaderCodec {
    /// Does this scheme understand frames that start with `dispatch`?
    fn recognizes(dispatch: u8) -> bool;

    /// Compresses the header of the IPv6 packet `ip` into the start of `out`
    fn compress(
        ip: &[u8],
        link: &LinkAddrs,
        contexts: &ContextTable,
        out: &mut [u8],
    ) -> Result<Compressed>;

    /// Expands the compressed header at the start of `input` into the start of `out`
    ///
    /// `dgram_size` is the size announced by a FRAG1 header, or `None` when the frame is not a
    /// fragment; it determines the value of the reconstructed 'Payload length' field.
    fn decompress(
        input: &[u8],
        link: &LinkAddrs,
        contexts: &ContextTable,
        dgram_size: Option<u16>,
        out: &mut [u8],
    ) -> Result<Decompressed>;
}

/// No compression: the IPv6 header travels verbatim behind a dispatch byte
pub struct Ipv6Codec;

impl HeaderCodec for Ipv6Codec {
    fn recognizes(dispatch: u8) -> bool {
        dispatch == DISPATCH_IPV6
    }

    fn compress(
        ip: &[u8],
        _link: &LinkAddrs,
        _contexts: &ContextTable,
        out: &mut [u8],
    ) -> Result<Compressed> {
        let header_size = usize(ipv6::HEADER_SIZE);

        if ip.len() < header_size {
            return Err(Error::Truncated);
        }

        if out.len() < 1 + header_size {
            return Err(Error::Exhausted);
        }

        out[0] = DISPATCH_IPV6;
        out[1..=header_size].copy_from_slice(&ip[..header_size]);

        Ok(Compressed {
            produced: 1 + header_size,
            consumed: header_size,
        })
    }

    fn decompress(
        input: &[u8],
        _link: &LinkAddrs,
        _contexts: &ContextTable,
        _dgram_size: Option<u16>,
        out: &mut [u8],
    ) -> Result<Decompressed> {
        let header_size = usize(ipv6::HEADER_SIZE);

        if input.is_empty() {
            return Err(Error::Truncated);
        }

        if input[0] != DISPATCH_IPV6 {
            return Err(Error::UnknownDispatch(input[0]));
        }

        if input.len() < 1 + header_size {
            return Err(Error::Truncated);
        }

        if out.len() < header_size {
            return Err(Error::Exhausted);
        }

        // the header travels verbatim, 'Payload length' field included
        out[..header_size].copy_from_slice(&input[1..=header_size]);

        Ok(Decompressed {
            consumed: 1 + header_size,
            produced: header_size,
        })
    }
}

struct Reassembly {
    size: u16,
    tag: u16,
    sender: ieee802154::Addr,
    /// Bytes of the uncompressed datagram received so far
    processed: u16,
    deadline: Instant,
}

/// The adaptation layer engine
///
/// Owns everything the layer needs between calls: the address context table, the outgoing
/// datagram tag and the single reassembly slot with its 1280 byte buffer. One instance per
/// interface.
pub struct Stack<C>
where
    C: HeaderCodec,
{
    contexts: ContextTable,
    ll_addr: ieee802154::Addr,
    tag: u16,
    reassembly: Option<Reassembly>,
    buffer: [u8; BUFFER_SIZE],
    _codec: PhantomData<C>,
}

impl<C> Stack<C>
where
    C: HeaderCodec,
{
    /// Creates a stack bound to the link layer address `ll_addr`
    pub fn new(ll_addr: ieee802154::Addr) -> Self {
        Stack {
            contexts: ContextTable::new(),
            ll_addr,
            tag: 0,
            reassembly: None,
            buffer: [0; BUFFER_SIZE],
            _codec: PhantomData,
        }
    }

    /// The address context table
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Mutable access to the address context table
    pub fn contexts_mut(&mut self) -> &mut ContextTable {
        &mut self.contexts
    }

    /// Compresses the IPv6 packet and hands it to the MAC, fragmenting it if it doesn't fit in a
    /// single frame
    ///
    /// `dest` is the link layer destination; `None` broadcasts the frame(s).
    pub fn output<M>(
        &mut self,
        mac: &mut M,
        packet: &[u8],
        dest: Option<ieee802154::Addr>,
    ) -> Result<()>
    where
        M: Mac,
    {
        let link = LinkAddrs {
            source: self.ll_addr,
            destination: dest,
        };

        let mut hdr = [0; iphc::MAX_HDR_LEN];
        let c = C::compress(packet, &link, &self.contexts, &mut hdr)?;

        let mut frame = [0; MAC_MAX_PAYLOAD];

        let rest = packet.len() - c.consumed;
        if rest <= MAC_MAX_PAYLOAD - c.produced {
            // fits in a single frame
            frame[..c.produced].copy_from_slice(&hdr[..c.produced]);
            frame[c.produced..c.produced + rest].copy_from_slice(&packet[c.consumed..]);

            return mac.send(dest, &frame[..c.produced + rest]);
        }

        if packet.len() > usize::from(frag::MAX_DATAGRAM_SIZE) {
            return Err(Error::Exhausted);
        }

        let size = packet.len() as u16;
        let tag = self.tag;
        self.tag = self.tag.wrapping_add(1);

        net_debug!("fragmenting datagram: len {}, tag {:#06x}", size, tag);

        // first fragment: FRAG1 header, compressed header, then as much payload as fits rounded
        // down to a multiple of 8 (fragment offsets are in units of 8 bytes)
        let hdr_len = frag::FRAG1_HDR_LEN + c.produced;
        let payload_len = (MAC_MAX_PAYLOAD - hdr_len) & !0x7;

        frag::Frag1 { size, tag }.emit(&mut frame)?;
        frame[frag::FRAG1_HDR_LEN..hdr_len].copy_from_slice(&hdr[..c.produced]);
        frame[hdr_len..hdr_len + payload_len]
            .copy_from_slice(&packet[c.consumed..c.consumed + payload_len]);
        mac.send(dest, &frame[..hdr_len + payload_len])?;

        // `processed` counts bytes of the *uncompressed* datagram
        let mut processed = c.consumed + payload_len;

        let full_payload_len = (MAC_MAX_PAYLOAD - frag::FRAGN_HDR_LEN) & !0x7;
        while processed < packet.len() {
            let chunk = full_payload_len.min(packet.len() - processed);

            frag::FragN {
                size,
                tag,
                offset: (processed >> 3) as u8,
            }
            .emit(&mut frame)?;
            frame[frag::FRAGN_HDR_LEN..frag::FRAGN_HDR_LEN + chunk]
                .copy_from_slice(&packet[processed..processed + chunk]);
            mac.send(dest, &frame[..frag::FRAGN_HDR_LEN + chunk])?;

            processed += chunk;
        }

        Ok(())
    }

    /// Processes the payload of a received frame
    ///
    /// Returns the complete, uncompressed IPv6 datagram once it's available; `Ok(None)` means the
    /// frame was consumed: either a fragment of a still incomplete datagram, or a frame dropped
    /// by the reassembly policy.
    ///
    /// There's a single reassembly slot. While a datagram is being reassembled every frame that's
    /// not one of its fragments is dropped, frames from the same sender included.
    pub fn input(
        &mut self,
        frame: &[u8],
        sender: ieee802154::Addr,
        now: Instant,
    ) -> Result<Option<&[u8]>> {
        self.expire_if_stale(now);

        let fragment = frag::Header::parse(frame)?;

        if let Some(r) = self.reassembly.as_ref() {
            let belongs = match fragment {
                Some((h, _)) => h.size() == r.size && h.tag() == r.tag && sender == r.sender,
                None => false,
            };

            if !belongs {
                net_debug!("reassembly in progress; dropping unrelated frame");
                return Ok(None);
            }
        } else if let Some((h, _)) = fragment {
            if usize::from(h.size()) > self.buffer.len() {
                return Err(Error::Exhausted);
            }

            net_debug!("start of reassembly: len {}, tag {:#06x}", h.size(), h.tag());
            self.reassembly = Some(Reassembly {
                size: h.size(),
                tag: h.tag(),
                sender,
                processed: 0,
                deadline: now + REASS_MAXAGE,
            });
        }

        let link = LinkAddrs {
            source: sender,
            destination: Some(self.ll_addr),
        };

        // only FRAG1 and unfragmented frames carry a compressed header; subsequent fragments
        // carry raw datagram bytes at the offset they declare
        let (produced, consumed, position) = match fragment {
            Some((frag::Header::Subsequent(f), hlen)) => (0, hlen, usize::from(f.offset) * 8),
            Some((frag::Header::First(f), hlen)) => {
                let d = C::decompress(
                    &frame[hlen..],
                    &link,
                    &self.contexts,
                    Some(f.size),
                    &mut self.buffer,
                )
                .map_err(|e| {
                    // a datagram whose first fragment can't be expanded will never complete;
                    // don't let it hold the slot for the rest of the reassembly window
                    self.reassembly = None;
                    e
                })?;

                (d.produced, hlen + d.consumed, 0)
            }
            None => {
                if !C::recognizes(frame[0]) {
                    return Err(Error::UnknownDispatch(frame[0]));
                }

                let d = C::decompress(frame, &link, &self.contexts, None, &mut self.buffer)?;

                (d.produced, d.consumed, 0)
            }
        };

        let payload = &frame[consumed..];
        let start = produced + position;

        if let Some(r) = self.reassembly.as_mut() {
            if start + payload.len() > usize::from(r.size) {
                net_debug!("dropping fragment that overruns its datagram");
                return Ok(None);
            }

            self.buffer[start..start + payload.len()].copy_from_slice(payload);

            if r.processed == 0 {
                r.processed += produced as u16;
            }
            r.processed += payload.len() as u16;

            if r.processed == r.size {
                let len = usize::from(r.size);
                self.reassembly = None;

                net_debug!("datagram reassembled: len {}", len);
                return Ok(Some(&self.buffer[..len]));
            }

            Ok(None)
        } else {
            if start + payload.len() > self.buffer.len() {
                return Err(Error::Exhausted);
            }

            self.buffer[start..start + payload.len()].copy_from_slice(payload);

            Ok(Some(&self.buffer[..produced + payload.len()]))
        }
    }

    /// Discards the in-progress reassembly once it has been sitting for [`REASS_MAXAGE`]
    ///
    /// `input` calls this on every frame; calling it from a timer as well merely bounds how long
    /// the slot stays occupied on a quiet link.
    ///
    /// [`REASS_MAXAGE`]: constant.REASS_MAXAGE.html
    pub fn expire_if_stale(&mut self, now: Instant) {
        if let Some(r) = self.reassembly.as_ref() {
            if now >= r.deadline {
                net_debug!("reassembly timed out: tag {:#06x}", r.tag);
                self.reassembly = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use crate::{
        ieee802154::{Addr, ExtendedAddr},
        ipv6,
        mac::Mac,
        sixlowpan::{frag, AddrContext, ContextTable, IphcCodec, Ipv6Codec, Stack,
                    MAC_MAX_PAYLOAD, REASS_MAXAGE},
        time::{Duration, Instant},
        Error, Result,
    };

    const OURS: Addr = Addr::Extended(ExtendedAddr(0x0102_0304_0506_0708));
    const THEIRS: Addr = Addr::Extended(ExtendedAddr(0x090a_0b0c_0d0e_0f10));

    struct Queue {
        frames: Vec<Vec<u8>>,
    }

    impl Queue {
        fn new() -> Self {
            Queue { frames: Vec::new() }
        }
    }

    impl Mac for Queue {
        fn send(&mut self, _dest: Option<Addr>, frame: &[u8]) -> Result<()> {
            assert!(frame.len() <= MAC_MAX_PAYLOAD);

            self.frames.push(frame.to_vec());
            Ok(())
        }
    }

    fn datagram(payload_len: usize) -> Vec<u8> {
        let mut bytes = vec![0; 40 + payload_len];

        {
            let mut ip = ipv6::Packet::new(&mut bytes[..]);
            ip.set_next_header(ipv6::NextHeader::Udp);
            ip.set_hop_limit(64);
            ip.set_source(ipv6::Addr::from_link_local(THEIRS));
            ip.set_destination(ipv6::Addr::from_link_local(OURS));

            for (i, byte) in ip.payload_mut().iter_mut().enumerate() {
                *byte = i as u8;
            }
        }

        bytes
    }

    #[test]
    fn context_table() {
        let mut table = ContextTable::new();

        // the link-local prefix is preinstalled as context 0
        assert_eq!(
            table.lookup_by_number(0).map(|c| c.prefix),
            Some([0xfe, 0x80, 0, 0, 0, 0, 0, 0])
        );

        let aaaa = AddrContext {
            number: 1,
            prefix: [0xaa, 0xaa, 0, 0, 0, 0, 0, 0],
        };
        table.install(aaaa).unwrap();
        assert_eq!(
            table.lookup_by_prefix(&ipv6::Addr([
                0xaa, 0xaa, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1
            ])),
            Some(&aaaa)
        );

        table
            .install(AddrContext {
                number: 2,
                prefix: [0xbb; 8],
            })
            .unwrap();
        table
            .install(AddrContext {
                number: 3,
                prefix: [0xcc; 8],
            })
            .unwrap();

        // numbers that don't fit in the two encoding bits are refused; a 16-bit compressed
        // source with such a number would read back as a completely different address
        for number in [4, 0x10, 0xff].iter().cloned() {
            assert_eq!(
                table.install(AddrContext {
                    number,
                    prefix: [0xdd; 8],
                }),
                Err(Error::Malformed)
            );
            assert!(table.lookup_by_number(number).is_none());
        }

        // all slots taken; replacing still works
        table
            .install(AddrContext {
                number: 1,
                prefix: [0xee; 8],
            })
            .unwrap();
        assert_eq!(
            table.lookup_by_number(1).map(|c| c.prefix),
            Some([0xee; 8])
        );
    }

    #[test]
    fn single_frame() {
        let packet = datagram(32);

        let mut mac = Queue::new();
        let mut sender = Stack::<Ipv6Codec>::new(THEIRS);
        sender.output(&mut mac, &packet, Some(OURS)).unwrap();

        assert_eq!(mac.frames.len(), 1);
        assert_eq!(mac.frames[0][0], 0x41);

        let mut receiver = Stack::<Ipv6Codec>::new(OURS);
        let delivered = receiver
            .input(&mac.frames[0], THEIRS, Instant::ZERO)
            .unwrap();

        assert_eq!(delivered, Some(&packet[..]));
    }

    #[test]
    fn fragmented_roundtrip() {
        let packet = datagram(3 * MAC_MAX_PAYLOAD);

        let mut mac = Queue::new();
        let mut sender = Stack::<Ipv6Codec>::new(THEIRS);
        sender.output(&mut mac, &packet, Some(OURS)).unwrap();

        assert!(mac.frames.len() > 1);

        // FRAG1 then FRAGN
        assert_eq!(mac.frames[0][0] & 0xf8, 0xc0);
        for frame in &mac.frames[1..] {
            assert_eq!(frame[0] & 0xf8, 0xe0);
        }

        let mut receiver = Stack::<Ipv6Codec>::new(OURS);
        let mut now = Instant::ZERO;
        let (last, rest) = mac.frames.split_last().unwrap();

        for frame in rest {
            assert_eq!(receiver.input(frame, THEIRS, now).unwrap(), None);
            now += Duration::from_millis(10);
        }

        let delivered = receiver.input(last, THEIRS, now).unwrap();
        assert_eq!(delivered, Some(&packet[..]));

        // the slot is free again
        assert!(receiver.reassembly.is_none());
    }

    #[test]
    fn reassembly_guard() {
        let packet = datagram(3 * MAC_MAX_PAYLOAD);

        let mut mac = Queue::new();
        let mut sender = Stack::<Ipv6Codec>::new(THEIRS);
        sender.output(&mut mac, &packet, Some(OURS)).unwrap();

        let mut receiver = Stack::<Ipv6Codec>::new(OURS);
        assert_eq!(
            receiver.input(&mac.frames[0], THEIRS, Instant::ZERO).unwrap(),
            None
        );

        // a FRAG1 with a different tag is dropped, not adopted
        let mut conflicting = mac.frames[0].clone();
        frag::Frag1 {
            size: packet.len() as u16,
            tag: 0xbeef,
        }
        .emit(&mut conflicting)
        .unwrap();
        assert_eq!(
            receiver
                .input(&conflicting, THEIRS, Instant::ZERO)
                .unwrap(),
            None
        );

        // same bytes from a different sender are dropped too
        assert_eq!(
            receiver
                .input(&mac.frames[1], Addr::Extended(ExtendedAddr(0xdead)), Instant::ZERO)
                .unwrap(),
            None
        );

        // as is a whole datagram arriving mid-reassembly
        let small = datagram(8);
        let mut mac2 = Queue::new();
        sender.output(&mut mac2, &small, Some(OURS)).unwrap();
        assert_eq!(
            receiver
                .input(&mac2.frames[0], THEIRS, Instant::ZERO)
                .unwrap(),
            None
        );

        // the original datagram still completes
        let mut delivered = None;
        for frame in &mac.frames[1..] {
            delivered = receiver.input(frame, THEIRS, Instant::ZERO).unwrap();
        }
        assert_eq!(delivered, Some(&packet[..]));
    }

    #[test]
    fn reassembly_timeout() {
        let packet = datagram(3 * MAC_MAX_PAYLOAD);

        let mut mac = Queue::new();
        let mut sender = Stack::<Ipv6Codec>::new(THEIRS);
        sender.output(&mut mac, &packet, Some(OURS)).unwrap();

        let mut receiver = Stack::<Ipv6Codec>::new(OURS);
        let t0 = Instant::ZERO;
        assert_eq!(receiver.input(&mac.frames[0], THEIRS, t0).unwrap(), None);
        assert!(receiver.reassembly.is_some());

        // not yet
        receiver.expire_if_stale(t0 + REASS_MAXAGE - Duration::from_millis(1));
        assert!(receiver.reassembly.is_some());

        receiver.expire_if_stale(t0 + REASS_MAXAGE);
        assert!(receiver.reassembly.is_none());

        // after the timeout a retransmission starts over and completes
        let mut now = t0 + REASS_MAXAGE;
        let mut delivered = None;
        for frame in &mac.frames {
            delivered = receiver.input(frame, THEIRS, now).unwrap();
            now += Duration::from_millis(10);
        }
        assert_eq!(delivered, Some(&packet[..]));
    }

    fn icmpv6_datagram(payload_len: usize) -> Vec<u8> {
        let mut bytes = datagram(payload_len);
        ipv6::Packet::parse(&mut bytes[..])
            .unwrap()
            .set_next_header(ipv6::NextHeader::Icmpv6);
        bytes
    }

    #[test]
    fn unexpandable_first_fragment_frees_the_slot() {
        // both addresses elide through context 1, which only the sender has installed
        let mut packet = icmpv6_datagram(3 * MAC_MAX_PAYLOAD);
        packet[8..10].copy_from_slice(&[0xaa, 0xaa]);
        packet[24..26].copy_from_slice(&[0xaa, 0xaa]);

        let mut mac = Queue::new();
        let mut sender = Stack::<IphcCodec>::new(THEIRS);
        sender
            .contexts_mut()
            .install(AddrContext {
                number: 1,
                prefix: [0xaa, 0xaa, 0, 0, 0, 0, 0, 0],
            })
            .unwrap();
        sender.output(&mut mac, &packet, Some(OURS)).unwrap();

        let mut receiver = Stack::<IphcCodec>::new(OURS);
        assert_eq!(
            receiver.input(&mac.frames[0], THEIRS, Instant::ZERO),
            Err(Error::NoContext(1))
        );

        // the slot isn't left occupied by a datagram that can never complete: an unrelated
        // datagram right after goes through
        assert!(receiver.reassembly.is_none());

        let small = icmpv6_datagram(8);
        let mut mac2 = Queue::new();
        sender.output(&mut mac2, &small, Some(OURS)).unwrap();
        assert_eq!(
            receiver.input(&mac2.frames[0], THEIRS, Instant::ZERO).unwrap(),
            Some(&small[..])
        );
    }

    #[test]
    fn oversized_fragment_dropped() {
        let packet = datagram(3 * MAC_MAX_PAYLOAD);

        let mut mac = Queue::new();
        let mut sender = Stack::<Ipv6Codec>::new(THEIRS);
        sender.output(&mut mac, &packet, Some(OURS)).unwrap();

        let mut receiver = Stack::<Ipv6Codec>::new(OURS);
        assert_eq!(
            receiver.input(&mac.frames[0], THEIRS, Instant::ZERO).unwrap(),
            None
        );

        // a fragment whose payload extends past the declared datagram size is dropped
        let mut bogus = mac.frames.last().unwrap().clone();
        bogus.extend_from_slice(&[0; 32]);
        assert_eq!(
            receiver.input(&bogus, THEIRS, Instant::ZERO).unwrap(),
            None
        );
    }
}
