//! IPv6: Internet Protocol v6
//!
//! # References
//!
//! - [RFC 4291 IP Version 6 Addressing Architecture][rfc]
//! - [RFC 4944 Transmission of IPv6 Packets over IEEE 802.15.4 Networks][rfc4944], Section 6
//!   (stateless address autoconfiguration)
//!
//! [rfc]: https://tools.ietf.org/html/rfc4291
//! [rfc4944]: https://tools.ietf.org/html/rfc4944

use core::{
    fmt,
    ops::{Range, RangeFrom, RangeTo},
    u16,
};

use as_slice::{AsMutSlice, AsSlice};
use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::{u32, usize};
use hash32_derive::Hash32;

use crate::{ieee802154, traits::UncheckedIndex, Error};

/* Packet structure */
const V: usize = 0;
mod v {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: usize = 4;
    pub const SIZE: usize = 4;
}

const TC: RangeTo<usize> = ..2;
mod tc {
    pub const MASK: u16 = (1 << SIZE) - 1;
    pub const OFFSET: usize = 4;
    pub const SIZE: usize = 8;
}

const FLH: usize = 1;
const FLL: Range<usize> = 2..4;

const LENGTH: Range<usize> = 4..6;
const NEXT_HEADER: usize = 6;
const HOP_LIMIT: usize = 7;
const SOURCE: Range<usize> = 8..24;
const DESTINATION: Range<usize> = 24..40;
const PAYLOAD: RangeFrom<usize> = 40..;

/// Fixed header size, in bytes
pub const HEADER_SIZE: u8 = DESTINATION.end as u8;

full_range!(
    u8,
    /// Next header protocol number
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum NextHeader {
        /// Transmission Control Protocol
        Tcp = 6,
        /// User Datagram Protocol
        Udp = 17,
        /// ICMP for IPv6
        Icmpv6 = 58,
    }
);

/// IPv6 packet
pub struct Packet<BUFFER>
where
    BUFFER: AsSlice<Element = u8>,
{
    buffer: BUFFER,
}

impl<B> Packet<B>
where
    B: AsSlice<Element = u8>,
{
    /* Constructors */
    /// Parses bytes into an IPv6 packet
    pub fn parse(bytes: B) -> Result<Self, Error> {
        if bytes.as_slice().len() < usize(HEADER_SIZE) {
            // smaller than header
            return Err(Error::Truncated);
        }

        let p = Packet { buffer: bytes };

        if get!((p.header()[V]), v) != 6 {
            // version is not `6`
            return Err(Error::Malformed);
        }

        Ok(p)
    }

    /* Accessors */
    /// Reads the 'Version' field
    ///
    /// This always returns `6`
    pub fn get_version(&self) -> u8 {
        debug_assert_eq!(get!(&self.header()[V], v), 6);

        6
    }

    /// Reads the 'Traffic Class' field
    pub fn get_traffic_class(&self) -> u8 {
        get!(NE::read_u16(&self.header()[TC]), tc) as u8
    }

    /// Reads the 'Flow Label' field (20 bits)
    pub fn get_flow_label(&self) -> u32 {
        let mask = (1 << 4) - 1;

        (u32(self.header()[FLH]) & mask) << 16 | u32(NE::read_u16(&self.header()[FLL]))
    }

    /// Reads the 'Payload length' field
    pub fn get_length(&self) -> u16 {
        NE::read_u16(&self.header()[LENGTH])
    }

    /// Reads the 'Next Header' field
    pub fn get_next_header(&self) -> NextHeader {
        self.header()[NEXT_HEADER].into()
    }

    /// Reads the 'Hop Limit' field
    pub fn get_hop_limit(&self) -> u8 {
        self.header()[HOP_LIMIT]
    }

    /// Reads the 'Source Address' field
    pub fn get_source(&self) -> Addr {
        unsafe { Addr(*(self.as_slice().as_ptr().add(SOURCE.start) as *const _)) }
    }

    /// Reads the 'Destination Address' field
    pub fn get_destination(&self) -> Addr {
        unsafe { Addr(*(self.as_slice().as_ptr().add(DESTINATION.start) as *const _)) }
    }

    /// Immutable view into the payload
    pub fn payload(&self) -> &[u8] {
        unsafe { self.as_slice().rf(PAYLOAD) }
    }

    /// Returns the byte representation of this packet
    pub fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }

    /* Private */
    fn header(&self) -> &[u8; HEADER_SIZE as usize] {
        debug_assert!(self.as_slice().len() >= usize(HEADER_SIZE));

        unsafe { &*(self.as_slice().as_ptr() as *const _) }
    }

    fn as_slice(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}

impl<B> Packet<B>
where
    B: AsMutSlice<Element = u8>,
{
    /* Constructors */
    /// Transforms the given buffer into an IPv6 packet
    ///
    /// Most of the header will be filled with sensible defaults:
    ///
    /// - Version = 6
    /// - Traffic class = 0
    /// - Flow label = 0
    /// - Length = buffer.len() - HEADER_SIZE
    /// - Hop limit = 255
    ///
    /// The fields that are left unpopulated are:
    ///
    /// - Next header
    /// - Source address
    /// - Destination address
    ///
    /// # Panics
    ///
    /// This constructor panics if
    ///
    /// - the given `buffer` is smaller than `HEADER_SIZE`
    /// - the packet would result in a payload length larger than `u16::MAX`.
    pub fn new(buffer: B) -> Self {
        let blen = buffer.as_slice().len();
        assert!(blen >= usize(HEADER_SIZE) && blen <= usize(u16::MAX) + usize(HEADER_SIZE));

        let mut p = Packet { buffer };

        p.set_version();
        p.set_traffic_class(0);
        p.set_flow_label(0);
        // NOTE(cast) see `assert` above
        unsafe { p.set_length((blen - usize(HEADER_SIZE)) as u16) }
        // p.set_next_header(..);
        p.set_hop_limit(255);
        // p.set_source(..);
        // p.set_destination(..);

        p
    }

    /// Sets the 'Traffic class' field
    pub fn set_traffic_class(&mut self, tc: u8) {
        let mask = (1 << 4) - 1;

        // low byte
        let tcl = &mut self.header_mut()[1];
        *tcl &= !(mask << 4);
        *tcl |= (tc & mask) << 4;

        // high byte
        let tch = &mut self.header_mut()[0];
        *tch &= !mask;
        *tch |= tc >> 4;
    }

    /// Sets the 'Flow label' field
    pub fn set_flow_label(&mut self, fl: u32) {
        // low half-word
        NE::write_u16(&mut self.header_mut()[2..4], fl as u16);

        // high byte
        let mask = (1 << 4) - 1;
        let flh = &mut self.header_mut()[1];
        *flh &= !mask;
        *flh |= (fl >> 16) as u8;
    }

    /// Sets the 'Next Header' field
    pub fn set_next_header(&mut self, nh: NextHeader) {
        self.header_mut()[NEXT_HEADER] = nh.into();
    }

    /// Sets the 'Hop limit' field
    pub fn set_hop_limit(&mut self, hl: u8) {
        self.header_mut()[HOP_LIMIT] = hl;
    }

    /// Sets the 'Source address' field
    pub fn set_source(&mut self, addr: Addr) {
        self.header_mut()[SOURCE].copy_from_slice(&addr.0)
    }

    /// Sets the 'Destination address' field
    pub fn set_destination(&mut self, addr: Addr) {
        self.header_mut()[DESTINATION].copy_from_slice(&addr.0)
    }

    /// Mutable view into the payload
    pub fn payload_mut(&mut self) -> &mut [u8] {
        unsafe { self.as_mut_slice().rfm(PAYLOAD) }
    }

    /* Private / crate */
    fn header_mut(&mut self) -> &mut [u8; HEADER_SIZE as usize] {
        debug_assert!(self.as_slice().len() >= usize(HEADER_SIZE));

        unsafe { &mut *(self.as_mut_slice().as_mut_ptr() as *mut _) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }

    fn set_version(&mut self) {
        set!(self.header_mut()[V], v, 6);
    }

    // NOTE(unsafe) this does *not* truncate the buffer or check if `len` is greater than the
    // length of the current buffer
    pub(crate) unsafe fn set_length(&mut self, len: u16) {
        NE::write_u16(&mut self.header_mut()[LENGTH], len);
    }
}

impl<B> fmt::Debug for Packet<B>
where
    B: AsSlice<Element = u8>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::fmt::Quoted;

        f.debug_struct("ipv6::Packet")
            .field("version", &self.get_version())
            .field("traffic_class", &self.get_traffic_class())
            .field("flow_label", &self.get_flow_label())
            .field("length", &self.get_length())
            .field("next_header", &self.get_next_header())
            .field("hop_limit", &self.get_hop_limit())
            .field("source", &Quoted(self.get_source()))
            .field("destination", &Quoted(self.get_destination()))
            // .field("payload", &self.payload())
            .finish()
    }
}

/// IPv6 address
#[derive(Clone, Copy, Debug, Eq, Hash32, PartialEq)]
pub struct Addr(pub [u8; 16]);

impl Addr {
    // Section 2.5.2
    /// Unspecified address
    pub const UNSPECIFIED: Self = Addr([0; 16]);

    /// All link-local nodes multicast address
    pub const ALL_NODES: Self = Addr([0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    /// All link-local routers multicast address
    pub const ALL_ROUTERS: Self = Addr([0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);

    // Section 2.5.6
    /// Is this a link local address?
    pub fn is_link_local(&self) -> bool {
        self.0[..8] == [0xfe, 0x80, 0, 0, 0, 0, 0, 0]
    }

    // Section 2.7
    /// Is this a multicast address?
    pub fn is_multicast(&self) -> bool {
        self.0[0] == 0xff
    }

    /// Is this the unspecified address?
    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    /// The link-local address autoconfigured from the link layer address `ll`
    ///
    /// Extended addresses map through their EUI-64; short addresses map through the
    /// `0000:00ff:fe00:XXXX` pseudo interface identifier of RFC 4944.
    pub fn from_link_local(ll: ieee802154::Addr) -> Self {
        let mut addr = Addr([0; 16]);
        addr.0[0] = 0xfe;
        addr.0[1] = 0x80;
        addr.0[8..].copy_from_slice(&iid(ll));
        addr
    }

    /// Can the interface identifier of this address be recovered from the link layer address
    /// `ll`?
    pub fn iid_matches(&self, ll: ieee802154::Addr) -> bool {
        self.0[8..] == iid(ll)
    }

    // The top 49 bits of the interface identifier are zero, so the IID fits in 16 bits on the
    // wire. The 49th bit doubles as the unicast / multicast discriminator of the compressed form,
    // hence it must be zero as well.
    pub(crate) fn is_iid_16_bit_compressible(&self) -> bool {
        self.0[8..14] == [0; 6] && self.0[14] & 0x80 == 0
    }

    // Multicast address with zero flags whose 112-bit group id maps to a 9-bit group; only the
    // all-nodes and all-routers groups do
    pub(crate) fn is_mcast_compressible(&self) -> bool {
        self.0[1] & 0xf0 == 0
            && self.0[2..15] == [0; 13]
            && (self.0[15] == 1 || self.0[15] == 2)
    }
}

/// Interface identifier derived from a link layer address
pub(crate) fn iid(ll: ieee802154::Addr) -> [u8; 8] {
    match ll {
        ieee802154::Addr::Extended(ea) => ea.eui_64(),
        ieee802154::Addr::Short(sa) => {
            let mut bytes = [0, 0, 0, 0xff, 0xfe, 0, 0, 0];
            NE::write_u16(&mut bytes[6..], sa.0);
            bytes
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut is_first = true;

        for chunk in self.0.chunks(2) {
            if is_first {
                is_first = false;
            } else {
                f.write_str(":")?;
            }

            write!(f, "{:x}", NE::read_u16(chunk))?;
        }

        Ok(())
    }
}
