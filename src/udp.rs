//! UDP: User Datagram Protocol

use core::{
    fmt,
    ops::{Range, RangeFrom},
    u16,
};

use as_slice::{AsMutSlice, AsSlice};
use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::{u16, u32, usize};
use owning_slice::Truncate;

use crate::{ipv6, traits::UncheckedIndex, Error};

/* Packet structure */
const SOURCE: Range<usize> = 0..2;
const DESTINATION: Range<usize> = 2..4;
const LENGTH: Range<usize> = 4..6;
const CHECKSUM: Range<usize> = 6..8;
const PAYLOAD: RangeFrom<usize> = 8..;

/// Size of the UDP header
pub const HEADER_SIZE: u16 = PAYLOAD.start as u16;

/// UDP packet
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
    /// Parses the bytes as a UDP packet
    pub fn parse(bytes: B) -> Result<Self, Error> {
        if bytes.as_slice().len() < usize(HEADER_SIZE) {
            return Err(Error::Truncated);
        }

        let packet = Packet { buffer: bytes };
        let len = packet.get_length();

        if len < HEADER_SIZE || usize(len) > packet.as_slice().len() {
            Err(Error::Malformed)
        } else {
            Ok(packet)
        }
    }

    /* Accessors */
    /// Reads the 'Source port' field
    pub fn get_source(&self) -> u16 {
        NE::read_u16(&self.as_slice()[SOURCE])
    }

    /// Reads the 'Destination port' field
    pub fn get_destination(&self) -> u16 {
        NE::read_u16(&self.as_slice()[DESTINATION])
    }

    /// Reads the 'Length' field
    pub fn get_length(&self) -> u16 {
        NE::read_u16(&self.as_slice()[LENGTH])
    }

    /// Reads the 'Checksum' field
    pub fn get_checksum(&self) -> u16 {
        NE::read_u16(&self.as_slice()[CHECKSUM])
    }

    /// View into the payload
    pub fn payload(&self) -> &[u8] {
        unsafe { self.as_slice().rf(PAYLOAD) }
    }

    /// Returns the byte representation of this packet
    pub fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }

    /// Verifies the 'Checksum' field against the IPv6 pseudo header
    pub fn verify_ipv6_checksum(&self, src: ipv6::Addr, dest: ipv6::Addr) -> bool {
        self.compute_checksum(src, dest) == self.get_checksum()
    }

    /* Private */
    fn as_slice(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    fn compute_checksum(&self, src: ipv6::Addr, dest: ipv6::Addr) -> u16 {
        let mut sum: u32 = 0;

        /* Pseudo-header */
        for chunk in src.0.chunks(2).chain(dest.0.chunks(2)) {
            sum += u32(NE::read_u16(chunk));
        }

        let udp_len = u32(self.get_length());
        sum += udp_len >> 16;
        sum += udp_len & 0xffff;

        sum += u32(u8::from(ipv6::NextHeader::Udp));

        /* UDP header, checksum field taken as zero */
        sum += u32(self.get_source());
        sum += u32(self.get_destination());
        sum += udp_len >> 16;
        sum += udp_len & 0xffff;

        for chunk in self.payload().chunks(2) {
            if chunk.len() == 2 {
                sum += u32(NE::read_u16(chunk));
            } else {
                sum += u32(chunk[0]) << 8;
            }
        }

        // fold carry-over
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }

        !(sum as u16)
    }
}

impl<B> Packet<B>
where
    B: AsMutSlice<Element = u8>,
{
    /* Setters */
    /// Sets the 'Source port' field
    pub fn set_source(&mut self, port: u16) {
        NE::write_u16(&mut self.as_mut_slice()[SOURCE], port)
    }

    /// Sets the 'Destination port' field
    pub fn set_destination(&mut self, port: u16) {
        NE::write_u16(&mut self.as_mut_slice()[DESTINATION], port)
    }

    /// Computes the IPv6 pseudo header checksum and stores it in the 'Checksum' field
    pub fn update_ipv6_checksum(&mut self, src: ipv6::Addr, dest: ipv6::Addr) {
        let cksum = self.compute_checksum(src, dest);
        self.set_checksum(cksum);
    }

    pub(crate) fn set_checksum(&mut self, checksum: u16) {
        NE::write_u16(&mut self.as_mut_slice()[CHECKSUM], checksum)
    }

    pub(crate) unsafe fn set_length(&mut self, len: u16) {
        NE::write_u16(&mut self.as_mut_slice()[LENGTH], len)
    }

    /// Mutable view into the payload
    pub fn payload_mut(&mut self) -> &mut [u8] {
        unsafe { self.as_mut_slice().rfm(PAYLOAD) }
    }

    /* Private */
    fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }
}

impl<B> Packet<B>
where
    B: AsMutSlice<Element = u8> + Truncate<u16>,
{
    /* Constructors */
    /// Transforms the given buffer into a UDP packet
    ///
    /// The packet will span the whole buffer and the 'Checksum' field will be zeroed.
    ///
    /// # Panics
    ///
    /// This constructor panics if the given `buffer` is not large enough to contain the UDP
    /// header.
    pub fn new(mut buffer: B) -> Self {
        assert!(buffer.as_slice().len() >= usize(HEADER_SIZE));

        let len = u16(buffer.as_slice().len()).unwrap_or(u16::MAX);
        buffer.truncate(len);
        let mut packet = Packet { buffer };

        packet.set_checksum(0);
        unsafe { packet.set_length(len) }

        packet
    }

    /// Fills the payload with the given data and adjusts the length of the UDP packet
    pub fn set_payload(&mut self, data: &[u8]) {
        let len = u16(data.len()).unwrap();
        assert!(self.get_length() - HEADER_SIZE >= len);

        self.truncate(len);
        self.payload_mut().copy_from_slice(data);
    }

    /// Truncates the *payload* to the specified length
    pub fn truncate(&mut self, len: u16) {
        if len < self.get_length() - HEADER_SIZE {
            let total_len = len + HEADER_SIZE;
            self.buffer.truncate(total_len);
            unsafe { self.set_length(total_len) }
        }
    }
}

/// NOTE excludes the payload
impl<B> fmt::Debug for Packet<B>
where
    B: AsSlice<Element = u8>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("udp::Packet")
            .field("source", &self.get_source())
            .field("destination", &self.get_destination())
            .field("length", &self.get_length())
            .field("checksum", &self.get_checksum())
            // .field("payload", &self.payload())
            .finish()
    }
}
