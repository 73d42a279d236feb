//! FRAG1 / FRAGN fragmentation headers
//!
//! # References
//!
//! - [RFC 4944 Transmission of IPv6 Packets over IEEE 802.15.4 Networks][rfc], Section 5.3
//!
//! [rfc]: https://tools.ietf.org/html/rfc4944

use core::fmt;

use byteorder::{ByteOrder, NetworkEndian as NE};

use crate::{Error, Result};

/// Length of the FRAG1 header
pub const FRAG1_HDR_LEN: usize = 4;

/// Length of the FRAGN header
pub const FRAGN_HDR_LEN: usize = 5;

/// Largest datagram size the 11-bit size field can express
pub const MAX_DATAGRAM_SIZE: u16 = 0x7ff;

// Dispatch patterns, in the top 5 bits of the first byte
const DISPATCH_FRAG1: u8 = 0xc0;
const DISPATCH_FRAGN: u8 = 0xe0;
const DISPATCH_MASK: u8 = 0xf8;
const SIZE_MASK: u16 = 0x07ff;

/// First fragment of a datagram; the compressed header follows it
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Frag1 {
    /// Size of the full, uncompressed datagram
    pub size: u16,
    /// Datagram tag, shared by all the fragments of one datagram
    pub tag: u16,
}

impl Frag1 {
    /// Serializes this header into the start of `buffer`
    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        if buffer.len() < FRAG1_HDR_LEN {
            return Err(Error::Exhausted);
        }

        NE::write_u16(
            &mut buffer[..2],
            u16::from(DISPATCH_FRAG1) << 8 | (self.size & SIZE_MASK),
        );
        NE::write_u16(&mut buffer[2..4], self.tag);

        Ok(FRAG1_HDR_LEN)
    }
}

impl fmt::Debug for Frag1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::fmt::Hex;

        f.debug_struct("frag::Frag1")
            .field("size", &self.size)
            .field("tag", &Hex(self.tag))
            .finish()
    }
}

/// Subsequent fragment of a datagram; raw datagram bytes follow it
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct FragN {
    /// Size of the full, uncompressed datagram
    pub size: u16,
    /// Datagram tag, shared by all the fragments of one datagram
    pub tag: u16,
    /// Offset of this fragment within the datagram, in units of 8 bytes
    pub offset: u8,
}

impl FragN {
    /// Serializes this header into the start of `buffer`
    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        if buffer.len() < FRAGN_HDR_LEN {
            return Err(Error::Exhausted);
        }

        NE::write_u16(
            &mut buffer[..2],
            u16::from(DISPATCH_FRAGN) << 8 | (self.size & SIZE_MASK),
        );
        NE::write_u16(&mut buffer[2..4], self.tag);
        buffer[4] = self.offset;

        Ok(FRAGN_HDR_LEN)
    }
}

impl fmt::Debug for FragN {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::fmt::Hex;

        f.debug_struct("frag::FragN")
            .field("size", &self.size)
            .field("tag", &Hex(self.tag))
            .field("offset", &self.offset)
            .finish()
    }
}

/// Either fragmentation header
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Header {
    /// FRAG1
    First(Frag1),
    /// FRAGN
    Subsequent(FragN),
}

impl Header {
    /// Parses the start of `bytes` as a fragmentation header
    ///
    /// Returns `Ok(None)` if the dispatch value is not a fragmentation dispatch; the bytes then
    /// start with a (compressed) header instead.
    pub fn parse(bytes: &[u8]) -> Result<Option<(Header, usize)>> {
        if bytes.is_empty() {
            return Err(Error::Truncated);
        }

        match bytes[0] & DISPATCH_MASK {
            DISPATCH_FRAG1 => {
                if bytes.len() < FRAG1_HDR_LEN {
                    return Err(Error::Truncated);
                }

                let size = NE::read_u16(&bytes[..2]) & SIZE_MASK;
                let tag = NE::read_u16(&bytes[2..4]);

                Ok(Some((Header::First(Frag1 { size, tag }), FRAG1_HDR_LEN)))
            }
            DISPATCH_FRAGN => {
                if bytes.len() < FRAGN_HDR_LEN {
                    return Err(Error::Truncated);
                }

                let size = NE::read_u16(&bytes[..2]) & SIZE_MASK;
                let tag = NE::read_u16(&bytes[2..4]);
                let offset = bytes[4];

                Ok(Some((
                    Header::Subsequent(FragN { size, tag, offset }),
                    FRAGN_HDR_LEN,
                )))
            }
            _ => Ok(None),
        }
    }

    /// Size of the full datagram, as carried by this fragment
    pub fn size(&self) -> u16 {
        match *self {
            Header::First(f) => f.size,
            Header::Subsequent(f) => f.size,
        }
    }

    /// Datagram tag carried by this fragment
    pub fn tag(&self) -> u16 {
        match *self {
            Header::First(f) => f.tag,
            Header::Subsequent(f) => f.tag,
        }
    }
}
