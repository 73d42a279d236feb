//! IEEE 802.15.4 MAC frames
//!
//! # References
//!
//! - [IEEE 802.15.4-2003 standard][standard], Section 7.2.1 General MAC frame format
//!
//! [standard]: https://www.iith.ac.in/~tbr/teaching/docs/802.15.4-2003.pdf

// NOTE(dev) unlike other networking protocols 802.15.4 uses the LITTLE endian byte order

use core::fmt;

use byteorder::{ByteOrder, NetworkEndian as NE, LE};

use crate::{Error, Result};

/* Frame control low byte */
mod frame_type {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = 0;
    pub const SIZE: u8 = 3;
}

mod security_enabled {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = super::frame_type::OFFSET + super::frame_type::SIZE;
    pub const SIZE: u8 = 1;
}

mod frame_pending {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = super::security_enabled::OFFSET + super::security_enabled::SIZE;
    pub const SIZE: u8 = 1;
}

mod ack_request {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = super::frame_pending::OFFSET + super::frame_pending::SIZE;
    pub const SIZE: u8 = 1;
}

mod panid_compression {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = super::ack_request::OFFSET + super::ack_request::SIZE;
    pub const SIZE: u8 = 1;
}

/* Frame control high byte */
mod dest_addr_mode {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = 2;
    pub const SIZE: u8 = 2;
}

mod frame_version {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = 4;
    pub const SIZE: u8 = 2;
}

mod src_addr_mode {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = 6;
    pub const SIZE: u8 = 2;
}

const CONTROLL: usize = 0;
const CONTROLH: usize = 1;
const SEQUENCE: usize = 2;

/// Length of the fixed part of the header: frame control plus sequence number
pub const FIXED_HEADER_SIZE: usize = 3;

/// A parsed / to-be-serialized MAC header
///
/// The PAN ID compression bit of the frame control field is not stored here: it's derived on
/// `emit` (set whenever both addresses are present and both PAN IDs are equal) and consumed on
/// `parse` (a compressed source PAN ID reads back as the destination PAN ID).
///
/// The security enabled bit round trips but contributes no length: serialization of the auxiliary
/// security header is out of scope.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Header {
    /// Frame type
    pub frame_type: Type,
    /// 'Security enabled' flag
    pub security_enabled: bool,
    /// 'Frame pending' flag
    pub frame_pending: bool,
    /// 'Ack. request' flag
    pub ack_request: bool,
    /// Frame version (2 bits)
    pub frame_version: u8,
    /// Sequence number
    pub seq: u8,
    /// Destination PAN identifier, meaningful only when `dest_addr` is present
    pub dest_pan_id: PanId,
    /// Destination address
    pub dest_addr: Option<Addr>,
    /// Source PAN identifier, meaningful only when `src_addr` is present
    pub src_pan_id: PanId,
    /// Source address
    pub src_addr: Option<Addr>,
}

impl Header {
    /// A data frame between `src` and `dest` within the PAN `pan_id`
    pub fn data(pan_id: PanId, src: Addr, dest: Addr, seq: u8) -> Self {
        Header {
            frame_type: Type::Data,
            security_enabled: false,
            frame_pending: false,
            ack_request: false,
            frame_version: 0,
            seq,
            dest_pan_id: pan_id,
            dest_addr: Some(dest),
            src_pan_id: pan_id,
            src_addr: Some(src),
        }
    }

    fn panid_compressed(&self) -> bool {
        self.dest_addr.is_some() && self.src_addr.is_some() && self.dest_pan_id == self.src_pan_id
    }

    /// Computes the length, in bytes, of the serialized header
    pub fn hdrlen(&self) -> usize {
        let mut len = FIXED_HEADER_SIZE;

        if let Some(dest) = self.dest_addr {
            len += 2 + usize::from(dest.size());
        }

        if let Some(src) = self.src_addr {
            if !self.panid_compressed() {
                len += 2;
            }
            len += usize::from(src.size());
        }

        len
    }

    /// Serializes the header into the start of `buffer`
    ///
    /// On success returns the number of bytes written, which equals `self.hdrlen()`. If `buffer`
    /// is too small nothing is written and `Error::Exhausted` is returned.
    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let len = self.hdrlen();

        if buffer.len() < len {
            return Err(Error::Exhausted);
        }

        buffer[CONTROLL] = 0;
        buffer[CONTROLH] = 0;
        set!(buffer[CONTROLL], frame_type, u8::from(self.frame_type));
        set!(
            buffer[CONTROLL],
            security_enabled,
            self.security_enabled as u8
        );
        set!(buffer[CONTROLL], frame_pending, self.frame_pending as u8);
        set!(buffer[CONTROLL], ack_request, self.ack_request as u8);
        set!(
            buffer[CONTROLL],
            panid_compression,
            self.panid_compressed() as u8
        );
        set!(
            buffer[CONTROLH],
            dest_addr_mode,
            self.dest_addr.map_or(0, |a| u8::from(a.mode()))
        );
        set!(buffer[CONTROLH], frame_version, self.frame_version);
        set!(
            buffer[CONTROLH],
            src_addr_mode,
            self.src_addr.map_or(0, |a| u8::from(a.mode()))
        );
        buffer[SEQUENCE] = self.seq;

        let mut pos = FIXED_HEADER_SIZE;

        if let Some(dest) = self.dest_addr {
            LE::write_u16(&mut buffer[pos..pos + 2], self.dest_pan_id.0);
            pos += 2;
            pos += dest.write(&mut buffer[pos..]);
        }

        if let Some(src) = self.src_addr {
            if !self.panid_compressed() {
                LE::write_u16(&mut buffer[pos..pos + 2], self.src_pan_id.0);
                pos += 2;
            }
            pos += src.write(&mut buffer[pos..]);
        }

        Ok(pos)
    }

    /// Parses the start of `bytes` as a MAC header
    ///
    /// On success returns the header plus its length in bytes; the frame payload starts right
    /// after.
    pub fn parse(bytes: &[u8]) -> Result<(Header, usize)> {
        if bytes.len() < FIXED_HEADER_SIZE {
            return Err(Error::Truncated);
        }

        let frame_type = Type::from(get!(bytes[CONTROLL], frame_type));
        let security_enabled = get!(bytes[CONTROLL], security_enabled) == 1;
        let frame_pending = get!(bytes[CONTROLL], frame_pending) == 1;
        let ack_request = get!(bytes[CONTROLL], ack_request) == 1;
        let compressed = get!(bytes[CONTROLL], panid_compression) == 1;
        let dest_mode = AddrMode::checked(get!(bytes[CONTROLH], dest_addr_mode))
            .ok_or(Error::Malformed)?;
        let frame_version = get!(bytes[CONTROLH], frame_version);
        let src_mode =
            AddrMode::checked(get!(bytes[CONTROLH], src_addr_mode)).ok_or(Error::Malformed)?;
        let seq = bytes[SEQUENCE];

        let mut pos = FIXED_HEADER_SIZE;

        let (dest_pan_id, dest_addr) = if dest_mode == AddrMode::None {
            (PanId(0), None)
        } else {
            if bytes.len() < pos + 2 {
                return Err(Error::Truncated);
            }
            let pan_id = PanId(LE::read_u16(&bytes[pos..pos + 2]));
            pos += 2;
            let (addr, alen) = Addr::read(&bytes[pos..], dest_mode)?;
            pos += alen;
            (pan_id, Some(addr))
        };

        let (src_pan_id, src_addr) = if src_mode == AddrMode::None {
            (PanId(0), None)
        } else {
            let pan_id = if compressed {
                dest_pan_id
            } else {
                if bytes.len() < pos + 2 {
                    return Err(Error::Truncated);
                }
                let pan_id = PanId(LE::read_u16(&bytes[pos..pos + 2]));
                pos += 2;
                pan_id
            };
            let (addr, alen) = Addr::read(&bytes[pos..], src_mode)?;
            pos += alen;
            (pan_id, Some(addr))
        };

        Ok((
            Header {
                frame_type,
                security_enabled,
                frame_pending,
                ack_request,
                frame_version,
                seq,
                dest_pan_id,
                dest_addr,
                src_pan_id,
                src_addr,
            },
            pos,
        ))
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::fmt::{Display, Quoted};

        let mut s = f.debug_struct("ieee802154::Header");
        s.field("type", &self.frame_type)
            .field("seq", &self.seq);

        if let Some(addr) = self.dest_addr {
            s.field("dest_pan_id", &Display(self.dest_pan_id));
            match addr {
                Addr::Short(sa) => s.field("dest_addr", &Display(sa)),
                Addr::Extended(ea) => s.field("dest_addr", &Quoted(ea)),
            };
        }

        if let Some(addr) = self.src_addr {
            s.field("src_pan_id", &Display(self.src_pan_id));
            match addr {
                Addr::Short(sa) => s.field("src_addr", &Display(sa)),
                Addr::Extended(ea) => s.field("src_addr", &Quoted(ea)),
            };
        }

        s.finish()
    }
}

full_range!(
    u8,
    /// Frame type
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Type {
        /// Beacon frame
        Beacon = 0b000,
        /// Data frame
        Data = 0b001,
        /// Acknowledgment frame
        Acknowledgment = 0b010,
        /// MAC command frame
        MacCommand = 0b011,
    }
);

/// Address mode
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddrMode {
    /// PAN identifier and address field are not present
    None = 0b00,
    /// Address field contains a 16 bit short address
    Short = 0b10,
    /// Address field contains a 64 bit extended address
    Extended = 0b11,
}

impl AddrMode {
    // Returns `None` if bits equals the reserved value (0b01)
    fn checked(bits: u8) -> Option<Self> {
        Some(match bits & 0b11 {
            0b00 => AddrMode::None,
            0b01 => return None,
            0b10 => AddrMode::Short,
            0b11 => AddrMode::Extended,
            _ => unreachable!(),
        })
    }
}

impl From<AddrMode> for u8 {
    fn from(am: AddrMode) -> u8 {
        am as u8
    }
}

/// An address, either short or extended
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Addr {
    /// Short address
    Short(ShortAddr),
    /// Extended address
    Extended(ExtendedAddr),
}

impl Addr {
    pub(crate) fn mode(&self) -> AddrMode {
        match *self {
            Addr::Short(_) => AddrMode::Short,
            Addr::Extended(_) => AddrMode::Extended,
        }
    }

    pub(crate) fn size(&self) -> u8 {
        match *self {
            Addr::Short(..) => 2,
            Addr::Extended(..) => 8,
        }
    }

    fn write(&self, buffer: &mut [u8]) -> usize {
        match *self {
            Addr::Short(sa) => {
                LE::write_u16(&mut buffer[..2], sa.0);
                2
            }
            Addr::Extended(ea) => {
                LE::write_u64(&mut buffer[..8], ea.0);
                8
            }
        }
    }

    fn read(bytes: &[u8], mode: AddrMode) -> Result<(Addr, usize)> {
        match mode {
            AddrMode::None => Err(Error::Malformed),
            AddrMode::Short => {
                if bytes.len() < 2 {
                    return Err(Error::Truncated);
                }
                Ok((Addr::Short(ShortAddr(LE::read_u16(&bytes[..2]))), 2))
            }
            AddrMode::Extended => {
                if bytes.len() < 8 {
                    return Err(Error::Truncated);
                }
                Ok((Addr::Extended(ExtendedAddr(LE::read_u64(&bytes[..8]))), 8))
            }
        }
    }
}

/// PAN identifier
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PanId(pub u16);

impl fmt::Display for PanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

impl PanId {
    /// Broadcast identifier
    pub const BROADCAST: PanId = PanId(0xffff);

    /// Is this the broadcast address?
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

/// Short (16-bit) address
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShortAddr(pub u16);

impl fmt::Display for ShortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

impl ShortAddr {
    /// Broadcast address
    pub const BROADCAST: ShortAddr = ShortAddr(0xffff);

    /// Is this the broadcast address?
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<ShortAddr> for Addr {
    fn from(sa: ShortAddr) -> Addr {
        Addr::Short(sa)
    }
}

/// Extended (64-bit) address
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExtendedAddr(pub u64);

impl ExtendedAddr {
    // Network endianness bytes
    /// Serializes the address into an array of bytes using network endianness
    pub fn ne_bytes(&self) -> [u8; 8] {
        let mut bytes = [0; 8];
        NE::write_u64(&mut bytes, self.0);
        bytes
    }

    /// Converts the address into an Extended Unique Identifier (EUI-64)
    pub fn eui_64(&self) -> [u8; 8] {
        let mut bytes = [0; 8];

        NE::write_u64(&mut bytes, self.0);

        // toggle the universal / local bit
        bytes[0] ^= 1 << 1;

        bytes
    }
}

// NOTE printed in BIG (Network) endian representation to match the output of `ip link`
impl fmt::Display for ExtendedAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut is_first = true;

        for byte in self.ne_bytes().iter() {
            if is_first {
                is_first = false;
            } else {
                f.write_str(":")?;
            }

            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl From<ExtendedAddr> for Addr {
    fn from(ea: ExtendedAddr) -> Addr {
        Addr::Extended(ea)
    }
}

#[cfg(test)]
mod tests {
    use rand::{self, Rng};

    use crate::Error;

    use super::{Addr, ExtendedAddr, Header, PanId, ShortAddr, Type};

    #[test]
    fn roundtrip() {
        macro_rules! test {
            ($src:expr, $dest:expr, $src_pan:expr, $dest_pan:expr) => {{
                let src: Addr = $src.into();
                let dest: Addr = $dest.into();

                let header = Header {
                    frame_type: Type::Data,
                    security_enabled: false,
                    frame_pending: false,
                    ack_request: true,
                    frame_version: 0,
                    seq: 42,
                    dest_pan_id: $dest_pan,
                    dest_addr: Some(dest),
                    src_pan_id: $src_pan,
                    src_addr: Some(src),
                };

                // NOTE start with a randomized array to make sure we set *everything* correctly
                let mut buf = [0; 128];
                rand::thread_rng().fill_bytes(&mut buf);

                let written = header.emit(&mut buf).unwrap();
                assert_eq!(written, header.hdrlen());

                let (parsed, len) = Header::parse(&buf).unwrap();
                assert_eq!(len, written);
                assert_eq!(parsed, header);
            }};
        }

        // source PAN ID elided
        test!(
            ShortAddr(0x01_02),
            ShortAddr(0x03_04),
            PanId(0xbeef),
            PanId(0xbeef)
        );
        test!(
            ShortAddr(0x01_02),
            ExtendedAddr(0x03_04_05_06_07_08_09_0A),
            PanId(0xbeef),
            PanId(0xbeef)
        );
        test!(
            ExtendedAddr(0x01_02_03_04_05_06_07_08),
            ShortAddr(0x09_0A),
            PanId(0xbeef),
            PanId(0xbeef)
        );
        test!(
            ExtendedAddr(0x01_02_03_04_05_06_07_08),
            ExtendedAddr(0x09_0A_0B_0C_0D_0E_0F_10),
            PanId(0xbeef),
            PanId(0xbeef)
        );

        // source PAN ID on the wire
        test!(
            ShortAddr(0x01_02),
            ShortAddr(0x03_04),
            PanId(0xbeef),
            PanId(0xcafe)
        );
        test!(
            ExtendedAddr(0x01_02_03_04_05_06_07_08),
            ExtendedAddr(0x09_0A_0B_0C_0D_0E_0F_10),
            PanId(0xbeef),
            PanId(0xcafe)
        );
    }

    #[test]
    fn short_addrs_are_little_endian() {
        let header = Header::data(
            PanId(0xdead),
            Addr::Short(ShortAddr(0x1234)),
            Addr::Short(ShortAddr(0xabcd)),
            0,
        );

        let mut buf = [0; 32];
        let len = header.emit(&mut buf).unwrap();

        assert_eq!(len, 9);
        // PAN ID
        assert_eq!(&buf[3..5], &[0xad, 0xde]);
        // destination, byte reversed on the wire
        assert_eq!(&buf[5..7], &[0xcd, 0xab]);
        // source, PAN ID compressed away
        assert_eq!(&buf[7..9], &[0x34, 0x12]);
    }

    #[test]
    fn pan_id_compression() {
        let same = Header::data(
            PanId(0xbeef),
            Addr::Short(ShortAddr(1)),
            Addr::Short(ShortAddr(2)),
            0,
        );
        assert_eq!(same.hdrlen(), 9);

        let mut different = same;
        different.src_pan_id = PanId(0xcafe);
        assert_eq!(different.hdrlen(), 11);
    }

    #[test]
    fn exhausted_leaves_buffer_untouched() {
        let header = Header::data(
            PanId(0xbeef),
            Addr::Extended(ExtendedAddr(0x0102_0304_0506_0708)),
            Addr::Extended(ExtendedAddr(0x090a_0b0c_0d0e_0f10)),
            7,
        );

        let mut buf = [0; 8];
        rand::thread_rng().fill_bytes(&mut buf);
        let snapshot = buf;

        assert_eq!(header.emit(&mut buf), Err(Error::Exhausted));
        assert_eq!(buf, snapshot);
    }

    #[test]
    fn rejects_reserved_addr_mode() {
        // dest addr mode = 0b01 (reserved)
        let bytes = [0x01, 0b0000_0100, 0, 0, 0];
        assert_eq!(Header::parse(&bytes), Err(Error::Malformed));
    }

    #[test]
    fn eui_64() {
        let addr = ExtendedAddr(0x0102_0304_0506_0708);
        assert_eq!(addr.eui_64(), [0x03, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    }
}
