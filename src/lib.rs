//! 6LoWPAN: IPv6 over IEEE 802.15.4 networks
//!
//! This crate contains the adaptation layer that carries IPv6 datagrams over 802.15.4 radio
//! frames: stateless header compression (the HC1 scheme of RFC 4944 and the context based HC01
//! scheme that succeeded it), fragmentation and reassembly of datagrams that don't fit in a single
//! frame, an 802.15.4 MAC frame codec and an LPP (Low-Power Probing) MAC layer that duty cycles
//! the radio.
//!
//! There's no IO in this crate: the [`sixlowpan::Stack`] engine is driven through the [`mac::Mac`]
//! and [`mac::Radio`] traits and time is passed in by the caller as [`time::Instant`] values, so
//! the crate runs unchanged on `no_std` targets and in host side tests.
//!
//! [`sixlowpan::Stack`]: sixlowpan/struct.Stack.html
//! [`mac::Mac`]: mac/trait.Mac.html
//! [`mac::Radio`]: mac/trait.Radio.html
//! [`time::Instant`]: time/struct.Instant.html
//!
//! # Examples
//!
//! Compressing and expanding a link-local UDP datagram with the HC01 codec:
//!
//! ```
//! use lowpan::{ieee802154::ExtendedAddr, ipv6};
//! use lowpan::sixlowpan::{ContextTable, HeaderCodec, IphcCodec, LinkAddrs};
//!
//! let src_ll = ExtendedAddr(0x0102_0304_0506_0708);
//! let dest_ll = ExtendedAddr(0x090a_0b0c_0d0e_0f10);
//!
//! let mut bytes = [0; 48];
//! let mut ip = ipv6::Packet::new(&mut bytes[..]);
//! ip.set_next_header(ipv6::NextHeader::Icmpv6);
//! ip.set_hop_limit(64);
//! ip.set_source(ipv6::Addr::from_link_local(src_ll.into()));
//! ip.set_destination(ipv6::Addr::from_link_local(dest_ll.into()));
//!
//! let link = LinkAddrs {
//!     source: src_ll.into(),
//!     destination: Some(dest_ll.into()),
//! };
//! let contexts = ContextTable::new();
//!
//! let mut frame = [0; 127];
//! let compressed = IphcCodec::compress(&bytes, &link, &contexts, &mut frame).unwrap();
//!
//! // dispatch, two encoding bytes and the inline next header; everything else was elided
//! assert_eq!(compressed.produced, 4);
//! assert_eq!(compressed.consumed, 40);
//! ```

#![deny(missing_docs)]
#![deny(rust_2018_compatibility)]
#![deny(rust_2018_idioms)]
#![deny(warnings)]
// the `Hash32` derive from `hash32_derive` v0.1 expands to an impl inside an anonymous const,
// which newer compilers flag as a non-local definition
#![allow(non_local_definitions)]
#![no_std]

#[cfg(feature = "log")]
#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate std;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
mod macros;

mod fmt;
mod rand;
mod traits;

pub mod time;

// Medium Access Control layer
pub mod ieee802154;
pub mod lpp;
pub mod mac;

// Network layer
pub mod ipv6;
pub mod sixlowpan;

// Transport layer
pub mod udp;

use core::fmt as cfmt;

/// Errors reported by this crate
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The output buffer doesn't have enough room for the operation
    Exhausted,
    /// The input violates the wire format it claims to carry
    Malformed,
    /// A compressed header references an address context that's not installed
    NoContext(u8),
    /// The input's dispatch value doesn't match any supported header type
    UnknownDispatch(u8),
    /// The destination can't be expressed at the link layer
    Unaddressable,
    /// The input ended before the header did
    Truncated,
}

impl cfmt::Display for Error {
    fn fmt(&self, f: &mut cfmt::Formatter<'_>) -> cfmt::Result {
        match *self {
            Error::Exhausted => f.write_str("buffer space exhausted"),
            Error::Malformed => f.write_str("malformed packet"),
            Error::NoContext(n) => write!(f, "address context {} not installed", n),
            Error::UnknownDispatch(b) => write!(f, "unknown dispatch value {:#04x}", b),
            Error::Unaddressable => f.write_str("unaddressable destination"),
            Error::Truncated => f.write_str("truncated packet"),
        }
    }
}

/// Alias for `core::result::Result` with the crate's `Error` type
pub type Result<T> = core::result::Result<T, Error>;
