//! Capability contracts between the layers
//!
//! The adaptation layer ([`Stack`]) drives whatever implements [`Mac`]; a MAC layer like
//! [`Lpp`] drives whatever implements [`Radio`]. Both traits are small on purpose: they only
//! cover what the upper layer actually calls into.
//!
//! [`Stack`]: ../sixlowpan/struct.Stack.html
//! [`Lpp`]: ../lpp/struct.Lpp.html
//! [`Mac`]: trait.Mac.html
//! [`Radio`]: trait.Radio.html

use crate::{ieee802154, Result};

/// A MAC layer: accepts link frames addressed to a neighbor, or to everyone
pub trait Mac {
    /// Queues `frame` for transmission to `dest`
    ///
    /// A `dest` of `None` means link broadcast.
    fn send(&mut self, dest: Option<ieee802154::Addr>, frame: &[u8]) -> Result<()>;
}

/// A radio transceiver that can be duty cycled
pub trait Radio {
    /// Powers the transceiver up
    fn on(&mut self);

    /// Powers the transceiver down
    fn off(&mut self);

    /// Transmits `frame`
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}
