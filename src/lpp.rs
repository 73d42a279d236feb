//! LPP: Low-Power Probing, a receiver-initiated MAC duty cycling protocol
//!
//! Receivers periodically wake up, broadcast a probe and listen for a short window. A node with
//! a packet to send holds it in a single queue slot, radio on, until it hears a probe from the
//! packet's destination; the probe clocks the packet out. The radio therefore stays off most of
//! the time on an idle network.
//!
//! The driver is clocked entirely by the caller: [`poll`] runs the duty cycle and returns the
//! instant it wants to run next; [`input`] processes every frame the radio delivers.
//!
//! [`poll`]: struct.Lpp.html#method.poll
//! [`input`]: struct.Lpp.html#method.input
//!
//! # References
//!
//! - [Musaloiu-E. et al: Koala: Ultra-Low Power Data Retrieval in Wireless Sensor Networks][0]
//!
//! [0]: https://ieeexplore.ieee.org/document/4505475

use byteorder::{ByteOrder, LittleEndian as LE, NetworkEndian as NE};

use crate::{
    ieee802154::ExtendedAddr,
    mac::Radio,
    rand::Rand,
    time::{Duration, Instant},
    Error, Result,
};

/// How long the radio listens after sending a probe
pub const LISTEN_TIME: Duration = Duration::from_micros(1_000_000 / 128);

/// Nominal length of the radio-off part of the duty cycle; the actual length is randomized
/// around it to desynchronize neighboring nodes
pub const OFF_TIME: Duration = Duration::from_micros(1_000_000 / 8);

// 2-byte frame type, then the sender and receiver addresses
const TYPE_PROBE: u16 = 1;
const TYPE_DATA: u16 = 2;
const HEADER_SIZE: usize = 18;

const QUEUE_SIZE: usize = 128;

/// A data frame delivered to the upper layer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Incoming<'a> {
    /// The node the frame came from
    pub source: ExtendedAddr,
    /// Was the frame addressed to every node rather than to us specifically?
    pub broadcast: bool,
    /// The payload behind the LPP header
    pub payload: &'a [u8],
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum State {
    Listening,
    Off,
}

struct Queued {
    dest: Option<ExtendedAddr>,
    frame: [u8; QUEUE_SIZE],
    len: usize,
    since: Instant,
}

/// An LPP driver wrapped around a radio transceiver
pub struct Lpp<R>
where
    R: Radio,
{
    radio: R,
    addr: ExtendedAddr,
    rand: Rand,
    state: State,
    next_transition: Instant,
    queued: Option<Queued>,
}

impl<R> Lpp<R>
where
    R: Radio,
{
    /// Creates a driver bound to the address `addr`
    ///
    /// `seed` randomizes the duty cycle; give each node a different one.
    pub fn new(radio: R, addr: ExtendedAddr, seed: u64) -> Self {
        Lpp {
            radio,
            addr,
            rand: Rand::new(seed),
            state: State::Off,
            next_transition: Instant::ZERO,
            queued: None,
        }
    }

    /// Direct access to the radio
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Runs the duty cycle and returns the instant `poll` wants to be called again
    ///
    /// Calling it earlier is harmless; calling it late just stretches the current phase.
    pub fn poll(&mut self, now: Instant) -> Result<Instant> {
        if now >= self.next_transition {
            match self.state {
                State::Off => {
                    self.radio.on();
                    self.state = State::Listening;

                    // a packet that waited a full listen window without its probe arriving is
                    // going nowhere
                    if self
                        .queued
                        .as_ref()
                        .map_or(false, |q| now - q.since >= OFF_TIME * 2)
                    {
                        net_debug!("dropping stale queued packet");
                        self.queued = None;
                    }

                    if self.queued.is_some() {
                        // wait for the destination's probe instead of probing ourselves
                        self.next_transition = now + OFF_TIME * 2;
                    } else {
                        self.send_probe()?;
                        self.next_transition = now + LISTEN_TIME;
                    }
                }
                State::Listening => {
                    self.radio.off();
                    self.state = State::Off;
                    self.next_transition = now + self.off_duration();
                }
            }
        }

        Ok(self.next_transition)
    }

    /// Queues `payload` for transmission to `dest` (`None` broadcasts it)
    ///
    /// The packet leaves once a probe from the destination is heard; only one packet is held at
    /// a time and a newer one replaces it. Frames flagged as acknowledgements skip the queue and
    /// go out immediately, on the assumption that the peer is still listening after its own
    /// transmission.
    pub fn send(
        &mut self,
        dest: Option<ExtendedAddr>,
        payload: &[u8],
        is_ack: bool,
        now: Instant,
    ) -> Result<()> {
        if HEADER_SIZE + payload.len() > QUEUE_SIZE {
            return Err(Error::Exhausted);
        }

        if is_ack {
            let mut frame = [0; QUEUE_SIZE];
            let len = emit(&mut frame, TYPE_DATA, self.addr, dest, payload);
            return self.radio.send(&frame[..len]);
        }

        if self.queued.is_some() {
            net_debug!("dumping the queued packet in favor of the new one");
        }

        let mut queued = Queued {
            dest,
            frame: [0; QUEUE_SIZE],
            len: 0,
            since: now,
        };
        queued.len = emit(&mut queued.frame, TYPE_DATA, self.addr, dest, payload);
        self.queued = Some(queued);

        // listen for the destination's probe
        self.radio.on();
        self.state = State::Listening;
        self.next_transition = now + OFF_TIME * 2;

        Ok(())
    }

    /// Processes a frame delivered by the radio
    ///
    /// Probes are consumed here, possibly clocking out the queued packet; data frames addressed
    /// to this node (or to everyone) come back as [`Incoming`].
    ///
    /// [`Incoming`]: struct.Incoming.html
    pub fn input<'a>(&mut self, frame: &'a [u8], now: Instant) -> Result<Option<Incoming<'a>>> {
        if frame.len() < HEADER_SIZE {
            return Err(Error::Truncated);
        }

        let sender = ExtendedAddr(NE::read_u64(&frame[2..10]));
        let receiver = match NE::read_u64(&frame[10..18]) {
            0 => None,
            bits => Some(ExtendedAddr(bits)),
        };

        match LE::read_u16(&frame[..2]) {
            TYPE_PROBE => {
                let wanted = self
                    .queued
                    .as_ref()
                    .map_or(false, |q| q.dest.map_or(true, |d| d == sender));

                if wanted {
                    if let Some(q) = self.queued.take() {
                        self.radio.send(&q.frame[..q.len])?;

                        // hold the radio open a moment in case an acknowledgement comes back
                        self.state = State::Listening;
                        self.next_transition = now + LISTEN_TIME;
                    }
                }

                Ok(None)
            }

            TYPE_DATA => {
                if receiver.map_or(false, |r| r != self.addr) {
                    // someone else's traffic
                    return Ok(None);
                }

                Ok(Some(Incoming {
                    source: sender,
                    broadcast: receiver.is_none(),
                    payload: &frame[HEADER_SIZE..],
                }))
            }

            _ => Err(Error::Malformed),
        }
    }

    /* Private */
    fn send_probe(&mut self) -> Result<()> {
        let receiver = self.queued.as_ref().and_then(|q| q.dest);

        let mut frame = [0; HEADER_SIZE];
        emit(&mut frame, TYPE_PROBE, self.addr, receiver, &[]);
        self.radio.send(&frame)
    }

    fn off_duration(&mut self) -> Duration {
        let jitter = u64::from(self.rand.rand_u32()) % OFF_TIME.total_micros();

        OFF_TIME / 2 + Duration::from_micros(jitter)
    }
}

fn emit(
    frame: &mut [u8],
    ptype: u16,
    sender: ExtendedAddr,
    receiver: Option<ExtendedAddr>,
    payload: &[u8],
) -> usize {
    LE::write_u16(&mut frame[..2], ptype);
    frame[2..10].copy_from_slice(&sender.ne_bytes());
    frame[10..18].copy_from_slice(&receiver.map_or([0; 8], |r| r.ne_bytes()));
    frame[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);

    HEADER_SIZE + payload.len()
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use crate::{
        ieee802154::ExtendedAddr,
        lpp::{Lpp, LISTEN_TIME, OFF_TIME},
        mac::Radio,
        time::{Duration, Instant},
        Result,
    };

    const US: ExtendedAddr = ExtendedAddr(0x0102_0304_0506_0708);
    const PEER: ExtendedAddr = ExtendedAddr(0x090a_0b0c_0d0e_0f10);

    #[derive(Default)]
    struct TestRadio {
        on: bool,
        sent: Vec<Vec<u8>>,
    }

    impl Radio for TestRadio {
        fn on(&mut self) {
            self.on = true;
        }

        fn off(&mut self) {
            self.on = false;
        }

        fn send(&mut self, frame: &[u8]) -> Result<()> {
            assert!(self.on);

            self.sent.push(frame.to_vec());
            Ok(())
        }
    }

    fn probe_from(addr: ExtendedAddr) -> [u8; 18] {
        let mut frame = [0; 18];
        super::emit(&mut frame, super::TYPE_PROBE, addr, None, &[]);
        frame
    }

    fn is_probe(frame: &[u8]) -> bool {
        frame[0] == 1 && frame[1] == 0
    }

    #[test]
    fn duty_cycle() {
        let mut lpp = Lpp::new(TestRadio::default(), US, 1);

        // wake up: radio on, one probe out, listening for LISTEN_TIME
        let t0 = Instant::ZERO;
        let t1 = lpp.poll(t0).unwrap();
        assert!(lpp.radio_mut().on);
        assert_eq!(lpp.radio_mut().sent.len(), 1);
        assert!(is_probe(&lpp.radio_mut().sent[0]));
        assert_eq!(t1 - t0, LISTEN_TIME);

        // polling early changes nothing
        assert_eq!(lpp.poll(t0).unwrap(), t1);
        assert_eq!(lpp.radio_mut().sent.len(), 1);

        // the window closes: radio off for a randomized interval
        let t2 = lpp.poll(t1).unwrap();
        assert!(!lpp.radio_mut().on);
        assert!(t2 - t1 >= OFF_TIME / 2);
        assert!(t2 - t1 < OFF_TIME / 2 + OFF_TIME);

        // and the next cycle probes again
        lpp.poll(t2).unwrap();
        assert!(lpp.radio_mut().on);
        assert_eq!(lpp.radio_mut().sent.len(), 2);
    }

    #[test]
    fn probe_clocks_out_the_queued_packet() {
        let mut lpp = Lpp::new(TestRadio::default(), US, 1);

        let t0 = Instant::ZERO;
        lpp.send(Some(PEER), b"hello", false, t0).unwrap();

        // queued, not transmitted; the radio is listening for the probe
        assert!(lpp.radio_mut().on);
        assert_eq!(lpp.radio_mut().sent.len(), 0);

        // a probe from some other node doesn't match
        let other = ExtendedAddr(0xdead_beef);
        assert_eq!(lpp.input(&probe_from(other), t0).unwrap(), None);
        assert_eq!(lpp.radio_mut().sent.len(), 0);

        // the destination's probe does
        assert_eq!(lpp.input(&probe_from(PEER), t0).unwrap(), None);
        assert_eq!(lpp.radio_mut().sent.len(), 1);
        let frame = lpp.radio_mut().sent.pop().unwrap();
        assert!(!is_probe(&frame));
        assert_eq!(&frame[18..], b"hello");

        // the slot is free; a second probe clocks nothing out
        assert_eq!(lpp.input(&probe_from(PEER), t0).unwrap(), None);
        assert_eq!(lpp.radio_mut().sent.len(), 0);
    }

    #[test]
    fn broadcast_goes_out_on_any_probe() {
        let mut lpp = Lpp::new(TestRadio::default(), US, 1);

        lpp.send(None, b"to all", false, Instant::ZERO).unwrap();
        assert_eq!(
            lpp.input(&probe_from(PEER), Instant::ZERO).unwrap(),
            None
        );
        assert_eq!(lpp.radio_mut().sent.len(), 1);
    }

    #[test]
    fn ack_bypasses_the_queue() {
        let mut lpp = Lpp::new(TestRadio::default(), US, 1);
        lpp.radio_mut().on = true;

        lpp.send(Some(PEER), b"ack", true, Instant::ZERO).unwrap();
        assert_eq!(lpp.radio_mut().sent.len(), 1);

        // nothing left behind for a probe to flush
        assert_eq!(lpp.input(&probe_from(PEER), Instant::ZERO).unwrap(), None);
        assert_eq!(lpp.radio_mut().sent.len(), 1);
    }

    #[test]
    fn newer_packet_replaces_the_queued_one() {
        let mut lpp = Lpp::new(TestRadio::default(), US, 1);

        let t0 = Instant::ZERO;
        lpp.send(Some(PEER), b"old", false, t0).unwrap();
        lpp.send(Some(PEER), b"new", false, t0).unwrap();

        lpp.input(&probe_from(PEER), t0).unwrap();
        assert_eq!(lpp.radio_mut().sent.len(), 1);
        assert_eq!(&lpp.radio_mut().sent[0][18..], b"new");
    }

    #[test]
    fn stale_queued_packet_is_dropped() {
        let mut lpp = Lpp::new(TestRadio::default(), US, 1);

        let t0 = Instant::ZERO;
        lpp.send(Some(PEER), b"hello", false, t0).unwrap();

        // no probe arrives for the whole wait window
        let t1 = lpp.poll(t0 + OFF_TIME * 2).unwrap();
        let t2 = lpp.poll(t1).unwrap();
        assert!(t2 - t0 >= OFF_TIME * 2);

        // next wakeup drops the packet and probes normally
        lpp.poll(t2).unwrap();
        let sent = &lpp.radio_mut().sent;
        assert!(sent.iter().all(|f| is_probe(f)));

        // even the destination's probe has nothing to flush anymore
        let t3 = t2 + Duration::from_millis(1);
        assert_eq!(lpp.input(&probe_from(PEER), t3).unwrap(), None);
        assert!(lpp.radio_mut().sent.iter().all(|f| is_probe(f)));
    }

    #[test]
    fn data_delivery() {
        let mut lpp = Lpp::new(TestRadio::default(), US, 1);

        let mut frame = [0; 24];
        let len = super::emit(&mut frame, super::TYPE_DATA, PEER, Some(US), b"hi you");
        let incoming = lpp.input(&frame[..len], Instant::ZERO).unwrap().unwrap();
        assert_eq!(incoming.source, PEER);
        assert!(!incoming.broadcast);
        assert_eq!(incoming.payload, b"hi you");

        // addressed elsewhere: dropped
        let other = ExtendedAddr(0xdead_beef);
        let len = super::emit(&mut frame, super::TYPE_DATA, PEER, Some(other), b"hi you");
        assert_eq!(lpp.input(&frame[..len], Instant::ZERO).unwrap(), None);

        // broadcast: delivered
        let len = super::emit(&mut frame, super::TYPE_DATA, PEER, None, b"hi all");
        let incoming = lpp.input(&frame[..len], Instant::ZERO).unwrap().unwrap();
        assert!(incoming.broadcast);
    }
}
