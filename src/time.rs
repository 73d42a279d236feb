//! Monotonic time values
//!
//! The crate never reads a clock on its own; callers sample their clock source and pass
//! [`Instant`] values into the operations that need them (reassembly aging, the LPP duty cycle).
//!
//! [`Instant`]: struct.Instant.html

use core::{fmt, ops};

/// An absolute time value, in microseconds since an arbitrary epoch such as system startup
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Instant {
    micros: i64,
}

impl Instant {
    /// The epoch itself
    pub const ZERO: Instant = Instant { micros: 0 };

    /// Creates an `Instant` from a number of microseconds
    pub const fn from_micros(micros: i64) -> Instant {
        Instant { micros }
    }

    /// Creates an `Instant` from a number of milliseconds
    pub const fn from_millis(millis: i64) -> Instant {
        Instant {
            micros: millis * 1_000,
        }
    }

    /// Creates an `Instant` from a number of seconds
    pub const fn from_secs(secs: i64) -> Instant {
        Instant {
            micros: secs * 1_000_000,
        }
    }

    /// The number of whole seconds since the epoch
    pub const fn secs(&self) -> i64 {
        self.micros / 1_000_000
    }

    /// The fractional number of milliseconds since the epoch
    pub const fn millis(&self) -> i64 {
        self.micros % 1_000_000 / 1_000
    }

    /// The total number of microseconds since the epoch
    pub const fn total_micros(&self) -> i64 {
        self.micros
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:0>3}s", self.secs(), self.millis())
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros + rhs.total_micros() as i64)
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.micros += rhs.total_micros() as i64;
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros - rhs.total_micros() as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_micros((self.micros - rhs.micros) as u64)
    }
}

/// A relative time value, in microseconds
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct Duration {
    micros: u64,
}

impl Duration {
    /// The zero length duration
    pub const ZERO: Duration = Duration { micros: 0 };

    /// Creates a `Duration` from a number of microseconds
    pub const fn from_micros(micros: u64) -> Duration {
        Duration { micros }
    }

    /// Creates a `Duration` from a number of milliseconds
    pub const fn from_millis(millis: u64) -> Duration {
        Duration {
            micros: millis * 1_000,
        }
    }

    /// Creates a `Duration` from a number of seconds
    pub const fn from_secs(secs: u64) -> Duration {
        Duration {
            micros: secs * 1_000_000,
        }
    }

    /// The number of whole seconds in this duration
    pub const fn secs(&self) -> u64 {
        self.micros / 1_000_000
    }

    /// The fractional number of milliseconds in this duration
    pub const fn millis(&self) -> u64 {
        self.micros / 1_000 % 1_000
    }

    /// The total number of microseconds in this duration
    pub const fn total_micros(&self) -> u64 {
        self.micros
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

impl ops::Add<Duration> for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::from_micros(self.micros + rhs.total_micros())
    }
}

impl ops::Mul<u32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: u32) -> Duration {
        Duration::from_micros(self.micros * u64::from(rhs))
    }
}

impl ops::Div<u32> for Duration {
    type Output = Duration;

    fn div(self, rhs: u32) -> Duration {
        Duration::from_micros(self.micros / u64::from(rhs))
    }
}
