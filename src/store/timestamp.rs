//! Wall-clock timestamps.
//!
//! The root page records its creation time as microseconds since the Unix
//! epoch, serialized as a big-endian 64-bit integer.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

/// A wall-clock instant with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TimeStamp {
    micros: u64,
}

impl TimeStamp {
    /// Capture the current wall-clock time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        TimeStamp { micros }
    }

    /// Build a timestamp from raw microseconds since the epoch.
    pub fn from_micros(micros: u64) -> Self {
        TimeStamp { micros }
    }

    /// Microseconds since the epoch.
    pub fn micros(&self) -> u64 {
        self.micros
    }

    /// Serialize into the first eight bytes of `buf`, big-endian.
    pub fn write_to(&self, buf: &mut [u8]) {
        BigEndian::write_u64(buf, self.micros);
    }

    /// Deserialize from the first eight bytes of `buf`.
    pub fn read_from(buf: &[u8]) -> Self {
        TimeStamp { micros: BigEndian::read_u64(buf) }
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.micros / 1_000_000, self.micros % 1_000_000)
    }
}
