//! Detector hits and their fixed-size wire record.
//!
//! One eventlet is stored as four 32-bit words (16 bytes):
//!
//! | word | contents                                       |
//! |------|------------------------------------------------|
//! | 0    | `time >> 32`                                   |
//! | 1    | `time & 0xFFFF_FFFF`                           |
//! | 2    | `plane << 16 \| strip`                         |
//! | 3    | `flag << 16 \| over_threshold << 17 \| adc`    |
//!
//! Decoding is total: every 4-word record maps to some eventlet. Plane
//! values wider than 8 bits do not survive a decode.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Number of `u32` words in one encoded eventlet.
pub const RECORD_WORDS: usize = 4;

/// Number of low time bits that form the timebin within an event.
pub const TIMEBIN_BITS: u32 = 8;

const FLAG_BIT: u32 = 16;
const OVER_THRESHOLD_BIT: u32 = 17;

/// A single detector hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Eventlet {
    /// Monotonic timestamp.
    pub time: u64,
    /// Readout plane, 0 (X) or 1 (Y).
    pub plane: u8,
    /// Strip number within the plane.
    pub strip: u16,
    /// Amplitude.
    pub adc: u16,
    /// Neighbouring-channel trigger flag.
    pub flag: bool,
    /// Amplitude exceeded the channel threshold.
    pub over_threshold: bool,
}

impl Eventlet {
    /// Creates an eventlet with both flags cleared.
    #[inline]
    #[must_use]
    pub fn new(time: u64, plane: u8, strip: u16, adc: u16) -> Self {
        Self {
            time,
            plane,
            strip,
            adc,
            flag: false,
            over_threshold: false,
        }
    }

    /// Sets the neighbour flag.
    #[must_use]
    pub fn with_flag(mut self, flag: bool) -> Self {
        self.flag = flag;
        self
    }

    /// Sets the over-threshold bit.
    #[must_use]
    pub fn with_over_threshold(mut self, over_threshold: bool) -> Self {
        self.over_threshold = over_threshold;
        self
    }

    /// Time with the timebin bits stripped.
    #[inline]
    #[must_use]
    pub fn coarse_time(&self) -> u64 {
        self.time >> TIMEBIN_BITS
    }

    /// Timebin within the coarse window (low 8 bits of time).
    #[inline]
    #[must_use]
    pub fn timebin(&self) -> u16 {
        (self.time & 0xFF) as u16
    }

    /// Encodes into one wire record.
    #[must_use]
    pub fn encode(&self) -> [u32; RECORD_WORDS] {
        [
            (self.time >> 32) as u32,
            (self.time & 0xFFFF_FFFF) as u32,
            (u32::from(self.plane) << 16) | u32::from(self.strip),
            (u32::from(self.flag) << FLAG_BIT)
                | (u32::from(self.over_threshold) << OVER_THRESHOLD_BIT)
                | u32::from(self.adc),
        ]
    }

    /// Decodes one wire record.
    #[must_use]
    pub fn decode(words: [u32; RECORD_WORDS]) -> Self {
        Self {
            time: (u64::from(words[0]) << 32) | u64::from(words[1]),
            plane: ((words[2] >> 16) & 0xFF) as u8,
            strip: (words[2] & 0xFFFF) as u16,
            adc: (words[3] & 0xFFFF) as u16,
            flag: (words[3] >> FLAG_BIT) & 1 == 1,
            over_threshold: (words[3] >> OVER_THRESHOLD_BIT) & 1 == 1,
        }
    }

    /// Orders by time, then strip.
    #[must_use]
    pub fn cmp_time_strip(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.strip.cmp(&other.strip))
    }
}

/// Encodes a run of eventlets into a flat word buffer.
#[must_use]
pub fn encode_batch(eventlets: &[Eventlet]) -> Vec<u32> {
    let mut words = Vec::with_capacity(eventlets.len() * RECORD_WORDS);
    for e in eventlets {
        words.extend_from_slice(&e.encode());
    }
    words
}

/// Decodes a flat word buffer. A trailing partial record is ignored.
#[must_use]
pub fn decode_batch(words: &[u32]) -> Vec<Eventlet> {
    words
        .chunks_exact(RECORD_WORDS)
        .map(|w| Eventlet::decode([w[0], w[1], w[2], w[3]]))
        .collect()
}

impl std::fmt::Display for Eventlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "time={} plane={} strip={} adc={}",
            self.time, self.plane, self.strip, self.adc
        )
    }
}
