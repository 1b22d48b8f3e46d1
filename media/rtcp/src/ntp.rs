use std::ops::Add;
use std::sync::LazyLock;
use std::time::{Duration, Instant, SystemTime};
use time::ext::InstantExt;

static WALL_CLOCK_ANCHOR: LazyLock<(SystemTime, Instant)> = LazyLock::new(|| {
    let time = SystemTime::now();
    let instant = Instant::now();

    (time, instant)
});

/// Seconds between 1900-01-01 (start of NTP era 0) and the Unix epoch.
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;
const MICROS_PER_SEC: u64 = 1_000_000;

/// A point in time expressed as whole microseconds since 1900-01-01T00:00:00Z.
///
/// Converts losslessly (at microsecond resolution) to and from the 64-bit
/// 32.32 fixed-point representation used on the wire. `Instant`s are mapped
/// to wall time through a process-global anchor taken once, so conversions
/// within one process are mutually consistent.
///
/// The 32-bit seconds counter only covers ~1900–2036; values outside that
/// window are a caller bug, not a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NtpTimestamp {
    micros: u64,
}

impl NtpTimestamp {
    pub fn from_instant(instant: Instant) -> Self {
        let (ref_time, ref_instant) = &*WALL_CLOCK_ANCHOR;
        let wall = *ref_time + instant.signed_duration_since(*ref_instant);

        let since_unix = wall
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);

        NtpTimestamp {
            micros: since_unix.as_micros() as u64 + NTP_UNIX_OFFSET_SECS * MICROS_PER_SEC,
        }
    }

    pub fn to_instant(self) -> Instant {
        let (ref_time, ref_instant) = &*WALL_CLOCK_ANCHOR;

        let since_unix = self
            .micros
            .saturating_sub(NTP_UNIX_OFFSET_SECS * MICROS_PER_SEC);
        let wall = SystemTime::UNIX_EPOCH + Duration::from_micros(since_unix);

        match wall.duration_since(*ref_time) {
            Ok(ahead) => *ref_instant + ahead,
            Err(behind) => *ref_instant - behind.duration(),
        }
    }

    /// Split into the 32-bit seconds and 32-bit fractional-seconds fields.
    pub fn to_parts(self) -> (u32, u32) {
        let seconds = self.micros / MICROS_PER_SEC;
        debug_assert!(
            seconds <= u64::from(u32::MAX),
            "timestamp outside the 32-bit NTP era"
        );

        let sub_micros = self.micros % MICROS_PER_SEC;
        let fraction = ((sub_micros << 32) + MICROS_PER_SEC / 2) / MICROS_PER_SEC;

        (seconds as u32, fraction as u32)
    }

    pub fn from_parts(seconds: u32, fraction: u32) -> Self {
        let sub_micros = (u64::from(fraction) * MICROS_PER_SEC + (1 << 31)) >> 32;

        NtpTimestamp {
            micros: u64::from(seconds) * MICROS_PER_SEC + sub_micros,
        }
    }

    pub fn to_fixed_u64(self) -> u64 {
        let (seconds, fraction) = self.to_parts();
        (u64::from(seconds) << 32) | u64::from(fraction)
    }

    pub fn from_fixed_u64(fixed: u64) -> Self {
        Self::from_parts((fixed >> 32) as u32, fixed as u32)
    }

    /// Middle 32 bits of [`to_fixed_u64`](Self::to_fixed_u64), the compact
    /// form echoed in report blocks (LSR).
    pub fn truncated(self) -> u32 {
        ((self.to_fixed_u64() >> 16) & u64::from(u32::MAX)) as u32
    }

    pub fn saturating_duration_since(self, earlier: NtpTimestamp) -> Duration {
        Duration::from_micros(self.micros.saturating_sub(earlier.micros))
    }
}

impl Add<Duration> for NtpTimestamp {
    type Output = NtpTimestamp;

    fn add(self, rhs: Duration) -> NtpTimestamp {
        NtpTimestamp {
            micros: self.micros + rhs.as_micros() as u64,
        }
    }
}

/// Encode a delay as 16.16 fixed-point seconds, the DLSR field format.
pub(crate) fn to_ntp_diff(delay: Duration) -> u32 {
    ((delay.as_micros() as u64 * 65536) / MICROS_PER_SEC) as u32
}

pub(crate) fn ntp_diff_to_duration(diff: u32) -> Duration {
    Duration::from_micros((u64::from(diff) * MICROS_PER_SEC) >> 16)
}
