use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Microseconds per second; every pts is normalised to this base internally.
pub const MICROS_PER_SEC: i64 = 1_000_000;

/// Anything earlier than one year past the epoch means the clock was never set.
const MIN_VALID_WALL_CLOCK_SECS: f64 = 31_536_000.0;

/// A rational time base, the unit a stream's pts is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i64,
    pub den: i64,
}

impl TimeBase {
    pub const MICROS: TimeBase = TimeBase::new(1, MICROS_PER_SEC);
    pub const MPEG_90K: TimeBase = TimeBase::new(1, 90_000);
    pub const MILLIS: TimeBase = TimeBase::new(1, 1_000);

    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Rescale `ts` from this time base into microseconds, rounding to nearest.
    ///
    /// Uses an `i128` intermediate so 33-bit MPEG clocks and large tick counts
    /// cannot overflow. Saturates at the `i64` range.
    pub fn to_micros(&self, ts: i64) -> i64 {
        if self.den == 0 {
            return 0;
        }
        let mut numer = ts as i128 * self.num as i128 * MICROS_PER_SEC as i128;
        let mut den = self.den as i128;
        if den < 0 {
            numer = -numer;
            den = -den;
        }
        let half = den / 2;
        let rounded = if numer >= 0 {
            (numer + half) / den
        } else {
            (numer - half) / den
        };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Data,
    Subtitle,
}

/// Metadata for one encoded access unit as seen by the split hook.
#[derive(Debug, Clone, Copy)]
pub struct AccessUnit {
    pub pts: Option<i64>,
    pub time_base: TimeBase,
    pub is_keyframe: bool,
    pub media: MediaKind,
}

impl AccessUnit {
    pub fn video(pts: i64, time_base: TimeBase, is_keyframe: bool) -> Self {
        Self {
            pts: Some(pts),
            time_base,
            is_keyframe,
            media: MediaKind::Video,
        }
    }

    pub fn audio(pts: i64, time_base: TimeBase) -> Self {
        Self {
            pts: Some(pts),
            time_base,
            is_keyframe: true,
            media: MediaKind::Audio,
        }
    }

    pub fn is_video(&self) -> bool {
        self.media == MediaKind::Video
    }

    /// Presentation time in microseconds, if the unit carries a pts.
    pub fn pts_micros(&self) -> Option<i64> {
        self.pts.map(|pts| self.time_base.to_micros(pts))
    }
}

pub(crate) fn micros_to_secs(us: i64) -> f64 {
    us as f64 / MICROS_PER_SEC as f64
}

/// Current wall-clock time in seconds since the epoch.
pub(crate) fn wall_clock_secs() -> Result<f64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    if now < MIN_VALID_WALL_CLOCK_SECS {
        return Err(Error::InvalidClock(now));
    }
    Ok(now)
}
