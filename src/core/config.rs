use crate::error::ConfigError;
use std::time::Duration;

pub const DEFAULT_SEGMENT_TIME: f64 = 10.0;
pub const DEFAULT_MAX_QUEUED: usize = 3;
pub const DEFAULT_SEGMENT_CAPACITY: usize = 10 * 1024 * 1024;
pub const DEFAULT_WRITER_TIMEOUT_MS: u64 = 30_000;

/// Producer behaviour when the ready queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureMode {
    /// Wait until the writer frees a slot; never drop a segment.
    #[default]
    Block,
    /// Evict the oldest ready segment; never block the producer.
    DropOldest,
}

/// Options of a cached segment recording.
///
/// Built with by-value setters:
///
/// ```rust
/// use cached_segment::{BackpressureMode, CachedSegmentConfig};
///
/// let config = CachedSegmentConfig::new()
///     .set_segment_time(6.0)
///     .set_max_queued(5)
///     .set_backpressure(BackpressureMode::DropOldest);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CachedSegmentConfig {
    segment_time: f64,
    start_number: u64,
    max_queued: usize,
    segment_capacity: usize,
    format_options: Option<String>,
    persistence: bool,
    start_ts: Option<f64>,
    pre_roll: f64,
    writer_timeout: Option<Duration>,
    backpressure: BackpressureMode,
}

impl Default for CachedSegmentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CachedSegmentConfig {
    pub fn new() -> Self {
        Self {
            segment_time: DEFAULT_SEGMENT_TIME,
            start_number: 0,
            max_queued: DEFAULT_MAX_QUEUED,
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            format_options: None,
            persistence: true,
            start_ts: None,
            pre_roll: 0.0,
            writer_timeout: Some(Duration::from_millis(DEFAULT_WRITER_TIMEOUT_MS)),
            backpressure: BackpressureMode::Block,
        }
    }

    /// Target segment duration in seconds. Real segments are at least this
    /// long and end on the next keyframe.
    pub fn set_segment_time(mut self, secs: f64) -> Self {
        self.segment_time = secs;
        self
    }

    /// First sequence number handed out.
    pub fn set_start_number(mut self, start_number: u64) -> Self {
        self.start_number = start_number;
        self
    }

    /// Maximum number of closed segments waiting for the writer.
    pub fn set_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = max_queued;
        self
    }

    /// Capacity of every segment buffer in bytes.
    pub fn set_segment_capacity(mut self, bytes: usize) -> Self {
        self.segment_capacity = bytes;
        self
    }

    /// Container format options forwarded to the muxer, `key=value` pairs
    /// separated by `:`.
    pub fn set_format_options(mut self, options: impl Into<String>) -> Self {
        self.format_options = Some(options.into());
        self
    }

    pub fn set_persistence(mut self, enabled: bool) -> Self {
        self.persistence = enabled;
        self
    }

    /// Override the wall-clock start timestamp (seconds since the epoch).
    pub fn set_start_ts(mut self, start_ts: f64) -> Self {
        self.start_ts = Some(start_ts);
        self
    }

    /// Seconds of segments kept in memory while persistence is disabled.
    pub fn set_pre_roll(mut self, secs: f64) -> Self {
        self.pre_roll = secs;
        self
    }

    /// I/O timeout handed to the writer. `None` means unbounded.
    pub fn set_writer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.writer_timeout = timeout;
        self
    }

    pub fn set_backpressure(mut self, mode: BackpressureMode) -> Self {
        self.backpressure = mode;
        self
    }

    /// Apply one option by its muxer option name.
    pub fn set_option(self, key: &str, value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let config = match key {
            "start_number" => self.set_start_number(value.parse().map_err(|_| invalid())?),
            "cseg_time" => {
                let secs: f64 = value.parse().map_err(|_| invalid())?;
                if !secs.is_finite() {
                    return Err(invalid());
                }
                self.set_segment_time(secs)
            }
            "cseg_list_size" => self.set_max_queued(value.parse().map_err(|_| invalid())?),
            "cseg_ts_options" => self.set_format_options(value),
            "cseg_seg_size" => self.set_segment_capacity(value.parse().map_err(|_| invalid())?),
            "start_ts" => {
                let ts: f64 = value.parse().map_err(|_| invalid())?;
                if ts < 0.0 {
                    Self {
                        start_ts: None,
                        ..self
                    }
                } else {
                    self.set_start_ts(ts)
                }
            }
            "cseg_cache_time" => {
                let secs: f64 = value.parse().map_err(|_| invalid())?;
                if secs < 0.0 || !secs.is_finite() {
                    return Err(invalid());
                }
                self.set_pre_roll(secs)
            }
            "writer_timeout" => {
                let ms: i64 = value.parse().map_err(|_| invalid())?;
                match ms {
                    -1 => self.set_writer_timeout(None),
                    ms if ms >= 0 => self.set_writer_timeout(Some(Duration::from_millis(ms as u64))),
                    _ => return Err(invalid()),
                }
            }
            "cseg_flags" => {
                let mut mode = BackpressureMode::Block;
                for flag in value.split('+').map(str::trim).filter(|f| !f.is_empty()) {
                    match flag {
                        "nonblock" => mode = BackpressureMode::DropOldest,
                        "0" => {}
                        _ => return Err(invalid()),
                    }
                }
                self.set_backpressure(mode)
            }
            "cseg_persist" => match value {
                "1" | "true" | "on" => self.set_persistence(true),
                "0" | "false" | "off" => self.set_persistence(false),
                _ => return Err(invalid()),
            },
            _ => return Err(ConfigError::UnknownOption(key.to_string())),
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.segment_time >= 1.0) {
            return Err(ConfigError::SegmentTimeTooShort(self.segment_time));
        }
        if self.max_queued == 0 {
            return Err(ConfigError::EmptyQueue);
        }
        if self.segment_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if let Some(options) = &self.format_options {
            FormatOptions::parse(options)?;
        }
        Ok(())
    }

    /// Number of ready segments the worker leaves untouched.
    ///
    /// Segments held back while persistence is off: the pre-roll window in
    /// whole segments, capped one below the queue limit so a blocked producer
    /// can always make progress.
    pub fn retention_keep(&self) -> usize {
        let slots = (self.pre_roll / self.segment_time).ceil();
        let slots = if slots.is_finite() && slots > 0.0 {
            slots as usize
        } else {
            0
        };
        slots.min(self.max_queued.saturating_sub(1))
    }

    pub fn segment_time(&self) -> f64 {
        self.segment_time
    }

    pub fn start_number(&self) -> u64 {
        self.start_number
    }

    pub fn max_queued(&self) -> usize {
        self.max_queued
    }

    pub fn segment_capacity(&self) -> usize {
        self.segment_capacity
    }

    pub fn persistence(&self) -> bool {
        self.persistence
    }

    pub fn start_ts(&self) -> Option<f64> {
        self.start_ts
    }

    pub fn pre_roll(&self) -> f64 {
        self.pre_roll
    }

    pub fn writer_timeout(&self) -> Option<Duration> {
        self.writer_timeout
    }

    pub fn backpressure(&self) -> BackpressureMode {
        self.backpressure
    }

    /// Parsed container format options (empty when none are configured).
    pub fn format_options(&self) -> Result<FormatOptions, ConfigError> {
        match &self.format_options {
            Some(options) => FormatOptions::parse(options),
            None => Ok(FormatOptions::default()),
        }
    }
}

/// Ordered `key=value` pairs destined for the container muxer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatOptions {
    entries: Vec<(String, String)>,
}

impl FormatOptions {
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for item in list.split(':').filter(|item| !item.is_empty()) {
            let Some((key, value)) = item.split_once('=') else {
                return Err(ConfigError::MalformedFormatOptions(list.to_string()));
            };
            if key.is_empty() {
                return Err(ConfigError::MalformedFormatOptions(list.to_string()));
            }
            entries.push((key.to_string(), value.to_string()));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
