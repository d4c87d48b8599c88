//! Time windowing for segmented reads.
//!
//! A [`Window`] walks a fixed [`TimeRange`] in `step`-sized segments. Segments
//! are half-open, contiguous and strictly increasing; the last one ends
//! exactly at the range end even when `step` does not divide the range.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// The overall range to migrate and the size of each read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: SystemTime,
    end: SystemTime,
    step: Duration,
}

impl TimeRange {
    /// Creates a range. Fails if `start > end` or `step` is zero.
    pub fn new(start: SystemTime, end: SystemTime, step: Duration) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "range start {} ms is after end {} ms",
                to_millis(start),
                to_millis(end)
            )));
        }
        if step.is_zero() {
            return Err(Error::InvalidInput("step must be positive".to_string()));
        }
        Ok(Self { start, end, step })
    }

    pub fn start(&self) -> SystemTime {
        self.start
    }

    pub fn end(&self) -> SystemTime {
        self.end
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Number of segments the range splits into: `ceil((end - start) / step)`.
    pub fn segment_count(&self) -> u64 {
        segments_between(self.start, self.end, self.step)
    }
}

/// One bounded sub-interval `[start, end)` of a [`TimeRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: SystemTime,
    pub end: SystemTime,
}

impl Segment {
    pub fn start_ms(&self) -> i64 {
        to_millis(self.start)
    }

    pub fn end_ms(&self) -> i64 {
        to_millis(self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Active { current: SystemTime },
    Exhausted,
}

/// Cursor over the segments of a [`TimeRange`].
#[derive(Debug, Clone)]
pub struct Window {
    range: TimeRange,
    cursor: Cursor,
}

impl Window {
    /// Creates a window positioned at the range start. A zero-length range
    /// starts out exhausted.
    pub fn new(range: TimeRange) -> Self {
        let cursor = if range.start == range.end {
            Cursor::Exhausted
        } else {
            Cursor::Active {
                current: range.start,
            }
        };
        Self { range, cursor }
    }

    pub fn range(&self) -> &TimeRange {
        &self.range
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor == Cursor::Exhausted
    }

    /// Returns the next segment and advances, or `None` once the range end
    /// has been reached. Exhaustion is permanent.
    pub fn next_segment(&mut self) -> Option<Segment> {
        let current = match self.cursor {
            Cursor::Active { current } => current,
            Cursor::Exhausted => return None,
        };

        let end = current
            .checked_add(self.range.step)
            .map_or(self.range.end, |e| e.min(self.range.end));

        self.cursor = if end == self.range.end {
            Cursor::Exhausted
        } else {
            Cursor::Active { current: end }
        };

        Some(Segment {
            start: current,
            end,
        })
    }

    /// Number of segments not yet emitted.
    pub fn remaining(&self) -> u64 {
        match self.cursor {
            Cursor::Active { current } => segments_between(current, self.range.end, self.range.step),
            Cursor::Exhausted => 0,
        }
    }
}

impl Iterator for Window {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        self.next_segment()
    }
}

fn segments_between(start: SystemTime, end: SystemTime, step: Duration) -> u64 {
    let span = end.duration_since(start).unwrap_or_default().as_nanos();
    let step = step.as_nanos();
    span.div_ceil(step) as u64
}

/// Converts a wall-clock time to Unix milliseconds. Times before the epoch
/// map to negative values.
pub fn to_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Converts Unix milliseconds to a wall-clock time.
pub fn from_millis(ms: i64) -> SystemTime {
    if ms >= 0 {
        UNIX_EPOCH + Duration::from_millis(ms as u64)
    } else {
        UNIX_EPOCH - Duration::from_millis(ms.unsigned_abs())
    }
}
