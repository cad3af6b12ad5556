//! Logic clock: frame counter, frame spans, and real-time conversion.
//!
//! RULE: All simulation timing is expressed in whole logic frames.
//! Wall-clock floats only appear at parse time, where design durations
//! are converted with ceiling rounding so nothing fires early.
//!
//! Frame arithmetic wraps at u32, which keeps `(f + s) - s == f` and
//! `(f + s) - f == s` true for every frame and span.

use crate::{
    error::{SimError, SimResult},
    types::Percentage,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};

// ── Frame rate ─────────────────────────────────────────────────

/// Logic frames per second. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct FrameRate(u32);

impl FrameRate {
    pub const DEFAULT: FrameRate = FrameRate(30);

    pub fn new(frames_per_second: u32) -> SimResult<Self> {
        if frames_per_second == 0 {
            return Err(SimError::InvalidConfig {
                reason: "logic frame rate must be positive".to_string(),
            });
        }
        Ok(Self(frames_per_second))
    }

    pub fn frames_per_second(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for FrameRate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        FrameRate::new(value).map_err(|e| e.to_string())
    }
}

impl From<FrameRate> for u32 {
    fn from(rate: FrameRate) -> u32 {
        rate.0
    }
}

// ── LogicFrame ─────────────────────────────────────────────────

/// An absolute simulation step number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LogicFrame(pub u32);

impl LogicFrame {
    pub const ZERO: LogicFrame = LogicFrame(0);
    pub const MAX: LogicFrame = LogicFrame(u32::MAX);

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

impl fmt::Display for LogicFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}", self.0)
    }
}

impl Add<LogicFrameSpan> for LogicFrame {
    type Output = LogicFrame;
    fn add(self, rhs: LogicFrameSpan) -> LogicFrame {
        LogicFrame(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign<LogicFrameSpan> for LogicFrame {
    fn add_assign(&mut self, rhs: LogicFrameSpan) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub<LogicFrameSpan> for LogicFrame {
    type Output = LogicFrame;
    fn sub(self, rhs: LogicFrameSpan) -> LogicFrame {
        LogicFrame(self.0.wrapping_sub(rhs.0))
    }
}

impl Sub<LogicFrame> for LogicFrame {
    type Output = LogicFrameSpan;
    fn sub(self, rhs: LogicFrame) -> LogicFrameSpan {
        LogicFrameSpan(self.0.wrapping_sub(rhs.0))
    }
}

// ── LogicFrameSpan ─────────────────────────────────────────────

/// A relative number of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LogicFrameSpan(pub u32);

impl LogicFrameSpan {
    pub const ZERO: LogicFrameSpan = LogicFrameSpan(0);
    pub const ONE: LogicFrameSpan = LogicFrameSpan(1);

    pub fn value(self) -> u32 {
        self.0
    }

    /// Rounds up so a delay never elapses before its real-time duration.
    pub fn from_milliseconds(milliseconds: f32, rate: FrameRate) -> Self {
        let frames = f64::from(milliseconds) * f64::from(rate.0) / 1000.0;
        Self(ceil_to_u32(frames))
    }

    pub fn from_seconds(seconds: f32, rate: FrameRate) -> Self {
        let frames = f64::from(seconds) * f64::from(rate.0);
        Self(ceil_to_u32(frames))
    }

    pub fn one_second(rate: FrameRate) -> Self {
        Self(rate.0)
    }

    pub fn max(self, other: LogicFrameSpan) -> LogicFrameSpan {
        if self >= other { self } else { other }
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// `as` saturates, so negative and NaN inputs become zero.
fn ceil_to_u32(value: f64) -> u32 {
    value.ceil() as u32
}

impl Add for LogicFrameSpan {
    type Output = LogicFrameSpan;
    fn add(self, rhs: LogicFrameSpan) -> LogicFrameSpan {
        LogicFrameSpan(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for LogicFrameSpan {
    type Output = LogicFrameSpan;
    fn sub(self, rhs: LogicFrameSpan) -> LogicFrameSpan {
        LogicFrameSpan(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul<u32> for LogicFrameSpan {
    type Output = LogicFrameSpan;
    fn mul(self, rhs: u32) -> LogicFrameSpan {
        LogicFrameSpan(self.0.wrapping_mul(rhs))
    }
}

impl Mul<f32> for LogicFrameSpan {
    type Output = LogicFrameSpan;
    fn mul(self, rhs: f32) -> LogicFrameSpan {
        LogicFrameSpan(ceil_to_u32(f64::from(self.0) * f64::from(rhs)))
    }
}

impl Mul<Percentage> for LogicFrameSpan {
    type Output = LogicFrameSpan;
    fn mul(self, rhs: Percentage) -> LogicFrameSpan {
        self * rhs.fraction()
    }
}

impl Div<f32> for LogicFrameSpan {
    type Output = LogicFrameSpan;
    fn div(self, rhs: f32) -> LogicFrameSpan {
        LogicFrameSpan(ceil_to_u32(f64::from(self.0) / f64::from(rhs)))
    }
}

impl Div<Percentage> for LogicFrameSpan {
    type Output = LogicFrameSpan;
    fn div(self, rhs: Percentage) -> LogicFrameSpan {
        self / rhs.fraction()
    }
}

impl Div for LogicFrameSpan {
    type Output = f32;
    fn div(self, rhs: LogicFrameSpan) -> f32 {
        self.0 as f32 / rhs.0 as f32
    }
}

// ── LogicClock ─────────────────────────────────────────────────

/// Owns the current frame and pause state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicClock {
    pub current_frame: LogicFrame,
    pub frame_rate:    FrameRate,
    pub paused:        bool,
}

impl LogicClock {
    pub fn new(frame_rate: FrameRate) -> Self {
        Self {
            current_frame: LogicFrame::ZERO,
            frame_rate,
            paused: true,
        }
    }

    /// Advance one frame. Returns the new frame number.
    pub fn advance(&mut self) -> SimResult<LogicFrame> {
        if self.paused {
            return Err(SimError::ClockPaused { frame: self.current_frame.0 });
        }
        self.current_frame.increment();
        Ok(self.current_frame)
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }

    /// Only the save loader and new-game setup move the clock directly.
    pub fn set_frame(&mut self, frame: LogicFrame) {
        self.current_frame = frame;
    }

    pub fn one_second(&self) -> LogicFrameSpan {
        LogicFrameSpan::one_second(self.frame_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_helper_saturates_negative_and_nan() {
        assert_eq!(ceil_to_u32(-3.5), 0);
        assert_eq!(ceil_to_u32(f64::NAN), 0);
        assert_eq!(ceil_to_u32(2.01), 3);
    }
}
