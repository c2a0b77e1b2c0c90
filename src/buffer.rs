//! SR844 data-buffer decoding.
//!
//! The lock-in stores acquired samples in two channel buffers. Reading a buffer
//! with `TRCL` returns a binary frame of packed floating-point words: for every
//! sample a little-endian `i16` mantissa followed by a little-endian `i16`
//! exponent, with the value being `mantissa * 2^(exponent - 124)`.
//!
//! ```text
//!  byte:   0    1    2    3    4    5    6    7   ...
//!        [ mantissa0 ][ exponent0 ][ mantissa1 ][ exponent1 ] ...
//! ```
//!
//! Besides the decoder itself this module builds the setpoint axis (time or
//! trigger index) and picks the physical unit for a channel, and keeps the
//! per-channel [`AcquisitionSession`] that guards a readout against stale
//! configuration.

use bytes::Buf;
use serde::Serialize;
use std::fmt;

use crate::error::{AppResult, DaqError};

/// Fixed exponent bias of the instrument's floating-point encoding.
pub const EXPONENT_BIAS: i32 = 124;

/// Size of one encoded sample in bytes (two `i16` words).
pub const WORD_BYTES: usize = 4;

/// One encoded sample as stored in the buffer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawWord {
    /// Signed mantissa.
    pub mantissa: i16,
    /// Biased binary exponent.
    pub exponent: i16,
}

impl RawWord {
    /// Create a word from its two components.
    pub fn new(mantissa: i16, exponent: i16) -> Self {
        Self { mantissa, exponent }
    }

    /// Decoded floating-point value.
    pub fn value(&self) -> f64 {
        f64::from(self.mantissa) * 2f64.powi(i32::from(self.exponent) - EXPONENT_BIAS)
    }

    /// Wire representation of the word.
    pub fn to_le_bytes(self) -> [u8; WORD_BYTES] {
        let m = self.mantissa.to_le_bytes();
        let e = self.exponent.to_le_bytes();
        [m[0], m[1], e[0], e[1]]
    }
}

/// Decode a raw `TRCL` frame into `expected_count` samples.
///
/// Fails with [`DaqError::EmptyBuffer`] when `expected_count` is zero, and with
/// [`DaqError::MalformedFrame`] when the frame is not made of whole 4-byte words
/// or holds a different number of samples than expected. The frame is never
/// truncated or padded to make it fit.
pub fn decode(raw: &[u8], expected_count: usize) -> AppResult<Vec<f64>> {
    if expected_count == 0 {
        return Err(DaqError::EmptyBuffer);
    }
    if raw.len() % WORD_BYTES != 0 {
        return Err(DaqError::MalformedFrame(format!(
            "{} bytes is not a whole number of {}-byte samples",
            raw.len(),
            WORD_BYTES
        )));
    }

    let mut frame = raw;
    let mut values = Vec::with_capacity(raw.len() / WORD_BYTES);
    while frame.remaining() >= WORD_BYTES {
        let word = RawWord::new(frame.get_i16_le(), frame.get_i16_le());
        values.push(word.value());
    }

    if values.len() != expected_count {
        return Err(DaqError::MalformedFrame(format!(
            "instrument returned {} samples, expected {}",
            values.len(),
            expected_count
        )));
    }
    Ok(values)
}

/// Buffer sample rate as configured with `SRAT`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SampleRate {
    /// One sample per trigger event.
    Trigger,
    /// Internal clock, in Hz. Always positive.
    Hz(f64),
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleRate::Trigger => write!(f, "Trigger"),
            SampleRate::Hz(rate) => write!(f, "{} Hz", rate),
        }
    }
}

/// Setpoints that go with a decoded buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetpointAxis {
    /// Short machine name of the axis.
    pub name: &'static str,
    /// Human readable label.
    pub label: &'static str,
    /// Unit of the axis values, empty when dimensionless.
    pub unit: &'static str,
    /// One value per sample.
    pub values: Vec<f64>,
}

impl SetpointAxis {
    /// Number of setpoints.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the axis has no points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build the setpoint axis for `count` samples taken at `rate`.
///
/// In trigger mode the axis is the trigger event index `0..count`. With an
/// internal clock it is elapsed time `i / rate` seconds, i.e. `count` evenly
/// spaced points starting at zero and stopping one interval short of
/// `count / rate`.
pub fn build_setpoints(count: usize, rate: SampleRate) -> SetpointAxis {
    match rate {
        SampleRate::Trigger => SetpointAxis {
            name: "trig_events",
            label: "trigger event number",
            unit: "",
            values: (0..count).map(|i| i as f64).collect(),
        },
        SampleRate::Hz(hz) => SetpointAxis {
            name: "time",
            label: "time",
            unit: "s",
            values: (0..count).map(|i| i as f64 / hz).collect(),
        },
    }
}

/// Physical unit of a channel's buffered values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BufferUnit {
    /// Volts.
    Volts,
    /// Degrees of phase.
    Degrees,
    /// Percent of the ratio input.
    Percent,
}

impl BufferUnit {
    /// Unit symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            BufferUnit::Volts => "V",
            BufferUnit::Degrees => "deg",
            BufferUnit::Percent => "%",
        }
    }
}

impl fmt::Display for BufferUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Pick the unit of a channel from its ratio and display settings.
///
/// A ratioed channel reads in percent; otherwise the phase display reads in
/// degrees and everything else in volts.
pub fn select_unit(ratio: &str, display: &str) -> BufferUnit {
    if ratio != "none" {
        BufferUnit::Percent
    } else if display == "Phase" {
        BufferUnit::Degrees
    } else {
        BufferUnit::Volts
    }
}

/// One decoded acquisition of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleBuffer {
    /// Channel the samples came from.
    pub channel: u8,
    /// Samples in acquisition order.
    pub values: Vec<f64>,
    /// Time or trigger axis, same length as `values`.
    pub setpoints: SetpointAxis,
    /// Unit of `values`.
    pub unit: BufferUnit,
}

impl SampleBuffer {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(setpoint, value)` pairs in acquisition order.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.setpoints
            .values
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }
}

/// Setpoints and unit prepared for the current acquisition configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Preparation {
    /// Point count reported when the readout was prepared.
    pub count: usize,
    /// Sample rate in effect when the readout was prepared.
    pub rate: SampleRate,
    /// Prepared setpoint axis.
    pub setpoints: SetpointAxis,
    /// Unit of the channel's values.
    pub unit: BufferUnit,
}

/// Readout state of one channel buffer.
///
/// A channel is ready once [`prepare`](Self::prepare) has recorded setpoints
/// and unit for the current configuration. Any change to the sample rate or to
/// the channel's ratio/display must call [`invalidate`](Self::invalidate).
#[derive(Debug, Clone)]
pub struct AcquisitionSession {
    channel: u8,
    prepared: Option<Preparation>,
}

impl AcquisitionSession {
    /// New, unprepared session for `channel`.
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            prepared: None,
        }
    }

    /// Channel number.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Whether a readout may be issued.
    pub fn is_ready(&self) -> bool {
        self.prepared.is_some()
    }

    /// Current preparation, if any.
    pub fn preparation(&self) -> Option<&Preparation> {
        self.prepared.as_ref()
    }

    /// Record setpoints and unit for `count` points at `rate` and mark ready.
    pub fn prepare(&mut self, count: usize, rate: SampleRate, unit: BufferUnit) -> &Preparation {
        self.prepared.insert(Preparation {
            count,
            rate,
            setpoints: build_setpoints(count, rate),
            unit,
        })
    }

    /// Drop the preparation after a configuration change.
    pub fn invalidate(&mut self) {
        self.prepared = None;
    }

    /// Fail with [`DaqError::BufferNotPrepared`] unless ready.
    pub fn ensure_ready(&self) -> AppResult<&Preparation> {
        self.prepared.as_ref().ok_or(DaqError::BufferNotPrepared {
            channel: self.channel,
        })
    }

    /// Check that a readout of `reported_count` points may be issued: the
    /// session is ready, the buffer is not empty and the count still matches
    /// the preparation.
    pub fn check_count(&self, reported_count: usize) -> AppResult<&Preparation> {
        let prep = self.ensure_ready()?;
        if reported_count == 0 {
            return Err(DaqError::EmptyBuffer);
        }
        if prep.count != reported_count {
            return Err(DaqError::BufferSizeChanged {
                prepared: prep.count,
                reported: reported_count,
            });
        }
        Ok(prep)
    }

    /// Decode a frame read while the instrument reported `reported_count` points.
    pub fn decode(&self, raw: &[u8], reported_count: usize) -> AppResult<SampleBuffer> {
        let prep = self.check_count(reported_count)?;
        let values = decode(raw, reported_count)?;
        Ok(SampleBuffer {
            channel: self.channel,
            values,
            setpoints: prep.setpoints.clone(),
            unit: prep.unit,
        })
    }
}
