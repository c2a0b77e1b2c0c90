//! Stanford Research SR844 RF lock-in amplifier driver
//!
//! Parameters and functions are described in one table built by
//! [`Sr844::new`]; the generic [`InstrumentCore`] does the lookups. On top of
//! that the driver adds:
//!
//! - the channel ratio/display settings, which share one `DDEF` command per
//!   channel and are therefore set with a read-modify-write,
//! - the two channel data buffers with their readout preparation.
//!
//! ## Buffer readout
//!
//! ```no_run
//! # use rust_daq_drivers::{adapters::VisaAdapter, instrument::Sr844};
//! # async fn run() -> rust_daq_drivers::AppResult<()> {
//! let mut adapter = VisaAdapter::new("GPIB0::8::INSTR".to_string());
//! adapter.connect().await?;
//! let mut lockin = Sr844::connect("lockin", adapter).await?;
//!
//! lockin.set("buffer_SR", 64.0).await?;
//! lockin.buffer_reset().await?;
//! lockin.buffer_start().await?;
//! // ... wait for the acquisition ...
//! lockin.buffer_pause().await?;
//!
//! lockin.prepare_buffer_readout(1).await?;
//! let trace = lockin.read_buffer(1).await?;
//! println!("{} samples in {}", trace.len(), trace.unit);
//! # Ok(())
//! # }
//! ```
//!
//! Changing `buffer_SR`, or a channel's ratio or display, discards the
//! preparation so a stale time axis or unit is never attached to new data.
//! The preparation is discarded before the command goes out, so a write that
//! fails half way still requires a new preparation.

use tracing::{debug, info, warn};

use super::InstrumentCore;
use crate::adapters::Transport;
use crate::buffer::{
    select_unit, AcquisitionSession, Preparation, SampleBuffer, SampleRate, WORD_BYTES,
};
use crate::error::{AppResult, DaqError};
use crate::parameter::{
    FunctionSpec, FunctionTable, ParameterSpec, ParameterTable, ResponseParser, Validator, Value,
    ValueFormat,
};

/// Buffer channels of the SR844.
pub const CHANNELS: [u8; 2] = [1, 2];

/// Identification query.
const IDN: &str = "*IDN?";

/// Full-scale sensitivities in volts, indexed by `SENS` code.
const SENSITIVITIES: [f64; 15] = [
    1e-7, 3e-7, 1e-6, 3e-6, 1e-5, 3e-5, 1e-4, 3e-4, 1e-3, 3e-3, 1e-2, 3e-2, 0.1, 0.3, 1.0,
];

/// Time constants in seconds, indexed by `OFLT` code.
const TIME_CONSTANTS: [f64; 18] = [
    1e-4, 3e-4, 1e-3, 3e-3, 1e-2, 3e-2, 0.1, 0.3, 1.0, 3.0, 10.0, 30.0, 100.0, 300.0, 1e3, 3e3,
    1e4, 3e4,
];

/// Internal buffer sample rates in Hz, indexed by `SRAT` code. Code 14 is
/// trigger mode.
const SAMPLE_RATES: [f64; 14] = [
    0.0625, 0.125, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0,
];

const TRIGGER: &str = "Trigger";
const TRIGGER_CODE: &str = "14";

/// Ratio choices, indexed by the second `DDEF` field.
const RATIOS: [&str; 3] = ["none", "Aux In 1", "Aux In 2"];

/// Display choices per channel, indexed by the first `DDEF` field.
const CH1_DISPLAYS: [&str; 5] = ["X", "R", "X Noise", "Aux In 1", "Aux In 2"];
const CH2_DISPLAYS: [&str; 5] = ["Y", "Phase", "Y Noise", "Aux In 3", "Aux In 4"];

/// Settings stored together in a channel's `DDEF` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelSetting {
    Display,
    Ratio,
}

impl ChannelSetting {
    /// Split `ch2_ratio` style names into channel and setting.
    fn parse(name: &str) -> Option<(u8, Self)> {
        let (channel, setting) = name.strip_prefix("ch")?.split_once('_')?;
        let channel: u8 = channel.parse().ok()?;
        if !CHANNELS.contains(&channel) {
            return None;
        }
        match setting {
            "display" => Some((channel, ChannelSetting::Display)),
            "ratio" => Some((channel, ChannelSetting::Ratio)),
            _ => None,
        }
    }

    fn parameter(self, channel: u8) -> String {
        match self {
            ChannelSetting::Display => format!("ch{}_display", channel),
            ChannelSetting::Ratio => format!("ch{}_ratio", channel),
        }
    }
}

fn channel_index(channel: u8) -> AppResult<usize> {
    match channel {
        1 | 2 => Ok(usize::from(channel) - 1),
        other => Err(DaqError::InvalidChannel(other)),
    }
}

/// `n`th field of a `DDEF ?` response.
fn ddef_field(response: &str, n: usize) -> AppResult<Value> {
    response
        .split(',')
        .nth(n)
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| Value::Text(field.to_string()))
        .ok_or_else(|| DaqError::response_parse("DDEF ?", response))
}

fn ddef_display(response: &str) -> AppResult<Value> {
    ddef_field(response, 0)
}

fn ddef_ratio(response: &str) -> AppResult<Value> {
    ddef_field(response, 1)
}

fn indexed<V: Copy + Into<Value>>(values: &[V]) -> Vec<(Value, String)> {
    values
        .iter()
        .enumerate()
        .map(|(code, v)| ((*v).into(), code.to_string()))
        .collect()
}

fn on_off() -> [(&'static str, &'static str); 2] {
    [("OFF", "0"), ("ON", "1")]
}

fn parameter_table() -> ParameterTable {
    let mut table = ParameterTable::new();

    // Reference and phase
    table
        .register(
            ParameterSpec::new("phase")
                .label("Phase")
                .unit("deg")
                .get("PHAS?", ResponseParser::Float)
                .set("PHAS {}", ValueFormat::Fixed(2))
                .validator(Validator::Numbers {
                    min: -360.0,
                    max: 360.0,
                }),
        )
        .register(
            ParameterSpec::new("reference_source")
                .label("Reference source")
                .get("FMOD?", ResponseParser::Int)
                .set("FMOD {}", ValueFormat::Display)
                .mapping([("external", "0"), ("internal", "1")]),
        )
        .register(
            ParameterSpec::new("frequency")
                .label("Frequency")
                .unit("Hz")
                .get("FREQ?", ResponseParser::Float)
                .set("FREQ {}", ValueFormat::Fixed(4))
                .validator(Validator::Numbers {
                    min: 25e3,
                    max: 200e6,
                }),
        )
        .register(
            ParameterSpec::new("secondharmonic")
                .label("Second harmonic")
                .get("HARM?", ResponseParser::Int)
                .set("HARM {}", ValueFormat::Display)
                .mapping(on_off()),
        );

    // Gain and time constant
    table
        .register(
            ParameterSpec::new("sensitivity")
                .label("Sensitivity")
                .unit("V")
                .get("SENS?", ResponseParser::Int)
                .set("SENS {}", ValueFormat::Display)
                .mapping(indexed(&SENSITIVITIES)),
        )
        .register(
            ParameterSpec::new("relmode")
                .label("Relmode")
                .get("RMOD?", ResponseParser::Int)
                .set("RMOD {}", ValueFormat::Display)
                .mapping(on_off()),
        )
        .register(
            ParameterSpec::new("time_constant")
                .label("Time constant")
                .unit("s")
                .get("OFLT?", ResponseParser::Int)
                .set("OFLT {}", ValueFormat::Display)
                .mapping(indexed(&TIME_CONSTANTS)),
        )
        .register(
            ParameterSpec::new("filter_slope")
                .label("Filter slope")
                .unit("dB/oct")
                .get("OFSL?", ResponseParser::Int)
                .set("OFSL {}", ValueFormat::Display)
                .mapping(indexed(&[0i64, 6, 12, 18, 24])),
        );

    // Aux input/output
    for i in 1..=2 {
        table
            .register(
                ParameterSpec::new(format!("aux_in{}", i))
                    .label(format!("Aux input {}", i))
                    .unit("V")
                    .get(format!("AUXI? {}", i), ResponseParser::Float),
            )
            .register(
                ParameterSpec::new(format!("aux_out{}", i))
                    .label(format!("Aux output {}", i))
                    .unit("V")
                    .get(format!("AUXO? {}", i), ResponseParser::Float)
                    .set(format!("AUXV {}, {{}}", i), ValueFormat::Display)
                    .validator(Validator::Numbers {
                        min: -10.5,
                        max: 10.5,
                    }),
            );
    }

    // Setup
    table.register(
        ParameterSpec::new("output_interface")
            .label("Output interface")
            .get("OUTX?", ResponseParser::Int)
            .set("OUTX {}", ValueFormat::Display)
            .mapping([("RS232", "0"), ("GPIB", "1")]),
    );

    // Channel setup
    for channel in CHANNELS {
        let displays: &[&str] = if channel == 1 {
            &CH1_DISPLAYS
        } else {
            &CH2_DISPLAYS
        };
        let query = format!("DDEF ? {}", channel);
        table
            .register(
                ParameterSpec::new(ChannelSetting::Ratio.parameter(channel))
                    .label(format!("Channel {} ratio", channel))
                    .get(query.clone(), ResponseParser::Custom(ddef_ratio))
                    .mapping(indexed(&RATIOS))
                    .set_by_driver(),
            )
            .register(
                ParameterSpec::new(ChannelSetting::Display.parameter(channel))
                    .label(format!("Channel {} display", channel))
                    .get(query, ResponseParser::Custom(ddef_display))
                    .mapping(indexed(displays))
                    .set_by_driver(),
            );
    }

    // Data transfer
    for (code, (name, unit)) in [("X", "V"), ("Y", "V"), ("R", "V"), ("P", "deg")]
        .into_iter()
        .enumerate()
    {
        table.register(
            ParameterSpec::new(name)
                .unit(unit)
                .get(format!("OUTP? {}", code + 1), ResponseParser::Float),
        );
    }

    // Data buffer settings
    let mut rates = indexed(&SAMPLE_RATES);
    rates.push((Value::from(TRIGGER), TRIGGER_CODE.to_string()));
    table
        .register(
            ParameterSpec::new("buffer_SR")
                .label("Buffer sample rate")
                .unit("Hz")
                .get("SRAT ?", ResponseParser::Int)
                .set("SRAT {}", ValueFormat::Display)
                .mapping(rates),
        )
        .register(
            ParameterSpec::new("buffer_acq_mode")
                .label("Buffer acquisition mode")
                .get("SEND ?", ResponseParser::Int)
                .set("SEND {}", ValueFormat::Display)
                .mapping([("single shot", "0"), ("loop", "1")]),
        )
        .register(
            ParameterSpec::new("buffer_trig_mode")
                .label("Buffer trigger start mode")
                .get("TSTR ?", ResponseParser::Int)
                .set("TSTR {}", ValueFormat::Display)
                .mapping([("ON", "1"), ("OFF", "0")]),
        )
        .register(
            ParameterSpec::new("buffer_npts")
                .label("Buffer number of stored points")
                .get("SPTS ?", ResponseParser::Int),
        );

    table
}

fn function_table() -> FunctionTable {
    let mut table = FunctionTable::new();
    table
        .register(FunctionSpec::new("auto_gain", "AGAN"))
        .register(FunctionSpec::new("auto_phase", "APHS"))
        .register(
            FunctionSpec::new("auto_offset", "AOFF {}").with_argument(Validator::Enum(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3),
            ])),
        )
        .register(FunctionSpec::new("reset", "*RST"))
        .register(FunctionSpec::new("disable_front_panel", "OVRM 0"))
        .register(FunctionSpec::new("enable_front_panel", "OVRM 1"))
        .register(
            FunctionSpec::new("send_trigger", "TRIG")
                .doc("Software trigger, same effect as the rear panel trigger input."),
        )
        .register(
            FunctionSpec::new("buffer_start", "STRT")
                .doc("Start or resume data storage. Ignored while storage is in progress."),
        )
        .register(
            FunctionSpec::new("buffer_pause", "PAUS")
                .doc("Pause data storage. Ignored if storage is already paused or reset."),
        )
        .register(
            FunctionSpec::new("buffer_reset", "REST")
                .doc("Reset the data buffers, erasing any stored data."),
        );
    table
}

/// SR844 lock-in amplifier
pub struct Sr844<T> {
    core: InstrumentCore<T>,
    sessions: [AcquisitionSession; 2],
}

impl<T: Transport> Sr844<T> {
    /// Driver over an already connected transport.
    pub fn new(id: impl Into<String>, transport: T) -> Self {
        Self {
            core: InstrumentCore::new(id, transport, parameter_table(), function_table()),
            sessions: [AcquisitionSession::new(1), AcquisitionSession::new(2)],
        }
    }

    /// Driver over `transport`, logging the instrument's identification.
    pub async fn connect(id: impl Into<String>, transport: T) -> AppResult<Self> {
        let mut lockin = Self::new(id, transport);
        lockin.core.identify(IDN).await?;
        Ok(lockin)
    }

    /// Generic table access.
    pub fn core(&self) -> &InstrumentCore<T> {
        &self.core
    }

    /// Mutable generic table access. Raw writes through it bypass readiness
    /// tracking.
    pub fn core_mut(&mut self) -> &mut InstrumentCore<T> {
        &mut self.core
    }

    /// Read a parameter by name.
    pub async fn get(&mut self, name: &str) -> AppResult<Value> {
        self.core.get(name).await
    }

    /// Set a parameter by name, keeping buffer readiness consistent.
    ///
    /// Readiness is dropped once the value has been validated and before the
    /// command is sent: after a failed write the instrument state is unknown.
    pub async fn set(&mut self, name: &str, value: impl Into<Value>) -> AppResult<()> {
        let value = value.into();
        if let Some((channel, setting)) = ChannelSetting::parse(name) {
            return self.set_channel_setting(channel, setting, &value).await;
        }
        if name != "buffer_SR" {
            return self.core.set(name, value).await;
        }

        let command = self.core.parameters().get(name)?.set_command(&value)?;
        self.invalidate_all("sample rate changed");
        self.core.write(&command).await?;
        info!("Set {} {} to {}", self.core.id(), name, value);
        Ok(())
    }

    /// Invoke a function by name.
    pub async fn call(&mut self, name: &str, args: &[Value]) -> AppResult<()> {
        if name != "reset" {
            return self.core.call(name, args).await;
        }

        let command = self.core.functions().get(name)?.render(args)?;
        self.invalidate_all("instrument reset");
        self.core.write(&command).await?;
        info!("{}: {} ({})", self.core.id(), name, command);
        Ok(())
    }

    /// All readable parameters plus buffer readiness, as JSON.
    pub async fn snapshot(&mut self) -> AppResult<serde_json::Value> {
        let mut snapshot = self.core.snapshot().await?;
        snapshot["buffers"] = serde_json::json!({
            "ch1_ready": self.sessions[0].is_ready(),
            "ch2_ready": self.sessions[1].is_ready(),
        });
        Ok(snapshot)
    }

    fn invalidate(&mut self, index: usize, reason: &str) {
        let session = &mut self.sessions[index];
        if session.is_ready() {
            warn!(
                "{}: channel {} buffer readout invalidated ({}), run prepare_buffer_readout again",
                self.core.id(),
                session.channel(),
                reason
            );
        }
        session.invalidate();
    }

    fn invalidate_all(&mut self, reason: &str) {
        for index in 0..self.sessions.len() {
            self.invalidate(index, reason);
        }
    }

    async fn number(&mut self, name: &str) -> AppResult<f64> {
        let value = self.core.get(name).await?;
        value
            .as_f64()
            .ok_or_else(|| DaqError::Instrument(format!("{} is not numeric: {}", name, value)))
    }

    async fn text(&mut self, name: &str) -> AppResult<String> {
        Ok(self.core.get(name).await?.to_string())
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    /// Reference phase shift in degrees.
    pub async fn phase(&mut self) -> AppResult<f64> {
        self.number("phase").await
    }

    /// Set the reference phase shift in degrees.
    pub async fn set_phase(&mut self, degrees: f64) -> AppResult<()> {
        self.set("phase", degrees).await
    }

    /// Reference frequency in Hz.
    pub async fn frequency(&mut self) -> AppResult<f64> {
        self.number("frequency").await
    }

    /// Set the internal reference frequency in Hz.
    pub async fn set_frequency(&mut self, hz: f64) -> AppResult<()> {
        self.set("frequency", hz).await
    }

    /// Full-scale sensitivity in volts.
    pub async fn sensitivity(&mut self) -> AppResult<f64> {
        self.number("sensitivity").await
    }

    /// Set the full-scale sensitivity; must be one of the instrument's steps.
    pub async fn set_sensitivity(&mut self, volts: f64) -> AppResult<()> {
        self.set("sensitivity", volts).await
    }

    /// Output filter time constant in seconds.
    pub async fn time_constant(&mut self) -> AppResult<f64> {
        self.number("time_constant").await
    }

    /// Set the time constant; must be one of the instrument's steps.
    pub async fn set_time_constant(&mut self, seconds: f64) -> AppResult<()> {
        self.set("time_constant", seconds).await
    }

    /// In-phase output in volts.
    pub async fn x(&mut self) -> AppResult<f64> {
        self.number("X").await
    }

    /// Quadrature output in volts.
    pub async fn y(&mut self) -> AppResult<f64> {
        self.number("Y").await
    }

    /// Magnitude in volts.
    pub async fn r(&mut self) -> AppResult<f64> {
        self.number("R").await
    }

    /// Phase of the signal in degrees.
    pub async fn p(&mut self) -> AppResult<f64> {
        self.number("P").await
    }

    /// Number of points stored in the data buffer.
    pub async fn buffer_npts(&mut self) -> AppResult<usize> {
        let value = self.core.get("buffer_npts").await?;
        value
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| DaqError::response_parse("SPTS ?", value.to_string()))
    }

    /// Buffer sample rate.
    pub async fn buffer_sample_rate(&mut self) -> AppResult<SampleRate> {
        match self.core.get("buffer_SR").await? {
            Value::Text(mode) if mode == TRIGGER => Ok(SampleRate::Trigger),
            other => other
                .as_f64()
                .map(SampleRate::Hz)
                .ok_or_else(|| DaqError::response_parse("SRAT ?", other.to_string())),
        }
    }

    /// Set the buffer sample rate. Clears both channels' readout preparation.
    pub async fn set_buffer_sample_rate(&mut self, rate: SampleRate) -> AppResult<()> {
        let value = match rate {
            SampleRate::Trigger => Value::from(TRIGGER),
            SampleRate::Hz(hz) => Value::Float(hz),
        };
        self.set("buffer_SR", value).await
    }

    /// What `channel` displays, e.g. `"X"` or `"Phase"`.
    pub async fn channel_display(&mut self, channel: u8) -> AppResult<String> {
        channel_index(channel)?;
        self.text(&ChannelSetting::Display.parameter(channel)).await
    }

    /// Set what `channel` displays. Clears that channel's readout preparation.
    pub async fn set_channel_display(&mut self, channel: u8, display: &str) -> AppResult<()> {
        self.set_channel_setting(channel, ChannelSetting::Display, &Value::from(display))
            .await
    }

    /// The input `channel` is ratioed against, `"none"` when not ratioed.
    pub async fn channel_ratio(&mut self, channel: u8) -> AppResult<String> {
        channel_index(channel)?;
        self.text(&ChannelSetting::Ratio.parameter(channel)).await
    }

    /// Set the ratio input of `channel`. Clears that channel's readout
    /// preparation.
    pub async fn set_channel_ratio(&mut self, channel: u8, ratio: &str) -> AppResult<()> {
        self.set_channel_setting(channel, ChannelSetting::Ratio, &Value::from(ratio))
            .await
    }

    async fn set_channel_setting(
        &mut self,
        channel: u8,
        setting: ChannelSetting,
        value: &Value,
    ) -> AppResult<()> {
        let index = channel_index(channel)?;
        let name = setting.parameter(channel);
        let token = self.core.parameters().get(&name)?.to_raw(value)?;
        self.invalidate(index, "channel configuration changed");

        // display and ratio are written together, so keep the other half
        let current = self.core.ask(&format!("DDEF ? {}", channel)).await?;
        let (display, ratio) = match setting {
            ChannelSetting::Display => (token, ddef_ratio(&current)?),
            ChannelSetting::Ratio => (ddef_display(&current)?, token),
        };
        self.core
            .write(&format!("DDEF {}, {}, {}", channel, display, ratio))
            .await?;
        info!("Set {} {} to {}", self.core.id(), name, value);
        Ok(())
    }

    // =========================================================================
    // Channel buffers
    // =========================================================================

    /// Whether `channel` may be read without preparing first.
    pub fn is_buffer_ready(&self, channel: u8) -> bool {
        channel_index(channel)
            .map(|index| self.sessions[index].is_ready())
            .unwrap_or(false)
    }

    /// Record setpoints and unit for `channel` from the current point count,
    /// sample rate, ratio and display, and mark the channel ready.
    pub async fn prepare_buffer_readout(&mut self, channel: u8) -> AppResult<&Preparation> {
        let index = channel_index(channel)?;
        let count = self.buffer_npts().await?;
        let rate = self.buffer_sample_rate().await?;
        let ratio = self.channel_ratio(channel).await?;
        let display = self.channel_display(channel).await?;
        let unit = select_unit(&ratio, &display);

        info!(
            "{}: channel {} readout prepared for {} points at {} in {}",
            self.core.id(),
            channel,
            count,
            rate,
            unit
        );
        Ok(self.sessions[index].prepare(count, rate, unit))
    }

    /// Read and decode the whole buffer of `channel`.
    ///
    /// Fails with [`DaqError::BufferNotPrepared`] unless
    /// [`prepare_buffer_readout`](Self::prepare_buffer_readout) ran since the
    /// last configuration change, [`DaqError::EmptyBuffer`] when nothing is
    /// stored and [`DaqError::BufferSizeChanged`] when the point count moved
    /// since preparation.
    pub async fn read_buffer(&mut self, channel: u8) -> AppResult<SampleBuffer> {
        let index = channel_index(channel)?;
        self.sessions[index].ensure_ready()?;

        let count = self.buffer_npts().await?;
        self.sessions[index].check_count(count)?;

        let raw = self
            .core
            .ask_raw_exact(
                &format!("TRCL ? {}, 0, {}", channel, count),
                count * WORD_BYTES,
            )
            .await?;
        let buffer = self.sessions[index].decode(&raw, count)?;
        debug!(
            "{}: read {} samples from channel {}",
            self.core.id(),
            buffer.len(),
            channel
        );
        Ok(buffer)
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Auto gain.
    pub async fn auto_gain(&mut self) -> AppResult<()> {
        self.call("auto_gain", &[]).await
    }

    /// Auto phase.
    pub async fn auto_phase(&mut self) -> AppResult<()> {
        self.call("auto_phase", &[]).await
    }

    /// Auto offset of output 1, 2 or 3.
    pub async fn auto_offset(&mut self, output: u8) -> AppResult<()> {
        self.call("auto_offset", &[Value::Int(i64::from(output))])
            .await
    }

    /// Reset to defaults. Clears both channels' readout preparation.
    pub async fn reset(&mut self) -> AppResult<()> {
        self.call("reset", &[]).await
    }

    /// Lock the front panel.
    pub async fn disable_front_panel(&mut self) -> AppResult<()> {
        self.call("disable_front_panel", &[]).await
    }

    /// Unlock the front panel.
    pub async fn enable_front_panel(&mut self) -> AppResult<()> {
        self.call("enable_front_panel", &[]).await
    }

    /// Software trigger.
    pub async fn send_trigger(&mut self) -> AppResult<()> {
        self.call("send_trigger", &[]).await
    }

    /// Start or resume data storage.
    pub async fn buffer_start(&mut self) -> AppResult<()> {
        self.call("buffer_start", &[]).await
    }

    /// Pause data storage.
    pub async fn buffer_pause(&mut self) -> AppResult<()> {
        self.call("buffer_pause", &[]).await
    }

    /// Erase the data buffers.
    pub async fn buffer_reset(&mut self) -> AppResult<()> {
        self.call("buffer_reset", &[]).await
    }
}
