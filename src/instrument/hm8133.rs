//! HAMEG HM8133 RF synthesizer driver
//!
//! The synthesizer uses `;` both to separate a command from its argument and
//! to terminate messages, e.g. `FRQ;1.0E+09`. Output state, modulation and
//! reference source have no queries of their own; all three are read from the
//! `STA` status line:
//!
//! ```text
//! OP1 RFI NMO
//! ^^^ output on
//!     ^^^ internal reference
//!         ^^^ no modulation
//! ```

use serde::Serialize;
use std::fmt;

use super::InstrumentCore;
use crate::adapters::Transport;
use crate::error::{AppResult, DaqError};
use crate::parameter::{
    FunctionSpec, FunctionTable, ParameterSpec, ParameterTable, ResponseParser, Validator, Value,
    ValueFormat,
};

const STATUS: &str = "STA";
const IDENTITY: &str = "ID?";

/// Output signal modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Modulation {
    /// Unmodulated carrier
    Off,
    /// AM with the internal 400 Hz source
    Am400,
    /// AM with the internal 1 kHz source
    Am1000,
    /// AM from the external input
    AmExternal,
    /// FM with the internal 400 Hz source
    Fm400,
    /// FM with the internal 1 kHz source
    Fm1000,
    /// FM from the external input
    FmExternal,
}

impl Modulation {
    /// Every modulation mode.
    pub const ALL: [Modulation; 7] = [
        Modulation::Off,
        Modulation::Am400,
        Modulation::Am1000,
        Modulation::AmExternal,
        Modulation::Fm400,
        Modulation::Fm1000,
        Modulation::FmExternal,
    ];

    /// Parameter value, e.g. `"AMP_400"`.
    pub fn name(&self) -> &'static str {
        match self {
            Modulation::Off => "OFF",
            Modulation::Am400 => "AMP_400",
            Modulation::Am1000 => "AMP_1000",
            Modulation::AmExternal => "AMP_EXT",
            Modulation::Fm400 => "FRQ_400",
            Modulation::Fm1000 => "FRQ_1000",
            Modulation::FmExternal => "FRQ_EXT",
        }
    }

    /// Command and status token, e.g. `"AM1"`.
    pub fn code(&self) -> &'static str {
        match self {
            Modulation::Off => "NMO",
            Modulation::Am400 => "AM1",
            Modulation::Am1000 => "AM2",
            Modulation::AmExternal => "AMX",
            Modulation::Fm400 => "FM1",
            Modulation::Fm1000 => "FM2",
            Modulation::FmExternal => "FMX",
        }
    }

    /// Mode for a status token.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }

    /// Mode for a parameter value.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Modulation::Off => "OFF",
            Modulation::Am400 => "AMPLITUDE with INTERNAL 400 Hz",
            Modulation::Am1000 => "AMPLITUDE with INTERNAL 1000 Hz",
            Modulation::AmExternal => "AMPLITUDE with EXTERNAL",
            Modulation::Fm400 => "FREQUENCY with INTERNAL 400 Hz",
            Modulation::Fm1000 => "FREQUENCY with INTERNAL 1000 Hz",
            Modulation::FmExternal => "FREQUENCY with EXTERNAL",
        };
        f.write_str(text)
    }
}

/// Source of the 10 MHz reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferenceSource {
    /// Internal oscillator
    Internal,
    /// Rear panel reference input
    External,
}

impl ReferenceSource {
    /// Parameter value, `"INT"` or `"EXT"`.
    pub fn name(&self) -> &'static str {
        match self {
            ReferenceSource::Internal => "INT",
            ReferenceSource::External => "EXT",
        }
    }

    /// Suffix used in `RF?` commands and status tokens.
    fn suffix(&self) -> &'static str {
        match self {
            ReferenceSource::Internal => "I",
            ReferenceSource::External => "X",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "I" => Some(ReferenceSource::Internal),
            "X" => Some(ReferenceSource::External),
            _ => None,
        }
    }

    /// Source for a parameter value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "INT" => Some(ReferenceSource::Internal),
            "EXT" => Some(ReferenceSource::External),
            _ => None,
        }
    }
}

impl fmt::Display for ReferenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceSource::Internal => f.write_str("INTERNAL"),
            ReferenceSource::External => f.write_str("EXTERNAL"),
        }
    }
}

/// Decoded `STA` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SynthStatus {
    /// RF output enabled
    pub output: bool,
    /// Reference source
    pub reference: ReferenceSource,
    /// Modulation mode
    pub modulation: Modulation,
}

impl SynthStatus {
    /// Parse a status line such as `"OP1 RFI NMO"`.
    ///
    /// Tokens are matched by content, not by column, and every field must be
    /// present exactly once.
    pub fn parse(response: &str) -> AppResult<Self> {
        let bad = || DaqError::response_parse(STATUS, response);

        let mut output = None;
        let mut reference = None;
        let mut modulation = None;
        for token in response.split_whitespace() {
            let slot_filled = if let Some(state) = token.strip_prefix("OP") {
                let on = match state {
                    "0" => false,
                    "1" => true,
                    _ => return Err(bad()),
                };
                output.replace(on).is_some()
            } else if let Some(suffix) = token.strip_prefix("RF") {
                let source = ReferenceSource::from_suffix(suffix).ok_or_else(bad)?;
                reference.replace(source).is_some()
            } else {
                let mode = Modulation::from_code(token).ok_or_else(bad)?;
                modulation.replace(mode).is_some()
            };
            if slot_filled {
                return Err(bad());
            }
        }

        Ok(Self {
            output: output.ok_or_else(bad)?,
            reference: reference.ok_or_else(bad)?,
            modulation: modulation.ok_or_else(bad)?,
        })
    }
}

impl fmt::Display for SynthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Output : {}, Reference frequency : {}, Modulation : {}",
            if self.output { "ON" } else { "OFF" },
            self.reference,
            self.modulation
        )
    }
}

fn status_output(response: &str) -> AppResult<Value> {
    let status = SynthStatus::parse(response)?;
    Ok(Value::Text(if status.output { "1" } else { "0" }.to_string()))
}

fn status_reference(response: &str) -> AppResult<Value> {
    let status = SynthStatus::parse(response)?;
    Ok(Value::Text(status.reference.suffix().to_string()))
}

fn status_modulation(response: &str) -> AppResult<Value> {
    let status = SynthStatus::parse(response)?;
    Ok(Value::Text(status.modulation.code().to_string()))
}

/// Number from a response that may carry a `FRQ:` style header.
fn number(response: &str) -> AppResult<Value> {
    let body = response
        .rsplit_once(':')
        .map_or(response, |(_, value)| value)
        .trim();
    body.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| DaqError::response_parse("numeric query", response))
}

fn parameter_table() -> ParameterTable {
    let mut table = ParameterTable::new();
    table
        .register(
            ParameterSpec::new("frequency")
                .label("Frequency")
                .unit("Hz")
                .get("FRQ?", ResponseParser::Custom(number))
                .set(
                    "FRQ;{}",
                    ValueFormat::Scientific {
                        precision: 1,
                        signed: false,
                    },
                )
                .validator(Validator::Numbers { min: 1.0, max: 1e9 }),
        )
        .register(
            ParameterSpec::new("lvl_dbm")
                .label("Level in dBm")
                .unit("dBm")
                .get("DBM?", ResponseParser::Custom(number))
                .set(
                    "DBM;{}",
                    ValueFormat::Scientific {
                        precision: 1,
                        signed: true,
                    },
                )
                .validator(Validator::Numbers {
                    min: -135.0,
                    max: 7.0,
                }),
        )
        .register(
            ParameterSpec::new("lvl_volts")
                .label("Level in Volts")
                .unit("V")
                .get("AMP?", ResponseParser::Custom(number))
                .set(
                    "AMP;{}",
                    ValueFormat::Scientific {
                        precision: 10,
                        signed: false,
                    },
                )
                .validator(Validator::Numbers {
                    min: 39.8e-9,
                    max: 501e-3,
                }),
        )
        .register(
            ParameterSpec::new("output")
                .label("Output ON/OFF")
                .get(STATUS, ResponseParser::Custom(status_output))
                .set("OP{}", ValueFormat::Display)
                .mapping([("OFF", "0"), ("ON", "1")]),
        )
        .register(
            ParameterSpec::new("modulation")
                .label("Output signal modulation")
                .get(STATUS, ResponseParser::Custom(status_modulation))
                .set("{}", ValueFormat::Display)
                .mapping(Modulation::ALL.map(|m| (m.name(), m.code()))),
        )
        .register(
            ParameterSpec::new("reference_frequency")
                .label("Reference frequency source")
                .get(STATUS, ResponseParser::Custom(status_reference))
                .set("RF{}", ValueFormat::Display)
                .mapping([("INT", "I"), ("EXT", "X")]),
        );

    // Read only state
    for (name, label, command) in [
        ("status", "Status of output, reference frequency and modulation", STATUS),
        ("version", "Version number", "VER"),
        ("who", "Type of instrument", IDENTITY),
        ("freq_dev", "Frequency deviation", "FMD?"),
        ("amp_dev", "Amplitude deviation", "AMT?"),
    ] {
        table.register(
            ParameterSpec::new(name)
                .label(label)
                .get(command, ResponseParser::Text),
        );
    }
    table
}

fn function_table() -> FunctionTable {
    let mut table = FunctionTable::new();
    table.register(FunctionSpec::new("mclr", "CLR").doc(
        "Master clear: 1 GHz, +7 dBm, modulation off, output off, internal reference.",
    ));
    table
}

/// HM8133 RF synthesizer
pub struct Hm8133<T> {
    core: InstrumentCore<T>,
}

impl<T: Transport> Hm8133<T> {
    /// Driver over an already connected transport.
    pub fn new(id: impl Into<String>, transport: T) -> Self {
        Self {
            core: InstrumentCore::new(id, transport, parameter_table(), function_table()),
        }
    }

    /// Driver over `transport`, logging the instrument's identification.
    pub async fn connect(id: impl Into<String>, transport: T) -> AppResult<Self> {
        let mut synth = Self::new(id, transport);
        synth.core.identify(IDENTITY).await?;
        Ok(synth)
    }

    /// Generic table access.
    pub fn core(&self) -> &InstrumentCore<T> {
        &self.core
    }

    /// Mutable generic table access.
    pub fn core_mut(&mut self) -> &mut InstrumentCore<T> {
        &mut self.core
    }

    /// Read a parameter by name.
    pub async fn get(&mut self, name: &str) -> AppResult<Value> {
        self.core.get(name).await
    }

    /// Set a parameter by name.
    pub async fn set(&mut self, name: &str, value: impl Into<Value>) -> AppResult<()> {
        self.core.set(name, value).await
    }

    /// All readable parameters as JSON.
    pub async fn snapshot(&mut self) -> AppResult<serde_json::Value> {
        self.core.snapshot().await
    }

    async fn float(&mut self, name: &str) -> AppResult<f64> {
        let value = self.core.get(name).await?;
        value
            .as_f64()
            .ok_or_else(|| DaqError::Instrument(format!("{} is not numeric: {}", name, value)))
    }

    /// Carrier frequency in Hz.
    pub async fn frequency(&mut self) -> AppResult<f64> {
        self.float("frequency").await
    }

    /// Set the carrier frequency, 1 Hz to 1 GHz.
    pub async fn set_frequency(&mut self, hz: f64) -> AppResult<()> {
        self.set("frequency", hz).await
    }

    /// Output level in dBm.
    pub async fn level_dbm(&mut self) -> AppResult<f64> {
        self.float("lvl_dbm").await
    }

    /// Set the output level, -135 to +7 dBm.
    pub async fn set_level_dbm(&mut self, dbm: f64) -> AppResult<()> {
        self.set("lvl_dbm", dbm).await
    }

    /// Output level in volts.
    pub async fn level_volts(&mut self) -> AppResult<f64> {
        self.float("lvl_volts").await
    }

    /// Set the output level, 39.8 nV to 501 mV.
    pub async fn set_level_volts(&mut self, volts: f64) -> AppResult<()> {
        self.set("lvl_volts", volts).await
    }

    /// Decoded status line.
    pub async fn status(&mut self) -> AppResult<SynthStatus> {
        let response = self.core.ask(STATUS).await?;
        SynthStatus::parse(&response)
    }

    /// Whether the RF output is on.
    pub async fn output(&mut self) -> AppResult<bool> {
        Ok(self.status().await?.output)
    }

    /// Switch the RF output.
    pub async fn set_output(&mut self, on: bool) -> AppResult<()> {
        self.set("output", if on { "ON" } else { "OFF" }).await
    }

    /// Current modulation.
    pub async fn modulation(&mut self) -> AppResult<Modulation> {
        Ok(self.status().await?.modulation)
    }

    /// Select the modulation.
    pub async fn set_modulation(&mut self, modulation: Modulation) -> AppResult<()> {
        self.set("modulation", modulation.name()).await
    }

    /// Current reference source.
    pub async fn reference(&mut self) -> AppResult<ReferenceSource> {
        Ok(self.status().await?.reference)
    }

    /// Select the reference source.
    pub async fn set_reference(&mut self, source: ReferenceSource) -> AppResult<()> {
        self.set("reference_frequency", source.name()).await
    }

    /// Firmware version string.
    pub async fn version(&mut self) -> AppResult<String> {
        self.core.ask("VER").await
    }

    /// Instrument identification.
    pub async fn who(&mut self) -> AppResult<String> {
        self.core.ask(IDENTITY).await
    }

    /// Master clear.
    pub async fn mclr(&mut self) -> AppResult<()> {
        self.core.call("mclr", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;

    #[test]
    fn test_status_parsing() {
        let status = SynthStatus::parse("OP1 RFI NMO").unwrap();
        assert!(status.output);
        assert_eq!(status.reference, ReferenceSource::Internal);
        assert_eq!(status.modulation, Modulation::Off);

        let status = SynthStatus::parse("  OP0   RFX FM2 ").unwrap();
        assert!(!status.output);
        assert_eq!(status.reference, ReferenceSource::External);
        assert_eq!(status.modulation, Modulation::Fm1000);
        assert_eq!(
            status.to_string(),
            "Output : OFF, Reference frequency : EXTERNAL, Modulation : FREQUENCY with INTERNAL 1000 Hz"
        );
    }

    #[test]
    fn test_status_parsing_rejects_garbage() {
        for bad in ["", "OP1 RFI", "OP2 RFI NMO", "OP1 RFQ NMO", "OP1 RFI XYZ", "OP1 OP0 RFI NMO"] {
            assert!(
                matches!(SynthStatus::parse(bad), Err(DaqError::ResponseParse { .. })),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_modulation_codes() {
        for mode in Modulation::ALL {
            assert_eq!(Modulation::from_code(mode.code()), Some(mode));
            assert_eq!(Modulation::from_name(mode.name()), Some(mode));
        }
        assert_eq!(Modulation::from_code("AM3"), None);
    }

    #[tokio::test]
    async fn test_set_commands() {
        let mock = MockAdapter::new();
        let mut synth = Hm8133::new("synth", mock.clone());

        synth.set_frequency(1e9).await.unwrap();
        synth.set_level_dbm(-20.0).await.unwrap();
        synth.set_level_volts(0.25).await.unwrap();
        synth.set_output(true).await.unwrap();
        synth.set_modulation(Modulation::Am1000).await.unwrap();
        synth.set_reference(ReferenceSource::External).await.unwrap();
        synth.mclr().await.unwrap();

        assert_eq!(
            mock.writes(),
            vec![
                "FRQ;1.0E+09".to_string(),
                "DBM;-2.0E+01".to_string(),
                "AMP;2.5000000000E-01".to_string(),
                "OP1".to_string(),
                "AM2".to_string(),
                "RFX".to_string(),
                "CLR".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_levels_rejected() {
        let mock = MockAdapter::new();
        let mut synth = Hm8133::new("synth", mock.clone());
        assert!(synth.set_frequency(2e9).await.is_err());
        assert!(synth.set_level_dbm(8.0).await.is_err());
        assert!(synth.set_level_volts(1.0).await.is_err());
        assert!(synth.set("modulation", "PULSE").await.is_err());
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_state_read_from_status_line() {
        let mock = MockAdapter::new().with_response("STA", "OP1 RFX AMX\r");
        let mut synth = Hm8133::new("synth", mock);

        assert_eq!(synth.get("output").await.unwrap(), Value::from("ON"));
        assert_eq!(synth.get("reference_frequency").await.unwrap(), Value::from("EXT"));
        assert_eq!(synth.get("modulation").await.unwrap(), Value::from("AMP_EXT"));
        assert!(synth.output().await.unwrap());
        assert_eq!(synth.modulation().await.unwrap(), Modulation::AmExternal);
        assert_eq!(synth.reference().await.unwrap(), ReferenceSource::External);
        assert_eq!(
            synth.get("status").await.unwrap(),
            Value::from("OP1 RFX AMX")
        );
    }

    #[tokio::test]
    async fn test_numeric_queries() {
        let mock = MockAdapter::new()
            .with_response("FRQ?", "FRQ:1.000000000E+08")
            .with_response("DBM?", "-1.2E+01")
            .with_response("AMP?", "5.6E-02");
        let mut synth = Hm8133::new("synth", mock);
        assert_eq!(synth.frequency().await.unwrap(), 1e8);
        assert_eq!(synth.level_dbm().await.unwrap(), -12.0);
        assert_eq!(synth.level_volts().await.unwrap(), 0.056);
    }

    #[tokio::test]
    async fn test_connect_queries_identity() {
        let mock = MockAdapter::new().with_response("ID?", "HM8133-2");
        let synth = Hm8133::connect("synth", mock.clone()).await.unwrap();
        assert_eq!(synth.core().id(), "synth");
        assert_eq!(
            mock.call_log(),
            vec![crate::adapters::Call::Query("ID?".to_string())]
        );
    }
}
