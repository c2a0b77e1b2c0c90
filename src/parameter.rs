//! Declarative parameter tables.
//!
//! Every driver describes its instrument as a table of named parameters built
//! once at construction. A [`ParameterSpec`] ties a name to
//!
//! - the query command and a [`ResponseParser`] for reading it,
//! - a [`SetCommand`] template and [`ValueFormat`] for writing it,
//! - a [`Validator`] describing the value domain,
//! - an optional [`ValueMapping`] between human values and instrument tokens.
//!
//! Lookups are plain map accesses by name; nothing is generated at runtime.
//!
//! # Example
//!
//! ```
//! use rust_daq_drivers::parameter::{ParameterSpec, ResponseParser, Validator, Value, ValueFormat};
//!
//! let phase = ParameterSpec::new("phase")
//!     .label("Phase")
//!     .unit("deg")
//!     .get("PHAS?", ResponseParser::Float)
//!     .set("PHAS {}", ValueFormat::Fixed(2))
//!     .validator(Validator::Numbers { min: -360.0, max: 360.0 });
//!
//! assert_eq!(phase.set_command(&Value::Float(12.345)).unwrap(), "PHAS 12.35");
//! assert_eq!(phase.parse_response("-4.50").unwrap(), Value::Float(-4.5));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AppResult, DaqError};

// =============================================================================
// Values
// =============================================================================

/// A parameter value as seen by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// Text value, also used for enumerated choices
    Text(String),
}

impl Value {
    /// Numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }

    /// Integer view of the value. Floats qualify when they have no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Text view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Equality that treats `Int(1)` and `Float(1.0)` as the same value.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Text(_), _) | (_, Value::Text(_)) => false,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

// =============================================================================
// Domains and mappings
// =============================================================================

/// Allowed values of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    /// No constraint.
    Anything,
    /// Any number within the inclusive bounds.
    Numbers {
        /// Minimum allowed value (inclusive).
        min: f64,
        /// Maximum allowed value (inclusive).
        max: f64,
    },
    /// Any integer within the inclusive bounds.
    Ints {
        /// Minimum allowed value (inclusive).
        min: i64,
        /// Maximum allowed value (inclusive).
        max: i64,
    },
    /// One of a fixed set of values.
    Enum(Vec<Value>),
}

impl Validator {
    /// Check `value` against the domain.
    pub fn validate(&self, parameter: &str, value: &Value) -> AppResult<()> {
        match self {
            Validator::Anything => Ok(()),
            Validator::Numbers { min, max } => {
                let v = value.as_f64().ok_or_else(|| {
                    DaqError::invalid_value(parameter, format!("{} is not a number", value))
                })?;
                if v.is_nan() || v < *min || v > *max {
                    return Err(DaqError::invalid_value(
                        parameter,
                        format!("{} not in [{}, {}]", v, min, max),
                    ));
                }
                Ok(())
            }
            Validator::Ints { min, max } => {
                let v = value.as_i64().ok_or_else(|| {
                    DaqError::invalid_value(parameter, format!("{} is not an integer", value))
                })?;
                if v < *min || v > *max {
                    return Err(DaqError::invalid_value(
                        parameter,
                        format!("{} not in [{}, {}]", v, min, max),
                    ));
                }
                Ok(())
            }
            Validator::Enum(choices) => {
                if choices.iter().any(|c| c.matches(value)) {
                    Ok(())
                } else {
                    let listed: Vec<String> = choices.iter().map(|c| c.to_string()).collect();
                    Err(DaqError::invalid_value(
                        parameter,
                        format!("{} not in {{{}}}", value, listed.join(", ")),
                    ))
                }
            }
        }
    }
}

/// Ordered pairs of human value and instrument token.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMapping {
    pairs: Vec<(Value, String)>,
}

impl ValueMapping {
    /// Build a mapping from `(value, token)` pairs.
    pub fn new<V, S>(pairs: impl IntoIterator<Item = (V, S)>) -> Self
    where
        V: Into<Value>,
        S: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(v, s)| (v.into(), s.into()))
                .collect(),
        }
    }

    /// Token sent to the instrument for `value`.
    pub fn to_raw(&self, value: &Value) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(v, _)| v.matches(value))
            .map(|(_, raw)| raw.as_str())
    }

    /// Human value for a token read back from the instrument.
    ///
    /// Tokens compare as trimmed text first and then numerically, so `"4"`
    /// and `"4.0"` both find the value mapped to `4`.
    pub fn from_raw(&self, raw: &str) -> Option<&Value> {
        let raw = raw.trim();
        if let Some((value, _)) = self.pairs.iter().find(|(_, token)| token.trim() == raw) {
            return Some(value);
        }
        let numeric: f64 = raw.parse().ok()?;
        self.pairs
            .iter()
            .find(|(_, token)| token.trim().parse::<f64>().ok() == Some(numeric))
            .map(|(value, _)| value)
    }

    /// Human values in declaration order.
    pub fn values(&self) -> Vec<Value> {
        self.pairs.iter().map(|(v, _)| v.clone()).collect()
    }
}

// =============================================================================
// Command formatting and response parsing
// =============================================================================

/// How a value is rendered into a set command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// The value's `Display` form.
    Display,
    /// Fixed-point with the given number of decimals.
    Fixed(usize),
    /// `1.0E+09` style: mantissa with `precision` decimals, a signed exponent
    /// of at least two digits and optionally a forced leading sign.
    Scientific {
        /// Decimals in the mantissa.
        precision: usize,
        /// Emit `+` for non-negative values.
        signed: bool,
    },
    /// Whole number; fractional values are rejected.
    Integer,
}

impl ValueFormat {
    /// Render `value` for `parameter`.
    pub fn render(&self, parameter: &str, value: &Value) -> AppResult<String> {
        let number = || {
            value.as_f64().ok_or_else(|| {
                DaqError::invalid_value(parameter, format!("{} is not a number", value))
            })
        };
        match self {
            ValueFormat::Display => Ok(value.to_string()),
            ValueFormat::Fixed(precision) => Ok(format!("{:.*}", *precision, number()?)),
            ValueFormat::Scientific { precision, signed } => {
                Ok(format_scientific(number()?, *precision, *signed))
            }
            ValueFormat::Integer => value.as_i64().map(|i| i.to_string()).ok_or_else(|| {
                DaqError::invalid_value(parameter, format!("{} is not an integer", value))
            }),
        }
    }
}

/// Format `value` as `d.dddE±XX`.
pub fn format_scientific(value: f64, precision: usize, signed: bool) -> String {
    let rendered = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if signed && !mantissa.starts_with('-') {
        "+"
    } else {
        ""
    };
    let exp_sign = if exponent < 0 { '-' } else { '+' };
    format!("{}{}E{}{:02}", sign, mantissa, exp_sign, exponent.abs())
}

/// How a query response is turned into a [`Value`].
#[derive(Clone, Copy)]
pub enum ResponseParser {
    /// Floating-point number.
    Float,
    /// Integer; `"4.0"` style responses are accepted.
    Int,
    /// Trimmed text.
    Text,
    /// Instrument-specific parsing.
    Custom(fn(&str) -> AppResult<Value>),
}

impl fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseParser::Float => f.write_str("Float"),
            ResponseParser::Int => f.write_str("Int"),
            ResponseParser::Text => f.write_str("Text"),
            ResponseParser::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl ResponseParser {
    /// Parse `response` to `command`.
    pub fn parse(&self, command: &str, response: &str) -> AppResult<Value> {
        let trimmed = response.trim();
        match self {
            ResponseParser::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| DaqError::response_parse(command, response)),
            ResponseParser::Int => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| match trimmed.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
                    _ => Err(DaqError::response_parse(command, response)),
                }),
            ResponseParser::Text => Ok(Value::Text(trimmed.to_string())),
            ResponseParser::Custom(parse) => parse(trimmed),
        }
    }
}

/// Set command template with a single `{}` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCommand {
    /// Template, e.g. `"FREQ {}"`.
    pub template: String,
    /// Rendering of the value.
    pub format: ValueFormat,
}

impl SetCommand {
    /// Fill the template with `value`.
    pub fn render(&self, parameter: &str, value: &Value) -> AppResult<String> {
        let rendered = self.format.render(parameter, value)?;
        Ok(self.template.replacen("{}", &rendered, 1))
    }
}

/// How a parameter is written.
#[derive(Debug, Clone, PartialEq)]
pub enum Setter {
    /// Not settable.
    ReadOnly,
    /// Through a command template.
    Command(SetCommand),
    /// By the owning driver, e.g. a read-modify-write of a shared command.
    Driver,
}

// =============================================================================
// Parameter and function specs
// =============================================================================

/// Everything needed to get and set one named parameter.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    /// Table key.
    pub name: String,
    /// Human readable label.
    pub label: String,
    /// Physical unit, empty when dimensionless.
    pub unit: String,
    /// Query command, `None` for write-only parameters.
    pub get_cmd: Option<String>,
    /// Parser for the query response.
    pub parser: ResponseParser,
    /// How the parameter is written.
    pub setter: Setter,
    /// Value domain checked before every set.
    pub validator: Validator,
    /// Human value to instrument token mapping.
    pub mapping: Option<ValueMapping>,
}

impl ParameterSpec {
    /// New read-only parameter with no commands yet.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            unit: String::new(),
            get_cmd: None,
            parser: ResponseParser::Text,
            setter: Setter::ReadOnly,
            validator: Validator::Anything,
            mapping: None,
        }
    }

    /// Set the label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the unit.
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the query command and parser.
    pub fn get(mut self, command: impl Into<String>, parser: ResponseParser) -> Self {
        self.get_cmd = Some(command.into());
        self.parser = parser;
        self
    }

    /// Set the set command template.
    pub fn set(mut self, template: impl Into<String>, format: ValueFormat) -> Self {
        self.setter = Setter::Command(SetCommand {
            template: template.into(),
            format,
        });
        self
    }

    /// Mark the parameter as written by its driver.
    pub fn set_by_driver(mut self) -> Self {
        self.setter = Setter::Driver;
        self
    }

    /// Set the value domain.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Map human values to instrument tokens. The mapped values also become
    /// the parameter's domain.
    pub fn mapping<V, S>(mut self, pairs: impl IntoIterator<Item = (V, S)>) -> Self
    where
        V: Into<Value>,
        S: Into<String>,
    {
        let mapping = ValueMapping::new(pairs);
        self.validator = Validator::Enum(mapping.values());
        self.mapping = Some(mapping);
        self
    }

    /// Whether the parameter can be queried.
    pub fn is_readable(&self) -> bool {
        self.get_cmd.is_some()
    }

    /// Whether the parameter can be set.
    pub fn is_settable(&self) -> bool {
        !matches!(self.setter, Setter::ReadOnly)
    }

    /// Validate `value` and translate it into its instrument token, if mapped.
    pub fn to_raw(&self, value: &Value) -> AppResult<Value> {
        self.validator.validate(&self.name, value)?;
        match &self.mapping {
            Some(mapping) => mapping
                .to_raw(value)
                .map(|token| Value::Text(token.to_string()))
                .ok_or_else(|| DaqError::invalid_value(&self.name, format!("{} is not mapped", value))),
            None => Ok(value.clone()),
        }
    }

    /// Command that sets the parameter to `value`.
    pub fn set_command(&self, value: &Value) -> AppResult<String> {
        match &self.setter {
            Setter::Command(set) => set.render(&self.name, &self.to_raw(value)?),
            Setter::ReadOnly => Err(DaqError::ParameterReadOnly(self.name.clone())),
            Setter::Driver => Err(DaqError::Instrument(format!(
                "parameter '{}' is set through its driver",
                self.name
            ))),
        }
    }

    /// Parse a query response into the parameter's human value.
    pub fn parse_response(&self, response: &str) -> AppResult<Value> {
        let command = self.get_cmd.as_deref().unwrap_or(&self.name);
        let parsed = self.parser.parse(command, response)?;
        match &self.mapping {
            Some(mapping) => mapping
                .from_raw(&parsed.to_string())
                .cloned()
                .ok_or_else(|| DaqError::response_parse(command, response)),
            None => Ok(parsed),
        }
    }
}

/// A parameterless or single-argument instrument action.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    /// Table key.
    pub name: String,
    /// Command, with a `{}` placeholder when the function takes an argument.
    pub command: String,
    /// Domain of the single argument, `None` for no argument.
    pub argument: Option<Validator>,
    /// Short description.
    pub docstring: Option<String>,
}

impl FunctionSpec {
    /// Function without arguments.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            argument: None,
            docstring: None,
        }
    }

    /// Take one argument in `domain`.
    pub fn with_argument(mut self, domain: Validator) -> Self {
        self.argument = Some(domain);
        self
    }

    /// Attach a description.
    pub fn doc(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    /// Command string for a call with `args`.
    pub fn render(&self, args: &[Value]) -> AppResult<String> {
        match (&self.argument, args) {
            (None, []) => Ok(self.command.clone()),
            (Some(domain), [arg]) => {
                domain.validate(&self.name, arg)?;
                Ok(self.command.replacen("{}", &arg.to_string(), 1))
            }
            (expected, _) => Err(DaqError::invalid_value(
                &self.name,
                format!(
                    "expected {} argument(s), got {}",
                    usize::from(expected.is_some()),
                    args.len()
                ),
            )),
        }
    }
}

// =============================================================================
// Tables
// =============================================================================

/// Named parameters of one instrument.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    entries: BTreeMap<String, ParameterSpec>,
}

impl ParameterTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `spec`, replacing any parameter with the same name.
    pub fn register(&mut self, spec: ParameterSpec) -> &mut Self {
        self.entries.insert(spec.name.clone(), spec);
        self
    }

    /// Look up a parameter.
    pub fn get(&self, name: &str) -> AppResult<&ParameterSpec> {
        self.entries
            .get(name)
            .ok_or_else(|| DaqError::UnknownParameter(name.to_string()))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All specs in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.entries.values()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Named functions of one instrument.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: BTreeMap<String, FunctionSpec>,
}

impl FunctionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `spec`, replacing any function with the same name.
    pub fn register(&mut self, spec: FunctionSpec) -> &mut Self {
        self.entries.insert(spec.name.clone(), spec);
        self
    }

    /// Look up a function.
    pub fn get(&self, name: &str) -> AppResult<&FunctionSpec> {
        self.entries
            .get(name)
            .ok_or_else(|| DaqError::UnknownFunction(name.to_string()))
    }

    /// Function names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All specs in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.entries.values()
    }

    /// Number of functions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_matches_across_numeric_types() {
        assert!(Value::Int(1).matches(&Value::Float(1.0)));
        assert!(!Value::Int(1).matches(&Value::Float(1.5)));
        assert!(!Value::Text("1".into()).matches(&Value::Int(1)));
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
    }

    #[test]
    fn test_numbers_validator_bounds() {
        let v = Validator::Numbers {
            min: -360.0,
            max: 360.0,
        };
        assert!(v.validate("phase", &Value::Float(360.0)).is_ok());
        assert!(v.validate("phase", &Value::Int(-360)).is_ok());
        assert!(v.validate("phase", &Value::Float(360.01)).is_err());
        assert!(v.validate("phase", &Value::Float(f64::NAN)).is_err());
        assert!(v.validate("phase", &Value::from("ten")).is_err());
    }

    #[test]
    fn test_ints_validator() {
        let v = Validator::Ints { min: 0, max: 8 };
        assert!(v.validate("range", &Value::Float(3.0)).is_ok());
        assert!(v.validate("range", &Value::Float(3.5)).is_err());
        assert!(v.validate("range", &Value::Int(9)).is_err());
    }

    #[test]
    fn test_enum_validator_lists_choices() {
        let v = Validator::Enum(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(v.validate("auto_offset", &Value::Int(2)).is_ok());
        let err = v.validate("auto_offset", &Value::Int(4)).unwrap_err();
        assert!(err.to_string().contains("{1, 2, 3}"));
    }

    #[test]
    fn test_mapping_both_directions() {
        let m = ValueMapping::new([(Value::Float(0.0625), "0"), (Value::from("Trigger"), "14")]);
        assert_eq!(m.to_raw(&Value::Float(0.0625)), Some("0"));
        assert_eq!(m.to_raw(&Value::from("Trigger")), Some("14"));
        assert_eq!(m.from_raw(" 14\n"), Some(&Value::from("Trigger")));
        assert_eq!(m.from_raw("0.0"), Some(&Value::Float(0.0625)));
        assert_eq!(m.from_raw("7"), None);
    }

    #[test]
    fn test_scientific_format() {
        assert_eq!(format_scientific(1e9, 1, false), "1.0E+09");
        assert_eq!(format_scientific(-12.6, 1, true), "-1.3E+01");
        assert_eq!(format_scientific(7.0, 1, true), "+7.0E+00");
        assert_eq!(format_scientific(-134.0, 1, true), "-1.3E+02");
        assert_eq!(format_scientific(0.001, 2, false), "1.00E-03");
        assert_eq!(format_scientific(1e-100, 0, false), "1E-100");
    }

    #[test]
    fn test_value_formats() {
        assert_eq!(
            ValueFormat::Fixed(4).render("frequency", &Value::Int(100000)).unwrap(),
            "100000.0000"
        );
        assert_eq!(
            ValueFormat::Integer.render("sens", &Value::Float(4.0)).unwrap(),
            "4"
        );
        assert!(ValueFormat::Integer.render("sens", &Value::Float(4.5)).is_err());
        assert!(ValueFormat::Fixed(2).render("phase", &Value::from("x")).is_err());
    }

    #[test]
    fn test_response_parsers() {
        assert_eq!(
            ResponseParser::Float.parse("FREQ?", "1.0E+06\n").unwrap(),
            Value::Float(1e6)
        );
        assert_eq!(ResponseParser::Int.parse("SPTS ?", "42").unwrap(), Value::Int(42));
        assert_eq!(ResponseParser::Int.parse("SPTS ?", "42.0").unwrap(), Value::Int(42));
        assert!(matches!(
            ResponseParser::Float.parse("FREQ?", "ERR"),
            Err(DaqError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_mapped_parameter_round_trip() {
        let spec = ParameterSpec::new("reference_source")
            .get("FMOD?", ResponseParser::Text)
            .set("FMOD {}", ValueFormat::Display)
            .mapping([("external", "0"), ("internal", "1")]);

        assert_eq!(spec.set_command(&Value::from("internal")).unwrap(), "FMOD 1");
        assert_eq!(spec.parse_response("0").unwrap(), Value::from("external"));
        assert!(matches!(
            spec.set_command(&Value::from("auto")),
            Err(DaqError::InvalidValue { .. })
        ));
        assert!(spec.parse_response("5").is_err());
    }

    #[test]
    fn test_read_only_and_driver_set_parameters() {
        let npts = ParameterSpec::new("buffer_npts").get("SPTS ?", ResponseParser::Int);
        assert!(npts.is_readable());
        assert!(!npts.is_settable());
        assert!(matches!(
            npts.set_command(&Value::Int(1)),
            Err(DaqError::ParameterReadOnly(_))
        ));

        let ratio = ParameterSpec::new("ch1_ratio").set_by_driver();
        assert!(ratio.is_settable());
        assert!(ratio.set_command(&Value::from("none")).is_err());
    }

    #[test]
    fn test_function_spec_arguments() {
        let reset = FunctionSpec::new("reset", "*RST");
        assert_eq!(reset.render(&[]).unwrap(), "*RST");
        assert!(reset.render(&[Value::Int(1)]).is_err());

        let offset = FunctionSpec::new("auto_offset", "AOFF {}").with_argument(Validator::Enum(
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        ));
        assert_eq!(offset.render(&[Value::Int(3)]).unwrap(), "AOFF 3");
        assert!(offset.render(&[Value::Int(4)]).is_err());
        assert!(offset.render(&[]).is_err());
    }

    #[test]
    fn test_tables_lookup() {
        let mut table = ParameterTable::new();
        table
            .register(ParameterSpec::new("X").get("OUTP? 1", ResponseParser::Float))
            .register(ParameterSpec::new("Y").get("OUTP? 2", ResponseParser::Float));
        assert_eq!(table.len(), 2);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["X", "Y"]);
        assert!(matches!(
            table.get("Z"),
            Err(DaqError::UnknownParameter(name)) if name == "Z"
        ));

        let functions = FunctionTable::new();
        assert!(matches!(
            functions.get("AGAN"),
            Err(DaqError::UnknownFunction(_))
        ));
    }
}
