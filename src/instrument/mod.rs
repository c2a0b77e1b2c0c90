//! Instrument drivers.
//!
//! Each driver wraps an [`InstrumentCore`]: a transport plus the instrument's
//! parameter and function tables. The core does the generic work (look up a
//! name, validate, format, send, parse) so drivers only add what their
//! instrument does differently.
//!
//! - [`sr844`]: Stanford Research SR844 RF lock-in amplifier
//! - [`hm8133`]: HAMEG HM8133 RF synthesizer

pub mod hm8133;
pub mod sr844;

pub use hm8133::Hm8133;
pub use sr844::Sr844;

use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Map};
use tracing::{debug, info, warn};

use crate::adapters::Transport;
use crate::error::{AppResult, DaqError};
use crate::parameter::{FunctionTable, ParameterTable, Value};

/// Transport plus parameter and function tables of one instrument.
pub struct InstrumentCore<T> {
    id: String,
    transport: T,
    parameters: ParameterTable,
    functions: FunctionTable,
}

impl<T: Transport> InstrumentCore<T> {
    /// Assemble a core from its parts.
    pub fn new(
        id: impl Into<String>,
        transport: T,
        parameters: ParameterTable,
        functions: FunctionTable,
    ) -> Self {
        Self {
            id: id.into(),
            transport,
            parameters,
            functions,
        }
    }

    /// Instrument id used in logs and snapshots.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parameter table.
    pub fn parameters(&self) -> &ParameterTable {
        &self.parameters
    }

    /// Function table.
    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a raw command.
    pub async fn write(&mut self, command: &str) -> AppResult<()> {
        debug!("{} <- {}", self.id, command);
        self.transport.write(command).await
    }

    /// Send a raw query and return the trimmed text response.
    pub async fn ask(&mut self, command: &str) -> AppResult<String> {
        let response = self.transport.query_text(command).await?;
        debug!("{} {} -> {}", self.id, command, response);
        Ok(response)
    }

    /// Send a raw query and return the response bytes untouched.
    pub async fn ask_raw(&mut self, command: &str) -> AppResult<Bytes> {
        let response = self.transport.query(command).await?;
        debug!("{} {} -> {} bytes", self.id, command, response.len());
        Ok(response)
    }

    /// Send a raw query and read a binary block of exactly `len` bytes.
    pub async fn ask_raw_exact(&mut self, command: &str, len: usize) -> AppResult<Bytes> {
        let response = self.transport.query_exact(command, len).await?;
        debug!("{} {} -> {} bytes", self.id, command, response.len());
        Ok(response)
    }

    /// Read a parameter.
    pub async fn get(&mut self, name: &str) -> AppResult<Value> {
        let spec = self.parameters.get(name)?;
        let command = spec
            .get_cmd
            .as_deref()
            .ok_or_else(|| DaqError::ParameterWriteOnly(name.to_string()))?;

        let response = self.transport.query_text(command).await?;
        debug!("{} {} -> {}", self.id, command, response);
        spec.parse_response(&response)
    }

    /// Validate and set a parameter.
    pub async fn set(&mut self, name: &str, value: impl Into<Value>) -> AppResult<()> {
        let value = value.into();
        let command = self.parameters.get(name)?.set_command(&value)?;
        self.write(&command).await?;
        info!("Set {} {} to {}", self.id, name, value);
        Ok(())
    }

    /// Invoke a function.
    pub async fn call(&mut self, name: &str, args: &[Value]) -> AppResult<()> {
        let command = self.functions.get(name)?.render(args)?;
        self.write(&command).await?;
        info!("{}: {} ({})", self.id, name, command);
        Ok(())
    }

    /// Query the identification string and log it.
    pub async fn identify(&mut self, command: &str) -> AppResult<String> {
        let identity = self.ask(command).await?;
        info!(
            "Connected to {} via {}: {}",
            self.id,
            self.transport.info(),
            identity
        );
        Ok(identity)
    }

    /// Read every readable parameter into a JSON document, alongside the
    /// function table with each function's command and description.
    ///
    /// Parameters that fail to read are recorded with their error rather than
    /// aborting the snapshot; a broken transport shows up as errors on every
    /// entry.
    pub async fn snapshot(&mut self) -> AppResult<serde_json::Value> {
        let names: Vec<String> = self
            .parameters
            .iter()
            .filter(|spec| spec.is_readable())
            .map(|spec| spec.name.clone())
            .collect();

        let mut parameters = Map::new();
        for name in names {
            let entry = match self.get(&name).await {
                Ok(value) => {
                    let spec = self.parameters.get(&name)?;
                    json!({
                        "value": serde_json::to_value(&value)
                            .map_err(|e| DaqError::Instrument(e.to_string()))?,
                        "unit": spec.unit,
                        "label": spec.label,
                    })
                }
                Err(e) => {
                    warn!("{}: snapshot of '{}' failed: {}", self.id, name, e);
                    json!({ "error": e.to_string() })
                }
            };
            parameters.insert(name, entry);
        }

        let functions: Map<String, serde_json::Value> = self
            .functions
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    json!({ "command": spec.command, "doc": spec.docstring }),
                )
            })
            .collect();

        Ok(json!({
            "instrument": self.id,
            "transport": self.transport.info(),
            "ts": Utc::now().to_rfc3339(),
            "parameters": parameters,
            "functions": functions,
        }))
    }
}
