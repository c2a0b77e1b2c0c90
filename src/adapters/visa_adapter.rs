//! VISA Hardware Adapter for GPIB/USB/Ethernet instruments
//!
//! Provides a [`Transport`] implementation for the VISA communication
//! protocol, supporting instruments via GPIB, USB, Ethernet, etc.
//!
//! VISA calls are blocking, so every operation runs on Tokio's blocking task
//! executor. Without the `instrument_visa` feature the adapter still builds,
//! but connecting and all I/O fail with [`DaqError::FeatureNotEnabled`].
//!
//! The I/O timeout is applied to the session before every exchange. Text
//! responses end at the last byte of the read terminator, which is enabled as
//! the VISA termination character, or at a read that returns less than a full
//! chunk (END/EOI). Binary blocks of known size are read with
//! [`Transport::query_exact`] and never depend on a terminator.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use super::{response_text, Transport};
use crate::config::InstrumentDefinition;
use crate::error::{AppResult, DaqError};

#[cfg(feature = "instrument_visa")]
use std::sync::Arc;
#[cfg(feature = "instrument_visa")]
use tokio::sync::Mutex;
#[cfg(feature = "instrument_visa")]
use visa_rs::attribute::{AttrTermchar, AttrTermcharEn, AttrTmoValue};
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

#[cfg(feature = "instrument_visa")]
const READ_CHUNK: usize = 4096;

/// What to read back after writing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Nothing,
    Text,
    Exact(usize),
}

/// VISA timeout in milliseconds; durations beyond `u32` saturate, which VISA
/// treats as no timeout.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Termination character for a read terminator: its last byte.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
fn termchar(read_terminator: &str) -> Option<u8> {
    read_terminator.as_bytes().last().copied()
}

/// Whether a text response is complete after a read of `read` bytes.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
fn text_complete(response: &[u8], read: usize, chunk: usize, termchar: Option<u8>) -> bool {
    read < chunk || termchar.is_some_and(|t| response.last() == Some(&t))
}

/// Open session. The resource manager is kept alongside the instrument since
/// closing it closes every session it opened.
#[cfg(feature = "instrument_visa")]
struct Session {
    _rm: DefaultRM,
    instr: Instrument,
}

/// VISA adapter for instrument communication
///
/// Supports resource strings like:
/// - "GPIB0::8::INSTR" (GPIB interface)
/// - "USB0::0x1234::0x5678::SERIAL::INSTR" (USB)
/// - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
pub struct VisaAdapter {
    /// VISA resource string (e.g., "GPIB0::8::INSTR")
    pub(crate) resource_string: String,

    /// Open and I/O timeout
    pub(crate) timeout: Duration,

    /// Appended to every command
    pub(crate) write_terminator: String,

    /// Ends text responses and is stripped from them
    pub(crate) read_terminator: String,

    /// The open VISA session (behind Arc<Mutex> for the blocking executor)
    #[cfg(feature = "instrument_visa")]
    instrument: Option<Arc<Mutex<Session>>>,
}

impl VisaAdapter {
    /// Create a new VISA adapter with default settings
    ///
    /// # Arguments
    /// * `resource_string` - VISA resource identifier (e.g., "GPIB0::8::INSTR")
    pub fn new(resource_string: String) -> Self {
        Self {
            resource_string,
            timeout: Duration::from_secs(5),
            write_terminator: "\n".to_string(),
            read_terminator: "\n".to_string(),
            #[cfg(feature = "instrument_visa")]
            instrument: None,
        }
    }

    /// Adapter configured from an instrument definition (not yet connected)
    pub fn from_definition(def: &InstrumentDefinition) -> Self {
        Self::new(def.resource.clone())
            .with_timeout(Duration::from_millis(def.timeout_ms))
            .with_write_terminator(def.write_terminator().to_string())
            .with_read_terminator(def.read_terminator().to_string())
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set terminator appended to commands
    pub fn with_write_terminator(mut self, terminator: String) -> Self {
        self.write_terminator = terminator;
        self
    }

    /// Set terminator that ends text responses
    pub fn with_read_terminator(mut self, terminator: String) -> Self {
        self.read_terminator = terminator;
        self
    }

    /// Resource string this adapter talks to
    pub fn resource_string(&self) -> &str {
        &self.resource_string
    }

    /// Whether a VISA session is open
    pub fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_visa")]
        {
            self.instrument.is_some()
        }

        #[cfg(not(feature = "instrument_visa"))]
        {
            false
        }
    }

    /// Open the VISA resource
    #[cfg(feature = "instrument_visa")]
    pub async fn connect(&mut self) -> AppResult<()> {
        let resource = self.resource_string.clone();
        let timeout = self.timeout;
        let termchar = termchar(&self.read_terminator);

        let session = tokio::task::spawn_blocking(move || {
            let rm = DefaultRM::new().map_err(|e| {
                DaqError::Transport(format!("Failed to create VISA resource manager: {:?}", e))
            })?;
            let name = std::ffi::CString::new(resource.as_str()).map_err(|_| {
                DaqError::Configuration(format!("Invalid VISA resource string: {}", resource))
            })?;
            let instr = rm
                .open(&name.into(), AccessMode::NO_LOCK, timeout)
                .map_err(|e| {
                    DaqError::Transport(format!(
                        "Failed to open VISA resource {}: {:?}",
                        resource, e
                    ))
                })?;
            if let Some(byte) = termchar {
                let attr = AttrTermchar::new_checked(byte.into()).ok_or_else(|| {
                    DaqError::Configuration(format!("Invalid termination character {:#04x}", byte))
                })?;
                instr
                    .set_attr(attr)
                    .and_then(|_| instr.set_attr(AttrTermcharEn::VI_TRUE))
                    .map_err(|e| {
                        DaqError::Transport(format!(
                            "Failed to enable termination character on {}: {:?}",
                            resource, e
                        ))
                    })?;
            }
            Ok::<Session, DaqError>(Session { _rm: rm, instr })
        })
        .await
        .map_err(|e| DaqError::Transport(format!("VISA open task panicked: {}", e)))??;

        self.instrument = Some(Arc::new(Mutex::new(session)));
        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            self.resource_string,
            self.timeout.as_millis()
        );
        Ok(())
    }

    #[cfg(not(feature = "instrument_visa"))]
    pub async fn connect(&mut self) -> AppResult<()> {
        Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    /// Close the VISA session
    pub fn disconnect(&mut self) {
        #[cfg(feature = "instrument_visa")]
        {
            if self.instrument.take().is_some() {
                debug!("VISA resource '{}' closed", self.resource_string);
            }
        }
    }

    #[cfg(feature = "instrument_visa")]
    fn session(&self) -> AppResult<Arc<Mutex<Session>>> {
        self.instrument
            .clone()
            .ok_or_else(|| DaqError::Transport("VISA instrument not connected".to_string()))
    }

    /// Write `command` and read back what `reply` asks for
    #[cfg(feature = "instrument_visa")]
    async fn exchange(&mut self, command: &str, reply: Reply) -> AppResult<Bytes> {
        use std::io::{Read, Write};

        let session = self.session()?;
        let framed = format!("{}{}", command, self.write_terminator);
        let command = command.to_string();
        let timeout_ms = timeout_millis(self.timeout);
        let termchar = termchar(&self.read_terminator);

        tokio::task::spawn_blocking(move || -> AppResult<Bytes> {
            let mut guard = session.blocking_lock();
            let instr = &mut guard.instr;

            let timeout = AttrTmoValue::new_checked(timeout_ms).ok_or_else(|| {
                DaqError::Configuration(format!("Invalid VISA timeout: {}ms", timeout_ms))
            })?;
            instr.set_attr(timeout).map_err(|e| {
                DaqError::Transport(format!("Failed to set VISA timeout for {}: {:?}", command, e))
            })?;

            instr
                .write_all(framed.as_bytes())
                .map_err(|e| DaqError::Transport(format!("VISA write failed for {}: {}", command, e)))?;

            let response = match reply {
                Reply::Nothing => {
                    debug!("VISA write: {}", command);
                    return Ok(Bytes::new());
                }
                Reply::Exact(len) => {
                    let mut response = vec![0u8; len];
                    instr.read_exact(&mut response).map_err(|e| {
                        DaqError::Transport(format!(
                            "VISA read of {} bytes failed for {}: {}",
                            len, command, e
                        ))
                    })?;
                    response
                }
                Reply::Text => {
                    let mut response = Vec::new();
                    let mut chunk = [0u8; READ_CHUNK];
                    loop {
                        let n = instr.read(&mut chunk).map_err(|e| {
                            DaqError::Transport(format!("VISA read failed for {}: {}", command, e))
                        })?;
                        response.extend_from_slice(&chunk[..n]);
                        if text_complete(&response, n, READ_CHUNK, termchar) {
                            break;
                        }
                    }
                    response
                }
            };
            debug!("VISA query '{}' -> {} bytes", command, response.len());
            Ok(Bytes::from(response))
        })
        .await
        .map_err(|e| DaqError::Transport(format!("VISA I/O task panicked: {}", e)))?
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn exchange(&mut self, _command: &str, _reply: Reply) -> AppResult<Bytes> {
        Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
    }
}

#[async_trait]
impl Transport for VisaAdapter {
    async fn write(&mut self, command: &str) -> AppResult<()> {
        self.exchange(command, Reply::Nothing).await.map(|_| ())
    }

    async fn query(&mut self, command: &str) -> AppResult<Bytes> {
        self.exchange(command, Reply::Text).await
    }

    async fn query_exact(&mut self, command: &str, len: usize) -> AppResult<Bytes> {
        self.exchange(command, Reply::Exact(len)).await
    }

    async fn query_text(&mut self, command: &str) -> AppResult<String> {
        let raw = self.query(command).await?;
        let text = response_text(&raw);
        let text = match self.read_terminator.as_str() {
            "" => text.as_str(),
            term => text.trim_end_matches(term),
        };
        Ok(response_text(text.as_bytes()))
    }

    fn info(&self) -> String {
        format!(
            "VisaAdapter({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visa_adapter_creation() {
        let adapter = VisaAdapter::new("GPIB0::8::INSTR".to_string());
        assert!(!adapter.is_connected());
        assert_eq!(adapter.resource_string(), "GPIB0::8::INSTR");
        assert_eq!(adapter.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_visa_adapter_builder() {
        let adapter = VisaAdapter::new("GPIB0::20::INSTR".to_string())
            .with_timeout(Duration::from_millis(2000))
            .with_write_terminator(";".to_string())
            .with_read_terminator("\r".to_string());

        assert_eq!(adapter.timeout, Duration::from_millis(2000));
        assert_eq!(adapter.write_terminator, ";");
        assert_eq!(adapter.read_terminator, "\r");
    }

    #[test]
    fn test_info_string() {
        let adapter = VisaAdapter::new("TCPIP0::192.168.1.100::INSTR".to_string())
            .with_timeout(Duration::from_millis(3000));
        let info = adapter.info();
        assert!(info.contains("TCPIP0::192.168.1.100::INSTR"));
        assert!(info.contains("3000ms"));
    }

    #[test]
    fn test_timeout_millis_saturates() {
        assert_eq!(timeout_millis(Duration::from_millis(2500)), 2500);
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX)), u32::MAX);
    }

    #[test]
    fn test_termchar_is_last_terminator_byte() {
        assert_eq!(termchar("\n"), Some(b'\n'));
        assert_eq!(termchar(";"), Some(b';'));
        assert_eq!(termchar("\r\n"), Some(b'\n'));
        assert_eq!(termchar(""), None);
    }

    #[test]
    fn test_text_complete() {
        // a full chunk without the terminator needs another read
        let full = vec![b'0'; 16];
        assert!(!text_complete(&full, 16, 16, Some(b'\n')));
        assert!(!text_complete(&full, 16, 16, None));

        // a full chunk ending in the terminator is done
        let mut terminated = vec![b'0'; 15];
        terminated.push(b';');
        assert!(text_complete(&terminated, 16, 16, Some(b';')));

        // short read is END
        assert!(text_complete(b"1.04", 4, 16, Some(b'\n')));
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[tokio::test]
    async fn test_io_without_feature_reports_it() {
        let mut adapter = VisaAdapter::new("GPIB0::8::INSTR".to_string());
        assert!(matches!(
            adapter.connect().await,
            Err(DaqError::FeatureNotEnabled(_))
        ));
        assert!(matches!(
            adapter.query("*IDN?").await,
            Err(DaqError::FeatureNotEnabled(_))
        ));
        assert!(matches!(
            adapter.query_exact("TRCL ? 1, 0, 1024", 4096).await,
            Err(DaqError::FeatureNotEnabled(_))
        ));
    }

    #[cfg(feature = "instrument_visa")]
    #[tokio::test]
    async fn test_io_before_connect_fails() {
        let mut adapter = VisaAdapter::new("GPIB0::8::INSTR".to_string());
        assert!(matches!(
            adapter.write("*RST").await,
            Err(DaqError::Transport(_))
        ));
    }
}
