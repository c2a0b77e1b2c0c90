//! Hardware adapter implementations
//!
//! This module defines the [`Transport`] seam every driver talks through and
//! its implementations:
//!
//! - [`VisaAdapter`] for GPIB/USB/LAN instruments via the system VISA library
//!   (requires the `instrument_visa` feature)
//! - [`MockAdapter`] with scripted responses, for tests and offline use

pub mod mock_adapter;
pub mod visa_adapter;

pub use mock_adapter::{Call, MockAdapter};
pub use visa_adapter::VisaAdapter;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::config::InstrumentDefinition;
use crate::error::{AppResult, DaqError};

/// Request/response link to one instrument.
///
/// A driver owns its transport, so calls are strictly sequential: every
/// `query` writes the command and then reads the complete response before the
/// next command is issued. Timeouts and retries, if any, are the transport's
/// business.
#[async_trait]
pub trait Transport: Send {
    /// Send a command without reading a response.
    async fn write(&mut self, command: &str) -> AppResult<()>;

    /// Send a command and return the raw response bytes.
    ///
    /// The response may be text or binary depending on the command, so no
    /// trimming happens here.
    async fn query(&mut self, command: &str) -> AppResult<Bytes>;

    /// Send a command and read a binary block of exactly `len` bytes.
    ///
    /// Transports that cannot size their reads fall back to [`query`] and
    /// reject a response of any other length.
    ///
    /// [`query`]: Transport::query
    async fn query_exact(&mut self, command: &str, len: usize) -> AppResult<Bytes> {
        let raw = self.query(command).await?;
        if raw.len() != len {
            return Err(DaqError::MalformedFrame(format!(
                "{} returned {} bytes, expected {}",
                command,
                raw.len(),
                len
            )));
        }
        Ok(raw)
    }

    /// Send a command and return the response as trimmed text.
    async fn query_text(&mut self, command: &str) -> AppResult<String> {
        let raw = self.query(command).await?;
        Ok(response_text(&raw))
    }

    /// Short description for logs.
    fn info(&self) -> String;
}

/// Open a VISA session for a configured instrument.
pub async fn open_transport(def: &InstrumentDefinition) -> AppResult<VisaAdapter> {
    let mut adapter = VisaAdapter::from_definition(def);
    adapter.connect().await?;
    info!("{} '{}' opened at {}", def.kind, def.id, def.resource);
    Ok(adapter)
}

/// Lossy UTF-8 view of a text response without surrounding whitespace or NULs.
pub(crate) fn response_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string()
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write(&mut self, command: &str) -> AppResult<()> {
        (**self).write(command).await
    }

    async fn query(&mut self, command: &str) -> AppResult<Bytes> {
        (**self).query(command).await
    }

    async fn query_exact(&mut self, command: &str, len: usize) -> AppResult<Bytes> {
        (**self).query_exact(command, len).await
    }

    async fn query_text(&mut self, command: &str) -> AppResult<String> {
        (**self).query_text(command).await
    }

    fn info(&self) -> String {
        (**self).info()
    }
}
