//! Drivers for an SR844 RF lock-in amplifier and an HM8133 RF synthesizer.
//!
//! The library contains the transport seam, the declarative parameter tables
//! and the two instrument drivers, plus the SR844 data-buffer decoder they
//! rely on. Instruments are reached over VISA (feature `instrument_visa`) or,
//! in tests, through the scripted [`adapters::MockAdapter`].
//!
//! ```no_run
//! use rust_daq_drivers::{adapters, config::Settings, instrument::Hm8133, logging};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::load()?;
//! logging::init(&settings.application)?;
//!
//! if let Some(def) = settings.instrument("synth") {
//!     let transport = adapters::open_transport(def).await?;
//!     let mut synth = Hm8133::connect(&def.id, transport).await?;
//!     synth.set_frequency(100e6).await?;
//!     synth.set_output(true).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod buffer;
pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod parameter;

pub use buffer::{decode, SampleBuffer, SampleRate};
pub use error::{AppResult, DaqError};
