//! The crate-wide error type
use crate::{
    core::Space,
    sensor::GeometryError,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] crate::transport::Error),
    #[error("Unknown {space} register `{name}`")]
    UnknownRegister { space: Space, name: String },
    #[error("Register `{0}` has no field mask")]
    MissingMask(String),
    #[error("Invalid recording mode parameters - {0}")]
    InvalidModeParameters(String),
    #[error("The camera is already recording")]
    AlreadyRecording,
    #[error("The camera is not recording")]
    NotRecording,
    #[error("The camera is in playback mode")]
    InPlaybackMode,
    #[error("Sensor bus transfer to sub-address {addr:#04x} didn't finish within {timeout:?}")]
    SensorBusTimeout { addr: u16, timeout: Duration },
    #[error("SCI payload of {len} bytes is longer than the {max} a transfer can carry")]
    SciPayloadTooLong { len: usize, max: usize },
    #[error("The record sequencer didn't finish within {0:?}")]
    SequencerTimeout(Duration),
    #[error(transparent)]
    InvalidGeometry(#[from] GeometryError),
    #[error("The gain table is empty")]
    EmptyGainTable,
    #[error("The wavetable catalog is empty")]
    EmptyWavetableCatalog,
    #[error("No wavetable with a read delay of {0} clocks")]
    UnknownWavetable(u16),
    #[error("SPI transfer to the bias DAC failed - {0:?}")]
    Spi(embedded_hal::spi::ErrorKind),
    #[error("Driving GPIO line `{line}` failed - {kind:?}")]
    Gpio {
        line: &'static str,
        kind: embedded_hal::digital::ErrorKind,
    },
}

/// Coarse classes of [`Error`], for callers deciding between fixing a bug, reporting a state
/// conflict, or resetting the hardware and retrying
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad register names or mode parameters, rejected before touching the hardware
    Programming,
    /// The camera is in the wrong recording or playback state
    State,
    /// A bounded hardware poll expired
    Timeout,
    /// A geometry the sensor can't produce
    Constraint,
    /// The underlying bus or device failed
    Io,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownRegister { .. }
            | Error::MissingMask(_)
            | Error::InvalidModeParameters(_)
            | Error::EmptyGainTable
            | Error::EmptyWavetableCatalog
            | Error::UnknownWavetable(_)
            | Error::SciPayloadTooLong { .. } => ErrorKind::Programming,
            Error::AlreadyRecording | Error::NotRecording | Error::InPlaybackMode => {
                ErrorKind::State
            }
            Error::SensorBusTimeout { .. } | Error::SequencerTimeout(_) => ErrorKind::Timeout,
            Error::InvalidGeometry(_) => ErrorKind::Constraint,
            Error::Transport(_) | Error::Spi(_) | Error::Gpio { .. } => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
