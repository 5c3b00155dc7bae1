//! # Chronos FPGA
//!
//! Control of the image sensor and recording hardware of Chronos high-speed cameras: register
//! and frame buffer access over memory-mapped I/O, the LUX1310's indirect register protocol,
//! frame timing, the analog bias DAC, the record sequencer and black-level calibration.
//!
//! Everything hardware-facing is generic over [`transport::Transport`] and the `embedded-hal`
//! bus traits, so the whole stack runs against [`transport::emulator::Emulator`] in tests.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bias;
pub mod bits;
pub mod bus;
pub mod calibration;
pub mod camera;
pub mod config;
pub mod core;
pub mod error;
pub mod fpga;
pub mod framebuffer;
pub mod observe;
pub mod prelude;
pub mod regmap;
pub mod sci;
pub mod sensor;
pub mod sequencer;
pub mod timing;
pub mod transport;

pub use error::{
    Error,
    ErrorKind,
    Result,
};
