//! # Chronos Utilities
//!
//! File formats that describe a Chronos camera board: memory windows, peripheral wiring,
//! register symbol tables, sensor wavetables and the analog gain table.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod board;
