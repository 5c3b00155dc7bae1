//! Serial buses and GPIO lines outside the FPGA window.
//!
//! Consumers are generic over the `embedded-hal` [`SpiBus`](embedded_hal::spi::SpiBus) and
//! [`OutputPin`](embedded_hal::digital::OutputPin) traits, so the Linux devices here and the
//! recording mocks are interchangeable.
pub mod linux;
pub mod mock;

pub use linux::{
    export_output,
    open_spi,
    SpidevBus,
    SysfsPin,
};

use crate::Error;

pub(crate) fn spi_error<E: embedded_hal::spi::Error>(e: E) -> Error {
    Error::Spi(e.kind())
}

pub(crate) fn gpio_error<E>(line: &'static str) -> impl Fn(E) -> Error
where
    E: embedded_hal::digital::Error,
{
    move |e| Error::Gpio {
        line,
        kind: e.kind(),
    }
}
