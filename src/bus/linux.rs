//! The camera's SPI bus and GPIO lines on Linux, through `linux-embedded-hal`
use chronos_utils::board::SpiDevice;
use linux_embedded_hal::{
    spidev::{
        SpiModeFlags,
        Spidev,
        SpidevOptions,
    },
    sysfs_gpio::{
        self,
        Direction,
        Pin,
    },
};
pub use linux_embedded_hal::{
    SpidevBus,
    SysfsPin,
};
use std::io;
use thiserror::Error;
use tracing::{
    debug,
    info,
};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Opening SPI device {path} - {source}")]
    Spi { path: String, source: io::Error },
    #[error("Setting up GPIO {line} - {source}")]
    Gpio {
        line: u32,
        source: sysfs_gpio::Error,
    },
}

/// Open and configure the spidev node described by `config`
/// # Errors
/// Returns an error if the node can't be opened or rejects the configuration
pub fn open_spi(config: &SpiDevice) -> Result<SpidevBus, DeviceError> {
    let err = |source| DeviceError::Spi {
        path: config.path.clone(),
        source,
    };
    let mut dev = Spidev::open(&config.path).map_err(err)?;
    let options = SpidevOptions::new()
        .mode(SpiModeFlags::from_bits_truncate(u32::from(config.mode)))
        .max_speed_hz(config.speed_hz)
        .bits_per_word(config.bits_per_word)
        .build();
    dev.configure(&options).map_err(err)?;
    info!(
        path = %config.path,
        mode = config.mode,
        speed_hz = config.speed_hz,
        bits_per_word = config.bits_per_word,
        "Opened SPI device"
    );
    Ok(SpidevBus(dev))
}

/// Export `line` through sysfs as an output, starting low
/// # Errors
/// Returns an error if the line can't be exported or configured
pub fn export_output(line: u32) -> Result<SysfsPin, DeviceError> {
    let pin = Pin::new(u64::from(line));
    pin.export()
        .and_then(|()| pin.set_direction(Direction::Low))
        .map_err(|source| DeviceError::Gpio { line, source })?;
    debug!(line, "Exported GPIO");
    Ok(SysfsPin(pin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_spi_device() {
        let config = SpiDevice {
            path: "/nonexistent/spidev9.9".into(),
            mode: 1,
            speed_hz: 1_000_000,
            bits_per_word: 16,
        };
        let err = open_spi(&config).err().expect("opening a missing device should fail");
        assert!(matches!(&err, DeviceError::Spi { path, .. } if path == &config.path));
        assert!(err.to_string().contains("/nonexistent/spidev9.9"));
    }
}
