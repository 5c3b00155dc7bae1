//! Driver for the sensor control interface, the FPGA's FIFO-based bridge into the image
//! sensor's internal register bank.
//!
//! A transfer sets the direction bit, loads the target sub-address and payload length, pushes
//! the payload through the FIFO register, then sets the run bit and waits for the engine to
//! clear it again.
use crate::{
    bits::{
        extract_field,
        insert_field,
    },
    core::{
        resolve,
        RegRef,
        Register,
        RegisterMap,
        Space,
    },
    fpga::Fpga,
    observe::{
        notify,
        Observer,
        WriteObserver,
    },
    regmap::fpga::{
        SENSOR_SCI_ADDRESS,
        SENSOR_SCI_CONTROL,
        SENSOR_SCI_DATALEN,
        SENSOR_SCI_FIFO_WR,
        SENSOR_SCI_READ_DATA,
    },
    transport::Transport,
    Error,
    Result,
};
use std::{
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use tracing::debug;

/// Starts a transfer, cleared by the engine when it's done
pub const SCI_RUN: u16 = 0x0001;
/// Set for reads, clear for writes
pub const SCI_RW: u16 = 0x0002;
/// Empties the payload FIFO
pub const SCI_FIFO_RESET: u16 = 0x8000;

/// How long a single transfer may keep the run bit set by default
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct Sci<T> {
    fpga: Fpga<T>,
    registers: Arc<RegisterMap>,
    observer: Observer,
    timeout: Duration,
}

impl<T> Clone for Sci<T> {
    fn clone(&self) -> Self {
        Self {
            fpga: self.fpga.clone(),
            registers: self.registers.clone(),
            observer: self.observer.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T> Sci<T>
where
    T: Transport,
{
    /// Build a driver over `fpga` using the sensor symbol table `registers`
    #[must_use]
    pub fn new(fpga: Fpga<T>, registers: Arc<RegisterMap>, timeout: Duration) -> Self {
        Self {
            fpga,
            registers,
            observer: None,
            timeout,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn fpga(&self) -> &Fpga<T> {
        &self.fpga
    }

    /// Resolve a sensor register name or pass a raw sub-address through
    /// # Errors
    /// Returns an error if the name isn't in the sensor symbol table
    pub fn resolve<'a>(&self, reg: impl Into<RegRef<'a>>) -> Result<Register> {
        resolve(&self.registers, Space::Sensor, reg.into())
    }

    /// Write `value` to a sensor register.
    ///
    /// Named registers with a mask have `value` shifted into their field and only that
    /// sub-address is transmitted. Bits outside the field go out as zero, there is no
    /// read-modify-write. Raw addresses are written verbatim.
    /// # Errors
    /// Returns an error on unknown names, bad transport, or if the engine doesn't finish in time
    #[allow(clippy::cast_possible_truncation)]
    pub fn write<'a>(&self, reg: impl Into<RegRef<'a>>, value: u16) -> Result<()> {
        let Register { addr, mask } = self.resolve(reg)?;
        let data = match mask {
            Some(mask) => insert_field(value, mask as u16),
            None => value,
        };
        let addr = addr as u16;
        debug!(
            addr = format_args!("{addr:#04x}"),
            data = format_args!("{data:#06x}"),
            "SCI write"
        );
        notify(&self.observer, Space::Sensor, usize::from(addr), 16, u32::from(data));

        self.fpga.write_u16(SENSOR_SCI_CONTROL, SCI_FIFO_RESET)?;
        self.fpga.and_bits_u16(SENSOR_SCI_CONTROL, !SCI_RW)?;
        self.fpga.write_u16(SENSOR_SCI_ADDRESS, addr)?;
        self.fpga.write_u16(SENSOR_SCI_DATALEN, 2)?;
        for byte in data.to_be_bytes() {
            self.fpga.write_u8(SENSOR_SCI_FIFO_WR, byte)?;
        }
        self.run(addr)
    }

    /// Enqueue `data` verbatim and in order to sub-address `addr` as a single transfer
    /// # Errors
    /// Returns an error if `data` is longer than the length register can describe, on bad
    /// transport, or if the engine doesn't finish in time
    pub fn write_buffer(&self, addr: u16, data: &[u8]) -> Result<()> {
        let len = u16::try_from(data.len()).map_err(|_| Error::SciPayloadTooLong {
            len: data.len(),
            max: usize::from(u16::MAX),
        })?;
        debug!(
            addr = format_args!("{addr:#04x}"),
            len = data.len(),
            "SCI buffer write"
        );
        if self.observer.is_some() {
            for byte in data {
                notify(
                    &self.observer,
                    Space::Sensor,
                    usize::from(addr),
                    8,
                    u32::from(*byte),
                );
            }
        }

        let control = self.fpga.read_u16(SENSOR_SCI_CONTROL)? & !SCI_RW;
        self.fpga.write_u16(SENSOR_SCI_CONTROL, SCI_FIFO_RESET | control)?;
        self.fpga.write_u16(SENSOR_SCI_ADDRESS, addr)?;
        self.fpga.write_u16(SENSOR_SCI_DATALEN, len)?;
        for byte in data {
            self.fpga.write_u8(SENSOR_SCI_FIFO_WR, *byte)?;
        }
        self.run(addr)
    }

    /// Read a sensor register, shifted down to its field for masked names
    /// # Errors
    /// Returns an error on unknown names, bad transport, or if the engine doesn't finish in time
    #[allow(clippy::cast_possible_truncation)]
    pub fn read<'a>(&self, reg: impl Into<RegRef<'a>>) -> Result<u16> {
        let Register { addr, mask } = self.resolve(reg)?;
        let addr = addr as u16;
        self.fpga.or_bits_u16(SENSOR_SCI_CONTROL, SCI_RW)?;
        self.fpga.write_u16(SENSOR_SCI_ADDRESS, addr)?;
        self.fpga.write_u16(SENSOR_SCI_DATALEN, 2)?;
        self.run(addr)?;
        let value = self.fpga.read_u16(SENSOR_SCI_READ_DATA)?;
        debug!(
            addr = format_args!("{addr:#04x}"),
            value = format_args!("{value:#06x}"),
            "SCI read"
        );
        Ok(match mask {
            Some(mask) => extract_field(value, mask as u16),
            None => value,
        })
    }

    /// Set the run bit and wait for the engine to clear it
    fn run(&self, addr: u16) -> Result<()> {
        self.fpga.or_bits_u16(SENSOR_SCI_CONTROL, SCI_RUN)?;
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.fpga.read_u16(SENSOR_SCI_CONTROL)? & SCI_RUN == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::SensorBusTimeout {
                    addr,
                    timeout: self.timeout,
                });
            }
            std::hint::spin_loop();
        }
    }
}
