//! Named and raw access to the FPGA's memory-mapped register space
use crate::{
    bits::{
        extract_field,
        replace_field,
    },
    core::{
        resolve,
        RegRef,
        Register,
        RegisterMap,
        Space,
    },
    observe::{
        notify,
        Observer,
        WriteObserver,
    },
    regmap::fpga::{
        FPGA_SUBVERSION,
        FPGA_VERSION,
    },
    transport::{
        self,
        Deserialize,
        Serialize,
        Transport,
        TransportResult,
    },
    Error,
    Result,
};
use paste::paste;
use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        Weak,
    },
};

/// A handle onto the FPGA register space.
///
/// Every access resolves its register, locks the shared transport, and performs exactly one
/// bus operation. Composite operations like [`Fpga::or_bits_u16`] take the lock once per bus
/// operation, so they are only safe with a single writer.
#[derive(Debug)]
pub struct Fpga<T> {
    /// Upwards pointer to the owner's transport
    transport: Weak<Mutex<T>>,
    registers: Arc<RegisterMap>,
    observer: Observer,
}

impl<T> Clone for Fpga<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            registers: self.registers.clone(),
            observer: self.observer.clone(),
        }
    }
}

/// The FPGA image version registers
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FpgaVersion {
    pub version: u16,
    pub subversion: u16,
}

impl fmt::Display for FpgaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.version, self.subversion)
    }
}

macro_rules! width_ops {
    ($($num:ty),*) => {
        paste! {
            $(
                #[doc = "Read a `" $num "` from a named register or raw address"]
                /// # Errors
                /// Returns an error on unknown names or bad transport
                pub fn [<read_ $num>]<'a>(&self, reg: impl Into<RegRef<'a>>) -> Result<$num> {
                    let Register { addr, .. } = self.resolve(reg)?;
                    self.with_transport(|t| t.[<read_ $num>](addr))
                }

                #[doc = "Write a `" $num "` to a named register or raw address"]
                /// # Errors
                /// Returns an error on unknown names or bad transport
                pub fn [<write_ $num>]<'a>(&self, reg: impl Into<RegRef<'a>>, value: $num) -> Result<()> {
                    let Register { addr, .. } = self.resolve(reg)?;
                    notify(&self.observer, Space::Fpga, addr, <$num>::BITS as u8, u32::from(value));
                    self.with_transport(|t| t.[<write_ $num>](addr, value))
                }

                /// Read, AND with `mask`, and write back
                /// # Errors
                /// Returns an error on unknown names or bad transport
                pub fn [<and_bits_ $num>]<'a>(&self, reg: impl Into<RegRef<'a>>, mask: $num) -> Result<()> {
                    let reg = RegRef::Addr(self.resolve(reg)?.addr);
                    let value = self.[<read_ $num>](reg)?;
                    self.[<write_ $num>](reg, value & mask)
                }

                /// Read, OR with `mask`, and write back
                /// # Errors
                /// Returns an error on unknown names or bad transport
                pub fn [<or_bits_ $num>]<'a>(&self, reg: impl Into<RegRef<'a>>, mask: $num) -> Result<()> {
                    let reg = RegRef::Addr(self.resolve(reg)?.addr);
                    let value = self.[<read_ $num>](reg)?;
                    self.[<write_ $num>](reg, value | mask)
                }

                /// Read the bit-field of a masked named register
                /// # Errors
                /// Returns an error on unknown names, registers without a mask, or bad transport
                #[allow(clippy::cast_possible_truncation)]
                pub fn [<read_field_ $num>](&self, name: &str) -> Result<$num> {
                    let (addr, mask) = self.field(name)?;
                    let value = self.[<read_ $num>](addr)?;
                    Ok(extract_field(value, mask as $num))
                }

                /// Read-modify-write the bit-field of a masked named register
                /// # Errors
                /// Returns an error on unknown names, registers without a mask, or bad transport
                #[allow(clippy::cast_possible_truncation)]
                pub fn [<write_field_ $num>](&self, name: &str, field: $num) -> Result<()> {
                    let (addr, mask) = self.field(name)?;
                    let value = self.[<read_ $num>](addr)?;
                    self.[<write_ $num>](addr, replace_field(value, field, mask as $num))
                }
            )*
        }
    };
}

impl<T> Fpga<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(transport: &Arc<Mutex<T>>, registers: Arc<RegisterMap>) -> Self {
        Self {
            transport: Arc::downgrade(transport),
            registers,
            observer: None,
        }
    }

    /// Install a hook that sees every write this handle makes
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterMap {
        &self.registers
    }

    /// Look up a register, passing raw addresses through
    /// # Errors
    /// Returns an error if a symbolic name isn't in the map
    pub fn resolve<'a>(&self, reg: impl Into<RegRef<'a>>) -> Result<Register> {
        resolve(&self.registers, Space::Fpga, reg.into())
    }

    fn field(&self, name: &str) -> Result<(RegRef<'static>, u32)> {
        let reg = self.resolve(name)?;
        let mask = reg
            .mask
            .ok_or_else(|| Error::MissingMask(name.to_owned()))?;
        Ok((RegRef::Addr(reg.addr), mask))
    }

    /// Run `f` with the locked transport
    pub(crate) fn with_transport<R>(
        &self,
        f: impl FnOnce(&mut T) -> TransportResult<R>,
    ) -> Result<R> {
        let tarc = self
            .transport
            .upgrade()
            .ok_or(transport::Error::Detached)?;
        let mut transport = tarc.lock().map_err(|_| transport::Error::Poisoned)?;
        Ok(f(&mut *transport)?)
    }

    width_ops!(u8, u16, u32);

    /// Generically read a register layout from a named register or raw address
    /// # Errors
    /// Returns an error on unknown names, bad transport, or an invalid layout
    pub fn read<'a, D, const N: usize>(&self, reg: impl Into<RegRef<'a>>) -> Result<D>
    where
        D: Deserialize<Chunk = [u8; N]>,
    {
        let Register { addr, .. } = self.resolve(reg)?;
        self.with_transport(|t| t.read(addr))
    }

    /// Generically write a register layout to a named register or raw address
    /// # Errors
    /// Returns an error on unknown names or bad transport
    pub fn write<'a, S, const N: usize>(&self, reg: impl Into<RegRef<'a>>, data: &S) -> Result<()>
    where
        S: Serialize<Chunk = [u8; N]>,
    {
        let Register { addr, .. } = self.resolve(reg)?;
        if self.observer.is_some() {
            let chunk = data.serialize();
            for (i, word) in chunk.rchunks(4).enumerate() {
                let value = word.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
                notify(&self.observer, Space::Fpga, addr + 4 * i, 32, value);
            }
        }
        self.with_transport(|t| t.write(addr, data))
    }

    /// Read the FPGA image version
    /// # Errors
    /// Returns an error on bad transport
    pub fn version(&self) -> Result<FpgaVersion> {
        Ok(FpgaVersion {
            version: self.read_u16(FPGA_VERSION)?,
            subversion: self.read_u16(FPGA_SUBVERSION)?,
        })
    }
}
