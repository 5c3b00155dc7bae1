//! Defines the memory-mapped transports the FPGA register space and the frame buffer are
//! reached through

pub mod emulator;
pub mod local;
pub mod mock;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Access of {len} bytes at {addr:#x} falls outside of the mapped window")]
    OutOfBounds { addr: usize, len: usize },
    #[error("Access of {width} bytes at {addr:#x} is not naturally aligned")]
    Misaligned { addr: usize, width: usize },
    #[error("Values of {0} bytes can't be moved as register words")]
    UnsupportedWidth(usize),
    #[error("Failed to unpack a register layout - {0:?}")]
    Packing(packed_struct::PackingError),
    #[error("The transport behind this handle has been dropped")]
    Detached,
    #[error("The transport lock was poisoned by a panicking thread")]
    Poisoned,
}

pub type TransportResult<T> = Result<T, Error>;

/// Types that implement this trait can be serialized such that they can be written to FPGA
/// registers. The chunk is the register value, most significant byte first.
pub trait Serialize {
    type Chunk;
    fn serialize(&self) -> Self::Chunk;
}

/// Types that implement this trait can be deserialized from FPGA registers
pub trait Deserialize: Sized {
    type Chunk;
    /// # Errors
    /// Returns an error if the chunk doesn't describe a valid value
    fn deserialize(chunk: Self::Chunk) -> TransportResult<Self>;
}

macro_rules! serde_num {
    ($num:ty) => {
        impl Serialize for $num {
            type Chunk = [u8; core::mem::size_of::<$num>()];
            fn serialize(&self) -> Self::Chunk {
                self.to_be_bytes()
            }
        }

        impl Deserialize for $num {
            type Chunk = [u8; core::mem::size_of::<$num>()];
            fn deserialize(chunk: Self::Chunk) -> TransportResult<Self> {
                Ok(<$num>::from_be_bytes(chunk))
            }
        }
    };
}

serde_num!(u8);
serde_num!(u16);
serde_num!(u32);
serde_num!(u64);
serde_num!(i8);
serde_num!(i16);
serde_num!(i32);
serde_num!(i64);

/// The trait implemented by every memory-mapped transport. Addresses are byte offsets into the
/// transport's window and the bus is little-endian, like the ARM host the FPGA hangs off of.
///
/// Width-typed accesses must reach the bus as a single access of that width, as FPGA registers
/// don't tolerate being split into bytes.
pub trait Transport {
    fn read_u8(&mut self, addr: usize) -> TransportResult<u8>;
    fn read_u16(&mut self, addr: usize) -> TransportResult<u16>;
    fn read_u32(&mut self, addr: usize) -> TransportResult<u32>;
    fn write_u8(&mut self, addr: usize, value: u8) -> TransportResult<()>;
    fn write_u16(&mut self, addr: usize, value: u16) -> TransportResult<()>;
    fn write_u32(&mut self, addr: usize, value: u32) -> TransportResult<()>;

    /// Bulk read `n` bytes starting at `addr`
    fn read_n_bytes(&mut self, addr: usize, n: usize) -> TransportResult<Vec<u8>>;

    /// Bulk write `data` starting at `addr`
    fn write_bytes(&mut self, addr: usize, data: &[u8]) -> TransportResult<()>;

    /// Generically read a `Deserialize` type from `addr`. Values wider than a word are read as
    /// consecutive 32-bit words, least significant word at the lowest address.
    /// # Example
    /// ```
    /// # use chronosfpga::transport::{mock::Mock, Transport};
    /// let mut transport = Mock::new(8);
    /// transport.write_u32(0, 0xDEAD_BEEF).unwrap();
    /// let num: u32 = transport.read(0).unwrap();
    /// assert_eq!(num, 0xDEAD_BEEF);
    /// ```
    /// # Errors
    /// Returns an error on bad transport or if the value can't be decoded
    fn read<T, const N: usize>(&mut self, addr: usize) -> TransportResult<T>
    where
        T: Deserialize<Chunk = [u8; N]>,
        Self: Sized,
    {
        let mut chunk = [0u8; N];
        match N {
            1 => chunk.copy_from_slice(&self.read_u8(addr)?.to_be_bytes()),
            2 => chunk.copy_from_slice(&self.read_u16(addr)?.to_be_bytes()),
            n if n % 4 == 0 => {
                let words = n / 4;
                for i in 0..words {
                    // Most significant word lives at the highest address
                    let word = self.read_u32(addr + 4 * (words - 1 - i))?;
                    chunk[4 * i..4 * i + 4].copy_from_slice(&word.to_be_bytes());
                }
            }
            n => return Err(Error::UnsupportedWidth(n)),
        }
        T::deserialize(chunk)
    }

    /// Generically write a `Serialize` type to `addr`. Values wider than a word are written as
    /// consecutive 32-bit words, most significant word first.
    /// # Example
    /// ```
    /// # use chronosfpga::transport::{mock::Mock, Transport};
    /// let mut transport = Mock::new(8);
    /// transport.write(0, &0x0123_4567_89AB_CDEFu64).unwrap();
    /// assert_eq!(transport.read_u32(0).unwrap(), 0x89AB_CDEF);
    /// assert_eq!(transport.read_u32(4).unwrap(), 0x0123_4567);
    /// ```
    /// # Errors
    /// Returns an error on bad transport
    fn write<T, const N: usize>(&mut self, addr: usize, data: &T) -> TransportResult<()>
    where
        T: Serialize<Chunk = [u8; N]>,
        Self: Sized,
    {
        let chunk = data.serialize();
        match N {
            1 => self.write_u8(addr, chunk[0]),
            2 => self.write_u16(addr, u16::from_be_bytes([chunk[0], chunk[1]])),
            n if n % 4 == 0 => {
                let words = n / 4;
                for i in 0..words {
                    let word = u32::from_be_bytes([
                        chunk[4 * i],
                        chunk[4 * i + 1],
                        chunk[4 * i + 2],
                        chunk[4 * i + 3],
                    ]);
                    self.write_u32(addr + 4 * (words - 1 - i), word)?;
                }
                Ok(())
            }
            n => Err(Error::UnsupportedWidth(n)),
        }
    }
}

/// Bounds and alignment checking shared by the transports backed by a contiguous window
pub(crate) fn check_access(addr: usize, width: usize, window: usize) -> TransportResult<()> {
    if addr % width != 0 {
        return Err(Error::Misaligned { addr, width });
    }
    check_span(addr, width, window)
}

pub(crate) fn check_span(addr: usize, len: usize, window: usize) -> TransportResult<()> {
    match addr.checked_add(len) {
        Some(end) if end <= window => Ok(()),
        _ => Err(Error::OutOfBounds { addr, len }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_access() {
        assert!(check_access(4, 4, 8).is_ok());
        assert!(matches!(
            check_access(2, 4, 8),
            Err(Error::Misaligned { addr: 2, width: 4 })
        ));
        assert!(matches!(
            check_access(8, 4, 8),
            Err(Error::OutOfBounds { addr: 8, len: 4 })
        ));
        assert!(matches!(
            check_span(usize::MAX, 2, 8),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
