//! Mock transport implementations used in testing the interface

use super::{
    check_access,
    check_span,
    Transport,
    TransportResult,
};
use paste::paste;

/// A flat block of little-endian memory that stands in for a mapped window, useful for testing
#[derive(Debug, Clone)]
pub struct Mock {
    memory: Vec<u8>,
}

impl Mock {
    /// Construct a new zeroed mock window of `len` bytes
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            memory: vec![0u8; len],
        }
    }

    /// The size of the window in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Direct view of the backing memory
    #[must_use]
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Direct mutable view of the backing memory, for preloading test fixtures
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }
}

macro_rules! mock_accessors {
    ($($num:ty),*) => {
        paste! {
            $(
                fn [<read_ $num>](&mut self, addr: usize) -> TransportResult<$num> {
                    const WIDTH: usize = core::mem::size_of::<$num>();
                    check_access(addr, WIDTH, self.memory.len())?;
                    let mut bytes = [0u8; WIDTH];
                    bytes.copy_from_slice(&self.memory[addr..addr + WIDTH]);
                    Ok(<$num>::from_le_bytes(bytes))
                }

                fn [<write_ $num>](&mut self, addr: usize, value: $num) -> TransportResult<()> {
                    const WIDTH: usize = core::mem::size_of::<$num>();
                    check_access(addr, WIDTH, self.memory.len())?;
                    self.memory[addr..addr + WIDTH].copy_from_slice(&value.to_le_bytes());
                    Ok(())
                }
            )*
        }
    };
}

impl Transport for Mock {
    mock_accessors!(u8, u16, u32);

    fn read_n_bytes(&mut self, addr: usize, n: usize) -> TransportResult<Vec<u8>> {
        check_span(addr, n, self.memory.len())?;
        Ok(self.memory[addr..addr + n].to_vec())
    }

    fn write_bytes(&mut self, addr: usize, data: &[u8]) -> TransportResult<()> {
        check_span(addr, data.len(), self.memory.len())?;
        self.memory[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }
}
