//! "Local" transport where we have access to the `/dev/mem` mapped FPGA bus

use super::{
    check_access,
    check_span,
    Transport,
    TransportResult,
};
use chronos_utils::board::Window;
use memmap2::{
    MmapMut,
    MmapOptions,
};
use nix::libc::O_SYNC;
use paste::paste;
use std::{
    fs::File,
    os::unix::fs::OpenOptionsExt,
    path::Path,
};
use tracing::info;

#[derive(Debug)]
/// A local connection to one physical window of the FPGA bus via `/dev/mem`
pub struct Local {
    mem: MmapMut,
    window: Window,
}

impl Local {
    /// Map `window` out of `/dev/mem`.
    ///
    /// Note: This requires the permissions to open `/dev/mem` for writing
    /// # Errors
    /// Returns errors on file IO errors
    pub fn new(window: Window) -> TransportResult<Self> {
        Self::with_device("/dev/mem", window)
    }

    /// Map `window` out of an arbitrary memory device, such as a UIO node
    /// # Errors
    /// Returns errors on file IO errors
    pub fn with_device<P: AsRef<Path>>(device: P, window: Window) -> TransportResult<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .custom_flags(O_SYNC)
            .open(device.as_ref())?;
        // Safety: the mapping is device memory, nothing else in this process aliases it
        let mem = unsafe {
            MmapOptions::new()
                .len(window.len)
                .offset(window.base)
                .map_mut(&file)?
        };
        info!(
            device = %device.as_ref().display(),
            base = format_args!("{:#x}", window.base),
            len = window.len,
            "Mapped physical memory window"
        );
        Ok(Self { mem, window })
    }

    /// The physical window this transport covers
    #[must_use]
    pub fn window(&self) -> Window {
        self.window
    }
}

macro_rules! volatile_accessors {
    ($($num:ty),*) => {
        paste! {
            $(
                fn [<read_ $num>](&mut self, addr: usize) -> TransportResult<$num> {
                    check_access(addr, core::mem::size_of::<$num>(), self.mem.len())?;
                    // Safety: bounds and natural alignment were checked above
                    Ok(unsafe { self.mem.as_ptr().add(addr).cast::<$num>().read_volatile() })
                }

                fn [<write_ $num>](&mut self, addr: usize, value: $num) -> TransportResult<()> {
                    check_access(addr, core::mem::size_of::<$num>(), self.mem.len())?;
                    // Safety: bounds and natural alignment were checked above
                    unsafe {
                        self.mem
                            .as_mut_ptr()
                            .add(addr)
                            .cast::<$num>()
                            .write_volatile(value);
                    }
                    Ok(())
                }
            )*
        }
    };
}

impl Transport for Local {
    volatile_accessors!(u8, u16, u32);

    fn read_n_bytes(&mut self, addr: usize, n: usize) -> TransportResult<Vec<u8>> {
        check_span(addr, n, self.mem.len())?;
        Ok(self.mem[addr..addr + n].to_vec())
    }

    fn write_bytes(&mut self, addr: usize, data: &[u8]) -> TransportResult<()> {
        check_span(addr, data.len(), self.mem.len())?;
        self.mem[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }
}
