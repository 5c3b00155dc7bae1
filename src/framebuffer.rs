//! Access to the camera's frame buffer RAM, which stores pixels as packed 12-bit samples.
//!
//! The sequencer addresses RAM in 32-byte words, while the host sees a flat byte window.
//! Two pixels share three bytes: an even pixel owns its first byte and the low nibble of the
//! second, an odd pixel owns the high nibble of the second and all of the third.
use crate::{
    core::Space,
    observe::{
        notify,
        Observer,
        WriteObserver,
    },
    transport::{
        self,
        Transport,
        TransportResult,
    },
    Result,
};
use paste::paste;
use std::sync::{
    Arc,
    Mutex,
    Weak,
};

/// Bytes per frame buffer word
pub const BYTES_PER_WORD: usize = 32;

/// Bytes needed to hold `pixels` packed samples
#[must_use]
pub const fn packed12_len(pixels: usize) -> usize {
    (pixels * 3 + 1) / 2
}

/// Byte offset of the first byte holding `pixel`, and the bit shift of its sample in that byte
const fn pixel_position(pixel: usize) -> (usize, u32) {
    (pixel * 3 / 2, (pixel as u32 & 1) * 4)
}

fn decode12(lo: u8, hi: u8, shift: u32) -> u16 {
    let (lo, hi) = (u16::from(lo), u16::from(hi));
    if shift == 0 {
        lo | (hi & 0xF) << 8
    } else {
        lo >> 4 | hi << 4
    }
}

/// Decode `pixels` samples from a packed byte slice
#[must_use]
pub fn unpack12(bytes: &[u8], pixels: usize) -> Vec<u16> {
    (0..pixels)
        .map(|p| {
            let (offset, shift) = pixel_position(p);
            decode12(bytes[offset], bytes[offset + 1], shift)
        })
        .collect()
}

/// Merge one sample into the byte pair that holds it, leaving the neighbouring nibble alone
fn merge12(lo: u8, hi: u8, value: u16, shift: u32) -> (u8, u8) {
    let mask_lo = (0xFFu16 - ((0xFF << shift) & 0xFF)) as u8;
    let mask_hi = (0xFFu16 - (0xFFF >> (8 - shift))) as u8;
    let shifted = u32::from(value & 0xFFF) << shift;
    (
        (lo & mask_lo) | (shifted & 0xFF) as u8,
        (hi & mask_hi) | ((shifted >> 8) & 0xFF) as u8,
    )
}

/// Encode `samples` into `bytes`, which must be at least `packed12_len(samples.len())` long.
/// Bytes not covered by a sample keep their contents.
pub fn pack12_into(bytes: &mut [u8], samples: &[u16]) {
    for (p, sample) in samples.iter().enumerate() {
        let (offset, shift) = pixel_position(p);
        let (lo, hi) = merge12(bytes[offset], bytes[offset + 1], *sample, shift);
        bytes[offset] = lo;
        bytes[offset + 1] = hi;
    }
}

/// A handle onto the frame buffer window
#[derive(Debug)]
pub struct FrameBuffer<T> {
    transport: Weak<Mutex<T>>,
    observer: Observer,
}

impl<T> Clone for FrameBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            observer: self.observer.clone(),
        }
    }
}

macro_rules! width_ops {
    ($($num:ty),*) => {
        paste! {
            $(
                /// # Errors
                /// Returns an error on bad transport
                pub fn [<read_ $num>](&self, addr: usize) -> Result<$num> {
                    self.with_transport(|t| t.[<read_ $num>](addr))
                }

                /// # Errors
                /// Returns an error on bad transport
                pub fn [<write_ $num>](&self, addr: usize, value: $num) -> Result<()> {
                    notify(&self.observer, Space::FrameBuffer, addr, <$num>::BITS as u8, u32::from(value));
                    self.with_transport(|t| t.[<write_ $num>](addr, value))
                }
            )*
        }
    };
}

impl<T> FrameBuffer<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(transport: &Arc<Mutex<T>>) -> Self {
        Self {
            transport: Arc::downgrade(transport),
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> TransportResult<R>) -> Result<R> {
        let tarc = self
            .transport
            .upgrade()
            .ok_or(transport::Error::Detached)?;
        let mut transport = tarc.lock().map_err(|_| transport::Error::Poisoned)?;
        Ok(f(&mut *transport)?)
    }

    width_ops!(u8, u16, u32);

    /// Read pixel number `pixel` of the packed image starting at byte `base`
    /// # Errors
    /// Returns an error on bad transport
    pub fn read_pixel12(&self, base: usize, pixel: usize) -> Result<u16> {
        let (offset, shift) = pixel_position(pixel);
        let addr = base + offset;
        Ok(decode12(self.read_u8(addr)?, self.read_u8(addr + 1)?, shift))
    }

    /// Replace pixel number `pixel` of the packed image starting at byte `base`, leaving the
    /// neighbouring pixel's nibble untouched
    /// # Errors
    /// Returns an error on bad transport
    pub fn write_pixel12(&self, base: usize, pixel: usize, value: u16) -> Result<()> {
        let (offset, shift) = pixel_position(pixel);
        let addr = base + offset;
        let (lo, hi) = merge12(self.read_u8(addr)?, self.read_u8(addr + 1)?, value, shift);
        self.write_u8(addr, lo)?;
        self.write_u8(addr + 1, hi)
    }

    /// Read `pixels` packed samples of a frame beginning at frame buffer word `word`
    /// # Errors
    /// Returns an error on bad transport
    pub fn read_frame12(&self, word: usize, pixels: usize) -> Result<Vec<u16>> {
        let len = packed12_len(pixels);
        let bytes = self.with_transport(|t| t.read_n_bytes(word * BYTES_PER_WORD, len))?;
        Ok(unpack12(&bytes, pixels))
    }

    /// Write a frame of samples to frame buffer word `word` in one bulk transfer
    /// # Errors
    /// Returns an error on bad transport
    pub fn write_frame12(&self, word: usize, samples: &[u16]) -> Result<()> {
        let base = word * BYTES_PER_WORD;
        let len = packed12_len(samples.len());
        let mut bytes = vec![0u8; len];
        if samples.len() % 2 == 1 {
            // The last byte's high nibble belongs to whatever follows the frame
            bytes[len - 1] = self.read_u8(base + len - 1)?;
        }
        pack12_into(&mut bytes, samples);
        if self.observer.is_some() {
            for (i, b) in bytes.iter().enumerate() {
                notify(&self.observer, Space::FrameBuffer, base + i, 8, u32::from(*b));
            }
        }
        self.with_transport(|t| t.write_bytes(base, &bytes))
    }
}
