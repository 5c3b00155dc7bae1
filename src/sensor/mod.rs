//! Image sensor models.
//!
//! A sensor is a plain [`SensorLimits`] description composed into a concrete type that
//! implements [`SensorOps`], which is all the camera needs to drive it.
pub mod lux1310;

pub use lux1310::Lux1310;

use crate::{
    timing::{
        Committed,
        FrameTiming,
    },
    Result,
};
use thiserror::Error;

/// Physical capabilities of a sensor
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SensorLimits {
    pub h_max: u32,
    pub h_min: u32,
    pub v_max: u32,
    pub v_min: u32,
    /// Horizontal resolution and offset step, in pixels
    pub h_increment: u32,
    /// Vertical resolution and offset step, in rows
    pub v_increment: u32,
    /// Parallel ADC channels, so pixels per row clock
    pub adc_count: u32,
    /// Pixels per second at full speed
    pub pixel_rate: u64,
    /// Dark columns to the left of the active area
    pub black_columns: u32,
    pub sensor_clock_hz: u64,
    pub timing_clock_hz: u64,
}

impl SensorLimits {
    pub const LUX1310: Self = Self {
        h_max: 1280,
        h_min: 192,
        v_max: 1024,
        v_min: 96,
        h_increment: 16,
        v_increment: 2,
        adc_count: 16,
        pixel_rate: 1_440_000_000,
        black_columns: 16,
        sensor_clock_hz: 90_000_000,
        timing_clock_hz: 100_000_000,
    };

    /// The full active area
    #[must_use]
    pub fn max_geometry(&self) -> ImageGeometry {
        ImageGeometry::new(self.h_max, self.v_max, 0, 0)
    }

    /// Check a geometry against these limits
    /// # Errors
    /// Returns the first rule `geometry` breaks
    pub fn validate(&self, g: &ImageGeometry) -> std::result::Result<(), GeometryError> {
        if g.h_res < self.h_min || g.h_res > self.h_max {
            return Err(GeometryError::HResRange(g.h_res));
        }
        if g.v_res < self.v_min || g.v_res > self.v_max {
            return Err(GeometryError::VResRange(g.v_res));
        }
        if g.h_res % self.h_increment != 0 {
            return Err(GeometryError::HResIncrement(g.h_res));
        }
        if g.v_res % self.v_increment != 0 {
            return Err(GeometryError::VResIncrement(g.v_res));
        }
        if g.h_offset % self.h_increment != 0 {
            return Err(GeometryError::HOffsetIncrement(g.h_offset));
        }
        if g.v_offset % self.v_increment != 0 {
            return Err(GeometryError::VOffsetIncrement(g.v_offset));
        }
        if u64::from(g.h_res) + u64::from(g.h_offset) > u64::from(self.h_max) {
            return Err(GeometryError::Width {
                h_res: g.h_res,
                h_offset: g.h_offset,
            });
        }
        if u64::from(g.v_res) + u64::from(g.v_offset) > u64::from(self.v_max) {
            return Err(GeometryError::Height {
                v_res: g.v_res,
                v_offset: g.v_offset,
            });
        }
        if g.stride < g.h_res {
            return Err(GeometryError::Stride {
                stride: g.stride,
                h_res: g.h_res,
            });
        }
        Ok(())
    }
}

/// The window of the sensor being read out
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageGeometry {
    pub h_res: u32,
    pub v_res: u32,
    pub h_offset: u32,
    pub v_offset: u32,
    /// Pixels between the starts of consecutive rows in memory
    pub stride: u32,
}

impl ImageGeometry {
    /// A window with rows packed back to back
    #[must_use]
    pub fn new(h_res: u32, v_res: u32, h_offset: u32, v_offset: u32) -> Self {
        Self {
            h_res,
            v_res,
            h_offset,
            v_offset,
            stride: h_res,
        }
    }

    #[must_use]
    pub fn pixels(&self) -> usize {
        self.h_res as usize * self.v_res as usize
    }
}

#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Horizontal resolution {0} is out of range")]
    HResRange(u32),
    #[error("Vertical resolution {0} is out of range")]
    VResRange(u32),
    #[error("Horizontal resolution {0} is not a multiple of the increment")]
    HResIncrement(u32),
    #[error("Vertical resolution {0} is not a multiple of the increment")]
    VResIncrement(u32),
    #[error("Horizontal offset {0} is not a multiple of the increment")]
    HOffsetIncrement(u32),
    #[error("Vertical offset {0} is not a multiple of the increment")]
    VOffsetIncrement(u32),
    #[error("A window {h_res} wide at offset {h_offset} runs off the sensor")]
    Width { h_res: u32, h_offset: u32 },
    #[error("A window {v_res} high at offset {v_offset} runs off the sensor")]
    Height { v_res: u32, v_offset: u32 },
    #[error("Stride {stride} is narrower than the {h_res} pixel rows")]
    Stride { stride: u32, h_res: u32 },
    #[error("Stride {stride} pads the {h_res} pixel rows, recorded frames are unpadded")]
    PaddedStride { stride: u32, h_res: u32 },
}

/// Timing bounds for a geometry, in timing ticks
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageConstraints {
    pub min_period: u32,
    pub max_period: u32,
    pub min_exposure: u32,
    /// Longest exposure at the current frame period
    pub max_exposure: u32,
    /// Ticks between frame start and exposure start
    pub exposure_delay: u32,
    /// The exposure step, one row period, in sensor clocks
    pub quantization: u32,
}

/// What the camera needs from an image sensor
pub trait SensorOps {
    fn limits(&self) -> &SensorLimits;

    /// # Errors
    /// Returns the first rule `geometry` breaks
    fn validate_geometry(
        &self,
        geometry: &ImageGeometry,
    ) -> std::result::Result<(), GeometryError> {
        self.limits().validate(geometry)
    }

    fn geometry(&self) -> &ImageGeometry;

    /// Reprogram the readout window, then refit the frame period and exposure to it
    /// # Errors
    /// Returns an error, changing nothing, if the geometry is invalid, or on bus failure
    fn set_resolution(&mut self, geometry: ImageGeometry) -> Result<()>;

    /// Set the frame period, clamped to what the current geometry allows. Returns the
    /// committed period in nanoseconds.
    /// # Errors
    /// Returns an error on bus failure
    fn set_frame_period(&mut self, period_ns: u64) -> Result<Committed<u64>>;

    /// Set the exposure, in whole rows within the current frame period. Returns the
    /// committed exposure in nanoseconds.
    /// # Errors
    /// Returns an error on bus failure
    fn set_exposure(&mut self, exposure_ns: u64) -> Result<Committed<u64>>;

    /// Switch to the nearest supported analog gain, returning it in dB
    /// # Errors
    /// Returns an error on bus failure
    fn set_gain(&mut self, db: i32) -> Result<Committed<i32>>;

    fn constraints(&self, geometry: &ImageGeometry) -> ImageConstraints;

    fn timing(&self) -> &FrameTiming;
}

#[cfg(test)]
mod tests {
    use super::*;

    const L: SensorLimits = SensorLimits::LUX1310;

    #[test]
    fn test_valid_geometries() {
        for h in (192..=1280).step_by(16) {
            for v in (96..=1024).step_by(34) {
                let g = ImageGeometry::new(h, v, (1280 - h) / 32 * 16, (1024 - v) / 4 * 2);
                assert_eq!(L.validate(&g), Ok(()), "{g:?}");
            }
        }
    }

    #[test]
    fn test_invalid_geometries() {
        let cases = [
            (ImageGeometry::new(100, 96, 0, 0), GeometryError::HResRange(100)),
            (ImageGeometry::new(1296, 96, 0, 0), GeometryError::HResRange(1296)),
            (ImageGeometry::new(1280, 94, 0, 0), GeometryError::VResRange(94)),
            (ImageGeometry::new(200, 96, 0, 0), GeometryError::HResIncrement(200)),
            (ImageGeometry::new(192, 97, 0, 0), GeometryError::VResIncrement(97)),
            (ImageGeometry::new(192, 96, 8, 0), GeometryError::HOffsetIncrement(8)),
            (ImageGeometry::new(192, 96, 0, 3), GeometryError::VOffsetIncrement(3)),
            (
                ImageGeometry::new(1280, 96, 16, 0),
                GeometryError::Width {
                    h_res: 1280,
                    h_offset: 16,
                },
            ),
            (
                ImageGeometry::new(192, 1024, 0, 2),
                GeometryError::Height {
                    v_res: 1024,
                    v_offset: 2,
                },
            ),
            (
                ImageGeometry {
                    stride: 176,
                    ..ImageGeometry::new(192, 96, 0, 0)
                },
                GeometryError::Stride {
                    stride: 176,
                    h_res: 192,
                },
            ),
        ];
        for (g, err) in cases {
            assert_eq!(L.validate(&g), Err(err));
        }
    }
}
