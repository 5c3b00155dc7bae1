//! Black-level calibration: capture a short burst with the lens capped, average it, and derive
//! per-column offsets plus a fixed-pattern-noise frame for the FPGA's live correction.
use crate::{
    fpga::Fpga,
    framebuffer::FrameBuffer,
    regmap::fpga::{
        COL_CURVE_MEM,
        COL_GAIN_MEM,
        COL_OFFSET_MEM,
    },
    sensor::{
        GeometryError,
        ImageGeometry,
    },
    sequencer::{
        RecordMode,
        RecordSettings,
        RecordingRegion,
        Sequencer,
    },
    transport::Transport,
    Result,
};
use embedded_hal::digital::OutputPin;
use fixed::types::{
    I11F21,
    U4F12,
};
use std::{
    ops::{
        Deref,
        DerefMut,
    },
    time::Duration,
};
use tracing::{
    info,
    warn,
};

/// Frames averaged per calibration run
pub const CALIBRATION_FRAMES: u32 = 16;

/// Bytes per entry in the column coefficient memories
const COLUMN_STRIDE: usize = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CalibrationSettings {
    pub frames: u32,
    /// How long the capture may take before it's abandoned
    pub timeout: Duration,
    /// Sequencer status poll interval
    pub interval: Duration,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            frames: CALIBRATION_FRAMES,
            timeout: Duration::from_secs(2),
            interval: Duration::from_millis(5),
        }
    }
}

/// Per-column correction coefficients, as applied by the FPGA
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCorrection {
    pub gain: Vec<f64>,
    /// Quadratic term
    pub linearity: Vec<f64>,
    /// Black level subtracted from each column
    pub offset: Vec<i16>,
}

fn column_addr<T: Transport>(fpga: &Fpga<T>, table: &str, column: usize) -> Result<usize> {
    Ok(fpga.resolve(table)?.addr + COLUMN_STRIDE * column)
}

/// Unity gain and no curvature on the first `columns` columns
/// # Errors
/// Returns an error on bad transport
pub fn load_identity_gains<T: Transport>(fpga: &Fpga<T>, columns: usize) -> Result<()> {
    let unity = U4F12::from_num(1).to_bits();
    for col in 0..columns {
        fpga.write_u16(column_addr(fpga, COL_GAIN_MEM, col)?, unity)?;
        fpga.write_u16(column_addr(fpga, COL_CURVE_MEM, col)?, 0)?;
    }
    Ok(())
}

/// Read back the gain and linearity coefficients of the first `columns` columns
/// # Errors
/// Returns an error on bad transport
pub fn read_coefficients<T: Transport>(
    fpga: &Fpga<T>,
    columns: usize,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut gain = Vec::with_capacity(columns);
    let mut linearity = Vec::with_capacity(columns);
    for col in 0..columns {
        let g = fpga.read_u16(column_addr(fpga, COL_GAIN_MEM, col)?)?;
        gain.push(U4F12::from_bits(g).to_num::<f64>());
        // Linearity is a 16-bit signed word with 21 fractional bits
        let l = fpga.read_u16(column_addr(fpga, COL_CURVE_MEM, col)?)?;
        let l = I11F21::from_bits(i32::from(l as i16));
        linearity.push(l.to_num::<f64>());
    }
    Ok((gain, linearity))
}

/// A recording that is stopped when this goes out of scope, however that happens
pub struct RecordingGuard<'a, T, L>
where
    T: Transport,
    L: OutputPin,
{
    seq: &'a mut Sequencer<T, L>,
}

impl<'a, T, L> RecordingGuard<'a, T, L>
where
    T: Transport,
    L: OutputPin,
{
    /// # Errors
    /// Returns an error if the recording couldn't be started
    pub fn start(
        seq: &'a mut Sequencer<T, L>,
        settings: &RecordSettings,
        region: &RecordingRegion,
    ) -> Result<Self> {
        seq.start(settings, region)?;
        Ok(Self { seq })
    }
}

impl<T, L> Deref for RecordingGuard<'_, T, L>
where
    T: Transport,
    L: OutputPin,
{
    type Target = Sequencer<T, L>;

    fn deref(&self) -> &Self::Target {
        self.seq
    }
}

impl<T, L> DerefMut for RecordingGuard<'_, T, L>
where
    T: Transport,
    L: OutputPin,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.seq
    }
}

impl<T, L> Drop for RecordingGuard<'_, T, L>
where
    T: Transport,
    L: OutputPin,
{
    fn drop(&mut self) {
        let unfinished = self.seq.is_recording();
        match self.seq.force_stop() {
            Ok(()) if unfinished => warn!("Stopped a recording that was abandoned mid-capture"),
            Ok(()) => (),
            Err(e) => warn!("Couldn't stop the sequencer - {e}"),
        }
    }
}

/// Capture `settings.frames` frames of `geometry` into `region`, derive the column offsets
/// and FPN frame from their average, and load both into the FPGA.
///
/// The sequencer is always left stopped, whether or not the capture finished. Recorded frames
/// have their rows back to back, so `geometry` must not be padded.
/// # Errors
/// Returns an error if `geometry` has a stride wider than its rows, if recording or in
/// playback, if the capture doesn't finish within `settings.timeout`, or on bad transport
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn run_calibration<T, M, L>(
    fpga: &Fpga<T>,
    frame_buffer: &FrameBuffer<M>,
    seq: &mut Sequencer<T, L>,
    geometry: &ImageGeometry,
    region: &RecordingRegion,
    settings: &CalibrationSettings,
) -> Result<ColumnCorrection>
where
    T: Transport,
    M: Transport,
    L: OutputPin,
{
    if geometry.stride != geometry.h_res {
        return Err(GeometryError::PaddedStride {
            stride: geometry.stride,
            h_res: geometry.h_res,
        }
        .into());
    }
    let record = RecordSettings {
        mode: RecordMode::SingleBlock {
            frames: settings.frames,
        },
        disable_ring_buffer: true,
    };
    {
        let mut capture = RecordingGuard::start(seq, &record, region)?;
        capture.wait_idle(settings.timeout, settings.interval)?;
    }

    let pixels = geometry.pixels();
    let columns = geometry.h_res as usize;
    let mut image = vec![0f64; pixels];
    for i in 0..settings.frames as usize {
        let word = region.start_word as usize + region.frame_size_words as usize * i;
        let frame = frame_buffer.read_frame12(word, pixels)?;
        for (acc, sample) in image.iter_mut().zip(frame) {
            *acc += f64::from(sample);
        }
    }
    let frames = f64::from(settings.frames);
    for px in &mut image {
        *px /= frames;
    }

    let (gain, linearity) = read_coefficients(fpga, columns)?;
    let corrected: Vec<f64> = image
        .iter()
        .enumerate()
        .map(|(i, &px)| {
            let col = i % columns;
            linearity[col] * px * px + gain[col] * px
        })
        .collect();

    let rows = (pixels / columns).max(1) as f64;
    let mut column_sum = vec![0f64; columns];
    for (i, &px) in corrected.iter().enumerate() {
        column_sum[i % columns] += px;
    }
    let offset: Vec<i16> = column_sum.iter().map(|sum| (sum / rows) as i16).collect();

    let fpn: Vec<u16> = corrected
        .iter()
        .enumerate()
        .map(|(i, &px)| (px as i16).wrapping_sub(offset[i % columns]) as u16)
        .collect();
    frame_buffer.write_frame12(0, &fpn)?;

    for (col, off) in offset.iter().enumerate() {
        fpga.write_u16(column_addr(fpga, COL_OFFSET_MEM, col)?, off.wrapping_neg() as u16)?;
    }

    let mean = offset.iter().map(|&o| f64::from(o)).sum::<f64>() / columns.max(1) as f64;
    info!(
        frames = settings.frames,
        columns,
        mean_offset = mean,
        "Black calibration loaded"
    );
    Ok(ColumnCorrection {
        gain,
        linearity,
        offset,
    })
}
