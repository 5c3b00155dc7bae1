//! The camera as the control layer sees it: one object owning the FPGA and frame buffer
//! transports, the sensor, the record sequencer and the calibration state.
use crate::{
    bias::BiasDac,
    calibration::{
        self,
        CalibrationSettings,
        ColumnCorrection,
        CALIBRATION_FRAMES,
    },
    config::BoardConfig,
    fpga::{
        Fpga,
        FpgaVersion,
    },
    framebuffer::FrameBuffer,
    observe::Observer,
    sci::Sci,
    sensor::{
        ImageConstraints,
        ImageGeometry,
        Lux1310,
        SensorOps,
    },
    sequencer::{
        RecordSettings,
        RecordingRegion,
        Sequencer,
    },
    timing::{
        Committed,
        FrameTiming,
    },
    transport::Transport,
    Error,
    Result,
};
use embedded_hal::{
    digital::OutputPin,
    spi::SpiBus,
};
use std::sync::{
    Arc,
    Mutex,
};
use tracing::info;

/// Everything the camera talks to
#[derive(Debug)]
pub struct CameraIo<T, M, SPI, CS, L> {
    /// The FPGA control window
    pub fpga: T,
    /// The frame buffer window
    pub ram: M,
    /// The bias DAC's bus and chip select
    pub spi: SPI,
    pub dac_cs: CS,
    pub record_leds: Vec<L>,
    /// Installed on every register and frame buffer accessor
    pub observer: Observer,
}

#[derive(Debug)]
pub struct Camera<T, M, SPI, CS, L> {
    pub transport: Arc<Mutex<T>>,
    pub ram: Arc<Mutex<M>>,
    fpga: Fpga<T>,
    frame_buffer: FrameBuffer<M>,
    sensor: Lux1310<T, SPI, CS>,
    sequencer: Sequencer<T, L>,
    region: RecordingRegion,
    ram_words: u64,
    rec_region_start: u32,
    calibration: CalibrationSettings,
}

impl<T, M, SPI, CS, L> Camera<T, M, SPI, CS, L>
where
    T: Transport,
    M: Transport,
    SPI: SpiBus<u8>,
    CS: OutputPin,
    L: OutputPin,
{
    /// Wire up a camera. Nothing is written to the hardware until [`Camera::init`].
    /// # Errors
    /// Returns an error if the configuration has no wavetables
    pub fn new(config: BoardConfig, io: CameraIo<T, M, SPI, CS, L>) -> Result<Self> {
        let catalog = config.wavetable_catalog()?;
        let CameraIo {
            fpga,
            ram,
            spi,
            dac_cs,
            record_leds,
            observer,
        } = io;
        let transport = Arc::new(Mutex::new(fpga));
        let ram = Arc::new(Mutex::new(ram));

        let mut fpga = Fpga::new(&transport, Arc::new(config.registers));
        let mut frame_buffer = FrameBuffer::new(&ram);
        if let Some(obs) = &observer {
            fpga = fpga.with_observer(obs.clone());
            frame_buffer = frame_buffer.with_observer(obs.clone());
        }
        let mut sci = Sci::new(
            fpga.clone(),
            Arc::new(config.sensor_registers),
            config.sci_timeout,
        );
        if let Some(obs) = observer {
            sci = sci.with_observer(obs);
        }

        let sensor = Lux1310::new(
            fpga.clone(),
            sci,
            BiasDac::new(spi, dac_cs),
            catalog,
            config.gains,
        );
        let max = sensor.limits().max_geometry();
        let region = RecordingRegion::new(
            max.h_res,
            max.v_res,
            config.ram_words,
            config.rec_region_start,
        );
        Ok(Self {
            sequencer: Sequencer::new(fpga.clone(), record_leds),
            transport,
            ram,
            fpga,
            frame_buffer,
            sensor,
            region,
            ram_words: config.ram_words,
            rec_region_start: config.rec_region_start,
            calibration: CalibrationSettings {
                frames: CALIBRATION_FRAMES,
                timeout: config.sequencer_timeout,
                interval: config.sequencer_poll_interval,
            },
        })
    }

    /// Power up and configure the sensor at full resolution
    /// # Errors
    /// Returns an error on bus failure or a sensor bus timeout
    pub fn init(&mut self) -> Result<()> {
        self.sensor.init()?;
        self.update_region();
        let version = self.fpga_version()?;
        info!(%version, region = ?self.region, "Camera initialized");
        Ok(())
    }

    fn update_region(&mut self) {
        let ImageGeometry { h_res, v_res, .. } = *self.sensor.geometry();
        self.region = RecordingRegion::new(h_res, v_res, self.ram_words, self.rec_region_start);
    }

    fn check_idle(&self) -> Result<()> {
        if self.sequencer.is_recording() {
            Err(Error::AlreadyRecording)
        } else {
            Ok(())
        }
    }

    /// Change the sensor window. The recording region is resized to match.
    /// # Errors
    /// Returns an error if recording, if the geometry is invalid (nothing is changed), or on
    /// bus failure
    pub fn set_resolution(&mut self, geometry: ImageGeometry) -> Result<()> {
        self.check_idle()?;
        self.sensor.set_resolution(geometry)?;
        self.update_region();
        Ok(())
    }

    /// # Errors
    /// Returns an error on bus failure
    pub fn set_frame_period(&mut self, period_ns: u64) -> Result<Committed<u64>> {
        self.sensor.set_frame_period(period_ns)
    }

    /// # Errors
    /// Returns an error on bus failure
    pub fn set_exposure(&mut self, exposure_ns: u64) -> Result<Committed<u64>> {
        self.sensor.set_exposure(exposure_ns)
    }

    /// # Errors
    /// Returns an error on bus failure
    pub fn set_gain(&mut self, db: i32) -> Result<Committed<i32>> {
        self.sensor.set_gain(db)
    }

    /// # Errors
    /// Returns an error if already recording, in playback, on invalid mode parameters, or on
    /// bus failure
    pub fn start_recording(&mut self, settings: &RecordSettings) -> Result<()> {
        self.sequencer.start(settings, &self.region)
    }

    /// # Errors
    /// Returns an error if not recording, in playback, or on bus failure
    pub fn stop_recording(&mut self) -> Result<()> {
        self.sequencer.stop()
    }

    /// Whether a recording is still running, noticing ones the sequencer ended itself
    /// # Errors
    /// Returns an error on bus failure
    pub fn poll_recording(&mut self) -> Result<bool> {
        self.sequencer.poll_recording()
    }

    /// Black-level calibrate at the current geometry. Cap the lens first.
    /// # Errors
    /// Returns an error if recording, in playback, if the capture times out, or on bus failure
    pub fn run_calibration(&mut self) -> Result<ColumnCorrection> {
        let geometry = *self.sensor.geometry();
        calibration::run_calibration(
            &self.fpga,
            &self.frame_buffer,
            &mut self.sequencer,
            &geometry,
            &self.region,
            &self.calibration,
        )
    }

    pub fn set_playback_mode(&mut self, playback: bool) {
        self.sequencer.set_playback_mode(playback);
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.sequencer.is_recording()
    }

    #[must_use]
    pub fn timing(&self) -> &FrameTiming {
        self.sensor.timing()
    }

    #[must_use]
    pub fn geometry(&self) -> &ImageGeometry {
        self.sensor.geometry()
    }

    #[must_use]
    pub fn constraints(&self, geometry: &ImageGeometry) -> ImageConstraints {
        self.sensor.constraints(geometry)
    }

    #[must_use]
    pub fn recording_region(&self) -> &RecordingRegion {
        &self.region
    }

    /// # Errors
    /// Returns an error on bus failure
    pub fn fpga_version(&self) -> Result<FpgaVersion> {
        self.fpga.version()
    }

    #[must_use]
    pub fn fpga(&self) -> &Fpga<T> {
        &self.fpga
    }

    #[must_use]
    pub fn frame_buffer(&self) -> &FrameBuffer<M> {
        &self.frame_buffer
    }

    #[must_use]
    pub fn sensor(&self) -> &Lux1310<T, SPI, CS> {
        &self.sensor
    }
}
