//! The Luxima LUX1310 1.3 MP high-speed image sensor
use super::{
    GeometryError,
    ImageConstraints,
    ImageGeometry,
    SensorLimits,
    SensorOps,
};
use crate::{
    bias::{
        BiasDac,
        BiasVoltages,
        GainSetting,
        GainTable,
    },
    calibration::load_identity_gains,
    fpga::Fpga,
    regmap::{
        fpga::{
            IMAGER_FRAME_PERIOD,
            IMAGER_INT_TIME,
            IMAGE_SENSOR_RESET,
            SENSOR_CLK_PHASE,
            SENSOR_LINE_PERIOD,
            SENSOR_MAGIC_START_DELAY,
        },
        lux1310::*,
    },
    sci::Sci,
    timing::{
        Committed,
        ExposurePlan,
        FrameTiming,
        PeriodPlan,
        TimingEngine,
        TimingParams,
        WavetableCatalog,
    },
    transport::Transport,
    Error,
    Result,
};
use embedded_hal::{
    digital::OutputPin,
    spi::SpiBus,
};
use std::time::Duration;
use tracing::{
    debug,
    info,
    warn,
};

/// Time for the bias rails to settle before the sensor comes out of reset
const BIAS_SETTLE: Duration = Duration::from_millis(10);
const RESET_SETTLE: Duration = Duration::from_millis(1);

/// Test pattern and blanking setup used while the LVDS clock phase is trained
const PATTERN_SETUP: [(&str, u16); 6] = [
    (CUST_PAT, 0x0FC0),
    (TST_PAT, 2),
    (PCLK_VBLANK, 0x0FC0),
    (DAC_ILV, 0x00E1),
    (RDOUT_DLY, 80),
    (WAVETAB_SIZE, 80),
];

/// Analog and state machine configuration, as (register, value)
const STATIC_CONFIG: [(&str, u16); 9] = [
    (PCLK_VBLANK, 0x0F00),
    (TST_PAT, 0),
    (LINE_VALID_DLY, 7),
    (STATE_IDLE_CTRL0, 0xE08E),
    (STATE_IDLE_CTRL1, 0xFC1F),
    (STATE_IDLE_CTRL2, 0x0003),
    (ADC_CLOCK_CTRL, 0x2202),
    (SEL_VCM, 0x4B76),
    (INT_CLK_TIMING, 0x041F),
];

/// Rev-dependent LVDS receiver termination and tuning words
fn rev_tuning(rev: u16) -> (u16, u16) {
    if rev == 2 {
        (0x307F, 0x3007)
    } else {
        (0x301F, 0x3001)
    }
}

pub struct Lux1310<T, SPI, CS> {
    limits: SensorLimits,
    fpga: Fpga<T>,
    sci: Sci<T>,
    dac: BiasDac<SPI, CS>,
    engine: TimingEngine,
    gains: GainTable,
    voltages: BiasVoltages,
    geometry: ImageGeometry,
    gain: Option<GainSetting>,
}

impl<T, SPI, CS> std::fmt::Debug for Lux1310<T, SPI, CS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lux1310")
            .field("geometry", &self.geometry)
            .field("timing", self.engine.timing())
            .field("gain", &self.gain.map(|g| g.db))
            .finish_non_exhaustive()
    }
}

impl<T, SPI, CS> Lux1310<T, SPI, CS>
where
    T: Transport,
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    pub fn new(
        fpga: Fpga<T>,
        sci: Sci<T>,
        dac: BiasDac<SPI, CS>,
        catalog: WavetableCatalog,
        gains: GainTable,
    ) -> Self {
        let limits = SensorLimits::LUX1310;
        Self {
            limits,
            fpga,
            sci,
            dac,
            engine: TimingEngine::new(TimingParams::LUX1310, catalog),
            gains,
            voltages: BiasVoltages::default(),
            geometry: limits.max_geometry(),
            gain: None,
        }
    }

    #[must_use]
    pub fn with_voltages(mut self, voltages: BiasVoltages) -> Self {
        self.voltages = voltages;
        self
    }

    #[must_use]
    pub fn sci(&self) -> &Sci<T> {
        &self.sci
    }

    #[must_use]
    pub fn gain_table(&self) -> &GainTable {
        &self.gains
    }

    /// Gain step currently programmed, in dB
    #[must_use]
    pub fn gain(&self) -> Option<i32> {
        self.gain.map(|g| g.db)
    }

    /// Bring the sensor up from power on: bias rails, reset, static configuration, rev
    /// tuning, ADC offsets, default gain, the largest wavetable and full-resolution timing
    /// # Errors
    /// Returns an error on bus failure or sensor bus timeout
    pub fn init(&mut self) -> Result<()> {
        self.dac.write_voltages(&self.voltages)?;
        std::thread::sleep(BIAS_SETTLE);

        self.fpga.write_field_u16(IMAGE_SENSOR_RESET, 1)?;
        self.fpga.write_field_u16(IMAGE_SENSOR_RESET, 0)?;
        std::thread::sleep(RESET_SETTLE);

        for (reg, value) in PATTERN_SETUP {
            self.sci.write(reg, value)?;
        }
        for phase in [0, 1, 0] {
            self.fpga.write_u16(SENSOR_CLK_PHASE, phase)?;
        }
        for (reg, value) in STATIC_CONFIG {
            self.sci.write(reg, value)?;
        }

        let rev = self.sci.read(REV_CHIP)?;
        info!(rev, "Configuring for LUX1310 silicon");
        let (termination, tuning) = rev_tuning(rev);
        self.sci.write(TERMB_RXCLK, termination)?;
        self.sci.write(REV_TUNING_ADDR, tuning)?;

        for reg in ADC_OS {
            self.sci.write(reg, 0)?;
        }
        self.sci.write(ADC_CAL_EN, 1)?;

        // The resting rails are the lowest gain step's
        let default_gain = *self.gains.nearest(0);
        self.write_gain_fields(&default_gain)?;
        self.gain = Some(default_gain);

        let largest = self.engine.catalog().largest().read_delay;
        self.load_wavetable(largest)?;
        self.sci.write(TIMING_EN, 1)?;

        load_identity_gains(&self.fpga, self.limits.h_max as usize)?;

        let geometry = self.limits.max_geometry();
        self.write_window(&geometry)?;
        let min = self.engine.min_frame_period(geometry.h_res, geometry.v_res);
        self.apply_timing(geometry, u64::from(min), u64::MAX)?;
        self.geometry = geometry;
        info!(timing = ?self.engine.timing(), "LUX1310 initialized");
        Ok(())
    }

    /// Upload a wavetable and point the FPGA's exposure start at it
    /// # Errors
    /// Returns an error if the catalog has no such table, on bus failure or timeout
    pub fn load_wavetable(&mut self, read_delay: u16) -> Result<()> {
        let table = self
            .engine
            .catalog()
            .get(read_delay)
            .ok_or(Error::UnknownWavetable(read_delay))?
            .clone();
        debug!(id = %table.id, len = table.samples.len(), "Uploading wavetable");
        self.sci.write(TIMING_EN, 0)?;
        self.sci.write(RDOUT_DLY, read_delay)?;
        self.sci.write(WAVETAB_SIZE, read_delay)?;
        self.sci.write_buffer(WAVETABLE_ADDR, &table.samples)?;
        self.sci.write(TIMING_EN, 1)?;
        self.fpga.write_u16(SENSOR_MAGIC_START_DELAY, read_delay)?;
        let timing = FrameTiming {
            wavetable: Some(read_delay),
            ..*self.engine.timing()
        };
        self.engine.commit(timing);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_window(&self, g: &ImageGeometry) -> Result<()> {
        let black = self.limits.black_columns;
        self.sci.write(X_START, (black + g.h_offset) as u16)?;
        self.sci.write(X_END, (black + g.h_offset + g.h_res - 1) as u16)?;
        self.sci.write(Y_START, g.v_offset as u16)?;
        self.sci.write(Y_END, (g.v_offset + g.v_res - 1) as u16)
    }

    fn write_gain_fields(&self, gain: &GainSetting) -> Result<()> {
        self.sci.write(GAIN_SEL_SAMP, gain.sampling)?;
        self.sci.write(GAIN_SEL_FB, gain.feedback)?;
        self.sci.write(GAIN_BIT, u16::from(gain.gain_bit))
    }

    /// Fit a period request and an exposure request to `geometry`, swap wavetables if
    /// needed, and program the result. The engine only takes the new timing once every
    /// write has gone through.
    #[allow(clippy::cast_possible_truncation)]
    fn apply_timing(
        &mut self,
        geometry: ImageGeometry,
        period: u64,
        exposure_ns: u64,
    ) -> Result<(PeriodPlan, ExposurePlan)> {
        let ImageGeometry { h_res, v_res, .. } = geometry;
        let plan = self.engine.plan_period_ticks(h_res, v_res, period);
        if self.engine.timing().wavetable != Some(plan.read_delay) {
            self.load_wavetable(plan.read_delay)?;
        }
        let exposure = self
            .engine
            .plan_exposure(exposure_ns, plan.row_period, plan.period);
        let start = self.engine.params().start_delay(plan.read_delay);

        self.fpga
            .write_u16(SENSOR_LINE_PERIOD, (plan.row_period - 1) as u16)?;
        self.fpga.write_u32(IMAGER_FRAME_PERIOD, plan.period)?;
        self.fpga
            .write_u32(IMAGER_INT_TIME, start.saturating_add(exposure.ticks))?;

        self.engine.commit(FrameTiming {
            period: plan.period,
            exposure: exposure.ticks,
            exposure_lines: exposure.lines,
            row_period: plan.row_period,
            h_res,
            v_res,
            wavetable: Some(plan.read_delay),
        });
        Ok((plan, exposure))
    }

    fn exposure_ns(&self) -> u64 {
        self.engine
            .params()
            .ticks_to_ns(u64::from(self.engine.timing().exposure))
    }
}

impl<T, SPI, CS> SensorOps for Lux1310<T, SPI, CS>
where
    T: Transport,
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    fn limits(&self) -> &SensorLimits {
        &self.limits
    }

    fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    fn set_resolution(&mut self, geometry: ImageGeometry) -> Result<()> {
        self.validate_geometry(&geometry)
            .map_err(|e: GeometryError| {
                warn!(?geometry, "Rejected geometry - {e}");
                e
            })?;
        let period = u64::from(self.engine.timing().period);
        let exposure = self.exposure_ns();
        self.write_window(&geometry)?;
        let (plan, _) = self.apply_timing(geometry, period, exposure)?;
        self.geometry = geometry;
        info!(
            h_res = geometry.h_res,
            v_res = geometry.v_res,
            h_offset = geometry.h_offset,
            v_offset = geometry.v_offset,
            period = plan.period,
            "Resolution set"
        );
        Ok(())
    }

    fn set_frame_period(&mut self, period_ns: u64) -> Result<Committed<u64>> {
        let requested = self.engine.params().ns_to_ticks(period_ns);
        let exposure = self.exposure_ns();
        let (plan, _) = self.apply_timing(self.geometry, requested, exposure)?;
        let value = self.engine.params().ticks_to_ns(u64::from(plan.period));
        if plan.clamped {
            warn!(requested = period_ns, committed = value, "Frame period clamped");
        }
        Ok(Committed {
            value,
            clamped: plan.clamped,
        })
    }

    fn set_exposure(&mut self, exposure_ns: u64) -> Result<Committed<u64>> {
        let timing = *self.engine.timing();
        let plan = self
            .engine
            .plan_exposure(exposure_ns, timing.row_period, timing.period);
        let read_delay = timing
            .wavetable
            .unwrap_or(self.engine.catalog().largest().read_delay);
        let start = self.engine.params().start_delay(read_delay);
        self.fpga
            .write_u32(IMAGER_INT_TIME, start.saturating_add(plan.ticks))?;
        self.engine.commit(FrameTiming {
            exposure: plan.ticks,
            exposure_lines: plan.lines,
            ..timing
        });
        let value = self.exposure_ns();
        if plan.clamped {
            warn!(requested = exposure_ns, committed = value, "Exposure clamped");
        }
        Ok(Committed {
            value,
            clamped: plan.clamped,
        })
    }

    fn set_gain(&mut self, db: i32) -> Result<Committed<i32>> {
        let gain = *self.gains.nearest(db);
        let codes = self.dac.apply_gain(&gain)?;
        self.write_gain_fields(&gain)?;
        self.gain = Some(gain);
        info!(db = gain.db, ?codes, "Analog gain set");
        if gain.db != db {
            warn!(requested = db, committed = gain.db, "Gain snapped to nearest step");
        }
        Ok(Committed {
            value: gain.db,
            clamped: gain.db != db,
        })
    }

    fn constraints(&self, geometry: &ImageGeometry) -> ImageConstraints {
        let params = self.engine.params();
        let current = self.engine.timing();
        let plan = self.engine.plan_period_ticks(
            geometry.h_res,
            geometry.v_res,
            u64::from(current.period),
        );
        let (min_exposure, max_exposure) = params.exposure_bounds(plan.period);
        ImageConstraints {
            min_period: self
                .engine
                .min_frame_period(geometry.h_res, geometry.v_res),
            max_period: params.max_period,
            min_exposure,
            max_exposure,
            exposure_delay: params.start_delay(plan.read_delay),
            quantization: plan.row_period,
        }
    }

    fn timing(&self) -> &FrameTiming {
        self.engine.timing()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        bias::{
            dac_word,
            DacChannel,
        },
        bus::mock::{
            BusLog,
            MockPin,
            MockSpi,
        },
        observe::CountingObserver,
        regmap::{
            self,
            fpga,
        },
        sci,
        timing,
        transport::emulator::Emulator,
    };
    use std::sync::{
        Arc,
        Mutex,
    };

    pub(crate) type TestSensor = Lux1310<Emulator, MockSpi, MockPin>;

    pub(crate) fn harness() -> (Arc<Mutex<Emulator>>, BusLog, TestSensor) {
        let map = Arc::new(fpga::defaults());
        let emu = Arc::new(Mutex::new(Emulator::new(&map).unwrap()));
        emu.lock().unwrap().set_sensor_register(0x00, 0xDA02);
        let log = BusLog::new();
        let fpga = Fpga::new(&emu, map);
        let sci = Sci::new(
            fpga.clone(),
            Arc::new(regmap::lux1310::defaults()),
            sci::DEFAULT_TIMEOUT,
        );
        let dac = BiasDac::new(log.spi(), log.pin("dac_cs"));
        let sensor = Lux1310::new(fpga, sci, dac, timing::tests::catalog(), GainTable::lux1310());
        (emu, log, sensor)
    }

    fn initialized() -> (Arc<Mutex<Emulator>>, BusLog, TestSensor) {
        let (emu, log, mut sensor) = harness();
        sensor.init().unwrap();
        log.clear();
        (emu, log, sensor)
    }

    #[test]
    fn test_init() {
        let (emu, log, mut sensor) = harness();
        sensor.init().unwrap();
        let mut emu = emu.lock().unwrap();
        assert_eq!(emu.sensor_register(0x01), Some(1));
        assert_eq!(emu.sensor_register(0x5B), Some(0x307F));
        assert_eq!(emu.sensor_register(0x7B), Some(0x3007));
        assert_eq!(emu.sensor_register(0x4A), Some(1));
        assert_eq!(emu.sensor_register(0x53), Some(3));
        assert_eq!(emu.sensor_register(0x05), Some(16));
        assert_eq!(emu.sensor_register(0x06), Some(16 + 1279));
        assert_eq!(emu.sensor_register(0x08), Some(1023));
        // Reset pulsed and released
        assert_eq!(emu.read_u16(0x0).unwrap() & 1, 0);
        // Identity column gains
        assert_eq!(emu.read_u16(0x1000).unwrap(), 4096);
        assert_eq!(emu.read_u16(0x1000 + 2 * 1279).unwrap(), 4096);
        // All five wavetables tie at full width, so the largest that fits wins
        let timing = *sensor.timing();
        assert_eq!(timing.wavetable, Some(39));
        assert_eq!(timing.period, 93_437);
        assert_eq!(emu.read_u32(0x1C).unwrap(), 93_437);
        assert_eq!(emu.read_u16(0x6C).unwrap(), 81);
        assert_eq!(emu.read_u16(0x68).unwrap(), 39);
        assert_eq!(sensor.gain(), Some(0));
        // Rails at rest
        let words = log.framed_words("dac_cs");
        assert_eq!(words.len(), 9);
        assert_eq!(words[2], dac_word(DacChannel::Vrstb, 3350));
    }

    #[test]
    fn test_init_other_rev() {
        let (emu, _log, mut sensor) = harness();
        emu.lock().unwrap().set_sensor_register(0x00, 0xDA01);
        sensor.init().unwrap();
        let emu = emu.lock().unwrap();
        assert_eq!(emu.sensor_register(0x5B), Some(0x301F));
        assert_eq!(emu.sensor_register(0x7B), Some(0x3001));
    }

    #[test]
    fn test_wavetable_upload() {
        let (emu, _log, mut sensor) = initialized();
        sensor.load_wavetable(80).unwrap();
        let emu = emu.lock().unwrap();
        let upload = emu
            .sci_transfers()
            .iter()
            .rev()
            .find(|t| t.addr == 0x7F)
            .unwrap();
        assert_eq!(upload.data.len(), 80);
        assert_eq!(emu.sensor_register(0x56), Some(80));
        assert_eq!(emu.sensor_register(0x57), Some(80));
        assert_eq!(emu.sensor_register(0x01), Some(1));
        assert_eq!(sensor.timing().wavetable, Some(80));
    }

    #[test]
    fn test_full_resolution_period_regression() {
        let (emu, _log, mut sensor) = initialized();
        let committed = sensor.set_frame_period(945_750).unwrap();
        assert_eq!(committed.value, 945_750);
        assert!(!committed.clamped);
        assert_eq!(sensor.timing().wavetable, Some(80));
        assert_eq!(sensor.timing().row_period, 83);
        assert_eq!(emu.lock().unwrap().read_u32(0x1C).unwrap(), 94_575);
    }

    #[test]
    fn test_period_clamps() {
        let (_emu, _log, mut sensor) = initialized();
        let fast = sensor.set_frame_period(1).unwrap();
        assert!(fast.clamped);
        assert_eq!(sensor.timing().period, 93_437);
        let slow = sensor.set_frame_period(u64::MAX).unwrap();
        assert!(slow.clamped);
        assert_eq!(sensor.timing().period, u32::MAX);
        let ok = sensor.set_frame_period(10_000_000).unwrap();
        assert!(!ok.clamped);
        assert_eq!(ok.value, 10_000_000);
    }

    #[test]
    fn test_exposure_is_whole_rows() {
        let (emu, _log, mut sensor) = initialized();
        sensor.set_frame_period(2_000_000).unwrap();
        for ns in [0, 1_000, 123_456, 1_000_000, 1_995_000, 50_000_000] {
            sensor.set_exposure(ns).unwrap();
            let t = *sensor.timing();
            assert_eq!(t.exposure_clocks() % u64::from(t.row_period), 0);
            assert_eq!(
                u64::from(t.exposure),
                TimingParams::LUX1310.clocks_to_ticks_floor(t.exposure_clocks())
            );
            assert!(t.exposure <= t.period - 500);
            let int_time = emu.lock().unwrap().read_u32(0x20).unwrap();
            let start = TimingParams::LUX1310.start_delay(t.wavetable.unwrap());
            assert_eq!(int_time, start + t.exposure);
        }
    }

    #[test]
    fn test_resolution_round_trip() {
        let (emu, _log, mut sensor) = initialized();
        for (h, v, ho, vo) in [(640, 480, 320, 272), (192, 96, 1088, 928), (1280, 1024, 0, 0)] {
            let g = ImageGeometry::new(h, v, ho, vo);
            sensor.set_resolution(g).unwrap();
            assert_eq!(*sensor.geometry(), g);
            let t = *sensor.timing();
            assert_eq!((t.h_res, t.v_res), (h, v));
            assert!(t.period >= TimingParams::LUX1310.min_frame_period(h, v, t.wavetable.unwrap()));
            let emu = emu.lock().unwrap();
            assert_eq!(emu.sensor_register(0x05), Some((16 + ho) as u16));
            assert_eq!(emu.sensor_register(0x06), Some((16 + ho + h - 1) as u16));
            assert_eq!(emu.sensor_register(0x07), Some(vo as u16));
            assert_eq!(emu.sensor_register(0x08), Some((vo + v - 1) as u16));
        }
    }

    #[test]
    fn test_shrinking_keeps_period_and_requantizes() {
        let (_emu, _log, mut sensor) = initialized();
        sensor.set_frame_period(5_000_000).unwrap();
        sensor.set_exposure(4_000_000).unwrap();
        sensor.set_resolution(ImageGeometry::new(192, 96, 0, 0)).unwrap();
        let t = *sensor.timing();
        assert_eq!(t.period, 500_000);
        assert_eq!(t.wavetable, Some(80));
        assert_eq!(t.exposure_clocks() % u64::from(t.row_period), 0);
    }

    #[test]
    fn test_invalid_resolution_changes_nothing() {
        let (emu, _log, mut sensor) = initialized();
        let counter = Arc::new(CountingObserver::default());
        sensor.fpga = sensor.fpga.clone().with_observer(counter.clone());
        sensor.sci = sensor.sci.clone().with_observer(counter.clone());
        let before_timing = *sensor.timing();
        let before_geometry = *sensor.geometry();
        let transfers = emu.lock().unwrap().sci_transfers().len();
        let err = sensor
            .set_resolution(ImageGeometry::new(100, 1024, 0, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidGeometry(GeometryError::HResRange(100))
        ));
        assert_eq!(err.kind(), crate::ErrorKind::Constraint);
        assert_eq!(*sensor.timing(), before_timing);
        assert_eq!(*sensor.geometry(), before_geometry);
        assert_eq!(counter.total(), 0);
        assert_eq!(emu.lock().unwrap().sci_transfers().len(), transfers);
        assert!(sensor
            .set_resolution(ImageGeometry::new(1280, 1024, 16, 0))
            .is_err());
    }

    #[test]
    fn test_failed_resolution_keeps_geometry() {
        let (emu, _log, mut sensor) = initialized();
        let before_timing = *sensor.timing();
        let before_geometry = *sensor.geometry();
        // Shrinking swaps to the slow wavetable, which stalls on TIMING_EN
        emu.lock().unwrap().set_stuck_sci_at(Some(0x01));
        let err = sensor
            .set_resolution(ImageGeometry::new(192, 96, 0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::SensorBusTimeout { addr: 0x01, .. }));
        assert_eq!(*sensor.geometry(), before_geometry);
        assert_eq!(*sensor.timing(), before_timing);
    }

    #[test]
    fn test_set_gain_12() {
        let (emu, log, mut sensor) = initialized();
        let committed = sensor.set_gain(12).unwrap();
        assert_eq!(committed, Committed { value: 12, clamped: false });
        assert_eq!(
            log.framed_words("dac_cs"),
            vec![
                0x9000,
                dac_word(DacChannel::Vrstb, 3350),
                dac_word(DacChannel::Vrst, 2815),
                dac_word(DacChannel::Vrsth, 3071),
            ]
        );
        let emu = emu.lock().unwrap();
        assert_eq!(emu.sensor_register(0x51), Some(0x0FFF));
        assert_eq!(emu.sensor_register(0x52), Some(0x7F));
        assert_eq!(emu.sensor_register(0x53), Some(0));
        assert_eq!(sensor.gain(), Some(12));
    }

    #[test]
    fn test_set_gain_snaps() {
        let (_emu, _log, mut sensor) = initialized();
        let committed = sensor.set_gain(20).unwrap();
        assert_eq!(committed, Committed { value: 18, clamped: true });
    }

    #[test]
    fn test_constraints() {
        let (_emu, _log, sensor) = initialized();
        let c = sensor.constraints(&ImageGeometry::new(1280, 1024, 0, 0));
        assert_eq!(c.min_period, 93_437);
        assert_eq!(c.max_period, u32::MAX);
        assert_eq!(c.min_exposure, 100);
        assert_eq!(c.max_exposure, 93_437 - 500);
        assert_eq!(c.quantization, 82);
        let narrow = sensor.constraints(&ImageGeometry::new(192, 96, 0, 0));
        assert!(narrow.min_period < c.min_period);
    }

    #[test]
    fn test_sci_timeout_surfaces() {
        let (emu, _log, mut sensor) = initialized();
        emu.lock().unwrap().set_stuck_sci(true);
        assert!(matches!(
            sensor.set_gain(6),
            Err(Error::SensorBusTimeout { addr: 0x51, .. })
        ));
    }
}
