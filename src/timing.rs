//! The timing constraint engine.
//!
//! Readout runs on the sensor clock while the FPGA times frames and exposures on its own
//! timing clock, so every quantity here is computed in sensor clocks first and converted to
//! timing ticks only at the edges. Conversions towards the hardware round so that a period is
//! never claimed shorter than the sensor can actually read out.
use crate::{
    Error,
    Result,
};
use chronos_utils::board::WavetableEntry;
use kstring::KString;

const NS_PER_S: u128 = 1_000_000_000;

/// A value as committed to hardware, and whether it had to be clamped to get there
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Committed<T> {
    pub value: T,
    pub clamped: bool,
}

/// The fixed timing characteristics of a sensor and the FPGA that drives it
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimingParams {
    pub sensor_clock_hz: u64,
    pub timing_clock_hz: u64,
    /// Pixels read out per row clock
    pub h_increment: u32,
    /// Sensor clocks of horizontal blanking per row
    pub h_blank: u32,
    /// Sensor clocks a row needs on top of the wavetable
    pub row_overhead: u32,
    /// Sensor clocks per frame for the data transfer
    pub transfer: u32,
    pub pre_overhead: u32,
    pub post_overhead: u32,
    pub min_exposure_ns: u64,
    /// Timing ticks between the end of an exposure and the end of its frame period
    pub exposure_margin: u32,
    /// The longest frame period the timing generator can count, in ticks
    pub max_period: u32,
}

impl TimingParams {
    pub const LUX1310: Self = Self {
        sensor_clock_hz: 90_000_000,
        timing_clock_hz: 100_000_000,
        h_increment: 16,
        h_blank: 2,
        row_overhead: 3,
        transfer: 25,
        pre_overhead: 50,
        post_overhead: 50,
        min_exposure_ns: 1_000,
        exposure_margin: 500,
        max_period: u32::MAX,
    };

    /// Minimum row period in sensor clocks
    #[must_use]
    pub fn min_row_period(&self, h_res: u32, read_delay: u16) -> u32 {
        (h_res / self.h_increment + self.h_blank).max(u32::from(read_delay) + self.row_overhead)
    }

    /// Minimum frame period in sensor clocks
    #[must_use]
    pub fn min_frame_clocks(&self, h_res: u32, v_res: u32, read_delay: u16) -> u64 {
        u64::from(self.min_row_period(h_res, read_delay)) * u64::from(v_res)
            + u64::from(self.transfer + self.pre_overhead + self.post_overhead)
    }

    /// Minimum frame period in timing ticks
    #[must_use]
    pub fn min_frame_period(&self, h_res: u32, v_res: u32, read_delay: u16) -> u32 {
        saturate(self.clocks_to_ticks(self.min_frame_clocks(h_res, v_res, read_delay)))
    }

    /// Sensor clocks to timing ticks, rounding up
    #[must_use]
    pub fn clocks_to_ticks(&self, clocks: u64) -> u64 {
        rescale(clocks, self.timing_clock_hz, self.sensor_clock_hz, Round::Up)
    }

    /// Sensor clocks to timing ticks, rounding down
    #[must_use]
    pub fn clocks_to_ticks_floor(&self, clocks: u64) -> u64 {
        rescale(clocks, self.timing_clock_hz, self.sensor_clock_hz, Round::Down)
    }

    #[must_use]
    pub fn ticks_to_clocks_ceil(&self, ticks: u64) -> u64 {
        rescale(ticks, self.sensor_clock_hz, self.timing_clock_hz, Round::Up)
    }

    #[must_use]
    pub fn ticks_to_clocks_floor(&self, ticks: u64) -> u64 {
        rescale(ticks, self.sensor_clock_hz, self.timing_clock_hz, Round::Down)
    }

    /// Nanoseconds to the nearest timing tick
    #[must_use]
    pub fn ns_to_ticks(&self, ns: u64) -> u64 {
        from_ns(ns, self.timing_clock_hz)
    }

    /// Timing ticks to nanoseconds, rounding up
    #[must_use]
    pub fn ticks_to_ns(&self, ticks: u64) -> u64 {
        rescale(ticks, 1_000_000_000, self.timing_clock_hz, Round::Up)
    }

    /// Delay in ticks between a frame start and the start of exposure for a wavetable
    #[must_use]
    pub fn start_delay(&self, read_delay: u16) -> u32 {
        saturate(self.clocks_to_ticks_floor(u64::from(read_delay)))
    }

    /// The shortest and longest exposures, in ticks, allowed within a frame period
    #[must_use]
    pub fn exposure_bounds(&self, period: u32) -> (u32, u32) {
        let min = saturate(self.ns_to_ticks(self.min_exposure_ns));
        let max = period.saturating_sub(self.exposure_margin).max(min);
        (min, max)
    }

    /// Quantize an exposure request to whole row periods, within the bounds of `period`
    #[must_use]
    pub fn quantize_exposure(
        &self,
        exposure_ns: u64,
        row_period: u32,
        period: u32,
    ) -> ExposurePlan {
        let row = u64::from(row_period.max(1));
        let (min_ticks, max_ticks) = self.exposure_bounds(period);
        let min_lines = self
            .ticks_to_clocks_ceil(u64::from(min_ticks))
            .div_ceil(row)
            .max(1);
        let max_lines = (self.ticks_to_clocks_floor(u64::from(max_ticks)) / row).max(min_lines);

        let target = from_ns(exposure_ns, self.sensor_clock_hz);
        let requested = target.saturating_add(row / 2) / row;
        let lines = requested.clamp(min_lines, max_lines);
        ExposurePlan {
            lines: saturate(lines),
            ticks: saturate(self.clocks_to_ticks_floor(lines * row)),
            clamped: lines != requested,
        }
    }
}

#[derive(Copy, Clone)]
enum Round {
    Up,
    Down,
}

fn rescale(value: u64, mul: u64, div: u64, round: Round) -> u64 {
    let num = u128::from(value) * u128::from(mul);
    let div = u128::from(div.max(1));
    let out = match round {
        Round::Up => num.div_ceil(div),
        Round::Down => num / div,
    };
    u64::try_from(out).unwrap_or(u64::MAX)
}

fn from_ns(ns: u64, hz: u64) -> u64 {
    let out = (u128::from(ns) * u128::from(hz) + NS_PER_S / 2) / NS_PER_S;
    u64::try_from(out).unwrap_or(u64::MAX)
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// A committed exposure, in whole rows
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExposurePlan {
    pub lines: u32,
    /// The exposure in timing ticks
    pub ticks: u32,
    pub clamped: bool,
}

/// The outcome of choosing a frame period
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PeriodPlan {
    /// Frame period in ticks
    pub period: u32,
    /// Read delay of the wavetable to run it with
    pub read_delay: u16,
    /// Row period in sensor clocks under that wavetable
    pub row_period: u32,
    pub clamped: bool,
}

/// A sensor readout waveform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wavetable {
    pub id: KString,
    /// Row read time the table needs, in sensor clocks. Also the table's length.
    pub read_delay: u16,
    pub samples: Vec<u8>,
}

impl Wavetable {
    #[must_use]
    pub fn new(read_delay: u16, samples: Vec<u8>) -> Self {
        Self {
            id: KString::from_string(format!("{read_delay}clk")),
            read_delay,
            samples,
        }
    }
}

impl From<WavetableEntry> for Wavetable {
    fn from(entry: WavetableEntry) -> Self {
        Self::new(entry.read_delay, entry.samples)
    }
}

/// The wavetables a sensor can run, longest read delay first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavetableCatalog {
    tables: Vec<Wavetable>,
}

impl WavetableCatalog {
    /// # Errors
    /// Returns an error if there are no tables
    pub fn new(mut tables: Vec<Wavetable>) -> Result<Self> {
        if tables.is_empty() {
            return Err(Error::EmptyWavetableCatalog);
        }
        tables.sort_by(|a, b| b.read_delay.cmp(&a.read_delay));
        tables.dedup_by_key(|t| t.read_delay);
        Ok(Self { tables })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wavetable> {
        self.tables.iter()
    }

    /// The table with the longest read delay, which suits every frame period
    #[must_use]
    pub fn largest(&self) -> &Wavetable {
        &self.tables[0]
    }

    /// The table with the shortest read delay, which allows the shortest frame periods
    #[must_use]
    pub fn smallest(&self) -> &Wavetable {
        &self.tables[self.tables.len() - 1]
    }

    #[must_use]
    pub fn get(&self, read_delay: u16) -> Option<&Wavetable> {
        self.tables.iter().find(|t| t.read_delay == read_delay)
    }

    /// Choose a wavetable and clamped period for a requested period in ticks.
    ///
    /// The first table (longest read delay) that can run at the request wins, but the
    /// `loaded` table is kept if it's just as fast, to avoid a needless upload. A request
    /// faster than every table gets the shortest table at its minimum period.
    #[must_use]
    pub fn select(
        &self,
        params: &TimingParams,
        h_res: u32,
        v_res: u32,
        requested: u64,
        loaded: Option<u16>,
    ) -> PeriodPlan {
        let min_period = |t: &Wavetable| params.min_frame_period(h_res, v_res, t.read_delay);
        let first_fit = self
            .tables
            .iter()
            .find(|t| u64::from(min_period(t)) <= requested);
        let (table, fits) = match first_fit {
            Some(chosen) => {
                let table = loaded
                    .and_then(|rd| self.get(rd))
                    .filter(|l| min_period(l) == min_period(chosen))
                    .unwrap_or(chosen);
                (table, true)
            }
            None => (self.smallest(), false),
        };
        let min = min_period(table);
        let max = params.max_period;
        let period = requested.clamp(u64::from(min), u64::from(max));
        PeriodPlan {
            period: saturate(period),
            read_delay: table.read_delay,
            row_period: params.min_row_period(h_res, table.read_delay),
            clamped: !fits || requested > u64::from(max),
        }
    }
}

/// Frame timing as currently programmed into the hardware
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FrameTiming {
    /// Frame period in ticks
    pub period: u32,
    /// Exposure in ticks
    pub exposure: u32,
    /// Exposure in whole row periods
    pub exposure_lines: u32,
    /// Row period in sensor clocks
    pub row_period: u32,
    pub h_res: u32,
    pub v_res: u32,
    /// Read delay of the loaded wavetable
    pub wavetable: Option<u16>,
}

impl FrameTiming {
    /// Exposure in sensor clocks, always a whole number of rows
    #[must_use]
    pub fn exposure_clocks(&self) -> u64 {
        u64::from(self.exposure_lines) * u64::from(self.row_period)
    }
}

/// Owns the frame timing state and decides what may be committed to it
#[derive(Debug, Clone)]
pub struct TimingEngine {
    params: TimingParams,
    catalog: WavetableCatalog,
    state: FrameTiming,
}

impl TimingEngine {
    #[must_use]
    pub fn new(params: TimingParams, catalog: WavetableCatalog) -> Self {
        Self {
            params,
            catalog,
            state: FrameTiming::default(),
        }
    }

    #[must_use]
    pub fn params(&self) -> &TimingParams {
        &self.params
    }

    #[must_use]
    pub fn catalog(&self) -> &WavetableCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn timing(&self) -> &FrameTiming {
        &self.state
    }

    /// The shortest frame period any wavetable allows at this resolution, in ticks
    #[must_use]
    pub fn min_frame_period(&self, h_res: u32, v_res: u32) -> u32 {
        self.params
            .min_frame_period(h_res, v_res, self.catalog.smallest().read_delay)
    }

    #[must_use]
    pub fn plan_period(&self, h_res: u32, v_res: u32, period_ns: u64) -> PeriodPlan {
        let requested = self.params.ns_to_ticks(period_ns);
        self.plan_period_ticks(h_res, v_res, requested)
    }

    #[must_use]
    pub fn plan_period_ticks(&self, h_res: u32, v_res: u32, requested: u64) -> PeriodPlan {
        self.catalog
            .select(&self.params, h_res, v_res, requested, self.state.wavetable)
    }

    #[must_use]
    pub fn plan_exposure(&self, exposure_ns: u64, row_period: u32, period: u32) -> ExposurePlan {
        self.params
            .quantize_exposure(exposure_ns, row_period, period)
    }

    /// Record what was just programmed into the hardware
    pub fn commit(&mut self, timing: FrameTiming) {
        self.state = timing;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const P: TimingParams = TimingParams::LUX1310;

    /// Stand-in tables with the LUX1310 read delays
    pub(crate) fn catalog() -> WavetableCatalog {
        WavetableCatalog::new(
            [20u16, 80, 30, 39, 25]
                .into_iter()
                .map(|rd| Wavetable::new(rd, (0..rd).map(|i| (i & 0xFF) as u8).collect()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_full_resolution_regression() {
        assert_eq!(P.min_row_period(1280, 80), 83);
        assert_eq!(P.min_frame_clocks(1280, 1024, 80), 85_117);
        assert_eq!(P.min_frame_period(1280, 1024, 80), 94_575);
        assert_eq!(P.ticks_to_ns(94_575), 945_750);
    }

    #[test]
    fn test_blanking_bound_row() {
        // Wide rows are bound by pixel readout, not the wavetable
        assert_eq!(P.min_row_period(1280, 20), 82);
        assert_eq!(P.min_row_period(192, 20), 23);
    }

    #[test]
    fn test_min_period_monotonic() {
        for rd in [20u16, 25, 30, 39, 80] {
            let mut last = 0;
            for v in (96..=1024).step_by(2) {
                let p = P.min_frame_period(1280, v, rd);
                assert!(p >= last);
                last = p;
            }
        }
        for h in (192..=1280).step_by(16) {
            let mut last = 0;
            for rd in [20u16, 25, 30, 39, 80] {
                let p = P.min_frame_period(h, 512, rd);
                assert!(p >= last);
                last = p;
            }
        }
    }

    #[test]
    fn test_conversions() {
        assert_eq!(P.ns_to_ticks(945_750), 94_575);
        assert_eq!(P.ns_to_ticks(14), 1);
        assert_eq!(P.ns_to_ticks(15), 2);
        assert_eq!(P.clocks_to_ticks(9), 10);
        assert_eq!(P.clocks_to_ticks(10), 12);
        assert_eq!(P.clocks_to_ticks_floor(10), 11);
        assert_eq!(P.start_delay(80), 88);
        assert!(P.ns_to_ticks(u64::MAX) > u64::from(u32::MAX));
    }

    #[test]
    fn test_catalog_order() {
        let catalog = catalog();
        let delays: Vec<u16> = catalog.iter().map(|t| t.read_delay).collect();
        assert_eq!(delays, vec![80, 39, 30, 25, 20]);
        assert_eq!(catalog.largest().read_delay, 80);
        assert_eq!(catalog.smallest().read_delay, 20);
        assert_eq!(catalog.get(39).unwrap().id, "39clk");
        assert!(matches!(
            WavetableCatalog::new(vec![]),
            Err(Error::EmptyWavetableCatalog)
        ));
    }

    #[test]
    fn test_select_first_that_fits() {
        let catalog = catalog();
        let plan = catalog.select(&P, 1280, 1024, 1_000_000, None);
        assert_eq!(plan.read_delay, 80);
        assert_eq!(plan.period, 1_000_000);
        assert!(!plan.clamped);

        let plan = catalog.select(&P, 1280, 1024, 94_000, None);
        assert_eq!(plan.read_delay, 39);
        assert_eq!(plan.row_period, 82);
    }

    #[test]
    fn test_select_prefers_loaded_on_tie() {
        let catalog = catalog();
        // At full width every short table is bound by readout, so they all tie
        let plan = catalog.select(&P, 1280, 1024, 94_000, Some(20));
        assert_eq!(plan.read_delay, 20);
        // At narrow widths they don't
        let plan = catalog.select(&P, 192, 96, 100_000, Some(20));
        assert_eq!(plan.read_delay, 80);
    }

    #[test]
    fn test_select_too_fast_clamps_to_smallest() {
        let catalog = catalog();
        let plan = catalog.select(&P, 1280, 1024, 1, Some(80));
        assert_eq!(plan.read_delay, 20);
        assert_eq!(plan.period, P.min_frame_period(1280, 1024, 20));
        assert!(plan.clamped);
    }

    #[test]
    fn test_period_always_in_bounds() {
        let engine = TimingEngine::new(P, catalog());
        for ns in [0u64, 1, 10_000, 945_750, 1_000_000_000, u64::MAX] {
            for (h, v) in [(1280, 1024), (640, 480), (192, 96)] {
                let plan = engine.plan_period(h, v, ns);
                assert!(plan.period >= engine.min_frame_period(h, v));
                assert!(plan.period >= P.min_frame_period(h, v, plan.read_delay));
                assert!(plan.period <= P.max_period);
            }
        }
        assert!(engine.plan_period(1280, 1024, u64::MAX).clamped);
    }

    #[test]
    fn test_exposure_is_row_multiple() {
        let row = 83;
        let period = 94_575;
        for ns in [0u64, 500, 1_000, 12_345, 100_000, 900_000, 10_000_000] {
            let plan = P.quantize_exposure(ns, row, period);
            let clocks = u64::from(plan.lines) * u64::from(row);
            assert_eq!(u64::from(plan.ticks), P.clocks_to_ticks_floor(clocks));
            let (min, max) = P.exposure_bounds(period);
            assert!(plan.ticks <= max);
            assert!(plan.ticks >= min);
            assert!(plan.lines >= 1);
        }
    }

    #[test]
    fn test_exposure_rounds_to_nearest_row() {
        // One row is 83 clocks, about 922 ns
        let plan = P.quantize_exposure(10 * 922, 83, 94_575);
        assert_eq!(plan.lines, 10);
        assert!(!plan.clamped);
        let plan = P.quantize_exposure(10 * 922 + 400, 83, 94_575);
        assert_eq!(plan.lines, 10);
        let plan = P.quantize_exposure(10 * 922 + 500, 83, 94_575);
        assert_eq!(plan.lines, 11);
    }

    #[test]
    fn test_exposure_clamps() {
        let plan = P.quantize_exposure(0, 83, 94_575);
        assert!(plan.clamped);
        assert_eq!(plan.lines, 2);
        let plan = P.quantize_exposure(u64::MAX, 83, 94_575);
        assert!(plan.clamped);
        assert_eq!(plan.lines, (94_575 - 500) * 9 / 10 / 83);
    }
}
