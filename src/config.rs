//! Board configuration: where the FPGA and frame buffer are mapped, how the peripherals are
//! wired, the symbol tables, and how long to wait on the hardware.
//!
//! [`BoardConfig::default`] describes a stock Chronos 1.4. A board description file can
//! override any of it with [`BoardConfig::from_board`].
use crate::{
    bias::{
        GainSetting,
        GainTable,
    },
    core::{
        overlay,
        RegisterMap,
    },
    regmap,
    sci,
    sequencer::{
        DEFAULT_RAM_WORDS,
        REC_REGION_START,
    },
    timing::{
        Wavetable,
        WavetableCatalog,
    },
    Result,
};
use chronos_utils::board::{
    BoardFile,
    SpiDevice,
    Window,
};
use std::time::Duration;
use tracing::debug;

/// Physical address of the FPGA control window
pub const FPGA_BASE: u64 = 0x0100_0000;
/// Physical address and size of the frame buffer window
pub const RAM_WINDOW: Window = Window {
    base: 0x0200_0000,
    len: 0x0100_0000,
};
pub const DAC_CS_GPIO: u32 = 33;
pub const RECORD_LED_GPIOS: [u32; 2] = [41, 25];

/// Board file names for the things we look up
const MMIO_FPGA: &str = "fpga";
const MMIO_RAM: &str = "ram";
const GPIO_DAC_CS: &str = "lux1310-dac-cs";
const GPIO_RECORD_LED: &str = "record-led";

#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub fpga_window: Window,
    pub ram_window: Window,
    /// The bias DAC's spidev node
    pub spi: SpiDevice,
    pub dac_cs_gpio: u32,
    pub record_led_gpios: Vec<u32>,
    /// Frame buffer size, in 32-byte words
    pub ram_words: u64,
    /// First frame buffer word recordings may use
    pub rec_region_start: u32,
    pub sci_timeout: Duration,
    /// Longest a calibration capture may take
    pub sequencer_timeout: Duration,
    pub sequencer_poll_interval: Duration,
    pub registers: RegisterMap,
    pub sensor_registers: RegisterMap,
    /// Readout waveforms. The stock tables are board resources, so this starts empty.
    pub wavetables: Vec<Wavetable>,
    pub gains: GainTable,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            fpga_window: Window {
                base: FPGA_BASE,
                len: regmap::fpga::WINDOW_LEN,
            },
            ram_window: RAM_WINDOW,
            spi: SpiDevice {
                path: "/dev/spidev3.0".to_owned(),
                mode: 1,
                speed_hz: 1_000_000,
                bits_per_word: 16,
            },
            dac_cs_gpio: DAC_CS_GPIO,
            record_led_gpios: RECORD_LED_GPIOS.to_vec(),
            ram_words: DEFAULT_RAM_WORDS,
            rec_region_start: REC_REGION_START,
            sci_timeout: sci::DEFAULT_TIMEOUT,
            sequencer_timeout: Duration::from_secs(2),
            sequencer_poll_interval: Duration::from_millis(5),
            registers: regmap::fpga::defaults(),
            sensor_registers: regmap::lux1310::defaults(),
            wavetables: vec![],
            gains: GainTable::lux1310(),
        }
    }
}

impl BoardConfig {
    /// The defaults with everything `board` describes laid over them
    /// # Errors
    /// Returns an error if the board file's gain table is unusable
    pub fn from_board(board: &BoardFile) -> Result<Self> {
        let mut config = Self::default();
        if let Some(w) = board.mmio.get(MMIO_FPGA) {
            config.fpga_window = *w;
        }
        if let Some(w) = board.mmio.get(MMIO_RAM) {
            config.ram_window = *w;
        }
        if let Some(spi) = &board.spi {
            config.spi = spi.clone();
        }
        if let Some(line) = board.gpio.get(GPIO_DAC_CS) {
            config.dac_cs_gpio = *line;
        }
        let mut leds: Vec<_> = board
            .gpio
            .iter()
            .filter(|(name, _)| name.starts_with(GPIO_RECORD_LED))
            .collect();
        if !leds.is_empty() {
            leds.sort_by(|a, b| a.0.cmp(b.0));
            config.record_led_gpios = leds.into_iter().map(|(_, line)| *line).collect();
        }
        overlay(&mut config.registers, &board.registers);
        overlay(&mut config.sensor_registers, &board.sensor_registers);
        config.wavetables = board
            .wavetables
            .iter()
            .cloned()
            .map(Wavetable::from)
            .collect();
        if !board.gains.is_empty() {
            let gains = board.gains.iter().copied().map(GainSetting::from).collect();
            config.gains = GainTable::new(gains)?;
        }
        debug!(
            registers = config.registers.len(),
            sensor_registers = config.sensor_registers.len(),
            wavetables = config.wavetables.len(),
            "Loaded board description"
        );
        Ok(config)
    }

    /// # Errors
    /// Returns an error if no wavetables are configured
    pub fn wavetable_catalog(&self) -> Result<WavetableCatalog> {
        WavetableCatalog::new(self.wavetables.clone())
    }
}
