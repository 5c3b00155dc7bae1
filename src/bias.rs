//! The 8-channel, 12-bit DAC that sets the LUX1310's analog bias voltages.
//!
//! Each command is one 16-bit word: the channel in the top nibble (bit 15 clear) and the code
//! in the low twelve bits. Words go out in host byte order, the bus is configured for 16-bit
//! words and shifts each one out MSB first.
use crate::{
    bus::{
        gpio_error,
        spi_error,
    },
    Error,
    Result,
};
use chronos_utils::board::GainEntry;
use embedded_hal::{
    digital::OutputPin,
    spi::SpiBus,
};
use tracing::debug;

pub const DAC_FULL_SCALE: u32 = 4095;
pub const DAC_VREF_MV: u32 = 3300;
/// Puts the DAC into its normal operating mode
pub const DAC_INIT_WORD: u16 = 0x9000;

const CS_LINE: &str = "dac_cs";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DacChannel {
    Vdr3 = 0,
    Vabl = 1,
    Vdr1 = 2,
    Vdr2 = 3,
    Vrstb = 4,
    Vrsth = 5,
    Vrstl = 6,
    Vrst = 7,
}

impl DacChannel {
    /// Gain of the analog stage between this output and the sensor pin, as (mul, div)
    #[must_use]
    pub fn scale(self) -> (u32, u32) {
        match self {
            DacChannel::Vrst | DacChannel::Vrsth => (33, 48),
            _ => (1, 1),
        }
    }
}

/// The DAC code that puts `millivolts` on `channel`'s sensor pin, saturating at full scale
#[must_use]
pub fn dac_code(channel: DacChannel, millivolts: u32) -> u16 {
    let (mul, div) = channel.scale();
    let code = u64::from(DAC_FULL_SCALE) * u64::from(millivolts) * u64::from(mul)
        / (u64::from(DAC_VREF_MV) * u64::from(div));
    u16::try_from(code.min(u64::from(DAC_FULL_SCALE))).unwrap_or(0x0FFF)
}

#[must_use]
pub fn dac_word(channel: DacChannel, code: u16) -> u16 {
    ((channel as u16) & 0x7) << 12 | (code & 0x0FFF)
}

/// Resting levels of every bias rail, in millivolts
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BiasVoltages {
    pub vabl: u32,
    pub vrstb: u32,
    pub vrst: u32,
    pub vrstl: u32,
    pub vrsth: u32,
    pub vdr1: u32,
    pub vdr2: u32,
    pub vdr3: u32,
}

impl Default for BiasVoltages {
    fn default() -> Self {
        Self {
            vabl: 300,
            vrstb: 2700,
            vrst: 3300,
            vrstl: 700,
            vrsth: 3600,
            vdr1: 2500,
            vdr2: 2000,
            vdr3: 1500,
        }
    }
}

/// One row of the gain table: the reset rails and the sensor's amplifier selectors
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GainSetting {
    pub db: i32,
    pub vrstb_mv: u32,
    pub vrst_mv: u32,
    pub vrsth_mv: u32,
    pub sampling: u16,
    pub feedback: u16,
    pub gain_bit: u8,
}

impl From<GainEntry> for GainSetting {
    fn from(e: GainEntry) -> Self {
        Self {
            db: e.db,
            vrstb_mv: e.vrstb_mv,
            vrst_mv: e.vrst_mv,
            vrsth_mv: e.vrsth_mv,
            sampling: e.sampling,
            feedback: e.feedback,
            gain_bit: e.gain_bit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GainTable {
    entries: Vec<GainSetting>,
}

impl GainTable {
    /// # Errors
    /// Returns an error if there are no entries
    pub fn new(mut entries: Vec<GainSetting>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::EmptyGainTable);
        }
        entries.sort_by_key(|e| e.db);
        Ok(Self { entries })
    }

    /// The LUX1310's analog gain steps
    #[must_use]
    pub fn lux1310() -> Self {
        let row = |db, vrstb_mv, vrst_mv, vrsth_mv, sampling, feedback, gain_bit| GainSetting {
            db,
            vrstb_mv,
            vrst_mv,
            vrsth_mv,
            sampling,
            feedback,
            gain_bit,
        };
        Self {
            entries: vec![
                row(0, 2700, 3300, 3600, 0x007F, 0x7F, 3),
                row(6, 2700, 3300, 3600, 0x0FFF, 0x7F, 3),
                row(12, 2700, 3300, 3600, 0x0FFF, 0x7F, 0),
                row(18, 1700, 2300, 2600, 0x0FFF, 0x07, 0),
                row(24, 1700, 2300, 2600, 0x0FFF, 0x01, 0),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &GainSetting> {
        self.entries.iter()
    }

    /// The entry closest to `db`, the lower one on a tie
    #[must_use]
    pub fn nearest(&self, db: i32) -> &GainSetting {
        self.entries
            .iter()
            .min_by_key(|e| (i64::from(e.db) - i64::from(db)).unsigned_abs())
            .unwrap_or(&self.entries[0])
    }
}

/// The DAC codes a gain change programmed
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GainCodes {
    pub vrstb: u16,
    pub vrst: u16,
    pub vrsth: u16,
}

/// The bias DAC on its SPI bus and chip select line
#[derive(Debug)]
pub struct BiasDac<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> BiasDac<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Clock one command word out, framed by chip select. The DAC is deselected even when
    /// the transfer fails.
    fn send(&mut self, word: u16) -> Result<()> {
        self.cs.set_low().map_err(gpio_error(CS_LINE))?;
        let sent = self
            .spi
            .write(&word.to_le_bytes())
            .and_then(|()| self.spi.flush())
            .map_err(spi_error);
        let deselected = self.cs.set_high().map_err(gpio_error(CS_LINE));
        sent.and(deselected)
    }

    /// # Errors
    /// Returns an error on bus failure
    pub fn init(&mut self) -> Result<()> {
        self.send(DAC_INIT_WORD)
    }

    /// Drive `channel` to `millivolts`, returning the code sent
    /// # Errors
    /// Returns an error on bus failure
    pub fn set_voltage(&mut self, channel: DacChannel, millivolts: u32) -> Result<u16> {
        let code = dac_code(channel, millivolts);
        debug!(?channel, millivolts, code, "Setting bias");
        self.send(dac_word(channel, code))?;
        Ok(code)
    }

    /// Bring every rail to its resting level
    /// # Errors
    /// Returns an error on bus failure
    pub fn write_voltages(&mut self, v: &BiasVoltages) -> Result<()> {
        self.init()?;
        for (channel, mv) in [
            (DacChannel::Vabl, v.vabl),
            (DacChannel::Vrstb, v.vrstb),
            (DacChannel::Vrst, v.vrst),
            (DacChannel::Vrstl, v.vrstl),
            (DacChannel::Vrsth, v.vrsth),
            (DacChannel::Vdr1, v.vdr1),
            (DacChannel::Vdr2, v.vdr2),
            (DacChannel::Vdr3, v.vdr3),
        ] {
            self.set_voltage(channel, mv)?;
        }
        Ok(())
    }

    /// Program the reset rails of a gain step. The amplifier selectors are the sensor's.
    /// # Errors
    /// Returns an error on bus failure
    pub fn apply_gain(&mut self, gain: &GainSetting) -> Result<GainCodes> {
        self.init()?;
        Ok(GainCodes {
            vrstb: self.set_voltage(DacChannel::Vrstb, gain.vrstb_mv)?,
            vrst: self.set_voltage(DacChannel::Vrst, gain.vrst_mv)?,
            vrsth: self.set_voltage(DacChannel::Vrsth, gain.vrsth_mv)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{
        BusLog,
        SPI_NAME,
    };
    use embedded_hal::{
        digital,
        spi,
    };

    #[test]
    fn test_codes() {
        assert_eq!(dac_code(DacChannel::Vrstb, 2700), 3350);
        assert_eq!(dac_code(DacChannel::Vrst, 3300), 2815);
        assert_eq!(dac_code(DacChannel::Vrsth, 3600), 3071);
        assert_eq!(dac_code(DacChannel::Vabl, 0), 0);
        assert_eq!(dac_code(DacChannel::Vabl, 5000), 4095);
    }

    #[test]
    fn test_words() {
        assert_eq!(dac_word(DacChannel::Vrst, 2815), 0x7AFF);
        assert_eq!(dac_word(DacChannel::Vdr3, 0xFFFF), 0x0FFF);
    }

    #[test]
    fn test_nearest() {
        let table = GainTable::lux1310();
        assert_eq!(table.nearest(12).db, 12);
        assert_eq!(table.nearest(13).db, 12);
        assert_eq!(table.nearest(15).db, 12);
        assert_eq!(table.nearest(16).db, 18);
        assert_eq!(table.nearest(-40).db, 0);
        assert_eq!(table.nearest(100).db, 24);
        assert!(matches!(GainTable::new(vec![]), Err(Error::EmptyGainTable)));
    }

    #[test]
    fn test_apply_gain_order() {
        let log = BusLog::new();
        let mut dac = BiasDac::new(log.spi(), log.pin("dac_cs"));
        let codes = dac.apply_gain(GainTable::lux1310().nearest(12)).unwrap();
        assert_eq!(
            codes,
            GainCodes {
                vrstb: 3350,
                vrst: 2815,
                vrsth: 3071
            }
        );
        assert_eq!(
            log.framed_words("dac_cs"),
            vec![
                DAC_INIT_WORD,
                dac_word(DacChannel::Vrstb, 3350),
                dac_word(DacChannel::Vrst, 2815),
                dac_word(DacChannel::Vrsth, 3071),
            ]
        );
        assert_eq!(log.levels("dac_cs"), [false, true].repeat(4));
    }

    #[test]
    fn test_spi_failure_deselects() {
        let log = BusLog::new();
        let mut dac = BiasDac::new(log.spi(), log.pin("dac_cs"));
        log.set_failing(SPI_NAME, true);
        let err = dac.init().unwrap_err();
        assert!(matches!(err, Error::Spi(spi::ErrorKind::Other)));
        assert_eq!(err.kind(), crate::ErrorKind::Io);
        assert_eq!(log.levels("dac_cs"), vec![false, true]);
    }

    #[test]
    fn test_chip_select_failure() {
        let log = BusLog::new();
        let mut dac = BiasDac::new(log.spi(), log.pin("dac_cs"));
        log.set_failing("dac_cs", true);
        assert!(matches!(
            dac.set_voltage(DacChannel::Vabl, 300),
            Err(Error::Gpio {
                line: "dac_cs",
                kind: digital::ErrorKind::Other
            })
        ));
        assert!(log.framed_words("dac_cs").is_empty());
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_default_voltages() {
        let log = BusLog::new();
        let mut dac = BiasDac::new(log.spi(), log.pin("dac_cs"));
        dac.write_voltages(&BiasVoltages::default()).unwrap();
        let words = log.framed_words("dac_cs");
        assert_eq!(words.len(), 9);
        assert_eq!(words[0], DAC_INIT_WORD);
        assert_eq!(words[1], dac_word(DacChannel::Vabl, 372));
        assert_eq!(words[8], dac_word(DacChannel::Vdr3, 1861));
    }
}
