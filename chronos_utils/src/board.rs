//! Parsing of the line-oriented board description files.
//!
//! A board file starts with `#!/bin/chronos-board`, ends with `?quit`, and in between holds one
//! `?directive` per line. Lines starting with `#` are comments.
use kstring::KString;
use nom::{
    branch::alt,
    bytes::complete::{
        tag,
        take_till,
    },
    character::{
        complete::{
            self,
            hex_digit1,
            line_ending,
            not_line_ending,
            space0,
            space1,
        },
        is_space,
    },
    combinator::{
        map,
        map_res,
    },
    multi::many0,
    sequence::{
        preceded,
        terminated,
    },
    IResult,
};
use std::{
    collections::HashMap,
    io::Read,
    path::Path,
    str::from_utf8,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Parsing failed to match the grammar")]
    ParseMatch,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid UTF8 while parsing a string")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Invalid integer")]
    Integer(#[from] std::num::ParseIntError),
    #[error("Hex byte strings must have an even number of digits")]
    OddHex,
    #[error("Integer doesn't fit the destination field")]
    Range,
}

/// A physical memory window to map
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Window {
    pub base: u64,
    pub len: usize,
}

/// The spidev node and bus settings the bias DAC hangs off of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiDevice {
    pub path: String,
    pub mode: u8,
    pub speed_hz: u32,
    pub bits_per_word: u8,
}

/// A named register: byte address (or SCI sub-address) and a field mask, where zero means the
/// whole register
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterEntry {
    pub addr: u32,
    pub mask: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavetableEntry {
    /// Read delay in sensor clocks, which is also the table length the sensor is told about
    pub read_delay: u16,
    pub samples: Vec<u8>,
}

/// One row of the analog gain table, voltages in millivolts
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GainEntry {
    pub db: i32,
    pub vrstb_mv: u32,
    pub vrst_mv: u32,
    pub vrsth_mv: u32,
    pub sampling: u16,
    pub feedback: u16,
    pub gain_bit: u8,
}

/// Everything a board file can describe
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BoardFile {
    pub mmio: HashMap<KString, Window>,
    pub spi: Option<SpiDevice>,
    pub gpio: HashMap<KString, u32>,
    pub registers: HashMap<KString, RegisterEntry>,
    pub sensor_registers: HashMap<KString, RegisterEntry>,
    pub wavetables: Vec<WavetableEntry>,
    pub gains: Vec<GainEntry>,
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Mmio(&'a str, Window),
    Spi(SpiDevice),
    Gpio(&'a str, u32),
    Register(&'a str, RegisterEntry),
    Sensor(&'a str, RegisterEntry),
    Wavetable(WavetableEntry),
    Gain(GainEntry),
    Comment,
}

fn shebang(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(tag("#!/bin/chronos-board"), line_ending)(input)
}

fn quit(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(tag("?quit"), preceded(space0, line_ending))(input)
}

fn from_hex(input: &[u8]) -> Result<u64, ParseError> {
    let in_str = from_utf8(input)?;
    let num = u64::from_str_radix(in_str, 16)?;
    Ok(num)
}

fn hex_number(input: &[u8]) -> IResult<&[u8], u64> {
    map_res(preceded(tag("0x"), hex_digit1), from_hex)(input)
}

fn hex_u32(input: &[u8]) -> IResult<&[u8], u32> {
    map_res(hex_number, |n| u32::try_from(n).map_err(|_| ParseError::Range))(input)
}

fn hex_u16(input: &[u8]) -> IResult<&[u8], u16> {
    map_res(hex_number, |n| u16::try_from(n).map_err(|_| ParseError::Range))(input)
}

fn hex_bytes(input: &[u8]) -> Result<Vec<u8>, ParseError> {
    if input.len() % 2 != 0 {
        return Err(ParseError::OddHex);
    }
    input
        .chunks(2)
        .map(|pair| Ok(u8::from_str_radix(from_utf8(pair)?, 16)?))
        .collect()
}

fn utf8_string(input: &[u8]) -> Result<&str, ParseError> {
    let in_str = from_utf8(input)?;
    Ok(in_str)
}

fn word(input: &[u8]) -> IResult<&[u8], &str> {
    map_res(preceded(space1, take_till(is_space_or_eol)), utf8_string)(input)
}

fn is_space_or_eol(c: u8) -> bool {
    is_space(c) || c == b'\n' || c == b'\r'
}

fn eol(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(space0, line_ending)(input)
}

fn mmio(input: &[u8]) -> IResult<&[u8], Line> {
    let (remaining, _) = tag("?mmio")(input)?;
    let (remaining, name) = word(remaining)?;
    let (remaining, base) = preceded(space1, hex_number)(remaining)?;
    let (remaining, len) = terminated(
        preceded(
            space1,
            map_res(hex_number, |n| {
                usize::try_from(n).map_err(|_| ParseError::Range)
            }),
        ),
        eol,
    )(remaining)?;
    Ok((remaining, Line::Mmio(name, Window { base, len })))
}

fn spi(input: &[u8]) -> IResult<&[u8], Line> {
    let (remaining, _) = tag("?spi")(input)?;
    let (remaining, path) = word(remaining)?;
    let (remaining, mode) = preceded(space1, complete::u8)(remaining)?;
    let (remaining, speed_hz) = preceded(space1, complete::u32)(remaining)?;
    let (remaining, bits_per_word) = terminated(preceded(space1, complete::u8), eol)(remaining)?;
    Ok((
        remaining,
        Line::Spi(SpiDevice {
            path: path.to_owned(),
            mode,
            speed_hz,
            bits_per_word,
        }),
    ))
}

fn gpio(input: &[u8]) -> IResult<&[u8], Line> {
    let (remaining, _) = tag("?gpio")(input)?;
    let (remaining, name) = word(remaining)?;
    let (remaining, line) = terminated(preceded(space1, complete::u32), eol)(remaining)?;
    Ok((remaining, Line::Gpio(name, line)))
}

fn register_entry(input: &[u8]) -> IResult<&[u8], (&str, RegisterEntry)> {
    let (remaining, name) = word(input)?;
    let (remaining, addr) = preceded(space1, hex_u32)(remaining)?;
    let (remaining, mask) = terminated(preceded(space1, hex_u32), eol)(remaining)?;
    Ok((remaining, (name, RegisterEntry { addr, mask })))
}

fn register(input: &[u8]) -> IResult<&[u8], Line> {
    map(preceded(tag("?register"), register_entry), |(name, reg)| {
        Line::Register(name, reg)
    })(input)
}

fn sensor(input: &[u8]) -> IResult<&[u8], Line> {
    map(preceded(tag("?sensor"), register_entry), |(name, reg)| {
        Line::Sensor(name, reg)
    })(input)
}

fn wavetable(input: &[u8]) -> IResult<&[u8], Line> {
    let (remaining, _) = tag("?wavetable")(input)?;
    let (remaining, read_delay) = preceded(space1, complete::u16)(remaining)?;
    let (remaining, samples) =
        terminated(preceded(space1, map_res(hex_digit1, hex_bytes)), eol)(remaining)?;
    Ok((
        remaining,
        Line::Wavetable(WavetableEntry {
            read_delay,
            samples,
        }),
    ))
}

fn gain(input: &[u8]) -> IResult<&[u8], Line> {
    let (remaining, _) = tag("?gain")(input)?;
    let (remaining, db) = preceded(space1, complete::i32)(remaining)?;
    let (remaining, vrstb_mv) = preceded(space1, complete::u32)(remaining)?;
    let (remaining, vrst_mv) = preceded(space1, complete::u32)(remaining)?;
    let (remaining, vrsth_mv) = preceded(space1, complete::u32)(remaining)?;
    let (remaining, sampling) = preceded(space1, hex_u16)(remaining)?;
    let (remaining, feedback) = preceded(space1, hex_u16)(remaining)?;
    let (remaining, gain_bit) = terminated(preceded(space1, complete::u8), eol)(remaining)?;
    Ok((
        remaining,
        Line::Gain(GainEntry {
            db,
            vrstb_mv,
            vrst_mv,
            vrsth_mv,
            sampling,
            feedback,
            gain_bit,
        }),
    ))
}

fn comment(input: &[u8]) -> IResult<&[u8], Line> {
    map(
        alt((
            terminated(preceded(tag("#"), not_line_ending), line_ending),
            preceded(space0, line_ending),
        )),
        |_| Line::Comment,
    )(input)
}

fn line(input: &[u8]) -> IResult<&[u8], Line> {
    alt((mmio, spi, gpio, register, sensor, wavetable, gain, comment))(input)
}

pub(crate) fn board_file(input: &[u8]) -> IResult<&[u8], BoardFile> {
    let (remaining, _) = shebang(input)?;
    let (remaining, lines) = many0(line)(remaining)?;
    let (remaining, _) = quit(remaining)?;

    let mut board = BoardFile::default();
    for line in lines {
        match line {
            Line::Mmio(name, window) => {
                board.mmio.insert(name.to_owned().into(), window);
            }
            Line::Spi(dev) => board.spi = Some(dev),
            Line::Gpio(name, num) => {
                board.gpio.insert(name.to_owned().into(), num);
            }
            Line::Register(name, reg) => {
                board.registers.insert(name.to_owned().into(), reg);
            }
            Line::Sensor(name, reg) => {
                board.sensor_registers.insert(name.to_owned().into(), reg);
            }
            Line::Wavetable(wt) => board.wavetables.push(wt),
            Line::Gain(g) => board.gains.push(g),
            Line::Comment => (),
        }
    }
    Ok((remaining, board))
}

/// Parses a board description from memory
/// # Errors
/// Returns an error if the contents don't match the grammar
pub fn parse_board(contents: &[u8]) -> Result<BoardFile, Error> {
    let (_, board) = board_file(contents).map_err(|_| Error::ParseMatch)?;
    Ok(board)
}

/// Reads a board description file
/// # Errors
/// Returns an error on IO errors or invalid board files
pub fn read_board_file<T>(filename: T) -> Result<BoardFile, Error>
where
    T: AsRef<Path>,
{
    let mut file = std::fs::File::open(filename)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    parse_board(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shebang() {
        let test_str = "#!/bin/chronos-board\n".as_bytes();
        let (remaining, tag) = shebang(test_str).unwrap();
        assert_eq!(remaining, []);
        assert_eq!(tag, "#!/bin/chronos-board".as_bytes());
    }

    #[test]
    fn test_register() {
        let test_str = "?register\tIMAGER_FRAME_PERIOD\t0x1c\t0x0\n".as_bytes();
        let (remaining, line) = register(test_str).unwrap();
        assert_eq!(remaining, []);
        assert_eq!(
            line,
            Line::Register("IMAGER_FRAME_PERIOD", RegisterEntry { addr: 0x1C, mask: 0 })
        );
    }

    #[test]
    fn test_sensor() {
        let test_str = "?sensor LUX1310_SCI_X_START 0x05 0x07ff\n".as_bytes();
        let (remaining, line) = sensor(test_str).unwrap();
        assert_eq!(remaining, []);
        assert_eq!(
            line,
            Line::Sensor(
                "LUX1310_SCI_X_START",
                RegisterEntry {
                    addr: 0x05,
                    mask: 0x07FF
                }
            )
        );
    }

    #[test]
    fn test_mmio() {
        let test_str = "?mmio\tfpga\t0x01000000\t0x10000\n".as_bytes();
        let (_, line) = mmio(test_str).unwrap();
        assert_eq!(
            line,
            Line::Mmio(
                "fpga",
                Window {
                    base: 0x0100_0000,
                    len: 0x10000
                }
            )
        );
    }

    #[test]
    fn test_spi() {
        let test_str = "?spi /dev/spidev3.0 1 1000000 16\n".as_bytes();
        let (_, line) = spi(test_str).unwrap();
        assert_eq!(
            line,
            Line::Spi(SpiDevice {
                path: "/dev/spidev3.0".to_owned(),
                mode: 1,
                speed_hz: 1_000_000,
                bits_per_word: 16,
            })
        );
    }

    #[test]
    fn test_wavetable() {
        let test_str = "?wavetable 20 00ff10A0\n".as_bytes();
        let (_, line) = wavetable(test_str).unwrap();
        assert_eq!(
            line,
            Line::Wavetable(WavetableEntry {
                read_delay: 20,
                samples: vec![0x00, 0xFF, 0x10, 0xA0]
            })
        );
    }

    #[test]
    fn test_odd_wavetable() {
        let test_str = "?wavetable 20 00f\n".as_bytes();
        assert!(wavetable(test_str).is_err());
    }

    #[test]
    fn test_gain() {
        let test_str = "?gain 12 2700 3300 3600 0xfff 0x7f 0\n".as_bytes();
        let (_, line) = gain(test_str).unwrap();
        assert_eq!(
            line,
            Line::Gain(GainEntry {
                db: 12,
                vrstb_mv: 2700,
                vrst_mv: 3300,
                vrsth_mv: 3600,
                sampling: 0xFFF,
                feedback: 0x7F,
                gain_bit: 0,
            })
        );
    }

    #[test]
    fn test_board_file() {
        let input = "#!/bin/chronos-board
# Chronos 1.4
?mmio\tfpga\t0x01000000\t0x10000
?gpio\tlux1310-dac-cs\t33

?register\tSEQ_CTL\t0x40\t0x0
?sensor\tLUX1310_SCI_TIMING_EN\t0x01\t0x0001
?wavetable\t80\t0102
?quit
"
        .as_bytes();
        let board = parse_board(input).unwrap();
        assert_eq!(board.mmio.get("fpga").unwrap().base, 0x0100_0000);
        assert_eq!(*board.gpio.get("lux1310-dac-cs").unwrap(), 33);
        assert_eq!(
            *board.registers.get("SEQ_CTL").unwrap(),
            RegisterEntry { addr: 0x40, mask: 0 }
        );
        assert_eq!(
            board
                .sensor_registers
                .get("LUX1310_SCI_TIMING_EN")
                .unwrap()
                .mask,
            1
        );
        assert_eq!(board.wavetables[0].samples, vec![1, 2]);
        assert!(board.spi.is_none());
    }

    #[test]
    fn test_missing_quit() {
        let input = "#!/bin/chronos-board\n?gpio\trecord-led.0\t41\n".as_bytes();
        assert!(parse_board(input).is_err());
    }
}
