//! The record sequencer: block programs, recording region bounds, and start/stop control.
//!
//! The sequencer steps through a small program of blocks. Each block records frames into the
//! recording region until it is full or one of its termination signals fires, then either
//! ends the recording or moves on to its next block.
use crate::{
    bus::gpio_error,
    core::RegRef,
    fpga::Fpga,
    framebuffer::BYTES_PER_WORD,
    regmap::fpga::{
        SEQ_CTL,
        SEQ_FRAME_SIZE,
        SEQ_PGM_MEM_START,
        SEQ_REC_REGION_END,
        SEQ_REC_REGION_START,
        SEQ_STATUS,
    },
    transport::{
        Deserialize,
        Serialize,
        Transport,
        TransportResult,
    },
    Error,
    Result,
};
use chronosfpga_derive::RegisterSerde;
use embedded_hal::digital::OutputPin;
use packed_struct::prelude::*;
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Bytes between consecutive program entries
pub const PROGRAM_STRIDE: usize = 16;
/// Where recordings start, in frame buffer words. Everything below holds calibration frames.
pub const REC_REGION_START: u32 = 0xF000 * 4;
/// Frame buffer size of a 16 GiB camera, in words
pub const DEFAULT_RAM_WORDS: u64 = 0x2000_0000;

const LED_LINE: &str = "record_led";

/// One block of the sequencer's program
#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "8", endian = "msb")]
pub struct SeqCommand {
    /// End the recording on a trigger
    #[packed_field(bits = "0")]
    pub term_rec_trig: bool,
    /// End the recording when the region is full
    #[packed_field(bits = "1")]
    pub term_rec_mem: bool,
    /// End the recording when this block ends
    #[packed_field(bits = "2")]
    pub term_rec_blk_end: bool,
    /// End the block when it is full
    #[packed_field(bits = "3")]
    pub term_blk_full: bool,
    #[packed_field(bits = "4")]
    pub term_blk_low: bool,
    #[packed_field(bits = "5")]
    pub term_blk_high: bool,
    #[packed_field(bits = "6")]
    pub term_blk_falling: bool,
    #[packed_field(bits = "7")]
    pub term_blk_rising: bool,
    /// Block to continue with
    #[packed_field(bits = "8..=11")]
    pub next_block: Integer<u8, packed_bits::Bits<4>>,
    /// Frames in the block, less one. The low 20 bits share the first word with the flags,
    /// the high 28 fill the bottom of the second.
    #[packed_field(bits = "12..=59")]
    pub block_size: Integer<u64, packed_bits::Bits<48>>,
}

/// Start-record bit of the control register
pub const SEQ_CTL_START_REC: u32 = 1 << 1;
/// Stop-record bit of the control register
pub const SEQ_CTL_STOP_REC: u32 = 1 << 2;

/// The low bits of the sequencer control register. Start and stop act on rising edges.
#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct SeqCtl {
    #[packed_field(bits = "0")]
    pub sw_trig: bool,
    #[packed_field(bits = "1")]
    pub start_rec: bool,
    #[packed_field(bits = "2")]
    pub stop_rec: bool,
}

#[derive(PackedStruct, RegisterSerde, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct SeqStatus {
    #[packed_field(bits = "0")]
    pub active: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordMode {
    /// Ring buffer over the whole region, until stopped
    Normal,
    /// The region split into equal ring segments, each trigger moving on to the next
    Segmented { segments: u32 },
    /// Record only while the trigger is held, keeping `prerecord_frames` from before it
    GatedBurst { prerecord_frames: u32 },
    /// Fill one block of `frames` and stop
    SingleBlock { frames: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecordSettings {
    pub mode: RecordMode,
    /// End the recording once the region fills instead of wrapping around
    pub disable_ring_buffer: bool,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            mode: RecordMode::Normal,
            disable_ring_buffer: false,
        }
    }
}

/// Where in the frame buffer a recording goes, in 32-byte words
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecordingRegion {
    pub start_word: u32,
    pub end_word: u32,
    pub frame_size_words: u32,
    pub total_frames: u32,
}

impl RecordingRegion {
    /// Fit as many 12-bit frames of `h_res` by `v_res` as memory allows past `start_word`
    #[must_use]
    pub fn new(h_res: u32, v_res: u32, ram_words: u64, start_word: u32) -> Self {
        let frame_bytes = u64::from(h_res) * u64::from(v_res) * 12 / 8;
        let frame_size_words = frame_bytes.div_ceil(BYTES_PER_WORD as u64).max(1);
        let total_frames = ram_words.saturating_sub(u64::from(start_word)) / frame_size_words;
        let end_word = u64::from(start_word) + total_frames * frame_size_words;
        Self {
            start_word,
            end_word: u32::try_from(end_word).unwrap_or(u32::MAX),
            frame_size_words: u32::try_from(frame_size_words).unwrap_or(u32::MAX),
            total_frames: u32::try_from(total_frames).unwrap_or(u32::MAX),
        }
    }
}

fn command(size: u32, next: u8) -> SeqCommand {
    SeqCommand {
        next_block: next.into(),
        block_size: u64::from(size).into(),
        ..Default::default()
    }
}

/// Build the block program for `settings` over a region of `total_frames`
/// # Errors
/// Returns an error if the mode's parameters don't fit the region
pub fn program(settings: &RecordSettings, total_frames: u32) -> Result<Vec<SeqCommand>> {
    let invalid = |msg: String| Err(Error::InvalidModeParameters(msg));
    let ring_end = settings.disable_ring_buffer;
    match settings.mode {
        RecordMode::Normal => {
            if total_frames == 0 {
                return invalid("the recording region holds no frames".to_owned());
            }
            Ok(vec![SeqCommand {
                term_rec_mem: ring_end,
                term_rec_blk_end: true,
                term_blk_rising: true,
                ..command(total_frames - 1, 0)
            }])
        }
        RecordMode::Segmented { segments } => {
            if segments == 0 || segments > total_frames {
                return invalid(format!(
                    "{segments} segments in a region of {total_frames} frames"
                ));
            }
            Ok(vec![SeqCommand {
                term_rec_mem: ring_end,
                term_rec_blk_end: segments <= 1,
                term_blk_rising: true,
                ..command(total_frames / segments - 1, 0)
            }])
        }
        RecordMode::GatedBurst { prerecord_frames } => {
            if total_frames < 4 || prerecord_frames == 0 || prerecord_frames > total_frames - 3 {
                return invalid(format!(
                    "{prerecord_frames} prerecord frames in a region of {total_frames} frames"
                ));
            }
            Ok(vec![
                SeqCommand {
                    term_blk_high: true,
                    term_blk_rising: true,
                    ..command(prerecord_frames - 1, 1)
                },
                SeqCommand {
                    term_rec_mem: ring_end,
                    term_blk_low: true,
                    term_blk_falling: true,
                    ..command(total_frames - 3, 0)
                },
            ])
        }
        RecordMode::SingleBlock { frames } => {
            if frames == 0 || frames > total_frames {
                return invalid(format!(
                    "a block of {frames} frames in a region of {total_frames} frames"
                ));
            }
            Ok(vec![SeqCommand {
                term_rec_blk_end: true,
                term_blk_full: true,
                ..command(frames - 1, 0)
            }])
        }
    }
}

/// Control of the record sequencer and the record indicator LEDs
#[derive(Debug)]
pub struct Sequencer<T, L> {
    fpga: Fpga<T>,
    leds: Vec<L>,
    recording: bool,
    playback: bool,
}

impl<T, L> Sequencer<T, L>
where
    T: Transport,
    L: OutputPin,
{
    pub fn new(fpga: Fpga<T>, leds: Vec<L>) -> Self {
        Self {
            fpga,
            leds,
            recording: false,
            playback: false,
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    #[must_use]
    pub fn is_playback(&self) -> bool {
        self.playback
    }

    /// Entered and left by whatever plays recordings back out of the frame buffer
    pub fn set_playback_mode(&mut self, playback: bool) {
        self.playback = playback;
    }

    /// Refuse recording control while playing back or in the wrong recording state
    fn check_state(&self, want_recording: bool) -> Result<()> {
        if self.playback {
            Err(Error::InPlaybackMode)
        } else if self.recording && !want_recording {
            Err(Error::AlreadyRecording)
        } else if !self.recording && want_recording {
            Err(Error::NotRecording)
        } else {
            Ok(())
        }
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn set_frame_size_words(&self, words: u32) -> Result<()> {
        self.fpga.write_u32(SEQ_FRAME_SIZE, words)
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn set_region_bounds(&self, start_word: u32, end_word: u32) -> Result<()> {
        self.fpga.write_u32(SEQ_REC_REGION_START, start_word)?;
        self.fpga.write_u32(SEQ_REC_REGION_END, end_word)
    }

    fn entry_addr(&self, index: usize) -> Result<RegRef<'static>> {
        let base = self.fpga.resolve(SEQ_PGM_MEM_START)?.addr;
        Ok(RegRef::Addr(base + PROGRAM_STRIDE * index))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn write_program(&self, entries: &[SeqCommand]) -> Result<()> {
        for (i, entry) in entries.iter().enumerate() {
            self.fpga.write(self.entry_addr(i)?, entry)?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn read_entry(&self, index: usize) -> Result<SeqCommand> {
        self.fpga.read(self.entry_addr(index)?)
    }

    /// Whether the hardware is currently recording
    /// # Errors
    /// Returns an error on bad transport
    pub fn status(&self) -> Result<SeqStatus> {
        self.fpga.read(SEQ_STATUS)
    }

    /// Raise and drop one control bit, leaving the rest of the register alone
    fn pulse(&self, bit: u32) -> Result<()> {
        self.fpga.or_bits_u32(SEQ_CTL, bit)?;
        self.fpga.and_bits_u32(SEQ_CTL, !bit)
    }

    fn set_leds(&mut self, on: bool) -> Result<()> {
        for led in &mut self.leds {
            if on {
                led.set_high().map_err(gpio_error(LED_LINE))?;
            } else {
                led.set_low().map_err(gpio_error(LED_LINE))?;
            }
        }
        Ok(())
    }

    /// Program `settings` over `region` and start recording
    /// # Errors
    /// Returns an error if already recording, in playback, if the mode's parameters are
    /// invalid, or on bad transport
    pub fn start(&mut self, settings: &RecordSettings, region: &RecordingRegion) -> Result<()> {
        self.check_state(false)?;
        let entries = program(settings, region.total_frames)?;
        self.set_frame_size_words(region.frame_size_words)?;
        self.set_region_bounds(region.start_word, region.end_word)?;
        self.write_program(&entries)?;
        self.pulse(SEQ_CTL_START_REC)?;
        self.recording = true;
        if let Err(e) = self.set_leds(true) {
            warn!("Record LEDs failed, stopping the recording - {e}");
            if let Err(stop) = self.force_stop() {
                warn!("Stopping after an LED failure also failed - {stop}");
            }
            return Err(e);
        }
        info!(mode = ?settings.mode, frames = region.total_frames, "Recording started");
        Ok(())
    }

    /// # Errors
    /// Returns an error if not recording, in playback, or on bad transport
    pub fn stop(&mut self) -> Result<()> {
        self.check_state(true)?;
        self.force_stop()?;
        info!("Recording stopped");
        Ok(())
    }

    /// Pulse stop whatever the tracked state says
    pub(crate) fn force_stop(&mut self) -> Result<()> {
        self.pulse(SEQ_CTL_STOP_REC)?;
        self.recording = false;
        self.set_leds(false)
    }

    /// Pick up a recording the hardware ended on its own, returning whether it's still going
    /// # Errors
    /// Returns an error on bad transport
    pub fn poll_recording(&mut self) -> Result<bool> {
        let active = self.status()?.active;
        if self.recording && !active {
            info!("Recording ended by the sequencer");
            self.recording = false;
            self.set_leds(false)?;
        }
        Ok(self.recording)
    }

    /// Poll until the hardware stops recording, for at most `timeout`
    /// # Errors
    /// Returns [`Error::SequencerTimeout`] if it's still recording after `timeout`
    pub fn wait_idle(&mut self, timeout: Duration, interval: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while self.poll_recording()? {
            if Instant::now() >= deadline {
                return Err(Error::SequencerTimeout(timeout));
            }
            debug!("Waiting on the sequencer");
            std::thread::sleep(interval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::mock::{
            BusLog,
            MockPin,
        },
        core::Space,
        observe::CountingObserver,
        regmap::fpga,
        transport::{
            emulator::Emulator,
            mock::Mock,
        },
    };
    use std::sync::{
        Arc,
        Mutex,
    };

    const FULL: RecordingRegion = RecordingRegion {
        start_word: REC_REGION_START,
        end_word: REC_REGION_START + 8734 * 61_440,
        frame_size_words: 61_440,
        total_frames: 8734,
    };

    fn harness() -> (Arc<Mutex<Emulator>>, BusLog, Sequencer<Emulator, MockPin>) {
        let map = Arc::new(fpga::defaults());
        let emu = Arc::new(Mutex::new(Emulator::new(&map).unwrap()));
        let log = BusLog::new();
        let leds = vec![log.pin("led_front"), log.pin("led_back")];
        let seq = Sequencer::new(Fpga::new(&emu, map), leds);
        (emu, log, seq)
    }

    #[test]
    fn test_region() {
        assert_eq!(
            RecordingRegion::new(1280, 1024, DEFAULT_RAM_WORDS, REC_REGION_START),
            FULL
        );
        let small = RecordingRegion::new(640, 480, 0x10_0000, REC_REGION_START);
        assert_eq!(small.frame_size_words, 14_400);
        assert_eq!(small.total_frames, (0x10_0000 - REC_REGION_START) / 14_400);
        let none = RecordingRegion::new(1280, 1024, 0, REC_REGION_START);
        assert_eq!(none.total_frames, 0);
    }

    #[test]
    fn test_low_word_layout() {
        let entry = program(&RecordSettings::default(), 8734).unwrap()[0];
        let bytes = entry.serialize();
        let low = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let high = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(low, 8733 << 12 | 0b1000_0100);
        assert_eq!(high, 0);
        let wide = command(0x3FFF_FFFF, 0xF).serialize();
        assert_eq!(u32::from_be_bytes([wide[4], wide[5], wide[6], wide[7]]), 0xFFFF_FF00);
        assert_eq!(u32::from_be_bytes([wide[0], wide[1], wide[2], wide[3]]), 0x3FF);
    }

    #[test]
    fn test_block_size_tops_out_at_48_bits() {
        let full = SeqCommand {
            block_size: ((1u64 << 48) - 1).into(),
            ..Default::default()
        }
        .serialize();
        assert_eq!(u32::from_be_bytes([full[4], full[5], full[6], full[7]]), 0xFFFF_F000);
        assert_eq!(u32::from_be_bytes([full[0], full[1], full[2], full[3]]), 0x0FFF_FFFF);
    }

    #[test]
    fn test_normal_entry_round_trips() {
        let transport = Arc::new(Mutex::new(Mock::new(fpga::WINDOW_LEN)));
        let seq: Sequencer<Mock, MockPin> =
            Sequencer::new(Fpga::new(&transport, Arc::new(fpga::defaults())), vec![]);
        let settings = RecordSettings {
            mode: RecordMode::Normal,
            disable_ring_buffer: true,
        };
        let entries = program(&settings, 8734).unwrap();
        seq.write_program(&entries).unwrap();
        let back = seq.read_entry(0).unwrap();
        assert_eq!(back, entries[0]);
        assert!(back.term_rec_mem && back.term_rec_blk_end && back.term_blk_rising);
        assert!(!back.term_blk_full && !back.term_rec_trig);
        assert_eq!(*back.block_size, 8733);
        assert_eq!(*back.next_block, 0);
    }

    #[test]
    fn test_segmented() {
        let settings = RecordSettings {
            mode: RecordMode::Segmented { segments: 4 },
            disable_ring_buffer: false,
        };
        let entry = program(&settings, 8734).unwrap()[0];
        assert_eq!(*entry.block_size, 8734 / 4 - 1);
        assert!(!entry.term_rec_blk_end && !entry.term_rec_mem);
        let one = RecordSettings {
            mode: RecordMode::Segmented { segments: 1 },
            ..settings
        };
        assert!(program(&one, 8734).unwrap()[0].term_rec_blk_end);
    }

    #[test]
    fn test_gated_burst_cross_links() {
        let (_emu, _log, seq) = harness();
        let settings = RecordSettings {
            mode: RecordMode::GatedBurst {
                prerecord_frames: 10,
            },
            disable_ring_buffer: false,
        };
        seq.write_program(&program(&settings, 8734).unwrap()).unwrap();
        let (b0, b1) = (seq.read_entry(0).unwrap(), seq.read_entry(1).unwrap());
        assert_eq!(*b0.next_block, 1);
        assert_eq!(*b1.next_block, 0);
        assert_eq!(*b0.block_size, 9);
        assert_eq!(*b1.block_size, 8731);
        assert!(b0.term_blk_high && b0.term_blk_rising);
        assert!(b1.term_blk_low && b1.term_blk_falling);
    }

    #[test]
    fn test_invalid_parameters() {
        for mode in [
            RecordMode::Segmented { segments: 0 },
            RecordMode::Segmented { segments: 9000 },
            RecordMode::GatedBurst { prerecord_frames: 0 },
            RecordMode::GatedBurst {
                prerecord_frames: 8732,
            },
            RecordMode::SingleBlock { frames: 0 },
            RecordMode::SingleBlock { frames: 8735 },
        ] {
            let settings = RecordSettings {
                mode,
                disable_ring_buffer: false,
            };
            assert!(matches!(
                program(&settings, 8734),
                Err(Error::InvalidModeParameters(_))
            ));
        }
        assert!(program(&RecordSettings::default(), 0).is_err());
    }

    #[test]
    fn test_invalid_parameters_touch_nothing() {
        let map = Arc::new(fpga::defaults());
        let emu = Arc::new(Mutex::new(Emulator::new(&map).unwrap()));
        let counter = Arc::new(CountingObserver::default());
        let mut seq: Sequencer<Emulator, MockPin> =
            Sequencer::new(Fpga::new(&emu, map).with_observer(counter.clone()), vec![]);
        let settings = RecordSettings {
            mode: RecordMode::SingleBlock { frames: 0 },
            disable_ring_buffer: false,
        };
        assert!(seq.start(&settings, &FULL).is_err());
        assert_eq!(counter.count(Space::Fpga), 0);
        assert!(!seq.is_recording());
    }

    #[test]
    fn test_start_programs_region() {
        let (emu, log, mut seq) = harness();
        seq.start(&RecordSettings::default(), &FULL).unwrap();
        let mut emu = emu.lock().unwrap();
        assert_eq!(emu.read_u32(0x48).unwrap(), 61_440);
        assert_eq!(emu.read_u32(0x4C).unwrap(), REC_REGION_START);
        assert_eq!(emu.read_u32(0x50).unwrap(), FULL.end_word);
        assert_eq!(emu.read_u32(0x40).unwrap() & 0b110, 0);
        assert!(emu.is_recording());
        assert_eq!(log.levels("led_front"), vec![true]);
        assert_eq!(log.levels("led_back"), vec![true]);
    }

    #[test]
    fn test_pulses_keep_other_control_bits() {
        let (emu, _log, mut seq) = harness();
        emu.lock().unwrap().write_u32(0x40, 0x108).unwrap();
        seq.start(&RecordSettings::default(), &FULL).unwrap();
        assert_eq!(emu.lock().unwrap().read_u32(0x40).unwrap(), 0x108);
        seq.stop().unwrap();
        let mut emu = emu.lock().unwrap();
        assert_eq!(emu.read_u32(0x40).unwrap(), 0x108);
        assert_eq!((emu.starts(), emu.stops()), (1, 1));
    }

    #[test]
    fn test_led_failure_stops_recording() {
        let (emu, log, mut seq) = harness();
        log.set_failing("led_back", true);
        let err = seq.start(&RecordSettings::default(), &FULL).unwrap_err();
        assert!(matches!(err, Error::Gpio { line: "record_led", .. }));
        assert!(!seq.is_recording());
        {
            let emu = emu.lock().unwrap();
            assert!(!emu.is_recording());
            assert_eq!((emu.starts(), emu.stops()), (1, 1));
        }
        assert_eq!(log.levels("led_front"), vec![true, false]);
        // Once the line recovers, recording works again
        log.set_failing("led_back", false);
        seq.start(&RecordSettings::default(), &FULL).unwrap();
        assert!(emu.lock().unwrap().is_recording());
    }

    #[test]
    fn test_double_start() {
        let (emu, _log, mut seq) = harness();
        seq.start(&RecordSettings::default(), &FULL).unwrap();
        let before = emu.lock().unwrap().memory().memory().to_vec();
        assert!(matches!(
            seq.start(&RecordSettings::default(), &FULL),
            Err(Error::AlreadyRecording)
        ));
        let emu = emu.lock().unwrap();
        assert_eq!(emu.starts(), 1);
        assert_eq!(emu.memory().memory(), &before[..]);
    }

    #[test]
    fn test_stop() {
        let (emu, log, mut seq) = harness();
        assert!(matches!(seq.stop(), Err(Error::NotRecording)));
        seq.start(&RecordSettings::default(), &FULL).unwrap();
        seq.stop().unwrap();
        assert!(!seq.is_recording());
        assert_eq!(emu.lock().unwrap().stops(), 1);
        assert!(!emu.lock().unwrap().is_recording());
        assert_eq!(log.levels("led_front"), vec![true, false]);
    }

    #[test]
    fn test_playback_blocks_recording() {
        let (emu, _log, mut seq) = harness();
        seq.set_playback_mode(true);
        assert!(matches!(
            seq.start(&RecordSettings::default(), &FULL),
            Err(Error::InPlaybackMode)
        ));
        assert!(matches!(seq.stop(), Err(Error::InPlaybackMode)));
        assert_eq!(emu.lock().unwrap().starts(), 0);
    }

    #[test]
    fn test_poll_sees_self_termination() {
        let (emu, log, mut seq) = harness();
        let settings = RecordSettings {
            mode: RecordMode::Normal,
            disable_ring_buffer: true,
        };
        seq.start(&settings, &FULL).unwrap();
        assert!(seq.poll_recording().unwrap());
        emu.lock().unwrap().terminate_recording().unwrap();
        assert!(!seq.poll_recording().unwrap());
        assert!(!seq.is_recording());
        assert_eq!(log.levels("led_back"), vec![true, false]);
        // A new recording may start without a stop in between
        seq.start(&settings, &FULL).unwrap();
    }

    #[test]
    fn test_wait_idle() {
        let (emu, _log, mut seq) = harness();
        let settings = RecordSettings {
            mode: RecordMode::SingleBlock { frames: 16 },
            disable_ring_buffer: false,
        };
        seq.start(&settings, &FULL).unwrap();
        seq.wait_idle(Duration::from_secs(1), Duration::from_millis(1))
            .unwrap();
        assert!(!seq.is_recording());

        emu.lock().unwrap().set_stuck_sequencer(true);
        seq.start(&settings, &FULL).unwrap();
        assert!(matches!(
            seq.wait_idle(Duration::from_millis(10), Duration::from_millis(1)),
            Err(Error::SequencerTimeout(_))
        ));
    }
}
