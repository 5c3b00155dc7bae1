//! A transport that behaves like the camera's FPGA control window closely enough to drive the
//! whole stack without hardware.
//!
//! Register storage is a [`Mock`]. On top of it the emulator runs the sensor control engine
//! against a modelled sensor register bank, and follows the record sequencer's start and stop
//! edges. Both engines can be made to hang, to exercise the timeout paths.
use super::{
    mock::Mock,
    Deserialize,
    Transport,
    TransportResult,
};
use crate::{
    core::{
        resolve,
        RegisterMap,
        Space,
    },
    regmap::fpga,
    sci::{
        SCI_FIFO_RESET,
        SCI_RUN,
        SCI_RW,
    },
    sequencer::{
        SeqCommand,
        SeqCtl,
    },
};
use paste::paste;
use std::collections::{
    HashMap,
    VecDeque,
};

/// Status reads a single-block program takes to fill by default
pub const DEFAULT_BLOCK_POLLS: u32 = 3;

/// One completed write transfer seen by the modelled sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SciTransfer {
    pub addr: u16,
    pub data: Vec<u8>,
}

/// FPGA byte offsets the emulator reacts to
#[derive(Debug, Copy, Clone)]
struct Layout {
    sci_control: usize,
    sci_address: usize,
    sci_datalen: usize,
    sci_fifo: usize,
    sci_read_data: usize,
    seq_ctl: usize,
    seq_status: usize,
    seq_program: usize,
}

#[derive(Debug)]
pub struct Emulator {
    memory: Mock,
    layout: Layout,
    fifo: VecDeque<u8>,
    sensor: HashMap<u16, u16>,
    transfers: Vec<SciTransfer>,
    stuck_sci: bool,
    /// Sub-address whose transfers never finish
    stuck_sci_addr: Option<u16>,
    stuck_sequencer: bool,
    block_polls: u32,
    /// Status reads left before a self-terminating program finishes
    remaining_polls: Option<u32>,
    recording: bool,
    starts: usize,
    stops: usize,
}

macro_rules! emulated_accessors {
    ($($num:ty),*) => {
        paste! {
            $(
                fn [<read_ $num>](&mut self, addr: usize) -> TransportResult<$num> {
                    if addr == self.layout.seq_status {
                        self.tick_sequencer()?;
                    }
                    self.memory.[<read_ $num>](addr)
                }

                fn [<write_ $num>](&mut self, addr: usize, value: $num) -> TransportResult<()> {
                    let ctl = self.seq_ctl()?;
                    self.memory.[<write_ $num>](addr, value)?;
                    self.after_write(addr, u32::from(value), ctl)
                }
            )*
        }
    };
}

impl Emulator {
    /// Build an emulator for the control window described by `registers`
    /// # Errors
    /// Returns an error if `registers` lacks one of the registers the engines are reached by
    pub fn new(registers: &RegisterMap) -> crate::Result<Self> {
        let addr = |name: &str| resolve(registers, Space::Fpga, name.into()).map(|r| r.addr);
        Ok(Self {
            memory: Mock::new(fpga::WINDOW_LEN),
            layout: Layout {
                sci_control: addr(fpga::SENSOR_SCI_CONTROL)?,
                sci_address: addr(fpga::SENSOR_SCI_ADDRESS)?,
                sci_datalen: addr(fpga::SENSOR_SCI_DATALEN)?,
                sci_fifo: addr(fpga::SENSOR_SCI_FIFO_WR)?,
                sci_read_data: addr(fpga::SENSOR_SCI_READ_DATA)?,
                seq_ctl: addr(fpga::SEQ_CTL)?,
                seq_status: addr(fpga::SEQ_STATUS)?,
                seq_program: addr(fpga::SEQ_PGM_MEM_START)?,
            },
            fifo: VecDeque::new(),
            sensor: HashMap::new(),
            transfers: vec![],
            stuck_sci: false,
            stuck_sci_addr: None,
            stuck_sequencer: false,
            block_polls: DEFAULT_BLOCK_POLLS,
            remaining_polls: None,
            recording: false,
            starts: 0,
            stops: 0,
        })
    }

    #[must_use]
    pub fn memory(&self) -> &Mock {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Mock {
        &mut self.memory
    }

    /// The modelled value of a sensor register, if anything has set it
    #[must_use]
    pub fn sensor_register(&self, addr: u16) -> Option<u16> {
        self.sensor.get(&addr).copied()
    }

    pub fn set_sensor_register(&mut self, addr: u16, value: u16) {
        self.sensor.insert(addr, value);
    }

    /// Every write transfer the sensor has received, oldest first
    #[must_use]
    pub fn sci_transfers(&self) -> &[SciTransfer] {
        &self.transfers
    }

    /// Leave the run bit set forever after the next transfer starts
    pub fn set_stuck_sci(&mut self, stuck: bool) {
        self.stuck_sci = stuck;
    }

    /// Leave the run bit set forever on transfers to `addr` only
    pub fn set_stuck_sci_at(&mut self, addr: Option<u16>) {
        self.stuck_sci_addr = addr;
    }

    /// Never let a self-terminating program finish
    pub fn set_stuck_sequencer(&mut self, stuck: bool) {
        self.stuck_sequencer = stuck;
    }

    /// How many status reads a self-terminating program takes to finish
    pub fn set_block_polls(&mut self, polls: u32) {
        self.block_polls = polls;
    }

    /// Finish the running program now, as if memory filled or the block ended
    pub fn terminate_recording(&mut self) -> TransportResult<()> {
        self.set_recording(false)
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Start-record edges seen
    #[must_use]
    pub fn starts(&self) -> usize {
        self.starts
    }

    /// Stop-record edges seen
    #[must_use]
    pub fn stops(&self) -> usize {
        self.stops
    }

    fn seq_ctl(&mut self) -> TransportResult<SeqCtl> {
        let raw = self.memory.read_u32(self.layout.seq_ctl)?;
        SeqCtl::deserialize(raw.to_be_bytes())
    }

    fn set_recording(&mut self, recording: bool) -> TransportResult<()> {
        self.recording = recording;
        if !recording {
            self.remaining_polls = None;
        }
        self.memory
            .write_u32(self.layout.seq_status, u32::from(recording))
    }

    fn tick_sequencer(&mut self) -> TransportResult<()> {
        match self.remaining_polls {
            Some(0) => self.set_recording(false),
            Some(n) => {
                self.remaining_polls = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn after_write(&mut self, addr: usize, value: u32, prev_ctl: SeqCtl) -> TransportResult<()> {
        if addr == self.layout.sci_fifo {
            self.fifo.push_back(value as u8);
        } else if addr == self.layout.sci_control {
            self.run_sci()?;
        } else if addr == self.layout.seq_ctl {
            let ctl = self.seq_ctl()?;
            if ctl.start_rec && !prev_ctl.start_rec {
                self.start_program()?;
            }
            if ctl.stop_rec && !prev_ctl.stop_rec {
                self.stops += 1;
                self.set_recording(false)?;
            }
        }
        Ok(())
    }

    fn start_program(&mut self) -> TransportResult<()> {
        self.starts += 1;
        self.set_recording(true)?;
        let entry: SeqCommand = self.memory.read(self.layout.seq_program)?;
        if entry.term_blk_full && entry.term_rec_blk_end && !self.stuck_sequencer {
            self.remaining_polls = Some(self.block_polls);
        }
        Ok(())
    }

    fn run_sci(&mut self) -> TransportResult<()> {
        let mut control = self.memory.read_u16(self.layout.sci_control)?;
        if control & SCI_FIFO_RESET != 0 {
            self.fifo.clear();
            control &= !SCI_FIFO_RESET;
        }
        if control & SCI_RUN != 0 {
            let addr = self.memory.read_u16(self.layout.sci_address)?;
            if control & SCI_RW == 0 {
                let len = usize::from(self.memory.read_u16(self.layout.sci_datalen)?);
                let len = len.min(self.fifo.len());
                let data: Vec<u8> = self.fifo.drain(..len).collect();
                if let &[hi, lo] = data.as_slice() {
                    self.sensor.insert(addr, u16::from_be_bytes([hi, lo]));
                }
                self.transfers.push(SciTransfer { addr, data });
            } else {
                let value = self.sensor_register(addr).unwrap_or(0);
                self.memory.write_u16(self.layout.sci_read_data, value)?;
            }
            if !self.stuck_sci && self.stuck_sci_addr != Some(addr) {
                control &= !SCI_RUN;
            }
        }
        self.memory.write_u16(self.layout.sci_control, control)
    }
}

impl Transport for Emulator {
    emulated_accessors!(u8, u16, u32);

    fn read_n_bytes(&mut self, addr: usize, n: usize) -> TransportResult<Vec<u8>> {
        self.memory.read_n_bytes(addr, n)
    }

    fn write_bytes(&mut self, addr: usize, data: &[u8]) -> TransportResult<()> {
        self.memory.write_bytes(addr, data)
    }
}
