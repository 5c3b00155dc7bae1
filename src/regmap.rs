//! Default symbol tables for the Chronos 1.4 FPGA image and the LUX1310 image sensor.
//!
//! Board description files may override or extend these with `?register` and `?sensor` lines.

/// FPGA-side registers, byte offsets into the control window
pub mod fpga {
    use crate::core::{
        Register,
        RegisterMap,
    };

    pub const IMAGE_SENSOR_CONTROL: &str = "IMAGE_SENSOR_CONTROL";
    pub const IMAGE_SENSOR_RESET: &str = "IMAGE_SENSOR_RESET";
    pub const SENSOR_CLK_PHASE: &str = "SENSOR_CLK_PHASE";
    pub const SENSOR_DATA_CORRECT: &str = "SENSOR_DATA_CORRECT";
    pub const IMAGER_FRAME_PERIOD: &str = "IMAGER_FRAME_PERIOD";
    pub const IMAGER_INT_TIME: &str = "IMAGER_INT_TIME";
    pub const SENSOR_SCI_CONTROL: &str = "SENSOR_SCI_CONTROL";
    pub const SENSOR_SCI_ADDRESS: &str = "SENSOR_SCI_ADDRESS";
    pub const SENSOR_SCI_DATALEN: &str = "SENSOR_SCI_DATALEN";
    pub const SENSOR_SCI_FIFO_WR: &str = "SENSOR_SCI_FIFO_WR";
    pub const SENSOR_SCI_READ_DATA: &str = "SENSOR_SCI_READ_DATA";
    pub const SEQ_CTL: &str = "SEQ_CTL";
    pub const SEQ_STATUS: &str = "SEQ_STATUS";
    pub const SEQ_FRAME_SIZE: &str = "SEQ_FRAME_SIZE";
    pub const SEQ_REC_REGION_START: &str = "SEQ_REC_REGION_START";
    pub const SEQ_REC_REGION_END: &str = "SEQ_REC_REGION_END";
    pub const SEQ_TRIG_DELAY: &str = "SEQ_TRIG_DELAY";
    pub const SENSOR_MAGIC_START_DELAY: &str = "SENSOR_MAGIC_START_DELAY";
    pub const SENSOR_LINE_PERIOD: &str = "SENSOR_LINE_PERIOD";
    pub const SEQ_PGM_MEM_START: &str = "SEQ_PGM_MEM_START";
    pub const FPGA_VERSION: &str = "FPGA_VERSION";
    pub const FPGA_SUBVERSION: &str = "FPGA_SUBVERSION";
    pub const COL_GAIN_MEM: &str = "COL_GAIN_MEM";
    pub const COL_OFFSET_MEM: &str = "COL_OFFSET_MEM";
    pub const COL_CURVE_MEM: &str = "COL_CURVE_MEM";

    /// Size of the control window the default map lives in
    pub const WINDOW_LEN: usize = 0x1_0000;

    #[must_use]
    pub fn defaults() -> RegisterMap {
        RegisterMap::from([
            (IMAGE_SENSOR_CONTROL.into(), Register::new(0x0000)),
            (IMAGE_SENSOR_RESET.into(), Register::field(0x0000, 0x0001)),
            (SENSOR_CLK_PHASE.into(), Register::new(0x0004)),
            (SENSOR_DATA_CORRECT.into(), Register::new(0x000C)),
            (IMAGER_FRAME_PERIOD.into(), Register::new(0x001C)),
            (IMAGER_INT_TIME.into(), Register::new(0x0020)),
            (SENSOR_SCI_CONTROL.into(), Register::new(0x0024)),
            (SENSOR_SCI_ADDRESS.into(), Register::new(0x0028)),
            (SENSOR_SCI_DATALEN.into(), Register::new(0x002C)),
            (SENSOR_SCI_FIFO_WR.into(), Register::new(0x0030)),
            (SENSOR_SCI_READ_DATA.into(), Register::new(0x0034)),
            (SEQ_CTL.into(), Register::new(0x0040)),
            (SEQ_STATUS.into(), Register::new(0x0044)),
            (SEQ_FRAME_SIZE.into(), Register::new(0x0048)),
            (SEQ_REC_REGION_START.into(), Register::new(0x004C)),
            (SEQ_REC_REGION_END.into(), Register::new(0x0050)),
            (SEQ_TRIG_DELAY.into(), Register::new(0x0060)),
            (SENSOR_MAGIC_START_DELAY.into(), Register::new(0x0068)),
            (SENSOR_LINE_PERIOD.into(), Register::new(0x006C)),
            (SEQ_PGM_MEM_START.into(), Register::new(0x0100)),
            (FPGA_VERSION.into(), Register::new(0x0400)),
            (FPGA_SUBVERSION.into(), Register::new(0x0402)),
            (COL_GAIN_MEM.into(), Register::new(0x1000)),
            (COL_OFFSET_MEM.into(), Register::new(0x5000)),
            (COL_CURVE_MEM.into(), Register::new(0xD000)),
        ])
    }
}

/// LUX1310 registers reached over SCI, as (sub-address, field mask)
pub mod lux1310 {
    use crate::core::{
        Register,
        RegisterMap,
    };

    pub const REV_CHIP: &str = "LUX1310_SCI_REV_CHIP";
    pub const CHIP_ID: &str = "LUX1310_SCI_CHIP_ID";
    pub const TIMING_EN: &str = "LUX1310_SCI_TIMING_EN";
    pub const SOF_DELAY: &str = "LUX1310_SCI_SOF_DELAY";
    pub const HBLANK: &str = "LUX1310_SCI_HBLANK";
    pub const ROI_NB: &str = "LUX1310_SCI_ROI_NB";
    pub const X_START: &str = "LUX1310_SCI_X_START";
    pub const X_END: &str = "LUX1310_SCI_X_END";
    pub const Y_START: &str = "LUX1310_SCI_Y_START";
    pub const Y_END: &str = "LUX1310_SCI_Y_END";
    pub const CUST_PAT: &str = "LUX1310_SCI_CUST_PAT";
    pub const TST_PAT: &str = "LUX1310_SCI_TST_PAT";
    pub const PCLK_VBLANK: &str = "LUX1310_SCI_PCLK_VBLANK";
    pub const DAC_ILV: &str = "LUX1310_SCI_DAC_ILV";
    pub const ADC_CAL_EN: &str = "LUX1310_SCI_ADC_CAL_EN";
    pub const LINE_VALID_DLY: &str = "LUX1310_SCI_LINE_VALID_DLY";
    pub const STATE_IDLE_CTRL0: &str = "LUX1310_SCI_STATE_IDLE_CTRL0";
    pub const STATE_IDLE_CTRL1: &str = "LUX1310_SCI_STATE_IDLE_CTRL1";
    pub const STATE_IDLE_CTRL2: &str = "LUX1310_SCI_STATE_IDLE_CTRL2";
    pub const GAIN_SEL_SAMP: &str = "LUX1310_SCI_GAIN_SEL_SAMP";
    pub const GAIN_SEL_FB: &str = "LUX1310_SCI_GAIN_SEL_FB";
    pub const GAIN_BIT: &str = "LUX1310_SCI_GAIN_BIT";
    pub const ADC_CLOCK_CTRL: &str = "LUX1310_SCI_ADC_CLOCK_CTRL";
    pub const RDOUT_DLY: &str = "LUX1310_SCI_RDOUT_DLY";
    pub const WAVETAB_SIZE: &str = "LUX1310_SCI_WAVETAB_SIZE";
    pub const SEL_VCM: &str = "LUX1310_SCI_SEL_VCM";
    pub const INT_CLK_TIMING: &str = "LUX1310_SCI_INT_CLK_TIMING";
    pub const TERMB_RXCLK: &str = "LUX1310_SCI_TERMB_RXCLK";
    pub const SRESET_B: &str = "LUX1310_SCI_SRESET_B";

    /// The sixteen per-ADC offset registers
    pub const ADC_OS: [&str; 16] = [
        "LUX1310_SCI_ADC_OS_0",
        "LUX1310_SCI_ADC_OS_1",
        "LUX1310_SCI_ADC_OS_2",
        "LUX1310_SCI_ADC_OS_3",
        "LUX1310_SCI_ADC_OS_4",
        "LUX1310_SCI_ADC_OS_5",
        "LUX1310_SCI_ADC_OS_6",
        "LUX1310_SCI_ADC_OS_7",
        "LUX1310_SCI_ADC_OS_8",
        "LUX1310_SCI_ADC_OS_9",
        "LUX1310_SCI_ADC_OS_10",
        "LUX1310_SCI_ADC_OS_11",
        "LUX1310_SCI_ADC_OS_12",
        "LUX1310_SCI_ADC_OS_13",
        "LUX1310_SCI_ADC_OS_14",
        "LUX1310_SCI_ADC_OS_15",
    ];

    /// Sub-address the wavetable SRAM is streamed into
    pub const WAVETABLE_ADDR: u16 = 0x7F;
    /// Undocumented register that needs a revision-specific value
    pub const REV_TUNING_ADDR: usize = 0x7B;

    #[must_use]
    pub fn defaults() -> RegisterMap {
        let mut map = RegisterMap::from([
            (REV_CHIP.into(), Register::field(0x00, 0x00FF)),
            (CHIP_ID.into(), Register::field(0x00, 0xFF00)),
            (TIMING_EN.into(), Register::field(0x01, 0x0001)),
            (SOF_DELAY.into(), Register::field(0x02, 0x00FF)),
            (HBLANK.into(), Register::field(0x03, 0xFFFF)),
            (ROI_NB.into(), Register::field(0x04, 0x0007)),
            (X_START.into(), Register::field(0x05, 0x07FF)),
            (X_END.into(), Register::field(0x06, 0x07FF)),
            (Y_START.into(), Register::field(0x07, 0x03FF)),
            (Y_END.into(), Register::field(0x08, 0x03FF)),
            (CUST_PAT.into(), Register::field(0x12, 0x0FFF)),
            (TST_PAT.into(), Register::field(0x13, 0x0003)),
            (PCLK_VBLANK.into(), Register::field(0x14, 0x0FFF)),
            (DAC_ILV.into(), Register::field(0x2D, 0xFFFF)),
            (ADC_CAL_EN.into(), Register::field(0x4A, 0x0001)),
            (LINE_VALID_DLY.into(), Register::field(0x4D, 0x003F)),
            (STATE_IDLE_CTRL0.into(), Register::field(0x4E, 0xFFFF)),
            (STATE_IDLE_CTRL1.into(), Register::field(0x4F, 0xFFFF)),
            (STATE_IDLE_CTRL2.into(), Register::field(0x50, 0xFFFF)),
            (GAIN_SEL_SAMP.into(), Register::field(0x51, 0x7FFF)),
            (GAIN_SEL_FB.into(), Register::field(0x52, 0x00FF)),
            (GAIN_BIT.into(), Register::field(0x53, 0x0003)),
            (ADC_CLOCK_CTRL.into(), Register::field(0x54, 0xFFFF)),
            (RDOUT_DLY.into(), Register::field(0x56, 0x00FF)),
            (WAVETAB_SIZE.into(), Register::field(0x57, 0x00FF)),
            (SEL_VCM.into(), Register::field(0x58, 0xFFFF)),
            (INT_CLK_TIMING.into(), Register::field(0x5A, 0xFFFF)),
            (TERMB_RXCLK.into(), Register::field(0x5B, 0xFFFF)),
            (SRESET_B.into(), Register::field(0x7E, 0x0001)),
        ]);
        for (i, name) in ADC_OS.iter().enumerate() {
            map.insert((*name).into(), Register::field(0x3A + i, 0x07FF));
        }
        map
    }
}
