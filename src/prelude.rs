//! Prelude (helpful reexports) for this package

pub use crate::{
    bus::{
        export_output,
        open_spi,
        SpidevBus,
        SysfsPin,
    },
    camera::{
        Camera,
        CameraIo,
    },
    config::BoardConfig,
    sensor::{
        ImageGeometry,
        SensorOps,
    },
    sequencer::{
        RecordMode,
        RecordSettings,
    },
    transport::{
        local::Local,
        Transport,
    },
};
pub use chronos_utils::board::read_board_file;
pub use fixed::prelude::*;
