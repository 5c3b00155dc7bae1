//! In this example, we will map the FPGA on a Chronos 1.4, bring the LUX1310 up, set a smaller
//! window at 1000 fps, black-calibrate, and make a short ring buffer recording.
//!
//! Run on the camera as root: `bringup /etc/chronos/board.txt`

use chronosfpga::prelude::*;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // The board file carries the wavetables, so it isn't optional
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/chronos/board.txt".to_owned());
    let config = BoardConfig::from_board(&read_board_file(&path)?)?;

    let io = CameraIo {
        fpga: Local::new(config.fpga_window)?,
        ram: Local::new(config.ram_window)?,
        spi: open_spi(&config.spi)?,
        dac_cs: export_output(config.dac_cs_gpio)?,
        record_leds: config
            .record_led_gpios
            .iter()
            .map(|&line| export_output(line))
            .collect::<Result<Vec<_>, _>>()?,
        observer: None,
    };
    let mut camera = Camera::new(config, io)?;
    camera.init()?;
    println!("FPGA version {}", camera.fpga_version()?);

    camera.set_resolution(ImageGeometry::new(640, 480, 320, 272))?;
    let period = camera.set_frame_period(1_000_000)?;
    let exposure = camera.set_exposure(900_000)?;
    println!(
        "Period {} ns{}, exposure {} ns{}",
        period.value,
        if period.clamped { " (clamped)" } else { "" },
        exposure.value,
        if exposure.clamped { " (clamped)" } else { "" },
    );
    camera.set_gain(6)?;

    // Lens cap on
    let correction = camera.run_calibration()?;
    println!("Column offsets - {:?}", &correction.offset[..16]);

    camera.start_recording(&RecordSettings::default())?;
    std::thread::sleep(Duration::from_secs(1));
    camera.stop_recording()?;
    println!(
        "Recorded into {} frames of {:?}",
        camera.recording_region().total_frames,
        camera.geometry()
    );
    Ok(())
}
