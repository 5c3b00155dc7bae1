//! Optional hooks for watching hardware writes go by.
//!
//! Nothing in the crate depends on an observer being installed.
use crate::core::Space;
use std::{
    fmt::Debug,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
    },
};
use tracing::trace;

/// One write as it reached (or was about to reach) a bus
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    pub space: Space,
    /// Byte address in the FPGA or frame buffer window, sub-address for the sensor
    pub addr: usize,
    /// Access width in bits
    pub width: u8,
    pub value: u32,
}

pub trait WriteObserver: Debug + Send + Sync {
    fn on_write(&self, event: &WriteEvent);
}

/// Shared handle to an installed observer
pub type Observer = Option<Arc<dyn WriteObserver>>;

pub(crate) fn notify(observer: &Observer, space: Space, addr: usize, width: u8, value: u32) {
    if let Some(obs) = observer {
        obs.on_write(&WriteEvent {
            space,
            addr,
            width,
            value,
        });
    }
}

/// Logs every write at trace level
#[derive(Debug, Default)]
pub struct TracingObserver;

impl WriteObserver for TracingObserver {
    fn on_write(&self, event: &WriteEvent) {
        trace!(
            space = %event.space,
            addr = format_args!("{:#06x}", event.addr),
            width = event.width,
            value = format_args!("{:#x}", event.value),
            "write"
        );
    }
}

/// Counts writes, per address space
#[derive(Debug, Default)]
pub struct CountingObserver {
    fpga: AtomicU64,
    sensor: AtomicU64,
    frame_buffer: AtomicU64,
}

impl CountingObserver {
    #[must_use]
    pub fn count(&self, space: Space) -> u64 {
        self.counter(space).load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.count(Space::Fpga) + self.count(Space::Sensor) + self.count(Space::FrameBuffer)
    }

    fn counter(&self, space: Space) -> &AtomicU64 {
        match space {
            Space::Fpga => &self.fpga,
            Space::Sensor => &self.sensor,
            Space::FrameBuffer => &self.frame_buffer,
        }
    }
}

impl WriteObserver for CountingObserver {
    fn on_write(&self, event: &WriteEvent) {
        self.counter(event.space).fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let counter = Arc::new(CountingObserver::default());
        let observer: Observer = Some(counter.clone());
        notify(&observer, Space::Fpga, 0x40, 32, 2);
        notify(&observer, Space::Fpga, 0x40, 32, 0);
        notify(&observer, Space::Sensor, 0x05, 16, 0x10);
        assert_eq!(counter.count(Space::Fpga), 2);
        assert_eq!(counter.count(Space::Sensor), 1);
        assert_eq!(counter.total(), 3);
    }

    #[test]
    fn test_no_observer() {
        notify(&None, Space::FrameBuffer, 0, 8, 0xFF);
    }
}
