//! Bus and line doubles that record what they were asked to do, in order
use embedded_hal::{
    digital::{
        self,
        OutputPin,
    },
    spi::{
        self,
        SpiBus,
    },
};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};

/// Name the mock SPI bus answers to in [`BusLog::set_failing`]
pub const SPI_NAME: &str = "spi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A named line was driven
    Pin { name: &'static str, high: bool },
    /// Bytes went out on the SPI bus
    Spi(Vec<u8>),
}

/// What a failing mock device returns
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MockFault;

impl spi::Error for MockFault {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

impl digital::Error for MockFault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// A shared, ordered log of bus traffic, and the set of devices told to fail
#[derive(Debug, Clone, Default)]
pub struct BusLog {
    events: Arc<Mutex<Vec<BusEvent>>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
}

impl BusLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: BusEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Fail every operation on the device called `name` from now on, or stop failing
    pub fn set_failing(&self, name: &'static str, failing: bool) {
        let mut set = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing {
            set.insert(name);
        } else {
            set.remove(name);
        }
    }

    fn check(&self, name: &str) -> Result<(), MockFault> {
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
        {
            Err(MockFault)
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn events(&self) -> Vec<BusEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// An SPI bus that logs here
    #[must_use]
    pub fn spi(&self) -> MockSpi {
        MockSpi { log: self.clone() }
    }

    /// An output line that logs here
    #[must_use]
    pub fn pin(&self, name: &'static str) -> MockPin {
        MockPin {
            name,
            high: false,
            log: self.clone(),
        }
    }

    /// The 16-bit words clocked out while line `cs` was low, host byte order
    #[must_use]
    pub fn framed_words(&self, cs: &str) -> Vec<u16> {
        let mut selected = false;
        let mut words = vec![];
        for event in self.events() {
            match event {
                BusEvent::Pin { name, high } if name == cs => selected = !high,
                BusEvent::Spi(bytes) if selected => words.extend(
                    bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
                ),
                _ => (),
            }
        }
        words
    }

    /// The levels a named line was driven to, in order
    #[must_use]
    pub fn levels(&self, line: &str) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BusEvent::Pin { name, high } if name == line => Some(high),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MockSpi {
    log: BusLog,
}

impl spi::ErrorType for MockSpi {
    type Error = MockFault;
}

impl SpiBus<u8> for MockSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.log.check(SPI_NAME)?;
        words.fill(0);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.log.check(SPI_NAME)?;
        self.log.push(BusEvent::Spi(words.to_vec()));
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.write(write)?;
        read.fill(0);
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.write(words)?;
        words.fill(0);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.log.check(SPI_NAME)
    }
}

#[derive(Debug, Clone)]
pub struct MockPin {
    name: &'static str,
    high: bool,
    log: BusLog,
}

impl MockPin {
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl digital::ErrorType for MockPin {
    type Error = MockFault;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.check(self.name)?;
        self.high = false;
        self.log.push(BusEvent::Pin {
            name: self.name,
            high: false,
        });
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.check(self.name)?;
        self.high = true;
        self.log.push(BusEvent::Pin {
            name: self.name,
            high: true,
        });
        Ok(())
    }
}
