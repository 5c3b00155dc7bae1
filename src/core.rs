//! The core types for describing the camera's register spaces
use chronos_utils::board::RegisterEntry;
use kstring::KString;
use std::{
    collections::HashMap,
    fmt,
};

/// The representation of a named register
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    /// Byte offset into the FPGA window, or the sub-address in the sensor's bank
    pub addr: usize,
    /// The bits of the register this name refers to, `None` for the whole register
    pub mask: Option<u32>,
}

impl Register {
    #[must_use]
    pub const fn new(addr: usize) -> Self {
        Self { addr, mask: None }
    }

    #[must_use]
    pub const fn field(addr: usize, mask: u32) -> Self {
        Self {
            addr,
            mask: Some(mask),
        }
    }
}

impl From<RegisterEntry> for Register {
    fn from(entry: RegisterEntry) -> Self {
        Self {
            addr: entry.addr as usize,
            mask: (entry.mask != 0).then_some(entry.mask),
        }
    }
}

/// The mapping from register names and their descriptors
pub type RegisterMap = HashMap<KString, Register>;

/// Replace or add the entries of `map` with those parsed from a board file
pub fn overlay(map: &mut RegisterMap, entries: &HashMap<KString, RegisterEntry>) {
    for (name, entry) in entries {
        map.insert(name.clone(), (*entry).into());
    }
}

/// The independent address spaces registers and writes live in
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Space {
    Fpga,
    Sensor,
    FrameBuffer,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Fpga => write!(f, "FPGA"),
            Space::Sensor => write!(f, "sensor"),
            Space::FrameBuffer => write!(f, "frame buffer"),
        }
    }
}

/// Either a symbolic register name or a raw address that bypasses the symbol table
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegRef<'a> {
    Name(&'a str),
    Addr(usize),
}

impl<'a> From<&'a str> for RegRef<'a> {
    fn from(name: &'a str) -> Self {
        RegRef::Name(name)
    }
}

impl From<usize> for RegRef<'static> {
    fn from(addr: usize) -> Self {
        RegRef::Addr(addr)
    }
}

/// Resolve a reference against `map`. Raw addresses carry no mask.
/// # Errors
/// Returns [`crate::Error::UnknownRegister`] if the name isn't in the map
pub fn resolve(map: &RegisterMap, space: Space, reg: RegRef) -> crate::Result<Register> {
    match reg {
        RegRef::Addr(addr) => Ok(Register::new(addr)),
        RegRef::Name(name) => map
            .get(name)
            .copied()
            .ok_or_else(|| crate::Error::UnknownRegister {
                space,
                name: name.to_owned(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_resolve() {
        let map = RegisterMap::from([("SEQ_CTL".into(), Register::new(0x40))]);
        assert_eq!(
            resolve(&map, Space::Fpga, "SEQ_CTL".into()).unwrap(),
            Register::new(0x40)
        );
        assert_eq!(
            resolve(&map, Space::Fpga, 0x44usize.into()).unwrap(),
            Register::new(0x44)
        );
        assert!(matches!(
            resolve(&map, Space::Sensor, "NOPE".into()),
            Err(Error::UnknownRegister { space: Space::Sensor, .. })
        ));
    }

    #[test]
    fn test_overlay() {
        let mut map = RegisterMap::from([("SEQ_CTL".into(), Register::new(0x40))]);
        let entries = HashMap::from([
            ("SEQ_CTL".into(), RegisterEntry { addr: 0x80, mask: 0 }),
            ("TIMING_EN".into(), RegisterEntry { addr: 0x1, mask: 0x1 }),
        ]);
        overlay(&mut map, &entries);
        assert_eq!(map["SEQ_CTL"], Register::new(0x80));
        assert_eq!(map["TIMING_EN"], Register::field(0x1, 0x1));
    }
}
