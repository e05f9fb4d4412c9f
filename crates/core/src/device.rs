use std::fmt;

/// Execution target a node is assigned to.
/// Placement happens upstream; this crate only compares and records devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Device(pub i32);

impl Device {
    /// No device assigned. Two unset devices compare equal.
    pub const UNSET: Device = Device(-1);

    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    pub const fn is_set(self) -> bool {
        self.0 != Self::UNSET.0
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::UNSET
    }
}

impl From<i32> for Device {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set() {
            write!(f, "dev{}", self.0)
        } else {
            write!(f, "unset")
        }
    }
}

#[test]
fn unset_is_default() {
    assert_eq!(Device::default(), Device::UNSET);
    assert!(!Device::default().is_set());
    assert!(Device::new(0).is_set());
    assert_eq!(Device::new(3).to_string(), "dev3");
    assert_eq!(Device::UNSET.to_string(), "unset");
}
