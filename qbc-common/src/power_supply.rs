use core::fmt;

/// Battery terminal voltage as reported by `VOLTAGE_NOW`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct MicroVolts(pub i32);

impl MicroVolts {
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for MicroVolts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} uV", self.0)
    }
}

/// The power-supply properties the interceptor cares about.
///
/// Hosts translate their own property enumeration into this one; every code
/// that is not recognized is carried through as `Other` so it can be
/// forwarded untouched.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Property {
    Capacity,
    VoltageNow,
    ModelName,
    Other(u32),
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Property::*;
        match self {
            Capacity => f.write_str("capacity"),
            VoltageNow => f.write_str("voltage_now"),
            ModelName => f.write_str("model_name"),
            Other(code) => write!(f, "property #{}", code),
        }
    }
}

/// Return code of a property accessor, zero on success.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The writable result slot of a property query.
///
/// Mirrors the host's tagged union: an integer view used for voltages and
/// percentages, and a caller-owned character buffer used for strings.
pub trait PropertyValue: Default {
    fn int(&self) -> i32;

    fn set_int(&mut self, value: i32);

    /// Copy `bytes` (which already end in a NUL) into the string buffer.
    ///
    /// The caller's buffer is assumed to hold at least `bytes.len()` bytes.
    fn write_str_with_nul(&mut self, bytes: &[u8]);
}
