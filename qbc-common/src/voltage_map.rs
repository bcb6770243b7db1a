//! Piecewise-linear mapping from battery voltage to remaining capacity

use crate::MicroVolts;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Breakpoint {
    pub voltage: MicroVolts,
    pub capacity: u8,
}

impl Breakpoint {
    pub const fn new(voltage_uv: i32, capacity: u8) -> Self {
        Breakpoint {
            voltage: MicroVolts(voltage_uv),
            capacity,
        }
    }
}

/// 3.10V = 0%, 4.48V = 100%
pub const DEFAULT_BREAKPOINTS: [Breakpoint; 9] = [
    Breakpoint::new(3_100_000, 0),
    Breakpoint::new(3_300_000, 10),
    Breakpoint::new(3_500_000, 25),
    Breakpoint::new(3_700_000, 40),
    Breakpoint::new(3_850_000, 55),
    Breakpoint::new(4_000_000, 70),
    Breakpoint::new(4_150_000, 85),
    Breakpoint::new(4_300_000, 95),
    Breakpoint::new(4_480_000, 100),
];

#[derive(Copy, Clone, Eq, PartialEq, Debug, err_derive::Error)]
pub enum MapError {
    #[error(display = "Map needs at least two breakpoints, got {}", _0)]
    TooFewBreakpoints(usize),

    #[error(display = "Breakpoint {} has a non-positive voltage", _0)]
    NonPositiveVoltage(usize),

    #[error(display = "Breakpoint {} voltage does not increase", _0)]
    VoltageNotIncreasing(usize),

    #[error(display = "Breakpoint {} capacity decreases", _0)]
    CapacityDecreasing(usize),

    #[error(display = "Breakpoint {} capacity is above 100%", _0)]
    CapacityOutOfRange(usize),

    #[error(display = "Map must run from 0% to 100%")]
    NotSaturated,
}

/// An ordered, validated set of breakpoints.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct VoltageCapacityMap<'a> {
    breakpoints: &'a [Breakpoint],
}

impl Default for VoltageCapacityMap<'static> {
    fn default() -> Self {
        VoltageCapacityMap::DEFAULT
    }
}

impl<'a> VoltageCapacityMap<'a> {
    pub const DEFAULT: VoltageCapacityMap<'static> = VoltageCapacityMap {
        breakpoints: &DEFAULT_BREAKPOINTS,
    };

    pub fn new(breakpoints: &'a [Breakpoint]) -> Result<Self, MapError> {
        if breakpoints.len() < 2 {
            return Err(MapError::TooFewBreakpoints(breakpoints.len()));
        }
        for (i, bp) in breakpoints.iter().enumerate() {
            if !bp.voltage.is_positive() {
                return Err(MapError::NonPositiveVoltage(i));
            }
            if bp.capacity > 100 {
                return Err(MapError::CapacityOutOfRange(i));
            }
        }
        for (i, pair) in breakpoints.windows(2).enumerate() {
            if pair[1].voltage <= pair[0].voltage {
                return Err(MapError::VoltageNotIncreasing(i + 1));
            }
            if pair[1].capacity < pair[0].capacity {
                return Err(MapError::CapacityDecreasing(i + 1));
            }
        }
        let first = breakpoints[0].capacity;
        let last = breakpoints[breakpoints.len() - 1].capacity;
        if first != 0 || last != 100 {
            return Err(MapError::NotSaturated);
        }
        Ok(VoltageCapacityMap { breakpoints })
    }

    pub fn breakpoints(&self) -> &'a [Breakpoint] {
        self.breakpoints
    }

    pub fn min_voltage(&self) -> MicroVolts {
        self.breakpoints[0].voltage
    }

    pub fn max_voltage(&self) -> MicroVolts {
        self.breakpoints[self.breakpoints.len() - 1].voltage
    }

    /// Capacity percentage for the given voltage, truncating between
    /// breakpoints.
    pub fn capacity_at(&self, voltage: MicroVolts) -> u8 {
        let first = &self.breakpoints[0];
        let last = &self.breakpoints[self.breakpoints.len() - 1];
        if voltage <= first.voltage {
            return first.capacity;
        }
        if voltage >= last.voltage {
            return last.capacity;
        }

        let segment = self
            .breakpoints
            .windows(2)
            .find(|pair| voltage >= pair[0].voltage && voltage < pair[1].voltage);
        let (lo, hi) = match segment {
            Some(pair) => (&pair[0], &pair[1]),
            // Unreachable for a validated map, the ends were handled above
            None => return first.capacity,
        };

        let dv = i64::from(hi.voltage.0) - i64::from(lo.voltage.0);
        if dv <= 0 {
            return lo.capacity;
        }
        let dc = i64::from(hi.capacity) - i64::from(lo.capacity);
        let position = i64::from(voltage.0) - i64::from(lo.voltage.0);
        let step = (dc * position) / dv;

        // 0 <= position < dv, so step stays within [0, dc)
        lo.capacity + step as u8
    }
}

/// Smoothed capacity for a `VOLTAGE_NOW` reading using the default map.
pub fn estimate_capacity(voltage_uv: i32) -> i32 {
    i32::from(VoltageCapacityMap::DEFAULT.capacity_at(MicroVolts(voltage_uv)))
}
