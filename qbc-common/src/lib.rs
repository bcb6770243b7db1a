#![cfg_attr(not(test), no_std)]

pub use crate::error::Error;
pub use crate::host::{HookHostExt, HookSite, Symbol};
pub use crate::power_supply::{MicroVolts, Property, PropertyValue, Status};
pub use crate::voltage_map::{estimate_capacity, Breakpoint, MapError, VoltageCapacityMap};
pub use err_derive;

mod error;
mod host;
mod power_supply;
pub mod voltage_map;
