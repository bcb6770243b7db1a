#![cfg_attr(not(test), no_std)]

//! Kernel module that reports battery capacity from the measured voltage
//!
//! Helpful links:
//!
//! https://github.com/bmax121/KernelPatch/blob/main/kernel/include/hook.h
//! https://github.com/torvalds/linux/blob/master/include/linux/power_supply.h

pub use qbc_common;
pub use qbc_hooks;

pub mod lifecycle;
pub mod logger;

#[cfg(any(test, feature = "kernelpatch"))]
mod kernel_patch;

#[allow(dead_code)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Name the module registers under.
pub const MODULE_NAME: &str = "qti_battery_charger";
