//! Binding to the KernelPatch module ABI
//!
//! The layouts, property codes and `.kpm.info` strings here build on any
//! host so they can be checked by the test suite. The symbols the module
//! imports and the sections it exports live in `module`, which only exists
//! in aarch64 kernel builds.
#![cfg_attr(not(all(target_arch = "aarch64", not(test))), allow(dead_code))]

#[cfg(all(target_arch = "aarch64", not(test)))]
mod module;

use crate::MODULE_NAME;
use core::{
    ffi::{c_char, c_int, c_void},
    ptr,
};
use qbc_common::{Property, PropertyValue};

/// Size of `struct module`'s name, `MODULE_NAME_LEN` in the kernel.
const MODULE_NAME_LEN: usize = 64 - core::mem::size_of::<usize>();

/// `struct module` up to and including its name.
#[allow(dead_code)]
#[repr(C)]
struct ModuleHead {
    state: c_int,
    list: [*mut c_void; 2],
    name: [u8; MODULE_NAME_LEN],
}

impl ModuleHead {
    /// The name up to its NUL terminator.
    fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        &self.name[..len]
    }
}

/// `hook_fargs4_t`, shared by every hook arity up to four.
#[allow(dead_code)]
#[repr(C)]
struct HookFargs {
    chain: *mut c_void,
    skip_origin: c_int,
    local: [u64; 8],
    ret: u64,
    args: [u64; 4],
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(core::mem::offset_of!(ModuleHead, name) == 24);
    assert!(core::mem::offset_of!(HookFargs, skip_origin) == 8);
    assert!(core::mem::offset_of!(HookFargs, ret) == 80);
    assert!(core::mem::offset_of!(HookFargs, args) == 88);
    assert!(core::mem::size_of::<RawPropVal>() == 8);
};

const _: () = assert!(MODULE_NAME.len() < MODULE_NAME_LEN);

/// `union power_supply_propval`.
#[repr(C)]
pub union RawPropVal {
    intval: c_int,
    strval: *const c_char,
}

impl Default for RawPropVal {
    fn default() -> Self {
        RawPropVal { strval: ptr::null() }
    }
}

impl PropertyValue for RawPropVal {
    fn int(&self) -> i32 {
        // SAFETY: every bit pattern is a valid c_int
        unsafe { self.intval }
    }

    fn set_int(&mut self, value: i32) {
        self.intval = value;
    }

    /// The kernel hands out a buffer sized for the longest model name, the
    /// length is not checked here.
    fn write_str_with_nul(&mut self, bytes: &[u8]) {
        // SAFETY: strval points at the caller's model-name buffer for
        // MODEL_NAME queries, which holds at least bytes.len() bytes
        unsafe {
            let dst = self.strval as *mut u8;
            if !dst.is_null() {
                ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            }
        }
    }
}

/// `enum power_supply_property` codes of the target kernel.
#[derive(Debug)]
pub struct PropertyCodes {
    pub voltage_now: u32,
    pub capacity: u32,
    pub model_name: u32,
}

impl PropertyCodes {
    pub const GKI_5_15: PropertyCodes = PropertyCodes {
        voltage_now: 12,
        capacity: 46,
        model_name: 72,
    };

    fn decode(&self, code: u32) -> Property {
        match code {
            c if c == self.voltage_now => Property::VoltageNow,
            c if c == self.capacity => Property::Capacity,
            c if c == self.model_name => Property::ModelName,
            other => Property::Other(other),
        }
    }

    fn encode(&self, prop: Property) -> u32 {
        match prop {
            Property::VoltageNow => self.voltage_now,
            Property::Capacity => self.capacity,
            Property::ModelName => self.model_name,
            Property::Other(code) => code,
        }
    }
}

const CODES: PropertyCodes = PropertyCodes::GKI_5_15;

const fn info<const N: usize>(s: &str) -> [u8; N] {
    let bytes = s.as_bytes();
    let mut out = [0u8; N];
    let mut i = 0;
    while i < bytes.len() {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// NUL-terminated `key=value` records for the `.kpm.info` section.
macro_rules! kpm_info {
    ($($ident:ident = $info:expr;)*) => {
        $(const $ident: [u8; $info.len() + 1] = info($info);)*
    };
}

kpm_info! {
    INFO_NAME = "name=qti_battery_charger";
    INFO_VERSION = concat!("version=", env!("CARGO_PKG_VERSION"));
    INFO_LICENSE = "license=GPL v2";
    INFO_AUTHOR = "author=lzghzr";
    INFO_DESCRIPTION = "description=set battery_psy_get_prop value based on voltage";
}
