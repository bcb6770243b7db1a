use bitflags::bitflags;
use core::ffi::CStr;
use qbc_common::VoltageCapacityMap;

bitflags! {
    /// Which properties the post-hook rewrites.
    pub struct Overrides: u8 {
        const CAPACITY = 1 << 0;
        const MODEL_NAME = 1 << 1;
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InterceptorConfig<'a> {
    /// Kernel function that answers battery property queries
    pub accessor_symbol: &'a str,

    /// Kernel function run as each module finishes loading
    pub module_init_symbol: &'a str,

    /// Module that provides `accessor_symbol` when it is not built in
    pub target_module: &'a str,

    /// Reported in place of the native model name
    pub model_name: &'a CStr,

    /// Lowest capacity reported when the voltage cannot be read
    pub capacity_floor: i32,

    pub map: VoltageCapacityMap<'a>,

    pub overrides: Overrides,
}

impl InterceptorConfig<'static> {
    pub const DEFAULT: InterceptorConfig<'static> = InterceptorConfig {
        accessor_symbol: "battery_psy_get_prop",
        module_init_symbol: "do_init_module",
        target_module: "qti_battery_charger",
        model_name: c"SNYSCA6",
        capacity_floor: 10,
        map: VoltageCapacityMap::DEFAULT,
        overrides: Overrides::all(),
    };
}

impl Default for InterceptorConfig<'static> {
    fn default() -> Self {
        InterceptorConfig::DEFAULT
    }
}
