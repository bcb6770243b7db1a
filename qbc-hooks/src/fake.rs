//! In-memory host kernel for tests and the simulator
//!
//! Holds a symbol table, the set of attached hooks and a native battery whose
//! readings the test controls. [`get_property`] and [`load_module`] play the
//! part of the kernel calling into hooked functions. [`routed`] builds an
//! interceptor whose secondary accessor call lands back in its own post-hook,
//! the way a trampoline-only host behaves.

extern crate std;

use crate::{HookOutcome, Interceptor, InterceptorConfig};
use qbc_common::{HookHostExt, HookSite, Property, PropertyValue, Status, Symbol};
use std::{
    string::{String, ToString},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    vec::Vec,
};

pub const GET_PROPERTY_ADDR: Symbol = Symbol(0x1000);
pub const MODULE_INIT_ADDR: Symbol = Symbol(0x2000);

/// Symbols the charger driver makes resolvable once loaded.
pub const CHARGER_EXPORTS: [(&str, Symbol); 1] = [("battery_psy_get_prop", GET_PROPERTY_ADDR)];

const NATIVE_MODEL_NAME: &[u8] = b"bq27z561\0";
const NATIVE_OTHER: i32 = 0x5a5a;

/// Stand-in for the kernel's `power_supply_propval`.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FakeValue {
    pub intval: i32,
    pub strval: [u8; 32],
}

impl FakeValue {
    /// What the native accessor writes for any unrecognized property.
    pub fn native_other() -> Self {
        FakeValue {
            intval: NATIVE_OTHER,
            ..FakeValue::default()
        }
    }

    /// The string buffer up to its NUL terminator.
    pub fn str_bytes(&self) -> &[u8] {
        let end = self
            .strval
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.strval.len());
        &self.strval[..end]
    }
}

impl PropertyValue for FakeValue {
    fn int(&self) -> i32 {
        self.intval
    }

    fn set_int(&mut self, value: i32) {
        self.intval = value;
    }

    fn write_str_with_nul(&mut self, bytes: &[u8]) {
        assert!(
            bytes.len() <= self.strval.len(),
            "string of {} bytes overflows the caller's buffer",
            bytes.len()
        );
        self.strval[..bytes.len()].copy_from_slice(bytes);
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FakeSupply(pub u32);

#[derive(Clone, Debug)]
struct NativeBattery {
    capacity: i32,
    capacity_status: Status,
    voltage_uv: i32,
    voltage_status: Status,
}

impl Default for NativeBattery {
    fn default() -> Self {
        NativeBattery {
            capacity: 50,
            capacity_status: Status::OK,
            voltage_uv: 3_800_000,
            voltage_status: Status::OK,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeHost {
    battery: Mutex<NativeBattery>,
    symbols: Mutex<Vec<(String, Symbol)>>,
    hooks: Mutex<Vec<(Symbol, HookSite)>>,
    rejected: Option<(HookSite, i32)>,
    /// Interceptor whose post-hook `call_original` runs through
    routed: Option<Weak<Interceptor<'static, FakeHost>>>,
    original_calls: AtomicUsize,
    last_supply: Mutex<Option<FakeSupply>>,
    nested: Mutex<Vec<(Property, HookOutcome)>>,
}

static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(1);

std::thread_local! {
    static CONTEXT: usize = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeHost {
    /// Empty symbol table.
    pub fn new() -> Self {
        FakeHost::default()
    }

    /// A kernel whose charger driver has not loaded yet.
    pub fn kernel() -> Self {
        FakeHost::new().with_symbol("do_init_module", MODULE_INIT_ADDR)
    }

    /// A kernel with the charger driver already loaded.
    pub fn kernel_with_charger() -> Self {
        let host = FakeHost::kernel();
        host.export(&CHARGER_EXPORTS);
        host
    }

    pub fn with_symbol(self, name: &str, addr: Symbol) -> Self {
        self.export(&[(name, addr)]);
        self
    }

    /// Make `install_post_hook` fail with `code` for `site`.
    pub fn reject_hooks(mut self, site: HookSite, code: i32) -> Self {
        self.rejected = Some((site, code));
        self
    }

    /// Route `call_original` through `interceptor`'s post-hook, like a host
    /// whose original accessor is only reachable through the hooked entry.
    /// Context ids are reported so the interceptor can spot its own calls.
    pub fn routed_through(mut self, interceptor: Weak<Interceptor<'static, FakeHost>>) -> Self {
        self.routed = Some(interceptor);
        self
    }

    pub fn export(&self, exports: &[(&str, Symbol)]) {
        let mut symbols = lock(&self.symbols);
        for (name, addr) in exports {
            symbols.retain(|(n, _)| n != name);
            symbols.push((name.to_string(), *addr));
        }
    }

    pub fn set_capacity(&self, capacity: i32) {
        let mut battery = lock(&self.battery);
        battery.capacity = capacity;
        battery.capacity_status = Status::OK;
    }

    pub fn fail_capacity(&self, status: Status) {
        lock(&self.battery).capacity_status = status;
    }

    pub fn set_voltage(&self, voltage_uv: i32) {
        let mut battery = lock(&self.battery);
        battery.voltage_uv = voltage_uv;
        battery.voltage_status = Status::OK;
    }

    pub fn fail_voltage(&self, status: Status) {
        lock(&self.battery).voltage_status = status;
    }

    pub fn installed_hooks(&self) -> Vec<(Symbol, HookSite)> {
        lock(&self.hooks).clone()
    }

    pub fn is_hooked(&self, site: HookSite) -> bool {
        lock(&self.hooks).iter().any(|(_, s)| *s == site)
    }

    /// Calls made through `call_original`.
    pub fn original_calls(&self) -> usize {
        self.original_calls.load(Ordering::Relaxed)
    }

    pub fn last_supply(&self) -> Option<FakeSupply> {
        *lock(&self.last_supply)
    }

    /// Post-hook runs triggered from inside `call_original`, oldest first.
    pub fn nested_outcomes(&self) -> Vec<(Property, HookOutcome)> {
        lock(&self.nested).clone()
    }

    /// The unhooked battery accessor.
    pub fn native_get_property(&self, prop: Property, out: &mut FakeValue) -> Status {
        let battery = lock(&self.battery).clone();
        match prop {
            Property::Capacity => {
                if battery.capacity_status.is_ok() {
                    out.intval = battery.capacity;
                }
                battery.capacity_status
            }
            Property::VoltageNow => {
                if battery.voltage_status.is_ok() {
                    out.intval = battery.voltage_uv;
                }
                battery.voltage_status
            }
            Property::ModelName => {
                out.write_str_with_nul(NATIVE_MODEL_NAME);
                Status::OK
            }
            Property::Other(_) => {
                out.intval = NATIVE_OTHER;
                Status::OK
            }
        }
    }
}

impl HookHostExt for FakeHost {
    type Supply = FakeSupply;
    type Value = FakeValue;

    fn lookup_symbol(&self, name: &str) -> Option<Symbol> {
        lock(&self.symbols)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, addr)| *addr)
    }

    fn install_post_hook(&self, target: Symbol, site: HookSite) -> Result<(), i32> {
        match self.rejected {
            Some((rejected, code)) if rejected == site => Err(code),
            _ => {
                lock(&self.hooks).push((target, site));
                Ok(())
            }
        }
    }

    fn remove_hook(&self, target: Symbol, site: HookSite) {
        lock(&self.hooks).retain(|&(t, s)| !(t == target && s == site));
    }

    fn call_original(
        &self,
        original: Symbol,
        supply: FakeSupply,
        prop: Property,
        out: &mut FakeValue,
    ) -> Status {
        assert_eq!(original, GET_PROPERTY_ADDR, "called an unknown accessor");
        self.original_calls.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_supply) = Some(supply);
        let status = self.native_get_property(prop, out);
        let trampoline = self.routed.as_ref().and_then(Weak::upgrade);
        if let Some(interceptor) = trampoline {
            if self.is_hooked(HookSite::GetProperty) {
                let outcome = interceptor.after_get_property(supply, prop, out);
                lock(&self.nested).push((prop, outcome));
            }
        }
        status
    }

    fn context_id(&self) -> Option<usize> {
        if self.routed.is_some() {
            Some(CONTEXT.with(|ctx| *ctx))
        } else {
            None
        }
    }
}

/// A consumer querying the battery: the accessor runs, then the post-hook
/// if one is attached.
pub fn get_property(
    interceptor: &Interceptor<'_, FakeHost>,
    supply: FakeSupply,
    prop: Property,
) -> (Status, FakeValue) {
    let host = interceptor.host();
    let mut out = FakeValue::default();
    let status = host.native_get_property(prop, &mut out);
    if host.is_hooked(HookSite::GetProperty) {
        interceptor.after_get_property(supply, prop, &mut out);
    }
    (status, out)
}

/// An interceptor on `host` whose secondary accessor call re-enters its own
/// post-hook.
pub fn routed(
    host: FakeHost,
    config: InterceptorConfig<'static>,
) -> Arc<Interceptor<'static, FakeHost>> {
    Arc::new_cyclic(|me| Interceptor::new(host.routed_through(me.clone()), config))
}

/// The module loader finishing `name`, after which `exports` resolve.
pub fn load_module(
    interceptor: &Interceptor<'_, FakeHost>,
    name: &str,
    exports: &[(&str, Symbol)],
) {
    let host = interceptor.host();
    host.export(exports);
    if host.is_hooked(HookSite::ModuleInit) {
        interceptor.on_module_initialized(name.as_bytes());
    }
}
