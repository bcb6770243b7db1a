//! Post-hook on the battery property accessor
//!
//! State machine:
//!
//! ```text
//! Unarmed --arm ok--------------------------> Armed
//! Unarmed --accessor missing, watcher set---> Deferred
//! Deferred --target module loaded, arm ok---> Armed
//! Armed | Deferred --disarm-----------------> Unarmed
//! ```

use crate::{config::Overrides, InterceptorConfig, ReentrancyGuard};
use core::{
    fmt,
    sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering},
};
use log::{debug, error, info, trace, warn};
use qbc_common::{
    Error, HookHostExt, HookSite, MicroVolts, Property, PropertyValue, Status, Symbol,
};

const NO_SYMBOL: usize = 0;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(u8)]
pub enum ArmState {
    Unarmed = 0,
    Armed = 1,
    /// Waiting for the target module to finish initializing
    Deferred = 2,
}

impl ArmState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ArmState::Armed,
            2 => ArmState::Deferred,
            _ => ArmState::Unarmed,
        }
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArmState::Unarmed => "unarmed",
            ArmState::Armed => "armed",
            ArmState::Deferred => "deferred",
        };
        f.write_str(s)
    }
}

/// What the post-hook did with one query.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HookOutcome {
    /// `out` left as the native accessor wrote it
    Passthrough,
    /// Capacity replaced by the voltage estimate
    Estimated { voltage: MicroVolts, capacity: u8 },
    /// Voltage could not be read; `clamped` when the native capacity was
    /// raised to the floor
    FetchFailed { status: Status, clamped: bool },
    ModelName,
    /// The post-hook was entered from inside itself, through the secondary
    /// accessor call, and did nothing
    Reentered,
    /// Fired after the original accessor was cleared by `disarm`
    Disarmed,
}

#[derive(Debug)]
struct Stats {
    estimated: AtomicU32,
    fetch_failed: AtomicU32,
    model_name: AtomicU32,
    nested: AtomicU32,
}

impl Stats {
    const fn new() -> Self {
        Stats {
            estimated: AtomicU32::new(0),
            fetch_failed: AtomicU32::new(0),
            model_name: AtomicU32::new(0),
            nested: AtomicU32::new(0),
        }
    }

    fn record(&self, outcome: &HookOutcome) {
        let counter = match outcome {
            HookOutcome::Estimated { .. } => &self.estimated,
            HookOutcome::FetchFailed { .. } => &self.fetch_failed,
            HookOutcome::ModelName => &self.model_name,
            HookOutcome::Reentered => &self.nested,
            HookOutcome::Passthrough | HookOutcome::Disarmed => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the post-hook counters.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct StatsSnapshot {
    pub estimated: u32,
    pub fetch_failed: u32,
    pub model_name: u32,
    /// Accessor calls the post-hook made that landed back in it. On a host
    /// that routes the original through the hook this is one per estimate.
    pub nested: u32,
}

pub struct Interceptor<'a, H: HookHostExt> {
    host: H,
    config: InterceptorConfig<'a>,
    state: AtomicU8,
    /// Accessor the post-hook is attached to, published before the hook is live
    original: AtomicUsize,
    /// `do_init_module` while the deferred installer is attached
    module_init: AtomicUsize,
    guard: ReentrancyGuard,
    stats: Stats,
}

impl<'a, H: HookHostExt> Interceptor<'a, H> {
    pub const fn new(host: H, config: InterceptorConfig<'a>) -> Self {
        Interceptor {
            host,
            config,
            state: AtomicU8::new(ArmState::Unarmed as u8),
            original: AtomicUsize::new(NO_SYMBOL),
            module_init: AtomicUsize::new(NO_SYMBOL),
            guard: ReentrancyGuard::new(),
            stats: Stats::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &InterceptorConfig<'a> {
        &self.config
    }

    pub fn state(&self) -> ArmState {
        ArmState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            estimated: self.stats.estimated.load(Ordering::Relaxed),
            fetch_failed: self.stats.fetch_failed.load(Ordering::Relaxed),
            model_name: self.stats.model_name.load(Ordering::Relaxed),
            nested: self.stats.nested.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: ArmState) {
        let prev = ArmState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if prev != state {
            debug!("interceptor {} -> {}", prev, state);
        }
    }

    /// Module-load entry: arm now, or wait for the target module.
    ///
    /// Anything installed on the way is removed again when this fails.
    pub fn init(&self) -> Result<(), Error> {
        let result = match self.arm() {
            Err(Error::SymbolMissing(HookSite::GetProperty)) => {
                info!(
                    "{} not resolvable yet, waiting for module {}",
                    self.config.accessor_symbol, self.config.target_module
                );
                self.defer()
            }
            other => other,
        };
        if let Err(e) = result {
            error!("init failed: {}", e);
            self.disarm();
        }
        result
    }

    /// Resolve the accessor and attach the post-hook.
    ///
    /// Arming an already armed interceptor does nothing. A pending deferred
    /// installer is detached once the post-hook is in place.
    pub fn arm(&self) -> Result<(), Error> {
        if self.state() == ArmState::Armed {
            debug!("already armed");
            return Ok(());
        }

        let accessor = self.host.lookup_symbol(self.config.accessor_symbol);
        match accessor {
            Some(addr) => info!(
                "kernel function {} addr: {}",
                self.config.accessor_symbol, addr
            ),
            None => warn!(
                "kernel function {} not found",
                self.config.accessor_symbol
            ),
        }
        let accessor = accessor.ok_or(Error::SymbolMissing(HookSite::GetProperty))?;

        self.original.store(accessor.0, Ordering::Release);
        if let Err(code) = self.host.install_post_hook(accessor, HookSite::GetProperty) {
            self.original.store(NO_SYMBOL, Ordering::Release);
            error!(
                "hook {} after error: {}",
                self.config.accessor_symbol, code
            );
            return Err(Error::HookInstallFailed(HookSite::GetProperty, code));
        }

        self.detach_watcher();
        self.set_state(ArmState::Armed);
        info!("hook {} after success", self.config.accessor_symbol);
        Ok(())
    }

    /// Attach the deferred installer to the module loader.
    fn defer(&self) -> Result<(), Error> {
        let init_fn = self.host.lookup_symbol(self.config.module_init_symbol);
        match init_fn {
            Some(addr) => info!(
                "kernel function {} addr: {}",
                self.config.module_init_symbol, addr
            ),
            None => error!(
                "kernel function {} not found",
                self.config.module_init_symbol
            ),
        }
        let init_fn = init_fn.ok_or(Error::SymbolMissing(HookSite::ModuleInit))?;

        // The watcher may fire before install_post_hook returns
        self.module_init.store(init_fn.0, Ordering::Release);
        self.set_state(ArmState::Deferred);
        if let Err(code) = self.host.install_post_hook(init_fn, HookSite::ModuleInit) {
            self.module_init.store(NO_SYMBOL, Ordering::Release);
            self.set_state(ArmState::Unarmed);
            error!(
                "hook {} after error: {}",
                self.config.module_init_symbol, code
            );
            return Err(Error::HookInstallFailed(HookSite::ModuleInit, code));
        }
        info!("hook {} after success", self.config.module_init_symbol);
        Ok(())
    }

    /// Detach the module-init watcher if attached. Only the first caller
    /// gets to remove it.
    fn detach_watcher(&self) -> bool {
        let init_fn = self.module_init.swap(NO_SYMBOL, Ordering::AcqRel);
        if init_fn == NO_SYMBOL {
            return false;
        }
        self.host.remove_hook(Symbol(init_fn), HookSite::ModuleInit);
        true
    }

    /// Post-hook for the module loader, called with each initialized
    /// module's name.
    ///
    /// When the target module shows up the watcher detaches itself and the
    /// interceptor retries `arm`. A failed retry leaves it deferred with
    /// nothing left to trigger another attempt.
    pub fn on_module_initialized(&self, name: &[u8]) {
        if name != self.config.target_module.as_bytes() {
            return;
        }
        if !self.detach_watcher() {
            return;
        }
        info!("module {} initialized", self.config.target_module);
        if let Err(e) = self.arm() {
            error!("deferred hook failed, staying inert: {}", e);
        }
    }

    /// Remove every installed hook and forget the resolved symbols.
    pub fn disarm(&self) {
        self.detach_watcher();
        let original = self.original.load(Ordering::Acquire);
        if original != NO_SYMBOL {
            self.host
                .remove_hook(Symbol(original), HookSite::GetProperty);
            self.original.store(NO_SYMBOL, Ordering::Release);
        }
        self.set_state(ArmState::Unarmed);
        info!("hooks removed");
    }

    /// Post-hook for the property accessor, run after the original returned
    /// into `out`.
    ///
    /// Never fails; the accessor's own status is left for the caller. Does
    /// nothing once `disarm` has cleared the original accessor.
    pub fn after_get_property(
        &self,
        supply: H::Supply,
        prop: Property,
        out: &mut H::Value,
    ) -> HookOutcome {
        let original = self.original.load(Ordering::Acquire);
        if original == NO_SYMBOL {
            return HookOutcome::Disarmed;
        }

        let _entered = match self.host.context_id() {
            Some(ctx) => match self.guard.enter(ctx) {
                Some(entered) => Some(entered),
                None => {
                    trace!("{} nested in post-hook", prop);
                    self.stats.record(&HookOutcome::Reentered);
                    return HookOutcome::Reentered;
                }
            },
            None => None,
        };

        let outcome = match prop {
            Property::Capacity if self.config.overrides.contains(Overrides::CAPACITY) => {
                self.override_capacity(Symbol(original), supply, out)
            }
            Property::ModelName if self.config.overrides.contains(Overrides::MODEL_NAME) => {
                out.write_str_with_nul(self.config.model_name.to_bytes_with_nul());
                HookOutcome::ModelName
            }
            _ => HookOutcome::Passthrough,
        };
        self.stats.record(&outcome);
        trace!("{}: {:?}", prop, outcome);
        outcome
    }

    fn override_capacity(
        &self,
        original: Symbol,
        supply: H::Supply,
        out: &mut H::Value,
    ) -> HookOutcome {
        let mut scratch = H::Value::default();
        let status = self
            .host
            .call_original(original, supply, Property::VoltageNow, &mut scratch);
        let voltage = MicroVolts(scratch.int());

        if status.is_ok() && voltage.is_positive() {
            let capacity = self.config.map.capacity_at(voltage);
            out.set_int(i32::from(capacity));
            HookOutcome::Estimated { voltage, capacity }
        } else {
            let clamped = out.int() < self.config.capacity_floor;
            if clamped {
                out.set_int(self.config.capacity_floor);
            }
            HookOutcome::FetchFailed { status, clamped }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fake::{self, FakeHost, FakeSupply, GET_PROPERTY_ADDR, MODULE_INIT_ADDR};
    use qbc_common::{Breakpoint, VoltageCapacityMap};
    use std::{sync::Arc, thread};

    const SUPPLY: FakeSupply = FakeSupply(1);

    fn armed(host: FakeHost) -> Interceptor<'static, FakeHost> {
        let interceptor = Interceptor::new(host, InterceptorConfig::DEFAULT);
        interceptor.init().unwrap();
        assert_eq!(interceptor.state(), ArmState::Armed);
        interceptor
    }

    #[test]
    fn capacity_follows_voltage() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.host().set_capacity(42);
        interceptor.host().set_voltage(3_700_000);

        let (status, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(status, Status::OK);
        assert_eq!(out.intval, 40);
        assert_eq!(interceptor.stats().estimated, 1);
    }

    #[test]
    fn capacity_ignores_native_value() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.host().set_voltage(3_400_000);
        for native in [0, 3, 17, 99, 100] {
            interceptor.host().set_capacity(native);
            let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
            assert_eq!(out.intval, 17);
        }
    }

    #[test]
    fn failed_voltage_fetch_floors_capacity() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.host().fail_voltage(Status(-61));
        interceptor.host().set_capacity(3);

        let (status, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(status, Status::OK);
        assert_eq!(out.intval, 10);

        interceptor.host().set_capacity(64);
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(out.intval, 64);
        assert_eq!(interceptor.stats().fetch_failed, 2);
    }

    #[test]
    fn non_positive_voltage_counts_as_failed_fetch() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.host().set_capacity(5);
        for reading in [0, -3_800_000] {
            interceptor.host().set_voltage(reading);
            let mut out = fake::FakeValue::default();
            out.intval = 5;
            let outcome = interceptor.after_get_property(SUPPLY, Property::Capacity, &mut out);
            assert_eq!(
                outcome,
                HookOutcome::FetchFailed {
                    status: Status::OK,
                    clamped: true
                }
            );
            assert_eq!(out.intval, 10);
        }
    }

    #[test]
    fn native_status_is_preserved() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.host().fail_capacity(Status(-22));
        interceptor.host().set_voltage(4_000_000);

        let (status, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(status, Status(-22));
        assert_eq!(out.intval, 70);
    }

    #[test]
    fn model_name_is_replaced() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::ModelName);
        assert_eq!(&out.strval[..8], b"SNYSCA6\0");
        assert_eq!(out.str_bytes(), b"SNYSCA6");
    }

    #[test]
    fn other_properties_pass_through() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.host().set_voltage(3_912_345);

        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::VoltageNow);
        assert_eq!(out.intval, 3_912_345);

        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Other(51));
        assert_eq!(out, fake::FakeValue::native_other());
        assert_eq!(interceptor.stats(), StatsSnapshot::default());
    }

    #[test]
    fn secondary_fetch_bypasses_hook() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.host().set_voltage(3_850_000);
        fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(interceptor.host().original_calls(), 1);
        assert_eq!(interceptor.host().last_supply(), Some(SUPPLY));
    }

    fn routed_armed() -> Arc<Interceptor<'static, FakeHost>> {
        let interceptor = fake::routed(FakeHost::kernel_with_charger(), InterceptorConfig::DEFAULT);
        interceptor.init().unwrap();
        assert_eq!(interceptor.state(), ArmState::Armed);
        interceptor
    }

    #[test]
    fn voltage_fetch_routed_through_hook_is_left_alone() {
        let interceptor = routed_armed();
        interceptor.host().set_capacity(42);
        interceptor.host().set_voltage(3_850_000);

        let mut out = fake::FakeValue::default();
        interceptor
            .host()
            .native_get_property(Property::Capacity, &mut out);
        let outcome = interceptor.after_get_property(SUPPLY, Property::Capacity, &mut out);
        assert_eq!(
            outcome,
            HookOutcome::Estimated {
                voltage: MicroVolts(3_850_000),
                capacity: 55
            }
        );
        assert_eq!(out.intval, 55);
        assert_eq!(
            interceptor.host().nested_outcomes(),
            vec![(Property::VoltageNow, HookOutcome::Reentered)]
        );
        assert_eq!(interceptor.host().original_calls(), 1);
        assert_eq!(interceptor.stats().estimated, 1);
        assert_eq!(interceptor.stats().nested, 1);
    }

    #[test]
    fn routed_host_still_reports_estimate() {
        let interceptor = routed_armed();
        interceptor.host().set_voltage(3_700_000);
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(out.intval, 40);

        interceptor.host().fail_voltage(Status(-61));
        interceptor.host().set_capacity(2);
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(out.intval, 10);

        // Plain voltage queries never call back into the accessor
        interceptor.host().set_voltage(3_912_345);
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::VoltageNow);
        assert_eq!(out.intval, 3_912_345);

        assert_eq!(interceptor.host().original_calls(), 2);
        assert_eq!(interceptor.stats().nested, 2);
        assert!(interceptor
            .host()
            .nested_outcomes()
            .iter()
            .all(|n| *n == (Property::VoltageNow, HookOutcome::Reentered)));
    }

    #[test]
    fn direct_host_has_no_nested_calls() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.host().set_voltage(3_700_000);
        fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert!(interceptor.host().nested_outcomes().is_empty());
        assert_eq!(interceptor.stats().nested, 0);
    }

    #[test]
    fn second_arm_is_a_no_op() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        assert_eq!(interceptor.arm(), Ok(()));
        assert_eq!(interceptor.host().installed_hooks().len(), 1);
    }

    #[test]
    fn arm_reports_missing_accessor() {
        let interceptor = Interceptor::new(FakeHost::kernel(), InterceptorConfig::DEFAULT);
        assert_eq!(
            interceptor.arm(),
            Err(Error::SymbolMissing(HookSite::GetProperty))
        );
        assert_eq!(interceptor.state(), ArmState::Unarmed);
    }

    #[test]
    fn arm_reports_install_failure() {
        let host = FakeHost::kernel_with_charger().reject_hooks(HookSite::GetProperty, -12);
        let interceptor = Interceptor::new(host, InterceptorConfig::DEFAULT);
        assert_eq!(
            interceptor.arm(),
            Err(Error::HookInstallFailed(HookSite::GetProperty, -12))
        );
        assert_eq!(interceptor.state(), ArmState::Unarmed);
        assert!(interceptor.host().installed_hooks().is_empty());
    }

    #[test]
    fn defers_until_charger_module_loads() {
        let interceptor = Interceptor::new(FakeHost::kernel(), InterceptorConfig::DEFAULT);
        assert_eq!(interceptor.init(), Ok(()));
        assert_eq!(interceptor.state(), ArmState::Deferred);
        assert_eq!(
            interceptor.host().installed_hooks(),
            vec![(MODULE_INIT_ADDR, HookSite::ModuleInit)]
        );

        fake::load_module(&interceptor, "some_other_driver", &[]);
        assert_eq!(interceptor.state(), ArmState::Deferred);

        fake::load_module(&interceptor, "qti_battery_charger", &fake::CHARGER_EXPORTS);
        assert_eq!(interceptor.state(), ArmState::Armed);
        assert_eq!(
            interceptor.host().installed_hooks(),
            vec![(GET_PROPERTY_ADDR, HookSite::GetProperty)]
        );

        interceptor.host().set_voltage(3_700_000);
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(out.intval, 40);
    }

    #[test]
    fn module_name_must_match_exactly() {
        let interceptor = Interceptor::new(FakeHost::kernel(), InterceptorConfig::DEFAULT);
        interceptor.init().unwrap();
        interceptor.on_module_initialized(b"qti_battery_charger_ext");
        interceptor.on_module_initialized(b"qti_battery");
        assert_eq!(interceptor.state(), ArmState::Deferred);
    }

    #[test]
    fn failed_deferred_arm_stays_inert() {
        let interceptor = Interceptor::new(FakeHost::kernel(), InterceptorConfig::DEFAULT);
        interceptor.init().unwrap();

        // Target module loads without exporting the accessor
        fake::load_module(&interceptor, "qti_battery_charger", &[]);
        assert_eq!(interceptor.state(), ArmState::Deferred);
        assert!(interceptor.host().installed_hooks().is_empty());

        // Nothing is watching any more
        fake::load_module(&interceptor, "qti_battery_charger", &fake::CHARGER_EXPORTS);
        assert_eq!(interceptor.state(), ArmState::Deferred);
    }

    #[test]
    fn missing_module_loader_is_fatal() {
        let interceptor = Interceptor::new(FakeHost::new(), InterceptorConfig::DEFAULT);
        assert_eq!(
            interceptor.init(),
            Err(Error::SymbolMissing(HookSite::ModuleInit))
        );
        assert_eq!(interceptor.state(), ArmState::Unarmed);
    }

    #[test]
    fn watcher_install_failure_is_fatal() {
        let host = FakeHost::kernel().reject_hooks(HookSite::ModuleInit, -16);
        let interceptor = Interceptor::new(host, InterceptorConfig::DEFAULT);
        let err = interceptor.init().unwrap_err();
        assert_eq!(err, Error::HookInstallFailed(HookSite::ModuleInit, -16));
        assert_eq!(err.status(), Status(-2));
        assert_eq!(interceptor.state(), ArmState::Unarmed);
        assert!(interceptor.host().installed_hooks().is_empty());
    }

    #[test]
    fn disarm_from_every_state() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.disarm();
        assert_eq!(interceptor.state(), ArmState::Unarmed);
        assert!(interceptor.host().installed_hooks().is_empty());

        interceptor.host().set_capacity(3);
        interceptor.host().set_voltage(4_480_000);
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(out.intval, 3);

        let deferred = Interceptor::new(FakeHost::kernel(), InterceptorConfig::DEFAULT);
        deferred.init().unwrap();
        deferred.disarm();
        assert_eq!(deferred.state(), ArmState::Unarmed);
        assert!(deferred.host().installed_hooks().is_empty());

        let idle = Interceptor::new(FakeHost::new(), InterceptorConfig::DEFAULT);
        idle.disarm();
        assert_eq!(idle.state(), ArmState::Unarmed);
    }

    #[test]
    fn hook_after_disarm_is_harmless() {
        let interceptor = armed(FakeHost::kernel_with_charger());
        interceptor.disarm();
        let mut out = fake::FakeValue::default();
        out.intval = 7;
        let outcome = interceptor.after_get_property(SUPPLY, Property::Capacity, &mut out);
        assert_eq!(outcome, HookOutcome::Disarmed);
        assert_eq!(out.intval, 7);

        let mut name = fake::FakeValue::default();
        name.write_str_with_nul(b"bq27z561\0");
        let outcome = interceptor.after_get_property(SUPPLY, Property::ModelName, &mut name);
        assert_eq!(outcome, HookOutcome::Disarmed);
        assert_eq!(name.str_bytes(), b"bq27z561");

        assert_eq!(interceptor.host().original_calls(), 0);
        assert_eq!(interceptor.stats(), StatsSnapshot::default());
    }

    #[test]
    fn overrides_can_be_disabled() {
        let config = InterceptorConfig {
            overrides: Overrides::MODEL_NAME,
            ..InterceptorConfig::DEFAULT
        };
        let interceptor = Interceptor::new(FakeHost::kernel_with_charger(), config);
        interceptor.init().unwrap();
        interceptor.host().set_capacity(3);
        interceptor.host().set_voltage(4_000_000);

        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(out.intval, 3);
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::ModelName);
        assert_eq!(out.str_bytes(), b"SNYSCA6");
    }

    #[test]
    fn custom_model_name_and_map() {
        static LINEAR: [Breakpoint; 2] = [
            Breakpoint::new(3_000_000, 0),
            Breakpoint::new(4_000_000, 100),
        ];
        let config = InterceptorConfig {
            model_name: c"TEST01",
            map: VoltageCapacityMap::new(&LINEAR).unwrap(),
            ..InterceptorConfig::DEFAULT
        };
        let interceptor = Interceptor::new(FakeHost::kernel_with_charger(), config);
        interceptor.init().unwrap();
        interceptor.host().set_voltage(3_250_000);

        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::Capacity);
        assert_eq!(out.intval, 25);
        let (_, out) = fake::get_property(&interceptor, SUPPLY, Property::ModelName);
        assert_eq!(&out.strval[..7], b"TEST01\0");
    }

    #[test]
    fn parallel_callers_all_see_estimate() {
        let interceptor = routed_armed();
        interceptor.host().set_capacity(1);
        interceptor.host().set_voltage(4_150_000);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let interceptor = Arc::clone(&interceptor);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let (_, out) =
                            fake::get_property(&interceptor, SUPPLY, Property::Capacity);
                        assert_eq!(out.intval, 85);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(interceptor.stats().estimated, 8 * 200);
        assert_eq!(interceptor.stats().nested, 8 * 200);
    }
}
