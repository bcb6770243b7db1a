use crate::{Property, PropertyValue, Status};
use core::fmt;

/// Address of a resolved kernel function.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct Symbol(pub usize);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The two functions the interceptor attaches to.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum HookSite {
    /// The battery property accessor
    GetProperty,
    /// The module loader's init entry point, used to wait for the charger driver
    ModuleInit,
}

impl fmt::Display for HookSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookSite::GetProperty => "get_property",
            HookSite::ModuleInit => "module_init",
        };
        f.write_str(s)
    }
}

/// Capabilities the interceptor needs from the host kernel.
///
/// Production wiring binds these to the kernel's symbol table and inline-hook
/// facility; tests bind them to an in-memory fake.
pub trait HookHostExt {
    /// Opaque power-supply handle, forwarded without interpretation.
    type Supply: Copy;

    type Value: PropertyValue;

    fn lookup_symbol(&self, name: &str) -> Option<Symbol>;

    /// Attach the interceptor's post-hook for `site` to the function at `target`.
    ///
    /// On failure the host's error code is returned.
    fn install_post_hook(&self, target: Symbol, site: HookSite) -> Result<(), i32>;

    fn remove_hook(&self, target: Symbol, site: HookSite);

    /// Invoke the accessor stored at `original`.
    fn call_original(
        &self,
        original: Symbol,
        supply: Self::Supply,
        prop: Property,
        out: &mut Self::Value,
    ) -> Status;

    /// Identifies the current execution context (thread or task).
    ///
    /// Hosts whose `call_original` goes around the hook return `None` and
    /// no reentrancy bookkeeping is done. Hosts that route it back through
    /// the trampoline must return a stable non-zero id per context.
    fn context_id(&self) -> Option<usize> {
        None
    }
}
