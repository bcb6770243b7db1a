//! Imported kernel symbols, the hook callbacks and the `.kpm.*` sections

use super::{
    HookFargs, ModuleHead, RawPropVal, CODES, INFO_AUTHOR, INFO_DESCRIPTION, INFO_LICENSE,
    INFO_NAME, INFO_VERSION,
};
use crate::{
    lifecycle::{module_exit, module_init},
    logger::KernelLogger,
};
use core::{
    ffi::{c_char, c_int, c_long, c_void, CStr},
    panic::PanicInfo,
    ptr,
};
use log::{Level, LevelFilter};
use qbc_common::{HookHostExt, HookSite, Property, Status, Symbol};
use qbc_hooks::{Interceptor, InterceptorConfig};

extern "C" {
    fn kallsyms_lookup_name(name: *const c_char) -> usize;
    fn hook_wrap(
        func: *mut c_void,
        argno: i32,
        before: *mut c_void,
        after: *mut c_void,
        udata: *mut c_void,
    ) -> c_int;
    fn hook_unwrap_remove(
        func: *mut c_void,
        before: *mut c_void,
        after: *mut c_void,
        remove: c_int,
    );
    fn printk(fmt: *const c_char, ...) -> c_int;
}

#[derive(Copy, Clone, Debug)]
pub struct KernelSupply(*mut c_void);

pub struct KernelHost;

type GetPropertyFn = unsafe extern "C" fn(*mut c_void, c_int, *mut RawPropVal) -> c_int;

impl KernelHost {
    fn after_callback(site: HookSite) -> *mut c_void {
        match site {
            HookSite::GetProperty => get_property_after as *const () as *mut c_void,
            HookSite::ModuleInit => module_init_after as *const () as *mut c_void,
        }
    }
}

impl HookHostExt for KernelHost {
    type Supply = KernelSupply;
    type Value = RawPropVal;

    fn lookup_symbol(&self, name: &str) -> Option<Symbol> {
        let mut cname: heapless::Vec<u8, 64> = heapless::Vec::new();
        cname.extend_from_slice(name.as_bytes()).ok()?;
        cname.push(0).ok()?;
        // SAFETY: cname is NUL-terminated
        let addr = unsafe { kallsyms_lookup_name(cname.as_ptr() as *const c_char) };
        if addr == 0 {
            None
        } else {
            Some(Symbol(addr))
        }
    }

    fn install_post_hook(&self, target: Symbol, site: HookSite) -> Result<(), i32> {
        let argno = match site {
            HookSite::GetProperty => 3,
            HookSite::ModuleInit => 1,
        };
        // SAFETY: target was resolved by kallsyms and the callback matches
        // the arity passed alongside it
        let err = unsafe {
            hook_wrap(
                target.0 as *mut c_void,
                argno,
                ptr::null_mut(),
                KernelHost::after_callback(site),
                ptr::null_mut(),
            )
        };
        match err {
            0 => Ok(()),
            code => Err(code),
        }
    }

    fn remove_hook(&self, target: Symbol, site: HookSite) {
        // SAFETY: removes the same callback install_post_hook attached
        unsafe {
            hook_unwrap_remove(
                target.0 as *mut c_void,
                ptr::null_mut(),
                KernelHost::after_callback(site),
                1,
            )
        }
    }

    fn call_original(
        &self,
        original: Symbol,
        supply: KernelSupply,
        prop: Property,
        out: &mut RawPropVal,
    ) -> Status {
        // SAFETY: original is battery_psy_get_prop as resolved by arm()
        let status = unsafe {
            let accessor: GetPropertyFn = core::mem::transmute(original.0);
            accessor(supply.0, CODES.encode(prop) as c_int, out)
        };
        Status(status)
    }

    /// The accessor is only reachable through its trampoline, so the
    /// current task pointer (kept in `sp_el0`) keys the reentrancy guard.
    fn context_id(&self) -> Option<usize> {
        let task: usize;
        // SAFETY: reading sp_el0 has no side effects
        unsafe { core::arch::asm!("mrs {}, sp_el0", out(reg) task) };
        Some(task)
    }
}

static INTERCEPTOR: Interceptor<'static, KernelHost> =
    Interceptor::new(KernelHost, InterceptorConfig::DEFAULT);

static LOGGER: KernelLogger = KernelLogger::new(kernel_sink);

fn kernel_sink(level: Level, line: &str) {
    // KERN_ERR, KERN_WARNING, KERN_INFO, KERN_DEBUG
    let fmt: &[u8] = match level {
        Level::Error => b"\x013%.*s\0",
        Level::Warn => b"\x014%.*s\0",
        Level::Info => b"\x016%.*s\0",
        Level::Debug | Level::Trace => b"\x017%.*s\0",
    };
    // SAFETY: fmt is NUL-terminated and %.*s bounds the read of line
    unsafe {
        printk(
            fmt.as_ptr() as *const c_char,
            line.len() as c_int,
            line.as_ptr(),
        );
    }
}

unsafe extern "C" fn get_property_after(args: *mut HookFargs, _udata: *mut c_void) {
    let args = &*args;
    let out = args.args[2] as *mut RawPropVal;
    if out.is_null() {
        return;
    }
    INTERCEPTOR.after_get_property(
        KernelSupply(args.args[0] as *mut c_void),
        CODES.decode(args.args[1] as u32),
        &mut *out,
    );
}

unsafe extern "C" fn module_init_after(args: *mut HookFargs, _udata: *mut c_void) {
    let module = (*args).args[0] as *const ModuleHead;
    if module.is_null() {
        return;
    }
    INTERCEPTOR.on_module_initialized((*module).name());
}

unsafe extern "C" fn kpm_init(
    args: *const c_char,
    _event: *const c_char,
    _reserved: *mut c_void,
) -> c_long {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
    let args = if args.is_null() {
        None
    } else {
        CStr::from_ptr(args).to_str().ok()
    };
    c_long::from(module_init(&INTERCEPTOR, args).0)
}

unsafe extern "C" fn kpm_exit(_reserved: *mut c_void) -> c_long {
    c_long::from(module_exit(&INTERCEPTOR).0)
}

type InitFn = unsafe extern "C" fn(*const c_char, *const c_char, *mut c_void) -> c_long;
type ExitFn = unsafe extern "C" fn(*mut c_void) -> c_long;

#[used]
#[link_section = ".kpm.init"]
static KPM_INIT: InitFn = kpm_init;

#[used]
#[link_section = ".kpm.exit"]
static KPM_EXIT: ExitFn = kpm_exit;

macro_rules! kpm_section {
    ($($ident:ident = $info:ident;)*) => {
        $(
            #[used]
            #[link_section = ".kpm.info"]
            static $ident: [u8; $info.len()] = $info;
        )*
    };
}

kpm_section! {
    KPM_NAME = INFO_NAME;
    KPM_VERSION = INFO_VERSION;
    KPM_LICENSE = INFO_LICENSE;
    KPM_AUTHOR = INFO_AUTHOR;
    KPM_DESCRIPTION = INFO_DESCRIPTION;
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}
