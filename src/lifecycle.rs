//! Module load and unload entry points

use crate::{built_info, MODULE_NAME};
use log::{error, info};
use qbc_common::{HookHostExt, Status};
use qbc_hooks::Interceptor;

/// Attach the interceptor, or the deferred installer when the charger
/// driver has not loaded yet. A negative status makes the loader refuse
/// the module.
pub fn module_init<H: HookHostExt>(
    interceptor: &Interceptor<'_, H>,
    args: Option<&str>,
) -> Status {
    info!(
        "{} {} ({} {}) init, args: {}",
        MODULE_NAME,
        built_info::PKG_VERSION,
        built_info::TARGET,
        built_info::PROFILE,
        args.unwrap_or("none")
    );

    match interceptor.init() {
        Ok(()) => {
            info!("{} {}", MODULE_NAME, interceptor.state());
            Status::OK
        }
        Err(e) => {
            error!("{} failed to load: {}", MODULE_NAME, e);
            e.status()
        }
    }
}

pub fn module_exit<H: HookHostExt>(interceptor: &Interceptor<'_, H>) -> Status {
    interceptor.disarm();
    let stats = interceptor.stats();
    info!(
        "{} exit, estimated {} fetch failed {} model name {} nested calls {}",
        MODULE_NAME, stats.estimated, stats.fetch_failed, stats.model_name, stats.nested
    );
    Status::OK
}
