use crate::{HookSite, Status};

/// Failures reported by the lifecycle operations.
///
/// Everything that can go wrong inside the post-hook is absorbed there and
/// never shows up as an `Error`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, err_derive::Error)]
pub enum Error {
    #[error(display = "Symbol for {} not found", _0)]
    SymbolMissing(HookSite),

    #[error(display = "Hooking {} failed with code {}", _0, _1)]
    HookInstallFailed(HookSite, i32),
}

impl Error {
    /// Status handed back to the module loader.
    pub fn status(&self) -> Status {
        match self {
            Error::SymbolMissing(_) => Status(-1),
            Error::HookInstallFailed(_, _) => Status(-2),
        }
    }
}
