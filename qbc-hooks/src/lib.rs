#![cfg_attr(not(any(test, feature = "fake-host")), no_std)]

pub use crate::config::{InterceptorConfig, Overrides};
pub use crate::interceptor::{ArmState, HookOutcome, Interceptor, StatsSnapshot};
pub use crate::reentrancy::{Entered, ReentrancyGuard};
pub use qbc_common;

mod config;
mod interceptor;
mod reentrancy;

#[cfg(any(test, feature = "fake-host"))]
pub mod fake;
