//! Per-context guard against the post-hook re-entering itself
//!
//! Needed when the host can only reach the original accessor through the
//! hooked entry point, so the secondary `VOLTAGE_NOW` query would land back
//! in the post-hook on the same stack.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Maximum number of contexts tracked at once, roughly one per CPU.
pub const MAX_CONTEXTS: usize = 32;

const FREE: usize = 0;

#[derive(Debug)]
pub struct ReentrancyGuard {
    slots: [AtomicUsize; MAX_CONTEXTS],
}

impl Default for ReentrancyGuard {
    fn default() -> Self {
        ReentrancyGuard::new()
    }
}

impl ReentrancyGuard {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: AtomicUsize = AtomicUsize::new(FREE);
        ReentrancyGuard {
            slots: [EMPTY; MAX_CONTEXTS],
        }
    }

    /// Marks `context` as inside the hook until the returned token drops.
    ///
    /// Returns `None` if `context` is already inside. When every slot is
    /// taken the call proceeds untracked rather than stalling the caller.
    pub fn enter(&self, context: usize) -> Option<Entered<'_>> {
        if context == FREE {
            return Some(Entered {
                guard: self,
                slot: None,
            });
        }
        if self.is_inside(context) {
            return None;
        }
        let slot = self.slots.iter().position(|slot| {
            slot.compare_exchange(FREE, context, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        });
        Some(Entered { guard: self, slot })
    }

    pub fn is_inside(&self, context: usize) -> bool {
        context != FREE
            && self
                .slots
                .iter()
                .any(|slot| slot.load(Ordering::Acquire) == context)
    }
}

/// Releases the context's slot on drop.
#[derive(Debug)]
pub struct Entered<'a> {
    guard: &'a ReentrancyGuard,
    slot: Option<usize>,
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        if let Some(i) = self.slot {
            self.guard.slots[i].store(FREE, Ordering::Release);
        }
    }
}
