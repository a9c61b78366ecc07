//! Scoped release of handles created with `scoped = true`.

use std::cell::RefCell;

use crate::object::{IDispatch, IUnknown};

enum Tracked {
    Unknown(IUnknown),
    Dispatch(IDispatch),
}

thread_local! {
    static SCOPES: RefCell<Vec<Vec<Tracked>>> = const { RefCell::new(Vec::new()) };
}

/// Guard for a release scope. Scopes nest; handles tracked while a scope is
/// the innermost one are released when its guard drops, last first.
#[must_use = "the scope ends when the guard is dropped"]
pub struct Scope {
    depth: usize,
}

impl Scope {
    pub fn enter() -> Scope {
        let depth = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            scopes.push(Vec::new());
            scopes.len()
        });
        Scope { depth }
    }

    pub fn is_active() -> bool {
        SCOPES.with(|scopes| !scopes.borrow().is_empty())
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let tracked = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let mut released = Vec::new();
            while scopes.len() >= self.depth {
                match scopes.pop() {
                    Some(level) => released.extend(level),
                    None => break,
                }
            }
            released
        });
        for item in tracked.into_iter().rev() {
            if let Tracked::Unknown(unk) = item {
                // SAFETY: the handle was alive when tracked and the scope owns that reference.
                if let Err(err) = unsafe { unk.release() } {
                    tracing::warn!(%err, "failed to release scoped interface");
                }
            }
        }
    }
}

fn track(item: Tracked) -> bool {
    SCOPES.with(|scopes| match scopes.borrow_mut().last_mut() {
        Some(level) => {
            level.push(item);
            true
        }
        None => false,
    })
}

/// Release `unk` when the innermost scope ends. Returns `false` outside any scope.
pub fn track_unknown(unk: IUnknown) -> bool {
    track(Tracked::Unknown(unk))
}

/// Keep `disp` alive until the innermost scope ends.
pub fn track_dispatch(disp: &IDispatch) -> bool {
    track(Tracked::Dispatch(disp.clone()))
}
