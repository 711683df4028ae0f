//! Hook registry for circuit breaker events.

use crate::error::Snapshot;
use crate::state::State;
use parking_lot::RwLock;
use std::sync::Arc;

type HookFn = Arc<dyn Fn(&Snapshot) + Send + Sync + 'static>;

/// A registry for circuit breaker event hooks.
///
/// Hooks run after the breaker has released its lock, so they may call back
/// into the breaker.
pub struct HookRegistry {
    on_open: RwLock<Option<HookFn>>,
    on_close: RwLock<Option<HookFn>>,
    on_half_open: RwLock<Option<HookFn>>,
    on_reject: RwLock<Option<HookFn>>,
    on_success: RwLock<Option<HookFn>>,
    on_failure: RwLock<Option<HookFn>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").finish_non_exhaustive()
    }
}

fn set<F>(slot: &RwLock<Option<HookFn>>, f: F)
where
    F: Fn(&Snapshot) + Send + Sync + 'static,
{
    *slot.write() = Some(Arc::new(f));
}

fn run(slot: &RwLock<Option<HookFn>>, snapshot: &Snapshot) {
    // Clone out so a hook can replace hooks without deadlocking.
    let hook = slot.read().clone();
    if let Some(hook) = hook {
        hook(snapshot);
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_open: RwLock::new(None),
            on_close: RwLock::new(None),
            on_half_open: RwLock::new(None),
            on_reject: RwLock::new(None),
            on_success: RwLock::new(None),
            on_failure: RwLock::new(None),
        }
    }

    /// Sets the hook to call when the circuit breaker opens or reopens.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        set(&self.on_open, f);
    }

    /// Sets the hook to call when the circuit breaker closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        set(&self.on_close, f);
    }

    /// Sets the hook to call when the circuit breaker half-opens.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        set(&self.on_half_open, f);
    }

    /// Sets the hook to call when an open breaker rejects a call.
    pub fn set_on_reject<F>(&self, f: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        set(&self.on_reject, f);
    }

    /// Sets the hook to call when a success is reported.
    pub fn set_on_success<F>(&self, f: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        set(&self.on_success, f);
    }

    /// Sets the hook to call when a failure is reported.
    pub fn set_on_failure<F>(&self, f: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        set(&self.on_failure, f);
    }

    /// Executes the appropriate hook for a state transition.
    pub fn execute_state_transition_hook(&self, to: State, snapshot: &Snapshot) {
        match to {
            State::Open => run(&self.on_open, snapshot),
            State::Closed => run(&self.on_close, snapshot),
            State::HalfOpen => run(&self.on_half_open, snapshot),
        }
    }

    /// Executes the rejection hook.
    pub fn execute_reject_hook(&self, snapshot: &Snapshot) {
        run(&self.on_reject, snapshot);
    }

    /// Executes the success hook.
    pub fn execute_success_hook(&self, snapshot: &Snapshot) {
        run(&self.on_success, snapshot);
    }

    /// Executes the failure hook.
    pub fn execute_failure_hook(&self, snapshot: &Snapshot) {
        run(&self.on_failure, snapshot);
    }
}
