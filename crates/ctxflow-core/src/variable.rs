// Thread-scoped context variables
//
// A `ContextVar<T>` is a handle to a per-thread slot: every thread reads and
// writes its own copy of the value through the same handle. Handles are
// identity-compared, so two independently created variables never alias even
// when they hold the same value type.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::propagation::{PropagationRecord, VarRecord};

/// Slot id allocator. Ids are never reused, so a dropped variable's stale
/// per-thread entries can never be observed through a newer handle.
static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// The calling thread's slot map. Each access is a single short borrow;
    /// user code (including initial-value suppliers) never runs inside one.
    static SLOTS: RefCell<HashMap<u64, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Handle to a thread-scoped slot of values of type `T`.
///
/// Cloning a handle yields another reference to the same slot; creating a new
/// handle via [`ContextVar::new`] or [`ContextVar::with_initial`] allocates a
/// fresh slot. Equality and hashing follow slot identity, never the values.
pub struct ContextVar<T> {
    slot: u64,
    initial: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T: Clone + Send + 'static> ContextVar<T> {
    /// Create a new variable whose per-thread initial value is produced by
    /// the given supplier on first read.
    pub fn with_initial(initial: impl Fn() -> T + Send + Sync + 'static) -> Self {
        ContextVar {
            slot: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            initial: Arc::new(initial),
        }
    }

    /// Read the current thread's value, initializing the slot on first read.
    pub fn get(&self) -> T {
        let existing = SLOTS.with(|slots| {
            slots.borrow().get(&self.slot).map(|value| {
                value
                    .downcast_ref::<T>()
                    .expect("context slot holds the variable's value type")
                    .clone()
            })
        });

        match existing {
            Some(value) => value,
            None => {
                // Run the supplier outside the slot-map borrow so it may
                // itself touch context variables.
                let value = (self.initial)();
                let stored = value.clone();
                SLOTS.with(|slots| {
                    slots.borrow_mut().insert(self.slot, Box::new(stored));
                });
                value
            }
        }
    }

    /// Overwrite the current thread's value.
    pub fn set(&self, value: T) {
        SLOTS.with(|slots| {
            slots.borrow_mut().insert(self.slot, Box::new(value));
        });
    }

    /// Erase this handle for registration, sharing the same slot.
    pub fn propagated(&self) -> Arc<dyn PropagatedVar> {
        Arc::new(self.clone())
    }
}

impl<T: Clone + Default + Send + 'static> ContextVar<T> {
    /// Create a new variable whose per-thread initial value is `T::default()`.
    pub fn new() -> Self {
        Self::with_initial(T::default)
    }
}

impl<T: Clone + Default + Send + 'static> Default for ContextVar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ContextVar<T> {
    fn clone(&self) -> Self {
        ContextVar {
            slot: self.slot,
            initial: Arc::clone(&self.initial),
        }
    }
}

impl<T> PartialEq for ContextVar<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<T> Eq for ContextVar<T> {}

impl<T> Hash for ContextVar<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
    }
}

impl<T> fmt::Debug for ContextVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextVar").field("slot", &self.slot).finish()
    }
}

/// Object-safe view of a context variable, letting handles of different value
/// types share one registry.
pub trait PropagatedVar: Send + Sync {
    /// Capture the calling thread's current value into a fresh propagation
    /// record for one wrapped task.
    fn capture(&self) -> Box<dyn PropagationRecord>;
}

impl<T: Clone + Send + 'static> PropagatedVar for ContextVar<T> {
    fn capture(&self) -> Box<dyn PropagationRecord> {
        Box::new(VarRecord::new(self.clone(), self.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_default_initial_value() {
        let var: ContextVar<String> = ContextVar::new();
        assert_eq!(var.get(), String::new());
    }

    #[test]
    fn test_initial_value_supplier() {
        let var = ContextVar::with_initial(|| "Initial".to_string());
        assert_eq!(var.get(), "Initial");
    }

    #[test]
    fn test_set_overwrites_current_thread() {
        let var = ContextVar::with_initial(|| 0u64);
        var.set(42);
        assert_eq!(var.get(), 42);
    }

    #[test]
    fn test_values_are_thread_scoped() {
        let var = ContextVar::with_initial(|| "Initial".to_string());
        var.set("Parent".to_string());

        let observed = {
            let var = var.clone();
            thread::spawn(move || var.get()).join().expect("probe thread")
        };

        // The spawned thread sees its own initial value, not ours.
        assert_eq!(observed, "Initial");
        assert_eq!(var.get(), "Parent");
    }

    #[test]
    fn test_clones_share_the_slot() {
        let var = ContextVar::with_initial(|| 1u32);
        let alias = var.clone();
        alias.set(7);

        assert_eq!(var.get(), 7);
        assert_eq!(var, alias);
    }

    #[test]
    fn test_distinct_variables_never_alias() {
        let a = ContextVar::with_initial(|| 1u32);
        let b = ContextVar::with_initial(|| 1u32);
        a.set(100);

        assert_eq!(b.get(), 1);
        assert_ne!(a, b);
    }
}
