// Registry of context variables selected for propagation

use std::fmt;
use std::sync::Arc;

use crate::propagation::PropagationRecord;
use crate::variable::PropagatedVar;

/// Ordered, immutable collection of the context variables a propagating
/// executor copies from submitting threads to worker threads.
///
/// Order is irrelevant to correctness but fixed at construction, so every
/// wrapped task saves and restores in the same deterministic sequence.
#[derive(Clone)]
pub struct VarRegistry {
    vars: Vec<Arc<dyn PropagatedVar>>,
}

impl VarRegistry {
    /// Build a registry from any collection of erased handles.
    pub fn new(vars: impl IntoIterator<Item = Arc<dyn PropagatedVar>>) -> Self {
        VarRegistry {
            vars: vars.into_iter().collect(),
        }
    }

    /// Build a registry from a slice of erased handles.
    pub fn of(vars: &[Arc<dyn PropagatedVar>]) -> Self {
        VarRegistry {
            vars: vars.to_vec(),
        }
    }

    /// An empty registry; wrapped tasks run unchanged.
    pub fn empty() -> Self {
        VarRegistry { vars: Vec::new() }
    }

    /// Number of registered variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are registered.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate the registered handles in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PropagatedVar>> {
        self.vars.iter()
    }

    /// Capture the calling thread's current value of every registered
    /// variable, one record per variable, in registration order.
    pub(crate) fn capture_all(&self) -> Vec<Box<dyn PropagationRecord>> {
        self.vars.iter().map(|var| var.capture()).collect()
    }
}

impl From<Vec<Arc<dyn PropagatedVar>>> for VarRegistry {
    fn from(vars: Vec<Arc<dyn PropagatedVar>>) -> Self {
        VarRegistry { vars }
    }
}

impl<const N: usize> From<[Arc<dyn PropagatedVar>; N]> for VarRegistry {
    fn from(vars: [Arc<dyn PropagatedVar>; N]) -> Self {
        VarRegistry {
            vars: vars.into_iter().collect(),
        }
    }
}

impl FromIterator<Arc<dyn PropagatedVar>> for VarRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn PropagatedVar>>>(iter: I) -> Self {
        VarRegistry::new(iter)
    }
}

impl fmt::Debug for VarRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarRegistry")
            .field("vars", &self.vars.len())
            .finish()
    }
}
