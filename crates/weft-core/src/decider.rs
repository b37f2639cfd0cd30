//! Deciders: keyed boolean suppliers that can suppress a node's body.

use std::fmt;
use std::sync::Arc;

/// A keyed boolean supplier consulted once per evaluation, after the node's
/// dependencies have joined and before its body runs. When it answers `false`
/// the node settles without running its body: vacant for optional-wrapped or
/// null-admissible nodes, a failure carrying the key otherwise.
#[derive(Clone)]
pub struct Decider {
    key: Arc<str>,
    supplier: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Decider {
    /// Create a decider from a key and a supplier.
    pub fn new(key: impl Into<String>, supplier: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        let key: String = key.into();
        Decider {
            key: key.into(),
            supplier: Arc::new(supplier),
        }
    }

    /// A decider that always lets the body run.
    pub fn always_on() -> Self {
        Decider::new("always_on", || true)
    }

    /// A decider that always suppresses the body.
    pub fn always_off() -> Self {
        Decider::new("always_off", || false)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn allows(&self) -> bool {
        (self.supplier)()
    }
}

impl fmt::Debug for Decider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decider").field("key", &self.key).finish()
    }
}
