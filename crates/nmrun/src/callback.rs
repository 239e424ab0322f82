//! # Callback Table
//!
//! Local functions handed to the plugin as arguments. The plugin only ever sees
//! an index; when it calls back, the index is looked up here.
//!
//! Registration is by identity: passing the same `Callback` (or a clone of it)
//! again reuses its index instead of growing the table.

use std::sync::Arc;
use std::sync::Mutex;

use crate::value::Value;

/// A function the plugin may invoke.
#[derive(Clone)]
pub struct Callback {
    f: Arc<dyn Fn(Value) + Send + Sync>,
}

impl Callback {
    pub fn new(f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    pub fn invoke(&self, value: Value) {
        (self.f)(value)
    }

    /// True if both handles point at the same function.
    pub fn same_as(&self, other: &Callback) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.f), Arc::as_ptr(&other.f))
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.f) as *const ())
    }
}

/// Registered callbacks, indexed by registration order.
#[derive(Default)]
pub struct CallbackTable {
    entries: Mutex<Vec<Callback>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `callback`, registering it on first sight.
    pub fn register(&self, callback: &Callback) -> u64 {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = entries.iter().position(|c| c.same_as(callback)) {
            return index as u64;
        }
        entries.push(callback.clone());
        (entries.len() - 1) as u64
    }

    pub fn get(&self, index: u64) -> Option<Callback> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(index as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
