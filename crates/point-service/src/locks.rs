use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// One mutex per key (userid or transaction id)
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    /// Lock slot for `key`. The map shard guard is released before the caller
    /// locks the slot, so waiting on one key never blocks others.
    pub(crate) fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }

        Arc::clone(self.slots.entry(key.to_owned()).or_default().value())
    }
}
