//! Process-wide bookkeeping of loaded modules.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tether_abi::{BindingTable, ModuleId, ModuleLookup};

/// Maps module ids to the binding tables they were built from.
///
/// Ids come from a monotonic counter and are never reused, even after
/// [`clear`](Self::clear), so generated symbol names stay unique for the
/// life of the process.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    tables: DashMap<ModuleId, Arc<BindingTable>>,
    counter: AtomicU64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for a new bind request.
    pub fn reserve(&self) -> ModuleId {
        ModuleId::new(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register(&self, id: ModuleId, table: Arc<BindingTable>) {
        self.tables.insert(id, table);
    }

    pub fn unregister(&self, id: ModuleId) -> Option<Arc<BindingTable>> {
        self.tables.remove(&id).map(|(_, table)| table)
    }

    pub fn table(&self, id: ModuleId) -> Option<Arc<BindingTable>> {
        self.tables.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.tables.contains_key(&id)
    }

    /// Registered ids in allocation order.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self.tables.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Forget every registered module.
    pub fn clear(&self) {
        self.tables.clear();
    }
}

impl ModuleLookup for ModuleRegistry {
    fn binding_table(&self, module: ModuleId) -> Option<Arc<BindingTable>> {
        self.table(module)
    }
}
