//! Per-endpoint registry of exported functions (spec §4.2).
//!
//! Entries are owned by whichever side allocated them. Allocation reuses the
//! existing id for a function that's already been marshalled outbound (by
//! tracking identity via the `Arc`'s pointer), so the peer always
//! deduplicates by id as spec §3 requires.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::Error;
use crate::value::{ExportedFn, Value};

struct Entry {
    target: Value,
    refs: u64,
}

/// `id = 0` is reserved: it never holds a function directly, and it is
/// never subject to `release`. Namespace roots are tracked separately by
/// `crate::session::Session`; reserving the id keeps handle ids and
/// namespace roots from ever being confused with each other.
const RESERVED_ROOT_ID: u64 = 0;

pub struct HandleTable {
    next_id: AtomicU64,
    entries: RwLock<AHashMap<u64, Entry>>,
    by_identity: RwLock<AHashMap<usize, u64>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(RESERVED_ROOT_ID + 1),
            entries: RwLock::new(AHashMap::new()),
            by_identity: RwLock::new(AHashMap::new()),
        }
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, reusing the id of an existing live entry if
    /// this exact `Arc` has already been allocated.
    ///
    /// ```
    /// use transporter::handle_table::HandleTable;
    /// use transporter::value::Value;
    ///
    /// let table = HandleTable::new();
    /// let f = Value::function(|_args| Box::pin(async { Ok(Value::Null) }));
    /// let (a, b) = match (&f, &f) {
    ///     (Value::Function(a), Value::Function(b)) => (a.clone(), b.clone()),
    ///     _ => unreachable!(),
    /// };
    ///
    /// let id_a = table.allocate_function(a);
    /// let id_b = table.allocate_function(b);
    /// assert_eq!(id_a, id_b);
    /// ```
    pub fn allocate_function(&self, target: ExportedFn) -> u64 {
        let identity = Arc::as_ptr(&target) as *const () as usize;

        if let Some(&id) = self.by_identity.read().get(&identity) {
            if let Some(entry) = self.entries.write().get_mut(&id) {
                entry.refs += 1;
                return id;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(
            id,
            Entry {
                target: Value::Function(target),
                refs: 1,
            },
        );
        self.by_identity.write().insert(identity, id);
        id
    }

    pub fn retain(&self, id: u64) -> Result<(), Error> {
        match self.entries.write().get_mut(&id) {
            Some(entry) => {
                entry.refs += 1;
                Ok(())
            }
            None => Err(Error::UnknownHandle(id)),
        }
    }

    /// Drop one reference; removes the entry once `refs` reaches zero.
    /// A no-op for unknown ids — a late or duplicate `garbage_collect` must
    /// not error.
    pub fn release(&self, id: u64) {
        if id == RESERVED_ROOT_ID {
            return;
        }

        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            entries.remove(&id);
            drop(entries);
            self.by_identity.write().retain(|_, mapped| *mapped != id);
        }
    }

    pub fn resolve(&self, id: u64) -> Result<Value, Error> {
        self.entries
            .read()
            .get(&id)
            .map(|entry| entry.target.clone())
            .ok_or(Error::UnknownHandle(id))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.read().contains_key(&id)
    }
}
