//! Mirror of the peer's handle table (spec §4.3).
//!
//! When an inbound value contains a `HandleRef`, the marshaller asks this
//! registry for a callable proxy bound to it. A second reference to the same
//! handle id reuses the existing proxy (dedup, by returning the very same
//! `Arc`); when the last strong reference to it drops, exactly one
//! `garbage_collect` is enqueued for the id.
//!
//! Rust has no finalizer to hook a GC cycle the way the browser-hosted
//! original does, so liveness here is just reference counting: the `Arc`
//! behind the `ExportedFn` returned to the caller *is* the "weak liveness
//! observer" — when every clone of it drops, `Drop` fires exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::handle_table::HandleTable;
use crate::marshaller;
use crate::value::{AsyncResult, ExportedFn, Value, WeakExportedFn};

/// Re-invoking a callback has no per-call timeout of its own to inherit (the
/// original `useModule` timeout belongs to a different `Proxy`), so a
/// generous fixed ceiling bounds it instead.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

struct ProxyHandle {
    id: u64,
    scope: String,
    dispatcher: Arc<Dispatcher>,
    handle_table: Arc<HandleTable>,
    gc_tx: mpsc::UnboundedSender<(String, u64)>,
    gc_sent: AtomicBool,
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        if !self.gc_sent.swap(true, Ordering::SeqCst) {
            // Best-effort: if the gc loop has already shut down the send
            // simply fails, which is fine — there's nothing left to notify.
            let _ = self.gc_tx.send((self.scope.clone(), self.id));
        }
    }
}

pub struct RemoteRegistry {
    proxies: Mutex<AHashMap<u64, WeakExportedFn>>,
    gc_tx: mpsc::UnboundedSender<(String, u64)>,
}

impl RemoteRegistry {
    pub fn new(gc_tx: mpsc::UnboundedSender<(String, u64)>) -> Self {
        Self {
            proxies: Mutex::new(AHashMap::new()),
            gc_tx,
        }
    }

    /// Produce a callable proxy for peer handle `id`, scoped to `scope`
    /// (the namespace this handle was received under, which it will quote
    /// back on every invocation and on its eventual `garbage_collect`).
    /// `handle_table` is this endpoint's own table, used if the callback is
    /// itself invoked with arguments that carry local functions onward.
    pub fn materialize(
        &self,
        id: u64,
        scope: &str,
        dispatcher: Arc<Dispatcher>,
        handle_table: Arc<HandleTable>,
    ) -> Value {
        let mut proxies = self.proxies.lock();

        if let Some(existing) = proxies.get(&id).and_then(WeakExportedFn::upgrade) {
            return Value::Function(existing);
        }

        let handle = Arc::new(ProxyHandle {
            id,
            scope: scope.to_string(),
            dispatcher,
            handle_table,
            gc_tx: self.gc_tx.clone(),
            gc_sent: AtomicBool::new(false),
        });

        let function: ExportedFn = Arc::new(move |args| Self::invoke(handle.clone(), args));
        proxies.insert(id, Arc::downgrade(&function));
        Value::Function(function)
    }

    fn invoke(handle: Arc<ProxyHandle>, args: Vec<Value>) -> AsyncResult {
        Box::pin(async move {
            let marshalled: Vec<codec::Value> = args
                .iter()
                .map(|value| marshaller::marshal_outbound(value, &handle.handle_table))
                .collect();

            let id = handle.id;
            handle
                .dispatcher
                .request(
                    &handle.scope,
                    move |_request_id| codec::Body::Invoke {
                        handle: id,
                        args: marshalled,
                    },
                    CALLBACK_TIMEOUT,
                )
                .await
        })
    }

    pub fn live_count(&self) -> usize {
        self.proxies
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::duplex_pair;
    use codec::JsonCodec;

    fn fixtures() -> (Arc<Dispatcher>, Arc<HandleTable>) {
        let (a, _b) = duplex_pair();
        (
            Arc::new(Dispatcher::new(Arc::new(a), Arc::new(JsonCodec))),
            Arc::new(HandleTable::new()),
        )
    }

    #[test]
    fn materialize_dedupes_by_id_while_live() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = RemoteRegistry::new(tx);
        let (dispatcher, handle_table) = fixtures();

        let first = registry.materialize(5, "A", dispatcher.clone(), handle_table.clone());
        let second = registry.materialize(5, "A", dispatcher, handle_table);

        assert_eq!(first, second);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn dropping_last_reference_enqueues_exactly_one_gc() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = RemoteRegistry::new(tx);
        let (dispatcher, handle_table) = fixtures();

        let proxy = registry.materialize(5, "A", dispatcher, handle_table);
        drop(proxy);

        let (scope, id) = rx.try_recv().unwrap();
        assert_eq!(scope, "A");
        assert_eq!(id, 5);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn materialize_after_collection_creates_a_fresh_proxy() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = RemoteRegistry::new(tx);
        let (dispatcher, handle_table) = fixtures();

        drop(registry.materialize(5, "A", dispatcher.clone(), handle_table.clone()));
        rx.try_recv().unwrap();

        let reborn = registry.materialize(5, "A", dispatcher, handle_table);
        assert!(reborn.is_function());
    }
}
