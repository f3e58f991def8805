//! Correlates outgoing requests with incoming responses (spec §4.4).
//!
//! Owned per endpoint. Each request gets a fresh id, a pending slot, and a
//! bound on the wait for the *first* reply — the timeout is on the round
//! trip, not on whatever the remote call internally awaits, so a remote
//! function returning a promise that resolves slowly is fine as long as it
//! settles before the reply is sent (spec §4.4, "Async transparency").

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use codec::{Body, Codec, Message};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::transport::Transport;
use crate::value::Value;

struct Pending {
    resolver: oneshot::Sender<Result<Value, Error>>,
}

pub struct Dispatcher {
    outbound: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    next_id: AtomicU64,
    pending: Mutex<AHashMap<u64, Pending>>,
}

impl Dispatcher {
    pub fn new(outbound: Arc<dyn Transport>, codec: Arc<dyn Codec>) -> Self {
        Self {
            outbound,
            codec,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(AHashMap::new()),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Issue a request, wait up to `timeout` for the matching `set`/`error`
    /// reply, and resolve/reject accordingly. The pending slot is installed
    /// before the message is handed to the transport, so a reply that races
    /// the send can never be dropped for arriving "too early".
    pub async fn request(
        &self,
        scope: &str,
        body: impl FnOnce(u64) -> Body,
        timeout: Duration,
    ) -> Result<Value, Error> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, Pending { resolver: tx });

        let message = Message::new(id, scope, body(id));
        let payload = match self.codec.encode(&message) {
            Ok(payload) => payload,
            Err(err) => {
                self.pending.lock().remove(&id);
                return Err(Error::from(err));
            }
        };

        if let Err(err) = self.outbound.post_message(payload).await {
            self.pending.lock().remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(Error::Timeout)
            }
        }
    }

    /// Resolve the pending slot for `id`, if any. Unknown ids (already
    /// timed out, or never ours) are dropped silently, per spec §4.4.
    pub fn resolve(&self, id: u64, result: Result<Value, Error>) {
        if let Some(pending) = self.pending.lock().remove(&id) {
            let _ = pending.resolver.send(result);
        }
    }

    /// Reject every outstanding request with `SessionClosed`. Used by
    /// `release()`; safe to call on an already-empty table.
    pub fn reject_all(&self) {
        for (_, pending) in self.pending.lock().drain() {
            let _ = pending.resolver.send(Err(Error::SessionClosed));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::duplex_pair;
    use codec::JsonCodec;

    #[tokio::test]
    async fn unknown_reply_id_is_dropped_silently() {
        let (a, _b) = duplex_pair();
        let dispatcher = Dispatcher::new(Arc::new(a), Arc::new(JsonCodec));
        dispatcher.resolve(999, Ok(Value::Null));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn reject_all_rejects_every_pending_request() {
        let (a, _b) = duplex_pair();
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(a), Arc::new(JsonCodec)));

        let d = dispatcher.clone();
        let handle = tokio::spawn(async move {
            d.request("A", |_id| Body::Get { path: vec![] }, Duration::from_secs(30))
                .await
        });

        // Give the request task a moment to install its pending slot.
        tokio::task::yield_now().await;
        dispatcher.reject_all();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_no_reply_arrives() {
        let (a, _b) = duplex_pair();
        let dispatcher = Dispatcher::new(Arc::new(a), Arc::new(JsonCodec));

        let result = dispatcher
            .request("A", |_id| Body::Get { path: vec![] }, Duration::from_millis(50))
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(dispatcher.pending_count(), 0);
    }
}
