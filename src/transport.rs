//! The minimal transport interface the core consumes (spec §6), plus a
//! reference in-memory transport used by tests and the demo binary.
//!
//! Concrete production transports (a browser worker port, an iframe bridge,
//! a socket adapter) are deliberately out of scope for this crate; the only
//! transport shipped here is [`LocalTransport`], which exists purely so the
//! rest of the crate has something to run against.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::broadcast;

use crate::error::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A reliable, in-order, duplex carrier of string frames.
///
/// `post_message` sends one frame; `subscribe` returns a fresh listener over
/// inbound frames, the Rust stand-in for `addEventListener`/
/// `removeEventListener` — a listener unsubscribes simply by dropping its
/// receiver.
pub trait Transport: Send + Sync {
    fn post_message(&self, payload: String) -> BoxFuture<'static, Result<(), Error>>;

    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// An in-memory transport backed by a broadcast channel, for tests and the
/// demo binary. Not a production adapter.
pub struct LocalTransport {
    outbound: broadcast::Sender<String>,
    inbound: broadcast::Sender<String>,
}

impl Transport for LocalTransport {
    fn post_message(&self, payload: String) -> BoxFuture<'static, Result<(), Error>> {
        let outbound = self.outbound.clone();
        Box::pin(async move {
            // No receivers subscribed is not a transport failure — mirrors
            // `postMessage` on a channel nobody happens to be listening to
            // yet.
            let _ = outbound.send(payload);
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inbound.subscribe()
    }
}

/// Build a connected pair of `LocalTransport`s: whatever `a` posts, `b`
/// observes via `subscribe`, and vice versa.
pub fn duplex_pair() -> (LocalTransport, LocalTransport) {
    let (a_to_b, _) = broadcast::channel(1024);
    let (b_to_a, _) = broadcast::channel(1024);

    let a = LocalTransport {
        outbound: a_to_b.clone(),
        inbound: b_to_a.clone(),
    };
    let b = LocalTransport {
        outbound: b_to_a,
        inbound: a_to_b,
    };

    (a, b)
}
