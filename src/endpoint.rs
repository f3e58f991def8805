//! The two public entry points of the crate: [`create_module`] and
//! [`use_module`] (spec §4.7), plus the `ServerAgent`/`ClientAgent` handles
//! they return.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClientOptions, ServerOptions};
use crate::error::Error;
use crate::proxy::Proxy;
use crate::session::Session;
use crate::transport::Transport;
use crate::value::Value;

/// The server-side handle returned by [`create_module`]. Dropping it does
/// *not* release the namespace — call `.release()` explicitly, matching the
/// spec's requirement that release be an observable, awaitable action.
pub struct ServerAgent {
    session: Arc<Session>,
    namespace: String,
}

impl ServerAgent {
    /// Unbind the namespace. Idempotent (spec §8 property 7).
    pub fn release(&self) {
        self.session.release_namespace(&self.namespace);
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// The client-side handle returned by [`use_module`].
pub struct ClientAgent {
    session: Arc<Session>,
    namespace: String,
    timeout: Duration,
}

impl ClientAgent {
    /// The root proxy for the consumed namespace. Clone it freely —
    /// `.field()`/`.index()` return new proxies without touching the wire.
    pub fn root(&self) -> Proxy {
        Proxy::root(
            self.namespace.clone(),
            self.session.dispatcher(),
            self.session.remote_registry(),
            self.session.handle_table(),
            self.timeout,
        )
    }

    /// Liveness probe: round-trips a `ping` and resolves once the peer
    /// replies, or errors on timeout (spec §4.4).
    pub async fn ping(&self) -> Result<(), Error> {
        self.session
            .dispatcher()
            .request(&self.namespace, |_id| codec::Body::Ping {}, self.timeout)
            .await
            .map(|_| ())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Stop listening for this namespace. Idempotent.
    pub fn release(&self) {
        self.session.release_namespace(&self.namespace);
    }
}

/// Expose `export` under `namespace` on `transport`. Multiple calls over the
/// same transport (even for different namespaces) share one underlying
/// session, so handle ids never collide between them (spec §8, "a" under
/// "A" and "b" under "B" on one transport pair).
pub fn create_module(
    export: Value,
    transport: Arc<dyn Transport>,
    options: ServerOptions,
) -> Result<ServerAgent, Error> {
    let session = Session::shared(transport);
    session.register_root(&options.namespace, export)?;

    Ok(ServerAgent {
        session,
        namespace: options.namespace,
    })
}

/// Begin consuming `namespace` on `transport`. Returns immediately; the
/// returned `ClientAgent`'s proxies do the actual round-tripping.
pub fn use_module(transport: Arc<dyn Transport>, options: ClientOptions) -> ClientAgent {
    let session = Session::shared(transport);
    session.register_consumer_scope(&options.namespace);

    ClientAgent {
        session,
        namespace: options.namespace,
        timeout: options.timeout,
    }
}
