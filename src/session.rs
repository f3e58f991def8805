//! The shared per-transport-pair session: message routing, scope bookkeeping,
//! and the `SessionSupervisor` lifecycle (spec §4.7, §4.8).
//!
//! A single `Session` backs every `ServerAgent`/`ClientAgent` built over the
//! same transport, found or created through the process-wide [`SESSIONS`]
//! registry. Sharing is what makes handle ids collision-free across sibling
//! namespaces on one transport (spec: "ids are per-endpoint, per-session,
//! never reused") while still letting two `create_module` calls coexist on
//! the same wire (spec §8: expose `"a"` under `"A"` and `"b"` under `"B"` on
//! the same transport).

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use ahash::{AHashMap, AHashSet};
use codec::{Body, Codec, JsonCodec, Message};
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::handle_table::HandleTable;
use crate::marshaller;
use crate::remote_registry::RemoteRegistry;
use crate::transport::Transport;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Idle = 0,
    Running = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

pub struct Session {
    pub(crate) handle_table: Arc<HandleTable>,
    pub(crate) remote_registry: Arc<RemoteRegistry>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    roots: RwLock<AHashMap<String, Value>>,
    known_scopes: RwLock<AHashSet<String>>,
    state: AtomicU8,
    active_namespaces: AtomicUsize,
}

static SESSIONS: LazyLock<Mutex<AHashMap<usize, Weak<Session>>>> =
    LazyLock::new(|| Mutex::new(AHashMap::new()));

fn transport_identity(transport: &Arc<dyn Transport>) -> usize {
    Arc::as_ptr(transport) as *const () as usize
}

impl Session {
    /// Find or create the session shared by every agent built over this
    /// exact transport — a `Transport` is already a full duplex channel, so
    /// identity alone keys the registry.
    pub fn shared(transport: Arc<dyn Transport>) -> Arc<Session> {
        let key = transport_identity(&transport);

        let mut sessions = SESSIONS.lock();
        if let Some(existing) = sessions.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        let session = Session::new(transport);
        sessions.insert(key, Arc::downgrade(&session));
        session
    }

    fn new(transport: Arc<dyn Transport>) -> Arc<Session> {
        let (gc_tx, gc_rx) = mpsc::unbounded_channel();
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);

        let session = Arc::new(Session {
            handle_table: Arc::new(HandleTable::new()),
            remote_registry: Arc::new(RemoteRegistry::new(gc_tx)),
            dispatcher: Arc::new(Dispatcher::new(transport.clone(), codec.clone())),
            transport: transport.clone(),
            codec: codec.clone(),
            roots: RwLock::new(AHashMap::new()),
            known_scopes: RwLock::new(AHashSet::new()),
            state: AtomicU8::new(State::Idle as u8),
            active_namespaces: AtomicUsize::new(0),
        });

        let message_loop = session.clone();
        let mut inbound_rx = transport.subscribe();
        tokio::spawn(async move {
            loop {
                match inbound_rx.recv().await {
                    // Each message is handled on its own task so a handler
                    // blocked awaiting a nested request (a callback calling
                    // back into this same peer) never stalls the loop that
                    // has to deliver that nested request's reply.
                    Ok(payload) => {
                        let session = message_loop.clone();
                        tokio::spawn(async move { session.handle_inbound(payload).await });
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
                if State::from(message_loop.state.load(Ordering::Acquire)) == State::Closed {
                    break;
                }
            }
        });

        tokio::spawn(Self::run_gc_loop(transport, codec, gc_rx));

        session
    }

    async fn run_gc_loop(
        outbound: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        mut gc_rx: mpsc::UnboundedReceiver<(String, u64)>,
    ) {
        while let Some((scope, handle)) = gc_rx.recv().await {
            let message = Message::new(0, scope, Body::GarbageCollect { handle });
            let Ok(payload) = codec.encode(&message) else {
                continue;
            };
            if let Err(err) = outbound.post_message(payload).await {
                warn!("failed to deliver garbage_collect for handle {handle}: {err}");
            }
        }
    }

    /// Register `namespace`'s exported root. Fails with `ScopeConflict` if
    /// the namespace is already bound on this session.
    pub fn register_root(&self, namespace: &str, export: Value) -> Result<(), Error> {
        let mut roots = self.roots.write();
        if roots.contains_key(namespace) {
            return Err(Error::ScopeConflict(namespace.to_string()));
        }
        roots.insert(namespace.to_string(), export);
        drop(roots);

        self.known_scopes.write().insert(namespace.to_string());
        self.mark_namespace_active();
        Ok(())
    }

    /// Register a namespace this session will *consume* (no local root),
    /// so inbound replies/callbacks scoped to it aren't dropped as
    /// cross-talk.
    pub fn register_consumer_scope(&self, namespace: &str) {
        self.known_scopes.write().insert(namespace.to_string());
        self.mark_namespace_active();
    }

    fn mark_namespace_active(&self) {
        self.active_namespaces.fetch_add(1, Ordering::AcqRel);
        self.state.store(State::Running as u8, Ordering::Release);
    }

    /// Idempotent: releasing an already-released namespace (or one that was
    /// never registered) is a no-op, matching `release()`'s required
    /// idempotence (spec §4.8, §8 property 7).
    pub fn release_namespace(&self, namespace: &str) {
        let had_root = self.roots.write().remove(namespace).is_some();
        let had_scope = self.known_scopes.write().remove(namespace);

        if !had_root && !had_scope {
            return;
        }

        if self.active_namespaces.fetch_sub(1, Ordering::AcqRel) <= 1 {
            self.close();
        }
    }

    fn close(&self) {
        self.state.store(State::Closing as u8, Ordering::Release);
        self.dispatcher.reject_all();
        self.state.store(State::Closed as u8, Ordering::Release);
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn remote_registry(&self) -> Arc<RemoteRegistry> {
        self.remote_registry.clone()
    }

    pub fn handle_table(&self) -> Arc<HandleTable> {
        self.handle_table.clone()
    }

    async fn handle_inbound(self: &Arc<Self>, payload: String) {
        let message = match self.codec.decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                trace!("dropping undecodable payload: {err}");
                return;
            }
        };

        if message.source != codec::SOURCE {
            trace!("dropping message with foreign source tag {:?}", message.source);
            return;
        }
        if !self.known_scopes.read().contains(&message.scope) {
            trace!("dropping message with unrecognized scope {:?}", message.scope);
            return;
        }

        match message.body {
            Body::Get { path } => self.handle_get(message.id, message.scope, path).await,
            Body::Apply { path, args } => self.handle_apply(message.id, message.scope, path, args).await,
            Body::Invoke { handle, args } => self.handle_invoke(message.id, message.scope, handle, args).await,
            Body::Set { value } => {
                let unmarshalled = marshaller::marshal_inbound(
                    &value,
                    &message.scope,
                    &self.remote_registry,
                    &self.dispatcher,
                    &self.handle_table,
                );
                self.dispatcher.resolve(message.id, Ok(unmarshalled));
            }
            Body::Error { kind, message: text } => {
                self.dispatcher.resolve(message.id, Err(Error::from_wire(kind, text)));
            }
            Body::GarbageCollect { handle } => {
                debug!("releasing handle {handle} on peer notice");
                self.handle_table.release(handle);
            }
            Body::Ping {} => self.reply_set(message.id, &message.scope, Value::Null).await,
        }
    }

    /// Resolve `path` by ordered key lookup against the namespace root for
    /// `scope` (spec §4.6). Handle-addressed invocation is a distinct wire
    /// message (`Body::Invoke`, see `handle_invoke`) so a numeric object key
    /// or array index here can never be mistaken for a handle id.
    fn resolve_path(&self, scope: &str, path: &[String]) -> Result<Value, Error> {
        let roots = self.roots.read();
        let root = roots
            .get(scope)
            .cloned()
            .ok_or_else(|| Error::PathNotFound(path.to_vec()))?;
        drop(roots);
        root.get_path(path)
    }

    async fn handle_get(self: &Arc<Self>, id: u64, scope: String, path: Vec<String>) {
        match self.resolve_path(&scope, &path) {
            Ok(value) => {
                let wire = marshaller::marshal_outbound(&value, &self.handle_table);
                self.reply(id, &scope, Body::Set { value: wire }).await;
            }
            Err(err) => self.reply_error(id, &scope, err).await,
        }
    }

    async fn handle_apply(self: &Arc<Self>, id: u64, scope: String, path: Vec<String>, args: Vec<codec::Value>) {
        let target = match self.resolve_path(&scope, &path) {
            Ok(value) => value,
            Err(err) => return self.reply_error(id, &scope, err).await,
        };

        let Value::Function(function) = target else {
            return self.reply_error(id, &scope, Error::PathNotFound(path)).await;
        };

        let unmarshalled: Vec<Value> = args
            .iter()
            .map(|arg| {
                marshaller::marshal_inbound(arg, &scope, &self.remote_registry, &self.dispatcher, &self.handle_table)
            })
            .collect();

        match function(unmarshalled).await {
            Ok(result) => {
                let wire = marshaller::marshal_outbound(&result, &self.handle_table);
                self.reply(id, &scope, Body::Set { value: wire }).await;
            }
            Err(err) => self.reply_error(id, &scope, err).await,
        }
    }

    /// Invoke a previously-marshalled function handle directly, by id —
    /// the counterpart to `handle_apply` for callbacks the peer was handed
    /// earlier, rather than a path rooted at the namespace export tree.
    async fn handle_invoke(self: &Arc<Self>, id: u64, scope: String, handle: u64, args: Vec<codec::Value>) {
        let target = match self.handle_table.resolve(handle) {
            Ok(value) => value,
            Err(err) => return self.reply_error(id, &scope, err).await,
        };

        let Value::Function(function) = target else {
            return self.reply_error(id, &scope, Error::UnknownHandle(handle)).await;
        };

        let unmarshalled: Vec<Value> = args
            .iter()
            .map(|arg| {
                marshaller::marshal_inbound(arg, &scope, &self.remote_registry, &self.dispatcher, &self.handle_table)
            })
            .collect();

        match function(unmarshalled).await {
            Ok(result) => {
                let wire = marshaller::marshal_outbound(&result, &self.handle_table);
                self.reply(id, &scope, Body::Set { value: wire }).await;
            }
            Err(err) => self.reply_error(id, &scope, err).await,
        }
    }

    async fn reply_set(self: &Arc<Self>, id: u64, scope: &str, value: Value) {
        let wire = marshaller::marshal_outbound(&value, &self.handle_table);
        self.reply(id, scope, Body::Set { value: wire }).await;
    }

    async fn reply_error(self: &Arc<Self>, id: u64, scope: &str, err: Error) {
        self.reply(
            id,
            scope,
            Body::Error {
                kind: err.kind(),
                message: err.to_string(),
            },
        )
        .await;
    }

    async fn reply(self: &Arc<Self>, id: u64, scope: &str, body: Body) {
        let message = Message::new(id, scope, body);
        let Ok(payload) = self.codec.encode(&message) else {
            warn!("failed to encode reply for request {id}");
            return;
        };
        if let Err(err) = self.transport.post_message(payload).await {
            warn!("failed to deliver reply for request {id}: {err}");
        }
    }
}
