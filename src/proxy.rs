//! A typed stand-in for the dynamic property-interception proxy the spec
//! describes (§4.6). Rust has no operator overload for field/index access
//! that can intercept arbitrary names, so a `Proxy` accumulates a path
//! explicitly through `.field()`/`.index()` and only touches the wire when
//! `.get()` or `.apply()` is called — a builder over a static type rather
//! than a dynamic intercept, as called out in spec §9 Design Notes.
//!
//! Deliberately carries no `this` receiver: every `apply` is sent with the
//! accumulated `path` alone, matching the Open Question resolution recorded
//! in DESIGN.md ("a remote function is never implicitly bound to its
//! parent's `path`").

use std::sync::Arc;
use std::time::Duration;

use codec::Body;

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::handle_table::HandleTable;
use crate::marshaller;
use crate::remote_registry::RemoteRegistry;
use crate::value::Value;

/// A lazily-resolved path into a peer's exported module.
#[derive(Clone)]
pub struct Proxy {
    scope: String,
    path: Vec<String>,
    dispatcher: Arc<Dispatcher>,
    remote_registry: Arc<RemoteRegistry>,
    handle_table: Arc<HandleTable>,
    timeout: Duration,
}

impl Proxy {
    pub(crate) fn root(
        scope: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
        remote_registry: Arc<RemoteRegistry>,
        handle_table: Arc<HandleTable>,
        timeout: Duration,
    ) -> Self {
        Self {
            scope: scope.into(),
            path: Vec::new(),
            dispatcher,
            remote_registry,
            handle_table,
            timeout,
        }
    }

    /// Extend the path with an object key.
    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self { path, ..self.clone() }
    }

    /// Extend the path with an array index.
    pub fn index(&self, i: usize) -> Self {
        let mut path = self.path.clone();
        path.push(i.to_string());
        Self { path, ..self.clone() }
    }

    /// Resolve the accumulated path to its current value (spec's `get`).
    pub async fn get(&self) -> Result<Value, Error> {
        let path = self.path.clone();
        let reply = self
            .dispatcher
            .request(&self.scope, move |_id| Body::Get { path }, self.timeout)
            .await?;
        Ok(self.unmarshal(reply))
    }

    /// Call the accumulated path as a function with `args` (spec's `apply`).
    /// `args` are marshalled using this endpoint's own handle table, so any
    /// local callback passed as an argument is exported automatically.
    pub async fn apply(&self, args: Vec<Value>) -> Result<Value, Error> {
        let path = self.path.clone();
        let marshalled: Vec<codec::Value> = args
            .iter()
            .map(|arg| marshaller::marshal_outbound(arg, &self.handle_table))
            .collect();

        let reply = self
            .dispatcher
            .request(
                &self.scope,
                move |_id| Body::Apply { path, args: marshalled },
                self.timeout,
            )
            .await?;
        Ok(self.unmarshal(reply))
    }

    fn unmarshal(&self, value: Value) -> Value {
        // `request` already hands back an unmarshalled `Value` (the
        // dispatcher's reply path runs every `set`/`error` body through
        // `marshaller::marshal_inbound` before resolving), so there is
        // nothing left to translate here beyond returning it.
        value
    }
}
