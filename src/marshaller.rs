//! Walks a value tree translating between the in-process [`Value`] domain
//! and the wire [`codec::Value`] domain (spec §4.5).
//!
//! Outbound: every `Function` becomes a `HandleRef`, allocated (or reused)
//! in the given `HandleTable`. Inbound: every `HandleRef` becomes a callable
//! proxy, materialized (or reused) from the given `RemoteRegistry`. Neither
//! walk recurses into a function's own properties — functions are opaque
//! across the wire except through invocation and property access via the
//! `Proxy`.

use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::handle_table::HandleTable;
use crate::remote_registry::RemoteRegistry;
use crate::value::Value;

pub fn marshal_outbound(value: &Value, handle_table: &HandleTable) -> codec::Value {
    match value {
        Value::Null => codec::Value::Null,
        Value::Bool(v) => codec::Value::Bool(*v),
        Value::Number(v) => codec::Value::Number(*v),
        Value::String(v) => codec::Value::String(v.clone()),
        Value::Array(items) => {
            codec::Value::Array(items.iter().map(|item| marshal_outbound(item, handle_table)).collect())
        }
        Value::Object(fields) => codec::Value::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), marshal_outbound(item, handle_table)))
                .collect(),
        ),
        Value::Function(target) => {
            let id = handle_table.allocate_function(target.clone());
            codec::Value::Handle(codec::HandleRef::function(id))
        }
    }
}

pub fn marshal_inbound(
    value: &codec::Value,
    scope: &str,
    registry: &RemoteRegistry,
    dispatcher: &Arc<Dispatcher>,
    handle_table: &Arc<HandleTable>,
) -> Value {
    match value {
        codec::Value::Null => Value::Null,
        codec::Value::Bool(v) => Value::Bool(*v),
        codec::Value::Number(v) => Value::Number(*v),
        codec::Value::String(v) => Value::String(v.clone()),
        codec::Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| marshal_inbound(item, scope, registry, dispatcher, handle_table))
                .collect(),
        ),
        codec::Value::Object(fields) => Value::object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), marshal_inbound(item, scope, registry, dispatcher, handle_table))),
        ),
        codec::Value::Handle(handle_ref) => {
            registry.materialize(handle_ref.id, scope, dispatcher.clone(), handle_table.clone())
        }
    }
}
