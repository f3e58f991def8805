//! Wire types and the default JSON codec for the transporter protocol.
//!
//! This crate only knows about the message *shape* described by the
//! protocol: the tagged [`Message`] envelope, the [`Value`] domain a message
//! may carry, and the [`HandleRef`] placeholder a marshaller substitutes for
//! a function. It has no opinion on transports, dispatch, or marshalling —
//! those live in the `transporter` crate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed protocol tag every message carries in its `source` field.
///
/// Any message whose `source` doesn't match this value must be ignored by a
/// receiver, to avoid cross-talk with unrelated listeners on a shared
/// transport.
pub const SOURCE: &str = "transporter";

/// Failure encoding or decoding a [`Message`].
#[derive(Debug)]
pub enum Error {
    Encode(String),
    Decode(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(reason) => write!(f, "encode error: {reason}"),
            Self::Decode(reason) => write!(f, "decode error: {reason}"),
        }
    }
}

/// Classified failure kinds exchanged on the wire inside an `error` message.
///
/// This is the wire-facing subset of `transporter::Error` — just enough to
/// round-trip the discriminator, never the full error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TimeoutError,
    UnknownHandle,
    PathNotFound,
    ScopeConflict,
    SessionClosed,
    RemoteError,
    CodecError,
}

/// The marshalled placeholder for a function travelling across the wire.
///
/// Has no significance beyond being a tagged object a [`Value`] can carry;
/// the `kind` field exists only so a foreign, non-Rust peer can distinguish
/// it from a plain object by inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRef {
    #[serde(rename = "__handle")]
    pub id: u64,
    pub kind: HandleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Function,
}

impl HandleRef {
    pub fn function(id: u64) -> Self {
        Self {
            id,
            kind: HandleKind::Function,
        }
    }
}

/// The JSON-compatible value domain a [`Message`] may carry.
///
/// Mirrors the plain-JSON subset spec §4.1 requires of any codec:
/// undefined/null, booleans, finite numbers, strings, arrays, plain
/// string-keyed aggregates, and the [`HandleRef`] placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Handle(HandleRef),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// One request/response/notification frame of the wire protocol.
///
/// `id`, `scope`, and `source` are the common envelope fields of spec §3;
/// `body` is the per-variant payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub scope: String,
    pub source: String,
    #[serde(flatten)]
    pub body: Body,
}

impl Message {
    pub fn new(id: u64, scope: impl Into<String>, body: Body) -> Self {
        Self {
            id,
            scope: scope.into(),
            source: SOURCE.to_string(),
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Body {
    Get {
        path: Vec<String>,
    },
    Apply {
        path: Vec<String>,
        args: Vec<Value>,
    },
    /// Invoke a previously-marshalled function handle directly, by id —
    /// distinct from `Apply`'s tree-descent `path`, so a numeric object key
    /// or array index in an exported tree can never be mistaken for a
    /// handle address (see `transporter::session`'s path resolution).
    Invoke {
        handle: u64,
        args: Vec<Value>,
    },
    Set {
        value: Value,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    GarbageCollect {
        handle: u64,
    },
    Ping {},
}

/// Encode/decode a [`Message`] to/from a transport's string payload.
///
/// The default codec is [`JsonCodec`]; alternate codecs may be injected
/// provided they are symmetric and stay within the [`Value`] domain.
pub trait Codec: Send + Sync {
    fn encode(&self, message: &Message) -> Result<String, Error>;
    fn decode(&self, payload: &str) -> Result<Message, Error>;
}

/// The default JSON codec, keyed on the `source` discriminator.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<String, Error> {
        serde_json::to_string(message).map_err(|err| Error::Encode(err.to_string()))
    }

    fn decode(&self, payload: &str) -> Result<Message, Error> {
        serde_json::from_str(payload).map_err(|err| Error::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ```
    /// use transporter_codec::{Body, Codec, JsonCodec, Message, Value};
    ///
    /// let codec = JsonCodec;
    /// let message = Message::new(1, "A", Body::Set { value: Value::Number(6.0) });
    /// let payload = codec.encode(&message).unwrap();
    /// let decoded = codec.decode(&payload).unwrap();
    ///
    /// assert_eq!(decoded.id, 1);
    /// assert_eq!(decoded.scope, "A");
    /// ```
    #[test]
    fn doctest_marker() {}

    #[test]
    fn round_trips_a_get_message() {
        let codec = JsonCodec;
        let message = Message::new(
            7,
            "A",
            Body::Get {
                path: vec!["a".to_string(), "b".to_string()],
            },
        );

        let payload = codec.encode(&message).unwrap();
        let decoded = codec.decode(&payload).unwrap();

        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.source, SOURCE);
        match decoded.body {
            Body::Get { path } => assert_eq!(path, vec!["a", "b"]),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn round_trips_a_handle_ref_inside_args() {
        let codec = JsonCodec;
        let message = Message::new(
            2,
            "A",
            Body::Apply {
                path: vec!["cb".to_string()],
                args: vec![Value::Handle(HandleRef::function(9)), Value::String("hi".into())],
            },
        );

        let payload = codec.encode(&message).unwrap();
        let decoded = codec.decode(&payload).unwrap();

        match decoded.body {
            Body::Apply { args, .. } => {
                assert_eq!(args[0], Value::Handle(HandleRef::function(9)));
                assert_eq!(args[1], Value::String("hi".to_string()));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn round_trips_an_invoke_message() {
        let codec = JsonCodec;
        let message = Message::new(3, "A", Body::Invoke { handle: 5, args: vec![Value::Number(1.0)] });

        let payload = codec.encode(&message).unwrap();
        let decoded = codec.decode(&payload).unwrap();

        match decoded.body {
            Body::Invoke { handle, args } => {
                assert_eq!(handle, 5);
                assert_eq!(args, vec![Value::Number(1.0)]);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage_payloads() {
        let codec = JsonCodec;
        assert!(codec.decode("not json").is_err());
    }

    #[test]
    fn error_kind_round_trips_by_name() {
        let json = serde_json::to_string(&ErrorKind::UnknownHandle).unwrap();
        assert_eq!(json, "\"unknown_handle\"");
    }
}
