//! The in-process value domain.
//!
//! This is the same JSON-compatible domain `codec::Value` describes, plus a
//! `Function` variant the wire format can never carry directly — the
//! [`crate::marshaller`] is what turns a `Function` into a `codec::HandleRef`
//! on the way out, and back into a callable proxy on the way in.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;

pub type AsyncResult = Pin<Box<dyn Future<Output = Result<Value, Error>> + Send>>;

/// An exported function: any Rust closure that takes marshalled arguments
/// and returns a marshalled result, possibly after awaiting.
pub type ExportedFn = Arc<dyn Fn(Vec<Value>) -> AsyncResult + Send + Sync>;

/// A non-owning reference to an [`ExportedFn`], used by `RemoteRegistry` to
/// detect when the last strong reference to a materialized proxy has
/// dropped without keeping it alive itself.
pub type WeakExportedFn = std::sync::Weak<dyn Fn(Vec<Value>) -> AsyncResult + Send + Sync>;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Function(ExportedFn),
}

impl Value {
    pub fn object(fields: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::Object(fields.into_iter().collect())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> AsyncResult + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Descend `path` from `self`, resolving object keys and array indices
    /// in order. Fails with `PathNotFound` at the first missing or
    /// non-aggregate segment.
    pub fn get_path(&self, path: &[String]) -> Result<Value, Error> {
        let mut current = self.clone();
        for segment in path {
            current = match &current {
                Self::Object(map) => map
                    .get(segment)
                    .cloned()
                    .ok_or_else(|| Error::PathNotFound(path.to_vec()))?,
                Self::Array(items) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| Error::PathNotFound(path.to_vec()))?;
                    items
                        .get(index)
                        .cloned()
                        .ok_or_else(|| Error::PathNotFound(path.to_vec()))?
                }
                _ => return Err(Error::PathNotFound(path.to_vec())),
            };
        }
        Ok(current)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Number(v) => write!(f, "Number({v})"),
            Self::String(v) => write!(f, "String({v:?})"),
            Self::Array(v) => write!(f, "Array({v:?})"),
            Self::Object(v) => write!(f, "Object({v:?})"),
            Self::Function(_) => write!(f, "Function(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
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

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}
