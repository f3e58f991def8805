//! Transporter turns any bidirectional message transport into a module
//! exposure primitive: one side calls [`create_module`] to publish a value
//! tree (functions included) under a namespace, the other calls
//! [`use_module`] to get a [`proxy::Proxy`] that looks up paths and invokes
//! functions across the wire as if they were local.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use transporter::config::{ClientOptions, ServerOptions};
//! use transporter::transport::duplex_pair;
//! use transporter::value::Value;
//! use transporter::{create_module, use_module};
//!
//! # async fn run() -> Result<(), transporter::error::Error> {
//! let (server_side, client_side) = duplex_pair();
//! let export = Value::object([("greeting".to_string(), Value::from("hi"))]);
//!
//! let server = create_module(export, Arc::new(server_side), ServerOptions::new("greeter"))?;
//! let client = use_module(Arc::new(client_side), ClientOptions::new("greeter", Duration::from_secs(5)));
//!
//! let greeting = client.root().field("greeting").get().await?;
//! assert_eq!(greeting, Value::from("hi"));
//!
//! client.release();
//! server.release();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod handle_table;
pub mod marshaller;
pub mod proxy;
pub mod remote_registry;
pub mod session;
pub mod transport;
pub mod value;

pub use endpoint::{create_module, use_module, ClientAgent, ServerAgent};
pub use error::Error;
pub use proxy::Proxy;
pub use value::Value;
