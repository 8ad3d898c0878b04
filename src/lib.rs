//! Client-side WebSocket channels driven by an external transport.
//!
//! The transport and handshake layer is plugged in through [`Connector`] and
//! [`Transport`]; this crate adds message reassembly, send-side flow control,
//! the connection lifecycle and notification delivery across two execution
//! contexts.
#![deny(
    missing_docs,
    missing_copy_implementations,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_must_use,
    unused_mut,
    unused_imports,
    unused_import_braces
)]

pub use http;

pub mod channel;
pub mod client;
pub mod context;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod transport;

pub use crate::{
    client::{connect, connect_with_config, CloseEvent, Event, Handler, WebSocket},
    context::{Contexts, LocalQueue, TaskRunner},
    error::{Error, Result},
    handshake::client::{ClientRequest, ClientRequestBuilder},
    protocol::{BinaryType, CloseCode, Data, Frame, Message, ReadyState, WebSocketConfig},
    transport::{Connector, EventSink, Transport, TransportEvent},
};

#[cfg(feature = "tokio")]
pub use crate::context::TokioRunner;
