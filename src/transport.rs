//! The contract with the transport and handshake layer.
//!
//! The transport owns the socket, TLS, the opening handshake and the wire
//! encoding of frames. This crate only tells it which frames to send and learns
//! from it what happened on the wire.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use log::*;

use crate::{
    channel::Channel,
    context::{post, TaskRunner},
    error::Result,
    handshake::{client::ClientRequest, HandshakeRequest, HandshakeResponse},
    protocol::{CloseCode, Frame},
};

/// Starts the opening handshake for a new channel.
///
/// Called once per connection, on the network context.
pub trait Connector: Send + Sync + 'static {
    /// Begin connecting to `request.url()`.
    ///
    /// The returned transport reports progress through `events`. An error here
    /// is reported to the application as a failed, then dropped, channel.
    fn connect(&self, request: &ClientRequest, events: EventSink) -> Result<Box<dyn Transport>>;
}

impl<C: Connector + ?Sized> Connector for Arc<C> {
    fn connect(&self, request: &ClientRequest, events: EventSink) -> Result<Box<dyn Transport>> {
        (**self).connect(request, events)
    }
}

impl<C: Connector + ?Sized> Connector for Box<C> {
    fn connect(&self, request: &ClientRequest, events: EventSink) -> Result<Box<dyn Transport>> {
        (**self).connect(request, events)
    }
}

/// Commands accepted by an established transport. Only called on the network context.
pub trait Transport: Send + 'static {
    /// Send one data frame. An error means the frame was not accepted and will be offered again.
    fn send_frame(&mut self, frame: Frame) -> Result<()>;

    /// Allow the peer to send `quota` more bytes of data frames.
    fn send_flow_control(&mut self, quota: u64) -> Result<()>;

    /// Start the closing handshake.
    fn start_closing_handshake(&mut self, code: CloseCode, reason: &str) -> Result<()>;
}

/// Everything the transport reports about the channel.
#[derive(Debug)]
pub enum TransportEvent {
    /// The opening handshake request has been sent.
    HandshakeStarted(HandshakeRequest),
    /// The opening handshake succeeded.
    HandshakeFinished {
        /// The raw response.
        response: HandshakeResponse,
        /// The subprotocol selected by the server, empty if none.
        protocol: String,
        /// The negotiated extensions, empty if none.
        extensions: String,
    },
    /// A data frame arrived.
    DataFrame(Frame),
    /// The peer allows us to send `quota` more bytes.
    FlowControlGranted(u64),
    /// The peer started the closing handshake.
    ClosingHandshakeStarted,
    /// The channel is gone. Always the last event.
    ChannelDropped {
        /// Whether the closing handshake completed.
        was_clean: bool,
        /// The close code.
        code: CloseCode,
        /// The close reason.
        reason: String,
    },
    /// The channel failed, e.g. on a protocol violation. A `ChannelDropped` follows.
    ChannelFailed(String),
}

/// The transport's handle for reporting [`TransportEvent`]s.
///
/// Delivering an event only queues it on the network context, so a transport
/// may call [`EventSink::deliver`] from inside any command without re-entering
/// the channel. Events delivered after the channel is gone are discarded.
#[derive(Clone)]
pub struct EventSink {
    channel: Weak<Channel>,
    network: Arc<dyn TaskRunner>,
}

impl EventSink {
    pub(crate) fn new(channel: Weak<Channel>, network: Arc<dyn TaskRunner>) -> Self {
        EventSink { channel, network }
    }

    /// Queue an event for the channel.
    pub fn deliver(&self, event: TransportEvent) {
        let channel = self.channel.clone();
        post(&self.network, move || match channel.upgrade() {
            Some(channel) => channel.handle_event(event),
            None => trace!("Channel is gone, discarding {:?}", event),
        });
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventSink").field("alive", &(self.channel.strong_count() > 0)).finish()
    }
}
