//! The message-oriented connection object applications work with.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use bytes::Bytes;
use log::*;
use parking_lot::Mutex;
use url::Url;

use crate::{
    channel::{Channel, ChannelDelegate},
    context::Contexts,
    error::{ArgumentError, CapacityError, Error, ProtocolError, Result},
    handshake::{client::IntoClientRequest, HandshakeRequest, HandshakeResponse},
    protocol::{
        BinaryType, CloseCode, Data, Frame, FrameBuffer, Message, ReadyState, StateMachine,
        WebSocketConfig,
    },
    transport::Connector,
};

/// Longest close reason, in bytes, that fits into a close frame.
const MAX_CLOSE_REASON: usize = 123;

/// Details of a closed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// The close code.
    pub code: CloseCode,
    /// The close reason.
    pub reason: String,
    /// Whether the closing handshake completed.
    pub was_clean: bool,
}

/// A notification raised on the application context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The connection is open.
    Open,
    /// A complete message arrived.
    Message(Message),
    /// The connection is closed. Always the last event.
    Close(CloseEvent),
    /// Something went wrong. A `Close` follows eventually.
    Error(String),
}

/// Observes a connection. Every method runs on the application context.
///
/// `on_open` and `on_close` are called at most once. `on_close` is the last call
/// a handler receives; the handler is dropped right after it.
pub trait Handler: Send + 'static {
    /// The opening handshake finished.
    fn on_open(&mut self) {}

    /// A complete message arrived.
    fn on_message(&mut self, _message: Message) {}

    /// The connection is closed.
    fn on_close(&mut self, _event: CloseEvent) {}

    /// The connection failed or a message could not be delivered.
    fn on_error(&mut self, _message: String) {}
}

impl Handler for std::sync::mpsc::Sender<Event> {
    fn on_open(&mut self) {
        self.send(Event::Open).ok();
    }

    fn on_message(&mut self, message: Message) {
        self.send(Event::Message(message)).ok();
    }

    fn on_close(&mut self, event: CloseEvent) {
        self.send(Event::Close(event)).ok();
    }

    fn on_error(&mut self, message: String) {
        self.send(Event::Error(message)).ok();
    }
}

#[cfg(feature = "tokio")]
impl Handler for tokio::sync::mpsc::UnboundedSender<Event> {
    fn on_open(&mut self) {
        self.send(Event::Open).ok();
    }

    fn on_message(&mut self, message: Message) {
        self.send(Event::Message(message)).ok();
    }

    fn on_close(&mut self, event: CloseEvent) {
        self.send(Event::Close(event)).ok();
    }

    fn on_error(&mut self, message: String) {
        self.send(Event::Error(message)).ok();
    }
}

/// Open a WebSocket connection.
///
/// The request is validated right away; an invalid URL, subprotocol or header
/// is returned as an error and no connection is created. Everything after that
/// is reported to `handler` on the application context.
pub fn connect<Req, C, H>(
    request: Req,
    connector: C,
    contexts: Contexts,
    handler: H,
) -> Result<WebSocket>
where
    Req: IntoClientRequest,
    C: Connector,
    H: Handler,
{
    connect_with_config(request, None, connector, contexts, handler)
}

/// Open a WebSocket connection with the given configuration.
///
/// Calling it with `None` is equal to calling [`connect`].
pub fn connect_with_config<Req, C, H>(
    request: Req,
    config: Option<WebSocketConfig>,
    connector: C,
    contexts: Contexts,
    handler: H,
) -> Result<WebSocket>
where
    Req: IntoClientRequest,
    C: Connector,
    H: Handler,
{
    let request = request.into_client_request()?;
    let config = config.unwrap_or_default();
    let channel = Channel::new(contexts, config);

    let inner = Arc::new(Inner {
        url: request.url().clone(),
        channel: channel.clone(),
        max_message_size: config.max_message_size,
        state: Mutex::new(State {
            machine: StateMachine::new(),
            frames: FrameBuffer::new(),
            binary_type: config.binary_type,
            protocol: String::new(),
            extensions: String::new(),
            buffered_amount: 0,
            handshake_request: None,
            handshake_response: None,
        }),
        handler: Mutex::new(Some(Box::new(handler))),
    });

    let delegate: Weak<dyn ChannelDelegate> = Arc::<Inner>::downgrade(&inner);
    channel.set_delegate(delegate);
    channel.connect(Box::new(connector), request);
    debug!("Created connection to {}", inner.url);

    Ok(WebSocket { inner })
}

/// A client WebSocket connection.
///
/// Handles are cheap to clone and all refer to the same connection. When the
/// last handle is dropped the connection is terminated.
#[derive(Clone)]
pub struct WebSocket {
    inner: Arc<Inner>,
}

impl WebSocket {
    /// Queue a data frame.
    ///
    /// `opcode` is [`Data::Text`] or [`Data::Binary`] for the first frame of a
    /// message and [`Data::Continue`] for the following ones; `is_last` ends the
    /// message.
    ///
    /// Frames are queued even while the connection is not `OPEN` yet or already
    /// closing; check [`WebSocket::ready_state`] first if that matters. Only a
    /// `CLOSED` connection refuses with [`Error::AlreadyClosed`].
    pub fn send(&self, data: impl Into<Bytes>, opcode: Data, is_last: bool) -> Result<()> {
        let frame = Frame::message(data, opcode, is_last);
        {
            let mut state = self.inner.state.lock();
            if state.machine.state() == ReadyState::Closed {
                return Err(Error::AlreadyClosed);
            }
            state.buffered_amount += frame.len() as u64;
        }
        self.inner.channel.send(frame);
        Ok(())
    }

    /// Queue a complete message.
    pub fn send_message(&self, message: Message) -> Result<()> {
        let opcode = message.opcode();
        self.send(message.into_data(), opcode, true)
    }

    /// Start the closing handshake.
    ///
    /// `code` must be [`CloseCode::Normal`] or in `3000..=4999`, and `reason` at
    /// most 123 bytes. Closing an already closing or closed connection does nothing.
    pub fn close(&self, code: CloseCode, reason: &str) -> Result<()> {
        if !code.is_application_allowed() {
            return Err(ArgumentError::InvalidCloseCode(code.into()).into());
        }
        if reason.len() > MAX_CLOSE_REASON {
            return Err(ArgumentError::CloseReasonTooLong(reason.len()).into());
        }
        if self.inner.state.lock().machine.start_closing() {
            self.inner.channel.close(code, reason.into());
        }
        Ok(())
    }

    /// Stop the connection without a closing handshake.
    ///
    /// No further notifications are delivered, not even `close`.
    pub fn terminate(&self) {
        self.inner.terminate();
    }

    /// The current lifecycle state.
    pub fn ready_state(&self) -> ReadyState {
        self.inner.state.lock().machine.state()
    }

    /// Payload bytes passed to [`WebSocket::send`] and not yet handed to the transport.
    ///
    /// Bytes that never reach the transport stay counted. This happens to
    /// frames sent after the transport went away but before the connection was
    /// seen as `CLOSED`, and to frames still queued when it closed.
    pub fn buffered_amount(&self) -> u64 {
        self.inner.state.lock().buffered_amount
    }

    /// The subprotocol selected by the server, empty until the connection is open.
    pub fn protocol(&self) -> String {
        self.inner.state.lock().protocol.clone()
    }

    /// The negotiated extensions, empty until the connection is open.
    pub fn extensions(&self) -> String {
        self.inner.state.lock().extensions.clone()
    }

    /// The URL this connection was opened for.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// How binary messages are delivered.
    pub fn binary_type(&self) -> BinaryType {
        self.inner.state.lock().binary_type
    }

    /// Change how binary messages are delivered from now on.
    pub fn set_binary_type(&self, binary_type: BinaryType) {
        self.inner.state.lock().binary_type = binary_type;
    }

    /// Change the binary representation by name (`"shared"` or `"copied"`).
    ///
    /// An unknown name fails with [`Error::InvalidArgument`] and keeps the current mode.
    pub fn set_binary_type_name(&self, name: &str) -> Result<()> {
        let binary_type = name.parse()?;
        self.set_binary_type(binary_type);
        Ok(())
    }

    /// The opening handshake request, once the transport has sent it.
    pub fn handshake_request(&self) -> Option<Arc<HandshakeRequest>> {
        self.inner.state.lock().handshake_request.clone()
    }

    /// The opening handshake response, once the connection is open.
    pub fn handshake_response(&self) -> Option<Arc<HandshakeResponse>> {
        self.inner.state.lock().handshake_response.clone()
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("url", &self.inner.url.as_str())
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

/// Application-side connection state.
struct State {
    machine: StateMachine,
    frames: FrameBuffer,
    binary_type: BinaryType,
    protocol: String,
    extensions: String,
    buffered_amount: u64,
    handshake_request: Option<Arc<HandshakeRequest>>,
    handshake_response: Option<Arc<HandshakeResponse>>,
}

struct Inner {
    url: Url,
    channel: Arc<Channel>,
    max_message_size: Option<usize>,
    state: Mutex<State>,
    handler: Mutex<Option<Box<dyn Handler>>>,
}

impl Inner {
    fn emit(&self, event: Event) {
        // Taken out for the call so the handler may use the connection, terminate included.
        let handler = self.handler.lock().take();
        let Some(mut handler) = handler else {
            trace!("No handler, dropping {:?}", event);
            return;
        };
        match event {
            Event::Open => handler.on_open(),
            Event::Message(message) => handler.on_message(message),
            Event::Close(close) => handler.on_close(close),
            Event::Error(message) => handler.on_error(message),
        }
        if self.state.lock().machine.state() != ReadyState::Closed {
            *self.handler.lock() = Some(handler);
        }
    }

    fn release_handler(&self) {
        let handler = self.handler.lock().take();
        // Dropped outside the lock: the handler may own a handle to us.
        drop(handler);
    }

    fn terminate(&self) {
        let closed = self.state.lock().machine.close();
        if closed {
            debug!("Terminating connection to {}", self.url);
        }
        self.channel.terminate();
        self.release_handler();
    }

    /// Fail the connection from our side after a bad inbound message.
    fn fail(&self, code: CloseCode, err: Error) {
        warn!("Failing connection to {}: {}", self.url, err);
        let start_closing = {
            let mut state = self.state.lock();
            state.frames = FrameBuffer::new();
            state.machine.start_closing()
        };
        if start_closing {
            self.channel.close(code, String::new());
        }
        self.emit(Event::Error(err.to_string()));
    }
}

impl ChannelDelegate for Inner {
    fn on_start_opening_handshake(&self, request: HandshakeRequest) {
        self.state.lock().handshake_request = Some(Arc::new(request));
    }

    fn on_finish_opening_handshake(
        &self,
        response: HandshakeResponse,
        protocol: String,
        extensions: String,
    ) {
        let opened = {
            let mut state = self.state.lock();
            let opened = state.machine.open();
            if opened {
                state.protocol = protocol;
                state.extensions = extensions;
                state.handshake_response = Some(Arc::new(response));
            }
            opened
        };
        if opened {
            self.emit(Event::Open);
        }
    }

    fn on_data_frame(&self, frame: Frame) {
        let result = {
            let mut state = self.state.lock();
            if !state.machine.accepts_messages() {
                trace!("Connection closed, dropping {}", frame);
                return;
            }
            let size = state.frames.pending_len() + frame.len();
            match self.max_message_size {
                Some(max_size) if size > max_size => {
                    Err(Error::Capacity(CapacityError::MessageTooLong { size, max_size }))
                }
                _ => match state.frames.accept(frame) {
                    Some((opcode, payload)) => {
                        Message::decode(opcode, payload, state.binary_type).map(Some)
                    }
                    None => Ok(None),
                },
            }
        };

        match result {
            Ok(Some(message)) => {
                trace!("Received message {}", message);
                self.emit(Event::Message(message));
            }
            Ok(None) => {}
            Err(err @ Error::Capacity(_)) => self.fail(CloseCode::Size, err),
            Err(err @ Error::Protocol(ProtocolError::InvalidUtf8)) => {
                self.fail(CloseCode::Invalid, err)
            }
            Err(err) => self.fail(CloseCode::Protocol, err),
        }
    }

    fn on_buffered_amount_sent(&self, sent: u64) {
        let mut state = self.state.lock();
        state.buffered_amount = state.buffered_amount.saturating_sub(sent);
    }

    fn on_closing_handshake(&self) {
        self.state.lock().machine.start_closing();
    }

    fn on_fail_channel(&self, error: Error) {
        let notify = {
            let mut state = self.state.lock();
            state.machine.start_closing();
            state.machine.state() != ReadyState::Closed
        };
        if notify {
            self.emit(Event::Error(error.to_string()));
        }
    }

    fn on_drop_channel(&self, was_clean: bool, code: CloseCode, reason: String) {
        if self.state.lock().machine.close() {
            self.emit(Event::Close(CloseEvent { code, reason, was_clean }));
        }
        self.release_handler();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.channel.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::LocalQueue,
        transport::{EventSink, Transport},
        ClientRequest,
    };
    use std::sync::mpsc;

    struct Nowhere;

    impl Connector for Nowhere {
        fn connect(&self, _: &ClientRequest, _: EventSink) -> Result<Box<dyn Transport>> {
            Err(Error::AlreadyClosed)
        }
    }

    fn connection() -> (WebSocket, Arc<LocalQueue>, mpsc::Receiver<Event>) {
        let queue = Arc::new(LocalQueue::new());
        let (tx, rx) = mpsc::channel();
        let contexts = Contexts::new(queue.clone(), queue.clone());
        let ws = connect("ws://localhost/", Nowhere, contexts, tx).unwrap();
        (ws, queue, rx)
    }

    #[test]
    fn starts_connecting() {
        let (ws, _queue, _rx) = connection();
        assert_eq!(ws.ready_state(), ReadyState::Connecting);
        assert_eq!(ws.protocol(), "");
        assert_eq!(ws.extensions(), "");
        assert_eq!(ws.buffered_amount(), 0);
        assert_eq!(ws.url().as_str(), "ws://localhost/");
    }

    #[test]
    fn invalid_url_creates_nothing() {
        let queue = Arc::new(LocalQueue::new());
        let (tx, _rx) = mpsc::channel();
        let contexts = Contexts::new(queue.clone(), queue.clone());
        let err = connect("ftp://localhost/", Nowhere, contexts, tx).unwrap_err();
        assert!(matches!(err, Error::Url(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn binary_type_by_name() {
        let (ws, _queue, _rx) = connection();
        ws.set_binary_type_name("copied").unwrap();
        assert_eq!(ws.binary_type(), BinaryType::Copied);

        let err = ws.set_binary_type_name("arraybuffer").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ArgumentError::UnknownBinaryType(_))));
        assert_eq!(ws.binary_type(), BinaryType::Copied);
    }

    #[test]
    fn close_arguments_are_checked() {
        let (ws, _queue, _rx) = connection();
        assert!(matches!(
            ws.close(CloseCode::Away, ""),
            Err(Error::InvalidArgument(ArgumentError::InvalidCloseCode(1001)))
        ));
        assert!(matches!(
            ws.close(CloseCode::Normal, &"x".repeat(124)),
            Err(Error::InvalidArgument(ArgumentError::CloseReasonTooLong(124)))
        ));
        assert_eq!(ws.ready_state(), ReadyState::Connecting);

        ws.close(CloseCode::from(4000), "done").unwrap();
        assert_eq!(ws.ready_state(), ReadyState::Closing);
        ws.close(CloseCode::Normal, "again").unwrap();
        assert_eq!(ws.ready_state(), ReadyState::Closing);
    }

    #[test]
    fn failed_connector_closes_connection() {
        let (ws, queue, rx) = connection();
        queue.run_pending();
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                Event::Error("Trying to work with closed connection".into()),
                Event::Close(CloseEvent {
                    code: CloseCode::Abnormal,
                    reason: String::new(),
                    was_clean: false,
                }),
            ]
        );
        assert_eq!(ws.ready_state(), ReadyState::Closed);
        assert!(matches!(ws.send(&b"late"[..], Data::Binary, true), Err(Error::AlreadyClosed)));
    }

    #[test]
    fn terminate_is_silent() {
        let (ws, queue, rx) = connection();
        ws.terminate();
        queue.run_pending();
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(ws.ready_state(), ReadyState::Closed);
    }
}
