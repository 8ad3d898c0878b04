//! The channel controller: bridges the application and network contexts.
//!
//! Commands from the application are posted to the network context, where the
//! send queue and the transport live. Transport events are handled on the
//! network context and forwarded to the application context as notifications
//! for the [`ChannelDelegate`].

use std::{
    fmt,
    sync::{Arc, Weak},
};

use log::*;
use parking_lot::Mutex;

use crate::{
    context::{post, Contexts},
    error::{Error, ProtocolError, Result},
    handshake::{client::ClientRequest, HandshakeRequest, HandshakeResponse},
    protocol::{CloseCode, Drained, Frame, SendQueue, WebSocketConfig},
    transport::{Connector, EventSink, Transport, TransportEvent},
};

/// Receives channel notifications on the application context.
///
/// The channel only holds a weak reference to its delegate. Once the delegate
/// is gone, or the channel was dropped or terminated, notifications are
/// discarded.
pub trait ChannelDelegate: Send + Sync {
    /// The opening handshake request was sent.
    fn on_start_opening_handshake(&self, request: HandshakeRequest);
    /// The opening handshake completed.
    fn on_finish_opening_handshake(
        &self,
        response: HandshakeResponse,
        protocol: String,
        extensions: String,
    );
    /// A data frame arrived.
    fn on_data_frame(&self, frame: Frame);
    /// `sent` bytes were handed to the transport.
    fn on_buffered_amount_sent(&self, sent: u64);
    /// The peer started the closing handshake.
    fn on_closing_handshake(&self);
    /// The channel failed.
    fn on_fail_channel(&self, error: Error);
    /// The channel is gone. Nothing is delivered after this.
    fn on_drop_channel(&self, was_clean: bool, code: CloseCode, reason: String);
}

/// State owned by the network context.
struct Io {
    transport: Option<Box<dyn Transport>>,
    queue: SendQueue,
}

/// One WebSocket channel, shared by both contexts.
pub struct Channel {
    contexts: Contexts,
    config: WebSocketConfig,
    io: Mutex<Io>,
    delegate: Mutex<Option<Weak<dyn ChannelDelegate>>>,
}

impl Channel {
    /// Create a channel that is not connected yet.
    pub fn new(contexts: Contexts, config: WebSocketConfig) -> Arc<Self> {
        Arc::new(Channel {
            contexts,
            config,
            io: Mutex::new(Io { transport: None, queue: SendQueue::new() }),
            delegate: Mutex::new(None),
        })
    }

    /// Set the object notified on the application context.
    pub fn set_delegate(&self, delegate: Weak<dyn ChannelDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    /// Start connecting on the network context.
    pub fn connect(self: &Arc<Self>, connector: Box<dyn Connector>, request: ClientRequest) {
        let this = self.clone();
        post(&self.contexts.network, move || this.do_connect(connector.as_ref(), request));
    }

    /// Queue a frame for sending.
    ///
    /// Frames sent after the transport was released are dropped.
    pub fn send(self: &Arc<Self>, frame: Frame) {
        let this = self.clone();
        post(&self.contexts.network, move || this.do_send(frame));
    }

    /// Ask the transport to start the closing handshake.
    ///
    /// Frames already queued are neither flushed nor discarded by this.
    pub fn close(self: &Arc<Self>, code: CloseCode, reason: String) {
        let this = self.clone();
        post(&self.contexts.network, move || this.do_close(code, &reason));
    }

    /// Stop all notifications now and release the transport on the network context.
    pub fn terminate(self: &Arc<Self>) {
        self.detach();
        let this = self.clone();
        post(&self.contexts.network, move || {
            if this.io.lock().transport.take().is_some() {
                debug!("Channel terminated, transport released");
            }
        });
    }

    /// A handle the transport uses to report events.
    pub fn event_sink(self: &Arc<Self>) -> EventSink {
        EventSink::new(Arc::downgrade(self), self.contexts.network.clone())
    }

    /// Bytes queued on the network context and not yet handed to the transport.
    pub fn queued_amount(&self) -> u64 {
        self.io.lock().queue.buffered_amount()
    }

    fn do_connect(self: &Arc<Self>, connector: &dyn Connector, request: ClientRequest) {
        debug!("Connecting to {}", request.url());
        match connector.connect(&request, self.event_sink()) {
            Ok(mut transport) => {
                if let Err(err) = transport.send_flow_control(self.config.receive_quota) {
                    warn!("Failed to grant the initial receive quota: {}", err);
                }
                self.io.lock().transport = Some(transport);
            }
            Err(err) => {
                error!("Failed to connect to {}: {}", request.url(), err);
                self.notify(move |delegate| delegate.on_fail_channel(err));
                self.notify_dropped(false, CloseCode::Abnormal, String::new());
            }
        }
    }

    fn do_send(self: &Arc<Self>, frame: Frame) {
        let result = {
            let mut io = self.io.lock();
            let Io { transport, queue } = &mut *io;
            let Some(transport) = transport.as_mut() else {
                warn!("Transport released, dropping {}", frame);
                return;
            };
            queue.enqueue(frame, |frame| send_frame(transport.as_mut(), frame))
        };
        self.after_drain(result);
    }

    fn do_close(&self, code: CloseCode, reason: &str) {
        let mut io = self.io.lock();
        match io.transport.as_mut() {
            Some(transport) => {
                debug!("Starting closing handshake ({}, {:?})", code, reason);
                if let Err(err) = transport.start_closing_handshake(code, reason) {
                    warn!("Failed to start the closing handshake: {}", err);
                }
            }
            None => warn!("Transport released, ignoring close ({})", code),
        }
    }

    fn grant_quota(self: &Arc<Self>, quota: u64) {
        let result = {
            let mut io = self.io.lock();
            let Io { transport, queue } = &mut *io;
            let Some(transport) = transport.as_mut() else {
                trace!("Transport released, ignoring send quota {}", quota);
                return;
            };
            queue.grant_quota(quota, |frame| send_frame(transport.as_mut(), frame))
        };
        self.after_drain(result);
    }

    fn replenish_receive_quota(&self, quota: u64) {
        if let Some(transport) = self.io.lock().transport.as_mut() {
            if let Err(err) = transport.send_flow_control(quota) {
                warn!("Failed to grant receive quota: {}", err);
            }
        }
    }

    fn after_drain(self: &Arc<Self>, drained: Drained) {
        let Drained { sent, result } = drained;
        if sent > 0 {
            self.notify(move |delegate| delegate.on_buffered_amount_sent(sent));
        }
        if let Err(err) = result {
            warn!("Transport did not accept a frame, keeping it queued: {}", err);
        }
    }

    /// Handle one transport event on the network context.
    pub(crate) fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::HandshakeStarted(request) => {
                self.notify(move |delegate| delegate.on_start_opening_handshake(request));
            }
            TransportEvent::HandshakeFinished { response, protocol, extensions } => {
                debug!("Opening handshake finished, protocol {:?}", protocol);
                self.notify(move |delegate| {
                    delegate.on_finish_opening_handshake(response, protocol, extensions)
                });
            }
            TransportEvent::DataFrame(frame) => {
                trace!("Received {}", frame);
                let len = frame.len() as u64;
                self.notify(move |delegate| delegate.on_data_frame(frame));
                if len > 0 {
                    // Granting from inside frame delivery could make the
                    // transport deliver again before this event is done.
                    let this = self.clone();
                    post(&self.contexts.network, move || this.replenish_receive_quota(len));
                }
            }
            TransportEvent::FlowControlGranted(quota) => self.grant_quota(quota),
            TransportEvent::ClosingHandshakeStarted => {
                debug!("Peer started the closing handshake");
                self.notify(|delegate| delegate.on_closing_handshake());
            }
            TransportEvent::ChannelFailed(message) => {
                warn!("Channel failed: {}", message);
                let err = Error::Protocol(ProtocolError::ChannelFailed(message));
                self.notify(move |delegate| delegate.on_fail_channel(err));
            }
            TransportEvent::ChannelDropped { was_clean, code, reason } => {
                debug!(
                    "Channel dropped (clean: {}, code: {}, reason: {:?})",
                    was_clean, code, reason
                );
                self.io.lock().transport.take();
                self.notify_dropped(was_clean, code, reason);
            }
        }
    }

    /// Run `f` with the delegate on the application context, if it is still there.
    fn notify<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&dyn ChannelDelegate) + Send + 'static,
    {
        let this = self.clone();
        post(&self.contexts.application, move || match this.delegate() {
            Some(delegate) => f(delegate.as_ref()),
            None => trace!("No delegate, discarding notification"),
        });
    }

    fn notify_dropped(self: &Arc<Self>, was_clean: bool, code: CloseCode, reason: String) {
        let this = self.clone();
        post(&self.contexts.application, move || {
            if let Some(delegate) = this.delegate() {
                delegate.on_drop_channel(was_clean, code, reason);
            }
            this.detach();
        });
    }

    fn delegate(&self) -> Option<Arc<dyn ChannelDelegate>> {
        self.delegate.lock().as_ref().and_then(Weak::upgrade)
    }

    fn detach(&self) {
        self.delegate.lock().take();
    }
}

fn send_frame(transport: &mut dyn Transport, frame: Frame) -> Result<()> {
    trace!("Sending {}", frame);
    transport.send_frame(frame)
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("config", &self.config)
            .field("attached", &self.delegate.lock().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::LocalQueue,
        handshake::client::IntoClientRequest,
        protocol::{Data, ReadyState, StateMachine},
    };

    #[derive(Debug, PartialEq)]
    enum Command {
        Frame(Frame),
        FlowControl(u64),
        Close(CloseCode, String),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        commands: Arc<Mutex<Vec<Command>>>,
        sink: Arc<Mutex<Option<EventSink>>>,
    }

    impl Connector for Recorder {
        fn connect(&self, _: &ClientRequest, events: EventSink) -> Result<Box<dyn Transport>> {
            *self.sink.lock() = Some(events);
            Ok(Box::new(self.clone()))
        }
    }

    impl Transport for Recorder {
        fn send_frame(&mut self, frame: Frame) -> Result<()> {
            self.commands.lock().push(Command::Frame(frame));
            Ok(())
        }
        fn send_flow_control(&mut self, quota: u64) -> Result<()> {
            self.commands.lock().push(Command::FlowControl(quota));
            Ok(())
        }
        fn start_closing_handshake(&mut self, code: CloseCode, reason: &str) -> Result<()> {
            self.commands.lock().push(Command::Close(code, reason.into()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Delegate {
        log: Mutex<Vec<String>>,
        state: Mutex<StateMachine>,
    }

    impl ChannelDelegate for Delegate {
        fn on_start_opening_handshake(&self, _: HandshakeRequest) {
            self.log.lock().push("start".into());
        }
        fn on_finish_opening_handshake(&self, _: HandshakeResponse, protocol: String, _: String) {
            self.state.lock().open();
            self.log.lock().push(format!("finish {}", protocol));
        }
        fn on_data_frame(&self, frame: Frame) {
            self.log.lock().push(format!("frame {}", frame.len()));
        }
        fn on_buffered_amount_sent(&self, sent: u64) {
            self.log.lock().push(format!("sent {}", sent));
        }
        fn on_closing_handshake(&self) {
            self.log.lock().push("closing".into());
        }
        fn on_fail_channel(&self, error: Error) {
            self.log.lock().push(format!("fail {}", error));
        }
        fn on_drop_channel(&self, _: bool, code: CloseCode, _: String) {
            self.state.lock().close();
            self.log.lock().push(format!("drop {}", code));
        }
    }

    struct Fixture {
        network: Arc<LocalQueue>,
        application: Arc<LocalQueue>,
        channel: Arc<Channel>,
        delegate: Arc<Delegate>,
        transport: Recorder,
    }

    impl Fixture {
        fn new() -> Self {
            let network = Arc::new(LocalQueue::new());
            let application = Arc::new(LocalQueue::new());
            let contexts = Contexts::new(network.clone(), application.clone());
            let config = WebSocketConfig::default().receive_quota(1000);
            let channel = Channel::new(contexts, config);
            let delegate = Arc::new(Delegate::default());
            let weak: Weak<dyn ChannelDelegate> = Arc::<Delegate>::downgrade(&delegate);
            channel.set_delegate(weak);
            let transport = Recorder::default();
            let request = "ws://localhost/".into_client_request().unwrap();
            channel.connect(Box::new(transport.clone()), request);
            let fixture = Fixture { network, application, channel, delegate, transport };
            fixture.pump();
            fixture
        }

        fn pump(&self) {
            while self.network.run_pending() + self.application.run_pending() > 0 {}
        }

        fn deliver(&self, event: TransportEvent) {
            self.transport.sink.lock().as_ref().unwrap().deliver(event);
            self.pump();
        }

        fn log(&self) -> Vec<String> {
            self.delegate.log.lock().clone()
        }
    }

    #[test]
    fn initial_receive_quota() {
        let fx = Fixture::new();
        assert_eq!(*fx.transport.commands.lock(), vec![Command::FlowControl(1000)]);
    }

    #[test]
    fn data_frames_replenish_receive_quota() {
        let fx = Fixture::new();
        fx.deliver(TransportEvent::DataFrame(Frame::message(&b"hello"[..], Data::Text, true)));
        fx.deliver(TransportEvent::DataFrame(Frame::message(&b""[..], Data::Text, true)));
        assert_eq!(fx.log(), vec!["frame 5", "frame 0"]);
        assert_eq!(
            *fx.transport.commands.lock(),
            vec![Command::FlowControl(1000), Command::FlowControl(5)]
        );
    }

    #[test]
    fn sends_wait_for_quota() {
        let fx = Fixture::new();
        fx.channel.send(Frame::message(vec![0u8; 8], Data::Binary, true));
        fx.pump();
        assert_eq!(fx.channel.queued_amount(), 8);
        assert_eq!(fx.transport.commands.lock().len(), 1);

        fx.deliver(TransportEvent::FlowControlGranted(5));
        assert_eq!(fx.channel.queued_amount(), 3);
        fx.deliver(TransportEvent::FlowControlGranted(5));
        assert_eq!(fx.channel.queued_amount(), 0);
        assert_eq!(fx.log(), vec!["sent 5", "sent 3"]);
    }

    #[test]
    fn drop_detaches_delegate_and_releases_transport() {
        let fx = Fixture::new();
        fx.deliver(TransportEvent::ChannelDropped {
            was_clean: true,
            code: CloseCode::Normal,
            reason: String::new(),
        });
        fx.deliver(TransportEvent::DataFrame(Frame::message(&b"late"[..], Data::Text, true)));
        fx.channel.send(Frame::message(&b"late"[..], Data::Text, true));
        fx.pump();

        assert_eq!(fx.log(), vec!["drop 1000"]);
        assert_eq!(fx.delegate.state.lock().state(), ReadyState::Closed);
        assert_eq!(fx.transport.commands.lock().len(), 1);
    }

    #[test]
    fn terminate_discards_in_flight_notifications() {
        let fx = Fixture::new();
        let sink = fx.transport.sink.lock().clone().unwrap();
        sink.deliver(TransportEvent::ClosingHandshakeStarted);
        fx.network.run_pending();
        // The notification is posted but not yet delivered.
        fx.channel.terminate();
        fx.pump();
        assert!(fx.log().is_empty());
    }

    #[test]
    fn close_is_forwarded() {
        let fx = Fixture::new();
        fx.channel.close(CloseCode::Normal, "bye".into());
        fx.pump();
        assert_eq!(
            fx.transport.commands.lock().last(),
            Some(&Command::Close(CloseCode::Normal, "bye".into()))
        );
    }

    #[test]
    fn failed_connect_is_reported() {
        struct Refuse;
        impl Connector for Refuse {
            fn connect(&self, _: &ClientRequest, _: EventSink) -> Result<Box<dyn Transport>> {
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into())
            }
        }

        let network = Arc::new(LocalQueue::new());
        let application = Arc::new(LocalQueue::new());
        let channel =
            Channel::new(Contexts::new(network.clone(), application.clone()), Default::default());
        let delegate = Arc::new(Delegate::default());
        let weak: Weak<dyn ChannelDelegate> = Arc::<Delegate>::downgrade(&delegate);
        channel.set_delegate(weak);
        channel.connect(Box::new(Refuse), "ws://localhost/".into_client_request().unwrap());
        while network.run_pending() + application.run_pending() > 0 {}

        assert_eq!(delegate.log.lock().clone(), vec!["fail IO error: refused", "drop 1006"]);
    }
}
