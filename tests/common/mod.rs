//! A scripted transport and a pair of manually pumped contexts.
#![allow(dead_code)]

use std::{
    io,
    sync::{mpsc, Arc},
};

use parking_lot::Mutex;
use wschannel::{
    connect_with_config, http, protocol::CloseCode, ClientRequest, Connector, Contexts, Event,
    EventSink, Frame, LocalQueue, Result, Transport, TransportEvent, WebSocket, WebSocketConfig,
};

/// A command the channel issued to the transport.
#[derive(Debug, PartialEq)]
pub enum Command {
    Frame(Frame),
    FlowControl(u64),
    Close(CloseCode, String),
}

/// Records every command and keeps the event sink for the test to drive.
#[derive(Clone, Default)]
pub struct MockTransport {
    pub commands: Arc<Mutex<Vec<Command>>>,
    pub sink: Arc<Mutex<Option<EventSink>>>,
    pub requests: Arc<Mutex<Vec<ClientRequest>>>,
    /// The `send_frame` call, counted from 1, that fails once with `WouldBlock`.
    pub reject_at: Arc<Mutex<Option<usize>>>,
    attempts: Arc<Mutex<usize>>,
}

impl MockTransport {
    pub fn frames(&self) -> Vec<Frame> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                Command::Frame(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Connector for MockTransport {
    fn connect(&self, request: &ClientRequest, events: EventSink) -> Result<Box<dyn Transport>> {
        self.requests.lock().push(request.clone());
        *self.sink.lock() = Some(events);
        Ok(Box::new(self.clone()))
    }
}

impl Transport for MockTransport {
    fn send_frame(&mut self, frame: Frame) -> Result<()> {
        let mut attempts = self.attempts.lock();
        *attempts += 1;
        if *self.reject_at.lock() == Some(*attempts) {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "transport busy").into());
        }
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

pub struct Harness {
    pub network: Arc<LocalQueue>,
    pub application: Arc<LocalQueue>,
    pub transport: MockTransport,
    pub ws: WebSocket,
    pub events: mpsc::Receiver<Event>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(WebSocketConfig::default())
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        let _ = env_logger::try_init();
        let network = Arc::new(LocalQueue::new());
        let application = Arc::new(LocalQueue::new());
        let transport = MockTransport::default();
        let (tx, events) = mpsc::channel();
        let ws = connect_with_config(
            "ws://localhost:3012/socket",
            Some(config),
            transport.clone(),
            Contexts::new(network.clone(), application.clone()),
            tx,
        )
        .unwrap();
        let harness = Harness { network, application, transport, ws, events };
        harness.pump();
        harness
    }

    /// Run both contexts until neither has work left.
    pub fn pump(&self) {
        while self.network.run_pending() + self.application.run_pending() > 0 {}
    }

    pub fn deliver(&self, event: TransportEvent) {
        self.transport.sink.lock().as_ref().unwrap().deliver(event);
        self.pump();
    }

    pub fn open(&self, protocol: &str) {
        self.deliver(TransportEvent::HandshakeFinished {
            response: http::Response::new(()),
            protocol: protocol.into(),
            extensions: String::new(),
        });
    }

    pub fn frame(&self, payload: &'static [u8], opcode: wschannel::Data, fin: bool) {
        self.deliver(TransportEvent::DataFrame(Frame::message(payload, opcode, fin)));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.try_iter().collect()
    }
}
