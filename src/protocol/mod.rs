//! Generic WebSocket channel protocol pieces: frames, reassembly, send flow control and lifecycle.

pub mod frame;

mod message;
mod send_queue;
mod state;

pub use self::{
    frame::{
        coding::{CloseCode, Data},
        Frame,
    },
    message::{BinaryData, BinaryType, FrameBuffer, Message},
    send_queue::{Drained, SendQueue},
    state::{ReadyState, StateMachine},
};

/// The configuration for a WebSocket connection.
///
/// # Example
/// ```
/// # use wschannel::protocol::{BinaryType, WebSocketConfig};
/// let conf = WebSocketConfig::default()
///     .max_message_size(Some(1 << 20))
///     .binary_type(BinaryType::Copied);
/// ```
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct WebSocketConfig {
    /// The maximum size of an incoming message. `None` means no size limit. The default
    /// value is 64 MiB which should be reasonably big for all normal use-cases but small
    /// enough to prevent memory eating by a malicious user.
    ///
    /// A message that grows beyond it fails the connection with close code 1009.
    pub max_message_size: Option<usize>,
    /// The receive window granted to the transport once the channel exists.
    /// Every delivered data frame gives its length back to the window.
    /// The default is `i32::MAX` bytes.
    pub receive_quota: u64,
    /// How binary messages are represented initially. Can be changed later
    /// through the connection. The default is [`BinaryType::Shared`].
    pub binary_type: BinaryType,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: Some(64 << 20),
            receive_quota: i32::MAX as u64,
            binary_type: BinaryType::default(),
        }
    }
}

impl WebSocketConfig {
    /// Set [`Self::max_message_size`].
    pub fn max_message_size(mut self, max_message_size: Option<usize>) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set [`Self::receive_quota`].
    pub fn receive_quota(mut self, receive_quota: u64) -> Self {
        self.receive_quota = receive_quota;
        self
    }

    /// Set [`Self::binary_type`].
    pub fn binary_type(mut self, binary_type: BinaryType) -> Self {
        self.binary_type = binary_type;
        self
    }
}
