use std::{fmt, str, str::FromStr};

use bytes::{Bytes, BytesMut};
use log::*;

use super::frame::{coding::Data, Frame};
use crate::error::{ArgumentError, Error, ProtocolError, Result};

/// Reassembles fragmented inbound messages.
///
/// Non-final frames are kept until the final frame of the message arrives. The
/// message takes the opcode of its first frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<Bytes>,
    opcode: Option<Data>,
    pending_len: usize,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tell whether a fragmented message is in progress.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of payload bytes held for the message in progress.
    pub fn pending_len(&self) -> usize {
        self.pending_len
    }

    /// Add a frame, returning the complete payload once the final frame is seen.
    ///
    /// Frames without payload are ignored entirely, even a final one: they are
    /// neither stored nor do they complete the pending message.
    pub fn accept(&mut self, frame: Frame) -> Option<(Data, Bytes)> {
        if frame.is_empty() {
            trace!("Ignoring empty {} frame", frame.opcode());
            return None;
        }

        if !frame.is_final() {
            if self.pending.is_empty() {
                self.opcode = Some(frame.opcode());
            }
            self.pending_len += frame.len();
            self.pending.push(frame.into_payload());
            return None;
        }

        if self.pending.is_empty() {
            return Some((frame.opcode(), frame.into_payload()));
        }

        let opcode = self.opcode.take().unwrap_or_else(|| frame.opcode());
        let mut data = BytesMut::with_capacity(self.pending_len + frame.len());
        for chunk in self.pending.drain(..) {
            data.extend_from_slice(&chunk);
        }
        data.extend_from_slice(frame.payload());
        self.pending_len = 0;
        trace!("Reassembled {} message of {} bytes", opcode, data.len());
        Some((opcode, data.freeze()))
    }
}

/// How binary messages are handed to the application.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BinaryType {
    /// The reassembled buffer itself, shared without copying.
    #[default]
    Shared,
    /// A private copy owned by the application.
    Copied,
}

impl BinaryType {
    /// Wrap a message payload in this representation.
    pub fn convert(self, payload: Bytes) -> BinaryData {
        match self {
            BinaryType::Shared => BinaryData::Shared(payload),
            BinaryType::Copied => BinaryData::Owned(payload.to_vec()),
        }
    }
}

impl FromStr for BinaryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared" => Ok(BinaryType::Shared),
            "copied" => Ok(BinaryType::Copied),
            other => Err(ArgumentError::UnknownBinaryType(other.into()).into()),
        }
    }
}

impl fmt::Display for BinaryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BinaryType::Shared => write!(f, "shared"),
            BinaryType::Copied => write!(f, "copied"),
        }
    }
}

/// Binary message data.
#[derive(Debug, Clone)]
pub enum BinaryData {
    /// Shared, reference-counted bytes.
    Shared(Bytes),
    /// Uniquely owned bytes.
    Owned(Vec<u8>),
}

impl BinaryData {
    /// Length of the data in bytes.
    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    /// Tell whether there is no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert into shared bytes.
    pub fn into_bytes(self) -> Bytes {
        match self {
            BinaryData::Shared(data) => data,
            BinaryData::Owned(data) => data.into(),
        }
    }

    /// Convert into an owned vector.
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            BinaryData::Shared(data) => data.to_vec(),
            BinaryData::Owned(data) => data,
        }
    }
}

impl PartialEq for BinaryData {
    fn eq(&self, other: &BinaryData) -> bool {
        self.as_ref().eq(other.as_ref())
    }
}

impl Eq for BinaryData {}

impl AsRef<[u8]> for BinaryData {
    fn as_ref(&self) -> &[u8] {
        match self {
            BinaryData::Shared(data) => data.as_ref(),
            BinaryData::Owned(data) => data.as_ref(),
        }
    }
}

impl From<Vec<u8>> for BinaryData {
    fn from(data: Vec<u8>) -> BinaryData {
        BinaryData::Owned(data)
    }
}

impl From<Bytes> for BinaryData {
    fn from(data: Bytes) -> BinaryData {
        BinaryData::Shared(data)
    }
}

impl From<&'static [u8]> for BinaryData {
    fn from(data: &'static [u8]) -> BinaryData {
        BinaryData::Shared(Bytes::from_static(data))
    }
}

/// An enum representing the various forms of a WebSocket message.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Message {
    /// A text WebSocket message
    Text(String),
    /// A binary WebSocket message
    Binary(BinaryData),
}

impl Message {
    /// Create a new text WebSocket message from a stringable.
    pub fn text<S>(string: S) -> Message
    where
        S: Into<String>,
    {
        Message::Text(string.into())
    }

    /// Create a new binary WebSocket message.
    pub fn binary<B>(bin: B) -> Message
    where
        B: Into<BinaryData>,
    {
        Message::Binary(bin.into())
    }

    /// Build a message from a reassembled payload.
    ///
    /// Text payloads are decoded only here, once the whole message is known,
    /// so multi-byte sequences split across frames decode correctly.
    pub fn decode(opcode: Data, payload: Bytes, binary_type: BinaryType) -> Result<Message> {
        match opcode {
            Data::Text => {
                let text = String::from_utf8(payload.to_vec())
                    .map_err(|_| ProtocolError::InvalidUtf8)?;
                Ok(Message::Text(text))
            }
            Data::Binary => Ok(Message::Binary(binary_type.convert(payload))),
            Data::Continue => Err(ProtocolError::UnexpectedContinueFrame.into()),
            Data::Reserved(i) => Err(ProtocolError::UnknownDataFrameType(i).into()),
        }
    }

    /// The data opcode this message is sent with.
    pub fn opcode(&self) -> Data {
        match self {
            Message::Text(_) => Data::Text,
            Message::Binary(_) => Data::Binary,
        }
    }

    /// Indicates whether a message is a text message.
    pub fn is_text(&self) -> bool {
        matches!(*self, Message::Text(_))
    }

    /// Indicates whether a message is a binary message.
    pub fn is_binary(&self) -> bool {
        matches!(*self, Message::Binary(_))
    }

    /// Get the length of the WebSocket message.
    pub fn len(&self) -> usize {
        match *self {
            Message::Text(ref string) => string.len(),
            Message::Binary(ref data) => data.len(),
        }
    }

    /// Returns true if the WebSocket message has no content.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the WebSocket message and return it as binary data.
    pub fn into_data(self) -> Bytes {
        match self {
            Message::Text(string) => string.into(),
            Message::Binary(data) => data.into_bytes(),
        }
    }

    /// Attempt to consume the WebSocket message and convert it to a String.
    pub fn into_text(self) -> Result<String> {
        match self {
            Message::Text(string) => Ok(string),
            Message::Binary(data) => Ok(String::from_utf8(data.into_vec())?),
        }
    }

    /// Attempt to get a &str from the WebSocket message,
    /// this will try to convert binary data to utf8.
    pub fn to_text(&self) -> Result<&str> {
        match *self {
            Message::Text(ref string) => Ok(string),
            Message::Binary(ref data) => Ok(str::from_utf8(data.as_ref())?),
        }
    }
}

impl From<String> for Message {
    fn from(string: String) -> Message {
        Message::text(string)
    }
}

impl<'s> From<&'s str> for Message {
    fn from(string: &'s str) -> Message {
        Message::text(string)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Message {
        Message::binary(data)
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Message {
        Message::binary(data)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Ok(string) = self.to_text() {
            write!(f, "{}", string)
        } else {
            write!(f, "Binary Data<length={}>", self.len())
        }
    }
}
