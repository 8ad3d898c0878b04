use std::fmt;

use bytes::Bytes;

use super::coding::Data;

/// A struct representing a WebSocket data frame as it is exchanged with the transport.
///
/// The wire encoding is the transport's business: a frame here is only its
/// payload, the data opcode and the FIN bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    finished: bool,
    opcode: Data,
    payload: Bytes,
}

impl Frame {
    /// Create a new data frame.
    #[inline]
    pub fn message(data: impl Into<Bytes>, opcode: Data, finished: bool) -> Frame {
        Frame { finished, opcode, payload: data.into() }
    }

    /// Get the length of the frame payload in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Test whether the frame carries no payload.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Test whether the frame is a final frame.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.finished
    }

    /// Get the OpCode of the frame.
    #[inline]
    pub fn opcode(&self) -> Data {
        self.opcode
    }

    /// Get a reference to the frame's payload.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame into its payload.
    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Split off the first `at` payload bytes into a new frame.
    ///
    /// The returned prefix keeps the opcode and is never final. `self` keeps the
    /// remaining bytes and its FIN bit, and becomes a continuation frame since
    /// it no longer starts the message.
    ///
    /// # Panics
    ///
    /// Panics if `at > self.len()`.
    pub fn split_to(&mut self, at: usize) -> Frame {
        let head = self.payload.split_to(at);
        let opcode = std::mem::replace(&mut self.opcode, Data::Continue);
        Frame { finished: false, opcode, payload: head }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<FRAME> final: {} opcode: {} length: {}",
            self.finished,
            self.opcode,
            self.payload.len()
        )
    }
}
