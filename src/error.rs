//! Error handling.

use std::{io, result, str, string};

use thiserror::Error;

/// Result type of all wschannel library calls.
pub type Result<T, E = Error> = result::Result<T, E>;

/// Possible WebSocket channel errors.
///
/// Errors returned from method calls are always synchronous: they are raised
/// while validating construction options or arguments. Failures detected by the
/// transport travel the other way, as `error` and `close` notifications.
#[derive(Error, Debug)]
pub enum Error {
    /// Trying to work with an already closed connection.
    ///
    /// The connection reached `CLOSED` or was terminated, and the transport has
    /// been released. This indicates that the caller keeps using a connection
    /// it should have dropped.
    #[error("Trying to work with closed connection")]
    AlreadyClosed,
    /// Input-output error reported by a transport or connector.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Invalid URL.
    #[error("URL error: {0}")]
    Url(#[from] UrlError),
    /// HTTP format error in the additional handshake headers.
    #[error("HTTP format error: {0}")]
    HttpFormat(#[from] http::Error),
    /// An argument was rejected. Nothing changed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),
    /// Protocol violation.
    #[error("WebSocket protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// A message exceeded the configured capacity.
    #[error("Space limit exceeded: {0}")]
    Capacity(#[from] CapacityError),
    /// UTF coding error.
    #[error("UTF-8 encoding error: {0}")]
    Utf8(String),
}

impl From<str::Utf8Error> for Error {
    fn from(err: str::Utf8Error) -> Self {
        Error::Utf8(err.to_string())
    }
}

impl From<string::FromUtf8Error> for Error {
    fn from(err: string::FromUtf8Error) -> Self {
        Error::Utf8(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Error::HttpFormat(err.into())
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Error::HttpFormat(err.into())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Url(UrlError::Parse(err))
    }
}

/// Indicates the specific type/cause of a capacity error.
#[derive(Error, PartialEq, Eq, Debug, Clone, Copy)]
pub enum CapacityError {
    /// Message is bigger than the maximum allowed size.
    #[error("Message too long: {size} > {max_size}")]
    MessageTooLong {
        /// The size of the message.
        size: usize,
        /// The maximum allowed message size.
        max_size: usize,
    },
}

/// Indicates the specific type/cause of a protocol error.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    /// Received a continue frame despite there being nothing to continue.
    #[error("Continue frame but nothing to continue")]
    UnexpectedContinueFrame,
    /// Type of data frame not recognised.
    #[error("Unknown data frame type: {0}")]
    UnknownDataFrameType(u8),
    /// A reassembled text message is not valid UTF-8.
    #[error("Could not decode a text frame as UTF-8")]
    InvalidUtf8,
    /// The transport reported that the channel failed.
    #[error("Channel failed: {0}")]
    ChannelFailed(String),
}

/// Indicates the specific type/cause of an argument error.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ArgumentError {
    /// The binary representation name is not recognised.
    #[error("Unknown binary type \"{0}\" (expected \"shared\" or \"copied\")")]
    UnknownBinaryType(String),
    /// A requested subprotocol is not a valid HTTP token.
    #[error("Invalid subprotocol \"{0}\"")]
    InvalidSubProtocol(String),
    /// A subprotocol was requested more than once.
    #[error("Duplicate subprotocol \"{0}\"")]
    DuplicateSubProtocol(String),
    /// Applications may only close with 1000 or a code in 3000..=4999.
    #[error("Close code {0} is not allowed (use 1000 or 3000-4999)")]
    InvalidCloseCode(u16),
    /// The close reason does not fit into a control frame.
    #[error("Close reason is {0} bytes long, at most 123 are allowed")]
    CloseReasonTooLong(usize),
}

/// Indicates the specific type/cause of URL error.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum UrlError {
    /// The URL could not be parsed.
    #[error("Unable to parse URL: {0}")]
    Parse(url::ParseError),
    /// The URL does not include a host name.
    #[error("No host name in the URL")]
    NoHostName,
    /// The URL host name, though included, is empty.
    #[error("URL contains empty host name")]
    EmptyHostName,
    /// Unsupported URL scheme used (only `ws://` or `wss://` may be used).
    #[error("URL scheme not supported")]
    UnsupportedUrlScheme,
    /// WebSocket URLs must not carry a fragment.
    #[error("URL contains a fragment")]
    FragmentNotAllowed,
}
