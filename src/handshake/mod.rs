//! Opening handshake inputs and the metadata reported back by the handshake collaborator.

pub mod client;

/// The raw opening handshake request, as reported by the transport once it is sent.
pub type HandshakeRequest = http::Request<()>;

/// The raw opening handshake response, as reported by the transport on completion.
pub type HandshakeResponse = http::Response<()>;

/// Check whether `s` is a valid HTTP token (RFC 7230), as subprotocol names must be.
pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}
