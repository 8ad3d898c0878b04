//! Client request: target URL, subprotocols, origin and additional headers.

use http::{header, HeaderMap, HeaderName, HeaderValue, Uri};
use log::*;
use url::Url;

use super::{is_token, HandshakeRequest};
use crate::error::{ArgumentError, Result, UrlError};

/// A validated request to open a WebSocket channel.
///
/// This is what the connector receives to start the opening handshake.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    url: Url,
    protocols: Vec<String>,
    origin: Option<String>,
    headers: HeaderMap,
    partition: Option<String>,
}

impl ClientRequest {
    /// Create a request for `url` without further options.
    pub fn new(url: Url) -> Result<Self> {
        check_url(&url)?;
        Ok(ClientRequest {
            url,
            protocols: Vec::new(),
            origin: None,
            headers: HeaderMap::new(),
            partition: None,
        })
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The requested subprotocols, in order of preference.
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    /// The origin to announce, if overridden.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Additional headers for the opening handshake.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The session partition the connector should use for cookies and caches.
    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    /// Build the HTTP request describing this opening handshake.
    ///
    /// The `Sec-WebSocket-Key` is left for the handshake implementation to add.
    pub fn to_http_request(&self) -> Result<HandshakeRequest> {
        let uri: Uri = self.url.as_str().parse().map_err(http::Error::from)?;
        let host = match self.url.port() {
            Some(port) => format!("{}:{}", self.url.host_str().unwrap_or_default(), port),
            None => self.url.host_str().unwrap_or_default().to_owned(),
        };

        let mut req = http::Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .header(header::HOST, host)
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13");
        if let Some(origin) = &self.origin {
            req = req.header(header::ORIGIN, origin.as_str());
        }
        if !self.protocols.is_empty() {
            req = req.header(header::SEC_WEBSOCKET_PROTOCOL, self.protocols.join(", "));
        }
        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        Ok(req.body(())?)
    }
}

fn check_url(url: &Url) -> Result<()> {
    match url.scheme() {
        "ws" | "wss" => {}
        _ => return Err(UrlError::UnsupportedUrlScheme.into()),
    }
    match url.host_str() {
        None => return Err(UrlError::NoHostName.into()),
        Some("") => return Err(UrlError::EmptyHostName.into()),
        Some(_) => {}
    }
    if url.fragment().is_some() {
        return Err(UrlError::FragmentNotAllowed.into());
    }
    Ok(())
}

/// Builder for a [`ClientRequest`], collecting options before validation.
///
/// # Example
/// ```
/// # use wschannel::{ClientRequestBuilder, handshake::client::IntoClientRequest};
/// let request = ClientRequestBuilder::new("wss://example.com/chat")
///     .with_sub_protocol("chat.v2")
///     .with_origin("https://example.com")
///     .with_header("Authorization", "Bearer token")
///     .into_client_request()
///     .unwrap();
/// assert_eq!(request.protocols(), ["chat.v2"]);
/// ```
#[derive(Debug, Clone)]
pub struct ClientRequestBuilder {
    url: String,
    protocols: Vec<String>,
    origin: Option<String>,
    additional_headers: Vec<(String, String)>,
    partition: Option<String>,
}

impl ClientRequestBuilder {
    /// Start a request for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        ClientRequestBuilder {
            url: url.into(),
            protocols: Vec::new(),
            origin: None,
            additional_headers: Vec::new(),
            partition: None,
        }
    }

    /// Request a subprotocol. May be called several times.
    #[must_use]
    pub fn with_sub_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Override the origin sent with the handshake.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Add a header to the handshake request.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.push((key.into(), value.into()));
        self
    }

    /// Select the session partition.
    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }
}

/// Trait for converting various types into a validated [`ClientRequest`].
pub trait IntoClientRequest {
    /// Convert into a `ClientRequest` that can be used for a client connection.
    fn into_client_request(self) -> Result<ClientRequest>;
}

impl IntoClientRequest for ClientRequest {
    fn into_client_request(self) -> Result<ClientRequest> {
        check_url(&self.url)?;
        Ok(self)
    }
}

impl IntoClientRequest for Url {
    fn into_client_request(self) -> Result<ClientRequest> {
        ClientRequest::new(self)
    }
}

impl<'a> IntoClientRequest for &'a str {
    fn into_client_request(self) -> Result<ClientRequest> {
        ClientRequest::new(Url::parse(self)?)
    }
}

impl<'a> IntoClientRequest for &'a String {
    fn into_client_request(self) -> Result<ClientRequest> {
        <&str as IntoClientRequest>::into_client_request(self)
    }
}

impl IntoClientRequest for String {
    fn into_client_request(self) -> Result<ClientRequest> {
        <&str as IntoClientRequest>::into_client_request(&self)
    }
}

impl IntoClientRequest for ClientRequestBuilder {
    fn into_client_request(self) -> Result<ClientRequest> {
        let mut request = self.url.as_str().into_client_request()?;

        for protocol in self.protocols {
            if !is_token(&protocol) {
                return Err(ArgumentError::InvalidSubProtocol(protocol).into());
            }
            if request.protocols.contains(&protocol) {
                return Err(ArgumentError::DuplicateSubProtocol(protocol).into());
            }
            request.protocols.push(protocol);
        }

        for (key, value) in self.additional_headers {
            let name = HeaderName::from_bytes(key.as_bytes())?;
            let value = HeaderValue::from_str(&value)?;
            request.headers.append(name, value);
        }

        request.origin = self.origin;
        request.partition = self.partition;
        debug!("Client request for {} validated", request.url);
        Ok(request)
    }
}
