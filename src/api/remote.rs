//! Purpose: Unary RPC transport for the whiterabbit services over gRPC-web (HTTP/1.1).
//! Exports: `Transport`, `RemoteClient`.
//! Role: Carries encoded requests out and encoded responses back; never decodes entities.
//! Invariants: The bearer token is attached as `authorization` metadata and never inspected.
//! Invariants: A unary call yields exactly one response message or an error; no retries.
//! Invariants: grpc-status codes map onto stable `ErrorKind`s.
#![allow(clippy::result_large_err)]

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{self, MAX_MESSAGE_LEN};

pub type ApiResult<T> = Result<T, Error>;

const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web+proto";

/// Sends one encoded request message to `method` and returns the encoded response message.
pub trait Transport {
    fn unary(&self, method: &str, request: &[u8]) -> ApiResult<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn unary(&self, method: &str, request: &[u8]) -> ApiResult<Vec<u8>> {
        (**self).unary(method, request)
    }
}

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

#[derive(Clone)]
struct RemoteClientInner {
    base_url: Url,
    token: Option<String>,
    timeout: Option<Duration>,
    max_message_len: usize,
    agent: ureq::Agent,
}

impl RemoteClient {
    /// Accepts `http(s)://host:port` or a bare `host:port` (treated as plain http).
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            inner: Arc::new(RemoteClientInner {
                base_url,
                token: None,
                timeout: None,
                max_message_len: MAX_MESSAGE_LEN,
                agent: ureq::AgentBuilder::new().build(),
            }),
        })
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.update(|inner| inner.token = Some(token))
    }

    /// Overall per-call timeout (connect, send, and read).
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.update(|inner| {
            inner.timeout = Some(timeout);
            inner.agent = ureq::AgentBuilder::new().timeout(timeout).build();
        })
    }

    pub fn with_max_message_len(self, max_message_len: usize) -> Self {
        self.update(|inner| inner.max_message_len = max_message_len)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn has_token(&self) -> bool {
        self.inner.token.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    fn update(mut self, apply: impl FnOnce(&mut RemoteClientInner)) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => apply(inner),
            None => {
                let mut inner = (*self.inner).clone();
                apply(&mut inner);
                self.inner = Arc::new(inner);
            }
        }
        self
    }

    fn request(&self, url: &Url) -> ureq::Request {
        let mut request = self
            .inner
            .agent
            .post(url.as_str())
            .set("Content-Type", GRPC_WEB_CONTENT_TYPE)
            .set("Accept", GRPC_WEB_CONTENT_TYPE)
            .set("X-Grpc-Web", "1");
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
    }

    fn read_unary_response(&self, response: ureq::Response) -> ApiResult<Vec<u8>> {
        let header_status = response.header("grpc-status").map(str::to_string);
        let header_message = response.header("grpc-message").map(decode_grpc_message);
        let content_type = response.content_type().to_string();

        let limit = self.inner.max_message_len as u64 + 1024;
        let mut body = Vec::new();
        response
            .into_reader()
            .take(limit + 1)
            .read_to_end(&mut body)
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read response body")
                    .with_source(err)
            })?;
        if body.len() as u64 > limit {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("response body exceeds message size limit"));
        }

        // Trailers-only responses put the status in the HTTP headers.
        if let Some(status) = header_status.as_deref().and_then(|s| s.trim().parse().ok()) {
            if status != 0 {
                return Err(error_from_grpc_status(status, header_message));
            }
        }

        if !content_type.starts_with("application/grpc-web") {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("unexpected response content type {content_type:?}"))
                .with_hint("Check that the URL points at a gRPC-web endpoint."));
        }

        let decoded = frame::decode_body(&body, self.inner.max_message_len)?;
        let status = decoded
            .trailers
            .status()
            .or_else(|| header_status.as_deref().and_then(|s| s.trim().parse().ok()));
        match status {
            Some(0) => {}
            Some(code) => {
                let message = decoded.trailers.message().or(header_message);
                return Err(error_from_grpc_status(code, message));
            }
            None => {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("response is missing grpc-status"));
            }
        }

        let mut messages = decoded.messages.into_iter();
        match (messages.next(), messages.next()) {
            (Some(message), None) => Ok(message),
            (None, _) => {
                Err(Error::new(ErrorKind::Corrupt).with_message("unary response has no message"))
            }
            (Some(_), Some(_)) => Err(Error::new(ErrorKind::Corrupt)
                .with_message("unary response has more than one message")),
        }
    }
}

impl Transport for RemoteClient {
    fn unary(&self, method: &str, request: &[u8]) -> ApiResult<Vec<u8>> {
        let url = build_method_url(&self.inner.base_url, method)?;
        let body = frame::encode_message(request)?;
        tracing::debug!(%url, request_len = request.len(), "sending unary call");

        let response = self.request(&url).send_bytes(&body);
        let result = match response {
            Ok(resp) => self.read_unary_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(error_from_http_status(code, &resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        };
        result.map_err(|err| err.with_method(method))
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let raw = if raw.contains("://") {
        raw
    } else {
        format!("http://{raw}")
    };
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid service base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("service base url must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Usage).with_message("service base url must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// `/pkg.Service/Method` becomes `<base>/pkg.Service/Method`.
fn build_method_url(base_url: &Url, method: &str) -> ApiResult<Url> {
    let segments: Vec<&str> = method.trim_start_matches('/').split('/').collect();
    if segments.len() != 2 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid rpc method path {method:?}")));
    }
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("service base url cannot be a base")
        })?;
        path.clear();
        path.extend(segments);
    }
    Ok(url)
}

fn error_from_http_status(status: u16, response: &ureq::Response) -> Error {
    if let Some(code) = response
        .header("grpc-status")
        .and_then(|value| value.trim().parse().ok())
    {
        let message = response.header("grpc-message").map(decode_grpc_message);
        return error_from_grpc_status(code, message);
    }
    Error::new(error_kind_from_http_status(status))
        .with_message(format!("service returned http status {status}"))
}

fn error_kind_from_http_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::AlreadyExists,
        423 | 429 | 503 => ErrorKind::Busy,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}

/// `message` is already percent-decoded.
fn error_from_grpc_status(code: u32, message: Option<String>) -> Error {
    let name = grpc_status_name(code);
    let text = match message {
        Some(detail) if !detail.is_empty() => format!("service returned {name}: {detail}"),
        _ => format!("service returned {name}"),
    };
    let err = Error::new(error_kind_from_grpc_status(code)).with_message(text);
    match code {
        16 => err.with_hint("Pass a valid bearer token with --token or WHITERABBIT_TOKEN."),
        12 => err.with_hint("The server does not implement this method; check the service version."),
        _ => err,
    }
}

// Header values arrive percent-encoded; trailer values are decoded by `Trailers::message`.
fn decode_grpc_message(message: &str) -> String {
    frame::Trailers::new()
        .with("grpc-message", message)
        .message()
        .unwrap_or_default()
}

fn error_kind_from_grpc_status(code: u32) -> ErrorKind {
    match code {
        1 | 4 => ErrorKind::Io,
        3 | 9 | 11 => ErrorKind::Usage,
        5 => ErrorKind::NotFound,
        6 => ErrorKind::AlreadyExists,
        7 | 16 => ErrorKind::Permission,
        8 | 10 | 14 => ErrorKind::Busy,
        15 => ErrorKind::Corrupt,
        _ => ErrorKind::Internal,
    }
}

fn grpc_status_name(code: u32) -> String {
    let name = match code {
        0 => "OK",
        1 => "CANCELLED",
        2 => "UNKNOWN",
        3 => "INVALID_ARGUMENT",
        4 => "DEADLINE_EXCEEDED",
        5 => "NOT_FOUND",
        6 => "ALREADY_EXISTS",
        7 => "PERMISSION_DENIED",
        8 => "RESOURCE_EXHAUSTED",
        9 => "FAILED_PRECONDITION",
        10 => "ABORTED",
        11 => "OUT_OF_RANGE",
        12 => "UNIMPLEMENTED",
        13 => "INTERNAL",
        14 => "UNAVAILABLE",
        15 => "DATA_LOSS",
        16 => "UNAUTHENTICATED",
        other => return format!("grpc status {other}"),
    };
    name.to_string()
}
