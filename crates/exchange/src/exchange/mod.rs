//! The state of one request/response cycle.
//!
//! An [`HttpServerExchange`] is created by the request decoder, filled by the parser, and then
//! driven through a handler. The handler reads the request through accessors and
//! [`HttpServerExchange::request_body`], shapes the response through the status and header
//! setters, and writes it with [`HttpServerExchange::send_data`] or by leaving a body in
//! [`HttpServerExchange::set_response_body`]. The exchange is ended when the handler returns,
//! unless it was [dispatched](HttpServerExchange::dispatch) to run somewhere else first.
//!
//! Concurrent access to one exchange is not supported, everything goes through `&mut`.

mod blocking;
mod dispatch;
mod listener;
mod state;

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode, Version, header};
use tracing::{debug, trace, warn};

pub use blocking::{BlockingInput, BlockingOutput};
pub(crate) use dispatch::drive;
pub use dispatch::{BlockingExecutor, Executor};
pub use listener::{DefaultResponseListener, ExchangeCompletionListener, NextListener, ResponseCommitListener};
pub use state::{RequestPhase, ResponsePhase};

use crate::codec::transfer_encoding;
use crate::ensure;
use crate::handler::HttpHandler;
use crate::options::ServerOptions;
use crate::protocol::body::ReqBody;
use crate::protocol::{ExchangeError, HttpError, Message, PayloadItem, PayloadSize, ResponseHead, SendError};
use state::Flags;

/// What the exchange sends to the connection writing its response.
pub(crate) type ResponseMessage = Message<(ResponseHead, PayloadSize)>;

pub struct HttpServerExchange {
    options: Arc<ServerOptions>,

    method: Method,
    scheme: String,
    request_uri: String,
    relative_path: String,
    request_path: String,
    query_string: String,
    query_parameters: HashMap<String, Vec<String>>,
    path_parameters: HashMap<String, Vec<String>>,
    version: Version,
    request_headers: HeaderMap,
    request_body: Option<ReqBody>,
    max_entity_size: u64,

    status: StatusCode,
    reason: Option<String>,
    response_headers: HeaderMap,
    response_body: Option<Bytes>,
    response_channel: Option<mpsc::Sender<ResponseMessage>>,
    bytes_sent: u64,

    request_phase: RequestPhase,
    response_phase: ResponsePhase,
    flags: Flags,

    completion_listeners: Vec<Box<dyn ExchangeCompletionListener>>,
    commit_listeners: Vec<ResponseCommitListener>,
    default_response_listeners: Vec<DefaultResponseListener>,

    default_executor: Option<Arc<dyn Executor>>,
    pending_dispatch: Option<(Option<Arc<dyn Executor>>, Arc<dyn HttpHandler>)>,

    peer_address: Option<SocketAddr>,
    local_address: Option<SocketAddr>,
    extensions: Extensions,
}

impl Default for HttpServerExchange {
    fn default() -> Self {
        Self::new(Arc::new(ServerOptions::default()))
    }
}

impl fmt::Debug for HttpServerExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServerExchange")
            .field("method", &self.method)
            .field("request_uri", &self.request_uri)
            .field("version", &self.version)
            .field("status", &self.status)
            .field("request_phase", &self.request_phase)
            .field("response_phase", &self.response_phase)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl HttpServerExchange {
    pub fn new(options: Arc<ServerOptions>) -> Self {
        let max_entity_size = options.max_entity_size;
        Self {
            options,
            method: Method::GET,
            scheme: "http".to_owned(),
            request_uri: String::new(),
            relative_path: String::new(),
            request_path: String::new(),
            query_string: String::new(),
            query_parameters: HashMap::new(),
            path_parameters: HashMap::new(),
            version: Version::HTTP_11,
            request_headers: HeaderMap::new(),
            request_body: Some(ReqBody::empty()),
            max_entity_size,
            status: StatusCode::OK,
            reason: None,
            response_headers: HeaderMap::new(),
            response_body: None,
            response_channel: None,
            bytes_sent: 0,
            request_phase: RequestPhase::Reading,
            response_phase: ResponsePhase::Pending,
            flags: Flags::default(),
            completion_listeners: Vec::new(),
            commit_listeners: Vec::new(),
            default_response_listeners: Vec::new(),
            default_executor: None,
            pending_dispatch: None,
            peer_address: None,
            local_address: None,
            extensions: Extensions::new(),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    // ----- request line -----

    pub fn request_method(&self) -> &Method {
        &self.method
    }

    pub fn set_request_method(&mut self, method: Method) {
        self.method = method;
    }

    /// `http`, or the scheme of an absolute-form request target.
    pub fn request_scheme(&self) -> &str {
        &self.scheme
    }

    pub fn set_request_scheme(&mut self, scheme: impl Into<String>) {
        self.scheme = scheme.into();
    }

    /// The request target exactly as it was received.
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    pub fn set_request_uri(&mut self, uri: impl Into<String>, includes_host: bool) {
        self.request_uri = uri.into();
        self.flags.uri_contains_host = includes_host;
    }

    pub fn is_host_included_in_request_uri(&self) -> bool {
        self.flags.uri_contains_host
    }

    /// The decoded path, without path parameters or query string.
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    pub fn set_request_path(&mut self, path: impl Into<String>) {
        self.request_path = path.into();
    }

    /// The part of the path left to route on, equal to the request path until a router trims it.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn set_relative_path(&mut self, path: impl Into<String>) {
        self.relative_path = path.into();
    }

    /// The raw query string, without the `?`.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn set_query_string(&mut self, query: impl Into<String>) {
        self.query_string = query.into();
    }

    pub fn query_parameters(&self) -> &HashMap<String, Vec<String>> {
        &self.query_parameters
    }

    pub fn add_query_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query_parameters.entry(name.into()).or_default().push(value.into());
    }

    pub fn path_parameters(&self) -> &HashMap<String, Vec<String>> {
        &self.path_parameters
    }

    pub fn add_path_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.path_parameters.entry(name.into()).or_default().push(value.into());
    }

    pub fn protocol(&self) -> Version {
        self.version
    }

    pub fn set_protocol(&mut self, version: Version) {
        self.version = version;
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.request_headers
    }

    pub fn peer_address(&self) -> Option<SocketAddr> {
        self.peer_address
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.local_address
    }

    pub(crate) fn set_addresses(&mut self, peer: Option<SocketAddr>, local: Option<SocketAddr>) {
        self.peer_address = peer;
        self.local_address = local;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    // ----- request body -----

    /// Takes the request body for async reading, leaving blocking mode.
    ///
    /// The body enforces the maximum entity size in effect at this point.
    pub fn request_body(&mut self) -> Result<ReqBody, ExchangeError> {
        let body = self.take_request_body()?;
        self.flags.blocking = false;
        Ok(body)
    }

    fn take_request_body(&mut self) -> Result<ReqBody, ExchangeError> {
        ensure!(!self.flags.dispatched, ExchangeError::AlreadyDispatched);
        let mut body = self.request_body.take().ok_or(ExchangeError::RequestBodyTaken)?;
        body.set_limit(self.max_entity_size);
        self.flags.read_started = true;
        Ok(body)
    }

    pub fn max_entity_size(&self) -> u64 {
        self.max_entity_size
    }

    /// Changes the body size limit of this request, only possible before its body is read.
    pub fn set_max_entity_size(&mut self, max_entity_size: u64) -> Result<(), ExchangeError> {
        ensure!(!self.flags.read_started, ExchangeError::RequestReadStarted);
        self.max_entity_size = max_entity_size;
        Ok(())
    }

    pub fn is_request_read_started(&self) -> bool {
        self.flags.read_started
    }

    pub(crate) fn attach_request_body(&mut self, body: ReqBody) {
        self.request_body = Some(body);
    }

    // ----- response head -----

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status_code(&mut self, code: u16) -> Result<(), ExchangeError> {
        ensure!(!self.response_phase.is_started(), ExchangeError::ResponseStarted);
        ensure!((100..=999).contains(&code), ExchangeError::InvalidStatus(code));
        self.status = StatusCode::from_u16(code).ok().ok_or(ExchangeError::InvalidStatus(code))?;
        if code >= 500 {
            debug!(status = code, uri = %self.request_uri, "setting error status code");
        }
        Ok(())
    }

    pub fn reason_phrase(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Overrides the canonical reason of the status code, which must stay on the status line.
    pub fn set_reason_phrase(&mut self, reason: impl Into<String>) -> Result<(), ExchangeError> {
        ensure!(!self.response_phase.is_started(), ExchangeError::ResponseStarted);
        let reason = reason.into();
        ensure!(reason.bytes().all(|b| b == b'\t' || (b' '..=b'~').contains(&b)), ExchangeError::InvalidReasonPhrase);
        self.reason = Some(reason);
        Ok(())
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    /// Leaves a complete body to be sent when the exchange ends.
    ///
    /// A `Content-Length` matching the body is added unless the handler framed it itself.
    pub fn set_response_body(&mut self, body: impl Into<Bytes>) -> Result<(), ExchangeError> {
        ensure!(!self.response_phase.is_started(), ExchangeError::ResponseStarted);
        self.response_body = Some(body.into());
        Ok(())
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    // ----- phases and flags -----

    pub fn request_phase(&self) -> RequestPhase {
        self.request_phase
    }

    pub fn response_phase(&self) -> ResponsePhase {
        self.response_phase
    }

    pub fn is_response_started(&self) -> bool {
        self.response_phase.is_started()
    }

    pub fn is_request_complete(&self) -> bool {
        self.request_phase == RequestPhase::Terminated
    }

    pub fn is_response_complete(&self) -> bool {
        self.response_phase == ResponsePhase::Terminated
    }

    pub fn is_complete(&self) -> bool {
        self.is_request_complete() && self.is_response_complete()
    }

    /// Whether the connection stays open for another request after this one.
    pub fn is_persistent(&self) -> bool {
        self.flags.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.flags.persistent = persistent;
    }

    pub fn is_dispatched(&self) -> bool {
        self.flags.dispatched
    }

    /// True while a handler is running on this exchange.
    pub fn is_in_call(&self) -> bool {
        self.flags.in_call
    }

    /// True once the completion listener chain ran to its end.
    pub fn is_completion_notified(&self) -> bool {
        self.flags.completion_notified
    }

    pub(crate) fn is_pipelined(&self) -> bool {
        self.flags.pipelined
    }

    pub(crate) fn set_pipelined(&mut self, pipelined: bool) {
        self.flags.pipelined = pipelined;
    }

    // ----- listeners -----

    pub fn add_exchange_complete_listener<L>(&mut self, listener: L)
    where
        L: ExchangeCompletionListener + 'static,
    {
        self.completion_listeners.push(Box::new(listener));
    }

    pub fn add_response_commit_listener<F>(&mut self, listener: F)
    where
        F: FnOnce(&mut HttpServerExchange) + Send + 'static,
    {
        self.commit_listeners.push(Box::new(listener));
    }

    pub fn add_default_response_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&mut HttpServerExchange) -> bool + Send + 'static,
    {
        self.default_response_listeners.push(Box::new(listener));
    }

    // ----- dispatch -----

    /// Hands the exchange to `handler` once the current handler returns.
    ///
    /// The handler runs on `executor`, or on the connection's default executor. Until it
    /// starts, the exchange can't be read from, written to or dispatched again, and returning
    /// from the current handler doesn't end it.
    pub fn dispatch(&mut self, executor: Option<Arc<dyn Executor>>, handler: Arc<dyn HttpHandler>) -> Result<(), ExchangeError> {
        ensure!(!self.flags.dispatched, ExchangeError::AlreadyDispatched);
        let executor = executor.or_else(|| self.default_executor.clone());
        trace!(in_call = self.flags.in_call, "dispatching exchange");
        self.flags.dispatched = true;
        self.pending_dispatch = Some((executor, handler));
        Ok(())
    }

    pub(crate) fn set_default_executor(&mut self, executor: Option<Arc<dyn Executor>>) {
        self.default_executor = executor;
    }

    // ----- blocking mode -----

    /// Switches the exchange to blocking streams, see [`HttpServerExchange::input_stream`].
    ///
    /// Blocking streams and the async body methods exclude each other, whichever was asked
    /// for last is in effect: [`request_body`](Self::request_body) and
    /// [`send_data`](Self::send_data) leave blocking mode again.
    pub fn start_blocking(&mut self) {
        self.flags.blocking = true;
    }

    pub fn is_blocking(&self) -> bool {
        self.flags.blocking
    }

    // ----- writing the response -----

    pub(crate) fn attach_response_channel(&mut self, channel: mpsc::Sender<ResponseMessage>) {
        self.response_channel = Some(channel);
    }

    async fn send_message(&mut self, message: ResponseMessage) -> Result<(), SendError> {
        match &mut self.response_channel {
            Some(channel) => channel.send(message).await.map_err(|e| SendError::io(std::io::Error::other(e))),
            None => Ok(()),
        }
    }

    /// Freezes the response head and hands it to the connection.
    async fn commit(&mut self) -> Result<(), SendError> {
        if self.response_phase.is_started() {
            return Ok(());
        }

        for listener in mem::take(&mut self.commit_listeners) {
            listener(self);
        }

        let payload_size = transfer_encoding::configure_response(self);
        self.response_phase = ResponsePhase::Started;

        let mut head = ResponseHead::new(self.version, self.status, self.response_headers.clone());
        if let Some(reason) = &self.reason {
            head = head.with_reason(reason.clone());
        }
        trace!(status = self.status.as_u16(), ?payload_size, "response committed");
        self.send_message(Message::Header((head, payload_size))).await
    }

    async fn flush_response_body(&mut self) -> Result<(), SendError> {
        if let Some(body) = self.response_body.take() {
            self.write_chunk(body).await?;
        }
        Ok(())
    }

    async fn write_chunk(&mut self, data: Bytes) -> Result<(), SendError> {
        self.commit().await?;
        if data.is_empty() {
            return Ok(());
        }
        self.bytes_sent += data.len() as u64;
        self.send_message(Message::Payload(PayloadItem::Chunk(data))).await
    }

    /// Writes a piece of the response body, committing the response head first if needed.
    /// Leaves blocking mode.
    pub async fn send_data(&mut self, data: impl Into<Bytes>) -> Result<(), HttpError> {
        self.write_body(data.into()).await?;
        self.flags.blocking = false;
        Ok(())
    }

    async fn write_body(&mut self, data: Bytes) -> Result<(), HttpError> {
        ensure!(!self.flags.dispatched, ExchangeError::AlreadyDispatched.into());
        ensure!(!self.is_response_complete(), ExchangeError::ResponseStarted.into());
        self.flush_response_body().await?;
        self.write_chunk(data).await?;
        Ok(())
    }

    /// Finishes the response.
    ///
    /// An unread request body is given up here and drained by the connection. If nothing was
    /// written yet, default response listeners get a chance to produce a body and a
    /// `Content-Length` is added, except for statuses that never carry one and for `HEAD`
    /// responses without a buffered body. Calling it again does nothing.
    pub async fn end_exchange(&mut self) {
        if self.flags.ended {
            return;
        }
        self.flags.ended = true;
        self.request_body = None;

        if !self.response_phase.is_started() {
            let mut listeners = mem::take(&mut self.default_response_listeners);
            for listener in listeners.iter_mut().rev() {
                if listener(self) {
                    break;
                }
            }

            let bodiless = self.status.is_informational()
                || self.status == StatusCode::NO_CONTENT
                || self.status == StatusCode::NOT_MODIFIED
                || (self.method == Method::HEAD && self.response_body.is_none());
            let headers = &mut self.response_headers;
            if !bodiless && !headers.contains_key(header::CONTENT_LENGTH) && !headers.contains_key(header::TRANSFER_ENCODING) {
                let length = self.response_body.as_ref().map_or(0, Bytes::len);
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
        }

        if let Err(e) = self.finish_response().await {
            warn!(cause = %e, "failed to finish response");
            self.flags.persistent = false;
        }

        self.response_channel = None;
        self.terminate_response();
    }

    async fn finish_response(&mut self) -> Result<(), SendError> {
        self.flush_response_body().await?;
        self.commit().await?;
        self.send_message(Message::Payload(PayloadItem::Eof)).await
    }

    // ----- completion -----

    pub fn terminate_request(&mut self) {
        if self.request_phase == RequestPhase::Terminated {
            return;
        }
        self.request_phase = RequestPhase::Terminated;
        self.fire_completion();
    }

    pub fn terminate_response(&mut self) {
        if self.response_phase == ResponsePhase::Terminated {
            return;
        }
        self.response_phase = ResponsePhase::Terminated;
        self.fire_completion();
    }

    fn fire_completion(&mut self) {
        if !self.is_complete() || self.flags.completion_fired {
            return;
        }
        self.flags.completion_fired = true;
        NextListener::new(mem::take(&mut self.completion_listeners)).proceed(self);
    }

    pub(crate) fn notify_completed(&mut self) {
        trace!("exchange completed");
        self.flags.completion_notified = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use http::HeaderValue;

    fn connected() -> (HttpServerExchange, mpsc::Receiver<ResponseMessage>) {
        let mut exchange = HttpServerExchange::default();
        exchange.set_persistent(true);
        let (sender, receiver) = mpsc::channel(16);
        exchange.attach_response_channel(sender);
        (exchange, receiver)
    }

    #[test]
    fn status_code_rules() {
        let mut exchange = HttpServerExchange::default();
        assert_eq!(exchange.status_code(), 200);

        assert_eq!(exchange.set_status_code(99), Err(ExchangeError::InvalidStatus(99)));
        assert_eq!(exchange.set_status_code(1000), Err(ExchangeError::InvalidStatus(1000)));
        exchange.set_status_code(503).unwrap();
        assert_eq!(exchange.status(), StatusCode::SERVICE_UNAVAILABLE);

        exchange.response_phase = ResponsePhase::Started;
        assert_eq!(exchange.set_status_code(200), Err(ExchangeError::ResponseStarted));
        assert_eq!(exchange.status_code(), 503);
    }

    #[test]
    fn reason_phrase_stays_on_the_status_line() {
        let mut exchange = HttpServerExchange::default();
        exchange.set_reason_phrase("Very\tOK (really)").unwrap();

        for reason in ["OK\r\nX-Injected: yes", "OK\n", "OK\0", "Ok\u{7f}", "Très bien"] {
            assert_eq!(exchange.set_reason_phrase(reason), Err(ExchangeError::InvalidReasonPhrase), "{reason:?}");
        }
        assert_eq!(exchange.reason_phrase(), Some("Very\tOK (really)"));
    }

    #[test]
    fn max_entity_size_is_fixed_once_reading() {
        let mut exchange = HttpServerExchange::default();
        exchange.set_max_entity_size(42).unwrap();
        assert_eq!(exchange.max_entity_size(), 42);

        let _body = exchange.request_body().unwrap();
        assert_eq!(exchange.set_max_entity_size(1), Err(ExchangeError::RequestReadStarted));
        assert_eq!(exchange.request_body().err(), Some(ExchangeError::RequestBodyTaken));
    }

    #[test]
    fn parameters_keep_order() {
        let mut exchange = HttpServerExchange::default();
        exchange.add_query_param("a", "1");
        exchange.add_query_param("a", "2");
        exchange.add_path_param("jsessionid", "x");
        assert_eq!(exchange.query_parameters()["a"], vec!["1", "2"]);
        assert_eq!(exchange.path_parameters()["jsessionid"], vec!["x"]);
    }

    #[tokio::test]
    async fn end_exchange_sends_buffered_body() {
        let (mut exchange, receiver) = connected();
        exchange.set_response_body("hello").unwrap();
        exchange.end_exchange().await;

        let messages: Vec<_> = receiver.collect().await;
        assert_eq!(messages.len(), 3);
        match &messages[0] {
            Message::Header((head, size)) => {
                assert_eq!(head.headers().get(header::CONTENT_LENGTH).unwrap(), "5");
                assert_eq!(*size, PayloadSize::Length(5));
            }
            Message::Payload(_) => panic!("expected the response head first"),
        }
        assert!(matches!(&messages[1], Message::Payload(PayloadItem::Chunk(b)) if &b[..] == b"hello"));
        assert!(matches!(&messages[2], Message::Payload(PayloadItem::Eof)));
        assert!(exchange.is_response_complete());
        assert_eq!(exchange.bytes_sent(), 5);
    }

    #[tokio::test]
    async fn bodiless_responses_get_no_content_length() {
        for (method, status) in [(Method::GET, 204), (Method::GET, 304), (Method::HEAD, 200)] {
            let (mut exchange, receiver) = connected();
            exchange.set_request_method(method.clone());
            exchange.set_status_code(status).unwrap();
            exchange.end_exchange().await;

            let messages: Vec<_> = receiver.collect().await;
            match &messages[0] {
                Message::Header((head, size)) => {
                    assert!(!head.headers().contains_key(header::CONTENT_LENGTH), "{method} {status}");
                    assert_eq!(*size, PayloadSize::Empty);
                }
                Message::Payload(_) => panic!("expected the response head first"),
            }
        }

        let (mut exchange, receiver) = connected();
        exchange.set_request_method(Method::HEAD);
        exchange.set_response_body("hello").unwrap();
        exchange.end_exchange().await;
        let messages: Vec<_> = receiver.collect().await;
        assert!(matches!(&messages[0], Message::Header((head, _)) if head.headers().get(header::CONTENT_LENGTH).unwrap() == "5"));
    }

    #[tokio::test]
    async fn end_exchange_is_idempotent() {
        let (mut exchange, receiver) = connected();
        exchange.end_exchange().await;
        exchange.end_exchange().await;

        let messages: Vec<_> = receiver.collect().await;
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            Message::Header((head, size)) => {
                assert_eq!(head.headers().get(header::CONTENT_LENGTH).unwrap(), "0");
                assert_eq!(*size, PayloadSize::Empty);
            }
            Message::Payload(_) => panic!("expected the response head first"),
        }
    }

    #[tokio::test]
    async fn default_response_listeners_run_latest_first() {
        let (mut exchange, _receiver) = connected();
        exchange.set_status_code(404).unwrap();
        exchange.add_default_response_listener(|exchange: &mut HttpServerExchange| {
            exchange.set_response_body("never").unwrap();
            true
        });
        exchange.add_default_response_listener(|exchange: &mut HttpServerExchange| {
            exchange.set_response_body("not found").unwrap();
            true
        });
        exchange.end_exchange().await;
        assert_eq!(exchange.bytes_sent(), 9);
    }

    #[tokio::test]
    async fn commit_listeners_see_final_headers() {
        let (mut exchange, mut receiver) = connected();
        exchange.add_response_commit_listener(|exchange: &mut HttpServerExchange| {
            exchange.response_headers_mut().insert("x-first", HeaderValue::from_static("1"));
        });
        exchange.add_response_commit_listener(|exchange: &mut HttpServerExchange| {
            assert!(exchange.response_headers().contains_key("x-first"));
            exchange.response_headers_mut().insert("x-second", HeaderValue::from_static("2"));
        });

        exchange.send_data("chunk").await.unwrap();
        assert!(exchange.is_response_started());
        assert_eq!(exchange.set_status_code(500), Err(ExchangeError::ResponseStarted));

        let Some(Message::Header((head, size))) = receiver.next().await else {
            panic!("expected the response head first");
        };
        assert!(head.headers().contains_key("x-second"));
        assert_eq!(size, PayloadSize::Chunked);
        assert_eq!(head.headers().get(header::TRANSFER_ENCODING).unwrap(), "chunked");
    }

    #[tokio::test]
    async fn dispatched_exchange_rejects_io() {
        struct Noop;

        #[async_trait::async_trait]
        impl HttpHandler for Noop {
            async fn handle_request(&self, _exchange: &mut HttpServerExchange) -> Result<(), crate::handler::BoxError> {
                Ok(())
            }
        }

        let (mut exchange, _receiver) = connected();
        exchange.dispatch(None, Arc::new(Noop)).unwrap();
        assert!(exchange.is_dispatched());
        assert_eq!(exchange.dispatch(None, Arc::new(Noop)), Err(ExchangeError::AlreadyDispatched));
        assert!(matches!(
            exchange.send_data("x").await,
            Err(HttpError::ExchangeError { source: ExchangeError::AlreadyDispatched })
        ));
        assert_eq!(exchange.request_body().err(), Some(ExchangeError::AlreadyDispatched));
    }
}
