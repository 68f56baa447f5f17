//! HTTP Adapter (component C6): owns exactly one transport connection to a
//! destination and multiplexes requests over it.
//!
//! Matches the design note (§9) preference for "a single mailbox per
//! connection": each [`Adapter`] is driven by one spawned task that owns the
//! `hyper::client::conn` handle exclusively and processes an
//! [`tokio::sync::mpsc`] mailbox of caller commands. HTTP/2 concurrency comes
//! from cloning the adapter's `h2` `SendRequest` into a task per request;
//! HTTP/1 adapters process one request at a time, which is why the
//! Connection Registry (C7) pools several of them rather than sharing one.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration};

/// Cadence of the Adapter's idle health check (§3/§4.6: "~30s").
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

use crate::{
    error::Error,
    transport::{self, DestinationKey, NegotiatedProtocol},
};

/// One part of a streamed HTTP response, delivered to a request's sink in
/// strict wire order (§5): `Status` before `Headers` before any `Data`,
/// `Done` last (or `Error` in place of `Done` on failure).
#[derive(Debug, Clone)]
pub enum ResponsePart {
    /// The response status line.
    Status(StatusCode),
    /// The full response header block.
    Headers(HeaderMap),
    /// One chunk of the response body.
    Data(Bytes),
    /// The response completed normally.
    Done,
    /// The response failed; no further parts follow.
    Error(String),
}

/// One demultiplexed WebSocket frame from a `pods/exec`/`pods/log` stream
/// (§4.11), after stripping the Kubernetes channel-id prefix byte.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Delivered once, immediately after a successful upgrade.
    Open,
    /// Channel 1.
    Stdout(Bytes),
    /// Channel 2.
    Stderr(Bytes),
    /// Channel 3: carries a JSON-encoded `Status` object on the wire.
    Error(Bytes),
    /// The server closed the stream.
    Close {
        /// The WebSocket close code.
        code: u16,
        /// The close reason string, if any.
        reason: String,
    },
}

/// An outgoing frame a caller may send back over an upgraded exec/log
/// stream. Any other shape is rejected without touching the wire (§8 prop 8).
#[derive(Debug, Clone)]
pub enum OutgoingFrame {
    /// Channel 0: stdin bytes.
    Stdin(Bytes),
    /// A bare close, no code/reason.
    Close,
    /// Semantically identical to `Close`; kept distinct to mirror the two
    /// spellings callers reasonably use (§9 open question).
    Exit,
    /// A close carrying an explicit code and reason.
    CloseWithReason {
        /// The WebSocket close code.
        code: u16,
        /// The close reason string.
        reason: String,
    },
}

/// A tagged wrapper: `{tag, part}`, used by [`Sink::Tagged`].
#[derive(Debug, Clone)]
pub struct Tagged<T> {
    /// The caller-supplied tag, opaque to the adapter.
    pub tag: serde_json::Value,
    /// The wrapped response part or frame.
    pub part: T,
}

/// Where a request's streamed parts are delivered (§4.6 "Sink policy").
pub enum Sink<T> {
    /// Accumulate in the per-request buffer; the caller drains it via
    /// [`AdapterHandle::recv`]/[`AdapterHandle::recv_frame`].
    Buffer,
    /// Deliver each part to this channel as soon as it is produced.
    Channel(mpsc::UnboundedSender<T>),
    /// Deliver each part wrapped as `{tag, part}`.
    Tagged(mpsc::UnboundedSender<Tagged<T>>, serde_json::Value),
}

impl<T> Sink<T> {
    fn deliver(&self, buffer: &mut Vec<T>, part: T)
    where
        T: Clone,
    {
        match self {
            Sink::Buffer => buffer.push(part),
            Sink::Channel(tx) => {
                let _ = tx.send(part);
            }
            Sink::Tagged(tx, tag) => {
                let _ = tx.send(Tagged { tag: tag.clone(), part });
            }
        }
    }
}

/// Opaque per-request handle returned by [`AdapterHandle::request`] and
/// [`AdapterHandle::websocket_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestRef(u64);

/// Which half of a request's duplex channel [`AdapterHandle::open`] asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Can more data still be read from this request/stream.
    Read,
    /// Can more data still be written to this request/stream (stdin, pending body).
    Write,
    /// Both directions.
    Both,
}

struct HttpEntry {
    buffer: Vec<ResponsePart>,
    sink: Sink<ResponsePart>,
    waiters: Vec<oneshot::Sender<Option<ResponsePart>>>,
    done: bool,
}

struct WsEntry {
    buffer: Vec<Frame>,
    sink: Sink<Frame>,
    waiters: Vec<oneshot::Sender<Option<Frame>>>,
    outgoing: mpsc::UnboundedSender<OutgoingFrame>,
    done: bool,
}

enum Entry {
    Http(HttpEntry),
    Ws(WsEntry),
}

enum Command {
    Request {
        method: Method,
        path: String,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: Bytes,
        sink: Sink<ResponsePart>,
        reply: oneshot::Sender<Result<RequestRef, Error>>,
    },
    WebsocketRequest {
        path: String,
        headers: Vec<(HeaderName, HeaderValue)>,
        sink: Sink<Frame>,
        reply: oneshot::Sender<Result<RequestRef, Error>>,
    },
    Recv {
        request: RequestRef,
        reply: oneshot::Sender<Option<ResponsePart>>,
    },
    RecvFrame {
        request: RequestRef,
        reply: oneshot::Sender<Option<Frame>>,
    },
    WebsocketSend {
        request: RequestRef,
        frame: OutgoingFrame,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Cancel {
        request: RequestRef,
    },
    IsOpen {
        direction: Direction,
        reply: oneshot::Sender<bool>,
    },
}

/// A cloneable handle to a running [`Adapter`]'s mailbox. All public
/// operations round-trip through the adapter's single owning task.
#[derive(Clone)]
pub struct AdapterHandle {
    commands: mpsc::UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
}

impl AdapterHandle {
    /// Issue a plain HTTP request; the returned [`RequestRef`] identifies it
    /// for subsequent [`Self::recv`]/[`Self::cancel`] calls.
    pub async fn request(
        &self,
        method: Method,
        path: String,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: Bytes,
        sink: Sink<ResponsePart>,
    ) -> Result<RequestRef, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Request {
            method,
            path,
            headers,
            body,
            sink,
            reply,
        })?;
        rx.await.map_err(|_| Error::Http("adapter shut down".to_string()))?
    }

    /// Upgrade to a WebSocket at `path`, returning once the upgrade response
    /// has been observed.
    pub async fn websocket_request(
        &self,
        path: String,
        headers: Vec<(HeaderName, HeaderValue)>,
        sink: Sink<Frame>,
    ) -> Result<RequestRef, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WebsocketRequest { path, headers, sink, reply })?;
        rx.await.map_err(|_| Error::Http("adapter shut down".to_string()))?
    }

    /// Pull the next buffered response part for `request`. Returns `None`
    /// once `Done`/`Error` has already been delivered and drained.
    pub async fn recv(&self, request: RequestRef) -> Option<ResponsePart> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Recv { request, reply }).ok()?;
        rx.await.ok().flatten()
    }

    /// Pull the next buffered WebSocket frame for `request`.
    pub async fn recv_frame(&self, request: RequestRef) -> Option<Frame> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RecvFrame { request, reply }).ok()?;
        rx.await.ok().flatten()
    }

    /// Send an outgoing frame on an upgraded WebSocket request (§4.6
    /// "Outgoing frame mapping"; §8 prop 8 for rejection behavior).
    pub async fn websocket_send(&self, request: RequestRef, frame: OutgoingFrame) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WebsocketSend { request, frame, reply })?;
        rx.await.map_err(|_| Error::Http("adapter shut down".to_string()))?
    }

    /// Cancel `request`: for HTTP/2 this drops the per-request task (sending
    /// `RST_STREAM`); for a WebSocket it sends a close frame.
    pub fn cancel(&self, request: RequestRef) {
        let _ = self.commands.send(Command::Cancel { request });
    }

    /// Whether the adapter's transport is still open for `direction`.
    pub async fn is_open(&self, direction: Direction) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::IsOpen { direction, reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// `true` once the adapter's transport has closed and it can no longer
    /// accept new requests (used by the Registry's health check, §3).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn send(&self, cmd: Command) -> Result<(), Error> {
        self.commands
            .send(cmd)
            .map_err(|_| Error::Http("adapter shut down".to_string()))
    }
}

enum Conn {
    Http1(hyper::client::conn::http1::SendRequest<Full<Bytes>>),
    Http2(hyper::client::conn::http2::SendRequest<Full<Bytes>>),
}

impl Conn {
    fn is_closed(&self) -> bool {
        match self {
            Conn::Http1(send) => send.is_closed(),
            Conn::Http2(send) => send.is_closed(),
        }
    }
}

/// Drives one adapter's transport and mailbox. Spawned by
/// [`Adapter::connect`]; the returned [`AdapterHandle`] is the only way
/// callers interact with it.
pub struct Adapter;

impl Adapter {
    /// Connect to `key`, negotiate the HTTP protocol, and spawn the
    /// adapter's driving task. `authority` is the `Host`/`:authority` value
    /// used for every request issued through the returned handle.
    pub async fn connect(
        key: DestinationKey,
        authority: String,
        ca_certificate_pem: Option<String>,
    ) -> Result<(AdapterHandle, NegotiatedProtocol), Error> {
        tracing::debug!(%authority, "connecting adapter");
        let (protocol, tls_stream) = transport::connect(&key, ca_certificate_pem.as_deref()).await?;
        let io = TokioIo::new(tls_stream);

        let conn = match protocol {
            NegotiatedProtocol::Http1 => {
                let (send_request, connection) = hyper::client::conn::http1::handshake(io)
                    .await
                    .map_err(|e| Error::Http(format!("http/1 handshake failed: {e}")))?;
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        tracing::trace!(%err, "http/1 connection task ended");
                    }
                });
                Conn::Http1(send_request)
            }
            NegotiatedProtocol::Http2 => {
                let executor = hyper_util::rt::TokioExecutor::new();
                let (send_request, connection) = hyper::client::conn::http2::handshake(executor, io)
                    .await
                    .map_err(|e| Error::Http(format!("http/2 handshake failed: {e}")))?;
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        tracing::trace!(%err, "http/2 connection task ended");
                    }
                });
                Conn::Http2(send_request)
            }
        };
        tracing::debug!(%authority, ?protocol, "adapter connected");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let handle = AdapterHandle {
            commands: commands_tx,
            closed: closed.clone(),
        };

        tokio::spawn(run_actor(conn, authority, commands_rx, closed));

        Ok((handle, protocol))
    }
}

async fn run_actor(
    mut conn: Conn,
    authority: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    closed: Arc<AtomicBool>,
) {
    let mut entries: HashMap<RequestRef, Entry> = HashMap::new();
    let mut cancel_handles: HashMap<RequestRef, tokio::task::AbortHandle> = HashMap::new();
    let mut next_ref = 0u64;
    let mut parts_rx = {
        let (tx, rx) = mpsc::unbounded_channel::<(RequestRef, DeliveredPart)>();
        (tx, rx)
    };
    let mut health_check = time::interval(HEALTH_CHECK_INTERVAL);
    health_check.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = health_check.tick() => {
                if conn.is_closed() && entries.values().all(is_entry_idle) {
                    break;
                }
            }
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    Command::Request { method, path, headers, body, sink, reply } => {
                        next_ref += 1;
                        let req_ref = RequestRef(next_ref);
                        entries.insert(req_ref, Entry::Http(HttpEntry {
                            buffer: Vec::new(),
                            sink,
                            waiters: Vec::new(),
                            done: false,
                        }));
                        let abort = spawn_http_request(&mut conn, &authority, req_ref, method, path, headers, body, parts_rx.0.clone());
                        if let Some(abort) = abort {
                            cancel_handles.insert(req_ref, abort);
                        }
                        let _ = reply.send(Ok(req_ref));
                    }
                    Command::WebsocketRequest { path, headers, sink, reply } => {
                        next_ref += 1;
                        let req_ref = RequestRef(next_ref);
                        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
                        entries.insert(req_ref, Entry::Ws(WsEntry {
                            buffer: Vec::new(),
                            sink,
                            waiters: Vec::new(),
                            outgoing: outgoing_tx,
                            done: false,
                        }));
                        match spawn_websocket_request(&mut conn, &authority, req_ref, path, headers, outgoing_rx, parts_rx.0.clone()).await {
                            Ok(abort) => {
                                cancel_handles.insert(req_ref, abort);
                                let _ = reply.send(Ok(req_ref));
                            }
                            Err(e) => {
                                entries.remove(&req_ref);
                                let _ = reply.send(Err(e));
                            }
                        }
                    }
                    Command::Recv { request, reply } => {
                        deliver_buffered(&mut entries, request, reply);
                    }
                    Command::RecvFrame { request, reply } => {
                        deliver_buffered_frame(&mut entries, request, reply);
                    }
                    Command::WebsocketSend { request, frame, reply } => {
                        let result = match entries.get(&request) {
                            Some(Entry::Ws(ws)) => {
                                ws.outgoing.send(frame).map_err(|_| Error::Http("websocket closed".to_string()))
                            }
                            _ => Err(Error::Http("unknown or non-websocket request".to_string())),
                        };
                        let _ = reply.send(result);
                    }
                    Command::Cancel { request } => {
                        if let Some(abort) = cancel_handles.remove(&request) {
                            abort.abort();
                        }
                        entries.remove(&request);
                    }
                    Command::IsOpen { direction: _, reply } => {
                        let _ = reply.send(!closed.load(Ordering::Acquire));
                    }
                }
            }
            Some((req_ref, delivered)) = parts_rx.1.recv() => {
                apply_delivered(&mut entries, req_ref, delivered);
            }
        }

        // Fast path: every handle has already been dropped (no caller can
        // ever issue another command) and nothing is buffered, so there is
        // no need to wait for the next health-check tick.
        if entries.values().all(is_entry_idle) && commands.is_closed() {
            break;
        }
    }

    closed.store(true, Ordering::Release);
}

fn is_entry_idle(entry: &Entry) -> bool {
    match entry {
        Entry::Http(h) => h.done && h.buffer.is_empty(),
        Entry::Ws(w) => w.done && w.buffer.is_empty(),
    }
}

enum DeliveredPart {
    Http(ResponsePart),
    Ws(Frame),
}

fn apply_delivered(entries: &mut HashMap<RequestRef, Entry>, req_ref: RequestRef, delivered: DeliveredPart) {
    match (entries.get_mut(&req_ref), delivered) {
        (Some(Entry::Http(entry)), DeliveredPart::Http(part)) => {
            if matches!(part, ResponsePart::Done | ResponsePart::Error(_)) {
                entry.done = true;
            }
            if let Some(waiter) = entry.waiters.pop() {
                let _ = waiter.send(Some(part));
            } else {
                entry.sink.deliver(&mut entry.buffer, part);
            }
        }
        (Some(Entry::Ws(entry)), DeliveredPart::Ws(frame)) => {
            if matches!(frame, Frame::Close { .. }) {
                entry.done = true;
            }
            if let Some(waiter) = entry.waiters.pop() {
                let _ = waiter.send(Some(frame));
            } else {
                entry.sink.deliver(&mut entry.buffer, frame);
            }
        }
        _ => {}
    }
}

fn deliver_buffered(
    entries: &mut HashMap<RequestRef, Entry>,
    request: RequestRef,
    reply: oneshot::Sender<Option<ResponsePart>>,
) {
    match entries.get_mut(&request) {
        Some(Entry::Http(entry)) if !entry.buffer.is_empty() => {
            let part = entry.buffer.remove(0);
            let _ = reply.send(Some(part));
        }
        Some(Entry::Http(entry)) if entry.done => {
            let _ = reply.send(None);
        }
        Some(Entry::Http(entry)) => entry.waiters.push(reply),
        _ => {
            let _ = reply.send(None);
        }
    }
}

fn deliver_buffered_frame(
    entries: &mut HashMap<RequestRef, Entry>,
    request: RequestRef,
    reply: oneshot::Sender<Option<Frame>>,
) {
    match entries.get_mut(&request) {
        Some(Entry::Ws(entry)) if !entry.buffer.is_empty() => {
            let frame = entry.buffer.remove(0);
            let _ = reply.send(Some(frame));
        }
        Some(Entry::Ws(entry)) if entry.done => {
            let _ = reply.send(None);
        }
        Some(Entry::Ws(entry)) => entry.waiters.push(reply),
        _ => {
            let _ = reply.send(None);
        }
    }
}

fn build_uri(authority: &str, path: &str) -> Result<http::Uri, Error> {
    http::Uri::builder()
        .scheme("https")
        .authority(authority)
        .path_and_query(path)
        .build()
        .map_err(|e| Error::Http(format!("invalid request path {path:?}: {e}")))
}

fn spawn_http_request(
    conn: &mut Conn,
    authority: &str,
    req_ref: RequestRef,
    method: Method,
    path: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
    parts_tx: mpsc::UnboundedSender<(RequestRef, DeliveredPart)>,
) -> Option<tokio::task::AbortHandle> {
    let uri = match build_uri(authority, &path) {
        Ok(uri) => uri,
        Err(e) => {
            let _ = parts_tx.send((req_ref, DeliveredPart::Http(ResponsePart::Error(e.to_string()))));
            return None;
        }
    };

    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let request = match builder.body(Full::new(body)) {
        Ok(r) => r,
        Err(e) => {
            let _ = parts_tx.send((req_ref, DeliveredPart::Http(ResponsePart::Error(e.to_string()))));
            return None;
        }
    };

    let send_request_fut = match conn {
        Conn::Http1(sr) => sr.send_request(request),
        Conn::Http2(sr) => sr.send_request(request),
    };

    let handle = tokio::spawn(async move {
        match send_request_fut.await {
            Ok(response) => stream_http_response(req_ref, response, parts_tx).await,
            Err(e) => {
                let _ = parts_tx.send((req_ref, DeliveredPart::Http(ResponsePart::Error(e.to_string()))));
            }
        }
    });
    Some(handle.abort_handle())
}

async fn stream_http_response(
    req_ref: RequestRef,
    response: http::Response<Incoming>,
    parts_tx: mpsc::UnboundedSender<(RequestRef, DeliveredPart)>,
) {
    let (parts, mut body) = response.into_parts();
    let _ = parts_tx.send((req_ref, DeliveredPart::Http(ResponsePart::Status(parts.status))));
    let _ = parts_tx.send((req_ref, DeliveredPart::Http(ResponsePart::Headers(parts.headers))));

    loop {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    if parts_tx
                        .send((req_ref, DeliveredPart::Http(ResponsePart::Data(data))))
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = parts_tx.send((req_ref, DeliveredPart::Http(ResponsePart::Error(e.to_string()))));
                return;
            }
            None => break,
        }
    }
    let _ = parts_tx.send((req_ref, DeliveredPart::Http(ResponsePart::Done)));
}

async fn spawn_websocket_request(
    conn: &mut Conn,
    authority: &str,
    req_ref: RequestRef,
    path: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    mut outgoing_rx: mpsc::UnboundedReceiver<OutgoingFrame>,
    parts_tx: mpsc::UnboundedSender<(RequestRef, DeliveredPart)>,
) -> Result<tokio::task::AbortHandle, Error> {
    use tokio_tungstenite::tungstenite as ws;

    let uri = build_uri(authority, &path)?;
    let key = tokio_tungstenite::tungstenite::handshake::client::generate_key();

    let mut builder = http::Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(http::header::CONNECTION, "Upgrade")
        .header(http::header::UPGRADE, "websocket")
        .header(http::header::SEC_WEBSOCKET_VERSION, "13")
        .header(http::header::SEC_WEBSOCKET_KEY, &key);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let request = builder
        .body(Full::new(Bytes::new()))
        .map_err(|e| Error::Http(format!("failed to build upgrade request: {e}")))?;

    let send_request_fut = match conn {
        Conn::Http1(sr) => sr.send_request(request),
        Conn::Http2(sr) => sr.send_request(request),
    };

    let response = send_request_fut
        .await
        .map_err(|e| Error::Http(format!("websocket upgrade request failed: {e}")))?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(Error::Http(format!(
            "server did not switch protocols: {}",
            response.status()
        )));
    }

    let upgraded = hyper::upgrade::on(response)
        .await
        .map_err(|e| Error::Http(format!("failed to obtain upgraded connection: {e}")))?;
    let io = TokioIo::new(upgraded);
    let ws_stream =
        tokio_tungstenite::WebSocketStream::from_raw_socket(io, ws::protocol::Role::Client, None).await;

    let _ = parts_tx.send((req_ref, DeliveredPart::Ws(Frame::Open)));

    let handle = tokio::spawn(run_websocket_pump(req_ref, ws_stream, outgoing_rx, parts_tx));
    // outgoing_rx was moved into the pump; keep the variable name meaningful above.
    let _ = &mut outgoing_rx;
    Ok(handle.abort_handle())
}

async fn run_websocket_pump<S>(
    req_ref: RequestRef,
    stream: tokio_tungstenite::WebSocketStream<S>,
    mut outgoing_rx: mpsc::UnboundedReceiver<OutgoingFrame>,
    parts_tx: mpsc::UnboundedSender<(RequestRef, DeliveredPart)>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let (mut sink, mut incoming) = stream.split();

    loop {
        tokio::select! {
            msg = incoming.next() => {
                match msg {
                    Some(Ok(Message::Binary(bin))) if !bin.is_empty() => {
                        let channel = bin[0];
                        let payload = Bytes::copy_from_slice(&bin[1..]);
                        let frame = match channel {
                            1 => Some(Frame::Stdout(payload)),
                            2 => Some(Frame::Stderr(payload)),
                            3 => Some(Frame::Error(payload)),
                            _ => None,
                        };
                        if let Some(frame) = frame {
                            if parts_tx.send((req_ref, DeliveredPart::Ws(frame))).is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1000, String::new()));
                        let _ = parts_tx.send((req_ref, DeliveredPart::Ws(Frame::Close { code, reason })));
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = parts_tx.send((req_ref, DeliveredPart::Ws(Frame::Close {
                            code: 1006,
                            reason: e.to_string(),
                        })));
                        return;
                    }
                    None => {
                        let _ = parts_tx.send((req_ref, DeliveredPart::Ws(Frame::Close {
                            code: 1006,
                            reason: "connection closed".to_string(),
                        })));
                        return;
                    }
                }
            }
            outgoing = outgoing_rx.recv() => {
                let Some(outgoing) = outgoing else { return };
                let message = match outgoing {
                    OutgoingFrame::Stdin(bytes) => {
                        let mut buf = Vec::with_capacity(bytes.len() + 1);
                        buf.push(0u8);
                        buf.extend_from_slice(&bytes);
                        Message::Binary(buf.into())
                    }
                    OutgoingFrame::Close | OutgoingFrame::Exit => Message::Close(None),
                    OutgoingFrame::CloseWithReason { code, reason } => {
                        Message::Close(Some(tokio_tungstenite::tungstenite::protocol::CloseFrame {
                            code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(code),
                            reason: reason.into(),
                        }))
                    }
                };
                if sink.send(message).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // §8 prop 9: the adapter is only idle once its buffer is drained *and*
    // the entry has been marked done; a non-empty buffer blocks GC even
    // after the remote side has finished.
    #[test]
    fn entry_is_idle_only_once_done_and_drained() {
        let mut http = HttpEntry {
            buffer: vec![ResponsePart::Done],
            sink: Sink::Buffer,
            waiters: Vec::new(),
            done: true,
        };
        assert!(!is_entry_idle(&Entry::Http(HttpEntry {
            buffer: http.buffer.clone(),
            sink: Sink::Buffer,
            waiters: Vec::new(),
            done: http.done,
        })));

        http.buffer.clear();
        assert!(is_entry_idle(&Entry::Http(http)));
    }

    #[test]
    fn ws_entry_with_unread_frames_is_not_idle() {
        let (outgoing, _rx) = mpsc::unbounded_channel();
        let ws = WsEntry {
            buffer: vec![Frame::Open],
            sink: Sink::Buffer,
            waiters: Vec::new(),
            outgoing,
            done: true,
        };
        assert!(!is_entry_idle(&Entry::Ws(ws)));
    }
}
