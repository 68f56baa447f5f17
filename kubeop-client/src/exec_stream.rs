//! Exec / Attach Stream (component C11): WebSocket channel-multiplexed
//! bidirectional stdio over `pods/exec` and `pods/log` (§4.11).
//!
//! Byte 0 of every frame selects stdout (1),
//! stderr (2), or an error channel (3) carrying a JSON-encoded `Status`;
//! outgoing stdin reuses the same convention on channel 0. Demultiplexing
//! itself lives in [`crate::adapter`]; this module turns that primitive into
//! the higher-level `connect`/`exec`/`log` surface callers use.
use bytes::Bytes;
use kubeop_core::{
    operation::{PathParams, QueryValue},
    Operation,
};

use crate::{
    adapter::{Frame, OutgoingFrame, Sink},
    connection::Connection,
    discovery,
    error::Error,
    middleware::{self, RequestContext},
    registry::{ConnectParams, PooledAdapter},
    transport::DestinationKey,
};

/// Options for a `pods/exec` `connect` operation (§4.11). `command` is
/// required; the stdio flags default to `stdin: true, stdout: true,
/// stderr: true, tty: false` (§4.11, confirmed by scenario S5's expected
/// query string).
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// The argv to execute in the target container.
    pub command: Vec<String>,
    /// Attach stdin.
    pub stdin: bool,
    /// Attach stdout.
    pub stdout: bool,
    /// Attach stderr.
    pub stderr: bool,
    /// Allocate a TTY.
    pub tty: bool,
    /// The container to exec in, for multi-container pods.
    pub container: Option<String>,
}

impl ExecOptions {
    /// Start building exec options for `command`, with `stdout`/`stderr`
    /// attached and `stdin`/`tty` off, matching §4.11's stated defaults.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            stdin: true,
            stdout: true,
            stderr: true,
            tty: false,
            container: None,
        }
    }

    /// Attach stdin, returning `self` for chaining.
    #[must_use]
    pub fn stdin(mut self, stdin: bool) -> Self {
        self.stdin = stdin;
        self
    }

    /// Allocate a TTY, returning `self` for chaining.
    #[must_use]
    pub fn tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// Target a specific container, returning `self` for chaining.
    #[must_use]
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    fn into_query_params(self) -> Vec<(&'static str, QueryValue)> {
        let mut params = vec![
            ("command", QueryValue::Array(self.command)),
            ("stdin", QueryValue::Bool(self.stdin)),
            ("stdout", QueryValue::Bool(self.stdout)),
            ("stderr", QueryValue::Bool(self.stderr)),
            ("tty", QueryValue::Bool(self.tty)),
        ];
        if let Some(container) = self.container {
            params.push(("container", QueryValue::Str(container)));
        }
        params
    }
}

/// Options for a `pods/log` `connect` operation (§4.11, §6).
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Stream new log lines as they are written, rather than returning the
    /// current buffer and closing.
    pub follow: bool,
    /// Only return this many lines from the end of the log.
    pub tail_lines: Option<i64>,
    /// Prefix each line with its RFC3339 timestamp.
    pub timestamps: bool,
    /// The container to read logs from, for multi-container pods.
    pub container: Option<String>,
}

impl LogOptions {
    fn into_query_params(self) -> Vec<(&'static str, QueryValue)> {
        let mut params = vec![
            ("follow", QueryValue::Bool(self.follow)),
            ("timestamps", QueryValue::Bool(self.timestamps)),
        ];
        if let Some(tail) = self.tail_lines {
            params.push(("tailLines", QueryValue::Str(tail.to_string())));
        }
        if let Some(container) = self.container {
            params.push(("container", QueryValue::Str(container)));
        }
        params
    }
}

/// Build the `connect` [`Operation`] for `pods/exec` against `namespace/name`.
pub fn exec_operation(namespace: impl Into<String>, name: impl Into<String>, opts: ExecOptions) -> Operation {
    Operation::connect(
        "v1",
        "pods/exec",
        PathParams::namespaced(namespace, name),
        opts.into_query_params(),
    )
}

/// Build the `connect` [`Operation`] for `pods/log` against `namespace/name`.
pub fn log_operation(namespace: impl Into<String>, name: impl Into<String>, opts: LogOptions) -> Operation {
    Operation::connect(
        "v1",
        "pods/log",
        PathParams::namespaced(namespace, name),
        opts.into_query_params(),
    )
}

/// A live exec/attach session: an upgraded WebSocket, demultiplexed into
/// `{stdout, stderr, error}` frames plus the ability to send `stdin`/`close`
/// back (§4.11). Dropping a session cancels the underlying request.
pub struct ExecSession {
    adapter: PooledAdapter,
    request: crate::adapter::RequestRef,
}

impl ExecSession {
    /// Open a `connect` operation (`pods/exec` or `pods/log`) as a WebSocket,
    /// returning once the upgrade has completed. The caller observes the
    /// `{:open, true}` frame as the first item from [`Self::next_frame`].
    pub async fn open(conn: &Connection, op: &Operation) -> Result<Self, Error> {
        let path = discovery::url_for(conn, op).await?;
        let mut ctx = RequestContext {
            operation: op,
            method: http::Method::GET,
            path,
            headers: Vec::new(),
            body: Vec::new(),
        };
        middleware::run_stack(conn.middleware(), &mut ctx)?;

        let auth_opts = crate::auth::resolve(conn.credential())
            .await
            .map_err(|e| Error::Configuration(e.to_string()))?;
        ctx.headers.extend(auth_opts.headers);

        let key = DestinationKey::from_uri(conn.base_url(), conn.tls_verification())?;
        let authority = conn
            .base_url()
            .authority()
            .ok_or_else(|| Error::Configuration("base URL has no authority".to_string()))?
            .to_string();
        let ca_certificate_pem = match conn.tls_verification() {
            crate::connection::TlsVerification::Verify { ca_certificate_pem } => ca_certificate_pem.clone(),
            crate::connection::TlsVerification::InsecureSkipVerify => None,
        };
        let params = ConnectParams {
            key,
            authority,
            ca_certificate_pem,
        };

        let adapter = conn.registry().checkout(&params).await?;
        let request = adapter
            .handle()
            .websocket_request(ctx.path, ctx.headers, Sink::Buffer)
            .await?;

        Ok(Self { adapter, request })
    }

    /// Pull the next demultiplexed frame, or `None` once the session has
    /// closed and every buffered frame has been drained.
    pub async fn next_frame(&self) -> Option<Frame> {
        self.adapter.handle().recv_frame(self.request).await
    }

    /// Send `bytes` to the remote process's stdin (channel 0).
    pub async fn send_stdin(&self, bytes: Bytes) -> Result<(), Error> {
        self.adapter
            .handle()
            .websocket_send(self.request, OutgoingFrame::Stdin(bytes))
            .await
    }

    /// Close the session with the default close frame.
    pub async fn close(&self) -> Result<(), Error> {
        self.adapter
            .handle()
            .websocket_send(self.request, OutgoingFrame::Close)
            .await
    }

    /// Close the session with an explicit code and reason.
    pub async fn close_with_reason(&self, code: u16, reason: impl Into<String>) -> Result<(), Error> {
        self.adapter
            .handle()
            .websocket_send(
                self.request,
                OutgoingFrame::CloseWithReason {
                    code,
                    reason: reason.into(),
                },
            )
            .await
    }
}

/// Everything an exec/log session produced, aggregated into per-channel
/// buffers. §4.11 "Blocking variant collects all stdout/stderr/error bytes
/// into buffers keyed by channel and returns the aggregate on close."
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    /// Concatenated stdout bytes.
    pub stdout: Vec<u8>,
    /// Concatenated stderr bytes.
    pub stderr: Vec<u8>,
    /// Concatenated error-channel bytes (a JSON `Status` object, if present).
    pub error: Vec<u8>,
    /// The close code and reason the server sent, if the stream closed
    /// rather than simply ending.
    pub close: Option<(u16, String)>,
}

/// Open `op` and run it to completion, aggregating every frame rather than
/// exposing the session for interactive use (§4.11 "Blocking variant").
pub async fn run_to_completion(conn: &Connection, op: &Operation) -> Result<ExecOutcome, Error> {
    let session = ExecSession::open(conn, op).await?;
    let mut outcome = ExecOutcome::default();
    while let Some(frame) = session.next_frame().await {
        match frame {
            Frame::Open => {}
            Frame::Stdout(bytes) => outcome.stdout.extend_from_slice(&bytes),
            Frame::Stderr(bytes) => outcome.stderr.extend_from_slice(&bytes),
            Frame::Error(bytes) => outcome.error.extend_from_slice(&bytes),
            Frame::Close { code, reason } => {
                outcome.close = Some((code, reason));
                break;
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    // S5 — exec `echo ok`: the query string built for
    // `connect("v1","pods/exec",{namespace,name}, command:["/bin/sh","-c","echo ok"], tty:false)`.
    // Note `stdin` is never set explicitly here; it must still come out `true`.
    #[test]
    fn exec_options_serialize_expected_query_params() {
        let op = exec_operation(
            "default",
            "p",
            ExecOptions::new(vec!["/bin/sh".to_string(), "-c".to_string(), "echo ok".to_string()]),
        );
        let qp = op.query_params();
        assert_eq!(
            qp.get("command"),
            Some(&QueryValue::Array(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "echo ok".to_string(),
            ]))
        );
        assert_eq!(qp.get("stdin"), Some(&QueryValue::Bool(true)));
        assert_eq!(qp.get("stdout"), Some(&QueryValue::Bool(true)));
        assert_eq!(qp.get("stderr"), Some(&QueryValue::Bool(true)));
        assert_eq!(qp.get("tty"), Some(&QueryValue::Bool(false)));
    }

    #[test]
    fn log_options_omit_tail_lines_when_unset() {
        let op = log_operation("default", "p", LogOptions::default());
        assert!(op.query_params().get("tailLines").is_none());
    }

    #[test]
    fn log_options_include_tail_lines_when_set() {
        let op = log_operation(
            "default",
            "p",
            LogOptions {
                tail_lines: Some(50),
                ..Default::default()
            },
        );
        assert_eq!(
            op.query_params().get("tailLines"),
            Some(&QueryValue::Str("50".to_string()))
        );
    }
}
