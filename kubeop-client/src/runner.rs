//! Request Runner (component C8): turns a resolved [`Operation`] into a
//! dispatched request and maps the response back to a `Result` (§4.8).
use bytes::Bytes;
use http::StatusCode;
use kubeop_core::Operation;
use serde::de::DeserializeOwned;

use crate::{
    adapter::{ResponsePart, Sink},
    auth,
    connection::Connection,
    discovery,
    error::{ApiStatus, Error},
    middleware::{self, RequestContext},
    registry::ConnectParams,
    transport::DestinationKey,
};

/// Resolve, dispatch and decode `op` against `conn`, returning the decoded
/// response body (a `Null` value for verbs with no response body).
pub async fn run(conn: &Connection, op: &Operation) -> Result<serde_json::Value, Error> {
    let path = discovery::url_for(conn, op).await?;

    let mut ctx = RequestContext {
        operation: op,
        method: op.verb().method(),
        path,
        headers: Vec::new(),
        body: Vec::new(),
    };
    middleware::run_stack(conn.middleware(), &mut ctx)?;

    let auth_opts = auth::resolve(conn.credential()).await.map_err(|e| Error::Configuration(e.to_string()))?;
    ctx.headers.extend(auth_opts.headers);

    let (status, headers, body) = dispatch(conn, ctx.method, &ctx.path, ctx.headers, Bytes::from(ctx.body)).await?;
    decode_response(status, &headers, body)
}

/// Issue a bare `GET` against `path` with no operation, middleware or
/// credential involvement, decoding the JSON body. Used by the discovery
/// driver to fetch `/api`, `/apis`, and per-group-version documents, which
/// are not resource operations.
pub async fn get_raw<T: DeserializeOwned>(conn: &Connection, path: &str) -> Result<T, Error> {
    let auth_opts = auth::resolve(conn.credential()).await.map_err(|e| Error::Configuration(e.to_string()))?;
    let (status, headers, body) = dispatch(conn, http::Method::GET, path, auth_opts.headers, Bytes::new()).await?;
    if !status.is_success() {
        return Err(status_to_error(status, &headers, body));
    }
    serde_json::from_slice(&body).map_err(Error::from)
}

async fn dispatch(
    conn: &Connection,
    method: http::Method,
    path: &str,
    headers: Vec<(http::HeaderName, http::HeaderValue)>,
    body: Bytes,
) -> Result<(StatusCode, http::HeaderMap, Bytes), Error> {
    let params = connect_params(conn)?;
    conn.registry()
        .run(&params, move |adapter| async move {
            let request_ref = adapter
                .request(method, path.to_string(), headers, body, Sink::Buffer)
                .await?;

            let mut status = StatusCode::OK;
            let mut response_headers = http::HeaderMap::new();
            let mut chunks = Vec::new();
            loop {
                match adapter.recv(request_ref).await {
                    Some(ResponsePart::Status(s)) => status = s,
                    Some(ResponsePart::Headers(h)) => response_headers = h,
                    Some(ResponsePart::Data(chunk)) => chunks.extend_from_slice(&chunk),
                    Some(ResponsePart::Done) => break,
                    Some(ResponsePart::Error(message)) => return Err(Error::Http(message)),
                    None => break,
                }
            }
            Ok((status, response_headers, Bytes::from(chunks)))
        })
        .await
}

/// A long-lived streamed response: headers have already arrived, and
/// [`RawStream::next_chunk`] pulls further body chunks as they arrive on the
/// wire. Used by the Watch Stream (C10) to read newline-delimited JSON
/// without buffering the whole (potentially unbounded) response.
///
/// Dropping a `RawStream` cancels its underlying request and returns its
/// adapter to the Connection Registry's pool (for HTTP/1 destinations).
pub struct RawStream {
    /// The initial response status.
    pub status: StatusCode,
    /// The initial response headers.
    pub headers: http::HeaderMap,
    adapter: crate::registry::PooledAdapter,
    request: crate::adapter::RequestRef,
}

impl RawStream {
    /// Pull the next body chunk, or `None` once the response has completed.
    pub async fn next_chunk(&self) -> Option<Result<Bytes, Error>> {
        loop {
            match self.adapter.handle().recv(self.request).await? {
                ResponsePart::Status(_) | ResponsePart::Headers(_) => continue,
                ResponsePart::Data(chunk) => return Some(Ok(chunk)),
                ResponsePart::Done => return None,
                ResponsePart::Error(message) => return Some(Err(Error::Http(message))),
            }
        }
    }
}

impl Drop for RawStream {
    fn drop(&mut self) {
        self.adapter.handle().cancel(self.request);
    }
}

/// Open a long-lived streamed GET (used by the Watch Stream, C10) without
/// buffering the response body.
pub async fn open_stream(
    conn: &Connection,
    method: http::Method,
    path: &str,
    mut headers: Vec<(http::HeaderName, http::HeaderValue)>,
) -> Result<RawStream, Error> {
    let auth_opts = auth::resolve(conn.credential()).await.map_err(|e| Error::Configuration(e.to_string()))?;
    headers.extend(auth_opts.headers);

    let params = connect_params(conn)?;
    let adapter = conn.registry().checkout(&params).await?;
    let request = adapter
        .handle()
        .request(method, path.to_string(), headers, Bytes::new(), Sink::Buffer)
        .await?;

    let mut status = StatusCode::OK;
    let mut response_headers = http::HeaderMap::new();
    loop {
        match adapter.handle().recv(request).await {
            Some(ResponsePart::Status(s)) => status = s,
            Some(ResponsePart::Headers(h)) => {
                response_headers = h;
                break;
            }
            Some(ResponsePart::Data(_)) | None => break,
            Some(ResponsePart::Error(message)) => return Err(Error::Http(message)),
        }
    }

    Ok(RawStream {
        status,
        headers: response_headers,
        adapter,
        request,
    })
}

fn connect_params(conn: &Connection) -> Result<ConnectParams, Error> {
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
    Ok(ConnectParams {
        key,
        authority,
        ca_certificate_pem,
    })
}

fn decode_response(status: StatusCode, headers: &http::HeaderMap, body: Bytes) -> Result<serde_json::Value, Error> {
    if !status.is_success() {
        return Err(status_to_error(status, headers, body));
    }
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(&body).map_err(Error::from)
}

fn status_to_error(status: StatusCode, headers: &http::HeaderMap, body: Bytes) -> Error {
    let is_json = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));

    if is_json {
        if let Ok(mut api_status) = serde_json::from_slice::<ApiStatus>(&body) {
            if api_status.code == 0 {
                api_status.code = status.as_u16();
            }
            tracing::debug!(reason = %api_status.reason, code = api_status.code, "api error");
            return Error::Api(api_status);
        }
    }
    tracing::warn!(%status, "unexpected non-success response with no parseable status");
    Error::Http(format!("unexpected status {status}"))
}
