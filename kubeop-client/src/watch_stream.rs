//! Watch Stream (component C10): a long-lived sequence of change events,
//! transparently re-listing and reconnecting across `410 Gone` (§4.10).
//!
//! Each event is handed to the caller as soon as it is decoded off the
//! wire — the stream never waits for the underlying connection to close
//! before yielding what it has already read (§4.10, §5 "events are emitted
//! in server order").
use bytes::BytesMut;
use futures::{stream, Stream};
use kubeop_core::{dynamic, Operation};
use serde_json::Value;

use crate::{connection::Connection, error::Error, runner};

/// One change event (§4.10): the envelope's `type` alongside its `object`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
    /// A periodic checkpoint the server emits with no matching change; its
    /// `resourceVersion` is tracked but the event itself is not surfaced to
    /// callers (§4.10 "bookmarks are absorbed silently").
    Bookmark,
    /// The server rejected the watch outright (distinct from a transport
    /// error): its `object` is a `Status`.
    Error,
}

/// One event from a [`watch`] stream.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// What kind of change this is.
    pub kind: WatchEventKind,
    /// The affected resource (or, for [`WatchEventKind::Error`], a `Status`).
    pub object: Value,
}

/// Where the watch stream currently stands. `resource_version` in
/// [`Phase::Connecting`]/[`Phase::Streaming`] serves double duty: it is both
/// the resume checkpoint a reconnect/re-list is seeded from, and the
/// dedup checkpoint §4.10 step 4 compares each event's `resourceVersion`
/// against before emitting it.
enum Phase {
    /// Need an initial list to learn a starting `resourceVersion`.
    NeedsInitialList,
    /// Have a `resourceVersion`; need to open the streaming connection.
    Connecting { resource_version: String },
    /// Reading newline-delimited JSON off an open connection.
    Streaming {
        stream: runner::RawStream,
        buffer: BytesMut,
        resource_version: String,
    },
    /// The watch ended in an unrecoverable error.
    Done,
}

struct WatchState {
    conn: Connection,
    op: Operation,
    phase: Phase,
}

/// Stream change events for the collection `op` targets (a `Watch` or
/// `WatchAllNamespaces` operation). Starts with a `LIST` to establish a
/// `resourceVersion` if `op` carries none already; reconnects transparently
/// on `410 Gone` by re-listing, and terminates on any other server error
/// (§4.10, §8 prop 10).
pub fn watch(conn: Connection, op: Operation) -> impl Stream<Item = Result<WatchEvent, Error>> {
    let state = WatchState {
        conn,
        op,
        phase: Phase::NeedsInitialList,
    };
    stream::unfold(state, step)
}

async fn step(mut st: WatchState) -> Option<(Result<WatchEvent, Error>, WatchState)> {
    loop {
        let phase = std::mem::replace(&mut st.phase, Phase::Done);
        match phase {
            Phase::NeedsInitialList => match initial_resource_version(&st.conn, &st.op).await {
                Ok(resource_version) => st.phase = Phase::Connecting { resource_version },
                Err(e) => return Some((Err(e), st)),
            },
            Phase::Connecting { resource_version } => {
                match open_watch_stream(&st.conn, &st.op, &resource_version).await {
                    Ok(Some(stream)) => {
                        st.phase = Phase::Streaming {
                            stream,
                            buffer: BytesMut::new(),
                            resource_version,
                        };
                    }
                    Ok(None) => st.phase = Phase::NeedsInitialList,
                    Err(e) => return Some((Err(e), st)),
                }
            }
            streaming @ Phase::Streaming { .. } => {
                st.phase = streaming;
                match pull_event(&mut st.phase).await {
                    PullOutcome::Event(event) => return Some((Ok(event), st)),
                    PullOutcome::Reconnect(resource_version) => st.phase = Phase::Connecting { resource_version },
                    PullOutcome::Relist => st.phase = Phase::NeedsInitialList,
                    PullOutcome::Fatal(e) => return Some((Err(e), st)),
                }
            }
            Phase::Done => return None,
        }
    }
}

async fn initial_resource_version(conn: &Connection, op: &Operation) -> Result<String, Error> {
    let list_op = to_list_operation(op);
    let page = runner::run(conn, &list_op).await?;
    Ok(dynamic::resource_version(&page).unwrap_or_default().to_string())
}

fn to_list_operation(op: &Operation) -> Operation {
    use kubeop_core::Verb;
    let verb = match op.verb() {
        Verb::WatchAllNamespaces => Verb::ListAllNamespaces,
        _ => Verb::List,
    };
    Operation::build(verb, op.api_version(), op.name().resource_key(), op.path_params().clone(), None)
}

/// Open the streaming GET for `resource_version`. Returns `Ok(None)` on
/// `410 Gone` (the caller must re-list), `Err` for any other non-success
/// status (terminal, §4.10 step 6).
async fn open_watch_stream(
    conn: &Connection,
    op: &Operation,
    resource_version: &str,
) -> Result<Option<runner::RawStream>, Error> {
    let list_op = to_list_operation(op)
        .put_query_param("watch", true)
        .put_query_param("allowWatchBookmarks", true)
        .put_query_param("resourceVersion", resource_version.to_string());

    let path = crate::discovery::url_for(conn, &list_op).await?;
    let mut ctx = crate::middleware::RequestContext {
        operation: &list_op,
        method: http::Method::GET,
        path,
        headers: Vec::new(),
        body: Vec::new(),
    };
    crate::middleware::run_stack(conn.middleware(), &mut ctx)?;

    let stream = runner::open_stream(conn, http::Method::GET, &ctx.path, ctx.headers).await?;

    if stream.status == http::StatusCode::GONE {
        return Ok(None);
    }
    if !stream.status.is_success() {
        return Err(Error::Http(format!("watch request failed: {}", stream.status)));
    }
    Ok(Some(stream))
}

/// What [`pull_event`] produced after looking at buffered data and, if
/// needed, pulling further chunks off the wire.
enum PullOutcome {
    /// One event ready for the caller.
    Event(WatchEvent),
    /// The connection ended (closed, timed out, or sent a malformed chunk);
    /// reconnect from `resource_version` without re-listing (§4.10 step 5).
    Reconnect(String),
    /// An `Expired`/410 `ERROR` envelope arrived mid-stream; re-list to
    /// reseed (§4.10 step 4).
    Relist,
    /// A fatal, non-recoverable failure.
    Fatal(Error),
}

/// Drain already-buffered lines and, once exhausted, pull further chunks
/// from the open connection until one event is ready to yield or the
/// connection needs to be torn down.
async fn pull_event(phase: &mut Phase) -> PullOutcome {
    let Phase::Streaming { stream, buffer, resource_version } = phase else {
        unreachable!("pull_event called outside Phase::Streaming");
    };

    loop {
        if let Some(newline_at) = buffer.iter().position(|b| *b == b'\n') {
            let line = buffer.split_to(newline_at + 1);
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            let envelope: Value = match serde_json::from_slice(line) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(%err, "malformed watch chunk, reconnecting");
                    return PullOutcome::Reconnect(resource_version.clone());
                }
            };

            match classify_envelope(&envelope, resource_version) {
                Some(EnvelopeOutcome::Emit(event, rv)) => {
                    if let Some(rv) = rv {
                        *resource_version = rv;
                    }
                    return PullOutcome::Event(event);
                }
                Some(EnvelopeOutcome::Absorb(rv)) => {
                    if let Some(rv) = rv {
                        *resource_version = rv;
                    }
                }
                Some(EnvelopeOutcome::Relist) => return PullOutcome::Relist,
                Some(EnvelopeOutcome::Fatal(message)) => {
                    return PullOutcome::Fatal(Error::Http(format!("watch stream error event: {message}")));
                }
                None => {}
            }
            continue;
        }

        match stream.next_chunk().await {
            Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
            Some(Err(err)) => {
                tracing::warn!(%err, "watch stream transport error, reconnecting");
                return PullOutcome::Reconnect(resource_version.clone());
            }
            None => {
                tracing::debug!("watch stream ended, reconnecting");
                return PullOutcome::Reconnect(resource_version.clone());
            }
        }
    }
}

/// What one decoded envelope means, checked against `last_seen_rv` (§4.10
/// step 4's dedup rule, §8 prop 4).
enum EnvelopeOutcome {
    /// Emit to the caller; carries the event's own `resourceVersion` (if
    /// any) to become the new resume/dedup checkpoint.
    Emit(WatchEvent, Option<String>),
    /// A bookmark, or a duplicate of `last_seen_rv`: advances the
    /// checkpoint (if it carries one) without being surfaced to the caller.
    Absorb(Option<String>),
    /// An `ERROR` envelope naming `Expired`/410.
    Relist,
    /// Any other `ERROR` envelope.
    Fatal(String),
}

/// Decode one watch envelope and decide whether it is a fresh event, a
/// duplicate/bookmark to absorb, or a terminal/recoverable `ERROR`.
/// `last_seen_rv` is the `resourceVersion` of the most recently
/// emitted-or-absorbed envelope; an incoming ADDED/MODIFIED/DELETED event
/// carrying the same `resourceVersion` is a post-reconnect replay and is
/// skipped rather than re-emitted (§8 prop 4: `[r1,r2,r2,r3]` → `[r1,r2,r3]`).
fn classify_envelope(envelope: &Value, last_seen_rv: &str) -> Option<EnvelopeOutcome> {
    let (kind, object) = parse_envelope(envelope)?;
    let rv = dynamic::resource_version(&object).map(str::to_string);

    Some(match kind {
        WatchEventKind::Bookmark => EnvelopeOutcome::Absorb(rv),
        WatchEventKind::Error if status_is_expired(&object) => EnvelopeOutcome::Relist,
        WatchEventKind::Error => EnvelopeOutcome::Fatal(object.to_string()),
        _ if rv.as_deref() == Some(last_seen_rv) => EnvelopeOutcome::Absorb(rv),
        _ => EnvelopeOutcome::Emit(WatchEvent { kind, object }, rv),
    })
}

/// `true` if a `Status` object (the payload of an `ERROR` watch envelope)
/// names the `Expired` resourceVersion condition (§4.10 step 4), which is
/// absorbed as a reconnection signal rather than surfaced as fatal.
fn status_is_expired(status: &Value) -> bool {
    let reason = status.get("reason").and_then(Value::as_str).unwrap_or_default();
    let code = status.get("code").and_then(Value::as_u64).unwrap_or_default();
    reason == "Expired" || code == 410
}

fn parse_envelope(envelope: &Value) -> Option<(WatchEventKind, Value)> {
    let kind = match envelope.get("type")?.as_str()? {
        "ADDED" => WatchEventKind::Added,
        "MODIFIED" => WatchEventKind::Modified,
        "DELETED" => WatchEventKind::Deleted,
        "BOOKMARK" => WatchEventKind::Bookmark,
        "ERROR" => WatchEventKind::Error,
        _ => return None,
    };
    let object = envelope.get("object")?.clone();
    Some((kind, object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_event_types() {
        let envelope = json!({"type": "ADDED", "object": {"metadata": {"name": "a"}}});
        let (kind, object) = parse_envelope(&envelope).unwrap();
        assert_eq!(kind, WatchEventKind::Added);
        assert_eq!(object["metadata"]["name"], "a");
    }

    #[test]
    fn bookmark_is_recognized_but_carries_no_meaningful_object() {
        let envelope = json!({"type": "BOOKMARK", "object": {"metadata": {"resourceVersion": "99"}}});
        let (kind, _) = parse_envelope(&envelope).unwrap();
        assert_eq!(kind, WatchEventKind::Bookmark);
    }

    #[test]
    fn unknown_event_type_is_ignored() {
        assert!(parse_envelope(&json!({"type": "HEARTBEAT", "object": {}})).is_none());
    }

    #[test]
    fn expired_status_is_recognized_by_reason_or_code() {
        assert!(status_is_expired(&json!({"reason": "Expired", "code": 410})));
        assert!(status_is_expired(&json!({"reason": "Gone", "code": 410})));
        assert!(status_is_expired(&json!({"reason": "Expired", "code": 200})));
        assert!(!status_is_expired(&json!({"reason": "InternalError", "code": 500})));
    }

    fn added(rv: &str) -> Value {
        json!({"type": "ADDED", "object": {"metadata": {"resourceVersion": rv}}})
    }

    // §8 prop 4: resourceVersions [r1, r2, r2, r3] emit events at [r1, r2, r3].
    #[test]
    fn duplicate_resource_version_after_reconnect_is_absorbed() {
        let mut last_seen_rv = "0".to_string();
        let mut emitted = Vec::new();

        for envelope in [added("1"), added("2"), added("2"), added("3")] {
            match classify_envelope(&envelope, &last_seen_rv).unwrap() {
                EnvelopeOutcome::Emit(event, rv) => {
                    emitted.push(dynamic::resource_version(&event.object).unwrap().to_string());
                    if let Some(rv) = rv {
                        last_seen_rv = rv;
                    }
                }
                EnvelopeOutcome::Absorb(rv) => {
                    if let Some(rv) = rv {
                        last_seen_rv = rv;
                    }
                }
                EnvelopeOutcome::Relist | EnvelopeOutcome::Fatal(_) => panic!("unexpected outcome"),
            }
        }

        assert_eq!(emitted, vec!["1", "2", "3"]);
    }

    #[test]
    fn bookmark_advances_checkpoint_without_emitting() {
        let envelope = json!({"type": "BOOKMARK", "object": {"metadata": {"resourceVersion": "5"}}});
        match classify_envelope(&envelope, "1").unwrap() {
            EnvelopeOutcome::Absorb(Some(rv)) => assert_eq!(rv, "5"),
            other => panic!("expected Absorb(Some(\"5\")), got a different outcome: {other:?}"),
        }
    }

    #[test]
    fn expired_error_envelope_triggers_relist() {
        let envelope = json!({"type": "ERROR", "object": {"reason": "Expired", "code": 410}});
        assert!(matches!(classify_envelope(&envelope, "1"), Some(EnvelopeOutcome::Relist)));
    }

    #[test]
    fn non_expired_error_envelope_is_fatal() {
        let envelope = json!({"type": "ERROR", "object": {"reason": "InternalError", "code": 500}});
        assert!(matches!(classify_envelope(&envelope, "1"), Some(EnvelopeOutcome::Fatal(_))));
    }
}
