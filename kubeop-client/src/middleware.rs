//! Request middleware (§4.8): an ordered list of request transformers run
//! by the Request Runner before dispatch. Composition halts on the first
//! error, which is wrapped with the offending middleware's identity.
use http::{HeaderValue, Method};
use kubeop_core::{operation::QueryValue, Operation};

use crate::error::Error;

/// The request under construction, threaded through the middleware stack.
/// Middleware mutate this in place; the runner turns the finished value into
/// an `http::Request` once the stack completes.
pub struct RequestContext<'a> {
    /// The operation this request is being built for.
    pub operation: &'a Operation,
    /// HTTP method, set by [`Initialize`].
    pub method: Method,
    /// Absolute request path (including query string), set by [`Initialize`].
    pub path: String,
    /// Headers accumulated across the stack so far.
    pub headers: Vec<(http::HeaderName, HeaderValue)>,
    /// Request body bytes, set by [`EncodeBody`] for body-bearing verbs.
    pub body: Vec<u8>,
}

/// A single request transformer. Implementations may add headers, rewrite
/// the path, or populate the body; they signal rejection with a descriptive
/// error rather than panicking.
pub trait Middleware: Send + Sync {
    /// This middleware's name, used to identify it in error wrapping.
    fn name(&self) -> &'static str;

    /// Apply this middleware's transformation to `ctx`.
    fn apply(&self, ctx: &mut RequestContext<'_>) -> Result<(), String>;
}

/// A boxed, type-erased [`Middleware`].
pub type BoxMiddleware = Box<dyn Middleware>;

/// Populates `method` and `path` from the operation's verb and the
/// already-resolved URL path (the runner resolves the path via discovery
/// and the Path Builder before running the stack, then hands it in here
/// through [`RequestContext::path`]'s initial value).
pub struct Initialize;

impl Middleware for Initialize {
    fn name(&self) -> &'static str {
        "Initialize"
    }

    fn apply(&self, ctx: &mut RequestContext<'_>) -> Result<(), String> {
        ctx.method = ctx.operation.verb().method();
        Ok(())
    }
}

/// JSON-encodes the operation's body for body-bearing methods, setting
/// `Content-Type: application/json` unless a middleware earlier in the
/// stack already set one (e.g. a patch's `contentType` query param implies
/// a different wire content type, but the body itself is still JSON).
pub struct EncodeBody;

impl Middleware for EncodeBody {
    fn name(&self) -> &'static str {
        "EncodeBody"
    }

    fn apply(&self, ctx: &mut RequestContext<'_>) -> Result<(), String> {
        if !ctx.operation.verb().is_body_bearing() {
            return Ok(());
        }
        let Some(data) = ctx.operation.data() else {
            return Ok(());
        };
        let encoded = serde_json::to_vec(data).map_err(|e| e.to_string())?;
        ctx.body = encoded;
        if !ctx.headers.iter().any(|(name, _)| name == http::header::CONTENT_TYPE) {
            ctx.headers
                .push((http::header::CONTENT_TYPE, HeaderValue::from_static("application/json")));
        }
        Ok(())
    }
}

/// Appends the operation's query parameters (including any `labelSelector`
/// merged in from a structured [`kubeop_core::Selector`]) to `ctx.path`.
pub struct AttachQueryParams;

impl Middleware for AttachQueryParams {
    fn name(&self) -> &'static str {
        "AttachQueryParams"
    }

    fn apply(&self, ctx: &mut RequestContext<'_>) -> Result<(), String> {
        let query_params = ctx.operation.query_params();
        if query_params.is_empty() {
            return Ok(());
        }
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &query_params {
            match value {
                QueryValue::Str(s) => {
                    serializer.append_pair(key, s);
                }
                QueryValue::Bool(b) => {
                    serializer.append_pair(key, if *b { "true" } else { "false" });
                }
                QueryValue::Array(values) => {
                    for v in values {
                        serializer.append_pair(key, v);
                    }
                }
            }
        }
        ctx.path = format!("{}?{}", ctx.path, serializer.finish());
        Ok(())
    }
}

/// The default middleware stack: [`Initialize`], [`AttachQueryParams`], then
/// [`EncodeBody`].
pub fn default_stack() -> Vec<BoxMiddleware> {
    vec![Box::new(Initialize), Box::new(AttachQueryParams), Box::new(EncodeBody)]
}

/// Run `stack` in order over `ctx`, halting and wrapping the first error.
pub fn run_stack(stack: &[BoxMiddleware], ctx: &mut RequestContext<'_>) -> Result<(), Error> {
    for middleware in stack {
        middleware.apply(ctx).map_err(|cause| Error::Middleware {
            middleware: middleware.name(),
            cause,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeop_core::{PathParams, Verb};
    use serde_json::json;

    #[test]
    fn encode_body_skips_non_body_bearing_verbs() {
        let op = Operation::build(Verb::Get, "v1", "Pod", PathParams::namespaced("default", "nginx"), None);
        let mut ctx = RequestContext {
            operation: &op,
            method: Method::GET,
            path: "/api/v1/namespaces/default/pods/nginx".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        };
        run_stack(&default_stack(), &mut ctx).unwrap();
        assert!(ctx.body.is_empty());
        assert!(ctx.headers.is_empty());
    }

    #[test]
    fn encode_body_json_encodes_create_bodies() {
        let body = json!({"metadata": {"name": "nginx"}});
        let op = Operation::build(
            Verb::Create,
            "v1",
            "Pod",
            PathParams::namespaced("default", "nginx"),
            Some(body.clone()),
        );
        let mut ctx = RequestContext {
            operation: &op,
            method: Method::POST,
            path: "/api/v1/namespaces/default/pods".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        };
        run_stack(&default_stack(), &mut ctx).unwrap();
        assert_eq!(ctx.body, serde_json::to_vec(&body).unwrap());
        assert_eq!(ctx.headers[0].1, HeaderValue::from_static("application/json"));
    }
}
