//! Request dispatch: handler trait, middleware composition, and the method
//! mux.
//!
//! The dispatch graph is built bottom-up and executed top-down. A
//! [`Middleware`] runs its own handler first and delegates to the next one
//! only while the response status is still `200 OK`; any handler that writes
//! a non-OK status short-circuits the rest of the chain.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use crate::rtsp::header::names;
use crate::rtsp::message::{Request, Response};
use crate::rtsp::method::Method;
use crate::rtsp::session::{Session, SessionRegistry, SessionUid};
use crate::rtsp::status::Status;

/// Everything a handler needs to serve one request.
pub struct RequestContext {
    /// Peer address of the control connection
    pub remote_addr: SocketAddr,
    /// The parsed request
    pub request: Request,
    /// The response under construction; starts as `200 OK`
    pub response: Response,
    /// The session resolved (or created) for this request
    pub session: Option<Arc<Session>>,
}

impl RequestContext {
    /// A context for `request` with an empty `200 OK` response.
    pub fn new(remote_addr: SocketAddr, request: Request) -> Self {
        RequestContext {
            remote_addr,
            request,
            response: Response::new(Status::Ok),
            session: None,
        }
    }
}

/// A step in the request dispatch graph.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Serves one request, writing into `ctx.response`.
    async fn serve(&self, ctx: &mut RequestContext);
}

/// Runs `handler`, then `next`, but only while the response is still OK.
pub struct Middleware {
    handler: Box<dyn Handler>,
    next: Box<dyn Handler>,
}

impl Middleware {
    /// Wraps `next` behind `handler`.
    pub fn new(handler: Box<dyn Handler>, next: Box<dyn Handler>) -> Self {
        Middleware { handler, next }
    }
}

#[async_trait]
impl Handler for Middleware {
    async fn serve(&self, ctx: &mut RequestContext) {
        self.handler.serve(ctx).await;

        if ctx.response.status() == Status::Ok {
            self.next.serve(ctx).await;
        }
    }
}

/// Routes requests to a handler by method; unknown methods get `405`.
#[derive(Default)]
pub struct MethodMux {
    routes: HashMap<Method, Box<dyn Handler>>,
}

impl MethodMux {
    /// An empty mux.
    pub fn new() -> Self {
        MethodMux::default()
    }

    /// Registers `handler` for `method`.
    pub fn handle(&mut self, method: Method, handler: Box<dyn Handler>) {
        self.routes.insert(method, handler);
    }
}

#[async_trait]
impl Handler for MethodMux {
    async fn serve(&self, ctx: &mut RequestContext) {
        match self.routes.get(&ctx.request.line.method) {
            Some(handler) => handler.serve(ctx).await,
            None => {
                warn!(
                    "no handler for method {} from {}",
                    ctx.request.line.method, ctx.remote_addr
                );
                ctx.response.set_status(Status::MethodNotAllowed);
            }
        }
    }
}

/// Validates `CSeq` and mirrors it onto the response.
///
/// A missing or non-integer `CSeq` is a `400` and nothing is mirrored.
pub struct MirrorCseq;

#[async_trait]
impl Handler for MirrorCseq {
    async fn serve(&self, ctx: &mut RequestContext) {
        let Some(cseq) = ctx.request.cseq() else {
            ctx.response.set_status(Status::BadRequest);
            return;
        };

        if cseq.trim().parse::<i64>().is_err() {
            ctx.response.set_status(Status::BadRequest);
            return;
        }

        ctx.response.message.headers.put_generic(names::CSEQ, cseq);
    }
}

/// Resolves the `Session` header against the registry.
///
/// `SETUP` must not name a session (the stream it sets up has none yet):
/// presence is `455`. `OPTIONS` needs no session. Every other method
/// requires the header and a live registry entry, else `454`.
pub struct ResolveSession {
    registry: Arc<SessionRegistry>,
}

impl ResolveSession {
    /// A resolver over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        ResolveSession { registry }
    }
}

#[async_trait]
impl Handler for ResolveSession {
    async fn serve(&self, ctx: &mut RequestContext) {
        let method = ctx.request.line.method;
        let session_header = ctx.request.message.headers.value_of(names::SESSION);

        match (session_header, method) {
            (Some(_), Method::Setup) => {
                ctx.response.set_status(Status::MethodNotValidInThisState);
            }
            (None, Method::Setup) | (_, Method::Options) => {}
            (None, _) => {
                ctx.response.set_status(Status::SessionNotFound);
            }
            (Some(value), _) => {
                let uid = SessionUid::from(value.as_str());
                match self.registry.get(&uid).await {
                    Some(session) => ctx.session = Some(session),
                    None => {
                        warn!("request names unknown session {uid}");
                        ctx.response.set_status(Status::SessionNotFound);
                    }
                }
            }
        }
    }
}

/// Sets the headers every response carries before it is written:
/// `Content-Length` when there is a body (removed otherwise) and
/// `Connection: close`.
pub(crate) fn finalize_headers(response: &mut Response) {
    let body_len = response.message.body.len();
    let headers = &mut response.message.headers;

    if body_len == 0 {
        headers.remove(names::CONTENT_LENGTH);
    } else {
        headers.put_generic(names::CONTENT_LENGTH, body_len.to_string());
    }

    headers.put_generic(names::CONNECTION, "close");
}

/// [`finalize_headers`] as the tail of the dispatch graph.
///
/// Runs unconditionally at write time, after the chain, so error responses
/// are finalized too.
pub struct FinalizeHeaders;

#[async_trait]
impl Handler for FinalizeHeaders {
    async fn serve(&self, ctx: &mut RequestContext) {
        finalize_headers(&mut ctx.response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaUid;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    fn context(method: Method) -> RequestContext {
        let request = Request::new(method, Url::parse("rtsp://host/media/abc").unwrap());
        RequestContext::new("127.0.0.1:9999".parse().unwrap(), request)
    }

    struct SetStatus(Status);

    #[async_trait]
    impl Handler for SetStatus {
        async fn serve(&self, ctx: &mut RequestContext) {
            ctx.response.set_status(self.0);
        }
    }

    struct Count(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler for Count {
        async fn serve(&self, _ctx: &mut RequestContext) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn middleware_delegates_while_ok() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Middleware::new(
            Box::new(Count(calls.clone())),
            Box::new(Count(calls.clone())),
        );

        let mut ctx = context(Method::Options);
        chain.serve(&mut ctx).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn middleware_short_circuits_on_non_ok() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Middleware::new(
            Box::new(SetStatus(Status::BadRequest)),
            Box::new(Count(calls.clone())),
        );

        let mut ctx = context(Method::Options);
        chain.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::BadRequest);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mux_routes_by_method_and_rejects_unknown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = MethodMux::new();
        mux.handle(Method::Setup, Box::new(Count(calls.clone())));

        let mut ctx = context(Method::Setup);
        mux.serve(&mut ctx).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.response.status(), Status::Ok);

        let mut ctx = context(Method::Record);
        mux.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::MethodNotAllowed);
    }

    #[tokio::test]
    async fn mirror_cseq_copies_valid_values() {
        let mut ctx = context(Method::Options);
        ctx.request.message.headers.put_generic("CSeq", "17");

        MirrorCseq.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::Ok);
        assert_eq!(ctx.response.message.headers.value_of("CSeq").unwrap(), "17");
    }

    #[tokio::test]
    async fn mirror_cseq_rejects_missing_and_non_integer() {
        let mut ctx = context(Method::Options);
        MirrorCseq.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::BadRequest);
        assert!(ctx.response.message.headers.get("CSeq").is_none());

        let mut ctx = context(Method::Options);
        ctx.request.message.headers.put_generic("CSeq", "seven");
        MirrorCseq.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::BadRequest);
        assert!(ctx.response.message.headers.get("CSeq").is_none());
    }

    #[tokio::test]
    async fn resolve_session_rules() {
        let registry = Arc::new(SessionRegistry::new());
        let session = Arc::new(Session::new(MediaUid::from("abc")));
        let uid = session.uid.clone();
        registry.add(session).await;
        let resolver = ResolveSession::new(registry);

        // SETUP with a session header is invalid in that state.
        let mut ctx = context(Method::Setup);
        ctx.request
            .message
            .headers
            .put_generic("Session", uid.as_str());
        resolver.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::MethodNotValidInThisState);

        // SETUP without one passes through with no session attached.
        let mut ctx = context(Method::Setup);
        resolver.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::Ok);
        assert!(ctx.session.is_none());

        // OPTIONS needs no session.
        let mut ctx = context(Method::Options);
        resolver.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::Ok);

        // Other methods require the header...
        let mut ctx = context(Method::Play);
        resolver.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::SessionNotFound);

        // ...and a live registry entry.
        let mut ctx = context(Method::Play);
        ctx.request
            .message
            .headers
            .put_generic("Session", "nosuchsession00");
        resolver.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::SessionNotFound);

        let mut ctx = context(Method::Play);
        ctx.request
            .message
            .headers
            .put_generic("Session", uid.as_str());
        resolver.serve(&mut ctx).await;
        assert_eq!(ctx.response.status(), Status::Ok);
        assert_eq!(ctx.session.unwrap().uid, uid);
    }

    #[tokio::test]
    async fn finalize_sets_connection_and_content_length() {
        let mut ctx = context(Method::Options);
        FinalizeHeaders.serve(&mut ctx).await;
        assert_eq!(
            ctx.response.message.headers.value_of("Connection").unwrap(),
            "close"
        );
        assert!(ctx.response.message.headers.get("Content-Length").is_none());

        let mut ctx = context(Method::Options);
        ctx.response.set_body(b"hello");
        FinalizeHeaders.serve(&mut ctx).await;
        assert_eq!(
            ctx.response
                .message
                .headers
                .value_of("Content-Length")
                .unwrap(),
            "5"
        );
    }
}
