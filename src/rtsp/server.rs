//! The RTSP control server: TCP listener, per-connection serve loop, and the
//! method handlers behind the dispatch chain.
//!
//! Each accepted connection carries exactly one request: read it, run it
//! through the handler chain, write the response, close. `Connection: close`
//! is forced on every response, which keeps the per-connection state surface
//! to a single request/response exchange.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::error::{PicastError, Result};
use crate::media::{MediaUid, SharedManifest};
use crate::rtsp::handler::{
    finalize_headers, FinalizeHeaders, Handler, MethodMux, Middleware, MirrorCseq, RequestContext,
    ResolveSession,
};
use crate::rtsp::header::{names, HeaderLine};
use crate::rtsp::host::{RtpStreamHost, SetupArgs};
use crate::rtsp::message::{Request, Response};
use crate::rtsp::method::Method;
use crate::rtsp::session::{Session, SessionRegistry};
use crate::rtsp::state::{StreamState, StreamStateKind};
use crate::rtsp::status::Status;
use crate::runtime::{Actor, Cause, InterruptLatch};

/// The RTSP control server actor.
///
/// Owns the listener and the session registry, and drives the RTP data
/// plane through the [`RtpStreamHost`] contract.
pub struct RtspServer {
    local_addr: SocketAddr,
    listener: StdMutex<Option<TcpListener>>,
    registry: Arc<SessionRegistry>,
    chain: Arc<dyn Handler>,
    latch: InterruptLatch,
}

impl RtspServer {
    /// Binds the control listener and assembles the dispatch chain.
    pub async fn bind(
        addr: &str,
        manifest: SharedManifest,
        registry: Arc<SessionRegistry>,
        rtp: Arc<dyn RtpStreamHost>,
    ) -> Result<RtspServer> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let mut mux = MethodMux::new();
        mux.handle(
            Method::Setup,
            Box::new(SetupHandler {
                manifest: manifest.clone(),
                registry: registry.clone(),
                rtp: rtp.clone(),
            }),
        );
        mux.handle(
            Method::Teardown,
            Box::new(TeardownHandler {
                registry: registry.clone(),
                rtp: rtp.clone(),
            }),
        );
        mux.handle(Method::Play, Box::new(PlayHandler { rtp: rtp.clone() }));
        mux.handle(Method::Pause, Box::new(PauseHandler { rtp }));
        mux.handle(Method::Options, Box::new(OptionsHandler));

        // Built bottom-up: the mux runs only after CSeq mirroring and
        // session resolution both left the response OK.
        let chain: Arc<dyn Handler> = Arc::new(Middleware::new(
            Box::new(MirrorCseq),
            Box::new(Middleware::new(
                Box::new(ResolveSession::new(registry.clone())),
                Box::new(mux),
            )),
        ));

        Ok(RtspServer {
            local_addr,
            listener: StdMutex::new(Some(listener)),
            registry,
            chain,
            latch: InterruptLatch::new(),
        })
    }

    /// The address the control listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The session registry this server owns.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Accepts and serves connections until interrupted.
    pub async fn run(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .map_err(|_| PicastError::Protocol("RTSP listener lock poisoned".into()))?
            .take()
            .ok_or_else(|| PicastError::Protocol("RTSP server already running".into()))?;

        info!("RTSP server listening on {}", self.local_addr);

        loop {
            tokio::select! {
                cause = self.latch.wait() => {
                    info!("RTSP server shutting down: {cause}");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let chain = self.chain.clone();
                        tokio::spawn(serve_connection(chain, stream, peer));
                    }
                    Err(e) => {
                        warn!("RTSP listener accept error: {e}");
                    }
                }
            }
        }
    }

    /// Stops the accept loop and drops every live session; idempotent.
    pub fn interrupt(&self, cause: Cause) {
        if self.latch.interrupt(cause.clone()) {
            info!("interrupting RTSP server: {cause}");

            let registry = self.registry.clone();
            tokio::spawn(async move {
                let drained = registry.drain().await;
                if !drained.is_empty() {
                    debug!("dropped {} live sessions on shutdown", drained.len());
                }
            });
        }
    }
}

#[async_trait]
impl Actor for RtspServer {
    fn name(&self) -> &'static str {
        "rtsp"
    }

    async fn run(&self) -> Result<()> {
        RtspServer::run(self).await
    }

    fn interrupt(&self, cause: Cause) {
        RtspServer::interrupt(self, cause)
    }
}

/// Reads exactly one request off the connection.
async fn read_request(stream: &mut TcpStream) -> Result<Request> {
    let mut reader = BufReader::new(stream);
    let mut raw = String::new();

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(PicastError::Protocol(
                "connection closed before request was complete".into(),
            ));
        }
        raw.push_str(&line);
        if line == "\r\n" {
            break;
        }
    }

    let mut request = Request::parse(&raw)?;

    if let Some(value) = request.message.headers.value_of(names::CONTENT_LENGTH) {
        let content_length: usize = value.trim().parse()?;
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        request.message.body = body;
    }

    Ok(request)
}

async fn write_response(stream: &mut TcpStream, response: &Response, peer: SocketAddr) {
    let buf = response.marshal();
    if let Err(e) = stream.write_all(&buf).await {
        warn!("RTSP write error to {peer}: {e}");
        return;
    }
    if let Err(e) = stream.flush().await {
        warn!("RTSP write error to {peer}: {e}");
        return;
    }
    debug!("wrote RTSP response to {peer} ({response})");
}

async fn serve_connection(chain: Arc<dyn Handler>, mut stream: TcpStream, peer: SocketAddr) {
    debug!("serving RTSP to {peer}");

    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(e @ (PicastError::Parser(_) | PicastError::ParseInt(_))) => {
            // The request never parsed; answer 400 without dispatching.
            let mut response = Response::new(Status::BadRequest);
            response.set_body(e.to_string().as_bytes());
            finalize_headers(&mut response);
            write_response(&mut stream, &response, peer).await;
            return;
        }
        Err(e) => {
            warn!("RTSP read error from {peer}: {e}");
            return;
        }
    };

    info!(
        "handling RTSP request from {peer} ({} {})",
        request.line.method, request.line.uri
    );

    let mut ctx = RequestContext::new(peer, request);
    chain.serve(&mut ctx).await;
    FinalizeHeaders.serve(&mut ctx).await;

    write_response(&mut stream, &ctx.response, peer).await;
}

/// Extracts the media uid from a `media/{uid}` request path.
///
/// Any other shape is a status: wrong segment count is `404`, a non-media
/// prefix is `405`.
fn media_uid_from_path(uri: &Url) -> std::result::Result<MediaUid, Status> {
    let path = uri.path().trim_matches(|c| c == '/' || c == ' ');
    let segments: Vec<&str> = path.split('/').collect();

    if segments.len() != 2 {
        return Err(Status::NotFound);
    }
    if segments[0] != "media" {
        return Err(Status::MethodNotAllowed);
    }

    Ok(MediaUid::from(segments[1]))
}

struct SetupHandler {
    manifest: SharedManifest,
    registry: Arc<SessionRegistry>,
    rtp: Arc<dyn RtpStreamHost>,
}

#[async_trait]
impl Handler for SetupHandler {
    async fn serve(&self, ctx: &mut RequestContext) {
        let media_uid = match media_uid_from_path(&ctx.request.line.uri) {
            Ok(uid) => uid,
            Err(status) => {
                ctx.response.set_status(status);
                return;
            }
        };

        let Some(metadata) = self.manifest.get(&media_uid).await else {
            ctx.response.set_status(Status::NotFound);
            return;
        };

        let Some(transports) = ctx.request.message.headers.transports() else {
            ctx.response.set_status(Status::BadRequest);
            return;
        };
        if transports.is_empty() {
            ctx.response.set_status(Status::BadRequest);
            return;
        }

        let Some(track) = metadata.structure.primary_track().cloned() else {
            warn!("media {media_uid} has no tracks to set up");
            ctx.response.set_status(Status::InternalServerError);
            return;
        };

        let session = Arc::new(Session::new(media_uid));
        let mut stream = StreamState::new();

        let args = SetupArgs {
            stream_uid: stream.uid.clone(),
            remote_addr: ctx.remote_addr,
            structure: metadata.structure.clone(),
            track: track.clone(),
            acceptable_transports: transports.to_vec(),
        };

        let chosen = match self.rtp.setup_stream(args).await {
            Ok(chosen) => chosen,
            Err(e) => {
                warn!("RTP stream setup failed: {e}");
                ctx.response.set_status(Status::InternalServerError);
                return;
            }
        };

        stream.advance(Method::Setup);
        session.insert_track(track.id.clone(), stream).await;
        self.registry.add(session.clone()).await;

        info!(
            "session {} created via SETUP for media {} (client {})",
            session.uid, session.content_uid, ctx.remote_addr
        );

        ctx.response
            .message
            .headers
            .put_generic(names::SESSION, session.uid.as_str());
        ctx.response
            .message
            .headers
            .put(HeaderLine::transport(vec![chosen]));

        ctx.session = Some(session);
    }
}

struct TeardownHandler {
    registry: Arc<SessionRegistry>,
    rtp: Arc<dyn RtpStreamHost>,
}

#[async_trait]
impl Handler for TeardownHandler {
    async fn serve(&self, ctx: &mut RequestContext) {
        let media_uid = match media_uid_from_path(&ctx.request.line.uri) {
            Ok(uid) => uid,
            Err(status) => {
                ctx.response.set_status(status);
                return;
            }
        };

        let Some(session) = ctx.session.clone() else {
            ctx.response.set_status(Status::SessionNotFound);
            return;
        };

        if session.content_uid != media_uid {
            ctx.response.set_status(Status::NotFound);
            return;
        }

        let tracks = session.tracks().await;
        if tracks.is_empty() {
            ctx.response.set_status(Status::NotFound);
            return;
        }

        // Validate every track before touching any stream.
        for (_, stream) in &tracks {
            if stream.state.after(Method::Teardown) == StreamStateKind::Error {
                ctx.response.set_status(Status::MethodNotValidInThisState);
                return;
            }
        }

        for (track, stream) in &tracks {
            self.rtp.teardown_stream(&stream.uid).await;
            session.advance_track(track, Method::Teardown).await;
        }

        self.registry.remove(&session.uid).await;
        info!("session {} terminated via TEARDOWN", session.uid);
    }
}

struct PlayHandler {
    rtp: Arc<dyn RtpStreamHost>,
}

#[async_trait]
impl Handler for PlayHandler {
    async fn serve(&self, ctx: &mut RequestContext) {
        serve_delivery_toggle(&*self.rtp, ctx, Method::Play).await
    }
}

struct PauseHandler {
    rtp: Arc<dyn RtpStreamHost>,
}

#[async_trait]
impl Handler for PauseHandler {
    async fn serve(&self, ctx: &mut RequestContext) {
        serve_delivery_toggle(&*self.rtp, ctx, Method::Pause).await
    }
}

/// Shared PLAY/PAUSE handling: validate the state transition on every track,
/// then advance and notify the RTP side.
///
/// Packet production is not wired up yet, so delivery itself does not start
/// or stop; the state machine and the RTP hooks are exercised regardless.
async fn serve_delivery_toggle(rtp: &dyn RtpStreamHost, ctx: &mut RequestContext, method: Method) {
    let media_uid = match media_uid_from_path(&ctx.request.line.uri) {
        Ok(uid) => uid,
        Err(status) => {
            ctx.response.set_status(status);
            return;
        }
    };

    let Some(session) = ctx.session.clone() else {
        ctx.response.set_status(Status::SessionNotFound);
        return;
    };

    if session.content_uid != media_uid {
        ctx.response.set_status(Status::NotFound);
        return;
    }

    let tracks = session.tracks().await;
    if tracks.is_empty() {
        ctx.response.set_status(Status::MethodNotValidInThisState);
        return;
    }

    for (_, stream) in &tracks {
        if stream.state.after(method) == StreamStateKind::Error {
            ctx.response.set_status(Status::MethodNotValidInThisState);
            return;
        }
    }

    for (track, stream) in &tracks {
        match method {
            Method::Play => rtp.play_stream(&stream.uid).await,
            Method::Pause => rtp.pause_stream(&stream.uid).await,
            _ => {}
        }
        session.advance_track(track, method).await;
    }
}

struct OptionsHandler;

#[async_trait]
impl Handler for OptionsHandler {
    async fn serve(&self, ctx: &mut RequestContext) {
        ctx.response.message.headers.put_generic(
            names::PUBLIC,
            "OPTIONS, SETUP, PLAY, PAUSE, TEARDOWN",
        );
    }
}
