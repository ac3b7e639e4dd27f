//! RTSP/1.0 control plane (RFC 2326).
//!
//! One request per TCP connection: the server reads a request, runs it
//! through the middleware-composed dispatch chain, writes the response, and
//! closes. `SETUP` allocates an RTP stream through the [`RtpStreamHost`]
//! contract and registers a session; `TEARDOWN` reverses both.

/// Request dispatch: handler trait, middleware, method mux
pub mod handler;

/// Headers and the structured `Transport` codec
pub mod header;

/// The RTP data-plane contract the control plane drives
pub mod host;

/// Request/response wire codec
pub mod message;

/// RTSP method vocabulary
pub mod method;

/// The TCP server and its method handlers
pub mod server;

/// Sessions and the session registry
pub mod session;

/// Per-stream state machine
pub mod state;

/// Status code vocabulary
pub mod status;

pub use handler::{Handler, MethodMux, Middleware, RequestContext};
pub use header::{HeaderLine, Headers, TransportInfo};
pub use host::{RtpStreamHost, SetupArgs};
pub use message::{Message, Request, Response, RTSP_VERSION};
pub use method::Method;
pub use server::RtspServer;
pub use session::{Session, SessionRegistry, SessionUid};
pub use state::{StreamState, StreamStateKind, StreamUid};
pub use status::Status;
