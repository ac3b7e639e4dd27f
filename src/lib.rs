//! # picast - LAN media server
//!
//! `picast` streams pre-indexed audio/video files to clients on the local
//! network over RTP, coordinated by an RTSP/1.0 (RFC 2326) control channel.
//! It is built as a set of long-lived actors (RTSP control server, RTP
//! sender, HTTP manifest endpoint, interactive console) that communicate
//! through typed channels and shut down together: the first actor to exit
//! interrupts the rest with its exit cause.
//!
//! ## Module Overview
//!
//! - `rtsp`: the control plane: RFC 2326 message codec, per-stream state
//!   machine, session registry, and a middleware-composed method dispatch
//!   pipeline driving a TCP listener
//!
//! - `rtp`: the data plane edge: per-stream UDP senders fed by outgoing
//!   packet channels, coordinated with the RTSP session lifecycle
//!
//! - `pipeline`: a generic backpressured staged data path with throttling,
//!   pausing, fan-out, and cooperative drain on error or shutdown
//!
//! - `media`: media identity, metadata model, the JSON manifest store, and
//!   ffmpeg/ffprobe ingest helpers
//!
//! - `sdp`: declarative attribute schema binding for SDP key/value pairs
//!
//! - `http`: read-only manifest endpoint
//!
//! - `runtime`: the actor contract, one-shot interrupt latches, and the
//!   supervisor group that ties actor lifetimes together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use picast::media::manifest::FileManifest;
//! use picast::rtp::RtpServer;
//! use picast::rtsp::{RtspServer, SessionRegistry};
//! use picast::runtime::ActorGroup;
//!
//! #[tokio::main]
//! async fn main() -> picast::Result<()> {
//!     let manifest = Arc::new(FileManifest::new());
//!     let registry = Arc::new(SessionRegistry::new());
//!     let rtp = Arc::new(RtpServer::new());
//!
//!     let rtsp = RtspServer::bind(
//!         "localhost:8554",
//!         manifest.clone(),
//!         registry,
//!         rtp.clone(),
//!     )
//!     .await?;
//!
//!     let mut group = ActorGroup::new();
//!     group.add(rtp);
//!     group.add(Arc::new(rtsp));
//!     group.run().await;
//!     Ok(())
//! }
//! ```

/// Interactive console actor (media management REPL)
pub mod cli;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// HTTP manifest endpoint
pub mod http;

/// Media identity, metadata, manifest store, and ingest tooling
pub mod media;

/// Backpressured staged data pipeline
pub mod pipeline;

/// RTP packet codec and per-stream UDP sender server
pub mod rtp;

/// RTSP/1.0 control server
pub mod rtsp;

/// Actor contract, interrupt latches, and the supervisor group
pub mod runtime;

/// Declarative SDP attribute binding
pub mod sdp;

/// Common utilities and helper functions
pub mod utils;

pub use error::{PicastError, Result};
