//! # Error Types
//!
//! Central error type for the picast media server. Every fallible operation
//! in the crate returns [`Result`], so errors from the protocol layer, the
//! media store, and the data pipeline compose with `?`.
//!
//! Cancellation-shaped errors (`PipelineClosing`, `Cancelled`, `Interrupted`)
//! are not failures: they carry shutdown causes between tasks and are
//! filtered out of user-facing reporting with [`PicastError::is_cancellation`].

use std::num::ParseIntError;
use thiserror::Error;

/// Primary error type for the picast crate.
#[derive(Error, Debug)]
pub enum PicastError {
    /// I/O errors from file or socket operations
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors in the RTSP/RTP protocol layer (bad requests, bad state)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Errors while parsing wire text or structured header values
    #[error("parser error: {0}")]
    Parser(String),

    /// Errors for invalid or malformed data
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Errors from the media store and ingest tooling
    #[error("media error: {0}")]
    Media(String),

    /// Errors that occur during integer parsing
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),

    /// Errors from JSON encoding/decoding of manifests and probe output
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A pipeline is tearing down; carried between stages, never a failure
    #[error("pipeline closing: {0}")]
    PipelineClosing(String),

    /// A blocking operation was cancelled cooperatively
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An actor was interrupted; carries the shutdown cause
    #[error("interrupted: {0}")]
    Interrupted(String),
}

impl PicastError {
    /// True for errors that signal cooperative shutdown rather than failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            PicastError::PipelineClosing(_)
                | PicastError::Cancelled(_)
                | PicastError::Interrupted(_)
        )
    }
}

/// A specialized Result type for picast operations.
pub type Result<T> = std::result::Result<T, PicastError>;
