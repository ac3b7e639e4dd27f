//! The contract the RTSP control plane drives the RTP data plane through.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{StructureInfo, TrackInfo};
use crate::rtsp::header::TransportInfo;
use crate::rtsp::state::StreamUid;

/// Everything the RTP side needs to allocate one track stream.
#[derive(Debug, Clone)]
pub struct SetupArgs {
    /// Identifier for the new stream
    pub stream_uid: StreamUid,
    /// The client's control-connection address; packets go to its IP at the
    /// negotiated client port
    pub remote_addr: SocketAddr,
    /// Structure of the media being streamed
    pub structure: StructureInfo,
    /// The track this stream carries
    pub track: TrackInfo,
    /// Client-proposed transports, most-preferred first
    pub acceptable_transports: Vec<TransportInfo>,
}

/// What the RTSP server needs from the RTP implementation.
#[async_trait]
pub trait RtpStreamHost: Send + Sync {
    /// Allocates a stream and starts its sender. Fails when the stream
    /// identifier is already in use or the remote address cannot be used.
    /// Returns the transport chosen from the acceptable list.
    async fn setup_stream(&self, args: SetupArgs) -> Result<TransportInfo>;

    /// Stops and removes a stream. Unknown identifiers are a no-op.
    async fn teardown_stream(&self, uid: &StreamUid);

    /// Hook for starting delivery on an allocated stream.
    async fn play_stream(&self, uid: &StreamUid);

    /// Hook for pausing delivery on an allocated stream.
    async fn pause_stream(&self, uid: &StreamUid);
}
