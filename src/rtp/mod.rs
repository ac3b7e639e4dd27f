//! RTP data-plane server: one UDP sender task per live stream.
//!
//! Streams are created by `SETUP` and destroyed by `TEARDOWN` or server
//! interrupt. Each stream owns a channel of outgoing packets consumed by a
//! single sender task, so packets reach the wire in channel order. A send or
//! marshal failure tears the stream down silently; RFC 2326 gives the
//! control channel no way to report it asynchronously.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, RwLock};

use crate::error::{PicastError, Result};
use crate::rtsp::header::TransportInfo;
use crate::rtsp::host::{RtpStreamHost, SetupArgs};
use crate::rtsp::state::StreamUid;
use crate::runtime::{Actor, Cause, InterruptLatch};

/// RTP packet codec
pub mod packet;

pub use packet::RtpPacket;

/// Outgoing-packet channel capacity per stream.
const OUTGOING_PACKET_BUFFER: usize = 32;

/// Producer-side handle for a stream's outgoing packets.
pub type PacketSender = mpsc::Sender<RtpPacket>;

struct TrackStream {
    transport: TransportInfo,
    remote_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    packets_tx: PacketSender,
}

type StreamMap = Arc<RwLock<HashMap<StreamUid, TrackStream>>>;

/// The RTP sender server.
///
/// Driven by the RTSP control plane through [`RtpStreamHost`]; runs as an
/// actor whose `run` simply waits for the interrupt cause.
pub struct RtpServer {
    streams: StreamMap,
    latch: InterruptLatch,
}

impl RtpServer {
    /// A server with no live streams.
    pub fn new() -> Self {
        RtpServer {
            streams: Arc::new(RwLock::new(HashMap::new())),
            latch: InterruptLatch::new(),
        }
    }

    /// True while a sender exists for `uid`.
    pub async fn is_serving(&self, uid: &StreamUid) -> bool {
        self.streams.read().await.contains_key(uid)
    }

    /// The outgoing-packet handle for a live stream.
    ///
    /// Sends fail once the stream is torn down; producers are expected to
    /// stop producing when they observe that.
    pub async fn outgoing(&self, uid: &StreamUid) -> Option<PacketSender> {
        self.streams
            .read()
            .await
            .get(uid)
            .map(|stream| stream.packets_tx.clone())
    }

    /// The transport negotiated for a live stream.
    pub async fn transport(&self, uid: &StreamUid) -> Option<TransportInfo> {
        self.streams
            .read()
            .await
            .get(uid)
            .map(|stream| stream.transport.clone())
    }

    /// Picks the transport to serve from the client's preference list.
    ///
    /// First-match today; the validation point exists so a stricter policy
    /// (profile support, port availability) can land without touching the
    /// SETUP handler.
    fn validate_transport(acceptable: &[TransportInfo]) -> Result<TransportInfo> {
        acceptable
            .first()
            .cloned()
            .ok_or_else(|| PicastError::Protocol("no acceptable transport offered".into()))
    }

    /// Waits for the server to be interrupted.
    pub async fn run(&self) -> Result<()> {
        // Streams come and go under RTSP control; there is nothing to kick
        // off here. Park until the interrupt cause arrives.
        let cause = self.latch.wait().await;
        Err(PicastError::Interrupted(cause.to_string()))
    }

    /// Tears down every stream and publishes the cause; idempotent.
    pub fn interrupt(&self, cause: Cause) {
        if !self.latch.interrupt(cause.clone()) {
            return;
        }
        info!("interrupting RTP server: {cause}");

        let streams = self.streams.clone();
        tokio::spawn(async move {
            let mut streams = streams.write().await;
            for (uid, stream) in streams.drain() {
                debug!("tearing down RTP stream {uid}");
                let _ = stream.stop_tx.send(true);
            }
        });
    }

    /// A receiver that yields the interrupt cause; used by the supervisor.
    pub fn interrupt_cause(&self) -> InterruptLatch {
        self.latch.clone()
    }
}

impl Default for RtpServer {
    fn default() -> Self {
        RtpServer::new()
    }
}

#[async_trait]
impl RtpStreamHost for RtpServer {
    async fn setup_stream(&self, args: SetupArgs) -> Result<TransportInfo> {
        info!(
            "setting up RTP stream {} to {} for track {}",
            args.stream_uid, args.remote_addr, args.track.id
        );

        let transport = Self::validate_transport(&args.acceptable_transports)?;

        // Packets go to the client's IP at its proposed RTP port.
        let remote_addr = SocketAddr::new(args.remote_addr.ip(), transport.client_port_start);

        let mut streams = self.streams.write().await;
        if streams.contains_key(&args.stream_uid) {
            return Err(PicastError::Protocol(format!(
                "stream already exists with id: {}",
                args.stream_uid
            )));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (packets_tx, packets_rx) = mpsc::channel(OUTGOING_PACKET_BUFFER);

        streams.insert(
            args.stream_uid.clone(),
            TrackStream {
                transport: transport.clone(),
                remote_addr,
                stop_tx,
                packets_tx,
            },
        );

        tokio::spawn(stream_track(
            args.stream_uid,
            remote_addr,
            stop_rx,
            packets_rx,
            self.streams.clone(),
        ));

        Ok(transport)
    }

    async fn teardown_stream(&self, uid: &StreamUid) {
        let Some(stream) = self.streams.write().await.remove(uid) else {
            return; // unknown stream, no-op
        };
        let _ = stream.stop_tx.send(true);
        info!("RTP stream {uid} to {} torn down", stream.remote_addr);
    }

    async fn play_stream(&self, uid: &StreamUid) {
        // Delivery is driven by the packet producer bound to the stream;
        // nothing to switch here yet.
        debug!("play requested for RTP stream {uid}");
    }

    async fn pause_stream(&self, uid: &StreamUid) {
        debug!("pause requested for RTP stream {uid}");
    }
}

#[async_trait]
impl Actor for RtpServer {
    fn name(&self) -> &'static str {
        "rtp"
    }

    async fn run(&self) -> Result<()> {
        RtpServer::run(self).await
    }

    fn interrupt(&self, cause: Cause) {
        RtpServer::interrupt(self, cause)
    }
}

/// Per-stream sender task: dials UDP to the client, then forwards outgoing
/// packets until stopped, the producers hang up, or a send fails.
async fn stream_track(
    uid: StreamUid,
    remote_addr: SocketAddr,
    mut stop_rx: watch::Receiver<bool>,
    mut packets_rx: mpsc::Receiver<RtpPacket>,
    streams: StreamMap,
) {
    let socket = match dial_udp(remote_addr).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("RTP stream {uid} failed to dial udp {remote_addr}: {e}");
            remove_stream(&streams, &uid).await;
            return;
        }
    };

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            received = packets_rx.recv() => {
                let Some(packet) = received else {
                    break; // every producer handle dropped
                };
                let wire = match packet.marshal() {
                    Ok(wire) => wire,
                    Err(e) => {
                        warn!("RTP stream {uid} marshal failure: {e}");
                        break;
                    }
                };
                if let Err(e) = socket.send(&wire).await {
                    warn!("RTP stream {uid} send failure to {remote_addr}: {e}");
                    break;
                }
            }
        }
    }

    remove_stream(&streams, &uid).await;
    debug!("RTP stream {uid} to {remote_addr} sender exited");
}

async fn dial_udp(remote_addr: SocketAddr) -> Result<UdpSocket> {
    let bind_addr = if remote_addr.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(remote_addr).await?;
    Ok(socket)
}

async fn remove_stream(streams: &StreamMap, uid: &StreamUid) {
    streams.write().await.remove(uid);
}
