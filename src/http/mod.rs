//! Read-only HTTP manifest endpoint.
//!
//! `GET /manifest` returns the full uid → metadata mapping as JSON;
//! `GET /manifest/{uid}` returns one entry or 404. Runs as an actor with
//! graceful shutdown on interrupt.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use log::info;

use crate::error::Result;
use crate::media::{MediaUid, Metadata, SharedManifest};
use crate::runtime::{Actor, Cause, InterruptLatch};

/// The HTTP manifest server actor.
pub struct HttpServer {
    bind_addr: String,
    manifest: SharedManifest,
    latch: InterruptLatch,
}

impl HttpServer {
    /// A server for `manifest` listening on `bind_addr` once run.
    pub fn new(bind_addr: impl Into<String>, manifest: SharedManifest) -> Self {
        HttpServer {
            bind_addr: bind_addr.into(),
            manifest,
            latch: InterruptLatch::new(),
        }
    }

    /// Serves the manifest routes until interrupted.
    pub async fn run(&self) -> Result<()> {
        let app = Router::new()
            .route("/manifest", get(get_manifest))
            .route("/manifest/", get(get_manifest))
            .route("/manifest/:uid", get(get_manifest_entry))
            .with_state(self.manifest.clone());

        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;
        info!("HTTP manifest server listening on {}", self.bind_addr);

        let latch = self.latch.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let cause = latch.wait().await;
                info!("HTTP server shutting down: {cause}");
            })
            .await?;

        Ok(())
    }

    /// Stops the server; idempotent.
    pub fn interrupt(&self, cause: Cause) {
        if self.latch.interrupt(cause.clone()) {
            info!("interrupting HTTP server: {cause}");
        }
    }
}

#[async_trait]
impl Actor for HttpServer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn run(&self) -> Result<()> {
        HttpServer::run(self).await
    }

    fn interrupt(&self, cause: Cause) {
        HttpServer::interrupt(self, cause)
    }
}

async fn get_manifest(
    State(manifest): State<SharedManifest>,
) -> Json<std::collections::HashMap<MediaUid, Metadata>> {
    Json(manifest.snapshot().await)
}

async fn get_manifest_entry(
    State(manifest): State<SharedManifest>,
    Path(uid): Path<String>,
) -> std::result::Result<Json<Metadata>, StatusCode> {
    manifest
        .get(&MediaUid::from(uid))
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::manifest::FileManifest;
    use std::sync::Arc as StdArc;

    async fn manifest_fixture() -> SharedManifest {
        let manifest = StdArc::new(FileManifest::new());
        manifest
            .put(Metadata {
                uid: MediaUid::from("abc"),
                title: "Test".into(),
                ..Metadata::default()
            })
            .await;
        manifest
    }

    #[tokio::test]
    async fn entry_lookup_hits_and_misses() {
        let manifest = manifest_fixture().await;

        let ok = get_manifest_entry(State(manifest.clone()), Path("abc".into())).await;
        assert_eq!(ok.unwrap().0.title, "Test");

        let miss = get_manifest_entry(State(manifest), Path("xyz".into())).await;
        assert_eq!(miss.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn full_manifest_serializes_as_mapping() {
        let manifest = manifest_fixture().await;
        let Json(map) = get_manifest(State(manifest)).await;
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&MediaUid::from("abc")));
    }

    #[tokio::test]
    async fn server_runs_and_shuts_down_on_interrupt() {
        let manifest = manifest_fixture().await;
        let server = StdArc::new(HttpServer::new("127.0.0.1:0", manifest));

        let handle = {
            let server = server.clone();
            tokio::spawn(async move { Actor::run(&*server).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Actor::interrupt(
            &*server,
            StdArc::new(crate::error::PicastError::Interrupted("test".into())),
        );

        handle.await.unwrap().unwrap();
    }
}
