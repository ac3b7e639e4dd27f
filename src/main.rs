//! picast media server binary.
//!
//! Wires the four actors (RTSP control, RTP sender, HTTP manifest, console)
//! under the supervisor group, plus a signal trap so ctrl-c shuts the whole
//! process down with a cause.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use picast::cli::Cli;
use picast::config;
use picast::http::HttpServer;
use picast::media::manifest::FileManifest;
use picast::media::{ingest, SharedManifest};
use picast::rtp::RtpServer;
use picast::rtsp::{RtspServer, SessionRegistry};
use picast::runtime::{ActorGroup, SignalTrap};
use picast::utils::fileio;
use picast::Result;

fn media_paths() -> Result<(PathBuf, PathBuf)> {
    // Data lives next to the executable unless overridden.
    let media_dir = match config::media_dir_override() {
        Some(dir) => dir,
        None => {
            let exe = std::env::current_exe()?;
            let exe_dir = exe
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            exe_dir.join("media")
        }
    };
    let manifest_path = media_dir.join("manifest.json");
    Ok((media_dir, manifest_path))
}

fn load_manifest(manifest_path: &PathBuf) -> Result<SharedManifest> {
    let was_created = fileio::touch_file(manifest_path)?;

    let manifest = if was_created {
        info!(
            "no manifest found at {}, starting a new one",
            manifest_path.display()
        );
        FileManifest::new()
    } else {
        info!("using manifest file at {}", manifest_path.display());
        let buf = std::fs::read(manifest_path)?;
        if buf.iter().all(u8::is_ascii_whitespace) {
            FileManifest::new()
        } else {
            FileManifest::from_json(&buf)?
        }
    };

    Ok(Arc::new(manifest))
}

async fn run() -> Result<()> {
    // ffmpeg + ffprobe are required for ingest; absence is fatal.
    if let Err(e) = ingest::ensure_tools_on_path().await {
        eprintln!("could not locate ffmpeg and/or ffprobe in PATH; verify ffmpeg installation");
        return Err(e);
    }

    let (media_dir, manifest_path) = media_paths()?;
    let manifest = load_manifest(&manifest_path)?;
    manifest.save_json(&manifest_path).await?;

    info!("starting picast media server");

    let registry = Arc::new(SessionRegistry::new());
    let rtp = Arc::new(RtpServer::new());
    let rtsp = Arc::new(
        RtspServer::bind(
            &config::rtsp_addr(),
            manifest.clone(),
            registry,
            rtp.clone(),
        )
        .await?,
    );
    let http = Arc::new(HttpServer::new(config::http_addr(), manifest.clone()));
    let console = Arc::new(Cli::new(
        manifest.clone(),
        manifest_path.clone(),
        media_dir,
    ));

    let mut group = ActorGroup::new();
    group.add(Arc::new(SignalTrap::new()));
    group.add(rtsp);
    group.add(rtp);
    group.add(http);
    group.add(console);

    let cause = group.run().await;
    manifest.save_json(&manifest_path).await?;
    info!("picast exited: {cause}");

    // Exit commands and signals are clean shutdowns; anything else is an
    // actor failure.
    if cause.is_cancellation() {
        Ok(())
    } else {
        Err(picast::PicastError::Protocol(format!(
            "server group failed: {cause}"
        )))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("picast failed: {e}");
            eprintln!("picast failed: {e}");
            ExitCode::FAILURE
        }
    }
}
