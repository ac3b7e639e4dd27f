//! Interactive console actor.
//!
//! A line-at-a-time REPL over stdin for managing hosted media. Input words
//! are parsed with a clap grammar, so the console gets flag handling and
//! usage errors for free. The read loop is interruptible: a group shutdown
//! cancels a pending read instead of waiting for the user to press enter.

use std::path::PathBuf;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{PicastError, Result};
use crate::media::{ingest, BasicMediaType, MediaUid, Metadata, SharedManifest};
use crate::runtime::{Actor, Cause, InterruptLatch};

#[derive(Parser, Debug)]
#[command(name = "picast", about = "picast media server console")]
struct Console {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Subcommand, Debug)]
enum ConsoleCommand {
    /// Manage media hosted on the picast server
    #[command(visible_alias = "m")]
    Media {
        #[command(subcommand)]
        action: MediaCommand,
    },
    /// Stop the server and exit
    Exit,
}

#[derive(Subcommand, Debug)]
enum MediaCommand {
    /// Add music or video to the media server
    Add {
        /// Path of the media file to add, absolute or relative to the cwd
        #[arg(long, short)]
        path: PathBuf,
        /// Title for the new entry; defaults to the file name
        #[arg(long, short)]
        title: Option<String>,
    },
    /// Remove music or video from the media server
    Remove {
        /// Unique id of the media to remove
        #[arg(long, short)]
        id: String,
    },
    /// Edit music or video metadata hosted on the media server
    Edit {
        /// Unique id of the media to edit
        #[arg(long, short)]
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New genre
        #[arg(long)]
        genre: Option<String>,
    },
    /// List music and/or video hosted on the media server
    List {
        /// Include music
        #[arg(long, short)]
        music: bool,
        /// Include video
        #[arg(long, short)]
        video: bool,
    },
}

/// The console actor.
pub struct Cli {
    manifest: SharedManifest,
    manifest_path: PathBuf,
    media_dir: PathBuf,
    latch: InterruptLatch,
}

impl Cli {
    /// A console over `manifest`, persisting to `manifest_path` and placing
    /// ingested files under `media_dir`.
    pub fn new(manifest: SharedManifest, manifest_path: PathBuf, media_dir: PathBuf) -> Self {
        Cli {
            manifest,
            manifest_path,
            media_dir,
            latch: InterruptLatch::new(),
        }
    }

    /// Runs the REPL until `exit` or interrupt.
    pub async fn run(&self) -> Result<()> {
        info!("running picast console");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("picast> ");
            use std::io::Write;
            let _ = std::io::stdout().flush();

            let line = tokio::select! {
                cause = self.latch.wait() => {
                    info!("picast console stopped: {cause}");
                    return Ok(());
                }
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                // stdin closed; nothing more to read
                info!("picast console input closed");
                return Ok(());
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let words = std::iter::once("picast").chain(line.split_whitespace());
            let command = match Console::try_parse_from(words) {
                Ok(console) => console.command,
                Err(e) => {
                    // clap renders its own usage/error text
                    println!("{e}");
                    continue;
                }
            };

            match command {
                ConsoleCommand::Exit => {
                    return Err(PicastError::Interrupted("console exit".into()));
                }
                ConsoleCommand::Media { action } => {
                    if let Err(e) = self.run_media_command(action).await {
                        error!("{e}");
                        println!("error: {e}");
                    }
                }
            }
        }
    }

    async fn run_media_command(&self, action: MediaCommand) -> Result<()> {
        match action {
            MediaCommand::Add { path, title } => self.media_add(&path, title).await,
            MediaCommand::Remove { id } => self.media_remove(&id).await,
            MediaCommand::Edit { id, title, genre } => self.media_edit(&id, title, genre).await,
            MediaCommand::List { music, video } => self.media_list(music, video).await,
        }
    }

    /// Probes the file, re-encodes it into an RTP-friendly MPEG-TS copy in
    /// the media directory, and indexes the result.
    async fn media_add(&self, path: &PathBuf, title: Option<String>) -> Result<()> {
        let probe = ingest::probe(path).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PicastError::Media(format!("not a file: {}", path.display())))?;
        let title = title.unwrap_or_else(|| file_name.clone());

        let output = self.media_dir.join(format!("{file_name}.ts"));
        ingest::transcode_to_ts(path, &output).await?;

        let metadata = ingest::metadata_from_probe(&title, &probe);
        let uid = metadata.uid.clone();
        self.manifest.put(metadata).await;
        self.manifest.save_json(&self.manifest_path).await?;

        println!("added {title} ({uid})");
        Ok(())
    }

    async fn media_remove(&self, id: &str) -> Result<()> {
        let uid = MediaUid::from(id);
        if !self.manifest.remove(&uid).await {
            return Err(PicastError::Media(format!("no such id: {id}")));
        }
        self.manifest.save_json(&self.manifest_path).await?;
        println!("removed {id}");
        Ok(())
    }

    async fn media_edit(&self, id: &str, title: Option<String>, genre: Option<String>) -> Result<()> {
        let mut patch = Metadata::default();
        patch.uid = MediaUid::from(id);
        patch.title = title.unwrap_or_default();
        patch.genre = genre.unwrap_or_default();

        if !self.manifest.patch(&patch).await {
            return Err(PicastError::Media(format!("no such id: {id}")));
        }
        self.manifest.save_json(&self.manifest_path).await?;
        println!("updated {id}");
        Ok(())
    }

    async fn media_list(&self, music: bool, video: bool) -> Result<()> {
        // No filter flags means list everything.
        let (music, video) = if !music && !video {
            (true, true)
        } else {
            (music, video)
        };

        let mut entries = self.manifest.entries().await;
        entries.sort_by(|a, b| a.title.cmp(&b.title));

        let mut shown = 0;
        for entry in entries {
            let keep = match entry.media_type {
                BasicMediaType::Audio => music,
                BasicMediaType::Video | BasicMediaType::AudioVideo => video,
            };
            if !keep {
                continue;
            }
            println!(
                "{}  [{}]  {}  ({:.0}s)",
                entry.uid,
                entry.media_type.as_str(),
                entry.title,
                entry.duration
            );
            shown += 1;
        }
        if shown == 0 {
            println!("no media");
        }
        Ok(())
    }
}

#[async_trait]
impl Actor for Cli {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn run(&self) -> Result<()> {
        Cli::run(self).await
    }

    fn interrupt(&self, cause: Cause) {
        if self.latch.interrupt(cause.clone()) {
            info!("stopping picast console: {cause}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> std::result::Result<Console, clap::Error> {
        Console::try_parse_from(std::iter::once("picast").chain(line.split_whitespace()))
    }

    #[test]
    fn grammar_accepts_documented_commands() {
        assert!(matches!(
            parse("media add --path movie.mkv").unwrap().command,
            ConsoleCommand::Media {
                action: MediaCommand::Add { .. }
            }
        ));
        assert!(matches!(
            parse("m list --music").unwrap().command,
            ConsoleCommand::Media {
                action: MediaCommand::List { music: true, video: false }
            }
        ));
        assert!(matches!(
            parse("media remove -i abc123").unwrap().command,
            ConsoleCommand::Media {
                action: MediaCommand::Remove { .. }
            }
        ));
        assert!(matches!(parse("exit").unwrap().command, ConsoleCommand::Exit));
    }

    #[test]
    fn grammar_rejects_unknown_words() {
        assert!(parse("explode").is_err());
        assert!(parse("media add").is_err()); // --path is required
        assert!(parse("media list --films").is_err());
    }
}
