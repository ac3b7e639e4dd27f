//! ffmpeg/ffprobe ingest tooling.
//!
//! Media added through the console is probed with `ffprobe` and re-encoded
//! with `ffmpeg` into an RTP-friendly MPEG-TS container before it is indexed
//! in the manifest. Both tools are external processes and must be on `PATH`;
//! their absence is fatal at startup.

use std::path::Path;
use std::process::Stdio;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{PicastError, Result};
use crate::media::{
    BasicMediaType, MediaUid, Metadata, StructureInfo, TrackId, TrackInfo, TrackRole,
};

/// Technical description of one elementary stream, as reported by ffprobe.
///
/// Only the fields the server actually indexes are decoded; the rest of the
/// probe output is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Stream index within the container
    #[serde(default)]
    pub index: u32,
    /// Codec short name (e.g. "h264", "aac")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,
    /// "video", "audio", or "subtitle"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_type: Option<String>,
    /// Frame width, video streams only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Frame height, video streams only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Sample rate, audio streams only (ffprobe reports it as a string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<String>,
    /// Channel count, audio streams only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    /// Bit rate in bits per second (ffprobe reports it as a string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<String>,
}

impl StreamSpec {
    fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }
}

/// Container-level fields from ffprobe's `format` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    /// Container format name(s)
    #[serde(default)]
    pub format_name: String,
    /// Total duration in seconds, as a decimal string
    #[serde(default)]
    pub duration: Option<String>,
}

/// Decoded ffprobe output for one input file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeOutput {
    /// Container-level information
    #[serde(default)]
    pub format: ProbeFormat,
    /// One entry per elementary stream
    #[serde(default)]
    pub streams: Vec<StreamSpec>,
}

impl ProbeOutput {
    /// Container duration in seconds, when ffprobe reported one.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.format.duration.as_deref()?.parse().ok()
    }
}

/// Verifies that `ffmpeg` and `ffprobe` resolve on `PATH`.
pub async fn ensure_tools_on_path() -> Result<()> {
    for tool in ["ffmpeg", "ffprobe"] {
        let status = Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|_| {
                PicastError::Media(format!(
                    "could not locate {tool} in PATH; verify ffmpeg installation"
                ))
            })?;
        if !status.success() {
            return Err(PicastError::Media(format!("{tool} -version failed")));
        }
    }
    Ok(())
}

/// Probes `path` with ffprobe and decodes the JSON report.
pub async fn probe(path: &Path) -> Result<ProbeOutput> {
    debug!("probing {}", path.display());

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stderr(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(PicastError::Media(format!(
            "ffprobe failed for {}",
            path.display()
        )));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

/// The ffmpeg argument list that re-encodes `input` into an RTP-optimized
/// MPEG-TS file at `output`: H.264 CBR tuned for zero latency, AAC audio,
/// constant GOP length, no RTCP overhead.
pub fn transcode_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-i".into(), input.display().to_string()];

    const FIXED: &[&str] = &[
        // Keep the first video stream and all audio streams when present.
        "-map", "0:v:0?", "-map", "0:a?",
        // Video: H.264, constant bitrate, low-latency tuning, fixed GOP.
        "-c:v", "libx264",
        "-preset", "fast",
        "-tune", "zerolatency",
        "-b:v", "4000k", "-maxrate", "4000k", "-minrate", "4000k",
        "-bufsize", "8000k",
        "-x264-params", "nal-hrd=cbr:keyint=60:min-keyint=60",
        "-pix_fmt", "yuv420p",
        // Audio: AAC at 256k.
        "-c:a", "aac", "-b:a", "256k",
        "-map_metadata", "0",
        // MPEG-TS output.
        "-f", "mpegts",
        "-mpegts_flags", "no_rtcp",
        "-flags", "+global_header",
        "-y",
    ];
    args.extend(FIXED.iter().map(|s| s.to_string()));
    args.push(output.display().to_string());

    args
}

/// Re-encodes `input` into an RTP-friendly MPEG-TS file at `output`.
pub async fn transcode_to_ts(input: &Path, output: &Path) -> Result<()> {
    info!(
        "converting {} to RTP-optimized MPEG-TS at {}",
        input.display(),
        output.display()
    );

    let status = Command::new("ffmpeg")
        .args(transcode_args(input, output))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    if !status.success() {
        return Err(PicastError::Media(format!(
            "ffmpeg transcode failed for {}",
            input.display()
        )));
    }
    Ok(())
}

/// Builds manifest metadata for a freshly ingested file.
///
/// The result carries exactly one top-level track: a multiplexed container
/// when the probe found two or more elementary streams, otherwise a
/// standalone track for the single stream.
pub fn metadata_from_probe(title: &str, probe: &ProbeOutput) -> Metadata {
    let has_video = probe.streams.iter().any(StreamSpec::is_video);
    let has_audio = probe.streams.iter().any(StreamSpec::is_audio);

    let media_type = match (has_video, has_audio) {
        (true, true) => BasicMediaType::AudioVideo,
        (true, false) => BasicMediaType::Video,
        _ => BasicMediaType::Audio,
    };

    let elements: Vec<TrackInfo> = probe
        .streams
        .iter()
        .map(|spec| {
            let role = if spec.is_video() {
                TrackRole::RequiredVideo
            } else {
                TrackRole::RequiredAudio
            };
            TrackInfo {
                id: TrackId::from(format!("stream-{}", spec.index)),
                role,
                spec: Some(spec.clone()),
                multiplexed_elements: vec![],
            }
        })
        .collect();

    let top_level = if elements.len() >= 2 {
        TrackInfo {
            id: TrackId::from("container-0"),
            role: TrackRole::MultiplexedContainer,
            spec: None,
            multiplexed_elements: elements,
        }
    } else {
        let role = match media_type {
            BasicMediaType::Video => TrackRole::StandaloneVideo,
            _ => TrackRole::StandaloneAudio,
        };
        TrackInfo {
            id: TrackId::from("stream-0"),
            role,
            spec: probe.streams.first().cloned(),
            multiplexed_elements: vec![],
        }
    };

    let mut structure = StructureInfo::new();
    structure.basic_content_type = media_type;
    structure.tracks.insert(top_level.id.clone(), top_level);

    Metadata {
        uid: MediaUid::generate(),
        title: title.to_string(),
        media_type,
        genre: String::new(),
        duration: probe.duration_seconds().unwrap_or(0.0),
        thumbnail_url: String::new(),
        is_live: false,
        structure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_with(streams: Vec<StreamSpec>, duration: Option<&str>) -> ProbeOutput {
        ProbeOutput {
            format: ProbeFormat {
                format_name: "mpegts".into(),
                duration: duration.map(String::from),
            },
            streams,
        }
    }

    fn video_stream(index: u32) -> StreamSpec {
        StreamSpec {
            index,
            codec_name: Some("h264".into()),
            codec_type: Some("video".into()),
            width: Some(1920),
            height: Some(1080),
            ..StreamSpec::default()
        }
    }

    fn audio_stream(index: u32) -> StreamSpec {
        StreamSpec {
            index,
            codec_name: Some("aac".into()),
            codec_type: Some("audio".into()),
            sample_rate: Some("48000".into()),
            channels: Some(2),
            ..StreamSpec::default()
        }
    }

    #[test]
    fn av_container_gets_multiplexed_top_level_track() {
        let meta = metadata_from_probe(
            "movie",
            &probe_with(vec![video_stream(0), audio_stream(1)], Some("596.5")),
        );

        assert_eq!(meta.media_type, BasicMediaType::AudioVideo);
        assert_eq!(meta.duration, 596.5);
        assert_eq!(meta.structure.tracks.len(), 1);

        let track = meta.structure.primary_track().unwrap();
        assert_eq!(track.role, TrackRole::MultiplexedContainer);
        assert_eq!(track.multiplexed_elements.len(), 2);
    }

    #[test]
    fn single_audio_stream_is_standalone() {
        let meta = metadata_from_probe("song", &probe_with(vec![audio_stream(0)], Some("243.2")));

        assert_eq!(meta.media_type, BasicMediaType::Audio);
        let track = meta.structure.primary_track().unwrap();
        assert_eq!(track.role, TrackRole::StandaloneAudio);
        assert!(track.spec.is_some());
        assert!(track.multiplexed_elements.is_empty());
    }

    #[test]
    fn probe_json_decodes_subset() {
        let raw = r#"{
            "format": {"format_name": "mov,mp4", "duration": "12.000000"},
            "streams": [
                {"index": 0, "codec_name": "h264", "codec_type": "video",
                 "width": 1280, "height": 720, "unparsed_field": {"x": 1}},
                {"index": 1, "codec_name": "aac", "codec_type": "audio",
                 "sample_rate": "44100", "channels": 2}
            ]
        }"#;

        let probe: ProbeOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(probe.duration_seconds(), Some(12.0));
        assert_eq!(probe.streams.len(), 2);
        assert_eq!(probe.streams[0].width, Some(1280));
        assert_eq!(probe.streams[1].channels, Some(2));
    }

    #[test]
    fn transcode_args_shape() {
        let args = transcode_args(Path::new("in.mkv"), Path::new("out.ts"));
        assert_eq!(args[0], "-i");
        assert_eq!(args[1], "in.mkv");
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-tune", "zerolatency"]));
        assert!(args.windows(2).any(|w| w == ["-f", "mpegts"]));
        assert_eq!(args.last().unwrap(), "out.ts");
    }
}
