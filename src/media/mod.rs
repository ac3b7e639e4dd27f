//! Media identity and metadata model.
//!
//! A piece of hosted media (a movie, a song, a live stream) is identified by
//! a [`MediaUid`] and described by [`Metadata`]: human-facing fields plus a
//! [`StructureInfo`] describing its technical track composition. Both the
//! multiplexed (container) and track-based (separate elementary streams)
//! representations are supported.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::random_alphanumeric;

/// ffmpeg/ffprobe ingest tooling
pub mod ingest;

/// JSON manifest store
pub mod manifest;

pub use ingest::StreamSpec;
pub use manifest::{FileManifest, SharedManifest};

/// Unique identifier for an entire standalone or multiplexed media, like a
/// movie, song, or live stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaUid(String);

impl MediaUid {
    /// Generates a fresh identifier from the OS cryptographic random source.
    pub fn generate() -> Self {
        MediaUid(random_alphanumeric(16))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no identifier has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for MediaUid {
    fn from(s: &str) -> Self {
        MediaUid(s.to_string())
    }
}

impl From<String> for MediaUid {
    fn from(s: String) -> Self {
        MediaUid(s)
    }
}

impl fmt::Display for MediaUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fundamental classification of media content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BasicMediaType {
    /// Combined audio and video streams
    #[default]
    #[serde(rename = "av")]
    AudioVideo,
    /// Audio-only content
    #[serde(rename = "a")]
    Audio,
    /// Video-only content
    #[serde(rename = "v")]
    Video,
}

impl BasicMediaType {
    /// The wire/JSON token for this media type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BasicMediaType::AudioVideo => "av",
            BasicMediaType::Audio => "a",
            BasicMediaType::Video => "v",
        }
    }

    /// Parses the wire/JSON token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "av" => Some(BasicMediaType::AudioVideo),
            "a" => Some(BasicMediaType::Audio),
            "v" => Some(BasicMediaType::Video),
            _ => None,
        }
    }
}

/// Functional purpose and requirements of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackRole {
    /// Mandatory audio track
    #[serde(rename = "requiredAudio")]
    RequiredAudio,
    /// Mandatory video track
    #[serde(rename = "requiredVideo")]
    RequiredVideo,
    /// Supplementary audio track
    #[serde(rename = "optionalAudio")]
    OptionalAudio,
    /// Primary audio in audio-only content
    #[serde(rename = "standaloneAudio")]
    StandaloneAudio,
    /// Primary video in video-only content
    #[serde(rename = "standaloneVideo")]
    StandaloneVideo,
    /// Container with multiple elements, usually a/v
    #[default]
    #[serde(rename = "multiplexedContainer")]
    MultiplexedContainer,
}

impl TrackRole {
    /// The wire/JSON token for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackRole::RequiredAudio => "requiredAudio",
            TrackRole::RequiredVideo => "requiredVideo",
            TrackRole::OptionalAudio => "optionalAudio",
            TrackRole::StandaloneAudio => "standaloneAudio",
            TrackRole::StandaloneVideo => "standaloneVideo",
            TrackRole::MultiplexedContainer => "multiplexedContainer",
        }
    }

    /// Parses the wire/JSON token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requiredAudio" => Some(TrackRole::RequiredAudio),
            "requiredVideo" => Some(TrackRole::RequiredVideo),
            "optionalAudio" => Some(TrackRole::OptionalAudio),
            "standaloneAudio" => Some(TrackRole::StandaloneAudio),
            "standaloneVideo" => Some(TrackRole::StandaloneVideo),
            "multiplexedContainer" => Some(TrackRole::MultiplexedContainer),
            _ => None,
        }
    }
}

/// Human-readable, url-safe identifier for a media track
/// (e.g. "main-audio", "commentary", "camera-angle-2").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        TrackId(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        TrackId(s)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Describes a single track within a media: its identifier, functional role,
/// and technical encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Distinguishes between tracks within one media
    pub id: TrackId,

    /// The track's purpose and requirements
    #[serde(rename = "trackRole")]
    pub role: TrackRole,

    /// Codec, bitrate, and dimension metadata from probing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<StreamSpec>,

    /// Elementary tracks inside a multiplexed container track
    #[serde(rename = "multiplexedElements", default)]
    pub multiplexed_elements: Vec<TrackInfo>,
}

/// Technical structure of a media: its multiplexing format and track
/// composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureInfo {
    /// Classifies the media as AV, audio-only, or video-only
    #[serde(rename = "basicContentType")]
    pub basic_content_type: BasicMediaType,

    /// All media tracks, mapped by their identifiers
    pub tracks: HashMap<TrackId, TrackInfo>,
}

impl StructureInfo {
    /// An empty structure with no tracks.
    pub fn new() -> Self {
        StructureInfo::default()
    }

    /// The first top-level track in identifier order.
    ///
    /// Media added through the console carries exactly one top-level track
    /// (a container, or a standalone elementary stream); identifier order
    /// makes the choice stable when more were added later.
    pub fn primary_track(&self) -> Option<&TrackInfo> {
        self.tracks
            .iter()
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, track)| track)
    }
}

/// Descriptive and structural metadata for one hosted media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique content identifier
    #[serde(rename = "id")]
    pub uid: MediaUid,
    /// Human-readable title
    pub title: String,
    /// Content classification
    #[serde(rename = "mediaType")]
    pub media_type: BasicMediaType,
    /// Content category
    pub genre: String,
    /// Runtime in seconds
    pub duration: f64,
    /// Preview image URL
    #[serde(rename = "thumbnailURL")]
    pub thumbnail_url: String,
    /// True for live sources
    #[serde(rename = "isLive")]
    pub is_live: bool,
    /// Track composition
    pub structure: StructureInfo,
}

impl Default for MediaUid {
    fn default() -> Self {
        MediaUid(String::new())
    }
}

impl Metadata {
    /// Empty metadata with a fresh structure.
    pub fn new() -> Self {
        Metadata::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn media_uid_alphabet_and_length() {
        let uid = MediaUid::generate();
        assert_eq!(uid.as_str().len(), 16);
        assert!(uid.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn metadata_json_field_names() {
        let mut meta = Metadata::new();
        meta.uid = MediaUid::from("abc123");
        meta.title = "Big Buck Bunny".into();
        meta.media_type = BasicMediaType::AudioVideo;
        meta.duration = 596.5;
        meta.structure.tracks.insert(
            TrackId::from("container-0"),
            TrackInfo {
                id: TrackId::from("container-0"),
                role: TrackRole::MultiplexedContainer,
                spec: None,
                multiplexed_elements: vec![],
            },
        );

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["id"], "abc123");
        assert_eq!(json["mediaType"], "av");
        assert_eq!(json["thumbnailURL"], "");
        assert_eq!(json["isLive"], false);
        assert_eq!(json["structure"]["basicContentType"], "av");
        assert_eq!(
            json["structure"]["tracks"]["container-0"]["trackRole"],
            "multiplexedContainer"
        );
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let mut meta = Metadata::new();
        meta.uid = MediaUid::generate();
        meta.title = "Night Drive".into();
        meta.media_type = BasicMediaType::Audio;
        meta.genre = "synthwave".into();
        meta.duration = 243.2;
        meta.structure.basic_content_type = BasicMediaType::Audio;
        meta.structure.tracks.insert(
            TrackId::from("main-audio"),
            TrackInfo {
                id: TrackId::from("main-audio"),
                role: TrackRole::StandaloneAudio,
                spec: None,
                multiplexed_elements: vec![],
            },
        );

        let json = serde_json::to_string(&meta).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn primary_track_is_stable_by_id_order() {
        let mut structure = StructureInfo::new();
        for id in ["b-video", "a-audio", "c-subs"] {
            structure.tracks.insert(
                TrackId::from(id),
                TrackInfo {
                    id: TrackId::from(id),
                    ..TrackInfo::default()
                },
            );
        }
        assert_eq!(structure.primary_track().unwrap().id.as_str(), "a-audio");
    }
}
