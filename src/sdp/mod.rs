//! Declarative SDP attribute binding.
//!
//! SDP (RFC 4566) session descriptions carry `a=key:value` attribute lines.
//! Types that appear as SDP attributes register an explicit schema, a table
//! of `(attribute key, getter, setter)` entries, instead of relying on any
//! runtime introspection. Serialization walks the table; population looks
//! each incoming key up in it and rejects keys the schema does not name.

use crate::error::{PicastError, Result};
use crate::media::{BasicMediaType, Metadata, TrackId, TrackInfo, TrackRole};

/// One SDP key/value attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute key (the part before `:`)
    pub key: String,
    /// Attribute value
    pub value: String,
}

impl Attribute {
    /// Builds an attribute from a key and a value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One entry in a type's attribute schema.
pub struct AttributeSpec<T> {
    /// The SDP attribute key this entry binds
    pub key: &'static str,
    /// Formats the bound field; `None` omits the attribute
    pub get: fn(&T) -> Option<String>,
    /// Parses an attribute value into the bound field
    pub set: fn(&mut T, &str) -> Result<()>,
}

/// Types with a registered SDP attribute schema.
pub trait SdpAttributes: Sized + 'static {
    /// The type's attribute table.
    fn attribute_schema() -> &'static [AttributeSpec<Self>];

    /// Serializes every schema field that currently has a value.
    fn to_attributes(&self) -> Vec<Attribute> {
        Self::attribute_schema()
            .iter()
            .filter_map(|spec| (spec.get)(self).map(|v| Attribute::new(spec.key, v)))
            .collect()
    }

    /// Applies `attributes` to `self` through the schema.
    ///
    /// Fails on the first attribute whose key the schema does not name, or
    /// whose value does not parse for the bound field.
    fn apply_attributes(&mut self, attributes: &[Attribute]) -> Result<()> {
        for attr in attributes {
            let spec = Self::attribute_schema()
                .iter()
                .find(|spec| spec.key == attr.key)
                .ok_or_else(|| {
                    PicastError::Parser(format!(
                        "no schema entry matching the attribute key: {}",
                        attr.key
                    ))
                })?;
            (spec.set)(self, &attr.value).map_err(|e| {
                PicastError::Parser(format!("error converting value for `{}`: {e}", attr.key))
            })?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(PicastError::InvalidData(format!("not a bool: {value}"))),
    }
}

impl SdpAttributes for Metadata {
    fn attribute_schema() -> &'static [AttributeSpec<Self>] {
        const SCHEMA: &[AttributeSpec<Metadata>] = &[
            AttributeSpec {
                key: "id",
                get: |m| Some(m.uid.to_string()),
                set: |m, v| {
                    m.uid = v.into();
                    Ok(())
                },
            },
            AttributeSpec {
                key: "title",
                get: |m| Some(m.title.clone()),
                set: |m, v| {
                    m.title = v.to_string();
                    Ok(())
                },
            },
            AttributeSpec {
                key: "media-type",
                get: |m| Some(m.media_type.as_str().to_string()),
                set: |m, v| {
                    m.media_type = BasicMediaType::parse(v).ok_or_else(|| {
                        PicastError::InvalidData(format!("unknown media type: {v}"))
                    })?;
                    Ok(())
                },
            },
            AttributeSpec {
                key: "genre",
                get: |m| Some(m.genre.clone()),
                set: |m, v| {
                    m.genre = v.to_string();
                    Ok(())
                },
            },
            AttributeSpec {
                key: "duration",
                get: |m| Some(format!("{:.6}", m.duration)),
                set: |m, v| {
                    m.duration = v
                        .parse()
                        .map_err(|_| PicastError::InvalidData(format!("not a number: {v}")))?;
                    Ok(())
                },
            },
            AttributeSpec {
                key: "thumbnail-url",
                get: |m| Some(m.thumbnail_url.clone()),
                set: |m, v| {
                    m.thumbnail_url = v.to_string();
                    Ok(())
                },
            },
            AttributeSpec {
                key: "is-live",
                get: |m| Some(m.is_live.to_string()),
                set: |m, v| {
                    m.is_live = parse_bool(v)?;
                    Ok(())
                },
            },
        ];
        SCHEMA
    }
}

impl SdpAttributes for TrackInfo {
    fn attribute_schema() -> &'static [AttributeSpec<Self>] {
        const SCHEMA: &[AttributeSpec<TrackInfo>] = &[
            AttributeSpec {
                key: "id",
                get: |t| Some(t.id.to_string()),
                set: |t, v| {
                    t.id = TrackId::from(v);
                    Ok(())
                },
            },
            AttributeSpec {
                key: "track-role",
                get: |t| Some(t.role.as_str().to_string()),
                set: |t, v| {
                    t.role = TrackRole::parse(v).ok_or_else(|| {
                        PicastError::InvalidData(format!("unknown track role: {v}"))
                    })?;
                    Ok(())
                },
            },
        ];
        SCHEMA
    }
}
