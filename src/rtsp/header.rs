//! RTSP header representation and the structured `Transport` header codec.
//!
//! Headers are a case-sensitive name → line mapping. Most lines stay opaque
//! `(name, value)` pairs; headers with structure the server acts on (today
//! only `Transport`) parse into typed values at read time and format back on
//! write.

use std::collections::HashMap;

use crate::error::{PicastError, Result};

/// Header field names defined by RFC 2326 §12.
pub mod names {
    #![allow(missing_docs)]
    pub const ACCEPT: &str = "Accept";
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
    pub const ACCEPT_LANGUAGE: &str = "Accept-Language";
    pub const ALLOW: &str = "Allow";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const BANDWIDTH: &str = "Bandwidth";
    pub const BLOCKSIZE: &str = "Blocksize";
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const CONFERENCE: &str = "Conference";
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_BASE: &str = "Content-Base";
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    pub const CONTENT_LANGUAGE: &str = "Content-Language";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_LOCATION: &str = "Content-Location";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CSEQ: &str = "CSeq";
    pub const DATE: &str = "Date";
    pub const EXPIRES: &str = "Expires";
    pub const FROM: &str = "From";
    pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
    pub const LAST_MODIFIED: &str = "Last-Modified";
    pub const PROXY_AUTHENTICATE: &str = "Proxy-Authenticate";
    pub const PROXY_REQUIRE: &str = "Proxy-Require";
    pub const PUBLIC: &str = "Public";
    pub const RANGE: &str = "Range";
    pub const REFERER: &str = "Referer";
    pub const REQUIRE: &str = "Require";
    pub const RETRY_AFTER: &str = "Retry-After";
    pub const RTP_INFO: &str = "RTP-Info";
    pub const SCALE: &str = "Scale";
    pub const SESSION: &str = "Session";
    pub const SERVER: &str = "Server";
    pub const SPEED: &str = "Speed";
    pub const TRANSPORT: &str = "Transport";
    pub const UNSUPPORTED: &str = "Unsupported";
    pub const USER_AGENT: &str = "User-Agent";
    pub const VIA: &str = "Via";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
}

/// One client-proposed (or server-chosen) delivery configuration from a
/// `Transport` header.
///
/// Wire form: `RTP/AVP;unicast;client_port=5000-5001`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportInfo {
    /// Transport protocol (e.g. "RTP")
    pub protocol: String,
    /// Transport profile (e.g. "AVP")
    pub profile: String,
    /// Delivery mode ("unicast")
    pub mode: String,
    /// Start of the client port range
    pub client_port_start: u16,
    /// End of the client port range
    pub client_port_end: u16,
}

impl TransportInfo {
    /// A unicast RTP/AVP transport over the given client port range.
    pub fn new_rtp_avp(ports: (u16, u16)) -> Self {
        TransportInfo {
            protocol: "RTP".to_string(),
            profile: "AVP".to_string(),
            mode: "unicast".to_string(),
            client_port_start: ports.0,
            client_port_end: ports.1,
        }
    }

    /// Parses a comma-separated list of transport specs, most-preferred
    /// first.
    pub fn parse_list(value: &str) -> Result<Vec<TransportInfo>> {
        value
            .split(',')
            .map(|spec| Self::parse_single(spec.trim()))
            .collect()
    }

    fn parse_single(spec: &str) -> Result<TransportInfo> {
        let mut fields = spec.split(';');

        let proto_profile = fields
            .next()
            .ok_or_else(|| PicastError::Parser("empty transport spec".into()))?;
        let (protocol, profile) = proto_profile.split_once('/').ok_or_else(|| {
            PicastError::Parser(format!("transport missing protocol/profile: {spec}"))
        })?;
        if protocol.is_empty() || profile.is_empty() {
            return Err(PicastError::Parser(format!(
                "transport missing protocol/profile: {spec}"
            )));
        }

        let mode = fields
            .next()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| PicastError::Parser(format!("transport missing mode: {spec}")))?;

        let ports = fields
            .next()
            .and_then(|f| f.strip_prefix("client_port="))
            .ok_or_else(|| {
                PicastError::Parser(format!("transport missing client_port field: {spec}"))
            })?;
        let (start, end) = ports.split_once('-').ok_or_else(|| {
            PicastError::Parser(format!("client_port is not a range: {ports}"))
        })?;

        Ok(TransportInfo {
            protocol: protocol.to_string(),
            profile: profile.to_string(),
            mode: mode.to_string(),
            client_port_start: start.trim().parse()?,
            client_port_end: end.trim().parse()?,
        })
    }

    /// Formats a transport list back into header-value form.
    pub fn format_list(transports: &[TransportInfo]) -> String {
        transports
            .iter()
            .map(TransportInfo::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for TransportInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{};{};client_port={}-{}",
            self.protocol, self.profile, self.mode, self.client_port_start, self.client_port_end
        )
    }
}

/// One header line, either opaque or parsed into structure.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderLine {
    /// An opaque `Name: value` pair
    Generic {
        /// Field name, case-sensitive
        name: String,
        /// Raw field value
        value: String,
    },
    /// A parsed `Transport` header
    Transport {
        /// Transport specs in client preference order
        transports: Vec<TransportInfo>,
    },
}

impl HeaderLine {
    /// An opaque header line.
    pub fn generic(name: impl Into<String>, value: impl Into<String>) -> Self {
        HeaderLine::Generic {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A structured `Transport` header line.
    pub fn transport(transports: Vec<TransportInfo>) -> Self {
        HeaderLine::Transport { transports }
    }

    /// The header field name.
    pub fn name(&self) -> &str {
        match self {
            HeaderLine::Generic { name, .. } => name,
            HeaderLine::Transport { .. } => names::TRANSPORT,
        }
    }

    /// The header field value in wire form.
    pub fn value(&self) -> String {
        match self {
            HeaderLine::Generic { value, .. } => value.clone(),
            HeaderLine::Transport { transports } => TransportInfo::format_list(transports),
        }
    }

    /// Parses one `Name: value` line, dispatching structured fields to their
    /// dedicated parsers.
    pub fn parse(line: &str) -> Result<HeaderLine> {
        let line = line.trim_matches(|c| c == '\r' || c == '\n' || c == ' ');

        let (name, value) = line
            .split_once(": ")
            .ok_or_else(|| PicastError::Parser("header line not in 'k: v' format".into()))?;

        if name.is_empty() || value.is_empty() {
            return Err(PicastError::Parser(
                "empty name or value in header line".into(),
            ));
        }

        match name {
            names::TRANSPORT => Ok(HeaderLine::Transport {
                transports: TransportInfo::parse_list(value)?,
            }),
            _ => Ok(HeaderLine::generic(name, value)),
        }
    }

    /// Appends this line in wire form, including the trailing `\r\n`.
    pub fn marshal(&self, out: &mut String) {
        out.push_str(self.name());
        out.push_str(": ");
        out.push_str(&self.value());
        out.push_str("\r\n");
    }
}

/// The header block of a request or response.
///
/// Serialization emits lines in no particular order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    lines: HashMap<String, HeaderLine>,
}

impl Headers {
    /// An empty header block.
    pub fn new() -> Self {
        Headers::default()
    }

    /// Parses a header block: lines joined by `\r\n`, no terminating blank
    /// line.
    pub fn parse(block: &str) -> Result<Headers> {
        let mut headers = Headers::new();

        let block = block.trim_matches(|c| c == '\r' || c == '\n');
        if block.is_empty() {
            return Ok(headers);
        }

        for line in block.split("\r\n") {
            headers.put(HeaderLine::parse(line)?);
        }

        Ok(headers)
    }

    /// Inserts a line, replacing any line with the same name.
    pub fn put(&mut self, line: HeaderLine) {
        self.lines.insert(line.name().to_string(), line);
    }

    /// Inserts an opaque line, replacing any line with the same name.
    pub fn put_generic(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.put(HeaderLine::generic(name, value));
    }

    /// Looks up a line by exact (case-sensitive) name.
    pub fn get(&self, name: &str) -> Option<&HeaderLine> {
        self.lines.get(name)
    }

    /// The wire-form value of the named header, if present.
    pub fn value_of(&self, name: &str) -> Option<String> {
        self.get(name).map(HeaderLine::value)
    }

    /// The parsed transport list, when a `Transport` header is present.
    pub fn transports(&self) -> Option<&[TransportInfo]> {
        match self.get(names::TRANSPORT) {
            Some(HeaderLine::Transport { transports }) => Some(transports),
            _ => None,
        }
    }

    /// Removes the named header, returning true iff it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.lines.remove(name).is_some()
    }

    /// Number of header lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when no headers are present.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Appends every line in wire form.
    pub fn marshal(&self, out: &mut String) {
        for line in self.lines.values() {
            line.marshal(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn transport_parse_basic() {
        let list = TransportInfo::parse_list("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(
            list,
            vec![TransportInfo {
                protocol: "RTP".into(),
                profile: "AVP".into(),
                mode: "unicast".into(),
                client_port_start: 5000,
                client_port_end: 5001,
            }]
        );
    }

    #[test]
    fn transport_parse_multiple_preserves_preference_order() {
        let list = TransportInfo::parse_list(
            "RTP/AVP;unicast;client_port=5000-5001, RTP/AVP;unicast;client_port=6000-6001",
        )
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].client_port_start, 5000);
        assert_eq!(list[1].client_port_start, 6000);
    }

    #[test]
    fn transport_parse_rejects_malformed() {
        for bad in [
            "",
            "RTP;unicast;client_port=5000-5001",
            "RTP/AVP",
            "RTP/AVP;unicast",
            "RTP/AVP;unicast;client_port=5000",
            "RTP/AVP;unicast;client_port=abc-def",
            "RTP/AVP;unicast;server_port=5000-5001",
        ] {
            assert!(
                TransportInfo::parse_list(bad).is_err(),
                "expected parse failure for {bad:?}"
            );
        }
    }

    #[test]
    fn transport_format_round_trip() {
        let transports = vec![
            TransportInfo::new_rtp_avp((5000, 5001)),
            TransportInfo::new_rtp_avp((6000, 6001)),
        ];
        let formatted = TransportInfo::format_list(&transports);
        assert_eq!(TransportInfo::parse_list(&formatted).unwrap(), transports);
    }

    #[quickcheck]
    fn prop_transport_list_round_trips(ports: Vec<(u16, u16)>) -> bool {
        if ports.is_empty() {
            return true; // empty header value is a parse error, not a list
        }
        let transports: Vec<TransportInfo> =
            ports.into_iter().map(TransportInfo::new_rtp_avp).collect();
        let formatted = TransportInfo::format_list(&transports);
        TransportInfo::parse_list(&formatted).unwrap() == transports
    }

    #[test]
    fn header_line_parse_generic() {
        let line = HeaderLine::parse("CSeq: 42\r\n").unwrap();
        assert_eq!(line.name(), "CSeq");
        assert_eq!(line.value(), "42");
    }

    #[test]
    fn header_line_parse_rejects_bad_shapes() {
        assert!(HeaderLine::parse("NoSeparator").is_err());
        assert!(HeaderLine::parse(": value").is_err());
        // A colon without the following space is not a separator.
        assert!(HeaderLine::parse("CSeq:42").is_err());
    }

    #[test]
    fn header_line_parse_dispatches_transport() {
        let line = HeaderLine::parse("Transport: RTP/AVP;unicast;client_port=5000-5001").unwrap();
        match &line {
            HeaderLine::Transport { transports } => {
                assert_eq!(transports[0].client_port_start, 5000)
            }
            other => panic!("expected Transport line, got {other:?}"),
        }
        assert_eq!(line.value(), "RTP/AVP;unicast;client_port=5000-5001");
    }

    #[test]
    fn headers_parse_block_and_lookup() {
        let headers =
            Headers::parse("CSeq: 1\r\nSession: abcDEF12\r\nTransport: RTP/AVP;unicast;client_port=5000-5001")
                .unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.value_of("CSeq").unwrap(), "1");
        assert_eq!(headers.transports().unwrap().len(), 1);
        // Names are case-sensitive.
        assert!(headers.get("cseq").is_none());
    }

    #[test]
    fn headers_put_replaces_and_remove_reports() {
        let mut headers = Headers::new();
        headers.put_generic("Connection", "keep-alive");
        headers.put_generic("Connection", "close");
        assert_eq!(headers.value_of("Connection").unwrap(), "close");

        assert!(headers.remove("Connection"));
        assert!(!headers.remove("Connection"));
    }
}
