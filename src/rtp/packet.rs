//! RTP packet codec (RFC 3550).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PicastError, Result};

/// One RTP packet: the fixed header, optional CSRC list and extension, and
/// the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RtpPacket {
    /// Protocol version, always 2
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Header extension flag
    pub extension: bool,
    /// Marker bit; payload-type specific
    pub marker: bool,
    /// Payload type identifier
    pub payload_type: u8,
    /// Sequence number, incremented per packet
    pub sequence_number: u16,
    /// Media timestamp in clock-rate units
    pub timestamp: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
    /// Contributing source identifiers (at most 15)
    pub csrc: Vec<u32>,
    /// Header extension: (profile-defined id, data)
    pub extension_data: Option<(u16, Bytes)>,
    /// Media payload
    pub payload: Bytes,
}

impl RtpPacket {
    /// A version-2 packet with no CSRC list, extension, or padding.
    pub fn new(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        marker: bool,
        payload: Bytes,
    ) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension_data: None,
            payload,
        }
    }

    /// Serializes the packet for the wire.
    pub fn marshal(&self) -> Result<Bytes> {
        if self.csrc.len() > 15 {
            return Err(PicastError::InvalidData(format!(
                "csrc list too long: {}",
                self.csrc.len()
            )));
        }
        if let Some((_, data)) = &self.extension_data {
            if data.len() % 4 != 0 {
                return Err(PicastError::InvalidData(
                    "extension data length must be a multiple of 4".into(),
                ));
            }
        }
        if self.payload_type > 0x7f {
            return Err(PicastError::InvalidData(format!(
                "payload type out of range: {}",
                self.payload_type
            )));
        }

        let ext_len = self
            .extension_data
            .as_ref()
            .map(|(_, d)| 4 + d.len())
            .unwrap_or(0);
        let mut buf =
            BytesMut::with_capacity(12 + 4 * self.csrc.len() + ext_len + self.payload.len());

        let mut first = (2u8 << 6) | (self.csrc.len() as u8);
        if self.padding {
            first |= 0x20;
        }
        if self.extension_data.is_some() {
            first |= 0x10;
        }
        buf.put_u8(first);

        let mut second = self.payload_type;
        if self.marker {
            second |= 0x80;
        }
        buf.put_u8(second);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if let Some((id, data)) = &self.extension_data {
            buf.put_u16(*id);
            buf.put_u16((data.len() / 4) as u16);
            buf.put_slice(data);
        }

        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }

    /// Parses a packet from wire bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = data;

        let flags = take_u8(&mut cursor)?;
        if flags >> 6 != 2 {
            return Err(PicastError::InvalidData(format!(
                "unsupported rtp version: {}",
                flags >> 6
            )));
        }
        let padding = flags & 0x20 != 0;
        let has_extension = flags & 0x10 != 0;
        let csrc_len = (flags & 0x0f) as usize;

        let marker_pt = take_u8(&mut cursor)?;

        let sequence_number = take_u16(&mut cursor)?;
        let timestamp = take_u32(&mut cursor)?;
        let ssrc = take_u32(&mut cursor)?;

        let csrc = (0..csrc_len)
            .map(|_| take_u32(&mut cursor))
            .collect::<Result<Vec<u32>>>()
            .map_err(|_| PicastError::InvalidData("truncated csrc list".into()))?;

        let extension_data = if has_extension {
            let id = take_u16(&mut cursor)
                .map_err(|_| PicastError::InvalidData("truncated extension header".into()))?;
            let word_count = take_u16(&mut cursor)
                .map_err(|_| PicastError::InvalidData("truncated extension header".into()))?;
            let body = take_bytes(&mut cursor, word_count as usize * 4)
                .map_err(|_| PicastError::InvalidData("truncated extension data".into()))?;
            Some((id, body))
        } else {
            None
        };

        // With the P bit set, the final octet counts padding bytes to strip
        // from the end of the payload.
        let payload_len = if padding {
            let pad = cursor.last().copied().unwrap_or(0) as usize;
            if pad == 0 || pad > cursor.len() {
                return Err(PicastError::InvalidData("bad padding length".into()));
            }
            cursor.len() - pad
        } else {
            cursor.len()
        };

        Ok(Self {
            version: 2,
            padding,
            extension: has_extension,
            marker: marker_pt & 0x80 != 0,
            payload_type: marker_pt & 0x7f,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_data,
            payload: Bytes::copy_from_slice(&cursor[..payload_len]),
        })
    }
}

fn take_u8(cursor: &mut &[u8]) -> Result<u8> {
    let slice = *cursor;
    let (value, rest) = slice
        .split_first()
        .ok_or_else(|| PicastError::InvalidData("rtp packet too short".into()))?;
    *cursor = rest;
    Ok(*value)
}

fn take_u16(cursor: &mut &[u8]) -> Result<u16> {
    let raw: [u8; 2] = take_array(cursor)?;
    Ok(u16::from_be_bytes(raw))
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32> {
    let raw: [u8; 4] = take_array(cursor)?;
    Ok(u32::from_be_bytes(raw))
}

fn take_array<const N: usize>(cursor: &mut &[u8]) -> Result<[u8; N]> {
    let slice = *cursor;
    if slice.len() < N {
        return Err(PicastError::InvalidData("rtp packet too short".into()));
    }
    let (head, rest) = slice.split_at(N);
    *cursor = rest;
    let mut raw = [0u8; N];
    raw.copy_from_slice(head);
    Ok(raw)
}

fn take_bytes(cursor: &mut &[u8], len: usize) -> Result<Bytes> {
    let slice = *cursor;
    if slice.len() < len {
        return Err(PicastError::InvalidData("rtp packet too short".into()));
    }
    let (head, rest) = slice.split_at(len);
    *cursor = rest;
    Ok(Bytes::copy_from_slice(head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn new_packet_fields() {
        let payload = Bytes::from(vec![1, 2, 3, 4]);
        let packet = RtpPacket::new(96, 1000, 90000, 0x12345678, true, payload.clone());

        assert_eq!(packet.version, 2);
        assert_eq!(packet.payload_type, 96);
        assert_eq!(packet.sequence_number, 1000);
        assert_eq!(packet.timestamp, 90000);
        assert_eq!(packet.ssrc, 0x12345678);
        assert!(packet.marker);
        assert_eq!(packet.payload, payload);
    }

    #[test]
    fn marshal_header_layout() {
        let packet = RtpPacket::new(96, 0x0102, 0x03040506, 0x0708090a, false, Bytes::new());
        let wire = packet.marshal().unwrap();

        assert_eq!(wire.len(), 12);
        assert_eq!(wire[0], 0b1000_0000); // version 2, no padding/ext/csrc
        assert_eq!(wire[1], 96); // no marker
        assert_eq!(&wire[2..4], &[0x01, 0x02]);
        assert_eq!(&wire[4..8], &[0x03, 0x04, 0x05, 0x06]);
        assert_eq!(&wire[8..12], &[0x07, 0x08, 0x09, 0x0a]);
    }

    #[test]
    fn marshal_sets_marker_bit() {
        let packet = RtpPacket::new(96, 1, 2, 3, true, Bytes::new());
        let wire = packet.marshal().unwrap();
        assert_eq!(wire[1], 0x80 | 96);
    }

    #[test]
    fn marshal_parse_round_trip() {
        let mut packet = RtpPacket::new(
            33,
            0xfffe,
            0xdeadbeef,
            0xcafebabe,
            true,
            Bytes::from(vec![9u8; 188]),
        );
        packet.csrc = vec![1, 2, 3];
        packet.extension = true;
        packet.extension_data = Some((0xbede, Bytes::from(vec![0u8; 8])));

        let wire = packet.marshal().unwrap();
        let parsed = RtpPacket::parse(&wire).unwrap();
        assert_eq!(parsed, packet);
    }

    #[quickcheck]
    fn prop_round_trip_simple_packets(
        payload_type: u8,
        seq: u16,
        ts: u32,
        ssrc: u32,
        marker: bool,
        payload: Vec<u8>,
    ) -> bool {
        let packet = RtpPacket::new(
            payload_type & 0x7f,
            seq,
            ts,
            ssrc,
            marker,
            Bytes::from(payload),
        );
        let wire = packet.marshal().unwrap();
        RtpPacket::parse(&wire).unwrap() == packet
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(RtpPacket::parse(&[]).is_err());
        assert!(RtpPacket::parse(&[0u8; 11]).is_err());

        // Version 1 packet.
        let mut wire = vec![0u8; 12];
        wire[0] = 0b0100_0000;
        assert!(RtpPacket::parse(&wire).is_err());

        // CSRC count promises more data than present.
        let mut wire = vec![0u8; 12];
        wire[0] = 0b1000_0011;
        assert!(RtpPacket::parse(&wire).is_err());
    }

    #[test]
    fn marshal_rejects_invalid_fields() {
        let mut packet = RtpPacket::new(96, 0, 0, 0, false, Bytes::new());
        packet.csrc = vec![0; 16];
        assert!(packet.marshal().is_err());

        let mut packet = RtpPacket::new(96, 0, 0, 0, false, Bytes::new());
        packet.extension_data = Some((1, Bytes::from(vec![0u8; 3])));
        assert!(packet.marshal().is_err());

        let mut packet = RtpPacket::new(96, 0, 0, 0, false, Bytes::new());
        packet.payload_type = 0xff;
        assert!(packet.marshal().is_err());
    }
}
