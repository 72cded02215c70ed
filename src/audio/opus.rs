//! Opus packet inspection (RFC 6716 §3.1) and the OpusHead header (RFC 7845 §5.1).

use crate::error::ParseError;

/// Longest legal Opus packet duration.
pub const MAX_PACKET_DURATION_US: u32 = 120_000;

/// Frame duration encoded in a TOC byte, in microseconds.
pub fn frame_duration_us(toc: u8) -> u32 {
    let config = toc >> 3;
    match config {
        // SILK: 10, 20, 40, 60 ms
        0..=11 => [10_000, 20_000, 40_000, 60_000][usize::from(config % 4)],
        // Hybrid: 10, 20 ms
        12..=15 => [10_000, 20_000][usize::from(config % 2)],
        // CELT: 2.5, 5, 10, 20 ms
        _ => [2_500, 5_000, 10_000, 20_000][usize::from(config % 4)],
    }
}

/// Number of frames in a packet, or `None` if the packet is too short or
/// declares zero frames.
pub fn frame_count(packet: &[u8]) -> Option<u32> {
    let toc = *packet.first()?;
    match toc & 0x03 {
        0 => Some(1),
        1 | 2 => Some(2),
        _ => {
            let count = u32::from(*packet.get(1)? & 0x3F);
            (count > 0).then_some(count)
        }
    }
}

/// Total packet duration in microseconds, if the TOC is usable.
pub fn packet_duration_us(packet: &[u8]) -> Option<u32> {
    let toc = *packet.first()?;
    let duration = frame_duration_us(toc).checked_mul(frame_count(packet)?)?;
    (duration <= MAX_PACKET_DURATION_US).then_some(duration)
}

/// Packet duration in seconds.
pub fn packet_duration(packet: &[u8]) -> Option<f64> {
    packet_duration_us(packet).map(|us| f64::from(us) / 1_000_000.0)
}

/// Opus identification header stored in CodecPrivate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl OpusHead {
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < 19 || !data.starts_with(b"OpusHead") {
            return Err(ParseError::malformed("CodecPrivate is not an OpusHead"));
        }
        Ok(Self {
            version: data[8],
            channels: data[9],
            pre_skip: u16::from_le_bytes([data[10], data[11]]),
            input_sample_rate: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            output_gain: i16::from_le_bytes([data[16], data[17]]),
            mapping_family: data[18],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webm::fixture;

    #[test]
    fn test_frame_duration_by_mode() {
        assert_eq!(frame_duration_us(0xF8), 20_000); // CELT config 31
        assert_eq!(frame_duration_us(0x80), 2_500); // CELT config 16
        assert_eq!(frame_duration_us(0x08), 20_000); // SILK config 1
        assert_eq!(frame_duration_us(0x18), 60_000); // SILK config 3
        assert_eq!(frame_duration_us(0x60), 10_000); // Hybrid config 12
        assert_eq!(frame_duration_us(0x68), 20_000); // Hybrid config 13
    }

    #[test]
    fn test_packet_duration_counts_frames() {
        assert_eq!(packet_duration_us(&[0xF8, 0x00]), Some(20_000));
        assert_eq!(packet_duration_us(&[0xF9, 0x00]), Some(40_000));
        // Code 3 with 3 frames of 20ms
        assert_eq!(packet_duration_us(&[0xFB, 0x03]), Some(60_000));
        // Code 3 with 7 frames of 20ms exceeds 120ms
        assert_eq!(packet_duration_us(&[0xFB, 0x07]), None);
        assert_eq!(packet_duration_us(&[0xFB, 0x00]), None);
        assert_eq!(packet_duration_us(&[0xFB]), None);
        assert_eq!(packet_duration_us(&[]), None);
        assert_eq!(packet_duration(&[0xF8]), Some(0.02));
    }

    #[test]
    fn test_parse_opus_head() {
        let head = OpusHead::parse(&fixture::opus_head(2, 48000)).unwrap();
        assert_eq!(head.channels, 2);
        assert_eq!(head.pre_skip, 312);
        assert_eq!(head.input_sample_rate, 48000);
        assert!(OpusHead::parse(b"OpusTags").is_err());
    }
}
