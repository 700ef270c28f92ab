//! H.264 bitstream helpers.
//!
//! Containers carry H.264 in AVCC form (length-prefixed NAL units, with an
//! avcC extradata blob holding the parameter sets); the software decoder
//! wants Annex B (start-code delimited). This module parses avcC and
//! converts between the two layouts.

/// Annex B start code (4-byte version)
const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Parsed avcC decoder configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    pub profile: u8,
    pub compatibility: u8,
    pub level: u8,
    /// Size in bytes of the NAL length prefix used by packet payloads (1-4)
    pub nal_length_size: usize,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

impl AvcConfig {
    /// Parse an avcC extradata blob.
    pub fn parse(extradata: &[u8]) -> Option<Self> {
        // [0] version (always 1), [1] profile, [2] compat, [3] level,
        // [4] 0xFC | (nal_length_size - 1), [5] 0xE0 | sps count,
        // then SPS entries, a PPS count byte, PPS entries.
        if extradata.len() < 7 || extradata[0] != 1 {
            return None;
        }

        let nal_length_size = ((extradata[4] & 0x03) + 1) as usize;
        let num_sps = (extradata[5] & 0x1F) as usize;

        let mut offset = 6;
        let mut sps = Vec::with_capacity(num_sps);
        for _ in 0..num_sps {
            sps.push(read_unit(extradata, &mut offset)?);
        }

        let mut pps = Vec::new();
        if offset < extradata.len() {
            let num_pps = extradata[offset] as usize;
            offset += 1;
            for _ in 0..num_pps {
                match read_unit(extradata, &mut offset) {
                    Some(unit) => pps.push(unit),
                    None => break,
                }
            }
        }

        Some(Self {
            profile: extradata[1],
            compatibility: extradata[2],
            level: extradata[3],
            nal_length_size,
            sps,
            pps,
        })
    }

    /// WebCodecs codec string for this configuration ("avc1.PPCCLL").
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile, self.compatibility, self.level
        )
    }

    /// SPS and PPS units concatenated with start codes, ready to feed a
    /// decoder ahead of the first packet.
    pub fn parameter_sets_annexb(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in self.sps.iter().chain(self.pps.iter()) {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(unit);
        }
        out
    }
}

/// Read one 16-bit-length-prefixed unit, advancing `offset`.
fn read_unit(data: &[u8], offset: &mut usize) -> Option<Vec<u8>> {
    if *offset + 2 > data.len() {
        return None;
    }
    let len = u16::from_be_bytes([data[*offset], data[*offset + 1]]) as usize;
    *offset += 2;
    if *offset + len > data.len() {
        return None;
    }
    let unit = data[*offset..*offset + len].to_vec();
    *offset += len;
    Some(unit)
}

/// Convert AVCC (length-prefixed) NAL units to Annex B (start codes).
pub fn avcc_to_annexb(data: &[u8], nal_length_size: usize) -> Vec<u8> {
    if data.is_empty() || nal_length_size == 0 || nal_length_size > 4 {
        return data.to_vec();
    }

    let mut out = Vec::with_capacity(data.len() + 16);
    let mut offset = 0;

    while offset + nal_length_size <= data.len() {
        let mut len = 0usize;
        for &b in &data[offset..offset + nal_length_size] {
            len = (len << 8) | b as usize;
        }
        offset += nal_length_size;

        if len == 0 || offset + len > data.len() {
            break;
        }

        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(&data[offset..offset + len]);
        offset += len;
    }

    out
}

/// Whether the payload already carries Annex B start codes.
pub fn is_annexb(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    (data[0] == 0 && data[1] == 0 && data[2] == 0 && data[3] == 1)
        || (data[0] == 0 && data[1] == 0 && data[2] == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    // avcC: version 1, profile 0x42, compat 0x00, level 0x1e, 4-byte NALs,
    // one SPS [0x67, 0x42, 0x00, 0x1e], one PPS [0x68, 0xce]
    fn sample_avcc() -> Vec<u8> {
        vec![
            0x01, 0x42, 0x00, 0x1e, 0xff, 0xe1, // header, 4-byte NALs, 1 SPS
            0x00, 0x04, 0x67, 0x42, 0x00, 0x1e, // SPS
            0x01, // 1 PPS
            0x00, 0x02, 0x68, 0xce, // PPS
        ]
    }

    #[test]
    fn parses_avcc_extradata() {
        let config = AvcConfig::parse(&sample_avcc()).expect("avcC");
        assert_eq!(config.nal_length_size, 4);
        assert_eq!(config.sps, vec![vec![0x67, 0x42, 0x00, 0x1e]]);
        assert_eq!(config.pps, vec![vec![0x68, 0xce]]);
        assert_eq!(config.codec_string(), "avc1.42001e");
    }

    #[test]
    fn parameter_sets_carry_start_codes() {
        let config = AvcConfig::parse(&sample_avcc()).unwrap();
        let annexb = config.parameter_sets_annexb();
        assert_eq!(&annexb[0..4], &START_CODE);
        assert_eq!(&annexb[4..8], &[0x67, 0x42, 0x00, 0x1e]);
        assert_eq!(&annexb[8..12], &START_CODE);
        assert_eq!(&annexb[12..], &[0x68, 0xce]);
    }

    #[test]
    fn rejects_short_or_foreign_extradata() {
        assert!(AvcConfig::parse(&[]).is_none());
        assert!(AvcConfig::parse(&[0x00, 0x01, 0x02]).is_none());
        // wrong version byte
        assert!(AvcConfig::parse(&[0x02, 0x42, 0x00, 0x1e, 0xff, 0xe0, 0x00]).is_none());
    }

    #[test]
    fn converts_avcc_to_annexb() {
        let avcc = vec![0x00, 0x00, 0x00, 0x05, 0x67, 0x42, 0x00, 0x1e, 0x9a];
        let annexb = avcc_to_annexb(&avcc, 4);
        assert_eq!(&annexb[0..4], &START_CODE);
        assert_eq!(&annexb[4..], &[0x67, 0x42, 0x00, 0x1e, 0x9a]);
    }

    #[test]
    fn detects_annexb_payloads() {
        assert!(is_annexb(&[0x00, 0x00, 0x00, 0x01, 0x67]));
        assert!(is_annexb(&[0x00, 0x00, 0x01, 0x67]));
        assert!(!is_annexb(&[0x00, 0x00, 0x00, 0x05, 0x67])); // AVCC
    }
}
