//! AIFF / AIFC container
//!
//! Big-endian PCM is written as plain AIFF. Float data and little-endian
//! PCM need AIFC with a compression id (`fl32`, `fl64`, `sowt`).

use std::io::{Read, Seek};

use super::codec::{ByteOrder, SampleCodec};
use super::container::{
    check_shape, chunk_text, clamp_size, pcm_subtype, read_chunk_header, read_exact_at, Layout,
    Patch, PatchValue, Strings,
};
use super::{EngineError, EngineResult, StringField};
use crate::format::{ContainerType, Subtype};

// AIFF format constants (big-endian IDs)
const FORM_ID: &[u8; 4] = b"FORM";
const FORM_TYPE_AIFF: &[u8; 4] = b"AIFF";
const FORM_TYPE_AIFC: &[u8; 4] = b"AIFC";
const FVER_ID: &[u8; 4] = b"FVER";
const COMMON_ID: &[u8; 4] = b"COMM";
const SOUND_DATA_ID: &[u8; 4] = b"SSND";

const AIFF_COMM_SIZE: u32 = 18;
const AIFC_COMM_SIZE: u32 = 24;
const AIFF_SSND_SIZE: u32 = 8;
const AIFC_VERSION_1: u32 = 0xA280_5140;

const STRING_CHUNKS: [([u8; 4], StringField); 4] = [
    (*b"NAME", StringField::Title),
    (*b"AUTH", StringField::Artist),
    (*b"(c) ", StringField::Copyright),
    (*b"ANNO", StringField::Comment),
];

pub const STRING_FIELDS: &[StringField] = &[
    StringField::Title,
    StringField::Artist,
    StringField::Copyright,
    StringField::Comment,
];

/// Common chunk
#[derive(Debug, Clone, Copy)]
struct CommonChunk {
    channels: u16,
    frames: u32,
    bits_per_sample: u16,
    sample_rate: u32,
    compression: [u8; 4],
}

impl CommonChunk {
    fn parse(body: &[u8], aifc: bool) -> EngineResult<Self> {
        if body.len() < AIFF_COMM_SIZE as usize {
            return Err(EngineError::malformed("COMM chunk too small"));
        }
        let be = ByteOrder::Big;
        let compression = if aifc && body.len() >= 22 {
            [body[18], body[19], body[20], body[21]]
        } else {
            *b"NONE"
        };
        Ok(Self {
            channels: be.read_u16(&body[0..2]),
            frames: be.read_u32(&body[2..6]),
            bits_per_sample: be.read_u16(&body[6..8]),
            sample_rate: decode_f80(&body[8..18])?,
            compression,
        })
    }

    fn encoding(&self) -> EngineResult<(Subtype, ByteOrder)> {
        let bits = self.bits_per_sample as u32;
        let encoding = match &self.compression {
            b"NONE" | b"twos" => pcm_subtype(bits, false).map(|s| (s, ByteOrder::Big)),
            b"sowt" if bits > 8 => pcm_subtype(bits, false).map(|s| (s, ByteOrder::Little)),
            b"fl32" | b"FL32" => Some((Subtype::Float, ByteOrder::Big)),
            b"fl64" | b"FL64" => Some((Subtype::Double, ByteOrder::Big)),
            _ => None,
        };
        encoding.ok_or_else(|| {
            EngineError::unsupported(format!(
                "AIFC compression '{}' with {} bits not supported",
                String::from_utf8_lossy(&self.compression),
                bits
            ))
        })
    }
}

/// Encode a sample rate as an 80-bit IEEE 754 extended float
pub fn encode_f80(rate: u32) -> [u8; 10] {
    let mut out = [0u8; 10];
    if rate == 0 {
        return out;
    }
    let value = rate as u64;
    let shift = value.leading_zeros();
    let mantissa = value << shift;
    let exponent = (16383 + 63 - shift) as u16;
    out[0..2].copy_from_slice(&exponent.to_be_bytes());
    out[2..10].copy_from_slice(&mantissa.to_be_bytes());
    out
}

/// Decode an 80-bit extended float sample rate, rounding to whole Hz
pub fn decode_f80(bytes: &[u8]) -> EngineResult<u32> {
    if bytes.len() < 10 {
        return Err(EngineError::malformed("Truncated sample rate"));
    }
    if bytes[0] & 0x80 != 0 {
        return Err(EngineError::malformed("Negative sample rate"));
    }
    let exponent = (((bytes[0] & 0x7F) as i32) << 8) | bytes[1] as i32;
    if exponent == 0x7FFF {
        return Err(EngineError::malformed("Sample rate is not finite"));
    }
    let mut mantissa = [0u8; 8];
    mantissa.copy_from_slice(&bytes[2..10]);
    let mantissa = u64::from_be_bytes(mantissa);
    if mantissa == 0 {
        return Ok(0);
    }
    let value = mantissa as f64 * 2f64.powi(exponent - 16383 - 63);
    if value > u32::MAX as f64 {
        return Err(EngineError::malformed(format!("Sample rate {} out of range", value)));
    }
    Ok(value.round() as u32)
}

pub fn supports(subtype: Subtype, order: ByteOrder) -> bool {
    match subtype {
        Subtype::Pcm16 | Subtype::Pcm24 | Subtype::Pcm32 => true,
        Subtype::PcmS8 | Subtype::Float | Subtype::Double => order == ByteOrder::Big,
        _ => false,
    }
}

fn needs_aifc(subtype: Subtype, order: ByteOrder) -> bool {
    subtype.is_float() || order == ByteOrder::Little
}

fn compression_id(subtype: Subtype, order: ByteOrder) -> &'static [u8; 4] {
    match (subtype, order) {
        (Subtype::Float, _) => b"fl32",
        (Subtype::Double, _) => b"fl64",
        (_, ByteOrder::Little) => b"sowt",
        _ => b"NONE",
    }
}

/// Parse a FORM AIFF/AIFC stream of `len` bytes starting at `base`
pub fn parse<R: Read + Seek>(r: &mut R, base: u64, len: u64) -> EngineResult<(Layout, Strings)> {
    let be = ByteOrder::Big;
    let mut head = [0u8; 12];
    read_exact_at(r, base, &mut head, "FORM header")?;
    if &head[0..4] != FORM_ID {
        return Err(EngineError::malformed("Not an IFF FORM file"));
    }
    let aifc = match &head[8..12] {
        t if t == FORM_TYPE_AIFF => false,
        t if t == FORM_TYPE_AIFC => true,
        _ => return Err(EngineError::malformed("FORM type is neither AIFF nor AIFC")),
    };

    let mut comm: Option<(CommonChunk, u64)> = None;
    let mut ssnd: Option<(u64, u64, u64, u64)> = None;
    let mut strings = Strings::new();

    let mut pos = 12u64;
    while pos + 8 <= len {
        let Some((id, size)) = read_chunk_header(r, base + pos, be)? else {
            break;
        };
        let body_at = pos + 8;
        let size = size as u64;
        match &id {
            COMMON_ID => {
                let mut body = vec![0u8; clamp_size(size, body_at, len).min(64) as usize];
                read_exact_at(r, base + body_at, &mut body, "COMM chunk")?;
                comm = Some((CommonChunk::parse(&body, aifc)?, body_at + 2));
            }
            SOUND_DATA_ID => {
                let mut body = [0u8; AIFF_SSND_SIZE as usize];
                read_exact_at(r, base + body_at, &mut body, "SSND chunk")?;
                let offset = be.read_u32(&body[0..4]) as u64;
                let data_offset = body_at + AIFF_SSND_SIZE as u64 + offset;
                let declared = size.saturating_sub(AIFF_SSND_SIZE as u64 + offset);
                let bytes = clamp_size(declared, data_offset, len);
                let end = (body_at + size + (size & 1)).min(len);
                ssnd = Some((data_offset, bytes, end, offset));
                if bytes < declared {
                    break;
                }
            }
            _ => {
                if let Some((_, field)) = STRING_CHUNKS.iter().find(|(tag, _)| *tag == id) {
                    let mut body = vec![0u8; clamp_size(size, body_at, len) as usize];
                    read_exact_at(r, base + body_at, &mut body, "string chunk")?;
                    strings.insert(*field, chunk_text(&body));
                }
            }
        }
        pos = body_at + size + (size & 1);
    }

    let (comm, frames_at) = comm.ok_or_else(|| EngineError::malformed("No 'COMM' chunk marker."))?;
    let (data_offset, data_bytes, payload_end, ssnd_offset) =
        ssnd.ok_or_else(|| EngineError::malformed("No 'SSND' chunk marker."))?;
    check_shape(comm.channels as u32, comm.sample_rate)?;
    let (subtype, order) = comm.encoding()?;
    let codec = SampleCodec::new(subtype, order)
        .ok_or_else(|| EngineError::unsupported(format!("Unsupported encoding {}", subtype)))?;

    let bytes_per_frame = codec.width() as u64 * comm.channels as u64;
    let data_bytes = data_bytes.min(comm.frames as u64 * bytes_per_frame);

    let layout = Layout {
        container: ContainerType::Aiff,
        codec,
        channels: comm.channels as u32,
        samplerate: comm.sample_rate,
        data_offset,
        data_bytes,
        padded: true,
        payload_end,
        patches: vec![
            Patch::new(4, PatchValue::TotalMinus8, be),
            Patch::new(frames_at, PatchValue::Frames, be),
            Patch::new(
                data_offset - ssnd_offset - AIFF_SSND_SIZE as u64 - 4,
                PatchValue::DataBytes(AIFF_SSND_SIZE as u64 + ssnd_offset),
                be,
            ),
        ],
    };
    Ok((layout, strings))
}

/// Header for a new stream; fills in `layout.patches`
pub fn write_header(layout: &mut Layout) -> Vec<u8> {
    let be = ByteOrder::Big;
    let subtype = layout.codec.subtype();
    let order = layout.codec.order();
    let aifc = needs_aifc(subtype, order);

    let mut out = Vec::with_capacity(72);
    out.extend_from_slice(FORM_ID);
    out.extend_from_slice(&be.u32_bytes(0));
    layout.patches.push(Patch::new(4, PatchValue::TotalMinus8, be));
    out.extend_from_slice(if aifc { FORM_TYPE_AIFC } else { FORM_TYPE_AIFF });

    if aifc {
        out.extend_from_slice(FVER_ID);
        out.extend_from_slice(&be.u32_bytes(4));
        out.extend_from_slice(&be.u32_bytes(AIFC_VERSION_1));
    }

    out.extend_from_slice(COMMON_ID);
    out.extend_from_slice(&be.u32_bytes(if aifc { AIFC_COMM_SIZE } else { AIFF_COMM_SIZE }));
    out.extend_from_slice(&be.u16_bytes(layout.channels as u16));
    layout
        .patches
        .push(Patch::new(out.len() as u64, PatchValue::Frames, be));
    out.extend_from_slice(&be.u32_bytes(0));
    out.extend_from_slice(&be.u16_bytes((layout.codec.width() * 8) as u16));
    out.extend_from_slice(&encode_f80(layout.samplerate));
    if aifc {
        out.extend_from_slice(compression_id(subtype, order));
        // Empty pascal string, padded to even length
        out.extend_from_slice(&[0, 0]);
    }

    out.extend_from_slice(SOUND_DATA_ID);
    layout.patches.push(Patch::new(
        out.len() as u64,
        PatchValue::DataBytes(AIFF_SSND_SIZE as u64),
        be,
    ));
    out.extend_from_slice(&be.u32_bytes(0));
    out.extend_from_slice(&be.u32_bytes(0));
    out.extend_from_slice(&be.u32_bytes(0));
    out
}

/// String chunks for a new stream
pub fn write_trailer(strings: &Strings) -> Vec<u8> {
    let be = ByteOrder::Big;
    let mut out = Vec::new();
    for (tag, field) in STRING_CHUNKS.iter() {
        let Some(text) = strings.get(field) else {
            continue;
        };
        out.extend_from_slice(tag);
        out.extend_from_slice(&be.u32_bytes(text.len() as u32));
        out.extend_from_slice(text.as_bytes());
        if text.len() % 2 == 1 {
            out.push(0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Endianness, FormatWord, StreamInfo};
    use rstest::rstest;
    use std::io::Cursor;

    fn new_header(subtype: Subtype, endian: Endianness) -> (Layout, Vec<u8>) {
        let info = StreamInfo {
            samplerate: 44100,
            channels: 2,
            format: FormatWord::compose(ContainerType::Aiff, subtype, endian),
            ..StreamInfo::default()
        };
        super::super::container::new_layout(&info).unwrap()
    }

    fn finish(layout: &Layout, mut bytes: Vec<u8>, frames: u64) -> Vec<u8> {
        let mut written = layout.clone();
        written.data_bytes = frames * written.bytes_per_frame();
        bytes.resize(bytes.len() + written.data_bytes as usize, 0);
        let total = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);
        written.apply_patches(&mut cursor, 0, total).unwrap();
        cursor.into_inner()
    }

    #[rstest]
    #[case(44100, [0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0])]
    #[case(8000, [0x40, 0x0B, 0xFA, 0x00, 0, 0, 0, 0, 0, 0])]
    #[case(1, [0x3F, 0xFF, 0x80, 0, 0, 0, 0, 0, 0, 0])]
    fn test_f80_known_rates(#[case] rate: u32, #[case] bytes: [u8; 10]) {
        assert_eq!(encode_f80(rate), bytes);
        assert_eq!(decode_f80(&bytes).unwrap(), rate);
    }

    #[test]
    fn test_f80_rejects_non_finite() {
        let mut bytes = encode_f80(48000);
        bytes[0] = 0x7F;
        bytes[1] = 0xFF;
        assert!(decode_f80(&bytes).is_err());
        bytes[0] = 0xC0;
        assert!(decode_f80(&bytes).is_err());
    }

    #[test]
    fn test_plain_aiff_header() {
        let (layout, header) = new_header(Subtype::Pcm16, Endianness::File);
        assert_eq!(&header[8..12], b"AIFF");
        assert_eq!(header.len(), 54);
        assert_eq!(layout.data_offset, 54);
        assert_eq!(layout.codec.order(), ByteOrder::Big);
    }

    #[rstest]
    #[case(Subtype::Float, Endianness::File, b"fl32")]
    #[case(Subtype::Double, Endianness::Big, b"fl64")]
    #[case(Subtype::Pcm24, Endianness::Little, b"sowt")]
    fn test_aifc_header(#[case] subtype: Subtype, #[case] endian: Endianness, #[case] id: &[u8; 4]) {
        let (layout, header) = new_header(subtype, endian);
        assert_eq!(&header[8..12], b"AIFC");
        assert_eq!(header.len(), 72);
        assert_eq!(&header[50..54], id);

        let bytes = finish(&layout, header, 7);
        let len = bytes.len() as u64;
        let (parsed, _) = parse(&mut Cursor::new(bytes), 0, len).unwrap();
        assert_eq!(parsed.codec, layout.codec);
        assert_eq!(parsed.frames(), 7);
        assert_eq!(parsed.samplerate, 44100);
        assert_eq!(parsed.format_word(), FormatWord::compose(ContainerType::Aiff, subtype, endian_reported(endian)));
    }

    fn endian_reported(endian: Endianness) -> Endianness {
        match endian {
            Endianness::Little => Endianness::Little,
            _ => Endianness::File,
        }
    }

    #[test]
    fn test_comm_frames_limit_data() {
        let (layout, header) = new_header(Subtype::Pcm16, Endianness::File);
        let mut bytes = finish(&layout, header, 10);
        // COMM claims fewer frames than SSND holds
        bytes[22..26].copy_from_slice(&6u32.to_be_bytes());
        let len = bytes.len() as u64;
        let (parsed, _) = parse(&mut Cursor::new(bytes), 0, len).unwrap();
        assert_eq!(parsed.frames(), 6);
        assert_eq!(parsed.payload_end, len);
    }

    #[test]
    fn test_string_chunks() {
        let mut strings = Strings::new();
        strings.insert(StringField::Title, "Odd".to_string());
        strings.insert(StringField::Comment, "even".to_string());
        let (layout, header) = new_header(Subtype::Pcm16, Endianness::File);
        let mut bytes = finish(&layout, header, 1);
        bytes.extend_from_slice(&write_trailer(&strings));
        let len = bytes.len() as u64;
        let (_, parsed) = parse(&mut Cursor::new(bytes), 0, len).unwrap();
        assert_eq!(parsed, strings);
    }

    #[test]
    fn test_support_rules() {
        assert!(supports(Subtype::Pcm16, ByteOrder::Little));
        assert!(supports(Subtype::PcmS8, ByteOrder::Big));
        assert!(!supports(Subtype::PcmU8, ByteOrder::Big));
        assert!(!supports(Subtype::Float, ByteOrder::Little));
        assert!(!supports(Subtype::Ulaw, ByteOrder::Big));
    }
}
