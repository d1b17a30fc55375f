//! RIFF WAVE container
//!
//! Reads PCM (tag 1), IEEE float (tag 3) and WAVE_FORMAT_EXTENSIBLE
//! headers, plus LIST/INFO string chunks. Writes a canonical 44-byte PCM
//! header, or an 18-byte `fmt ` with a `fact` chunk for float data.

use std::io::{Read, Seek};

use super::codec::{ByteOrder, SampleCodec};
use super::container::{
    check_shape, chunk_text, clamp_size, pcm_subtype, read_chunk_header, read_exact_at, Layout,
    Patch, PatchValue, Strings,
};
use super::{EngineError, EngineResult, StringField};
use crate::format::{ContainerType, Subtype};

const RIFF_ID: &[u8; 4] = b"RIFF";
const WAVE_ID: &[u8; 4] = b"WAVE";
const FMT_ID: &[u8; 4] = b"fmt ";
const FACT_ID: &[u8; 4] = b"fact";
const DATA_ID: &[u8; 4] = b"data";
const LIST_ID: &[u8; 4] = b"LIST";
const INFO_ID: &[u8; 4] = b"INFO";

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

// Largest fmt chunk prefix we look at
const FMT_READ_LEN: usize = 40;

const INFO_TAGS: [([u8; 4], StringField); 7] = [
    (*b"INAM", StringField::Title),
    (*b"ICOP", StringField::Copyright),
    (*b"ISFT", StringField::Software),
    (*b"IART", StringField::Artist),
    (*b"ICMT", StringField::Comment),
    (*b"ICRD", StringField::Date),
    (*b"IPRD", StringField::Album),
];

pub const STRING_FIELDS: &[StringField] = &[
    StringField::Title,
    StringField::Copyright,
    StringField::Software,
    StringField::Artist,
    StringField::Comment,
    StringField::Date,
    StringField::Album,
];

/// WAV format chunk
#[derive(Debug, Default, Clone, Copy)]
struct FormatChunk {
    tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

impl FormatChunk {
    fn parse(body: &[u8]) -> EngineResult<Self> {
        if body.len() < 16 {
            return Err(EngineError::malformed("Format chunk too small"));
        }
        let le = ByteOrder::Little;
        let mut tag = le.read_u16(&body[0..2]);
        if tag == WAVE_FORMAT_EXTENSIBLE {
            if body.len() < 26 {
                return Err(EngineError::malformed("WAVE_FORMAT_EXTENSIBLE chunk too small"));
            }
            tag = le.read_u16(&body[24..26]);
        }
        Ok(Self {
            tag,
            channels: le.read_u16(&body[2..4]),
            sample_rate: le.read_u32(&body[4..8]),
            bits_per_sample: le.read_u16(&body[14..16]),
        })
    }

    fn subtype(&self) -> EngineResult<Subtype> {
        let subtype = match (self.tag, self.bits_per_sample) {
            (WAVE_FORMAT_PCM, bits) => pcm_subtype(bits as u32, true),
            (WAVE_FORMAT_IEEE_FLOAT, 32) => Some(Subtype::Float),
            (WAVE_FORMAT_IEEE_FLOAT, 64) => Some(Subtype::Double),
            _ => None,
        };
        subtype.ok_or_else(|| {
            EngineError::unsupported(format!(
                "Unsupported WAV format: tag 0x{:04X}, {} bits",
                self.tag, self.bits_per_sample
            ))
        })
    }
}

pub fn supports(subtype: Subtype, order: ByteOrder) -> bool {
    order == ByteOrder::Little
        && matches!(
            subtype,
            Subtype::PcmU8
                | Subtype::Pcm16
                | Subtype::Pcm24
                | Subtype::Pcm32
                | Subtype::Float
                | Subtype::Double
        )
}

/// Parse a RIFF WAVE stream of `len` bytes starting at `base`
pub fn parse<R: Read + Seek>(r: &mut R, base: u64, len: u64) -> EngineResult<(Layout, Strings)> {
    let le = ByteOrder::Little;
    let mut head = [0u8; 12];
    read_exact_at(r, base, &mut head, "RIFF header")?;
    if &head[0..4] != RIFF_ID || &head[8..12] != WAVE_ID {
        return Err(EngineError::malformed("Not a RIFF WAVE file"));
    }

    let mut fmt: Option<FormatChunk> = None;
    let mut data: Option<(u64, u64, u64)> = None;
    let mut fact_at: Option<u64> = None;
    let mut strings = Strings::new();

    let mut pos = 12u64;
    while pos + 8 <= len {
        let Some((id, size)) = read_chunk_header(r, base + pos, le)? else {
            break;
        };
        let body_at = pos + 8;
        let size = size as u64;
        match &id {
            FMT_ID => {
                let mut body = vec![0u8; (size as usize).min(FMT_READ_LEN)];
                read_exact_at(r, base + body_at, &mut body, "fmt chunk")?;
                fmt = Some(FormatChunk::parse(&body)?);
            }
            FACT_ID if size >= 4 => fact_at = Some(body_at),
            DATA_ID => {
                let bytes = if size == u32::MAX as u64 {
                    len.saturating_sub(body_at)
                } else {
                    clamp_size(size, body_at, len)
                };
                let end = (body_at + bytes + (bytes & 1)).min(len);
                data = Some((body_at, bytes, end));
                if bytes < size {
                    break;
                }
            }
            LIST_ID if size >= 4 => {
                let mut body = vec![0u8; clamp_size(size, body_at, len) as usize];
                read_exact_at(r, base + body_at, &mut body, "LIST chunk")?;
                if body.starts_with(INFO_ID) {
                    parse_info(&body[4..], &mut strings);
                }
            }
            _ => {}
        }
        pos = body_at + size + (size & 1);
    }

    let fmt = fmt.ok_or_else(|| EngineError::malformed("No 'fmt ' chunk marker."))?;
    let (data_offset, data_bytes, payload_end) =
        data.ok_or_else(|| EngineError::malformed("No 'data' chunk marker."))?;
    check_shape(fmt.channels as u32, fmt.sample_rate)?;
    let subtype = fmt.subtype()?;
    let codec = SampleCodec::new(subtype, le)
        .ok_or_else(|| EngineError::unsupported(format!("Unsupported encoding {}", subtype)))?;

    let mut patches = vec![
        Patch::new(4, PatchValue::TotalMinus8, le),
        Patch::new(data_offset - 4, PatchValue::DataBytes(0), le),
    ];
    if let Some(at) = fact_at {
        patches.push(Patch::new(at, PatchValue::Frames, le));
    }

    let layout = Layout {
        container: ContainerType::Wav,
        codec,
        channels: fmt.channels as u32,
        samplerate: fmt.sample_rate,
        data_offset,
        data_bytes,
        padded: true,
        payload_end,
        patches,
    };
    Ok((layout, strings))
}

fn parse_info(mut body: &[u8], strings: &mut Strings) {
    let le = ByteOrder::Little;
    while body.len() >= 8 {
        let id = &body[0..4];
        let size = le.read_u32(&body[4..8]) as usize;
        let text = &body[8..body.len().min(8 + size)];
        if let Some((_, field)) = INFO_TAGS.iter().find(|(tag, _)| tag == id) {
            strings.insert(*field, chunk_text(text));
        }
        let step = 8 + size + (size & 1);
        if step >= body.len() {
            break;
        }
        body = &body[step..];
    }
}

/// Header for a new stream; fills in `layout.patches`
pub fn write_header(layout: &mut Layout) -> Vec<u8> {
    let le = ByteOrder::Little;
    let subtype = layout.codec.subtype();
    let float = subtype.is_float();
    let width = layout.codec.width() as u32;
    let block_align = width * layout.channels;

    let mut out = Vec::with_capacity(58);
    out.extend_from_slice(RIFF_ID);
    out.extend_from_slice(&le.u32_bytes(0));
    layout.patches.push(Patch::new(4, PatchValue::TotalMinus8, le));
    out.extend_from_slice(WAVE_ID);

    out.extend_from_slice(FMT_ID);
    out.extend_from_slice(&le.u32_bytes(if float { 18 } else { 16 }));
    let tag = if float {
        WAVE_FORMAT_IEEE_FLOAT
    } else {
        WAVE_FORMAT_PCM
    };
    out.extend_from_slice(&le.u16_bytes(tag));
    out.extend_from_slice(&le.u16_bytes(layout.channels as u16));
    out.extend_from_slice(&le.u32_bytes(layout.samplerate));
    out.extend_from_slice(&le.u32_bytes(layout.samplerate.saturating_mul(block_align)));
    out.extend_from_slice(&le.u16_bytes(block_align as u16));
    out.extend_from_slice(&le.u16_bytes((width * 8) as u16));

    if float {
        out.extend_from_slice(&le.u16_bytes(0));
        out.extend_from_slice(FACT_ID);
        out.extend_from_slice(&le.u32_bytes(4));
        layout
            .patches
            .push(Patch::new(out.len() as u64, PatchValue::Frames, le));
        out.extend_from_slice(&le.u32_bytes(0));
    }

    out.extend_from_slice(DATA_ID);
    layout
        .patches
        .push(Patch::new(out.len() as u64, PatchValue::DataBytes(0), le));
    out.extend_from_slice(&le.u32_bytes(0));
    out
}

/// LIST/INFO chunk for the strings set on a new stream
pub fn write_trailer(strings: &Strings) -> Vec<u8> {
    let le = ByteOrder::Little;
    let mut info = Vec::new();
    for (tag, field) in INFO_TAGS.iter() {
        let Some(text) = strings.get(field) else {
            continue;
        };
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        info.extend_from_slice(tag);
        info.extend_from_slice(&le.u32_bytes(bytes.len() as u32));
        info.extend_from_slice(&bytes);
        if bytes.len() % 2 == 1 {
            info.push(0);
        }
    }
    if info.is_empty() {
        return info;
    }

    let mut out = Vec::with_capacity(info.len() + 12);
    out.extend_from_slice(LIST_ID);
    out.extend_from_slice(&le.u32_bytes(info.len() as u32 + 4));
    out.extend_from_slice(INFO_ID);
    out.extend_from_slice(&info);
    out
}
