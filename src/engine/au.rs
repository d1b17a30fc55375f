//! Sun/NeXT AU container
//!
//! A fixed 24-byte header followed by the samples. `.snd` marks big-endian
//! data, the byte-swapped `dns.` marks little-endian data.

use std::io::{Read, Seek};

use super::codec::{ByteOrder, SampleCodec};
use super::container::{check_shape, clamp_size, read_exact_at, Layout, Patch, PatchValue, Strings};
use super::{EngineError, EngineResult};
use crate::format::{ContainerType, Subtype};

const DOTSND_MARKER: u32 = 0x2E73_6E64;
const AU_HEADER_SIZE: u32 = 24;
const AU_UNKNOWN_SIZE: u32 = 0xFFFF_FFFF;

const ENCODINGS: [(u32, Subtype); 6] = [
    (2, Subtype::PcmS8),
    (3, Subtype::Pcm16),
    (4, Subtype::Pcm24),
    (5, Subtype::Pcm32),
    (6, Subtype::Float),
    (7, Subtype::Double),
];

pub fn supports(subtype: Subtype) -> bool {
    ENCODINGS.iter().any(|(_, s)| *s == subtype)
}

/// Parse an AU stream of `len` bytes starting at `base`
pub fn parse<R: Read + Seek>(r: &mut R, base: u64, len: u64) -> EngineResult<(Layout, Strings)> {
    let mut head = [0u8; AU_HEADER_SIZE as usize];
    read_exact_at(r, base, &mut head, "AU header")?;
    let order = if ByteOrder::Big.read_u32(&head[0..4]) == DOTSND_MARKER {
        ByteOrder::Big
    } else if ByteOrder::Little.read_u32(&head[0..4]) == DOTSND_MARKER {
        ByteOrder::Little
    } else {
        return Err(EngineError::malformed("Missing .snd marker"));
    };

    let data_offset = order.read_u32(&head[4..8]) as u64;
    let declared = order.read_u32(&head[8..12]);
    let encoding = order.read_u32(&head[12..16]);
    let samplerate = order.read_u32(&head[16..20]);
    let channels = order.read_u32(&head[20..24]);

    if data_offset < AU_HEADER_SIZE as u64 {
        return Err(EngineError::malformed(format!("Data offset {} inside header", data_offset)));
    }
    check_shape(channels, samplerate)?;
    let subtype = ENCODINGS
        .iter()
        .find(|(code, _)| *code == encoding)
        .map(|(_, s)| *s)
        .ok_or_else(|| EngineError::unsupported(format!("AU encoding {} not supported", encoding)))?;
    let codec = SampleCodec::new(subtype, order)
        .ok_or_else(|| EngineError::unsupported(format!("Unsupported encoding {}", subtype)))?;

    let data_bytes = if declared == AU_UNKNOWN_SIZE {
        len.saturating_sub(data_offset)
    } else {
        clamp_size(declared as u64, data_offset, len)
    };

    let layout = Layout {
        container: ContainerType::Au,
        codec,
        channels,
        samplerate,
        data_offset,
        data_bytes,
        padded: false,
        payload_end: data_offset + data_bytes,
        patches: vec![Patch::new(8, PatchValue::DataBytes(0), order)],
    };
    Ok((layout, Strings::new()))
}

/// Header for a new stream; fills in `layout.patches`
pub fn write_header(layout: &mut Layout) -> Vec<u8> {
    let order = layout.codec.order();
    let subtype = layout.codec.subtype();
    let encoding = ENCODINGS
        .iter()
        .find(|(_, s)| *s == subtype)
        .map(|(code, _)| *code)
        .unwrap_or(0);

    let mut out = Vec::with_capacity(AU_HEADER_SIZE as usize);
    out.extend_from_slice(&order.u32_bytes(DOTSND_MARKER));
    out.extend_from_slice(&order.u32_bytes(AU_HEADER_SIZE));
    layout.patches.push(Patch::new(8, PatchValue::DataBytes(0), order));
    out.extend_from_slice(&order.u32_bytes(0));
    out.extend_from_slice(&order.u32_bytes(encoding));
    out.extend_from_slice(&order.u32_bytes(layout.samplerate));
    out.extend_from_slice(&order.u32_bytes(layout.channels));
    out
}
