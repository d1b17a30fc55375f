//! Container layouts shared by the native engine
//!
//! Each container module parses an existing header into a `Layout` and
//! produces a fresh header for new files. Size fields that depend on how
//! much audio ends up in the file are recorded as `Patch`es and rewritten
//! when a writable handle closes.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};

use super::codec::{ByteOrder, SampleCodec};
use super::{aiff, au, wav, EngineError, EngineResult, StringField};
use crate::format::{ContainerType, Endianness, FormatWord, StreamInfo, Subtype};

/// Highest channel count the native engine accepts
pub const MAX_CHANNELS: u32 = 1024;

/// String metadata kept by a handle
pub type Strings = BTreeMap<StringField, String>;

/// Value written into a size field at close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchValue {
    /// Stream length minus the 8-byte outer chunk header
    TotalMinus8,
    /// Audio byte count plus a fixed extra
    DataBytes(u64),
    /// Frame count
    Frames,
}

/// A 32-bit size field at `at` (relative to the stream start)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub at: u64,
    pub value: PatchValue,
    pub order: ByteOrder,
}

impl Patch {
    pub fn new(at: u64, value: PatchValue, order: ByteOrder) -> Self {
        Self { at, value, order }
    }

    /// Field value for the final stream; fails when it does not fit 32 bits
    fn resolve(&self, total: u64, data_bytes: u64, frames: u64) -> EngineResult<u32> {
        let v = match self.value {
            PatchValue::TotalMinus8 => total.saturating_sub(8),
            PatchValue::DataBytes(extra) => data_bytes.saturating_add(extra),
            PatchValue::Frames => frames,
        };
        u32::try_from(v).map_err(|_| {
            EngineError::unsupported(format!(
                "Size field at offset {} cannot hold {} (32-bit header limit)",
                self.at, v
            ))
        })
    }
}

/// Where the audio lives inside a stream and how it is encoded
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub container: ContainerType,
    pub codec: SampleCodec,
    pub channels: u32,
    pub samplerate: u32,
    /// Offset of the first sample, relative to the stream start
    pub data_offset: u64,
    /// Audio bytes present (read) or written so far
    pub data_bytes: u64,
    /// Odd-length data chunks are followed by a pad byte
    pub padded: bool,
    /// End of the data chunk as found in the stream; anything after it is
    /// carried over unchanged when an existing stream is rewritten
    pub payload_end: u64,
    pub patches: Vec<Patch>,
}

impl Layout {
    pub fn bytes_per_frame(&self) -> u64 {
        self.codec.width() as u64 * self.channels as u64
    }

    pub fn frames(&self) -> u64 {
        self.data_bytes / self.bytes_per_frame()
    }

    /// End of the data chunk including any pad byte
    pub fn data_end(&self) -> u64 {
        let end = self.data_offset + self.data_bytes;
        if self.padded && self.data_bytes % 2 == 1 {
            end + 1
        } else {
            end
        }
    }

    /// Format word reported to callers
    pub fn format_word(&self) -> FormatWord {
        let endian = if self.codec.order() == default_order(self.container) {
            Endianness::File
        } else {
            match self.codec.order() {
                ByteOrder::Little => Endianness::Little,
                ByteOrder::Big => Endianness::Big,
            }
        };
        FormatWord::compose(self.container, self.codec.subtype(), endian)
    }

    /// Rewrite every size field for the current amount of audio
    ///
    /// Nothing is written unless every field fits.
    pub fn apply_patches<W: Write + Seek>(&self, w: &mut W, base: u64, total: u64) -> EngineResult<()> {
        let frames = self.frames();
        let values = self
            .patches
            .iter()
            .map(|patch| patch.resolve(total, self.data_bytes, frames))
            .collect::<EngineResult<Vec<u32>>>()?;
        for (patch, value) in self.patches.iter().zip(values) {
            w.seek(SeekFrom::Start(base + patch.at))?;
            w.write_all(&patch.order.u32_bytes(value))?;
        }
        Ok(())
    }
}

/// Byte order a container uses when the format word says `File`
pub fn default_order(container: ContainerType) -> ByteOrder {
    match container {
        ContainerType::Aiff | ContainerType::Au => ByteOrder::Big,
        _ => ByteOrder::Little,
    }
}

fn resolve_order(container: ContainerType, endian: Endianness) -> ByteOrder {
    match endian {
        Endianness::File => default_order(container),
        Endianness::Little => ByteOrder::Little,
        Endianness::Big => ByteOrder::Big,
        Endianness::Cpu => ByteOrder::native(),
    }
}

/// Whether the native engine can write this combination
pub fn supports(info: &StreamInfo) -> bool {
    if info.channels == 0 || info.channels > MAX_CHANNELS || info.samplerate == 0 {
        return false;
    }
    let (container, subtype, endian) = info.format.decompose();
    let order = resolve_order(container, endian);
    match container {
        ContainerType::Wav => wav::supports(subtype, order),
        ContainerType::Aiff => aiff::supports(subtype, order),
        ContainerType::Au => au::supports(subtype),
        ContainerType::Raw => SampleCodec::new(subtype, order).is_some(),
        _ => false,
    }
}

/// Fields a container can store
pub fn string_fields(container: ContainerType) -> &'static [StringField] {
    match container {
        ContainerType::Wav => wav::STRING_FIELDS,
        ContainerType::Aiff => aiff::STRING_FIELDS,
        _ => &[],
    }
}

/// Header bytes and patches for a new stream described by `info`
pub fn new_layout(info: &StreamInfo) -> EngineResult<(Layout, Vec<u8>)> {
    if !supports(info) {
        return Err(EngineError::unsupported(format!(
            "Format not supported: {} with {} channels at {} Hz",
            info.format, info.channels, info.samplerate
        )));
    }
    let (container, subtype, endian) = info.format.decompose();
    let order = resolve_order(container, endian);
    let codec = SampleCodec::new(subtype, order)
        .ok_or_else(|| EngineError::unsupported(format!("Unsupported encoding {}", subtype)))?;
    let mut layout = Layout {
        container,
        codec,
        channels: info.channels,
        samplerate: info.samplerate,
        data_offset: 0,
        data_bytes: 0,
        padded: matches!(container, ContainerType::Wav | ContainerType::Aiff),
        payload_end: 0,
        patches: Vec::new(),
    };
    let header = match container {
        ContainerType::Wav => wav::write_header(&mut layout),
        ContainerType::Aiff => aiff::write_header(&mut layout),
        ContainerType::Au => au::write_header(&mut layout),
        _ => Vec::new(),
    };
    layout.data_offset = header.len() as u64;
    layout.payload_end = layout.data_offset;
    Ok((layout, header))
}

/// Trailing chunks written after the audio data of a new stream
pub fn trailer(container: ContainerType, strings: &Strings) -> Vec<u8> {
    match container {
        ContainerType::Wav => wav::write_trailer(strings),
        ContainerType::Aiff => aiff::write_trailer(strings),
        _ => Vec::new(),
    }
}

/// Parse an existing stream
///
/// `info` is consulted only for RAW data, which has no header to describe it.
pub fn parse<R: Read + Seek>(
    r: &mut R,
    base: u64,
    len: u64,
    info: &StreamInfo,
) -> EngineResult<(Layout, Strings)> {
    let mut magic = [0u8; 12];
    let got = read_at(r, base, &mut magic)?;
    let magic = &magic[..got];

    if magic.len() >= 12 && &magic[0..4] == b"RIFF" && &magic[8..12] == b"WAVE" {
        return wav::parse(r, base, len);
    }
    if magic.len() >= 12 && &magic[0..4] == b"FORM" && (&magic[8..12] == b"AIFF" || &magic[8..12] == b"AIFC") {
        return aiff::parse(r, base, len);
    }
    if magic.len() >= 4 && (&magic[0..4] == b".snd" || &magic[0..4] == b"dns.") {
        return au::parse(r, base, len);
    }
    if info.format.container() == ContainerType::Raw {
        return parse_raw(len, info);
    }
    Err(EngineError::new(
        super::ErrorCode::UnrecognisedFormat,
        "File contains data in an unknown format.",
    ))
}

fn parse_raw(len: u64, info: &StreamInfo) -> EngineResult<(Layout, Strings)> {
    if !supports(info) {
        return Err(EngineError::unsupported(format!(
            "RAW data needs a valid layout, got {} with {} channels at {} Hz",
            info.format, info.channels, info.samplerate
        )));
    }
    let (layout, _) = new_layout(info)?;
    let bpf = layout.bytes_per_frame();
    Ok((
        Layout {
            data_bytes: len - len % bpf,
            payload_end: len,
            ..layout
        },
        Strings::new(),
    ))
}

/// Read up to `buf.len()` bytes at `pos`; returns bytes read
pub fn read_at<R: Read + Seek>(r: &mut R, pos: u64, buf: &mut [u8]) -> EngineResult<usize> {
    r.seek(SeekFrom::Start(pos))?;
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Read exactly `buf.len()` bytes at `pos` or fail as a malformed file
pub fn read_exact_at<R: Read + Seek>(r: &mut R, pos: u64, buf: &mut [u8], what: &str) -> EngineResult<()> {
    if read_at(r, pos, buf)? != buf.len() {
        return Err(EngineError::malformed(format!("Truncated {} at offset {}", what, pos)));
    }
    Ok(())
}

/// Chunk id and body size at `pos`, or `None` when fewer than 8 bytes remain
pub fn read_chunk_header<R: Read + Seek>(
    r: &mut R,
    pos: u64,
    order: ByteOrder,
) -> EngineResult<Option<([u8; 4], u32)>> {
    let mut head = [0u8; 8];
    if read_at(r, pos, &mut head)? < head.len() {
        return Ok(None);
    }
    let id = [head[0], head[1], head[2], head[3]];
    Ok(Some((id, order.read_u32(&head[4..8]))))
}

/// Bytes from `offset` to the end of the stream, clamped when a header
/// claims more than is present
pub fn clamp_size(declared: u64, offset: u64, len: u64) -> u64 {
    declared.min(len.saturating_sub(offset))
}

/// Text of a string chunk: stops at the first NUL, lossy UTF-8
pub fn chunk_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

/// Check channel and rate fields common to every header
pub fn check_shape(channels: u32, samplerate: u32) -> EngineResult<()> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(EngineError::malformed(format!("Bad channel count {}", channels)));
    }
    if samplerate == 0 {
        return Err(EngineError::malformed("Sample rate is zero"));
    }
    Ok(())
}

/// Subtype for a linear PCM sample width
pub fn pcm_subtype(bits: u32, unsigned_8bit: bool) -> Option<Subtype> {
    match bits {
        8 if unsigned_8bit => Some(Subtype::PcmU8),
        8 => Some(Subtype::PcmS8),
        16 => Some(Subtype::Pcm16),
        24 => Some(Subtype::Pcm24),
        32 => Some(Subtype::Pcm32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn info(container: ContainerType, subtype: Subtype, endian: Endianness) -> StreamInfo {
        StreamInfo {
            samplerate: 8000,
            channels: 1,
            format: FormatWord::compose(container, subtype, endian),
            ..StreamInfo::default()
        }
    }

    #[test]
    fn test_supports_matrix() {
        assert!(supports(&info(ContainerType::Wav, Subtype::Pcm16, Endianness::File)));
        assert!(supports(&info(ContainerType::Wav, Subtype::PcmU8, Endianness::File)));
        assert!(!supports(&info(ContainerType::Wav, Subtype::PcmS8, Endianness::File)));
        assert!(!supports(&info(ContainerType::Wav, Subtype::Pcm16, Endianness::Big)));
        assert!(supports(&info(ContainerType::Aiff, Subtype::PcmS8, Endianness::File)));
        assert!(!supports(&info(ContainerType::Aiff, Subtype::PcmU8, Endianness::File)));
        assert!(supports(&info(ContainerType::Au, Subtype::Double, Endianness::File)));
        assert!(supports(&info(ContainerType::Raw, Subtype::Pcm24, Endianness::Big)));
        assert!(!supports(&info(ContainerType::Ogg, Subtype::Vorbis, Endianness::File)));
        assert!(!supports(&info(ContainerType::Flac, Subtype::Pcm16, Endianness::File)));

        let mut bad = info(ContainerType::Wav, Subtype::Pcm16, Endianness::File);
        bad.channels = 0;
        assert!(!supports(&bad));
        bad.channels = MAX_CHANNELS + 1;
        assert!(!supports(&bad));
        bad.channels = 2;
        bad.samplerate = 0;
        assert!(!supports(&bad));
    }

    #[test]
    fn test_patch_resolution() {
        let patch = Patch::new(4, PatchValue::TotalMinus8, ByteOrder::Little);
        assert_eq!(patch.resolve(100, 50, 25).unwrap(), 92);
        let patch = Patch::new(40, PatchValue::DataBytes(8), ByteOrder::Big);
        assert_eq!(patch.resolve(100, 50, 25).unwrap(), 58);
        let patch = Patch::new(22, PatchValue::Frames, ByteOrder::Big);
        assert_eq!(patch.resolve(100, 50, 25).unwrap(), 25);
    }

    #[test]
    fn test_oversized_fields_rejected() {
        let frames = Patch::new(22, PatchValue::Frames, ByteOrder::Big);
        let err = frames.resolve(0, 0, u32::MAX as u64 + 1).unwrap_err();
        assert_eq!(err.code, crate::engine::ErrorCode::UnsupportedEncoding);

        let (mut layout, header) =
            new_layout(&info(ContainerType::Wav, Subtype::Pcm16, Endianness::File)).unwrap();
        layout.data_bytes = 5 << 30;
        let mut cursor = Cursor::new(header.clone());
        assert!(layout.apply_patches(&mut cursor, 0, 44 + (5 << 30)).is_err());
        // Header left untouched
        assert_eq!(cursor.into_inner(), header);
    }

    #[test]
    fn test_unknown_data_rejected() {
        let mut cursor = Cursor::new(vec![0u8; 64]);
        let info = StreamInfo::default();
        let err = parse(&mut cursor, 0, 64, &info).unwrap_err();
        assert_eq!(err.code, super::super::ErrorCode::UnrecognisedFormat);
    }

    #[test]
    fn test_raw_uses_caller_layout() {
        let mut cursor = Cursor::new(vec![0u8; 21]);
        let mut raw = info(ContainerType::Raw, Subtype::Pcm16, Endianness::Big);
        raw.channels = 2;
        let (layout, strings) = parse(&mut cursor, 0, 21, &raw).unwrap();
        assert_eq!(layout.data_offset, 0);
        assert_eq!(layout.data_bytes, 20);
        assert_eq!(layout.frames(), 5);
        assert_eq!(layout.codec.order(), ByteOrder::Big);
        assert!(strings.is_empty());
    }

    #[test]
    fn test_chunk_text() {
        assert_eq!(chunk_text(b"Title\0\0"), "Title");
        assert_eq!(chunk_text(b"no nul "), "no nul");
        assert_eq!(chunk_text(b""), "");
    }

    #[test]
    fn test_data_end_padding() {
        let (mut layout, _) =
            new_layout(&info(ContainerType::Wav, Subtype::PcmU8, Endianness::File)).unwrap();
        layout.data_bytes = 3;
        assert_eq!(layout.data_end(), layout.data_offset + 4);
        layout.data_bytes = 4;
        assert_eq!(layout.data_end(), layout.data_offset + 4);
    }
}
