//! Built-in engine for uncompressed containers
//!
//! `NativeEngine` reads and writes WAV, AIFF/AIFC, AU and headerless RAW
//! streams with linear PCM or IEEE float samples. Handles keep the header
//! layout in memory and rewrite size fields on close.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use super::codec::SampleCodec;
use super::container::{self, Layout, Strings};
use super::{
    Engine, EngineError, EngineHandle, EngineResult, OpenMode, StringField, ERR_BAD_ALIGN,
    ERR_BAD_MODE, ERR_BAD_SEEK, ERR_NO_STRING,
};
use crate::dispatch::{Elements, ElementsMut};
use crate::format::StreamInfo;
use crate::frames::{FrameAddressSpace, SeekOrigin};

/// Pure-Rust engine for WAV, AIFF, AU and RAW
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        NativeEngine
    }

    fn open_stream(
        &self,
        mut file: File,
        mode: OpenMode,
        info: &mut StreamInfo,
    ) -> EngineResult<Box<dyn EngineHandle>> {
        let base = file.stream_position()?;
        let end = file.seek(SeekFrom::End(0))?;
        let len = end.saturating_sub(base);

        let fresh = mode == OpenMode::Write || (mode == OpenMode::ReadWrite && len == 0);
        let (layout, strings, tail) = if fresh {
            let (layout, header) = container::new_layout(info)?;
            file.seek(SeekFrom::Start(base))?;
            file.write_all(&header)?;
            info.frames = 0;
            (layout, Strings::new(), Vec::new())
        } else {
            let (layout, strings) = container::parse(&mut file, base, len, info)?;
            let mut tail = Vec::new();
            if mode.can_write() && layout.payload_end < len {
                tail = vec![0u8; (len - layout.payload_end) as usize];
                container::read_exact_at(&mut file, base + layout.payload_end, &mut tail, "trailing chunks")?;
            }
            info.frames = layout.frames();
            info.samplerate = layout.samplerate;
            info.channels = layout.channels;
            info.format = layout.format_word();
            (layout, strings, tail)
        };
        info.sections = 1;
        info.seekable = true;

        log::debug!(
            "native engine opened {} ({} frames, {} ch, {} Hz, {:?})",
            layout.format_word(),
            layout.frames(),
            layout.channels,
            layout.samplerate,
            mode
        );

        let codec = layout.codec;
        Ok(Box::new(NativeHandle {
            file,
            base,
            mode,
            frames: layout.frames(),
            layout,
            codec,
            cursor: 0,
            strings,
            tail,
            fresh,
            dirty: fresh,
            last_error: None,
        }))
    }
}

impl Engine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn version(&self) -> String {
        format!("sndframe-native-{}", env!("CARGO_PKG_VERSION"))
    }

    fn format_check(&self, info: &StreamInfo) -> bool {
        container::supports(info)
    }

    fn open_path(
        &self,
        path: &Path,
        mode: OpenMode,
        info: &mut StreamInfo,
    ) -> EngineResult<Box<dyn EngineHandle>> {
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Write => {
                if !container::supports(info) {
                    return Err(EngineError::unsupported(format!(
                        "Format not supported: {} with {} channels at {} Hz",
                        info.format, info.channels, info.samplerate
                    )));
                }
                File::create(path)?
            }
            OpenMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?,
        };
        self.open_stream(file, mode, info)
    }

    fn open_file(
        &self,
        file: File,
        mode: OpenMode,
        info: &mut StreamInfo,
    ) -> EngineResult<Box<dyn EngineHandle>> {
        self.open_stream(file, mode, info)
    }
}

/// One open native stream
struct NativeHandle {
    file: File,
    /// Stream start within the file
    base: u64,
    mode: OpenMode,
    layout: Layout,
    codec: SampleCodec,
    frames: u64,
    cursor: u64,
    strings: Strings,
    /// Chunks after the audio data of an existing stream
    tail: Vec<u8>,
    /// Stream was created by this handle
    fresh: bool,
    dirty: bool,
    last_error: Option<EngineError>,
}

impl NativeHandle {
    fn frame_offset(&self, frame: u64) -> u64 {
        self.base + self.layout.data_offset + frame * self.layout.bytes_per_frame()
    }

    fn check_alignment(&self, elements: usize) -> EngineResult<usize> {
        let channels = self.layout.channels as usize;
        if elements % channels != 0 {
            return Err(EngineError::private(
                ERR_BAD_ALIGN,
                format!("{} elements is not a multiple of {} channels", elements, channels),
            ));
        }
        Ok(elements / channels)
    }

    fn record<T>(&mut self, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(err) = &result {
            self.last_error = Some(err.clone());
        }
        result
    }

    fn read_into(&mut self, buf: ElementsMut<'_>) -> EngineResult<usize> {
        if !self.mode.can_read() {
            return Err(EngineError::private(ERR_BAD_MODE, "File not opened for reading"));
        }
        let wanted = self.check_alignment(buf.len())? as u64;
        let frames = wanted.min(self.frames.saturating_sub(self.cursor));
        if frames == 0 {
            return Ok(0);
        }
        let mut bytes = vec![0u8; (frames * self.layout.bytes_per_frame()) as usize];
        let offset = self.frame_offset(self.cursor);
        let got = container::read_at(&mut self.file, offset, &mut bytes)?;
        let elements = self.codec.decode(&bytes[..got], buf);
        self.cursor += elements as u64 / self.layout.channels as u64;
        Ok(elements)
    }

    fn write_from(&mut self, buf: Elements<'_>) -> EngineResult<usize> {
        if !self.mode.can_write() {
            return Err(EngineError::private(ERR_BAD_MODE, "File not opened for writing"));
        }
        let frames = self.check_alignment(buf.len())? as u64;
        if frames == 0 {
            return Ok(0);
        }
        let elements = buf.len();
        let mut bytes = Vec::with_capacity(elements * self.codec.width());
        self.codec.encode(buf, &mut bytes);
        let offset = self.frame_offset(self.cursor);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;
        self.cursor += frames;
        self.frames = self.frames.max(self.cursor);
        let written_end = self.cursor * self.layout.bytes_per_frame();
        self.layout.data_bytes = self.layout.data_bytes.max(written_end);
        self.dirty = true;
        Ok(elements)
    }

    /// Write padding, trailing chunks and final size fields
    fn finish(&mut self) -> EngineResult<()> {
        let data_end = self.layout.data_offset + self.layout.data_bytes;
        self.file.seek(SeekFrom::Start(self.base + data_end))?;
        if self.layout.data_end() > data_end {
            self.file.write_all(&[0])?;
        }
        if self.fresh {
            let trailer = container::trailer(self.layout.container, &self.strings);
            self.file.write_all(&trailer)?;
        } else {
            self.file.write_all(&self.tail)?;
        }
        let end = self.file.stream_position()?;
        self.file.set_len(end)?;
        self.layout.apply_patches(&mut self.file, self.base, end - self.base)?;
        self.file.flush()?;
        Ok(())
    }
}

impl EngineHandle for NativeHandle {
    fn last_error(&self) -> Option<EngineError> {
        self.last_error.clone()
    }

    fn seek(&mut self, frames: i64, origin: SeekOrigin) -> EngineResult<u64> {
        let target = FrameAddressSpace::seek_target(frames, origin, self.cursor, self.frames)
            .map_err(|e| EngineError::private(ERR_BAD_SEEK, e.to_string()));
        let target = self.record(target)?;
        self.cursor = target;
        Ok(target)
    }

    fn read_elements(&mut self, buf: ElementsMut<'_>) -> EngineResult<usize> {
        let result = self.read_into(buf);
        self.record(result)
    }

    fn write_elements(&mut self, buf: Elements<'_>) -> EngineResult<usize> {
        let result = self.write_from(buf);
        self.record(result)
    }

    fn string(&self, field: StringField) -> Option<String> {
        self.strings.get(&field).cloned()
    }

    fn set_string(&mut self, field: StringField, value: &str) -> EngineResult<()> {
        if !self.fresh || !container::string_fields(self.layout.container).contains(&field) {
            return Err(EngineError::private(
                ERR_NO_STRING,
                format!(
                    "{} cannot store '{}' on this stream",
                    self.layout.container,
                    field.name()
                ),
            ));
        }
        self.strings.insert(field, value.to_string());
        self.dirty = true;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> EngineResult<()> {
        if self.mode.can_write() && self.dirty {
            self.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ContainerType, Endianness, FormatWord, Subtype};
    use tempfile::tempdir;

    fn write_info(container: ContainerType, subtype: Subtype, channels: u32) -> StreamInfo {
        StreamInfo {
            samplerate: 8000,
            channels,
            format: FormatWord::compose(container, subtype, Endianness::File),
            ..StreamInfo::default()
        }
    }

    #[test]
    fn test_write_then_read_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let engine = NativeEngine::new();

        let mut info = write_info(ContainerType::Wav, Subtype::Pcm16, 2);
        let mut handle = engine.open_path(&path, OpenMode::Write, &mut info).unwrap();
        let samples: Vec<i16> = vec![1, -1, 100, -100, 32767, -32768];
        assert_eq!(handle.write_elements(Elements::Short(&samples)).unwrap(), 6);
        handle.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 44 + 12);

        let mut info = StreamInfo::default();
        let mut handle = engine.open_path(&path, OpenMode::Read, &mut info).unwrap();
        assert_eq!(info.frames, 3);
        assert_eq!(info.channels, 2);
        assert_eq!(info.samplerate, 8000);
        assert_eq!(info.format, FormatWord(0x10002));
        let mut out = vec![0i16; 8];
        assert_eq!(handle.read_elements(ElementsMut::Short(&mut out)).unwrap(), 6);
        assert_eq!(&out[..6], &samples[..]);
        assert_eq!(handle.read_elements(ElementsMut::Short(&mut out)).unwrap(), 0);
        handle.close().unwrap();
    }

    #[test]
    fn test_mode_and_alignment_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mono.au");
        let engine = NativeEngine::new();

        let mut info = write_info(ContainerType::Au, Subtype::Pcm16, 2);
        let mut handle = engine.open_path(&path, OpenMode::Write, &mut info).unwrap();
        let mut out = [0i16; 2];
        let err = handle.read_elements(ElementsMut::Short(&mut out)).unwrap_err();
        assert_eq!(err.code, super::super::ErrorCode::Other(ERR_BAD_MODE));
        let err = handle.write_elements(Elements::Short(&[1, 2, 3])).unwrap_err();
        assert_eq!(err.code, super::super::ErrorCode::Other(ERR_BAD_ALIGN));
        assert_eq!(handle.last_error(), Some(err));
        handle.close().unwrap();
    }

    #[test]
    fn test_seek_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seek.aiff");
        let engine = NativeEngine::new();

        let mut info = write_info(ContainerType::Aiff, Subtype::Pcm24, 1);
        let mut handle = engine.open_path(&path, OpenMode::Write, &mut info).unwrap();
        handle.write_elements(Elements::Int(&[0; 10])).unwrap();
        assert_eq!(handle.seek(0, SeekOrigin::Current).unwrap(), 10);
        assert_eq!(handle.seek(-4, SeekOrigin::End).unwrap(), 6);
        assert!(handle.seek(11, SeekOrigin::Start).is_err());
        handle.close().unwrap();

        let mut info = StreamInfo::default();
        let handle = engine.open_path(&path, OpenMode::Read, &mut info).unwrap();
        assert_eq!(info.frames, 10);
        handle.close().unwrap();
    }

    #[test]
    fn test_strings_on_new_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tagged.wav");
        let engine = NativeEngine::new();

        let mut info = write_info(ContainerType::Wav, Subtype::Float, 1);
        let mut handle = engine.open_path(&path, OpenMode::Write, &mut info).unwrap();
        handle.set_string(StringField::Title, "Tone").unwrap();
        assert!(handle.set_string(StringField::License, "CC0").is_err());
        handle.write_elements(Elements::Float(&[0.5, -0.5, 0.25])).unwrap();
        handle.close().unwrap();

        let mut info = StreamInfo::default();
        let mut handle = engine.open_path(&path, OpenMode::Read, &mut info).unwrap();
        assert_eq!(info.frames, 3);
        assert_eq!(handle.string(StringField::Title).as_deref(), Some("Tone"));
        assert_eq!(handle.string(StringField::Artist), None);
        assert!(handle.set_string(StringField::Title, "x").is_err());
        let mut out = [0f32; 3];
        handle.read_elements(ElementsMut::Float(&mut out)).unwrap();
        assert_eq!(out, [0.5, -0.5, 0.25]);
        handle.close().unwrap();
    }

    #[test]
    fn test_read_write_keeps_trailing_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rw.wav");
        let engine = NativeEngine::new();

        let mut info = write_info(ContainerType::Wav, Subtype::PcmU8, 1);
        let mut handle = engine.open_path(&path, OpenMode::Write, &mut info).unwrap();
        handle.set_string(StringField::Comment, "keep me").unwrap();
        handle.write_elements(Elements::Short(&[256, 512, 768])).unwrap();
        handle.close().unwrap();

        let mut info = StreamInfo::default();
        let mut handle = engine.open_path(&path, OpenMode::ReadWrite, &mut info).unwrap();
        assert_eq!(info.frames, 3);
        handle.seek(0, SeekOrigin::End).unwrap();
        handle.write_elements(Elements::Short(&[1024, 1280])).unwrap();
        handle.close().unwrap();

        let mut info = StreamInfo::default();
        let mut handle = engine.open_path(&path, OpenMode::Read, &mut info).unwrap();
        assert_eq!(info.frames, 5);
        assert_eq!(handle.string(StringField::Comment).as_deref(), Some("keep me"));
        let mut out = [0i16; 5];
        handle.read_elements(ElementsMut::Short(&mut out)).unwrap();
        assert_eq!(out, [256, 512, 768, 1024, 1280]);
        handle.close().unwrap();
    }

    #[test]
    fn test_open_file_honours_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embedded.bin");
        let engine = NativeEngine::new();

        let mut file = File::create(&path).unwrap();
        file.write_all(b"PREFIX").unwrap();
        let mut info = write_info(ContainerType::Au, Subtype::Pcm32, 1);
        let mut handle = engine.open_file(file, OpenMode::Write, &mut info).unwrap();
        handle.write_elements(Elements::Int(&[7 << 16, -7 << 16])).unwrap();
        handle.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..6], b"PREFIX");
        assert_eq!(&bytes[6..10], b".snd");

        let mut file = File::open(&path).unwrap();
        file.seek(SeekFrom::Start(6)).unwrap();
        let mut info = StreamInfo::default();
        let mut handle = engine.open_file(file, OpenMode::Read, &mut info).unwrap();
        assert_eq!(info.frames, 2);
        let mut out = [0i32; 2];
        handle.read_elements(ElementsMut::Int(&mut out)).unwrap();
        assert_eq!(out, [7 << 16, -7 << 16]);
        handle.close().unwrap();
    }

    #[test]
    fn test_unsupported_write_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.ogg");
        let engine = NativeEngine::new();
        let mut info = write_info(ContainerType::Ogg, Subtype::Vorbis, 2);
        assert!(!engine.format_check(&info));
        let err = engine
            .open_path(&path, OpenMode::Write, &mut info)
            .err()
            .unwrap();
        assert_eq!(err.code, super::super::ErrorCode::UnsupportedEncoding);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file() {
        let engine = NativeEngine::new();
        let mut info = StreamInfo::default();
        let err = engine
            .open_path(Path::new("/nonexistent/sndframe.wav"), OpenMode::Read, &mut info)
            .err()
            .unwrap();
        assert_eq!(err.code, super::super::ErrorCode::System);
        assert!(err.message.starts_with("System error : "));
    }
}
