//! Audio resources
//!
//! `AudioResource` owns one open engine handle and exposes frame-oriented
//! typed reads and writes on top of it. Every operation resolves its sample
//! type through `TypeDispatcher` and converts frames to elements through
//! `FrameAddressSpace` before the engine sees anything.
//!
//! A resource is open until `close` (or drop); afterwards every operation
//! fails with `ResourceClosed` without touching the engine. Failed calls
//! leave the resource as it was, except a failed close, which still latches
//! the resource closed.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::dispatch::{zeroed_vec, Elements, ElementsMut, Sample, SampleBuffer, SampleType, TypeDispatcher};
use crate::engine::{EngineError, EngineHandle, ERR_BAD_MODE};
use crate::error::{Result, SndError};
use crate::format::{ContainerType, Endianness, FormatDescriptor, FormatWord, StreamInfo, Subtype};
use crate::frames::{FrameAddressSpace, FrameBuffer, SeekOrigin};
use crate::library::Library;

pub use crate::engine::{OpenMode, StringField};

/// Where a resource's bytes live
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Path(&'a Path),
    /// An already-open file, used from its current offset
    ///
    /// The resource works on a duplicate; the caller's file stays open.
    File(&'a File),
}

impl<'a> From<&'a Path> for Source<'a> {
    fn from(path: &'a Path) -> Self {
        Source::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for Source<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Source::Path(path.as_path())
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(path: &'a str) -> Self {
        Source::Path(Path::new(path))
    }
}

impl<'a> From<&'a File> for Source<'a> {
    fn from(file: &'a File) -> Self {
        Source::File(file)
    }
}

impl Source<'_> {
    fn display_name(&self) -> String {
        match self {
            Source::Path(path) => path.display().to_string(),
            #[cfg(unix)]
            Source::File(file) => {
                use std::os::unix::io::AsRawFd;
                format!("<fd {}>", file.as_raw_fd())
            }
            #[cfg(not(unix))]
            Source::File(_) => "<file>".to_string(),
        }
    }
}

/// Metadata supplied when creating a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSettings {
    pub samplerate: u32,
    pub channels: u32,
    pub format: FormatWord,
}

impl WriteSettings {
    pub fn new(samplerate: u32, channels: u32, format: FormatWord) -> Self {
        Self {
            samplerate,
            channels,
            format,
        }
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            samplerate: self.samplerate,
            channels: self.channels,
            format: self.format,
            ..StreamInfo::default()
        }
    }
}

impl Default for WriteSettings {
    /// 48 kHz stereo 16-bit WAV
    fn default() -> Self {
        Self::new(
            48000,
            2,
            FormatWord::compose(ContainerType::Wav, Subtype::Pcm16, Endianness::File),
        )
    }
}

/// One open audio resource
pub struct AudioResource {
    name: String,
    mode: OpenMode,
    handle: Option<Box<dyn EngineHandle>>,
    info: StreamInfo,
    descriptor: FormatDescriptor,
    space: FrameAddressSpace,
    /// Frame cursor, tracked from engine results
    position: u64,
}

impl AudioResource {
    /// Open a resource
    ///
    /// Write mode needs `settings`; Read mode uses them only for headerless
    /// (RAW) data; ReadWrite uses them when the resource has to be created.
    pub fn open<'a>(
        library: &Library,
        source: impl Into<Source<'a>>,
        mode: OpenMode,
        settings: Option<WriteSettings>,
    ) -> Result<Self> {
        let source = source.into();
        let name = source.display_name();
        let engine = library.engine();

        let mut info = match (mode, settings) {
            (OpenMode::Write, None) => {
                return Err(SndError::Open {
                    name,
                    message: "write mode needs sample rate, channels and format".to_string(),
                })
            }
            (_, settings) => settings.map(|s| s.stream_info()).unwrap_or_default(),
        };
        if mode == OpenMode::Write && !engine.format_check(&info) {
            return Err(SndError::UnsupportedFormat {
                format: info.format,
                samplerate: info.samplerate,
                channels: info.channels,
            });
        }

        let opened = match source {
            Source::Path(path) => engine.open_path(path, mode, &mut info),
            Source::File(file) => {
                let dup = file.try_clone().map_err(|e| SndError::Open {
                    name: name.clone(),
                    message: format!("cannot duplicate descriptor: {}", e),
                })?;
                engine.open_file(dup, mode, &mut info)
            }
        };
        let handle = opened.map_err(|e| SndError::Open {
            name: name.clone(),
            message: e.message,
        })?;

        if let Some(err) = handle.last_error() {
            discard(handle, &name);
            return Err(SndError::Open {
                name,
                message: err.message,
            });
        }
        let space = match FrameAddressSpace::new(info.channels) {
            Ok(space) => space,
            Err(_) => {
                discard(handle, &name);
                return Err(SndError::Open {
                    name,
                    message: "engine reported zero channels".to_string(),
                });
            }
        };

        let valid = mode == OpenMode::Write || engine.format_check(&info);
        let descriptor = FormatDescriptor::classify(info.format, valid);
        log::debug!(
            "opened {} ({:?}): {}, {} frames, {} Hz, {} ch",
            name,
            mode,
            info.format,
            info.frames,
            info.samplerate,
            info.channels
        );

        Ok(Self {
            name,
            mode,
            handle: Some(handle),
            info,
            descriptor,
            space,
            position: 0,
        })
    }

    /// Open on an already-open file, starting at its current offset
    pub fn open_file(
        library: &Library,
        file: &File,
        mode: OpenMode,
        settings: Option<WriteSettings>,
    ) -> Result<Self> {
        Self::open(library, Source::File(file), mode, settings)
    }

    /// Create a new resource in Write mode
    pub fn create(library: &Library, path: impl AsRef<Path>, settings: WriteSettings) -> Result<Self> {
        Self::open(library, Source::Path(path.as_ref()), OpenMode::Write, Some(settings))
    }

    fn handle_mut(&mut self) -> Result<&mut (dyn EngineHandle + 'static)> {
        self.handle.as_deref_mut().ok_or(SndError::ResourceClosed)
    }

    fn handle(&self) -> Result<&(dyn EngineHandle + 'static)> {
        self.handle.as_deref().ok_or(SndError::ResourceClosed)
    }

    fn ensure_open(&self) -> Result<()> {
        self.handle().map(|_| ())
    }

    fn ensure_readable(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.mode.can_read() {
            return Err(EngineError::private(
                ERR_BAD_MODE,
                format!("{} is not opened for reading", self.name),
            )
            .into());
        }
        Ok(())
    }

    /// Put the engine cursor back on `frame` after a failed transfer
    ///
    /// Unseekable streams cannot be rewound; their cursor stays wherever
    /// the engine left it.
    fn restore_cursor(&mut self, frame: u64) {
        if !self.info.seekable {
            return;
        }
        let Ok(target) = i64::try_from(frame) else {
            return;
        };
        let Some(handle) = self.handle.as_deref_mut() else {
            return;
        };
        match handle.seek(target, SeekOrigin::Start) {
            Ok(at) => self.position = at,
            Err(e) => log::warn!("{}: cannot restore cursor to frame {}: {}", self.name, frame, e),
        }
    }

    /// Frames between the engine cursor and the declared end
    fn remaining(&mut self) -> Result<u64> {
        let current = if self.info.seekable {
            self.handle_mut()?
                .seek(0, SeekOrigin::Current)
                .map_err(|e| SndError::SeekFailed(e.message))?
        } else {
            self.position
        };
        Ok(self.info.frames.saturating_sub(current))
    }

    fn element_count(&mut self, frames: Option<u64>) -> Result<usize> {
        let frames = match frames {
            Some(frames) => frames,
            None => self.remaining()?,
        };
        let frames = i64::try_from(frames)
            .map_err(|_| SndError::InvalidRange(format!("{} frames exceeds the engine's count type", frames)))?;
        self.space.to_element_count(frames)
    }

    /// Fill `buf` from the cursor; returns whole frames read
    fn read_elements(&mut self, buf: ElementsMut<'_>) -> Result<u64> {
        if buf.is_empty() {
            return Ok(0);
        }
        let got = self.handle_mut()?.read_elements(buf)?;
        let frames = match self.space.frames_in(got) {
            Ok(frames) => frames,
            Err(e) => {
                self.restore_cursor(self.position);
                return Err(e);
            }
        };
        self.position += frames;
        Ok(frames)
    }

    fn write_elements(&mut self, buf: Elements<'_>) -> Result<u64> {
        let channels = self.space.channels() as usize;
        if buf.len() % channels != 0 {
            return Err(SndError::InvalidRange(format!(
                "{} elements is not a whole number of {}-channel frames",
                buf.len(),
                channels
            )));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let got = self.handle_mut()?.write_elements(buf)?;
        let frames = match self.space.frames_in(got) {
            Ok(frames) => frames,
            Err(e) => {
                self.restore_cursor(self.position);
                return Err(e);
            }
        };
        self.position += frames;
        self.info.frames = self.info.frames.max(self.position);
        Ok(frames)
    }

    /// Read `frames` frames (default: all remaining) as `T`
    ///
    /// The buffer always holds `frames` frames; only the first
    /// `frames_read()` carry data, the rest are zero.
    pub fn read<T: Sample>(&mut self, frames: Option<u64>) -> Result<FrameBuffer<Vec<T>>> {
        self.ensure_readable()?;
        let transfer = TypeDispatcher::resolve(T::TYPE)?;
        let len = self.element_count(frames)?;
        let mut data = zeroed_vec::<T>(len)?;
        log::trace!(
            "{}: {} {} elements",
            self.name,
            transfer.representation.read_primitive(),
            len
        );
        let buf = T::elements_mut(&mut data).ok_or(SndError::UnsupportedRepresentation(T::TYPE))?;
        let frames_read = self.read_elements(buf)?;
        Ok(FrameBuffer::new(data, self.space.channels(), frames_read))
    }

    /// Read with the sample type chosen at runtime
    pub fn read_as(&mut self, frames: Option<u64>, sample_type: SampleType) -> Result<FrameBuffer<SampleBuffer>> {
        self.ensure_readable()?;
        let transfer = TypeDispatcher::resolve(sample_type)?;
        let len = self.element_count(frames)?;
        let mut data = SampleBuffer::zeroed(transfer.representation, len)?;
        let frames_read = self.read_elements(data.elements_mut())?;
        Ok(FrameBuffer::new(data, self.space.channels(), frames_read))
    }

    /// Read frames `[start, stop)`
    ///
    /// The range and mode are validated before the cursor moves; a read that
    /// fails after the seek puts the cursor back where it was.
    pub fn read_range<T: Sample>(&mut self, start: i64, stop: i64) -> Result<FrameBuffer<Vec<T>>> {
        self.ensure_readable()?;
        let frames = FrameAddressSpace::validate_range(start, stop)?;
        TypeDispatcher::resolve(T::TYPE)?;
        let before = self.position;
        self.seek(start, SeekOrigin::Start)?;
        self.read(Some(frames)).map_err(|e| {
            self.restore_cursor(before);
            e
        })
    }

    /// `read_range` with the sample type chosen at runtime
    pub fn read_range_as(
        &mut self,
        start: i64,
        stop: i64,
        sample_type: SampleType,
    ) -> Result<FrameBuffer<SampleBuffer>> {
        self.ensure_readable()?;
        let frames = FrameAddressSpace::validate_range(start, stop)?;
        TypeDispatcher::resolve(sample_type)?;
        let before = self.position;
        self.seek(start, SeekOrigin::Start)?;
        self.read_as(Some(frames), sample_type).map_err(|e| {
            self.restore_cursor(before);
            e
        })
    }

    /// Write interleaved samples at the cursor; returns frames written
    pub fn write<T: Sample>(&mut self, data: &[T]) -> Result<u64> {
        self.ensure_open()?;
        let transfer = TypeDispatcher::resolve(T::TYPE)?;
        log::trace!(
            "{}: {} {} elements",
            self.name,
            transfer.representation.write_primitive(),
            data.len()
        );
        let buf = T::elements(data).ok_or(SndError::UnsupportedRepresentation(T::TYPE))?;
        self.write_elements(buf)
    }

    pub fn write_buffer(&mut self, data: &SampleBuffer) -> Result<u64> {
        self.ensure_open()?;
        TypeDispatcher::resolve(data.sample_type())?;
        self.write_elements(data.elements())
    }

    /// Move the cursor; returns the new absolute frame
    pub fn seek(&mut self, position: i64, origin: SeekOrigin) -> Result<u64> {
        self.ensure_open()?;
        if !self.info.seekable {
            return Err(SndError::SeekFailed(format!("{} is not seekable", self.name)));
        }
        FrameAddressSpace::seek_target(position, origin, self.position, self.info.frames)?;
        let target = self
            .handle_mut()?
            .seek(position, origin)
            .map_err(|e| SndError::SeekFailed(e.message))?;
        log::debug!("{}: seek {:?} {:+} -> frame {}", self.name, origin, position, target);
        self.position = target;
        Ok(target)
    }

    /// Current frame cursor
    pub fn position(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.position)
    }

    /// String metadata; `None` when absent or unsupported by the container
    pub fn metadata_string(&self, field: StringField) -> Result<Option<String>> {
        Ok(self.handle()?.string(field))
    }

    /// Store string metadata; `false` when the container or mode cannot
    pub fn set_metadata_string(&mut self, field: StringField, value: &str) -> Result<bool> {
        match self.handle_mut()?.set_string(field, value) {
            Ok(()) => Ok(true),
            Err(e) => {
                log::debug!("{}: {} not stored: {}", self.name, field.name(), e);
                Ok(false)
            }
        }
    }

    /// Release the engine handle
    ///
    /// Only the first call reaches the engine. The resource is closed
    /// afterwards even when the engine reports a failure.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.close().map_err(|e| SndError::Close {
            name: self.name.clone(),
            message: e.message,
        })?;
        log::debug!("closed {} ({} frames)", self.name, self.info.frames);
        Ok(())
    }

    /// Run `body` and close the resource on every exit path
    ///
    /// If both the body and the close fail, the error carries both.
    pub fn scoped<R>(mut self, body: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let outcome = body(&mut self);
        let closed = self.close();
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), Ok(())) | (Ok(_), Err(err)) => Err(err),
            (Err(body), Err(close)) => Err(SndError::Scoped {
                body: Box::new(body),
                close: Box::new(close),
            }),
        }
    }

    pub fn frames(&self) -> u64 {
        self.info.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.info.samplerate
    }

    pub fn channels(&self) -> u32 {
        self.info.channels
    }

    pub fn format(&self) -> FormatWord {
        self.info.format
    }

    pub fn descriptor(&self) -> &FormatDescriptor {
        &self.descriptor
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn is_seekable(&self) -> bool {
        self.info.seekable
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }
}

/// Close a handle that will never be handed out
fn discard(handle: Box<dyn EngineHandle>, name: &str) {
    if let Err(e) = handle.close() {
        log::warn!("closing rejected handle for {} failed: {}", name, e);
    }
}

impl Drop for AudioResource {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("closing {} on drop", self.name);
            if let Err(e) = handle.close() {
                log::warn!("closing {} on drop failed: {}", self.name, e);
            }
        }
    }
}

impl fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResource")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("info", &self.info)
            .field("position", &self.position)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} frames, {} Hz, {} ch, {}, {}",
            self.name,
            self.info.frames,
            self.info.samplerate,
            self.info.channels,
            self.info.format,
            if self.info.seekable {
                "seekable"
            } else {
                "not seekable"
            }
        )?;
        if self.is_closed() {
            f.write_str(" (closed)")?;
        }
        Ok(())
    }
}
