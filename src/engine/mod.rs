//! Decode/encode engine boundary
//!
//! An `Engine` opens resources and hands back an `EngineHandle` that moves
//! typed elements in and out of the file. `AudioResource` only ever talks to
//! these two traits, so any engine (the built-in `NativeEngine`, a binding to
//! a system library, a test double) can sit behind it.
//!
//! # Architecture
//!
//! - `Engine` opens paths or already-open files and validates format words
//! - `EngineHandle` owns one open stream; `close` consumes it
//! - `NativeEngine` implements WAV, AIFF/AIFC, AU and RAW in pure Rust

pub mod aiff;
pub mod au;
pub mod codec;
pub mod container;
pub mod native;
pub mod wav;

use std::fmt;
use std::fs::File;
use std::path::Path;

use crate::dispatch::{Elements, ElementsMut};
use crate::format::StreamInfo;
use crate::frames::SeekOrigin;

pub use native::NativeEngine;

/// How a resource is opened
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpenMode {
    #[default]
    Read = 0x10,
    Write = 0x20,
    ReadWrite = 0x30,
}

impl OpenMode {
    pub fn can_read(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

/// String metadata fields, tagged with their stable engine ids
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StringField {
    Title = 1,
    Copyright = 2,
    Software = 3,
    Artist = 4,
    Comment = 5,
    Date = 6,
    Album = 7,
    License = 8,
}

impl StringField {
    pub const ALL: [StringField; 8] = [
        StringField::Title,
        StringField::Copyright,
        StringField::Software,
        StringField::Artist,
        StringField::Comment,
        StringField::Date,
        StringField::Album,
        StringField::License,
    ];

    pub fn tag(self) -> i32 {
        self as i32
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            StringField::Title => "title",
            StringField::Copyright => "copyright",
            StringField::Software => "software",
            StringField::Artist => "artist",
            StringField::Comment => "comment",
            StringField::Date => "date",
            StringField::Album => "album",
            StringField::License => "license",
        }
    }
}

impl std::str::FromStr for StringField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| format!("unknown string field '{}'", s))
    }
}

/// Engine error codes; zero means success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    UnrecognisedFormat,
    System,
    MalformedFile,
    UnsupportedEncoding,
    /// Engine-private code
    Other(i32),
}

impl ErrorCode {
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => ErrorCode::NoError,
            1 => ErrorCode::UnrecognisedFormat,
            2 => ErrorCode::System,
            3 => ErrorCode::MalformedFile,
            4 => ErrorCode::UnsupportedEncoding,
            other => ErrorCode::Other(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::NoError => 0,
            ErrorCode::UnrecognisedFormat => 1,
            ErrorCode::System => 2,
            ErrorCode::MalformedFile => 3,
            ErrorCode::UnsupportedEncoding => 4,
            ErrorCode::Other(code) => code,
        }
    }
}

/// Engine-private code: operation not allowed in the handle's open mode
pub const ERR_BAD_MODE: i32 = 0x101;
/// Engine-private code: element count not a whole number of frames
pub const ERR_BAD_ALIGN: i32 = 0x102;
/// Engine-private code: seek target outside the data
pub const ERR_BAD_SEEK: i32 = 0x103;
/// Engine-private code: string field not stored by this container or mode
pub const ERR_NO_STRING: i32 = 0x104;

/// Failure reported by an engine, with its own message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn private(code: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Other(code), message)
    }

    pub fn system(err: std::io::Error) -> Self {
        Self::new(ErrorCode::System, format!("System error : {}", err))
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedFile, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedEncoding, message)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::system(err)
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// A decode/encode engine
///
/// Implementations are shared process-wide, so they must be `Send + Sync`
/// and keep per-stream state inside their handles.
pub trait Engine: Send + Sync {
    /// Engine name for logs and summaries
    fn name(&self) -> &'static str;

    /// Engine version string
    fn version(&self) -> String;

    /// Whether `info` (format word, sample rate, channels) can be written
    fn format_check(&self, info: &StreamInfo) -> bool;

    /// Open a resource by path
    ///
    /// In Read mode the engine fills `info`; in Write mode it reads the
    /// caller's `samplerate`, `channels` and `format` from it.
    fn open_path(
        &self,
        path: &Path,
        mode: OpenMode,
        info: &mut StreamInfo,
    ) -> EngineResult<Box<dyn EngineHandle>>;

    /// Open a resource on an already-open file, starting at its current offset
    ///
    /// The file is owned by the handle; callers pass a duplicate when they
    /// want to keep their own.
    fn open_file(
        &self,
        file: File,
        mode: OpenMode,
        info: &mut StreamInfo,
    ) -> EngineResult<Box<dyn EngineHandle>>;
}

/// One open stream
pub trait EngineHandle: Send {
    /// Sticky error state, if any
    fn last_error(&self) -> Option<EngineError>;

    /// Move the cursor; returns the new absolute frame
    fn seek(&mut self, frames: i64, origin: SeekOrigin) -> EngineResult<u64>;

    /// Fill `buf` from the cursor; returns elements read
    fn read_elements(&mut self, buf: ElementsMut<'_>) -> EngineResult<usize>;

    /// Write `buf` at the cursor; returns elements written
    fn write_elements(&mut self, buf: Elements<'_>) -> EngineResult<usize>;

    /// Read a string field, `None` when absent or unsupported
    fn string(&self, field: StringField) -> Option<String>;

    fn set_string(&mut self, field: StringField, value: &str) -> EngineResult<()>;

    /// Flush and release the stream
    fn close(self: Box<Self>) -> EngineResult<()>;
}
