//! Frame-oriented typed I/O over multi-channel audio files
//!
//! Open an [`AudioResource`] through a [`Library`], then read and write
//! interleaved frames as `i16`, `i32`, `f32` or `f64`.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod format;
pub mod frames;
pub mod library;
pub mod logging;
pub mod resource;

pub use dispatch::{Representation, Sample, SampleBuffer, SampleType, TypeDispatcher};
pub use engine::{Engine, EngineHandle, NativeEngine, OpenMode, StringField};
pub use error::{Result, SndError};
pub use format::{ContainerType, Endianness, FormatDescriptor, FormatWord, StreamInfo, Subtype};
pub use frames::{FrameAddressSpace, FrameBuffer, SeekOrigin};
pub use library::Library;
pub use logging::LogLevel;
pub use resource::{AudioResource, Source, WriteSettings};
