//! Sample type dispatch
//!
//! Maps a requested in-memory sample type to the transfer primitive that
//! moves elements between a buffer and the engine. Only four
//! representations have primitives: int16, int32, float32 and float64.
//! Anything else is rejected here, before the engine is ever called.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SndError};

/// In-memory sample types a caller may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    I8,
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl SampleType {
    pub const ALL: [SampleType; 7] = [
        SampleType::I8,
        SampleType::U8,
        SampleType::I16,
        SampleType::I32,
        SampleType::I64,
        SampleType::F32,
        SampleType::F64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SampleType::I8 => "int8",
            SampleType::U8 => "uint8",
            SampleType::I16 => "int16",
            SampleType::I32 => "int32",
            SampleType::I64 => "int64",
            SampleType::F32 => "float32",
            SampleType::F64 => "float64",
        }
    }

    /// Size of one element in bytes
    pub fn byte_width(self) -> usize {
        match self {
            SampleType::I8 | SampleType::U8 => 1,
            SampleType::I16 => 2,
            SampleType::I32 | SampleType::F32 => 4,
            SampleType::I64 | SampleType::F64 => 8,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleType {
    type Err = String;

    /// Accepts both sized names (`int16`, `f64`) and C names (`short`, `double`)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int8" | "i8" | "byte" | "schar" => Ok(SampleType::I8),
            "uint8" | "u8" | "ubyte" | "uchar" => Ok(SampleType::U8),
            "int16" | "i16" | "short" => Ok(SampleType::I16),
            "int32" | "i32" | "int" => Ok(SampleType::I32),
            "int64" | "i64" | "long" | "longlong" => Ok(SampleType::I64),
            "float32" | "f32" | "float" | "single" => Ok(SampleType::F32),
            "float64" | "f64" | "double" => Ok(SampleType::F64),
            other => Err(format!("unknown sample type '{}'", other)),
        }
    }
}

/// Element representations with an engine transfer primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    Short,
    Int,
    Float,
    Double,
}

impl Representation {
    pub fn sample_type(self) -> SampleType {
        match self {
            Representation::Short => SampleType::I16,
            Representation::Int => SampleType::I32,
            Representation::Float => SampleType::F32,
            Representation::Double => SampleType::F64,
        }
    }

    pub fn read_primitive(self) -> &'static str {
        match self {
            Representation::Short => "read_short",
            Representation::Int => "read_int",
            Representation::Float => "read_float",
            Representation::Double => "read_double",
        }
    }

    pub fn write_primitive(self) -> &'static str {
        match self {
            Representation::Short => "write_short",
            Representation::Int => "write_int",
            Representation::Float => "write_float",
            Representation::Double => "write_double",
        }
    }
}

/// The resolved transfer triple for one sample type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub representation: Representation,
    pub element_width: usize,
}

/// Stateless lookup from sample type to transfer primitive
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeDispatcher;

const TRANSFERS: [(SampleType, Transfer); 4] = [
    (
        SampleType::I16,
        Transfer {
            representation: Representation::Short,
            element_width: 2,
        },
    ),
    (
        SampleType::I32,
        Transfer {
            representation: Representation::Int,
            element_width: 4,
        },
    ),
    (
        SampleType::F32,
        Transfer {
            representation: Representation::Float,
            element_width: 4,
        },
    ),
    (
        SampleType::F64,
        Transfer {
            representation: Representation::Double,
            element_width: 8,
        },
    ),
];

impl TypeDispatcher {
    /// Resolve the transfer primitive for `sample_type`
    ///
    /// Fails with `UnsupportedRepresentation` naming the offending type.
    pub fn resolve(sample_type: SampleType) -> Result<Transfer> {
        TRANSFERS
            .iter()
            .find(|(t, _)| *t == sample_type)
            .map(|(_, transfer)| *transfer)
            .ok_or(SndError::UnsupportedRepresentation(sample_type))
    }
}

/// Read-only element slice tagged with its representation
#[derive(Debug, Clone, Copy)]
pub enum Elements<'a> {
    Short(&'a [i16]),
    Int(&'a [i32]),
    Float(&'a [f32]),
    Double(&'a [f64]),
}

/// Mutable element slice tagged with its representation
#[derive(Debug)]
pub enum ElementsMut<'a> {
    Short(&'a mut [i16]),
    Int(&'a mut [i32]),
    Float(&'a mut [f32]),
    Double(&'a mut [f64]),
}

impl Elements<'_> {
    pub fn len(&self) -> usize {
        match self {
            Elements::Short(s) => s.len(),
            Elements::Int(s) => s.len(),
            Elements::Float(s) => s.len(),
            Elements::Double(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn representation(&self) -> Representation {
        match self {
            Elements::Short(_) => Representation::Short,
            Elements::Int(_) => Representation::Int,
            Elements::Float(_) => Representation::Float,
            Elements::Double(_) => Representation::Double,
        }
    }
}

impl ElementsMut<'_> {
    pub fn len(&self) -> usize {
        match self {
            ElementsMut::Short(s) => s.len(),
            ElementsMut::Int(s) => s.len(),
            ElementsMut::Float(s) => s.len(),
            ElementsMut::Double(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn representation(&self) -> Representation {
        match self {
            ElementsMut::Short(_) => Representation::Short,
            ElementsMut::Int(_) => Representation::Int,
            ElementsMut::Float(_) => Representation::Float,
            ElementsMut::Double(_) => Representation::Double,
        }
    }
}

/// A numeric element type that can live in a sample buffer
///
/// Types without a transfer primitive return `None` from the slice
/// conversions; callers resolve through `TypeDispatcher` first so that case
/// surfaces as `UnsupportedRepresentation`.
pub trait Sample: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const TYPE: SampleType;

    fn elements(buf: &[Self]) -> Option<Elements<'_>>;

    fn elements_mut(buf: &mut [Self]) -> Option<ElementsMut<'_>>;
}

macro_rules! transferable_sample {
    ($ty:ty, $sample:ident, $variant:ident) => {
        impl Sample for $ty {
            const TYPE: SampleType = SampleType::$sample;

            fn elements(buf: &[Self]) -> Option<Elements<'_>> {
                Some(Elements::$variant(buf))
            }

            fn elements_mut(buf: &mut [Self]) -> Option<ElementsMut<'_>> {
                Some(ElementsMut::$variant(buf))
            }
        }
    };
}

macro_rules! untransferable_sample {
    ($ty:ty, $sample:ident) => {
        impl Sample for $ty {
            const TYPE: SampleType = SampleType::$sample;

            fn elements(_buf: &[Self]) -> Option<Elements<'_>> {
                None
            }

            fn elements_mut(_buf: &mut [Self]) -> Option<ElementsMut<'_>> {
                None
            }
        }
    };
}

transferable_sample!(i16, I16, Short);
transferable_sample!(i32, I32, Int);
transferable_sample!(f32, F32, Float);
transferable_sample!(f64, F64, Double);
untransferable_sample!(i8, I8);
untransferable_sample!(u8, U8);
untransferable_sample!(i64, I64);

/// `len` default elements, failing instead of aborting when the request
/// cannot be allocated
pub(crate) fn zeroed_vec<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|e| {
        SndError::InvalidRange(format!("cannot allocate a buffer of {} elements: {}", len, e))
    })?;
    data.resize(len, T::default());
    Ok(data)
}

/// A buffer whose element type is chosen at runtime
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleBuffer {
    /// A zero-filled buffer of `len` elements for a transferable representation
    pub fn zeroed(representation: Representation, len: usize) -> Result<Self> {
        Ok(match representation {
            Representation::Short => SampleBuffer::I16(zeroed_vec(len)?),
            Representation::Int => SampleBuffer::I32(zeroed_vec(len)?),
            Representation::Float => SampleBuffer::F32(zeroed_vec(len)?),
            Representation::Double => SampleBuffer::F64(zeroed_vec(len)?),
        })
    }

    pub fn representation(&self) -> Representation {
        self.elements().representation()
    }

    pub fn sample_type(&self) -> SampleType {
        self.representation().sample_type()
    }

    pub fn len(&self) -> usize {
        self.elements().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elements(&self) -> Elements<'_> {
        match self {
            SampleBuffer::I16(v) => Elements::Short(v),
            SampleBuffer::I32(v) => Elements::Int(v),
            SampleBuffer::F32(v) => Elements::Float(v),
            SampleBuffer::F64(v) => Elements::Double(v),
        }
    }

    pub fn elements_mut(&mut self) -> ElementsMut<'_> {
        match self {
            SampleBuffer::I16(v) => ElementsMut::Short(v),
            SampleBuffer::I32(v) => ElementsMut::Int(v),
            SampleBuffer::F32(v) => ElementsMut::Float(v),
            SampleBuffer::F64(v) => ElementsMut::Double(v),
        }
    }

    /// Element `index` widened to `f64`, whatever the representation
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            SampleBuffer::I16(v) => v.get(index).map(|&x| x as f64),
            SampleBuffer::I32(v) => v.get(index).map(|&x| x as f64),
            SampleBuffer::F32(v) => v.get(index).map(|&x| x as f64),
            SampleBuffer::F64(v) => v.get(index).copied(),
        }
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        match self {
            SampleBuffer::I16(v) => v.truncate(len),
            SampleBuffer::I32(v) => v.truncate(len),
            SampleBuffer::F32(v) => v.truncate(len),
            SampleBuffer::F64(v) => v.truncate(len),
        }
    }
}
