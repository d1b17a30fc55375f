//! Linear sample codec
//!
//! Converts between stored sample bytes and the four transfer
//! representations. Integer PCM is left-justified to 32 bits on decode, so
//! reading a 16-bit file as int32 yields `sample << 16`. Float reads of
//! integer data are normalised by `2^(bits-1)`; float writes into integer
//! data scale by the same factor, round and clip, which makes a
//! read-float/write-back pass lossless.

use crate::dispatch::{Elements, ElementsMut};
use crate::format::Subtype;

const I32_SCALE: f64 = 2_147_483_648.0;

/// Byte order of stored samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn read_u16(self, b: &[u8]) -> u16 {
        let arr = [b[0], b[1]];
        match self {
            ByteOrder::Little => u16::from_le_bytes(arr),
            ByteOrder::Big => u16::from_be_bytes(arr),
        }
    }

    pub fn read_u32(self, b: &[u8]) -> u32 {
        let arr = [b[0], b[1], b[2], b[3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(arr),
            ByteOrder::Big => u32::from_be_bytes(arr),
        }
    }

    fn read_u64(self, b: &[u8]) -> u64 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&b[..8]);
        match self {
            ByteOrder::Little => u64::from_le_bytes(arr),
            ByteOrder::Big => u64::from_be_bytes(arr),
        }
    }

    fn u64_bytes(self, v: u64) -> [u8; 8] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// One decoded sample before conversion to the caller's representation
#[derive(Debug, Clone, Copy, PartialEq)]
enum Raw {
    /// Left-justified integer sample
    Int(i32),
    Float(f64),
}

fn clip_round(x: f64, min: i64, max: i64) -> i64 {
    // `as` saturates and maps NaN to 0
    ((x.round()) as i64).clamp(min, max)
}

impl Raw {
    fn to_i16(self) -> i16 {
        match self {
            Raw::Int(v) => (v >> 16) as i16,
            Raw::Float(x) => clip_round(x * 32768.0, i16::MIN as i64, i16::MAX as i64) as i16,
        }
    }

    fn to_i32(self) -> i32 {
        match self {
            Raw::Int(v) => v,
            Raw::Float(x) => clip_round(x * I32_SCALE, i32::MIN as i64, i32::MAX as i64) as i32,
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Raw::Int(v) => v as f64 / I32_SCALE,
            Raw::Float(x) => x,
        }
    }
}

/// Codec for one linear subtype in one byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCodec {
    subtype: Subtype,
    order: ByteOrder,
    width: usize,
}

impl SampleCodec {
    /// `None` for subtypes this codec cannot handle (compressed encodings)
    pub fn new(subtype: Subtype, order: ByteOrder) -> Option<Self> {
        let width = match subtype {
            Subtype::PcmS8 | Subtype::PcmU8 => 1,
            Subtype::Pcm16 => 2,
            Subtype::Pcm24 => 3,
            Subtype::Pcm32 | Subtype::Float => 4,
            Subtype::Double => 8,
            _ => return None,
        };
        Some(Self {
            subtype,
            order,
            width,
        })
    }

    pub fn subtype(&self) -> Subtype {
        self.subtype
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Stored bytes per sample
    pub fn width(&self) -> usize {
        self.width
    }

    fn decode_one(&self, b: &[u8]) -> Raw {
        match self.subtype {
            Subtype::PcmS8 => Raw::Int((b[0] as i8 as i32) << 24),
            Subtype::PcmU8 => Raw::Int((b[0] as i32 - 128) << 24),
            Subtype::Pcm16 => Raw::Int((self.order.read_u16(b) as i16 as i32) << 16),
            Subtype::Pcm24 => {
                let (hi, mid, lo) = match self.order {
                    ByteOrder::Little => (b[2], b[1], b[0]),
                    ByteOrder::Big => (b[0], b[1], b[2]),
                };
                Raw::Int(i32::from_be_bytes([hi, mid, lo, 0]))
            }
            Subtype::Pcm32 => Raw::Int(self.order.read_u32(b) as i32),
            Subtype::Float => Raw::Float(f32::from_bits(self.order.read_u32(b)) as f64),
            _ => Raw::Float(f64::from_bits(self.order.read_u64(b))),
        }
    }

    fn encode_one(&self, raw: Raw, out: &mut Vec<u8>) {
        match self.subtype {
            Subtype::Float => {
                let x = raw.to_f64() as f32;
                out.extend_from_slice(&self.order.u32_bytes(x.to_bits()));
            }
            Subtype::Double => {
                out.extend_from_slice(&self.order.u64_bytes(raw.to_f64().to_bits()));
            }
            _ => {
                let bits = (self.width * 8) as u32;
                let v = match raw {
                    Raw::Int(v) => (v >> (32 - bits)) as i64,
                    Raw::Float(x) => {
                        let scale = (1i64 << (bits - 1)) as f64;
                        clip_round(x * scale, -(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
                    }
                };
                match self.subtype {
                    Subtype::PcmS8 => out.push(v as i8 as u8),
                    Subtype::PcmU8 => out.push((v + 128) as u8),
                    Subtype::Pcm16 => out.extend_from_slice(&self.order.u16_bytes(v as i16 as u16)),
                    Subtype::Pcm24 => {
                        let [_, hi, mid, lo] = (v as i32).to_be_bytes();
                        match self.order {
                            ByteOrder::Little => out.extend_from_slice(&[lo, mid, hi]),
                            ByteOrder::Big => out.extend_from_slice(&[hi, mid, lo]),
                        }
                    }
                    _ => out.extend_from_slice(&self.order.u32_bytes(v as i32 as u32)),
                }
            }
        }
    }

    /// Decode whole samples from `bytes` into `out`; returns samples decoded
    pub fn decode(&self, bytes: &[u8], out: ElementsMut<'_>) -> usize {
        let chunks = bytes.chunks_exact(self.width);
        let count = chunks.len().min(out.len());
        match out {
            ElementsMut::Short(dst) => {
                for (d, c) in dst.iter_mut().zip(chunks) {
                    *d = self.decode_one(c).to_i16();
                }
            }
            ElementsMut::Int(dst) => {
                for (d, c) in dst.iter_mut().zip(chunks) {
                    *d = self.decode_one(c).to_i32();
                }
            }
            ElementsMut::Float(dst) => {
                for (d, c) in dst.iter_mut().zip(chunks) {
                    *d = self.decode_one(c).to_f64() as f32;
                }
            }
            ElementsMut::Double(dst) => {
                for (d, c) in dst.iter_mut().zip(chunks) {
                    *d = self.decode_one(c).to_f64();
                }
            }
        }
        count
    }

    /// Encode every element of `input`, appending to `out`
    pub fn encode(&self, input: Elements<'_>, out: &mut Vec<u8>) {
        out.reserve(input.len() * self.width);
        match input {
            Elements::Short(src) => {
                for &v in src {
                    self.encode_one(Raw::Int((v as i32) << 16), out);
                }
            }
            Elements::Int(src) => {
                for &v in src {
                    self.encode_one(Raw::Int(v), out);
                }
            }
            Elements::Float(src) => {
                for &v in src {
                    self.encode_one(Raw::Float(v as f64), out);
                }
            }
            Elements::Double(src) => {
                for &v in src {
                    self.encode_one(Raw::Float(v), out);
                }
            }
        }
    }
}
