//! Frame addressing
//!
//! Converts between frame indices and element counts, validates frame
//! ranges, and checks seek targets against the resource length. A frame is
//! one sample per channel, so element counts are always `frames * channels`.

use crate::dispatch::{Sample, SampleBuffer};
use crate::error::{Result, SndError};

/// Reference point for a seek offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekOrigin {
    /// Start of the audio data
    #[default]
    Start,
    /// Current cursor position
    Current,
    /// End of the audio data
    End,
}

impl SeekOrigin {
    /// The stdio `whence` value for this origin
    pub fn whence(self) -> i32 {
        match self {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => 1,
            SeekOrigin::End => 2,
        }
    }

    pub fn from_whence(whence: i32) -> Option<Self> {
        match whence {
            0 => Some(SeekOrigin::Start),
            1 => Some(SeekOrigin::Current),
            2 => Some(SeekOrigin::End),
            _ => None,
        }
    }
}

/// Frame/element arithmetic for one channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAddressSpace {
    channels: u32,
}

impl FrameAddressSpace {
    /// `channels` must be at least 1
    pub fn new(channels: u32) -> Result<Self> {
        if channels == 0 {
            return Err(SndError::InvalidRange(
                "channel count must be at least 1".to_string(),
            ));
        }
        Ok(Self { channels })
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Element count for `frames` frames
    ///
    /// Negative frame counts and products that overflow the engine's signed
    /// 64-bit count (or this platform's `usize`) fail with `InvalidRange`.
    pub fn to_element_count(&self, frames: i64) -> Result<usize> {
        if frames < 0 {
            return Err(SndError::InvalidRange(format!(
                "negative frame count {}",
                frames
            )));
        }
        frames
            .checked_mul(self.channels as i64)
            .and_then(|elements| usize::try_from(elements).ok())
            .ok_or_else(|| {
                SndError::InvalidRange(format!(
                    "{} frames x {} channels overflows the element count",
                    frames, self.channels
                ))
            })
    }

    /// Whole frames contained in `elements` engine elements
    ///
    /// A remainder means the engine handed back a partial frame, which only
    /// happens with a malformed file.
    pub fn frames_in(&self, elements: usize) -> Result<u64> {
        let channels = self.channels as usize;
        if elements % channels != 0 {
            return Err(SndError::MalformedFile {
                elements: elements as u64,
                channels: self.channels,
            });
        }
        Ok((elements / channels) as u64)
    }

    /// Validate a `[start, stop)` frame range and return its length
    pub fn validate_range(start: i64, stop: i64) -> Result<u64> {
        if start < 0 {
            return Err(SndError::InvalidRange(format!(
                "start frame {} is negative",
                start
            )));
        }
        if stop <= start {
            return Err(SndError::InvalidRange(format!(
                "stop frame {} must be greater than start frame {}",
                stop, start
            )));
        }
        Ok((stop - start) as u64)
    }

    /// Absolute frame a seek would land on, checked against `[0, length]`
    ///
    /// `length` itself is a valid target (positioned at end).
    pub fn seek_target(
        position: i64,
        origin: SeekOrigin,
        current: u64,
        length: u64,
    ) -> Result<u64> {
        let base = match origin {
            SeekOrigin::Start => 0i128,
            SeekOrigin::Current => current as i128,
            SeekOrigin::End => length as i128,
        };
        let target = base + position as i128;
        if target < 0 || target > length as i128 {
            return Err(SndError::SeekFailed(format!(
                "frame {} ({:?} {:+}) is outside [0, {}]",
                target, origin, position, length
            )));
        }
        Ok(target as u64)
    }
}

/// Interleaved frames returned by a read
///
/// The storage always holds every requested frame; frames past
/// `frames_read` are zero and carry no data from the resource.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer<S> {
    data: S,
    channels: u32,
    frames_read: u64,
}

impl<S> FrameBuffer<S> {
    pub(crate) fn new(data: S, channels: u32, frames_read: u64) -> Self {
        Self {
            data,
            channels,
            frames_read,
        }
    }

    /// Frames actually delivered by the resource
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// The full interleaved storage, including any zero-filled tail
    pub fn data(&self) -> &S {
        &self.data
    }

    pub fn into_data(self) -> S {
        self.data
    }
}

impl<T: Sample> FrameBuffer<Vec<T>> {
    /// Number of frames the storage was sized for
    pub fn requested_frames(&self) -> u64 {
        (self.data.len() / self.channels as usize) as u64
    }

    /// The elements of frames actually read
    pub fn valid_samples(&self) -> &[T] {
        &self.data[..self.frames_read as usize * self.channels as usize]
    }

    /// One frame (all channels) by index, within the requested span
    pub fn frame(&self, index: usize) -> Option<&[T]> {
        let channels = self.channels as usize;
        let start = index.checked_mul(channels)?;
        self.data.get(start..start + channels)
    }

    /// Samples of a single channel across the requested span
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = T> + '_ {
        let channels = self.channels as usize;
        let skip = if channel < channels {
            channel
        } else {
            self.data.len()
        };
        self.data.iter().skip(skip).step_by(channels).copied()
    }
}

impl FrameBuffer<SampleBuffer> {
    pub fn requested_frames(&self) -> u64 {
        (self.data.len() / self.channels as usize) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_channels_rejected() {
        assert!(matches!(
            FrameAddressSpace::new(0),
            Err(SndError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_element_count() {
        let space = FrameAddressSpace::new(2).unwrap();
        assert_eq!(space.to_element_count(0).unwrap(), 0);
        assert_eq!(space.to_element_count(19968).unwrap(), 39936);
        assert!(matches!(
            space.to_element_count(-1),
            Err(SndError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_element_count_overflow() {
        let space = FrameAddressSpace::new(3).unwrap();
        assert!(matches!(
            space.to_element_count(i64::MAX / 2),
            Err(SndError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_frames_in_remainder_is_malformed() {
        let space = FrameAddressSpace::new(2).unwrap();
        assert_eq!(space.frames_in(10).unwrap(), 5);
        assert_eq!(
            space.frames_in(7),
            Err(SndError::MalformedFile {
                elements: 7,
                channels: 2
            })
        );
    }

    #[test]
    fn test_validate_range() {
        assert_eq!(FrameAddressSpace::validate_range(0, 1).unwrap(), 1);
        assert_eq!(FrameAddressSpace::validate_range(8000, 24000).unwrap(), 16000);
        assert!(FrameAddressSpace::validate_range(5, 5).is_err());
        assert!(FrameAddressSpace::validate_range(6, 5).is_err());
        assert!(FrameAddressSpace::validate_range(-1, 5).is_err());
    }

    #[test]
    fn test_seek_target() {
        assert_eq!(
            FrameAddressSpace::seek_target(10, SeekOrigin::Start, 0, 100).unwrap(),
            10
        );
        assert_eq!(
            FrameAddressSpace::seek_target(-5, SeekOrigin::Current, 20, 100).unwrap(),
            15
        );
        assert_eq!(
            FrameAddressSpace::seek_target(0, SeekOrigin::End, 20, 100).unwrap(),
            100
        );
        assert!(matches!(
            FrameAddressSpace::seek_target(1, SeekOrigin::End, 20, 100),
            Err(SndError::SeekFailed(_))
        ));
        assert!(matches!(
            FrameAddressSpace::seek_target(-21, SeekOrigin::Current, 20, 100),
            Err(SndError::SeekFailed(_))
        ));
    }

    #[test]
    fn test_whence_round_trip() {
        for origin in [SeekOrigin::Start, SeekOrigin::Current, SeekOrigin::End] {
            assert_eq!(SeekOrigin::from_whence(origin.whence()), Some(origin));
        }
        assert_eq!(SeekOrigin::from_whence(3), None);
    }

    #[test]
    fn test_frame_buffer_views() {
        let buf = FrameBuffer::new(vec![1i16, 2, 3, 4, 0, 0], 2, 2);
        assert_eq!(buf.requested_frames(), 3);
        assert_eq!(buf.valid_samples(), &[1, 2, 3, 4]);
        assert_eq!(buf.frame(1), Some(&[3i16, 4][..]));
        assert_eq!(buf.frame(2), Some(&[0i16, 0][..]));
        assert_eq!(buf.frame(3), None);
        assert_eq!(buf.channel(0).collect::<Vec<_>>(), vec![1, 3, 0]);
        assert_eq!(buf.channel(1).collect::<Vec<_>>(), vec![2, 4, 0]);
        assert_eq!(buf.channel(2).count(), 0);
    }

    proptest! {
        #[test]
        fn prop_element_count_is_product(frames in 0i64..1_000_000, channels in 1u32..64) {
            let space = FrameAddressSpace::new(channels).unwrap();
            let elements = space.to_element_count(frames).unwrap();
            prop_assert_eq!(elements as i64, frames * channels as i64);
            prop_assert_eq!(space.frames_in(elements).unwrap(), frames as u64);
        }

        #[test]
        fn prop_invalid_ranges_rejected(start in -1000i64..1000, len in -1000i64..=0) {
            prop_assert!(FrameAddressSpace::validate_range(start, start + len).is_err());
        }
    }
}
