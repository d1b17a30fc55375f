//! Format word classification
//!
//! A format word packs three disjoint fields into one `u32`:
//!
//! | Field      | Mask         |
//! |------------|--------------|
//! | container  | `0x0FFF0000` |
//! | subtype    | `0x0000FFFF` |
//! | endianness | `0x30000000` |
//!
//! Unknown bit patterns decode to explicit `Unknown` variants instead of
//! failing, because the engine's format space is open-ended.

use std::fmt;
use std::str::FromStr;

/// Mask selecting the sample encoding bits
pub const SUBTYPE_MASK: u32 = 0x0000_FFFF;
/// Mask selecting the container bits
pub const CONTAINER_MASK: u32 = 0x0FFF_0000;
/// Mask selecting the endianness bits
pub const ENDIAN_MASK: u32 = 0x3000_0000;

macro_rules! bit_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $mask:expr, {
            $($(#[$vmeta:meta])* $variant:ident = $bits:expr, $label:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)*
            /// Bit pattern with no known meaning (already masked)
            Unknown(u32),
        }

        impl $name {
            /// Every known variant with its bit pattern and name
            pub const KNOWN: &'static [($name, u32, &'static str)] = &[
                $(($name::$variant, $bits, $label),)*
            ];

            /// Decode from a full format word; foreign bits are ignored
            pub fn from_word(word: u32) -> Self {
                let bits = word & $mask;
                Self::KNOWN
                    .iter()
                    .find(|(_, b, _)| *b == bits)
                    .map(|(v, _, _)| *v)
                    .unwrap_or($name::Unknown(bits))
            }

            /// The masked bit pattern of this variant
            pub fn bits(self) -> u32 {
                match self {
                    $($name::$variant => $bits,)*
                    $name::Unknown(bits) => bits & $mask,
                }
            }

            /// Canonical upper-case name
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)*
                    $name::Unknown(_) => "UNKNOWN",
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $name::Unknown(bits) => write!(f, "UNKNOWN(0x{:08X})", bits),
                    other => f.write_str(other.name()),
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().replace('-', "_").to_ascii_uppercase();
                Self::KNOWN
                    .iter()
                    .find(|(_, _, label)| *label == wanted)
                    .map(|(v, _, _)| *v)
                    .ok_or_else(|| format!("unknown {} '{}'", stringify!($name), s))
            }
        }
    };
}

bit_enum! {
    /// Outer file/stream format
    ContainerType, CONTAINER_MASK, {
        /// Microsoft WAV (little endian default)
        Wav = 0x01_0000, "WAV";
        /// Apple/SGI AIFF (big endian)
        Aiff = 0x02_0000, "AIFF";
        /// Sun/NeXT AU (big endian)
        Au = 0x03_0000, "AU";
        /// Header-less PCM data
        Raw = 0x04_0000, "RAW";
        Paf = 0x05_0000, "PAF";
        Svx = 0x06_0000, "SVX";
        Nist = 0x07_0000, "NIST";
        Voc = 0x08_0000, "VOC";
        Ircam = 0x0A_0000, "IRCAM";
        /// Sonic Foundry's 64 bit RIFF/WAV
        W64 = 0x0B_0000, "W64";
        Mat4 = 0x0C_0000, "MAT4";
        Mat5 = 0x0D_0000, "MAT5";
        Pvf = 0x0E_0000, "PVF";
        Xi = 0x0F_0000, "XI";
        Htk = 0x10_0000, "HTK";
        Sds = 0x11_0000, "SDS";
        Avr = 0x12_0000, "AVR";
        /// MS WAVE with WAVEFORMATEX
        WavEx = 0x13_0000, "WAVEX";
        Sd2 = 0x16_0000, "SD2";
        Flac = 0x17_0000, "FLAC";
        /// Core Audio File
        Caf = 0x18_0000, "CAF";
        Wve = 0x19_0000, "WVE";
        /// Xiph OGG container
        Ogg = 0x20_0000, "OGG";
        Mpc2k = 0x21_0000, "MPC2K";
        Rf64 = 0x22_0000, "RF64";
    }
}

bit_enum! {
    /// Sample encoding within a container
    Subtype, SUBTYPE_MASK, {
        PcmS8 = 0x0001, "PCM_S8";
        Pcm16 = 0x0002, "PCM_16";
        Pcm24 = 0x0003, "PCM_24";
        Pcm32 = 0x0004, "PCM_32";
        /// Unsigned 8 bit data (WAV and RAW only)
        PcmU8 = 0x0005, "PCM_U8";
        Float = 0x0006, "FLOAT";
        Double = 0x0007, "DOUBLE";
        Ulaw = 0x0010, "ULAW";
        Alaw = 0x0011, "ALAW";
        ImaAdpcm = 0x0012, "IMA_ADPCM";
        MsAdpcm = 0x0013, "MS_ADPCM";
        Gsm610 = 0x0020, "GSM610";
        VoxAdpcm = 0x0021, "VOX_ADPCM";
        G721_32 = 0x0030, "G721_32";
        G723_24 = 0x0031, "G723_24";
        G723_40 = 0x0032, "G723_40";
        Dwvw12 = 0x0040, "DWVW_12";
        Dwvw16 = 0x0041, "DWVW_16";
        Dwvw24 = 0x0042, "DWVW_24";
        DwvwN = 0x0043, "DWVW_N";
        Dpcm8 = 0x0050, "DPCM_8";
        Dpcm16 = 0x0051, "DPCM_16";
        Vorbis = 0x0060, "VORBIS";
    }
}

/// Byte order requested for the sample data
///
/// The two endianness bits have exactly four values, so `Unknown` is never
/// produced by `from_word`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Default endianness of the container
    File,
    Little,
    Big,
    /// Endianness of the running CPU
    Cpu,
}

impl Endianness {
    pub const ALL: [Endianness; 4] = [
        Endianness::File,
        Endianness::Little,
        Endianness::Big,
        Endianness::Cpu,
    ];

    pub fn from_word(word: u32) -> Self {
        match word & ENDIAN_MASK {
            0x1000_0000 => Endianness::Little,
            0x2000_0000 => Endianness::Big,
            0x3000_0000 => Endianness::Cpu,
            _ => Endianness::File,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Endianness::File => 0,
            Endianness::Little => 0x1000_0000,
            Endianness::Big => 0x2000_0000,
            Endianness::Cpu => 0x3000_0000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Endianness::File => "FILE",
            Endianness::Little => "LITTLE",
            Endianness::Big => "BIG",
            Endianness::Cpu => "CPU",
        }
    }
}

impl FromStr for Endianness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "default" => Ok(Endianness::File),
            "little" | "le" => Ok(Endianness::Little),
            "big" | "be" => Ok(Endianness::Big),
            "cpu" | "native" => Ok(Endianness::Cpu),
            other => Err(format!("unknown endianness '{}'", other)),
        }
    }
}

impl Subtype {
    /// Bits per stored sample for the linear encodings
    pub fn bits_per_sample(self) -> Option<u16> {
        match self {
            Subtype::PcmS8 | Subtype::PcmU8 => Some(8),
            Subtype::Pcm16 => Some(16),
            Subtype::Pcm24 => Some(24),
            Subtype::Pcm32 | Subtype::Float => Some(32),
            Subtype::Double => Some(64),
            _ => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Subtype::Float | Subtype::Double)
    }
}

/// A packed container/subtype/endianness word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormatWord(pub u32);

impl FormatWord {
    /// Recompose a word from its three fields by bitwise OR
    pub fn compose(container: ContainerType, subtype: Subtype, endian: Endianness) -> Self {
        FormatWord(container.bits() | subtype.bits() | endian.bits())
    }

    /// Decompose a word into its three fields
    pub fn decompose(self) -> (ContainerType, Subtype, Endianness) {
        (self.container(), self.subtype(), self.endianness())
    }

    pub fn container(self) -> ContainerType {
        ContainerType::from_word(self.0)
    }

    pub fn subtype(self) -> Subtype {
        Subtype::from_word(self.0)
    }

    pub fn endianness(self) -> Endianness {
        Endianness::from_word(self.0)
    }

    pub fn with_endianness(self, endian: Endianness) -> Self {
        FormatWord((self.0 & !ENDIAN_MASK) | endian.bits())
    }
}

impl From<u32> for FormatWord {
    fn from(word: u32) -> Self {
        FormatWord(word)
    }
}

impl fmt::Display for FormatWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (container, subtype, endian) = self.decompose();
        write!(f, "{} | {}", container, subtype)?;
        if endian != Endianness::File {
            write!(f, " | {}", endian.name())?;
        }
        Ok(())
    }
}

/// Metadata exchanged with the engine at open time
///
/// In Read mode the engine fills this in; in Write mode the caller supplies
/// `samplerate`, `channels` and `format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamInfo {
    /// Total frames available (read) or written so far (write)
    pub frames: u64,
    pub samplerate: u32,
    pub channels: u32,
    pub format: FormatWord,
    pub sections: u32,
    pub seekable: bool,
}

/// Immutable classification of an open resource's format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    word: FormatWord,
    container: ContainerType,
    subtype: Subtype,
    endianness: Endianness,
    valid: bool,
}

impl FormatDescriptor {
    /// Classify `word`; `valid` records the engine compatibility verdict
    pub fn classify(word: FormatWord, valid: bool) -> Self {
        let (container, subtype, endianness) = word.decompose();
        Self {
            word,
            container,
            subtype,
            endianness,
            valid,
        }
    }

    pub fn word(&self) -> FormatWord {
        self.word
    }

    pub fn container(&self) -> ContainerType {
        self.container
    }

    pub fn subtype(&self) -> Subtype {
        self.subtype
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_masks_are_disjoint() {
        assert_eq!(SUBTYPE_MASK & CONTAINER_MASK, 0);
        assert_eq!(SUBTYPE_MASK & ENDIAN_MASK, 0);
        assert_eq!(CONTAINER_MASK & ENDIAN_MASK, 0);
    }

    #[test]
    fn test_decompose_wav_pcm16() {
        let word = FormatWord(0x0001_0002);
        assert_eq!(
            word.decompose(),
            (ContainerType::Wav, Subtype::Pcm16, Endianness::File)
        );
        assert_eq!(word.to_string(), "WAV | PCM_16");
    }

    #[test]
    fn test_decompose_ogg_vorbis_big() {
        let word = FormatWord(0x2020_0060);
        assert_eq!(word.container(), ContainerType::Ogg);
        assert_eq!(word.subtype(), Subtype::Vorbis);
        assert_eq!(word.endianness(), Endianness::Big);
        assert_eq!(word.to_string(), "OGG | VORBIS | BIG");
    }

    #[test]
    fn test_unknown_bits_are_preserved() {
        let word = FormatWord(0x0FFF_0099);
        assert_eq!(word.container(), ContainerType::Unknown(0x0FFF_0000));
        assert_eq!(word.subtype(), Subtype::Unknown(0x99));
        assert_eq!(
            FormatWord::compose(word.container(), word.subtype(), word.endianness()),
            word
        );
    }

    #[test]
    fn test_with_endianness() {
        let word = FormatWord::compose(ContainerType::Raw, Subtype::Pcm16, Endianness::Little);
        let big = word.with_endianness(Endianness::Big);
        assert_eq!(big.endianness(), Endianness::Big);
        assert_eq!(big.container(), ContainerType::Raw);
        assert_eq!(big.subtype(), Subtype::Pcm16);
    }

    #[test]
    fn test_names_parse_back() {
        assert_eq!("wav".parse::<ContainerType>(), Ok(ContainerType::Wav));
        assert_eq!("pcm-16".parse::<Subtype>(), Ok(Subtype::Pcm16));
        assert_eq!("le".parse::<Endianness>(), Ok(Endianness::Little));
        assert!("mp3".parse::<ContainerType>().is_err());
    }

    #[test]
    fn test_bits_per_sample() {
        assert_eq!(Subtype::PcmU8.bits_per_sample(), Some(8));
        assert_eq!(Subtype::Pcm24.bits_per_sample(), Some(24));
        assert_eq!(Subtype::Double.bits_per_sample(), Some(64));
        assert_eq!(Subtype::Vorbis.bits_per_sample(), None);
        assert!(Subtype::Float.is_float());
        assert!(!Subtype::Pcm32.is_float());
    }

    #[test]
    fn test_every_known_triple_round_trips() {
        for &(container, _, _) in ContainerType::KNOWN {
            for &(subtype, _, _) in Subtype::KNOWN {
                for endian in Endianness::ALL {
                    let word = FormatWord::compose(container, subtype, endian);
                    assert_eq!(word.decompose(), (container, subtype, endian));
                }
            }
        }
    }

    #[test]
    fn test_descriptor_classify() {
        let word = FormatWord::compose(ContainerType::Aiff, Subtype::Pcm24, Endianness::File);
        let desc = FormatDescriptor::classify(word, true);
        assert_eq!(desc.container(), ContainerType::Aiff);
        assert_eq!(desc.subtype(), Subtype::Pcm24);
        assert_eq!(desc.endianness(), Endianness::File);
        assert!(desc.is_valid());
        assert_eq!(desc.word(), word);
    }

    proptest! {
        #[test]
        fn prop_recompose_keeps_masked_bits(word in any::<u32>()) {
            let (c, s, e) = FormatWord(word).decompose();
            let back = FormatWord::compose(c, s, e);
            prop_assert_eq!(back.0, word & (CONTAINER_MASK | SUBTYPE_MASK | ENDIAN_MASK));
            prop_assert_eq!(back.decompose(), (c, s, e));
        }
    }
}
