//! Tag ids, field types, stream offsets and byte order of the container.

use std::fmt;

use crate::error::{TiffError, TiffResult, UsageError};

macro_rules! tags {
    {
        // Permit arbitrary meta items, which include documentation.
        $( #[$enum_attr:meta] )*
        $vis:vis enum $name:ident($ty:tt) $(unknown(#[$unknown_meta:meta] $unknown_doc:ident))* {
            // Each of the `Name = Val,` permitting documentation.
            $($(#[$ident_attr:meta])* $tag:ident = $val:expr,)*
        }
    } => {
        $( #[$enum_attr] )*
        #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
        #[non_exhaustive]
        #[repr($ty)]
        pub enum $name {
            $($(#[$ident_attr])* $tag = $val,)*
            $(
                #[$unknown_meta]
                Unknown($ty),
            )*
        }

        impl $name {
            #[inline(always)]
            const fn __from_inner_type(n: $ty) -> Result<Self, $ty> {
                match n {
                    $( $val => Ok($name::$tag), )*
                    n => Err(n),
                }
            }

            #[inline(always)]
            const fn __to_inner_type(&self) -> $ty {
                match *self {
                    $( $name::$tag => $val, )*
                    $( $name::Unknown($unknown_doc) => { $unknown_doc }, )*
                }
            }
        }

        tags!($name, $ty, $($unknown_doc)*);
    };
    // For u16 tags, provide direct inherent primitive conversion methods.
    ($name:tt, u16, $($unknown_doc:ident)*) => {
        impl $name {
            #[inline(always)]
            pub const fn from_u16(val: u16) -> Option<Self> {
                match Self::__from_inner_type(val) {
                    Ok(v) => Some(v),
                    Err(_) => None,
                }
            }

            $(
            #[inline(always)]
            pub const fn from_u16_exhaustive($unknown_doc: u16) -> Self {
                match Self::__from_inner_type($unknown_doc) {
                    Ok(v) => v,
                    Err(_) => $name::Unknown($unknown_doc),
                }
            }
            )*

            #[inline(always)]
            pub const fn to_u16(&self) -> u16 {
                Self::__to_inner_type(self)
            }
        }
    };
    // For other tag types, do nothing for now. With concat_idents one could
    // provide inherent conversion methods for all types.
    ($name:tt, $ty:tt, $($unknown_doc:literal)*) => {};
}

tags! {
/// Well-known TIFF tags.
///
/// Only the ids are listed here. Any tag, known or not, can be read and written through the
/// generic field reader and directory writer.
pub enum Tag(u16) unknown(
    /// A private or extension tag
    unknown
) {
    NewSubfileType = 254,
    SubfileType = 255,
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    ImageDescription = 270,
    Make = 271,
    Model = 272,
    StripOffsets = 273,
    Orientation = 274,
    SamplesPerPixel = 277,
    RowsPerStrip = 278,
    StripByteCounts = 279,
    XResolution = 282,
    YResolution = 283,
    PlanarConfiguration = 284,
    ResolutionUnit = 296,
    Software = 305,
    DateTime = 306,
    Artist = 315,
    HostComputer = 316,
    Predictor = 317,
    ColorMap = 320,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    SubIfd = 330,
    ExtraSamples = 338,
    SampleFormat = 339,
    JPEGTables = 347,
    Copyright = 33_432,
    ExifDirectory = 0x8769,
    GpsDirectory = 0x8825,
    IccProfile = 34675,
    GeoKeyDirectoryTag = 34735,
    GeoDoubleParamsTag = 34736,
    GeoAsciiParamsTag = 34737,
    GdalNodata = 42113,
}
}

tags! {
/// The type of an IFD entry (a 2 byte field).
pub enum Type(u16) unknown(
    /// A type code outside the TIFF and BigTIFF specifications
    unknown
) {
    /// 8-bit unsigned integer
    BYTE = 1,
    /// 8-bit byte that contains a 7-bit ASCII code; the last byte must be zero
    ASCII = 2,
    /// 16-bit unsigned integer
    SHORT = 3,
    /// 32-bit unsigned integer
    LONG = 4,
    /// Fraction stored as two 32-bit unsigned integers
    RATIONAL = 5,
    /// 8-bit signed integer
    SBYTE = 6,
    /// 8-bit byte that may contain anything, depending on the field
    UNDEFINED = 7,
    /// 16-bit signed integer
    SSHORT = 8,
    /// 32-bit signed integer
    SLONG = 9,
    /// Fraction stored as two 32-bit signed integers
    SRATIONAL = 10,
    /// 32-bit IEEE floating point
    FLOAT = 11,
    /// 64-bit IEEE floating point
    DOUBLE = 12,
    /// 32-bit unsigned integer (offset)
    IFD = 13,
    /// BigTIFF 64-bit unsigned integer
    LONG8 = 16,
    /// BigTIFF 64-bit signed integer
    SLONG8 = 17,
    /// BigTIFF 64-bit unsigned integer (offset)
    IFD8 = 18,
}
}

impl Type {
    /// Size of one element of this type, `None` for unknown type codes.
    pub fn byte_len(&self) -> Option<u8> {
        Some(match *self {
            Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED => 1,
            Type::SHORT | Type::SSHORT => 2,
            Type::LONG | Type::SLONG | Type::FLOAT | Type::IFD => 4,
            Type::LONG8
            | Type::SLONG8
            | Type::DOUBLE
            | Type::RATIONAL
            | Type::SRATIONAL
            | Type::IFD8 => 8,
            Type::Unknown(_) => return None,
        })
    }

    /// Width of the units that are byte swapped. Rationals swap each 32-bit half separately.
    pub(crate) fn endian_bytes(self) -> EndianBytes {
        match self {
            Type::SHORT | Type::SSHORT => EndianBytes::Two,
            Type::LONG
            | Type::SLONG
            | Type::FLOAT
            | Type::IFD
            | Type::RATIONAL
            | Type::SRATIONAL => EndianBytes::Four,
            Type::LONG8 | Type::SLONG8 | Type::DOUBLE | Type::IFD8 => EndianBytes::Eight,
            Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED | Type::Unknown(_) => {
                EndianBytes::One
            }
        }
    }

    /// Whether integers of this type are sign-extended when widened.
    pub(crate) fn is_signed(self) -> bool {
        matches!(
            self,
            Type::SBYTE | Type::SSHORT | Type::SLONG | Type::SLONG8 | Type::SRATIONAL
        )
    }
}

/// Byte length of `count` values of `ty`.
///
/// Returns `None` for unknown types and for counts whose byte length does not fit 64 bits.
pub fn try_determine_value_length(ty: Type, count: u64) -> Option<u64> {
    count.checked_mul(u64::from(ty.byte_len()?))
}

/// An absolute byte position in the container stream.
///
/// Offsets are compared by value and never dereferenced directly, every access goes through a
/// content reader or writer.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamOffset(i64);

impl StreamOffset {
    /// The offset `0`, which marks the end of an IFD chain.
    pub const ZERO: StreamOffset = StreamOffset(0);

    pub const fn new(offset: i64) -> Self {
        StreamOffset(offset)
    }

    /// Wrap an unsigned offset as it is stored in the file.
    pub fn from_u64(offset: u64) -> TiffResult<Self> {
        Ok(StreamOffset(i64::try_from(offset)?))
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The offset as an unsigned stream position.
    pub fn to_u64(self) -> TiffResult<u64> {
        u64::try_from(self.0)
            .map_err(|_| TiffError::UsageError(UsageError::NegativeOffset(self.0)))
    }

    /// Move the offset forward by `len` bytes.
    pub fn checked_add(self, len: u64) -> TiffResult<Self> {
        let len = i64::try_from(len)?;
        self.0
            .checked_add(len)
            .map(StreamOffset)
            .ok_or(TiffError::Overflow)
    }

    pub fn is_word_aligned(self) -> bool {
        self.0 % 2 == 0
    }
}

impl fmt::Debug for StreamOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamOffset({:#x})", self.0)
    }
}

impl fmt::Display for StreamOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StreamOffset {
    fn from(offset: u32) -> Self {
        StreamOffset(offset.into())
    }
}

/// Byte order of the TIFF file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// little endian byte order
    LittleEndian,
    /// big endian byte order
    BigEndian,
}

impl ByteOrder {
    /// Get the byte order representing the running target.
    pub const fn native() -> Self {
        match () {
            #[cfg(target_endian = "little")]
            () => ByteOrder::LittleEndian,
            #[cfg(target_endian = "big")]
            () => ByteOrder::BigEndian,
        }
    }

    pub const fn is_little_endian(self) -> bool {
        matches!(self, ByteOrder::LittleEndian)
    }

    pub const fn from_little_endian(little_endian: bool) -> Self {
        if little_endian {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }

    /// Given a typed buffer, convert its contents to the specified byte order in-place.
    ///
    /// The buffer is assumed to represent an array of the given type. Trailing bytes that do not
    /// form a whole unit are left untouched.
    pub fn convert(self, ty: Type, buffer: &mut [u8], to: ByteOrder) {
        if self == to {
            return;
        }

        match ty.endian_bytes() {
            EndianBytes::One => {}
            EndianBytes::Two => buffer.chunks_exact_mut(2).for_each(<[u8]>::reverse),
            EndianBytes::Four => buffer.chunks_exact_mut(4).for_each(<[u8]>::reverse),
            EndianBytes::Eight => buffer.chunks_exact_mut(8).for_each(<[u8]>::reverse),
        }
    }

    pub(crate) fn u16_from(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
        }
    }

    pub(crate) fn u32_from(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
        }
    }

    pub(crate) fn u64_from(self, bytes: [u8; 8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(bytes),
            ByteOrder::BigEndian => u64::from_be_bytes(bytes),
        }
    }

    pub(crate) fn u16_bytes(self, n: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => n.to_le_bytes(),
            ByteOrder::BigEndian => n.to_be_bytes(),
        }
    }

    pub(crate) fn u32_bytes(self, n: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => n.to_le_bytes(),
            ByteOrder::BigEndian => n.to_be_bytes(),
        }
    }

    pub(crate) fn u64_bytes(self, n: u64) -> [u8; 8] {
        match self {
            ByteOrder::LittleEndian => n.to_le_bytes(),
            ByteOrder::BigEndian => n.to_be_bytes(),
        }
    }

    /// Read an unsigned integer of `bytes.len()` (1, 2, 4 or 8) bytes, zero-extended.
    pub(crate) fn read_uint(self, bytes: &[u8]) -> u64 {
        match bytes.len() {
            1 => bytes[0].into(),
            2 => self.u16_from([bytes[0], bytes[1]]).into(),
            4 => self.u32_from([bytes[0], bytes[1], bytes[2], bytes[3]]).into(),
            _ => {
                let mut buf = [0; 8];
                buf.copy_from_slice(&bytes[..8]);
                self.u64_from(buf)
            }
        }
    }

    /// Write the low `dest.len()` (1, 2, 4 or 8) bytes of `n`.
    pub(crate) fn write_uint(self, n: u64, dest: &mut [u8]) {
        match dest.len() {
            1 => dest[0] = n as u8,
            2 => dest.copy_from_slice(&self.u16_bytes(n as u16)),
            4 => dest.copy_from_slice(&self.u32_bytes(n as u32)),
            _ => dest[..8].copy_from_slice(&self.u64_bytes(n)),
        }
    }
}

/// The size of individual byte-order corrected elements.
#[derive(Clone, Copy)]
pub(crate) enum EndianBytes {
    One,
    Two,
    Four,
    Eight,
}
