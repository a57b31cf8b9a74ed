//! The typed value codec shared by the field reader and the directory writer.
//!
//! Every TIFF field type that carries numbers has a zero-sized marker in [`kinds`]. Reads and
//! writes are generic over the marker, so each destination type gets its own monomorphized
//! decoder and the set of accepted source types is checked at the call site, not through runtime
//! type inspection.

use std::borrow::Cow;
use std::fmt;

use crate::error::{TiffError, TiffFormatError, TiffResult, UsageError};
use crate::tags::{ByteOrder, StreamOffset, Type};
use crate::value::ValueCollection;

/// A TIFF field type that values can be decoded from and encoded to.
pub trait FieldKind {
    /// The in-memory representation of one element.
    type Value: Clone + fmt::Debug + Send + Sync + 'static;

    /// The type written by the directory writer.
    const FIELD_TYPE: Type;

    /// Declared types a validated read accepts, the exact type included. Types narrower than
    /// [`FieldKind::FIELD_TYPE`] are widened on the fly.
    const ACCEPTS: &'static [Type];

    /// Decode one element from native-order bytes of the declared `source` type.
    fn decode(source: Type, native: &[u8]) -> TiffResult<Self::Value>;

    /// Encode one element into `FIELD_TYPE`-sized native-order bytes.
    ///
    /// Fails if the value is not representable in `FIELD_TYPE`.
    fn encode(value: &Self::Value, native: &mut [u8]) -> TiffResult<()>;

    /// Size of one encoded element.
    fn element_len() -> usize {
        usize::from(Self::FIELD_TYPE.byte_len().unwrap_or(1))
    }

    fn accepts(declared: Type) -> bool {
        Self::ACCEPTS.contains(&declared)
    }
}

/// Zero or sign extend an integer of the declared type to 64 bits.
///
/// Signed source types are sign-extended, unsigned ones zero-extended.
fn widen_bits(source: Type, native: &[u8]) -> u64 {
    let signed = source.is_signed();
    match native.len() {
        1 if signed => native[0] as i8 as i64 as u64,
        1 => native[0].into(),
        2 if signed => i16::from_ne_bytes([native[0], native[1]]) as i64 as u64,
        2 => u16::from_ne_bytes([native[0], native[1]]).into(),
        4 if signed => {
            i32::from_ne_bytes([native[0], native[1], native[2], native[3]]) as i64 as u64
        }
        4 => u32::from_ne_bytes([native[0], native[1], native[2], native[3]]).into(),
        _ => {
            let mut buf = [0; 8];
            buf.copy_from_slice(&native[..8]);
            u64::from_ne_bytes(buf)
        }
    }
}

macro_rules! integer_kind {
    ($(#[$attr:meta])* $name:ident, $ty:ty, $field_type:ident, [$($accepts:ident),*]) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug)]
        pub struct $name;

        impl FieldKind for $name {
            type Value = $ty;
            const FIELD_TYPE: Type = Type::$field_type;
            const ACCEPTS: &'static [Type] = &[$(Type::$accepts),*];

            #[inline]
            fn decode(source: Type, native: &[u8]) -> TiffResult<$ty> {
                // Narrowing only happens between types of equal width, where it reinterprets.
                Ok(widen_bits(source, native) as $ty)
            }

            #[inline]
            fn encode(value: &$ty, native: &mut [u8]) -> TiffResult<()> {
                native.copy_from_slice(&value.to_ne_bytes());
                Ok(())
            }
        }
    };
}

/// Marker types for every numeric TIFF field type.
pub mod kinds {
    use super::*;
    use crate::value::{Rational as RationalValue, SRational as SRationalValue};

    integer_kind!(
        /// `BYTE`, also accepting `SBYTE` and `UNDEFINED` data.
        Byte, u8, BYTE, [BYTE, SBYTE, UNDEFINED]
    );
    integer_kind!(
        /// `SBYTE`, also accepting `BYTE` data.
        SByte, i8, SBYTE, [SBYTE, BYTE]
    );
    integer_kind!(
        /// `UNDEFINED`, opaque bytes. Also accepts `BYTE` data.
        Undefined, u8, UNDEFINED, [UNDEFINED, BYTE]
    );
    integer_kind!(
        /// `SHORT`, widening `BYTE` and `SBYTE`.
        Short, u16, SHORT, [SHORT, SSHORT, BYTE, SBYTE]
    );
    integer_kind!(
        /// `SSHORT`, widening `BYTE` and `SBYTE`.
        SShort, i16, SSHORT, [SSHORT, SHORT, BYTE, SBYTE]
    );
    integer_kind!(
        /// `LONG`, widening shorts and bytes.
        Long, u32, LONG, [LONG, SLONG, IFD, SHORT, SSHORT, BYTE, SBYTE]
    );
    integer_kind!(
        /// `SLONG`, widening shorts and bytes.
        SLong, i32, SLONG, [SLONG, LONG, IFD, SHORT, SSHORT, BYTE, SBYTE]
    );
    integer_kind!(
        /// `LONG8`, widening longs, shorts and bytes.
        Long8, u64, LONG8, [LONG8, SLONG8, IFD8, LONG, SLONG, SHORT, SSHORT, BYTE, SBYTE]
    );
    integer_kind!(
        /// `SLONG8`, widening longs, shorts and bytes.
        SLong8, i64, SLONG8, [SLONG8, LONG8, IFD8, LONG, SLONG, SHORT, SSHORT, BYTE, SBYTE]
    );

    /// `IFD`, a 32-bit offset to another directory.
    #[derive(Clone, Copy, Debug)]
    pub struct Ifd;

    impl FieldKind for Ifd {
        type Value = StreamOffset;
        const FIELD_TYPE: Type = Type::IFD;
        const ACCEPTS: &'static [Type] = &[
            Type::IFD,
            Type::LONG,
            Type::SLONG,
            Type::SHORT,
            Type::SSHORT,
            Type::BYTE,
            Type::SBYTE,
        ];

        fn decode(source: Type, native: &[u8]) -> TiffResult<StreamOffset> {
            Ok(StreamOffset::from(widen_bits(source, native) as u32))
        }

        fn encode(value: &StreamOffset, native: &mut [u8]) -> TiffResult<()> {
            let offset = u32::try_from(value.to_u64()?)?;
            native.copy_from_slice(&offset.to_ne_bytes());
            Ok(())
        }
    }

    /// `IFD8`, a 64-bit offset to another directory.
    #[derive(Clone, Copy, Debug)]
    pub struct Ifd8;

    impl FieldKind for Ifd8 {
        type Value = StreamOffset;
        const FIELD_TYPE: Type = Type::IFD8;
        const ACCEPTS: &'static [Type] = &[
            Type::IFD8,
            Type::LONG8,
            Type::SLONG8,
            Type::LONG,
            Type::SLONG,
            Type::SHORT,
            Type::SSHORT,
            Type::BYTE,
            Type::SBYTE,
        ];

        fn decode(source: Type, native: &[u8]) -> TiffResult<StreamOffset> {
            StreamOffset::from_u64(widen_bits(source, native))
        }

        fn encode(value: &StreamOffset, native: &mut [u8]) -> TiffResult<()> {
            native.copy_from_slice(&value.to_u64()?.to_ne_bytes());
            Ok(())
        }
    }

    /// `FLOAT`, no widening.
    #[derive(Clone, Copy, Debug)]
    pub struct Float;

    impl FieldKind for Float {
        type Value = f32;
        const FIELD_TYPE: Type = Type::FLOAT;
        const ACCEPTS: &'static [Type] = &[Type::FLOAT];

        fn decode(_: Type, native: &[u8]) -> TiffResult<f32> {
            Ok(f32::from_ne_bytes([native[0], native[1], native[2], native[3]]))
        }

        fn encode(value: &f32, native: &mut [u8]) -> TiffResult<()> {
            native.copy_from_slice(&value.to_ne_bytes());
            Ok(())
        }
    }

    /// `DOUBLE`, no widening.
    #[derive(Clone, Copy, Debug)]
    pub struct Double;

    impl FieldKind for Double {
        type Value = f64;
        const FIELD_TYPE: Type = Type::DOUBLE;
        const ACCEPTS: &'static [Type] = &[Type::DOUBLE];

        fn decode(_: Type, native: &[u8]) -> TiffResult<f64> {
            let mut buf = [0; 8];
            buf.copy_from_slice(&native[..8]);
            Ok(f64::from_ne_bytes(buf))
        }

        fn encode(value: &f64, native: &mut [u8]) -> TiffResult<()> {
            native.copy_from_slice(&value.to_ne_bytes());
            Ok(())
        }
    }

    /// `RATIONAL`, two unsigned 32-bit integers.
    #[derive(Clone, Copy, Debug)]
    pub struct Rational;

    impl FieldKind for Rational {
        type Value = RationalValue;
        const FIELD_TYPE: Type = Type::RATIONAL;
        const ACCEPTS: &'static [Type] = &[Type::RATIONAL];

        fn decode(_: Type, native: &[u8]) -> TiffResult<RationalValue> {
            Ok(RationalValue {
                n: u32::from_ne_bytes([native[0], native[1], native[2], native[3]]),
                d: u32::from_ne_bytes([native[4], native[5], native[6], native[7]]),
            })
        }

        fn encode(value: &RationalValue, native: &mut [u8]) -> TiffResult<()> {
            native[..4].copy_from_slice(&value.n.to_ne_bytes());
            native[4..8].copy_from_slice(&value.d.to_ne_bytes());
            Ok(())
        }
    }

    /// `SRATIONAL`, two signed 32-bit integers.
    #[derive(Clone, Copy, Debug)]
    pub struct SRational;

    impl FieldKind for SRational {
        type Value = SRationalValue;
        const FIELD_TYPE: Type = Type::SRATIONAL;
        const ACCEPTS: &'static [Type] = &[Type::SRATIONAL];

        fn decode(_: Type, native: &[u8]) -> TiffResult<SRationalValue> {
            Ok(SRationalValue {
                n: i32::from_ne_bytes([native[0], native[1], native[2], native[3]]),
                d: i32::from_ne_bytes([native[4], native[5], native[6], native[7]]),
            })
        }

        fn encode(value: &SRationalValue, native: &mut [u8]) -> TiffResult<()> {
            native[..4].copy_from_slice(&value.n.to_ne_bytes());
            native[4..8].copy_from_slice(&value.d.to_ne_bytes());
            Ok(())
        }
    }
}

/// The type whose layout the stored bytes follow.
///
/// With validation the declared type must be one the read accepts. Without it, the bytes are
/// taken to be of the requested type whatever the entry claims.
pub(crate) fn source_type<K: FieldKind>(declared: Type, skip_type_validation: bool) -> TiffResult<Type> {
    if skip_type_validation {
        return Ok(K::FIELD_TYPE);
    }

    if K::accepts(declared) {
        Ok(declared)
    } else {
        Err(TiffError::UsageError(UsageError::TypeMismatch {
            requested: K::FIELD_TYPE,
            declared,
        }))
    }
}

pub(crate) fn element_len(ty: Type) -> TiffResult<usize> {
    ty.byte_len()
        .map(usize::from)
        .ok_or(TiffError::FormatError(TiffFormatError::UnknownFieldType(ty.to_u16())))
}

/// Decode file-order `bytes` of the `source` type into a value collection.
pub(crate) fn decode_values<K: FieldKind>(
    source: Type,
    bytes: &[u8],
    byte_order: ByteOrder,
) -> TiffResult<ValueCollection<K::Value>> {
    let size = element_len(source)?;
    let native = ByteOrder::native();

    if byte_order == native || size == 1 {
        return bytes
            .chunks_exact(size)
            .map(|chunk| K::decode(source, chunk))
            .collect();
    }

    let mut scratch = [0u8; 8];
    bytes
        .chunks_exact(size)
        .map(|chunk| {
            let scratch = &mut scratch[..size];
            scratch.copy_from_slice(chunk);
            byte_order.convert(source, scratch, native);
            K::decode(source, scratch)
        })
        .collect()
}

/// Decode file-order `bytes` of the `source` type into `dest`, returning the element count.
pub(crate) fn decode_into<K: FieldKind>(
    source: Type,
    bytes: &[u8],
    byte_order: ByteOrder,
    dest: &mut [K::Value],
) -> TiffResult<usize> {
    let size = element_len(source)?;
    let native = ByteOrder::native();
    let mut scratch = [0u8; 8];

    let mut written = 0;
    for (chunk, slot) in bytes.chunks_exact(size).zip(dest.iter_mut()) {
        let scratch = &mut scratch[..size];
        scratch.copy_from_slice(chunk);
        byte_order.convert(source, scratch, native);
        *slot = K::decode(source, scratch)?;
        written += 1;
    }

    Ok(written)
}

/// Encode `values` in file order into `dest`, which must be exactly large enough.
pub(crate) fn encode_values<K: FieldKind>(
    values: &[K::Value],
    byte_order: ByteOrder,
    dest: &mut [u8],
) -> TiffResult<()> {
    let size = K::element_len();
    let native = ByteOrder::native();

    for (value, chunk) in values.iter().zip(dest.chunks_exact_mut(size)) {
        K::encode(value, chunk)?;
    }
    native.convert(K::FIELD_TYPE, dest, byte_order);
    Ok(())
}

/// Split the bytes of an `ASCII` field into its NUL-terminated strings.
///
/// A trailing run without terminator is kept as the last string.
pub(crate) fn split_ascii(bytes: &[u8]) -> ValueCollection<String> {
    fn to_string(bytes: &[u8]) -> String {
        match String::from_utf8_lossy(bytes) {
            Cow::Borrowed(s) => s.to_owned(),
            Cow::Owned(s) => s,
        }
    }

    if bytes.is_empty() {
        return ValueCollection::Empty;
    }

    let first = match bytes.iter().position(|&b| b == 0) {
        None => return ValueCollection::One(to_string(bytes)),
        Some(first) if first == bytes.len() - 1 => {
            return ValueCollection::One(to_string(&bytes[..first]))
        }
        Some(first) => first,
    };

    let rest = &bytes[first + 1..];
    let terminated = rest.last() == Some(&0);
    let body = if terminated {
        &rest[..rest.len() - 1]
    } else {
        rest
    };

    let extra = body.iter().filter(|&&b| b == 0).count() + 1;
    let mut strings = Vec::with_capacity(1 + extra);
    strings.push(to_string(&bytes[..first]));
    strings.extend(body.split(|&b| b == 0).map(to_string));

    ValueCollection::Many(strings)
}

/// Number of bytes `strings` occupy as an `ASCII` field, terminators included.
pub(crate) fn ascii_byte_count<S: AsRef<str>>(strings: &[S]) -> TiffResult<u64> {
    strings.iter().try_fold(0u64, |acc, s| {
        let len = u64::try_from(s.as_ref().len())?;
        acc.checked_add(len)
            .and_then(|n| n.checked_add(1))
            .ok_or(TiffError::Overflow)
    })
}

#[cfg(test)]
mod tests {
    use super::kinds::*;
    use super::*;
    use crate::value::Rational as RationalValue;

    #[test]
    fn ascii_multi_string() {
        let strings = split_ascii(b"foo\0bar\0baz");
        assert_eq!(strings.as_slice(), &["foo", "bar", "baz"]);

        let solo = split_ascii(b"solo\0");
        assert_eq!(solo, ValueCollection::One("solo".to_string()));

        assert_eq!(split_ascii(b"abc").as_slice(), &["abc"]);
        assert_eq!(split_ascii(b"a\0b\0").as_slice(), &["a", "b"]);
        assert_eq!(split_ascii(b"a\0\0").as_slice(), &["a", ""]);
        assert!(split_ascii(b"").is_empty());
    }

    #[test]
    fn widening_zero_and_sign_extends() {
        let bytes = [0xff, 0x01];
        let longs = decode_values::<Long>(Type::BYTE, &bytes, ByteOrder::BigEndian).unwrap();
        assert_eq!(longs.as_slice(), &[255, 1]);

        let slongs = decode_values::<SLong>(Type::SBYTE, &bytes, ByteOrder::BigEndian).unwrap();
        assert_eq!(slongs.as_slice(), &[-1, 1]);

        let shorts = [0xff, 0xfe];
        let long8 = decode_values::<SLong8>(Type::SSHORT, &shorts, ByteOrder::BigEndian).unwrap();
        assert_eq!(long8.as_slice(), &[-2]);
        let long8 = decode_values::<Long8>(Type::SHORT, &shorts, ByteOrder::LittleEndian).unwrap();
        assert_eq!(long8.as_slice(), &[0xfeff]);
    }

    #[test]
    fn both_byte_orders_decode_alike() {
        let le = [0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
        let be = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02];

        let a = decode_values::<Rational>(Type::RATIONAL, &le, ByteOrder::LittleEndian).unwrap();
        let b = decode_values::<Rational>(Type::RATIONAL, &be, ByteOrder::BigEndian).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, ValueCollection::One(RationalValue::new(1, 2)));
    }

    #[test]
    fn encode_matches_decode() {
        let values = [1.5f64, -2.25];
        let mut bytes = [0u8; 16];
        encode_values::<Double>(&values, ByteOrder::BigEndian, &mut bytes).unwrap();
        assert_eq!(&bytes[..8], &1.5f64.to_be_bytes());

        let decoded = decode_values::<Double>(Type::DOUBLE, &bytes, ByteOrder::BigEndian).unwrap();
        assert_eq!(decoded.as_slice(), &values);
    }

    #[test]
    fn validation_matrix() {
        assert!(source_type::<Long>(Type::SHORT, false).is_ok());
        assert!(source_type::<Short>(Type::LONG, false).is_err());
        assert!(source_type::<Long8>(Type::IFD, false).is_err());
        assert!(source_type::<Float>(Type::DOUBLE, false).is_err());
        assert_eq!(source_type::<Float>(Type::LONG, true).unwrap(), Type::FLOAT);
        assert!(matches!(
            source_type::<Double>(Type::FLOAT, false),
            Err(TiffError::UsageError(UsageError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn ifd_values_become_offsets() {
        let bytes = 0x40u32.to_le_bytes();
        let offsets = decode_values::<Ifd>(Type::IFD, &bytes, ByteOrder::LittleEndian).unwrap();
        assert_eq!(offsets, ValueCollection::One(StreamOffset::new(0x40)));

        let too_big = u64::MAX.to_le_bytes();
        assert!(decode_values::<Ifd8>(Type::IFD8, &too_big, ByteOrder::LittleEndian).is_err());
    }

    #[test]
    fn unrepresentable_offsets_are_rejected() {
        let mut slot = [0u8; 8];
        let beyond_32_bits = [StreamOffset::new(0x1_0000_0002)];
        assert!(matches!(
            encode_values::<Ifd>(&beyond_32_bits, ByteOrder::LittleEndian, &mut slot[..4]),
            Err(TiffError::Overflow)
        ));
        encode_values::<Ifd8>(&beyond_32_bits, ByteOrder::LittleEndian, &mut slot).unwrap();
        assert_eq!(slot, 0x1_0000_0002u64.to_le_bytes());

        let negative = [StreamOffset::new(-4)];
        for result in [
            encode_values::<Ifd>(&negative, ByteOrder::BigEndian, &mut slot[..4]),
            encode_values::<Ifd8>(&negative, ByteOrder::BigEndian, &mut slot),
        ] {
            assert!(matches!(
                result,
                Err(TiffError::UsageError(UsageError::NegativeOffset(-4)))
            ));
        }
    }
}
