//! The fixed prologue of a TIFF or BigTIFF container.

use crate::context::{OperationContext, TiffKind};
use crate::error::{TiffError, TiffFormatError, TiffResult};
use crate::tags::{ByteOrder, StreamOffset};

/// Byte order marker of little endian files, "II".
pub const LITTLE_ENDIAN_MARKER: u16 = 0x4949;
/// Byte order marker of big endian files, "MM".
pub const BIG_ENDIAN_MARKER: u16 = 0x4d4d;

/// Maximum length of any header, enough to probe both variants at once.
pub const MAX_HEADER_LEN: usize = 16;

/// A parsed container header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    byte_order: ByteOrder,
    kind: TiffKind,
    first_ifd_offset: StreamOffset,
}

impl Header {
    pub fn new(byte_order: ByteOrder, kind: TiffKind, first_ifd_offset: StreamOffset) -> Self {
        Header {
            byte_order,
            kind,
            first_ifd_offset,
        }
    }

    /// Probe `bytes` for a TIFF or BigTIFF header.
    ///
    /// Returns `None` when the bytes do not start with a well-formed header. This is a detection
    /// probe, deciding whether "not a TIFF" is fatal is up to the caller.
    pub fn try_parse(bytes: &[u8]) -> Option<Header> {
        if bytes.len() < 8 {
            return None;
        }

        // The marker is a palindrome so its byte order does not matter.
        let byte_order = match u16::from_le_bytes([bytes[0], bytes[1]]) {
            LITTLE_ENDIAN_MARKER => ByteOrder::LittleEndian,
            BIG_ENDIAN_MARKER => ByteOrder::BigEndian,
            _ => return None,
        };

        let kind = TiffKind::from_version(byte_order.u16_from([bytes[2], bytes[3]]))?;
        let first_ifd = match kind {
            TiffKind::Classic => byte_order.read_uint(&bytes[4..8]),
            TiffKind::Big => {
                if bytes.len() < 16 {
                    return None;
                }
                // Byte size of offsets, always 8 for now.
                if byte_order.u16_from([bytes[4], bytes[5]]) != 8 {
                    return None;
                }
                // Reserved, must be 0.
                if byte_order.u16_from([bytes[6], bytes[7]]) != 0 {
                    return None;
                }
                byte_order.read_uint(&bytes[8..16])
            }
        };

        let first_ifd_offset = StreamOffset::from_u64(first_ifd).ok()?;
        let header_len = kind.header_len() as i64;
        if first_ifd_offset.get() < header_len || !first_ifd_offset.is_word_aligned() {
            return None;
        }

        Some(Header {
            byte_order,
            kind,
            first_ifd_offset,
        })
    }

    /// Like [`Header::try_parse`] but reports a missing signature as a format error.
    pub fn parse(bytes: &[u8]) -> TiffResult<Header> {
        Header::try_parse(bytes)
            .ok_or(TiffError::FormatError(TiffFormatError::TiffSignatureNotFound))
    }

    /// Serialize a header into `buffer`, returning the number of bytes written.
    ///
    /// `buffer` must hold at least 8 bytes for classic TIFF and 16 bytes for BigTIFF. Classic
    /// headers reject an `ifd_offset` beyond the 32-bit range.
    pub fn write(
        buffer: &mut [u8],
        ifd_offset: StreamOffset,
        little_endian: bool,
        use_bigtiff: bool,
    ) -> TiffResult<usize> {
        let byte_order = ByteOrder::from_little_endian(little_endian);
        let kind = if use_bigtiff {
            TiffKind::Big
        } else {
            TiffKind::Classic
        };

        let len = kind.header_len();
        if buffer.len() < len {
            return Err(TiffError::FormatError(
                TiffFormatError::InconsistentSizesEncountered,
            ));
        }

        let marker = if little_endian {
            LITTLE_ENDIAN_MARKER
        } else {
            BIG_ENDIAN_MARKER
        };
        buffer[0..2].copy_from_slice(&marker.to_le_bytes());
        buffer[2..4].copy_from_slice(&byte_order.u16_bytes(kind.version()));

        let offset = ifd_offset.to_u64()?;
        match kind {
            TiffKind::Classic => {
                let offset = u32::try_from(offset)?;
                buffer[4..8].copy_from_slice(&byte_order.u32_bytes(offset));
            }
            TiffKind::Big => {
                buffer[4..6].copy_from_slice(&byte_order.u16_bytes(8));
                buffer[6..8].copy_from_slice(&byte_order.u16_bytes(0));
                buffer[8..16].copy_from_slice(&byte_order.u64_bytes(offset));
            }
        }

        Ok(len)
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn is_little_endian(&self) -> bool {
        self.byte_order.is_little_endian()
    }

    pub fn kind(&self) -> TiffKind {
        self.kind
    }

    pub fn is_bigtiff(&self) -> bool {
        self.kind.is_big()
    }

    /// Width of offsets in this container, 4 or 8 bytes.
    pub fn offset_field_width(&self) -> usize {
        self.kind.offset_field_width()
    }

    pub fn first_ifd_offset(&self) -> StreamOffset {
        self.first_ifd_offset
    }

    pub fn create_operation_context(&self) -> OperationContext {
        OperationContext::new(self.byte_order, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classic_little_endian() {
        let header = Header::try_parse(&[0x49, 0x49, 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00]).unwrap();
        assert!(header.is_little_endian());
        assert!(!header.is_bigtiff());
        assert_eq!(header.first_ifd_offset(), StreamOffset::new(8));
    }

    #[test]
    fn parse_classic_big_endian() {
        let header = Header::try_parse(b"MM\x00\x2a\x00\x00\x01\x00").unwrap();
        assert_eq!(header.byte_order(), ByteOrder::BigEndian);
        assert_eq!(header.first_ifd_offset(), StreamOffset::new(256));
    }

    #[test]
    fn parse_bigtiff() {
        let bytes = [
            0x49, 0x49, 0x2b, 0x00, 0x08, 0x00, 0x00, 0x00, 0x10, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::try_parse(&bytes).unwrap();
        assert!(header.is_bigtiff());
        assert_eq!(header.offset_field_width(), 8);
        assert_eq!(header.first_ifd_offset(), StreamOffset::new(16));
        assert_eq!(header.create_operation_context().count_field_width(), 8);
    }

    #[test]
    fn reject_malformed() {
        // Unknown marker.
        assert!(Header::try_parse(b"IM\x2a\x00\x08\x00\x00\x00").is_none());
        // Unknown version.
        assert!(Header::try_parse(b"II\x2c\x00\x08\x00\x00\x00").is_none());
        // Truncated.
        assert!(Header::try_parse(b"II\x2a\x00").is_none());
        // BigTIFF with a 4-byte offset width.
        assert!(Header::try_parse(b"II\x2b\x00\x04\x00\x00\x00\x10\0\0\0\0\0\0\0").is_none());
        // BigTIFF with the reserved field set.
        assert!(Header::try_parse(b"II\x2b\x00\x08\x00\x01\x00\x10\0\0\0\0\0\0\0").is_none());
        // First IFD inside the header.
        assert!(Header::try_parse(b"II\x2a\x00\x04\x00\x00\x00").is_none());
        // Odd first IFD.
        assert!(Header::try_parse(b"II\x2a\x00\x09\x00\x00\x00").is_none());
        assert!(Header::parse(b"nope").is_err());
    }

    #[test]
    fn write_is_inverse_of_parse() {
        for (little_endian, bigtiff) in [(true, false), (false, false), (true, true), (false, true)]
        {
            let mut buf = [0u8; MAX_HEADER_LEN];
            let len = Header::write(&mut buf, StreamOffset::new(0x1234), little_endian, bigtiff)
                .unwrap();
            assert_eq!(len, if bigtiff { 16 } else { 8 });

            let header = Header::try_parse(&buf[..len]).unwrap();
            assert_eq!(header.is_little_endian(), little_endian);
            assert_eq!(header.is_bigtiff(), bigtiff);
            assert_eq!(header.first_ifd_offset(), StreamOffset::new(0x1234));
        }
    }

    #[test]
    fn classic_rejects_wide_offsets() {
        let mut buf = [0u8; MAX_HEADER_LEN];
        let offset = StreamOffset::new(i64::from(u32::MAX) + 2);
        assert!(matches!(
            Header::write(&mut buf, offset, true, false),
            Err(TiffError::Overflow)
        ));
        assert!(Header::write(&mut buf, offset, true, true).is_ok());
    }
}
