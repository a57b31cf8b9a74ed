//! Directory entries: the fixed-size records of an IFD.

use std::fmt;

use crate::context::OperationContext;
use crate::error::{TiffError, TiffFormatError, TiffResult};
use crate::tags::{try_determine_value_length, StreamOffset, Tag, Type};

/// One tag/value descriptor of an Image File Directory.
///
/// An entry has four fields:
//
// Tag   2 bytes
// Type  2 bytes
// Count 4 bytes (8 bytes in BigTIFF)
// Value 4 bytes (8 bytes in BigTIFF) either a pointer or the value itself
///
/// The value/offset slot is kept as a host integer, decoded in the byte order of the file. The
/// original slot bytes can be recovered with [`DirectoryEntry::restore_raw_offset_bytes`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectoryEntry {
    tag: u16,
    field_type: Type,
    value_count: u64,
    value_offset: u64,
}

impl DirectoryEntry {
    /// Create an entry from already decoded fields.
    pub fn new(tag: Tag, field_type: Type, value_count: u64, value_offset: u64) -> Self {
        DirectoryEntry {
            tag: tag.to_u16(),
            field_type,
            value_count,
            value_offset,
        }
    }

    /// Create an entry whose values are stored left-justified in `slot`.
    ///
    /// `slot` must be at least `context.offset_field_width()` bytes long, bytes past the values
    /// are expected to be zero.
    pub fn new_inline(
        context: &OperationContext,
        tag: Tag,
        field_type: Type,
        value_count: u64,
        slot: &[u8],
    ) -> Self {
        let width = context.offset_field_width();
        let value_offset = context.byte_order().read_uint(&slot[..width]);
        DirectoryEntry::new(tag, field_type, value_count, value_offset)
    }

    /// Parse one entry from its 12 (classic) or 20 (BigTIFF) raw bytes.
    ///
    /// Returns `None` if `bytes` is shorter than one entry.
    pub fn try_parse(context: &OperationContext, bytes: &[u8]) -> Option<DirectoryEntry> {
        if bytes.len() < context.entry_field_length() {
            return None;
        }

        let bo = context.byte_order();
        let tag = bo.u16_from([bytes[0], bytes[1]]);
        let field_type = Type::from_u16_exhaustive(bo.u16_from([bytes[2], bytes[3]]));

        let width = context.offset_field_width();
        let value_count = bo.read_uint(&bytes[4..4 + width]);
        let value_offset = bo.read_uint(&bytes[4 + width..4 + 2 * width]);

        Some(DirectoryEntry {
            tag,
            field_type,
            value_count,
            value_offset,
        })
    }

    /// Serialize this entry into `dest`, returning the number of bytes written (12 or 20).
    ///
    /// A classic TIFF entry whose count or slot does not fit 32 bits fails with
    /// [`TiffError::Overflow`].
    pub fn write(&self, context: &OperationContext, dest: &mut [u8]) -> TiffResult<usize> {
        let limit = u64::from(u32::MAX);
        if !context.is_big() && (self.value_count > limit || self.value_offset > limit) {
            return Err(TiffError::Overflow);
        }
        self.write_truncated(context, dest)
    }

    /// Like [`DirectoryEntry::write`], but keeps only the low 32 bits of count and slot in
    /// classic TIFF. Only for writers that already refuse to finish the file.
    pub(crate) fn write_truncated(
        &self,
        context: &OperationContext,
        dest: &mut [u8],
    ) -> TiffResult<usize> {
        let len = context.entry_field_length();
        if dest.len() < len {
            return Err(TiffError::FormatError(
                TiffFormatError::InconsistentSizesEncountered,
            ));
        }

        let bo = context.byte_order();
        let width = context.offset_field_width();
        dest[0..2].copy_from_slice(&bo.u16_bytes(self.tag));
        dest[2..4].copy_from_slice(&bo.u16_bytes(self.field_type.to_u16()));
        bo.write_uint(self.value_count, &mut dest[4..4 + width]);
        bo.write_uint(self.value_offset, &mut dest[4 + width..len]);

        Ok(len)
    }

    /// Reconstruct the value/offset slot exactly as it appears in the stream.
    ///
    /// Writes `context.offset_field_width()` bytes and returns that count.
    pub fn restore_raw_offset_bytes(&self, context: &OperationContext, dest: &mut [u8]) -> usize {
        let width = context.offset_field_width();
        context
            .byte_order()
            .write_uint(self.value_offset, &mut dest[..width]);
        width
    }

    pub fn tag(&self) -> Tag {
        Tag::from_u16_exhaustive(self.tag)
    }

    pub fn tag_id(&self) -> u16 {
        self.tag
    }

    pub fn field_type(&self) -> Type {
        self.field_type
    }

    /// Number of values, not bytes.
    pub fn value_count(&self) -> u64 {
        self.value_count
    }

    /// The slot interpreted as an integer.
    pub fn raw_value_offset(&self) -> u64 {
        self.value_offset
    }

    /// The slot interpreted as a stream offset, meaningful for entries stored out-of-line.
    pub fn value_offset(&self) -> TiffResult<StreamOffset> {
        StreamOffset::from_u64(self.value_offset)
    }

    /// Byte length of all values, `None` for unknown types or overflowing counts.
    pub fn value_byte_length(&self) -> Option<u64> {
        try_determine_value_length(self.field_type, self.value_count)
    }

    /// Whether the values live inside the slot rather than elsewhere in the stream.
    pub fn is_inline(&self, context: &OperationContext) -> Option<bool> {
        let len = self.value_byte_length()?;
        Some(len <= context.offset_field_width() as u64)
    }
}

impl fmt::Debug for DirectoryEntry {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("DirectoryEntry")
            .field("tag", &self.tag())
            .field("type", &self.field_type)
            .field("count", &self.value_count)
            .field("offset", &format_args!("{:#x}", self.value_offset))
            .finish()
    }
}
