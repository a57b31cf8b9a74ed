use std::collections::BTreeMap;

use crate::content::{CancellationToken, ContentWriter};
use crate::error::{TiffError, TiffResult};
use crate::field::{self, kinds, FieldKind};
use crate::ifd::DirectoryEntry;
use crate::tags::{StreamOffset, Tag, Type};

use super::TiffFileWriter;

/// Low level interface to encode ifd directories.
///
/// Fields are collected by tag, writing a tag again replaces the earlier entry. Values that fit
/// the entry's slot are stored inline without any I/O. Larger values are written to the file
/// immediately, only the directory itself waits for [`flush`](DirectoryWriter::flush).
///
/// Entries are written in ascending tag order.
pub struct DirectoryWriter<'a, W> {
    writer: &'a mut TiffFileWriter<W>,
    entries: BTreeMap<u16, DirectoryEntry>,
}

impl<'a, W: ContentWriter> DirectoryWriter<'a, W> {
    pub(crate) fn new(writer: &'a mut TiffFileWriter<W>) -> Self {
        DirectoryWriter {
            writer,
            entries: BTreeMap::new(),
        }
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag.to_u16())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, tag: Tag) -> Option<&DirectoryEntry> {
        self.entries.get(&tag.to_u16())
    }

    /// Drop a pending entry. Out-of-line values it pointed to stay in the file.
    pub fn remove(&mut self, tag: Tag) -> Option<DirectoryEntry> {
        self.entries.remove(&tag.to_u16())
    }

    /// Add a prepared entry, for example one pointing at data written with
    /// [`TiffFileWriter::write_aligned_bytes`].
    pub fn write_entry(&mut self, entry: DirectoryEntry) {
        self.entries.insert(entry.tag_id(), entry);
    }

    /// The entry for `values` if they fit its slot.
    fn inline_entry<K: FieldKind>(
        &self,
        tag: Tag,
        values: &[K::Value],
    ) -> TiffResult<Option<DirectoryEntry>> {
        let ctx = self.writer.context();
        let len = values
            .len()
            .checked_mul(K::element_len())
            .ok_or(TiffError::Overflow)?;
        if len > ctx.offset_field_width() {
            return Ok(None);
        }

        let mut slot = [0u8; 8];
        field::encode_values::<K>(values, ctx.byte_order(), &mut slot[..len])?;
        Ok(Some(DirectoryEntry::new_inline(
            ctx,
            tag,
            K::FIELD_TYPE,
            values.len() as u64,
            &slot,
        )))
    }

    fn pointer_entry(
        tag: Tag,
        ty: Type,
        count: usize,
        offset: StreamOffset,
    ) -> TiffResult<DirectoryEntry> {
        Ok(DirectoryEntry::new(tag, ty, count as u64, offset.to_u64()?))
    }

    /// Write `values` as a field of type `K`.
    pub fn write_field<K: FieldKind>(&mut self, tag: Tag, values: &[K::Value]) -> TiffResult<()> {
        let entry = match self.inline_entry::<K>(tag, values)? {
            Some(entry) => entry,
            None => {
                let offset = self.writer.write_aligned_values::<K>(values)?;
                Self::pointer_entry(tag, K::FIELD_TYPE, values.len(), offset)?
            }
        };
        self.write_entry(entry);
        Ok(())
    }

    pub async fn write_field_async<K: FieldKind>(
        &mut self,
        tag: Tag,
        values: &[K::Value],
        cancel: &CancellationToken,
    ) -> TiffResult<()> {
        let entry = match self.inline_entry::<K>(tag, values)? {
            Some(entry) => entry,
            None => {
                let offset = self
                    .writer
                    .write_aligned_values_async::<K>(values, cancel)
                    .await?;
                Self::pointer_entry(tag, K::FIELD_TYPE, values.len(), offset)?
            }
        };
        self.write_entry(entry);
        Ok(())
    }

    /// Write `strings` as one `ASCII` field, each terminated by a NUL.
    ///
    /// Strings are written as their UTF-8 bytes.
    pub fn write_ascii<S: AsRef<str>>(&mut self, tag: Tag, strings: &[S]) -> TiffResult<()> {
        let count = field::ascii_byte_count(strings)?;
        let entry = match self.inline_ascii(tag, strings, count) {
            Some(entry) => entry,
            None => {
                let offset = self.writer.align()?;
                let mut scratch = vec![0u8; max_byte_count(strings)];
                for s in strings {
                    let len = fill_terminated(&mut scratch, s.as_ref());
                    self.writer.append_bytes(&scratch[..len])?;
                }
                DirectoryEntry::new(tag, Type::ASCII, count, offset.to_u64()?)
            }
        };
        self.write_entry(entry);
        Ok(())
    }

    pub async fn write_ascii_async<S: AsRef<str>>(
        &mut self,
        tag: Tag,
        strings: &[S],
        cancel: &CancellationToken,
    ) -> TiffResult<()> {
        let count = field::ascii_byte_count(strings)?;
        let entry = match self.inline_ascii(tag, strings, count) {
            Some(entry) => entry,
            None => {
                let offset = self.writer.align_async(cancel).await?;
                let mut scratch = vec![0u8; max_byte_count(strings)];
                for s in strings {
                    let len = fill_terminated(&mut scratch, s.as_ref());
                    self.writer
                        .append_bytes_async(&scratch[..len], cancel)
                        .await?;
                }
                DirectoryEntry::new(tag, Type::ASCII, count, offset.to_u64()?)
            }
        };
        self.write_entry(entry);
        Ok(())
    }

    fn inline_ascii<S: AsRef<str>>(
        &self,
        tag: Tag,
        strings: &[S],
        count: u64,
    ) -> Option<DirectoryEntry> {
        let ctx = self.writer.context();
        if count > ctx.offset_field_width() as u64 {
            return None;
        }

        let mut slot = [0u8; 8];
        let mut at = 0;
        for s in strings {
            at += fill_terminated(&mut slot[at..], s.as_ref());
        }
        Some(DirectoryEntry::new_inline(ctx, tag, Type::ASCII, count, &slot))
    }

    /// Write the directory and link it after the previously written one.
    ///
    /// Returns the offset of the directory.
    pub fn flush(self) -> TiffResult<StreamOffset> {
        let entries: Vec<_> = self.entries.into_values().collect();
        self.writer.append_directory(&entries)
    }

    pub async fn flush_async(self, cancel: &CancellationToken) -> TiffResult<StreamOffset> {
        let entries: Vec<_> = self.entries.into_values().collect();
        self.writer.append_directory_async(&entries, cancel).await
    }
}

/// The largest encoded string, terminator included.
fn max_byte_count<S: AsRef<str>>(strings: &[S]) -> usize {
    strings
        .iter()
        .map(|s| s.as_ref().len() + 1)
        .max()
        .unwrap_or(0)
}

/// Copy `s` and a NUL into `dest`, returning the bytes used.
fn fill_terminated(dest: &mut [u8], s: &str) -> usize {
    let len = s.len();
    dest[..len].copy_from_slice(s.as_bytes());
    dest[len] = 0;
    len + 1
}

macro_rules! typed_writes {
    ($($kind:ident: $write:ident, $write_async:ident;)*) => {
        impl<'a, W: ContentWriter> DirectoryWriter<'a, W> {
            $(
                #[doc = concat!("Write a field of type [`kinds::", stringify!($kind), "`].")]
                pub fn $write(
                    &mut self,
                    tag: Tag,
                    values: &[<kinds::$kind as FieldKind>::Value],
                ) -> TiffResult<()> {
                    self.write_field::<kinds::$kind>(tag, values)
                }

                pub async fn $write_async(
                    &mut self,
                    tag: Tag,
                    values: &[<kinds::$kind as FieldKind>::Value],
                    cancel: &CancellationToken,
                ) -> TiffResult<()> {
                    self.write_field_async::<kinds::$kind>(tag, values, cancel).await
                }
            )*
        }
    };
}

typed_writes! {
    Byte: write_byte, write_byte_async;
    SByte: write_sbyte, write_sbyte_async;
    Undefined: write_undefined, write_undefined_async;
    Short: write_short, write_short_async;
    SShort: write_sshort, write_sshort_async;
    Long: write_long, write_long_async;
    SLong: write_slong, write_slong_async;
    Long8: write_long8, write_long8_async;
    SLong8: write_slong8, write_slong8_async;
    Rational: write_rational, write_rational_async;
    SRational: write_srational, write_srational_async;
    Float: write_float, write_float_async;
    Double: write_double, write_double_async;
    Ifd: write_ifd, write_ifd_async;
    Ifd8: write_ifd8, write_ifd8_async;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryWriter;
    use crate::encoder::WriterOptions;

    fn writer() -> TiffFileWriter<MemoryWriter> {
        TiffFileWriter::new(MemoryWriter::new(), WriterOptions::default().little_endian())
    }

    #[test]
    fn inline_boundary() {
        let mut file = writer();
        let ctx = *file.context();

        let mut dir = file.create_directory().unwrap();
        dir.write_short(Tag::BitsPerSample, &[8, 16]).unwrap();
        let entry = *dir.entry(Tag::BitsPerSample).unwrap();
        let mut slot = [0u8; 4];
        entry.restore_raw_offset_bytes(&ctx, &mut slot);
        assert_eq!(slot, [8, 0, 16, 0]);
        // Nothing but the directory itself was written.
        assert_eq!(dir.flush().unwrap(), StreamOffset::new(8));

        let mut dir = file.create_directory().unwrap();
        dir.write_short(Tag::ColorMap, &[1, 2, 3]).unwrap();
        let entry = *dir.entry(Tag::ColorMap).unwrap();
        assert_eq!(entry.raw_value_offset(), 26);
        assert_eq!(dir.flush().unwrap(), StreamOffset::new(32));
    }

    #[test]
    fn last_write_wins() {
        let mut file = writer();
        let mut dir = file.create_directory().unwrap();
        dir.write_long(Tag::ImageWidth, &[10]).unwrap();
        dir.write_short(Tag::ImageWidth, &[20]).unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.entry(Tag::ImageWidth).unwrap().field_type(), Type::SHORT);

        assert!(dir.remove(Tag::ImageWidth).is_some());
        assert!(dir.is_empty());
    }

    #[test]
    fn ascii_inline_and_out_of_line() {
        let mut file = writer();
        let mut dir = file.create_directory().unwrap();
        dir.write_ascii(Tag::Make, &["ab", ""]).unwrap();
        let entry = *dir.entry(Tag::Make).unwrap();
        assert_eq!(entry.value_count(), 4);
        assert_eq!(entry.raw_value_offset(), u64::from(u32::from_le_bytes(*b"ab\0\0")));

        dir.write_ascii(Tag::Software, &["tiff", "container"]).unwrap();
        let entry = *dir.entry(Tag::Software).unwrap();
        assert_eq!(entry.value_count(), 15);
        assert_eq!(entry.raw_value_offset(), 8);
        dir.flush().unwrap();

        assert_eq!(&file.get_ref().as_slice()[8..23], b"tiff\0container\0");
    }
}
