use std::collections::HashMap;
use std::mem;

use crate::content::{CancellationToken, ContentWriter};
use crate::context::{OperationContext, TiffKind};
use crate::error::{TiffError, TiffResult, UsageError};
use crate::field::{self, FieldKind};
use crate::header::{Header, MAX_HEADER_LEN};
use crate::ifd::DirectoryEntry;
use crate::tags::StreamOffset;

use super::{DirectoryWriter, WriterOptions};

/// Largest cursor position classic TIFF can address.
const CLASSIC_LIMIT: i64 = u32::MAX as i64;

/// The write side of a container.
///
/// The writer appends at a cursor that starts right after the header. Values, pixel data and
/// directories are placed at word-aligned offsets. The only bytes rewritten after the fact are
/// the `next` slots of earlier directories and the header, written last by [`flush`].
///
/// A writer is meant for a single caller, the cursor is not synchronized.
///
/// [`flush`]: TiffFileWriter::flush
pub struct TiffFileWriter<W> {
    writer: W,
    context: OperationContext,
    position: StreamOffset,
    requires_bigtiff: bool,
    first_ifd: Option<StreamOffset>,
    last_ifd: Option<StreamOffset>,
    /// Entry count of every directory written so far, by start offset.
    directories: HashMap<StreamOffset, u64>,
    finished: bool,
    scratch: Vec<u8>,
}

impl<W: ContentWriter> TiffFileWriter<W> {
    pub fn new(writer: W, options: WriterOptions) -> Self {
        let kind = if options.bigtiff {
            TiffKind::Big
        } else {
            TiffKind::Classic
        };

        TiffFileWriter {
            writer,
            context: OperationContext::new(options.byte_order, kind),
            position: StreamOffset::from(kind.header_len() as u32),
            requires_bigtiff: false,
            first_ifd: None,
            last_ifd: None,
            directories: HashMap::new(),
            finished: false,
            scratch: Vec::new(),
        }
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    /// The append cursor.
    pub fn position(&self) -> StreamOffset {
        self.position
    }

    /// Whether the content written so far crossed the 32-bit boundary.
    pub fn requires_bigtiff(&self) -> bool {
        self.requires_bigtiff
    }

    pub fn first_ifd_offset(&self) -> Option<StreamOffset> {
        self.first_ifd
    }

    /// Start a new directory. It is linked into the chain when it is flushed.
    pub fn create_directory(&mut self) -> TiffResult<DirectoryWriter<'_, W>> {
        self.ensure_active()?;
        Ok(DirectoryWriter::new(self))
    }

    fn ensure_active(&self) -> TiffResult<()> {
        if self.finished {
            Err(TiffError::UsageError(UsageError::WriterFinished))
        } else {
            Ok(())
        }
    }

    /// Move the cursor forward by `len` bytes without writing anything.
    ///
    /// Crossing the 32-bit boundary in classic mode is recorded and makes [`flush`] fail.
    ///
    /// [`flush`]: TiffFileWriter::flush
    pub fn advance_position(&mut self, len: u64) -> TiffResult<()> {
        self.ensure_active()?;
        self.position = self.position.checked_add(len)?;

        if !self.requires_bigtiff && self.position.get() > CLASSIC_LIMIT {
            self.requires_bigtiff = true;
            if !self.context.is_big() {
                log::warn!(
                    "cursor reached {}, the container can only be finished as BigTIFF",
                    self.position
                );
            }
        }
        Ok(())
    }

    /// Pad the cursor to an even offset, returning it.
    pub(crate) fn align(&mut self) -> TiffResult<StreamOffset> {
        self.ensure_active()?;
        if !self.position.is_word_aligned() {
            self.writer.write(self.position, &[0])?;
            self.advance_position(1)?;
        }
        Ok(self.position)
    }

    pub(crate) async fn align_async(&mut self, cancel: &CancellationToken) -> TiffResult<StreamOffset> {
        self.ensure_active()?;
        if !self.position.is_word_aligned() {
            self.writer.write_async(self.position, &[0], cancel).await?;
            self.advance_position(1)?;
        }
        Ok(self.position)
    }

    /// Write at the cursor without aligning it first.
    pub(crate) fn append_bytes(&mut self, bytes: &[u8]) -> TiffResult<()> {
        self.ensure_active()?;
        self.writer.write(self.position, bytes)?;
        self.advance_position(bytes.len() as u64)
    }

    pub(crate) async fn append_bytes_async(
        &mut self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> TiffResult<()> {
        self.ensure_active()?;
        self.writer.write_async(self.position, bytes, cancel).await?;
        self.advance_position(bytes.len() as u64)
    }

    /// Write `bytes` at the next even offset and return that offset.
    pub fn write_aligned_bytes(&mut self, bytes: &[u8]) -> TiffResult<StreamOffset> {
        let offset = self.align()?;
        self.append_bytes(bytes)?;
        log::trace!("wrote {} bytes at {}", bytes.len(), offset);
        Ok(offset)
    }

    pub async fn write_aligned_bytes_async(
        &mut self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> TiffResult<StreamOffset> {
        let offset = self.align_async(cancel).await?;
        self.append_bytes_async(bytes, cancel).await?;
        log::trace!("wrote {} bytes at {}", bytes.len(), offset);
        Ok(offset)
    }

    fn encode_into_scratch<K: FieldKind>(&mut self, values: &[K::Value]) -> TiffResult<Vec<u8>> {
        let len = values
            .len()
            .checked_mul(K::element_len())
            .ok_or(TiffError::Overflow)?;
        let mut scratch = mem::take(&mut self.scratch);
        scratch.clear();
        scratch.resize(len, 0);
        match field::encode_values::<K>(values, self.context.byte_order(), &mut scratch) {
            Ok(()) => Ok(scratch),
            Err(err) => {
                self.scratch = scratch;
                Err(err)
            }
        }
    }

    /// Encode `values` in the file's byte order at the next even offset and return that offset.
    pub fn write_aligned_values<K: FieldKind>(
        &mut self,
        values: &[K::Value],
    ) -> TiffResult<StreamOffset> {
        let scratch = self.encode_into_scratch::<K>(values)?;
        let result = self.write_aligned_bytes(&scratch);
        self.scratch = scratch;
        result
    }

    pub async fn write_aligned_values_async<K: FieldKind>(
        &mut self,
        values: &[K::Value],
        cancel: &CancellationToken,
    ) -> TiffResult<StreamOffset> {
        let scratch = self.encode_into_scratch::<K>(values)?;
        let result = self.write_aligned_bytes_async(&scratch, cancel).await;
        self.scratch = scratch;
        result
    }

    /// Serialize a directory with a zero `next` slot.
    fn directory_bytes(&self, entries: &[DirectoryEntry]) -> TiffResult<Vec<u8>> {
        let ctx = &self.context;
        let count_width = ctx.count_field_width();
        let entry_len = ctx.entry_field_length();
        let len = entries
            .len()
            .checked_mul(entry_len)
            .and_then(|n| n.checked_add(count_width + ctx.offset_field_width()))
            .ok_or(TiffError::Overflow)?;

        let count = if ctx.is_big() {
            u64::try_from(entries.len())?
        } else {
            u16::try_from(entries.len())?.into()
        };

        let mut bytes = vec![0u8; len];
        ctx.byte_order().write_uint(count, &mut bytes[..count_width]);
        for (entry, dest) in entries
            .iter()
            .zip(bytes[count_width..].chunks_exact_mut(entry_len))
        {
            // Past the 32-bit boundary the file can only fail at flush, slots may be cut.
            if self.requires_bigtiff {
                entry.write_truncated(ctx, dest)?;
            } else {
                entry.write(ctx, dest)?;
            }
        }
        Ok(bytes)
    }

    /// Record a freshly written directory and the link pointing at it.
    ///
    /// Returns the directory whose `next` slot has to be patched, if any.
    fn register_directory(&mut self, offset: StreamOffset, count: u64) -> Option<StreamOffset> {
        self.directories.insert(offset, count);
        let previous = self.last_ifd.replace(offset);
        if self.first_ifd.is_none() {
            self.first_ifd = Some(offset);
        }
        log::debug!("wrote directory with {} entries at {}", count, offset);
        previous
    }

    /// Write a directory at the next even offset and link it after the previous one.
    pub(crate) fn append_directory(&mut self, entries: &[DirectoryEntry]) -> TiffResult<StreamOffset> {
        let bytes = self.directory_bytes(entries)?;
        let offset = self.write_aligned_bytes(&bytes)?;
        if let Some(previous) = self.register_directory(offset, entries.len() as u64) {
            self.update_next_offset_field(previous, offset)?;
        }
        Ok(offset)
    }

    pub(crate) async fn append_directory_async(
        &mut self,
        entries: &[DirectoryEntry],
        cancel: &CancellationToken,
    ) -> TiffResult<StreamOffset> {
        let bytes = self.directory_bytes(entries)?;
        let offset = self.write_aligned_bytes_async(&bytes, cancel).await?;
        if let Some(previous) = self.register_directory(offset, entries.len() as u64) {
            self.update_next_offset_field_async(previous, offset, cancel)
                .await?;
        }
        Ok(offset)
    }

    /// Locate the `next` slot of a directory written by this writer and encode `next_ifd`.
    fn next_slot(
        &self,
        target_ifd: StreamOffset,
        next_ifd: StreamOffset,
    ) -> TiffResult<(StreamOffset, [u8; 8], usize)> {
        let count = *self.directories.get(&target_ifd).ok_or_else(|| {
            TiffError::UsageError(UsageError::UnknownDirectory(target_ifd.get() as u64))
        })?;

        let ctx = &self.context;
        let entries_len = count
            .checked_mul(ctx.entry_field_length() as u64)
            .ok_or(TiffError::Overflow)?;
        let slot = target_ifd
            .checked_add(ctx.count_field_width() as u64)?
            .checked_add(entries_len)?;

        let width = ctx.offset_field_width();
        let mut bytes = [0u8; 8];
        ctx.byte_order()
            .write_uint(next_ifd.to_u64()?, &mut bytes[..width]);
        Ok((slot, bytes, width))
    }

    /// Point the `next` slot of the directory at `target_ifd` to `next_ifd`.
    ///
    /// This is the one place already written directory bytes change. Only the slot is
    /// overwritten, the entries stay untouched.
    pub fn update_next_offset_field(
        &mut self,
        target_ifd: StreamOffset,
        next_ifd: StreamOffset,
    ) -> TiffResult<()> {
        self.ensure_active()?;
        let (slot, bytes, width) = self.next_slot(target_ifd, next_ifd)?;
        self.writer.write(slot, &bytes[..width])
    }

    pub async fn update_next_offset_field_async(
        &mut self,
        target_ifd: StreamOffset,
        next_ifd: StreamOffset,
        cancel: &CancellationToken,
    ) -> TiffResult<()> {
        self.ensure_active()?;
        let (slot, bytes, width) = self.next_slot(target_ifd, next_ifd)?;
        self.writer.write_async(slot, &bytes[..width], cancel).await
    }

    fn header_bytes(&self) -> TiffResult<([u8; MAX_HEADER_LEN], usize)> {
        self.ensure_active()?;
        if self.requires_bigtiff && !self.context.is_big() {
            return Err(TiffError::RequiresBigTiff);
        }
        let first_ifd = self
            .first_ifd
            .ok_or(TiffError::UsageError(UsageError::NoDirectoryWritten))?;

        let mut header = [0u8; MAX_HEADER_LEN];
        let len = Header::write(
            &mut header,
            first_ifd,
            self.context.is_little_endian(),
            self.context.is_big(),
        )?;
        Ok((header, len))
    }

    /// Write the header and flush the underlying writer.
    ///
    /// Fails with [`TiffError::RequiresBigTiff`] if a classic container grew beyond 4 GiB, in
    /// which case no header is written. Afterwards every operation fails with
    /// [`UsageError::WriterFinished`].
    pub fn flush(&mut self) -> TiffResult<()> {
        let (header, len) = self.header_bytes()?;
        self.writer.write(StreamOffset::ZERO, &header[..len])?;
        self.writer.flush()?;
        self.finished = true;
        log::debug!("finished container, {} bytes", self.position);
        Ok(())
    }

    pub async fn flush_async(&mut self, cancel: &CancellationToken) -> TiffResult<()> {
        let (header, len) = self.header_bytes()?;
        self.writer
            .write_async(StreamOffset::ZERO, &header[..len], cancel)
            .await?;
        self.writer.flush_async(cancel).await?;
        self.finished = true;
        log::debug!("finished container, {} bytes", self.position);
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryWriter;
    use crate::field::kinds;
    use crate::tags::{ByteOrder, Tag, Type};

    /// Discards everything, for cursors far past what memory can hold.
    struct Discard;

    #[async_trait::async_trait]
    impl ContentWriter for Discard {
        fn write(&mut self, _: StreamOffset, _: &[u8]) -> TiffResult<()> {
            Ok(())
        }

        async fn write_async(
            &mut self,
            _: StreamOffset,
            _: &[u8],
            _: &CancellationToken,
        ) -> TiffResult<()> {
            Ok(())
        }

        fn flush(&mut self) -> TiffResult<()> {
            Ok(())
        }

        async fn flush_async(&mut self, _: &CancellationToken) -> TiffResult<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn memory_writer(bigtiff: bool) -> TiffFileWriter<MemoryWriter> {
        let options = WriterOptions::default()
            .little_endian()
            .bigtiff(bigtiff);
        TiffFileWriter::new(MemoryWriter::new(), options)
    }

    #[test]
    fn cursor_starts_after_header() {
        assert_eq!(memory_writer(false).position(), StreamOffset::new(8));
        assert_eq!(memory_writer(true).position(), StreamOffset::new(16));
    }

    #[test]
    fn writes_are_word_aligned() {
        let mut writer = memory_writer(false);
        assert_eq!(writer.write_aligned_bytes(b"abc").unwrap(), StreamOffset::new(8));
        assert_eq!(writer.position(), StreamOffset::new(11));
        assert_eq!(writer.write_aligned_bytes(b"d").unwrap(), StreamOffset::new(12));

        let offset = writer.write_aligned_values::<kinds::Short>(&[1, 2]).unwrap();
        assert_eq!(offset, StreamOffset::new(14));
        assert_eq!(&writer.get_ref().as_slice()[14..18], &[1, 0, 2, 0]);
    }

    #[test]
    fn directories_are_chained_and_patched() {
        let mut writer = memory_writer(false);
        let first = writer.append_directory(&[]).unwrap();
        let second = writer.append_directory(&[]).unwrap();
        assert_eq!(first, StreamOffset::new(8));
        assert_eq!(second, StreamOffset::new(14));

        let bytes = writer.get_ref().as_slice();
        assert_eq!(&bytes[10..14], &14u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0]);

        assert!(matches!(
            writer.update_next_offset_field(StreamOffset::new(10), StreamOffset::new(8)),
            Err(TiffError::UsageError(UsageError::UnknownDirectory(10)))
        ));
    }

    #[test]
    fn flush_requires_a_directory() {
        let mut writer = memory_writer(false);
        assert!(matches!(
            writer.flush(),
            Err(TiffError::UsageError(UsageError::NoDirectoryWritten))
        ));

        writer.append_directory(&[]).unwrap();
        writer.flush().unwrap();
        assert_eq!(&writer.get_ref().as_slice()[..8], b"II\x2a\x00\x08\x00\x00\x00");

        assert!(matches!(
            writer.write_aligned_bytes(b"late"),
            Err(TiffError::UsageError(UsageError::WriterFinished))
        ));
        assert!(writer.flush().is_err());
    }

    #[test]
    fn big_endian_header() {
        let options = WriterOptions::default().big_endian().bigtiff(true);
        let mut writer = TiffFileWriter::new(MemoryWriter::new(), options);
        assert_eq!(writer.context().byte_order(), ByteOrder::BigEndian);
        writer.append_directory(&[]).unwrap();
        writer.flush().unwrap();
        assert_eq!(
            &writer.get_ref().as_slice()[..16],
            b"MM\x00\x2b\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00\x10"
        );
    }

    #[test]
    fn classic_overflow_is_flagged() {
        let mut writer = memory_writer(false);
        writer.append_directory(&[]).unwrap();
        writer.advance_position(u64::from(u32::MAX)).unwrap();
        assert!(writer.requires_bigtiff());
        assert!(matches!(writer.flush(), Err(TiffError::RequiresBigTiff)));
    }

    #[test]
    fn entry_count_must_fit_its_field() {
        let entries: Vec<_> = (0..=u16::MAX)
            .map(|tag| DirectoryEntry::new(Tag::from_u16_exhaustive(tag), Type::BYTE, 1, 0))
            .collect();

        let mut classic = memory_writer(false);
        assert!(matches!(
            classic.append_directory(&entries),
            Err(TiffError::Overflow)
        ));
        assert_eq!(
            classic.append_directory(&entries[1..]).unwrap(),
            StreamOffset::new(8)
        );

        let mut big = memory_writer(true);
        let offset = big.append_directory(&entries).unwrap();
        assert_eq!(&big.get_ref().as_slice()[16..24], &65536u64.to_le_bytes());
        assert_eq!(offset, StreamOffset::new(16));
    }

    #[test]
    fn far_slots_need_bigtiff() {
        let far = DirectoryEntry::new(Tag::StripOffsets, Type::LONG, 2, 0x1_0000_0000);

        let mut classic = TiffFileWriter::new(Discard, WriterOptions::default());
        assert!(matches!(
            classic.append_directory(&[far]),
            Err(TiffError::Overflow)
        ));

        // Once the cursor crossed 4 GiB the failure is reported by flush instead.
        classic.advance_position(u64::from(u32::MAX)).unwrap();
        classic.append_directory(&[far]).unwrap();
        assert!(matches!(classic.flush(), Err(TiffError::RequiresBigTiff)));

        let mut big = memory_writer(true);
        big.append_directory(&[far]).unwrap();
        big.flush().unwrap();
    }
}
