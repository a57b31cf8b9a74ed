//! Reading directories from a content reader.
//!
//! The parsing is driven by [`DirectoryParser`], which never touches I/O itself. It announces the
//! byte range it wants next and consumes whatever the reader produced, so the blocking and
//! asynchronous traversals only differ in the read call.

use crate::content::{CancellationToken, ContentReader};
use crate::context::OperationContext;
use crate::directory::Directory;
use crate::error::{short_read, TiffError, TiffResult};
use crate::ifd::DirectoryEntry;
use crate::tags::StreamOffset;

use super::Limits;

/// Entries parsed per read, bounding the size of one request.
const ENTRY_BATCH: u64 = 50;

/// The speculative read of the entry count. Wide enough for BigTIFF, over-reads in classic TIFF.
const COUNT_PROBE_LEN: usize = 8;

#[derive(Debug, Clone, Copy)]
enum Stage {
    Count,
    Entries { remaining: u64 },
    Next,
    Done,
}

#[derive(Debug)]
struct DirectoryParser<'a> {
    context: &'a OperationContext,
    limits: &'a Limits,
    stage: Stage,
    position: StreamOffset,
    requested: usize,
    entries: Vec<DirectoryEntry>,
    next_offset: StreamOffset,
}

impl<'a> DirectoryParser<'a> {
    fn new(context: &'a OperationContext, limits: &'a Limits, offset: StreamOffset) -> Self {
        DirectoryParser {
            context,
            limits,
            stage: Stage::Count,
            position: offset,
            requested: 0,
            entries: Vec::new(),
            next_offset: StreamOffset::ZERO,
        }
    }

    /// The next range to read, `None` once the directory is complete.
    fn request(&mut self) -> TiffResult<Option<(StreamOffset, usize)>> {
        let len = match self.stage {
            Stage::Count => COUNT_PROBE_LEN,
            Stage::Entries { remaining } => {
                let batch = remaining.min(ENTRY_BATCH);
                let len = batch
                    .checked_mul(self.context.entry_field_length() as u64)
                    .ok_or(TiffError::Overflow)?;
                usize::try_from(len)?
            }
            Stage::Next => self.context.offset_field_width(),
            Stage::Done => return Ok(None),
        };

        self.requested = len;
        Ok(Some((self.position, len)))
    }

    /// Consume the bytes read for the last request.
    fn consume(&mut self, bytes: &[u8]) -> TiffResult<()> {
        let ctx = self.context;
        let bo = ctx.byte_order();

        match self.stage {
            Stage::Count => {
                let width = ctx.count_field_width();
                if bytes.len() < width {
                    return Err(short_read(width, bytes.len()));
                }

                let count = bo.read_uint(&bytes[..width]);
                if count > self.limits.ifd_entry_count {
                    return Err(TiffError::LimitsExceeded);
                }

                self.position = self.position.checked_add(width as u64)?;
                // The whole table must be addressable before any of it is read.
                let table_len = count
                    .checked_mul(ctx.entry_field_length() as u64)
                    .ok_or(TiffError::Overflow)?;
                self.position.checked_add(table_len)?;

                self.entries = Vec::with_capacity(usize::try_from(count.min(ENTRY_BATCH))?);
                self.stage = if count == 0 {
                    Stage::Next
                } else {
                    Stage::Entries { remaining: count }
                };
            }
            Stage::Entries { remaining } => {
                if bytes.len() < self.requested {
                    return Err(short_read(self.requested, bytes.len()));
                }

                let entry_len = ctx.entry_field_length();
                for raw in bytes[..self.requested].chunks_exact(entry_len) {
                    let entry = DirectoryEntry::try_parse(ctx, raw)
                        .ok_or_else(|| short_read(entry_len, raw.len()))?;
                    self.entries.push(entry);
                }

                let parsed = (self.requested / entry_len) as u64;
                self.position = self.position.checked_add(self.requested as u64)?;
                self.stage = match remaining - parsed {
                    0 => Stage::Next,
                    remaining => Stage::Entries { remaining },
                };
            }
            Stage::Next => {
                let width = ctx.offset_field_width();
                if bytes.len() < width {
                    return Err(short_read(width, bytes.len()));
                }

                self.next_offset = StreamOffset::from_u64(bo.read_uint(&bytes[..width]))?;
                self.stage = Stage::Done;
            }
            Stage::Done => {}
        }

        Ok(())
    }

    fn finish(self) -> Directory {
        Directory::new(self.entries, self.next_offset)
    }
}

/// Read the directory at `offset`.
///
/// A directory with zero entries consists of just the count and the next offset. Counts above
/// [`Limits::ifd_entry_count`] fail before anything is allocated for them.
pub fn read_directory<R: ContentReader + ?Sized>(
    reader: &mut R,
    context: &OperationContext,
    offset: StreamOffset,
    limits: &Limits,
) -> TiffResult<Directory> {
    let mut parser = DirectoryParser::new(context, limits, offset);
    let mut buffer = Vec::new();

    while let Some((position, len)) = parser.request()? {
        buffer.resize(len, 0);
        let read = reader.read(position, &mut buffer)?;
        parser.consume(&buffer[..read])?;
    }

    let directory = parser.finish();
    log::debug!(
        "read directory at {} with {} entries, next at {}",
        offset,
        directory.len(),
        directory.next_offset()
    );
    Ok(directory)
}

/// Asynchronous twin of [`read_directory`].
pub async fn read_directory_async<R: ContentReader + ?Sized>(
    reader: &mut R,
    context: &OperationContext,
    offset: StreamOffset,
    limits: &Limits,
    cancel: &CancellationToken,
) -> TiffResult<Directory> {
    let mut parser = DirectoryParser::new(context, limits, offset);
    let mut buffer = Vec::new();

    while let Some((position, len)) = parser.request()? {
        buffer.resize(len, 0);
        let read = reader.read_async(position, &mut buffer, cancel).await?;
        parser.consume(&buffer[..read])?;
    }

    let directory = parser.finish();
    log::debug!(
        "read directory at {} with {} entries, next at {}",
        offset,
        directory.len(),
        directory.next_offset()
    );
    Ok(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentSource, MemorySource};
    use crate::context::TiffKind;
    use crate::error::TiffFormatError;
    use crate::tags::{ByteOrder, Tag, Type};

    fn classic_le() -> OperationContext {
        OperationContext::new(ByteOrder::LittleEndian, TiffKind::Classic)
    }

    fn classic_ifd(entries: u16, next: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; 8];
        bytes.extend_from_slice(&entries.to_le_bytes());
        for i in 0..entries {
            bytes.extend_from_slice(&(256 + i).to_le_bytes());
            bytes.extend_from_slice(&3u16.to_le_bytes());
            bytes.extend_from_slice(&1u32.to_le_bytes());
            bytes.extend_from_slice(&u32::from(i).to_le_bytes());
        }
        bytes.extend_from_slice(&next.to_le_bytes());
        bytes
    }

    #[test]
    fn empty_directory_at_end_of_data() {
        // The speculative count read comes up short, which is fine.
        let source = MemorySource::new(vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let mut reader = source.open_reader().unwrap();
        let dir = read_directory(
            &mut reader,
            &classic_le(),
            StreamOffset::new(8),
            &Limits::default(),
        )
        .unwrap();
        assert!(dir.is_empty());
        assert_eq!(dir.next(), None);
    }

    #[test]
    fn entries_span_several_batches() {
        let source = MemorySource::new(classic_ifd(120, 0x1234));
        let mut reader = source.open_reader().unwrap();
        let dir = read_directory(
            &mut reader,
            &classic_le(),
            StreamOffset::new(8),
            &Limits::default(),
        )
        .unwrap();

        assert_eq!(dir.len(), 120);
        assert_eq!(dir.entries()[0].tag(), Tag::ImageWidth);
        assert_eq!(dir.entries()[119].raw_value_offset(), 119);
        assert_eq!(dir.entries()[60].field_type(), Type::SHORT);
        assert_eq!(dir.next(), Some(StreamOffset::new(0x1234)));
    }

    #[test]
    fn truncated_directory_is_an_error() {
        let mut bytes = classic_ifd(3, 0);
        bytes.truncate(bytes.len() - 10);
        let source = MemorySource::new(bytes);
        let mut reader = source.open_reader().unwrap();

        let err = read_directory(
            &mut reader,
            &classic_le(),
            StreamOffset::new(8),
            &Limits::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TiffError::FormatError(TiffFormatError::ShortRead { .. })
        ));
    }

    #[test]
    fn absurd_counts_fail_fast() {
        let ctx = OperationContext::new(ByteOrder::LittleEndian, TiffKind::Big);
        let mut bytes = vec![0u8; 16];
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        let source = MemorySource::new(bytes);
        let mut reader = source.open_reader().unwrap();

        let err = read_directory(&mut reader, &ctx, StreamOffset::new(16), &Limits::default())
            .unwrap_err();
        assert!(matches!(err, TiffError::LimitsExceeded));

        let err = read_directory(&mut reader, &ctx, StreamOffset::new(16), &Limits::unlimited())
            .unwrap_err();
        assert!(matches!(err, TiffError::Overflow));
    }

    #[test]
    fn async_traversal_matches() {
        let source = MemorySource::new(classic_ifd(4, 0));
        let mut reader = source.open_reader().unwrap();
        let cancel = CancellationToken::new();

        let blocking = read_directory(
            &mut reader,
            &classic_le(),
            StreamOffset::new(8),
            &Limits::default(),
        )
        .unwrap();
        let asynchronous = futures::executor::block_on(read_directory_async(
            &mut reader,
            &classic_le(),
            StreamOffset::new(8),
            &Limits::default(),
            &cancel,
        ))
        .unwrap();
        assert_eq!(blocking, asynchronous);
    }
}
