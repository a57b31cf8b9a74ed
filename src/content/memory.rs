use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::{disposed, CancellationToken, ContentReader, ContentSource, ContentWriter};
use crate::error::{TiffError, TiffResult};
use crate::tags::StreamOffset;

/// A container held entirely in memory.
///
/// The bytes are reference counted, every reader shares them without copying.
#[derive(Debug)]
pub struct MemorySource {
    data: Bytes,
    disposed: AtomicBool,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        MemorySource {
            data: data.into(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Open a lease without boxing it.
    pub fn reader(&self) -> TiffResult<MemoryReader> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(disposed());
        }
        Ok(MemoryReader {
            data: Some(self.data.clone()),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    fn open_reader(&self) -> TiffResult<Box<dyn ContentReader>> {
        Ok(Box::new(self.reader()?))
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// A read lease on a [`MemorySource`].
#[derive(Debug)]
pub struct MemoryReader {
    data: Option<Bytes>,
}

impl MemoryReader {
    fn read_at(&self, offset: StreamOffset, buffer: &mut [u8]) -> TiffResult<usize> {
        let data = self.data.as_ref().ok_or_else(disposed)?;
        let start = offset.to_u64()?;
        let Ok(start) = usize::try_from(start) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }

        let len = buffer.len().min(data.len() - start);
        buffer[..len].copy_from_slice(&data[start..start + len]);
        Ok(len)
    }
}

#[async_trait]
impl ContentReader for MemoryReader {
    fn read(&mut self, offset: StreamOffset, buffer: &mut [u8]) -> TiffResult<usize> {
        self.read_at(offset, buffer)
    }

    async fn read_async(
        &mut self,
        offset: StreamOffset,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> TiffResult<usize> {
        cancel.check()?;
        self.read_at(offset, buffer)
    }

    fn close(&mut self) {
        self.data = None;
    }
}

/// A growable in-memory output.
///
/// Writes past the current end zero-fill the gap.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    buffer: Vec<u8>,
    closed: bool,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MemoryWriter {
            buffer: Vec::with_capacity(capacity),
            closed: false,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    fn write_at(&mut self, offset: StreamOffset, data: &[u8]) -> TiffResult<()> {
        if self.closed {
            return Err(disposed());
        }

        let start = usize::try_from(offset.to_u64()?)?;
        let end = start.checked_add(data.len()).ok_or(TiffError::Overflow)?;
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(data);
        Ok(())
    }
}

#[async_trait]
impl ContentWriter for MemoryWriter {
    fn write(&mut self, offset: StreamOffset, buffer: &[u8]) -> TiffResult<()> {
        self.write_at(offset, buffer)
    }

    async fn write_async(
        &mut self,
        offset: StreamOffset,
        buffer: &[u8],
        cancel: &CancellationToken,
    ) -> TiffResult<()> {
        cancel.check()?;
        self.write_at(offset, buffer)
    }

    fn flush(&mut self) -> TiffResult<()> {
        if self.closed {
            return Err(disposed());
        }
        Ok(())
    }

    async fn flush_async(&mut self, cancel: &CancellationToken) -> TiffResult<()> {
        cancel.check()?;
        self.flush()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TiffError, UsageError};

    #[test]
    fn reads_past_end_are_empty() {
        let source = MemorySource::new(vec![1u8, 2, 3, 4]);
        let mut reader = source.open_reader().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(StreamOffset::new(2), &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[3, 4]);
        assert_eq!(reader.read(StreamOffset::new(4), &mut buf).unwrap(), 0);
        assert_eq!(reader.read(StreamOffset::new(100), &mut buf).unwrap(), 0);
        assert!(reader.read(StreamOffset::new(-1), &mut buf).is_err());
    }

    #[test]
    fn closed_reader_fails() {
        let source = MemorySource::new(&b"abc"[..]);
        let mut reader = source.reader().unwrap();
        reader.close();
        reader.close();

        let mut buf = [0u8; 1];
        assert!(matches!(
            reader.read(StreamOffset::ZERO, &mut buf),
            Err(TiffError::UsageError(UsageError::Disposed))
        ));

        source.dispose();
        assert!(source.open_reader().is_err());
    }

    #[test]
    fn writer_fills_gaps() {
        let mut writer = MemoryWriter::new();
        writer.write(StreamOffset::new(4), &[9, 9]).unwrap();
        writer.write(StreamOffset::new(1), &[7]).unwrap();
        assert_eq!(writer.as_slice(), &[0, 7, 0, 0, 9, 9]);

        writer.close();
        assert!(writer.write(StreamOffset::ZERO, &[1]).is_err());
        assert!(writer.flush().is_err());
    }
}
