//! Byte-range I/O over the storage that backs a container.
//!
//! A [`ContentSource`] hands out [`ContentReader`] leases, each usable by one caller at a time.
//! Several leases from the same source may be used concurrently. A [`ContentWriter`] accepts
//! positioned writes. None of these types know anything about the TIFF layout.
//!
//! Every operation has a blocking and an asynchronous form. The asynchronous forms check a
//! [`CancellationToken`] before issuing the underlying I/O.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{TiffError, TiffResult, UsageError};
use crate::tags::StreamOffset;

mod file;
mod memory;
mod stream;

pub use self::file::{FileReader, FileSource};
pub use self::memory::{MemoryReader, MemorySource, MemoryWriter};
pub use self::stream::{
    AsyncStreamReader, AsyncStreamSource, AsyncStreamWriter, StreamReader, StreamSource,
    StreamWriter,
};

/// A cooperative cancellation signal for asynchronous operations.
///
/// Clones share the same flag. Cancellation is observed before an I/O call is issued, a read that
/// is already in flight completes.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`TiffError::Cancelled`] once the token was triggered.
    pub fn check(&self) -> TiffResult<()> {
        if self.is_cancelled() {
            Err(TiffError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Storage that readers can be opened on.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Open a new reader lease.
    fn open_reader(&self) -> TiffResult<Box<dyn ContentReader>>;

    async fn open_reader_async(
        &self,
        cancel: &CancellationToken,
    ) -> TiffResult<Box<dyn ContentReader>> {
        cancel.check()?;
        self.open_reader()
    }

    /// Release shared resources. Further calls to `open_reader` fail, leases that are already
    /// open keep working until they are closed.
    fn dispose(&self);
}

/// A random-access read lease.
#[async_trait]
pub trait ContentReader: Send {
    /// Read up to `buffer.len()` bytes at `offset`.
    ///
    /// The buffer is filled completely unless the end of the data is reached. Reading at or past
    /// the end returns `0` rather than failing, which lets callers over-read speculatively.
    fn read(&mut self, offset: StreamOffset, buffer: &mut [u8]) -> TiffResult<usize>;

    async fn read_async(
        &mut self,
        offset: StreamOffset,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> TiffResult<usize>;

    /// Release the lease. Closing twice is a no-op, any other call after closing fails with
    /// [`UsageError::Disposed`].
    fn close(&mut self);
}

#[async_trait]
impl<R: ContentReader + ?Sized> ContentReader for Box<R> {
    fn read(&mut self, offset: StreamOffset, buffer: &mut [u8]) -> TiffResult<usize> {
        (**self).read(offset, buffer)
    }

    async fn read_async(
        &mut self,
        offset: StreamOffset,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> TiffResult<usize> {
        (**self).read_async(offset, buffer, cancel).await
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// A positioned writer.
#[async_trait]
pub trait ContentWriter: Send {
    /// Write all of `buffer` at `offset`, overwriting what is there.
    fn write(&mut self, offset: StreamOffset, buffer: &[u8]) -> TiffResult<()>;

    async fn write_async(
        &mut self,
        offset: StreamOffset,
        buffer: &[u8],
        cancel: &CancellationToken,
    ) -> TiffResult<()>;

    fn flush(&mut self) -> TiffResult<()>;

    async fn flush_async(&mut self, cancel: &CancellationToken) -> TiffResult<()>;

    /// Release the writer. Closing twice is a no-op.
    fn close(&mut self);
}

#[async_trait]
impl<W: ContentWriter + ?Sized> ContentWriter for Box<W> {
    fn write(&mut self, offset: StreamOffset, buffer: &[u8]) -> TiffResult<()> {
        (**self).write(offset, buffer)
    }

    async fn write_async(
        &mut self,
        offset: StreamOffset,
        buffer: &[u8],
        cancel: &CancellationToken,
    ) -> TiffResult<()> {
        (**self).write_async(offset, buffer, cancel).await
    }

    fn flush(&mut self) -> TiffResult<()> {
        (**self).flush()
    }

    async fn flush_async(&mut self, cancel: &CancellationToken) -> TiffResult<()> {
        (**self).flush_async(cancel).await
    }

    fn close(&mut self) {
        (**self).close()
    }
}

pub(crate) fn disposed() -> TiffError {
    TiffError::UsageError(UsageError::Disposed)
}

/// A lock shared between leases was poisoned by a panicking holder.
pub(crate) fn poisoned(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{} lock poisoned", what))
}

/// Read until `buffer` is full or the reader reports the end of its data.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(TiffError::Cancelled)));
    }

    #[test]
    fn read_full_stops_at_end() {
        let data = [1u8, 2, 3];
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut &data[..], &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &data);
    }
}
