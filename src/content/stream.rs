use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use futures::lock::Mutex as AsyncMutex;

use super::{
    disposed, poisoned, read_full, CancellationToken, ContentReader, ContentSource,
    ContentWriter,
};
use crate::error::TiffResult;
use crate::tags::StreamOffset;

/// A container behind a single seekable stream.
///
/// All leases share the stream. Each read locks it, seeks and reads, so leases never observe each
/// other's stream position.
#[derive(Debug)]
pub struct StreamSource<S> {
    stream: Arc<Mutex<S>>,
    disposed: AtomicBool,
}

impl<S: Read + Seek + Send + 'static> StreamSource<S> {
    pub fn new(stream: S) -> Self {
        StreamSource {
            stream: Arc::new(Mutex::new(stream)),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn reader(&self) -> TiffResult<StreamReader<S>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(disposed());
        }
        Ok(StreamReader {
            stream: Some(Arc::clone(&self.stream)),
        })
    }
}

#[async_trait]
impl<S: Read + Seek + Send + 'static> ContentSource for StreamSource<S> {
    fn open_reader(&self) -> TiffResult<Box<dyn ContentReader>> {
        Ok(Box::new(self.reader()?))
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// A read lease on a [`StreamSource`].
#[derive(Debug)]
pub struct StreamReader<S> {
    stream: Option<Arc<Mutex<S>>>,
}

impl<S: Read + Seek> StreamReader<S> {
    fn read_at(&mut self, offset: StreamOffset, buffer: &mut [u8]) -> TiffResult<usize> {
        let stream = self.stream.as_ref().ok_or_else(disposed)?;
        let position = offset.to_u64()?;

        let mut stream = stream.lock().map_err(|_| poisoned("stream"))?;
        stream.seek(SeekFrom::Start(position))?;
        Ok(read_full(&mut *stream, buffer)?)
    }
}

#[async_trait]
impl<S: Read + Seek + Send + 'static> ContentReader for StreamReader<S> {
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
        self.stream = None;
    }
}

/// A container behind a single asynchronous seekable stream.
///
/// Blocking reads on its leases drive the stream to completion on the current thread with
/// [`futures::executor::block_on`]. Do not use them from within an async task.
#[derive(Debug)]
pub struct AsyncStreamSource<S> {
    stream: Arc<AsyncMutex<S>>,
    disposed: AtomicBool,
}

impl<S: AsyncRead + AsyncSeek + Unpin + Send + 'static> AsyncStreamSource<S> {
    pub fn new(stream: S) -> Self {
        AsyncStreamSource {
            stream: Arc::new(AsyncMutex::new(stream)),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn reader(&self) -> TiffResult<AsyncStreamReader<S>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(disposed());
        }
        Ok(AsyncStreamReader {
            stream: Some(Arc::clone(&self.stream)),
        })
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncSeek + Unpin + Send + 'static> ContentSource for AsyncStreamSource<S> {
    fn open_reader(&self) -> TiffResult<Box<dyn ContentReader>> {
        Ok(Box::new(self.reader()?))
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// A read lease on an [`AsyncStreamSource`].
#[derive(Debug)]
pub struct AsyncStreamReader<S> {
    stream: Option<Arc<AsyncMutex<S>>>,
}

impl<S: AsyncRead + AsyncSeek + Unpin + Send> AsyncStreamReader<S> {
    async fn read_at(&mut self, offset: StreamOffset, buffer: &mut [u8]) -> TiffResult<usize> {
        let stream = self.stream.as_ref().ok_or_else(disposed)?;
        let position = offset.to_u64()?;

        let mut stream = stream.lock().await;
        stream.seek(SeekFrom::Start(position)).await?;

        let mut filled = 0;
        while filled < buffer.len() {
            match stream.read(&mut buffer[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncSeek + Unpin + Send + 'static> ContentReader for AsyncStreamReader<S> {
    fn read(&mut self, offset: StreamOffset, buffer: &mut [u8]) -> TiffResult<usize> {
        futures::executor::block_on(self.read_at(offset, buffer))
    }

    async fn read_async(
        &mut self,
        offset: StreamOffset,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> TiffResult<usize> {
        cancel.check()?;
        self.read_at(offset, buffer).await
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

/// Positioned writes to a seekable stream, such as a [`std::fs::File`].
#[derive(Debug)]
pub struct StreamWriter<W> {
    inner: Option<W>,
}

impl<W: Write + Seek + Send> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        StreamWriter { inner: Some(inner) }
    }

    /// Take back the stream. Fails if the writer was closed.
    pub fn into_inner(mut self) -> TiffResult<W> {
        self.inner.take().ok_or_else(disposed)
    }

    fn write_at(&mut self, offset: StreamOffset, buffer: &[u8]) -> TiffResult<()> {
        let inner = self.inner.as_mut().ok_or_else(disposed)?;
        inner.seek(SeekFrom::Start(offset.to_u64()?))?;
        inner.write_all(buffer)?;
        Ok(())
    }

    fn flush_inner(&mut self) -> TiffResult<()> {
        let inner = self.inner.as_mut().ok_or_else(disposed)?;
        inner.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Seek + Send> ContentWriter for StreamWriter<W> {
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
        self.flush_inner()
    }

    async fn flush_async(&mut self, cancel: &CancellationToken) -> TiffResult<()> {
        cancel.check()?;
        self.flush_inner()
    }

    fn close(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            if let Err(e) = inner.flush() {
                log::warn!("flushing stream on close failed: {}", e);
            }
        }
    }
}

/// Positioned writes to an asynchronous seekable stream.
///
/// Blocking calls drive the stream on the current thread with [`futures::executor::block_on`].
#[derive(Debug)]
pub struct AsyncStreamWriter<W> {
    inner: Option<W>,
}

impl<W: AsyncWrite + AsyncSeek + Unpin + Send> AsyncStreamWriter<W> {
    pub fn new(inner: W) -> Self {
        AsyncStreamWriter { inner: Some(inner) }
    }

    pub fn into_inner(mut self) -> TiffResult<W> {
        self.inner.take().ok_or_else(disposed)
    }

    async fn write_at(&mut self, offset: StreamOffset, buffer: &[u8]) -> TiffResult<()> {
        let inner = self.inner.as_mut().ok_or_else(disposed)?;
        inner.seek(SeekFrom::Start(offset.to_u64()?)).await?;
        inner.write_all(buffer).await?;
        Ok(())
    }

    async fn flush_inner(&mut self) -> TiffResult<()> {
        let inner = self.inner.as_mut().ok_or_else(disposed)?;
        inner.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + AsyncSeek + Unpin + Send> ContentWriter for AsyncStreamWriter<W> {
    fn write(&mut self, offset: StreamOffset, buffer: &[u8]) -> TiffResult<()> {
        futures::executor::block_on(self.write_at(offset, buffer))
    }

    async fn write_async(
        &mut self,
        offset: StreamOffset,
        buffer: &[u8],
        cancel: &CancellationToken,
    ) -> TiffResult<()> {
        cancel.check()?;
        self.write_at(offset, buffer).await
    }

    fn flush(&mut self) -> TiffResult<()> {
        futures::executor::block_on(self.flush_inner())
    }

    async fn flush_async(&mut self, cancel: &CancellationToken) -> TiffResult<()> {
        cancel.check()?;
        self.flush_inner().await
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::TiffError;

    #[test]
    fn stream_leases_do_not_share_position() {
        let source = StreamSource::new(Cursor::new((0u8..32).collect::<Vec<_>>()));
        let mut a = source.reader().unwrap();
        let mut b = source.reader().unwrap();

        let mut buf = [0u8; 2];
        a.read(StreamOffset::new(10), &mut buf).unwrap();
        assert_eq!(buf, [10, 11]);
        b.read(StreamOffset::new(0), &mut buf).unwrap();
        assert_eq!(buf, [0, 1]);
        assert_eq!(a.read(StreamOffset::new(31), &mut buf).unwrap(), 1);
        assert_eq!(a.read(StreamOffset::new(64), &mut buf).unwrap(), 0);
    }

    #[test]
    fn async_stream_reads_and_cancels() {
        let source = AsyncStreamSource::new(futures::io::Cursor::new(vec![5u8; 16]));
        let mut reader = source.reader().unwrap();
        let cancel = CancellationToken::new();

        let mut buf = [0u8; 4];
        let n = futures::executor::block_on(reader.read_async(
            StreamOffset::new(14),
            &mut buf,
            &cancel,
        ))
        .unwrap();
        assert_eq!(n, 2);

        assert_eq!(reader.read(StreamOffset::ZERO, &mut buf).unwrap(), 4);

        cancel.cancel();
        let cancelled =
            futures::executor::block_on(reader.read_async(StreamOffset::ZERO, &mut buf, &cancel));
        assert!(matches!(cancelled, Err(TiffError::Cancelled)));
    }

    #[test]
    fn stream_writer_seeks() {
        let mut writer = StreamWriter::new(Cursor::new(Vec::new()));
        writer.write(StreamOffset::new(2), b"cd").unwrap();
        writer.write(StreamOffset::ZERO, b"ab").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.into_inner().unwrap().into_inner(), b"abcd");
    }

    #[test]
    fn async_stream_writer() {
        let mut writer = AsyncStreamWriter::new(futures::io::Cursor::new(Vec::new()));
        let cancel = CancellationToken::new();
        futures::executor::block_on(async {
            writer
                .write_async(StreamOffset::ZERO, b"xyz", &cancel)
                .await
                .unwrap();
            writer.flush_async(&cancel).await.unwrap();
        });
        writer.write(StreamOffset::new(1), b"Y").unwrap();
        assert_eq!(writer.into_inner().unwrap().into_inner(), b"xYz");
    }
}
