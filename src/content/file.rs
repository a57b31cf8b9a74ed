use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{disposed, poisoned, read_full, CancellationToken, ContentReader, ContentSource};
use crate::error::TiffResult;
use crate::tags::StreamOffset;

/// Idle handles kept open per source.
const MAX_POOLED_HANDLES: usize = 8;

#[derive(Debug)]
struct HandlePool {
    path: PathBuf,
    idle: Mutex<Vec<File>>,
    disposed: AtomicBool,
}

impl HandlePool {
    fn acquire(&self) -> TiffResult<File> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(disposed());
        }

        let pooled = self.idle.lock().map_err(|_| poisoned("handle pool"))?.pop();
        match pooled {
            Some(file) => Ok(file),
            None => {
                log::trace!("opening new handle on {}", self.path.display());
                Ok(File::open(&self.path)?)
            }
        }
    }

    fn release(&self, file: File) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        match self.idle.lock() {
            Ok(mut idle) if idle.len() < MAX_POOLED_HANDLES => idle.push(file),
            Ok(_) => {}
            Err(_) => log::warn!(
                "handle pool of {} is poisoned, closing handle",
                self.path.display()
            ),
        }
    }
}

/// A container stored in a file.
///
/// Each reader lease owns one file handle. Handles are returned to a pool when a lease is closed
/// and reused by later leases, blocking and asynchronous alike.
#[derive(Debug)]
pub struct FileSource {
    pool: Arc<HandlePool>,
}

impl FileSource {
    /// Open the file once to check it is readable and seed the pool.
    pub fn open<P: AsRef<Path>>(path: P) -> TiffResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(FileSource {
            pool: Arc::new(HandlePool {
                path,
                idle: Mutex::new(vec![file]),
                disposed: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.pool.path
    }

    /// Open a lease without boxing it.
    pub fn reader(&self) -> TiffResult<FileReader> {
        Ok(FileReader {
            file: Some(self.pool.acquire()?),
            pool: Arc::clone(&self.pool),
        })
    }

    /// Number of idle handles currently pooled.
    pub fn idle_handles(&self) -> TiffResult<usize> {
        let idle = self.pool.idle.lock().map_err(|_| poisoned("handle pool"))?;
        Ok(idle.len())
    }
}

#[async_trait]
impl ContentSource for FileSource {
    fn open_reader(&self) -> TiffResult<Box<dyn ContentReader>> {
        Ok(Box::new(self.reader()?))
    }

    fn dispose(&self) {
        self.pool.disposed.store(true, Ordering::SeqCst);
        self.pool
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// A read lease on a [`FileSource`].
///
/// `std::fs::File` has no asynchronous interface, so `read_async` performs the positioned read
/// in place after checking for cancellation.
#[derive(Debug)]
pub struct FileReader {
    file: Option<File>,
    pool: Arc<HandlePool>,
}

impl FileReader {
    fn read_at(&mut self, offset: StreamOffset, buffer: &mut [u8]) -> TiffResult<usize> {
        let file = self.file.as_mut().ok_or_else(disposed)?;
        file.seek(SeekFrom::Start(offset.to_u64()?))?;
        Ok(read_full(file, buffer)?)
    }
}

#[async_trait]
impl ContentReader for FileReader {
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
        if let Some(file) = self.file.take() {
            self.pool.release(file);
        }
    }
}

impl Drop for FileReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::TiffError;

    #[test]
    fn handles_are_pooled() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let source = FileSource::open(tmp.path()).unwrap();
        assert_eq!(source.idle_handles().unwrap(), 1);

        let mut a = source.reader().unwrap();
        let mut b = source.reader().unwrap();
        assert_eq!(source.idle_handles().unwrap(), 0);

        let mut buf = [0u8; 4];
        assert_eq!(a.read(StreamOffset::new(2), &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"2345");
        assert_eq!(b.read(StreamOffset::new(8), &mut buf).unwrap(), 2);
        assert_eq!(b.read(StreamOffset::new(20), &mut buf).unwrap(), 0);

        a.close();
        drop(b);
        assert_eq!(source.idle_handles().unwrap(), 2);

        a.close();
        assert!(a.read(StreamOffset::ZERO, &mut buf).is_err());

        source.dispose();
        assert_eq!(source.idle_handles().unwrap(), 0);
        assert!(source.open_reader().is_err());
    }

    #[test]
    fn poisoned_pool_is_an_io_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let source = FileSource::open(tmp.path()).unwrap();

        let pool = Arc::clone(&source.pool);
        let _ = std::thread::spawn(move || {
            let _guard = pool.idle.lock().unwrap();
            panic!("holder panicked");
        })
        .join();

        assert!(matches!(source.reader(), Err(TiffError::IoError(_))));
        assert!(source.idle_handles().is_err());
    }
}
