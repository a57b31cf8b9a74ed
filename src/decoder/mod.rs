//! The read path: opening a container, walking its directories and decoding field values.

use std::sync::Arc;

use crate::content::{CancellationToken, ContentReader, ContentSource};
use crate::context::OperationContext;
use crate::directory::Directory;
use crate::error::{TiffError, TiffFormatError, TiffResult};
use crate::header::{Header, MAX_HEADER_LEN};
use crate::tags::StreamOffset;

mod cycles;
mod field_reader;
mod ifd;

pub use self::cycles::IfdCycles;
pub use self::field_reader::FieldReader;
pub use self::ifd::{read_directory, read_directory_async};

/// Decoding limits
#[derive(Clone, Debug)]
pub struct Limits {
    /// The maximum size of any single field value in bytes, the default is 256MiB. Reads of
    /// larger values fail before a buffer for them is allocated.
    pub decoding_buffer_size: usize,
    /// The maximum number of entries of one directory, the default is 2^20. Classic TIFF can not
    /// exceed 65535, the bound matters for corrupt BigTIFF counts.
    pub ifd_entry_count: u64,
    /// The purpose of this is to prevent all the fields of the struct from
    /// being public, as this would make adding new fields a major version
    /// bump.
    _non_exhaustive: (),
}

impl Limits {
    /// A configuration that does not impose any limits.
    ///
    /// This is a good start if the caller only wants to impose selective limits, contrary to the
    /// default limits which allows selectively disabling limits.
    ///
    /// Arithmetic on counts and offsets stays checked, a corrupt count still fails with an
    /// overflow instead of an allocation.
    pub fn unlimited() -> Limits {
        Limits {
            decoding_buffer_size: usize::MAX,
            ifd_entry_count: u64::MAX,
            _non_exhaustive: (),
        }
    }
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            decoding_buffer_size: 256 * 1024 * 1024,
            ifd_entry_count: 1 << 20,
            _non_exhaustive: (),
        }
    }
}

/// An opened TIFF or BigTIFF container.
///
/// The reader itself holds no lease. Every directory read borrows a fresh one from the source,
/// and every [`FieldReader`] owns one, so a `TiffFileReader` can be shared between threads.
pub struct TiffFileReader {
    source: Arc<dyn ContentSource>,
    header: Header,
    context: OperationContext,
    limits: Limits,
}

impl std::fmt::Debug for TiffFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffFileReader")
            .field("header", &self.header)
            .field("limits", &self.limits)
            .finish()
    }
}

fn probe_header(bytes: &[u8]) -> TiffResult<Header> {
    let header = Header::try_parse(bytes)
        .ok_or(TiffError::FormatError(TiffFormatError::TiffSignatureNotFound))?;
    log::debug!(
        "detected {} {:?} container, first directory at {}",
        if header.is_bigtiff() { "BigTIFF" } else { "TIFF" },
        header.byte_order(),
        header.first_ifd_offset()
    );
    Ok(header)
}

impl TiffFileReader {
    /// Probe the header of `source`.
    pub fn open<S: ContentSource + 'static>(source: S) -> TiffResult<Self> {
        Self::open_shared(Arc::new(source))
    }

    pub fn open_shared(source: Arc<dyn ContentSource>) -> TiffResult<Self> {
        let mut lease = source.open_reader()?;
        let mut buffer = [0u8; MAX_HEADER_LEN];
        let read = lease.read(StreamOffset::ZERO, &mut buffer);
        lease.close();
        let header = probe_header(&buffer[..read?])?;
        Ok(Self::from_parts(source, header))
    }

    pub async fn open_async<S: ContentSource + 'static>(
        source: S,
        cancel: &CancellationToken,
    ) -> TiffResult<Self> {
        Self::open_shared_async(Arc::new(source), cancel).await
    }

    pub async fn open_shared_async(
        source: Arc<dyn ContentSource>,
        cancel: &CancellationToken,
    ) -> TiffResult<Self> {
        let mut lease = source.open_reader_async(cancel).await?;
        let mut buffer = [0u8; MAX_HEADER_LEN];
        let read = lease
            .read_async(StreamOffset::ZERO, &mut buffer, cancel)
            .await;
        lease.close();
        let header = probe_header(&buffer[..read?])?;
        Ok(Self::from_parts(source, header))
    }

    fn from_parts(source: Arc<dyn ContentSource>, header: Header) -> Self {
        TiffFileReader {
            source,
            context: header.create_operation_context(),
            header,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn first_ifd_offset(&self) -> StreamOffset {
        self.header.first_ifd_offset()
    }

    pub fn read_first_directory(&self) -> TiffResult<Directory> {
        self.read_directory(self.header.first_ifd_offset())
    }

    pub fn read_directory(&self, offset: StreamOffset) -> TiffResult<Directory> {
        let mut lease = self.source.open_reader()?;
        let directory = read_directory(&mut lease, &self.context, offset, &self.limits);
        lease.close();
        directory
    }

    /// Every directory of the main chain, following `next` links from the first one.
    ///
    /// A link back into the chain fails with [`TiffFormatError::CycleInOffsets`].
    pub fn read_directories(&self) -> TiffResult<Vec<Directory>> {
        let mut lease = self.source.open_reader()?;
        let mut cycles = IfdCycles::new();
        let mut directories = Vec::new();

        let mut next = Some(self.header.first_ifd_offset());
        while let Some(offset) = next {
            let directory = match read_directory(&mut lease, &self.context, offset, &self.limits)
            {
                Ok(directory) => directory,
                Err(err) => {
                    lease.close();
                    return Err(err);
                }
            };
            if let Err(err) = cycles.insert_next(offset, directory.next()) {
                lease.close();
                return Err(err);
            }
            next = directory.next();
            directories.push(directory);
        }

        lease.close();
        Ok(directories)
    }

    pub async fn read_first_directory_async(
        &self,
        cancel: &CancellationToken,
    ) -> TiffResult<Directory> {
        self.read_directory_async(self.header.first_ifd_offset(), cancel)
            .await
    }

    pub async fn read_directory_async(
        &self,
        offset: StreamOffset,
        cancel: &CancellationToken,
    ) -> TiffResult<Directory> {
        let mut lease = self.source.open_reader_async(cancel).await?;
        let directory =
            read_directory_async(&mut lease, &self.context, offset, &self.limits, cancel).await;
        lease.close();
        directory
    }

    pub async fn read_directories_async(
        &self,
        cancel: &CancellationToken,
    ) -> TiffResult<Vec<Directory>> {
        let mut lease = self.source.open_reader_async(cancel).await?;
        let result = Self::walk_chain_async(
            &mut lease,
            &self.context,
            &self.limits,
            self.header.first_ifd_offset(),
            cancel,
        )
        .await;
        lease.close();
        result
    }

    async fn walk_chain_async(
        lease: &mut Box<dyn ContentReader>,
        context: &OperationContext,
        limits: &Limits,
        first: StreamOffset,
        cancel: &CancellationToken,
    ) -> TiffResult<Vec<Directory>> {
        let mut cycles = IfdCycles::new();
        let mut directories = Vec::new();

        let mut next = Some(first);
        while let Some(offset) = next {
            let directory = read_directory_async(lease, context, offset, limits, cancel).await?;
            cycles.insert_next(offset, directory.next())?;
            next = directory.next();
            directories.push(directory);
        }

        Ok(directories)
    }

    /// A field reader with its own lease on the source.
    pub fn create_field_reader(&self) -> TiffResult<FieldReader> {
        let lease = self.source.open_reader()?;
        Ok(FieldReader::new(lease, self.context, self.limits.clone()))
    }

    pub async fn create_field_reader_async(
        &self,
        cancel: &CancellationToken,
    ) -> TiffResult<FieldReader> {
        let lease = self.source.open_reader_async(cancel).await?;
        Ok(FieldReader::new(lease, self.context, self.limits.clone()))
    }

    /// Dispose the underlying source. Field readers that are already open keep working.
    pub fn dispose(&self) {
        self.source.dispose();
    }
}
