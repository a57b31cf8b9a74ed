use std::io;
use std::num::TryFromIntError;

use quick_error::quick_error;

use crate::tags::Type;

quick_error! {
    /// Tiff error kinds.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum TiffError {
        /// The stream is not formatted properly
        FormatError(err: TiffFormatError) {
            from()
            display("Format error: {}", err)
        }

        /// The caller violated a precondition of the called operation
        UsageError(err: UsageError) {
            from()
            display("Usage error: {}", err)
        }

        /// An I/O Error occurred while reading or writing the container
        IoError(err: io::Error) {
            from()
            display("{}", err)
            source(err)
        }

        /// A 64-bit count or offset does not fit the required integer domain
        Overflow {
            display("Integer overflow while computing a size or offset")
        }

        /// A configured limit was exceeded
        LimitsExceeded {
            display("The container exceeds the configured limits")
        }

        /// Classic TIFF was requested but the written content needs 64-bit offsets
        RequiresBigTiff {
            display("Content exceeds the 32-bit address range of classic TIFF, BigTIFF is required")
        }

        /// The operation was cancelled before its I/O was issued
        Cancelled {
            display("The operation was cancelled")
        }
    }
}

quick_error! {
    /// The stream does not contain what the container layout promises.
    #[derive(Debug, Clone, PartialEq, Eq)]
    #[non_exhaustive]
    pub enum TiffFormatError {
        TiffSignatureNotFound {
            display("TIFF signature not found.")
        }
        ShortRead { expected: usize, actual: usize } {
            display("Unexpected end of data: expected {} bytes, got {}.", expected, actual)
        }
        UnknownFieldType(code: u16) {
            display("Field type {} is not a known TIFF field type.", code)
        }
        InconsistentSizesEncountered {
            display("Inconsistent sizes encountered.")
        }
        CycleInOffsets {
            display("File contained a cycle in the list of IFDs")
        }
    }
}

quick_error! {
    /// The caller asked for something the current state or the data does not allow.
    #[derive(Debug, Clone, PartialEq, Eq)]
    #[non_exhaustive]
    pub enum UsageError {
        TypeMismatch { requested: Type, declared: Type } {
            display("A {:?} field can not be read as {:?}.", declared, requested)
        }
        Disposed {
            display("The object has already been closed.")
        }
        WriterFinished {
            display("The writer has already been flushed.")
        }
        NoDirectoryWritten {
            display("At least one directory must be written before flushing.")
        }
        UnknownDirectory(offset: u64) {
            display("No directory was written by this writer at offset {}.", offset)
        }
        NegativeOffset(offset: i64) {
            display("Offset {} lies before the start of the stream.", offset)
        }
    }
}

impl From<TryFromIntError> for TiffError {
    fn from(_err: TryFromIntError) -> TiffError {
        TiffError::Overflow
    }
}

/// Result of a container read or write.
pub type TiffResult<T> = Result<T, TiffError>;

/// Build the error reported for a read that came up short.
pub(crate) fn short_read(expected: usize, actual: usize) -> TiffError {
    TiffError::FormatError(TiffFormatError::ShortRead { expected, actual })
}
