//! Reading and writing the TIFF container structure
//!
//! A TIFF file is a header followed by a linked list of Image File Directories (IFDs), each a
//! table of tagged, typed fields. This crate parses and produces that structure for classic TIFF
//! and BigTIFF in either byte order. It does not interpret pixel data, strips and tiles are
//! ordinary fields and byte ranges here.
//!
//! * [`decoder::TiffFileReader`] opens a container from any [`content::ContentSource`], walks its
//!   directories and hands out [`decoder::FieldReader`]s that decode typed values.
//! * [`encoder::TiffFileWriter`] appends values and directories to a [`content::ContentWriter`]
//!   and writes the header last.
//!
//! Every I/O operation has a blocking and an asynchronous form.
//!
//! # Related Links
//! * <https://web.archive.org/web/20210108073850/https://www.adobe.io/open/standards/TIFF.html> - The TIFF specification
//! * <https://www.awaresystems.be/imaging/tiff/bigtiff.html> - The BigTIFF extension

pub mod content;
mod context;
pub mod decoder;
mod directory;
pub mod encoder;
mod error;
pub mod field;
mod header;
mod ifd;
pub mod tags;
mod value;

pub use self::context::{OperationContext, TiffKind};
pub use self::directory::Directory;
pub use self::error::{TiffError, TiffFormatError, TiffResult, UsageError};
pub use self::header::{Header, BIG_ENDIAN_MARKER, LITTLE_ENDIAN_MARKER, MAX_HEADER_LEN};
pub use self::ifd::DirectoryEntry;
pub use self::value::{Rational, SRational, ValueCollection};
