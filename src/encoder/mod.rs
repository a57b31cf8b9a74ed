//! The write path: appending values and directories and finishing the header.
//!
//! ```
//! # fn main() -> tiff_container::TiffResult<()> {
//! use tiff_container::content::MemoryWriter;
//! use tiff_container::encoder::{TiffFileWriter, WriterOptions};
//! use tiff_container::tags::Tag;
//!
//! let mut tiff = TiffFileWriter::new(MemoryWriter::new(), WriterOptions::default());
//!
//! let mut dir = tiff.create_directory()?;
//! dir.write_long(Tag::ImageWidth, &[100])?;
//! dir.write_ascii(Tag::Software, &["tiff-container"])?;
//! dir.flush()?;
//!
//! tiff.flush()?;
//! let bytes = tiff.into_inner().into_inner();
//! # assert!(bytes.len() > 8);
//! # Ok(())
//! # }
//! ```

use crate::tags::ByteOrder;

mod directory_encoder;
mod writer;

pub use self::directory_encoder::DirectoryWriter;
pub use self::writer::TiffFileWriter;

/// Layout of a container to be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriterOptions {
    pub byte_order: ByteOrder,
    /// Write BigTIFF, with 64-bit counts and offsets.
    pub bigtiff: bool,
}

impl WriterOptions {
    pub fn little_endian(mut self) -> Self {
        self.byte_order = ByteOrder::LittleEndian;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.byte_order = ByteOrder::BigEndian;
        self
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn bigtiff(mut self, bigtiff: bool) -> Self {
        self.bigtiff = bigtiff;
        self
    }
}

/// Native byte order, classic TIFF.
impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            byte_order: ByteOrder::native(),
            bigtiff: false,
        }
    }
}
