use core::fmt;

use crate::{
    ifd::DirectoryEntry,
    tags::{StreamOffset, Tag},
};

/// An Image File Directory (IFD).
///
/// A directory is a sequence of [`DirectoryEntry`] records in stream order plus the offset of
/// the next directory. The values are stored anywhere in the file, with the entries containing
/// either the values themselves or the offsets to them. Use a
/// [`FieldReader`](crate::decoder::FieldReader) to decode them.
///
/// Directories are read with
/// [`TiffFileReader::read_directory`](crate::decoder::TiffFileReader::read_directory) and
/// written with a [`DirectoryWriter`](crate::encoder::DirectoryWriter).
#[doc(alias = "IFD")]
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Directory {
    /// Entries in the order they were found. The TIFF specification asks for ascending tags but
    /// nothing here depends on it.
    pub(crate) entries: Vec<DirectoryEntry>,
    pub(crate) next_offset: StreamOffset,
}

impl Directory {
    pub fn new(entries: Vec<DirectoryEntry>, next_offset: StreamOffset) -> Self {
        Directory {
            entries,
            next_offset,
        }
    }

    /// Find the first entry for a tag.
    pub fn find(&self, tag: Tag) -> Option<&DirectoryEntry> {
        let id = tag.to_u16();
        self.entries.iter().find(|e| e.tag_id() == id)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.find(tag).is_some()
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The raw next-IFD offset, `0` at the end of the chain.
    pub fn next_offset(&self) -> StreamOffset {
        self.next_offset
    }

    /// The offset of the next directory, if there is one.
    pub fn next(&self) -> Option<StreamOffset> {
        if self.next_offset.is_zero() {
            None
        } else {
            Some(self.next_offset)
        }
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("entries", &self.entries)
            .field("next_ifd", &self.next_offset)
            .finish()
    }
}
