use crate::content::{disposed, CancellationToken, ContentReader};
use crate::context::OperationContext;
use crate::directory::Directory;
use crate::error::{short_read, TiffError, TiffResult, UsageError};
use crate::field::{self, kinds, FieldKind};
use crate::ifd::DirectoryEntry;
use crate::tags::{StreamOffset, Tag, Type};
use crate::value::ValueCollection;

use super::Limits;

/// Where the bytes of one field live.
#[derive(Clone, Copy, Debug)]
enum Location {
    /// Left-justified in the entry's slot, in file byte order.
    Inline([u8; 8]),
    OutOfLine(StreamOffset),
}

/// What to fetch for one field read.
#[derive(Clone, Copy, Debug)]
struct FieldPlan {
    /// The type the stored bytes are laid out as.
    source: Type,
    /// Number of bytes to materialize, after the size limit.
    len: usize,
    location: Location,
}

/// Decodes the values of directory entries.
///
/// A field reader owns one reader lease. It is meant for one caller at a time, callers that decode
/// in parallel should each create their own with
/// [`TiffFileReader::create_field_reader`](super::TiffFileReader::create_field_reader).
///
/// All typed reads take the same two knobs:
///
/// * `size_limit` caps the number of elements that are materialized. `None` reads all of them.
/// * `skip_type_validation` reads the stored bytes as the requested type whatever the entry
///   declares. Otherwise the declared type has to be the requested type or one that widens to it.
pub struct FieldReader {
    reader: Box<dyn ContentReader>,
    context: OperationContext,
    limits: Limits,
    scratch: Vec<u8>,
    closed: bool,
}

impl FieldReader {
    pub fn new(reader: Box<dyn ContentReader>, context: OperationContext, limits: Limits) -> Self {
        FieldReader {
            reader,
            context,
            limits,
            scratch: Vec::new(),
            closed: false,
        }
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    /// Release the lease. Closing twice is a no-op.
    pub fn close(&mut self) {
        if !self.closed {
            self.reader.close();
            self.scratch = Vec::new();
            self.closed = true;
        }
    }

    fn plan(
        &self,
        entry: &DirectoryEntry,
        source: Type,
        size_limit: Option<usize>,
    ) -> TiffResult<FieldPlan> {
        if self.closed {
            return Err(disposed());
        }

        let element_len = field::element_len(source)?;
        let stored_len = entry
            .value_count()
            .checked_mul(element_len as u64)
            .ok_or(TiffError::Overflow)?;

        let count = match size_limit {
            Some(limit) => entry.value_count().min(limit as u64),
            None => entry.value_count(),
        };
        let len = usize::try_from(count)?
            .checked_mul(element_len)
            .ok_or(TiffError::Overflow)?;
        if len > self.limits.decoding_buffer_size {
            return Err(TiffError::LimitsExceeded);
        }

        let location = if stored_len <= self.context.offset_field_width() as u64 {
            let mut slot = [0u8; 8];
            entry.restore_raw_offset_bytes(&self.context, &mut slot);
            Location::Inline(slot)
        } else {
            Location::OutOfLine(entry.value_offset()?)
        };

        log::trace!(
            "field {:?}: {} of {} bytes as {:?}, {:?}",
            entry.tag(),
            len,
            stored_len,
            source,
            location
        );

        Ok(FieldPlan {
            source,
            len,
            location,
        })
    }

    /// Fill the scratch buffer with the bytes of a planned read.
    fn load(&mut self, plan: &FieldPlan) -> TiffResult<()> {
        self.scratch.clear();
        self.scratch.resize(plan.len, 0);

        match plan.location {
            Location::Inline(slot) => self.scratch.copy_from_slice(&slot[..plan.len]),
            Location::OutOfLine(offset) => {
                let read = self.reader.read(offset, &mut self.scratch)?;
                if read != plan.len {
                    return Err(short_read(plan.len, read));
                }
            }
        }
        Ok(())
    }

    async fn load_async(&mut self, plan: &FieldPlan, cancel: &CancellationToken) -> TiffResult<()> {
        self.scratch.clear();
        self.scratch.resize(plan.len, 0);

        match plan.location {
            Location::Inline(slot) => self.scratch.copy_from_slice(&slot[..plan.len]),
            Location::OutOfLine(offset) => {
                let read = self
                    .reader
                    .read_async(offset, &mut self.scratch, cancel)
                    .await?;
                if read != plan.len {
                    return Err(short_read(plan.len, read));
                }
            }
        }
        Ok(())
    }

    /// Read the values of `entry` as `K`, widening narrower declared types.
    pub fn read_field<K: FieldKind>(
        &mut self,
        entry: &DirectoryEntry,
        size_limit: Option<usize>,
        skip_type_validation: bool,
    ) -> TiffResult<ValueCollection<K::Value>> {
        let source = field::source_type::<K>(entry.field_type(), skip_type_validation)?;
        let plan = self.plan(entry, source, size_limit)?;
        self.load(&plan)?;
        field::decode_values::<K>(plan.source, &self.scratch, self.context.byte_order())
    }

    pub async fn read_field_async<K: FieldKind>(
        &mut self,
        entry: &DirectoryEntry,
        size_limit: Option<usize>,
        skip_type_validation: bool,
        cancel: &CancellationToken,
    ) -> TiffResult<ValueCollection<K::Value>> {
        let source = field::source_type::<K>(entry.field_type(), skip_type_validation)?;
        let plan = self.plan(entry, source, size_limit)?;
        self.load_async(&plan, cancel).await?;
        field::decode_values::<K>(plan.source, &self.scratch, self.context.byte_order())
    }

    /// Decode up to `dest.len()` values of `entry` into `dest`, returning how many were written.
    pub fn read_field_into<K: FieldKind>(
        &mut self,
        entry: &DirectoryEntry,
        dest: &mut [K::Value],
        skip_type_validation: bool,
    ) -> TiffResult<usize> {
        let source = field::source_type::<K>(entry.field_type(), skip_type_validation)?;
        let plan = self.plan(entry, source, Some(dest.len()))?;
        self.load(&plan)?;
        field::decode_into::<K>(plan.source, &self.scratch, self.context.byte_order(), dest)
    }

    pub async fn read_field_into_async<K: FieldKind>(
        &mut self,
        entry: &DirectoryEntry,
        dest: &mut [K::Value],
        skip_type_validation: bool,
        cancel: &CancellationToken,
    ) -> TiffResult<usize> {
        let source = field::source_type::<K>(entry.field_type(), skip_type_validation)?;
        let plan = self.plan(entry, source, Some(dest.len()))?;
        self.load_async(&plan, cancel).await?;
        field::decode_into::<K>(plan.source, &self.scratch, self.context.byte_order(), dest)
    }

    /// The stored bytes of `entry` in file byte order, for any known declared type.
    ///
    /// `size_limit` counts elements of the declared type, not bytes.
    pub fn read_field_bytes(
        &mut self,
        entry: &DirectoryEntry,
        size_limit: Option<usize>,
    ) -> TiffResult<Vec<u8>> {
        let plan = self.plan(entry, entry.field_type(), size_limit)?;
        self.load(&plan)?;
        Ok(self.scratch.clone())
    }

    pub async fn read_field_bytes_async(
        &mut self,
        entry: &DirectoryEntry,
        size_limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> TiffResult<Vec<u8>> {
        let plan = self.plan(entry, entry.field_type(), size_limit)?;
        self.load_async(&plan, cancel).await?;
        Ok(self.scratch.clone())
    }

    fn ascii_source(entry: &DirectoryEntry, skip_type_validation: bool) -> TiffResult<Type> {
        if skip_type_validation || entry.field_type() == Type::ASCII {
            Ok(Type::ASCII)
        } else {
            Err(TiffError::UsageError(UsageError::TypeMismatch {
                requested: Type::ASCII,
                declared: entry.field_type(),
            }))
        }
    }

    /// Read the NUL-separated strings of an `ASCII` field.
    ///
    /// `size_limit` caps the number of bytes considered.
    pub fn read_ascii_field(
        &mut self,
        entry: &DirectoryEntry,
        size_limit: Option<usize>,
        skip_type_validation: bool,
    ) -> TiffResult<ValueCollection<String>> {
        let source = Self::ascii_source(entry, skip_type_validation)?;
        let plan = self.plan(entry, source, size_limit)?;
        self.load(&plan)?;
        Ok(field::split_ascii(&self.scratch))
    }

    pub async fn read_ascii_field_async(
        &mut self,
        entry: &DirectoryEntry,
        size_limit: Option<usize>,
        skip_type_validation: bool,
        cancel: &CancellationToken,
    ) -> TiffResult<ValueCollection<String>> {
        let source = Self::ascii_source(entry, skip_type_validation)?;
        let plan = self.plan(entry, source, size_limit)?;
        self.load_async(&plan, cancel).await?;
        Ok(field::split_ascii(&self.scratch))
    }

    /// Look up `tag` in `directory` and read it as `K`.
    ///
    /// A missing tag is not an error, it yields an empty collection.
    pub fn read_tag<K: FieldKind>(
        &mut self,
        directory: &Directory,
        tag: Tag,
        size_limit: Option<usize>,
    ) -> TiffResult<ValueCollection<K::Value>> {
        match directory.find(tag) {
            Some(entry) => self.read_field::<K>(entry, size_limit, false),
            None => Ok(ValueCollection::Empty),
        }
    }

    pub async fn read_tag_async<K: FieldKind>(
        &mut self,
        directory: &Directory,
        tag: Tag,
        size_limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> TiffResult<ValueCollection<K::Value>> {
        match directory.find(tag) {
            Some(entry) => {
                self.read_field_async::<K>(entry, size_limit, false, cancel)
                    .await
            }
            None => Ok(ValueCollection::Empty),
        }
    }

    /// Look up `tag` in `directory` and read its strings, empty if the tag is missing.
    pub fn read_ascii_tag(
        &mut self,
        directory: &Directory,
        tag: Tag,
    ) -> TiffResult<ValueCollection<String>> {
        match directory.find(tag) {
            Some(entry) => self.read_ascii_field(entry, None, false),
            None => Ok(ValueCollection::Empty),
        }
    }
}

macro_rules! typed_reads {
    ($($kind:ident: $read:ident, $read_async:ident;)*) => {
        impl FieldReader {
            $(
                #[doc = concat!("Read a field as [`kinds::", stringify!($kind), "`].")]
                pub fn $read(
                    &mut self,
                    entry: &DirectoryEntry,
                    size_limit: Option<usize>,
                    skip_type_validation: bool,
                ) -> TiffResult<ValueCollection<<kinds::$kind as FieldKind>::Value>> {
                    self.read_field::<kinds::$kind>(entry, size_limit, skip_type_validation)
                }

                pub async fn $read_async(
                    &mut self,
                    entry: &DirectoryEntry,
                    size_limit: Option<usize>,
                    skip_type_validation: bool,
                    cancel: &CancellationToken,
                ) -> TiffResult<ValueCollection<<kinds::$kind as FieldKind>::Value>> {
                    self.read_field_async::<kinds::$kind>(
                        entry,
                        size_limit,
                        skip_type_validation,
                        cancel,
                    )
                    .await
                }
            )*
        }
    };
}

typed_reads! {
    Byte: read_byte_field, read_byte_field_async;
    SByte: read_sbyte_field, read_sbyte_field_async;
    Undefined: read_undefined_field, read_undefined_field_async;
    Short: read_short_field, read_short_field_async;
    SShort: read_sshort_field, read_sshort_field_async;
    Long: read_long_field, read_long_field_async;
    SLong: read_slong_field, read_slong_field_async;
    Long8: read_long8_field, read_long8_field_async;
    SLong8: read_slong8_field, read_slong8_field_async;
    Rational: read_rational_field, read_rational_field_async;
    SRational: read_srational_field, read_srational_field_async;
    Float: read_float_field, read_float_field_async;
    Double: read_double_field, read_double_field_async;
    Ifd: read_ifd_field, read_ifd_field_async;
    Ifd8: read_ifd8_field, read_ifd8_field_async;
}
