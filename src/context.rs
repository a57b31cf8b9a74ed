use crate::tags::ByteOrder;

/// The two container variants.
///
/// Classic TIFF addresses its content with 32-bit offsets, BigTIFF widens counts and offsets to
/// 64 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TiffKind {
    Classic,
    Big,
}

impl TiffKind {
    pub fn is_big(self) -> bool {
        self == TiffKind::Big
    }

    /// The version marker stored in bytes 2..4 of the header.
    pub fn version(self) -> u16 {
        match self {
            TiffKind::Classic => 42,
            TiffKind::Big => 43,
        }
    }

    pub fn from_version(version: u16) -> Option<Self> {
        match version {
            42 => Some(TiffKind::Classic),
            43 => Some(TiffKind::Big),
            _ => None,
        }
    }

    /// Size of the fixed header, 8 bytes for classic TIFF and 16 bytes for BigTIFF.
    pub fn header_len(self) -> usize {
        match self {
            TiffKind::Classic => 8,
            TiffKind::Big => 16,
        }
    }

    /// Width of the entry count that starts every IFD.
    pub fn count_field_width(self) -> usize {
        match self {
            TiffKind::Classic => 2,
            TiffKind::Big => 8,
        }
    }

    /// Width of value/offset slots and of the next-IFD pointer.
    pub fn offset_field_width(self) -> usize {
        match self {
            TiffKind::Classic => 4,
            TiffKind::Big => 8,
        }
    }
}

/// Parsing parameters shared by everything that reads or writes one container.
///
/// Derived once from the header and never changed afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperationContext {
    byte_order: ByteOrder,
    kind: TiffKind,
}

impl OperationContext {
    pub fn new(byte_order: ByteOrder, kind: TiffKind) -> Self {
        OperationContext { byte_order, kind }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn is_little_endian(&self) -> bool {
        self.byte_order.is_little_endian()
    }

    pub fn kind(&self) -> TiffKind {
        self.kind
    }

    pub fn is_big(&self) -> bool {
        self.kind.is_big()
    }

    /// 2 for classic TIFF, 8 for BigTIFF.
    pub fn count_field_width(&self) -> usize {
        self.kind.count_field_width()
    }

    /// 4 for classic TIFF, 8 for BigTIFF.
    pub fn offset_field_width(&self) -> usize {
        self.kind.offset_field_width()
    }

    /// Length of one serialized directory entry: 12 bytes classic, 20 bytes BigTIFF.
    pub fn entry_field_length(&self) -> usize {
        4 + 2 * self.offset_field_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        let classic = OperationContext::new(ByteOrder::LittleEndian, TiffKind::Classic);
        assert_eq!(classic.count_field_width(), 2);
        assert_eq!(classic.offset_field_width(), 4);
        assert_eq!(classic.entry_field_length(), 12);

        let big = OperationContext::new(ByteOrder::BigEndian, TiffKind::Big);
        assert_eq!(big.count_field_width(), 8);
        assert_eq!(big.offset_field_width(), 8);
        assert_eq!(big.entry_field_length(), 20);
        assert!(!big.is_little_endian());
    }
}
