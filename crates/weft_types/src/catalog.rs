//! Closed catalog of base types.

use crate::native::{NativeType, Origin};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use weft_model::{BlobType, LiteralType, SimpleType};

/// Blob format tags for file-like handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Unspecified format
    Base,
    /// Text stream
    TextIo,
    /// Byte stream
    BinaryIo,
    /// Comma separated values
    Csv,
}

impl FileFormat {
    /// Format tag written into the blob type
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "",
            Self::TextIo => "TextIO",
            Self::BinaryIo => "BinaryIO",
            Self::Csv => "csv",
        }
    }

    fn blob(self) -> LiteralType {
        LiteralType::Blob(BlobType::single(self.as_str()))
    }
}

// Only bare origins are keys; `dict` here is the untyped generic document.
static BASE_TYPES: Lazy<IndexMap<Origin, LiteralType>> = Lazy::new(|| {
    IndexMap::from([
        (Origin::Int, LiteralType::Simple(SimpleType::Integer)),
        (Origin::Float, LiteralType::Simple(SimpleType::Float)),
        (Origin::Bool, LiteralType::Simple(SimpleType::Boolean)),
        (Origin::Datetime, LiteralType::Simple(SimpleType::Datetime)),
        (Origin::Timedelta, LiteralType::Simple(SimpleType::Duration)),
        (Origin::Str, LiteralType::Simple(SimpleType::String)),
        (Origin::Dict, LiteralType::Simple(SimpleType::Struct)),
        (Origin::None, LiteralType::Simple(SimpleType::None)),
        (Origin::TextIo, FileFormat::TextIo.blob()),
        (Origin::BinaryIo, FileFormat::BinaryIo.blob()),
        (Origin::File, FileFormat::Base.blob()),
        (Origin::CsvFile, FileFormat::Csv.blob()),
    ])
});

/// Catalog entry for a bare native type
#[must_use]
pub fn base_type(native: &NativeType) -> Option<&'static LiteralType> {
    if !native.is_bare() {
        return None;
    }
    BASE_TYPES.get(native.origin())
}

/// Origins present in the catalog, in catalog order
pub fn base_origins() -> impl Iterator<Item = &'static Origin> {
    BASE_TYPES.keys()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(
            base_type(&NativeType::int()),
            Some(&LiteralType::Simple(SimpleType::Integer))
        );
        assert_eq!(
            base_type(&NativeType::bool()),
            Some(&LiteralType::Simple(SimpleType::Boolean))
        );
        assert_eq!(
            base_type(&NativeType::none()),
            Some(&LiteralType::Simple(SimpleType::None))
        );
    }

    #[test]
    fn test_blobs() {
        let csv = base_type(&NativeType::bare(Origin::CsvFile)).unwrap();
        assert_eq!(csv, &LiteralType::Blob(BlobType::single("csv")));

        let file = base_type(&NativeType::bare(Origin::File)).unwrap();
        assert_eq!(file, &LiteralType::Blob(BlobType::single("")));
    }

    #[test]
    fn test_bare_dict_is_generic() {
        assert_eq!(
            base_type(&NativeType::bare(Origin::Dict)),
            Some(&LiteralType::Simple(SimpleType::Struct))
        );
    }

    #[test]
    fn test_generic_types_miss() {
        assert!(base_type(&NativeType::list(NativeType::int())).is_none());
        assert!(base_type(&NativeType::bare(Origin::List)).is_none());
        assert!(base_type(&NativeType::bare(Origin::Tuple)).is_none());
    }

    #[test]
    fn test_catalog_is_closed() {
        assert_eq!(base_origins().count(), 12);
    }
}
