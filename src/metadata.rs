//! Entry kinds, metadata values, and the known metadata keyspace.
//!
//! Metadata capture is opt-in: [`TraverserOptions::metadata_keys`] names the
//! keys the caller wants, the engine fills what the source (filesystem stat
//! or decoder header) can provide, and silently omits the rest per key.
//!
//! [`TraverserOptions::metadata_keys`]: crate::TraverserOptions::metadata_keys

use std::collections::BTreeMap;
use std::fmt;

/// Kind of a traversed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A regular file, or any non-directory node (symlinks, devices).
    File,
    /// A directory.
    Directory,
}

impl EntryKind {
    /// True for [`EntryKind::File`].
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// True for [`EntryKind::Directory`].
    pub fn is_directory(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// A typed metadata value captured for an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MetadataValue {
    /// Textual value (`pathname`, `filetype`, `uname`, `symlink`, ...).
    Str(String),
    /// Signed numeric value.
    Int(i64),
    /// Unsigned numeric value (`size`, `mode`, `uid`, `mtime`, ...).
    UInt(u64),
}

impl MetadataValue {
    /// Returns the string form, if this is a [`Str`][MetadataValue::Str] value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as `u64` when it is numeric and non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            MetadataValue::UInt(v) => Some(*v),
            MetadataValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Str(s) => f.write_str(s),
            MetadataValue::Int(v) => write!(f, "{v}"),
            MetadataValue::UInt(v) => write!(f, "{v}"),
        }
    }
}

/// Captured metadata for one entry, keyed by the configured key names.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// The known metadata keyspace.
///
/// [`TraverserOptions`](crate::TraverserOptions) validates requested keys
/// against this set at construction time so typos fail early instead of
/// silently capturing nothing.
pub const METADATA_KEYS: &[&str] = &[
    "pathname",
    "filetype",
    "mode",
    "size",
    "uid",
    "gid",
    "uname",
    "gname",
    "mtime",
    "atime",
    "ctime",
    "birthtime",
    "devmajor",
    "devminor",
    "hardlink",
    "symlink",
    "xattrs",
    "digests",
    "sparse",
    "fflags",
];

/// True if `key` belongs to the known metadata keyspace.
pub fn is_known_metadata_key(key: &str) -> bool {
    METADATA_KEYS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_cover_the_stat_subset() {
        for key in ["pathname", "filetype", "mode", "size", "uid", "gid"] {
            assert!(is_known_metadata_key(key), "missing {key}");
        }
        assert!(!is_known_metadata_key("pathnme"));
    }

    #[test]
    fn value_accessors() {
        assert_eq!(MetadataValue::UInt(7).as_u64(), Some(7));
        assert_eq!(MetadataValue::Int(-1).as_u64(), None);
        assert_eq!(MetadataValue::Str("x".into()).as_str(), Some("x"));
        assert_eq!(MetadataValue::UInt(7).to_string(), "7");
    }
}
