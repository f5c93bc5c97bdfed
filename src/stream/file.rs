//! System file streams and filesystem metadata capture.
//!
//! [`FilePartIo`] opens parts through buffered OS file I/O. A part's
//! hierarchy maps to an OS path by joining its `Single` components, so the
//! same code serves plain roots (`[archive.tar]`), filesystem-walk entries
//! (`[/d, sub, b]` → `/d/sub/b`), and filesystem-level multi-volume groups
//! (each part name is itself a path).
//!
//! Open and read failures raise faults carrying the offending hierarchy
//! and the OS error string before the error propagates.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::fault::{self, EntryFault};
use crate::hierarchy::PathHierarchy;
use crate::metadata::{EntryKind, MetadataMap, MetadataValue};
use crate::stream::multivolume::{MultiVolume, PartIo};
use crate::{Error, Result};

/// A data stream over one filesystem file or a group of split volume files.
pub type FileStream = MultiVolume<FilePartIo>;

/// Opens a file stream for `hierarchy`.
///
/// The hierarchy's final step may be `Single` (one file) or `MultiVolume`
/// (split volumes concatenated in part order). Parts open lazily; this
/// constructor does not touch the filesystem.
pub fn file_stream(hierarchy: PathHierarchy) -> Result<FileStream> {
    MultiVolume::new(hierarchy, FilePartIo::new())
}

/// Joins the `Single` components of a hierarchy into an OS path.
pub(crate) fn os_path_of(hierarchy: &PathHierarchy) -> Result<PathBuf> {
    if hierarchy.is_empty() {
        return Err(Error::InvalidHierarchy(
            "cannot derive a path from an empty hierarchy".into(),
        ));
    }
    let mut path = PathBuf::new();
    for entry in hierarchy.entries() {
        let component = entry.as_single().ok_or_else(|| {
            Error::InvalidHierarchy(format!(
                "hierarchy step '{entry}' is not a single filesystem component"
            ))
        })?;
        path.push(component);
    }
    Ok(path)
}

/// An open part: a buffered file plus its identity for diagnostics.
pub struct OpenFile {
    reader: BufReader<File>,
    path: PathBuf,
    hierarchy: PathHierarchy,
}

/// [`PartIo`] implementation over buffered OS files.
pub struct FilePartIo {
    _private: (),
}

impl FilePartIo {
    /// Creates the part IO with no file open.
    pub fn new() -> Self {
        FilePartIo { _private: () }
    }
}

impl Default for FilePartIo {
    fn default() -> Self {
        Self::new()
    }
}

impl PartIo for FilePartIo {
    type Part = OpenFile;

    fn open_part(&mut self, path: &PathHierarchy) -> Result<OpenFile> {
        let os_path = os_path_of(path)?;
        match File::open(&os_path) {
            Ok(file) => Ok(OpenFile {
                reader: BufReader::new(file),
                path: os_path,
                hierarchy: path.clone(),
            }),
            Err(e) => {
                fault::emit(EntryFault::new(
                    path.clone(),
                    format!("Failed to open root file {}: {}", os_path.display(), e),
                    e.raw_os_error(),
                ));
                Err(Error::Io(e))
            }
        }
    }

    fn close_part(&mut self, part: OpenFile) {
        drop(part);
    }

    fn read_part(&mut self, part: &mut OpenFile, buf: &mut [u8]) -> Result<usize> {
        match part.reader.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                fault::emit(EntryFault::new(
                    part.hierarchy.clone(),
                    format!("Failed to read root file {}: {}", part.path.display(), e),
                    e.raw_os_error(),
                ));
                Err(Error::Io(e))
            }
        }
    }

    fn seek_part(&mut self, part: &mut OpenFile, offset: u64) -> Result<()> {
        part.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn part_size(&mut self, path: &PathHierarchy) -> Result<u64> {
        let os_path = os_path_of(path)?;
        match fs::metadata(&os_path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) => {
                fault::emit(EntryFault::new(
                    path.clone(),
                    format!("Failed to open root file {}: {}", os_path.display(), e),
                    e.raw_os_error(),
                ));
                Err(Error::Io(e))
            }
        }
    }

    fn can_seek(&self) -> bool {
        true
    }
}

/// Filesystem facts for one node: what the traverser needs to build an entry.
pub struct FileFacts {
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// File or directory.
    pub kind: EntryKind,
    /// Captured metadata limited to the allowed keys.
    pub metadata: MetadataMap,
}

/// Collects stat-based metadata for a filesystem node.
///
/// Fills the keys among `pathname`, `filetype`, `mode`, `size`, `uid`,
/// `gid` that are in `allowed_keys` and resolvable on this platform; keys
/// that cannot be resolved are omitted individually rather than failing the
/// whole entry. `uname`/`gname` resolution is not attempted (the keys are
/// simply absent), matching the per-key omission contract.
pub fn collect_file_metadata(
    path: &std::path::Path,
    allowed_keys: &BTreeSet<String>,
) -> std::io::Result<FileFacts> {
    let meta = fs::symlink_metadata(path)?;
    let kind = if meta.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    let size = if kind.is_directory() { 0 } else { meta.len() };

    let mut metadata = MetadataMap::new();
    let mut capture = |key: &str, value: Option<MetadataValue>| {
        if allowed_keys.contains(key) {
            match value {
                Some(v) => {
                    metadata.insert(key.to_string(), v);
                }
                None => log::debug!("metadata key '{key}' not resolvable for {}", path.display()),
            }
        }
    };

    capture(
        "pathname",
        Some(MetadataValue::Str(path.display().to_string())),
    );
    let filetype = if meta.is_dir() {
        "directory"
    } else if meta.file_type().is_symlink() {
        "symlink"
    } else if meta.is_file() {
        "file"
    } else {
        "special"
    };
    capture("filetype", Some(MetadataValue::Str(filetype.into())));
    capture("size", Some(MetadataValue::UInt(size)));

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        capture("mode", Some(MetadataValue::UInt(u64::from(meta.mode()))));
        capture("uid", Some(MetadataValue::UInt(u64::from(meta.uid()))));
        capture("gid", Some(MetadataValue::UInt(u64::from(meta.gid()))));
        capture("mtime", u64::try_from(meta.mtime()).ok().map(MetadataValue::UInt));
        capture("atime", u64::try_from(meta.atime()).ok().map(MetadataValue::UInt));
        capture("ctime", u64::try_from(meta.ctime()).ok().map(MetadataValue::UInt));
    }
    #[cfg(not(unix))]
    {
        capture(
            "mtime",
            meta.modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| MetadataValue::UInt(d.as_secs())),
        );
    }

    Ok(FileFacts {
        size,
        kind,
        metadata,
    })
}
