//! Entry handles: the live view yielded by the iterator and the detached
//! form that survives it.
//!
//! A live [`Entry`] is a window into the traverser's current position: its
//! read cursor streams payload bytes straight out of the descent chain
//! without copying, and its descent flag steers what the next iterator
//! advance does. Advancing invalidates the handle; using it afterwards is
//! a programmer error surfaced as [`Error::StaleEntry`].
//!
//! [`Entry::detach`] converts the handle into a [`DetachedEntry`] that owns
//! a private cursor. Detached reads reopen the hierarchy from scratch, so
//! they work after the original iterator has advanced or been dropped, and
//! they always deliver payload bytes from offset 0.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cursor::ArchiveStackCursor;
use crate::decoder::DecoderOptions;
use crate::hierarchy::{PartOrdering, PathHierarchy};
use crate::metadata::{EntryKind, MetadataMap};
use crate::{Error, Result};

/// Read-buffer granularity for `read_to_end` loops.
const READ_BUFFER_SIZE: usize = 8192;

pub(crate) struct EntryState {
    pub hierarchy: PathHierarchy,
    pub kind: EntryKind,
    pub size: u64,
    pub metadata: MetadataMap,
    /// Descend into this entry on the next advance.
    pub descent: bool,
    /// The cursor already holds this entry's stream (archive entries and
    /// synthesized group roots); filesystem entries open lazily on read.
    pub cursor_managed: bool,
    /// Registered multi-volume group, if any.
    pub group: Option<(String, PartOrdering)>,
    /// The iterator has advanced past this entry.
    pub stale: bool,
}

/// One traversed entry: an archive record or a filesystem node.
///
/// Valid until the owning iterator advances. Call [`detach`](Entry::detach)
/// to keep byte-level access beyond that point.
pub struct Entry {
    state: Rc<RefCell<EntryState>>,
    cursor: Rc<RefCell<ArchiveStackCursor>>,
    options: DecoderOptions,
}

impl Entry {
    pub(crate) fn new(
        state: Rc<RefCell<EntryState>>,
        cursor: Rc<RefCell<ArchiveStackCursor>>,
        options: DecoderOptions,
    ) -> Self {
        Entry {
            state,
            cursor,
            options,
        }
    }

    /// The hierarchy identifying this entry, outermost step first.
    pub fn path_hierarchy(&self) -> PathHierarchy {
        self.state.borrow().hierarchy.clone()
    }

    /// File or directory.
    pub fn kind(&self) -> EntryKind {
        self.state.borrow().kind
    }

    /// True for file-kind entries.
    pub fn is_file(&self) -> bool {
        self.kind().is_file()
    }

    /// True for directory-kind entries.
    pub fn is_directory(&self) -> bool {
        self.kind().is_directory()
    }

    /// Reported size in bytes; 0 when unknown.
    pub fn size(&self) -> u64 {
        self.state.borrow().size
    }

    /// Nesting depth: hierarchy length minus one.
    pub fn depth(&self) -> usize {
        self.state.borrow().hierarchy.depth()
    }

    /// Captured metadata, limited to the configured keys.
    pub fn metadata(&self) -> MetadataMap {
        self.state.borrow().metadata.clone()
    }

    /// Whether the next advance will probe this entry as an archive.
    pub fn descent_enabled(&self) -> bool {
        self.state.borrow().descent
    }

    /// Enables or disables descent into this entry.
    ///
    /// Only meaningful while the entry is live; the flag is consulted on
    /// the next iterator advance.
    pub fn set_descent(&self, descend: bool) {
        self.state.borrow_mut().descent = descend;
    }

    /// Registers this entry as one part of a named multi-volume group.
    ///
    /// Parts sharing a base name (and parent) are clustered into one
    /// logical stream that is traversed after the enclosing archive is
    /// exhausted. `ordering` defaults to [`PartOrdering::Natural`].
    /// Registered parts are not descended individually.
    ///
    /// # Errors
    ///
    /// [`Error::StaleEntry`] if the iterator has advanced past this entry.
    pub fn set_multi_volume_group(
        &self,
        base: impl Into<String>,
        ordering: impl Into<Option<PartOrdering>>,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.stale {
            return Err(Error::StaleEntry);
        }
        state.group = Some((base.into(), ordering.into().unwrap_or_default()));
        Ok(())
    }

    /// Reads payload bytes of this entry.
    ///
    /// Reading implicitly disables descent: the payload has been partially
    /// consumed, and silently re-opening it on the next advance would be
    /// surprising. Re-enable with [`set_descent`](Entry::set_descent) if
    /// descent is still wanted.
    ///
    /// Directory entries read as empty.
    ///
    /// # Errors
    ///
    /// [`Error::StaleEntry`] if the iterator has advanced past this entry;
    /// I/O and decoder errors are returned after raising a fault.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        {
            let mut state = self.state.borrow_mut();
            if state.stale {
                return Err(Error::StaleEntry);
            }
            if state.kind.is_directory() {
                return Ok(0);
            }
            state.descent = false;
            if !state.cursor_managed {
                let mut cursor = self.cursor.borrow_mut();
                if cursor.top_stream().is_none() {
                    cursor.open_base(state.hierarchy.clone())?;
                }
            }
        }
        self.cursor.borrow_mut().read(buf)
    }

    /// Reads the entire remaining payload into a vector.
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    /// Converts this handle into a self-contained [`DetachedEntry`].
    ///
    /// The detached entry keeps the hierarchy, kind, size and captured
    /// metadata, and reopens the hierarchy with a private cursor on first
    /// read — the original iterator may advance or be dropped freely.
    pub fn detach(self) -> DetachedEntry {
        let state = self.state.borrow();
        DetachedEntry {
            hierarchy: state.hierarchy.clone(),
            kind: state.kind,
            size: state.size,
            metadata: state.metadata.clone(),
            options: self.options.clone(),
            cursor: None,
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Entry")
            .field("hierarchy", &state.hierarchy.display())
            .field("kind", &state.kind)
            .field("size", &state.size)
            .field("depth", &state.hierarchy.depth())
            .field("stale", &state.stale)
            .finish()
    }
}

/// A recorded entry that can re-read its payload independently of the
/// traverser it came from.
pub struct DetachedEntry {
    hierarchy: PathHierarchy,
    kind: EntryKind,
    size: u64,
    metadata: MetadataMap,
    options: DecoderOptions,
    /// Private cursor, built on first read.
    cursor: Option<ArchiveStackCursor>,
}

impl DetachedEntry {
    /// The hierarchy identifying this entry.
    pub fn path_hierarchy(&self) -> &PathHierarchy {
        &self.hierarchy
    }

    /// File or directory.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Reported size in bytes; 0 when unknown.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Nesting depth: hierarchy length minus one.
    pub fn depth(&self) -> usize {
        self.hierarchy.depth()
    }

    /// Metadata captured when the entry was yielded.
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Reads payload bytes, reopening the hierarchy on first call.
    ///
    /// The private cursor rebuilds the whole descent chain (root file,
    /// every intermediate archive, the entry itself), so the bytes are the
    /// same ones the live entry would have delivered.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.kind.is_directory() {
            return Ok(0);
        }
        if self.cursor.is_none() {
            let mut cursor = ArchiveStackCursor::new();
            cursor.configure(self.options.clone());
            cursor.synchronize_to_hierarchy(&self.hierarchy)?;
            self.cursor = Some(cursor);
        }
        self.cursor
            .as_mut()
            .expect("cursor built above")
            .read(buf)
    }

    /// Reads the entire remaining payload into a vector.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    /// Drops the private cursor so the next read reopens from scratch.
    pub fn rewind(&mut self) {
        self.cursor = None;
    }
}

impl std::fmt::Debug for DetachedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachedEntry")
            .field("hierarchy", &self.hierarchy.display())
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish()
    }
}
