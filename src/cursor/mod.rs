//! Archive stack cursor.
//!
//! The cursor is the mutable descent path of a traversal: a stack of open
//! streams, one per depth level, plus a pointer to the innermost decoder.
//! Per stack level the life cycle is
//!
//! ```text
//! empty --create_stream--> stream
//! stream --descend--> archive-open
//! archive-open --next--> positioned-entry   (top slot = payload stream)
//! positioned-entry --descend--> archive-open, one level deeper
//! positioned-entry --next--> positioned-entry
//! archive-open --ascend--> parent level's positioned-entry
//! ```
//!
//! At most one cursor is active per level; entries handed to consumers are
//! views into the cursor's current position and never copy payload bytes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::decoder::{DecoderOptions, EntryHeader};
use crate::hierarchy::PathHierarchy;
use crate::stream::{DataStream, SharedStream, file, payload_stream, share};
use crate::{Error, Result, factory};

mod archive;

pub use archive::StreamArchive;

/// Stack of (stream, decoder) pairs forming the current descent path.
pub struct ArchiveStackCursor {
    options: DecoderOptions,
    /// One slot per open depth level; `None` while the level has not yet
    /// opened a concrete child stream.
    stack: Vec<Option<SharedStream>>,
    current_archive: Option<Rc<RefCell<StreamArchive>>>,
    /// Number of archives currently open.
    open_archives: usize,
}

impl ArchiveStackCursor {
    /// Creates an idle cursor with default options.
    pub fn new() -> Self {
        ArchiveStackCursor {
            options: DecoderOptions::default(),
            stack: Vec::new(),
            current_archive: None,
            open_archives: 0,
        }
    }

    /// Snapshots the options used for every subsequent descend.
    pub fn configure(&mut self, options: DecoderOptions) {
        self.options = options;
    }

    /// True while at least one archive is open.
    pub fn is_descended(&self) -> bool {
        self.current_archive.is_some()
    }

    /// Number of archives currently open along the descent path.
    pub fn descent_depth(&self) -> usize {
        self.open_archives
    }

    /// The innermost open archive.
    pub fn current_archive(&self) -> Option<Rc<RefCell<StreamArchive>>> {
        self.current_archive.clone()
    }

    /// The stream at the top of the stack.
    pub fn top_stream(&self) -> Option<SharedStream> {
        self.stack.last().and_then(Clone::clone)
    }

    /// Constructs a stream for `hierarchy` at the current position.
    ///
    /// With an archive open, the stream reads that archive's entries;
    /// otherwise it is a root: single-step roots are offered to the root
    /// stream factory first, then everything falls back to the filesystem.
    pub fn create_stream(&self, hierarchy: PathHierarchy) -> Result<Box<dyn DataStream>> {
        if let Some(archive) = &self.current_archive {
            return Ok(Box::new(payload_stream(Rc::clone(archive), hierarchy)?));
        }
        if hierarchy.len() == 1 {
            if let Some(stream) = factory::open_root(&hierarchy) {
                log::debug!(
                    "root stream factory served '{}'",
                    hierarchy.display()
                );
                return Ok(stream);
            }
        }
        Ok(Box::new(file::file_stream(hierarchy)?))
    }

    /// Places a base stream for `hierarchy` on an empty stack.
    pub fn open_base(&mut self, hierarchy: PathHierarchy) -> Result<()> {
        debug_assert!(self.stack.is_empty() && self.current_archive.is_none());
        let stream = self.create_stream(hierarchy)?;
        self.stack.push(Some(share(stream)));
        Ok(())
    }

    /// Opens a decoder over the top-of-stack stream and descends into it.
    ///
    /// The probe rewinds the stream first, so a payload stream whose
    /// content was already read re-presents its bytes from offset 0 (the
    /// parent archive restarts as needed).
    pub fn descend(&mut self) -> Result<()> {
        let top = self
            .top_stream()
            .ok_or_else(|| Error::InvalidHierarchy("no stream to descend into".into()))?;
        let archive = StreamArchive::open(top, self.options.clone())?;
        self.stack.push(None);
        self.current_archive = Some(Rc::new(RefCell::new(archive)));
        self.open_archives += 1;
        Ok(())
    }

    /// Advances the innermost archive to its next entry and places that
    /// entry's payload stream on top of the stack.
    pub fn next(&mut self) -> Result<Option<EntryHeader>> {
        let archive = self
            .current_archive
            .clone()
            .ok_or_else(|| Error::InvalidHierarchy("no archive open".into()))?;
        let header = archive.borrow_mut().skip_to_next_header()?;
        let Some(header) = header else {
            return Ok(None);
        };
        let hierarchy = archive
            .borrow()
            .source_hierarchy()
            .append_single(&header.name);
        let stream = payload_stream(archive, hierarchy)?;
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| Error::InvalidHierarchy("cursor stack is empty".into()))?;
        *top = Some(share(Box::new(stream)));
        Ok(Some(header))
    }

    /// Closes the innermost archive and returns to the level above.
    pub fn ascend(&mut self) -> Result<()> {
        let archive = self
            .current_archive
            .take()
            .ok_or_else(|| Error::InvalidHierarchy("no archive open".into()))?;
        self.stack.pop();
        self.current_archive = archive.borrow().parent_archive();
        self.open_archives = self.open_archives.saturating_sub(1);
        Ok(())
    }

    /// Reads payload bytes from the top-of-stack stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self
            .top_stream()
            .ok_or_else(|| Error::InvalidHierarchy("no stream to read from".into()))?;
        let n = stream.borrow_mut().read(buf)?;
        Ok(n)
    }

    /// Hierarchy of the innermost archive's current entry.
    pub fn current_entry_hierarchy(&self) -> Option<PathHierarchy> {
        self.current_archive
            .as_ref()
            .and_then(|a| a.borrow().current_entry_hierarchy())
    }

    /// Drops every open level, top of stack first.
    pub fn reset(&mut self) {
        self.current_archive = None;
        self.open_archives = 0;
        while self.stack.pop().is_some() {}
    }

    /// Rebuilds the descent chain so that `target`'s stream sits on top of
    /// the stack, not descended into.
    ///
    /// The chain starts at the deepest prefix the filesystem (or the root
    /// stream factory) can serve directly; every deeper step is an archive
    /// level entered with a fresh payload stream. Detached entries use this
    /// to reopen their hierarchy after the owning iterator has moved on.
    pub fn synchronize_to_hierarchy(&mut self, target: &PathHierarchy) -> Result<()> {
        let levels = target.len();
        if levels == 0 {
            return Err(Error::InvalidHierarchy(
                "cannot synchronize to an empty hierarchy".into(),
            ));
        }
        self.reset();

        let base_levels = self.find_base_levels(target)?;
        let base = target.prefix_until(base_levels - 1);
        self.open_base(base)?;
        if let Some(stream) = self.top_stream() {
            stream.borrow_mut().rewind()?;
        }

        for level in base_levels..levels {
            self.descend()?;
            let prefix = target.prefix_until(level);
            let archive = self
                .current_archive
                .clone()
                .ok_or_else(|| Error::InvalidHierarchy("descend left no archive".into()))?;
            let stream = payload_stream(archive, prefix)?;
            let top = self
                .stack
                .last_mut()
                .ok_or_else(|| Error::InvalidHierarchy("cursor stack is empty".into()))?;
            *top = Some(share(Box::new(stream)));
        }
        Ok(())
    }

    /// Number of leading hierarchy steps resolvable without a decoder: the
    /// longest prefix whose (first) part is an existing filesystem file, or
    /// a single-step prefix the factory claims.
    fn find_base_levels(&self, target: &PathHierarchy) -> Result<usize> {
        for levels in (1..=target.len()).rev() {
            let prefix = target.prefix_until(levels - 1);
            let Ok(first_part) = prefix.select_single_part(0) else {
                continue;
            };
            if let Ok(path) = file::os_path_of(&first_part) {
                if path.is_file() {
                    return Ok(levels);
                }
            }
        }
        if factory::open_root(&target.prefix_until(0)).is_some() {
            return Ok(1);
        }
        Err(Error::InvalidHierarchy(format!(
            "no filesystem prefix of '{}' is openable",
            target.display()
        )))
    }
}

impl Default for ArchiveStackCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArchiveStackCursor {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_ustar();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> String {
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(data).unwrap();
        path.display().to_string()
    }

    fn read_top(cursor: &mut ArchiveStackCursor) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = cursor.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn descend_next_read_ascend_cycle() {
        let dir = TempDir::new().unwrap();
        let inner = tar_bytes(&[("leaf.txt", b"innermost")]);
        let outer = tar_bytes(&[("inner.tar", &inner), ("plain.txt", b"shallow")]);
        let root = write_file(&dir, "outer.tar", &outer);

        let mut cursor = ArchiveStackCursor::new();
        cursor.open_base(PathHierarchy::single(&root)).unwrap();
        cursor.descend().unwrap();

        let first = cursor.next().unwrap().unwrap();
        assert_eq!(first.name, "inner.tar");
        assert_eq!(
            cursor.current_entry_hierarchy().unwrap(),
            PathHierarchy::single(&root).append_single("inner.tar")
        );

        // Into the nested archive.
        cursor.descend().unwrap();
        let leaf = cursor.next().unwrap().unwrap();
        assert_eq!(leaf.name, "leaf.txt");
        assert_eq!(read_top(&mut cursor), b"innermost");
        assert!(cursor.next().unwrap().is_none());

        // Back out; the outer archive continues where it left off.
        cursor.ascend().unwrap();
        let second = cursor.next().unwrap().unwrap();
        assert_eq!(second.name, "plain.txt");
        assert_eq!(read_top(&mut cursor), b"shallow");
        assert!(cursor.next().unwrap().is_none());
        cursor.ascend().unwrap();
        assert!(!cursor.is_descended());
    }

    #[test]
    fn descend_after_reading_entry_restarts_bytes() {
        let dir = TempDir::new().unwrap();
        let inner = tar_bytes(&[("x", b"payload")]);
        let outer = tar_bytes(&[("inner.tar", &inner)]);
        let root = write_file(&dir, "o.tar", &outer);

        let mut cursor = ArchiveStackCursor::new();
        cursor.open_base(PathHierarchy::single(&root)).unwrap();
        cursor.descend().unwrap();
        cursor.next().unwrap().unwrap();

        // Consume part of the entry before descending.
        let mut buf = [0u8; 100];
        let n = cursor.read(&mut buf).unwrap();
        assert!(n > 0);

        // The new decoder still sees the inner archive from offset 0.
        cursor.descend().unwrap();
        let leaf = cursor.next().unwrap().unwrap();
        assert_eq!(leaf.name, "x");
        assert_eq!(read_top(&mut cursor), b"payload");
    }

    #[test]
    fn probe_failure_leaves_cursor_usable() {
        let dir = TempDir::new().unwrap();
        let outer = tar_bytes(&[("note.txt", b"not an archive"), ("after", b"ok")]);
        let root = write_file(&dir, "o.tar", &outer);

        let mut cursor = ArchiveStackCursor::new();
        cursor.open_base(PathHierarchy::single(&root)).unwrap();
        cursor.descend().unwrap();
        cursor.next().unwrap().unwrap();

        assert!(cursor.descend().is_err());

        // The failed probe is swallowed by the caller; iteration continues.
        let next = cursor.next().unwrap().unwrap();
        assert_eq!(next.name, "after");
    }

    #[test]
    fn synchronize_rebuilds_nested_chain() {
        let dir = TempDir::new().unwrap();
        let inner = tar_bytes(&[("data.bin", &[0u8, 1, 2])]);
        let outer = tar_bytes(&[("inner.tar", &inner)]);
        let root = write_file(&dir, "outer.tar", &outer);

        let target = PathHierarchy::single(&root)
            .append_single("inner.tar")
            .append_single("data.bin");

        let mut cursor = ArchiveStackCursor::new();
        cursor.synchronize_to_hierarchy(&target).unwrap();
        assert_eq!(read_top(&mut cursor), &[0u8, 1, 2]);
    }

    #[test]
    fn synchronize_to_plain_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "plain.bin", b"file bytes");
        let mut cursor = ArchiveStackCursor::new();
        cursor
            .synchronize_to_hierarchy(&PathHierarchy::single(&path))
            .unwrap();
        assert_eq!(read_top(&mut cursor), b"file bytes");
        assert!(!cursor.is_descended());
    }
}
