//! The traverser: depth-first scheduling over roots, archives, and
//! directory trees.
//!
//! A [`Traverser`] owns an ordered list of root hierarchies and an options
//! snapshot; iterating it yields every discovered [`Entry`] exactly once,
//! lazily:
//!
//! - roots are processed in the order given;
//! - a directory root is walked depth-first, directories before their
//!   contents, children in filesystem enumeration order (not resorted);
//! - a file-kind entry with its descent flag set is probed as an archive
//!   *after* it was yielded; success descends on the next advance, failure
//!   is swallowed and the file stays a leaf;
//! - multi-volume groups registered through
//!   [`Entry::set_multi_volume_group`] are deferred until their enclosing
//!   archive (or directory walk) is exhausted, then appended to the root
//!   queue as synthesized roots.
//!
//! Recoverable data errors surface through the fault channel and never end
//! the iteration; only directory-walk failures are yielded as fatal
//! `Err` items.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use crate::cursor::ArchiveStackCursor;
use crate::fault::{self, EntryFault};
use crate::hierarchy::{PartOrdering, PathEntry, PathHierarchy};
use crate::metadata::{EntryKind, MetadataMap, MetadataValue};
use crate::stream::file::{collect_file_metadata, os_path_of};
use crate::{Error, Result};

mod entry;
mod options;

pub use entry::{DetachedEntry, Entry};
pub(crate) use entry::EntryState;
pub use options::TraverserOptions;

/// Lazy traversal over nested archives and filesystem trees.
///
/// Construct with root hierarchies (or plain paths) and options, then
/// iterate. The traverser is single-threaded: it must stay on the thread
/// that iterates it, though independent traversers run in parallel freely.
///
/// # Example
///
/// ```rust,no_run
/// use arcwalk::{Traverser, TraverserOptions};
///
/// # fn main() -> arcwalk::Result<()> {
/// let traverser = Traverser::from_paths(["backup.tar.gz"], TraverserOptions::default())?;
/// for entry in traverser {
///     let entry = entry?;
///     println!("{} ({} bytes)", entry.path_hierarchy().display(), entry.size());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Traverser {
    roots: Vec<PathHierarchy>,
    options: TraverserOptions,
}

impl Traverser {
    /// Creates a traverser over explicit root hierarchies.
    ///
    /// Each root must be a one-step hierarchy whose step is `Single` (a
    /// path) or `MultiVolume` (a group of volume files).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOptions`] for an empty root list or invalid options;
    /// [`Error::InvalidHierarchy`] for malformed roots.
    pub fn new(roots: Vec<PathHierarchy>, options: TraverserOptions) -> Result<Self> {
        if roots.is_empty() {
            return Err(Error::InvalidOptions(
                "at least one root is required".into(),
            ));
        }
        for root in &roots {
            if root.len() != 1 {
                return Err(Error::InvalidHierarchy(format!(
                    "root '{}' must be a single step",
                    root.display()
                )));
            }
            if matches!(root.root(), Some(PathEntry::Nested(_)) | None) {
                return Err(Error::InvalidHierarchy(
                    "a root step must be Single or MultiVolume".into(),
                ));
            }
        }
        options.validate()?;
        Ok(Traverser { roots, options })
    }

    /// Creates a traverser over plain filesystem paths.
    pub fn from_paths<I, S>(paths: I, options: TraverserOptions) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roots = paths
            .into_iter()
            .map(|p| PathHierarchy::single(p.as_ref()))
            .collect();
        Self::new(roots, options)
    }

    /// The options snapshot this traverser runs with.
    pub fn options(&self) -> &TraverserOptions {
        &self.options
    }
}

impl IntoIterator for Traverser {
    type Item = Result<Entry>;
    type IntoIter = TraverseIter;

    fn into_iter(self) -> TraverseIter {
        TraverseIter::new(self.roots, self.options)
    }
}

enum RootTask {
    /// A root supplied by the caller.
    Supplied(PathHierarchy),
    /// A root synthesized from a registered multi-volume group.
    Group(PathHierarchy),
}

struct GroupBuild {
    base: String,
    parent: PathHierarchy,
    parts: Vec<String>,
    ordering: PartOrdering,
}

struct WalkState {
    root: PathHierarchy,
    os_root: PathBuf,
    iter: walkdir::IntoIter,
}

/// Iterator over a traverser's entries.
pub struct TraverseIter {
    options: TraverserOptions,
    queue: VecDeque<RootTask>,
    cursor: Rc<RefCell<ArchiveStackCursor>>,
    walk: Option<WalkState>,
    live: Option<Rc<RefCell<EntryState>>>,
    pending_groups: Vec<GroupBuild>,
    /// Descent depth at which the current root's base chain sits; returning
    /// to it means the root is exhausted.
    base_depth: usize,
    done: bool,
}

impl TraverseIter {
    fn new(roots: Vec<PathHierarchy>, options: TraverserOptions) -> Self {
        let mut cursor = ArchiveStackCursor::new();
        cursor.configure(options.decoder_options());
        TraverseIter {
            options,
            queue: roots.into_iter().map(RootTask::Supplied).collect(),
            cursor: Rc::new(RefCell::new(cursor)),
            walk: None,
            live: None,
            pending_groups: Vec::new(),
            base_depth: 0,
            done: false,
        }
    }

    fn make_entry(
        &mut self,
        hierarchy: PathHierarchy,
        kind: EntryKind,
        size: u64,
        metadata: MetadataMap,
        cursor_managed: bool,
    ) -> Entry {
        let state = Rc::new(RefCell::new(EntryState {
            hierarchy,
            kind,
            size,
            metadata,
            descent: self.options.descend_archives_default(),
            cursor_managed,
            group: None,
            stale: false,
        }));
        self.live = Some(Rc::clone(&state));
        Entry::new(state, Rc::clone(&self.cursor), self.options.decoder_options())
    }

    /// Invalidates the previous entry and applies its deferred actions:
    /// group registration, or the descent probe.
    fn finalize_live(&mut self) {
        let Some(state_rc) = self.live.take() else {
            return;
        };
        let (hierarchy, cursor_managed, wants_descent, group) = {
            let mut state = state_rc.borrow_mut();
            state.stale = true;
            (
                state.hierarchy.clone(),
                state.cursor_managed,
                state.descent && state.kind.is_file(),
                state.group.clone(),
            )
        };

        if let Some((base, ordering)) = group {
            self.register_group_part(base, ordering, &hierarchy);
            return;
        }

        let mut cursor = self.cursor.borrow_mut();
        if !wants_descent {
            if !cursor_managed && !cursor.is_descended() {
                // Reads on the entry may have opened a base stream.
                cursor.reset();
            }
            return;
        }

        let probe = (|| -> Result<()> {
            if !cursor_managed && cursor.top_stream().is_none() {
                cursor.open_base(hierarchy.clone())?;
            }
            cursor.descend()
        })();
        if let Err(e) = probe {
            log::debug!("'{}' is not an archive: {e}", hierarchy.display());
            if !cursor_managed && !cursor.is_descended() {
                cursor.reset();
            }
        }
    }

    fn register_group_part(
        &mut self,
        base: String,
        ordering: PartOrdering,
        hierarchy: &PathHierarchy,
    ) {
        let Some(name) = hierarchy.last().and_then(|e| e.as_single()) else {
            log::warn!(
                "ignoring group registration on non-single entry '{}'",
                hierarchy.display()
            );
            return;
        };
        let parent = hierarchy.parent();
        if let Some(build) = self
            .pending_groups
            .iter_mut()
            .find(|g| g.base == base && g.parent == parent)
        {
            if !build.parts.iter().any(|p| p == name) {
                build.parts.push(name.to_string());
            }
            return;
        }
        self.pending_groups.push(GroupBuild {
            base,
            parent,
            parts: vec![name.to_string()],
            ordering,
        });
    }

    /// Moves groups whose parent matches `predicate` onto the root queue.
    fn flush_groups(&mut self, predicate: impl Fn(&PathHierarchy) -> bool) {
        let mut index = 0;
        while index < self.pending_groups.len() {
            if predicate(&self.pending_groups[index].parent) {
                let build = self.pending_groups.remove(index);
                let root = build
                    .parent
                    .append(PathEntry::multi_volume(build.parts, build.ordering));
                log::debug!("scheduling multi-volume group root '{}'", root.display());
                self.queue.push_back(RootTask::Group(root));
            } else {
                index += 1;
            }
        }
    }

    /// One archive-iteration step; `None` means this level is exhausted
    /// (or failed) and has been ascended out of.
    fn step_archive(&mut self) -> Option<Entry> {
        let step = self.cursor.borrow_mut().next();
        match step {
            Ok(Some(header)) => {
                let hierarchy = self
                    .cursor
                    .borrow()
                    .current_entry_hierarchy()
                    .unwrap_or_default();
                Some(self.make_entry(hierarchy, header.kind, header.size, header.metadata, true))
            }
            Ok(None) | Err(_) => {
                // On Err the archive wrapper has already raised the fault;
                // either way this level is done.
                let source = self
                    .cursor
                    .borrow()
                    .current_archive()
                    .map(|a| a.borrow().source_hierarchy());
                {
                    let mut cursor = self.cursor.borrow_mut();
                    if cursor.ascend().is_err() {
                        cursor.reset();
                    }
                }
                if let Some(source) = source {
                    self.flush_groups(|parent| *parent == source);
                }
                let mut cursor = self.cursor.borrow_mut();
                if cursor.descent_depth() <= self.base_depth {
                    cursor.reset();
                    self.base_depth = 0;
                }
                None
            }
        }
    }

    /// One directory-walk step; `Ok(None)` means the walk finished.
    fn step_walk(&mut self) -> Result<Option<Entry>> {
        loop {
            let Some(walk) = self.walk.as_mut() else {
                return Ok(None);
            };
            let (hierarchy, path) = match walk.iter.next() {
                None => {
                    let root = walk.root.clone();
                    self.walk = None;
                    self.flush_groups(|parent| parent.starts_with(&root));
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.walk = None;
                    self.done = true;
                    return Err(Error::Walk(e));
                }
                Some(Ok(dirent)) => {
                    let mut hierarchy = walk.root.clone();
                    if let Ok(rel) = dirent.path().strip_prefix(&walk.os_root) {
                        for component in rel.components() {
                            hierarchy =
                                hierarchy.append_single(component.as_os_str().to_string_lossy());
                        }
                    }
                    (hierarchy, dirent.path().to_path_buf())
                }
            };
            match collect_file_metadata(&path, self.options.metadata_key_set()) {
                Ok(facts) => {
                    return Ok(Some(self.make_entry(
                        hierarchy,
                        facts.kind,
                        facts.size,
                        facts.metadata,
                        false,
                    )));
                }
                Err(e) => {
                    // Unstattable node: fault and keep walking.
                    fault::emit(EntryFault::new(
                        hierarchy,
                        format!("Failed to open root file {}: {}", path.display(), e),
                        e.raw_os_error(),
                    ));
                }
            }
        }
    }

    /// Starts the next root task; `Ok(None)` when the queue is drained.
    fn start_next_root(&mut self) -> Option<Entry> {
        self.cursor.borrow_mut().reset();
        self.base_depth = 0;

        let Some(task) = self.queue.pop_front() else {
            if !self.pending_groups.is_empty() {
                // Catch-all for groups registered across sibling roots.
                self.flush_groups(|_| true);
                return None;
            }
            self.done = true;
            return None;
        };

        match task {
            RootTask::Supplied(root) => self.start_supplied_root(root),
            RootTask::Group(root) => self.start_group_root(root),
        }
    }

    fn start_supplied_root(&mut self, root: PathHierarchy) -> Option<Entry> {
        if let Some(PathEntry::MultiVolume { parts, .. }) = root.root() {
            // A user-supplied volume group: a file-kind root whose stream
            // concatenates the parts.
            let mut size = 0u64;
            for part in parts {
                match std::fs::metadata(part) {
                    Ok(meta) => size += meta.len(),
                    Err(e) => {
                        fault::emit(EntryFault::new(
                            root.clone(),
                            format!("Failed to open root file {part}: {e}"),
                            e.raw_os_error(),
                        ));
                        return None;
                    }
                }
            }
            let metadata = self.synthetic_metadata(&root, size);
            return Some(self.make_entry(root, EntryKind::File, size, metadata, false));
        }

        // A registered factory takes precedence over the filesystem for
        // single-step roots; the probe stream is discarded and re-created
        // by the cursor when the entry is read or descended.
        if crate::factory::open_root(&root).is_some() {
            let metadata = self.synthetic_metadata(&root, 0);
            return Some(self.make_entry(root, EntryKind::File, 0, metadata, false));
        }

        let path = match os_path_of(&root) {
            Ok(path) => path,
            Err(e) => {
                fault::emit_error(&root, &e);
                return None;
            }
        };
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {
                self.walk = Some(WalkState {
                    root,
                    os_root: path.clone(),
                    iter: walkdir::WalkDir::new(path).follow_links(false).into_iter(),
                });
                None
            }
            Ok(_) => match collect_file_metadata(&path, self.options.metadata_key_set()) {
                Ok(facts) => {
                    Some(self.make_entry(root, facts.kind, facts.size, facts.metadata, false))
                }
                Err(e) => {
                    fault::emit(EntryFault::new(
                        root,
                        format!("Failed to open root file {}: {}", path.display(), e),
                        e.raw_os_error(),
                    ));
                    None
                }
            },
            Err(e) => {
                fault::emit(EntryFault::new(
                    root,
                    format!("Failed to open root file {}: {}", path.display(), e),
                    e.raw_os_error(),
                ));
                None
            }
        }
    }

    fn start_group_root(&mut self, root: PathHierarchy) -> Option<Entry> {
        {
            let mut cursor = self.cursor.borrow_mut();
            if let Err(e) = cursor.synchronize_to_hierarchy(&root) {
                cursor.reset();
                drop(cursor);
                fault::emit_error(&root, &e);
                return None;
            }
            self.base_depth = cursor.descent_depth();
        }
        let metadata = self.synthetic_metadata(&root, 0);
        Some(self.make_entry(root, EntryKind::File, 0, metadata, true))
    }

    /// Minimal metadata for roots without a filesystem node to stat
    /// (volume groups, factory-served streams).
    fn synthetic_metadata(&self, root: &PathHierarchy, size: u64) -> MetadataMap {
        let keys = self.options.metadata_key_set();
        let mut metadata = MetadataMap::new();
        if keys.contains("pathname") {
            metadata.insert("pathname".into(), MetadataValue::Str(root.display()));
        }
        if keys.contains("filetype") {
            metadata.insert("filetype".into(), MetadataValue::Str("file".into()));
        }
        if keys.contains("size") {
            metadata.insert("size".into(), MetadataValue::UInt(size));
        }
        metadata
    }

    fn advance(&mut self) -> Option<Result<Entry>> {
        if self.done {
            return None;
        }
        self.finalize_live();

        loop {
            let inside_archive = {
                let cursor = self.cursor.borrow();
                cursor.descent_depth() > self.base_depth
            };
            if inside_archive {
                if let Some(entry) = self.step_archive() {
                    return Some(Ok(entry));
                }
                continue;
            }
            if self.walk.is_some() {
                match self.step_walk() {
                    Ok(Some(entry)) => return Some(Ok(entry)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                }
            }
            if self.done {
                return None;
            }
            if let Some(entry) = self.start_next_root() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
        }
    }
}

impl Iterator for TraverseIter {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}
