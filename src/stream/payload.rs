//! Entry payload streams.
//!
//! A [`PayloadStream`] exposes the bytes of one entry (or a multi-volume
//! group of entries) of a *parent* archive as a [`DataStream`]. Opening a
//! part skips the parent to the named entry; closing it drains whatever
//! payload is left so the parent's header cursor lands on the next record
//! boundary.
//!
//! The stream holds a strong reference to its parent archive. The edge is
//! acyclic: when the cursor ascends past this level the stream is dropped
//! and the parent reference released with it.
//!
//! Rewinding re-skips the parent to the first part. That is what makes
//! decoder probing (format autodetection, passphrase candidates) and
//! detached re-reads work on nested entries: the parent archive restarts
//! itself from its own stream as needed to present the entry again from
//! offset 0.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cursor::StreamArchive;
use crate::fault;
use crate::hierarchy::PathHierarchy;
use crate::stream::multivolume::{MultiVolume, PartIo};
use crate::{Error, Result};

/// A data stream over entries of a parent archive.
pub type PayloadStream = MultiVolume<PayloadPartIo>;

/// Opens a payload stream over `parent` for `logical_path`.
///
/// The final step of `logical_path` names the entry (or the multi-volume
/// group of entries) inside the parent archive. The parent is not touched
/// until the first read.
pub fn payload_stream(
    parent: Rc<RefCell<StreamArchive>>,
    logical_path: PathHierarchy,
) -> Result<PayloadStream> {
    MultiVolume::new(logical_path, PayloadPartIo { parent })
}

/// [`PartIo`] implementation delegating to a parent [`StreamArchive`].
pub struct PayloadPartIo {
    parent: Rc<RefCell<StreamArchive>>,
}

impl PartIo for PayloadPartIo {
    /// The name of the entry the parent is positioned on.
    type Part = String;

    fn open_part(&mut self, path: &PathHierarchy) -> Result<String> {
        let name = path
            .last()
            .and_then(|e| e.as_single())
            .ok_or_else(|| {
                Error::InvalidHierarchy("payload part must be a single entry name".into())
            })?
            .to_string();
        match self.parent.borrow_mut().skip_to_entry(&name) {
            Ok(()) => Ok(name),
            Err(e) => {
                // Deeper failures (stream I/O, decoder) already faulted; a
                // missing entry is this level's own fault to report.
                if matches!(e, Error::EntryNotFound { .. }) {
                    fault::emit_error(path, &e);
                }
                Err(e)
            }
        }
    }

    fn close_part(&mut self, part: String) {
        let mut parent = self.parent.borrow_mut();
        if parent.current_name() == Some(part.as_str()) {
            if let Err(e) = parent.skip_data() {
                log::debug!("failed to drain payload of '{part}' on close: {e}");
            }
        }
    }

    fn read_part(&mut self, _part: &mut String, buf: &mut [u8]) -> Result<usize> {
        self.parent.borrow_mut().read_current(buf)
    }

    fn parent_archive(&self) -> Option<Rc<RefCell<StreamArchive>>> {
        Some(Rc::clone(&self.parent))
    }
}
