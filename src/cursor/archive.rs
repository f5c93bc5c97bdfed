//! Decoder wrapper binding a decoder to its input stream.
//!
//! [`StreamArchive`] owns one decoder plus the shared stream it reads from,
//! and tracks the per-entry state the cursor and payload streams need:
//! which entry is current, whether its content has been touched, and
//! whether the level has finished.
//!
//! The wrapper is what makes nested restarts work. [`rewind`] reopens the
//! decoder over the rewound stream; [`skip_to_entry`] re-presents a named
//! entry even after it has been passed, by scanning forward and, failing
//! that, rewinding and scanning again. On a payload stream that rewind
//! recurses into the parent level, all the way down to the root file.
//!
//! [`rewind`]: StreamArchive::rewind
//! [`skip_to_entry`]: StreamArchive::skip_to_entry

use std::cell::RefCell;
use std::rc::Rc;

use crate::decoder::{self, Decoder, DecoderOptions, EntryHeader};
use crate::fault;
use crate::hierarchy::PathHierarchy;
use crate::stream::SharedStream;
use crate::{Error, Result};

/// A decoder bound to the shared stream it reads from, with per-entry
/// position state.
pub struct StreamArchive {
    stream: SharedStream,
    decoder: Box<dyn Decoder>,
    options: DecoderOptions,
    current: Option<EntryHeader>,
    /// Set on the first successful payload read of the current entry.
    content_ready: bool,
    /// Payload bytes of the current entry consumed so far.
    consumed: u64,
    /// `skip_data` ran for the current entry.
    data_skipped: bool,
    finished: bool,
}

impl StreamArchive {
    /// Probes `stream` and wraps the resulting decoder.
    ///
    /// Fails when the stream does not hold a supported (and allowlisted)
    /// archive format; the caller decides whether that is a fault or just
    /// "this entry is a leaf".
    pub fn open(stream: SharedStream, options: DecoderOptions) -> Result<Self> {
        let decoder = decoder::open_decoder(&stream, &options)?;
        log::debug!(
            "opened {} decoder over '{}'",
            decoder.format_name(),
            stream.borrow().source_hierarchy().display()
        );
        Ok(StreamArchive {
            stream,
            decoder,
            options,
            current: None,
            content_ready: false,
            consumed: 0,
            data_skipped: false,
            finished: false,
        })
    }

    /// Hierarchy of the underlying stream.
    pub fn source_hierarchy(&self) -> PathHierarchy {
        self.stream.borrow().source_hierarchy().clone()
    }

    /// Hierarchy of the current entry, when positioned on one.
    pub fn current_entry_hierarchy(&self) -> Option<PathHierarchy> {
        self.current
            .as_ref()
            .map(|h| self.source_hierarchy().append_single(&h.name))
    }

    /// Name of the current entry.
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_ref().map(|h| h.name.as_str())
    }

    /// Header of the current entry.
    pub fn current_header(&self) -> Option<&EntryHeader> {
        self.current.as_ref()
    }

    /// True once payload bytes of the current entry have been read.
    pub fn content_ready(&self) -> bool {
        self.content_ready
    }

    /// Format name of the wrapped decoder.
    pub fn format_name(&self) -> &'static str {
        self.decoder.format_name()
    }

    /// The decoder of the next-outer level, when this archive was opened
    /// over an entry payload stream.
    pub fn parent_archive(&self) -> Option<Rc<RefCell<StreamArchive>>> {
        self.stream.borrow().parent_archive()
    }

    fn reset_entry_state(&mut self) {
        self.content_ready = false;
        self.consumed = 0;
        self.data_skipped = false;
    }

    /// Advances to the next non-empty-named entry header.
    ///
    /// Returns `Ok(None)` at end of archive. A decoder error raises a fault
    /// bound to the stream's hierarchy and terminates this level.
    pub fn skip_to_next_header(&mut self) -> Result<Option<EntryHeader>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.decoder.next_entry() {
                Ok(Some(header)) if header.name.is_empty() => {
                    log::debug!(
                        "skipping empty-named record in '{}'",
                        self.source_hierarchy().display()
                    );
                    continue;
                }
                Ok(Some(header)) => {
                    self.current = Some(header.clone());
                    self.reset_entry_state();
                    return Ok(Some(header));
                }
                Ok(None) => {
                    self.current = None;
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => {
                    fault::emit_error(&self.source_hierarchy(), &e);
                    self.current = None;
                    self.finished = true;
                    return Err(e);
                }
            }
        }
    }

    /// Positions the archive on the entry named `name`, presenting its
    /// payload from offset 0.
    ///
    /// Fast path: already positioned there with nothing consumed. Otherwise
    /// the headers are scanned forward; if the entry is behind the cursor,
    /// the archive rewinds and scans once more.
    pub fn skip_to_entry(&mut self, name: &str) -> Result<()> {
        if let Some(current) = &self.current {
            if current.name == name
                && !self.content_ready
                && self.consumed == 0
                && !self.data_skipped
            {
                return Ok(());
            }
        }
        if self.scan_for(name)? {
            return Ok(());
        }
        self.rewind()?;
        if self.scan_for(name)? {
            return Ok(());
        }
        Err(Error::EntryNotFound { name: name.into() })
    }

    fn scan_for(&mut self, name: &str) -> Result<bool> {
        while let Some(header) = self.skip_to_next_header()? {
            if header.name == name {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reads decompressed payload bytes of the current entry.
    pub fn read_current(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.current.is_none() {
            return Ok(0);
        }
        match self.decoder.read_data(buf) {
            Ok(0) => Ok(0),
            Ok(n) => {
                self.content_ready = true;
                self.consumed += n as u64;
                Ok(n)
            }
            Err(e) => {
                let hierarchy = self
                    .current_entry_hierarchy()
                    .unwrap_or_else(|| self.source_hierarchy());
                fault::emit_error(&hierarchy, &e);
                Err(e)
            }
        }
    }

    /// Discards the remainder of the current entry's payload.
    pub fn skip_data(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Ok(());
        }
        self.data_skipped = true;
        self.decoder.skip_data()
    }

    /// Rewinds the underlying stream and reopens the decoder.
    pub fn rewind(&mut self) -> Result<()> {
        self.decoder = decoder::open_decoder(&self.stream, &self.options)?;
        self.current = None;
        self.finished = false;
        self.reset_entry_state();
        Ok(())
    }
}
