//! Data stream abstractions feeding the decoder layer.
//!
//! Every byte source the engine reads from — a filesystem file, a group of
//! split volumes, the payload of an archive entry — implements the
//! [`DataStream`] contract: forward reads, a mandatory [`rewind`], and
//! optional seek/tell advertised through [`can_seek`].
//!
//! Rewind is mandatory because decoders restart their input while probing:
//! format detection reads a prefix and rewinds, and passphrase candidates
//! are tried one after another against the same bytes.
//!
//! Streams are shared between the cursor stack and the decoders reading
//! from them, so they live behind [`SharedStream`] (`Rc<RefCell<..>>`; a
//! traverser is single-threaded by contract). [`StreamReader`] bridges a
//! shared stream into `std::io`, translating every engine error into an
//! `io::Error` so nothing unwinds across the decoder seam.
//!
//! [`rewind`]: DataStream::rewind
//! [`can_seek`]: DataStream::can_seek

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

use crate::Result;
use crate::cursor::StreamArchive;
use crate::hierarchy::PathHierarchy;

pub mod file;
pub mod multivolume;
pub mod payload;

pub use file::{FilePartIo, FileStream, collect_file_metadata, file_stream};
pub use multivolume::{MultiVolume, PartIo};
pub use payload::{PayloadPartIo, PayloadStream, payload_stream};

/// Abstract byte source with mandatory rewind and optional seek.
pub trait DataStream {
    /// Reads up to `buf.len()` bytes. `Ok(0)` signals end of stream.
    ///
    /// Implementations raise a fault before returning an error, so callers
    /// only have to decide whether to continue.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Returns the stream to the very beginning.
    ///
    /// Must succeed for every stream used as archive input.
    fn rewind(&mut self) -> Result<()>;

    /// Seeks to a logical offset. Only available when [`can_seek`](Self::can_seek)
    /// reports `true`; the default declines without modifying state.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let _ = pos;
        Err(crate::Error::SeekUnsupported)
    }

    /// Reports the current logical offset, when seek is supported.
    fn tell(&self) -> Result<u64> {
        Err(crate::Error::SeekUnsupported)
    }

    /// True if [`seek`](Self::seek) and [`tell`](Self::tell) are usable.
    fn can_seek(&self) -> bool {
        false
    }

    /// True once a read has returned 0.
    fn at_end(&self) -> bool;

    /// Identifies this stream for diagnostics and factory matching.
    fn source_hierarchy(&self) -> &PathHierarchy;

    /// The decoder this stream reads entry payload from, if any.
    ///
    /// Only entry payload streams return `Some`; the cursor uses this to
    /// restore the previous level when ascending.
    fn parent_archive(&self) -> Option<Rc<RefCell<StreamArchive>>> {
        None
    }
}

/// A stream shared between the cursor stack and the decoder reading it.
pub type SharedStream = Rc<RefCell<Box<dyn DataStream>>>;

/// Wraps a boxed stream for shared ownership.
pub fn share(stream: Box<dyn DataStream>) -> SharedStream {
    Rc::new(RefCell::new(stream))
}

/// `std::io` adapter over a [`SharedStream`].
///
/// Decoders pull bytes through this reader. Engine errors are converted to
/// `io::Error` (preserving the original as the source) so the foreign
/// decoder code only ever sees the numeric `io` contract.
pub struct StreamReader {
    stream: SharedStream,
}

impl StreamReader {
    /// Creates a reader over a shared stream.
    pub fn new(stream: SharedStream) -> Self {
        StreamReader { stream }
    }

    /// True if the underlying stream supports seeking.
    pub fn can_seek(&self) -> bool {
        self.stream.borrow().can_seek()
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream
            .borrow_mut()
            .read(buf)
            .map_err(|e| match e {
                crate::Error::Io(io) => io,
                other => io::Error::other(other),
            })
    }
}

impl Seek for StreamReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut stream = self.stream.borrow_mut();
        if !stream.can_seek() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream does not support seeking",
            ));
        }
        stream.seek(pos).map_err(|e| match e {
            crate::Error::Io(io) => io,
            other => io::Error::other(other),
        })
    }
}
