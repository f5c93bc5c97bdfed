//! Multi-volume stream base.
//!
//! [`MultiVolume`] presents an ordered list of single-part streams as one
//! logical byte stream: offsets span all parts concatenated in part order,
//! reads continue transparently across part boundaries, and — when every
//! part supports it — seeks cross boundaries by opening the right part.
//!
//! The physical access is delegated to a [`PartIo`] implementation; the two
//! in this crate are [`FilePartIo`](super::FilePartIo) for filesystem files
//! and [`PayloadPartIo`](super::PayloadPartIo) for entries of a parent
//! archive. A logical path whose final element is `Single` has exactly one
//! part.

use std::cell::RefCell;
use std::io::{self, SeekFrom};
use std::rc::Rc;

use crate::cursor::StreamArchive;
use crate::hierarchy::PathHierarchy;
use crate::stream::DataStream;
use crate::{Error, Result};

/// Physical access hooks for one part of a multi-volume stream.
///
/// `open_part` receives the part's full hierarchy (the logical path with
/// the multi-volume step narrowed to a single part). Implementations raise
/// their own faults on failure; [`MultiVolume`] passes errors through
/// untouched.
pub trait PartIo {
    /// Handle to an open part.
    type Part;

    /// Opens the part identified by `path`, positioned at its beginning.
    fn open_part(&mut self, path: &PathHierarchy) -> Result<Self::Part>;

    /// Releases an open part.
    fn close_part(&mut self, part: Self::Part);

    /// Reads from an open part. `Ok(0)` means the part is exhausted.
    fn read_part(&mut self, part: &mut Self::Part, buf: &mut [u8]) -> Result<usize>;

    /// Seeks within an open part to `offset` from its start.
    fn seek_part(&mut self, part: &mut Self::Part, offset: u64) -> Result<()> {
        let _ = (part, offset);
        Err(Error::SeekUnsupported)
    }

    /// Size of the part identified by `path`, without opening it.
    fn part_size(&mut self, path: &PathHierarchy) -> Result<u64> {
        let _ = path;
        Err(Error::SeekUnsupported)
    }

    /// True if every part supports [`seek_part`](Self::seek_part)/[`part_size`](Self::part_size).
    fn can_seek(&self) -> bool {
        false
    }

    /// See [`DataStream::parent_archive`].
    fn parent_archive(&self) -> Option<Rc<RefCell<StreamArchive>>> {
        None
    }
}

struct ActivePart<T> {
    index: usize,
    part: T,
    /// Bytes consumed from this part (equals its in-part offset).
    pos: u64,
}

/// Common logic concatenating an ordered list of single-part streams.
pub struct MultiVolume<P: PartIo> {
    logical_path: PathHierarchy,
    io: P,
    active: Option<ActivePart<P::Part>>,
    /// Next part to open when none is active.
    next_index: usize,
    /// Per-part sizes, discovered lazily (reads fill them at part EOF,
    /// seeks query [`PartIo::part_size`]).
    part_sizes: Vec<Option<u64>>,
    position: u64,
    at_end: bool,
}

impl<P: PartIo> MultiVolume<P> {
    /// Creates a stream over `logical_path`, parts unopened.
    ///
    /// The first part is opened lazily by the first read; [`rewind`]
    /// re-opens it eagerly.
    ///
    /// # Errors
    ///
    /// Fails if the logical path is empty, ends in a `Nested` step, or has
    /// a multi-volume step with no parts.
    ///
    /// [`rewind`]: DataStream::rewind
    pub fn new(logical_path: PathHierarchy, io: P) -> Result<Self> {
        let last = logical_path
            .last()
            .ok_or_else(|| Error::InvalidHierarchy("stream path must not be empty".into()))?;
        let part_count = last.part_count();
        if part_count == 0 {
            return Err(Error::InvalidHierarchy(
                "multi-volume step has no parts".into(),
            ));
        }
        // select_single_part rejects Nested final steps; probe part 0 now
        // so construction fails instead of the first read.
        logical_path.select_single_part(0)?;

        Ok(MultiVolume {
            logical_path,
            io,
            active: None,
            next_index: 0,
            part_sizes: vec![None; part_count],
            position: 0,
            at_end: false,
        })
    }

    /// The logical path this stream concatenates.
    pub fn logical_path(&self) -> &PathHierarchy {
        &self.logical_path
    }

    /// Access to the part IO hooks.
    pub fn io(&self) -> &P {
        &self.io
    }

    fn part_count(&self) -> usize {
        self.part_sizes.len()
    }

    fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            self.io.close_part(active.part);
        }
    }

    fn open_index(&mut self, index: usize) -> Result<()> {
        let path = self.logical_path.select_single_part(index)?;
        let part = self.io.open_part(&path)?;
        self.active = Some(ActivePart {
            index,
            part,
            pos: 0,
        });
        self.next_index = index + 1;
        Ok(())
    }

    /// Cached or queried size of part `index`.
    fn size_of(&mut self, index: usize) -> Result<u64> {
        if let Some(size) = self.part_sizes[index] {
            return Ok(size);
        }
        let path = self.logical_path.select_single_part(index)?;
        let size = self.io.part_size(&path)?;
        self.part_sizes[index] = Some(size);
        Ok(size)
    }

    fn total_size(&mut self) -> Result<u64> {
        let mut total = 0u64;
        for i in 0..self.part_count() {
            total += self.size_of(i)?;
        }
        Ok(total)
    }

    /// Locates the part containing logical offset `pos`.
    ///
    /// Returns `(part_index, offset_within_part)`; an offset at or past the
    /// end lands at the end of the last part.
    fn locate(&mut self, pos: u64) -> Result<(usize, u64)> {
        let count = self.part_count();
        let mut cumulative = Vec::with_capacity(count);
        let mut sum = 0u64;
        for i in 0..count {
            sum += self.size_of(i)?;
            cumulative.push(sum);
        }
        // First part whose cumulative end exceeds pos.
        let index = cumulative.partition_point(|&end| end <= pos);
        if index >= count {
            let last_size = self.part_sizes[count - 1].unwrap_or(0);
            return Ok((count - 1, last_size));
        }
        let before = if index == 0 { 0 } else { cumulative[index - 1] };
        Ok((index, pos - before))
    }

    fn read_impl(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.at_end {
            return Ok(0);
        }
        loop {
            if self.active.is_none() {
                if self.next_index >= self.part_count() {
                    self.at_end = true;
                    return Ok(0);
                }
                let index = self.next_index;
                self.open_index(index)?;
            }
            let active = self.active.as_mut().expect("part opened above");
            let n = self.io.read_part(&mut active.part, buf)?;
            if n > 0 {
                active.pos += n as u64;
                self.position += n as u64;
                return Ok(n);
            }
            // Part exhausted: its consumed length is its size.
            let index = active.index;
            let size = active.pos;
            self.part_sizes[index].get_or_insert(size);
            self.close_active();
            if self.next_index >= self.part_count() {
                self.at_end = true;
                return Ok(0);
            }
        }
    }

    fn rewind_impl(&mut self) -> Result<()> {
        self.close_active();
        self.position = 0;
        self.at_end = false;
        self.next_index = 0;
        self.open_index(0)
    }

    fn seek_impl(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.io.can_seek() {
            return Err(Error::SeekUnsupported);
        }
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.total_size()?) + i128::from(delta),
        };
        if target < 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot seek before start of stream",
            )));
        }
        let total = self.total_size()?;
        let target = (target as u64).min(total);

        let (index, within) = self.locate(target)?;
        let reuse = matches!(&self.active, Some(active) if active.index == index);
        if !reuse {
            self.close_active();
            self.open_index(index)?;
        }
        let active = self.active.as_mut().expect("part opened above");
        self.io.seek_part(&mut active.part, within)?;
        active.pos = within;
        self.position = target;
        self.at_end = target >= total;
        Ok(target)
    }
}

impl<P: PartIo> DataStream for MultiVolume<P> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_impl(buf)
    }

    fn rewind(&mut self) -> Result<()> {
        self.rewind_impl()
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.seek_impl(pos)
    }

    fn tell(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn can_seek(&self) -> bool {
        self.io.can_seek()
    }

    fn at_end(&self) -> bool {
        self.at_end
    }

    fn source_hierarchy(&self) -> &PathHierarchy {
        &self.logical_path
    }

    fn parent_archive(&self) -> Option<Rc<RefCell<StreamArchive>>> {
        self.io.parent_archive()
    }
}

impl<P: PartIo> Drop for MultiVolume<P> {
    fn drop(&mut self) {
        self.close_active();
    }
}
