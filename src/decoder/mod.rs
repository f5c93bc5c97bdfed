//! Decoder contract and format probing.
//!
//! A [`Decoder`] turns a byte stream into a sequence of entry headers with
//! per-entry payload reads. Decoders are pull-based: they consume their
//! input through a [`StreamReader`](crate::stream::StreamReader) adapter,
//! and every engine error reaching them is already folded into the
//! `std::io` contract, so no panic or foreign error crosses the seam.
//!
//! [`open_decoder`] is the probe: it rewinds the stream, peels transparent
//! compression filters (gzip, bzip2), sniffs the container format by magic
//! bytes, and constructs the matching decoder configured with the caller's
//! passphrase list and format allowlist. Probe failure means "not an
//! archive" and is how plain files end up as leaves.

use std::collections::BTreeSet;
use std::io::Read;

use crate::metadata::{EntryKind, MetadataMap};
use crate::stream::{SharedStream, StreamReader};
use crate::{Error, Result};

pub mod detect;
mod empty;
mod tar;
mod zip;

pub use detect::{ContainerFormat, FilterKind, KNOWN_FORMATS, is_known_format};

/// How many filter layers the probe will peel before giving up.
const MAX_FILTER_DEPTH: usize = 3;

/// Bytes sniffed per probe round.
const PROBE_LEN: usize = 1024;

/// Options snapshot handed to decoders at open time.
#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    /// Candidate passphrases, tried in order against encrypted entries.
    pub passphrases: Vec<String>,
    /// Format allowlist; empty means every supported format.
    pub formats: Vec<String>,
    /// Metadata keys to capture from entry headers.
    pub metadata_keys: BTreeSet<String>,
}

impl DecoderOptions {
    /// True if the allowlist permits `format`.
    pub fn format_allowed(&self, format: &str) -> bool {
        self.formats.is_empty() || self.formats.iter().any(|f| f == format)
    }
}

/// Header of the entry a decoder is positioned on.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    /// Entry name as stored in the archive.
    pub name: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Uncompressed size in bytes; 0 when the format does not store it.
    pub size: u64,
    /// Metadata captured from the header, limited to the configured keys.
    pub metadata: MetadataMap,
}

/// Sequential archive decoder.
///
/// The cycle is `next_entry` → (`read_data`* | `skip_data`) → `next_entry`;
/// implementations discard any unread payload of the previous entry when
/// advancing, so the header cursor always lands on a record boundary.
pub trait Decoder {
    /// Name of the decoded format (`"tar"`, `"zip"`, `"empty"`).
    fn format_name(&self) -> &'static str;

    /// Advances to the next entry header; `None` at end of archive.
    fn next_entry(&mut self) -> Result<Option<EntryHeader>>;

    /// Reads decompressed payload bytes of the current entry; `Ok(0)` at
    /// the end of the entry.
    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Discards the remainder of the current entry's payload.
    fn skip_data(&mut self) -> Result<()>;
}

/// Builds the filter-peeled reader chain over a freshly rewound stream.
fn build_reader(stream: &SharedStream, filters: &[FilterKind]) -> Box<dyn Read> {
    let mut reader: Box<dyn Read> = Box::new(StreamReader::new(stream.clone()));
    for f in filters {
        reader = f.wrap(reader);
    }
    reader
}

/// Reads up to `buf.len()` bytes, tolerating short reads.
fn read_prefix(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

/// Probes a stream and constructs the matching decoder.
///
/// The stream is rewound first and is left positioned wherever the probe
/// reads ended; the returned decoder owns a fresh reader chain starting at
/// offset 0. Filters are peeled at most [`MAX_FILTER_DEPTH`] deep.
///
/// # Errors
///
/// [`Error::InvalidFormat`] when no supported (and allowlisted) container
/// is recognized; stream errors propagate as-is.
pub fn open_decoder(stream: &SharedStream, options: &DecoderOptions) -> Result<Box<dyn Decoder>> {
    let mut filters: Vec<FilterKind> = Vec::new();

    loop {
        stream.borrow_mut().rewind()?;
        let mut reader = build_reader(stream, &filters);
        let mut prefix = vec![0u8; PROBE_LEN];
        let n = read_prefix(reader.as_mut(), &mut prefix)?;
        prefix.truncate(n);

        if prefix.is_empty() && filters.is_empty() {
            // Zero-byte input: the "empty" format, when permitted.
            if options.format_allowed(detect::FORMAT_EMPTY) {
                return Ok(Box::new(empty::EmptyDecoder::new()));
            }
            return Err(Error::InvalidFormat("empty input not allowed".into()));
        }

        if let Some(container) = detect::sniff_container(&prefix) {
            if !options.format_allowed(container.name()) {
                return Err(Error::InvalidFormat(format!(
                    "{} format excluded by allowlist",
                    container.name()
                )));
            }
            stream.borrow_mut().rewind()?;
            let reader = build_reader(stream, &filters);
            return construct(container, reader, options);
        }

        if filters.len() < MAX_FILTER_DEPTH {
            if let Some(filter) = detect::sniff_filter(&prefix) {
                log::debug!("peeling {filter:?} filter during probe");
                filters.push(filter);
                continue;
            }
        }

        return Err(Error::InvalidFormat(
            "no supported archive format recognized".into(),
        ));
    }
}

fn construct(
    container: ContainerFormat,
    reader: Box<dyn Read>,
    options: &DecoderOptions,
) -> Result<Box<dyn Decoder>> {
    match container {
        ContainerFormat::Tar => Ok(Box::new(tar::TarDecoder::new(
            reader,
            options.metadata_keys.clone(),
        ))),
        ContainerFormat::Zip => Ok(Box::new(zip::ZipStreamDecoder::new(
            reader,
            options.passphrases.clone(),
            options.metadata_keys.clone(),
        ))),
        ContainerFormat::Empty => Ok(Box::new(empty::EmptyDecoder::new())),
    }
}
