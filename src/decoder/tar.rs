//! Streaming tar decoder.
//!
//! Frames the archive manually — 512-byte header blocks, payload, padding —
//! and delegates header-field parsing to the `tar` crate's [`Header`] type.
//! Framing stays in our hands because the engine needs a pull-based decoder
//! that holds its position between calls, which the crate's borrowing
//! `Entries` iterator cannot provide over a shared stream.
//!
//! GNU long-name (`L`) and pax extended-header (`x`) records are consumed
//! inline and applied to the entry that follows, the same way `tar-rs`
//! resolves them.
//!
//! [`Header`]: tar::Header

use std::collections::BTreeSet;
use std::io::{self, Read};

use tar::Header;

use crate::decoder::{Decoder, EntryHeader};
use crate::metadata::{EntryKind, MetadataMap, MetadataValue};
use crate::{Error, Result};

const BLOCK_SIZE: u64 = 512;

/// Longest accepted long-name payload, matching common path-length caps.
const MAX_NAME_PAYLOAD: u64 = 32 * 1024;

pub struct TarDecoder {
    reader: Box<dyn Read>,
    metadata_keys: BTreeSet<String>,
    /// Payload bytes left in the current entry.
    remaining: u64,
    /// Padding after the current entry's payload.
    padding: u64,
    done: bool,
}

impl TarDecoder {
    pub fn new(reader: Box<dyn Read>, metadata_keys: BTreeSet<String>) -> Self {
        TarDecoder {
            reader,
            metadata_keys,
            remaining: 0,
            padding: 0,
            done: false,
        }
    }

    /// Discards exactly `n` bytes; a short count is a truncation error.
    fn drain(&mut self, n: u64) -> Result<()> {
        let copied = io::copy(&mut self.reader.by_ref().take(n), &mut io::sink())?;
        if copied != n {
            self.done = true;
            return Err(Error::InvalidFormat("truncated tar entry payload".into()));
        }
        Ok(())
    }

    /// Reads one 512-byte block; `None` on clean end of input.
    fn read_block(&mut self, block: &mut [u8; 512]) -> Result<Option<()>> {
        let mut filled = 0;
        while filled < block.len() {
            let n = self.reader.read(&mut block[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(Error::InvalidFormat("truncated tar header block".into()));
            }
            filled += n;
        }
        Ok(Some(()))
    }

    /// Reads a small payload (long-name or pax record data) plus padding.
    fn read_name_payload(&mut self, size: u64) -> Result<Vec<u8>> {
        if size > MAX_NAME_PAYLOAD {
            return Err(Error::InvalidFormat(format!(
                "tar name record of {size} bytes exceeds sanity limit"
            )));
        }
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        self.drain(padding_after(size))?;
        Ok(data)
    }

    fn capture_metadata(&self, header: &Header, name: &str, kind: EntryKind) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        let keys = &self.metadata_keys;
        let mut put = |key: &str, value: Option<MetadataValue>| {
            if keys.contains(key) {
                if let Some(v) = value {
                    metadata.insert(key.to_string(), v);
                }
            }
        };

        put("pathname", Some(MetadataValue::Str(name.to_string())));
        put(
            "filetype",
            Some(MetadataValue::Str(
                if kind.is_directory() { "directory" } else { "file" }.into(),
            )),
        );
        put("size", header.entry_size().ok().map(MetadataValue::UInt));
        put("mode", header.mode().ok().map(|m| MetadataValue::UInt(m.into())));
        put("uid", header.uid().ok().map(MetadataValue::UInt));
        put("gid", header.gid().ok().map(MetadataValue::UInt));
        put("mtime", header.mtime().ok().map(MetadataValue::UInt));
        put(
            "uname",
            header
                .username()
                .ok()
                .flatten()
                .map(|u| MetadataValue::Str(u.to_string())),
        );
        put(
            "gname",
            header
                .groupname()
                .ok()
                .flatten()
                .map(|g| MetadataValue::Str(g.to_string())),
        );
        let link = header
            .link_name()
            .ok()
            .flatten()
            .map(|l| l.display().to_string());
        match header.entry_type() {
            tar::EntryType::Symlink => put("symlink", link.map(MetadataValue::Str)),
            tar::EntryType::Link => put("hardlink", link.map(MetadataValue::Str)),
            _ => {}
        }
        put(
            "devmajor",
            header
                .device_major()
                .ok()
                .flatten()
                .map(|d| MetadataValue::UInt(d.into())),
        );
        put(
            "devminor",
            header
                .device_minor()
                .ok()
                .flatten()
                .map(|d| MetadataValue::UInt(d.into())),
        );
        metadata
    }
}

/// Padding bytes after a payload of `size` bytes.
fn padding_after(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

/// Extracts `path` (and `linkpath`) overrides from pax records.
///
/// Records are `"<len> <key>=<value>\n"` with `len` counting the whole
/// record. Unknown keys are skipped; malformed data ends the scan.
fn parse_pax_path(data: &[u8]) -> Option<String> {
    let mut rest = data;
    while !rest.is_empty() {
        let space = rest.iter().position(|&b| b == b' ')?;
        let len: usize = std::str::from_utf8(&rest[..space]).ok()?.parse().ok()?;
        if len == 0 || len > rest.len() {
            return None;
        }
        let record = &rest[space + 1..len];
        rest = &rest[len..];
        let record = record.strip_suffix(b"\n").unwrap_or(record);
        if let Some(eq) = record.iter().position(|&b| b == b'=') {
            if &record[..eq] == b"path" {
                return Some(String::from_utf8_lossy(&record[eq + 1..]).into_owned());
            }
        }
    }
    None
}

impl Decoder for TarDecoder {
    fn format_name(&self) -> &'static str {
        super::detect::FORMAT_TAR
    }

    fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        if self.done {
            return Ok(None);
        }
        // Leave the previous entry at its record boundary.
        let leftover = self.remaining + self.padding;
        self.remaining = 0;
        self.padding = 0;
        self.drain(leftover)?;

        let mut long_name: Option<String> = None;
        let mut pax_path: Option<String> = None;
        let mut block = [0u8; 512];

        loop {
            match self.read_block(&mut block)? {
                Some(()) => {}
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }

            if block.iter().all(|&b| b == 0) {
                // First of the two terminating zero blocks; the second (and
                // any trailing padding) is irrelevant to us.
                self.done = true;
                return Ok(None);
            }

            if !super::detect::tar_checksum_valid(&block) {
                self.done = true;
                return Err(Error::InvalidFormat("tar header checksum mismatch".into()));
            }

            let mut header = Header::new_old();
            header.as_mut_bytes().copy_from_slice(&block);
            let size = header.entry_size().map_err(Error::Io)?;
            let entry_type = header.entry_type();

            if entry_type.is_gnu_longname() {
                let data = self.read_name_payload(size)?;
                long_name = Some(trim_nul(&data));
                continue;
            }
            if entry_type.is_gnu_longlink() {
                // Link target override; not needed for traversal identity.
                self.read_name_payload(size)?;
                continue;
            }
            if entry_type.is_pax_local_extensions() {
                let data = self.read_name_payload(size)?;
                pax_path = parse_pax_path(&data);
                continue;
            }
            if entry_type.is_pax_global_extensions() {
                self.read_name_payload(size)?;
                continue;
            }

            let stored_name = pax_path
                .take()
                .or_else(|| long_name.take())
                .unwrap_or_else(|| {
                    String::from_utf8_lossy(&header.path_bytes()).into_owned()
                });
            let kind = if entry_type.is_dir() || stored_name.ends_with('/') {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let name = stored_name.trim_end_matches('/').to_string();

            // Nonstandard directories with payload still need their bytes
            // drained, so the payload moves into the padding count.
            self.remaining = if kind.is_directory() { 0 } else { size };
            self.padding =
                padding_after(size) + if kind.is_directory() { size } else { 0 };

            let metadata = self.capture_metadata(&header, &stored_name, kind);
            return Ok(Some(EntryHeader {
                name,
                kind,
                size,
                metadata,
            }));
        }
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.reader.read(&mut buf[..want])?;
        if n == 0 {
            self.done = true;
            return Err(Error::InvalidFormat("unexpected end of tar payload".into()));
        }
        self.remaining -= n as u64;
        Ok(n)
    }

    fn skip_data(&mut self) -> Result<()> {
        let leftover = self.remaining;
        self.remaining = 0;
        self.drain(leftover)
    }
}

fn trim_nul(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
