//! Streaming zip decoder.
//!
//! Frames the archive by local file headers, the only layout readable
//! without random access: entries inside other archives arrive as
//! forward-only payload streams, so the central directory at the end of the
//! file is out of reach. The practical cost is small — entries that defer
//! their sizes to a trailing data descriptor are rejected — and reference
//! encoders writing to seekable sinks never produce such entries.
//!
//! Supported per entry: stored and deflate compression, ZipCrypto
//! decryption against the configured passphrase list, and CRC-32
//! verification of the decompressed payload. A wrong passphrase is usually
//! caught by the crypto header check byte; the CRC backstops the one-in-256
//! chance that garbage passes it.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::io::{self, Read};
use std::rc::Rc;

use crate::decoder::{Decoder, EntryHeader};
use crate::metadata::{EntryKind, MetadataMap, MetadataValue};
use crate::{Error, Result};

const SIG_LOCAL_HEADER: u32 = 0x04034B50;
const SIG_CENTRAL_HEADER: u32 = 0x02014B50;
const SIG_END_OF_CENTRAL: u32 = 0x06054B50;

const FLAG_ENCRYPTED: u16 = 1;
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

const CRYPTO_HEADER_LEN: u64 = 12;

/// Shared handle to the underlying reader, so per-entry decompressor
/// chains can be layered over it and dropped without losing the source.
#[derive(Clone)]
struct RawHandle(Rc<RefCell<Box<dyn Read>>>);

impl Read for RawHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.borrow_mut().read(buf)
    }
}

/// Bounds reads to the entry's compressed extent and counts raw bytes
/// consumed, so the decoder can drain the exact remainder when advancing.
struct CountingReader {
    raw: RawHandle,
    consumed: Rc<Cell<u64>>,
    limit: u64,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.limit.saturating_sub(self.consumed.get());
        if left == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(left.min(usize::MAX as u64) as usize);
        let n = self.raw.read(&mut buf[..want])?;
        self.consumed.set(self.consumed.get() + n as u64);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// ZipCrypto
// ---------------------------------------------------------------------------

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

fn crc32_step(crc: u32, byte: u8) -> u32 {
    CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

/// The traditional PKWARE stream cipher key schedule.
#[derive(Clone)]
struct ZipCryptoKeys {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl ZipCryptoKeys {
    fn new(passphrase: &[u8]) -> Self {
        let mut keys = ZipCryptoKeys {
            k0: 0x1234_5678,
            k1: 0x2345_6789,
            k2: 0x3456_7890,
        };
        for &b in passphrase {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, byte: u8) {
        self.k0 = crc32_step(self.k0, byte);
        self.k1 = self
            .k1
            .wrapping_add(self.k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.k2 = crc32_step(self.k2, (self.k1 >> 24) as u8);
    }

    fn stream_byte(&self) -> u8 {
        let t = (self.k2 | 2) & 0xFFFF;
        (t.wrapping_mul(t ^ 1) >> 8) as u8
    }

    fn decrypt(&mut self, byte: u8) -> u8 {
        let plain = byte ^ self.stream_byte();
        self.update(plain);
        plain
    }
}

/// Decrypting reader layered between the raw extent and the decompressor.
struct ZipCryptoReader<R> {
    inner: R,
    keys: ZipCryptoKeys,
}

impl<R: Read> Read for ZipCryptoReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for b in &mut buf[..n] {
            *b = self.keys.decrypt(*b);
        }
        Ok(n)
    }
}

/// Runs the key schedule over the 12-byte encryption header; the final
/// decrypted byte must equal the high byte of the entry CRC.
fn probe_passphrase(passphrase: &str, header: &[u8; 12], check: u8) -> Option<ZipCryptoKeys> {
    let mut keys = ZipCryptoKeys::new(passphrase.as_bytes());
    let mut last = 0u8;
    for &c in header {
        last = keys.decrypt(c);
    }
    (last == check).then_some(keys)
}

// ---------------------------------------------------------------------------
// DOS timestamps
// ---------------------------------------------------------------------------

/// Days since 1970-01-01 for a civil date (Howard Hinnant's algorithm).
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn dos_datetime_to_epoch(time: u16, date: u16) -> Option<u64> {
    let year = 1980 + i64::from((date >> 9) & 0x7F);
    let month = i64::from((date >> 5) & 0xF);
    let day = i64::from(date & 0x1F);
    if !(1..=12).contains(&month) || day == 0 {
        return None;
    }
    let hour = i64::from((time >> 11) & 0x1F);
    let minute = i64::from((time >> 5) & 0x3F);
    let second = i64::from(time & 0x1F) * 2;
    let secs = days_from_civil(year, month, day) * 86_400 + hour * 3_600 + minute * 60 + second;
    u64::try_from(secs).ok()
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

struct CurrentEntry {
    name: String,
    comp_size: u64,
    consumed: Rc<Cell<u64>>,
    payload: Box<dyn Read>,
    crc_expected: u32,
    hasher: crc32fast::Hasher,
    /// Payload end reached and checksum verified.
    finished: bool,
    /// `skip_data` was called: remaining bytes are discarded unverified.
    skipped: bool,
}

pub struct ZipStreamDecoder {
    raw: RawHandle,
    passphrases: Vec<String>,
    metadata_keys: BTreeSet<String>,
    current: Option<CurrentEntry>,
    done: bool,
}

impl ZipStreamDecoder {
    pub fn new(
        reader: Box<dyn Read>,
        passphrases: Vec<String>,
        metadata_keys: BTreeSet<String>,
    ) -> Self {
        ZipStreamDecoder {
            raw: RawHandle(Rc::new(RefCell::new(reader))),
            passphrases,
            metadata_keys,
            current: None,
            done: false,
        }
    }

    fn read_exact_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        self.raw.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidFormat("truncated zip header".into())
            } else {
                Error::Io(e)
            }
        })
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact_raw(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_raw(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Discards the unconsumed compressed remainder of the current entry.
    fn finish_current(&mut self) -> Result<()> {
        let Some(current) = self.current.take() else {
            return Ok(());
        };
        let leftover = current.comp_size.saturating_sub(current.consumed.get());
        drop(current.payload);
        let copied = io::copy(&mut self.raw.by_ref().take(leftover), &mut io::sink())?;
        if copied != leftover {
            self.done = true;
            return Err(Error::InvalidFormat("truncated zip entry payload".into()));
        }
        Ok(())
    }

    fn capture_metadata(&self, name: &str, kind: EntryKind, size: u64, mtime: Option<u64>) -> MetadataMap {
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
        put("size", Some(MetadataValue::UInt(size)));
        put("mtime", mtime.map(MetadataValue::UInt));
        metadata
    }
}

impl Decoder for ZipStreamDecoder {
    fn format_name(&self) -> &'static str {
        super::detect::FORMAT_ZIP
    }

    fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        if self.done {
            return Ok(None);
        }
        self.finish_current()?;

        // Signature, or clean end of input.
        let mut sig = [0u8; 4];
        let mut filled = 0;
        while filled < 4 {
            let n = self.raw.read(&mut sig[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            self.done = true;
            return Ok(None);
        }
        if filled < 4 {
            self.done = true;
            return Err(Error::InvalidFormat("truncated zip signature".into()));
        }
        match u32::from_le_bytes(sig) {
            SIG_LOCAL_HEADER => {}
            SIG_CENTRAL_HEADER | SIG_END_OF_CENTRAL => {
                // Central directory: every local entry has been seen.
                self.done = true;
                return Ok(None);
            }
            other => {
                self.done = true;
                return Err(Error::InvalidFormat(format!(
                    "unexpected zip signature {other:#010x}"
                )));
            }
        }

        let _version = self.read_u16()?;
        let flags = self.read_u16()?;
        let method = self.read_u16()?;
        let dos_time = self.read_u16()?;
        let dos_date = self.read_u16()?;
        let crc = self.read_u32()?;
        let comp_size = u64::from(self.read_u32()?);
        let uncomp_size = u64::from(self.read_u32()?);
        let name_len = usize::from(self.read_u16()?);
        let extra_len = u64::from(self.read_u16()?);

        let mut name_buf = vec![0u8; name_len];
        self.read_exact_raw(&mut name_buf)?;
        let stored_name = String::from_utf8_lossy(&name_buf).into_owned();
        io::copy(&mut self.raw.by_ref().take(extra_len), &mut io::sink())?;

        if flags & FLAG_DATA_DESCRIPTOR != 0 {
            self.done = true;
            return Err(Error::InvalidFormat(format!(
                "zip entry '{stored_name}' defers sizes to a data descriptor \
                 (unsupported in streaming mode)"
            )));
        }
        if comp_size == u64::from(u32::MAX) || uncomp_size == u64::from(u32::MAX) {
            self.done = true;
            return Err(Error::UnsupportedFormat {
                format: "zip64".into(),
            });
        }

        let kind = if stored_name.ends_with('/') {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let name = stored_name.trim_end_matches('/').to_string();

        let consumed = Rc::new(Cell::new(0u64));
        let encrypted = flags & FLAG_ENCRYPTED != 0;

        let keys = if encrypted {
            if comp_size < CRYPTO_HEADER_LEN {
                self.done = true;
                return Err(Error::InvalidFormat(
                    "encrypted zip entry shorter than its encryption header".into(),
                ));
            }
            let mut header = [0u8; 12];
            self.read_exact_raw(&mut header)?;
            consumed.set(CRYPTO_HEADER_LEN);
            let check = (crc >> 24) as u8;
            if self.passphrases.is_empty() {
                return Err(Error::PassphraseRequired { entry: name });
            }
            let Some(keys) = self
                .passphrases
                .iter()
                .find_map(|p| probe_passphrase(p, &header, check))
            else {
                return Err(Error::WrongPassphrase { entry: name });
            };
            Some(keys)
        } else {
            None
        };

        let counting = CountingReader {
            raw: self.raw.clone(),
            consumed: Rc::clone(&consumed),
            limit: comp_size,
        };
        let decrypted: Box<dyn Read> = match keys {
            Some(keys) => Box::new(ZipCryptoReader {
                inner: counting,
                keys,
            }),
            None => Box::new(counting),
        };
        let payload: Box<dyn Read> = match method {
            METHOD_STORED => decrypted,
            METHOD_DEFLATE => Box::new(flate2::read::DeflateDecoder::new(decrypted)),
            other => {
                self.done = true;
                return Err(Error::UnsupportedFormat {
                    format: format!("zip compression method {other}"),
                });
            }
        };

        let metadata = self.capture_metadata(
            &name,
            kind,
            uncomp_size,
            dos_datetime_to_epoch(dos_time, dos_date),
        );
        self.current = Some(CurrentEntry {
            name: name.clone(),
            comp_size,
            consumed,
            payload,
            crc_expected: crc,
            hasher: crc32fast::Hasher::new(),
            finished: false,
            skipped: false,
        });

        Ok(Some(EntryHeader {
            name,
            kind,
            size: uncomp_size,
            metadata,
        }))
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(current) = self.current.as_mut() else {
            return Ok(0);
        };
        if current.finished || current.skipped || buf.is_empty() {
            return Ok(0);
        }
        let n = current.payload.read(buf)?;
        if n > 0 {
            current.hasher.update(&buf[..n]);
            return Ok(n);
        }
        current.finished = true;
        let actual = current.hasher.clone().finalize();
        if actual != current.crc_expected {
            return Err(Error::CrcMismatch {
                entry: current.name.clone(),
                expected: current.crc_expected,
                actual,
            });
        }
        Ok(0)
    }

    fn skip_data(&mut self) -> Result<()> {
        if let Some(current) = self.current.as_mut() {
            // The compressed remainder is drained raw when the header
            // cursor advances; no need to decompress discarded bytes.
            current.skipped = true;
        }
        Ok(())
    }
}
