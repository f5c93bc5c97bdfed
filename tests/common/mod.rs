//! Shared test utilities for integration tests.
//!
//! Fixture archives are built with reference encoders (`tar::Builder`,
//! `zip::ZipWriter`, `flate2::GzEncoder`) and written to temp directories.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test
//! file compiles as a separate crate and may only use a subset of these
//! helpers.

#![allow(dead_code)]

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use arcwalk::{Entry, EntryFault, register_fault_callback};
use tempfile::TempDir;
use zip::unstable::write::FileOptionsExt;

/// Builds an in-memory tar archive from `(name, data)` pairs.
pub fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_700_000_000);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Builds a tar archive that also contains explicit directory entries.
pub fn tar_bytes_with_dirs(dirs: &[&str], entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for dir in dirs {
        let mut header = tar::Header::new_ustar();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, *dir, &b""[..]).unwrap();
    }
    for (name, data) in entries {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Compresses `bytes` with gzip.
pub fn gzip_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Builds an in-memory zip archive from `(name, data)` pairs.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Builds a ZipCrypto-encrypted zip archive.
pub fn encrypted_zip_bytes(entries: &[(&str, &[u8])], passphrase: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    #[allow(deprecated)]
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .with_deprecated_encryption(passphrase.as_bytes());
    for (name, data) in entries {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Writes `bytes` to `dir/name` and returns the full path as a string.
pub fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> String {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    File::create(&path).unwrap().write_all(bytes).unwrap();
    path.display().to_string()
}

/// Renders an entry's hierarchy for order assertions.
pub fn display_of(entry: &Entry) -> String {
    entry.path_hierarchy().display()
}

/// Strips a temp-dir prefix from a rendered hierarchy, so assertions stay
/// independent of the random directory name.
pub fn relative_display(display: &str, dir: &Path) -> String {
    let prefix = dir.display().to_string();
    display
        .strip_prefix(&prefix)
        .map(|s| s.trim_start_matches('/').to_string())
        .unwrap_or_else(|| display.to_string())
}

static FAULT_SLOT: Mutex<()> = Mutex::new(());

fn fault_lock() -> MutexGuard<'static, ()> {
    // A poisoned lock only means another test panicked while holding it.
    FAULT_SLOT.lock().unwrap_or_else(|p| p.into_inner())
}

/// Runs `body` with a fault collector registered, returning the faults
/// whose rendered hierarchy contains `filter`.
///
/// The fault callback is a process-wide single slot, so collectors are
/// serialized through a lock, and filtering keeps faults from concurrently
/// running traversals (registered before the lock was taken) out of the
/// result.
pub fn capture_faults<T>(
    filter: &str,
    body: impl FnOnce() -> T,
) -> (Vec<(String, String, Option<i32>)>, T) {
    let _guard = fault_lock();
    let collected: Arc<Mutex<Vec<(String, String, Option<i32>)>>> = Arc::default();
    let sink = Arc::clone(&collected);
    register_fault_callback(Some(Arc::new(move |fault: &EntryFault| {
        sink.lock().unwrap().push((
            fault.hierarchy().display(),
            fault.message().to_string(),
            fault.errno(),
        ));
    })));
    let result = body();
    register_fault_callback(None);

    let faults = collected
        .lock()
        .unwrap()
        .iter()
        .filter(|(hierarchy, _, _)| hierarchy.contains(filter))
        .cloned()
        .collect();
    (faults, result)
}

