//! Multi-volume stream and deferred-group integration tests.
//!
//! These tests verify:
//! - byte-for-byte concatenation of split volume files
//! - deferred traversal of groups registered via `set_multi_volume_group`
//! - natural vs. given part ordering
//! - single-part groups and non-seekable seek failures

mod common;

use common::*;
use tempfile::TempDir;

use arcwalk::hierarchy::{PartOrdering, make_multi_volume_path};
use arcwalk::{Traverser, TraverserOptions};

/// Splits `bytes` into volume files of `chunk` bytes each and returns the
/// part paths.
fn split_into_volumes(dir: &TempDir, base: &str, bytes: &[u8], chunk: usize) -> Vec<String> {
    bytes
        .chunks(chunk)
        .enumerate()
        .map(|(i, part)| write_file(dir, &format!("{base}.part{:03}", i + 1), part))
        .collect()
}

// ============================================================================
// Volume files on the filesystem
// ============================================================================

#[test]
fn volume_group_root_concatenates_parts() {
    let dir = TempDir::new().unwrap();
    let archive = tar_bytes(&[("payload.txt", b"split across volumes")]);
    let parts = split_into_volumes(&dir, "vol", &archive, 700);
    assert!(parts.len() > 1, "fixture must actually split");

    let root = make_multi_volume_path(parts, PartOrdering::Natural);
    let traverser = Traverser::new(vec![root], TraverserOptions::default()).unwrap();

    let mut payload = None;
    let mut count = 0;
    for entry in traverser {
        let entry = entry.unwrap();
        count += 1;
        if entry.depth() == 1 {
            payload = Some(entry.read_to_end().unwrap());
        }
    }
    assert_eq!(count, 2, "group root + contained file");
    assert_eq!(payload.unwrap(), b"split across volumes");
}

#[test]
fn natural_ordering_sorts_shuffled_parts() {
    let dir = TempDir::new().unwrap();
    let archive = tar_bytes(&[("n.txt", b"numbered volume order")]);
    let parts = split_into_volumes(&dir, "nat", &archive, 600);
    assert!(parts.len() >= 2);

    // Hand the parts over shuffled; Natural ordering restores them.
    let mut shuffled = parts.clone();
    shuffled.reverse();
    let root = make_multi_volume_path(shuffled, PartOrdering::Natural);
    let traverser = Traverser::new(vec![root], TraverserOptions::default()).unwrap();
    let mut payload = None;
    for entry in traverser {
        let entry = entry.unwrap();
        if entry.depth() == 1 {
            payload = Some(entry.read_to_end().unwrap());
        }
    }
    assert_eq!(payload.unwrap(), b"numbered volume order");
}

#[test]
fn single_part_group_is_the_single_part_stream() {
    let dir = TempDir::new().unwrap();
    let archive = tar_bytes(&[("only.txt", b"one part")]);
    let part = write_file(&dir, "solo.part001", &archive);

    let root = make_multi_volume_path([part], PartOrdering::Natural);
    let traverser = Traverser::new(vec![root], TraverserOptions::default()).unwrap();
    let mut payload = None;
    for entry in traverser {
        let entry = entry.unwrap();
        if entry.depth() == 1 {
            payload = Some(entry.read_to_end().unwrap());
        }
    }
    assert_eq!(payload.unwrap(), b"one part");
}

// ============================================================================
// Groups registered inside an archive
// ============================================================================

#[test]
fn registered_group_defers_until_enclosing_archive_is_exhausted() {
    let dir = TempDir::new().unwrap();
    // v.tar contains split volumes of an inner tar plus an unrelated file.
    let inner = tar_bytes(&[("inner-a", b"alpha"), ("inner-b", b"beta")]);
    let chunks: Vec<&[u8]> = inner.chunks(700).collect();
    assert!(chunks.len() > 1);
    let mut outer_entries: Vec<(String, &[u8])> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (format!("v.part{:03}", i + 1), *c))
        .collect();
    outer_entries.push(("unrelated.txt".to_string(), b"tail file"));
    let outer_refs: Vec<(&str, &[u8])> = outer_entries
        .iter()
        .map(|(n, d)| (n.as_str(), *d))
        .collect();
    let root = write_file(&dir, "v.tar", &tar_bytes(&outer_refs));

    let traverser =
        Traverser::from_paths([root.as_str()], TraverserOptions::default()).unwrap();
    let mut sequence = Vec::new();
    let mut inner_payloads = Vec::new();
    for entry in traverser {
        let entry = entry.unwrap();
        let display = display_of(&entry);
        if display.contains(".part") && !display.contains('{') {
            entry.set_multi_volume_group("v", None).unwrap();
        }
        if display.ends_with("inner-a") || display.ends_with("inner-b") {
            inner_payloads.push((display.clone(), entry.read_to_end().unwrap()));
        }
        sequence.push(display);
    }

    // All parts and the unrelated sibling come before any group content.
    let last_part = sequence
        .iter()
        .rposition(|d| d.contains(".part") && !d.contains('{'))
        .unwrap();
    let first_group = sequence
        .iter()
        .position(|d| d.contains('{'))
        .expect("group root emitted");
    assert!(last_part < first_group, "parts precede group contents");
    assert!(
        sequence
            .iter()
            .position(|d| d.ends_with("unrelated.txt"))
            .unwrap()
            < first_group,
        "siblings of the parts precede the group"
    );

    // The group's concatenated stream decodes to the inner entries.
    assert_eq!(inner_payloads.len(), 2);
    assert_eq!(inner_payloads[0].1, b"alpha");
    assert_eq!(inner_payloads[1].1, b"beta");

    // Group content hierarchies carry the multi-volume step.
    assert!(inner_payloads.iter().all(|(d, _)| d.contains('{')));
}

#[test]
fn group_registered_after_payload_read_is_reread_from_start() {
    let dir = TempDir::new().unwrap();
    let inner = tar_bytes(&[("whole", b"restartable")]);
    let chunks: Vec<&[u8]> = inner.chunks(700).collect();
    let outer_entries: Vec<(String, &[u8])> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (format!("w.part{:03}", i + 1), *c))
        .collect();
    let outer_refs: Vec<(&str, &[u8])> = outer_entries
        .iter()
        .map(|(n, d)| (n.as_str(), *d))
        .collect();
    let root = write_file(&dir, "w.tar", &tar_bytes(&outer_refs));

    let traverser =
        Traverser::from_paths([root.as_str()], TraverserOptions::default()).unwrap();
    let mut payload = None;
    for entry in traverser {
        let entry = entry.unwrap();
        let display = display_of(&entry);
        if display.contains(".part") && !display.contains('{') {
            // Consume some payload first, then register: the synthesized
            // stream must still read every part from offset 0.
            let mut buf = [0u8; 16];
            entry.read(&mut buf).unwrap();
            entry.set_multi_volume_group("w", None).unwrap();
        }
        if display.ends_with("/whole") {
            payload = Some(entry.read_to_end().unwrap());
        }
    }
    assert_eq!(payload.unwrap(), b"restartable");
}

#[test]
fn given_ordering_preserves_registration_order() {
    let dir = TempDir::new().unwrap();
    let inner = tar_bytes(&[("g", b"given order wins")]);
    let mid = inner.len() / 2;
    // Store the *second* half under a name that sorts first, so Natural
    // ordering would corrupt the stream.
    let root = write_file(
        &dir,
        "g.tar",
        &tar_bytes(&[("b-second", &inner[..mid]), ("a-first", &inner[mid..])]),
    );

    let traverser =
        Traverser::from_paths([root.as_str()], TraverserOptions::default()).unwrap();
    let mut payload = None;
    for entry in traverser {
        let entry = entry.unwrap();
        let display = display_of(&entry);
        if display.ends_with("b-second") || display.ends_with("a-first") {
            entry
                .set_multi_volume_group("g", PartOrdering::Given)
                .unwrap();
        }
        if display.ends_with("/g") {
            payload = Some(entry.read_to_end().unwrap());
        }
    }
    assert_eq!(payload.unwrap(), b"given order wins");
}

// ============================================================================
// Stream-level boundaries
// ============================================================================

#[test]
fn concatenation_equals_independent_part_reads() {
    let dir = TempDir::new().unwrap();
    let blob: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let parts = split_into_volumes(&dir, "cat", &blob, 1000);

    let mut independent = Vec::new();
    for part in &parts {
        independent.extend_from_slice(&std::fs::read(part).unwrap());
    }
    assert_eq!(independent, blob);

    use arcwalk::stream::{DataStream, file_stream};
    let mut stream =
        file_stream(make_multi_volume_path(parts, PartOrdering::Natural)).unwrap();
    let mut concatenated = Vec::new();
    let mut buf = [0u8; 333];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        concatenated.extend_from_slice(&buf[..n]);
    }
    assert_eq!(concatenated, blob);
}

#[test]
fn seek_on_non_seekable_stream_fails_without_state_change() {
    use arcwalk::cursor::StreamArchive;
    use arcwalk::decoder::DecoderOptions;
    use arcwalk::stream::{DataStream, file_stream, payload_stream, share};
    use arcwalk::{Error, PathHierarchy};
    use std::cell::RefCell;
    use std::io::SeekFrom;
    use std::rc::Rc;

    let dir = TempDir::new().unwrap();
    let root = write_file(&dir, "s.tar", &tar_bytes(&[("p1", b"11111"), ("p2", b"22222")]));

    let base = share(Box::new(
        file_stream(PathHierarchy::single(&root)).unwrap(),
    ));
    let archive = Rc::new(RefCell::new(
        StreamArchive::open(base, DecoderOptions::default()).unwrap(),
    ));
    let logical = PathHierarchy::single(&root).append(
        arcwalk::PathEntry::multi_volume(["p1", "p2"], PartOrdering::Given),
    );
    let mut stream = payload_stream(archive, logical).unwrap();

    let mut buf = [0u8; 3];
    assert_eq!(stream.read(&mut buf).unwrap(), 3);
    assert!(!stream.can_seek());
    assert!(matches!(
        stream.seek(SeekFrom::Start(0)),
        Err(Error::SeekUnsupported)
    ));
    // State untouched: the read continues where it left off.
    let mut rest = Vec::new();
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        rest.extend_from_slice(&buf[..n]);
    }
    assert_eq!(rest, b"1122222");
}
