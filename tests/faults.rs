//! Fault containment and error-policy tests.
//!
//! Recoverable data errors surface through the fault callback with the
//! best-known hierarchy; traversal always proceeds to the next yieldable
//! entry. Programmer errors are returned as hard errors instead.

mod common;

use common::*;
use tempfile::TempDir;

use arcwalk::{Error, Traverser, TraverserOptions};

#[test]
fn corrupt_nested_archive_faults_and_siblings_survive() {
    let dir = TempDir::new().unwrap();
    // inner.tar advertises itself as tar but its second header is garbage:
    // entry "ok" decodes, then the level dies with a fault.
    let good = tar_bytes(&[("ok", b"fine")]);
    let mut corrupt = tar_bytes(&[("ok", b"fine"), ("broken", b"body")]);
    let second_header = 512 + 512; // header + one padded payload block
    corrupt[second_header] ^= 0xFF;
    corrupt.truncate(corrupt.len().min(second_header + 512 + 512));
    let root = write_file(
        &dir,
        "outer.tar",
        &tar_bytes(&[("bad.tar", &corrupt), ("good.tar", &good), ("tail.txt", b"end")]),
    );

    let (faults, displays) = capture_faults(dir.path().to_str().unwrap(), || {
        Traverser::from_paths([root.as_str()], TraverserOptions::default())
            .unwrap()
            .into_iter()
            .map(|e| display_of(&e.unwrap()))
            .collect::<Vec<_>>()
    });

    // The faulted subtree's siblings still traverse fully.
    assert!(displays.contains(&format!("{root}/good.tar/ok")));
    assert!(displays.contains(&format!("{root}/tail.txt")));
    // Exactly one fault, bound to the corrupt subtree's hierarchy.
    let bad_faults: Vec<_> = faults
        .iter()
        .filter(|(h, _, _)| h.starts_with(&format!("{root}/bad.tar")))
        .collect();
    assert_eq!(bad_faults.len(), 1, "one fault for the corrupt level: {faults:?}");
}

#[test]
fn missing_root_faults_and_remaining_roots_proceed() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.tar").display().to_string();
    let present = write_file(&dir, "present.tar", &tar_bytes(&[("x", b"1")]));

    let (faults, displays) = capture_faults(dir.path().to_str().unwrap(), || {
        Traverser::from_paths([missing.as_str(), present.as_str()], TraverserOptions::default())
            .unwrap()
            .into_iter()
            .map(|e| display_of(&e.unwrap()))
            .collect::<Vec<_>>()
    });

    assert!(displays.contains(&format!("{present}/x")));
    assert!(displays.iter().all(|d| !d.starts_with(&missing)));
    assert!(
        faults
            .iter()
            .any(|(h, m, _)| h == &missing && m.starts_with("Failed to open root file")),
        "missing root reported via fault: {faults:?}"
    );
}

#[test]
fn entry_read_error_returns_err_and_faults() {
    let dir = TempDir::new().unwrap();
    // Truncate the archive inside the payload of its only entry.
    let mut bytes = tar_bytes(&[("cut", &[9u8; 2048])]);
    bytes.truncate(512 + 100);
    let root = write_file(&dir, "trunc.tar", &bytes);

    let (faults, read_result) = capture_faults(dir.path().to_str().unwrap(), || {
        let traverser =
            Traverser::from_paths([root.as_str()], TraverserOptions::default()).unwrap();
        let mut outcome = None;
        for entry in traverser {
            let entry = entry.unwrap();
            if display_of(&entry).ends_with("/cut") {
                outcome = Some(entry.read_to_end());
            }
        }
        outcome.expect("entry yielded")
    });

    assert!(read_result.is_err(), "truncated payload read fails");
    assert!(!faults.is_empty(), "and the failure is also reported as a fault");
}

#[test]
fn stale_entry_use_is_a_programmer_error() {
    let dir = TempDir::new().unwrap();
    let root = write_file(&dir, "s.tar", &tar_bytes(&[("a", b"1"), ("b", b"2")]));

    let traverser =
        Traverser::from_paths([root.as_str()], TraverserOptions::default()).unwrap();
    let mut iter = traverser.into_iter();
    let _root_entry = iter.next().unwrap().unwrap();
    let first = iter.next().unwrap().unwrap();
    let _second = iter.next().unwrap().unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(first.read(&mut buf), Err(Error::StaleEntry)));
    assert!(matches!(
        first.set_multi_volume_group("g", None),
        Err(Error::StaleEntry)
    ));
}

#[test]
fn fault_carries_errno_for_os_failures() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("gone.bin").display().to_string();

    let (faults, _) = capture_faults(dir.path().to_str().unwrap(), || {
        Traverser::from_paths([missing.as_str()], TraverserOptions::default())
            .unwrap()
            .into_iter()
            .count()
    });
    let (_, _, errno) = faults.first().expect("fault for missing root");
    assert_eq!(*errno, Some(libc_enoent()));
}

/// ENOENT without pulling in libc: stable on every Unix we test on.
fn libc_enoent() -> i32 {
    2
}
