//! Property-based tests for ordering and multi-volume concatenation.

mod common;

use common::*;
use proptest::prelude::*;
use tempfile::TempDir;

use arcwalk::hierarchy::{PartOrdering, PathEntry, make_multi_volume_path, natural_cmp};
use arcwalk::stream::{DataStream, file_stream};

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}(\\.[0-9]{1,3})?"
}

proptest! {
    #[test]
    fn natural_cmp_is_a_total_order(a in name_strategy(), b in name_strategy(), c in name_strategy()) {
        use std::cmp::Ordering;

        // Antisymmetry.
        prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        // Reflexivity.
        prop_assert_eq!(natural_cmp(&a, &a), Ordering::Equal);
        // Transitivity of <=.
        if natural_cmp(&a, &b) != Ordering::Greater && natural_cmp(&b, &c) != Ordering::Greater {
            prop_assert_ne!(natural_cmp(&a, &c), Ordering::Greater);
        }
        // Equality under natural_cmp means string equality.
        if natural_cmp(&a, &b) == Ordering::Equal {
            prop_assert_eq!(&a, &b);
        }
    }

    #[test]
    fn path_entry_order_is_consistent(names in proptest::collection::vec(name_strategy(), 1..4)) {
        let single = PathEntry::single(names[0].clone());
        let multi = PathEntry::multi_volume(names.clone(), PartOrdering::Natural);
        let nested = PathEntry::nested(vec![single.clone()]);
        prop_assert!(single < multi);
        prop_assert!(multi < nested);
        prop_assert_eq!(single.cmp(&single), std::cmp::Ordering::Equal);
    }

    #[test]
    fn multivolume_concatenation_matches_blob(
        blob in proptest::collection::vec(any::<u8>(), 1..2000),
        chunk in 1usize..500,
    ) {
        let dir = TempDir::new().unwrap();
        let parts: Vec<String> = blob
            .chunks(chunk)
            .enumerate()
            .map(|(i, part)| write_file(&dir, &format!("p.{:03}", i + 1), part))
            .collect();

        let mut stream = file_stream(make_multi_volume_path(parts, PartOrdering::Natural)).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 97];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        prop_assert_eq!(out, blob);
    }
}
