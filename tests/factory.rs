//! Root stream factory: substituting custom byte sources for root paths.

mod common;

use common::*;
use std::sync::Arc;

use arcwalk::{
    DataStream, PathHierarchy, Result, Traverser, TraverserOptions, register_root_stream_factory,
};

/// In-memory stream honoring the custom-stream contract: `read`, `rewind`,
/// and a source hierarchy equal to the one it was asked to open.
struct MemStream {
    hierarchy: PathHierarchy,
    data: Arc<Vec<u8>>,
    pos: usize,
    at_end: bool,
}

impl DataStream for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        if n == 0 {
            self.at_end = true;
        }
        Ok(n)
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        self.at_end = false;
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.at_end
    }

    fn source_hierarchy(&self) -> &PathHierarchy {
        &self.hierarchy
    }
}

#[test]
fn factory_serves_virtual_roots() {
    let archive = tar_bytes(&[("virtual.txt", b"not on disk")]);
    let data = Arc::new(archive);
    let served = Arc::clone(&data);
    register_root_stream_factory(Some(Arc::new(move |hierarchy: &PathHierarchy| {
        let name = hierarchy.root()?.as_single()?;
        if name == "mem://fixture" {
            Some(Box::new(MemStream {
                hierarchy: hierarchy.clone(),
                data: Arc::clone(&served),
                pos: 0,
                at_end: false,
            }) as Box<dyn DataStream>)
        } else {
            None
        }
    })));

    let traverser =
        Traverser::from_paths(["mem://fixture"], TraverserOptions::default()).unwrap();
    let mut payload = None;
    for entry in traverser {
        let entry = entry.unwrap();
        if entry.depth() == 1 {
            assert_eq!(
                entry.path_hierarchy().display(),
                "mem://fixture/virtual.txt"
            );
            payload = Some(entry.read_to_end().unwrap());
        }
    }
    register_root_stream_factory(None);

    assert_eq!(payload.unwrap(), b"not on disk");
}
