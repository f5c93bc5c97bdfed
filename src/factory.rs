//! Root stream factory registration.
//!
//! Callers can substitute their own byte source for a root path: before the
//! cursor opens a root through the filesystem, it offers the root hierarchy
//! to the registered factory. A factory that recognizes the hierarchy
//! returns a stream for it; returning `None` declines and the default
//! system-file stream is used instead.
//!
//! Like the fault callback, the factory slot is process-wide and single:
//! registering a new factory atomically replaces the previous one, and
//! registering `None` clears it.
//!
//! The stream a factory returns must honor the [`DataStream`] contract for
//! the hierarchy it was asked to open — in particular
//! [`source_hierarchy`](DataStream::source_hierarchy) must equal that
//! hierarchy, and `rewind` must work (decoders rewind to probe formats and
//! passphrases).

use std::sync::{Arc, RwLock};

use crate::hierarchy::PathHierarchy;
use crate::stream::DataStream;

/// Signature of a registered root stream factory.
pub type RootStreamFactory =
    Arc<dyn Fn(&PathHierarchy) -> Option<Box<dyn DataStream>> + Send + Sync>;

static ROOT_FACTORY: RwLock<Option<RootStreamFactory>> = RwLock::new(None);

/// Registers the process-wide root stream factory.
///
/// Passing `Some` replaces any previous factory; passing `None` clears the
/// slot.
pub fn register_root_stream_factory(factory: Option<RootStreamFactory>) {
    let mut slot = ROOT_FACTORY.write().unwrap_or_else(|poisoned| {
        log::warn!("root stream factory slot was poisoned, recovering");
        poisoned.into_inner()
    });
    *slot = factory;
}

/// Offers a root hierarchy to the registered factory.
///
/// Returns `None` when no factory is registered or the factory declines.
pub(crate) fn open_root(hierarchy: &PathHierarchy) -> Option<Box<dyn DataStream>> {
    let slot = ROOT_FACTORY.read().unwrap_or_else(|poisoned| {
        log::warn!("root stream factory slot was poisoned, recovering");
        poisoned.into_inner()
    });
    let factory = slot.as_ref()?;
    factory(hierarchy)
}
