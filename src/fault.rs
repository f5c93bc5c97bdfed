//! Fault reporting channel.
//!
//! Recoverable data errors (unreadable stream, corrupt header, passphrase
//! mismatch) never abort a traversal by themselves. They are surfaced as
//! [`EntryFault`] values through a process-wide callback; the traverser then
//! proceeds to the next yieldable entry. A consumer that wants faults to be
//! fatal sets external state from the callback and checks it between
//! iterations.
//!
//! The callback slot is process-wide: registering a new callback atomically
//! replaces the previous one, registering `None` clears it. The callback is
//! invoked from whichever thread was executing traversal at the time of the
//! fault, so it must be `Send + Sync`.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use arcwalk::fault::{self, EntryFault};
//!
//! let seen: Arc<Mutex<Vec<String>>> = Arc::default();
//! let sink = Arc::clone(&seen);
//! fault::register_fault_callback(Some(Arc::new(move |f: &EntryFault| {
//!     sink.lock().unwrap().push(f.message().to_string());
//! })));
//! // ... traverse ...
//! fault::register_fault_callback(None);
//! ```

use std::sync::{Arc, RwLock};

use crate::Error;
use crate::hierarchy::PathHierarchy;

/// A recoverable fault bound to the entry (or stream) that produced it.
///
/// Fault values live no longer than the callback invocation; callbacks that
/// need to keep them clone the fields out.
#[derive(Debug, Clone)]
pub struct EntryFault {
    hierarchy: PathHierarchy,
    message: String,
    errno: Option<i32>,
}

impl EntryFault {
    /// Creates a fault for the given hierarchy.
    pub fn new(hierarchy: PathHierarchy, message: impl Into<String>, errno: Option<i32>) -> Self {
        EntryFault {
            hierarchy,
            message: message.into(),
            errno,
        }
    }

    /// The best-known hierarchy of the offending entry or stream.
    pub fn hierarchy(&self) -> &PathHierarchy {
        &self.hierarchy
    }

    /// Human-readable description of the fault.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// OS error code, when the fault originated from an OS call.
    pub fn errno(&self) -> Option<i32> {
        self.errno
    }
}

/// Signature of a registered fault callback.
pub type FaultCallback = Arc<dyn Fn(&EntryFault) + Send + Sync>;

static FAULT_CALLBACK: RwLock<Option<FaultCallback>> = RwLock::new(None);

/// Registers the process-wide fault callback.
///
/// Passing `Some` replaces any previous callback; passing `None` clears the
/// slot. Registration is atomic with respect to concurrent fault emission.
pub fn register_fault_callback(callback: Option<FaultCallback>) {
    let mut slot = FAULT_CALLBACK.write().unwrap_or_else(|poisoned| {
        log::warn!("fault callback slot was poisoned, recovering");
        poisoned.into_inner()
    });
    *slot = callback;
}

/// Emits a fault to the registered callback, if any.
pub(crate) fn emit(fault: EntryFault) {
    log::debug!(
        "fault at '{}': {} (errno {:?})",
        fault.hierarchy().display(),
        fault.message(),
        fault.errno()
    );
    let slot = FAULT_CALLBACK.read().unwrap_or_else(|poisoned| {
        log::warn!("fault callback slot was poisoned, recovering");
        poisoned.into_inner()
    });
    if let Some(callback) = slot.as_ref() {
        callback(&fault);
    }
}

/// Emits a fault derived from an [`Error`], preserving its errno if present.
pub(crate) fn emit_error(hierarchy: &PathHierarchy, error: &Error) {
    emit(EntryFault::new(
        hierarchy.clone(),
        error.to_string(),
        error.raw_os_error(),
    ));
}
