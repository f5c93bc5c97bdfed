//! # arcwalk
//!
//! A streaming traversal engine for arbitrarily nested, password-protected,
//! and multi-volume archives, together with plain filesystem trees.
//!
//! Pass one or more *root paths* and receive a lazy sequence of *entries*.
//! When an entry is itself an archive, the traverser transparently descends
//! into it by streaming its payload directly into a new decoder — no
//! temporary extraction, no full buffering — then resumes the outer
//! traversal where it left off.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use arcwalk::{Traverser, TraverserOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let options = TraverserOptions::new()
//!         .metadata_key("size")
//!         .metadata_key("mtime");
//!
//!     for entry in Traverser::from_paths(["backup.tar.gz", "/srv/data"], options)? {
//!         let entry = entry?;
//!         println!(
//!             "{} depth={} {} bytes",
//!             entry.path_hierarchy().display(),
//!             entry.depth(),
//!             entry.size(),
//!         );
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Reading payloads
//!
//! Entries are *handles* into the traverser's current position: payload
//! reads stream bytes without copying, and a live entry is valid only
//! until the next iterator advance. To keep byte-level access around,
//! detach the entry — it reopens its hierarchy on demand:
//!
//! ```rust,no_run
//! use arcwalk::{Traverser, TraverserOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let traverser = Traverser::from_paths(["outer.zip"], TraverserOptions::default())?;
//!     let mut kept = Vec::new();
//!     for entry in traverser {
//!         let entry = entry?;
//!         if entry.is_file() && entry.path_hierarchy().display().ends_with(".bin") {
//!             kept.push(entry.detach());
//!         }
//!     }
//!     for detached in &mut kept {
//!         let bytes = detached.read_to_end()?;
//!         println!("{}: {} bytes", detached.path_hierarchy().display(), bytes.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Passphrases and formats
//!
//! Encrypted entries are tried against the configured passphrase list in
//! order; a miss is reported through the fault channel, never a panic or a
//! stopped traversal. The format allowlist accepts the standard registry
//! names (`7zip`, `ar`, `cab`, `cpio`, `empty`, `iso9660`, `lha`, `rar`,
//! `tar`, `warc`, `xar`, `zip`); this build decodes `tar`, `zip`, and
//! `empty` natively, with gzip and bzip2 filter peeling in front.
//!
//! ## Faults
//!
//! Recoverable data errors — unreadable file, corrupt header, passphrase
//! mismatch, CRC failure — are *faults*: they are delivered to the
//! process-wide callback registered with
//! [`register_fault_callback`] and traversal moves past the offending
//! entry. Only filesystem-walk failures and constructor argument errors
//! are fatal.
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `bzip2` | Yes | bzip2 filter peeling (`.tar.bz2`) |
//!
//! ## Concurrency
//!
//! A traverser, its cursor, and every live entry belong to one thread.
//! Distinct traversers are fully independent and may run in parallel. The
//! fault callback and the root stream factory are process-wide and must be
//! `Send + Sync`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cursor;
pub mod decoder;
pub mod error;
pub mod factory;
pub mod fault;
pub mod hierarchy;
pub mod metadata;
pub mod stream;
pub mod traverse;

pub use error::{Error, Result};

pub use hierarchy::{
    PartOrdering, PathEntry, PathHierarchy, make_multi_volume_path, make_single_path, natural_cmp,
};

// Re-export the traversal API at the crate root for convenience
pub use traverse::{DetachedEntry, Entry, TraverseIter, Traverser, TraverserOptions};

// Re-export metadata types used by entries
pub use metadata::{EntryKind, METADATA_KEYS, MetadataMap, MetadataValue};

// Re-export the process-wide registration points
pub use factory::{RootStreamFactory, register_root_stream_factory};
pub use fault::{EntryFault, FaultCallback, register_fault_callback};

// Re-export the stream contract for custom root streams
pub use stream::DataStream;

// Re-export the format registry for allowlist construction
pub use decoder::{KNOWN_FORMATS, is_known_format};
