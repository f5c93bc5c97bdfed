//! Error types for archive traversal.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when traversing archives and filesystem trees, along with
//! a convenient [`Result<T>`] type alias.
//!
//! # Recoverable vs. fatal
//!
//! Most data-level problems (unreadable stream, corrupt header, wrong
//! passphrase) are *recoverable*: the traverser reports them through the
//! fault callback and moves on to the next entry. The variants below still
//! exist so that the offending call site gets a typed error; whether an
//! error aborts anything is decided by the traversal policy, not by the
//! error type.
//!
//! Two kinds of errors are always fatal to the call that produced them:
//!
//! - argument errors ([`InvalidOptions`][Error::InvalidOptions],
//!   [`InvalidHierarchy`][Error::InvalidHierarchy]) raised by constructors;
//! - programmer errors ([`StaleEntry`][Error::StaleEntry]) raised when an
//!   entry handle is used after the iterator moved past it.
//!
//! # Example
//!
//! ```rust,no_run
//! use arcwalk::{Error, Traverser, TraverserOptions};
//!
//! fn walk(root: &str) -> arcwalk::Result<()> {
//!     let traverser = Traverser::from_paths([root], TraverserOptions::default())?;
//!     for entry in traverser {
//!         match entry {
//!             Ok(e) => println!("{}", e.path_hierarchy().display()),
//!             // Only filesystem-walk failures are fatal mid-iteration.
//!             Err(Error::Walk(e)) => return Err(Error::Walk(e)),
//!             Err(e) => return Err(e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

/// The main error type for archive traversal operations.
///
/// | Category | Variants | Typical cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | File system operations |
/// | Format | [`InvalidFormat`][Self::InvalidFormat], [`UnsupportedFormat`][Self::UnsupportedFormat] | Invalid or unrecognized archive data |
/// | Security | [`PassphraseRequired`][Self::PassphraseRequired], [`WrongPassphrase`][Self::WrongPassphrase] | Encrypted entries |
/// | Integrity | [`CrcMismatch`][Self::CrcMismatch] | Data corruption |
/// | Traversal | [`EntryNotFound`][Self::EntryNotFound], [`Walk`][Self::Walk] | Stream re-open, directory walk |
/// | Misuse | [`StaleEntry`][Self::StaleEntry], [`InvalidOptions`][Self::InvalidOptions], [`InvalidHierarchy`][Self::InvalidHierarchy] | Caller errors |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading a stream or the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive data is invalid, truncated, or not recognized.
    ///
    /// The string describes what was expected versus what was found, and is
    /// the message surfaced through the fault channel when a decoder gives
    /// up on a level.
    #[error("Invalid archive data: {0}")]
    InvalidFormat(String),

    /// The entry uses a format or encoding this build cannot decode.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Name of the format or encoding that is not supported.
        format: String,
    },

    /// An entry is encrypted and no passphrase was configured.
    #[error("Entry '{entry}' is encrypted and no passphrase was supplied")]
    PassphraseRequired {
        /// Name of the encrypted entry.
        entry: String,
    },

    /// None of the configured passphrases decrypts the entry.
    #[error("No configured passphrase matches entry '{entry}'")]
    WrongPassphrase {
        /// Name of the encrypted entry.
        entry: String,
    },

    /// The decompressed payload fails its stored checksum.
    ///
    /// Besides plain corruption this is how a wrong passphrase that slipped
    /// past the cheap header check is ultimately detected.
    #[error("CRC mismatch for entry '{entry}': expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// Name of the entry that failed verification.
        entry: String,
        /// Checksum stored in the archive.
        expected: u32,
        /// Checksum computed over the decompressed payload.
        actual: u32,
    },

    /// A parent archive no longer contains the requested entry.
    ///
    /// Raised when a payload stream re-opens itself (rewind, detached
    /// read) and the scan through the parent's headers comes up empty.
    #[error("Parent archive does not contain requested stream part '{name}'")]
    EntryNotFound {
        /// Entry name that was requested.
        name: String,
    },

    /// Seek was requested on a stream that does not advertise it.
    #[error("Stream does not support seeking")]
    SeekUnsupported,

    /// An entry handle was used after the iterator advanced past it.
    ///
    /// This is a programmer error: live entries are only valid until the
    /// next iterator step. Detach the entry to keep byte-level access.
    #[error("Entry is no longer live; detach it before advancing the iterator")]
    StaleEntry,

    /// Traverser construction was given invalid options.
    ///
    /// Covers empty root lists, unknown metadata keys, and unknown format
    /// names in the allowlist.
    #[error("Invalid traverser options: {0}")]
    InvalidOptions(String),

    /// A path hierarchy is malformed for the requested operation.
    #[error("Invalid path hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Filesystem directory enumeration failed.
    ///
    /// Unlike stream and decoder errors this is fatal to the traversal:
    /// the iterator yields it and stops.
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Error {
    /// Returns the OS error code associated with this error, if any.
    ///
    /// Used when constructing [`EntryFault`](crate::EntryFault) values so
    /// callbacks can report `errno` alongside the message.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e) => e.raw_os_error(),
            Error::Walk(e) => e.io_error().and_then(io::Error::raw_os_error),
            _ => None,
        }
    }
}

/// A specialized `Result` type for traversal operations.
pub type Result<T> = std::result::Result<T, Error>;
