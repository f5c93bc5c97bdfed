//! Traverser configuration.

use std::collections::BTreeSet;

use crate::decoder::{DecoderOptions, detect};
use crate::metadata;
use crate::{Error, Result};

/// Options controlling a traversal.
///
/// Values are snapshotted when the traverser is constructed; mutating an
/// options value afterwards has no effect on a running traversal.
///
/// # Example
///
/// ```
/// use arcwalk::TraverserOptions;
///
/// let options = TraverserOptions::new()
///     .passphrase("first-candidate")
///     .passphrase("second-candidate")
///     .format("tar")
///     .format("zip")
///     .metadata_key("size")
///     .metadata_key("mtime")
///     .descend_archives(true);
/// ```
#[derive(Debug, Clone)]
pub struct TraverserOptions {
    passphrases: Vec<String>,
    formats: Vec<String>,
    metadata_keys: BTreeSet<String>,
    descend_archives: bool,
}

impl Default for TraverserOptions {
    fn default() -> Self {
        TraverserOptions {
            passphrases: Vec::new(),
            formats: Vec::new(),
            metadata_keys: BTreeSet::new(),
            descend_archives: true,
        }
    }
}

impl TraverserOptions {
    /// Creates the default options: descend into archives, no passphrases,
    /// every supported format, no metadata capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a candidate passphrase. Candidates are tried in insertion
    /// order against each encrypted entry.
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrases.push(passphrase.into());
        self
    }

    /// Replaces the passphrase list.
    pub fn passphrases<I, S>(mut self, passphrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passphrases = passphrases.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a format name to the allowlist. An empty allowlist permits
    /// every supported format.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.formats.push(format.into());
        self
    }

    /// Replaces the format allowlist.
    pub fn formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formats = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a metadata key to capture per entry.
    pub fn metadata_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_keys.insert(key.into());
        self
    }

    /// Replaces the captured metadata key set.
    pub fn metadata_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the default descent flag of yielded entries (default `true`).
    pub fn descend_archives(mut self, descend: bool) -> Self {
        self.descend_archives = descend;
        self
    }

    /// The configured passphrase candidates.
    pub fn passphrase_list(&self) -> &[String] {
        &self.passphrases
    }

    /// The configured format allowlist.
    pub fn format_list(&self) -> &[String] {
        &self.formats
    }

    /// The configured metadata keys.
    pub fn metadata_key_set(&self) -> &BTreeSet<String> {
        &self.metadata_keys
    }

    /// The default descent flag.
    pub fn descend_archives_default(&self) -> bool {
        self.descend_archives
    }

    /// Validates format names and metadata keys against the known sets.
    ///
    /// Typos fail here, at construction time, instead of silently
    /// capturing nothing during the traversal.
    pub(crate) fn validate(&self) -> Result<()> {
        for format in &self.formats {
            if !detect::is_known_format(format) {
                return Err(Error::InvalidOptions(format!(
                    "unknown format name '{format}'"
                )));
            }
        }
        for key in &self.metadata_keys {
            if !metadata::is_known_metadata_key(key) {
                return Err(Error::InvalidOptions(format!(
                    "unknown metadata key '{key}'"
                )));
            }
        }
        Ok(())
    }

    /// Snapshot handed to decoders.
    pub(crate) fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            passphrases: self.passphrases.clone(),
            formats: self.formats.clone(),
            metadata_keys: self.metadata_keys.clone(),
        }
    }
}
