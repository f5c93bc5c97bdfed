//! The `empty` format: a zero-byte stream decodes to zero entries.

use crate::Result;
use crate::decoder::{Decoder, EntryHeader};

/// Decoder for zero-byte input. Yields no entries and no faults.
pub struct EmptyDecoder {
    _private: (),
}

impl EmptyDecoder {
    pub fn new() -> Self {
        EmptyDecoder { _private: () }
    }
}

impl Decoder for EmptyDecoder {
    fn format_name(&self) -> &'static str {
        super::detect::FORMAT_EMPTY
    }

    fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        Ok(None)
    }

    fn read_data(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn skip_data(&mut self) -> Result<()> {
        Ok(())
    }
}
