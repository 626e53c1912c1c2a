//! Write buffer reused across every iteration of the loop.
//!
//! The buffer is allocated once, filled with `\r`, and the iteration index text
//! is copied over its start before each write.

use std::io::Write;

/// Minimum allocation, also large enough for any rendered iteration index.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Byte the buffer is pre-filled with.
pub const FILLER: u8 = b'\r';

/// Payload could not be rendered into the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadOverflow {
    pub iteration: u32,
    pub capacity: usize,
}

impl std::fmt::Display for PayloadOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "iteration index {} does not fit in a {}-byte write buffer",
            self.iteration, self.capacity
        )
    }
}

impl std::error::Error for PayloadOverflow {}

#[derive(Debug)]
pub struct WriteBuffer {
    data: Vec<u8>,
    block_size: usize,
}

impl WriteBuffer {
    /// Allocate a buffer of `max(block_size, DEFAULT_BLOCK_SIZE)` filler bytes.
    ///
    /// A `block_size` of 0 selects text mode, where each payload is just the
    /// iteration index followed by a newline.
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![FILLER; block_size.max(DEFAULT_BLOCK_SIZE)],
            block_size,
        }
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Render `iteration` at the start of the buffer and return the bytes to write.
    ///
    /// No NUL terminator follows the index text; in block mode the next byte is
    /// filler.
    pub fn payload(&mut self, iteration: u32) -> Result<&[u8], PayloadOverflow> {
        let capacity = self.data.len();
        let mut cursor = &mut self.data[..];
        writeln!(cursor, "{iteration}").map_err(|_| PayloadOverflow {
            iteration,
            capacity,
        })?;
        let text_len = capacity - cursor.len();

        let len = if self.block_size == 0 {
            text_len
        } else {
            self.block_size
        };
        Ok(&self.data[..len])
    }
}
