//! Blake3 request fingerprints for content-addressed response caching
//!
//! Every field is fed as `tag ‖ len (u64 LE) ‖ bytes`, in a fixed order:
//! prompt, system prompt, attachments (in sequence), max output tokens.
//! The length prefix keeps `("ab", "c")` and `("a", "bc")` apart.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

const TAG_PROMPT: u8 = b'p';
const TAG_SYSTEM_PROMPT: u8 = b's';
const TAG_ATTACHMENT: u8 = b'a';
const TAG_MAX_OUTPUT_TOKENS: u8 = b'm';

/// Fixed-length digest identifying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Full 64-char hex form, used as the cache filename.
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// First 8 hex characters, for display.
    pub fn short(&self) -> String {
        self.0.to_hex()[..8].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = blake3::HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        blake3::Hash::from_hex(s).map(Self)
    }
}

/// Incremental builder for a [`Fingerprint`].
///
/// Callers feed fields in request order; optional fields that are absent
/// are simply skipped.
#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    hasher: blake3::Hasher,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(&mut self, prompt: &str) -> &mut Self {
        self.field(TAG_PROMPT, prompt.as_bytes())
    }

    pub fn system_prompt(&mut self, system_prompt: &str) -> &mut Self {
        self.field(TAG_SYSTEM_PROMPT, system_prompt.as_bytes())
    }

    pub fn attachment_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.field(TAG_ATTACHMENT, data)
    }

    /// Hash the remainder of a seekable stream as one attachment.
    ///
    /// The stream position is restored afterwards, so whoever reads the
    /// stream next sees the same bytes as if it had never been hashed.
    pub fn attachment_reader<R: Read + Seek>(&mut self, reader: &mut R) -> io::Result<&mut Self> {
        let start = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(start))?;

        self.header(TAG_ATTACHMENT, end.saturating_sub(start));
        let copied = io::copy(reader, &mut self.hasher);
        reader.seek(SeekFrom::Start(start))?;

        let copied = copied?;
        if copied != end.saturating_sub(start) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("attachment changed while hashing ({copied} of {} bytes)", end - start),
            ));
        }
        Ok(self)
    }

    /// Hash a file's contents as one attachment (memory-mapped when large).
    ///
    /// Fails if the file's size changes while it is being hashed.
    pub fn attachment_file(&mut self, path: &Path) -> io::Result<&mut Self> {
        let len = std::fs::metadata(path)?.len();
        self.header(TAG_ATTACHMENT, len);
        self.hasher.update_mmap(path)?;

        let after = std::fs::metadata(path)?.len();
        if after != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("attachment changed while hashing ({len} -> {after} bytes)"),
            ));
        }
        Ok(self)
    }

    pub fn max_output_tokens(&mut self, max_output_tokens: u32) -> &mut Self {
        self.field(TAG_MAX_OUTPUT_TOKENS, max_output_tokens.to_string().as_bytes())
    }

    pub fn finish(&self) -> Fingerprint {
        Fingerprint(self.hasher.finalize())
    }

    fn field(&mut self, tag: u8, data: &[u8]) -> &mut Self {
        self.header(tag, data.len() as u64);
        self.hasher.update(data);
        self
    }

    fn header(&mut self, tag: u8, len: u64) {
        self.hasher.update(&[tag]);
        self.hasher.update(&len.to_le_bytes());
    }
}
