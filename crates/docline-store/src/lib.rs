//! docline-store: Content-addressed response cache
//!
//! Requests are reduced to a blake3 [`Fingerprint`]; responses are stored
//! under that fingerprint with a temp-write + rename protocol so a reader
//! never sees a partial file.

pub mod cache;
pub mod fingerprint;

pub use cache::{CacheEntry, EMPTY_RESPONSE_PLACEHOLDER, ResponseCache};
pub use fingerprint::{Fingerprint, Fingerprinter};
