//! File-backed persistence for leadpipe.
//!
//! The [`LeadCache`] keeps every lead already handed to the external store,
//! keyed by a [`fingerprint`] of name and city, so repeated runs skip them
//! before any paid enrichment happens.
//!
//! All writes go through [`write_json_atomic`]: the whole document is
//! rewritten to a sibling temp file and renamed into place.

mod cache;
mod fs;

pub use cache::{CacheEntry, CacheStats, LeadCache, fingerprint};
pub use fs::write_json_atomic;
