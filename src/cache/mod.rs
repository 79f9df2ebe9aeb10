//! Shared compiled-unit cache
//!
//! The process-wide tier: immutable compiled units keyed by logical
//! path, each with the freshness metadata that decides whether a stat is
//! even worth doing.
//!
//! # Freshness
//!
//! | State | Meaning |
//! |---------|----------------------------------------------------------|
//! | Fresh   | Entry trusted; within the reload window no I/O happened  |
//! | Stale   | Backing resource's timestamp changed; recompile          |
//! | Missing | No entry for this key yet; compile                       |
//!
//! Entries are replaced wholesale on recompile. Only the last-checked
//! stamp mutates in place, so readers never observe a half-updated unit.

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, Freshness};
pub use store::UnitCache;
