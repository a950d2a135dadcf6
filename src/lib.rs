//! rawtoevent library - turns raw binary KUtrace blocks into ASCII event
//! listings.
//!
//! The main work is turning truncated 20-bit cycle times into multiples of
//! 10 ns. Blocks arrive as 8192 little-endian u64 words; the decoder
//! calibrates a cycles-to-time mapping from the first block, reconstructs
//! full timestamps entry by entry, and emits one text line per event for
//! downstream span reconstruction.
//!
//! # Modules
//!
//! - [`block`] - 64 KiB block reading and header/preamble extraction
//! - [`time`] - cycle-counter calibration and wrap/late-store arithmetic
//! - [`events`] - event-code constants, range predicates, name tables
//! - [`names`] - the append-only name table and string fixups
//! - [`output`] - event/name line formatting and stream pragmas
//! - [`decode`] - the per-block decode loop and run driver

pub mod block;
pub mod decode;
pub mod events;
pub mod names;
pub mod output;
pub mod time;

// Re-export for convenience
pub use decode::{DecodeOptions, DecodeStats, Decoder};
