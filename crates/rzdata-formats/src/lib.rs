//! File format parsers and builders for rzdata archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
//! An rzdata archive is one index file (`data.000`) describing where every
//! asset lives, plus eight shard files (`data.001` .. `data.008`) holding the
//! payload bytes. This crate handles the index side: a symmetric parser and
//! builder for `data.000` and the in-memory [`index::DataIndex`] with its
//! lookup and ordering helpers.
//!
//! # Design Principles
//!
//! - **Symmetric Operations**: Both parsing and building supported
//! - **Byte Compatibility**: Output is readable by the game client
//! - **Round-Trip Guarantee**: parse(build(index)) yields the same records

#![warn(missing_docs)]

/// Index file (`data.000`) support
///
/// Key features:
/// - **Continuous Keystream**: One XOR stream spans the whole file
/// - **Self-Delimiting Records**: No header or count; records run to EOF
/// - **Lazy Name Decoding**: Hash names are decoded only when asked for
/// - **O(1) Lookup**: Name to position table, first duplicate wins
pub mod index;

pub use index::{DataIndex, IndexEntry, IndexError, SortOrder};
