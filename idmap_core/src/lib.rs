//! In-memory indices from integer ids to fixed-size values.
//!
//! [`DenseIndex`] stores one slot per possible id and is the right choice
//! when most ids in a small range are present. [`SparseIndex`] stores
//! `(id, value)` pairs and needs memory proportional to the number of
//! entries, at the cost of an explicit sort before lookups. Both can dump
//! their backing array as a raw memory image and reload it from a file.

pub mod dense;
pub mod element;
pub mod error;
pub mod image;
pub mod map;
pub mod sparse;

pub use dense::DenseIndex;
pub use element::{Element, EmptyValue, Entry, Id, Location};
pub use error::{Error, Result};
pub use map::{AnyIndex, IdMap, IndexKind};
pub use sparse::{SortedSparseIndex, SparseIndex};
