//! Core abstractions shared by planning, transfer, and drivers.
//!
//! - [`schema`]: Table, column, and foreign-key metadata types
//! - [`value`]: Owned row values and batches
//! - [`traits`]: Reader, writer, and connector seams
//! - [`identifier`]: Identifier validation and quoting
//!
//! The core module knows nothing about MySQL wire details; the
//! `drivers::mysql` module implements the traits, and tests implement
//! them in memory.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Column, ForeignKeyEdge, Table};
pub use traits::{Connector, LookupResult, ReadOptions, SourceReader, TargetWriter};
pub use value::{Batch, SqlValue};
