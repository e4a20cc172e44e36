//! Database driver implementations.
//!
//! Each driver implements the core traits ([`SourceReader`],
//! [`TargetWriter`], [`Connector`]) for one engine. Only MySQL-compatible
//! servers are supported on either side.
//!
//! [`SourceReader`]: crate::core::SourceReader
//! [`TargetWriter`]: crate::core::TargetWriter
//! [`Connector`]: crate::core::Connector

pub mod mysql;

pub use mysql::{MysqlConnector, MysqlReader, MysqlWriter};
