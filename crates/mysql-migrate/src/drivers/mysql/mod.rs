//! MySQL / MariaDB driver.
//!
//! - [`MysqlReader`]: source reads through SQLx
//! - [`MysqlWriter`]: target writes through mysql_async
//! - [`MysqlConnector`]: opens both per database and runs server-level
//!   statements (database existence, creation, lookup queries)
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod connector;
pub mod dialect;
mod reader;
mod writer;

pub use connector::MysqlConnector;
pub use reader::MysqlReader;
pub use writer::MysqlWriter;
