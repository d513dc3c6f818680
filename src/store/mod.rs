//! On-disk format and storage engine.
//!
//! This module contains the page-level binary format (headers, slotted
//! records, checksums) and the engine built on top of it: the catalog of
//! relation descriptors and the table operations (insert, remove, update,
//! ordered scans).
//!
//! Start with [`schema::Schema`] to open the catalog, then use
//! [`table::Table`] to operate on an individual table file.

pub mod checksum;
pub mod codec;
pub mod constants;
pub mod datatype;
pub mod export;
pub mod file;
pub mod page;
pub mod record;
pub mod schema;
pub mod table;
pub mod timestamp;
