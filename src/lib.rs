//! Paged slotted-record storage engine.
//!
//! The `slotdb` crate implements a single-node record store: a persistent
//! file holds a 4 KiB root page followed by an array of 16 KiB block pages.
//! Each block keeps variable-length records in a slotted layout ordered by a
//! key column, blocks are chained in key order, and a catalog file (`meta.db`
//! by default) describes every table using the same slotted-record format.
//!
//! # Quick example
//!
//! ```no_run
//! use slotdb::store::schema::{FieldInfo, RelationInfo, Schema};
//! use slotdb::store::table::Table;
//!
//! // Open (or create) the catalog and register a table.
//! let mut schema = Schema::open("meta.db").unwrap();
//! let rel = RelationInfo::new(
//!     "people.db",
//!     0,
//!     vec![
//!         FieldInfo::new("id", "BIGINT", 0, 8),
//!         FieldInfo::new("name", "VARCHAR", 1, -255),
//!     ],
//! );
//! schema.create("people", rel).unwrap();
//!
//! // Insert a row and scan it back in key order.
//! let mut table = Table::open(&schema, "people").unwrap();
//! let id = 7i64.to_be_bytes();
//! table.insert(0, &[id.as_slice(), b"Ada\0".as_slice()]).unwrap();
//! table
//!     .for_each_record(|rec| {
//!         println!("{} fields", rec.field_count());
//!         Ok(true)
//!     })
//!     .unwrap();
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store::constants`] | Page sizes, header offsets, magic values |
//! | [`store::codec`] | Variable-length integer codec and alignment helpers |
//! | [`store::checksum`] | Additive 32-bit page checksum (sign/verify) |
//! | [`store::datatype`] | SQL data-type registry with compare/copy |
//! | [`store::record`] | Record codec: length prefix, offset array, payloads |
//! | [`store::page`] | Root and block page views, slotted allocator |
//! | [`store::file`] | Positional file I/O |
//! | [`store::schema`] | Catalog of relation descriptors on meta pages |
//! | [`store::table`] | Ordered page chain: insert, remove, update, scans |
//! | [`store::export`] | JSON summaries and hex dumps for inspection |

pub mod store;
pub mod util;

use thiserror::Error;

/// Errors returned by `slotdb` operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// An I/O error occurred, including a page whose checksum does not
    /// verify (such a page is never interpreted).
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed binary data: bad length prefix, an offset overflowing the
    /// buffer, or a field-count mismatch.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// An invalid argument was supplied (arity mismatch, unknown type name).
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A table with the same name is already in the catalog.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The requested key or table is absent.
    #[error("not found")]
    NotFound,

    /// The record does not fit in a page.
    #[error("record does not fit in page")]
    Capacity,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DbError>;
