//! Catalog of relation descriptors.
//!
//! The catalog file (`meta.db` by default) uses the same layout as a table
//! file: a meta root followed by a chain of meta pages. Each table is one
//! slotted record holding the table name, data file path, field count, kind
//! tag, key column, statistics, and one (name, index, length, type name)
//! quad per field. On open the whole chain is decoded into an in-memory
//! name map; creates append to the tail meta page and chain a fresh page
//! when the tail overflows.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::store::checksum;
use crate::store::constants::*;
use crate::store::datatype::{find_data_type, DataType};
use crate::store::file::DbFile;
use crate::store::page::{Block, BlockRef, Root, RootInfo};
use crate::store::record::Record;
use crate::{DbError, Result};

/// Descriptor of one field of a relation.
#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Type name, resolved against the data-type registry.
    pub type_name: String,
    /// Declared byte index.
    pub index: u64,
    /// Declared length; negative means variable with that maximum.
    pub length: i64,
}

impl FieldInfo {
    pub fn new(name: &str, type_name: &str, index: u64, length: i64) -> FieldInfo {
        FieldInfo {
            name: name.to_string(),
            type_name: type_name.to_string(),
            index,
            length,
        }
    }

    /// Resolve the runtime data-type handle from the type name.
    pub fn datatype(&self) -> Result<&'static DataType> {
        find_data_type(&self.type_name)
            .ok_or_else(|| DbError::Argument(format!("unknown type name: {}", self.type_name)))
    }
}

/// In-memory descriptor of one relation.
#[derive(Debug, Clone, Serialize)]
pub struct RelationInfo {
    /// Path of the data file.
    pub path: String,
    /// Declared field count; must match `fields.len()`.
    pub count: u16,
    /// Relation kind tag (reserved).
    pub kind: u16,
    /// Index of the key column.
    pub key: u32,
    /// Size statistic in bytes.
    pub size: u64,
    /// Row statistic.
    pub rows: u64,
    /// Field descriptors.
    pub fields: Vec<FieldInfo>,
}

impl RelationInfo {
    pub fn new(path: &str, key: u32, fields: Vec<FieldInfo>) -> RelationInfo {
        RelationInfo {
            path: path.to_string(),
            count: fields.len() as u16,
            kind: 0,
            key,
            size: 0,
            rows: 0,
            fields,
        }
    }
}

fn malformed(what: &str) -> DbError {
    DbError::Malformed(format!("catalog: {what}"))
}

fn read_cstr(bytes: &[u8]) -> Result<String> {
    match bytes.split_last() {
        Some((0, head)) => String::from_utf8(head.to_vec())
            .map_err(|_| malformed("string is not valid UTF-8")),
        _ => Err(malformed("string missing terminator")),
    }
}

fn cstr(s: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(s.len() + 1);
    v.extend_from_slice(s.as_bytes());
    v.push(0);
    v
}

fn read_exact<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| malformed("fixed field has wrong width"))
}

/// Serialize a named relation into the field vector of its catalog record.
fn descriptor_fields(table: &str, rel: &RelationInfo) -> Vec<Vec<u8>> {
    let mut parts = Vec::with_capacity(7 + 4 * rel.fields.len());
    parts.push(cstr(table));
    parts.push(cstr(&rel.path));
    parts.push(rel.count.to_be_bytes().to_vec());
    parts.push(rel.kind.to_be_bytes().to_vec());
    parts.push(rel.key.to_be_bytes().to_vec());
    parts.push(rel.size.to_be_bytes().to_vec());
    parts.push(rel.rows.to_be_bytes().to_vec());
    for field in &rel.fields {
        parts.push(cstr(&field.name));
        parts.push(field.index.to_be_bytes().to_vec());
        parts.push(field.length.to_be_bytes().to_vec());
        parts.push(cstr(&field.type_name));
    }
    parts
}

/// Decode one catalog record back into a named relation.
fn parse_descriptor(rec: Record<'_>) -> Result<(String, RelationInfo)> {
    let n = rec.field_count();
    if n < 7 || (n - 7) % 4 != 0 {
        return Err(malformed("descriptor has wrong field count"));
    }
    let (fields, _header) = rec.fields(n)?;

    let table = read_cstr(fields[0])?;
    let path = read_cstr(fields[1])?;
    let count = u16::from_be_bytes(read_exact(fields[2])?);
    let kind = u16::from_be_bytes(read_exact(fields[3])?);
    let key = u32::from_be_bytes(read_exact(fields[4])?);
    let size = u64::from_be_bytes(read_exact(fields[5])?);
    let rows = u64::from_be_bytes(read_exact(fields[6])?);

    let described = (n - 7) / 4;
    if count as usize != described {
        return Err(malformed("descriptor count disagrees with field entries"));
    }
    let mut infos = Vec::with_capacity(described);
    for i in 0..described {
        let base = 7 + i * 4;
        infos.push(FieldInfo {
            name: read_cstr(fields[base])?,
            index: u64::from_be_bytes(read_exact(fields[base + 1])?),
            length: i64::from_be_bytes(read_exact(fields[base + 2])?),
            type_name: read_cstr(fields[base + 3])?,
        });
    }

    Ok((table, RelationInfo { path, count, kind, key, size, rows, fields: infos }))
}

/// The table space: every relation known to one catalog file.
pub struct Schema {
    file: DbFile,
    tablespace: BTreeMap<String, RelationInfo>,
    buf: Vec<u8>,
    tail_block: u32,
}

impl Schema {
    /// Open a catalog file, creating the meta root and the first meta page
    /// when the file is empty, and load every descriptor into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Schema> {
        let mut file = DbFile::open(path)?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        let mut tablespace = BTreeMap::new();
        let mut tail_block = 1;

        if file.length()? == 0 {
            let mut root_buf = vec![0u8; ROOT_SIZE];
            {
                let mut root = Root::new(&mut root_buf);
                root.clear(KIND_META);
                root.set_head(1);
                root.sign();
            }
            {
                let mut block = Block::new(&mut buf);
                block.clear_meta(1);
                block.set_next_id(NULL_BLOCK);
                block.sign();
            }
            file.write_at(block_offset(1), &buf)?;
            file.write_at(0, &root_buf)?;
        } else {
            let mut root_buf = vec![0u8; ROOT_SIZE];
            file.read_at(0, &mut root_buf)?;
            if !checksum::verify(&root_buf) {
                return Err(DbError::Io("meta root checksum mismatch".into()));
            }
            let info = RootInfo::parse(&root_buf).ok_or_else(|| malformed("bad meta root"))?;

            let mut id = info.head;
            while id != NULL_BLOCK {
                file.read_at(block_offset(id), &mut buf)?;
                if !checksum::verify(&buf) {
                    return Err(DbError::Io(format!("meta page {id} checksum mismatch")));
                }
                let next = {
                    let view = BlockRef::new(&buf);
                    if !view.magic_ok() {
                        return Err(malformed("meta page missing magic"));
                    }
                    for i in 0..view.slot_count() as usize {
                        let (table, rel) = parse_descriptor(view.record(i))?;
                        tablespace.insert(table, rel);
                    }
                    view.next_id()
                };
                tail_block = id;
                id = next;
            }
        }

        Ok(Schema { file, tablespace, buf, tail_block })
    }

    /// Register a new table and persist its descriptor.
    pub fn create(&mut self, table: &str, rel: RelationInfo) -> Result<()> {
        if rel.count as usize != rel.fields.len() {
            return Err(DbError::Argument(format!(
                "declared {} fields but {} descriptors supplied",
                rel.count,
                rel.fields.len()
            )));
        }
        if rel.key as usize >= rel.fields.len() {
            return Err(DbError::Argument("key column out of range".into()));
        }
        for field in &rel.fields {
            field.datatype()?;
        }
        if self.tablespace.contains_key(table) {
            return Err(DbError::AlreadyExists(table.to_string()));
        }

        let parts = descriptor_fields(table, &rel);
        let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();

        let fitted = {
            let mut block = Block::new(&mut self.buf);
            if block.allocate(0, &refs) {
                let tables = block.as_ref().kind_count();
                block.set_kind_count(tables + 1);
                block.sign();
                true
            } else {
                false
            }
        };

        if fitted {
            self.file.write_at(block_offset(self.tail_block), &self.buf)?;
        } else {
            self.chain_meta_page(&refs)?;
        }

        self.tablespace.insert(table.to_string(), rel);
        Ok(())
    }

    /// Start a fresh meta page holding `refs`, link it behind the current
    /// tail, and persist the bumped block count. Writes go children first:
    /// the new page, then the old tail, then the root.
    fn chain_meta_page(&mut self, refs: &[&[u8]]) -> Result<()> {
        let mut root_buf = vec![0u8; ROOT_SIZE];
        self.file.read_at(0, &mut root_buf)?;
        if !checksum::verify(&root_buf) {
            return Err(DbError::Io("meta root checksum mismatch".into()));
        }
        let info = RootInfo::parse(&root_buf).ok_or_else(|| malformed("bad meta root"))?;
        // The first meta page predates count tracking, so it may read zero.
        let new_id = info.block_count.max(self.tail_block) + 1;

        let mut new_buf = vec![0u8; BLOCK_SIZE];
        {
            let mut block = Block::new(&mut new_buf);
            block.clear_meta(new_id);
            block.set_next_id(NULL_BLOCK);
            if !block.allocate(0, refs) {
                return Err(DbError::Capacity);
            }
            block.set_kind_count(1);
            block.sign();
        }
        self.file.write_at(block_offset(new_id), &new_buf)?;

        {
            let mut tail = Block::new(&mut self.buf);
            tail.set_next_id(new_id);
            tail.sign();
        }
        self.file.write_at(block_offset(self.tail_block), &self.buf)?;

        {
            let mut root = Root::new(&mut root_buf);
            root.set_block_count(new_id);
            root.sign();
        }
        self.file.write_at(0, &root_buf)?;

        self.buf = new_buf;
        self.tail_block = new_id;
        Ok(())
    }

    /// Find a relation by table name.
    pub fn lookup(&self, table: &str) -> Option<&RelationInfo> {
        self.tablespace.get(table)
    }

    /// Open the data file behind a relation.
    pub fn load(&self, table: &str) -> Result<DbFile> {
        let rel = self.lookup(table).ok_or(DbError::NotFound)?;
        DbFile::open(&rel.path)
    }

    /// Iterate all known relations in name order.
    pub fn tables(&self) -> impl Iterator<Item = (&String, &RelationInfo)> {
        self.tablespace.iter()
    }

    /// Close the catalog and delete its file.
    pub fn destroy(self) -> Result<()> {
        let path = self.file.path().to_path_buf();
        drop(self.file);
        DbFile::remove(path)
    }
}

/// Open the default catalog file.
pub fn db_initialize() -> Result<Schema> {
    Schema::open(META_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::write_record;

    fn sample_relation() -> RelationInfo {
        RelationInfo::new(
            "tablee.dat",
            0,
            vec![
                FieldInfo::new("id", "BIGINT", 0, 8),
                FieldInfo::new("phone", "CHAR", 1, 20),
                FieldInfo::new("name", "VARCHAR", 2, -255),
            ],
        )
    }

    #[test]
    fn test_descriptor_round_trip() {
        let rel = sample_relation();
        let parts = descriptor_fields("tablee", &rel);
        assert_eq!(parts.len(), 7 + 4 * 3);

        let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
        let mut buf = vec![0u8; 1024];
        write_record(&mut buf, &refs, 0).unwrap();

        let (table, parsed) = parse_descriptor(Record::new(&buf)).unwrap();
        assert_eq!(table, "tablee");
        assert_eq!(parsed.path, "tablee.dat");
        assert_eq!(parsed.count, 3);
        assert_eq!(parsed.key, 0);
        assert_eq!(parsed.fields[0].name, "id");
        assert_eq!(parsed.fields[0].type_name, "BIGINT");
        assert_eq!(parsed.fields[1].length, 20);
        assert_eq!(parsed.fields[2].length, -255);
        assert_eq!(parsed.fields[2].type_name, "VARCHAR");
    }

    #[test]
    fn test_cstr_round_trip() {
        assert_eq!(read_cstr(&cstr("meta.db")).unwrap(), "meta.db");
        assert!(read_cstr(b"no-terminator").is_err());
        assert!(read_cstr(b"").is_err());
    }

    #[test]
    fn test_create_rejects_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut schema = Schema::open(dir.path().join("meta.db")).unwrap();
        let mut rel = sample_relation();
        rel.count = 5;
        assert!(matches!(schema.create("bad", rel), Err(DbError::Argument(_))));
    }

    #[test]
    fn test_create_rejects_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let mut schema = Schema::open(dir.path().join("meta.db")).unwrap();
        let mut rel = sample_relation();
        rel.fields[1].type_name = "DECIMAL".into();
        assert!(matches!(schema.create("bad", rel), Err(DbError::Argument(_))));
    }

    #[test]
    fn test_create_rejects_key_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut schema = Schema::open(dir.path().join("meta.db")).unwrap();
        let mut rel = sample_relation();
        rel.key = 3;
        assert!(matches!(schema.create("bad", rel), Err(DbError::Argument(_))));
    }
}
