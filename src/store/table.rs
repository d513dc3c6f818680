//! Table engine.
//!
//! A [`Table`] binds a relation descriptor to its data file and owns a
//! single page-sized scratch buffer; every page read lands in that buffer
//! and every mutation rewrites it in place before persisting. Pages form a
//! singly-linked chain in key order: insertion locates the page whose key
//! range covers the new key, splits the page in half when it overflows, and
//! keeps each page's slot directory sorted by the key column.

use std::cmp::Ordering;

use crate::store::codec::align8;
use crate::store::constants::*;
use crate::store::datatype::DataType;
use crate::store::file::DbFile;
use crate::store::page::{Block, BlockRef, Root, RootInfo};
use crate::store::record::Record;
use crate::store::schema::{RelationInfo, Schema};
use crate::{DbError, Result};

/// Orders slot entries by the key column of the records they point at.
/// Carries the page buffer so the comparison can dereference offsets.
struct KeyOrder<'a> {
    page: &'a [u8],
    key: usize,
    ty: &'static DataType,
}

impl KeyOrder<'_> {
    fn key_at(&self, off: u16) -> Result<&[u8]> {
        let off = (off as usize).min(BLOCK_CHECKSUM);
        Record::new(&self.page[off..BLOCK_CHECKSUM]).field(self.key)
    }

    fn ordering(&self, a: u16, b: u16) -> Ordering {
        match (self.key_at(a), self.key_at(b)) {
            (Ok(x), Ok(y)) => {
                if self.ty.less(x, y) {
                    Ordering::Less
                } else if self.ty.less(y, x) {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            }
            // Unreachable on checksum-verified pages; keep the sort total.
            _ => Ordering::Equal,
        }
    }
}

/// Sort the slot directory of the page in `buf` by the key column.
fn sort_slots(buf: &mut [u8], key: usize, ty: &'static DataType) {
    let n = BlockRef::new(buf).slot_count() as usize;
    if n < 2 {
        return;
    }
    let mut slots: Vec<u16> = {
        let view = BlockRef::new(buf);
        (0..n).map(|i| view.slot(i)).collect()
    };
    {
        let order = KeyOrder { page: &*buf, key, ty };
        slots.sort_by(|&a, &b| order.ordering(a, b));
    }
    let mut block = Block::new(buf);
    for (i, off) in slots.iter().enumerate() {
        block.set_slot(i, *off);
    }
}

/// One open table.
pub struct Table {
    name: String,
    rel: RelationInfo,
    file: DbFile,
    buf: Vec<u8>,
}

impl Table {
    /// Register a new table in the catalog.
    pub fn create(schema: &mut Schema, name: &str, rel: RelationInfo) -> Result<()> {
        schema.create(name, rel)
    }

    /// Open a table known to the catalog.
    pub fn open(schema: &Schema, name: &str) -> Result<Table> {
        let rel = schema.lookup(name).ok_or(DbError::NotFound)?.clone();
        let file = DbFile::open(&rel.path)?;
        Ok(Table {
            name: name.to_string(),
            rel,
            file,
            buf: vec![0u8; BLOCK_SIZE],
        })
    }

    /// Table name as registered in the catalog.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The relation descriptor this table was opened with.
    pub fn relation(&self) -> &RelationInfo {
        &self.rel
    }

    /// Close the table, releasing the file handle.
    pub fn close(self) {}

    /// Close the table and delete its data file.
    pub fn destroy(self) -> Result<()> {
        let Table { rel, file, .. } = self;
        drop(file);
        DbFile::remove(&rel.path)
    }

    /// Ensure the data file is initialized: an empty file gets a root
    /// (head = 1, one block) and an empty first data page; otherwise the
    /// head page is loaded into the scratch buffer.
    pub fn initial(&mut self) -> Result<()> {
        if self.file.length()? == 0 {
            let mut root_buf = vec![0u8; ROOT_SIZE];
            {
                let mut root = Root::new(&mut root_buf);
                root.clear(KIND_DATA);
                root.set_head(1);
                root.set_block_count(1);
                root.sign();
            }
            {
                let mut block = Block::new(&mut self.buf);
                block.clear_data(1);
                block.set_next_id(NULL_BLOCK);
                block.sign();
            }
            self.file.write_at(block_offset(1), &self.buf)?;
            self.file.write_at(0, &root_buf)?;
        } else {
            let info = self.read_root()?;
            self.load_block(info.head)?;
        }
        Ok(())
    }

    /// Number of block pages in the file.
    pub fn block_count(&mut self) -> Result<u32> {
        self.initial()?;
        Ok(self.read_root()?.block_count)
    }

    /// Sum of per-page row counts across the chain.
    pub fn row_count(&mut self) -> Result<u64> {
        let mut total = 0u64;
        let mut cursor = self.blocks()?;
        while cursor.valid() {
            total += u64::from(cursor.block().kind_count());
            cursor.advance()?;
        }
        Ok(total)
    }

    // ── page I/O ────────────────────────────────────────────────────

    fn read_root_buf(&mut self) -> Result<Vec<u8>> {
        let mut root_buf = vec![0u8; ROOT_SIZE];
        self.file.read_at(0, &mut root_buf)?;
        if !crate::store::checksum::verify(&root_buf) {
            return Err(DbError::Io(format!("{}: root checksum mismatch", self.name)));
        }
        Ok(root_buf)
    }

    fn read_root(&mut self) -> Result<RootInfo> {
        let root_buf = self.read_root_buf()?;
        RootInfo::parse(&root_buf)
            .ok_or_else(|| DbError::Malformed(format!("{}: bad root page", self.name)))
    }

    fn load_block(&mut self, id: u32) -> Result<()> {
        self.file.read_at(block_offset(id), &mut self.buf)?;
        if !crate::store::checksum::verify(&self.buf) {
            return Err(DbError::Io(format!("{}: block {id} checksum mismatch", self.name)));
        }
        if !BlockRef::new(&self.buf).magic_ok() {
            return Err(DbError::Malformed(format!("{}: block {id} missing magic", self.name)));
        }
        Ok(())
    }

    fn write_block(&mut self, id: u32) -> Result<()> {
        Block::new(&mut self.buf).sign();
        self.file.write_at(block_offset(id), &self.buf)
    }

    // ── key plumbing ────────────────────────────────────────────────

    fn key_index(&self) -> usize {
        self.rel.key as usize
    }

    fn key_type(&self) -> Result<&'static DataType> {
        self.rel
            .fields
            .get(self.key_index())
            .ok_or_else(|| DbError::Argument("key column out of range".into()))?
            .datatype()
    }

    /// First key of the page currently in the scratch buffer.
    fn first_key(&self) -> Result<Option<Vec<u8>>> {
        let view = BlockRef::new(&self.buf);
        match view.first_record() {
            None => Ok(None),
            Some(rec) => Ok(Some(rec.field(self.key_index())?.to_vec())),
        }
    }

    /// Walk adjacent chain pairs to pick the insertion page for `key`:
    /// the tail takes everything past the last range, empty pages are
    /// skipped, a page owns keys from its first key up to (but excluding)
    /// the next page's first key, and the head additionally takes any new
    /// minimum.
    fn locate_target(&mut self, key: &[u8], head: u32) -> Result<u32> {
        let ty = self.key_type()?;
        let mut curr = head;
        loop {
            self.load_block(curr)?;
            let (next, slots) = {
                let view = BlockRef::new(&self.buf);
                (view.next_id(), view.slot_count())
            };
            if next == NULL_BLOCK {
                return Ok(curr);
            }
            if slots == 0 {
                curr = next;
                continue;
            }
            if curr == head {
                match self.first_key()? {
                    Some(k1) if ty.less(key, &k1) => return Ok(curr),
                    _ => {}
                }
            }
            // Bound this page by the first key of the next non-empty page.
            let mut peek = next;
            let mut bound = None;
            while peek != NULL_BLOCK {
                self.load_block(peek)?;
                match self.first_key()? {
                    Some(k2) => {
                        bound = Some(k2);
                        break;
                    }
                    None => peek = BlockRef::new(&self.buf).next_id(),
                }
            }
            match bound {
                None => return Ok(curr),
                Some(k2) if ty.less(key, &k2) => return Ok(curr),
                Some(_) => curr = next,
            }
        }
    }

    // ── mutations ───────────────────────────────────────────────────

    /// Insert one record. The key field is extracted from `fields` at the
    /// relation's key column; duplicates are accepted.
    pub fn insert(&mut self, header: u8, fields: &[&[u8]]) -> Result<()> {
        if fields.len() != self.rel.count as usize {
            return Err(DbError::Argument(format!(
                "{}: expected {} fields, got {}",
                self.name,
                self.rel.count,
                fields.len()
            )));
        }
        self.initial()?;
        let kidx = self.key_index();
        let ty = self.key_type()?;
        let key = fields[kidx].to_vec();

        let mut split_done = false;
        loop {
            let root = self.read_root()?;
            let target = self.locate_target(&key, root.head)?;
            self.load_block(target)?;

            let allocated = {
                let mut block = Block::new(&mut self.buf);
                if block.allocate(header, fields) {
                    let rows = block.as_ref().kind_count();
                    block.set_kind_count(rows + 1);
                    true
                } else {
                    false
                }
            };
            if allocated {
                sort_slots(&mut self.buf, kidx, ty);
                return self.write_block(target);
            }

            // One split per insert: a record that still does not fit
            // afterwards can never fit.
            if split_done {
                return Err(DbError::Capacity);
            }
            self.split(target)?;
            split_done = true;
        }
    }

    /// Halve an overfull page: the original id keeps the lower half of the
    /// slots, a freshly allocated block takes the upper half and the old
    /// successor. Writes go children first, then the root with its bumped
    /// block count.
    fn split(&mut self, target: u32) -> Result<()> {
        let mut root_buf = self.read_root_buf()?;
        let new_id = RootInfo::parse(&root_buf)
            .ok_or_else(|| DbError::Malformed(format!("{}: bad root page", self.name)))?
            .block_count
            + 1;

        self.load_block(target)?;
        let old = self.buf.clone();
        let old_view = BlockRef::new(&old);
        let slots = old_view.slot_count() as usize;
        let next = old_view.next_id();
        let half = slots / 2;

        let mut lower = vec![0u8; BLOCK_SIZE];
        let mut upper = vec![0u8; BLOCK_SIZE];
        {
            let mut b1 = Block::new(&mut lower);
            b1.clear_data(target);
            b1.set_next_id(new_id);
            let mut b2 = Block::new(&mut upper);
            b2.clear_data(new_id);
            b2.set_next_id(next);

            for i in 0..slots {
                let off = old_view.slot(i) as usize;
                let length = old_view.record(i).length();
                if length == 0 || off + align8(length) > BLOCK_CHECKSUM {
                    return Err(DbError::Malformed(format!(
                        "{}: bad record in block {target}",
                        self.name
                    )));
                }
                let image = &old[off..off + align8(length)];
                let dst = if i < half { &mut b1 } else { &mut b2 };
                if !dst.append_record_bytes(image) {
                    return Err(DbError::Capacity);
                }
            }
            b1.set_kind_count(half as u32);
            b2.set_kind_count((slots - half) as u32);
            b1.sign();
            b2.sign();
        }

        self.file.write_at(block_offset(new_id), &upper)?;
        self.file.write_at(block_offset(target), &lower)?;
        {
            let mut root = Root::new(&mut root_buf);
            root.set_block_count(new_id);
            root.sign();
        }
        self.file.write_at(0, &root_buf)?;

        self.buf = lower;
        Ok(())
    }

    /// Remove the record whose key equals `key`. The page is found by the
    /// first/last key range of each chain page; within the page the slots
    /// are scanned linearly for equality.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.initial()?;
        let ty = self.key_type()?;
        let kidx = self.key_index();

        let root = self.read_root()?;
        let mut curr = root.head;
        while curr != NULL_BLOCK {
            self.load_block(curr)?;
            let (next, slots) = {
                let view = BlockRef::new(&self.buf);
                (view.next_id(), view.slot_count() as usize)
            };
            if slots > 0 {
                let in_range = {
                    let view = BlockRef::new(&self.buf);
                    let first = view.record(0).field(kidx)?;
                    let last = view.record(slots - 1).field(kidx)?;
                    !ty.less(key, first) && !ty.less(last, key)
                };
                if in_range {
                    let found = {
                        let view = BlockRef::new(&self.buf);
                        let mut found = None;
                        for i in 0..slots {
                            if ty.equal(view.record(i).field(kidx)?, key) {
                                found = Some(i);
                                break;
                            }
                        }
                        found
                    };
                    let slot = found.ok_or(DbError::NotFound)?;
                    let mut block = Block::new(&mut self.buf);
                    block.remove_slot(slot);
                    let rows = block.as_ref().kind_count();
                    block.set_kind_count(rows.saturating_sub(1));
                    drop(block);
                    return self.write_block(curr);
                }
            }
            curr = next;
        }
        Err(DbError::NotFound)
    }

    /// Replace the record whose key equals `key` with a new one. This is a
    /// remove followed by an insert and is not atomic: a failure after the
    /// remove leaves the row deleted.
    pub fn update(&mut self, key: &[u8], header: u8, fields: &[&[u8]]) -> Result<()> {
        self.remove(key)?;
        self.insert(header, fields)
    }

    // ── iteration ───────────────────────────────────────────────────

    /// Position a cursor on the head of the page chain.
    pub fn blocks(&mut self) -> Result<BlockCursor<'_>> {
        self.initial()?;
        let head = self.read_root()?.head;
        self.load_block(head)?;
        Ok(BlockCursor { current: head, table: self })
    }

    /// Drive `f` over every record in chain order. Returning `Ok(false)`
    /// stops the scan early.
    pub fn for_each_record<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Record<'_>) -> Result<bool>,
    {
        let mut cursor = self.blocks()?;
        while cursor.valid() {
            let slots = cursor.block().slot_count() as usize;
            for i in 0..slots {
                if !f(cursor.block().record(i))? {
                    return Ok(());
                }
            }
            cursor.advance()?;
        }
        Ok(())
    }

    /// Owned copy of the first record of the first non-empty page, or
    /// `None` when the table holds no rows.
    pub fn first_row(&mut self) -> Result<Option<(Vec<Vec<u8>>, u8)>> {
        let expected = self.rel.count as usize;
        let mut out = None;
        self.for_each_record(|rec| {
            out = Some(rec.to_owned_fields(expected)?);
            Ok(false)
        })?;
        Ok(out)
    }
}

/// Cursor over the block chain. Advancing reloads the table's scratch
/// buffer, so records borrowed from [`BlockCursor::block`] are bounded by
/// the cursor.
pub struct BlockCursor<'t> {
    table: &'t mut Table,
    current: u32,
}

impl<'t> BlockCursor<'t> {
    /// False once the cursor walked past the tail.
    pub fn valid(&self) -> bool {
        self.current != NULL_BLOCK
    }

    /// Block id of the loaded page.
    pub fn block_id(&self) -> u32 {
        self.current
    }

    /// Read view over the loaded page.
    pub fn block(&self) -> BlockRef<'_> {
        BlockRef::new(&self.table.buf)
    }

    /// Load the successor page, or walk past the tail.
    pub fn advance(&mut self) -> Result<()> {
        if !self.valid() {
            return Ok(());
        }
        let next = self.block().next_id();
        if next == NULL_BLOCK {
            self.current = NULL_BLOCK;
            return Ok(());
        }
        self.table.load_block(next)?;
        self.current = next;
        Ok(())
    }
}
