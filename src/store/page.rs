//! Root and block page layouts.
//!
//! The root page is the 4 KiB file prologue holding the chain head and
//! statistics. Block pages hold slotted records: the record area grows
//! upward from the end of the header while the slot directory grows downward
//! from the checksum word, and the slot order defines the logical key order
//! within the page.
//!
//! [`Block`] is the mutable editor used by the engine; [`BlockRef`] is the
//! shared read view handed to iteration. Cleared pages store the
//! [`BLOCK_DEFAULT_CHECKSUM`](crate::store::constants::BLOCK_DEFAULT_CHECKSUM)
//! constant; every page is re-signed before it is written to disk.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;

use crate::store::checksum;
use crate::store::codec::align8;
use crate::store::constants::*;
use crate::store::record::{record_size, write_record, Record};
use crate::store::timestamp::TimeStamp;

// ── Root ────────────────────────────────────────────────────────────

/// Parsed root page header.
#[derive(Debug, Clone, Serialize)]
pub struct RootInfo {
    /// Page kind of the file's chain (data or meta).
    pub kind: u16,
    /// Creation time, microseconds since epoch.
    pub timestamp: u64,
    /// Block id of the first page in the chain.
    pub head: u32,
    /// Block id of the first freed page, 0 when none.
    pub garbage_head: u32,
    /// Number of block pages in the file.
    pub block_count: u32,
}

impl RootInfo {
    /// Parse the root header, returning `None` when the magic is absent.
    pub fn parse(buf: &[u8]) -> Option<RootInfo> {
        if buf.len() < ROOT_SIZE || LittleEndian::read_u32(&buf[ROOT_MAGIC..]) != MAGIC {
            return None;
        }
        Some(RootInfo {
            kind: BigEndian::read_u16(&buf[ROOT_KIND..]),
            timestamp: BigEndian::read_u64(&buf[ROOT_TIMESTAMP..]),
            head: BigEndian::read_u32(&buf[ROOT_HEAD..]),
            garbage_head: BigEndian::read_u32(&buf[ROOT_GARBAGE..]),
            block_count: BigEndian::read_u32(&buf[ROOT_COUNT..]),
        })
    }
}

/// Mutable view over a root page buffer.
pub struct Root<'a> {
    buf: &'a mut [u8],
}

impl<'a> Root<'a> {
    pub fn new(buf: &'a mut [u8]) -> Root<'a> {
        debug_assert_eq!(buf.len(), ROOT_SIZE);
        Root { buf }
    }

    /// Reset the page: magic, kind, current timestamp, zeroed statistics,
    /// computed checksum.
    pub fn clear(&mut self, kind: u16) {
        self.buf.fill(0);
        self.buf[ROOT_MAGIC..ROOT_MAGIC + 4].copy_from_slice(&MAGIC.to_le_bytes());
        BigEndian::write_u16(&mut self.buf[ROOT_KIND..], kind);
        TimeStamp::now().write_to(&mut self.buf[ROOT_TIMESTAMP..]);
        self.sign();
    }

    pub fn head(&self) -> u32 {
        BigEndian::read_u32(&self.buf[ROOT_HEAD..])
    }

    pub fn set_head(&mut self, head: u32) {
        BigEndian::write_u32(&mut self.buf[ROOT_HEAD..], head);
    }

    pub fn garbage_head(&self) -> u32 {
        BigEndian::read_u32(&self.buf[ROOT_GARBAGE..])
    }

    pub fn set_garbage_head(&mut self, id: u32) {
        BigEndian::write_u32(&mut self.buf[ROOT_GARBAGE..], id);
    }

    pub fn block_count(&self) -> u32 {
        BigEndian::read_u32(&self.buf[ROOT_COUNT..])
    }

    pub fn set_block_count(&mut self, count: u32) {
        BigEndian::write_u32(&mut self.buf[ROOT_COUNT..], count);
    }

    pub fn kind(&self) -> u16 {
        BigEndian::read_u16(&self.buf[ROOT_KIND..])
    }

    pub fn timestamp(&self) -> TimeStamp {
        TimeStamp::read_from(&self.buf[ROOT_TIMESTAMP..])
    }

    /// Recompute and store the checksum.
    pub fn sign(&mut self) {
        checksum::sign(self.buf);
    }

    pub fn verify(&self) -> bool {
        checksum::verify(&self.buf[..])
    }
}

// ── Blocks ──────────────────────────────────────────────────────────

/// Shared read view over a block page buffer.
#[derive(Clone, Copy)]
pub struct BlockRef<'a> {
    buf: &'a [u8],
}

impl<'a> BlockRef<'a> {
    pub fn new(buf: &'a [u8]) -> BlockRef<'a> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);
        BlockRef { buf }
    }

    pub fn magic_ok(&self) -> bool {
        LittleEndian::read_u32(&self.buf[BLOCK_MAGIC..]) == MAGIC
    }

    pub fn space_id(&self) -> u32 {
        BigEndian::read_u32(&self.buf[BLOCK_SPACEID..])
    }

    pub fn block_id(&self) -> u32 {
        BigEndian::read_u32(&self.buf[BLOCK_ID..])
    }

    pub fn next_id(&self) -> u32 {
        BigEndian::read_u32(&self.buf[BLOCK_NEXT..])
    }

    pub fn kind(&self) -> u16 {
        BigEndian::read_u16(&self.buf[BLOCK_KIND..])
    }

    pub fn slot_count(&self) -> u16 {
        BigEndian::read_u16(&self.buf[BLOCK_SLOTS..])
    }

    pub fn garbage(&self) -> u16 {
        BigEndian::read_u16(&self.buf[BLOCK_GARBAGE..])
    }

    pub fn free_offset(&self) -> u16 {
        BigEndian::read_u16(&self.buf[BLOCK_FREESPACE..])
    }

    /// Row count on data pages, table count on meta pages.
    pub fn kind_count(&self) -> u32 {
        BigEndian::read_u32(&self.buf[BLOCK_KIND_COUNT..])
    }

    /// Stored checksum word.
    pub fn checksum_value(&self) -> u32 {
        LittleEndian::read_u32(&self.buf[BLOCK_CHECKSUM..])
    }

    pub fn verify(&self) -> bool {
        checksum::verify(self.buf)
    }

    /// First byte above the slot directory.
    pub fn slot_base(&self) -> usize {
        BLOCK_CHECKSUM - 2 * self.slot_count() as usize
    }

    /// Bytes left between the record area and the slot directory.
    pub fn free_space_length(&self) -> usize {
        let base = self.slot_base();
        let free = self.free_offset() as usize;
        if free >= base {
            0
        } else {
            base - free
        }
    }

    /// Record offset stored in slot `i`. Entries are native little-endian.
    pub fn slot(&self, i: usize) -> u16 {
        LittleEndian::read_u16(&self.buf[slot_offset(i)..])
    }

    /// Record stored in slot `i`.
    pub fn record(&self, i: usize) -> Record<'a> {
        let base = self.slot_base();
        let off = (self.slot(i) as usize).min(base);
        Record::new(&self.buf[off..base])
    }

    /// Record in the first slot, if any.
    pub fn first_record(&self) -> Option<Record<'a>> {
        if self.slot_count() == 0 {
            None
        } else {
            Some(self.record(0))
        }
    }

    /// Record in the last slot, if any.
    pub fn last_record(&self) -> Option<Record<'a>> {
        match self.slot_count() {
            0 => None,
            n => Some(self.record(n as usize - 1)),
        }
    }

    /// Iterate records in slot order.
    pub fn records(&self) -> impl Iterator<Item = Record<'a>> + '_ {
        let view = *self;
        (0..self.slot_count() as usize).map(move |i| view.record(i))
    }
}

/// Mutable editor over a block page buffer.
pub struct Block<'a> {
    buf: &'a mut [u8],
}

impl<'a> Block<'a> {
    pub fn new(buf: &'a mut [u8]) -> Block<'a> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);
        Block { buf }
    }

    /// Shared view over the same buffer.
    pub fn as_ref(&self) -> BlockRef<'_> {
        BlockRef::new(&self.buf[..])
    }

    fn clear(&mut self, space_id: u32, block_id: u32, kind: u16) {
        self.buf.fill(0);
        self.buf[BLOCK_MAGIC..BLOCK_MAGIC + 4].copy_from_slice(&MAGIC.to_le_bytes());
        BigEndian::write_u32(&mut self.buf[BLOCK_SPACEID..], space_id);
        BigEndian::write_u32(&mut self.buf[BLOCK_ID..], block_id);
        BigEndian::write_u16(&mut self.buf[BLOCK_KIND..], kind);
        BigEndian::write_u16(&mut self.buf[BLOCK_FREESPACE..], BLOCK_DEFAULT_FREESPACE);
        LittleEndian::write_u32(&mut self.buf[BLOCK_CHECKSUM..], BLOCK_DEFAULT_CHECKSUM);
    }

    /// Reset to an empty data page.
    pub fn clear_data(&mut self, block_id: u32) {
        self.clear(DATA_SPACEID, block_id, KIND_DATA);
    }

    /// Reset to an empty meta page.
    pub fn clear_meta(&mut self, block_id: u32) {
        self.clear(META_SPACEID, block_id, KIND_META);
    }

    pub fn set_next_id(&mut self, next: u32) {
        BigEndian::write_u32(&mut self.buf[BLOCK_NEXT..], next);
    }

    pub fn set_slot_count(&mut self, count: u16) {
        BigEndian::write_u16(&mut self.buf[BLOCK_SLOTS..], count);
    }

    pub fn set_garbage(&mut self, off: u16) {
        BigEndian::write_u16(&mut self.buf[BLOCK_GARBAGE..], off);
    }

    pub fn set_free_offset(&mut self, off: u16) {
        BigEndian::write_u16(&mut self.buf[BLOCK_FREESPACE..], off);
    }

    pub fn set_kind_count(&mut self, count: u32) {
        BigEndian::write_u32(&mut self.buf[BLOCK_KIND_COUNT..], count);
    }

    pub fn set_slot(&mut self, i: usize, off: u16) {
        LittleEndian::write_u16(&mut self.buf[slot_offset(i)..], off);
    }

    /// Append a record built from `fields` into the free area and add a slot
    /// for it. Returns false when the page cannot hold the padded record
    /// plus one directory entry. The caller re-sorts the directory and signs
    /// the page before persisting it.
    pub fn allocate(&mut self, header: u8, fields: &[&[u8]]) -> bool {
        let (total, _) = record_size(fields);
        let padded = align8(total);
        if self.as_ref().free_space_length() < padded + 2 {
            return false;
        }
        let off = self.as_ref().free_offset() as usize;
        if write_record(&mut self.buf[off..off + padded], fields, header).is_err() {
            return false;
        }
        self.set_free_offset((off + padded) as u16);
        let n = self.as_ref().slot_count();
        self.set_slot_count(n + 1);
        self.set_slot(n as usize, off as u16);
        true
    }

    /// Relocate an already-encoded record (a padded byte image) into this
    /// page. Used when splitting a page.
    pub fn append_record_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.as_ref().free_space_length() < bytes.len() + 2 {
            return false;
        }
        let off = self.as_ref().free_offset() as usize;
        self.buf[off..off + bytes.len()].copy_from_slice(bytes);
        self.set_free_offset((off + bytes.len()) as u16);
        let n = self.as_ref().slot_count();
        self.set_slot_count(n + 1);
        self.set_slot(n as usize, off as u16);
        true
    }

    /// Drop slot `i`, shifting the remaining entries left. The record bytes
    /// become dead space until the page is next rewritten.
    pub fn remove_slot(&mut self, i: usize) {
        let n = self.as_ref().slot_count() as usize;
        debug_assert!(i < n);
        for j in i..n - 1 {
            let next = self.as_ref().slot(j + 1);
            self.set_slot(j, next);
        }
        self.set_slot_count(n as u16 - 1);
    }

    /// Recompute and store the checksum.
    pub fn sign(&mut self) {
        checksum::sign(self.buf);
    }
}
