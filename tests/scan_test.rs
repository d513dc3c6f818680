//! Chain-level scenarios: mass insertion across many pages, split on
//! overflow, global key order, deletion walking the minimum forward, and
//! update by key.

use slotdb::store::constants::NULL_BLOCK;
use slotdb::store::export::describe_file;
use slotdb::store::schema::{FieldInfo, RelationInfo, Schema};
use slotdb::store::table::Table;
use tempfile::{tempdir, TempDir};

fn setup(dir: &TempDir, table: &str, name_len: i64) -> Schema {
    let mut schema = Schema::open(dir.path().join("meta.db")).unwrap();
    let data = dir.path().join(format!("{table}.dat"));
    let rel = RelationInfo::new(
        data.to_str().unwrap(),
        0,
        vec![
            FieldInfo::new("id", "BIGINT", 0, 8),
            FieldInfo::new("phone", "CHAR", 1, 20),
            FieldInfo::new("name", "VARCHAR", 2, -name_len),
        ],
    );
    schema.create(table, rel).unwrap();
    schema
}

fn insert_row(table: &mut Table, id: i64, phone: &[u8], name: &[u8]) {
    let id = id.to_be_bytes();
    table.insert(0x84, &[id.as_slice(), phone, name]).unwrap();
}

fn collect_ids(table: &mut Table) -> Vec<i64> {
    let mut ids = Vec::new();
    table
        .for_each_record(|rec| {
            let raw = rec.field(0).unwrap();
            ids.push(i64::from_be_bytes(raw.try_into().unwrap()));
            Ok(true)
        })
        .unwrap();
    ids
}

#[test]
fn test_mass_insert_remove_update() {
    let dir = tempdir().unwrap();
    let schema = setup(&dir, "bulk", 255);
    let data = dir.path().join("bulk.dat");
    let mut table = Table::open(&schema, "bulk").unwrap();

    let phone = b"13534500702\0";
    let filler = vec![b'x'; 250];

    // Descending insertion exercises the new-minimum placement on every row.
    for id in (1..=10_000i64).rev() {
        insert_row(&mut table, id, phone, &filler);
    }

    // Chain order concatenates to the full ascending sequence.
    let ids = collect_ids(&mut table);
    assert_eq!(ids.len(), 10_000);
    assert_eq!(ids[0], 1);
    assert_eq!(ids[9_999], 10_000);
    assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(ids, (1..=10_000).collect::<Vec<i64>>());
    assert_eq!(table.row_count().unwrap(), 10_000);

    // The data no longer fits one page; the root tracks every split.
    let block_count = table.block_count().unwrap();
    assert!(block_count >= 2);
    let summary = describe_file(&data).unwrap();
    assert_eq!(summary.root.block_count, block_count);
    assert_eq!(summary.pages.len() as u32, block_count);
    assert!(summary.pages.iter().all(|p| p.checksum_ok));

    // The chain visits every allocated page exactly once.
    let mut visited = 0u32;
    let mut cursor = table.blocks().unwrap();
    while cursor.valid() {
        visited += 1;
        cursor.advance().unwrap();
    }
    assert_eq!(visited, block_count);

    // Per-page slot sequences are sorted and non-overlapping.
    let mut last: Option<i64> = None;
    let mut cursor = table.blocks().unwrap();
    while cursor.valid() {
        let block = cursor.block();
        for rec in block.records() {
            let id = i64::from_be_bytes(rec.field(0).unwrap().try_into().unwrap());
            if let Some(prev) = last {
                assert!(prev <= id);
            }
            last = Some(id);
        }
        cursor.advance().unwrap();
    }
    drop(cursor);

    // Removing the minimum repeatedly promotes its successor.
    for i in 1..=50i64 {
        table.remove(&i.to_be_bytes()).unwrap();
        let (fields, _) = table.first_row().unwrap().unwrap();
        let front = i64::from_be_bytes(fields[0].as_slice().try_into().unwrap());
        assert_eq!(front, i + 1);
    }
    assert_eq!(table.row_count().unwrap(), 9_950);

    // Update by key: the matched row is replaced, the count is unchanged.
    let old_key = 10_000i64.to_be_bytes();
    let new_id = 3i64.to_be_bytes();
    table
        .update(
            &old_key,
            0x84,
            &[new_id.as_slice(), b"13318181238\0".as_slice(), b"Junix\0".as_slice()],
        )
        .unwrap();
    assert_eq!(table.row_count().unwrap(), 9_950);

    let ids = collect_ids(&mut table);
    assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    assert!(!ids.contains(&10_000));
    assert_eq!(ids[0], 3);

    let (fields, _) = table.first_row().unwrap().unwrap();
    assert_eq!(fields[1].as_slice(), b"13318181238\0");
    assert_eq!(fields[2].as_slice(), b"Junix\0");
}

#[test]
fn test_split_preserves_content_and_links() {
    let dir = tempdir().unwrap();
    let schema = setup(&dir, "wide", 2000);
    let data = dir.path().join("wide.dat");
    let mut table = Table::open(&schema, "wide").unwrap();

    // Large rows overflow the first page after a handful of inserts.
    let filler = vec![b'y'; 1900];
    let mut inserted = Vec::new();
    let mut id = 1i64;
    while table.block_count().unwrap() < 2 {
        insert_row(&mut table, id, b"13534500702\0", &filler);
        inserted.push(id);
        id += 1;
        assert!(id < 100, "split never happened");
    }

    // Contents survive the split and stay ordered.
    let ids = collect_ids(&mut table);
    assert_eq!(ids, inserted);

    // The halves link to each other and the new tail ends the chain.
    let summary = describe_file(&data).unwrap();
    assert_eq!(summary.root.block_count, 2);
    assert_eq!(summary.pages[0].next_id, summary.pages[1].block_id);
    assert_eq!(summary.pages[1].next_id, NULL_BLOCK);
    assert!(summary.pages.iter().all(|p| p.checksum_ok));
    let rows: u32 = summary.pages.iter().map(|p| p.record_count).sum();
    assert_eq!(rows as usize, inserted.len());

    // Inserts keep landing in the right half.
    insert_row(&mut table, 0, b"13534500702\0", &filler);
    insert_row(&mut table, id + 10, b"13534500702\0", &filler);
    let ids = collect_ids(&mut table);
    assert_eq!(ids[0], 0);
    assert_eq!(*ids.last().unwrap(), id + 10);
    assert!(ids.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_ascending_insertion_appends_to_tail() {
    let dir = tempdir().unwrap();
    let schema = setup(&dir, "asc", 255);
    let mut table = Table::open(&schema, "asc").unwrap();

    let filler = vec![b'z'; 200];
    for id in 1..=500i64 {
        insert_row(&mut table, id, b"13534500702\0", &filler);
    }
    let ids = collect_ids(&mut table);
    assert_eq!(ids, (1..=500).collect::<Vec<i64>>());
    assert!(table.block_count().unwrap() >= 2);
}
