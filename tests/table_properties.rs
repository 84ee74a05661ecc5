//! Property tests for record tables.
//!
//! Random insert/delete/write sequences are applied to a [`DiskTable`], a
//! [`MemTable`] and a plain byte vector; all three must agree, and the
//! page directory must stay consistent after every step.

use nodestore::{DiskTable, MemTable, RecordTable, TableConfig, NODE_SIZE};
use proptest::prelude::*;
use proptest::sample::Index;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Insert(Index, usize),
    Delete(Index, Index),
    Write(Index, usize, u32),
}

/// An operation bound to a concrete table size.
#[derive(Debug, Clone)]
enum Step {
    Insert(usize, Vec<u8>),
    Delete(usize, usize),
    Write(usize, usize, u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<Index>(), 1..600usize).prop_map(|(i, n)| Op::Insert(i, n)),
        2 => (any::<Index>(), any::<Index>()).prop_map(|(i, n)| Op::Delete(i, n)),
        1 => (any::<Index>(), 0..=12usize, any::<u32>()).prop_map(|(i, o, v)| Op::Write(i, o, v)),
    ]
}

/// Records tagged with consecutive ids starting at `first`.
fn records(first: u32, count: usize) -> Vec<u8> {
    (first..first + count as u32)
        .flat_map(|id| {
            let mut r = [0u8; NODE_SIZE];
            r[..4].copy_from_slice(&id.to_be_bytes());
            r[12..].copy_from_slice(&(!id).to_be_bytes());
            r
        })
        .collect()
}

fn resolve(op: &Op, size: usize, next: &mut u32) -> Option<Step> {
    match op {
        Op::Insert(i, n) => {
            let step = Step::Insert(i.index(size + 1), records(*next, *n));
            *next += *n as u32;
            Some(step)
        }
        Op::Delete(i, n) if size > 0 => {
            let pre = i.index(size);
            Some(Step::Delete(pre, n.index(size - pre) + 1))
        }
        Op::Write(i, off, v) if size > 0 => Some(Step::Write(i.index(size), *off, *v)),
        _ => None,
    }
}

fn apply(table: &mut impl RecordTable, step: &Step) {
    match step {
        Step::Insert(pre, entries) => table.insert(*pre, entries).unwrap(),
        Step::Delete(pre, count) => table.delete(*pre, *count).unwrap(),
        Step::Write(pre, off, v) => table.write4(*pre, *off, *v).unwrap(),
    }
}

fn apply_model(model: &mut Vec<u8>, step: &Step) {
    match step {
        Step::Insert(pre, entries) => {
            let at = pre * NODE_SIZE;
            model.splice(at..at, entries.iter().copied());
        }
        Step::Delete(pre, count) => {
            model.drain(pre * NODE_SIZE..(pre + count) * NODE_SIZE);
        }
        Step::Write(pre, off, v) => {
            let at = pre * NODE_SIZE + off;
            model[at..at + 4].copy_from_slice(&v.to_be_bytes());
        }
    }
}

/// All records of `table`, read field by field.
fn contents(table: &impl RecordTable) -> Vec<u8> {
    (0..table.size())
        .flat_map(|pre| {
            let low = table.read_field(pre, 0, 8).unwrap();
            let high = table.read_field(pre, 8, 8).unwrap();
            low.to_be_bytes().into_iter().chain(high.to_be_bytes())
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_tables_match_model(ops in prop::collection::vec(op(), 1..30)) {
        let dir = tempdir().unwrap();
        let config = TableConfig::new(dir.path()).buffers(3);
        let mut disk = DiskTable::create(&config).unwrap();
        let mut mem = MemTable::new();
        let mut model = Vec::new();
        let mut next = 0;

        for op in &ops {
            let Some(step) = resolve(op, disk.size(), &mut next) else {
                continue;
            };
            apply(&mut disk, &step);
            apply(&mut mem, &step);
            apply_model(&mut model, &step);

            prop_assert!(disk.directory().verify().is_ok());
            prop_assert_eq!(disk.size() * NODE_SIZE, model.len());
            prop_assert_eq!(mem.size(), disk.size());
        }

        prop_assert_eq!(&contents(&disk), &model);
        prop_assert_eq!(&mem.records(), &model);

        // the same state survives a reopen
        disk.close().unwrap();
        drop(disk);
        let disk = DiskTable::open(&config, false).unwrap();
        prop_assert_eq!(&contents(&disk), &model);
    }

    #[test]
    fn prop_insert_then_delete_restores_content(
        size in 0..1200usize,
        at in any::<Index>(),
        count in 1..700usize,
    ) {
        let dir = tempdir().unwrap();
        let config = TableConfig::new(dir.path());
        let initial = records(0, size);
        DiskTable::build(&config, &initial).unwrap();
        let mut disk = DiskTable::open(&config, true).unwrap();

        let pre = at.index(size + 1);
        disk.insert(pre, &records(10_000, count)).unwrap();
        prop_assert_eq!(disk.read4(pre, 0).unwrap(), 10_000);
        disk.delete(pre, count).unwrap();

        prop_assert_eq!(contents(&disk), initial);
        prop_assert!(disk.directory().verify().is_ok());
    }

    #[test]
    fn prop_replace_matches_model(
        size in 1..800usize,
        at in any::<Index>(),
        old in any::<Index>(),
        new in 0..400usize,
    ) {
        let dir = tempdir().unwrap();
        let config = TableConfig::new(dir.path());
        let mut model = records(0, size);
        DiskTable::build(&config, &model).unwrap();
        let mut disk = DiskTable::open(&config, true).unwrap();
        let mut mem = MemTable::from_records(&model).unwrap();

        let pre = at.index(size);
        let count = old.index(size - pre + 1);
        let entries = records(50_000, new);
        disk.replace(pre, &entries, count).unwrap();
        mem.replace(pre, &entries, count).unwrap();
        model.splice(pre * NODE_SIZE..(pre + count) * NODE_SIZE, entries);

        prop_assert_eq!(&contents(&disk), &model);
        prop_assert_eq!(&mem.records(), &model);
        prop_assert!(disk.directory().verify().is_ok());
    }
}
