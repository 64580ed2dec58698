//! OrderedIndex tests through the public API.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use sortview::index::{OrderedIndex, SearchMode};

type Elem = Arc<(AtomicI64, AtomicBool)>;

fn ascending() -> OrderedIndex<i64> {
    OrderedIndex::new(|a: &i64, b: &i64| a.cmp(b))
}

#[test]
fn test_single_and_bulk_adds_agree() {
    let mut single = ascending();
    for v in [20, 5, 15] {
        single.add(v);
    }
    assert_eq!(single.as_slice(), &[5, 15, 20]);

    let mut bulk = ascending();
    let placed = bulk.add_bulk(vec![20, 5, 15]);
    assert_eq!(bulk.as_slice(), single.as_slice());
    assert_eq!(placed, vec![(5, 0), (15, 1), (20, 2)]);
}

#[test]
fn test_bulk_positions_replay_as_single_inserts() {
    let mut index = ascending();
    for v in [10, 30, 50, 70] {
        index.add(v);
    }
    let before = index.as_slice().to_vec();
    let placed = index.add_bulk(vec![60, 0, 30, 80, 40]);

    let mut replay = before;
    for (item, position) in &placed {
        replay.insert(*position, *item);
    }
    assert_eq!(replay.as_slice(), index.as_slice());
    assert!(index.is_ordered(|_| false));
}

#[test]
fn test_lookup_conventions() {
    let mut index = ascending();
    index.add_bulk(vec![10, 20, 30]);
    assert_eq!(index.index_of(&20), Ok(1));
    assert_eq!(index.index_of(&25), Err(2));
    assert_eq!(index.remove(&99), None);
    assert_eq!(index.remove(&10), Some(0));
    assert_eq!(index.len(), 2);
}

#[test]
fn test_dirty_tolerant_search() {
    // Elements read their sort value through a shared cell, so one can go stale in place
    let cell = |v: i64, dirty: bool| Arc::new((AtomicI64::new(v), AtomicBool::new(dirty)));
    let value = |e: &Elem| e.0.load(Ordering::SeqCst);
    let mut index = OrderedIndex::new(move |a: &Elem, b: &Elem| value(a).cmp(&value(b)));
    for v in [1, 3, 5, 7, 9] {
        index.add(cell(v, false));
    }

    let stale = index.get(2).map(Arc::clone).unwrap();
    stale.0.store(99, Ordering::SeqCst);
    stale.1.store(true, Ordering::SeqCst);
    let is_dirty = |e: &Elem| e.1.load(Ordering::SeqCst);

    let probe = cell(7, false);
    assert_eq!(index.search(&probe, is_dirty, SearchMode::Locate), Ok(3));
    // Only the stale element lies between 3 and 7, so 4 lands after it
    let probe = cell(4, false);
    assert_eq!(index.search(&probe, is_dirty, SearchMode::InsertionPoint), Err(3));
    assert!(index.is_ordered(is_dirty));
    assert!(!index.is_ordered(|_| false));

    // Repair: take it out and put it back
    let position = index.position(|e| Arc::ptr_eq(e, &stale)).unwrap();
    let stale = index.remove_at(position);
    stale.1.store(false, Ordering::SeqCst);
    assert_eq!(index.add(stale), 4);
    assert!(index.is_ordered(|_| false));
}
