//! LiveProjection tests: ordering, filter partition and dirty repair.

use std::{sync::Arc, thread};

use sortview::projection::{ChangeEvent, LiveProjection};

use crate::helpers::{TestItem, active_only, by_value, value_above, values};

fn projection() -> LiveProjection<u32, TestItem> {
    LiveProjection::new(by_value())
}

fn load(p: &mut LiveProjection<u32, TestItem>, input: &[(u32, i64)]) -> Vec<Arc<TestItem>> {
    let items: Vec<_> = input.iter().map(|&(id, v)| TestItem::new(id, v)).collect();
    p.insert_bulk(items.iter().map(|i| (i.id(), Arc::clone(i))).collect())
        .unwrap();
    p.take_events();
    items
}

/// Deterministic pseudo-random sequence for stress tests.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

#[test]
fn test_filter_scenario() {
    let mut p = projection();
    p.set_filter(Some(value_above(10)));
    load(&mut p, &[(1, 5), (2, 15), (3, 25)]);

    assert_eq!(values(p.iter()), vec![15, 25]);
    assert_eq!(values(p.filtered()), vec![5]);

    p.set_filter(Some(value_above(0)));
    assert_eq!(values(p.iter()), vec![5, 15, 25]);
    assert_eq!(p.filtered_len(), 0);
    p.check_invariants().unwrap();
}

#[test]
fn test_bulk_equivalence_for_every_order() {
    let input = [(1, 40), (2, 10), (3, 40), (4, 30)];
    let mut expected = None;
    for rotation in 0..input.len() {
        for reverse in [false, true] {
            let mut order = input.to_vec();
            order.rotate_left(rotation);
            if reverse {
                order.reverse();
            }

            let mut single = projection();
            for &(id, v) in &order {
                single.insert(id, TestItem::new(id, v)).unwrap();
            }
            let mut bulk = projection();
            load(&mut bulk, &order);

            let single_ids: Vec<u32> = single.iter().map(|i| i.id()).collect();
            let bulk_ids: Vec<u32> = bulk.iter().map(|i| i.id()).collect();
            assert_eq!(single_ids, bulk_ids);
            expected.get_or_insert(single_ids.clone());
            assert_eq!(Some(single_ids), expected);
        }
    }
}

#[test]
fn test_repeated_notifications_move_once() {
    let mut p = projection();
    let items = load(&mut p, &[(1, 1), (2, 2), (3, 3), (4, 4)]);
    for v in [10, 20, 30, 40, 50] {
        items[0].set_value(v);
    }
    p.process_pending();
    let events = p.take_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ChangeEvent::Moved { from: 0, to: 3, .. }));
}

#[test]
fn test_filter_field_change_toggles_partition() {
    let mut p = projection();
    p.set_filter(Some(active_only()));
    let items = load(&mut p, &[(1, 1), (2, 2), (3, 3)]);

    items[1].set_active(false);
    p.process_pending();
    assert_eq!(values(p.iter()), vec![1, 3]);
    assert!(p.is_filtered(&2));

    // Sort change while hidden, then re-admitted at the right place
    items[1].set_value(10);
    items[1].set_active(true);
    p.process_pending();
    assert_eq!(values(p.iter()), vec![1, 3, 10]);
    p.check_invariants().unwrap();
}

#[test]
fn test_random_mutations_keep_invariants() {
    let mut rng = Lcg(7);
    let mut p = projection();
    p.set_filter(Some(active_only()));
    let items = load(
        &mut p,
        &(0..64).map(|id| (id, rng.next(100) as i64)).collect::<Vec<_>>(),
    );

    let mut mirror: Vec<Arc<TestItem>> = p.iter().cloned().collect();
    for round in 0..200 {
        let item = &items[rng.next(items.len() as u64) as usize];
        match rng.next(3) {
            0 | 1 => item.set_value(rng.next(100) as i64),
            _ => item.set_active(!item.is_active()),
        }
        if round % 5 == 0 {
            p.process_pending();
            p.check_invariants().unwrap();
            for event in p.take_events() {
                assert!(event.apply(&mut mirror));
            }
            let current: Vec<u32> = p.iter().map(|i| i.id()).collect();
            let mirrored: Vec<u32> = mirror.iter().map(|i| i.id()).collect();
            assert_eq!(current, mirrored, "mirror diverged at round {round}");
        }
    }

    p.process_pending();
    let sorted = values(p.iter());
    assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
    assert!(p.iter().all(|i| i.is_active()));
}

#[test]
fn test_notifications_from_other_threads() {
    let mut p = projection();
    let items = load(&mut p, &(0..32).map(|id| (id, id as i64)).collect::<Vec<_>>());

    thread::scope(|scope| {
        for chunk in items.chunks(8) {
            scope.spawn(move || {
                for item in chunk {
                    item.set_value(1000 - item.value());
                }
            });
        }
    });

    assert!(p.has_pending());
    p.process_pending();
    let ids: Vec<u32> = p.iter().map(|i| i.id()).collect();
    assert_eq!(ids, (0..32).rev().collect::<Vec<_>>());
    p.check_invariants().unwrap();
}

#[test]
fn test_dropping_projection_releases_items() {
    let mut p = projection();
    let items = load(&mut p, &[(1, 1), (2, 2)]);
    assert!(items.iter().all(|i| i.listener_count() == 1));
    drop(p);
    assert!(items.iter().all(|i| i.listener_count() == 0));
}
