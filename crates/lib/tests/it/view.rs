//! ViewState and LiveView end to end.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use sortview::{LiveView, SortOrder, ViewConfig, ViewEvent, ViewState, shaping::Direction};

use crate::helpers::{
    TestItem, active_only, apply_events, by_value, drain, ids, items, new_state, values,
};

#[test]
fn test_add_and_remove_scenario() {
    let mut state = new_state();
    state
        .add_bulk(items(&[(3, 25), (1, 15), (2, 20)]))
        .unwrap();
    assert_eq!(ids(state.visible()), vec![1, 2, 3]);

    assert!(state.remove_by_key(&3).is_some());
    assert_eq!(state.len(), 2);
    assert!(state.get(&3).is_none());
    assert!(state.remove_by_key(&999).is_none());
    assert_eq!(state.len(), 2);
    state.check_invariants().unwrap();
}

#[test]
fn test_duplicate_add_is_rejected_without_events() {
    let mut state = new_state();
    let mut rx = state.subscribe();
    state.add(TestItem::new(1, 10)).unwrap();
    assert_eq!(drain(&mut rx).len(), 1);

    let err = state.add(TestItem::new(1, 99)).unwrap_err();
    assert!(err.is_conflict());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(state.total_len(), 1);
    assert!(!state.try_add(TestItem::new(1, 5)));
}

#[test]
fn test_positional_access() {
    let mut state = new_state();
    state.add_bulk(items(&[(1, 30), (2, 10)])).unwrap();
    assert_eq!(state.at(0).unwrap().id(), 2);
    let err = state.at(2).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.module(), "view");
    assert_eq!(state.index_of(&1), Some(1));
    assert_eq!(state.index_of(&7), None);
}

#[test]
fn test_remove_exact_item() {
    let mut state = new_state();
    let item = TestItem::new(1, 10);
    state.add(Arc::clone(&item)).unwrap();
    // Same key, different item
    assert!(!state.remove(&TestItem::new(1, 10)));
    assert!(state.remove(&item));
    assert!(state.is_empty());
}

#[test]
fn test_update_key_moves_among_ties() {
    let mut state = new_state();
    let batch = items(&[(1, 5), (2, 5), (3, 5)]);
    let first = Arc::clone(&batch[0]);
    state.add_bulk(batch).unwrap();
    let mut rx = state.subscribe();

    let new_key = state.update_key(&1, |item| item.set_id(9)).unwrap();
    assert_eq!(new_key, 9);
    assert!(Arc::ptr_eq(state.get(&9).unwrap(), &first));
    assert_eq!(ids(state.visible()), vec![2, 3, 9]);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ViewEvent::Moved { from: 0, to: 2, .. }));
    state.check_invariants().unwrap();
}

#[test]
fn test_update_key_collision_drops_item() {
    let mut state = new_state();
    state.add_bulk(items(&[(1, 1), (2, 2)])).unwrap();
    let mut rx = state.subscribe();

    let err = state.update_key(&1, |item| item.set_id(2)).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(state.total_len(), 1);
    assert!(matches!(
        drain(&mut rx)[..],
        [ViewEvent::Removed { index: 0, .. }]
    ));
    state.check_invariants().unwrap();

    let err = state.update_key(&42, |_| {}).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_resets_are_single_events() {
    let mut state = new_state();
    state.add_bulk(items(&[(1, 1), (2, 2), (3, 3)])).unwrap();
    let mut rx = state.subscribe();

    state.set_sort(SortOrder::by("value", TestItem::value, Direction::Descending));
    state.clear();
    state.replace_all(items(&[(4, 4), (5, 5)])).unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.is_reset()));
    assert_eq!(ids(state.visible()), vec![5, 4]);
}

#[test]
fn test_event_mirror_tracks_every_operation() {
    let mut state = new_state();
    state.set_filter(Some(active_only()));
    let mut rx = state.subscribe();
    let mut mirror = Vec::new();

    let batch = items(&[(1, 50), (2, 20), (3, 40), (4, 10), (5, 30)]);
    let handles: Vec<_> = batch.iter().map(Arc::clone).collect();
    state.add_bulk(batch).unwrap();
    state.add(TestItem::new(6, 25)).unwrap();

    handles[0].set_value(0);
    handles[1].set_active(false);
    handles[4].set_value(60);
    state.process_pending();

    state.remove_by_key(&3);
    state.remove_bulk(&[4, 6, 99]);
    handles[1].set_active(true);
    state.notify_filter_dependency_changed();
    state.update_key(&5, |item| item.set_id(50)).unwrap();

    let snapshot = state.snapshot();
    apply_events(&mut mirror, &drain(&mut rx), &snapshot);
    assert_eq!(ids(&mirror), ids(&snapshot));
    assert_eq!(values(&snapshot), vec![0, 20, 60]);
    state.check_invariants().unwrap();
}

#[test]
fn test_stats_follow_mutations() {
    let mut state = new_state();
    let stats = state.stats();
    state.set_filter(Some(active_only()));
    let batch = items(&[(1, 1), (2, 2)]);
    batch[0].set_active(false);
    state.add_bulk(batch).unwrap();

    assert_eq!(stats.len(), 1);
    assert_eq!(stats.filtered_len(), 1);
    assert_eq!(stats.total_len(), 2);
    assert_eq!(stats.events(), 1);
}

#[tokio::test]
async fn test_live_view_repairs_without_explicit_processing() {
    let (view, _task) = LiveView::spawn(new_state());
    let batch = items(&[(1, 1), (2, 2), (3, 3)]);
    let first = Arc::clone(&batch[0]);
    view.add_bulk(batch).await.unwrap();
    let mut rx = view.subscribe().await.unwrap();

    // The change is scheduled on the writer by the wake hook before the next call
    first.set_value(10);
    let order: Vec<u32> = view
        .snapshot()
        .await
        .unwrap()
        .iter()
        .map(|i| i.id())
        .collect();
    assert_eq!(order, vec![2, 3, 1]);
    assert!(matches!(
        drain(&mut rx)[..],
        [ViewEvent::Moved { from: 0, to: 2, .. }]
    ));
    assert_eq!(view.len(), 3);
}

#[tokio::test]
async fn test_live_view_operations() {
    let (view, task) = LiveView::spawn(new_state());
    assert_eq!(view.add(TestItem::new(1, 10)).await.unwrap(), 1);
    assert!(view.try_add(TestItem::new(2, 5)).await.unwrap());
    assert!(view.add(TestItem::new(2, 7)).await.unwrap_err().is_conflict());

    assert_eq!(view.at(0).await.unwrap().id(), 2);
    assert!(view.at(5).await.unwrap_err().is_not_found());
    assert_eq!(view.index_of(1).await.unwrap(), Some(1));
    assert!(view.contains_key(2).await.unwrap());

    view.set_filter(Some(crate::helpers::value_above(6))).await.unwrap();
    assert_eq!(view.len(), 1);
    view.set_filter(None).await.unwrap();
    assert_eq!(view.len(), 2);

    assert_eq!(view.remove_bulk(vec![1, 2]).await.unwrap(), 2);
    assert!(view.is_empty());

    drop(view);
    let state = task.await.unwrap();
    assert_eq!(state.total_len(), 0);
}

#[tokio::test]
async fn test_observer_cannot_block_on_its_own_view() {
    let (view, _task) = LiveView::spawn(new_state());
    let weak = view.handle().downgrade();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&outcomes);

    view.observe(Arc::new(move |_: &ViewEvent<TestItem>| {
        if let Some(handle) = weak.upgrade() {
            let outcome = handle.call_blocking(|s: &mut ViewState<u32, TestItem>| s.len());
            seen.lock()
                .unwrap()
                .push(outcome.is_err_and(|e| e.is_invalid_operation()));
        }
    }))
    .await
    .unwrap();

    view.add(TestItem::new(1, 1)).await.unwrap();
    assert_eq!(*outcomes.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn test_observer_may_post_follow_up_work() {
    let (view, _task) = LiveView::spawn(new_state());
    let weak = view.handle().downgrade();
    let follow_ups = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&follow_ups);

    view.observe(Arc::new(move |event: &ViewEvent<TestItem>| {
        if let (ViewEvent::Added { .. }, Some(handle)) = (event, weak.upgrade()) {
            let counter = Arc::clone(&counter);
            handle
                .submit(move |s: &mut ViewState<u32, TestItem>| {
                    counter.store(s.len(), Ordering::SeqCst);
                })
                .unwrap();
        }
    }))
    .await
    .unwrap();

    view.add(TestItem::new(1, 1)).await.unwrap();
    // Runs after the follow-up queued by the observer
    view.process_pending().await.unwrap();
    assert_eq!(follow_ups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dedicated_thread_uses_configured_name() {
    let config = ViewConfig::default().with_writer_thread_name("view-owner");
    let state: ViewState<u32, TestItem> =
        ViewState::with_config(Arc::new(TestItem::id), by_value(), config);
    let (view, thread) = LiveView::spawn_thread(state).unwrap();
    assert_eq!(thread.thread().name(), Some("view-owner"));

    let name = view
        .handle()
        .call_blocking(|_| std::thread::current().name().map(str::to_string))
        .unwrap();
    assert_eq!(name.as_deref(), Some("view-owner"));

    view.handle()
        .call_blocking(|s| s.add(TestItem::new(1, 1)))
        .unwrap()
        .unwrap();
    drop(view);
    let state = thread.join().unwrap();
    assert_eq!(state.len(), 1);
}
