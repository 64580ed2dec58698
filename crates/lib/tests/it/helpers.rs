//! Shared fixtures: an observable test item and view constructors.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering},
};

use sortview::{
    Direction, FieldNotifier, Filter, Observable, SortOrder, SubscriptionId, ViewEvent, ViewState,
    observe::FieldListener,
};

/// An item with a mutable key, a sort field and a filter field.
#[derive(Debug)]
pub struct TestItem {
    id: AtomicU32,
    value: AtomicI64,
    active: AtomicBool,
    notifier: FieldNotifier,
}

impl TestItem {
    pub fn new(id: u32, value: i64) -> Arc<Self> {
        Arc::new(Self {
            id: AtomicU32::new(id),
            value: AtomicI64::new(value),
            active: AtomicBool::new(true),
            notifier: FieldNotifier::new(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_id(&self, id: u32) {
        self.id.store(id, Ordering::SeqCst);
    }

    pub fn set_value(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
        self.notifier.notify("value");
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        self.notifier.notify("active");
    }

    pub fn listener_count(&self) -> usize {
        self.notifier.listener_count()
    }
}

impl Observable for TestItem {
    fn subscribe(&self, listener: FieldListener) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

pub fn by_value() -> SortOrder<TestItem> {
    SortOrder::by("value", TestItem::value, Direction::Ascending)
}

pub fn active_only() -> Filter<TestItem> {
    Filter::new(["active"], TestItem::is_active)
}

pub fn value_above(threshold: i64) -> Filter<TestItem> {
    Filter::new(["value"], move |item: &TestItem| item.value() > threshold)
}

/// A view keyed by `id`, sorted by `value` ascending.
pub fn new_state() -> ViewState<u32, TestItem> {
    ViewState::new(TestItem::id, by_value())
}

pub fn items(values: &[(u32, i64)]) -> Vec<Arc<TestItem>> {
    values.iter().map(|&(id, v)| TestItem::new(id, v)).collect()
}

pub fn values<'a>(items: impl IntoIterator<Item = &'a Arc<TestItem>>) -> Vec<i64> {
    items.into_iter().map(|item| item.value()).collect()
}

pub fn ids<'a>(items: impl IntoIterator<Item = &'a Arc<TestItem>>) -> Vec<u32> {
    items.into_iter().map(|item| item.id()).collect()
}

/// Apply events to `mirror`, rebuilding from `current` on `Reset`.
pub fn apply_events(
    mirror: &mut Vec<Arc<TestItem>>,
    events: &[ViewEvent<TestItem>],
    current: &[Arc<TestItem>],
) {
    for event in events {
        if !event.apply(mirror) {
            *mirror = current.to_vec();
        }
    }
}

pub fn drain<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
