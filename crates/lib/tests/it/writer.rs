//! SingleWriter tests: ordering, confinement and shutdown.

use std::{
    sync::{Arc, Mutex},
    thread,
};

use sortview::writer::SingleWriter;

#[derive(Debug, Default)]
struct Ledger {
    entries: Vec<(usize, usize)>,
}

#[test]
fn test_threads_keep_per_sender_order() {
    let (writer, handle) = SingleWriter::new(Ledger::default());
    let owner = writer.spawn_thread("ledger-writer").unwrap();

    thread::scope(|scope| {
        for worker in 0..4 {
            let handle = handle.clone();
            scope.spawn(move || {
                for seq in 0..50 {
                    handle
                        .call_blocking(move |l: &mut Ledger| l.entries.push((worker, seq)))
                        .unwrap();
                }
            });
        }
    });
    drop(handle);

    let ledger = owner.join().unwrap();
    assert_eq!(ledger.entries.len(), 200);
    for worker in 0..4 {
        let seqs: Vec<usize> = ledger
            .entries
            .iter()
            .filter(|(w, _)| *w == worker)
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(seqs, (0..50).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_dropped_deferred_still_runs() {
    let (writer, handle) = SingleWriter::new(0);
    let task = writer.spawn();

    drop(handle.post(|n: &mut i32| *n += 1));
    assert_eq!(handle.call(|n| *n).await.unwrap(), 1);

    drop(handle);
    assert_eq!(task.await.unwrap(), 1);
}

#[tokio::test]
async fn test_owner_stops_when_last_handle_drops() {
    let (writer, handle) = SingleWriter::new(());
    let weak = handle.downgrade();
    let task = writer.spawn();
    drop(handle);
    task.await.unwrap();

    assert!(weak.upgrade().is_none());
}

#[test]
fn test_reentrant_blocking_call_fails_fast() {
    let (mut writer, handle) = SingleWriter::new(Vec::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let inner = handle.clone();
    let seen = Arc::clone(&log);
    handle
        .submit(move |v: &mut Vec<u8>| {
            v.push(1);
            let outcome = inner.call_blocking(|v| v.push(2));
            seen.lock().unwrap().push(outcome.is_err());
            // Posting is fine and runs afterwards
            inner.submit(|v| v.push(3)).unwrap();
        })
        .unwrap();

    assert_eq!(writer.pump(), 2);
    assert_eq!(writer.state(), &vec![1, 3]);
    assert_eq!(*log.lock().unwrap(), vec![true]);
}
