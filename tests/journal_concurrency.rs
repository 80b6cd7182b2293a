//! Concurrent prepare/commit on shared journal chains

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tuplestore::tuple::{DeltaTuple, EditableTuple, JournalTuple, Tuple, ValueTuple};
use tuplestore::types::{Error, FieldSet, Value};

fn scheme() -> Arc<FieldSet> {
    FieldSet::builder(Some("urn:test:Counter"))
        .field("a", "urn:builtin:int")
        .field("b", "urn:builtin:int")
        .build()
        .unwrap()
}

fn origin() -> Arc<JournalTuple> {
    JournalTuple::new(ValueTuple::from_pairs(scheme(), &[("a", 0.into()), ("b", 0.into())]).unwrap())
}

fn set(base: &Arc<JournalTuple>, field: &str, value: i64) -> Arc<DeltaTuple> {
    let mut delta = base.edit();
    delta.set_by_name(field, Value::Int(value)).unwrap();
    Arc::new(delta)
}

#[test]
fn waiting_update_rebases_and_keeps_both_changes() {
    let v0 = origin();
    let first = v0.prepare_update(set(&v0, "a", 1)).unwrap();

    let (started, ready) = mpsc::channel();
    let writer = {
        let v0 = Arc::clone(&v0);
        thread::spawn(move || {
            started.send(()).unwrap();
            v0.update(set(&v0, "b", 2)).unwrap().unwrap()
        })
    };

    ready.recv().unwrap();
    thread::sleep(Duration::from_millis(20));
    let v1 = first.commit().unwrap();
    let v2 = writer.join().unwrap();

    assert_eq!(v1.version(), 1);
    assert_eq!(v2.version(), 2);
    assert_eq!(v2.get_by_name("a").unwrap(), Value::Int(1));
    assert_eq!(v2.get_by_name("b").unwrap(), Value::Int(2));
    assert!(Arc::ptr_eq(&v0.latest_version().unwrap(), &v2));
}

#[test]
fn many_writers_produce_one_linear_chain() {
    let v0 = origin();
    let writers: Vec<_> = (0..8)
        .map(|i| {
            let v0 = Arc::clone(&v0);
            thread::spawn(move || {
                let field = if i % 2 == 0 { "a" } else { "b" };
                v0.update(set(&v0, field, i + 1)).unwrap().unwrap().version()
            })
        })
        .collect();

    let mut versions: Vec<u64> = writers.into_iter().map(|w| w.join().unwrap()).collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<_>>());

    let mut current = Arc::clone(&v0);
    let mut hops = 0;
    while let Some(next) = current.next_version() {
        assert_eq!(next.version(), current.version() + 1);
        assert_eq!(next.chain_id(), v0.chain_id());
        current = next;
        hops += 1;
    }
    assert_eq!(hops, 8);
    assert!(current.is_latest());
}

#[test]
fn rollback_releases_waiters_onto_the_same_version() {
    let v0 = origin();
    let first = v0.prepare_update(set(&v0, "a", 1)).unwrap();

    let writer = {
        let v0 = Arc::clone(&v0);
        thread::spawn(move || v0.update(set(&v0, "b", 5)).unwrap().unwrap())
    };
    thread::sleep(Duration::from_millis(20));
    first.rollback();

    let v1 = writer.join().unwrap();
    assert_eq!(v1.version(), 1);
    assert_eq!(v1.get_by_name("a").unwrap(), Value::Int(0));
    assert_eq!(v1.get_by_name("b").unwrap(), Value::Int(5));
}

#[test]
fn bounded_wait_times_out_while_another_update_is_pending() {
    let v0 = origin();
    let held = v0.prepare_update(set(&v0, "a", 1)).unwrap();

    let err = v0
        .prepare_update_timeout(set(&v0, "b", 1), Some(Duration::from_millis(10)))
        .unwrap_err();
    assert!(matches!(err, Error::WaitTimeout { version: 0, .. }));
    assert!(err.is_retryable());

    drop(held);
    assert!(!v0.is_pending());
    assert!(v0.update(set(&v0, "b", 1)).unwrap().is_some());
}

#[test]
fn delete_wins_over_waiting_writers() {
    let v0 = origin();
    let delete = v0
        .prepare_update(Arc::new(DeltaTuple::delete(Arc::clone(&v0) as Arc<dyn Tuple>)))
        .unwrap();

    let writer = {
        let v0 = Arc::clone(&v0);
        thread::spawn(move || v0.update(set(&v0, "a", 9)))
    };
    thread::sleep(Duration::from_millis(20));
    assert!(delete.commit().is_none());

    assert!(matches!(writer.join().unwrap(), Err(Error::RecordDeleted { version: 0 })));
    assert!(v0.is_deleted_version());
    assert!(v0.latest_version().is_none());
}
