use point_service::{
    EngineConfig, EntryFilter, MemoryStore, PointEngine, StatusCode, TransactionId,
};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const CALLS: usize = 100;

fn engine() -> PointEngine {
    PointEngine::with_store(Arc::new(MemoryStore::new()), EngineConfig::default())
}

#[test]
fn test_concurrent_adds_are_not_lost() {
    let engine = engine();
    engine.set("u", &TransactionId::generate(), 0, None);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..CALLS {
                    let result = engine.add("u", &TransactionId::generate(), 1, None);
                    assert_eq!(result.status, StatusCode::Success);
                }
            });
        }
    });

    assert_eq!(engine.get("u", None).unwrap(), Some((THREADS * CALLS) as i64));
}

#[test]
fn test_concurrent_first_adds_create_once() {
    let engine = engine();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| engine.add("fresh", &TransactionId::generate(), 1, None));
        }
    });

    assert_eq!(engine.get("fresh", None).unwrap(), Some(THREADS as i64));
}

#[test]
fn test_concurrent_reduces_never_overdraw() {
    let engine = engine();
    let budget = 500;
    engine.set("u", &TransactionId::generate(), budget, None);

    let accepted: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    (0..CALLS)
                        .filter(|_| {
                            engine
                                .reduce("u", &TransactionId::generate(), 1, None)
                                .status
                                == StatusCode::Success
                        })
                        .count()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(accepted, budget as usize);
    assert_eq!(engine.get("u", None).unwrap(), Some(0));
}

#[test]
fn test_racing_rollbacks_succeed_once() {
    let engine = engine();
    engine.set("u", &TransactionId::generate(), 1_000, None);

    let transactions: Vec<TransactionId> = (0..50)
        .map(|_| {
            let tx = TransactionId::generate();
            engine.add("u", &tx, 2, None);
            tx
        })
        .collect();

    let successes: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    transactions
                        .iter()
                        .filter(|tx| engine.rollback("u", tx, None).status == StatusCode::Success)
                        .count()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(successes, transactions.len());
    assert_eq!(engine.get("u", None).unwrap(), Some(1_000));
}

#[test]
fn test_shared_transaction_id_commits_for_one_user_only() {
    for _ in 0..200 {
        let engine = engine();
        let tx = TransactionId::generate();
        let barrier = Barrier::new(2);

        let successes: usize = thread::scope(|s| {
            let handles: Vec<_> = ["alice", "bob"]
                .into_iter()
                .map(|userid| {
                    let (engine, tx, barrier) = (&engine, &tx, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        engine.add(userid, tx, 5, None).status == StatusCode::Success
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(successes, 1);

        let mutations = engine
            .audit()
            .query(&EntryFilter::by_transaction(&tx))
            .unwrap()
            .into_iter()
            .filter(|e| e.is_mutation())
            .count();
        assert_eq!(mutations, 1);
    }
}
