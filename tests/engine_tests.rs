use parbatch::{Config, EngineError, ParallelIterable, WorkerPool, par_iter};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn cfg(batch_size: usize, threads: usize) -> Config {
    Config::default()
        .with_batch_size(batch_size)
        .with_pool(WorkerPool::with_threads(threads))
}

fn sorted<T: Ord>(mut v: Vec<T>) -> Vec<T> {
    v.sort();
    v
}

// --- content determinism across batch sizes and pool sizes ---

#[test]
fn test_content_independent_of_batch_and_pool_size() {
    let data: Vec<i64> = (0..200).map(|x| (x * 37) % 101).collect();
    let n = data.len();
    let expected: Vec<i64> = sorted(
        data.iter()
            .filter(|x| *x % 3 != 0)
            .flat_map(|x| vec![x * 2; (*x % 3) as usize])
            .collect(),
    );
    for b in [1, n / 2, n] {
        for threads in [1, 4, 16] {
            let out = ParallelIterable::new(&data, cfg(b, threads))
                .reject(|x| x % 3 == 0)
                .flat_collect(|x| vec![x * 2; (x % 3) as usize])
                .to_vec()
                .unwrap();
            assert_eq!(sorted(out), expected, "batch {} threads {}", b, threads);
        }
    }
}

#[test]
fn test_combine_all_keeps_source_order() {
    let data: Vec<u32> = (0..1000).collect();
    let out = ParallelIterable::new(&data, cfg(7, 8).with_combine_one(false))
        .select(|x| x % 5 == 0)
        .collect(|x| x + 1)
        .to_vec()
        .unwrap();
    let expected: Vec<u32> = (0..1000).filter(|x| x % 5 == 0).map(|x| x + 1).collect();
    assert_eq!(out, expected);
}

#[test]
fn test_empty_source_yields_empty_results() {
    let data: Vec<i32> = Vec::new();
    let view = ParallelIterable::new(&data, cfg(4, 2));
    let (v, stats) = view.to_vec_with_stats().unwrap();
    assert!(v.is_empty());
    assert_eq!(stats.total_batches, 0);
    assert_eq!(view.count().unwrap(), 0);
    assert!(!view.any_satisfy(|_| true).unwrap());
    assert!(view.all_satisfy(|_| false).unwrap());
    assert_eq!(view.detect(|_| true).unwrap(), None);
}

#[test]
fn test_undersized_source_is_one_batch() {
    let data = [3, 1, 2];
    let (v, stats) = ParallelIterable::new(&data, cfg(10, 4)).to_vec_with_stats().unwrap();
    assert_eq!(sorted(v), vec![1, 2, 3]);
    assert_eq!(stats.total_batches, 1);
    assert_eq!(stats.completed, 1);
}

// --- distinct ---

#[test]
fn test_distinct_example() {
    let data = [1, 2, 2, 3, 4, 4, 4, 5];
    let out = par_iter(&data, cfg(2, 4).with_distinct(true)).to_set().unwrap();
    assert_eq!(out, HashSet::from([1, 2, 3, 4, 5]));
    let v = par_iter(&data, cfg(2, 4).with_distinct(true)).to_vec().unwrap();
    assert_eq!(v.len(), 5);
}

#[test]
fn test_new_ignores_config_distinct() {
    let data = [1, 1, 1];
    let n = ParallelIterable::new(&data, cfg(1, 2).with_distinct(true))
        .count()
        .unwrap();
    assert_eq!(n, 3);
}

#[test]
fn test_distinct_after_map() {
    let data: Vec<i32> = (0..100).collect();
    let n = ParallelIterable::new(&data, cfg(9, 4))
        .collect(|x| x % 10)
        .distinct()
        .count()
        .unwrap();
    assert_eq!(n, 10);
}

#[test]
fn test_distinct_predicate_runs_once_per_value() {
    let data: Vec<i32> = (0..300).map(|x| x % 3).collect();
    let calls = AtomicUsize::new(0);
    let all = par_iter(&data, cfg(8, 4).with_distinct(true))
        .all_satisfy(|x| {
            calls.fetch_add(1, Ordering::Relaxed);
            *x < 3
        })
        .unwrap();
    assert!(all);
    assert_eq!(calls.load(Ordering::Relaxed), 3);
}

#[test]
fn test_fold_idempotent_with_fresh_registry() {
    let data = [5, 5, 6, 7, 7, 7];
    let view = par_iter(&data, cfg(2, 3).with_distinct(true));
    let first = view.fold(|| 0, |acc, x| acc + x, |a, b| a + b).unwrap();
    let second = view.fold(|| 0, |acc, x| acc + x, |a, b| a + b).unwrap();
    assert_eq!(first, 18);
    assert_eq!(first, second);
}

// --- short-circuit queries ---

#[test]
fn test_any_satisfy_examples() {
    let data = [1, 3, 5, 6, 7];
    assert!(ParallelIterable::new(&data, cfg(2, 4)).any_satisfy(|x| x % 2 == 0).unwrap());
    assert!(!ParallelIterable::new(&data, cfg(2, 4)).any_satisfy(|x| *x > 10).unwrap());
    assert!(ParallelIterable::new(&data, cfg(2, 4)).none_satisfy(|x| *x > 10).unwrap());
}

#[test]
fn test_all_satisfy_examples() {
    let data = [2, 4, 6, 8];
    assert!(ParallelIterable::new(&data, cfg(3, 2)).all_satisfy(|x| x % 2 == 0).unwrap());
    let data = [2, 4, 5, 8];
    assert!(!ParallelIterable::new(&data, cfg(3, 2)).all_satisfy(|x| x % 2 == 0).unwrap());
}

#[test]
fn test_detect_tie_break_returns_first_in_source_order() {
    let data = [1, 2, 3, 4];
    for threads in [1, 2, 4, 16] {
        let found = ParallelIterable::new(&data, cfg(2, threads))
            .detect(|x| x % 2 == 0)
            .unwrap();
        assert_eq!(found, Some(2));
    }
}

#[test]
fn test_detect_after_chain() {
    let data: Vec<i32> = (0..1000).collect();
    let found = ParallelIterable::new(&data, cfg(13, 8))
        .collect(|x| x * 3)
        .detect(|x| *x > 2000)
        .unwrap();
    assert_eq!(found, Some(2001));
}

#[test]
fn test_short_circuit_skips_later_batches() {
    let data: Vec<u32> = (0..10_000).collect();
    let pool = WorkerPool::with_threads(1).with_queue_cap(1);
    let (found, stats) = ParallelIterable::new(&data, cfg(1, 1).with_pool(pool))
        .any_satisfy_with_stats(|x| *x == 0)
        .unwrap();
    assert!(found);
    assert_eq!(stats.total_batches, 10_000);
    assert!(stats.skipped > 0);
    assert_eq!(stats.submitted + stats.skipped, stats.total_batches);
    assert_eq!(stats.submitted, stats.completed + stats.discarded + stats.failed);
}

#[test]
fn test_stats_without_decision_cover_every_batch() {
    let data: Vec<u32> = (0..100).collect();
    let (all, stats) = ParallelIterable::new(&data, cfg(10, 4))
        .all_satisfy_with_stats(|x| *x < 100)
        .unwrap();
    assert!(all);
    assert_eq!(stats.total_batches, 10);
    assert_eq!(stats.submitted, 10);
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.skipped + stats.discarded + stats.failed, 0);
}

// --- reductions and side effects ---

#[test]
fn test_count_and_fold() {
    let data: Vec<u64> = (1..=100).collect();
    let view = ParallelIterable::new(&data, cfg(7, 4));
    assert_eq!(view.count().unwrap(), 100);
    assert_eq!(view.fold(|| 0, |acc, x| acc + x, |a, b| a + b).unwrap(), 5050);
    let evens = view.clone().select(|x| x % 2 == 0);
    assert_eq!(evens.count().unwrap(), 50);
    // Chaining on a clone leaves the first view alone.
    assert_eq!(view.count().unwrap(), 100);
}

#[test]
fn test_fold_empty_is_identity() {
    let data: Vec<u64> = Vec::new();
    let r = ParallelIterable::new(&data, cfg(3, 2))
        .fold(|| 42, |acc, x| acc + x, |a, b| a + b)
        .unwrap();
    assert_eq!(r, 42);
}

#[test]
fn test_for_each_visits_every_element() {
    let data: Vec<i32> = (0..500).collect();
    let seen = Mutex::new(Vec::new());
    ParallelIterable::new(&data, cfg(16, 4))
        .collect_if(|x| x % 2 == 1, |x| x * 10)
        .for_each(|x| seen.lock().unwrap().push(x))
        .unwrap();
    let seen = sorted(seen.into_inner().unwrap());
    let expected: Vec<i32> = (0..500).filter(|x| x % 2 == 1).map(|x| x * 10).collect();
    assert_eq!(seen, expected);
}

// --- grouping ---

#[test]
fn test_group_by() {
    let data: Vec<i32> = (1..=10).collect();
    let groups = ParallelIterable::new(&data, cfg(3, 4).with_combine_one(false))
        .group_by(|x| x % 3)
        .unwrap();
    assert_eq!(groups[&0], vec![3, 6, 9]);
    assert_eq!(groups[&1], vec![1, 4, 7, 10]);
    assert_eq!(groups[&2], vec![2, 5, 8]);
}

#[test]
fn test_group_by_each_puts_element_in_several_groups() {
    let data = [6, 10, 15];
    let groups: HashMap<i32, Vec<i32>> = ParallelIterable::new(&data, cfg(1, 3))
        .group_by_each(|x| [2, 3, 5].into_iter().filter(|d| x % d == 0).collect::<Vec<_>>())
        .unwrap();
    assert_eq!(sorted(groups[&2].clone()), vec![6, 10]);
    assert_eq!(sorted(groups[&3].clone()), vec![6, 15]);
    assert_eq!(sorted(groups[&5].clone()), vec![10, 15]);
}

#[test]
fn test_group_by_unique_key() {
    let data = ["apple", "banana", "cherry"];
    let index = ParallelIterable::new(&data, cfg(1, 2))
        .group_by_unique_key(|s| s.chars().next().unwrap_or(' '))
        .unwrap();
    assert_eq!(index[&'b'], "banana");
    assert_eq!(index.len(), 3);
}

#[test]
fn test_group_by_unique_key_duplicate_fails() {
    let data = ["apple", "avocado", "cherry"];
    let err = ParallelIterable::new(&data, cfg(1, 2))
        .group_by_unique_key(|s| s.len() % 2)
        .unwrap_err();
    assert!(matches!(err, EngineError::OperationFailed(_)));
    assert!(err.to_string().contains("not unique"));
}

// --- failures ---

#[test]
fn test_failing_element_fails_operation() {
    let data: Vec<i32> = (0..100).collect();
    let err = ParallelIterable::new(&data, cfg(10, 4))
        .try_collect(|x| if x == 42 { Err(anyhow::anyhow!("bad {}", x)) } else { Ok(x) })
        .to_vec()
        .unwrap_err();
    let e = err.element_error().unwrap();
    assert_eq!(e.batch, 4);
    assert_eq!(e.offset, 42);
    assert_eq!(e.cause.to_string(), "bad 42");
}

#[test]
fn test_lowest_batch_failure_wins() {
    let data: Vec<i32> = (0..100).collect();
    for threads in [1, 4, 16] {
        let err = ParallelIterable::new(&data, cfg(5, threads))
            .try_select(|x| if x % 30 == 17 { Err(anyhow::anyhow!("x")) } else { Ok(true) })
            .count()
            .unwrap_err();
        assert_eq!(err.element_error().unwrap().offset, 17);
    }
}

#[test]
fn test_panic_is_captured() {
    let data: Vec<i32> = (0..20).collect();
    let err = ParallelIterable::new(&data, cfg(4, 2))
        .collect(|x| {
            if x == 9 {
                panic!("nine");
            }
            x
        })
        .count()
        .unwrap_err();
    let e = err.element_error().unwrap();
    assert_eq!((e.batch, e.offset), (2, 9));
    assert!(e.cause.to_string().contains("nine"));
}

#[test]
fn test_decision_preempts_later_failure() {
    let data: Vec<i32> = (0..8).collect();
    let found = ParallelIterable::new(&data, cfg(2, 1).with_pool(WorkerPool::with_threads(1).with_queue_cap(1)))
        .try_collect(|x| if x == 7 { Err(anyhow::anyhow!("late")) } else { Ok(x) })
        .detect(|x| *x == 1)
        .unwrap();
    assert_eq!(found, Some(1));
}

#[test]
fn test_earlier_failure_is_not_preempted_by_decision() {
    let data: Vec<i32> = (0..8).collect();
    for threads in [1, 4] {
        let err = ParallelIterable::new(&data, cfg(1, threads))
            .try_collect(|x| if x == 1 { Err(anyhow::anyhow!("early")) } else { Ok(x) })
            .detect(|x| *x == 6)
            .unwrap_err();
        let e = err.element_error().unwrap();
        assert_eq!((e.batch, e.offset), (1, 1));
    }
}

#[test]
fn test_panicking_reduce_fails_without_hanging() {
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let data: Vec<i64> = (0..10_000).collect();
        let result = ParallelIterable::new(&data, cfg(1, 2)).fold(
            || 0,
            |acc, x| acc + x,
            |_, _| panic!("reduce boom"),
        );
        let _ = done_tx.send(result.map_err(|e| e.to_string()));
    });
    let result = done_rx
        .recv_timeout(std::time::Duration::from_secs(10))
        .expect("fold did not return after reduce_op panicked");
    let msg = result.unwrap_err();
    assert!(msg.contains("reduce boom"), "{}", msg);
}

// --- configuration ---

#[test]
fn test_invalid_configuration() {
    let data = [1, 2, 3];
    let err = ParallelIterable::new(&data, cfg(0, 2)).to_vec().unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    let err = ParallelIterable::new(&data, cfg(1, 0)).count().unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    let pool = WorkerPool::with_threads(2).with_queue_cap(0);
    let err = ParallelIterable::new(&data, cfg(1, 2).with_pool(pool))
        .any_satisfy(|_| true)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfiguration(_)));
}

#[test]
fn test_chain_describes_steps() {
    let data = [1];
    let view = par_iter(&data, cfg(1, 1).with_distinct(true))
        .select(|x| *x > 0)
        .collect(|x| x * 2);
    assert_eq!(view.chain().describe(), "distinct -> select -> collect");
    assert_eq!(view.batch_size(), 1);
    assert!(view.config().distinct);
}
