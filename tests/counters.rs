// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Concurrency tests for the in-memory collectors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use apiscope::counters::{RequestCounter, RequestRecord, ServerErrorCounter};
use apiscope::{Consumer, ConsumerRegistry, ServerError};

const THREADS: usize = 8;
const PER_THREAD: usize = 2_000;

fn record(i: usize) -> RequestRecord<'static> {
    RequestRecord {
        consumer: None,
        method: "GET",
        path: if i % 2 == 0 { "/even" } else { "/odd" },
        status_code: 200,
        response_time: 0.01,
        request_size: Some(1),
        response_size: Some(2),
    }
}

#[test]
fn test_no_request_is_lost_across_concurrent_drains() {
    let counter = RequestCounter::new();
    let done = AtomicBool::new(false);

    let drained: u64 = thread::scope(|s| {
        let drainer = s.spawn(|| {
            let mut total = 0;
            while !done.load(Ordering::Acquire) {
                total += counter.drain().iter().map(|c| c.request_count).sum::<u64>();
                thread::yield_now();
            }
            total
        });

        let writers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    for i in 0..PER_THREAD {
                        counter.add_request(record(i));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        drainer.join().unwrap()
    });

    let rest: u64 = counter.drain().iter().map(|c| c.request_count).sum();
    assert_eq!(drained + rest, (THREADS * PER_THREAD) as u64);
    assert!(counter.is_empty());
}

#[test]
fn test_concurrent_sums_stay_consistent() {
    let counter = RequestCounter::new();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for i in 0..PER_THREAD {
                    counter.add_request(record(i));
                }
            });
        }
    });

    let counts = counter.drain();
    assert_eq!(counts.len(), 2);
    for entry in counts {
        let n = (THREADS * PER_THREAD / 2) as u64;
        assert_eq!(entry.request_count, n);
        assert_eq!(entry.request_size_sum, n);
        assert_eq!(entry.response_size_sum, 2 * n);
        assert_eq!(entry.response_times.values().sum::<u64>(), n);
    }
}

#[test]
fn test_server_errors_group_across_threads() {
    let counter = ServerErrorCounter::new();
    let error = ServerError::new("TimeoutError", "upstream timed out", "frame 1");

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..100 {
                    counter.add_server_error(Some("alice"), "GET", "/slow", &error);
                }
            });
        }
    });

    let counts = counter.drain();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].error_count, (THREADS * 100) as u64);
    assert_eq!(counts[0].consumer.as_deref(), Some("alice"));
}

#[test]
fn test_consumers_are_reported_once_until_changed() {
    let registry = ConsumerRegistry::new();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                registry.add_or_update_consumer(
                    Consumer::from_identifier("alice").map(|c| c.with_name("Alice")),
                );
            });
        }
    });
    assert_eq!(registry.drain().len(), 1);

    registry.add_or_update_consumer(Consumer::from_identifier("alice").map(|c| c.with_name("Alice")));
    assert!(registry.drain().is_empty());

    registry.add_or_update_consumer(
        Consumer::from_identifier("alice").map(|c| c.with_name("Alice").with_group("beta")),
    );
    let drained = registry.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].group.as_deref(), Some("beta"));
}
