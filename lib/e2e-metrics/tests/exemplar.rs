/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use e2e_metrics::{Exemplar, ExemplarConfig, ShardedExemplar};

fn ids(items: &[e2e_metrics::ExemplarItem]) -> Vec<&str> {
    items.iter().map(|i| i.request_id.as_str()).collect()
}

#[test]
fn keep_slowest() {
    let e = Exemplar::new(&ExemplarConfig::with_capacity(3)).unwrap();
    for (id, ms) in [("req-1", 10), ("req-2", 50), ("req-3", 5), ("req-4", 100)] {
        e.offer(Duration::from_millis(ms), id, false, "");
    }
    assert_eq!(ids(&e.snapshot()), ["req-4", "req-2", "req-1"]);

    let details = e.detailed_snapshot();
    assert_eq!(ids(&details.fastest), ["req-3", "req-1", "req-2"]);
    assert!(details.failures.is_empty());
}

#[test]
fn merge_keeps_top() {
    let a = Exemplar::new(&ExemplarConfig::with_capacity(2)).unwrap();
    let b = Exemplar::new(&ExemplarConfig::with_capacity(2)).unwrap();
    a.offer(Duration::from_millis(10), "a1", false, "");
    a.offer(Duration::from_millis(30), "a2", false, "");
    b.offer(Duration::from_millis(20), "b1", true, "refused");
    b.offer(Duration::from_millis(40), "b2", false, "");
    a.merge(&b);

    assert_eq!(ids(&a.snapshot()), ["b2", "a2"]);
    let details = a.detailed_snapshot();
    assert_eq!(ids(&details.failures), ["b1"]);
    assert_eq!(details.failures[0].msg, "refused");
}

#[test]
fn concurrent_offer() {
    let e = Arc::new(ShardedExemplar::new(&ExemplarConfig::with_capacity(5).with_shards(4)).unwrap());
    let workers: Vec<_> = (0..4u64)
        .map(|i| {
            let e = e.clone();
            thread::spawn(move || {
                for j in 0..500u64 {
                    let id = format!("{i}-{j}");
                    e.offer(Duration::from_micros(i * 500 + j), &id, false, "");
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let top = e.snapshot();
    assert_eq!(ids(&top), ["3-499", "3-498", "3-497", "3-496", "3-495"]);
}
