//! Cross-module behavior under threads: matchers shared between readers and
//! writers, and bounded queues woken by context cancellation.

use ruleq_test::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_readers_see_consistent_rule_sets_while_writers_add() {
    let matcher: Arc<Matcher<i64>> = Arc::new(Matcher::new());
    matcher.add_rule(ChainRule::new(0).id("base"));

    let writers: Vec<_> = (1..=4)
        .map(|w| {
            let matcher = Arc::clone(&matcher);
            thread::spawn(move || {
                for i in 0..25 {
                    let p = w * 100 + i;
                    matcher.add_rule(ChainRule::new(p).priority(p).id(format!("w{p}")));
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let matcher = Arc::clone(&matcher);
            thread::spawn(move || {
                let ctx = Context::new();
                for _ in 0..200 {
                    let all = matcher.find_all(&ctx);
                    assert!(all.windows(2).all(|w| w[0] >= w[1]), "not sorted: {all:?}");
                    assert!(matcher.find(&ctx).is_some());
                }
            })
        })
        .collect();

    for h in writers.into_iter().chain(readers) {
        h.join().unwrap();
    }
    assert_eq!(matcher.len(), 101);
    assert_eq!(matcher.find(&Context::new()), Some(424));
}

#[test]
fn test_cached_matcher_with_recording_middleware() {
    let recorder = RecordingMiddleware::new();
    let matcher: Matcher<&str> = Matcher::new();
    matcher
        .add_rule(ChainRule::new("eu").when_value("region", StringMatcher::prefix("eu-")))
        .use_middleware(recorder.clone())
        .enable_cache(Duration::from_secs(60));

    let ctx = TestContext::new().with("region", "eu-west").build();
    for _ in 0..5 {
        assert_eq!(matcher.find(&ctx), Some("eu"));
    }
    // Only the first call reaches the chain.
    assert_eq!(recorder.call_count(), 1);
    let stats = matcher.stats();
    assert_eq!(stats.total_matches, 5);
    assert_eq!(stats.cache_hits, 4);
    assert_eq!(stats.cache_misses, 1);
}

#[test]
fn test_cancel_wakes_every_blocked_consumer() {
    let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4, 64));
    let ctx = Arc::new(Context::new());
    ctx.with_cancel();

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || queue.dequeue(&ctx))
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    ctx.cancel();

    for h in consumers {
        assert_eq!(h.join().unwrap(), Err(QueueError::Context(ContextError::Cancelled)));
    }
}

#[test]
fn test_producers_and_consumers_through_bounded_queue() {
    let queue: Arc<BoundedQueue<u64>> = Arc::new(BoundedQueue::new(2, 1 << 12));
    let producers: Vec<_> = (0..4u64)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let ctx = Context::new();
                for i in 0..250 {
                    queue.enqueue(&ctx, p * 1000 + i).unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let ctx = Context::new();
                (0..500).map(|_| queue.dequeue(&ctx).unwrap()).sum::<u64>()
            })
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }
    let total: u64 = consumers.into_iter().map(|h| h.join().unwrap()).sum();
    let expected: u64 = (0..4u64).flat_map(|p| (0..250).map(move |i| p * 1000 + i)).sum();
    assert_eq!(total, expected);
    assert!(queue.is_empty());
}
