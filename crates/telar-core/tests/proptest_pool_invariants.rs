//! Property-based invariant tests for the viewer pool.
//!
//! These tests verify structural invariants that must hold for **any**
//! sequence of pool operations:
//!
//! 1. The pool never holds more cards than its capacity.
//! 2. At most one card exists per object, whatever the identifier's case.
//! 3. Every evicted card is released through the factory exactly once.
//! 4. Eviction removes the card with the lowest creation sequence.
//! 5. A queued position is applied at most once, and only after readiness.
//! 6. Preloading evicts only the oldest card that is neither active nor
//!    pinned, and is refused only when no such card exists.

use std::collections::HashSet;
use std::time::Duration;

use proptest::prelude::*;
use telar_core::RuntimeConfig;
use telar_core::geometry::ViewSpec;
use telar_core::headless::HeadlessFactory;
use telar_core::model::ObjectIndex;
use telar_core::pool::{PoolRejection, PositionMode, ViewerPool};

// ── Strategies ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Acquire(u8, bool),
    Preload(u8),
    MakeReady(u8),
    Advance(u16),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..16, any::<bool>()).prop_map(|(o, upper)| Op::Acquire(o, upper)),
        2 => (0u8..16).prop_map(Op::Preload),
        2 => (0u8..16).prop_map(Op::MakeReady),
        1 => (0u16..2_000).prop_map(Op::Advance),
    ]
}

fn object(id: u8, upper: bool) -> String {
    if upper {
        format!("OBJ-{id}")
    } else {
        format!("obj-{id}")
    }
}

fn pool(capacity: usize) -> (ViewerPool<HeadlessFactory>, telar_core::headless::HeadlessHost) {
    let mut config = RuntimeConfig::default();
    config.pool.max_cards = capacity;
    let factory = HeadlessFactory::new();
    let host = factory.host();
    (ViewerPool::new(factory, &config), host)
}

// ═══════════════════════════════════════════════════════════════════════════
// 1-3. Bound, uniqueness and release accounting under random operations
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn pool_bound_uniqueness_and_release(
        capacity in 1usize..6,
        ops in proptest::collection::vec(op(), 1..80),
    ) {
        let (mut pool, host) = pool(capacity);
        let objects = ObjectIndex::new();
        let mut now = Duration::ZERO;
        let mut evictions = 0usize;

        for op in ops {
            match op {
                Op::Acquire(id, upper) => {
                    let spec = ViewSpec::point(0.5, 0.5, 1.0);
                    let handle = pool.acquire(&objects, &object(id, upper), 1, Some((spec, PositionMode::Snap)), now);
                    if handle.evicted.is_some() {
                        evictions += 1;
                    }
                }
                Op::Preload(id) => {
                    let before = pool.len();
                    match pool.try_preload(&objects, &object(id, false), None, &HashSet::new(), now) {
                        Ok(handle) => {
                            prop_assert!(pool.len() >= before);
                            if handle.evicted.is_some() {
                                evictions += 1;
                            }
                        }
                        Err(PoolRejection::Saturated) => prop_assert_eq!(pool.len(), capacity),
                    }
                }
                Op::MakeReady(id) => {
                    host.make_ready(&object(id, false));
                    host.make_ready(&object(id, true));
                }
                Op::Advance(ms) => {
                    now += Duration::from_millis(u64::from(ms));
                    pool.poll(now);
                }
            }

            prop_assert!(pool.len() <= capacity);
            let keys: HashSet<String> = pool
                .cards()
                .iter()
                .map(|card| card.object_id().to_lowercase())
                .collect();
            prop_assert_eq!(keys.len(), pool.len());
            prop_assert_eq!(host.live_count(), pool.len());
        }

        prop_assert_eq!(host.created_count() - host.live_count(), evictions);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 4. Eviction order follows creation sequence
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn eviction_removes_oldest(capacity in 1usize..6, extra in 1usize..6) {
        let (mut pool, _host) = pool(capacity);
        let objects = ObjectIndex::new();
        for i in 0..capacity + extra {
            let oldest = pool.cards().first().map(|card| card.object_id().to_owned());
            let handle = pool.acquire(&objects, &format!("o{i}"), 1, None, Duration::ZERO);
            if i >= capacity {
                prop_assert_eq!(handle.evicted, oldest);
            } else {
                prop_assert!(handle.evicted.is_none());
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 5. Queued positions apply once, after readiness
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn queued_position_applies_once(
        polls_before in 0usize..10,
        polls_after in 1usize..10,
    ) {
        let (mut pool, host) = pool(3);
        let objects = ObjectIndex::new();
        let spec = ViewSpec::point(0.3, 0.6, 2.0);
        let handle = pool.acquire(&objects, "map", 1, Some((spec, PositionMode::Snap)), Duration::ZERO);

        let mut now = Duration::ZERO;
        for _ in 0..polls_before {
            now += Duration::from_millis(100);
            pool.poll(now);
        }
        prop_assert!(host.commands_for(handle.container).is_empty());

        host.make_ready("map");
        for _ in 0..polls_after {
            now += Duration::from_millis(100);
            pool.poll(now);
        }
        // One pan plus one zoom.
        prop_assert_eq!(host.commands_for(handle.container).len(), 2);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 6. Preloading evicts only idle cards, oldest first
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn preload_evicts_only_idle_cards(
        capacity in 1usize..5,
        attempts in proptest::collection::vec(0u8..10, 1..16),
        pinned_ids in proptest::collection::hash_set(0u8..10, 0..6),
    ) {
        let (mut pool, host) = pool(capacity);
        let objects = ObjectIndex::new();
        pool.acquire(&objects, "shown", 1, None, Duration::ZERO);
        pool.set_active("shown", true);
        let pinned: HashSet<String> = pinned_ids.iter().map(|id| format!("p{id}")).collect();

        for id in attempts {
            let name = format!("p{id}");
            let before: Vec<(String, bool)> = pool
                .cards()
                .iter()
                .map(|card| (card.object_id().to_owned(), card.is_active()))
                .collect();
            let present = before.iter().any(|(object_id, _)| *object_id == name);
            let victim = before
                .iter()
                .find(|(object_id, active)| !active && !pinned.contains(object_id))
                .map(|(object_id, _)| object_id.clone());

            match pool.try_preload(&objects, &name, None, &pinned, Duration::ZERO) {
                Ok(handle) => {
                    if present || before.len() < capacity {
                        prop_assert!(handle.evicted.is_none());
                    } else {
                        prop_assert_eq!(handle.evicted, victim);
                    }
                }
                Err(PoolRejection::Saturated) => {
                    prop_assert!(!present);
                    prop_assert_eq!(before.len(), capacity);
                    prop_assert!(victim.is_none());
                }
            }
            prop_assert!(pool.contains("shown"));
            prop_assert!(pool.len() <= capacity);
        }

        let released = host.released_objects();
        prop_assert!(released.iter().all(|object_id| !pinned.contains(object_id)));
        prop_assert!(!released.iter().any(|object_id| object_id == "shown"));
    }
}
