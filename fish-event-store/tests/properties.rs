//! Quickcheck properties for the universal invariants of spec.md §8,
//! exercised directly against `EventBuffer` (invariants 1 and 3) since those
//! two are pure, synchronous, and the cheapest surface to generate arbitrary
//! inputs for; the orchestrator-level scenarios in `scenarios.rs` cover the
//! remaining invariants with concrete, hand-built fixtures instead, since
//! they depend on async collaborators `Arbitrary` can't usefully generate.

use ax_event_sdk::{Event, EventKey, Metadata};
use fish_event_store::EventBuffer;
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

/// A small, duplicate-prone universe of keys: real multi-source event logs
/// have far fewer distinct lamport/stream pairs than events, so generating
/// from a small pool exercises the dedup/time-travel paths far more often
/// than fully independent `EventKey::arbitrary` values would.
#[derive(Debug, Clone)]
struct SmallKeyPool(Vec<EventKey>);

impl Arbitrary for SmallKeyPool {
    fn arbitrary(g: &mut Gen) -> Self {
        let n = 1 + usize::arbitrary(g) % 6;
        Self((0..n).map(|_| EventKey::arbitrary(g)).collect())
    }
}

#[derive(Debug, Clone)]
struct Batches(Vec<Vec<Event<i32>>>);

impl Arbitrary for Batches {
    fn arbitrary(g: &mut Gen) -> Self {
        let pool = SmallKeyPool::arbitrary(g).0;
        let num_batches = 1 + usize::arbitrary(g) % 5;
        let batches = (0..num_batches)
            .map(|_| {
                let mut keys: Vec<EventKey> = (0..(usize::arbitrary(g) % 5)).map(|_| *g.choose(&pool).unwrap()).collect();
                keys.sort();
                keys.dedup();
                keys.into_iter()
                    .enumerate()
                    .map(|(i, key)| Event { key, meta: Metadata::default(), payload: i as i32 })
                    .collect()
            })
            .collect();
        Self(batches)
    }
}

/// Invariant 3: after any sequence of inserts, the buffer is strictly
/// ascending by `EventKey` with no duplicate key, regardless of how the
/// same underlying keys were split across batches or what order the
/// batches arrived in.
#[quickcheck]
fn buffer_is_always_strictly_ascending_and_duplicate_free(batches: Batches) -> bool {
    let mut buffer: EventBuffer<i32> = EventBuffer::new();
    for batch in batches.0 {
        buffer.insert(batch);
    }
    buffer.as_slice().windows(2).all(|w| w[0].key < w[1].key)
}

/// Invariant 1 (order-agnostic determinism), restricted to the buffer
/// contents themselves (the orchestrator-level fold is covered by
/// `order_agnostic_determinism_across_arbitrary_batch_splits` in
/// `scenarios.rs`): whatever order the same set of batches is delivered in,
/// and however their union is split, the final sorted key sequence is the
/// one unique union of all distinct keys ever inserted.
#[quickcheck]
fn buffer_union_is_independent_of_batch_split_and_order(batches: Batches) -> bool {
    let all_keys: std::collections::BTreeSet<EventKey> = batches.0.iter().flatten().map(|e| e.key).collect();

    let mut forward: EventBuffer<i32> = EventBuffer::new();
    for batch in &batches.0 {
        forward.insert(batch.clone());
    }

    let mut reversed: EventBuffer<i32> = EventBuffer::new();
    for batch in batches.0.iter().rev() {
        reversed.insert(batch.clone());
    }

    let mut single: EventBuffer<i32> = EventBuffer::new();
    let mut union: Vec<Event<i32>> = batches.0.into_iter().flatten().collect();
    union.sort_by_key(|e| e.key);
    union.dedup_by_key(|e| e.key);
    single.insert(union);

    let forward_keys: Vec<EventKey> = forward.as_slice().iter().map(|e| e.key).collect();
    let reversed_keys: Vec<EventKey> = reversed.as_slice().iter().map(|e| e.key).collect();
    let single_keys: Vec<EventKey> = single.as_slice().iter().map(|e| e.key).collect();
    let expected: Vec<EventKey> = all_keys.into_iter().collect();

    forward_keys == expected && reversed_keys == expected && single_keys == expected
}

/// Invariant 6: after `invalidate_down_to(i)`, no surviving pointer has an
/// index above `i`.
#[quickcheck]
fn invalidate_down_to_never_leaves_a_pointer_above_the_cutoff(indices: Vec<usize>, cutoff: i64) -> bool {
    use fish_event_store::{Pointer, StatePointerTable};

    let mut table: StatePointerTable<i32> = StatePointerTable::new();
    for (n, idx) in indices.into_iter().enumerate() {
        table.add_populated_pointers(
            vec![Pointer {
                tag: format!("t{}", n),
                index: idx,
                state: 0,
                final_event: EventKey::default(),
                offsets: Default::default(),
                persist_as_local: false,
            }],
            None,
            &fish_event_store::StrideScheduler::default(),
        );
    }
    table.invalidate_down_to(cutoff);
    table.all().all(|p| p.index as i64 <= cutoff)
}
