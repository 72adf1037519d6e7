/*
 * Copyright 2021 Actyx AG
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
use std::collections::{BTreeMap, HashSet};

use ax_event_sdk::{Event, EventKey, OffsetMap};

use crate::{config::Config, scheduler::SnapshotScheduler};

/// A request to cache a state at `index`, before the state itself has been
/// computed. Produced by the scheduler and by the State Pointer Table's own
/// per-source/recent-window strategies; consumed by the orchestrator's fold
/// pass, which turns each one into a populated [`Pointer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedIndex {
    pub tag: String,
    pub index: usize,
    pub persist_as_local: bool,
}

/// A cached intermediate fold result at a specific buffer index.
///
/// `offsets` is carried even for ephemeral (non-persisted) entries because a
/// pointer placed in `pending_eligibility` may only become eligible for
/// storage several `current_state()` calls later (§4.2
/// `add_populated_pointers`'s aging scan), long after the fold pass that
/// produced it has finished — by then recomputing the offsets it proves
/// would mean re-folding, which is exactly what caching is meant to avoid.
#[derive(Debug, Clone)]
pub struct Pointer<S> {
    pub tag: String,
    pub index: usize,
    pub state: S,
    pub final_event: EventKey,
    pub offsets: OffsetMap,
    pub persist_as_local: bool,
}

impl<S> Pointer<S> {
    pub fn from_tagged(tagged: TaggedIndex, state: S, final_event: EventKey, offsets: OffsetMap) -> Self {
        Self {
            tag: tagged.tag,
            index: tagged.index,
            state,
            final_event,
            offsets,
            persist_as_local: tagged.persist_as_local,
        }
    }
}

/// Caches intermediate fold results at chosen buffer indices so a later fold
/// doesn't have to replay from the beginning of history.
///
/// Three sub-stores hold structurally identical entries with different
/// lifecycles: `ephemeral` caches exist purely to speed up re-folding;
/// `pending_eligibility` holds local-snapshot candidates not yet old enough
/// to persist; `pending_application` holds ones the scheduler has cleared
/// for the next `current_state()` to actually write out. Entries are keyed
/// by `tag` within each sub-store, so a later write with the same tag
/// overwrites rather than accumulates.
#[derive(Debug, Clone)]
pub struct StatePointerTable<S> {
    ephemeral: BTreeMap<String, Pointer<S>>,
    pending_eligibility: BTreeMap<String, Pointer<S>>,
    pending_application: BTreeMap<String, Pointer<S>>,
}

impl<S> Default for StatePointerTable<S> {
    fn default() -> Self {
        Self {
            ephemeral: BTreeMap::new(),
            pending_eligibility: BTreeMap::new(),
            pending_application: BTreeMap::new(),
        }
    }
}

impl<S> StatePointerTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ephemeral_len(&self) -> usize {
        self.ephemeral.len()
    }

    pub fn pending_eligibility_len(&self) -> usize {
        self.pending_eligibility.len()
    }

    pub fn pending_application_len(&self) -> usize {
        self.pending_application.len()
    }

    pub fn clear(&mut self) {
        self.ephemeral.clear();
        self.pending_eligibility.clear();
        self.pending_application.clear();
    }

    /// Delete every entry with `index > i` across all sub-stores — the
    /// response to discovering a time-travel event at position `i + 1`.
    pub fn invalidate_down_to(&mut self, i: i64) {
        for map in [&mut self.ephemeral, &mut self.pending_eligibility, &mut self.pending_application] {
            map.retain(|_, p| p.index as i64 <= i);
        }
    }

    /// Subtract `k` from every entry's index, dropping those that would go
    /// negative — the response to the buffer's front being truncated by `k`
    /// positions (`become_local` or a semantic-reset drop).
    pub fn shift_back(&mut self, k: usize) {
        for map in [&mut self.ephemeral, &mut self.pending_eligibility, &mut self.pending_application] {
            let shifted: BTreeMap<String, Pointer<S>> = std::mem::take(map)
                .into_iter()
                .filter_map(|(tag, mut p)| {
                    p.index = p.index.checked_sub(k)?;
                    Some((tag, p))
                })
                .collect();
            *map = shifted;
        }
    }

    /// Every entry across all three sub-stores, in no particular order.
    /// Introspection only (`validate`, `stats`); never used on the hot path.
    pub fn all(&self) -> impl Iterator<Item = &Pointer<S>> {
        [
            self.ephemeral.values(),
            self.pending_eligibility.values(),
            self.pending_application.values(),
        ]
        .into_iter()
        .flatten()
    }

    /// The highest-index entry across all sub-stores, if any.
    pub fn latest_stored(&self) -> Option<&Pointer<S>> {
        [
            self.ephemeral.values(),
            self.pending_eligibility.values(),
            self.pending_application.values(),
        ]
        .into_iter()
        .flatten()
        .max_by_key(|p| p.index)
    }

    /// Contents of `pending_application`, sorted ascending by index.
    pub fn get_snapshots_to_persist(&self) -> Vec<&Pointer<S>>
    where
        S: Clone,
    {
        let mut out: Vec<&Pointer<S>> = self.pending_application.values().collect();
        out.sort_by_key(|p| p.index);
        out
    }

    /// Remove a pending-application entry once its snapshot write has been
    /// durably acknowledged by the snapshot store.
    pub fn remove_pending_application(&mut self, tag: &str) -> Option<Pointer<S>> {
        self.pending_application.remove(tag)
    }

    /// Place freshly-populated pointers into the correct sub-store: plain
    /// caches go to `ephemeral`; ones flagged `persist_as_local` go to
    /// `pending_application` if the scheduler judges them old enough
    /// relative to `tip_event` already, or `pending_eligibility` otherwise.
    /// Every call also promotes any previously-pending entries that have
    /// since aged into eligibility.
    pub fn add_populated_pointers(
        &mut self,
        pointers: Vec<Pointer<S>>,
        tip_event: Option<EventKey>,
        scheduler: &dyn SnapshotScheduler,
    ) {
        for p in pointers {
            if !p.persist_as_local {
                self.ephemeral.insert(p.tag.clone(), p);
                continue;
            }
            let eligible_now = tip_event
                .map(|tip| scheduler.is_eligible_for_storage(p.final_event, tip))
                .unwrap_or(false);
            if eligible_now {
                self.pending_application.insert(p.tag.clone(), p);
            } else {
                self.pending_eligibility.insert(p.tag.clone(), p);
            }
        }

        if let Some(tip) = tip_event {
            let ready: Vec<String> = self
                .pending_eligibility
                .iter()
                .filter(|(_, p)| scheduler.is_eligible_for_storage(p.final_event, tip))
                .map(|(tag, _)| tag.clone())
                .collect();
            for tag in ready {
                if let Some(p) = self.pending_eligibility.remove(&tag) {
                    self.pending_application.insert(tag, p);
                }
            }
        }
    }

    /// Indices greater than `limit` that ought to receive cached states this
    /// pass, merging three strategies and sorting the union ascending by
    /// index: the scheduler's own picks, one pointer per distinct source
    /// seen scanning the tail backward, and a rotating "recent window" of
    /// small-spacing positions near the tip.
    pub fn get_states_to_cache<T>(
        &self,
        cycle_start: u64,
        events: &[Event<T>],
        limit: i64,
        scheduler: &dyn SnapshotScheduler,
        config: &Config,
    ) -> Vec<TaggedIndex> {
        let keys: Vec<EventKey> = events.iter().map(|e| e.key).collect();
        let mut out = scheduler.get_snapshot_levels(cycle_start, &keys, limit);

        if config.per_source_caching {
            out.extend(per_source_indices(events, limit, config.per_source_scan_all));
        }

        out.extend(recent_window_indices(
            events.len(),
            config.recent_window,
            config.recent_window_spacing,
            limit,
            cycle_start,
        ));

        out.sort_by_key(|t| t.index);
        out.dedup_by(|a, b| a.tag == b.tag && a.index == b.index);
        out
    }
}

/// Scan the buffer tail backward, marking one position per newly-seen
/// source. By default (`scan_all = false`) this stops at the very first
/// source found — the tip's own — since continuing costs one cached state
/// per active source in the aggregate.
fn per_source_indices<T>(events: &[Event<T>], limit: i64, scan_all: bool) -> Vec<TaggedIndex> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (idx, event) in events.iter().enumerate().rev() {
        if idx as i64 <= limit {
            break;
        }
        if seen.insert(event.key.stream) {
            out.push(TaggedIndex {
                tag: format!("source:{}", event.key.stream),
                index: idx,
                persist_as_local: false,
            });
            if !scan_all {
                break;
            }
        }
    }
    out
}

/// One representative position per `spacing`-wide bucket within the last
/// `window` buffer positions, walking down from the tip. The representative
/// within each bucket is shifted by `cycle_start % spacing` so that two
/// aggregates hydrated at different cycles don't all converge on the same
/// physical offsets, and the bucket number (not the raw index) becomes the
/// tag so a bucket's cache line is reused call over call instead of
/// accumulating a fresh tag per tip advance.
fn recent_window_indices(len: usize, window: usize, spacing: usize, limit: i64, cycle_start: u64) -> Vec<TaggedIndex> {
    if len == 0 || window == 0 || spacing == 0 {
        return Vec::new();
    }
    let tip = len - 1;
    let lowest = tip.saturating_sub(window - 1);
    let offset = (cycle_start % spacing as u64) as usize;

    let mut out = Vec::new();
    let mut bucket_start = tip;
    let mut bucket = 0usize;
    loop {
        let candidate = bucket_start.saturating_sub(offset).max(lowest);
        if candidate as i64 > limit {
            out.push(TaggedIndex {
                tag: format!("recent:{}", bucket % spacing),
                index: candidate,
                persist_as_local: false,
            });
        }
        if bucket_start < lowest + spacing {
            break;
        }
        bucket_start -= spacing;
        bucket += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::StrideScheduler;
    use ax_event_sdk::{LamportTimestamp, Metadata, Offset, StreamId};

    fn ev(lamport: u64, stream_tag: u8) -> Event<i32> {
        let mut bytes = [0u8; 32];
        bytes[0] = stream_tag;
        let node = ax_event_sdk::NodeId::from_bytes(&bytes).unwrap();
        Event {
            key: EventKey {
                lamport: LamportTimestamp::from(lamport),
                stream: node.stream(0u64.into()),
                offset: Offset::from(lamport as u32),
            },
            meta: Metadata::default(),
            payload: 0,
        }
    }

    fn key(lamport: u64) -> EventKey {
        EventKey {
            lamport: LamportTimestamp::from(lamport),
            stream: StreamId::min(),
            offset: Offset::from(lamport as u32),
        }
    }

    #[test]
    fn invalidate_down_to_drops_entries_above_index() {
        let mut table: StatePointerTable<i32> = StatePointerTable::new();
        table.ephemeral.insert(
            "a".into(),
            Pointer { tag: "a".into(), index: 3, state: 1, final_event: key(3), offsets: OffsetMap::empty(), persist_as_local: false },
        );
        table.ephemeral.insert(
            "b".into(),
            Pointer { tag: "b".into(), index: 7, state: 2, final_event: key(7), offsets: OffsetMap::empty(), persist_as_local: false },
        );
        table.invalidate_down_to(5);
        assert_eq!(table.ephemeral_len(), 1);
        assert!(table.latest_stored().unwrap().index == 3);
    }

    #[test]
    fn shift_back_drops_negative_indices() {
        let mut table: StatePointerTable<i32> = StatePointerTable::new();
        table.ephemeral.insert(
            "a".into(),
            Pointer { tag: "a".into(), index: 2, state: 1, final_event: key(2), offsets: OffsetMap::empty(), persist_as_local: false },
        );
        table.ephemeral.insert(
            "b".into(),
            Pointer { tag: "b".into(), index: 9, state: 2, final_event: key(9), offsets: OffsetMap::empty(), persist_as_local: false },
        );
        table.shift_back(5);
        assert_eq!(table.ephemeral_len(), 1);
        assert_eq!(table.latest_stored().unwrap().index, 4);
    }

    #[test]
    fn latest_stored_is_none_when_empty() {
        let table: StatePointerTable<i32> = StatePointerTable::new();
        assert!(table.latest_stored().is_none());
    }

    #[test]
    fn per_source_default_config_caches_only_tip_source() {
        let events = vec![ev(1, 1), ev(2, 1), ev(3, 2), ev(4, 3)];
        let idx = per_source_indices(&events, -1, false);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx[0].index, 3);
    }

    #[test]
    fn per_source_scan_all_finds_every_distinct_source() {
        let events = vec![ev(1, 1), ev(2, 1), ev(3, 2), ev(4, 3)];
        let idx = per_source_indices(&events, -1, true);
        assert_eq!(idx.len(), 3);
    }

    #[test]
    fn get_states_to_cache_respects_limit_and_sorts_ascending() {
        let table: StatePointerTable<i32> = StatePointerTable::new();
        let events: Vec<Event<i32>> = (0..40).map(|i| ev(i, (i % 3) as u8)).collect();
        let scheduler = StrideScheduler::default();
        let config = Config::default();
        let picks = table.get_states_to_cache(0, &events, 10, &scheduler, &config);
        assert!(picks.iter().all(|t| t.index as i64 > 10));
        let indices: Vec<usize> = picks.iter().map(|t| t.index).collect();
        let mut sorted = indices.clone();
        sorted.sort();
        assert_eq!(indices, sorted);
    }
}
