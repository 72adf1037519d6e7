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
use ax_event_sdk::{Event, EventKey, OffsetMap};
use serde::{Deserialize, Serialize};

/// A persisted, serialized state together with everything needed to decide
/// later whether it is still valid: which events it already accounts for
/// (`offsets`), the key of the last one folded in (`event_key`), the
/// horizon in force when it was taken, and a strictly-increasing `cycle`
/// used both for scheduler spacing and to arbitrate racing writes (the
/// snapshot store keeps whichever `store` call carries the greater cycle).
///
/// Modeled directly on `StoreSnapshotRequest`/`RetrieveSnapshotResponse` in
/// the Actyx event service, generalized from a `String` blob to a generic
/// `Blob` so the FES never has an opinion on the wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalSnapshot<Blob> {
    pub state_blob: Blob,
    pub offsets: OffsetMap,
    pub event_key: EventKey,
    pub horizon: Option<EventKey>,
    pub cycle: u64,
}

/// The two monotonic "latest snapshot" slots an aggregate holds: the last
/// semantic reset event seen, and the last local snapshot persisted.
/// Neither slot may be overwritten by a value with an EventKey at or behind
/// the one it already holds — clearing is unconstrained.
#[derive(Debug, Clone)]
pub struct LatestSnapshots<T, Blob> {
    semantic: Option<Event<T>>,
    local: Option<LocalSnapshot<Blob>>,
}

impl<T, Blob> Default for LatestSnapshots<T, Blob> {
    fn default() -> Self {
        Self { semantic: None, local: None }
    }
}

impl<T, Blob> LatestSnapshots<T, Blob> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn semantic(&self) -> Option<&Event<T>> {
        self.semantic.as_ref()
    }

    pub fn local(&self) -> Option<&LocalSnapshot<Blob>> {
        self.local.as_ref()
    }

    /// Record `event` as the latest semantic reset, rejecting it (returning
    /// `false`, leaving the slot untouched) if it is not strictly newer than
    /// whatever is already held.
    pub fn set_semantic(&mut self, event: Event<T>) -> bool {
        if let Some(current) = &self.semantic {
            if event.key <= current.key {
                return false;
            }
        }
        self.semantic = Some(event);
        true
    }

    pub fn clear_semantic(&mut self) {
        self.semantic = None;
    }

    /// Record `snapshot` as the latest local snapshot, rejecting it
    /// (returning `false`) if its `event_key` is not strictly newer than the
    /// one already held.
    pub fn set_local(&mut self, snapshot: LocalSnapshot<Blob>) -> bool {
        if let Some(current) = &self.local {
            if snapshot.event_key <= current.event_key {
                return false;
            }
        }
        self.local = Some(snapshot);
        true
    }

    pub fn clear_local(&mut self) {
        self.local = None;
    }

    /// The horizon in force: the semantic reset's own key if one is held
    /// (it *is* the horizon), else the local snapshot's carried horizon, if
    /// any.
    pub fn horizon(&self) -> Option<EventKey> {
        self.semantic
            .as_ref()
            .map(|e| e.key)
            .or_else(|| self.local.as_ref().and_then(|s| s.horizon))
    }

    /// §4.4.6: derive a value from whichever snapshot is authoritative,
    /// preferring the semantic slot over the local slot over neither.
    pub fn from_semantic_from_local_or_default<S>(
        &self,
        f_sem: impl FnOnce(&Event<T>) -> S,
        f_loc: impl FnOnce(&LocalSnapshot<Blob>) -> S,
        default: S,
    ) -> S {
        if let Some(sem) = &self.semantic {
            f_sem(sem)
        } else if let Some(loc) = &self.local {
            f_loc(loc)
        } else {
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_event_sdk::{LamportTimestamp, Metadata, Offset, StreamId};

    fn key(lamport: u64) -> EventKey {
        EventKey {
            lamport: LamportTimestamp::from(lamport),
            stream: StreamId::min(),
            offset: Offset::from(lamport as u32),
        }
    }

    fn event(lamport: u64, payload: i32) -> Event<i32> {
        Event { key: key(lamport), meta: Metadata::default(), payload }
    }

    fn snap(lamport: u64, cycle: u64) -> LocalSnapshot<String> {
        LocalSnapshot {
            state_blob: "state".to_string(),
            offsets: OffsetMap::empty(),
            event_key: key(lamport),
            horizon: None,
            cycle,
        }
    }

    #[test]
    fn semantic_rejects_non_monotonic_update() {
        let mut holder: LatestSnapshots<i32, String> = LatestSnapshots::new();
        assert!(holder.set_semantic(event(5, 1)));
        assert!(!holder.set_semantic(event(5, 2)));
        assert!(!holder.set_semantic(event(3, 3)));
        assert!(holder.set_semantic(event(9, 4)));
        assert_eq!(holder.semantic().unwrap().payload, 4);
    }

    #[test]
    fn local_rejects_non_monotonic_update() {
        let mut holder: LatestSnapshots<i32, String> = LatestSnapshots::new();
        assert!(holder.set_local(snap(5, 1)));
        assert!(!holder.set_local(snap(5, 2)));
        assert!(holder.set_local(snap(6, 2)));
    }

    #[test]
    fn prefers_semantic_over_local_over_default() {
        let mut holder: LatestSnapshots<i32, String> = LatestSnapshots::new();
        assert_eq!(holder.from_semantic_from_local_or_default(|_| 1, |_| 2, 3), 3);
        holder.set_local(snap(5, 1));
        assert_eq!(holder.from_semantic_from_local_or_default(|_| 1, |_| 2, 3), 2);
        holder.set_semantic(event(9, 7));
        assert_eq!(holder.from_semantic_from_local_or_default(|_| 1, |_| 2, 3), 1);
    }

    #[test]
    fn horizon_prefers_semantic_key_then_local_horizon() {
        let mut holder: LatestSnapshots<i32, String> = LatestSnapshots::new();
        assert_eq!(holder.horizon(), None);
        let mut with_horizon = snap(5, 1);
        with_horizon.horizon = Some(key(2));
        holder.set_local(with_horizon);
        assert_eq!(holder.horizon(), Some(key(2)));
        holder.set_semantic(event(9, 1));
        assert_eq!(holder.horizon(), Some(key(9)));
    }
}
