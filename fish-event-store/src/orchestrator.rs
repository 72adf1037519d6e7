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
//! The FES Orchestrator: the full per-aggregate lifecycle — hydrate,
//! process incoming batches, compute the current state, persist and apply
//! local snapshots, detect and perform shatter.
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use ax_event_sdk::{Event, EventKey, OffsetMap};
use futures::{future::BoxFuture, stream::StreamExt};

use crate::{
    aggregate::AggregateId,
    buffer::EventBuffer,
    config::Config,
    error::Error,
    fold::{Fold, IsReset},
    pointers::{Pointer, StatePointerTable},
    scheduler::SnapshotScheduler,
    snapshot::{LatestSnapshots, LocalSnapshot},
    store::{EventPredicate, EventStore, Order, SnapshotStore},
};

/// A user-supplied `state -> blob` serializer. Separate from `serde`'s own
/// traits because the FES treats state as opaque and lets the caller choose
/// the wire format (CBOR, JSON, whatever the snapshot store expects).
pub type StateSerializer<S, Blob> = Arc<dyn Fn(&S) -> Result<Blob, anyhow::Error> + Send + Sync>;
/// The inverse of [`StateSerializer`].
pub type StateDeserializer<S, Blob> = Arc<dyn Fn(&Blob) -> Result<S, anyhow::Error> + Send + Sync>;

/// Everything about one aggregate that does not change across its lifetime:
/// identity, the user-supplied fold/reset/serde functions, the filter
/// selecting which events belong to it, and the collaborators it is wired
/// to. Constructing this is the "info" half of `spec.md`'s
/// `initialize(info, event_store, snapshot_store, scheduler, present_offsets)`.
pub struct FishEventStoreConfig<S, T, Blob>
where
    T: Send + Sync + 'static,
    Blob: Send + Sync + 'static,
{
    pub id: AggregateId,
    pub initial_state: S,
    pub fold: Fold<S, T>,
    pub is_reset: Option<IsReset<T>>,
    pub serialize: StateSerializer<S, Blob>,
    pub deserialize: StateDeserializer<S, Blob>,
    pub filter: EventPredicate<T>,
    pub event_store: Arc<dyn EventStore<T>>,
    pub snapshot_store: Arc<dyn SnapshotStore<Blob>>,
    pub scheduler: Arc<dyn SnapshotScheduler>,
    pub config: Config,
}

/// A shatter queued by `start_or_continue_shattering`, executed lazily the
/// next time `current_state` is called (§4.4.4).
#[derive(Debug, Clone)]
struct ShatterPending {
    earliest: EventKey,
    rehydrate_up_to: OffsetMap,
}

/// Read-only introspection, supplementing `spec.md`'s own `current_events`/
/// `validate` debug accessors (see `SPEC_FULL.md` §4.6). Has no effect on
/// FES semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub buffer_len: usize,
    pub ephemeral: usize,
    pub pending_eligibility: usize,
    pub pending_application: usize,
    pub has_local_snapshot: bool,
    pub has_semantic_snapshot: bool,
    pub shatter_pending: bool,
}

/// Drives one aggregate through hydration and live updates.
///
/// Per §5, `process_events`/`current_state` take `&mut self`: the type
/// system itself rules out the "invoked concurrently on the same instance"
/// case the spec forbids. Across aggregates, instances are fully
/// independent and share only the `Arc`-held store/scheduler handles.
pub struct FishEventStore<S, T, Blob>
where
    T: Send + Sync + 'static,
    Blob: Send + Sync + 'static,
{
    id: AggregateId,
    initial_state: S,
    fold: Fold<S, T>,
    is_reset: Option<IsReset<T>>,
    serialize: StateSerializer<S, Blob>,
    deserialize: StateDeserializer<S, Blob>,
    filter: EventPredicate<T>,
    event_store: Arc<dyn EventStore<T>>,
    snapshot_store: Arc<dyn SnapshotStore<Blob>>,
    scheduler: Arc<dyn SnapshotScheduler>,
    config: Config,

    buffer: EventBuffer<T>,
    pointers: StatePointerTable<S>,
    latest: LatestSnapshots<T, Blob>,
    shatter_pending: Option<ShatterPending>,
    recompute_local_snapshots: bool,
    /// Number of local snapshots ever persisted for this aggregate; doubles
    /// as the `cycle_start` argument to the scheduler's level strategies so
    /// stride positions are reproducible across runs.
    cycle: u64,
    present: OffsetMap,
}

impl<S, T, Blob> FishEventStore<S, T, Blob>
where
    S: Clone,
    T: Clone + Send + Sync + 'static,
    Blob: Clone + Send + Sync + 'static,
{
    /// Construct and hydrate an aggregate up to `present_offsets` (§4.4.2).
    pub async fn initialize(cfg: FishEventStoreConfig<S, T, Blob>, present_offsets: OffsetMap) -> Result<Self, Error> {
        let mut this = Self {
            id: cfg.id,
            initial_state: cfg.initial_state,
            fold: cfg.fold,
            is_reset: cfg.is_reset,
            serialize: cfg.serialize,
            deserialize: cfg.deserialize,
            filter: cfg.filter,
            event_store: cfg.event_store,
            snapshot_store: cfg.snapshot_store,
            scheduler: cfg.scheduler,
            config: cfg.config,
            buffer: EventBuffer::new(),
            pointers: StatePointerTable::new(),
            latest: LatestSnapshots::new(),
            shatter_pending: None,
            recompute_local_snapshots: false,
            cycle: 0,
            present: OffsetMap::empty(),
        };
        this.hydrate(present_offsets).await?;
        Ok(this)
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    /// Introspection for tests (§4.4.1).
    pub fn current_events(&self) -> &[Event<T>] {
        self.buffer.as_slice()
    }

    /// Debug-only diagnostic counters (`SPEC_FULL.md` §4.6). Under
    /// `ConflictPolicy::ExcludeInFlight` the pointer counts are hidden while
    /// a shatter is mid-flight, since they describe a buffer that is about
    /// to be entirely rebuilt and would otherwise misrepresent steady state.
    pub fn stats(&self) -> Stats {
        let hide_pointers = self.shatter_pending.is_some() && matches!(self.config.conflict_policy, crate::config::ConflictPolicy::ExcludeInFlight);
        Stats {
            buffer_len: self.buffer.len(),
            ephemeral: if hide_pointers { 0 } else { self.pointers.ephemeral_len() },
            pending_eligibility: if hide_pointers { 0 } else { self.pointers.pending_eligibility_len() },
            pending_application: if hide_pointers { 0 } else { self.pointers.pending_application_len() },
            has_local_snapshot: self.latest.local().is_some(),
            has_semantic_snapshot: self.latest.semantic().is_some(),
            shatter_pending: self.shatter_pending.is_some(),
        }
    }

    /// Debug-only invariant checker (§4.4.1, invariants 1-5 from §3).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let events = self.buffer.as_slice();

        for pair in events.windows(2) {
            if pair[0].key >= pair[1].key {
                errors.push(format!("buffer not strictly ascending: {:?} >= {:?}", pair[0].key, pair[1].key));
            }
        }

        if let Some(local) = self.latest.local() {
            if let Some(first) = events.first() {
                if first.key <= local.event_key {
                    errors.push(format!(
                        "first buffered event {:?} is not strictly greater than local snapshot event_key {:?}",
                        first.key, local.event_key
                    ));
                }
            }
            if let Some(horizon) = local.horizon {
                if events.iter().any(|e| e.key < horizon) {
                    errors.push(format!("buffer contains an event below local snapshot horizon {:?}", horizon));
                }
            }
        }

        if let Some(ss) = self.latest.semantic() {
            if events.iter().any(|e| e.key <= ss.key) {
                errors.push(format!("buffer contains an event at or below semantic reset key {:?}", ss.key));
            }
        }

        for pointer in self.pointers.all() {
            if pointer.index >= events.len() {
                errors.push(format!("pointer {:?} index {} is out of bounds (buffer len {})", pointer.tag, pointer.index, events.len()));
            }
        }

        errors
    }

    /// Ingest a sorted, deduplicated batch. Returns whether `current_state`
    /// must be called before the next command-derived query (§4.4.1,
    /// §4.4.3). A batch violating the sort/dedup contract is repaired in
    /// place, logged, and processing continues (§4.4.3, §7 "local
    /// recovery").
    pub fn process_events(&mut self, mut batch: Vec<Event<T>>) -> Result<bool, Error> {
        if !batch.windows(2).all(|w| w[0].key < w[1].key) {
            tracing::warn!(aggregate = %self.id, "incoming batch violated sort/dedup contract; repairing");
            batch.sort_by_key(|e| e.key);
            batch.dedup_by_key(|e| e.key);
        }

        if self.is_reset.is_some() {
            self.semantic_insert(batch)
        } else {
            self.ordinary_insert(batch)
        }
    }

    /// Compute the state corresponding to the entire currently known
    /// history, §4.4.5. Recursive and thus boxed: shattering ends in a
    /// rehydrate that itself recurses into `current_state`.
    pub fn current_state(&mut self) -> BoxFuture<'_, Result<(S, OffsetMap), Error>> {
        Box::pin(async move {
            if self.shatter_pending.is_some() {
                return self.perform_shatter().await;
            }

            if self.recompute_local_snapshots {
                self.snapshot_store.invalidate(&self.id, EventKey::zero()).await?;
                self.recompute_local_snapshots = false;
                self.cycle = 0;
            }

            let (mut state, mut offsets, start_index): (S, OffsetMap, i64) = if let Some(p) = self.pointers.latest_stored() {
                (p.state.clone(), p.offsets.clone(), p.index as i64)
            } else {
                let (state, offsets, _horizon) = self.base_state()?;
                (state, offsets, -1)
            };

            let scheduler = Arc::clone(&self.scheduler);
            let events = self.buffer.as_slice().to_vec();
            let tagged = if events.len() >= scheduler.min_events_for_snapshot() {
                self.pointers
                    .get_states_to_cache(self.cycle, &events, start_index, scheduler.as_ref(), &self.config)
            } else {
                Vec::new()
            };

            let mut populated: Vec<Pointer<S>> = Vec::with_capacity(tagged.len());
            let mut cursor = (start_index + 1).max(0) as usize;
            for t in &tagged {
                while cursor <= t.index {
                    let event = &events[cursor];
                    state = self.call_fold(&state, event)?;
                    offsets += &event.key;
                    cursor += 1;
                }
                populated.push(Pointer::from_tagged(t.clone(), state.clone(), events[t.index].key, offsets.clone()));
            }

            while cursor < events.len() {
                let event = &events[cursor];
                state = self.call_fold(&state, event)?;
                offsets += &event.key;
                cursor += 1;
            }

            let tip_event = self.buffer.last_key();
            self.pointers.add_populated_pointers(populated, tip_event, scheduler.as_ref());
            self.persist_pending_snapshots().await?;

            Ok((state, offsets))
        })
    }

    /// §4.4.3 `ordinary_insert`.
    fn ordinary_insert(&mut self, batch: Vec<Event<T>>) -> Result<bool, Error> {
        if batch.is_empty() {
            return Ok(false);
        }
        if self.start_or_continue_shattering(&batch) {
            return Ok(true);
        }
        let report = self.buffer.insert(batch);
        if report.changed {
            self.pointers.invalidate_down_to(report.highest_unmoved_index);
        }
        Ok(report.changed)
    }

    /// §4.4.3 `semantic_insert`.
    fn semantic_insert(&mut self, batch: Vec<Event<T>>) -> Result<bool, Error> {
        let horizon = self.latest.horizon();
        let filtered: Vec<Event<T>> = batch.into_iter().filter(|e| horizon.map_or(true, |h| e.key > h)).collect();

        let mut reset_index = None;
        for (i, event) in filtered.iter().enumerate() {
            if self.call_is_reset(event)? {
                reset_index = Some(i);
            }
        }

        let Some(idx) = reset_index else {
            return self.ordinary_insert(filtered);
        };

        let tail_including_ss = &filtered[idx..];
        if self.start_or_continue_shattering(tail_including_ss) {
            return Ok(true);
        }

        let reset_event = filtered[idx].clone();
        self.latest.set_semantic(reset_event.clone());
        self.recompute_local_snapshots = true;
        self.pointers.clear();
        self.buffer.drop_up_to_and_including(reset_event.key);
        let tail: Vec<Event<T>> = filtered[idx + 1..].to_vec();
        self.buffer.insert(tail);
        Ok(true)
    }

    /// §4.4.4. Only meaningful once a local snapshot is loaded; a fresh
    /// aggregate with no snapshot never shatters (there is nothing stale to
    /// invalidate).
    fn start_or_continue_shattering(&mut self, new_events: &[Event<T>]) -> bool {
        if new_events.is_empty() {
            return self.shatter_pending.is_some();
        }

        if let Some(pending) = &mut self.shatter_pending {
            pending.earliest = pending.earliest.min(new_events[0].key);
            for e in new_events {
                pending.rehydrate_up_to += &e.key;
            }
            return true;
        }

        let Some(local) = self.latest.local() else {
            return false;
        };

        if new_events[0].key >= local.event_key {
            return false;
        }

        let mut rehydrate_up_to = self
            .pointers
            .latest_stored()
            .map(|p| p.offsets.clone())
            .unwrap_or_else(|| local.offsets.clone());
        for e in self.buffer.as_slice() {
            rehydrate_up_to += &e.key;
        }
        for e in new_events {
            rehydrate_up_to += &e.key;
        }

        tracing::info!(aggregate = %self.id, earliest = ?new_events[0].key, "shatter queued: late event predates local snapshot");
        self.shatter_pending = Some(ShatterPending {
            earliest: new_events[0].key,
            rehydrate_up_to,
        });
        self.buffer.clear();
        self.pointers.clear();
        true
    }

    /// §4.4.4 shatter execution.
    async fn perform_shatter(&mut self) -> Result<(S, OffsetMap), Error> {
        let pending = self.shatter_pending.take().expect("checked by caller");
        tracing::info!(aggregate = %self.id, earliest = ?pending.earliest, "shatter executing: invalidating and rehydrating");
        self.snapshot_store.invalidate(&self.id, pending.earliest).await?;
        self.hydrate(pending.rehydrate_up_to).await?;
        self.current_state().await
    }

    /// §4.4.2 hydration: reset internal state, retrieve a local snapshot if
    /// one exists, then branch on whether a semantic-reset predicate is
    /// configured.
    async fn hydrate(&mut self, present_offsets: OffsetMap) -> Result<(), Error> {
        self.buffer.clear();
        self.pointers.clear();
        self.latest = LatestSnapshots::new();
        self.shatter_pending = None;
        self.recompute_local_snapshots = false;
        self.present = present_offsets.clone();

        match self.snapshot_store.retrieve(&self.id).await {
            Ok(Some(snapshot)) => {
                self.cycle = snapshot.cycle;
                self.latest.set_local(snapshot);
            }
            Ok(None) => self.cycle = 0,
            Err(err) => {
                tracing::error!(aggregate = %self.id, error = %err, "snapshot retrieve failed during hydration; starting from initial state");
                self.cycle = 0;
            }
        }

        let (from_offsets, horizon) = self.base_bounds();
        tracing::info!(aggregate = %self.id, ?horizon, "hydration starting");

        if let Some(is_reset) = self.is_reset.clone() {
            let mut stream = self
                .event_store
                .persisted_events(from_offsets, present_offsets.clone(), self.filter.clone(), Order::Descending, horizon)
                .await?;

            // §6: chunks are only internally sorted per `Order`; cross-chunk
            // sortedness is not guaranteed in descending mode, so each new
            // chunk is merged into the consolidated descending sequence
            // before the reset scan runs over it, rather than assumed to
            // continue where the previous chunk left off.
            let mut collected: Vec<Event<T>> = Vec::new();
            let mut reset_at: Option<usize> = None;
            while let Some(chunk) = stream.next().await {
                collected.extend(chunk);
                collected.sort_by(|a, b| b.key.cmp(&a.key));

                reset_at = None;
                for (i, event) in collected.iter().enumerate() {
                    let is_ss = std::panic::catch_unwind(AssertUnwindSafe(|| is_reset(event)))
                        .map_err(|payload| Error::IsResetFailed {
                            aggregate: self.id.clone(),
                            at: Some(event.key),
                            source: panic_payload_to_anyhow(payload),
                        })?;
                    if is_ss {
                        reset_at = Some(i);
                        break;
                    }
                }
                if reset_at.is_some() {
                    break;
                }
            }
            if let Some(i) = reset_at {
                collected.truncate(i + 1);
            }
            collected.reverse();
            self.process_events(collected)?;
        } else {
            let mut stream = self
                .event_store
                .persisted_events(from_offsets, present_offsets.clone(), self.filter.clone(), Order::Ascending, horizon)
                .await?;

            while let Some(chunk) = stream.next().await {
                self.process_events(chunk)?;
                if self.config.interleave_snapshots_during_hydration && self.buffer.len() >= self.scheduler.min_events_for_snapshot() {
                    self.current_state().await?;
                }
            }
        }

        tracing::info!(aggregate = %self.id, events = self.buffer.len(), "hydration finished");
        Ok(())
    }

    /// §4.4.6: derive the fold's starting point from whichever snapshot is
    /// authoritative. A corrupt local snapshot is treated as the transient
    /// `DeserializeStateFailed` recovery calls for: drop it and fall back to
    /// `initial_state` rather than failing the whole aggregate.
    fn base_state(&mut self) -> Result<(S, OffsetMap, Option<EventKey>), Error> {
        if let Some(ss) = self.latest.semantic().cloned() {
            let state = self.call_fold(&self.initial_state.clone(), &ss)?;
            let mut offsets = OffsetMap::empty();
            offsets += &ss.key;
            return Ok((state, offsets, Some(ss.key)));
        }

        if let Some(local) = self.latest.local().cloned() {
            return match (self.deserialize)(&local.state_blob) {
                Ok(state) => Ok((state, local.offsets, local.horizon)),
                Err(source) => {
                    tracing::error!(aggregate = %self.id, %source, "failed to deserialize local snapshot; dropping and starting from initial state");
                    self.latest.clear_local();
                    Ok((self.initial_state.clone(), OffsetMap::empty(), None))
                }
            };
        }

        Ok((self.initial_state.clone(), OffsetMap::empty(), None))
    }

    /// The offsets/horizon bound implied by whichever snapshot is
    /// authoritative, without folding anything — used to scope the
    /// hydration fetch (§4.4.2).
    fn base_bounds(&self) -> (OffsetMap, Option<EventKey>) {
        if let Some(ss) = self.latest.semantic() {
            let mut offsets = OffsetMap::empty();
            offsets += &ss.key;
            (offsets, Some(ss.key))
        } else if let Some(local) = self.latest.local() {
            (local.offsets.clone(), local.horizon)
        } else {
            (OffsetMap::empty(), None)
        }
    }

    /// §4.4.5 step 5: persist everything in `pending_application`, then
    /// promote the highest-index one that was actually stored via
    /// `become_local`.
    async fn persist_pending_snapshots(&mut self) -> Result<(), Error> {
        let to_persist: Vec<Pointer<S>> = self.pointers.get_snapshots_to_persist().into_iter().cloned().collect();
        if to_persist.is_empty() {
            return Ok(());
        }

        let mut promote: Option<(Pointer<S>, LocalSnapshot<Blob>)> = None;
        let horizon = self.latest.horizon();
        // Fixed for the whole batch per §4.4.5 step 5 — each persisted
        // pointer's cycle is `previous_cycle + index_within_persist + 1`,
        // not a running counter updated mid-loop.
        let previous_cycle = self.cycle;
        let mut max_cycle = previous_cycle;

        for (i, pointer) in to_persist.into_iter().enumerate() {
            let blob = match (self.serialize)(&pointer.state) {
                Ok(blob) => blob,
                Err(source) => {
                    tracing::error!(aggregate = %self.id, tag = %pointer.tag, %source, "serialize_state failed; skipping this snapshot");
                    self.pointers.remove_pending_application(&pointer.tag);
                    continue;
                }
            };
            let cycle = previous_cycle + i as u64 + 1;
            let snapshot = LocalSnapshot {
                state_blob: blob,
                offsets: pointer.offsets.clone(),
                event_key: pointer.final_event,
                horizon,
                cycle,
            };

            match self.snapshot_store.store(&self.id, &pointer.tag, snapshot.clone()).await {
                Ok(true) => {
                    self.pointers.remove_pending_application(&pointer.tag);
                    max_cycle = max_cycle.max(cycle);
                    if promote.as_ref().map_or(true, |(h, _)| pointer.index > h.index) {
                        promote = Some((pointer, snapshot));
                    }
                }
                Ok(false) => {
                    tracing::warn!(aggregate = %self.id, tag = %pointer.tag, "snapshot store refused write (stale cycle or version mismatch)");
                }
                Err(err) => {
                    tracing::error!(aggregate = %self.id, tag = %pointer.tag, error = %err, "snapshot store write failed; will retry next current_state()");
                }
            }
        }

        self.cycle = max_cycle;
        if let Some((pointer, snapshot)) = promote {
            self.become_local(pointer, snapshot);
        }
        Ok(())
    }

    /// §4.4.5 step 5 tail: the newly-stored snapshot absorbs everything up
    /// to and including its index, so the buffer front and every pointer
    /// index shift back by that many positions.
    fn become_local(&mut self, pointer: Pointer<S>, snapshot: LocalSnapshot<Blob>) {
        let drop_count = pointer.index + 1;
        tracing::info!(aggregate = %self.id, cycle = snapshot.cycle, event_key = ?snapshot.event_key, "local snapshot persisted and applied");
        self.buffer.drop_front(drop_count);
        self.pointers.shift_back(drop_count);
        self.latest.set_local(snapshot);
        self.latest.clear_semantic();
    }

    /// Fold one event, converting a panic inside the user closure into an
    /// `OnEventFailed` with the triggering key attached, rather than letting
    /// it unwind through the FES's own machinery.
    fn call_fold(&self, state: &S, event: &Event<T>) -> Result<S, Error> {
        let fold = &self.fold;
        std::panic::catch_unwind(AssertUnwindSafe(|| fold(state, event))).map_err(|payload| Error::OnEventFailed {
            aggregate: self.id.clone(),
            at: Some(event.key),
            source: panic_payload_to_anyhow(payload),
        })
    }

    fn call_is_reset(&self, event: &Event<T>) -> Result<bool, Error> {
        let is_reset = self.is_reset.as_ref().expect("semantic_insert only called when is_reset is configured");
        std::panic::catch_unwind(AssertUnwindSafe(|| is_reset(event))).map_err(|payload| Error::IsResetFailed {
            aggregate: self.id.clone(),
            at: Some(event.key),
            source: panic_payload_to_anyhow(payload),
        })
    }
}

fn panic_payload_to_anyhow(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    anyhow::anyhow!(message)
}
