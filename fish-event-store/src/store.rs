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
use std::sync::Arc;

use async_trait::async_trait;
use ax_event_sdk::{Event, EventKey, OffsetMap};
use futures::stream::BoxStream;

use crate::{aggregate::AggregateId, error::Error, snapshot::LocalSnapshot};

/// An opaque predicate over events, exactly as `spec.md` describes it: the
/// FES treats this as a black box and never inspects or parses the query
/// that produced it (that remains tag-query-parsing territory, out of
/// scope).
pub type EventPredicate<T> = Arc<dyn Fn(&Event<T>) -> bool + Send + Sync>;

/// The order in which `persisted_events` delivers its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    /// Strictly ascending by [`EventKey`].
    Ascending,
    /// Strictly descending by [`EventKey`] — the exact reverse. Only the FES
    /// hydration path (§4.4.2, the semantic-reset branch) requests this.
    Descending,
}

/// The persistent, append-only event log the FES reads from.
///
/// Implementations are shared across many concurrently-driven aggregates
/// (`Send + Sync`, handed to the FES behind an `Arc`); the FES holds no
/// lock on it across await points.
#[async_trait]
pub trait EventStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Stream events strictly between `from_offsets_exclusive` and
    /// `to_offsets_inclusive`, matching `filter`, in `order`. Chunks are
    /// internally sorted per `order`; cross-chunk sortedness is only
    /// guaranteed in ascending mode (the FES consolidates descending
    /// chunks itself). `horizon` is an optional server-side hint — the
    /// FES always also enforces it in memory, so an implementation that
    /// ignores the hint is still correct, just less efficient.
    async fn persisted_events(
        &self,
        from_offsets_exclusive: OffsetMap,
        to_offsets_inclusive: OffsetMap,
        filter: EventPredicate<T>,
        order: Order,
        horizon: Option<EventKey>,
    ) -> Result<BoxStream<'static, Vec<Event<T>>>, Error>;

    /// The current known tip offsets, used by the driver (not the FES
    /// directly, except as the "present" bound passed into `initialize`).
    async fn present(&self) -> Result<OffsetMap, Error>;
}

/// The persistent store for local snapshots, keyed by [`AggregateId`].
///
/// Snapshots for different `version` values are isolated: `retrieve` for a
/// mismatched version returns `None` rather than an older-version snapshot.
#[async_trait]
pub trait SnapshotStore<Blob>: Send + Sync
where
    Blob: Send + Sync + 'static,
{
    /// Persist `snapshot` under `tag` (which sub-store strategy/position
    /// produced it, so a scheduler pick and a per-source pick never
    /// collide). Returns whether it was actually stored — an implementation
    /// may refuse a stale `cycle` or a version mismatch without that being
    /// an error.
    async fn store(&self, id: &AggregateId, tag: &str, snapshot: LocalSnapshot<Blob>) -> Result<bool, Error>;

    /// The latest valid snapshot for this exact aggregate id (version
    /// included), if any.
    async fn retrieve(&self, id: &AggregateId) -> Result<Option<LocalSnapshot<Blob>>, Error>;

    /// Drop every snapshot for `id` with `event_key >= at_or_above`. Pass
    /// `EventKey::zero()`-equivalent (the smallest possible key) to drop
    /// all snapshots for this aggregate.
    async fn invalidate(&self, id: &AggregateId, at_or_above: EventKey) -> Result<(), Error>;
}
