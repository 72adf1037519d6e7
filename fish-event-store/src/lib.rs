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
//! The Fish Event Store: the monotonic, per-aggregate event-sourcing engine
//! that drives one "Fish" (a named, versioned finite-state machine) through
//! hydration from persistent storage and then through live updates.
//!
//! An aggregate's state is a pure fold over a filtered, globally ordered
//! stream of events emitted by many distributed sources. This crate owns:
//! the event buffer and its out-of-order ("time travel") merge (`buffer`),
//! the cache of intermediate fold results (`pointers`), the policy deciding
//! where to cache and when a cache becomes a durable local snapshot
//! (`scheduler`), the monotonic holders for the latest local and semantic
//! snapshots (`snapshot`), and the glue tying all of the above into one
//! aggregate's lifecycle (`orchestrator`).
//!
//! The wire/websocket transport, the persistent event and snapshot stores'
//! internals, the serialization format of user state, the top-level command
//! pipeline, and tag-query parsing are external collaborators; this crate
//! only specifies the interfaces it needs from them (`store`).

pub mod aggregate;
pub mod buffer;
pub mod config;
pub mod error;
pub mod fold;
pub mod orchestrator;
pub mod pointers;
pub mod scheduler;
pub mod snapshot;
pub mod store;

pub use aggregate::AggregateId;
pub use buffer::{ChangeReport, EventBuffer};
pub use config::{Config, ConflictPolicy, SchedulerConfig};
pub use error::{Error, Operation};
pub use fold::{Fold, IsReset};
pub use orchestrator::{FishEventStore, FishEventStoreConfig, Stats};
pub use pointers::{Pointer, StatePointerTable, TaggedIndex};
pub use scheduler::{SnapshotScheduler, StrideScheduler};
pub use snapshot::{LatestSnapshots, LocalSnapshot};
pub use store::{EventPredicate, EventStore, Order, SnapshotStore};
