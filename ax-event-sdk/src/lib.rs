/*
 * Copyright 2020 Actyx AG
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
//! Shared event-sourcing vocabulary: the total order over events
//! (`EventKey`), the event envelope (`Event`), per-source progress
//! (`OffsetMap`), and the small scalar types used to build them.
//!
//! This crate does not know anything about folds, snapshots, or the
//! Fish Event Store itself — it only defines the data that flows
//! through it.

mod scalar;

mod event;
mod offset;
mod scalars;
mod tags;
mod timestamp;
pub mod types;

#[cfg(any(test, feature = "arb"))]
pub mod arb;

pub use event::{Event, EventKey, Metadata, Opaque, Payload};
pub use offset::{Offset, OffsetMap, OffsetOrMin};
pub use scalars::{NodeId, StreamId, StreamNr};
pub use tags::{Tag, TagSet};
pub use timestamp::{LamportTimestamp, TimeStamp};

use derive_more::Display;

#[derive(Debug, Display, PartialEq, Eq)]
pub enum ParseError {
    #[display(fmt = "Empty string is not permissible for Tag")]
    EmptyTag,
    #[display(fmt = "Empty string is not permissible for StreamId component")]
    EmptyStreamComponent,
}
impl std::error::Error for ParseError {}
