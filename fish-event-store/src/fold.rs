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

use ax_event_sdk::Event;

/// A user-supplied pure state transition: `fold(state, event) -> state`.
///
/// Must be deterministic and side-effect-free; the FES guarantees events are
/// presented to it in strict [`ax_event_sdk::EventKey`] order, never in
/// arrival order. Boxed rather than expressed as an associated-type trait
/// because a fold is supplied as a value at construction time, exactly like
/// the consumer-supplied predicates throughout `ax_event_sdk`.
pub type Fold<S, T> = Arc<dyn Fn(&S, &Event<T>) -> S + Send + Sync>;

/// An optional user-supplied predicate marking "semantic snapshot" events:
/// once `is_reset` returns true for an event, everything strictly before it
/// is irrelevant to every future computation of this aggregate's state.
pub type IsReset<T> = Arc<dyn Fn(&Event<T>) -> bool + Send + Sync>;

/// Fold a state through a run of events in order, short-circuiting through
/// `?` so a panic inside the user closure cannot be mistaken for one of the
/// FES's own invariant violations. Callers are expected to wrap user-fold
/// invocation in `std::panic::catch_unwind` at the orchestrator boundary
/// where the `OnEventFailed`/`IsResetFailed` error context is available;
/// this helper only supplies the ordered iteration.
pub fn fold_events<'a, S, T>(fold: &Fold<S, T>, base: &S, events: impl IntoIterator<Item = &'a Event<T>>) -> S
where
    S: Clone,
    T: 'a,
{
    let mut state = base.clone();
    for event in events {
        state = fold(&state, event);
    }
    state
}
