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

/// Tunable knobs for a [`crate::orchestrator::FishEventStore`] instance.
///
/// Passed in at construction, following the Actyx convention of explicit
/// config structs with `Default` impls rather than global state or env-var
/// lookups: configuration *loading* is the outer driver's concern, the FES
/// only exposes the struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Width of the "recent window" strategy in [`crate::pointers::StatePointerTable`]:
    /// only the last `recent_window` buffer positions are eligible for a
    /// rotating-tag cache pointer.
    pub recent_window: usize,
    /// Spacing between recent-window cache positions.
    pub recent_window_spacing: usize,
    /// Whether to additionally cache one pointer per distinct source seen
    /// scanning the buffer tail backward.
    pub per_source_caching: bool,
    /// The per-source strategy's cost flag: when false (the default) it
    /// stops after the first (tip-most) source; when true it keeps
    /// scanning backward and caches a pointer for every distinct source it
    /// passes, at proportionally higher memory cost.
    pub per_source_scan_all: bool,
    /// How policy disputes over in-flight ("conflict") aggregate statistics
    /// are resolved; spec.md leaves this as an open question rather than a
    /// silently picked default.
    pub conflict_policy: ConflictPolicy,
    /// §4.4.2: when no `is_reset` predicate is configured, hydration ingests
    /// ascending chunks without computing any fold until hydration finishes.
    /// Setting this interleaves `current_state()` calls during hydration
    /// itself (once the buffer has grown past `min_events_for_snapshot` and
    /// at least `recent_window` fresh events have arrived since the last
    /// interleaved fold), so long histories can start forming local
    /// snapshots before the very first live state is requested.
    pub interleave_snapshots_during_hydration: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recent_window: 32,
            recent_window_spacing: 8,
            per_source_caching: true,
            per_source_scan_all: false,
            conflict_policy: ConflictPolicy::ExcludeInFlight,
            interleave_snapshots_during_hydration: true,
        }
    }
}

/// How to treat statistics over an aggregate while it is mid-shatter
/// ("conflict state" in spec.md's source vocabulary, §9): the source notes
/// these may be computed incorrectly and declines to silently pick a rule,
/// so the FES exposes this as an explicit, driver-chosen policy instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Statistics (e.g. `stats()` buffer/pointer counts) reflect only the
    /// post-shatter, reconciled state; in-flight shatter bookkeeping is
    /// hidden from callers until it resolves.
    ExcludeInFlight,
    /// Statistics are best-effort and reflect whatever is in memory right
    /// now, including the transient pre-shatter buffer contents.
    BestEffort,
}

/// Tunable knobs for a [`crate::scheduler::SnapshotScheduler`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Below this buffer length, `min_events_for_snapshot` lets the
    /// orchestrator skip snapshot work entirely.
    pub min_events_for_snapshot: usize,
    /// Smallest stride (in events) at which a snapshot level is considered.
    pub small_stride: usize,
    /// Medium stride, taken every `medium_stride` events.
    pub medium_stride: usize,
    /// Largest stride, taken every `large_stride` events.
    pub large_stride: usize,
    /// Minimum number of events that must separate a candidate snapshot
    /// point from the current tip before it is eligible for storage, to
    /// reduce thrash from near-tip snapshots that would likely shatter soon.
    pub min_age_events: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_events_for_snapshot: 16,
            small_stride: 4,
            medium_stride: 32,
            large_stride: 256,
            min_age_events: 4,
        }
    }
}
