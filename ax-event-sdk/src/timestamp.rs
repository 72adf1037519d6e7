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
use chrono::{DateTime, TimeZone, Utc};
use derive_more::{Add, AddAssign, Display, From, Into, Sub, SubAssign};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the UNIX epoch, without leap seconds and in UTC
#[derive(Copy, Clone, Debug, Default, From, Into, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeStamp(u64);

impl TimeStamp {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
    pub fn now() -> TimeStamp {
        let now = SystemTime::now();
        let duration = now.duration_since(UNIX_EPOCH).expect("system clock before 1970");
        TimeStamp::new(duration.as_micros() as u64)
    }
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<TimeStamp> for DateTime<Utc> {
    fn from(t: TimeStamp) -> Self {
        Utc.timestamp((t.0 / 1_000_000) as i64, (t.0 % 1_000_000) as u32 * 1000)
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_nanos() as u64 / 1000)
    }
}

/// Causal (not wall-clock) ordering counter. Every node increments its own
/// Lamport clock on each event it emits and whenever it observes a greater
/// value from elsewhere; a single source never reuses the same value.
///
/// Sorting by Lamport timestamp (and then by stream, to break ties between
/// concurrent sources) gives the total order the Fish Event Store requires,
/// even though this order may not track wall-clock time across a network
/// partition: two groups of disconnected nodes keep advancing their own
/// clocks, and the group that emitted fewer events sorts earlier once they
/// reconnect, regardless of which group's events actually happened later.
#[derive(
    Copy, Clone, Debug, Default, Display, From, Into, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[derive(Add, AddAssign, Sub, SubAssign)]
pub struct LamportTimestamp(u64);

impl LamportTimestamp {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns a Lamport timestamp strictly greater than both `self` and `other`.
    pub fn incr(self, other: LamportTimestamp) -> LamportTimestamp {
        LamportTimestamp(self.0.max(other.0) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incr_is_strictly_greater() {
        let a = LamportTimestamp::from(3);
        let b = LamportTimestamp::from(7);
        let c = a.incr(b);
        assert!(c > a);
        assert!(c > b);
    }
}
