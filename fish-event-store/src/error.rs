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
use ax_event_sdk::EventKey;
use derive_more::{Display, Error};

use crate::aggregate::AggregateId;

/// Which collaborator call a failure occurred in, carried on every [`Error`]
/// so driver-side logging can group by operation without parsing messages.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    OnEvent,
    IsReset,
    DeserializeState,
    SerializeState,
    Store,
    Retrieve,
    Invalidate,
}

/// Everything that can go wrong while driving a single aggregate.
///
/// Every variant carries the aggregate it happened to, the [`Operation`] that
/// failed, and the triggering [`EventKey`] where one exists, per the
/// structured-context requirement on all user-observable failures.
#[derive(Debug, Display, Error)]
pub enum Error {
    #[display(fmt = "{}: fold failed at {:?}: {}", aggregate, at, source)]
    OnEventFailed {
        aggregate: AggregateId,
        at: Option<EventKey>,
        #[error(source)]
        source: anyhow::Error,
    },
    #[display(fmt = "{}: is_reset failed at {:?}: {}", aggregate, at, source)]
    IsResetFailed {
        aggregate: AggregateId,
        at: Option<EventKey>,
        #[error(source)]
        source: anyhow::Error,
    },
    #[display(fmt = "{}: could not deserialize snapshot state: {}", aggregate, source)]
    DeserializeStateFailed {
        aggregate: AggregateId,
        #[error(source)]
        source: anyhow::Error,
    },
    #[display(fmt = "{}: could not serialize state at {:?}: {}", aggregate, at, source)]
    SerializeStateFailed {
        aggregate: AggregateId,
        at: Option<EventKey>,
        #[error(source)]
        source: anyhow::Error,
    },
    #[display(fmt = "{}: snapshot store rejected store() at {:?}: {}", aggregate, at, source)]
    SnapshotStoreStoreFailed {
        aggregate: AggregateId,
        at: Option<EventKey>,
        #[error(source)]
        source: anyhow::Error,
    },
    #[display(fmt = "{}: snapshot store invalidate() failed at {:?}: {}", aggregate, at, source)]
    SnapshotStoreInvalidateFailed {
        aggregate: AggregateId,
        at: Option<EventKey>,
        #[error(source)]
        source: anyhow::Error,
    },
    #[display(fmt = "{}: event store request failed: {}", aggregate, source)]
    EventStoreFailed {
        aggregate: AggregateId,
        #[error(source)]
        source: anyhow::Error,
    },
    #[display(fmt = "{}: invariant violated: {}", aggregate, message)]
    InvariantViolation {
        aggregate: AggregateId,
        #[error(ignore)]
        message: String,
    },
}

impl Error {
    pub fn operation(&self) -> Operation {
        match self {
            Error::OnEventFailed { .. } => Operation::OnEvent,
            Error::IsResetFailed { .. } => Operation::IsReset,
            Error::DeserializeStateFailed { .. } => Operation::DeserializeState,
            Error::SerializeStateFailed { .. } => Operation::SerializeState,
            Error::SnapshotStoreStoreFailed { .. } => Operation::Store,
            Error::SnapshotStoreInvalidateFailed { .. } => Operation::Invalidate,
            Error::EventStoreFailed { .. } => Operation::Retrieve,
            Error::InvariantViolation { .. } => Operation::OnEvent,
        }
    }

    pub fn aggregate(&self) -> &AggregateId {
        match self {
            Error::OnEventFailed { aggregate, .. }
            | Error::IsResetFailed { aggregate, .. }
            | Error::DeserializeStateFailed { aggregate, .. }
            | Error::SerializeStateFailed { aggregate, .. }
            | Error::SnapshotStoreStoreFailed { aggregate, .. }
            | Error::SnapshotStoreInvalidateFailed { aggregate, .. }
            | Error::EventStoreFailed { aggregate, .. }
            | Error::InvariantViolation { aggregate, .. } => aggregate,
        }
    }

    /// Whether this failure is fatal to the owning aggregate instance (per
    /// the recovery table), as opposed to one the orchestrator logs and
    /// continues past.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::OnEventFailed { .. }
                | Error::IsResetFailed { .. }
                | Error::SnapshotStoreInvalidateFailed { .. }
                | Error::EventStoreFailed { .. }
                | Error::InvariantViolation { .. }
        )
    }
}
