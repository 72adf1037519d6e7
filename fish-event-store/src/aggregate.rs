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
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a running Fish: which kind of state machine it is
/// (`entity_type`), which instance (`name`), and which generation of the
/// fold/state shape it speaks (`version`).
///
/// Used verbatim as the snapshot-store key and as logging context; bumping
/// `version` is how a code change that is incompatible with existing
/// snapshots is signalled (old snapshots are simply never retrieved under
/// the new version, per §6: "Snapshots for different version values are
/// isolated").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregateId {
    pub entity_type: String,
    pub name: String,
    pub version: u32,
}

impl AggregateId {
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>, version: u32) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-v{}", self.entity_type, self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_display_form() {
        let id = AggregateId::new("inventory", "warehouse-7", 3);
        assert_eq!(id.to_string(), "inventory-warehouse-7-v3");
    }
}
