// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World configuration

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};

/// Tunables for a [`crate::World`]
///
/// Missing JSON fields fall back to [`WorldConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Initial capacity of the entity slot map
    pub entity_capacity: usize,
    /// Initial capacity of the archetype table map
    pub archetype_capacity: usize,
    /// Run systems of one level on the rayon pool
    pub parallel_update: bool,
    /// Keep the timing profile of the last update
    pub record_profile: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 1024,
            archetype_capacity: 64,
            parallel_update: true,
            record_profile: true,
        }
    }
}

impl WorldConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.entity_capacity == 0 {
            return Err(EcsError::InvalidConfig(
                "entity_capacity must be greater than zero".into(),
            ));
        }
        if self.archetype_capacity == 0 {
            return Err(EcsError::InvalidConfig(
                "archetype_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
