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

//! Error types

use std::fmt;

use crate::system::SystemId;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity handle is stale or was never issued
    InvalidEntity { id: u32, version: u32 },

    /// Entity has no component of the requested type
    ComponentNotFound { component: &'static str, entity: u32 },

    /// Archetype type list contained the same type twice
    DuplicateComponentType(&'static str),

    /// Number of component values does not match the archetype type list
    ComponentCountMismatch { expected: usize, found: usize },

    /// Entity is not filed in any archetype
    EntityNotInArchetype(u32),

    /// Column index outside the archetype's type list
    ColumnOutOfRange { index: usize, columns: usize },

    /// Column holds a different component type than requested
    ComponentTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// System declared a dependency on itself
    SelfDependency(SystemId),

    /// Dependency would close a cycle; carries the detected path
    CyclicDependency { path: Vec<SystemId> },

    /// System is not registered with the world
    SystemNotRegistered(SystemId),

    /// Execution levels could not be computed (graph contains a cycle)
    UnresolvableLevels { remaining: usize },

    /// A system failed during its tick
    SystemUpdateFailure { system: String, reason: String },

    /// Configuration rejected
    InvalidConfig(String),

    /// Global tracing subscriber could not be installed
    LoggerInit(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidEntity { id, version } => {
                write!(f, "Entity {id}v{version} is not valid")
            }
            EcsError::ComponentNotFound { component, entity } => {
                write!(f, "Component {component} not found for entity {entity}")
            }
            EcsError::DuplicateComponentType(name) => {
                write!(f, "Duplicate component type in archetype: {name}")
            }
            EcsError::ComponentCountMismatch { expected, found } => write!(
                f,
                "Component count mismatch: archetype has {expected} types, got {found} values"
            ),
            EcsError::EntityNotInArchetype(id) => {
                write!(f, "Entity {id} not found in archetype pool")
            }
            EcsError::ColumnOutOfRange { index, columns } => {
                write!(f, "Column index {index} out of range ({columns} columns)")
            }
            EcsError::ComponentTypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {expected}, got {found}")
            }
            EcsError::SelfDependency(id) => write!(f, "System {id} cannot depend on itself"),
            EcsError::CyclicDependency { path } => {
                let path = path
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                write!(f, "Circular dependency detected. Cycle path: {path}")
            }
            EcsError::SystemNotRegistered(id) => {
                write!(f, "System {id} must be added to the world first")
            }
            EcsError::UnresolvableLevels { remaining } => write!(
                f,
                "Circular dependency detected during execution level calculation ({remaining} systems left)"
            ),
            EcsError::SystemUpdateFailure { system, reason } => {
                write!(f, "Error updating system {system}: {reason}")
            }
            EcsError::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            EcsError::LoggerInit(msg) => write!(f, "Failed to initialize logging: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::InvalidConfig(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_path_display() {
        let err = EcsError::CyclicDependency {
            path: vec![SystemId(0), SystemId(2), SystemId(0)],
        };
        assert_eq!(
            err.to_string(),
            "Circular dependency detected. Cycle path: #0 -> #2 -> #0"
        );
    }
}
