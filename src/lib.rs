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

//! Atom ECS - Entity Component System core of the Atom scene editor
//!
//! Versioned entity handles, type-erased component storage with archetype
//! grouping, a lazy query builder, and a dependency graph that runs systems
//! level by level in parallel.

pub mod archetype;
pub mod component;
pub mod config;
pub mod dependency;
pub mod entity;
pub mod error;
pub mod executor;
#[cfg(feature = "profiling")]
pub mod logging;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod resources;
pub mod storage;
pub mod system;
pub mod world;


pub use archetype::*;
pub use component::*;
pub use config::*;
pub use dependency::*;
pub use entity::*;
pub use error::*;
pub use executor::{ExecutionProfile, SystemTiming};
pub use pool::*;
pub use query::*;
pub use resources::*;
pub use storage::*;
pub use system::*;
pub use world::*;
