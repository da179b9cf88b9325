//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use atom_ecs::prelude::*;
//! ```

pub use crate::component::{Component, ComponentSet, ComponentTag};
pub use crate::config::WorldConfig;
pub use crate::entity::Entity;
pub use crate::error::{EcsError, Result};
pub use crate::query::{EntityQuery, GroupedQuery};
pub use crate::resources::Disposable;
pub use crate::storage::{ComponentMut, ComponentRef};
pub use crate::system::{RenderSystem, System, SystemId};
pub use crate::world::World;
