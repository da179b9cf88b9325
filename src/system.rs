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

//! System traits

use std::fmt;

use crate::error::Result;
use crate::World;

/// System ID, issued by the world in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u32);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-tick logic run by [`World::update`]
///
/// Systems receive a shared `&World`. Systems in the same execution level
/// may run concurrently, so anything they touch goes through the world's
/// locked accessors.
pub trait System: Send {
    /// Name used in logs and profiles
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called once before the first update this system takes part in
    fn initialize(&mut self, _world: &World) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, world: &World, delta_time: f32) -> Result<()>;
}

/// Rendering pass, run sequentially by [`World::render`] in registration order
pub trait RenderSystem: Send {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn initialize(&mut self, _world: &World) -> Result<()> {
        Ok(())
    }

    fn render(&mut self, world: &World, delta_time: f32) -> Result<()>;
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

/// Boxed render system
pub type BoxedRenderSystem = Box<dyn RenderSystem>;
