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

//! Archetype pool: entities grouped by their exact component set
//!
//! The pool holds column copies of component values for cache-friendly
//! iteration. The component store stays the source of truth; the world
//! refiles an entity here whenever its component set changes.

use ahash::AHashMap;

use crate::archetype::{Archetype, ArchetypeTable};
use crate::component::{Component, ComponentInfo, ComponentSet, ComponentValue};
use crate::error::{EcsError, Result};

/// Where an entity's row lives
#[derive(Debug, Clone)]
pub struct EntityLocation {
    pub archetype: Archetype,
    pub row: usize,
}

#[derive(Default)]
pub struct ArchetypePool {
    tables: AHashMap<Archetype, ArchetypeTable>,
    locations: AHashMap<u32, EntityLocation>,
}

impl ArchetypePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(archetypes: usize) -> Self {
        Self {
            tables: AHashMap::with_capacity(archetypes),
            locations: AHashMap::new(),
        }
    }

    /// File an entity under the archetype described by `types`
    ///
    /// Any previous row of the entity is removed first. Validation happens
    /// before that, so a rejected call leaves the pool untouched.
    pub fn add_entity_to_archetype(
        &mut self,
        entity: u32,
        components: Vec<Box<dyn ComponentValue>>,
        types: &[ComponentInfo],
    ) -> Result<()> {
        let archetype = Archetype::new(types)?;
        let ordered = ArchetypeTable::arrange(&archetype, components)?;

        self.detach(entity);

        let table = match self.tables.entry(archetype.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                tracing::debug!(archetype = ?archetype, "creating archetype table");
                entry.insert(ArchetypeTable::new(archetype.clone()))
            }
        };
        let row = table.push_row(entity, ordered)?;
        self.locations
            .insert(entity, EntityLocation { archetype, row });
        Ok(())
    }

    /// Drop an entity's row. Absent entities are ignored.
    pub fn remove_entity(&mut self, entity: u32) -> bool {
        self.detach(entity)
    }

    fn detach(&mut self, entity: u32) -> bool {
        let Some(location) = self.locations.remove(&entity) else {
            return false;
        };

        if let Some(table) = self.tables.get_mut(&location.archetype) {
            if let Some(moved) = table.swap_remove_row(location.row) {
                if let Some(moved_location) = self.locations.get_mut(&moved) {
                    moved_location.row = location.row;
                }
            }
            if table.is_empty() {
                self.tables.remove(&location.archetype);
            }
        }
        true
    }

    /// Entities whose set is exactly `S`
    pub fn entities_with<S: ComponentSet>(&self) -> Result<&[u32]> {
        let archetype = Archetype::of::<S>()?;
        Ok(self.entities_in(&archetype))
    }

    pub fn entities_in(&self, archetype: &Archetype) -> &[u32] {
        self.tables
            .get(archetype)
            .map_or(&[][..], ArchetypeTable::entities)
    }

    /// Entities whose set contains every type of `S`, ascending by id
    pub fn entities_having<S: ComponentSet>(&self) -> Vec<u32> {
        let types = S::infos();
        let mut ids: Vec<u32> = self
            .tables
            .values()
            .filter(|table| table.archetype().contains_all(&types))
            .flat_map(|table| table.entities().iter().copied())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Column copy of one component of an entity
    ///
    /// `index` is the column slot inside the entity's archetype, see
    /// [`Archetype::column_index`].
    pub fn get_component<T: Component>(&self, entity: u32, index: usize) -> Result<&T> {
        let location = self
            .locations
            .get(&entity)
            .ok_or(EcsError::EntityNotInArchetype(entity))?;
        let table = self
            .tables
            .get(&location.archetype)
            .ok_or(EcsError::EntityNotInArchetype(entity))?;
        table
            .column_at::<T>(index)?
            .get(location.row)
            .ok_or(EcsError::EntityNotInArchetype(entity))
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: u32, index: usize) -> Result<&mut T> {
        let location = self
            .locations
            .get(&entity)
            .ok_or(EcsError::EntityNotInArchetype(entity))?;
        let row = location.row;
        let table = self
            .tables
            .get_mut(&location.archetype)
            .ok_or(EcsError::EntityNotInArchetype(entity))?;
        table
            .column_at_mut::<T>(index)?
            .get_mut(row)
            .ok_or(EcsError::EntityNotInArchetype(entity))
    }

    /// Dense column of `T` inside one archetype
    pub fn column<T: Component>(&self, archetype: &Archetype) -> Option<&[T]> {
        self.tables.get(archetype)?.column::<T>()
    }

    pub fn archetype_of(&self, entity: u32) -> Option<&Archetype> {
        self.locations.get(&entity).map(|location| &location.archetype)
    }

    pub fn location(&self, entity: u32) -> Option<&EntityLocation> {
        self.locations.get(&entity)
    }

    pub fn contains(&self, entity: u32) -> bool {
        self.locations.contains_key(&entity)
    }

    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> + '_ {
        self.tables.keys()
    }

    pub fn tables(&self) -> impl Iterator<Item = &ArchetypeTable> + '_ {
        self.tables.values()
    }

    pub fn archetype_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of filed entities
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.locations.clear();
    }
}
