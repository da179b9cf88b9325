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

//! Archetype keys and column storage
//!
//! An [`Archetype`] is the exact set of component types an entity carries.
//! Types are kept in ascending `TypeId` order so that `(A, B)` and `(B, A)`
//! name the same archetype. Each type also gets a column slot and a byte
//! offset inside an aligned, packed row.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::component::{Component, ComponentInfo, ComponentSet, ComponentValue};
use crate::error::{EcsError, Result};

/// Per-type metadata inside an archetype
#[derive(Debug, Clone, Copy)]
pub struct ComponentMetadata {
    pub info: ComponentInfo,
    /// Column slot used for indexed access
    pub column: usize,
    /// Byte offset of the value inside a packed row
    pub offset: usize,
}

/// Canonical component type set
#[derive(Clone)]
pub struct Archetype {
    metadata: Arc<[ComponentMetadata]>,
    row_size: usize,
}

impl Archetype {
    /// Build from a type list. The list must describe a set.
    pub fn new(types: &[ComponentInfo]) -> Result<Self> {
        let mut sorted: SmallVec<[ComponentInfo; 8]> = SmallVec::from_slice(types);
        sorted.sort();

        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(EcsError::DuplicateComponentType(pair[0].name()));
        }

        let mut offset = 0;
        let mut metadata = Vec::with_capacity(sorted.len());
        for (column, info) in sorted.into_iter().enumerate() {
            offset = align_offset(offset, info.align());
            metadata.push(ComponentMetadata {
                info,
                column,
                offset,
            });
            offset += info.size();
        }

        Ok(Self {
            metadata: metadata.into(),
            row_size: align_offset(offset, 8),
        })
    }

    /// Archetype for a compile-time component set
    pub fn of<S: ComponentSet>() -> Result<Self> {
        Self::new(&S::infos())
    }

    pub fn empty() -> Self {
        Self {
            metadata: Arc::from(Vec::new()),
            row_size: 0,
        }
    }

    pub fn metadata(&self) -> &[ComponentMetadata] {
        &self.metadata
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.metadata.iter().map(|meta| meta.info.type_id())
    }

    pub fn infos(&self) -> impl Iterator<Item = ComponentInfo> + '_ {
        self.metadata.iter().map(|meta| meta.info)
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Column slot of a component type
    pub fn column_index(&self, type_id: TypeId) -> Option<usize> {
        self.metadata
            .binary_search_by(|meta| meta.info.type_id().cmp(&type_id))
            .ok()
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.column_index(type_id).is_some()
    }

    /// True when every given type is part of this archetype
    pub fn contains_all(&self, types: &[ComponentInfo]) -> bool {
        types.iter().all(|info| self.contains(info.type_id()))
    }

    /// Size of one packed row, rounded up to 8 bytes
    pub fn row_size(&self) -> usize {
        self.row_size
    }
}

fn align_offset(offset: usize, alignment: usize) -> usize {
    let alignment = alignment.max(1);
    (offset + alignment - 1) & !(alignment - 1)
}

impl PartialEq for Archetype {
    fn eq(&self, other: &Self) -> bool {
        self.metadata.len() == other.metadata.len() && self.type_ids().eq(other.type_ids())
    }
}

impl Eq for Archetype {}

impl Hash for Archetype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.metadata.len().hash(state);
        for type_id in self.type_ids() {
            type_id.hash(state);
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.metadata.iter().map(|meta| meta.info.name()))
            .finish()
    }
}

/// Type-erased column of component values
pub trait Column: Send + Sync {
    fn push(&mut self, value: Box<dyn ComponentValue>) -> Result<()>;

    /// Move the last value into `row`
    fn swap_remove(&mut self, row: usize);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn component_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense column for one component type
pub struct TypedColumn<T> {
    data: Vec<T>,
}

impl<T: Component> TypedColumn<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn get(&self, row: usize) -> Option<&T> {
        self.data.get(row)
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.data.get_mut(row)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Component> Default for TypedColumn<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> Column for TypedColumn<T> {
    fn push(&mut self, value: Box<dyn ComponentValue>) -> Result<()> {
        let found = value.info().name();
        match value.into_any().downcast::<T>() {
            Ok(value) => {
                self.data.push(*value);
                Ok(())
            }
            Err(_) => Err(EcsError::ComponentTypeMismatch {
                expected: std::any::type_name::<T>(),
                found,
            }),
        }
    }

    fn swap_remove(&mut self, row: usize) {
        if row < self.data.len() {
            self.data.swap_remove(row);
        }
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn component_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Rows of every entity filed under one archetype (Structure of Arrays)
pub struct ArchetypeTable {
    archetype: Archetype,
    entities: Vec<u32>,
    columns: Vec<Box<dyn Column>>,
}

impl ArchetypeTable {
    pub fn new(archetype: Archetype) -> Self {
        let columns = archetype
            .metadata()
            .iter()
            .map(|meta| meta.info.new_column())
            .collect();
        Self {
            archetype,
            entities: Vec::new(),
            columns,
        }
    }

    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    pub fn entities(&self) -> &[u32] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Order values by column slot, rejecting anything outside the archetype
    pub fn arrange(
        archetype: &Archetype,
        components: Vec<Box<dyn ComponentValue>>,
    ) -> Result<Vec<Box<dyn ComponentValue>>> {
        if components.len() != archetype.len() {
            return Err(EcsError::ComponentCountMismatch {
                expected: archetype.len(),
                found: components.len(),
            });
        }

        let mut slots: SmallVec<[Option<Box<dyn ComponentValue>>; 8]> =
            (0..archetype.len()).map(|_| None).collect();
        for value in components {
            let info = value.info();
            let column = archetype.column_index(info.type_id()).ok_or(
                EcsError::ComponentTypeMismatch {
                    expected: "a type of the target archetype",
                    found: info.name(),
                },
            )?;
            if slots[column].replace(value).is_some() {
                return Err(EcsError::DuplicateComponentType(info.name()));
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Append a row. `ordered` must come from [`ArchetypeTable::arrange`].
    pub fn push_row(&mut self, entity: u32, ordered: Vec<Box<dyn ComponentValue>>) -> Result<usize> {
        if ordered.len() != self.columns.len() {
            return Err(EcsError::ComponentCountMismatch {
                expected: self.columns.len(),
                found: ordered.len(),
            });
        }
        for (column, value) in self.columns.iter_mut().zip(ordered) {
            column.push(value)?;
        }
        self.entities.push(entity);
        Ok(self.entities.len() - 1)
    }

    /// Remove a row and return the entity that was swapped into it
    pub fn swap_remove_row(&mut self, row: usize) -> Option<u32> {
        if row >= self.entities.len() {
            return None;
        }

        self.entities.swap_remove(row);
        for column in &mut self.columns {
            column.swap_remove(row);
        }

        self.entities.get(row).copied()
    }

    /// Typed column at a slot
    pub fn column_at<T: Component>(&self, index: usize) -> Result<&TypedColumn<T>> {
        let column = self.columns.get(index).ok_or(EcsError::ColumnOutOfRange {
            index,
            columns: self.columns.len(),
        })?;
        (**column)
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
            .ok_or(EcsError::ComponentTypeMismatch {
                expected: std::any::type_name::<T>(),
                found: column.component_name(),
            })
    }

    pub fn column_at_mut<T: Component>(&mut self, index: usize) -> Result<&mut TypedColumn<T>> {
        let columns = self.columns.len();
        let column = self
            .columns
            .get_mut(index)
            .ok_or(EcsError::ColumnOutOfRange { index, columns })?;
        let found = column.component_name();
        (**column)
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .ok_or(EcsError::ComponentTypeMismatch {
                expected: std::any::type_name::<T>(),
                found,
            })
    }

    /// Dense slice of one component type
    pub fn column<T: Component>(&self) -> Option<&[T]> {
        let index = self.archetype.column_index(TypeId::of::<T>())?;
        self.column_at::<T>(index).ok().map(TypedColumn::as_slice)
    }
}
