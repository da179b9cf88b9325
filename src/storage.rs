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

//! Authoritative component storage
//!
//! One bucket per component type, each bucket mapping entity id to the boxed
//! value. Buckets carry their own lock, so writers of different types never
//! contend. Buckets are created on first use and live as long as the store.
//!
//! Membership (which entity holds which types) is mirrored in a separately
//! locked index, so `contains`, `component_types_of` and
//! `entities_with_type` never wait on a bucket and stay callable while a
//! component handle is held.

use std::any::TypeId;

use ahash::{AHashMap, AHashSet};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use smallvec::SmallVec;

use crate::component::{Component, ComponentInfo, ComponentValue};
use crate::error::{EcsError, Result};

type Bucket = RwLock<AHashMap<u32, Box<dyn ComponentValue>>>;

/// Live mutable handle to a stored component
///
/// Holds the write lock of the component's bucket until dropped.
pub type ComponentMut<'a, T> = MappedRwLockWriteGuard<'a, T>;

/// Live shared handle to a stored component
pub type ComponentRef<'a, T> = MappedRwLockReadGuard<'a, T>;

/// Who holds what. Only ever locked after a bucket, never before one.
#[derive(Default)]
struct Membership {
    by_entity: AHashMap<u32, SmallVec<[ComponentInfo; 8]>>,
    by_type: AHashMap<TypeId, AHashSet<u32>>,
}

impl Membership {
    fn insert(&mut self, entity: u32, info: ComponentInfo) {
        let types = self.by_entity.entry(entity).or_default();
        if let Err(pos) = types.binary_search(&info) {
            types.insert(pos, info);
        }
        self.by_type.entry(info.type_id()).or_default().insert(entity);
    }

    fn remove(&mut self, entity: u32, type_id: TypeId) {
        if let Some(types) = self.by_entity.get_mut(&entity) {
            types.retain(|info| info.type_id() != type_id);
            if types.is_empty() {
                self.by_entity.remove(&entity);
            }
        }
        if let Some(holders) = self.by_type.get_mut(&type_id) {
            holders.remove(&entity);
        }
    }
}

#[derive(Default)]
pub struct ComponentStore {
    buckets: RwLock<AHashMap<TypeId, Box<Bucket>>>,
    membership: RwLock<Membership>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    // The three accessors below hand out `&Bucket` past the map guard.
    // Buckets are boxed and never removed from the map, so the pointee stays
    // put for as long as `self` is borrowed.

    fn bucket(&self, type_id: TypeId) -> Option<&Bucket> {
        let buckets = self.buckets.read();
        let bucket: *const Bucket = &**buckets.get(&type_id)?;
        // SAFETY: boxed, never removed (see above)
        Some(unsafe { &*bucket })
    }

    fn bucket_or_create(&self, type_id: TypeId) -> &Bucket {
        if let Some(bucket) = self.bucket(type_id) {
            return bucket;
        }
        let mut buckets = self.buckets.write();
        let bucket: *const Bucket = &**buckets.entry(type_id).or_default();
        // SAFETY: boxed, never removed (see above)
        unsafe { &*bucket }
    }

    fn all_buckets(&self) -> SmallVec<[&Bucket; 16]> {
        let buckets = self.buckets.read();
        buckets
            .values()
            .map(|bucket| {
                let bucket: *const Bucket = &**bucket;
                // SAFETY: boxed, never removed (see above)
                unsafe { &*bucket }
            })
            .collect()
    }

    /// Store a value, returning the one it replaced
    pub fn insert_erased(
        &self,
        entity: u32,
        value: Box<dyn ComponentValue>,
    ) -> Option<Box<dyn ComponentValue>> {
        let info = value.info();
        let mut bucket = self.bucket_or_create(info.type_id()).write();
        let replaced = bucket.insert(entity, value);
        self.membership.write().insert(entity, info);
        replaced
    }

    /// Store a value and hand back a live handle to it
    pub fn insert<T: Component>(&self, entity: u32, value: T) -> Result<ComponentMut<'_, T>> {
        let mut guard = self.bucket_or_create(TypeId::of::<T>()).write();
        guard.insert(entity, Box::new(value));
        self.membership
            .write()
            .insert(entity, ComponentInfo::of::<T>());
        RwLockWriteGuard::try_map(guard, |bucket| downcast_mut::<T>(bucket, entity))
            .map_err(|_| not_found::<T>(entity))
    }

    pub fn get<T: Component>(&self, entity: u32) -> Result<ComponentMut<'_, T>> {
        let bucket = self
            .bucket(TypeId::of::<T>())
            .ok_or_else(|| not_found::<T>(entity))?;
        RwLockWriteGuard::try_map(bucket.write(), |bucket| downcast_mut::<T>(bucket, entity))
            .map_err(|_| not_found::<T>(entity))
    }

    pub fn get_ref<T: Component>(&self, entity: u32) -> Result<ComponentRef<'_, T>> {
        let bucket = self
            .bucket(TypeId::of::<T>())
            .ok_or_else(|| not_found::<T>(entity))?;
        RwLockReadGuard::try_map(bucket.read(), |bucket| {
            bucket
                .get(&entity)
                .and_then(|value| (**value).as_any().downcast_ref::<T>())
        })
        .map_err(|_| not_found::<T>(entity))
    }

    pub fn remove<T: Component>(&self, entity: u32) -> Option<T> {
        self.remove_erased(entity, TypeId::of::<T>())
            .and_then(|value| value.into_any().downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn remove_erased(&self, entity: u32, type_id: TypeId) -> Option<Box<dyn ComponentValue>> {
        let mut bucket = self.bucket(type_id)?.write();
        let removed = bucket.remove(&entity)?;
        self.membership.write().remove(entity, type_id);
        Some(removed)
    }

    pub fn contains<T: Component>(&self, entity: u32) -> bool {
        self.contains_type(entity, TypeId::of::<T>())
    }

    pub fn contains_type(&self, entity: u32, type_id: TypeId) -> bool {
        self.membership
            .read()
            .by_type
            .get(&type_id)
            .is_some_and(|holders| holders.contains(&entity))
    }

    /// Remove every component of an entity and return the values
    pub fn destroy_entity_components(&self, entity: u32) -> Vec<Box<dyn ComponentValue>> {
        self.component_types_of(entity)
            .into_iter()
            .filter_map(|info| self.remove_erased(entity, info.type_id()))
            .collect()
    }

    /// Types currently stored for an entity, sorted
    pub fn component_types_of(&self, entity: u32) -> SmallVec<[ComponentInfo; 8]> {
        self.membership
            .read()
            .by_entity
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clone_erased(&self, entity: u32, type_id: TypeId) -> Option<Box<dyn ComponentValue>> {
        self.bucket(type_id)?
            .read()
            .get(&entity)
            .map(|value| (**value).clone_value())
    }

    /// Entity ids holding a component type, ascending
    pub fn entities_with_type(&self, type_id: TypeId) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .membership
            .read()
            .by_type
            .get(&type_id)
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn bucket_len(&self, type_id: TypeId) -> usize {
        self.membership
            .read()
            .by_type
            .get(&type_id)
            .map_or(0, |holders| holders.len())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Drop every stored value. Buckets themselves stay allocated.
    pub fn clear(&self) {
        for bucket in self.all_buckets() {
            bucket.write().clear();
        }
        *self.membership.write() = Membership::default();
    }
}

fn downcast_mut<T: Component>(
    bucket: &mut AHashMap<u32, Box<dyn ComponentValue>>,
    entity: u32,
) -> Option<&mut T> {
    bucket
        .get_mut(&entity)
        .and_then(|value| (**value).as_any_mut().downcast_mut::<T>())
}

fn not_found<T: Component>(entity: u32) -> EcsError {
    EcsError::ComponentNotFound {
        component: std::any::type_name::<T>(),
        entity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(i32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Armor(i32);

    #[test]
    fn test_handle_mutates_stored_value() -> Result<()> {
        let store = ComponentStore::new();
        {
            let mut health = store.insert(1, Health(10))?;
            health.0 -= 3;
        }
        assert_eq!(*store.get_ref::<Health>(1)?, Health(7));
        Ok(())
    }

    #[test]
    fn test_missing_component_is_not_found() {
        let store = ComponentStore::new();
        assert!(matches!(
            store.get::<Health>(1),
            Err(EcsError::ComponentNotFound { entity: 1, .. })
        ));
        store.insert_erased(2, Box::new(Health(1)));
        assert!(store.get::<Health>(1).is_err());
    }

    #[test]
    fn test_insert_replaces_and_returns_old() {
        let store = ComponentStore::new();
        assert!(store.insert_erased(1, Box::new(Health(1))).is_none());
        let old = store.insert_erased(1, Box::new(Health(2)));
        let old = old.and_then(|value| value.into_any().downcast::<Health>().ok());
        assert_eq!(old.map(|value| *value), Some(Health(1)));
        assert_eq!(store.bucket_len(TypeId::of::<Health>()), 1);
    }

    #[test]
    fn test_destroy_removes_every_type() {
        let store = ComponentStore::new();
        store.insert_erased(1, Box::new(Health(1)));
        store.insert_erased(1, Box::new(Armor(1)));
        store.insert_erased(2, Box::new(Armor(2)));

        assert_eq!(store.component_types_of(1).len(), 2);
        assert_eq!(store.destroy_entity_components(1).len(), 2);
        assert!(store.component_types_of(1).is_empty());
        assert!(store.contains::<Armor>(2));
        assert_eq!(store.entities_with_type(TypeId::of::<Armor>()), vec![2]);
    }

    #[test]
    fn test_handles_of_different_types_coexist() -> Result<()> {
        let store = ComponentStore::new();
        store.insert_erased(1, Box::new(Health(1)));
        store.insert_erased(1, Box::new(Armor(1)));

        let mut health = store.get::<Health>(1)?;
        let mut armor = store.get::<Armor>(1)?;
        health.0 += 1;
        armor.0 += 1;
        drop((health, armor));

        assert_eq!(store.remove::<Health>(1), Some(Health(2)));
        assert_eq!(store.remove::<Health>(1), None);
        Ok(())
    }

    #[test]
    fn test_membership_answers_while_handle_is_held() -> Result<()> {
        let store = ComponentStore::new();
        store.insert_erased(1, Box::new(Health(1)));
        store.insert_erased(2, Box::new(Health(2)));
        store.insert_erased(2, Box::new(Armor(2)));

        let mut health = store.get::<Health>(1)?;
        health.0 += 1;
        assert!(store.contains::<Health>(2));
        assert!(!store.contains::<Armor>(1));
        assert_eq!(store.entities_with_type(TypeId::of::<Health>()), vec![1, 2]);
        assert_eq!(store.component_types_of(2).len(), 2);
        assert_eq!(store.bucket_len(TypeId::of::<Health>()), 2);
        drop(health);

        store.remove::<Health>(2);
        assert_eq!(store.entities_with_type(TypeId::of::<Health>()), vec![1]);
        assert_eq!(store.component_types_of(2).len(), 1);
        store.clear();
        assert!(store.component_types_of(1).is_empty());
        assert_eq!(store.bucket_len(TypeId::of::<Health>()), 0);
        Ok(())
    }
}
