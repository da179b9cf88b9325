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

//! Entity identifiers and the id/version allocator.

use std::collections::VecDeque;
use std::fmt;

use ahash::AHashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};

/// Entity handle: id plus the version it was issued with.
///
/// An id alone is not a valid reference once it has been recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub id: u32,
    pub version: u32,
}

impl Entity {
    pub const fn new(id: u32, version: u32) -> Self {
        Self { id, version }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.version)
    }
}

#[derive(Debug, Clone, Copy)]
struct EntitySlot {
    version: u32,
    alive: bool,
}

/// Allocation state guarded by a single lock
struct Allocator {
    next_id: u32,
    recycled: VecDeque<u32>,
}

/// Id/version allocator owned by one world.
///
/// Allocation and recycling are serialized through one mutex. Version
/// lookups only touch the slot map and never wait on allocation.
pub struct EntityRegistry {
    allocator: Mutex<Allocator>,
    slots: RwLock<AHashMap<u32, EntitySlot>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocator: Mutex::new(Allocator {
                next_id: 0,
                recycled: VecDeque::new(),
            }),
            slots: RwLock::new(AHashMap::with_capacity(capacity)),
        }
    }

    /// Allocate an entity, preferring the oldest recycled id.
    pub fn create(&self) -> Entity {
        let mut allocator = self.allocator.lock();
        let id = match allocator.recycled.pop_front() {
            Some(id) => id,
            None => {
                let id = allocator.next_id;
                allocator.next_id = allocator
                    .next_id
                    .checked_add(1)
                    .unwrap_or_else(|| panic!("Entity ID exhaustion at {id:#x}"));
                id
            }
        };

        // Slot write happens under the allocator lock so two creators can
        // never observe the same recycled id.
        let mut slots = self.slots.write();
        let slot = slots.entry(id).or_insert(EntitySlot {
            version: 0,
            alive: false,
        });
        slot.alive = true;
        Entity::new(id, slot.version)
    }

    /// Invalidate the handle and queue its id for reuse.
    ///
    /// Returns false (and does nothing) when the handle is already stale.
    pub fn destroy(&self, entity: Entity) -> bool {
        let mut allocator = self.allocator.lock();
        {
            let mut slots = self.slots.write();
            match slots.get_mut(&entity.id) {
                Some(slot) if slot.alive && slot.version == entity.version => {
                    slot.alive = false;
                    slot.version = slot.version.wrapping_add(1);
                }
                _ => return false,
            }
        }
        allocator.recycled.push_back(entity.id);
        true
    }

    pub fn is_valid(&self, id: u32, version: u32) -> bool {
        matches!(
            self.slots.read().get(&id),
            Some(slot) if slot.alive && slot.version == version
        )
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.is_valid(entity.id, entity.version)
    }

    /// Current handle for a live id
    pub fn current(&self, id: u32) -> Option<Entity> {
        self.slots
            .read()
            .get(&id)
            .filter(|slot| slot.alive)
            .map(|slot| Entity::new(id, slot.version))
    }

    /// All live entities ordered by id
    pub fn alive(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.alive)
            .map(|(&id, slot)| Entity::new(id, slot.version))
            .collect();
        entities.sort_unstable();
        entities
    }

    pub fn len(&self) -> usize {
        self.slots.read().values().filter(|slot| slot.alive).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids waiting to be reissued
    pub fn recycled_count(&self) -> usize {
        self.allocator.lock().recycled.len()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const STRUCTURAL_SHARDS: usize = 64;

/// Sharded locks that serialize structural changes per entity id
///
/// Adding, removing and destroying run under the shard of their entity,
/// so a destroy can never interleave with an add on the same id and a
/// recycled id starts out empty. Entities sharing a shard just queue up.
pub struct EntityLocks {
    shards: Box<[Mutex<()>]>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self {
            shards: (0..STRUCTURAL_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn lock(&self, id: u32) -> MutexGuard<'_, ()> {
        self.shards[id as usize % self.shards.len()].lock()
    }
}

impl Default for EntityLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_valid() {
        let registry = EntityRegistry::new();
        let a = registry.create();
        let b = registry.create();
        assert_eq!(a, Entity::new(0, 0));
        assert_eq!(b, Entity::new(1, 0));
        assert!(registry.is_valid(a.id, a.version));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_destroy_bumps_version_and_recycles() {
        let registry = EntityRegistry::new();
        let a = registry.create();
        assert!(registry.destroy(a));
        assert!(!registry.is_alive(a));
        assert_eq!(registry.recycled_count(), 1);

        let reused = registry.create();
        assert_eq!(reused.id, a.id);
        assert_ne!(reused.version, a.version);
        assert!(!registry.is_alive(a));
        assert!(registry.is_alive(reused));
    }

    #[test]
    fn test_double_destroy_is_noop() {
        let registry = EntityRegistry::new();
        let a = registry.create();
        assert!(registry.destroy(a));
        assert!(!registry.destroy(a));
        assert_eq!(registry.recycled_count(), 1);
    }

    #[test]
    fn test_dead_slot_with_bumped_version_is_not_valid() {
        let registry = EntityRegistry::new();
        let a = registry.create();
        registry.destroy(a);
        assert!(!registry.is_valid(a.id, a.version + 1));
        assert!(registry.current(a.id).is_none());
    }

    #[test]
    fn test_entity_locks_share_shards_by_id() {
        let locks = EntityLocks::new();
        let _a = locks.lock(1);
        let _b = locks.lock(2);
        assert!(locks.shards[(1 + STRUCTURAL_SHARDS) % STRUCTURAL_SHARDS].try_lock().is_none());
        assert!(locks.shards[3].try_lock().is_some());
    }

    #[test]
    fn test_parallel_creation_issues_unique_ids() {
        let registry = EntityRegistry::new();
        let mut all = Vec::new();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| (0..250).map(|_| registry.create()).collect::<Vec<_>>()))
                .collect();
            for handle in handles {
                all.extend(handle.join().unwrap());
            }
        });
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
