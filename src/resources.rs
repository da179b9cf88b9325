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

//! Disposal tracking for components that own external resources

use std::any::{Any, TypeId};

use ahash::AHashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::component::{Component, ComponentValue};
use crate::entity::Entity;

/// Component owning something that must be released explicitly
/// (GPU buffers, file handles, native windows)
pub trait Disposable {
    fn dispose(&mut self);
}

#[derive(Clone, Copy)]
struct TrackedResource {
    type_id: TypeId,
    name: &'static str,
    dispose: fn(&mut dyn Any),
}

fn dispose_erased<T: Disposable + 'static>(value: &mut dyn Any) {
    if let Some(value) = value.downcast_mut::<T>() {
        value.dispose();
    }
}

/// Per-entity list of disposable component types
#[derive(Default)]
pub struct ResourceManager {
    owned: Mutex<AHashMap<Entity, SmallVec<[TrackedResource; 2]>>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `T` on `owner`. Returns false if it was already tracked.
    pub fn register<T: Component + Disposable>(&self, owner: Entity) -> bool {
        let mut owned = self.owned.lock();
        let tracked = owned.entry(owner).or_default();
        if tracked.iter().any(|res| res.type_id == TypeId::of::<T>()) {
            return false;
        }
        tracked.push(TrackedResource {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            dispose: dispose_erased::<T>,
        });
        true
    }

    pub fn is_tracked(&self, owner: Entity, type_id: TypeId) -> bool {
        self.owned
            .lock()
            .get(&owner)
            .is_some_and(|tracked| tracked.iter().any(|res| res.type_id == type_id))
    }

    /// Number of tracked types on `owner`
    pub fn tracked_count(&self, owner: Entity) -> usize {
        self.owned.lock().get(&owner).map_or(0, SmallVec::len)
    }

    /// Dispose the tracked values among an entity's removed components and
    /// forget the entity. Returns how many values were disposed.
    pub fn cleanup_entity(&self, owner: Entity, removed: &mut [Box<dyn ComponentValue>]) -> usize {
        let Some(tracked) = self.owned.lock().remove(&owner) else {
            return 0;
        };

        let mut disposed = 0;
        for value in removed.iter_mut() {
            let type_id = (**value).info().type_id();
            if let Some(res) = tracked.iter().find(|res| res.type_id == type_id) {
                tracing::debug!(entity = %owner, resource = res.name, "disposing resource");
                (res.dispose)((**value).as_any_mut());
                disposed += 1;
            }
        }
        disposed
    }

    /// Dispose one removed component and stop tracking its type
    pub fn cleanup_resource(&self, owner: Entity, removed: &mut dyn ComponentValue) -> bool {
        let type_id = removed.info().type_id();
        let res = {
            let mut owned = self.owned.lock();
            let Some(tracked) = owned.get_mut(&owner) else {
                return false;
            };
            let Some(pos) = tracked.iter().position(|res| res.type_id == type_id) else {
                return false;
            };
            let res = tracked.swap_remove(pos);
            if tracked.is_empty() {
                owned.remove(&owner);
            }
            res
        };

        tracing::debug!(entity = %owner, resource = res.name, "disposing resource");
        (res.dispose)(removed.as_any_mut());
        true
    }

    /// Dispose a value that was overwritten in place. Tracking is kept,
    /// since the replacement is of the same type.
    pub fn dispose_replaced(&self, owner: Entity, replaced: &mut dyn ComponentValue) -> bool {
        let type_id = replaced.info().type_id();
        let dispose = self.owned.lock().get(&owner).and_then(|tracked| {
            tracked
                .iter()
                .find(|res| res.type_id == type_id)
                .map(|res| res.dispose)
        });

        match dispose {
            Some(dispose) => {
                dispose(replaced.as_any_mut());
                true
            }
            None => false,
        }
    }

    /// Entities with at least one tracked resource
    pub fn len(&self) -> usize {
        self.owned.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Clone)]
    struct Texture {
        released: Arc<AtomicUsize>,
    }

    impl Disposable for Texture {
        fn dispose(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone)]
    struct Name(&'static str);

    #[test]
    fn test_cleanup_only_disposes_tracked_values() {
        let released = Arc::new(AtomicUsize::new(0));
        let manager = ResourceManager::new();
        let owner = Entity::new(1, 0);
        assert!(manager.register::<Texture>(owner));
        assert!(!manager.register::<Texture>(owner));

        let mut removed: Vec<Box<dyn ComponentValue>> = vec![
            Box::new(Texture {
                released: Arc::clone(&released),
            }),
            Box::new(Name("crate")),
        ];
        assert_eq!(manager.cleanup_entity(owner, &mut removed), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
        assert_eq!(manager.cleanup_entity(owner, &mut removed), 0);
    }

    #[test]
    fn test_other_owners_untouched() {
        let released = Arc::new(AtomicUsize::new(0));
        let manager = ResourceManager::new();
        let a = Entity::new(1, 0);
        let b = Entity::new(2, 0);
        manager.register::<Texture>(a);
        manager.register::<Texture>(b);

        let mut texture = Texture {
            released: Arc::clone(&released),
        };
        assert!(manager.cleanup_resource(a, &mut texture));
        assert!(!manager.cleanup_resource(a, &mut texture));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(manager.is_tracked(b, TypeId::of::<Texture>()));
        assert_eq!(manager.tracked_count(a), 0);
    }
}
