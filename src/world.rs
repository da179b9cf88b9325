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

//! World: the facade over entities, components, archetypes and systems
//!
//! Every method takes `&self`, so a world can be shared with systems that
//! run concurrently on the rayon pool. Component handles returned by
//! [`World::add_component`] and [`World::get_component`] hold the lock of
//! their type's bucket; drop them before making structural changes (add,
//! remove, destroy) and before asking for the same value again. Membership
//! checks, archetype lookups and `with`/`without` queries stay usable while
//! a handle is held.
//!
//! Structural changes of one entity are serialized through [`EntityLocks`].
//! Lock order is entity shard, then buckets, then the archetype pool.

use std::any::TypeId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::Archetype;
use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentSet, ComponentTag};
use crate::config::WorldConfig;
use crate::dependency::{ExecutionLevel, SystemDependencyGraph};
use crate::entity::{Entity, EntityLocks, EntityRegistry};
use crate::error::{EcsError, Result};
use crate::executor::{self, ExecutionProfile, RenderSlot, SystemSlot, UpdateSlot};
use crate::pool::ArchetypePool;
use crate::query::EntityQuery;
use crate::resources::{Disposable, ResourceManager};
use crate::storage::{ComponentMut, ComponentRef, ComponentStore};
use crate::system::{RenderSystem, System, SystemId};

/// Central ECS world
pub struct World {
    config: WorldConfig,

    entities: EntityRegistry,

    /// Serializes add/remove/destroy per entity id
    structural: EntityLocks,

    /// Authoritative component values
    components: ComponentStore,

    component_types: ComponentRegistry,

    /// Column copies grouped by exact component set
    archetypes: RwLock<ArchetypePool>,

    /// Per-entity archetype, dropped on every structural change
    archetype_cache: RwLock<AHashMap<u32, Archetype>>,

    resources: ResourceManager,

    systems: RwLock<Vec<UpdateSlot>>,
    render_systems: RwLock<Vec<RenderSlot>>,
    dependency_graph: SystemDependencyGraph,
    next_system_id: AtomicU32,

    last_profile: Mutex<Option<ExecutionProfile>>,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            entities: EntityRegistry::with_capacity(config.entity_capacity),
            structural: EntityLocks::new(),
            components: ComponentStore::new(),
            component_types: ComponentRegistry::new(),
            archetypes: RwLock::new(ArchetypePool::with_capacity(config.archetype_capacity)),
            archetype_cache: RwLock::new(AHashMap::with_capacity(config.entity_capacity)),
            resources: ResourceManager::new(),
            systems: RwLock::new(Vec::new()),
            render_systems: RwLock::new(Vec::new()),
            dependency_graph: SystemDependencyGraph::new(),
            next_system_id: AtomicU32::new(0),
            last_profile: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn create_entity(&self) -> Entity {
        let entity = self.entities.create();
        tracing::trace!(%entity, "created entity");
        entity
    }

    /// Destroy an entity and everything attached to it
    ///
    /// Disposes its tracked resources, drops its components, removes it
    /// from the archetype pool, then retires the handle. Stale handles are
    /// ignored. The id is only recycled once the cleanup is done.
    pub fn destroy_entity(&self, entity: Entity) -> bool {
        let _structural = self.structural.lock(entity.id);
        if !self.is_alive(entity) {
            return false;
        }

        let mut removed = self.components.destroy_entity_components(entity.id);
        let disposed = self.resources.cleanup_entity(entity, &mut removed);
        drop(removed);

        {
            let mut pool = self.archetypes.write();
            pool.remove_entity(entity.id);
            self.archetype_cache.write().remove(&entity.id);
        }

        let destroyed = self.entities.destroy(entity);
        tracing::debug!(%entity, disposed, "destroyed entity");
        destroyed
    }

    pub fn is_entity_valid(&self, id: u32, version: u32) -> bool {
        self.entities.is_valid(id, version)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entities ordered by id
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.alive()
    }

    fn ensure_alive(&self, entity: Entity) -> Result<()> {
        if self.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::InvalidEntity {
                id: entity.id,
                version: entity.version,
            })
        }
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Attach (or overwrite) a component and return a live handle to it
    ///
    /// The entity is refiled under its new archetype before the handle is
    /// returned. An overwritten value that was registered as disposable is
    /// disposed.
    pub fn add_component<T: Component>(&self, entity: Entity, value: T) -> Result<ComponentMut<'_, T>> {
        self.attach(entity, value, None)
    }

    /// Attach a component whose resources are released when the component
    /// or its entity goes away
    pub fn add_disposable_component<T>(&self, entity: Entity, value: T) -> Result<ComponentMut<'_, T>>
    where
        T: Component + Disposable,
    {
        self.attach(entity, value, Some(ResourceManager::register::<T>))
    }

    fn attach<T: Component>(
        &self,
        entity: Entity,
        value: T,
        track: Option<fn(&ResourceManager, Entity) -> bool>,
    ) -> Result<ComponentMut<'_, T>> {
        let structural = self.structural.lock(entity.id);
        self.ensure_alive(entity)?;
        self.component_types.register::<T>();
        if let Some(track) = track {
            track(&self.resources, entity);
        }

        if let Some(mut replaced) = self.components.insert_erased(entity.id, Box::new(value)) {
            self.resources.dispose_replaced(entity, &mut *replaced);
        }
        self.refile(entity)?;

        let handle = self.components.get::<T>(entity.id);
        drop(structural);
        handle
    }

    /// Live mutable handle to a component
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<ComponentMut<'_, T>> {
        self.ensure_alive(entity)?;
        self.components.get::<T>(entity.id)
    }

    /// Shared handle; readers of the same type do not block each other
    pub fn read_component<T: Component>(&self, entity: Entity) -> Result<ComponentRef<'_, T>> {
        self.ensure_alive(entity)?;
        self.components.get_ref::<T>(entity.id)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.has_component_of_type(entity, TypeId::of::<T>())
    }

    pub fn has_component_of_type(&self, entity: Entity, type_id: TypeId) -> bool {
        self.is_alive(entity) && self.components.contains_type(entity.id, type_id)
    }

    /// Membership test for tooling that only knows the runtime tag
    pub fn has_component_by_tag(&self, entity: Entity, tag: ComponentTag) -> bool {
        self.component_types
            .info(tag)
            .is_some_and(|info| self.has_component_of_type(entity, info.type_id()))
    }

    /// Detach a component. Missing components and stale handles are ignored.
    pub fn remove_component<T: Component>(&self, entity: Entity) -> bool {
        let _structural = self.structural.lock(entity.id);
        if !self.is_alive(entity) {
            return false;
        }
        let Some(mut removed) = self.components.remove_erased(entity.id, TypeId::of::<T>()) else {
            return false;
        };

        self.resources.cleanup_resource(entity, &mut *removed);
        if let Err(err) = self.refile(entity) {
            tracing::warn!(%entity, error = %err, "failed to refile entity after component removal");
        }
        true
    }

    pub fn component_registry(&self) -> &ComponentRegistry {
        &self.component_types
    }

    /// Entities holding a component type, ordered by id
    pub fn entities_with_component_type(&self, type_id: TypeId) -> Vec<Entity> {
        self.components
            .entities_with_type(type_id)
            .into_iter()
            .filter_map(|id| self.entities.current(id))
            .collect()
    }

    /// Recompute the entity's component set and refile it
    ///
    /// Callers hold the entity's structural lock, so snapshots of one entity
    /// are filed in the order they were taken. The snapshot is cloned before
    /// the pool lock is taken; bucket waits never happen under it.
    fn refile(&self, entity: Entity) -> Result<()> {
        let mut types: SmallVec<[ComponentInfo; 8]> = SmallVec::new();
        let mut values = Vec::new();
        for info in self.components.component_types_of(entity.id) {
            if let Some(value) = self.components.clone_erased(entity.id, info.type_id()) {
                types.push(info);
                values.push(value);
            }
        }

        let mut pool = self.archetypes.write();
        self.archetype_cache.write().remove(&entity.id);
        if values.is_empty() {
            pool.remove_entity(entity.id);
            return Ok(());
        }
        pool.add_entity_to_archetype(entity.id, values, &types)
    }

    // ------------------------------------------------------------------
    // Archetypes and queries
    // ------------------------------------------------------------------

    /// Entities whose component set is exactly `S`
    pub fn entities_with<S: ComponentSet>(&self) -> Result<Vec<Entity>> {
        let pool = self.archetypes.read();
        Ok(pool
            .entities_with::<S>()?
            .iter()
            .filter_map(|&id| self.entities.current(id))
            .collect())
    }

    /// Entities whose component set contains every type of `S`
    pub fn entities_having<S: ComponentSet>(&self) -> Vec<Entity> {
        let ids = self.archetypes.read().entities_having::<S>();
        ids.into_iter()
            .filter_map(|id| self.entities.current(id))
            .collect()
    }

    /// Current archetype of an entity; `None` for stale or component-less ones
    pub fn entity_archetype(&self, entity: Entity) -> Option<Archetype> {
        if !self.is_alive(entity) {
            return None;
        }
        if let Some(archetype) = self.archetype_cache.read().get(&entity.id) {
            return Some(archetype.clone());
        }

        // Filled under the cache lock so a concurrent refile's invalidation
        // cannot land before this insert.
        let mut cache = self.archetype_cache.write();
        let types = self.components.component_types_of(entity.id);
        if types.is_empty() {
            return None;
        }
        let archetype = Archetype::new(&types).ok()?;
        cache.insert(entity.id, archetype.clone());
        Some(archetype)
    }

    /// Read access to the archetype pool
    pub fn archetypes(&self) -> RwLockReadGuard<'_, ArchetypePool> {
        self.archetypes.read()
    }

    pub fn query(&self) -> EntityQuery<'_> {
        EntityQuery::new(self)
    }

    // ------------------------------------------------------------------
    // Systems
    // ------------------------------------------------------------------

    fn next_system_id(&self) -> SystemId {
        SystemId(self.next_system_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register an update system. It starts with no dependencies.
    pub fn add_system<S: System + 'static>(&self, system: S) -> SystemId {
        let id = self.next_system_id();
        let name = system.name();
        self.systems
            .write()
            .push(Arc::new(SystemSlot::new(id, name, Box::new(system) as Box<dyn System>)));
        self.dependency_graph.add_system(id);
        tracing::debug!(system = name, %id, "registered system");
        id
    }

    /// Register a render system; render order is registration order
    pub fn add_render_system<S: RenderSystem + 'static>(&self, system: S) -> SystemId {
        let id = self.next_system_id();
        let name = system.name();
        self.render_systems.write().push(Arc::new(SystemSlot::new(
            id,
            name,
            Box::new(system) as Box<dyn RenderSystem>,
        )));
        tracing::debug!(system = name, %id, "registered render system");
        id
    }

    fn is_update_system(&self, id: SystemId) -> bool {
        self.systems.read().iter().any(|slot| slot.id == id)
    }

    /// `dependent` runs in a later level than `dependency`
    pub fn add_system_dependency(&self, dependent: SystemId, dependency: SystemId) -> Result<()> {
        for id in [dependent, dependency] {
            if !self.is_update_system(id) {
                return Err(EcsError::SystemNotRegistered(id));
            }
        }
        self.dependency_graph.add_dependency(dependent, dependency)
    }

    /// Unregister an update or render system
    pub fn remove_system(&self, id: SystemId) -> bool {
        {
            let mut systems = self.systems.write();
            if let Some(pos) = systems.iter().position(|slot| slot.id == id) {
                systems.remove(pos);
                drop(systems);
                self.dependency_graph.remove_system(id);
                return true;
            }
        }

        let mut render_systems = self.render_systems.write();
        match render_systems.iter().position(|slot| slot.id == id) {
            Some(pos) => {
                render_systems.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn system_count(&self) -> usize {
        self.systems.read().len()
    }

    pub fn render_system_count(&self) -> usize {
        self.render_systems.read().len()
    }

    pub fn system_name(&self, id: SystemId) -> Option<&'static str> {
        let systems = self.systems.read();
        let render_systems = self.render_systems.read();
        systems
            .iter()
            .map(|slot| (slot.id, slot.name))
            .chain(render_systems.iter().map(|slot| (slot.id, slot.name)))
            .find_map(|(slot_id, name)| (slot_id == id).then_some(name))
    }

    pub fn execution_levels(&self) -> Result<Arc<[ExecutionLevel]>> {
        self.dependency_graph.execution_levels()
    }

    pub fn dependency_graph(&self) -> &SystemDependencyGraph {
        &self.dependency_graph
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Run every update system, level by level
    ///
    /// Systems inside a level run concurrently unless the world was
    /// configured with `parallel_update: false`. A failing system is logged
    /// and does not stop the frame.
    pub fn update(&self, delta_time: f32) -> Result<()> {
        self.run_frame(delta_time, self.config.parallel_update)
    }

    /// Same as [`World::update`], on the calling thread only
    pub fn update_single_thread(&self, delta_time: f32) -> Result<()> {
        self.run_frame(delta_time, false)
    }

    fn run_frame(&self, delta_time: f32, parallel: bool) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.update", delta_time, parallel).entered();

        let levels = self.dependency_graph.execution_levels()?;
        let snapshot: Vec<UpdateSlot> = self.systems.read().clone();
        executor::initialize_pending(self, &snapshot);

        let by_id: AHashMap<SystemId, &UpdateSlot> =
            snapshot.iter().map(|slot| (slot.id, slot)).collect();
        let mut seen = AHashSet::with_capacity(snapshot.len());

        let frame_start = Instant::now();
        let mut system_timings = Vec::with_capacity(snapshot.len());
        for level in levels.iter() {
            let batch: Vec<UpdateSlot> = level
                .systems
                .iter()
                .filter_map(|id| by_id.get(id).map(|slot| Arc::clone(slot)))
                .filter(|slot| seen.insert(slot.id))
                .collect();
            if batch.is_empty() {
                continue;
            }
            system_timings.extend(executor::execute_level(self, &batch, delta_time, parallel));
        }

        if self.config.record_profile {
            *self.last_profile.lock() = Some(ExecutionProfile {
                total_frame_time: frame_start.elapsed(),
                level_count: levels.len(),
                system_timings,
            });
        }
        Ok(())
    }

    /// Run every render system in registration order on the calling thread
    pub fn render(&self, delta_time: f32) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.render", delta_time).entered();

        let snapshot: Vec<RenderSlot> = self.render_systems.read().clone();
        executor::execute_render(self, &snapshot, delta_time);
    }

    /// Timings of the most recent update
    pub fn last_frame_profile(&self) -> Option<ExecutionProfile> {
        self.last_profile.lock().clone()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
