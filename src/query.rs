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

//! Fluent entity query builder
//!
//! A query is a lazy description. Nothing is read from the world until
//! [`EntityQuery::build`] runs, and the same query can be built again.
//!
//! Stages apply in a fixed order: `with`/`without` filters in declaration
//! order, then `where_` predicates, then the sort, then `limit`. A query
//! turned into a [`GroupedQuery`] partitions that final list by key.

use std::any::TypeId;
use std::cmp::Ordering;
use std::hash::Hash;

#[cfg(feature = "profiling")]
use tracing::info_span;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::component::Component;
use crate::entity::Entity;
use crate::world::World;

const MAX_FILTER_COMPONENTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    With(TypeId),
    Without(TypeId),
}

type Predicate<'w> = Box<dyn Fn(Entity) -> bool + 'w>;
type Sorter<'w> = Box<dyn Fn(&mut Vec<Entity>) + 'w>;

/// Query over the entities of one world
pub struct EntityQuery<'w> {
    world: &'w World,
    filters: SmallVec<[Filter; MAX_FILTER_COMPONENTS]>,
    predicates: Vec<Predicate<'w>>,
    sorter: Option<Sorter<'w>>,
    limit: Option<usize>,
}

impl<'w> EntityQuery<'w> {
    pub fn new(world: &'w World) -> Self {
        Self {
            world,
            filters: SmallVec::new(),
            predicates: Vec::new(),
            sorter: None,
            limit: None,
        }
    }

    /// Keep entities that have a `T`
    pub fn with<T: Component>(mut self) -> Self {
        self.filters.push(Filter::With(TypeId::of::<T>()));
        self
    }

    /// Drop entities that have a `T`
    pub fn without<T: Component>(mut self) -> Self {
        self.filters.push(Filter::Without(TypeId::of::<T>()));
        self
    }

    /// Keep entities matching an arbitrary predicate
    pub fn where_<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Entity) -> bool + 'w,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Keep entities whose `T` matches. Entities without a `T` are dropped.
    pub fn where_component<T, F>(self, predicate: F) -> Self
    where
        T: Component,
        F: Fn(&T) -> bool + 'w,
    {
        let world = self.world;
        self.where_(move |entity| {
            world
                .read_component::<T>(entity)
                .is_ok_and(|value| predicate(&value))
        })
    }

    /// Stable ascending sort by a per-entity key
    ///
    /// Keys are computed once per entity. Incomparable keys (NaN) compare
    /// as equal and keep their prior order.
    pub fn order_by<K, F>(self, key: F) -> Self
    where
        K: PartialOrd,
        F: Fn(Entity) -> K + 'w,
    {
        self.sorted_by(key, false)
    }

    /// Stable descending sort by a per-entity key
    pub fn order_by_descending<K, F>(self, key: F) -> Self
    where
        K: PartialOrd,
        F: Fn(Entity) -> K + 'w,
    {
        self.sorted_by(key, true)
    }

    fn sorted_by<K, F>(mut self, key: F, descending: bool) -> Self
    where
        K: PartialOrd,
        F: Fn(Entity) -> K + 'w,
    {
        self.sorter = Some(Box::new(move |entities: &mut Vec<Entity>| {
            sort_by_key(entities, &key, descending)
        }));
        self
    }

    /// Keep at most `n` results
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Run the pipeline
    pub fn build(&self) -> Vec<Entity> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("query.build", filters = self.filters.len()).entered();

        let mut entities = self.working_set();

        for filter in &self.filters {
            match *filter {
                Filter::With(type_id) => {
                    entities.retain(|&entity| self.world.has_component_of_type(entity, type_id))
                }
                Filter::Without(type_id) => {
                    entities.retain(|&entity| !self.world.has_component_of_type(entity, type_id))
                }
            }
        }

        if !self.predicates.is_empty() {
            entities.retain(|&entity| self.predicates.iter().all(|predicate| predicate(entity)));
        }

        if let Some(sorter) = &self.sorter {
            sorter(&mut entities);
        }

        if let Some(n) = self.limit {
            entities.truncate(n);
        }

        entities
    }

    /// Number of results `build` would return
    pub fn count(&self) -> usize {
        self.build().len()
    }

    /// Partition the results by a per-entity key
    pub fn group_by<K, F>(self, key: F) -> GroupedQuery<'w, K>
    where
        K: Eq + Hash + Clone,
        F: Fn(Entity) -> K + 'w,
    {
        GroupedQuery {
            query: self,
            key: Box::new(key),
        }
    }

    /// Holders of the first `with` type, or every live entity
    fn working_set(&self) -> Vec<Entity> {
        let first_with = self.filters.iter().find_map(|filter| match filter {
            Filter::With(type_id) => Some(*type_id),
            Filter::Without(_) => None,
        });

        match first_with {
            Some(type_id) => self.world.entities_with_component_type(type_id),
            None => self.world.entities(),
        }
    }
}

/// Query whose results are also available grouped by key
pub struct GroupedQuery<'w, K> {
    query: EntityQuery<'w>,
    key: Box<dyn Fn(Entity) -> K + 'w>,
}

impl<'w, K: Eq + Hash + Clone> GroupedQuery<'w, K> {
    /// Flat results, as [`EntityQuery::build`]
    pub fn build(&self) -> Vec<Entity> {
        self.query.build()
    }

    /// Groups in order of first appearance; members keep result order
    pub fn build_grouped(&self) -> Vec<(K, Vec<Entity>)> {
        let mut slots: AHashMap<K, usize> = AHashMap::new();
        let mut groups: Vec<(K, Vec<Entity>)> = Vec::new();
        for entity in self.query.build() {
            let key = (self.key)(entity);
            match slots.get(&key) {
                Some(&slot) => groups[slot].1.push(entity),
                None => {
                    slots.insert(key.clone(), groups.len());
                    groups.push((key, vec![entity]));
                }
            }
        }
        groups
    }
}

fn sort_by_key<K, F>(entities: &mut Vec<Entity>, key: &F, descending: bool)
where
    K: PartialOrd,
    F: Fn(Entity) -> K,
{
    let mut keyed: Vec<(K, Entity)> = entities.drain(..).map(|entity| (key(entity), entity)).collect();
    keyed.sort_by(|a, b| {
        let ordering = a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    entities.extend(keyed.into_iter().map(|(_, entity)| entity));
}
