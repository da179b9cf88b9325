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

//! Component traits and type metadata
//!
//! Components are plain values attached to entities. Statically typed call
//! sites key storage by `TypeId`; editor tooling that only knows a component
//! at runtime goes through the integer tags handed out by
//! [`ComponentRegistry`].

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use ahash::AHashMap;
use parking_lot::RwLock;
use smallvec::{smallvec, SmallVec};

use crate::archetype::{Column, TypedColumn};

/// Maximum number of components in a [`ComponentSet`] tuple
pub const MAX_SET_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data) and clonable, since the
/// archetype pool keeps its own copy of every value it files.
pub trait Component: Clone + Send + Sync + 'static {}

/// Automatically implement Component for all valid types
impl<T: Clone + Send + Sync + 'static> Component for T {}

/// Type-erased component value
///
/// The blanket impl also covers shared references to components, so call
/// these methods on the trait object itself: `(**boxed).info()`, never
/// `boxed.info()` through a `&Box<dyn ComponentValue>`.
pub trait ComponentValue: Any + Send + Sync {
    fn info(&self) -> ComponentInfo;
    fn clone_value(&self) -> Box<dyn ComponentValue>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Component> ComponentValue for T {
    fn info(&self) -> ComponentInfo {
        ComponentInfo::of::<T>()
    }

    fn clone_value(&self) -> Box<dyn ComponentValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl fmt::Debug for dyn ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentValue<{}>", self.info().name())
    }
}

/// Static description of a component type
#[derive(Clone, Copy)]
pub struct ComponentInfo {
    type_id: TypeId,
    name: &'static str,
    size: usize,
    align: usize,
    new_column: fn() -> Box<dyn Column>,
}

impl ComponentInfo {
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            new_column: new_column::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Empty column able to hold values of this type
    pub fn new_column(&self) -> Box<dyn Column> {
        (self.new_column)()
    }
}

impl PartialEq for ComponentInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentInfo {}

impl Hash for ComponentInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl PartialOrd for ComponentInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.type_id.cmp(&other.type_id)
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

fn new_column<T: Component>() -> Box<dyn Column> {
    Box::new(TypedColumn::<T>::new())
}

/// Runtime tag for a registered component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTag(pub u32);

#[derive(Default)]
struct RegistryInner {
    tags: AHashMap<TypeId, ComponentTag>,
    infos: Vec<ComponentInfo>,
}

/// Maps component types to stable integer tags
///
/// A type gets its tag the first time it is registered and keeps it for the
/// registry's lifetime.
#[derive(Default)]
pub struct ComponentRegistry {
    inner: RwLock<RegistryInner>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Component>(&self) -> ComponentTag {
        self.register_info(ComponentInfo::of::<T>())
    }

    pub fn register_info(&self, info: ComponentInfo) -> ComponentTag {
        if let Some(&tag) = self.inner.read().tags.get(&info.type_id()) {
            return tag;
        }

        let mut inner = self.inner.write();
        if let Some(&tag) = inner.tags.get(&info.type_id()) {
            return tag;
        }
        let tag = ComponentTag(inner.infos.len() as u32);
        inner.infos.push(info);
        inner.tags.insert(info.type_id(), tag);
        tracing::trace!(component = info.name(), tag = tag.0, "registered component type");
        tag
    }

    pub fn tag_of(&self, type_id: TypeId) -> Option<ComponentTag> {
        self.inner.read().tags.get(&type_id).copied()
    }

    pub fn info(&self, tag: ComponentTag) -> Option<ComponentInfo> {
        self.inner.read().infos.get(tag.0 as usize).copied()
    }

    /// Look up a type by its `type_name`
    pub fn find_by_name(&self, name: &str) -> Option<(ComponentTag, ComponentInfo)> {
        let inner = self.inner.read();
        inner
            .infos
            .iter()
            .enumerate()
            .find(|(_, info)| info.name() == name)
            .map(|(idx, info)| (ComponentTag(idx as u32), *info))
    }

    pub fn len(&self) -> usize {
        self.inner.read().infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Set of component types named at compile time, e.g. `(Position, Velocity)`
pub trait ComponentSet: 'static {
    fn infos() -> SmallVec<[ComponentInfo; MAX_SET_COMPONENTS]>;
}

macro_rules! impl_component_set {
    ($($T:ident),*) => {
        impl<$($T: Component),*> ComponentSet for ($($T,)*) {
            fn infos() -> SmallVec<[ComponentInfo; MAX_SET_COMPONENTS]> {
                smallvec![$(ComponentInfo::of::<$T>()),*]
            }
        }
    };
}

// Implement for tuples of 1-8 components
impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);
