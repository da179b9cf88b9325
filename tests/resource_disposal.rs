use std::sync::Arc;

use atom_ecs::prelude::*;
use parking_lot::Mutex;

/// Stand-in for a GPU buffer: records its label when released
#[derive(Clone)]
struct GpuBuffer {
    label: &'static str,
    released: Arc<Mutex<Vec<&'static str>>>,
}

impl Disposable for GpuBuffer {
    fn dispose(&mut self) {
        self.released.lock().push(self.label);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform(f32);

fn buffer(label: &'static str, released: &Arc<Mutex<Vec<&'static str>>>) -> GpuBuffer {
    GpuBuffer {
        label,
        released: Arc::clone(released),
    }
}

#[test]
fn test_destroy_disposes_only_owned_resources() -> Result<()> {
    let released = Arc::default();
    let world = World::new();
    let a = world.create_entity();
    let b = world.create_entity();
    world.add_disposable_component(a, buffer("a", &released))?;
    world.add_component(a, Transform(1.0))?;
    world.add_disposable_component(b, buffer("b", &released))?;

    world.destroy_entity(a);
    assert_eq!(*released.lock(), vec!["a"]);
    assert!(world.has_component::<GpuBuffer>(b));

    world.destroy_entity(a);
    assert_eq!(released.lock().len(), 1);
    Ok(())
}

#[test]
fn test_remove_component_disposes_that_component() -> Result<()> {
    let released = Arc::default();
    let world = World::new();
    let entity = world.create_entity();
    world.add_disposable_component(entity, buffer("mesh", &released))?;
    world.add_component(entity, Transform(0.0))?;

    assert!(world.remove_component::<Transform>(entity));
    assert!(released.lock().is_empty());

    assert!(world.remove_component::<GpuBuffer>(entity));
    assert_eq!(*released.lock(), vec!["mesh"]);

    // Nothing tracked any more
    world.destroy_entity(entity);
    assert_eq!(released.lock().len(), 1);
    Ok(())
}

#[test]
fn test_overwrite_disposes_replaced_value() -> Result<()> {
    let released = Arc::default();
    let world = World::new();
    let entity = world.create_entity();
    world.add_disposable_component(entity, buffer("old", &released))?;
    world.add_disposable_component(entity, buffer("new", &released))?;
    assert_eq!(*released.lock(), vec!["old"]);
    assert_eq!(world.read_component::<GpuBuffer>(entity)?.label, "new");

    world.destroy_entity(entity);
    assert_eq!(*released.lock(), vec!["old", "new"]);
    Ok(())
}

#[test]
fn test_plain_add_is_not_tracked() -> Result<()> {
    let released = Arc::default();
    let world = World::new();
    let entity = world.create_entity();
    world.add_component(entity, buffer("untracked", &released))?;
    world.destroy_entity(entity);
    assert!(released.lock().is_empty());
    Ok(())
}
