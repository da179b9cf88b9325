use atom_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Score(i32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frozen;

fn x_of(world: &World, entity: Entity) -> f32 {
    world
        .read_component::<Position>(entity)
        .map_or(f32::MIN, |pos| pos.x)
}

fn spawn_row(world: &World, xs: &[f32]) -> Result<Vec<Entity>> {
    let mut entities = Vec::new();
    for &x in xs {
        let entity = world.create_entity();
        world.add_component(entity, Position { x, y: 0.0 })?;
        entities.push(entity);
    }
    Ok(entities)
}

fn xs(world: &World, entities: &[Entity]) -> Vec<f32> {
    entities.iter().map(|&entity| x_of(world, entity)).collect()
}

#[test]
fn test_order_by_descending_where_and_limit() -> Result<()> {
    let world = World::new();
    spawn_row(&world, &[0.0, 1.0, 200.0, 300.0, 100.0])?;

    let sorted = world
        .query()
        .with::<Position>()
        .order_by_descending(|entity| x_of(&world, entity))
        .build();
    assert_eq!(xs(&world, &sorted), vec![300.0, 200.0, 100.0, 1.0, 0.0]);

    let filtered = world
        .query()
        .with::<Position>()
        .where_(|entity| x_of(&world, entity) > 1.0)
        .order_by_descending(|entity| x_of(&world, entity))
        .build();
    assert_eq!(xs(&world, &filtered), vec![300.0, 200.0, 100.0]);

    let limited = world
        .query()
        .with::<Position>()
        .where_(|entity| x_of(&world, entity) > 1.0)
        .order_by_descending(|entity| x_of(&world, entity))
        .limit(2)
        .build();
    assert_eq!(xs(&world, &limited), vec![300.0, 200.0]);
    Ok(())
}

#[test]
fn test_with_without_order_limit_keeps_ties_stable() -> Result<()> {
    let world = World::new();
    let entities = spawn_row(&world, &[0.0; 5])?;
    let scores = [7, 9, 9, 3, 9];
    for (entity, score) in entities.iter().zip(scores) {
        world.add_component(*entity, Score(score))?;
    }
    // Highest score, but excluded
    world.add_component(entities[1], Frozen)?;

    let top = world
        .query()
        .with::<Position>()
        .without::<Frozen>()
        .order_by_descending(|entity| world.read_component::<Score>(entity).map_or(0, |s| s.0))
        .limit(2)
        .build();
    assert_eq!(top, vec![entities[2], entities[4]]);
    Ok(())
}

#[test]
fn test_filter_order_matters_only_for_results_not_errors() -> Result<()> {
    let world = World::new();
    let entities = spawn_row(&world, &[1.0, 2.0])?;
    world.add_component(entities[0], Frozen)?;

    let with_then_without = world.query().with::<Position>().without::<Frozen>().build();
    let without_then_with = world.query().without::<Frozen>().with::<Position>().build();
    assert_eq!(with_then_without, vec![entities[1]]);
    assert_eq!(without_then_with, vec![entities[1]]);

    assert!(world.query().with::<Score>().build().is_empty());
    assert_eq!(world.query().with::<Frozen>().limit(0).count(), 0);
    Ok(())
}

#[test]
fn test_query_sees_structural_changes_on_rebuild() -> Result<()> {
    let world = World::new();
    let entities = spawn_row(&world, &[5.0, 6.0])?;
    let query = world.query().with::<Position>().without::<Frozen>();
    assert_eq!(query.count(), 2);

    world.add_component(entities[0], Frozen)?;
    assert_eq!(query.build(), vec![entities[1]]);

    world.destroy_entity(entities[1]);
    assert!(query.build().is_empty());
    Ok(())
}
