//! Structural commands, queued mid-tick and applied at the barrier.
//!
//! Spawning, destroying, and changing an entity's component set all reshape
//! chunk storage, which no system may do while views are live. Systems push
//! commands through [`Commands`] instead; pushes are lock-free and safe from
//! any worker. After the tick's final latch the world drains the queue on
//! one thread and applies every command in submission order.

use crossbeam::queue::SegQueue;

use crate::ecs::component::{IntoSpec, Registry, Spec};
use crate::ecs::entity::{Entity, EntityTable};
use crate::ecs::storage::{Storage, Values};

/// A deferred structural change.
///
/// Entity handles are allocated when the command is created, so producers
/// can reference a spawned entity in follow-up commands before it has a
/// storage footprint.
pub(crate) enum Command {
    /// Give a freshly allocated entity its first components.
    Spawn {
        entity: Entity,
        values: Box<dyn AnyValues>,
    },

    /// Free an entity: handle invalidated, components dropped.
    Destroy { entity: Entity },

    /// Attach components to an existing entity. Collisions with components
    /// it already has resolve through the component's combine hook.
    Insert {
        entity: Entity,
        values: Box<dyn AnyValues>,
    },

    /// Detach a set of components by type.
    Remove { entity: Entity, removal: Spec },
}

impl Command {
    /// Apply one command.
    ///
    /// Lenient about dead targets: two systems may race a destroy for the
    /// same entity, or destroy one whose spawn is still queued. Whichever
    /// command loses the race is dropped with a trace line, values and all.
    pub(crate) fn apply(self, registry: &Registry, entities: &EntityTable, storage: &mut Storage) {
        match self {
            Command::Spawn { entity, values } => {
                if entities.exists(entity) {
                    values.spawn(registry, storage, entity);
                } else {
                    log::trace!("dropping spawn of dead entity {entity:?}");
                }
            }
            Command::Destroy { entity } => {
                if entities.exists(entity) {
                    entities.destroy(entity);
                    storage.despawn(entity);
                } else {
                    log::trace!("dropping destroy of dead entity {entity:?}");
                }
            }
            Command::Insert { entity, values } => {
                if entities.exists(entity) {
                    values.insert(registry, storage, entity);
                } else {
                    log::trace!("dropping insert on dead entity {entity:?}");
                }
            }
            Command::Remove { entity, removal } => {
                if entities.exists(entity) {
                    storage.remove(registry, entity, &removal);
                } else {
                    log::trace!("dropping remove on dead entity {entity:?}");
                }
            }
        }
    }
}

/// Object-safe bridge from a boxed value set to the typed storage calls.
///
/// Keeping the values typed until they reach storage means drop glue and
/// combine hooks work unchanged, including for commands that end up
/// discarded.
pub(crate) trait AnyValues: Send {
    fn spawn(self: Box<Self>, registry: &Registry, storage: &mut Storage, entity: Entity);

    fn insert(self: Box<Self>, registry: &Registry, storage: &mut Storage, entity: Entity);
}

impl<V: Values + Send> AnyValues for V {
    fn spawn(self: Box<Self>, registry: &Registry, storage: &mut Storage, entity: Entity) {
        storage.spawn(registry, entity, *self);
    }

    fn insert(self: Box<Self>, registry: &Registry, storage: &mut Storage, entity: Entity) {
        storage.insert(registry, entity, *self);
    }
}

/// The shared command queue. Wait-free producer side, drained whole by the
/// world at the barrier.
#[derive(Default)]
pub(crate) struct CommandQueue {
    commands: SegQueue<Command>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        Self {
            commands: SegQueue::new(),
        }
    }

    pub(crate) fn push(&self, command: Command) {
        self.commands.push(command);
    }

    /// Commands queued and not yet applied.
    pub(crate) fn len(&self) -> usize {
        self.commands.len()
    }

    /// Drain and apply every queued command in submission order. Returns
    /// how many commands ran.
    pub(crate) fn flush(
        &self,
        registry: &Registry,
        entities: &EntityTable,
        storage: &mut Storage,
    ) -> usize {
        let mut applied = 0;
        while let Some(command) = self.commands.pop() {
            command.apply(registry, entities, storage);
            applied += 1;
        }
        applied
    }
}

/// Handle for pushing structural commands from inside a system.
///
/// Obtained from [`Ctx::commands`](crate::ecs::system::Ctx::commands).
/// Spawned handles are live immediately (they pass `exists` and can be
/// named by later commands); their components land when the batch applies.
pub struct Commands<'w> {
    registry: &'w Registry,
    entities: &'w EntityTable,
    queue: &'w CommandQueue,
}

impl<'w> Commands<'w> {
    pub(crate) fn new(
        registry: &'w Registry,
        entities: &'w EntityTable,
        queue: &'w CommandQueue,
    ) -> Self {
        Self {
            registry,
            entities,
            queue,
        }
    }

    /// Allocate an entity now; attach `values` to it at the barrier.
    pub fn spawn<V: Values + Send>(&self, values: V) -> Entity {
        let entity = self.entities.create();
        self.queue.push(Command::Spawn {
            entity,
            values: Box::new(values),
        });
        entity
    }

    /// Free an entity at the barrier.
    pub fn destroy(&self, entity: Entity) {
        self.queue.push(Command::Destroy { entity });
    }

    /// Attach components to an entity at the barrier.
    pub fn insert<V: Values + Send>(&self, entity: Entity, values: V) {
        self.queue.push(Command::Insert {
            entity,
            values: Box::new(values),
        });
    }

    /// Detach the components named by `V` at the barrier:
    /// `commands.remove::<(Frozen, Stunned)>(entity)`.
    pub fn remove<V: Values>(&self, entity: Entity) {
        let removal = V::into_spec(self.registry);
        self.queue.push(Command::Remove { entity, removal });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Component;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    struct Velocity {
        #[allow(dead_code)]
        dx: f32,
    }
    impl Component for Velocity {}

    struct Damage(u32);
    impl Component for Damage {
        const COMBINE: Option<fn(&mut Self, Self)> =
            Some(|existing, incoming| existing.0 += incoming.0);
    }

    struct Fixture {
        registry: Registry,
        entities: EntityTable,
        storage: Storage,
        queue: CommandQueue,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: Registry::new(),
                entities: EntityTable::new(),
                storage: Storage::new(1024),
                queue: CommandQueue::new(),
            }
        }

        fn commands(&self) -> Commands<'_> {
            Commands::new(&self.registry, &self.entities, &self.queue)
        }

        fn flush(&mut self) -> usize {
            self.queue
                .flush(&self.registry, &self.entities, &mut self.storage)
        }
    }

    #[test]
    fn spawn_commands_apply_at_the_flush() {
        // Given
        let mut world = Fixture::new();

        // When
        let entity = world.commands().spawn(Position { x: 1.0, y: 2.0 });

        // Then - the handle is live immediately, the footprint is not
        assert!(world.entities.exists(entity));
        assert!(!world.storage.contains(entity));

        // When
        let applied = world.flush();

        // Then
        assert_eq!(applied, 1);
        assert_eq!(
            world.storage.get::<Position>(&world.registry, entity),
            Some(&Position { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn destroy_commands_free_handle_and_footprint() {
        // Given
        let mut world = Fixture::new();
        let entity = world.entities.create();
        world
            .storage
            .spawn(&world.registry, entity, Position { x: 0.0, y: 0.0 });

        // When
        world.commands().destroy(entity);
        world.flush();

        // Then
        assert!(!world.entities.exists(entity));
        assert!(!world.storage.contains(entity));
    }

    #[test]
    fn insert_commands_merge_through_the_combine_hook() {
        // Given - two hits on the same entity in one tick
        let mut world = Fixture::new();
        let entity = world.entities.create();
        world.storage.spawn(&world.registry, entity, Damage(10));
        world.commands().insert(entity, Damage(30));
        world.commands().insert(entity, Damage(2));

        // When
        world.flush();

        // Then - accumulated, not replaced
        assert_eq!(
            world.storage.get::<Damage>(&world.registry, entity).unwrap().0,
            42
        );
    }

    #[test]
    fn remove_commands_detach_by_type() {
        // Given
        let mut world = Fixture::new();
        let entity = world.entities.create();
        world.storage.spawn(
            &world.registry,
            entity,
            (Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0 }),
        );

        // When
        world.commands().remove::<Velocity>(entity);
        world.flush();

        // Then
        assert!(world.storage.has::<Position>(&world.registry, entity));
        assert!(!world.storage.has::<Velocity>(&world.registry, entity));
    }

    #[test]
    fn commands_apply_in_submission_order() {
        // Given - spawn then destroy of the same entity in one batch
        let mut world = Fixture::new();
        let entity = world.commands().spawn(Position { x: 0.0, y: 0.0 });
        world.commands().destroy(entity);

        // When
        let applied = world.flush();

        // Then - it existed for exactly one command's worth of time
        assert_eq!(applied, 2);
        assert!(!world.entities.exists(entity));
        assert!(!world.storage.contains(entity));
        assert_eq!(world.storage.entity_count(), 0);
    }

    #[test]
    fn commands_for_dead_entities_are_dropped_quietly() {
        // Given
        let mut world = Fixture::new();
        let entity = world.entities.create();
        world.entities.destroy(entity);
        world.commands().insert(entity, Position { x: 0.0, y: 0.0 });
        world.commands().remove::<Position>(entity);
        world.commands().destroy(entity);

        // When / Then - no panic, nothing applied
        world.flush();
        assert_eq!(world.storage.entity_count(), 0);
    }

    #[test]
    fn unapplied_values_still_drop_exactly_once() {
        // Given
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Tracked(#[allow(dead_code)] u32);
        impl Component for Tracked {}
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut world = Fixture::new();

        // When - the spawn loses a race with a destroy
        let entity = world.commands().spawn(Tracked(5));
        world.entities.destroy(entity);
        world.flush();

        // Then - the staged value was dropped, not leaked
        assert_eq!(DROPS.load(Ordering::Relaxed), 1);
        assert!(!world.storage.contains(entity));
    }

    #[test]
    fn producers_push_from_many_threads() {
        // Given
        let mut world = Fixture::new();

        // When - four workers spawn concurrently
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let commands = world.commands();
                scope.spawn(move || {
                    for i in 0..25 {
                        commands.spawn(Position {
                            x: worker as f32,
                            y: i as f32,
                        });
                    }
                });
            }
        });
        let applied = world.flush();

        // Then
        assert_eq!(applied, 100);
        assert_eq!(world.storage.entity_count(), 100);
    }
}
