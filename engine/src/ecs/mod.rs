pub mod action;
pub mod component;
pub mod diagnostics;
pub mod entity;
pub mod schedule;
pub(crate) mod storage;
pub mod system;
pub(crate) mod util;
pub mod view;
pub mod world;

pub use action::ActionQueue;
pub use component::Component;
pub use entity::Entity;
pub use schedule::{Config, Schedule};
pub use storage::archetype::Id as ArchetypeId;
pub use storage::{Target, Values};
pub use system::{Ctx, System};
pub use view::View;
pub use world::World;
