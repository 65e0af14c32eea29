mod buffer;
mod entity;
mod world;

pub use buffer::{SnapshotBuffer, Ticked};
pub use entity::{Color, Entity, EntityInput, EntitySnapshot, INVALID_ENTITY};
pub use world::World;
