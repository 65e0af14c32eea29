mod entity;
mod tick;

pub use entity::{
    ACCELERATION, MAX_SPEED, ORIENTATION_RANGE, TURN_RATE, WORLD_BOUNDS_X, WORLD_BOUNDS_Y,
    catch_up, clamp_to_world, simulate_entity, wrap_angle,
};
pub use tick::{DEFAULT_TICK_RATE, INTERPOLATION_OFFSET_MS, TickClock};
