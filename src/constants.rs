/// Roads are corridors of a fixed width; a dog may stray half of it
/// to either side of the road's center line.
pub const ROAD_WIDTH: f64 = 0.8;
pub const ROAD_HALF_WIDTH: f64 = ROAD_WIDTH / 2.0;

/// Pickup radii used by the collision sweep. Loot is a point.
pub const DOG_RADIUS: f64 = 0.3;
pub const OFFICE_RADIUS: f64 = 0.25;
pub const LOOT_RADIUS: f64 = 0.0;

pub const DEFAULT_DOG_SPEED: f64 = 1.0;
pub const DEFAULT_BAG_CAPACITY: usize = 3;

pub const DEFAULT_PORT: u16 = 8080;
