use crate::constants::ROAD_HALF_WIDTH;
use crate::geom::{Point, Speed};
use crate::model::{Map, Road};

/// Realized displacement smaller than commanded by more than this means
/// the dog hit a corridor boundary.
const BLOCK_EPSILON: f64 = 1e-9;

/// Running `[min, max]` interval over every qualifying corridor. Roads
/// combine by union: the first one seeds the interval, later ones only
/// widen it.
struct AllowedInterval {
    min: f64,
    max: f64,
    seeded: bool,
}

impl AllowedInterval {
    fn new() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            seeded: false,
        }
    }

    fn widen(&mut self, low: f64, high: f64) {
        if self.seeded {
            self.min = self.min.min(low);
            self.max = self.max.max(high);
        } else {
            self.min = low;
            self.max = high;
            self.seeded = true;
        }
    }
}

fn axis_bounds(
    move_coord: f64,
    stay_coord: f64,
    parallel_roads: &[Road],
    crossing_roads: &[Road],
) -> (f64, f64) {
    let mut interval = AllowedInterval::new();

    for road in parallel_roads {
        let (low, high) = road.axis_span();
        let (low, high) = (low - ROAD_HALF_WIDTH, high + ROAD_HALF_WIDTH);
        if move_coord >= low && move_coord <= high {
            interval.widen(low, high);
        }
    }

    // A crossing road contributes a corridor centered at its own fixed
    // coordinate, provided the dog stands within its span.
    for road in crossing_roads {
        let (low, high) = road.axis_span();
        if stay_coord >= low - ROAD_HALF_WIDTH && stay_coord <= high + ROAD_HALF_WIDTH {
            let center = road.fixed_coord() as f64;
            interval.widen(center - ROAD_HALF_WIDTH, center + ROAD_HALF_WIDTH);
        }
    }

    // No qualifying road: movement is unconstrained, never a trap.
    (interval.min, interval.max)
}

/// Next position after moving for `dt` seconds, clamped to the union of
/// road corridors reachable from the current grid cell. Pure function;
/// a roadless map simply never constrains movement.
pub fn next_position(map: &Map, position: Point, speed: Speed, dt: f64) -> Point {
    if speed.is_zero() {
        return position;
    }

    let grid_x = position.x.round() as i64;
    let grid_y = position.y.round() as i64;

    if speed.ux != 0.0 {
        let (min_x, max_x) = axis_bounds(
            position.x,
            position.y,
            map.roads_by_y(grid_y),
            map.roads_by_x(grid_x),
        );
        Point::new((position.x + speed.ux * dt).clamp(min_x, max_x), position.y)
    } else {
        let (min_y, max_y) = axis_bounds(
            position.y,
            position.x,
            map.roads_by_x(grid_x),
            map.roads_by_y(grid_y),
        );
        Point::new(position.x, (position.y + speed.uy * dt).clamp(min_y, max_y))
    }
}

/// Tick-level wrapper: advances the position and zeroes the velocity on
/// any axis whose realized displacement fell short of the commanded
/// one, so a blocked dog stops sliding on subsequent ticks.
pub fn advance(map: &Map, position: Point, speed: Speed, dt: f64) -> (Point, Speed) {
    if speed.is_zero() {
        return (position, speed);
    }
    let next = next_position(map, position, speed, dt);
    let mut speed = speed;
    if (next.x - position.x - speed.ux * dt).abs() > BLOCK_EPSILON {
        speed.ux = 0.0;
    }
    if (next.y - position.y - speed.uy * dt).abs() > BLOCK_EPSILON {
        speed.uy = 0.0;
    }
    (next, speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Road;

    fn single_road_map() -> Map {
        let mut map = Map::new("m1", "Town");
        map.add_road(Road::horizontal(0, 0, 10));
        map
    }

    #[test]
    fn zero_velocity_is_a_no_op_for_any_dt() {
        let map = single_road_map();
        let pos = Point::new(3.3, 0.1);
        for dt in [0.0, 0.5, 100.0, -2.0] {
            assert_eq!(next_position(&map, pos, Speed::zero(), dt), pos);
            let (next, speed) = advance(&map, pos, Speed::zero(), dt);
            assert_eq!(next, pos);
            assert!(speed.is_zero());
        }
    }

    #[test]
    fn westward_move_clamps_at_the_road_end_corridor() {
        let map = single_road_map();
        let start = Point::new(0.0, 0.0);
        let next = next_position(&map, start, Speed { ux: -1.0, uy: 0.0 }, 5.0);
        assert_eq!(next, Point::new(-0.4, 0.0));
    }

    #[test]
    fn fast_eastward_move_clamps_at_the_far_end() {
        let map = single_road_map();
        let start = Point::new(5.0, 0.0);
        let next = next_position(&map, start, Speed { ux: 100.0, uy: 0.0 }, 1.0);
        assert_eq!(next, Point::new(10.4, 0.0));
    }

    #[test]
    fn unclamped_move_realizes_the_exact_displacement() {
        let map = single_road_map();
        let start = Point::new(2.0, 0.0);
        let (next, speed) = advance(&map, start, Speed { ux: 3.0, uy: 0.0 }, 0.5);
        assert_eq!(next, Point::new(3.5, 0.0));
        assert_eq!(speed, Speed { ux: 3.0, uy: 0.0 });
    }

    #[test]
    fn blocked_axis_velocity_is_reset() {
        let map = single_road_map();
        let start = Point::new(9.0, 0.0);
        let (next, speed) = advance(&map, start, Speed { ux: 4.0, uy: 0.0 }, 1.0);
        assert_eq!(next, Point::new(10.4, 0.0));
        assert!(speed.is_zero());
    }

    #[test]
    fn sideways_drift_is_limited_to_the_corridor_width() {
        let map = single_road_map();
        let start = Point::new(5.0, 0.0);
        let next = next_position(&map, start, Speed { ux: 0.0, uy: 1.0 }, 3.0);
        assert_eq!(next, Point::new(5.0, 0.4));
        let next = next_position(&map, start, Speed { ux: 0.0, uy: -1.0 }, 3.0);
        assert_eq!(next, Point::new(5.0, -0.4));
    }

    #[test]
    fn crossing_road_opens_a_perpendicular_corridor() {
        let mut map = single_road_map();
        map.add_road(Road::vertical(5, 0, 6));
        // Standing on the junction, a northward-southward move may leave
        // the horizontal road through the vertical one's corridor.
        let start = Point::new(5.0, 0.0);
        let next = next_position(&map, start, Speed { ux: 0.0, uy: 2.0 }, 2.0);
        assert_eq!(next, Point::new(5.0, 4.0));
    }

    #[test]
    fn corridors_combine_by_union_not_intersection() {
        let mut map = Map::new("m1", "Town");
        // Two collinear roads sharing grid line y=0 with a gap in
        // spans; both qualify at x=5, the interval covers both.
        map.add_road(Road::horizontal(0, 0, 6));
        map.add_road(Road::horizontal(4, 0, 12));
        let start = Point::new(5.0, 0.0);
        let next = next_position(&map, start, Speed { ux: 10.0, uy: 0.0 }, 1.0);
        assert_eq!(next, Point::new(12.4, 0.0));
        let next = next_position(&map, start, Speed { ux: -10.0, uy: 0.0 }, 1.0);
        assert_eq!(next, Point::new(-0.4, 0.0));
    }

    #[test]
    fn off_road_movement_is_unconstrained() {
        let map = single_road_map();
        // Grid cell (50, 50) has no roads: free movement, not a trap.
        let start = Point::new(50.0, 50.0);
        let (next, speed) = advance(&map, start, Speed { ux: -2.0, uy: 0.0 }, 1.0);
        assert_eq!(next, Point::new(48.0, 50.0));
        assert_eq!(speed, Speed { ux: -2.0, uy: 0.0 });
    }

    #[test]
    fn roadless_map_never_constrains() {
        let map = Map::new("empty", "Empty");
        let next = next_position(&map, Point::new(0.0, 0.0), Speed { ux: 1.0, uy: 0.0 }, 2.5);
        assert_eq!(next, Point::new(2.5, 0.0));
    }
}
