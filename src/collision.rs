use std::cmp::Ordering;

use crate::geom::Point;

/// A moving agent for one tick: the segment from its pre-tick to its
/// post-tick position plus a pickup radius.
#[derive(Clone, Copy, Debug)]
pub struct Gatherer {
    pub start: Point,
    pub end: Point,
    pub radius: f64,
}

/// A static collision target: a loot instance or an office.
#[derive(Clone, Copy, Debug)]
pub struct Item {
    pub position: Point,
    pub radius: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GatherEvent {
    pub item: usize,
    pub gatherer: usize,
    pub sq_distance: f64,
    /// Projection ratio of the item onto the infinite line through the
    /// movement segment. Deliberately not clamped to [0, 1].
    pub time: f64,
}

/// Projects the item onto the line through `start -> end` and returns
/// (squared perpendicular distance, projection ratio). The segment must
/// be non-degenerate.
fn project_point(start: Point, end: Point, item: Point) -> (f64, f64) {
    let u_x = item.x - start.x;
    let u_y = item.y - start.y;
    let v_x = end.x - start.x;
    let v_y = end.y - start.y;
    let u_dot_v = u_x * v_x + u_y * v_y;
    let u_len2 = u_x * u_x + u_y * u_y;
    let v_len2 = v_x * v_x + v_y * v_y;
    (u_len2 - (u_dot_v * u_dot_v) / v_len2, u_dot_v / v_len2)
}

/// Every (gatherer, item) contact within the combined radius, sorted by
/// projection ratio with a deterministic tie-break on gatherer then
/// item index. Stationary gatherers never emit events.
pub fn find_gather_events(gatherers: &[Gatherer], items: &[Item]) -> Vec<GatherEvent> {
    let mut events = Vec::new();

    for (g, gatherer) in gatherers.iter().enumerate() {
        if gatherer.start == gatherer.end {
            continue;
        }
        for (i, item) in items.iter().enumerate() {
            let (sq_distance, time) = project_point(gatherer.start, gatherer.end, item.position);
            let reach = gatherer.radius + item.radius;
            if sq_distance <= reach * reach {
                events.push(GatherEvent {
                    item: i,
                    gatherer: g,
                    sq_distance,
                    time,
                });
            }
        }
    }

    events.sort_by(|a, b| {
        a.time
            .partial_cmp(&b.time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.gatherer.cmp(&b.gatherer))
            .then_with(|| a.item.cmp(&b.item))
    });
    events
}
