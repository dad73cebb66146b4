use std::collections::HashMap;

use thiserror::Error;

use crate::constants::{DEFAULT_BAG_CAPACITY, DEFAULT_DOG_SPEED};
use crate::geom::{Direction, Point, Speed};
use crate::rng::Rng;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("map '{0}' is already registered")]
    DuplicateMap(String),
    #[error("office '{0}' is already registered on this map")]
    DuplicateOffice(String),
    #[error("map '{0}' has no roads to spawn on")]
    NoRoads(String),
}

/// Axis-aligned road segment with integer endpoints. One of the two
/// coordinates of start and end is always equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Road {
    start: (i64, i64),
    end: (i64, i64),
}

impl Road {
    pub fn horizontal(x0: i64, y: i64, x1: i64) -> Self {
        Self {
            start: (x0, y),
            end: (x1, y),
        }
    }

    pub fn vertical(x: i64, y0: i64, y1: i64) -> Self {
        Self {
            start: (x, y0),
            end: (x, y1),
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.start.1 == self.end.1
    }

    pub fn start(&self) -> (i64, i64) {
        self.start
    }

    pub fn end(&self) -> (i64, i64) {
        self.end
    }

    /// Span along the road's own axis, low to high.
    pub fn axis_span(&self) -> (f64, f64) {
        if self.is_horizontal() {
            let (a, b) = (self.start.0 as f64, self.end.0 as f64);
            (a.min(b), a.max(b))
        } else {
            let (a, b) = (self.start.1 as f64, self.end.1 as f64);
            (a.min(b), a.max(b))
        }
    }

    /// The fixed coordinate the road is bucketed by: y for horizontal
    /// roads, x for vertical ones.
    pub fn fixed_coord(&self) -> i64 {
        if self.is_horizontal() {
            self.start.1
        } else {
            self.start.0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Building {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

#[derive(Clone, Debug)]
pub struct Office {
    pub id: String,
    pub position: (i64, i64),
    pub offset: (i64, i64),
}

impl Office {
    pub fn point(&self) -> Point {
        Point::new(self.position.0 as f64, self.position.1 as f64)
    }
}

/// Immutable map definition plus a spatial index of its roads,
/// bucketed by their fixed coordinate for O(1) corridor lookup.
#[derive(Clone, Debug)]
pub struct Map {
    id: String,
    name: String,
    roads: Vec<Road>,
    roads_by_x: HashMap<i64, Vec<Road>>,
    roads_by_y: HashMap<i64, Vec<Road>>,
    buildings: Vec<Building>,
    offices: Vec<Office>,
    office_ids: HashMap<String, usize>,
    dog_speed: Option<f64>,
    bag_capacity: Option<usize>,
    random_spawn: Option<bool>,
}

impl Map {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roads: Vec::new(),
            roads_by_x: HashMap::new(),
            roads_by_y: HashMap::new(),
            buildings: Vec::new(),
            offices: Vec::new(),
            office_ids: HashMap::new(),
            dog_speed: None,
            bag_capacity: None,
            random_spawn: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_road(&mut self, road: Road) {
        self.roads.push(road);
        if road.is_horizontal() {
            self.roads_by_y.entry(road.fixed_coord()).or_default().push(road);
        } else {
            self.roads_by_x.entry(road.fixed_coord()).or_default().push(road);
        }
    }

    pub fn add_building(&mut self, building: Building) {
        self.buildings.push(building);
    }

    pub fn add_office(&mut self, office: Office) -> Result<(), ModelError> {
        if self.office_ids.contains_key(&office.id) {
            return Err(ModelError::DuplicateOffice(office.id.clone()));
        }
        self.office_ids.insert(office.id.clone(), self.offices.len());
        self.offices.push(office);
        Ok(())
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn offices(&self) -> &[Office] {
        &self.offices
    }

    /// Vertical roads whose center line sits on grid line x.
    pub fn roads_by_x(&self, x: i64) -> &[Road] {
        self.roads_by_x.get(&x).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Horizontal roads whose center line sits on grid line y.
    pub fn roads_by_y(&self, y: i64) -> &[Road] {
        self.roads_by_y.get(&y).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_dog_speed(&mut self, speed: f64) {
        self.dog_speed = Some(speed);
    }

    pub fn set_bag_capacity(&mut self, capacity: usize) {
        self.bag_capacity = Some(capacity);
    }

    pub fn set_random_spawn(&mut self, random_spawn: bool) {
        self.random_spawn = Some(random_spawn);
    }

    pub fn dog_speed(&self) -> f64 {
        self.dog_speed.unwrap_or(DEFAULT_DOG_SPEED)
    }

    pub fn bag_capacity(&self) -> usize {
        self.bag_capacity.unwrap_or(DEFAULT_BAG_CAPACITY)
    }

    pub fn random_spawn(&self) -> bool {
        self.random_spawn.unwrap_or(false)
    }

    /// Uniform point on a uniformly chosen road: fixed coordinate on
    /// the road's center line, the other uniform over its span.
    pub fn random_position_on_road(&self, rng: &mut Rng) -> Point {
        let road = &self.roads[rng.pick_index(self.roads.len())];
        if road.is_horizontal() {
            Point::new(
                rng.range_f64(road.start().0 as f64, road.end().0 as f64),
                road.start().1 as f64,
            )
        } else {
            Point::new(
                road.start().0 as f64,
                rng.range_f64(road.start().1 as f64, road.end().1 as f64),
            )
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BagItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub type_index: usize,
}

#[derive(Clone, Debug)]
pub struct Dog {
    pub name: String,
    pub id: u32,
    pub position: Point,
    pub speed: Speed,
    pub direction: Direction,
    pub bag: Vec<BagItem>,
    pub score: u64,
}

impl Dog {
    pub fn new(name: impl Into<String>, id: u32, position: Point) -> Self {
        Self {
            name: name.into(),
            id,
            position,
            speed: Speed::zero(),
            direction: Direction::North,
            bag: Vec::new(),
            score: 0,
        }
    }
}

/// Live per-map state: the dogs on the map, the id allocator and the
/// session RNG. Created lazily on first join.
#[derive(Clone, Debug)]
pub struct GameSession {
    map_id: String,
    dogs: Vec<Dog>,
    next_dog_id: u32,
    rng: Rng,
}

impl GameSession {
    pub fn new(map_id: impl Into<String>, seed: u32) -> Self {
        Self {
            map_id: map_id.into(),
            dogs: Vec::new(),
            next_dog_id: 0,
            rng: Rng::new(seed),
        }
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub fn dogs(&self) -> &[Dog] {
        &self.dogs
    }

    pub fn dog(&self, id: u32) -> Option<&Dog> {
        self.dogs.iter().find(|dog| dog.id == id)
    }

    pub fn dog_mut(&mut self, id: u32) -> Option<&mut Dog> {
        self.dogs.iter_mut().find(|dog| dog.id == id)
    }

    pub fn rng_mut(&mut self) -> &mut Rng {
        &mut self.rng
    }

    /// Spawns a dog at the first road's start, or anywhere on the road
    /// network when the map enables random spawn. Ids are monotonic and
    /// never reused.
    pub fn add_dog(&mut self, map: &Map, name: &str) -> Result<&Dog, ModelError> {
        let roads = map.roads();
        if roads.is_empty() {
            return Err(ModelError::NoRoads(map.id().to_string()));
        }
        let position = if map.random_spawn() {
            map.random_position_on_road(&mut self.rng)
        } else {
            let start = roads[0].start();
            Point::new(start.0 as f64, start.1 as f64)
        };
        let id = self.next_dog_id;
        self.next_dog_id += 1;
        self.dogs.push(Dog::new(name, id, position));
        Ok(&self.dogs[self.dogs.len() - 1])
    }

    /// Re-inserts a dog with a previously issued identity (state
    /// restore path). Keeps the id allocator ahead of every known id.
    pub fn insert_dog(&mut self, dog: Dog) {
        self.next_dog_id = self.next_dog_id.max(dog.id + 1);
        self.dogs.push(dog);
    }
}

/// Owns every map definition and the lazily created sessions for them.
#[derive(Clone, Debug)]
pub struct Game {
    maps: Vec<Map>,
    map_index: HashMap<String, usize>,
    sessions: HashMap<String, GameSession>,
    default_dog_speed: f64,
    default_bag_capacity: usize,
    random_spawn: bool,
    next_session_seed: u32,
}

impl Game {
    pub fn new(seed: u32) -> Self {
        Self {
            maps: Vec::new(),
            map_index: HashMap::new(),
            sessions: HashMap::new(),
            default_dog_speed: DEFAULT_DOG_SPEED,
            default_bag_capacity: DEFAULT_BAG_CAPACITY,
            random_spawn: false,
            next_session_seed: seed,
        }
    }

    pub fn set_default_dog_speed(&mut self, speed: f64) {
        self.default_dog_speed = speed;
    }

    pub fn set_default_bag_capacity(&mut self, capacity: usize) {
        self.default_bag_capacity = capacity;
    }

    pub fn set_random_spawn(&mut self, random_spawn: bool) {
        self.random_spawn = random_spawn;
    }

    /// Command-line override: turns random spawn on for every map,
    /// including maps already registered.
    pub fn enable_random_spawn(&mut self) {
        self.random_spawn = true;
        for map in &mut self.maps {
            map.set_random_spawn(true);
        }
    }

    /// Registers a map, filling unset per-map settings from the
    /// game-wide defaults. Duplicate ids are a configuration error.
    pub fn add_map(&mut self, mut map: Map) -> Result<(), ModelError> {
        if self.map_index.contains_key(map.id()) {
            return Err(ModelError::DuplicateMap(map.id().to_string()));
        }
        if map.dog_speed.is_none() {
            map.set_dog_speed(self.default_dog_speed);
        }
        if map.bag_capacity.is_none() {
            map.set_bag_capacity(self.default_bag_capacity);
        }
        if map.random_spawn.is_none() {
            map.set_random_spawn(self.random_spawn);
        }
        self.map_index.insert(map.id().to_string(), self.maps.len());
        self.maps.push(map);
        Ok(())
    }

    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    pub fn find_map(&self, id: &str) -> Option<&Map> {
        self.map_index.get(id).map(|idx| &self.maps[*idx])
    }

    pub fn session(&self, id: &str) -> Option<&GameSession> {
        self.sessions.get(id)
    }

    /// Lazily creates the session for a known map and returns the same
    /// instance on every subsequent call.
    pub fn find_session(&mut self, id: &str) -> Option<&mut GameSession> {
        if !self.map_index.contains_key(id) {
            return None;
        }
        if !self.sessions.contains_key(id) {
            let seed = self.next_session_seed;
            self.next_session_seed = self.next_session_seed.wrapping_add(1);
            self.sessions.insert(id.to_string(), GameSession::new(id, seed));
        }
        self.sessions.get_mut(id)
    }

    /// Map definition and live session for the same id, borrowed
    /// together for tick processing.
    pub fn map_and_session_mut(&mut self, id: &str) -> Option<(&Map, &mut GameSession)> {
        let idx = *self.map_index.get(id)?;
        let session = self.sessions.get_mut(id)?;
        Some((&self.maps[idx], session))
    }

    /// Joins a dog to the map's session, creating the session if
    /// needed. Returns the new dog's id.
    pub fn add_dog(&mut self, map_id: &str, name: &str) -> Option<Result<u32, ModelError>> {
        let idx = *self.map_index.get(map_id)?;
        if !self.sessions.contains_key(map_id) {
            let seed = self.next_session_seed;
            self.next_session_seed = self.next_session_seed.wrapping_add(1);
            self.sessions
                .insert(map_id.to_string(), GameSession::new(map_id, seed));
        }
        let map = &self.maps[idx];
        let session = self.sessions.get_mut(map_id)?;
        Some(session.add_dog(map, name).map(|dog| dog.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_road_map() -> Map {
        let mut map = Map::new("m1", "Town");
        map.add_road(Road::horizontal(0, 0, 10));
        map
    }

    #[test]
    fn roads_are_bucketed_by_their_fixed_coordinate() {
        let mut map = Map::new("m1", "Town");
        map.add_road(Road::horizontal(0, 3, 10));
        map.add_road(Road::vertical(5, 0, 8));
        assert_eq!(map.roads_by_y(3).len(), 1);
        assert_eq!(map.roads_by_x(5).len(), 1);
        assert!(map.roads_by_y(4).is_empty());
        assert!(map.roads_by_x(0).is_empty());
        assert_eq!(map.roads().len(), 2);
    }

    #[test]
    fn duplicate_map_id_is_rejected() {
        let mut game = Game::new(0);
        game.add_map(one_road_map()).unwrap();
        assert!(matches!(
            game.add_map(one_road_map()),
            Err(ModelError::DuplicateMap(_))
        ));
    }

    #[test]
    fn duplicate_office_id_is_rejected() {
        let mut map = one_road_map();
        map.add_office(Office {
            id: "o0".to_string(),
            position: (10, 0),
            offset: (1, 0),
        })
        .unwrap();
        let result = map.add_office(Office {
            id: "o0".to_string(),
            position: (0, 0),
            offset: (0, 0),
        });
        assert!(matches!(result, Err(ModelError::DuplicateOffice(_))));
        assert_eq!(map.offices().len(), 1);
    }

    #[test]
    fn add_map_fills_unset_defaults() {
        let mut game = Game::new(0);
        game.set_default_dog_speed(4.5);
        game.set_default_bag_capacity(7);
        game.set_random_spawn(true);

        let mut custom = one_road_map();
        custom.set_dog_speed(2.0);
        game.add_map(custom).unwrap();

        let mut plain = Map::new("m2", "Plain");
        plain.add_road(Road::horizontal(0, 0, 5));
        game.add_map(plain).unwrap();

        let custom = game.find_map("m1").unwrap();
        assert_eq!(custom.dog_speed(), 2.0);
        assert_eq!(custom.bag_capacity(), 7);
        assert!(custom.random_spawn());

        let plain = game.find_map("m2").unwrap();
        assert_eq!(plain.dog_speed(), 4.5);
        assert_eq!(plain.bag_capacity(), 7);
    }

    #[test]
    fn find_session_is_lazy_and_cached() {
        let mut game = Game::new(0);
        game.add_map(one_road_map()).unwrap();
        assert!(game.session("m1").is_none());
        assert!(game.find_session("nowhere").is_none());

        game.add_dog("m1", "Rex").unwrap().unwrap();
        // Same instance on every lookup: the dog is still there.
        assert_eq!(game.find_session("m1").unwrap().dogs().len(), 1);
        assert!(game.add_dog("nowhere", "Rex").is_none());
    }

    #[test]
    fn dog_ids_are_monotonic_and_spawn_at_first_road_start() {
        let mut map = Map::new("m1", "Town");
        map.add_road(Road::horizontal(3, 7, 10));
        map.set_random_spawn(false);
        let mut session = GameSession::new("m1", 0);

        let first = session.add_dog(&map, "Rex").unwrap();
        assert_eq!(first.id, 0);
        assert_eq!(first.position, Point::new(3.0, 7.0));
        assert!(first.speed.is_zero());

        let second = session.add_dog(&map, "Spot").unwrap();
        assert_eq!(second.id, 1);
    }

    #[test]
    fn random_spawn_lands_on_a_road() {
        let mut map = Map::new("m1", "Town");
        map.add_road(Road::horizontal(0, 2, 10));
        map.add_road(Road::vertical(4, -5, 5));
        map.set_random_spawn(true);
        let mut session = GameSession::new("m1", 99);

        for i in 0..50 {
            let dog = session.add_dog(&map, "Rex").unwrap();
            let pos = dog.position;
            assert_eq!(dog.id, i);
            let on_horizontal = pos.y == 2.0 && (0.0..=10.0).contains(&pos.x);
            let on_vertical = pos.x == 4.0 && (-5.0..=5.0).contains(&pos.y);
            assert!(on_horizontal || on_vertical, "off-road spawn at {pos:?}");
        }
    }

    #[test]
    fn spawning_on_a_roadless_map_fails() {
        let map = Map::new("empty", "Empty");
        let mut session = GameSession::new("empty", 0);
        assert!(matches!(
            session.add_dog(&map, "Rex"),
            Err(ModelError::NoRoads(_))
        ));
    }

    #[test]
    fn insert_dog_keeps_id_allocator_ahead() {
        let map = one_road_map();
        let mut session = GameSession::new("m1", 0);
        session.insert_dog(Dog::new("Saved", 7, Point::new(1.0, 0.0)));
        let fresh = session.add_dog(&map, "Fresh").unwrap();
        assert_eq!(fresh.id, 8);
    }
}
