use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::collision::{find_gather_events, Gatherer, Item};
use crate::constants::{DOG_RADIUS, LOOT_RADIUS, OFFICE_RADIUS};
use crate::extra_data::ExtraData;
use crate::geom::{Direction, Point};
use crate::loot::{LootGenerator, LootItem};
use crate::model::{BagItem, Game, ModelError};
use crate::movement;
use crate::persistence::{DogRepr, SavePoint, StateSnapshot};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("map not found")]
    MapNotFound,
    #[error("unknown token")]
    UnknownToken,
    #[error("player name must not be empty")]
    InvalidName,
    #[error("tick delta must be a positive number of milliseconds")]
    InvalidTickDelta,
    #[error("map has no roads to spawn on")]
    NoSpawnPoint,
}

/// Binding from a token to the dog it controls. Sessions and dogs are
/// addressed by stable ids, never by reference, so a binding can
/// outlive any reshuffling of the owning collections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub map_id: String,
    pub dog_id: u32,
}

fn generate_token() -> String {
    format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>())
}

/// Token registry: the unit of concurrent external access. Tokens are
/// 32 lowercase hex characters from two independent 64-bit draws.
#[derive(Clone, Debug, Default)]
pub struct PlayerTokens {
    token_to_player: HashMap<String, Player>,
}

impl PlayerTokens {
    pub fn add_player(&mut self, player: Player) -> String {
        loop {
            let token = generate_token();
            if !self.token_to_player.contains_key(&token) {
                self.token_to_player.insert(token.clone(), player);
                return token;
            }
        }
    }

    /// Restores a previously issued binding verbatim, bypassing
    /// generation. Only the state-load path uses this.
    pub fn insert_unchecked(&mut self, token: String, player: Player) {
        self.token_to_player.insert(token, player);
    }

    pub fn find_player(&self, token: &str) -> Option<&Player> {
        self.token_to_player.get(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Player)> {
        self.token_to_player.iter()
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.token_to_player.values()
    }

    pub fn len(&self) -> usize {
        self.token_to_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_player.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JoinResult {
    #[serde(rename = "authToken")]
    pub token: String,
    #[serde(rename = "playerId")]
    pub dog_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerListEntry {
    pub id: u32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DogState {
    pub id: u32,
    pub pos: [f64; 2],
    pub speed: [f64; 2],
    pub dir: Direction,
    pub bag: Vec<BagItem>,
    pub score: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LootState {
    pub id: usize,
    #[serde(rename = "type")]
    pub type_index: usize,
    pub pos: [f64; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameStateView {
    pub dogs: Vec<DogState>,
    pub loot: Vec<LootState>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MapSummary {
    pub id: String,
    pub name: String,
}

/// The simulation core. All mutation funnels through one owner of this
/// struct; handlers marshal onto it and wait (single-writer model).
pub struct Application {
    game: Game,
    tokens: PlayerTokens,
    extra: ExtraData,
    loots: HashMap<String, Vec<LootItem>>,
    loot_gen: Box<dyn LootGenerator + Send>,
    save_point: Option<SavePoint>,
}

impl Application {
    pub fn new(
        game: Game,
        extra: ExtraData,
        loot_gen: Box<dyn LootGenerator + Send>,
        save_point: Option<SavePoint>,
    ) -> Self {
        let loots = game
            .maps()
            .iter()
            .map(|map| (map.id().to_string(), Vec::new()))
            .collect();
        Self {
            game,
            tokens: PlayerTokens::default(),
            extra,
            loots,
            loot_gen,
            save_point,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn tokens(&self) -> &PlayerTokens {
        &self.tokens
    }

    pub fn loot_in_map(&self, map_id: &str) -> &[LootItem] {
        self.loots.get(map_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn join_game(&mut self, name: &str, map_id: &str) -> Result<JoinResult, AppError> {
        if name.is_empty() {
            return Err(AppError::InvalidName);
        }
        match self.game.add_dog(map_id, name) {
            None => Err(AppError::MapNotFound),
            Some(Err(ModelError::NoRoads(_))) => Err(AppError::NoSpawnPoint),
            Some(Err(_)) => Err(AppError::MapNotFound),
            Some(Ok(dog_id)) => {
                let token = self.tokens.add_player(Player {
                    map_id: map_id.to_string(),
                    dog_id,
                });
                Ok(JoinResult { token, dog_id })
            }
        }
    }

    /// Everyone on the same map as the token's dog.
    pub fn list_players(&self, token: &str) -> Result<Vec<PlayerListEntry>, AppError> {
        let player = self.tokens.find_player(token).ok_or(AppError::UnknownToken)?;
        let dogs = self
            .game
            .session(&player.map_id)
            .map(|session| session.dogs())
            .unwrap_or(&[]);
        Ok(dogs
            .iter()
            .map(|dog| PlayerListEntry {
                id: dog.id,
                name: dog.name.clone(),
            })
            .collect())
    }

    pub fn get_state(&self, token: &str) -> Result<GameStateView, AppError> {
        let player = self.tokens.find_player(token).ok_or(AppError::UnknownToken)?;
        let dogs = self
            .game
            .session(&player.map_id)
            .map(|session| session.dogs())
            .unwrap_or(&[])
            .iter()
            .map(|dog| DogState {
                id: dog.id,
                pos: [dog.position.x, dog.position.y],
                speed: [dog.speed.ux, dog.speed.uy],
                dir: dog.direction,
                bag: dog.bag.clone(),
                score: dog.score,
            })
            .collect();
        let loot = self
            .loot_in_map(&player.map_id)
            .iter()
            .enumerate()
            .map(|(id, item)| LootState {
                id,
                type_index: item.type_index,
                pos: [item.position.x, item.position.y],
            })
            .collect();
        Ok(GameStateView { dogs, loot })
    }

    /// `None` stops the dog; a direction sets its velocity along one
    /// axis at the map's dog speed.
    pub fn set_action(&mut self, token: &str, direction: Option<Direction>) -> Result<(), AppError> {
        let player = self
            .tokens
            .find_player(token)
            .cloned()
            .ok_or(AppError::UnknownToken)?;
        let Some((map, session)) = self.game.map_and_session_mut(&player.map_id) else {
            return Err(AppError::UnknownToken);
        };
        let speed = map.dog_speed();
        let Some(dog) = session.dog_mut(player.dog_id) else {
            return Err(AppError::UnknownToken);
        };
        match direction {
            None => dog.speed = crate::geom::Speed::zero(),
            Some(dir) => {
                dog.direction = dir;
                dog.speed = dir.speed(speed);
            }
        }
        Ok(())
    }

    pub fn list_maps(&self) -> Vec<MapSummary> {
        self.game
            .maps()
            .iter()
            .map(|map| MapSummary {
                id: map.id().to_string(),
                name: map.name().to_string(),
            })
            .collect()
    }

    /// Full static description of one map, loot-type descriptors
    /// included, shaped for the maps API.
    pub fn map_description(&self, map_id: &str) -> Result<Value, AppError> {
        let map = self.game.find_map(map_id).ok_or(AppError::MapNotFound)?;
        let roads: Vec<Value> = map
            .roads()
            .iter()
            .map(|road| {
                let (x0, y0) = road.start();
                let (x1, y1) = road.end();
                if road.is_horizontal() {
                    json!({ "x0": x0, "y0": y0, "x1": x1 })
                } else {
                    json!({ "x0": x0, "y0": y0, "y1": y1 })
                }
            })
            .collect();
        let buildings: Vec<Value> = map
            .buildings()
            .iter()
            .map(|b| json!({ "x": b.x, "y": b.y, "w": b.w, "h": b.h }))
            .collect();
        let offices: Vec<Value> = map
            .offices()
            .iter()
            .map(|office| {
                json!({
                    "id": office.id,
                    "x": office.position.0,
                    "y": office.position.1,
                    "offsetX": office.offset.0,
                    "offsetY": office.offset.1,
                })
            })
            .collect();
        let mut description = json!({
            "id": map.id(),
            "name": map.name(),
            "roads": roads,
            "buildings": buildings,
            "offices": offices,
        });
        if let Some(loot_types) = self.extra.loot_types(map_id) {
            description["lootTypes"] = loot_types.clone();
        }
        Ok(description)
    }

    /// One simulation step: move every controlled dog, resolve loot and
    /// office contacts per map, replenish loot, advance the autosave
    /// counter.
    pub fn tick(&mut self, delta_ms: u64) -> Result<(), AppError> {
        if delta_ms == 0 {
            return Err(AppError::InvalidTickDelta);
        }
        let dt = delta_ms as f64 / 1000.0;
        let delta = Duration::from_millis(delta_ms);

        let mut moves: HashMap<String, Vec<(u32, Point)>> = HashMap::new();
        for player in self.tokens.players() {
            let Some((map, session)) = self.game.map_and_session_mut(&player.map_id) else {
                continue;
            };
            let Some(dog) = session.dog_mut(player.dog_id) else {
                continue;
            };
            let old_position = dog.position;
            let (position, speed) = movement::advance(map, dog.position, dog.speed, dt);
            dog.position = position;
            dog.speed = speed;
            moves
                .entry(player.map_id.clone())
                .or_default()
                .push((player.dog_id, old_position));
        }

        for (map_id, dog_moves) in &moves {
            self.process_collisions(map_id, dog_moves);
        }

        self.generate_loot(delta);
        self.maybe_save(delta);
        Ok(())
    }

    fn process_collisions(&mut self, map_id: &str, dog_moves: &[(u32, Point)]) {
        let Some(loots) = self.loots.get_mut(map_id) else {
            return;
        };
        let extra = &self.extra;
        let Some((map, session)) = self.game.map_and_session_mut(map_id) else {
            return;
        };

        let mut tracked_dogs: Vec<u32> = Vec::with_capacity(dog_moves.len());
        let mut gatherers: Vec<Gatherer> = Vec::with_capacity(dog_moves.len());
        for (dog_id, old_position) in dog_moves {
            let Some(dog) = session.dog(*dog_id) else {
                continue;
            };
            tracked_dogs.push(*dog_id);
            gatherers.push(Gatherer {
                start: *old_position,
                end: dog.position,
                radius: DOG_RADIUS,
            });
        }

        let items: Vec<Item> = loots
            .iter()
            .map(|loot| Item {
                position: loot.position,
                radius: LOOT_RADIUS,
            })
            .chain(map.offices().iter().map(|office| Item {
                position: office.point(),
                radius: OFFICE_RADIUS,
            }))
            .collect();

        let mut claimed: Vec<usize> = Vec::new();
        for event in find_gather_events(&gatherers, &items) {
            // The raw projection ratio orders the events; only contacts
            // within the traversed segment count as real ones.
            if !(0.0..=1.0).contains(&event.time) {
                continue;
            }
            let Some(dog) = session.dog_mut(tracked_dogs[event.gatherer]) else {
                continue;
            };
            if event.item < loots.len() {
                // First claimant wins; later claims on the same loot
                // index this tick are dropped.
                if claimed.contains(&event.item) {
                    continue;
                }
                if dog.bag.len() < map.bag_capacity() {
                    dog.bag.push(BagItem {
                        id: event.item as u64,
                        type_index: loots[event.item].type_index,
                    });
                    claimed.push(event.item);
                }
            } else if !dog.bag.is_empty() {
                let earned: u64 = dog
                    .bag
                    .iter()
                    .map(|item| extra.loot_value(map_id, item.type_index))
                    .sum();
                dog.score += earned;
                dog.bag.clear();
            }
        }

        // Descending order keeps the remaining indices valid.
        claimed.sort_unstable_by(|a, b| b.cmp(a));
        for index in claimed {
            loots.remove(index);
        }
    }

    fn generate_loot(&mut self, delta: Duration) {
        let map_ids: Vec<String> = self
            .game
            .maps()
            .iter()
            .map(|map| map.id().to_string())
            .collect();
        for map_id in map_ids {
            let Some(type_count) = self.extra.loot_type_count(&map_id) else {
                continue;
            };
            if type_count == 0 {
                continue;
            }
            let Some(looters) = self.game.session(&map_id).map(|s| s.dogs().len()) else {
                continue;
            };
            let current = self.loots.get(&map_id).map(Vec::len).unwrap_or(0);
            let wanted = self.loot_gen.generate(delta, current, looters);
            if wanted == 0 {
                continue;
            }
            let Some((map, session)) = self.game.map_and_session_mut(&map_id) else {
                continue;
            };
            if map.roads().is_empty() {
                continue;
            }
            let ledger = self.loots.entry(map_id.clone()).or_default();
            for _ in 0..wanted {
                let type_index = session.rng_mut().pick_index(type_count);
                let position = map.random_position_on_road(session.rng_mut());
                ledger.push(LootItem {
                    type_index,
                    position,
                });
            }
        }
    }

    fn maybe_save(&mut self, delta: Duration) {
        let due = match self.save_point.as_mut() {
            Some(save_point) => save_point.on_tick(delta),
            None => false,
        };
        if !due {
            return;
        }
        self.save_now();
    }

    /// Writes a snapshot immediately if persistence is configured. A
    /// failed write is logged and skipped, never fatal.
    pub fn save_now(&self) {
        let Some(save_point) = &self.save_point else {
            return;
        };
        let snapshot = self.snapshot();
        if let Err(error) = snapshot.save(save_point.path()) {
            log::error!(
                "failed to write state snapshot to {}: {error}",
                save_point.path().display()
            );
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let mut snapshot = StateSnapshot::default();
        for (token, player) in self.tokens.iter() {
            snapshot
                .players
                .insert(token.clone(), (player.map_id.clone(), player.dog_id));
        }
        for map in self.game.maps() {
            let Some(session) = self.game.session(map.id()) else {
                continue;
            };
            let dogs: Vec<DogRepr> = session
                .dogs()
                .iter()
                .map(|dog| DogRepr {
                    name: dog.name.clone(),
                    id: dog.id,
                    position: dog.position,
                    speed: dog.speed,
                    direction: dog.direction,
                    bag: dog.bag.clone(),
                    score: dog.score,
                })
                .collect();
            if !dogs.is_empty() {
                snapshot.dogs.insert(map.id().to_string(), dogs);
            }
        }
        for (map_id, loots) in &self.loots {
            if !loots.is_empty() {
                snapshot.loot.insert(map_id.clone(), loots.clone());
            }
        }
        snapshot
    }

    /// Rebuilds the dynamic state from a snapshot: sessions and dogs
    /// first, then token bindings, then loot ledgers. Entries that no
    /// longer match the static map set are skipped with a warning.
    pub fn restore(&mut self, snapshot: StateSnapshot) {
        for (map_id, dog_reprs) in snapshot.dogs {
            let Some(session) = self.game.find_session(&map_id) else {
                log::warn!("snapshot references unknown map '{map_id}', skipping its dogs");
                continue;
            };
            for repr in dog_reprs {
                let mut dog = crate::model::Dog::new(repr.name, repr.id, repr.position);
                dog.speed = repr.speed;
                dog.direction = repr.direction;
                dog.bag = repr.bag;
                dog.score = repr.score;
                session.insert_dog(dog);
            }
        }
        for (token, (map_id, dog_id)) in snapshot.players {
            let known = self
                .game
                .session(&map_id)
                .map(|session| session.dog(dog_id).is_some())
                .unwrap_or(false);
            if !known {
                log::warn!("snapshot token binds to missing dog {dog_id} on '{map_id}', skipping");
                continue;
            }
            self.tokens.insert_unchecked(token, Player { map_id, dog_id });
        }
        for (map_id, loots) in snapshot.loot {
            if self.game.find_map(&map_id).is_none() {
                log::warn!("snapshot references unknown map '{map_id}', skipping its loot");
                continue;
            }
            self.loots.insert(map_id, loots);
        }
    }
}
