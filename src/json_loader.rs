use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::extra_data::ExtraData;
use crate::model::{Building, Game, Map, ModelError, Office, Road};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("map '{map_id}' has a road with neither x1 nor y1")]
    InvalidRoad { map_id: String },
}

/// Replenishment parameters shared by every map.
#[derive(Clone, Copy, Debug)]
pub struct LootSettings {
    pub period: Duration,
    pub probability: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigRepr {
    #[serde(default)]
    default_dog_speed: Option<f64>,
    #[serde(default)]
    default_bag_capacity: Option<usize>,
    loot_generator_config: LootGeneratorRepr,
    maps: Vec<MapRepr>,
}

#[derive(Deserialize)]
struct LootGeneratorRepr {
    /// Base interval in seconds.
    period: f64,
    probability: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapRepr {
    id: String,
    name: String,
    #[serde(default)]
    dog_speed: Option<f64>,
    #[serde(default)]
    bag_capacity: Option<usize>,
    roads: Vec<RoadRepr>,
    #[serde(default)]
    buildings: Vec<BuildingRepr>,
    #[serde(default)]
    offices: Vec<OfficeRepr>,
    #[serde(default)]
    loot_types: Option<Value>,
}

#[derive(Deserialize)]
struct RoadRepr {
    x0: i64,
    y0: i64,
    #[serde(default)]
    x1: Option<i64>,
    #[serde(default)]
    y1: Option<i64>,
}

#[derive(Deserialize)]
struct BuildingRepr {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfficeRepr {
    id: String,
    x: i64,
    y: i64,
    offset_x: i64,
    offset_y: i64,
}

/// Builds the game world from config text. Per-map settings override
/// the config-wide defaults; defaults missing from the config fall back
/// to the built-in constants.
pub fn parse_config(text: &str, seed: u32) -> Result<(Game, ExtraData, LootSettings), LoadError> {
    let repr: ConfigRepr = serde_json::from_str(text)?;

    let mut game = Game::new(seed);
    if let Some(speed) = repr.default_dog_speed {
        game.set_default_dog_speed(speed);
    }
    if let Some(capacity) = repr.default_bag_capacity {
        game.set_default_bag_capacity(capacity);
    }

    let mut extra = ExtraData::default();
    for map_repr in repr.maps {
        let mut map = Map::new(map_repr.id.clone(), map_repr.name);
        if let Some(speed) = map_repr.dog_speed {
            map.set_dog_speed(speed);
        }
        if let Some(capacity) = map_repr.bag_capacity {
            map.set_bag_capacity(capacity);
        }
        for road in map_repr.roads {
            // A road is horizontal when it names x1, vertical when it
            // names y1. x1 wins if a config lists both.
            let road = match (road.x1, road.y1) {
                (Some(x1), _) => Road::horizontal(road.x0, road.y0, x1),
                (None, Some(y1)) => Road::vertical(road.x0, road.y0, y1),
                (None, None) => {
                    return Err(LoadError::InvalidRoad {
                        map_id: map_repr.id,
                    })
                }
            };
            map.add_road(road);
        }
        for building in map_repr.buildings {
            map.add_building(Building {
                x: building.x,
                y: building.y,
                w: building.w,
                h: building.h,
            });
        }
        for office in map_repr.offices {
            map.add_office(Office {
                id: office.id,
                position: (office.x, office.y),
                offset: (office.offset_x, office.offset_y),
            })?;
        }
        if let Some(loot_types) = map_repr.loot_types {
            extra.add_map_loot_types(map_repr.id.clone(), loot_types);
        }
        game.add_map(map)?;
    }

    let settings = LootSettings {
        period: Duration::from_secs_f64(repr.loot_generator_config.period),
        probability: repr.loot_generator_config.probability,
    };
    Ok((game, extra, settings))
}

pub fn load_config(path: &Path, seed: u32) -> Result<(Game, ExtraData, LootSettings), LoadError> {
    let text = fs::read_to_string(path)?;
    parse_config(&text, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "defaultDogSpeed": 3.0,
        "defaultBagCapacity": 3,
        "lootGeneratorConfig": { "period": 5.0, "probability": 0.5 },
        "maps": [
            {
                "id": "map1",
                "name": "Map 1",
                "dogSpeed": 4.0,
                "roads": [
                    { "x0": 0, "y0": 0, "x1": 40 },
                    { "x0": 40, "y0": 0, "y1": 30 }
                ],
                "buildings": [
                    { "x": 5, "y": 5, "w": 30, "h": 20 }
                ],
                "offices": [
                    { "id": "o0", "x": 40, "y": 30, "offsetX": 5, "offsetY": 0 }
                ],
                "lootTypes": [
                    { "name": "key", "value": 10 },
                    { "name": "wallet", "value": 30 }
                ]
            },
            {
                "id": "map2",
                "name": "Map 2",
                "roads": [ { "x0": 0, "y0": 0, "y1": 10 } ]
            }
        ]
    }"#;

    #[test]
    fn sample_config_builds_the_whole_world() {
        let (game, extra, settings) = parse_config(SAMPLE, 0).unwrap();

        let map1 = game.find_map("map1").unwrap();
        assert_eq!(map1.name(), "Map 1");
        assert_eq!(map1.dog_speed(), 4.0);
        assert_eq!(map1.bag_capacity(), 3);
        assert_eq!(map1.roads().len(), 2);
        assert!(map1.roads()[0].is_horizontal());
        assert!(!map1.roads()[1].is_horizontal());
        assert_eq!(map1.buildings().len(), 1);
        assert_eq!(map1.offices()[0].offset, (5, 0));

        // map2 inherits the config-wide default speed.
        let map2 = game.find_map("map2").unwrap();
        assert_eq!(map2.dog_speed(), 3.0);

        assert_eq!(extra.loot_type_count("map1"), Some(2));
        assert_eq!(extra.loot_value("map1", 1), 30);
        assert_eq!(extra.loot_type_count("map2"), None);

        assert_eq!(settings.period, Duration::from_secs(5));
        assert_eq!(settings.probability, 0.5);
    }

    #[test]
    fn road_without_a_second_endpoint_is_rejected() {
        let bad = r#"{
            "lootGeneratorConfig": { "period": 5.0, "probability": 0.5 },
            "maps": [
                { "id": "m", "name": "M", "roads": [ { "x0": 0, "y0": 0 } ] }
            ]
        }"#;
        assert!(matches!(
            parse_config(bad, 0),
            Err(LoadError::InvalidRoad { .. })
        ));
    }

    #[test]
    fn duplicate_map_ids_are_a_config_error() {
        let bad = r#"{
            "lootGeneratorConfig": { "period": 5.0, "probability": 0.5 },
            "maps": [
                { "id": "m", "name": "M", "roads": [ { "x0": 0, "y0": 0, "x1": 1 } ] },
                { "id": "m", "name": "M again", "roads": [ { "x0": 0, "y0": 0, "x1": 1 } ] }
            ]
        }"#;
        assert!(matches!(parse_config(bad, 0), Err(LoadError::Model(_))));
    }

    #[test]
    fn malformed_json_is_reported_as_such() {
        assert!(matches!(parse_config("{ nope", 0), Err(LoadError::Json(_))));
    }
}
