pub mod app;
pub mod collision;
pub mod constants;
pub mod extra_data;
pub mod geom;
pub mod json_loader;
pub mod loot;
pub mod model;
pub mod movement;
pub mod persistence;
pub mod rng;
