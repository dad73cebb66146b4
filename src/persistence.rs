use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geom::{Direction, Point, Speed};
use crate::loot::LootItem;
use crate::model::BagItem;

/// Serialized form of one dog, complete enough to resume play with the
/// same identity, bag and score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DogRepr {
    pub name: String,
    pub id: u32,
    pub position: Point,
    pub speed: Speed,
    pub direction: Direction,
    pub bag: Vec<BagItem>,
    pub score: u64,
}

/// Whole dynamic state of the server in one document: token bindings,
/// dogs per map and loot per map. The static map set is not part of it;
/// that comes from the config on every start.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u8,
    pub players: HashMap<String, (String, u32)>,
    pub dogs: HashMap<String, Vec<DogRepr>>,
    pub loot: HashMap<String, Vec<LootItem>>,
}

impl StateSnapshot {
    /// Writes the snapshot next to its final path and renames it into
    /// place, so a crash mid-write never clobbers the previous save.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(path);
        let payload = serde_json::to_vec(self)?;
        if let Err(error) = fs::write(&tmp, payload) {
            let _ = fs::remove_file(&tmp);
            return Err(error);
        }
        if let Err(error) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(error);
        }
        Ok(())
    }

    /// Reads a snapshot back. A missing file is a normal first start.
    /// An unreadable or unparsable file is set aside as `.corrupted`
    /// and the server starts fresh; loading never panics.
    pub fn load(path: &Path) -> Option<Self> {
        let payload = match fs::read(path) {
            Ok(payload) => payload,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
            Err(error) => {
                log::warn!("cannot read state file {}: {error}", path.display());
                set_aside(path);
                return None;
            }
        };
        match serde_json::from_slice(&payload) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                log::warn!("state file {} is corrupt: {error}", path.display());
                set_aside(path);
                None
            }
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn set_aside(path: &Path) {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupted");
    if let Err(error) = fs::rename(path, PathBuf::from(&aside)) {
        log::warn!("cannot set aside bad state file {}: {error}", path.display());
    }
}

/// Autosave schedule: accumulates simulated time and reports when a
/// full period has elapsed. Without a period, or with a zero one, the
/// state is written only on shutdown.
#[derive(Clone, Debug)]
pub struct SavePoint {
    path: PathBuf,
    period: Option<Duration>,
    since_save: Duration,
}

impl SavePoint {
    pub fn new(path: PathBuf, period: Option<Duration>) -> Self {
        Self {
            path,
            period,
            since_save: Duration::ZERO,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Advances the schedule by one tick's worth of simulated time and
    /// returns whether a save is due now.
    pub fn on_tick(&mut self, delta: Duration) -> bool {
        let Some(period) = self.period else {
            return false;
        };
        if period.is_zero() {
            return false;
        }
        self.since_save += delta;
        if self.since_save >= period {
            self.since_save = Duration::ZERO;
            true
        } else {
            false
        }
    }
}
