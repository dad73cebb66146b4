use serde::{Deserialize, Serialize};

/// Continuous position on the map plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Velocity in map units per second. By construction at most one
/// component is non-zero at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Speed {
    pub ux: f64,
    pub uy: f64,
}

impl Speed {
    pub fn zero() -> Self {
        Self { ux: 0.0, uy: 0.0 }
    }

    pub fn is_zero(&self) -> bool {
        self.ux == 0.0 && self.uy == 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "U")]
    North,
    #[serde(rename = "D")]
    South,
    #[serde(rename = "L")]
    West,
    #[serde(rename = "R")]
    East,
}

impl Direction {
    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "U" => Some(Self::North),
            "D" => Some(Self::South),
            "L" => Some(Self::West),
            "R" => Some(Self::East),
            _ => None,
        }
    }

    /// Velocity for a dog facing this way at the given scalar speed.
    pub fn speed(&self, magnitude: f64) -> Speed {
        match self {
            Self::North => Speed { ux: 0.0, uy: -magnitude },
            Self::South => Speed { ux: 0.0, uy: magnitude },
            Self::West => Speed { ux: -magnitude, uy: 0.0 },
            Self::East => Speed { ux: magnitude, uy: 0.0 },
        }
    }
}
