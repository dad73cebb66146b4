use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geom::Point;

/// One spawned loot instance sitting on a map, waiting to be gathered.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LootItem {
    #[serde(rename = "type")]
    pub type_index: usize,
    pub position: Point,
}

/// Injected replenishment strategy: how many new loot items to spawn
/// this tick, given the current count and the number of looters.
pub trait LootGenerator {
    fn generate(&mut self, delta: Duration, loot_count: usize, looter_count: usize) -> usize;
}

/// Default strategy: every `base_interval` of accumulated time, spawn
/// each missing item (one per looter beyond the current loot count)
/// with the configured probability, scaled by a uniform random draw.
pub struct TimedLootGenerator {
    base_interval: Duration,
    probability: f64,
    unspent: Duration,
    random: Box<dyn FnMut() -> f64 + Send>,
}

impl TimedLootGenerator {
    pub fn new(base_interval: Duration, probability: f64) -> Self {
        Self::with_random(base_interval, probability, Box::new(rand::random::<f64>))
    }

    pub fn with_random(
        base_interval: Duration,
        probability: f64,
        random: Box<dyn FnMut() -> f64 + Send>,
    ) -> Self {
        Self {
            base_interval,
            probability,
            unspent: Duration::ZERO,
            random,
        }
    }
}

impl LootGenerator for TimedLootGenerator {
    fn generate(&mut self, delta: Duration, loot_count: usize, looter_count: usize) -> usize {
        self.unspent += delta;
        let shortage = looter_count.saturating_sub(loot_count);
        if shortage == 0 || self.base_interval.is_zero() {
            return 0;
        }
        let ratio = self.unspent.as_secs_f64() / self.base_interval.as_secs_f64();
        let probability = (1.0 - (1.0 - self.probability).powf(ratio)).clamp(0.0, 1.0);
        let generated = (shortage as f64 * probability * (self.random)()).round() as usize;
        if generated > 0 {
            self.unspent = Duration::ZERO;
        }
        generated.min(shortage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_shortage_means_no_spawn() {
        let mut gen = TimedLootGenerator::new(Duration::from_secs(1), 1.0);
        assert_eq!(gen.generate(Duration::from_secs(10), 3, 3), 0);
        assert_eq!(gen.generate(Duration::from_secs(10), 5, 2), 0);
    }

    fn pinned(base_interval: Duration, probability: f64) -> TimedLootGenerator {
        TimedLootGenerator::with_random(base_interval, probability, Box::new(|| 1.0))
    }

    #[test]
    fn certain_probability_fills_the_shortage() {
        let mut gen = pinned(Duration::from_secs(1), 1.0);
        assert_eq!(gen.generate(Duration::from_secs(1), 0, 4), 4);
    }

    #[test]
    fn zero_probability_never_spawns() {
        let mut gen = TimedLootGenerator::new(Duration::from_secs(1), 0.0);
        for _ in 0..20 {
            assert_eq!(gen.generate(Duration::from_secs(5), 0, 10), 0);
        }
    }

    #[test]
    fn probability_grows_with_time_without_loot() {
        // p = 0.5 over one base interval; after two unspent intervals
        // the chance is 0.75 of the shortage.
        let mut gen = pinned(Duration::from_secs(10), 0.5);
        assert_eq!(gen.generate(Duration::from_secs(20), 0, 100), 75);
        // The accumulator resets once something spawned.
        assert_eq!(gen.generate(Duration::from_secs(10), 0, 100), 50);
    }

    #[test]
    fn default_generator_scales_by_a_random_draw() {
        let mut gen = TimedLootGenerator::new(Duration::from_secs(1), 1.0);
        let mut counts = std::collections::HashSet::new();
        for _ in 0..100 {
            let count = gen.generate(Duration::from_secs(1), 0, 100);
            assert!(count <= 100);
            counts.insert(count);
        }
        // A pinned draw would spawn the same count every interval.
        assert!(counts.len() > 1);
    }

    #[test]
    fn spawn_count_is_capped_by_the_shortage() {
        let mut gen = TimedLootGenerator::with_random(
            Duration::from_secs(1),
            1.0,
            Box::new(|| 10.0),
        );
        assert_eq!(gen.generate(Duration::from_secs(1), 1, 3), 2);
    }
}
