use std::collections::HashMap;

use serde_json::Value;

/// Per-map loot-type descriptors, loaded once at startup. The entries
/// are opaque to the simulation except for their numeric `value`, which
/// prices a delivered item; the raw JSON is echoed to clients as part
/// of the map description.
#[derive(Clone, Debug, Default)]
pub struct ExtraData {
    loot_types: HashMap<String, Value>,
}

impl ExtraData {
    pub fn add_map_loot_types(&mut self, map_id: impl Into<String>, descriptors: Value) {
        self.loot_types.insert(map_id.into(), descriptors);
    }

    pub fn loot_types(&self, map_id: &str) -> Option<&Value> {
        self.loot_types.get(map_id)
    }

    pub fn loot_type_count(&self, map_id: &str) -> Option<usize> {
        self.loot_types
            .get(map_id)
            .and_then(Value::as_array)
            .map(Vec::len)
    }

    /// Delivery value of a loot type; unknown maps or indices price at
    /// zero rather than failing mid-tick.
    pub fn loot_value(&self, map_id: &str, type_index: usize) -> u64 {
        self.loot_types
            .get(map_id)
            .and_then(Value::as_array)
            .and_then(|types| types.get(type_index))
            .and_then(|descriptor| descriptor.get("value"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ExtraData {
        let mut extra = ExtraData::default();
        extra.add_map_loot_types(
            "m1",
            json!([
                { "name": "key", "file": "assets/key.obj", "value": 10 },
                { "name": "wallet", "file": "assets/wallet.obj", "value": 30 },
                { "name": "junk", "file": "assets/junk.obj" }
            ]),
        );
        extra
    }

    #[test]
    fn values_are_looked_up_per_type_index() {
        let extra = sample();
        assert_eq!(extra.loot_value("m1", 0), 10);
        assert_eq!(extra.loot_value("m1", 1), 30);
    }

    #[test]
    fn missing_value_map_or_index_prices_at_zero() {
        let extra = sample();
        assert_eq!(extra.loot_value("m1", 2), 0);
        assert_eq!(extra.loot_value("m1", 99), 0);
        assert_eq!(extra.loot_value("nowhere", 0), 0);
    }

    #[test]
    fn type_count_reflects_the_descriptor_array() {
        let extra = sample();
        assert_eq!(extra.loot_type_count("m1"), Some(3));
        assert_eq!(extra.loot_type_count("nowhere"), None);
    }
}
