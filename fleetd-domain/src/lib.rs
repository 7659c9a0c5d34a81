pub mod assignment;
pub mod commands;
pub mod container;
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;
pub mod graph;
pub mod st_model;

pub use assignment::*;
pub use commands::*;
pub use container::*;
pub use graph::*;
use serde::{Serialize, Serializer};
pub use st_model::*;
use std::collections::HashMap;
use std::hash::Hash;

/// Custom serialization function that sorts the keys
pub fn serialize_as_sorted_map<K, V, S>(map: &HashMap<K, V>, serializer: S) -> anyhow::Result<S::Ok, S::Error>
where
    K: Serialize + Eq + Hash + Ord,
    V: Serialize,
    S: Serializer,
{
    use serde::ser::SerializeMap;

    let mut kv_pairs: Vec<(&K, &V)> = map.iter().collect();
    kv_pairs.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut map_ser = serializer.serialize_map(Some(kv_pairs.len()))?;
    for (k, v) in kv_pairs {
        map_ser.serialize_entry(k, v)?;
    }
    map_ser.end()
}
