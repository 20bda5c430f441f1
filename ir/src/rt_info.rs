//! String-keyed per-node metadata.

use std::collections::BTreeMap;
use std::str::FromStr;

use strum::{Display, EnumString, IntoStaticStr};

pub const TOPOLOGICAL_ORDER: &str = "TopologicalOrder";
pub const ORIGINAL_LAYERS_NAMES: &str = "originalLayersNames";
pub const SUBGRAPH_STATE: &str = "SubgraphState";

#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

/// Whether a fused subgraph still accepts neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, IntoStaticStr)]
pub enum SubgraphState {
    #[default]
    Open,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RtInfo(BTreeMap<String, RtValue>);

impl RtInfo {
    pub fn get(&self, key: &str) -> Option<&RtValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: RtValue) -> Option<RtValue> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<RtValue> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RtValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn topological_order(&self) -> Option<i64> {
        match self.get(TOPOLOGICAL_ORDER) {
            Some(RtValue::Int(order)) => Some(*order),
            _ => None,
        }
    }

    pub fn set_topological_order(&mut self, order: i64) {
        self.insert(TOPOLOGICAL_ORDER, RtValue::Int(order));
    }

    pub fn original_layers_names(&self) -> Option<&str> {
        match self.get(ORIGINAL_LAYERS_NAMES) {
            Some(RtValue::Str(names)) => Some(names),
            _ => None,
        }
    }

    pub fn set_original_layers_names(&mut self, names: impl Into<String>) {
        self.insert(ORIGINAL_LAYERS_NAMES, RtValue::Str(names.into()));
    }

    /// Missing or unparsable state reads as [`SubgraphState::Open`].
    pub fn subgraph_state(&self) -> SubgraphState {
        match self.get(SUBGRAPH_STATE) {
            Some(RtValue::Str(s)) => SubgraphState::from_str(s).unwrap_or_default(),
            _ => SubgraphState::Open,
        }
    }

    pub fn set_subgraph_state(&mut self, state: SubgraphState) {
        let name: &'static str = state.into();
        self.insert(SUBGRAPH_STATE, RtValue::Str(name.to_string()));
    }
}
