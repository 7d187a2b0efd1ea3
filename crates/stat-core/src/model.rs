//! Statistical model container
//!
//! A [`StatisticalModel`] is an ordered collection of named tables split into
//! a Learned group (sufficient statistics) and a Derived group. Phases find
//! their inputs by table name, never by position, so a model assembled by
//! aggregation or read back from JSON works the same as a freshly learned one.

use crate::error::{Error, Result};
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// Phase group a model table belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelPhase {
    Learned,
    Derived,
}

/// A named table with a stable slot id inside its phase group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTable {
    pub slot: usize,
    pub name: String,
    pub table: Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalModel {
    algorithm: String,
    learned: Vec<ModelTable>,
    derived: Vec<ModelTable>,
}

impl StatisticalModel {
    /// Empty model produced by the named algorithm
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            learned: Vec::new(),
            derived: Vec::new(),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    fn group(&self, phase: ModelPhase) -> &Vec<ModelTable> {
        match phase {
            ModelPhase::Learned => &self.learned,
            ModelPhase::Derived => &self.derived,
        }
    }

    fn group_mut(&mut self, phase: ModelPhase) -> &mut Vec<ModelTable> {
        match phase {
            ModelPhase::Learned => &mut self.learned,
            ModelPhase::Derived => &mut self.derived,
        }
    }

    /// Insert a table, replacing a same-named one in place
    ///
    /// Returns the slot id of the table.
    pub fn insert(&mut self, phase: ModelPhase, name: impl Into<String>, table: Table) -> usize {
        let name = name.into();
        let group = self.group_mut(phase);
        if let Some(existing) = group.iter_mut().find(|t| t.name == name) {
            existing.table = table;
            return existing.slot;
        }
        let slot = group.len();
        group.push(ModelTable { slot, name, table });
        slot
    }

    pub fn get(&self, phase: ModelPhase, name: &str) -> Option<&Table> {
        self.group(phase)
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.table)
    }

    pub fn learned(&self, name: &str) -> Option<&Table> {
        self.get(ModelPhase::Learned, name)
    }

    pub fn derived(&self, name: &str) -> Option<&Table> {
        self.get(ModelPhase::Derived, name)
    }

    /// Learned table lookup that reports absence as an error
    pub fn require_learned(&self, name: &str) -> Result<&Table> {
        self.learned(name).ok_or_else(|| Error::missing_table(name))
    }

    /// Derived table lookup that reports absence as an error
    pub fn require_derived(&self, name: &str) -> Result<&Table> {
        self.derived(name).ok_or_else(|| Error::missing_table(name))
    }

    pub fn tables(&self, phase: ModelPhase) -> &[ModelTable] {
        self.group(phase)
    }

    /// Names of the tables of one group, in slot order
    pub fn names(&self, phase: ModelPhase) -> Vec<&str> {
        self.group(phase).iter().map(|t| t.name.as_str()).collect()
    }

    /// Drop the Derived group so Derive can rebuild it
    pub fn clear_derived(&mut self) {
        self.derived.clear();
    }

    /// Replace the whole Derived group at once
    pub fn set_derived(&mut self, tables: Vec<(String, Table)>) {
        self.derived = tables
            .into_iter()
            .enumerate()
            .map(|(slot, (name, table))| ModelTable { slot, name, table })
            .collect();
    }

    pub fn is_empty(&self) -> bool {
        self.learned.is_empty() && self.derived.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn test_slots_are_stable() {
        let mut model = StatisticalModel::new("descriptive");
        let a = model.insert(ModelPhase::Learned, "A", Table::new());
        let b = model.insert(ModelPhase::Learned, "B", Table::new());
        let replaced = model.insert(
            ModelPhase::Learned,
            "A",
            Table::new().with_column("x", Column::Real(vec![1.0])).unwrap(),
        );
        assert_eq!((a, b, replaced), (0, 1, 0));
        assert_eq!(model.names(ModelPhase::Learned), vec!["A", "B"]);
        assert_eq!(model.learned("A").unwrap().num_rows(), 1);
        assert!(model.derived("A").is_none());
        assert!(matches!(model.require_learned("C"), Err(Error::MissingTable(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let mut model = StatisticalModel::new("order");
        model.insert(
            ModelPhase::Derived,
            "Quantiles",
            Table::new()
                .with_column("Quantile", Column::Text(vec!["Minimum".into()]))
                .unwrap(),
        );
        let text = model.to_json().unwrap();
        let back = StatisticalModel::from_json(&text).unwrap();
        assert_eq!(back, model);
        assert_eq!(back.algorithm(), "order");
    }

    #[test]
    fn test_ragged_table_is_rejected_on_load() {
        let text = r#"{
            "algorithm": "descriptive",
            "learned": [{
                "slot": 0,
                "name": "Primary Statistics",
                "table": {
                    "names": ["Variable", "Cardinality", "Mean"],
                    "columns": [{"Text": ["a", "b"]}, {"Integer": [3]}, {"Real": [1.5]}],
                    "ghosts": null
                }
            }],
            "derived": []
        }"#;
        let err = StatisticalModel::from_json(text).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("column Cardinality has 1 rows, expected 2"));
    }
}
