// src/pattern/column.rs
//
// Column schema for a pattern grid.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnCategory {
    Trigger,
    Condition,
    Parameter,
}

/// Describes one addressable column of the step grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    pub category: ColumnCategory,
    pub required: bool,
    pub display_order: u32,
}

impl ColumnConfig {
    pub fn new(name: impl Into<String>, category: ColumnCategory, display_order: u32) -> Self {
        Self {
            name: name.into(),
            category,
            required: false,
            display_order,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// The two always-present, non-removable trigger columns.
pub fn trigger_columns() -> Vec<ColumnConfig> {
    vec![
        ColumnConfig::new("index", ColumnCategory::Trigger, 0).required(),
        ColumnConfig::new("length", ColumnCategory::Trigger, 1).required(),
    ]
}
