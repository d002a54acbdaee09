//! Display names for sensors and channels
//!
//! Every sensor and channel carries a short name and a longer description.
//! Defaults follow the controller's own labels (`DS0`, `CH3`, `miniNG-AS1`...);
//! overrides are stored as `[[names]]` entries in the configuration file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TbanError};

/// Which group of sensors or channels a name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameCategory {
    #[serde(rename = "TBAN_DS")]
    TbanDs,
    #[serde(rename = "TBAN_AS")]
    TbanAs,
    #[serde(rename = "TBAN_CH")]
    TbanCh,
    #[serde(rename = "MINI_NG_AS")]
    MiniNgAs,
    #[serde(rename = "MINI_CH")]
    MiniCh,
    #[serde(rename = "BIG_NG_AS")]
    BigNgAs,
}

impl NameCategory {
    pub const ALL: [NameCategory; 6] = [
        NameCategory::TbanDs,
        NameCategory::TbanAs,
        NameCategory::TbanCh,
        NameCategory::MiniNgAs,
        NameCategory::MiniCh,
        NameCategory::BigNgAs,
    ];

    /// Tag used in configuration files
    pub fn tag(&self) -> &'static str {
        match self {
            NameCategory::TbanDs => "TBAN_DS",
            NameCategory::TbanAs => "TBAN_AS",
            NameCategory::TbanCh => "TBAN_CH",
            NameCategory::MiniNgAs => "MINI_NG_AS",
            NameCategory::MiniCh => "MINI_CH",
            NameCategory::BigNgAs => "BIG_NG_AS",
        }
    }

    /// Number of named entries in this category
    pub fn count(&self) -> usize {
        match self {
            NameCategory::TbanDs => 8,
            NameCategory::TbanAs => 6,
            NameCategory::TbanCh => 4,
            NameCategory::MiniNgAs => 2,
            NameCategory::MiniCh => 2,
            NameCategory::BigNgAs => 4,
        }
    }

    fn default_name(&self, index: usize) -> String {
        match self {
            NameCategory::TbanDs => format!("DS{}", index),
            NameCategory::TbanAs => format!("AS{}", index),
            NameCategory::TbanCh => format!("CH{}", index),
            NameCategory::MiniNgAs => format!("miniNG-AS{}", index),
            NameCategory::MiniCh => format!("miniNG-ch{}", index),
            NameCategory::BigNgAs => format!("BigNG-AS{}", index),
        }
    }
}

impl fmt::Display for NameCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for NameCategory {
    type Err = TbanError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NameCategory::ALL
            .into_iter()
            .find(|c| c.tag().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                TbanError::InvalidInput(format!(
                    "Unknown name category: '{}'. Valid options: {}",
                    s,
                    NameCategory::ALL.map(|c| c.tag()).join(", ")
                ))
            })
    }
}

/// One persisted name override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEntry {
    pub category: NameCategory,
    pub index: usize,
    pub short: String,
    pub long: String,
}

/// Short and long name of a single sensor or channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Name {
    pub short: String,
    pub long: String,
}

/// Names for every category, pre-filled with defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTable {
    names: HashMap<NameCategory, Vec<Name>>,
}

impl Default for NameTable {
    fn default() -> Self {
        let names = NameCategory::ALL
            .into_iter()
            .map(|category| {
                let entries = (0..category.count())
                    .map(|i| {
                        let name = category.default_name(i);
                        Name {
                            short: name.clone(),
                            long: name,
                        }
                    })
                    .collect();
                (category, entries)
            })
            .collect();
        Self { names }
    }
}

impl NameTable {
    /// Replace the name of entry `index` in `category`
    pub fn set_name(
        &mut self,
        category: NameCategory,
        index: usize,
        short: &str,
        long: &str,
    ) -> Result<()> {
        let slot = self
            .names
            .get_mut(&category)
            .and_then(|entries| entries.get_mut(index))
            .ok_or(TbanError::IndexOutOfBounds {
                what: "name",
                index,
                count: category.count(),
            })?;
        slot.short = short.to_string();
        slot.long = long.to_string();
        Ok(())
    }

    pub fn get(&self, category: NameCategory, index: usize) -> Option<&Name> {
        self.names.get(&category).and_then(|e| e.get(index))
    }

    pub fn short(&self, category: NameCategory, index: usize) -> Option<&str> {
        self.get(category, index).map(|n| n.short.as_str())
    }

    pub fn long(&self, category: NameCategory, index: usize) -> Option<&str> {
        self.get(category, index).map(|n| n.long.as_str())
    }

    /// Short name, or the category default when `index` is out of range
    pub fn label(&self, category: NameCategory, index: usize) -> String {
        self.short(category, index)
            .map(str::to_string)
            .unwrap_or_else(|| category.default_name(index))
    }

    /// Entries that differ from the defaults, in category order
    pub fn overrides(&self) -> Vec<NameEntry> {
        let defaults = NameTable::default();
        let mut entries = Vec::new();
        for category in NameCategory::ALL {
            for index in 0..category.count() {
                if let (Some(name), Some(default)) =
                    (self.get(category, index), defaults.get(category, index))
                {
                    if name != default {
                        entries.push(NameEntry {
                            category,
                            index,
                            short: name.short.clone(),
                            long: name.long.clone(),
                        });
                    }
                }
            }
        }
        entries
    }
}
