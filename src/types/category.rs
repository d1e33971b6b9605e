//! Aisle categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AisleError;

/// Aisle group a shopping item belongs to.
///
/// The set is closed: anything a classifier returns outside of it is coerced
/// to [`Category::Other`] before it reaches the cache or a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FruitsVeg,
    Dairy,
    Bakery,
    Frozen,
    DryGoods,
    Cleaning,
    #[serde(alias = "BUTCHER")]
    Butcher,
    /// Fallback for unknown or unclassifiable items.
    Other,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 8] = [
        Category::FruitsVeg,
        Category::Dairy,
        Category::Bakery,
        Category::Frozen,
        Category::DryGoods,
        Category::Cleaning,
        Category::Butcher,
        Category::Other,
    ];

    /// Wire identifier (e.g. `"dry_goods"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::FruitsVeg => "fruits_veg",
            Category::Dairy => "dairy",
            Category::Bakery => "bakery",
            Category::Frozen => "frozen",
            Category::DryGoods => "dry_goods",
            Category::Cleaning => "cleaning",
            Category::Butcher => "butcher",
            Category::Other => "other",
        }
    }

    /// Position of the group in a list view. `Other` always sorts last.
    pub fn order(&self) -> u32 {
        match self {
            Category::FruitsVeg => 1,
            Category::Dairy => 2,
            Category::Bakery => 3,
            Category::Frozen => 4,
            Category::DryGoods => 5,
            Category::Cleaning => 6,
            Category::Butcher => 7,
            Category::Other => 99,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Category::FruitsVeg => "🍎",
            Category::Dairy => "🧀",
            Category::Bakery => "🥖",
            Category::Frozen => "🧊",
            Category::DryGoods => "🍝",
            Category::Cleaning => "🧼",
            Category::Butcher => "🥩",
            Category::Other => "📦",
        }
    }

    /// Wire identifiers of every category, for classifier prompts and schemas.
    pub fn identifiers() -> Vec<&'static str> {
        Self::ALL.iter().map(Category::as_str).collect()
    }

    /// Validate a raw classifier answer against the category set.
    ///
    /// Returns the category and whether the answer had to be coerced to
    /// [`Category::Other`].
    pub fn coerce(raw: &str) -> (Category, bool) {
        match raw.parse() {
            Ok(category) => (category, false),
            Err(_) => (Category::Other, true),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AisleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AisleError::InvalidCategory(s.to_string()))
    }
}
