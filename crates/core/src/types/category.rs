//! Catalog categories.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// A category key that is not part of the catalog.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

/// Product category, stored remotely under its lowercase key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ceramics,
    Weaving,
    Painting,
    Jewelry,
}

impl Category {
    pub const ALL: [Self; 4] = [Self::Ceramics, Self::Weaving, Self::Painting, Self::Jewelry];

    /// Key stored in the `category` field of product documents.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Ceramics => "ceramics",
            Self::Weaving => "weaving",
            Self::Painting => "painting",
            Self::Jewelry => "jewelry",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ceramics => "Ceramics",
            Self::Weaving => "Weaving",
            Self::Painting => "Painting",
            Self::Jewelry => "Jewelry",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Category selection when browsing. `all` disables filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    /// Whether a stored category key passes the filter.
    #[must_use]
    pub fn matches(self, category_key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(c) => c.key() == category_key,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only)
    }
}

impl From<Category> for CategoryFilter {
    fn from(category: Category) -> Self {
        Self::Only(category)
    }
}
