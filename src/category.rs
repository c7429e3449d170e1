//! The fixed category taxonomy and its normalizer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ticket categories. Anything outside the fixed set collapses to
/// [`Category::Uncategorized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Category {
    Hardware,
    Software,
    Networking,
    Access,
    Other,
    #[default]
    Uncategorized,
}

/// The assignable categories, excluding the sentinel.
pub const CATEGORIES: &[Category] = &[
    Category::Hardware,
    Category::Software,
    Category::Networking,
    Category::Access,
    Category::Other,
];

impl Category {
    /// Map an arbitrary string to a category. Matching is exact and
    /// case-sensitive; any other input, including the sentinel name
    /// itself, yields `Uncategorized`. Never fails.
    pub fn normalize(input: &str) -> Category {
        match input {
            "Hardware" => Category::Hardware,
            "Software" => Category::Software,
            "Networking" => Category::Networking,
            "Access" => Category::Access,
            "Other" => Category::Other,
            _ => Category::Uncategorized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Hardware => "Hardware",
            Category::Software => "Software",
            Category::Networking => "Networking",
            Category::Access => "Access",
            Category::Other => "Other",
            Category::Uncategorized => "Uncategorized",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
