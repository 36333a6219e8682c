// 🧺 Entry - one line of the shopping list
// An item to buy, tagged with the household member who asked for it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::ListError;

/// Label of the default sentinel owner (used when a persisted line carries no owner)
pub const DEFAULT_OWNER_LABEL: &str = "기본";

// ============================================================================
// OWNER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// A configured household member, by label
    Member(String),

    /// No explicit owner
    Default,
}

impl Owner {
    /// Map a label to an owner; the sentinel label and a blank label mean `Default`
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() || label == DEFAULT_OWNER_LABEL {
            Owner::Default
        } else {
            Owner::Member(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Owner::Member(label) => label,
            Owner::Default => DEFAULT_OWNER_LABEL,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Owner::Default)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// ENTRY
// ============================================================================

/// A shopping-list entry. Whether it is checked is session state, not part of the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub owner: Owner,
    pub name: String,
}

impl Entry {
    /// Create an entry, trimming the name. Blank names are rejected.
    pub fn new(owner: Owner, name: &str) -> Result<Self, ListError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ListError::EmptyName);
        }

        Ok(Entry {
            owner,
            name: name.to_string(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
