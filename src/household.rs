// 👨‍👩‍👦‍👦 Household - who can own an item, and the glyph shown next to it
//
// Loaded from JSON and validated up front: a member without a glyph, a duplicate or
// malformed label, or a missing default glyph is a configuration error, not a fallback.
//
// {
//   "default_glyph": "🛒",
//   "members": [ { "label": "아빠", "glyph": "👨" }, ... ]
// }

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::entry::{Owner, DEFAULT_OWNER_LABEL};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HouseholdError {
    #[error("the default glyph must not be empty")]
    MissingDefaultGlyph,

    #[error("household has no members")]
    NoMembers,

    #[error("member '{0}' has no glyph")]
    MissingGlyph(String),

    #[error("member label '{0}' is invalid (empty, contains ':' or a line break, or is the reserved default label)")]
    InvalidLabel(String),

    #[error("member '{0}' is listed twice")]
    DuplicateMember(String),

    #[error("'{0}' is not a household member")]
    UnknownMember(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub label: String,
    pub glyph: String,
}

/// Raw JSON shape; glyphs are optional here so that a missing one is reported by name
#[derive(Debug, Deserialize)]
struct HouseholdFile {
    default_glyph: Option<String>,
    members: Vec<MemberFile>,
}

#[derive(Debug, Deserialize)]
struct MemberFile {
    label: String,
    glyph: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Household {
    members: Vec<Member>,
    default_glyph: String,
}

impl Household {
    /// Build a validated household
    pub fn new(members: Vec<Member>, default_glyph: &str) -> Result<Self, HouseholdError> {
        let default_glyph = default_glyph.trim();
        if default_glyph.is_empty() {
            return Err(HouseholdError::MissingDefaultGlyph);
        }
        if members.is_empty() {
            return Err(HouseholdError::NoMembers);
        }

        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(members.len());
        for member in members {
            let label = member.label.trim().to_string();
            if label.is_empty()
                || label.contains(':')
                || label.contains('\n')
                || label.contains('\r')
                || label == DEFAULT_OWNER_LABEL
            {
                return Err(HouseholdError::InvalidLabel(member.label));
            }
            if member.glyph.trim().is_empty() {
                return Err(HouseholdError::MissingGlyph(label));
            }
            if !seen.insert(label.clone()) {
                return Err(HouseholdError::DuplicateMember(label));
            }

            validated.push(Member {
                label,
                glyph: member.glyph.trim().to_string(),
            });
        }

        Ok(Household {
            members: validated,
            default_glyph: default_glyph.to_string(),
        })
    }

    /// Parse and validate a household JSON document
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: HouseholdFile =
            serde_json::from_str(content).context("Failed to parse household JSON")?;

        let default_glyph = raw.default_glyph.unwrap_or_default();
        let mut members = Vec::with_capacity(raw.members.len());
        for member in raw.members {
            let glyph = member
                .glyph
                .ok_or_else(|| HouseholdError::MissingGlyph(member.label.clone()))?;
            members.push(Member {
                label: member.label,
                glyph,
            });
        }

        Ok(Household::new(members, &default_glyph)?)
    }

    /// Load household from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read household file: {:?}", path.as_ref()))?;

        Household::from_json(&content)
            .with_context(|| format!("Invalid household file: {:?}", path.as_ref()))
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn default_glyph(&self) -> &str {
        &self.default_glyph
    }

    /// Resolve a label picked by the user. The default label is always accepted.
    pub fn resolve(&self, label: &str) -> Result<Owner, HouseholdError> {
        match Owner::from_label(label) {
            Owner::Default => Ok(Owner::Default),
            Owner::Member(label) => {
                if self.members.iter().any(|m| m.label == label) {
                    Ok(Owner::Member(label))
                } else {
                    Err(HouseholdError::UnknownMember(label))
                }
            }
        }
    }

    /// Glyph for an owner. Labels no longer in the household (old persisted
    /// lines) fall back to the default glyph.
    pub fn glyph_for(&self, owner: &Owner) -> &str {
        match owner {
            Owner::Member(label) => self
                .members
                .iter()
                .find(|m| &m.label == label)
                .map(|m| m.glyph.as_str())
                .unwrap_or(self.default_glyph.as_str()),
            Owner::Default => self.default_glyph.as_str(),
        }
    }
}

impl Default for Household {
    /// The family the list was first built for
    fn default() -> Self {
        let member = |label: &str, glyph: &str| Member {
            label: label.to_string(),
            glyph: glyph.to_string(),
        };

        Household {
            members: vec![
                member("아빠", "👨"),
                member("엄마", "👩"),
                member("큰아들", "👦"),
                member("작은아들", "🧒"),
            ],
            default_glyph: "🛒".to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_household_is_valid() {
        let household = Household::default();
        let rebuilt = Household::new(household.members().to_vec(), household.default_glyph());
        assert_eq!(rebuilt, Ok(household));
    }

    #[test]
    fn test_from_json() {
        let household = Household::from_json(
            r#"{
                "default_glyph": "🛒",
                "members": [
                    { "label": "할머니", "glyph": "👵" },
                    { "label": "아빠", "glyph": "👨" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(household.members().len(), 2);
        assert_eq!(household.glyph_for(&Owner::Member("할머니".to_string())), "👵");
    }

    #[test]
    fn test_member_without_glyph_is_rejected() {
        let err = Household::from_json(
            r#"{ "default_glyph": "🛒", "members": [ { "label": "아빠" } ] }"#,
        )
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<HouseholdError>(),
            Some(&HouseholdError::MissingGlyph("아빠".to_string()))
        );
    }

    #[test]
    fn test_missing_default_glyph_is_rejected() {
        let err = Household::from_json(r#"{ "members": [ { "label": "아빠", "glyph": "👨" } ] }"#)
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<HouseholdError>(),
            Some(&HouseholdError::MissingDefaultGlyph)
        );
    }

    #[test]
    fn test_invalid_labels() {
        let glyph = |label: &str| Member {
            label: label.to_string(),
            glyph: "🙂".to_string(),
        };

        assert!(matches!(
            Household::new(vec![glyph("아:빠")], "🛒"),
            Err(HouseholdError::InvalidLabel(_))
        ));
        assert!(matches!(
            Household::new(vec![glyph("기본")], "🛒"),
            Err(HouseholdError::InvalidLabel(_))
        ));
        assert_eq!(
            Household::new(vec![glyph("엄마"), glyph(" 엄마")], "🛒"),
            Err(HouseholdError::DuplicateMember("엄마".to_string()))
        );
    }

    #[test]
    fn test_resolve() {
        let household = Household::default();
        assert_eq!(household.resolve("엄마"), Ok(Owner::Member("엄마".to_string())));
        assert_eq!(household.resolve("기본"), Ok(Owner::Default));
        assert_eq!(
            household.resolve("이웃"),
            Err(HouseholdError::UnknownMember("이웃".to_string()))
        );
    }

    #[test]
    fn test_unknown_owner_uses_default_glyph() {
        let household = Household::default();
        assert_eq!(household.glyph_for(&Owner::Member("삼촌".to_string())), "🛒");
        assert_eq!(household.glyph_for(&Owner::Default), "🛒");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("household.json");
        std::fs::write(
            &path,
            r#"{ "default_glyph": "🧺", "members": [ { "label": "아빠", "glyph": "👨" } ] }"#,
        )
        .unwrap();

        let household = Household::from_file(&path).unwrap();
        assert_eq!(household.default_glyph(), "🧺");
        assert!(Household::from_file(dir.path().join("missing.json")).is_err());
    }
}
