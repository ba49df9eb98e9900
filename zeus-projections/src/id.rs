//! Entity identifiers
//!
//! Every entity ID has the shape `<kind-prefix>-<NNN>` where the prefix
//! names the entity kind and `NNN` is a zero-padded decimal ≥ 1. New
//! numbers are issued by incrementing the maximum existing number in the
//! kind's namespace; IDs never change after creation.

use crate::{ProjectionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kinds and their ID prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Objective,
    Activity,
    UseCase,
    Deliverable,
    Risk,
    Quality,
    Constraint,
    Task,
    Vision,
}

impl EntityKind {
    /// All kinds, in prefix-table order
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Objective,
        EntityKind::Activity,
        EntityKind::UseCase,
        EntityKind::Deliverable,
        EntityKind::Risk,
        EntityKind::Quality,
        EntityKind::Constraint,
        EntityKind::Task,
        EntityKind::Vision,
    ];

    /// ID prefix for this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Objective => "obj",
            EntityKind::Activity => "act",
            EntityKind::UseCase => "uc",
            EntityKind::Deliverable => "del",
            EntityKind::Risk => "risk",
            EntityKind::Quality => "qual",
            EntityKind::Constraint => "const",
            EntityKind::Task => "task",
            EntityKind::Vision => "vision",
        }
    }

    /// Directory that holds this kind's entity files
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Objective => "objectives",
            EntityKind::Activity => "activities",
            EntityKind::UseCase => "usecases",
            EntityKind::Deliverable => "deliverables",
            EntityKind::Risk => "risks",
            EntityKind::Quality => "quality",
            EntityKind::Constraint => "constraints",
            EntityKind::Task => "tasks",
            EntityKind::Vision => "vision",
        }
    }

    /// Find the kind owning `prefix`
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.prefix() == prefix)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A parsed `<prefix>-<NNN>` identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedId {
    pub kind: EntityKind,
    pub number: u32,
}

/// Parse and validate an entity ID.
///
/// Returns [`ProjectionError::InvalidId`] when the prefix is unknown, the
/// numeric part is empty/non-decimal, or the number is zero.
pub fn parse_id(id: &str) -> Result<ParsedId> {
    let (prefix, digits) = id
        .rsplit_once('-')
        .ok_or_else(|| ProjectionError::InvalidId(id.to_string()))?;

    let kind = EntityKind::from_prefix(prefix)
        .ok_or_else(|| ProjectionError::InvalidId(id.to_string()))?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProjectionError::InvalidId(id.to_string()));
    }
    let number: u32 = digits
        .parse()
        .map_err(|_| ProjectionError::InvalidId(id.to_string()))?;
    if number == 0 {
        return Err(ProjectionError::InvalidId(id.to_string()));
    }

    Ok(ParsedId { kind, number })
}

/// Format an ID with the canonical three-digit zero padding
pub fn format_id(kind: EntityKind, number: u32) -> String {
    format!("{}-{:03}", kind.prefix(), number)
}

/// Next number in a namespace: max existing + 1, starting at 1
pub fn next_number<'a, I: IntoIterator<Item = &'a str>>(kind: EntityKind, existing: I) -> u32 {
    existing
        .into_iter()
        .filter_map(|id| parse_id(id).ok())
        .filter(|parsed| parsed.kind == kind)
        .map(|parsed| parsed.number)
        .max()
        .unwrap_or(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_all_kinds() {
        for kind in EntityKind::ALL {
            let id = format_id(kind, 7);
            let parsed = parse_id(&id).unwrap();
            assert_eq!(parsed.kind, kind);
            assert_eq!(parsed.number, 7);
        }
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        for bad in ["", "obj", "obj-", "obj-abc", "obj-0", "widget-001", "obj_001"] {
            assert!(
                matches!(parse_id(bad), Err(ProjectionError::InvalidId(_))),
                "should reject {bad:?}"
            );
        }
    }

    #[test]
    fn format_zero_pads_to_three_digits() {
        assert_eq!(format_id(EntityKind::Objective, 1), "obj-001");
        assert_eq!(format_id(EntityKind::Task, 42), "task-042");
        assert_eq!(format_id(EntityKind::Risk, 1234), "risk-1234");
    }

    #[test]
    fn next_number_increments_the_namespace_max() {
        let existing = ["obj-001", "obj-017", "task-099"];
        assert_eq!(next_number(EntityKind::Objective, existing), 18);
        assert_eq!(next_number(EntityKind::Task, existing), 100);
        assert_eq!(next_number(EntityKind::Risk, existing), 1);
    }
}
